use serde::{ser::SerializeMap, Serialize, Serializer};
use serde_json::{Map, Value};

/// Keys that are always present in a product's nutrient table.
pub const DEFAULT_NUTRIENTS: &[&str] = &[
    "energy",
    "energy-kcal",
    "energy-kj",
    "fat",
    "saturated-fat",
    "carbohydrates",
    "sugars",
    "fiber",
    "proteins",
    "salt",
    "sodium",
];

/// Fills every key in [`DEFAULT_NUTRIENTS`] that the product lacks with `0`.
/// Present values are kept unchanged; default keys come first, followed by the
/// product's remaining keys in their original order.
pub fn with_default_nutrients(nutriments: Map<String, Value>) -> Map<String, Value> {
    let mut merged: Map<String, Value> = DEFAULT_NUTRIENTS
        .iter()
        .map(|k| (k.to_string(), Value::from(0)))
        .collect();
    for (key, value) in nutriments {
        merged.insert(key, value);
    }
    merged
}

/// Static nutrient key → display label table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NutrientMap(&'static [(&'static str, &'static str)]);

impl NutrientMap {
    pub fn label(&self, key: &str) -> Option<&'static str> {
        self.0.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Label for `key`, falling back to the key itself.
    pub fn label_or_key<'a>(&self, key: &'a str) -> &'a str {
        self.label(key).unwrap_or(key)
    }
}

impl Serialize for NutrientMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

pub const NUTRIENT_MAP: NutrientMap = NutrientMap(&[
    ("energy", "Energy (kcal)"),
    ("energy-kcal", "Energy (kcal)"),
    ("energy-kj", "Energy (kJ)"),
    ("fat", "Total Fat"),
    ("saturated-fat", "Saturated Fat"),
    ("trans-fat", "Trans Fat"),
    ("monounsaturated-fat", "Monounsaturated Fat"),
    ("polyunsaturated-fat", "Polyunsaturated Fat"),
    ("cholesterol", "Cholesterol"),
    ("carbohydrates", "Total Carbohydrates"),
    ("dietary-fiber", "Dietary Fiber"),
    ("soluble-fiber", "Soluble Fiber"),
    ("insoluble-fiber", "Insoluble Fiber"),
    ("sugars", "Total Sugars"),
    ("added-sugars", "Added Sugars"),
    ("sugar-alcohols", "Sugar Alcohols"),
    ("protein", "Protein"),
    ("salt", "Salt"),
    ("sodium", "Sodium"),
    ("potassium", "Potassium"),
    ("calcium", "Calcium"),
    ("iron", "Iron"),
    ("vitamin-a", "Vitamin A"),
    ("vitamin-c", "Vitamin C"),
    ("vitamin-d", "Vitamin D"),
    ("vitamin-e", "Vitamin E"),
    ("vitamin-k", "Vitamin K"),
    ("thiamin", "Thiamin (B1)"),
    ("riboflavin", "Riboflavin (B2)"),
    ("niacin", "Niacin (B3)"),
    ("vitamin-b6", "Vitamin B6"),
    ("folate", "Folate (B9)"),
    ("vitamin-b12", "Vitamin B12"),
    ("biotin", "Biotin (B7)"),
    ("pantothenic-acid", "Pantothenic Acid (B5)"),
    ("phosphorus", "Phosphorus"),
    ("iodine", "Iodine"),
    ("magnesium", "Magnesium"),
    ("zinc", "Zinc"),
    ("selenium", "Selenium"),
    ("copper", "Copper"),
    ("manganese", "Manganese"),
    ("chromium", "Chromium"),
    ("molybdenum", "Molybdenum"),
    ("chloride", "Chloride"),
    ("omega-3", "Omega-3 Fatty Acids"),
    ("omega-6", "Omega-6 Fatty Acids"),
    ("alanine", "Alanine"),
    ("arginine", "Arginine"),
    ("aspartic-acid", "Aspartic Acid"),
    ("glutamic-acid", "Glutamic Acid"),
    ("glycine", "Glycine"),
    ("histidine", "Histidine"),
    ("hydroxyproline", "Hydroxyproline"),
    ("isoleucine", "Isoleucine"),
    ("leucine", "Leucine"),
    ("lysine", "Lysine"),
    ("methionine", "Methionine"),
    ("phenylalanine", "Phenylalanine"),
    ("proline", "Proline"),
    ("serine", "Serine"),
    ("threonine", "Threonine"),
    ("tryptophan", "Tryptophan"),
    ("tyrosine", "Tyrosine"),
    ("valine", "Valine"),
    ("caffeine", "Caffeine"),
    ("alcohol", "Alcohol"),
    ("water", "Water Content"),
    ("ash", "Ash Content"),
    ("ph", "pH Level"),
    ("pral", "PRAL (Renal Acid Load)"),
    ("gluten", "Gluten"),
    ("lactose", "Lactose"),
    ("fructose", "Fructose"),
    ("sucrose", "Sucrose"),
    ("starch", "Starch"),
    ("polyols", "Polyols"),
    ("gout-inducing", "Gout-Inducing Purines"),
    ("oxalate", "Oxalate Content"),
    ("phytate", "Phytate Content"),
]);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_keys_default_to_zero() {
        let original = json!({"fat": 3.5, "sugars": 12, "caffeine": 0.02});
        let Value::Object(original) = original else { unreachable!() };

        let merged = with_default_nutrients(original);
        assert_eq!(merged["fiber"], json!(0));
        assert_eq!(merged["sodium"], json!(0));
        assert_eq!(merged["fat"], json!(3.5));
        assert_eq!(merged["sugars"], json!(12));
        assert_eq!(merged["caffeine"], json!(0.02));
        for key in DEFAULT_NUTRIENTS {
            assert!(merged.contains_key(*key), "missing {key}");
        }
        assert_eq!(merged.len(), DEFAULT_NUTRIENTS.len() + 1);
        assert_eq!(merged.keys().last().map(String::as_str), Some("caffeine"));
    }

    #[test]
    fn labels_fall_back_to_raw_key() {
        assert_eq!(NUTRIENT_MAP.label("energy-kj"), Some("Energy (kJ)"));
        assert_eq!(NUTRIENT_MAP.label_or_key("saturated-fat"), "Saturated Fat");
        assert_eq!(NUTRIENT_MAP.label_or_key("proteins"), "proteins");
        assert_eq!(NUTRIENT_MAP.label("nova-group"), None);
    }

    #[test]
    fn map_serializes_as_object() {
        let value = serde_json::to_value(NUTRIENT_MAP).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), NUTRIENT_MAP.0.len());
        assert_eq!(obj["pral"], json!("PRAL (Renal Acid Load)"));
    }
}
