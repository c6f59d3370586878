use serde_json::Value;

use crate::auth::repo_types::User;
use crate::nutrition::lookup::ProductRecord;

/// Word budget for the reference text. Whitespace-split words stand in for
/// tokens; this is an approximation, not a tokenizer.
pub const REFERENCE_WORD_BUDGET: usize = 3000;

pub const SYSTEM_PROMPT: &str = "You are a helpful AI nutrition assistant.";

pub fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

fn or_default(value: Option<&str>, default: &str) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

fn number_or_unknown(value: Option<f64>) -> String {
    match value {
        Some(v) if v != 0.0 && v.is_finite() => format!("{}", v),
        _ => "Unknown".to_string(),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn format_nutrients(product: &ProductRecord) -> String {
    product
        .nutriments
        .iter()
        .map(|(k, v)| format!("{}: {}", k, value_text(v)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds the advisability prompt. Missing profile fields are replaced with
/// "Unknown", "None" or "General health" instead of failing.
pub fn build_prompt(
    profile: &User,
    bmi: Option<f64>,
    product: &ProductRecord,
    reference_text: &str,
) -> String {
    let age = match profile.age {
        Some(a) if a != 0 => a.to_string(),
        _ => "Unknown".to_string(),
    };
    let bmi = match bmi {
        Some(b) if b.is_finite() && b != 0.0 => format!("{:.1}", b),
        _ => "Unknown".to_string(),
    };
    let guidance = truncate_words(reference_text, REFERENCE_WORD_BUDGET);

    let prompt = format!(
        "You are a helpful and reliable AI nutrition assistant evaluating whether a food product \
suits a specific user, based on evidence-based dietary principles and the user's personal profile.

BACKGROUND DIETARY GUIDANCE:
------------------------------------
{guidance}

USER PROFILE:
- Age: {age}
- Weight: {weight} kg
- Height: {height} cm
- BMI: {bmi}
- Health Conditions: {conditions}
- Dietary Preferences: {preferences}
- Health Goal: {goal}

PRODUCT INFORMATION:
- Name: {name}
- Nutri-Score: {grade}
- Nutrients (per 100g):
{nutrients}

TASK:
Based on the user profile and product information, is this food product advisable for the user?

- Respond in this JSON format:
{{
  \"advisability\": \"Yes\" or \"No\",
  \"summary\": \"A short and practical explanation in under 100 words, highlighting the key nutrients/ingredients relevant to the user's profile.\"
}}

- Do not name any external organisation as a source.
- Apply the dietary guidance above silently.
- Keep the advice clear, helpful and practical.",
        weight = number_or_unknown(profile.weight),
        height = number_or_unknown(profile.height),
        conditions = or_default(profile.health_conditions.as_deref(), "None"),
        preferences = or_default(profile.dietary_preferences.as_deref(), "None"),
        goal = or_default(profile.goal.as_deref(), "General health"),
        name = or_default(product.product_name.as_deref(), "Unknown"),
        grade = or_default(product.nutriscore_grade.as_deref(), "N/A"),
        nutrients = format_nutrients(product),
    );
    prompt.trim().to_string()
}
