use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database, including the health profile.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub health_conditions: Option<String>,
    pub weight: Option<f64>, // kg
    pub height: Option<f64>, // cm
    pub dietary_preferences: Option<String>,
    pub goal: Option<String>,
    pub created_at: OffsetDateTime,
}

impl User {
    /// Body mass index, `weight / (height/100)^2`.
    pub fn bmi(&self) -> Option<f64> {
        match (self.weight, self.height) {
            (Some(w), Some(h)) if w > 0.0 && h > 0.0 => {
                let m = h / 100.0;
                Some(w / (m * m))
            }
            _ => None,
        }
    }
}

/// Profile fields supplied at registration or on update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileFields {
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub health_conditions: Option<String>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub dietary_preferences: Option<String>,
    pub goal: Option<String>,
}
