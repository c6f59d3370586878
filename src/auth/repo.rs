use crate::auth::repo_types::{ProfileFields, User};
use sqlx::PgPool;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, name, email, password_hash, age, gender, health_conditions, \
     weight, height, dietary_preferences, goal, created_at";

impl User {
    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create a new user with hashed password and initial profile.
    pub async fn create(
        db: &PgPool,
        name: &str,
        email: &str,
        password_hash: &str,
        profile: &ProfileFields,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, age, gender, health_conditions,
                               weight, height, dietary_preferences, goal)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(profile.age)
        .bind(&profile.gender)
        .bind(&profile.health_conditions)
        .bind(profile.weight)
        .bind(profile.height)
        .bind(&profile.dietary_preferences)
        .bind(&profile.goal)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    /// Persist every mutable column of `self`.
    pub async fn save(&self, db: &PgPool) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET name = $2, email = $3, password_hash = $4, age = $5, gender = $6,
                   health_conditions = $7, weight = $8, height = $9,
                   dietary_preferences = $10, goal = $11
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(self.id)
        .bind(&self.name)
        .bind(&self.email)
        .bind(&self.password_hash)
        .bind(self.age)
        .bind(&self.gender)
        .bind(&self.health_conditions)
        .bind(self.weight)
        .bind(self.height)
        .bind(&self.dietary_preferences)
        .bind(&self.goal)
        .fetch_one(db)
        .await?;
        Ok(user)
    }
}
