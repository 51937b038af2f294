use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmailUser {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    pub datetime_created: DateTime<Utc>,
}

impl EmailUser {
    /// Full name, or the email address when no name has been recorded
    pub fn display_name(&self) -> String {
        let full_name = format!("{} {}", self.first_name, self.last_name);
        let full_name = full_name.trim();
        if full_name.is_empty() {
            self.email.clone()
        } else {
            full_name.to_string()
        }
    }

    /// Finds a user by their internal ID
    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM email_users WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Finds a user by email, matching case-insensitively
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM email_users WHERE LOWER(email) = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(pool)
        .await
    }

    /// Finds or creates a user by email
    pub async fn find_or_create(pool: &PgPool, email: &str) -> Result<Self, sqlx::Error> {
        if let Some(existing) = Self::find_by_email(pool, email).await? {
            return Ok(existing);
        }

        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO email_users (email)
            VALUES (LOWER($1))
            ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
            RETURNING *
            "#,
        )
        .bind(email)
        .fetch_one(pool)
        .await
    }

    /// Updates the user's name
    pub async fn update_name(
        pool: &PgPool,
        id: i64,
        first_name: &str,
        last_name: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE email_users
            SET first_name = $2, last_name = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(first_name)
        .bind(last_name)
        .fetch_one(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(first: &str, last: &str) -> EmailUser {
        EmailUser {
            id: 1,
            email: "ranger@example.com".to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            is_staff: false,
            datetime_created: Utc::now(),
        }
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        assert_eq!(user("", "").display_name(), "ranger@example.com");
        assert_eq!(user("Jo", "").display_name(), "Jo");
        assert_eq!(user("Jo", "Bloggs").display_name(), "Jo Bloggs");
    }
}
