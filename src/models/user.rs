use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Owner,
    Staff,
    Member,
}

impl UserRole {
    /// Owners and staff run the front desk: they issue access codes and
    /// manage members and plans.
    pub fn is_gym_staff(self) -> bool {
        matches!(self, UserRole::Owner | UserRole::Staff)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub gym_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateUserData {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub gym_id: Option<Uuid>,
}

impl User {
    /// Creates a new user account
    pub async fn create(pool: &PgPool, data: CreateUserData) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let user = Self::create_in_tx(&mut tx, data).await?;
        tx.commit().await?;

        Ok(user)
    }

    /// Creates a new user account inside an open transaction
    pub async fn create_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        data: CreateUserData,
    ) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO users (email, password_hash, name, phone, role, gym_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(normalize_email(&data.email))
        .bind(&data.password_hash)
        .bind(&data.name)
        .bind(&data.phone)
        .bind(data.role)
        .bind(data.gym_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM users WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM users WHERE email = $1
            "#,
        )
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Attaches the user to a gym (owners get their gym after creating it)
    pub async fn assign_gym(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        gym_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users SET gym_id = $2 WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(gym_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

/// Emails are matched case-insensitively and stored lowercase.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staff_capability() {
        assert!(UserRole::Owner.is_gym_staff());
        assert!(UserRole::Staff.is_gym_staff());
        assert!(!UserRole::Member.is_gym_staff());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Owner@Gym.COM "), "owner@gym.com");
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&UserRole::Owner).unwrap(), r#""owner""#);
        let role: UserRole = serde_json::from_str(r#""staff""#).unwrap();
        assert_eq!(role, UserRole::Staff);
    }
}
