use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::user::User;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Gym {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
    pub upi_id: Option<String>,
    #[serde(skip_serializing)]
    pub payment_qr_code: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateGymData {
    pub owner_id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
}

/// Partial update of the payment settings. `None` leaves a column untouched,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct PaymentSettingsUpdate {
    pub upi_id: Option<Option<String>>,
    pub payment_qr_code: Option<Option<String>>,
}

impl Gym {
    /// Creates a gym and makes it the owner's gym
    pub async fn create(pool: &PgPool, data: CreateGymData) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let gym = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO gyms (owner_id, name, address, phone, email, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(data.owner_id)
        .bind(&data.name)
        .bind(&data.address)
        .bind(&data.phone)
        .bind(&data.email)
        .bind(&data.description)
        .fetch_one(&mut *tx)
        .await?;

        User::assign_gym(&mut tx, data.owner_id, gym.id).await?;

        tx.commit().await?;

        Ok(gym)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let gym = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM gyms WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(gym)
    }

    /// Lists all active gyms
    pub async fn list_active(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let gyms = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM gyms
            WHERE is_active = TRUE
            ORDER BY name ASC
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(gyms)
    }

    /// Updates UPI id and/or payment QR image
    pub async fn update_payment_settings(
        pool: &PgPool,
        id: Uuid,
        update: PaymentSettingsUpdate,
    ) -> Result<Self, sqlx::Error> {
        let gym = sqlx::query_as::<_, Self>(
            r#"
            UPDATE gyms
            SET
                upi_id = CASE WHEN $2 THEN $3 ELSE upi_id END,
                payment_qr_code = CASE WHEN $4 THEN $5 ELSE payment_qr_code END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update.upi_id.is_some())
        .bind(update.upi_id.flatten())
        .bind(update.payment_qr_code.is_some())
        .bind(update.payment_qr_code.flatten())
        .fetch_one(pool)
        .await?;

        Ok(gym)
    }
}
