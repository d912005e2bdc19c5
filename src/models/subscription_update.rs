use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Audit trail of manual membership changes made by staff.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubscriptionUpdate {
    pub id: Uuid,
    pub member_id: Uuid,
    pub previous_end_date: DateTime<Utc>,
    pub new_end_date: DateTime<Utc>,
    pub plan_id: Option<Uuid>,
    pub reason: Option<String>,
    pub updated_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateSubscriptionUpdateData {
    pub member_id: Uuid,
    pub previous_end_date: DateTime<Utc>,
    pub new_end_date: DateTime<Utc>,
    pub plan_id: Option<Uuid>,
    pub reason: Option<String>,
    pub updated_by: Uuid,
}

impl SubscriptionUpdate {
    pub async fn create(
        tx: &mut Transaction<'_, Postgres>,
        data: CreateSubscriptionUpdateData,
    ) -> Result<Self, sqlx::Error> {
        let update = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO subscription_updates (member_id, previous_end_date, new_end_date, plan_id, reason, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(data.member_id)
        .bind(data.previous_end_date)
        .bind(data.new_end_date)
        .bind(data.plan_id)
        .bind(data.reason)
        .bind(data.updated_by)
        .fetch_one(&mut **tx)
        .await?;

        Ok(update)
    }

    pub async fn list_by_member(pool: &PgPool, member_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let updates = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM subscription_updates
            WHERE member_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(member_id)
        .fetch_all(pool)
        .await?;

        Ok(updates)
    }
}
