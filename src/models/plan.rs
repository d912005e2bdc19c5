use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "plan_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    #[default]
    Basic,
    Premium,
    Vip,
    Family,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub gym_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub duration_days: i32,
    pub plan_type: PlanType,
    pub features: Vec<String>,
    pub auto_renewal: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreatePlanData {
    pub gym_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub duration_days: i32,
    pub plan_type: PlanType,
    pub features: Vec<String>,
    pub auto_renewal: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePlanData {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub duration_days: Option<i32>,
    pub plan_type: Option<PlanType>,
    pub features: Option<Vec<String>>,
    pub auto_renewal: Option<bool>,
}

impl Plan {
    pub async fn create(pool: &PgPool, data: CreatePlanData) -> Result<Self, sqlx::Error> {
        let plan = sqlx::query_as::<_, Plan>(
            r#"
            INSERT INTO plans (gym_id, name, description, price, duration_days, plan_type, features, auto_renewal)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(data.gym_id)
        .bind(data.name)
        .bind(data.description)
        .bind(data.price)
        .bind(data.duration_days)
        .bind(data.plan_type)
        .bind(data.features)
        .bind(data.auto_renewal)
        .fetch_one(pool)
        .await?;

        Ok(plan)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let plan = sqlx::query_as::<_, Plan>(
            r#"
            SELECT * FROM plans WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(plan)
    }

    /// Lists the plans of a gym, newest first
    pub async fn list_by_gym(
        pool: &PgPool,
        gym_id: Uuid,
        active_only: bool,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = if active_only {
            r#"
            SELECT * FROM plans
            WHERE gym_id = $1 AND is_active = TRUE
            ORDER BY price ASC, name ASC
            "#
        } else {
            r#"
            SELECT * FROM plans
            WHERE gym_id = $1
            ORDER BY price ASC, name ASC
            "#
        };

        let plans = sqlx::query_as::<_, Plan>(query)
            .bind(gym_id)
            .fetch_all(pool)
            .await?;

        Ok(plans)
    }

    /// Updates the provided fields, keeping the others
    pub async fn update(pool: &PgPool, id: Uuid, data: UpdatePlanData) -> Result<Self, sqlx::Error> {
        let plan = sqlx::query_as::<_, Plan>(
            r#"
            UPDATE plans
            SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                price = COALESCE($4, price),
                duration_days = COALESCE($5, duration_days),
                plan_type = COALESCE($6, plan_type),
                features = COALESCE($7, features),
                auto_renewal = COALESCE($8, auto_renewal),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.name)
        .bind(data.description)
        .bind(data.price)
        .bind(data.duration_days)
        .bind(data.plan_type)
        .bind(data.features)
        .bind(data.auto_renewal)
        .fetch_one(pool)
        .await?;

        Ok(plan)
    }

    /// Deactivate a plan (soft delete); existing members keep it
    pub async fn deactivate(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE plans
            SET is_active = FALSE, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }
}
