use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, Transaction};
use uuid::Uuid;

/// A short-lived code that authorizes one attendance toggle at a gym.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccessCode {
    pub id: Uuid,
    pub gym_id: Uuid,
    pub code_value: String,
    pub numeric_code: String,
    pub issued_by: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub consumed_by: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct CreateAccessCodeData {
    pub gym_id: Uuid,
    pub code_value: String,
    pub numeric_code: String,
    pub issued_by: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AccessCode {
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    /// The validity window is half-open: `[issued_at, expires_at)`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub async fn create<'e, E>(executor: E, data: CreateAccessCodeData) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let code = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO access_codes (gym_id, code_value, numeric_code, issued_by, issued_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(data.gym_id)
        .bind(&data.code_value)
        .bind(&data.numeric_code)
        .bind(data.issued_by)
        .bind(data.issued_at)
        .bind(data.expires_at)
        .fetch_one(executor)
        .await?;

        Ok(code)
    }

    /// Takes the per-digits issuance lock, then reports whether the digits
    /// are free. The lock is held until the transaction ends, so a caller
    /// that inserts before committing is the only holder of a live code.
    pub async fn claim_numeric_code(
        tx: &mut Transaction<'_, Postgres>,
        numeric_code: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(numeric_code)
            .execute(&mut **tx)
            .await?;

        let in_use = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM access_codes
                WHERE numeric_code = $1 AND expires_at > $2
            )
            "#,
        )
        .bind(numeric_code)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        Ok(!in_use)
    }

    /// Looks up a code by its QR token and locks it for the transaction
    pub async fn find_by_value_for_update(
        tx: &mut Transaction<'_, Postgres>,
        code_value: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let code = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM access_codes
            WHERE code_value = $1
            FOR UPDATE
            "#,
        )
        .bind(code_value)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(code)
    }

    /// Looks up the most recently issued code with these digits at the
    /// member's gym and locks it. Unknown members fall back to any gym.
    pub async fn find_latest_by_numeric_for_update(
        tx: &mut Transaction<'_, Postgres>,
        numeric_code: &str,
        member_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let code = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM access_codes
            WHERE numeric_code = $1
              AND gym_id = COALESCE((SELECT gym_id FROM members WHERE id = $2), gym_id)
            ORDER BY issued_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(numeric_code)
        .bind(member_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(code)
    }

    /// Marks the code consumed if nobody consumed it first.
    /// Returns false when the code was already consumed.
    pub async fn mark_consumed(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        member_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE access_codes
            SET consumed_at = $3, consumed_by = $2
            WHERE id = $1 AND consumed_at IS NULL
            "#,
        )
        .bind(id)
        .bind(member_id)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Deletes codes that expired before `cutoff` and never authorized an
    /// attendance event. Returns the number of codes removed.
    pub async fn delete_stale(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM access_codes c
            WHERE c.expires_at < $1
              AND NOT EXISTS (
                SELECT 1 FROM attendance_events e WHERE e.access_code_id = c.id
              )
            "#,
        )
        .bind(cutoff)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}
