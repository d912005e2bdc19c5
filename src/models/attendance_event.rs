use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attendance_action", rename_all = "snake_case")]
#[serde(rename_all = "kebab-case")]
pub enum AttendanceAction {
    CheckIn,
    CheckOut,
}

impl AttendanceAction {
    pub fn opposite(self) -> Self {
        match self {
            AttendanceAction::CheckIn => AttendanceAction::CheckOut,
            AttendanceAction::CheckOut => AttendanceAction::CheckIn,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceAction::CheckIn => "check-in",
            AttendanceAction::CheckOut => "check-out",
        }
    }
}

impl fmt::Display for AttendanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of one check-in or check-out.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AttendanceEvent {
    pub id: Uuid,
    pub member_id: Uuid,
    pub gym_id: Uuid,
    pub access_code_id: Option<Uuid>,
    pub action: AttendanceAction,
    pub previous_event_id: Option<Uuid>,
    pub device_info: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAttendanceEvent {
    pub member_id: Uuid,
    pub gym_id: Uuid,
    pub access_code_id: Option<Uuid>,
    pub action: AttendanceAction,
    pub previous_event_id: Option<Uuid>,
    pub device_info: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Member currently inside the gym, with the time they checked in.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PresentMember {
    pub member_id: Uuid,
    pub name: String,
    pub checked_in_at: DateTime<Utc>,
}

/// Attendance totals for one calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailyAttendance {
    pub day: NaiveDate,
    pub check_ins: i64,
    pub unique_members: i64,
}

impl AttendanceEvent {
    /// The latest event for a member, read inside the toggle transaction.
    /// `seq` is insertion order, which under the member lock is chain order.
    pub async fn latest_for_member(
        tx: &mut Transaction<'_, Postgres>,
        member_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let event = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM attendance_events
            WHERE member_id = $1
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .bind(member_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(event)
    }

    /// The latest event for a member, outside any transaction
    pub async fn find_latest(pool: &PgPool, member_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let event = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM attendance_events
            WHERE member_id = $1
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .bind(member_id)
        .fetch_optional(pool)
        .await?;

        Ok(event)
    }

    /// Appends an event. The unique constraints on `previous_event_id` reject
    /// a second successor to the same event.
    pub async fn append(
        tx: &mut Transaction<'_, Postgres>,
        data: NewAttendanceEvent,
    ) -> Result<Self, sqlx::Error> {
        let event = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO attendance_events (
                member_id, gym_id, access_code_id, action, previous_event_id, device_info, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(data.member_id)
        .bind(data.gym_id)
        .bind(data.access_code_id)
        .bind(data.action)
        .bind(data.previous_event_id)
        .bind(data.device_info)
        .bind(data.recorded_at)
        .fetch_one(&mut **tx)
        .await?;

        Ok(event)
    }

    /// Lists a member's events, newest first
    pub async fn list_by_member(
        pool: &PgPool,
        member_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let events = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM attendance_events
            WHERE member_id = $1
            ORDER BY seq DESC
            LIMIT $2
            "#,
        )
        .bind(member_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(events)
    }

    /// Members of a gym whose latest event is a check-in
    pub async fn list_present(pool: &PgPool, gym_id: Uuid) -> Result<Vec<PresentMember>, sqlx::Error> {
        let present = sqlx::query_as::<_, PresentMember>(
            r#"
            SELECT latest.member_id, m.name, latest.recorded_at AS checked_in_at
            FROM (
                SELECT DISTINCT ON (member_id) member_id, action, recorded_at
                FROM attendance_events
                WHERE gym_id = $1
                ORDER BY member_id, seq DESC
            ) latest
            JOIN members m ON m.id = latest.member_id
            WHERE latest.action = 'check_in'
            ORDER BY latest.recorded_at DESC
            "#,
        )
        .bind(gym_id)
        .fetch_all(pool)
        .await?;

        Ok(present)
    }

    /// Counts a gym's events of one kind in `[from, to)`
    pub async fn count_between(
        pool: &PgPool,
        gym_id: Uuid,
        action: AttendanceAction,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM attendance_events
            WHERE gym_id = $1 AND action = $2 AND recorded_at >= $3 AND recorded_at < $4
            "#,
        )
        .bind(gym_id)
        .bind(action)
        .bind(from)
        .bind(to)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    /// Per-day check-in totals (UTC days) for a gym in `[from, to)`
    pub async fn daily_totals(
        pool: &PgPool,
        gym_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DailyAttendance>, sqlx::Error> {
        let days = sqlx::query_as::<_, DailyAttendance>(
            r#"
            SELECT
                (recorded_at AT TIME ZONE 'UTC')::DATE AS day,
                COUNT(*) AS check_ins,
                COUNT(DISTINCT member_id) AS unique_members
            FROM attendance_events
            WHERE gym_id = $1
              AND action = 'check_in'
              AND recorded_at >= $2
              AND recorded_at < $3
            GROUP BY day
            ORDER BY day ASC
            "#,
        )
        .bind(gym_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await?;

        Ok(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposite_action() {
        assert_eq!(AttendanceAction::CheckIn.opposite(), AttendanceAction::CheckOut);
        assert_eq!(AttendanceAction::CheckOut.opposite(), AttendanceAction::CheckIn);
    }

    #[test]
    fn test_action_wire_format() {
        assert_eq!(
            serde_json::to_string(&AttendanceAction::CheckIn).unwrap(),
            r#""check-in""#
        );
        let action: AttendanceAction = serde_json::from_str(r#""check-out""#).unwrap();
        assert_eq!(action, AttendanceAction::CheckOut);
        assert_eq!(AttendanceAction::CheckOut.as_str(), "check-out");
    }
}
