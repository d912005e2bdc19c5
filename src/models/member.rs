use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "membership_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Active,
    Expired,
    Suspended,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Member {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub gym_id: Uuid,
    pub plan_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub membership_status: MembershipStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_visits: i32,
    pub auto_renewal: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateMemberData {
    pub user_id: Option<Uuid>,
    pub gym_id: Uuid,
    pub plan_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub auto_renewal: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateMemberData {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub plan_id: Option<Uuid>,
    pub membership_status: Option<MembershipStatus>,
    pub auto_renewal: Option<bool>,
}

impl Member {
    /// Whole days left on the membership, rounded up, never negative.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        let left = self.end_date - now;
        if left <= Duration::zero() {
            return 0;
        }
        let whole_days = left.num_days();
        if left > Duration::days(whole_days) {
            whole_days + 1
        } else {
            whole_days
        }
    }

    /// Creates a new member record
    pub async fn create(pool: &PgPool, data: CreateMemberData) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let member = Self::create_in_tx(&mut tx, data).await?;
        tx.commit().await?;

        Ok(member)
    }

    /// Creates a new member record inside an open transaction
    pub async fn create_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        data: CreateMemberData,
    ) -> Result<Self, sqlx::Error> {
        let member = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO members (
                user_id, gym_id, plan_id, name, email, phone, address,
                emergency_contact, membership_status, start_date, end_date, auto_renewal
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'active', $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(data.user_id)
        .bind(data.gym_id)
        .bind(data.plan_id)
        .bind(&data.name)
        .bind(&data.email)
        .bind(&data.phone)
        .bind(&data.address)
        .bind(&data.emergency_contact)
        .bind(data.start_date)
        .bind(data.end_date)
        .bind(data.auto_renewal)
        .fetch_one(&mut **tx)
        .await?;

        Ok(member)
    }

    /// Finds a member by their internal ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let member = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM members WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(member)
    }

    /// Loads a member and holds its row lock until the transaction ends.
    /// All attendance toggles for one member serialize on this lock.
    pub async fn find_by_id_for_update(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let member = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM members WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(member)
    }

    /// Finds the member record linked to a login account
    pub async fn find_by_user_id(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let member = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM members WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(member)
    }

    /// Lists members of a gym, optionally filtered by a name/email/phone search
    pub async fn list_by_gym(
        pool: &PgPool,
        gym_id: Uuid,
        search: Option<&str>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")));

        let members = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM members
            WHERE gym_id = $1
              AND (
                $2::TEXT IS NULL
                OR name ILIKE $2
                OR email ILIKE $2
                OR phone ILIKE $2
              )
            ORDER BY name ASC
            "#,
        )
        .bind(gym_id)
        .bind(pattern)
        .fetch_all(pool)
        .await?;

        Ok(members)
    }

    /// Updates member profile information
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateMemberData,
    ) -> Result<Self, sqlx::Error> {
        let member = sqlx::query_as::<_, Self>(
            r#"
            UPDATE members
            SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                phone = COALESCE($4, phone),
                address = COALESCE($5, address),
                emergency_contact = COALESCE($6, emergency_contact),
                plan_id = COALESCE($7, plan_id),
                membership_status = COALESCE($8, membership_status),
                auto_renewal = COALESCE($9, auto_renewal),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.name)
        .bind(data.email)
        .bind(data.phone)
        .bind(data.address)
        .bind(data.emergency_contact)
        .bind(data.plan_id)
        .bind(data.membership_status)
        .bind(data.auto_renewal)
        .fetch_one(pool)
        .await?;

        Ok(member)
    }

    /// Sets the membership status
    pub async fn set_status(
        pool: &PgPool,
        id: Uuid,
        status: MembershipStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE members
            SET membership_status = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Moves the membership end date (and optionally the plan)
    pub async fn update_subscription(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        end_date: DateTime<Utc>,
        plan_id: Option<Uuid>,
        status: MembershipStatus,
    ) -> Result<Self, sqlx::Error> {
        let member = sqlx::query_as::<_, Self>(
            r#"
            UPDATE members
            SET
                end_date = $2,
                plan_id = COALESCE($3, plan_id),
                membership_status = $4,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(end_date)
        .bind(plan_id)
        .bind(status)
        .fetch_one(&mut **tx)
        .await?;

        Ok(member)
    }

    pub async fn increment_visits(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE members
            SET total_visits = total_visits + 1, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Flips active memberships whose end date has passed to expired.
    /// Returns the number of members updated.
    pub async fn expire_lapsed(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE members
            SET membership_status = 'expired', updated_at = NOW()
            WHERE membership_status = 'active' AND end_date < $1
            "#,
        )
        .bind(now)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn count_by_gym(
        pool: &PgPool,
        gym_id: Uuid,
        status: Option<MembershipStatus>,
    ) -> Result<i64, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM members
            WHERE gym_id = $1 AND ($2::membership_status IS NULL OR membership_status = $2)
            "#,
        )
        .bind(gym_id)
        .bind(status)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    /// Counts active members whose membership ends before `until`
    pub async fn count_expiring(
        pool: &PgPool,
        gym_id: Uuid,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM members
            WHERE gym_id = $1
              AND membership_status = 'active'
              AND end_date >= $2
              AND end_date < $3
            "#,
        )
        .bind(gym_id)
        .bind(now)
        .bind(until)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member_ending_at(end_date: DateTime<Utc>) -> Member {
        let now = Utc::now();
        Member {
            id: Uuid::new_v4(),
            user_id: None,
            gym_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            name: "John Member".to_string(),
            email: None,
            phone: None,
            address: None,
            emergency_contact: None,
            membership_status: MembershipStatus::Active,
            start_date: now - Duration::days(30),
            end_date,
            total_visits: 0,
            auto_renewal: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_days_remaining_rounds_up() {
        let now = Utc::now();
        let member = member_ending_at(now + Duration::days(2) + Duration::hours(3));
        assert_eq!(member.days_remaining(now), 3);
    }

    #[test]
    fn test_days_remaining_exact_days() {
        let now = Utc::now();
        let member = member_ending_at(now + Duration::days(7));
        assert_eq!(member.days_remaining(now), 7);
    }

    #[test]
    fn test_days_remaining_never_negative() {
        let now = Utc::now();
        let member = member_ending_at(now - Duration::days(4));
        assert_eq!(member.days_remaining(now), 0);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&MembershipStatus::Expired).unwrap(),
            r#""expired""#
        );
    }
}
