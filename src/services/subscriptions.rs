use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    member::{Member, MembershipStatus},
    plan::Plan,
    subscription_update::{CreateSubscriptionUpdateData, SubscriptionUpdate},
};

#[derive(thiserror::Error, Debug)]
pub enum SubscriptionError {
    #[error("Plan not found")]
    PlanNotFound,

    #[error("Plan is not available for new memberships")]
    PlanUnavailable,

    #[error("Member not found")]
    MemberNotFound,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// The plan must exist, belong to the gym and still be offered
pub fn ensure_plan_available(plan: Option<Plan>, gym_id: Uuid) -> Result<Plan, SubscriptionError> {
    let plan = plan
        .filter(|p| p.gym_id == gym_id)
        .ok_or(SubscriptionError::PlanNotFound)?;
    if !plan.is_active {
        return Err(SubscriptionError::PlanUnavailable);
    }
    Ok(plan)
}

/// Start and end of a new membership on `plan`
pub fn membership_window(plan: &Plan, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (now, now + Duration::days(i64::from(plan.duration_days)))
}

/// Status after moving the end date by hand
pub fn status_for_end_date(end_date: DateTime<Utc>, now: DateTime<Utc>) -> MembershipStatus {
    if end_date > now {
        MembershipStatus::Active
    } else {
        MembershipStatus::Expired
    }
}

#[derive(Debug, Clone)]
pub struct ManualUpdateRequest {
    pub member_id: Uuid,
    pub new_end_date: DateTime<Utc>,
    pub plan_id: Option<Uuid>,
    pub reason: Option<String>,
}

/// Sets a member's expiry (and optionally plan) and records who did it
#[tracing::instrument(skip(pool, request), fields(member_id = %request.member_id))]
pub async fn apply_manual_update(
    pool: &PgPool,
    gym_id: Uuid,
    updated_by: Uuid,
    request: ManualUpdateRequest,
) -> Result<(Member, SubscriptionUpdate), SubscriptionError> {
    if let Some(plan_id) = request.plan_id {
        ensure_plan_available(Plan::find_by_id(pool, plan_id).await?, gym_id)?;
    }

    let mut tx = pool.begin().await?;

    let member = Member::find_by_id_for_update(&mut tx, request.member_id)
        .await?
        .filter(|m| m.gym_id == gym_id)
        .ok_or(SubscriptionError::MemberNotFound)?;

    let status = status_for_end_date(request.new_end_date, Utc::now());
    let updated = Member::update_subscription(
        &mut tx,
        member.id,
        request.new_end_date,
        request.plan_id,
        status,
    )
    .await?;

    let audit = SubscriptionUpdate::create(
        &mut tx,
        CreateSubscriptionUpdateData {
            member_id: member.id,
            previous_end_date: member.end_date,
            new_end_date: request.new_end_date,
            plan_id: request.plan_id,
            reason: request.reason,
            updated_by,
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        previous_end_date = %member.end_date,
        new_end_date = %updated.end_date,
        status = ?updated.membership_status,
        "Subscription updated manually"
    );

    Ok((updated, audit))
}
