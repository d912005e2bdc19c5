use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::middleware::{auth::CurrentUser, session::AppState};
use crate::error::{AppError, Result};
use crate::models::{
    attendance_event::AttendanceEvent,
    member::{CreateMemberData, Member, MembershipStatus, UpdateMemberData},
    plan::Plan,
    subscription_update::SubscriptionUpdate,
};
use crate::services::{
    attendance::{self, PresenceState},
    subscriptions::{self, ManualUpdateRequest},
};

#[derive(Debug, Deserialize)]
pub struct ListMembersQuery {
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMemberRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub plan_id: Uuid,
    pub auto_renewal: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub plan_id: Option<Uuid>,
    pub membership_status: Option<MembershipStatus>,
    pub auto_renewal: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualUpdateBody {
    #[serde(alias = "member_id")]
    pub member_id: Uuid,
    #[serde(alias = "new_expiry")]
    pub new_expiry: DateTime<Utc>,
    #[serde(alias = "plan_id")]
    pub plan_id: Option<Uuid>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ManualUpdateResponse {
    pub member: Member,
    pub update: SubscriptionUpdate,
}

#[derive(Debug, Serialize)]
pub struct MemberStats {
    pub member_id: Uuid,
    pub membership_status: MembershipStatus,
    pub end_date: DateTime<Utc>,
    pub total_visits: i32,
    pub days_remaining: i64,
    pub presence: PresenceState,
    pub last_event: Option<AttendanceEvent>,
}

/// Loads a member of the caller's gym
async fn load_gym_member(state: &AppState, current: &CurrentUser, id: Uuid) -> Result<Member> {
    let gym_id = current.require_staff()?;
    Member::find_by_id(&state.pool, id)
        .await?
        .filter(|m| m.gym_id == gym_id)
        .ok_or_else(|| AppError::NotFound("Member not found".to_string()))
}

async fn list_members(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<ListMembersQuery>,
) -> Result<Json<Vec<Member>>> {
    let gym_id = current.require_staff()?;
    let members = Member::list_by_gym(&state.pool, gym_id, query.search.as_deref()).await?;
    Ok(Json(members))
}

/// Adds a member without a login account (front-desk sign-up)
async fn create_member(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<CreateMemberRequest>,
) -> Result<(StatusCode, Json<Member>)> {
    let gym_id = current.require_staff()?;

    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Member name is required".to_string()));
    }

    let plan =
        subscriptions::ensure_plan_available(Plan::find_by_id(&state.pool, req.plan_id).await?, gym_id)?;
    let (start_date, end_date) = subscriptions::membership_window(&plan, Utc::now());

    let member = Member::create(
        &state.pool,
        CreateMemberData {
            user_id: None,
            gym_id,
            plan_id: plan.id,
            name: req.name.trim().to_string(),
            email: req.email,
            phone: req.phone,
            address: req.address,
            emergency_contact: req.emergency_contact,
            start_date,
            end_date,
            auto_renewal: req.auto_renewal.unwrap_or(plan.auto_renewal),
        },
    )
    .await?;

    tracing::info!(member_id = %member.id, gym_id = %gym_id, "Member created");

    Ok((StatusCode::CREATED, Json(member)))
}

async fn my_profile(State(state): State<AppState>, current: CurrentUser) -> Result<Json<Member>> {
    Ok(Json(current.member_record(&state.pool).await?))
}

async fn my_stats(State(state): State<AppState>, current: CurrentUser) -> Result<Json<MemberStats>> {
    let member = current.member_record(&state.pool).await?;
    let (presence, last_event) = attendance::current_presence(&state.pool, member.id).await?;

    Ok(Json(MemberStats {
        member_id: member.id,
        membership_status: member.membership_status,
        end_date: member.end_date,
        total_visits: member.total_visits,
        days_remaining: member.days_remaining(Utc::now()),
        presence,
        last_event,
    }))
}

async fn get_member(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Member>> {
    Ok(Json(load_gym_member(&state, &current, id).await?))
}

async fn update_member(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateMemberRequest>,
) -> Result<Json<Member>> {
    let member = load_gym_member(&state, &current, id).await?;

    if let Some(plan_id) = req.plan_id {
        subscriptions::ensure_plan_available(
            Plan::find_by_id(&state.pool, plan_id).await?,
            member.gym_id,
        )?;
    }

    let updated = Member::update(
        &state.pool,
        member.id,
        UpdateMemberData {
            name: req.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            email: req.email,
            phone: req.phone,
            address: req.address,
            emergency_contact: req.emergency_contact,
            plan_id: req.plan_id,
            membership_status: req.membership_status,
            auto_renewal: req.auto_renewal,
        },
    )
    .await?;

    tracing::info!(member_id = %updated.id, "Member updated");

    Ok(Json(updated))
}

/// Suspends the membership; attendance history is kept
async fn suspend_member(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let member = load_gym_member(&state, &current, id).await?;

    Member::set_status(&state.pool, member.id, MembershipStatus::Suspended).await?;

    tracing::info!(member_id = %member.id, "Member suspended");

    Ok(StatusCode::NO_CONTENT)
}

async fn subscription_history(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<SubscriptionUpdate>>> {
    let member = load_gym_member(&state, &current, id).await?;
    Ok(Json(
        SubscriptionUpdate::list_by_member(&state.pool, member.id).await?,
    ))
}

async fn manual_update(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(body): Json<ManualUpdateBody>,
) -> Result<Json<ManualUpdateResponse>> {
    let gym_id = current.require_staff()?;

    let (member, update) = subscriptions::apply_manual_update(
        &state.pool,
        gym_id,
        current.id(),
        ManualUpdateRequest {
            member_id: body.member_id,
            new_end_date: body.new_expiry,
            plan_id: body.plan_id,
            reason: body.reason.filter(|r| !r.trim().is_empty()),
        },
    )
    .await?;

    Ok(Json(ManualUpdateResponse { member, update }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/members", get(list_members).post(create_member))
        .route("/api/members/me", get(my_profile))
        .route("/api/members/me/stats", get(my_stats))
        .route(
            "/api/members/:id",
            get(get_member).put(update_member).delete(suspend_member),
        )
        .route("/api/members/:id/subscriptions", get(subscription_history))
        .route("/api/subscriptions/manual-update", post(manual_update))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_update_accepts_both_casings() {
        let member_id = Uuid::new_v4();

        let camel: ManualUpdateBody = serde_json::from_str(&format!(
            r#"{{"memberId":"{member_id}","newExpiry":"2025-06-30T00:00:00Z","reason":"Paid cash"}}"#
        ))
        .unwrap();
        assert_eq!(camel.member_id, member_id);
        assert!(camel.plan_id.is_none());

        let snake: ManualUpdateBody = serde_json::from_str(&format!(
            r#"{{"member_id":"{member_id}","new_expiry":"2025-06-30T00:00:00Z"}}"#
        ))
        .unwrap();
        assert_eq!(snake.new_expiry, camel.new_expiry);
    }
}
