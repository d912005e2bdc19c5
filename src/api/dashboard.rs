use axum::{extract::State, routing::get, Json, Router};
use chrono::{Duration, Utc};
use serde::Serialize;

use crate::api::middleware::{auth::CurrentUser, session::AppState};
use crate::error::Result;
use crate::models::{
    attendance_event::{AttendanceAction, AttendanceEvent},
    member::{Member, MembershipStatus},
};
use crate::services::reporting::{self, EXPIRING_SOON_DAYS};

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_members: i64,
    pub active_members: i64,
    pub today_checkins: i64,
    pub currently_in: usize,
    pub expiring_soon: i64,
}

async fn stats(State(state): State<AppState>, current: CurrentUser) -> Result<Json<DashboardStats>> {
    let gym_id = current.require_staff()?;
    let now = Utc::now();
    let (day_start, day_end) = reporting::day_bounds(now);

    let total_members = Member::count_by_gym(&state.pool, gym_id, None).await?;
    let active_members =
        Member::count_by_gym(&state.pool, gym_id, Some(MembershipStatus::Active)).await?;
    let today_checkins = AttendanceEvent::count_between(
        &state.pool,
        gym_id,
        AttendanceAction::CheckIn,
        day_start,
        day_end,
    )
    .await?;
    let currently_in = AttendanceEvent::list_present(&state.pool, gym_id).await?.len();
    let expiring_soon = Member::count_expiring(
        &state.pool,
        gym_id,
        now,
        now + Duration::days(EXPIRING_SOON_DAYS),
    )
    .await?;

    Ok(Json(DashboardStats {
        total_members,
        active_members,
        today_checkins,
        currently_in,
        expiring_soon,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/dashboard/stats", get(stats))
}
