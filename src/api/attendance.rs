use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::middleware::{auth::CurrentUser, session::AppState};
use crate::error::{AppError, Result};
use crate::models::{
    access_code::AccessCode,
    attendance_event::{AttendanceAction, AttendanceEvent, PresentMember},
    member::Member,
};
use crate::services::{
    access_codes::{self, PresentedCode},
    attendance::{self, AttendanceOutcome, MarkAttendanceRequest, PresenceState},
    qr_generator::{self, AttendanceQrPayload},
    reporting::{self, MonthCalendar},
};

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 200;

#[derive(Debug, Serialize)]
pub struct IssuedCodeResponse {
    pub code_value: String,
    pub numeric_code: String,
    /// Signed payload to render as a QR code
    pub qr_code_data: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    /// QR payload, bare token or 6-digit code
    #[serde(alias = "code_value", alias = "qr_code")]
    pub code: String,
    pub member_id: Uuid,
    #[serde(alias = "action")]
    pub expected_action: Option<AttendanceAction>,
    pub device_info: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SelfMarkRequest {
    pub qr_code: Option<String>,
    pub numeric_code: Option<String>,
    pub device_info: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MarkAttendanceResponse {
    pub success: bool,
    pub action_taken: AttendanceAction,
    pub timestamp: DateTime<Utc>,
    pub resulting_state: PresenceState,
    pub event: AttendanceEvent,
    pub message: String,
}

impl From<AttendanceOutcome> for MarkAttendanceResponse {
    fn from(outcome: AttendanceOutcome) -> Self {
        let message = match outcome.event.action {
            AttendanceAction::CheckIn => "Checked in successfully",
            AttendanceAction::CheckOut => "Checked out successfully",
        };
        Self {
            success: true,
            action_taken: outcome.event.action,
            timestamp: outcome.event.recorded_at,
            resulting_state: outcome.resulting_state,
            event: outcome.event,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PresenceResponse {
    pub member_id: Uuid,
    pub status: PresenceState,
    pub last_action: Option<AttendanceAction>,
    pub last_recorded_at: Option<DateTime<Utc>>,
    pub next_action: AttendanceAction,
}

impl PresenceResponse {
    fn new(member_id: Uuid, status: PresenceState, last: Option<&AttendanceEvent>) -> Self {
        let last_action = last.map(|e| e.action);
        Self {
            member_id,
            status,
            last_action,
            last_recorded_at: last.map(|e| e.recorded_at),
            next_action: attendance::next_action(last_action),
        }
    }
}

/// `/last` also carries the camelCase `lastAction` older clients read
#[derive(Debug, Serialize)]
pub struct LastActionResponse {
    #[serde(flatten)]
    pub presence: PresenceResponse,
    #[serde(rename = "lastAction")]
    pub last_action_compat: Option<AttendanceAction>,
}

impl From<PresenceResponse> for LastActionResponse {
    fn from(presence: PresenceResponse) -> Self {
        Self {
            last_action_compat: presence.last_action,
            presence,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LastQuery {
    #[serde(rename = "memberId", alias = "member_id")]
    pub member_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub member_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LiveUpdates {
    pub present: Vec<PresentMember>,
    pub currently_in: usize,
    pub today_check_ins: i64,
    pub today_check_outs: i64,
    pub generated_at: DateTime<Utc>,
}

fn history_limit(requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

async fn issue(state: &AppState, current: &CurrentUser) -> Result<(AccessCode, String)> {
    let code = access_codes::issue_code(&state.pool, &current.0, state.config.access_code_ttl()).await?;
    let qr_code_data = AttendanceQrPayload::for_code(&code)
        .encode_signed(state.config.qr_signing_key.expose_secret().as_bytes())?;
    Ok((code, qr_code_data))
}

/// Issues a fresh access code for the front desk
async fn issue_code(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<IssuedCodeResponse>> {
    let (code, qr_code_data) = issue(&state, &current).await?;

    Ok(Json(IssuedCodeResponse {
        code_value: code.code_value,
        numeric_code: code.numeric_code,
        qr_code_data,
        issued_at: code.issued_at,
        expires_at: code.expires_at,
    }))
}

/// Issues a fresh access code rendered as an SVG QR image
async fn issue_code_svg(State(state): State<AppState>, current: CurrentUser) -> Result<Response> {
    let (_, qr_code_data) = issue(&state, &current).await?;
    let svg = qr_generator::generate_qr_svg(&qr_code_data)?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/svg+xml"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        svg,
    )
        .into_response())
}

fn parse_code(state: &AppState, raw: &str) -> Result<PresentedCode> {
    Ok(PresentedCode::parse(
        raw,
        state.config.qr_signing_key.expose_secret().as_bytes(),
    )?)
}

/// Marks attendance for a member with a presented code.
/// Members may only mark themselves; staff may mark members of their gym.
async fn scan(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<ScanRequest>,
) -> Result<Json<MarkAttendanceResponse>> {
    if let Some(member) = Member::find_by_id(&state.pool, req.member_id).await? {
        current.ensure_can_access(&member)?;
    } else if !current.0.role.is_gym_staff() {
        return Err(AppError::Forbidden("Not allowed to access this member".to_string()));
    }

    let outcome = attendance::mark_attendance(
        &state.pool,
        state.config.code_use_policy(),
        MarkAttendanceRequest {
            code: parse_code(&state, &req.code)?,
            member_id: req.member_id,
            requested_action: req.expected_action,
            device_info: req.device_info,
        },
    )
    .await?;

    Ok(Json(outcome.into()))
}

/// Marks the logged-in member's own attendance
async fn mark_self(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<SelfMarkRequest>,
) -> Result<Json<MarkAttendanceResponse>> {
    let member = current.member_record(&state.pool).await?;

    let raw = req
        .qr_code
        .as_deref()
        .or(req.numeric_code.as_deref())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::Validation("qr_code or numeric_code is required".to_string()))?;

    let outcome = attendance::mark_attendance(
        &state.pool,
        state.config.code_use_policy(),
        MarkAttendanceRequest {
            code: parse_code(&state, raw)?,
            member_id: member.id,
            requested_action: None,
            device_info: req.device_info,
        },
    )
    .await?;

    Ok(Json(outcome.into()))
}

async fn my_status(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<PresenceResponse>> {
    let member = current.member_record(&state.pool).await?;
    let (status, last) = attendance::current_presence(&state.pool, member.id).await?;
    Ok(Json(PresenceResponse::new(member.id, status, last.as_ref())))
}

async fn last_action(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<LastQuery>,
) -> Result<Json<LastActionResponse>> {
    let member = Member::find_by_id(&state.pool, query.member_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?;
    current.ensure_can_access(&member)?;

    let (status, last) = attendance::current_presence(&state.pool, member.id).await?;
    Ok(Json(
        PresenceResponse::new(member.id, status, last.as_ref()).into(),
    ))
}

async fn history(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<AttendanceEvent>>> {
    let member = match query.member_id {
        Some(id) => {
            let member = Member::find_by_id(&state.pool, id)
                .await?
                .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?;
            current.ensure_can_access(&member)?;
            member
        }
        None => current.member_record(&state.pool).await?,
    };

    let events =
        AttendanceEvent::list_by_member(&state.pool, member.id, history_limit(query.limit)).await?;
    Ok(Json(events))
}

/// Who is in the gym right now, plus today's totals
async fn live_updates(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<LiveUpdates>> {
    let gym_id = current.require_staff()?;
    let now = Utc::now();
    let (day_start, day_end) = reporting::day_bounds(now);

    let present = AttendanceEvent::list_present(&state.pool, gym_id).await?;
    let today_check_ins = AttendanceEvent::count_between(
        &state.pool,
        gym_id,
        AttendanceAction::CheckIn,
        day_start,
        day_end,
    )
    .await?;
    let today_check_outs = AttendanceEvent::count_between(
        &state.pool,
        gym_id,
        AttendanceAction::CheckOut,
        day_start,
        day_end,
    )
    .await?;

    Ok(Json(LiveUpdates {
        currently_in: present.len(),
        present,
        today_check_ins,
        today_check_outs,
        generated_at: now,
    }))
}

async fn calendar(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((year, month)): Path<(i32, u32)>,
) -> Result<Json<MonthCalendar>> {
    let gym_id = current.require_staff()?;
    let (from, to) = reporting::month_bounds(year, month)?;

    let rows = AttendanceEvent::daily_totals(&state.pool, gym_id, from, to).await?;
    Ok(Json(reporting::build_month_calendar(year, month, &rows)?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/attendance", post(scan))
        .route("/api/attendance/scan", post(scan))
        .route("/api/attendance/mark", post(mark_self))
        .route("/api/attendance/qr-code", get(issue_code))
        .route("/api/attendance/qr-code/svg", get(issue_code_svg))
        .route("/api/attendance/my-status", get(my_status))
        .route("/api/attendance/last", get(last_action))
        .route("/api/attendance/history", get(history))
        .route("/api/attendance/live-updates", get(live_updates))
        .route("/api/attendance/calendar/:year/:month", get(calendar))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_limit_is_clamped() {
        assert_eq!(history_limit(None), DEFAULT_HISTORY_LIMIT);
        assert_eq!(history_limit(Some(0)), 1);
        assert_eq!(history_limit(Some(10_000)), MAX_HISTORY_LIMIT);
    }

    #[test]
    fn test_scan_request_shape() {
        let member_id = Uuid::new_v4();
        let req: ScanRequest = serde_json::from_str(&format!(
            r#"{{"code":"123456","member_id":"{member_id}","expected_action":"check-out"}}"#
        ))
        .unwrap();
        assert_eq!(req.expected_action, Some(AttendanceAction::CheckOut));
        assert!(req.device_info.is_none());
    }

    #[test]
    fn test_scan_request_accepts_client_field_names() {
        let member_id = Uuid::new_v4();

        let req: ScanRequest = serde_json::from_str(&format!(
            r#"{{"member_id":"{member_id}","qr_code":"123456","timestamp":"2024-05-17T10:00:00Z","action":"check-in"}}"#
        ))
        .unwrap();
        assert_eq!(req.code, "123456");
        assert_eq!(req.member_id, member_id);
        assert_eq!(req.expected_action, Some(AttendanceAction::CheckIn));

        let req: ScanRequest = serde_json::from_str(&format!(
            r#"{{"member_id":"{member_id}","code_value":"123456"}}"#
        ))
        .unwrap();
        assert_eq!(req.code, "123456");
        assert!(req.expected_action.is_none());
    }

    #[test]
    fn test_last_action_response_has_camel_case_field() {
        let response: LastActionResponse =
            PresenceResponse::new(Uuid::new_v4(), PresenceState::CheckedOut, None).into();
        let json = serde_json::to_value(&response).unwrap();

        assert!(json["lastAction"].is_null());
        assert_eq!(json["status"], "checked_out");
        assert_eq!(json["next_action"], "check-in");
    }

    #[test]
    fn test_presence_response_next_action() {
        let member_id = Uuid::new_v4();
        let response = PresenceResponse::new(member_id, PresenceState::CheckedOut, None);
        assert_eq!(response.next_action, AttendanceAction::CheckIn);
        assert!(response.last_action.is_none());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "checked_out");
        assert_eq!(json["next_action"], "check-in");
    }
}
