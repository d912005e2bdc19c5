use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::models::{
    access_code::AccessCode,
    attendance_event::{AttendanceAction, AttendanceEvent, NewAttendanceEvent},
    member::{Member, MembershipStatus},
};
use crate::services::access_codes::{self, CodeUsePolicy, PresentedCode};

#[derive(thiserror::Error, Debug)]
pub enum AttendanceError {
    #[error("Only gym owners and staff can issue attendance codes")]
    Forbidden,

    #[error("Account is not attached to a gym")]
    NoGymAssigned,

    #[error("Invalid attendance code")]
    InvalidCode,

    #[error("Attendance code has expired")]
    ExpiredCode,

    #[error("Attendance code has already been used")]
    CodeAlreadyUsed,

    #[error("Member not found")]
    MemberNotFound,

    #[error("Membership is not active")]
    MembershipInactive,

    #[error("Requested {requested} but the member's next action is {next}")]
    StateMismatch {
        requested: AttendanceAction,
        next: AttendanceAction,
    },

    #[error("Attendance was updated concurrently, please retry")]
    ConcurrentUpdate,

    #[error("No free numeric code available, please retry")]
    CodeSpaceExhausted,

    #[error("Secure random generator failed")]
    RandomnessUnavailable,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl AttendanceError {
    /// Stable machine-readable identifier for API clients
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::Forbidden => "forbidden",
            AttendanceError::NoGymAssigned => "no_gym_assigned",
            AttendanceError::InvalidCode => "invalid_code",
            AttendanceError::ExpiredCode => "expired_code",
            AttendanceError::CodeAlreadyUsed => "code_already_used",
            AttendanceError::MemberNotFound => "member_not_found",
            AttendanceError::MembershipInactive => "membership_inactive",
            AttendanceError::StateMismatch { .. } => "state_mismatch",
            AttendanceError::ConcurrentUpdate => "concurrent_update",
            AttendanceError::CodeSpaceExhausted => "code_space_exhausted",
            AttendanceError::RandomnessUnavailable => "internal_error",
            AttendanceError::DatabaseError(_) => "database_error",
        }
    }
}

/// Presence is derived from the latest attendance event, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    CheckedIn,
    CheckedOut,
}

impl PresenceState {
    /// No events means checked out.
    pub fn from_last_action(last: Option<AttendanceAction>) -> Self {
        match last {
            Some(AttendanceAction::CheckIn) => PresenceState::CheckedIn,
            Some(AttendanceAction::CheckOut) | None => PresenceState::CheckedOut,
        }
    }

    pub fn after(action: AttendanceAction) -> Self {
        Self::from_last_action(Some(action))
    }
}

/// The action the next toggle will record
pub fn next_action(last: Option<AttendanceAction>) -> AttendanceAction {
    match PresenceState::from_last_action(last) {
        PresenceState::CheckedIn => AttendanceAction::CheckOut,
        PresenceState::CheckedOut => AttendanceAction::CheckIn,
    }
}

/// A member may mark attendance while active and before their end date.
pub fn check_eligibility(member: &Member, now: DateTime<Utc>) -> Result<(), AttendanceError> {
    if member.membership_status != MembershipStatus::Active || now > member.end_date {
        return Err(AttendanceError::MembershipInactive);
    }
    Ok(())
}

/// Everything the toggle decision depends on, already loaded.
#[derive(Debug, Clone, Copy)]
pub struct ToggleContext<'a> {
    pub code: Option<&'a AccessCode>,
    pub member: Option<&'a Member>,
    pub last_action: Option<AttendanceAction>,
    pub requested_action: Option<AttendanceAction>,
    pub policy: CodeUsePolicy,
    pub now: DateTime<Utc>,
}

/// Decides which action a toggle records, or why it is refused.
///
/// Checks run in this order: code lifecycle, member existence, gym match,
/// member eligibility, then the caller's expected action.
pub fn decide_toggle(ctx: ToggleContext<'_>) -> Result<AttendanceAction, AttendanceError> {
    let code = ctx.code.ok_or(AttendanceError::InvalidCode)?;
    access_codes::validate_code(code, ctx.now, ctx.policy)?;

    let member = ctx.member.ok_or(AttendanceError::MemberNotFound)?;
    if member.gym_id != code.gym_id {
        return Err(AttendanceError::InvalidCode);
    }
    check_eligibility(member, ctx.now)?;

    let action = next_action(ctx.last_action);
    if let Some(requested) = ctx.requested_action {
        if requested != action {
            return Err(AttendanceError::StateMismatch {
                requested,
                next: action,
            });
        }
    }

    Ok(action)
}

#[derive(Debug, Clone)]
pub struct MarkAttendanceRequest {
    pub code: PresentedCode,
    pub member_id: Uuid,
    pub requested_action: Option<AttendanceAction>,
    pub device_info: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceOutcome {
    pub event: AttendanceEvent,
    pub resulting_state: PresenceState,
}

/// Toggles a member's presence using an access code
///
/// Runs in one transaction:
/// 1. Locks the access code and validates its window and consumption
/// 2. Locks the member row (per-member serialization point) and checks eligibility
/// 3. Reads the member's latest event and derives the next action
/// 4. Appends the new event linked to the previous one
/// 5. Consumes the code under the single-use policy
#[tracing::instrument(skip(pool, request), fields(member_id = %request.member_id))]
pub async fn mark_attendance(
    pool: &PgPool,
    policy: CodeUsePolicy,
    request: MarkAttendanceRequest,
) -> Result<AttendanceOutcome, AttendanceError> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();

    let code = match &request.code {
        PresentedCode::Token(value) => AccessCode::find_by_value_for_update(&mut tx, value).await?,
        PresentedCode::Numeric(digits) => {
            AccessCode::find_latest_by_numeric_for_update(&mut tx, digits, request.member_id)
                .await?
        }
    };

    let member = match &code {
        Some(_) => Member::find_by_id_for_update(&mut tx, request.member_id).await?,
        None => None,
    };

    let last_event = match &member {
        Some(m) => AttendanceEvent::latest_for_member(&mut tx, m.id).await?,
        None => None,
    };

    let decision = decide_toggle(ToggleContext {
        code: code.as_ref(),
        member: member.as_ref(),
        last_action: last_event.as_ref().map(|e| e.action),
        requested_action: request.requested_action,
        policy,
        now,
    });

    let action = match decision {
        Ok(action) => action,
        Err(e) => {
            tracing::warn!(error = %e, "Attendance attempt rejected");
            return Err(e);
        }
    };

    // decide_toggle only succeeds with both present
    let (Some(code), Some(member)) = (code, member) else {
        return Err(AttendanceError::InvalidCode);
    };

    let event = AttendanceEvent::append(
        &mut tx,
        NewAttendanceEvent {
            member_id: member.id,
            gym_id: member.gym_id,
            access_code_id: Some(code.id),
            action,
            previous_event_id: last_event.as_ref().map(|e| e.id),
            device_info: request.device_info,
            recorded_at: now,
        },
    )
    .await
    .map_err(|e| {
        if db::is_unique_violation(&e) {
            AttendanceError::ConcurrentUpdate
        } else {
            AttendanceError::DatabaseError(e)
        }
    })?;

    if action == AttendanceAction::CheckIn {
        Member::increment_visits(&mut tx, member.id).await?;
    }

    if policy == CodeUsePolicy::SingleUse
        && !AccessCode::mark_consumed(&mut tx, code.id, member.id, now).await?
    {
        return Err(AttendanceError::CodeAlreadyUsed);
    }

    tx.commit().await?;

    tracing::info!(
        event_id = %event.id,
        gym_id = %event.gym_id,
        action = %event.action,
        "Attendance recorded"
    );

    Ok(AttendanceOutcome {
        resulting_state: PresenceState::after(event.action),
        event,
    })
}

/// Current presence of a member plus the event it was derived from
pub async fn current_presence(
    pool: &PgPool,
    member_id: Uuid,
) -> Result<(PresenceState, Option<AttendanceEvent>), sqlx::Error> {
    let last = AttendanceEvent::find_latest(pool, member_id).await?;
    let state = PresenceState::from_last_action(last.as_ref().map(|e| e.action));
    Ok((state, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn active_member(gym_id: Uuid, now: DateTime<Utc>) -> Member {
        Member {
            id: Uuid::new_v4(),
            user_id: None,
            gym_id,
            plan_id: Uuid::new_v4(),
            name: "John Member".to_string(),
            email: Some("member@example.com".to_string()),
            phone: None,
            address: None,
            emergency_contact: None,
            membership_status: MembershipStatus::Active,
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(29),
            total_visits: 0,
            auto_renewal: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn code_issued_at(gym_id: Uuid, issued_at: DateTime<Utc>, ttl: Duration) -> AccessCode {
        AccessCode {
            id: Uuid::new_v4(),
            gym_id,
            code_value: "0f".repeat(32),
            numeric_code: "123456".to_string(),
            issued_by: Uuid::new_v4(),
            issued_at,
            expires_at: issued_at + ttl,
            consumed_at: None,
            consumed_by: None,
        }
    }

    fn ctx<'a>(
        code: &'a AccessCode,
        member: &'a Member,
        last_action: Option<AttendanceAction>,
        now: DateTime<Utc>,
    ) -> ToggleContext<'a> {
        ToggleContext {
            code: Some(code),
            member: Some(member),
            last_action,
            requested_action: None,
            policy: CodeUsePolicy::SingleUse,
            now,
        }
    }

    #[test]
    fn test_first_toggle_is_check_in() {
        let now = Utc::now();
        let gym_id = Uuid::new_v4();
        let member = active_member(gym_id, now);
        let code = code_issued_at(gym_id, now, Duration::minutes(5));

        let action = decide_toggle(ctx(&code, &member, None, now)).unwrap();

        assert_eq!(action, AttendanceAction::CheckIn);
    }

    #[test]
    fn test_toggle_alternates_strictly() {
        let now = Utc::now();
        let gym_id = Uuid::new_v4();
        let member = active_member(gym_id, now);

        let mut history: Vec<AttendanceAction> = Vec::new();
        for i in 0..6 {
            let code = code_issued_at(gym_id, now + Duration::minutes(i), Duration::minutes(5));
            let at = code.issued_at + Duration::seconds(10);
            let action = decide_toggle(ctx(&code, &member, history.last().copied(), at)).unwrap();
            history.push(action);
        }

        assert_eq!(history[0], AttendanceAction::CheckIn);
        for pair in history.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn test_expired_code_rejected_regardless_of_consumption() {
        let now = Utc::now();
        let gym_id = Uuid::new_v4();
        let member = active_member(gym_id, now);
        let mut code = code_issued_at(gym_id, now - Duration::minutes(10), Duration::minutes(5));

        let result = decide_toggle(ctx(&code, &member, None, now));
        assert!(matches!(result, Err(AttendanceError::ExpiredCode)));

        code.consumed_at = Some(now - Duration::minutes(9));
        code.consumed_by = Some(member.id);
        let result = decide_toggle(ctx(&code, &member, None, now));
        assert!(matches!(result, Err(AttendanceError::ExpiredCode)));
    }

    #[test]
    fn test_code_expires_exactly_at_expiry() {
        let now = Utc::now();
        let gym_id = Uuid::new_v4();
        let member = active_member(gym_id, now);
        let code = code_issued_at(gym_id, now - Duration::minutes(5), Duration::minutes(5));

        let result = decide_toggle(ctx(&code, &member, None, now));

        assert!(matches!(result, Err(AttendanceError::ExpiredCode)));
    }

    #[test]
    fn test_consumed_single_use_code_rejected() {
        let now = Utc::now();
        let gym_id = Uuid::new_v4();
        let member = active_member(gym_id, now);
        let mut code = code_issued_at(gym_id, now, Duration::minutes(5));
        code.consumed_at = Some(now);

        let result = decide_toggle(ctx(&code, &member, None, now + Duration::seconds(30)));

        assert!(matches!(result, Err(AttendanceError::CodeAlreadyUsed)));
    }

    #[test]
    fn test_consumed_code_accepted_when_reusable() {
        let now = Utc::now();
        let gym_id = Uuid::new_v4();
        let member = active_member(gym_id, now);
        let mut code = code_issued_at(gym_id, now, Duration::minutes(5));
        code.consumed_at = Some(now);

        let mut context = ctx(&code, &member, Some(AttendanceAction::CheckIn), now);
        context.policy = CodeUsePolicy::ReusableUntilExpiry;

        assert_eq!(decide_toggle(context).unwrap(), AttendanceAction::CheckOut);
    }

    #[test]
    fn test_check_in_then_check_out_with_fresh_code() {
        let t0 = Utc::now();
        let gym_id = Uuid::new_v4();
        let member = active_member(gym_id, t0);

        let c1 = code_issued_at(gym_id, t0, Duration::minutes(5));
        let first = decide_toggle(ctx(&c1, &member, None, t0 + Duration::minutes(1))).unwrap();
        assert_eq!(first, AttendanceAction::CheckIn);

        // C1 is no longer usable at T0+6min
        let stale = decide_toggle(ctx(&c1, &member, Some(first), t0 + Duration::minutes(6)));
        assert!(matches!(stale, Err(AttendanceError::ExpiredCode)));

        let c2 = code_issued_at(gym_id, t0 + Duration::minutes(6), Duration::minutes(5));
        let second =
            decide_toggle(ctx(&c2, &member, Some(first), t0 + Duration::minutes(6))).unwrap();
        assert_eq!(second, AttendanceAction::CheckOut);
    }

    #[test]
    fn test_expired_membership_rejected() {
        let now = Utc::now();
        let gym_id = Uuid::new_v4();
        let mut member = active_member(gym_id, now);
        member.membership_status = MembershipStatus::Expired;
        let code = code_issued_at(gym_id, now, Duration::minutes(5));

        let result = decide_toggle(ctx(&code, &member, None, now));

        assert!(matches!(result, Err(AttendanceError::MembershipInactive)));
    }

    #[test]
    fn test_lapsed_end_date_rejected() {
        let now = Utc::now();
        let gym_id = Uuid::new_v4();
        let mut member = active_member(gym_id, now);
        member.end_date = now - Duration::hours(1);
        let code = code_issued_at(gym_id, now, Duration::minutes(5));

        let result = decide_toggle(ctx(&code, &member, None, now));

        assert!(matches!(result, Err(AttendanceError::MembershipInactive)));
    }

    #[test]
    fn test_missing_code_and_member() {
        let now = Utc::now();
        let gym_id = Uuid::new_v4();
        let member = active_member(gym_id, now);
        let code = code_issued_at(gym_id, now, Duration::minutes(5));

        let mut no_code = ctx(&code, &member, None, now);
        no_code.code = None;
        assert!(matches!(decide_toggle(no_code), Err(AttendanceError::InvalidCode)));

        let mut no_member = ctx(&code, &member, None, now);
        no_member.member = None;
        assert!(matches!(
            decide_toggle(no_member),
            Err(AttendanceError::MemberNotFound)
        ));
    }

    #[test]
    fn test_code_from_other_gym_rejected() {
        let now = Utc::now();
        let member = active_member(Uuid::new_v4(), now);
        let code = code_issued_at(Uuid::new_v4(), now, Duration::minutes(5));

        let result = decide_toggle(ctx(&code, &member, None, now));

        assert!(matches!(result, Err(AttendanceError::InvalidCode)));
    }

    #[test]
    fn test_requested_action_must_match() {
        let now = Utc::now();
        let gym_id = Uuid::new_v4();
        let member = active_member(gym_id, now);
        let code = code_issued_at(gym_id, now, Duration::minutes(5));

        let mut context = ctx(&code, &member, Some(AttendanceAction::CheckIn), now);
        context.requested_action = Some(AttendanceAction::CheckIn);

        match decide_toggle(context) {
            Err(AttendanceError::StateMismatch { requested, next }) => {
                assert_eq!(requested, AttendanceAction::CheckIn);
                assert_eq!(next, AttendanceAction::CheckOut);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_presence_derivation() {
        assert_eq!(PresenceState::from_last_action(None), PresenceState::CheckedOut);
        assert_eq!(
            PresenceState::from_last_action(Some(AttendanceAction::CheckIn)),
            PresenceState::CheckedIn
        );
        assert_eq!(
            serde_json::to_string(&PresenceState::CheckedIn).unwrap(),
            r#""checked_in""#
        );
    }
}
