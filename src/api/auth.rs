use axum::{extract::State, http::StatusCode, routing::{get, post}, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::{
    auth::CurrentUser,
    session::{AppState, SESSION_KEY_LOGGED_IN_AT, SESSION_KEY_USER_ID},
};
use crate::db;
use crate::error::{AppError, Result};
use crate::models::{
    gym::Gym,
    member::{CreateMemberData, Member},
    plan::Plan,
    user::{CreateUserData, User, UserRole},
};
use crate::services::{password, subscriptions};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: Option<String>,
    /// `owner` (default) or `staff`
    pub role: Option<UserRole>,
    /// Required for staff accounts
    pub gym_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterMemberRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub gym_id: Uuid,
    pub plan_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member: Option<Member>,
}

fn validate_account_fields(email: &str, password: &str, name: &str) -> Result<()> {
    let email = email.trim();
    let well_formed = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
        .unwrap_or(false);
    if !well_formed {
        return Err(AppError::Validation("A valid email is required".to_string()));
    }
    if name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    password::validate_password(password)?;
    Ok(())
}

fn map_duplicate_email(e: sqlx::Error) -> AppError {
    if db::is_unique_violation(&e) {
        AppError::Conflict("An account with this email already exists".to_string())
    } else {
        AppError::Database(e)
    }
}

async fn start_session(session: &Session, user_id: Uuid) -> Result<()> {
    // New id on login so a pre-login cookie cannot be reused
    session
        .cycle_id()
        .await
        .map_err(|e| AppError::Session(e.to_string()))?;
    session
        .insert(SESSION_KEY_USER_ID, user_id)
        .await
        .map_err(|e| AppError::Session(e.to_string()))?;
    session
        .insert(SESSION_KEY_LOGGED_IN_AT, Utc::now().to_rfc3339())
        .await
        .map_err(|e| AppError::Session(e.to_string()))?;
    Ok(())
}

/// Registers a gym owner or staff account
async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    validate_account_fields(&req.email, &req.password, &req.name)?;

    let role = req.role.unwrap_or(UserRole::Owner);
    let gym_id = match role {
        UserRole::Owner => None,
        UserRole::Staff => {
            let gym_id = req
                .gym_id
                .ok_or_else(|| AppError::Validation("Staff accounts need a gym_id".to_string()))?;
            Gym::find_by_id(&state.pool, gym_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Gym not found".to_string()))?;
            Some(gym_id)
        }
        UserRole::Member => {
            return Err(AppError::Validation(
                "Members register through /api/auth/register-member".to_string(),
            ))
        }
    };

    let user = User::create(
        &state.pool,
        CreateUserData {
            email: req.email,
            password_hash: password::hash_password(&req.password)?,
            name: req.name.trim().to_string(),
            phone: req.phone,
            role,
            gym_id,
        },
    )
    .await
    .map_err(map_duplicate_email)?;

    start_session(&session, user.id).await?;

    tracing::info!(user_id = %user.id, role = ?user.role, "Account registered");

    Ok((StatusCode::CREATED, Json(AuthResponse { user, member: None })))
}

/// Registers a member account together with its membership on a plan
async fn register_member(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<RegisterMemberRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    validate_account_fields(&req.email, &req.password, &req.name)?;

    Gym::find_by_id(&state.pool, req.gym_id)
        .await?
        .filter(|g| g.is_active)
        .ok_or_else(|| AppError::NotFound("Gym not found".to_string()))?;
    let plan =
        subscriptions::ensure_plan_available(Plan::find_by_id(&state.pool, req.plan_id).await?, req.gym_id)?;

    let password_hash = password::hash_password(&req.password)?;
    let (start_date, end_date) = subscriptions::membership_window(&plan, Utc::now());

    let mut tx = state.pool.begin().await?;

    let user = User::create_in_tx(
        &mut tx,
        CreateUserData {
            email: req.email.clone(),
            password_hash,
            name: req.name.trim().to_string(),
            phone: req.phone.clone(),
            role: UserRole::Member,
            gym_id: Some(req.gym_id),
        },
    )
    .await
    .map_err(map_duplicate_email)?;

    let member = Member::create_in_tx(
        &mut tx,
        CreateMemberData {
            user_id: Some(user.id),
            gym_id: req.gym_id,
            plan_id: plan.id,
            name: user.name.clone(),
            email: Some(user.email.clone()),
            phone: req.phone,
            address: req.address,
            emergency_contact: req.emergency_contact,
            start_date,
            end_date,
            auto_renewal: plan.auto_renewal,
        },
    )
    .await?;

    tx.commit().await?;

    start_session(&session, user.id).await?;

    tracing::info!(
        user_id = %user.id,
        member_id = %member.id,
        gym_id = %member.gym_id,
        "Member registered"
    );

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user,
            member: Some(member),
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let user = User::find_by_email(&state.pool, &req.email)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        tracing::warn!(user_id = %user.id, "Failed login attempt");
        return Err(AppError::Unauthorized);
    }

    start_session(&session, user.id).await?;

    let member = match user.role {
        UserRole::Member => Member::find_by_user_id(&state.pool, user.id).await?,
        _ => None,
    };

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(AuthResponse { user, member }))
}

async fn logout(session: Session) -> Result<StatusCode> {
    session
        .flush()
        .await
        .map_err(|e| AppError::Session(e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn me(State(state): State<AppState>, current: CurrentUser) -> Result<Json<AuthResponse>> {
    let member = match current.0.role {
        UserRole::Member => Member::find_by_user_id(&state.pool, current.id()).await?,
        _ => None,
    };

    Ok(Json(AuthResponse {
        user: current.0,
        member,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/register-member", post(register_member))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}
