use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::middleware::{auth::CurrentUser, session::AppState};
use crate::error::{AppError, Result};
use crate::models::{
    gym::{CreateGymData, Gym},
    user::UserRole,
};
use crate::services::payment_settings;

#[derive(Debug, Deserialize)]
pub struct CreateGymRequest {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePaymentSettingsRequest {
    pub upi_id: Option<String>,
    pub qr_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentSettingsResponse {
    pub gym_id: Uuid,
    pub gym_name: String,
    pub upi_id: Option<String>,
    pub qr_code: Option<String>,
}

impl From<Gym> for PaymentSettingsResponse {
    fn from(gym: Gym) -> Self {
        Self {
            gym_id: gym.id,
            gym_name: gym.name,
            upi_id: gym.upi_id,
            qr_code: gym.payment_qr_code,
        }
    }
}

async fn load_gym(state: &AppState, gym_id: Uuid) -> Result<Gym> {
    Gym::find_by_id(&state.pool, gym_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Gym not found".to_string()))
}

/// Creates a gym for an owner who does not have one yet
async fn create_gym(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<CreateGymRequest>,
) -> Result<(StatusCode, Json<Gym>)> {
    if current.0.role != UserRole::Owner {
        return Err(AppError::Forbidden("Only gym owners can create a gym".to_string()));
    }
    if current.0.gym_id.is_some() {
        return Err(AppError::Conflict("Account already owns a gym".to_string()));
    }
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Gym name is required".to_string()));
    }

    let gym = Gym::create(
        &state.pool,
        CreateGymData {
            owner_id: current.id(),
            name: req.name.trim().to_string(),
            address: req.address,
            phone: req.phone,
            email: req.email,
            description: req.description,
        },
    )
    .await?;

    tracing::info!(gym_id = %gym.id, owner_id = %gym.owner_id, "Gym created");

    Ok((StatusCode::CREATED, Json(gym)))
}

async fn list_gyms(State(state): State<AppState>) -> Result<Json<Vec<Gym>>> {
    Ok(Json(Gym::list_active(&state.pool).await?))
}

async fn my_gym(State(state): State<AppState>, current: CurrentUser) -> Result<Json<Gym>> {
    let gym_id = current.require_staff()?;
    Ok(Json(load_gym(&state, gym_id).await?))
}

async fn get_payment_settings(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<PaymentSettingsResponse>> {
    let gym_id = current.require_staff()?;
    Ok(Json(load_gym(&state, gym_id).await?.into()))
}

async fn update_payment_settings(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<UpdatePaymentSettingsRequest>,
) -> Result<Json<PaymentSettingsResponse>> {
    let gym_id = current.require_owner()?;

    let update = payment_settings::build_update(req.upi_id.as_deref(), req.qr_code.as_deref())?;
    let gym = Gym::update_payment_settings(&state.pool, gym_id, update).await?;

    tracing::info!(
        gym_id = %gym.id,
        has_upi_id = gym.upi_id.is_some(),
        has_qr_code = gym.payment_qr_code.is_some(),
        "Payment settings updated"
    );

    Ok(Json(gym.into()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/gyms", post(create_gym))
        .route("/api/gyms/all", get(list_gyms))
        .route("/api/gyms/mine", get(my_gym))
        .route(
            "/api/gym/payment-settings",
            get(get_payment_settings).patch(update_payment_settings),
        )
}
