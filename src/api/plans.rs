use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::middleware::{auth::CurrentUser, session::AppState};
use crate::error::{AppError, Result};
use crate::models::plan::{CreatePlanData, Plan, PlanType, UpdatePlanData};

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub duration_days: i32,
    #[serde(default)]
    pub plan_type: PlanType,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub auto_renewal: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlanRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub duration_days: Option<i32>,
    pub plan_type: Option<PlanType>,
    pub features: Option<Vec<String>>,
    pub auto_renewal: Option<bool>,
}

fn validate_price(price: f64) -> Result<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::Validation("Price must be zero or more".to_string()));
    }
    Ok(())
}

fn validate_duration(duration_days: i32) -> Result<()> {
    if duration_days <= 0 {
        return Err(AppError::Validation(
            "Duration must be at least one day".to_string(),
        ));
    }
    Ok(())
}

/// Loads a plan of the caller's gym
async fn load_own_plan(state: &AppState, gym_id: Uuid, id: Uuid) -> Result<Plan> {
    Plan::find_by_id(&state.pool, id)
        .await?
        .filter(|p| p.gym_id == gym_id)
        .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))
}

async fn list_plans(State(state): State<AppState>, current: CurrentUser) -> Result<Json<Vec<Plan>>> {
    let gym_id = current.require_staff()?;
    Ok(Json(Plan::list_by_gym(&state.pool, gym_id, false).await?))
}

/// Active plans of any gym, for member sign-up
async fn list_gym_plans(
    State(state): State<AppState>,
    Path(gym_id): Path<Uuid>,
) -> Result<Json<Vec<Plan>>> {
    Ok(Json(Plan::list_by_gym(&state.pool, gym_id, true).await?))
}

async fn create_plan(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<CreatePlanRequest>,
) -> Result<(StatusCode, Json<Plan>)> {
    let gym_id = current.require_staff()?;

    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Plan name is required".to_string()));
    }
    validate_price(req.price)?;
    validate_duration(req.duration_days)?;

    let plan = Plan::create(
        &state.pool,
        CreatePlanData {
            gym_id,
            name: req.name.trim().to_string(),
            description: req.description,
            price: req.price,
            duration_days: req.duration_days,
            plan_type: req.plan_type,
            features: req.features,
            auto_renewal: req.auto_renewal,
        },
    )
    .await?;

    tracing::info!(plan_id = %plan.id, gym_id = %gym_id, "Plan created");

    Ok((StatusCode::CREATED, Json(plan)))
}

async fn get_plan(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Plan>> {
    let gym_id = current.require_staff()?;
    Ok(Json(load_own_plan(&state, gym_id, id).await?))
}

async fn update_plan(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePlanRequest>,
) -> Result<Json<Plan>> {
    let gym_id = current.require_staff()?;
    load_own_plan(&state, gym_id, id).await?;

    if let Some(price) = req.price {
        validate_price(price)?;
    }
    if let Some(duration_days) = req.duration_days {
        validate_duration(duration_days)?;
    }

    let plan = Plan::update(
        &state.pool,
        id,
        UpdatePlanData {
            name: req.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            description: req.description,
            price: req.price,
            duration_days: req.duration_days,
            plan_type: req.plan_type,
            features: req.features,
            auto_renewal: req.auto_renewal,
        },
    )
    .await?;

    tracing::info!(plan_id = %plan.id, "Plan updated");

    Ok(Json(plan))
}

/// Deactivates the plan; members already on it keep it
async fn delete_plan(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let gym_id = current.require_staff()?;
    load_own_plan(&state, gym_id, id).await?;

    Plan::deactivate(&state.pool, id).await?;

    tracing::info!(plan_id = %id, "Plan deactivated");

    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/plans", get(list_plans).post(create_plan))
        .route("/api/plans/gym/:gym_id", get(list_gym_plans))
        .route(
            "/api/plans/:id",
            get(get_plan).put(update_plan).delete(delete_plan),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_field_validation() {
        assert!(validate_price(0.0).is_ok());
        assert!(validate_price(-1.0).is_err());
        assert!(validate_price(f64::NAN).is_err());
        assert!(validate_duration(30).is_ok());
        assert!(validate_duration(0).is_err());
    }

    #[test]
    fn test_create_request_defaults() {
        let req: CreatePlanRequest =
            serde_json::from_str(r#"{"name":"Monthly","price":1500,"duration_days":30}"#).unwrap();
        assert_eq!(req.plan_type, PlanType::Basic);
        assert!(req.features.is_empty());
        assert!(!req.auto_renewal);
    }
}
