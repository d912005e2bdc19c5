use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::{
    attendance::AttendanceError, password::PasswordError,
    payment_settings::PaymentSettingsError, qr_generator::QrGenerationError,
    reporting::ReportingError, subscriptions::SubscriptionError,
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Attendance(#[from] AttendanceError),

    #[error(transparent)]
    PaymentSettings(#[from] PaymentSettingsError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Qr(#[from] QrGenerationError),

    #[error(transparent)]
    Reporting(#[from] ReportingError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            AppError::Attendance(e) => (attendance_status(e), e.code()),
            AppError::PaymentSettings(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::Password(PasswordError::TooShort) => {
                (StatusCode::BAD_REQUEST, "validation_error")
            }
            AppError::Password(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::Qr(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::Reporting(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::Subscription(e) => match e {
                SubscriptionError::PlanNotFound => (StatusCode::NOT_FOUND, "not_found"),
                SubscriptionError::PlanUnavailable => (StatusCode::BAD_REQUEST, "validation_error"),
                SubscriptionError::MemberNotFound => (StatusCode::NOT_FOUND, "member_not_found"),
                SubscriptionError::DatabaseError(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            },
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::Session(_) => (StatusCode::INTERNAL_SERVER_ERROR, "session_error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

fn attendance_status(error: &AttendanceError) -> StatusCode {
    match error {
        AttendanceError::Forbidden | AttendanceError::MembershipInactive => StatusCode::FORBIDDEN,
        AttendanceError::InvalidCode | AttendanceError::NoGymAssigned => StatusCode::BAD_REQUEST,
        AttendanceError::ExpiredCode => StatusCode::GONE,
        AttendanceError::CodeAlreadyUsed
        | AttendanceError::StateMismatch { .. }
        | AttendanceError::ConcurrentUpdate => StatusCode::CONFLICT,
        AttendanceError::MemberNotFound => StatusCode::NOT_FOUND,
        AttendanceError::CodeSpaceExhausted => StatusCode::SERVICE_UNAVAILABLE,
        AttendanceError::RandomnessUnavailable | AttendanceError::DatabaseError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Server-side failures are logged in full and reported generically
        let message = if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(error = ?self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
