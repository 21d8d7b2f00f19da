use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("cannot {action} a request that is {from}")]
    InvalidTransition {
        action: &'static str,
        from: String,
    },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("you cannot book a seat on your own ride")]
    SelfBookingForbidden,
    #[error("this ride is restricted to {required} passengers")]
    GenderMismatch { required: String },
    #[error("no seats left on this ride")]
    SeatsUnavailable,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("temporary problem talking to storage, please retry: {0}")]
    Transient(String),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code, one per error kind.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::SelfBookingForbidden => "self_booking_forbidden",
            AppError::GenderMismatch { .. } => "gender_mismatch",
            AppError::SeatsUnavailable => "seats_unavailable",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::BadRequest(_) => "bad_request",
            AppError::Transient(_) => "transient_failure",
            AppError::Database(_) | AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidTransition { .. }
            | AppError::SeatsUnavailable
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_)
            | AppError::SelfBookingForbidden
            | AppError::GenderMismatch { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        // Clients see the per-kind message, except for internal errors
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(serde_json::json!({
            "code": self.code(),
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_distinct_code() {
        let errors = [
            AppError::InvalidTransition {
                action: "accept",
                from: "rejected".to_string(),
            },
            AppError::Unauthorized("no token".to_string()),
            AppError::Forbidden("not yours".to_string()),
            AppError::SelfBookingForbidden,
            AppError::GenderMismatch {
                required: "female".to_string(),
            },
            AppError::SeatsUnavailable,
            AppError::NotFound("ride".to_string()),
            AppError::Conflict("dup".to_string()),
            AppError::BadRequest("bad".to_string()),
            AppError::Transient("timeout".to_string()),
            AppError::Internal("boom".to_string()),
        ];

        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
