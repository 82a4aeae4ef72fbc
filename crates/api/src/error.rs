//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use payflow_billing::BillingError;
use serde_json::json;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authentication errors
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Authentication required")]
    Unauthorized,
    #[error("Insufficient permissions")]
    Forbidden,

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),

    // Resource errors
    #[error("Resource not found")]
    NotFound,

    // Upstream payment provider errors
    #[error("Payment provider error: {0}")]
    Provider(String),
    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    // Internal errors
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Authentication
            ApiError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", self.to_string()),

            // Validation
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),

            // Resources
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),

            // Providers
            ApiError::Provider(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PAYMENT_PROVIDER_ERROR",
                msg.clone(),
            ),
            ApiError::ProviderUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "PAYMENT_PROVIDER_UNAVAILABLE",
                msg.clone(),
            ),

            // Internal
            ApiError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "Database error".to_string(),
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                self.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            _ => ApiError::Database(err.to_string()),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        if err.is_coupon_rejection() {
            return ApiError::Validation(err.to_string());
        }
        match err {
            BillingError::NotFound(_) => ApiError::NotFound,
            BillingError::Unauthorized(_) => ApiError::Forbidden,
            BillingError::ProviderUnavailable(msg) => {
                tracing::error!(error = %msg, "Provider unavailable");
                ApiError::ProviderUnavailable("Payment provider timed out".to_string())
            }
            BillingError::ProviderAuth(msg)
            | BillingError::ProviderRequest(msg)
            | BillingError::Config(msg) => {
                tracing::error!(error = %msg, "Provider call failed");
                ApiError::Provider("Payment provider request failed".to_string())
            }
            BillingError::Database(msg) => ApiError::Database(msg),
            BillingError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal billing error");
                ApiError::Internal
            }
            // Coupon rejections handled above
            _ => ApiError::Validation(err.to_string()),
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coupon_rejections_map_to_400() {
        for err in [
            BillingError::CouponNotFound,
            BillingError::CouponInactive,
            BillingError::CouponExpired,
            BillingError::CouponExhausted,
            BillingError::CouponTierMismatch,
        ] {
            assert!(matches!(ApiError::from(err), ApiError::Validation(_)));
        }
    }

    #[test]
    fn test_ownership_violation_maps_to_403() {
        let err = BillingError::Unauthorized("not yours".to_string());
        assert!(matches!(ApiError::from(err), ApiError::Forbidden));
    }

    #[test]
    fn test_missing_subscription_maps_to_404() {
        let err = BillingError::NotFound("Subscription not found".to_string());
        assert!(matches!(ApiError::from(err), ApiError::NotFound));
    }

    #[test]
    fn test_provider_timeout_maps_to_503() {
        let err = BillingError::ProviderUnavailable("timed out".to_string());
        assert!(matches!(
            ApiError::from(err),
            ApiError::ProviderUnavailable(_)
        ));
    }
}
