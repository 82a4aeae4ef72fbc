//! Billing error types

use thiserror::Error;

/// Billing-specific errors
#[derive(Debug, Error)]
pub enum BillingError {
    // Coupon rejections (always surfaced before any persistence)
    #[error("Coupon not found")]
    CouponNotFound,

    #[error("Coupon is inactive")]
    CouponInactive,

    #[error("Coupon has expired")]
    CouponExpired,

    #[error("Coupon usage limit reached")]
    CouponExhausted,

    #[error("Coupon not valid for this plan")]
    CouponTierMismatch,

    // Provider failures
    #[error("Provider authentication failed: {0}")]
    ProviderAuth(String),

    #[error("Provider rejected the request: {0}")]
    ProviderRequest(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Payment service not configured: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// True for coupon validation rejections, which map to a 400 at the
    /// endpoint boundary rather than a 5xx.
    pub fn is_coupon_rejection(&self) -> bool {
        matches!(
            self,
            Self::CouponNotFound
                | Self::CouponInactive
                | Self::CouponExpired
                | Self::CouponExhausted
                | Self::CouponTierMismatch
        )
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        match err {
            stripe::StripeError::Timeout => {
                BillingError::ProviderUnavailable("stripe request timed out".to_string())
            }
            other => BillingError::ProviderRequest(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            BillingError::ProviderUnavailable(err.to_string())
        } else {
            BillingError::ProviderRequest(err.to_string())
        }
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
