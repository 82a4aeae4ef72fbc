//! Payment provider adapters
//!
//! Each provider implements the same three operations: open a hosted
//! checkout, verify a completed payment, and list historical charges
//! for an email. Dispatch is a tagged enum rather than a trait object
//! so the async methods stay plain `async fn`s.

pub mod paypal;
pub mod paystack;
pub mod stripe;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use payflow_shared::{Provider, Tier};

use crate::error::{BillingError, BillingResult};

pub use paypal::PaypalAdapter;
pub use paystack::PaystackAdapter;
pub use stripe::StripeAdapter;

/// Everything a provider needs to open a checkout for a pending
/// subscription. Amount is the post-discount USD price in cents.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub subscription_id: Uuid,
    pub user_id: String,
    pub email: String,
    pub tier: Tier,
    pub is_annual: bool,
    pub amount_cents: i64,
    pub coupon_id: Option<Uuid>,
}

impl CheckoutRequest {
    /// Line-item description shown on the provider's checkout page
    pub fn description(&self) -> String {
        format!(
            "Payflow {} Plan ({})",
            self.tier.display_name(),
            if self.is_annual { "Annual" } else { "Monthly" }
        )
    }
}

/// A provider-side transaction that was opened but not yet paid
#[derive(Debug, Clone, Serialize)]
pub struct ProviderCheckout {
    /// Provider handle: Stripe session id, PayPal order id, Paystack reference
    pub external_id: String,
    /// Hosted page the client redirects the user to
    pub checkout_url: String,
}

/// Outcome of verifying a provider transaction.
///
/// `paid: false` is a normal outcome (user never completed checkout),
/// not an error. Amount and currency are best-effort; callers fall back
/// to the locally stored price when the provider omits them.
#[derive(Debug, Clone)]
pub struct VerifiedPayment {
    pub paid: bool,
    pub provider_status: String,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub receipt_url: Option<String>,
}

/// A historical charge fetched live from a provider, for invoice
/// aggregation. Amounts are decimal currency units.
#[derive(Debug, Clone)]
pub struct ProviderCharge {
    pub external_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: String,
    pub description: String,
    pub receipt_url: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Tagged dispatch over the configured providers
pub enum ProviderAdapter {
    Stripe(StripeAdapter),
    Paypal(PaypalAdapter),
    Paystack(PaystackAdapter),
}

impl ProviderAdapter {
    pub async fn create_checkout(&self, req: &CheckoutRequest) -> BillingResult<ProviderCheckout> {
        match self {
            Self::Stripe(s) => s.create_checkout(req).await,
            Self::Paypal(p) => p.create_checkout(req).await,
            Self::Paystack(p) => p.create_checkout(req).await,
        }
    }

    pub async fn verify_payment(&self, external_id: &str) -> BillingResult<VerifiedPayment> {
        match self {
            Self::Stripe(s) => s.verify_payment(external_id).await,
            Self::Paypal(p) => p.verify_payment(external_id).await,
            Self::Paystack(p) => p.verify_payment(external_id).await,
        }
    }

    pub async fn list_charges(&self, email: &str) -> BillingResult<Vec<ProviderCharge>> {
        match self {
            Self::Stripe(s) => s.list_charges(email).await,
            Self::Paypal(p) => p.list_charges(email).await,
            Self::Paystack(p) => p.list_charges(email).await,
        }
    }
}

/// Holds whichever providers have credentials configured. Requests for
/// an unconfigured provider fail with a config error rather than a
/// panic or a silent fallback.
#[derive(Default)]
pub struct ProviderRegistry {
    stripe: Option<ProviderAdapter>,
    paypal: Option<ProviderAdapter>,
    paystack: Option<ProviderAdapter>,
}

impl ProviderRegistry {
    pub fn new(
        stripe: Option<StripeAdapter>,
        paypal: Option<PaypalAdapter>,
        paystack: Option<PaystackAdapter>,
    ) -> Self {
        Self {
            stripe: stripe.map(ProviderAdapter::Stripe),
            paypal: paypal.map(ProviderAdapter::Paypal),
            paystack: paystack.map(ProviderAdapter::Paystack),
        }
    }

    pub fn get(&self, provider: Provider) -> BillingResult<&ProviderAdapter> {
        let adapter = match provider {
            Provider::Stripe => self.stripe.as_ref(),
            Provider::Paypal => self.paypal.as_ref(),
            Provider::Paystack => self.paystack.as_ref(),
        };
        adapter.ok_or_else(|| BillingError::Config(format!("{provider} is not configured")))
    }

    /// Providers available for history aggregation
    pub fn configured(&self) -> Vec<(Provider, &ProviderAdapter)> {
        [
            (Provider::Stripe, &self.stripe),
            (Provider::Paypal, &self.paypal),
            (Provider::Paystack, &self.paystack),
        ]
        .into_iter()
        .filter_map(|(p, a)| a.as_ref().map(|a| (p, a)))
        .collect()
    }
}

/// Map an HTTP status from a provider REST API onto the billing error
/// taxonomy. Used by the reqwest-based adapters.
pub(crate) fn provider_http_error(
    provider: Provider,
    status: reqwest::StatusCode,
    body: &str,
) -> BillingError {
    let detail = format!("{provider} returned {status}: {}", truncate(body, 256));
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        BillingError::ProviderAuth(detail)
    } else if status.is_server_error() {
        BillingError::ProviderUnavailable(detail)
    } else {
        BillingError::ProviderRequest(detail)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry_reports_unconfigured() {
        let registry = ProviderRegistry::default();
        for provider in [Provider::Stripe, Provider::Paypal, Provider::Paystack] {
            let err = match registry.get(provider) {
                Err(e) => e,
                Ok(_) => panic!("expected config error"),
            };
            assert!(matches!(err, BillingError::Config(_)));
        }
        assert!(registry.configured().is_empty());
    }

    #[test]
    fn test_http_status_mapping() {
        use reqwest::StatusCode;
        assert!(matches!(
            provider_http_error(Provider::Paypal, StatusCode::UNAUTHORIZED, "{}"),
            BillingError::ProviderAuth(_)
        ));
        assert!(matches!(
            provider_http_error(Provider::Paystack, StatusCode::BAD_GATEWAY, ""),
            BillingError::ProviderUnavailable(_)
        ));
        assert!(matches!(
            provider_http_error(Provider::Paypal, StatusCode::UNPROCESSABLE_ENTITY, "{}"),
            BillingError::ProviderRequest(_)
        ));
    }

    #[test]
    fn test_checkout_description() {
        let req = CheckoutRequest {
            subscription_id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            tier: Tier::Program,
            is_annual: true,
            amount_cents: 189_000,
            coupon_id: None,
        };
        assert_eq!(req.description(), "Payflow Program Plan (Annual)");
    }
}
