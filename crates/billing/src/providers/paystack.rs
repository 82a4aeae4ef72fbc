//! Paystack adapter
//!
//! Transactions are initialized with the subscription id as the
//! reference, so verification needs no extra bookkeeping. Paystack
//! settles in NGN by default; USD prices are converted using the FX
//! cache, an env-style override, or a hardcoded fallback, in that
//! order.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use payflow_shared::Provider;

use crate::error::BillingResult;
use crate::fx::FxRateCache;
use crate::providers::{
    provider_http_error, CheckoutRequest, ProviderCharge, ProviderCheckout, VerifiedPayment,
};

pub const DEFAULT_BASE_URL: &str = "https://api.paystack.co";

/// Last-resort USD -> NGN rate when both the override and the FX cache
/// are unavailable
const FALLBACK_USD_TO_NGN: f64 = 1_500.0;

/// Bound on every Paystack HTTP call; a hung provider surfaces as
/// ProviderUnavailable instead of stalling the caller
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

pub struct PaystackAdapter {
    http: reqwest::Client,
    secret_key: String,
    base_url: String,
    /// Settlement currency, "NGN" unless configured otherwise
    currency: String,
    /// Fixed rate override; wins over the FX cache when set
    rate_override: Option<f64>,
    fx: Arc<FxRateCache>,
    app_base_url: String,
    timeout: std::time::Duration,
}

impl PaystackAdapter {
    pub fn new(
        secret_key: impl Into<String>,
        currency: impl Into<String>,
        rate_override: Option<f64>,
        fx: Arc<FxRateCache>,
        app_base_url: impl Into<String>,
    ) -> Self {
        Self::with_base_url(
            secret_key,
            DEFAULT_BASE_URL,
            currency,
            rate_override,
            fx,
            app_base_url,
        )
    }

    pub fn with_base_url(
        secret_key: impl Into<String>,
        base_url: impl Into<String>,
        currency: impl Into<String>,
        rate_override: Option<f64>,
        fx: Arc<FxRateCache>,
        app_base_url: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: secret_key.into(),
            base_url: base_url.into(),
            currency: currency.into(),
            rate_override,
            fx,
            app_base_url: app_base_url.into(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Charge amount in the settlement currency's minor units
    async fn charge_amount(&self, usd_cents: i64) -> i64 {
        if self.currency != "NGN" {
            return usd_cents;
        }
        let rate = match self.rate_override {
            Some(r) => r,
            None => self.fx.usd_to_ngn().await.unwrap_or(FALLBACK_USD_TO_NGN),
        };
        (usd_cents as f64 * rate).round() as i64
    }

    pub async fn create_checkout(&self, req: &CheckoutRequest) -> BillingResult<ProviderCheckout> {
        let amount = self.charge_amount(req.amount_cents).await;

        let body = json!({
            "email": req.email,
            "amount": amount,
            "currency": self.currency,
            "reference": req.subscription_id.to_string(),
            "callback_url": format!("{}/payment/success?provider=paystack", self.app_base_url),
            "metadata": {
                "subscription_id": req.subscription_id.to_string(),
                "user_id": req.user_id,
                "tier": req.tier.to_string(),
                "custom_fields": [{
                    "display_name": "Plan",
                    "variable_name": "plan",
                    "value": req.description(),
                }],
            },
        });

        let response = self
            .http
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(provider_http_error(Provider::Paystack, status, &body));
        }

        #[derive(Deserialize)]
        struct InitializeResponse {
            data: InitializeData,
        }

        #[derive(Deserialize)]
        struct InitializeData {
            authorization_url: String,
            reference: String,
        }

        let init: InitializeResponse = response.json().await?;

        tracing::info!(
            subscription_id = %req.subscription_id,
            reference = %init.data.reference,
            amount_minor = amount,
            currency = %self.currency,
            "Initialized Paystack transaction"
        );

        Ok(ProviderCheckout {
            external_id: init.data.reference,
            checkout_url: init.data.authorization_url,
        })
    }

    pub async fn verify_payment(&self, external_id: &str) -> BillingResult<VerifiedPayment> {
        let response = self
            .http
            .get(format!(
                "{}/transaction/verify/{}",
                self.base_url, external_id
            ))
            .bearer_auth(&self.secret_key)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(provider_http_error(Provider::Paystack, status, &body));
        }

        #[derive(Deserialize)]
        struct VerifyResponse {
            data: VerifyData,
        }

        #[derive(Deserialize)]
        struct VerifyData {
            status: String,
            amount: Option<i64>,
            currency: Option<String>,
        }

        let verify: VerifyResponse = response.json().await?;
        let paid = verify.data.status == "success";

        Ok(VerifiedPayment {
            paid,
            provider_status: verify.data.status,
            amount: verify.data.amount.map(|minor| minor as f64 / 100.0),
            currency: verify.data.currency,
            receipt_url: None,
        })
    }

    /// Successful transactions for the Paystack customer registered
    /// under an email. An unknown customer is an empty history, not an
    /// error.
    pub async fn list_charges(&self, email: &str) -> BillingResult<Vec<ProviderCharge>> {
        let response = self
            .http
            .get(format!("{}/customer/{}", self.base_url, email))
            .bearer_auth(&self.secret_key)
            .timeout(self.timeout)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(provider_http_error(Provider::Paystack, status, &body));
        }

        #[derive(Deserialize)]
        struct CustomerResponse {
            data: CustomerData,
        }

        #[derive(Deserialize)]
        struct CustomerData {
            id: i64,
        }

        let customer: CustomerResponse = response.json().await?;

        let response = self
            .http
            .get(format!("{}/transaction", self.base_url))
            .bearer_auth(&self.secret_key)
            .query(&[("customer", customer.data.id.to_string())])
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(provider_http_error(Provider::Paystack, status, &body));
        }

        #[derive(Deserialize)]
        struct TransactionsResponse {
            #[serde(default)]
            data: Vec<Transaction>,
        }

        #[derive(Deserialize)]
        struct Transaction {
            reference: String,
            status: String,
            amount: i64,
            currency: String,
            paid_at: Option<String>,
            created_at: Option<String>,
        }

        let body: TransactionsResponse = response.json().await?;

        let charges = body
            .data
            .into_iter()
            .filter(|t| t.status == "success")
            .map(|t| ProviderCharge {
                external_id: t.reference,
                amount: t.amount as f64 / 100.0,
                currency: t.currency,
                status: "paid".to_string(),
                description: "Paystack payment".to_string(),
                receipt_url: None,
                created_at: t
                    .paid_at
                    .or(t.created_at)
                    .and_then(|d| OffsetDateTime::parse(&d, &Rfc3339).ok())
                    .unwrap_or(OffsetDateTime::UNIX_EPOCH),
            })
            .collect();

        Ok(charges)
    }
}
