//! PayPal adapter
//!
//! Orders v2 over REST: an order is created with intent CAPTURE and the
//! user approves it on PayPal's hosted page; verification captures the
//! order and checks for COMPLETED. Access tokens are fetched per call
//! with the client-credentials grant rather than cached, which keeps
//! the adapter stateless at the cost of one extra round trip.

use serde::Deserialize;
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use payflow_shared::Provider;

use crate::error::{BillingError, BillingResult};
use crate::providers::{
    provider_http_error, CheckoutRequest, ProviderCharge, ProviderCheckout, VerifiedPayment,
};

const LIVE_BASE_URL: &str = "https://api-m.paypal.com";
const SANDBOX_BASE_URL: &str = "https://api-m.sandbox.paypal.com";

/// Bound on every PayPal HTTP call; a hung provider surfaces as
/// ProviderUnavailable instead of stalling the caller
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

pub struct PaypalAdapter {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    base_url: String,
    app_base_url: String,
    timeout: std::time::Duration,
}

impl PaypalAdapter {
    /// `env` is "live" or "sandbox"; when absent the environment is
    /// inferred from the client id (sandbox ids start with "sb-" or
    /// carry "sandbox").
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        env: Option<&str>,
        app_base_url: impl Into<String>,
    ) -> Self {
        let client_id = client_id.into();
        let base_url = match env {
            Some("live") => LIVE_BASE_URL.to_string(),
            Some("sandbox") => SANDBOX_BASE_URL.to_string(),
            _ => {
                if client_id.starts_with("sb-") || client_id.contains("sandbox") {
                    SANDBOX_BASE_URL.to_string()
                } else {
                    LIVE_BASE_URL.to_string()
                }
            }
        };
        Self::with_base_url(client_id, client_secret, base_url, app_base_url)
    }

    pub fn with_base_url(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        base_url: impl Into<String>,
        app_base_url: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            base_url: base_url.into(),
            app_base_url: app_base_url.into(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    async fn access_token(&self) -> BillingResult<String> {
        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            // Any token failure is an auth failure regardless of status
            return Err(BillingError::ProviderAuth(format!(
                "paypal token request failed ({status}): {body}"
            )));
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    pub async fn create_checkout(&self, req: &CheckoutRequest) -> BillingResult<ProviderCheckout> {
        let token = self.access_token().await?;

        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": req.subscription_id.to_string(),
                "custom_id": req.subscription_id.to_string(),
                "description": req.description(),
                "amount": {
                    "currency_code": "USD",
                    "value": format!("{:.2}", req.amount_cents as f64 / 100.0),
                },
            }],
            "application_context": {
                "brand_name": "Payflow",
                "return_url": format!("{}/payment/success?provider=paypal", self.app_base_url),
                "cancel_url": format!("{}/payment/cancel", self.app_base_url),
            },
        });

        let response = self
            .http
            .post(format!("{}/v2/checkout/orders", self.base_url))
            .bearer_auth(&token)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(provider_http_error(Provider::Paypal, status, &body));
        }

        #[derive(Deserialize)]
        struct OrderResponse {
            id: String,
            #[serde(default)]
            links: Vec<OrderLink>,
        }

        #[derive(Deserialize)]
        struct OrderLink {
            rel: String,
            href: String,
        }

        let order: OrderResponse = response.json().await?;
        let approval_url = order
            .links
            .into_iter()
            .find(|l| l.rel == "approve")
            .map(|l| l.href)
            .ok_or_else(|| {
                BillingError::ProviderRequest("paypal order has no approval link".to_string())
            })?;

        tracing::info!(
            subscription_id = %req.subscription_id,
            order_id = %order.id,
            amount_cents = req.amount_cents,
            "Created PayPal order"
        );

        Ok(ProviderCheckout {
            external_id: order.id,
            checkout_url: approval_url,
        })
    }

    /// Capture the approved order. An order the user never approved
    /// fails capture with a 422, which reports as unpaid rather than
    /// an error.
    pub async fn verify_payment(&self, external_id: &str) -> BillingResult<VerifiedPayment> {
        let token = self.access_token().await?;

        let response = self
            .http
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.base_url, external_id
            ))
            .bearer_auth(&token)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            return Ok(VerifiedPayment {
                paid: false,
                provider_status: "not_approved".to_string(),
                amount: None,
                currency: None,
                receipt_url: None,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(provider_http_error(Provider::Paypal, status, &body));
        }

        #[derive(Deserialize)]
        struct CaptureResponse {
            status: String,
            #[serde(default)]
            purchase_units: Vec<CaptureUnit>,
        }

        #[derive(Deserialize)]
        struct CaptureUnit {
            payments: Option<CapturePayments>,
        }

        #[derive(Deserialize)]
        struct CapturePayments {
            #[serde(default)]
            captures: Vec<Capture>,
        }

        #[derive(Deserialize)]
        struct Capture {
            amount: Option<CaptureAmount>,
        }

        #[derive(Deserialize)]
        struct CaptureAmount {
            currency_code: String,
            value: String,
        }

        let capture: CaptureResponse = response.json().await?;
        let paid = capture.status == "COMPLETED";

        let amount = capture
            .purchase_units
            .first()
            .and_then(|u| u.payments.as_ref())
            .and_then(|p| p.captures.first())
            .and_then(|c| c.amount.as_ref());

        Ok(VerifiedPayment {
            paid,
            provider_status: capture.status.to_lowercase(),
            amount: amount.and_then(|a| a.value.parse::<f64>().ok()),
            currency: amount.map(|a| a.currency_code.clone()),
            receipt_url: None,
        })
    }

    /// Completed transactions for a payer email over the last 31 days
    /// (the largest window the reporting API accepts per request).
    pub async fn list_charges(&self, email: &str) -> BillingResult<Vec<ProviderCharge>> {
        let token = self.access_token().await?;

        let end = OffsetDateTime::now_utc();
        let start = end - Duration::days(31);
        let format_ts = |t: OffsetDateTime| {
            t.format(&Rfc3339)
                .map_err(|e| BillingError::Internal(format!("timestamp format: {e}")))
        };

        let response = self
            .http
            .get(format!("{}/v1/reporting/transactions", self.base_url))
            .bearer_auth(&token)
            .query(&[
                ("start_date", format_ts(start)?),
                ("end_date", format_ts(end)?),
                ("fields", "all".to_string()),
            ])
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(provider_http_error(Provider::Paypal, status, &body));
        }

        #[derive(Deserialize)]
        struct TransactionsResponse {
            #[serde(default)]
            transaction_details: Vec<TransactionDetail>,
        }

        #[derive(Deserialize)]
        struct TransactionDetail {
            transaction_info: TransactionInfo,
            payer_info: Option<PayerInfo>,
        }

        #[derive(Deserialize)]
        struct TransactionInfo {
            transaction_id: String,
            transaction_status: Option<String>,
            transaction_initiation_date: Option<String>,
            transaction_amount: Option<TxnAmount>,
            transaction_subject: Option<String>,
        }

        #[derive(Deserialize)]
        struct TxnAmount {
            currency_code: String,
            value: String,
        }

        #[derive(Deserialize)]
        struct PayerInfo {
            email_address: Option<String>,
        }

        let body: TransactionsResponse = response.json().await?;

        let charges = body
            .transaction_details
            .into_iter()
            .filter(|d| {
                d.payer_info
                    .as_ref()
                    .and_then(|p| p.email_address.as_deref())
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            // "S" is settled/completed in the reporting API
            .filter(|d| {
                d.transaction_info
                    .transaction_status
                    .as_deref()
                    .is_some_and(|s| s == "S")
            })
            .map(|d| {
                let info = d.transaction_info;
                ProviderCharge {
                    external_id: info.transaction_id,
                    amount: info
                        .transaction_amount
                        .as_ref()
                        .and_then(|a| a.value.parse::<f64>().ok())
                        .unwrap_or(0.0),
                    currency: info
                        .transaction_amount
                        .map(|a| a.currency_code)
                        .unwrap_or_else(|| "USD".to_string()),
                    status: "paid".to_string(),
                    description: info
                        .transaction_subject
                        .unwrap_or_else(|| "PayPal payment".to_string()),
                    receipt_url: None,
                    created_at: info
                        .transaction_initiation_date
                        .and_then(|d| OffsetDateTime::parse(&d, &Rfc3339).ok())
                        .unwrap_or(OffsetDateTime::UNIX_EPOCH),
                }
            })
            .collect();

        Ok(charges)
    }
}
