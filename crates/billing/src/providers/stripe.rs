//! Stripe adapter
//!
//! Hosted Checkout in payment mode with an inline price, since plans
//! are priced locally (coupons already applied) rather than through
//! Stripe Price objects. Verification reads the session's payment
//! status; an unpaid session is a normal outcome.

use std::collections::HashMap;

use stripe::{
    Charge, CheckoutSession, CheckoutSessionMode, CheckoutSessionPaymentStatus,
    CreateCheckoutSession, CreateCheckoutSessionLineItems, CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData, Customer, ListCharges, ListCustomers,
};
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};
use crate::providers::{CheckoutRequest, ProviderCharge, ProviderCheckout, VerifiedPayment};

pub struct StripeAdapter {
    client: stripe::Client,
    app_base_url: String,
}

impl StripeAdapter {
    pub fn new(secret_key: &str, app_base_url: impl Into<String>) -> Self {
        Self {
            client: stripe::Client::new(secret_key),
            app_base_url: app_base_url.into(),
        }
    }

    pub async fn create_checkout(&self, req: &CheckoutRequest) -> BillingResult<ProviderCheckout> {
        let success_url = format!(
            "{}/payment/success?session_id={{CHECKOUT_SESSION_ID}}",
            self.app_base_url
        );
        let cancel_url = format!("{}/payment/cancel", self.app_base_url);

        let mut metadata = HashMap::new();
        metadata.insert("subscription_id".to_string(), req.subscription_id.to_string());
        metadata.insert("user_id".to_string(), req.user_id.clone());
        metadata.insert("tier".to_string(), req.tier.to_string());
        if let Some(coupon_id) = req.coupon_id {
            metadata.insert("coupon_id".to_string(), coupon_id.to_string());
        }

        let line_item = CreateCheckoutSessionLineItems {
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency: stripe::Currency::USD,
                unit_amount: Some(req.amount_cents),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: req.description(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            quantity: Some(1),
            ..Default::default()
        };

        let params = CreateCheckoutSession {
            mode: Some(CheckoutSessionMode::Payment),
            line_items: Some(vec![line_item]),
            customer_email: Some(&req.email),
            success_url: Some(&success_url),
            cancel_url: Some(&cancel_url),
            metadata: Some(metadata),
            ..Default::default()
        };

        let session = CheckoutSession::create(&self.client, params).await?;

        let checkout_url = session.url.ok_or_else(|| {
            BillingError::ProviderRequest("stripe session has no checkout URL".to_string())
        })?;

        tracing::info!(
            subscription_id = %req.subscription_id,
            session_id = %session.id,
            amount_cents = req.amount_cents,
            "Created Stripe checkout session"
        );

        Ok(ProviderCheckout {
            external_id: session.id.to_string(),
            checkout_url,
        })
    }

    pub async fn verify_payment(&self, external_id: &str) -> BillingResult<VerifiedPayment> {
        let session_id = external_id
            .parse::<stripe::CheckoutSessionId>()
            .map_err(|e| BillingError::ProviderRequest(format!("Invalid session ID: {}", e)))?;

        let session = CheckoutSession::retrieve(&self.client, &session_id, &[]).await?;

        let paid = session.payment_status == CheckoutSessionPaymentStatus::Paid;

        Ok(VerifiedPayment {
            paid,
            provider_status: format!("{:?}", session.payment_status).to_lowercase(),
            amount: session.amount_total.map(|cents| cents as f64 / 100.0),
            currency: session.currency.map(|c| c.to_string().to_uppercase()),
            receipt_url: None,
        })
    }

    /// Successful charges for the customer(s) registered under an email
    pub async fn list_charges(&self, email: &str) -> BillingResult<Vec<ProviderCharge>> {
        let customers = Customer::list(
            &self.client,
            &ListCustomers {
                email: Some(email),
                ..Default::default()
            },
        )
        .await?;

        let mut charges = Vec::new();
        for customer in customers.data {
            let page = Charge::list(
                &self.client,
                &ListCharges {
                    customer: Some(customer.id.clone()),
                    ..Default::default()
                },
            )
            .await?;

            for charge in page.data {
                let status = format!("{:?}", charge.status).to_lowercase();
                if status != "succeeded" {
                    continue;
                }
                charges.push(ProviderCharge {
                    external_id: charge.id.to_string(),
                    amount: charge.amount as f64 / 100.0,
                    currency: charge.currency.to_string().to_uppercase(),
                    status: "paid".to_string(),
                    description: charge
                        .description
                        .unwrap_or_else(|| "Stripe payment".to_string()),
                    receipt_url: charge.receipt_url,
                    created_at: OffsetDateTime::from_unix_timestamp(charge.created)
                        .unwrap_or(OffsetDateTime::UNIX_EPOCH),
                });
            }
        }

        Ok(charges)
    }
}
