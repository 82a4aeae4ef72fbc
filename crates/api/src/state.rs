//! Application state

use std::sync::Arc;

use sqlx::PgPool;

use payflow_billing::{
    CouponService, FxRateCache, InvoiceService, PaypalAdapter, PaystackAdapter, ProviderRegistry,
    StripeAdapter, SubscriptionService,
};

use crate::{
    auth::{AuthState, JwtManager},
    config::Config,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub jwt_manager: JwtManager,
    pub subscriptions: Arc<SubscriptionService>,
    pub invoices: Arc<InvoiceService>,
    pub coupons: Arc<CouponService>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let jwt_manager = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);

        let fx = Arc::new(FxRateCache::new(config.fx_rate_url.clone()));

        let stripe = config
            .stripe_secret_key
            .as_deref()
            .map(|key| StripeAdapter::new(key, config.app_base_url.clone()));
        if stripe.is_some() {
            tracing::info!("Stripe provider configured");
        } else {
            tracing::warn!("Stripe not configured (missing STRIPE_SECRET_KEY)");
        }

        let paypal = match (&config.paypal_client_id, &config.paypal_client_secret) {
            (Some(id), Some(secret)) => {
                tracing::info!("PayPal provider configured");
                Some(PaypalAdapter::new(
                    id.clone(),
                    secret.clone(),
                    config.paypal_env.as_deref(),
                    config.app_base_url.clone(),
                ))
            }
            _ => {
                tracing::warn!("PayPal not configured (missing PAYPAL_CLIENT_ID/SECRET)");
                None
            }
        };

        let paystack = config.paystack_secret_key.as_deref().map(|key| {
            tracing::info!(currency = %config.paystack_currency, "Paystack provider configured");
            PaystackAdapter::new(
                key,
                config.paystack_currency.clone(),
                config.paystack_usd_to_ngn,
                fx.clone(),
                config.app_base_url.clone(),
            )
        });
        if paystack.is_none() {
            tracing::warn!("Paystack not configured (missing PAYSTACK_SECRET_KEY)");
        }

        let providers = Arc::new(ProviderRegistry::new(stripe, paypal, paystack));

        Self {
            jwt_manager,
            subscriptions: Arc::new(SubscriptionService::new(pool.clone(), providers.clone())),
            invoices: Arc::new(InvoiceService::new(pool.clone(), providers)),
            coupons: Arc::new(CouponService::new(pool.clone())),
            pool,
            config,
        }
    }

    /// Get auth state for middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
            admin_emails: self.config.admin_emails.clone(),
        }
    }
}
