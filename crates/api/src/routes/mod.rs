//! API routes

pub mod health;
pub mod payments;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{auth::require_auth, state::AppState};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness));

    // Payment routes (all bearer-token authenticated, POST-only)
    let payment_routes = Router::new()
        .route("/payments/create-transaction", post(payments::create_transaction))
        .route("/payments/verify-payment", post(payments::verify_payment))
        .route("/payments/apply-coupon", post(payments::apply_coupon))
        .route("/payments/cancel-subscription", post(payments::cancel_subscription))
        .route("/payments/list-invoices", post(payments::list_invoices))
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", payment_routes)
        .with_state(state)
}
