//! Payment orchestration endpoints
//!
//! The create/verify/cancel/list flows are thin HTTP shims over the
//! billing services; all authorization beyond token validity (ownership,
//! admin allow-list) happens in the service layer with the identity
//! extracted here.

use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use payflow_billing::{price_cents, InvoiceEntry};
use payflow_shared::{Provider, Tier};

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    pub provider: String,
    pub tier: String,
    #[serde(default)]
    pub is_annual: bool,
    /// Defaults to the authenticated user's email
    pub email: Option<String>,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionResponse {
    pub success: bool,
    pub subscription_id: Uuid,
    pub checkout_url: String,
    pub external_id: String,
    pub amount_cents: i64,
}

/// Open a checkout with the requested provider
pub async fn create_transaction(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateTransactionRequest>,
) -> ApiResult<Json<CreateTransactionResponse>> {
    let provider: Provider = req
        .provider
        .parse()
        .map_err(ApiError::BadRequest)?;
    let tier = Tier::from_str_lossy(&req.tier);
    let email = req.email.as_deref().unwrap_or(&user.email);

    let outcome = state
        .subscriptions
        .create(
            &user.user_id,
            email,
            tier,
            req.is_annual,
            provider,
            req.coupon_code.as_deref(),
        )
        .await?;

    Ok(Json(CreateTransactionResponse {
        success: true,
        subscription_id: outcome.subscription_id,
        checkout_url: outcome.checkout_url,
        external_id: outcome.external_id,
        amount_cents: outcome.amount_cents,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    /// Provider reference (session id / order id) or subscription id
    pub reference: String,
}

/// Verify a payment and activate the subscription.
///
/// "Not paid yet" is a 200 with success:false, since the client polls.
pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<VerifyPaymentRequest>,
) -> ApiResult<Json<Value>> {
    let outcome = state
        .subscriptions
        .verify(&req.reference, &user.user_id)
        .await?;

    Ok(Json(json!({
        "success": outcome.success,
        "subscriptionId": outcome.subscription.id,
        "status": outcome.subscription.status,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyCouponRequest {
    pub coupon_code: String,
    pub tier: String,
    #[serde(default)]
    pub is_annual: bool,
    /// Price to discount, in cents; computed from tier when absent
    pub original_price: Option<i64>,
}

/// Validate a coupon and quote the discounted price. Read-only: usage
/// counters are untouched until a payment is confirmed.
pub async fn apply_coupon(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
    Json(req): Json<ApplyCouponRequest>,
) -> ApiResult<Json<Value>> {
    let tier = Tier::from_str_lossy(&req.tier);
    let base_price = req
        .original_price
        .unwrap_or_else(|| price_cents(tier, req.is_annual));

    let quote = state
        .coupons
        .validate(Some(&req.coupon_code), tier, base_price)
        .await?;

    Ok(Json(json!({
        "couponId": quote.coupon_id,
        "discountedPrice": quote.discounted_price_cents,
        "discountPercent": quote.discount_percent,
        "discountAmount": quote.discount_amount,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSubscriptionRequest {
    pub subscription_id: Uuid,
}

/// Cancel a subscription (local status flip, no provider call)
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CancelSubscriptionRequest>,
) -> ApiResult<Json<Value>> {
    state
        .subscriptions
        .cancel(req.subscription_id, &user.user_id, user.is_admin)
        .await?;

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListInvoicesRequest {
    /// Defaults to the caller; reading another user requires admin
    pub user_id: Option<String>,
    pub user_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListInvoicesResponse {
    pub invoices: Vec<InvoiceEntry>,
}

/// Billing history for a user, merged across the local store and the
/// configured providers
pub async fn list_invoices(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ListInvoicesRequest>,
) -> ApiResult<Json<ListInvoicesResponse>> {
    let user_id = req.user_id.as_deref().unwrap_or(&user.user_id);
    let email = req.user_email.as_deref().unwrap_or(&user.email);

    let invoices = state
        .invoices
        .list(user_id, email, &user.user_id, user.is_admin)
        .await?;

    Ok(Json(ListInvoicesResponse { invoices }))
}
