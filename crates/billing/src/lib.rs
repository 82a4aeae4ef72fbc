//! Payment orchestration for Payflow
//!
//! Pricing, coupon validation, the FX rate cache, provider adapters
//! (Stripe, PayPal, Paystack), the subscription state machine, and
//! invoice aggregation.

pub mod coupons;
pub mod error;
pub mod fx;
pub mod invoices;
pub mod pricing;
pub mod providers;
pub mod subscriptions;

pub use coupons::{CouponQuote, CouponService};
pub use error::{BillingError, BillingResult};
pub use fx::FxRateCache;
pub use invoices::{InvoiceEntry, InvoiceService};
pub use pricing::price_cents;
pub use providers::{
    CheckoutRequest, PaypalAdapter, PaystackAdapter, ProviderAdapter, ProviderCharge,
    ProviderCheckout, ProviderRegistry, StripeAdapter, VerifiedPayment,
};
pub use subscriptions::{CheckoutOutcome, SubscriptionService, VerifyOutcome};
