//! Subscription orchestration
//!
//! Owns the pending -> active/cancelled state machine. Activation runs
//! as one transaction keyed on the current status, so a retried or
//! concurrent verify can never double-increment a coupon or write a
//! second invoice: the status flip is a compare-and-swap and the losing
//! caller just re-reads the row.

use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use payflow_shared::{Provider, Subscription, SubscriptionStatus, Tier};

use crate::coupons::CouponService;
use crate::error::{BillingError, BillingResult};
use crate::pricing::price_cents;
use crate::providers::{CheckoutRequest, ProviderRegistry, VerifiedPayment};

/// Result of opening a checkout for a new subscription
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutOutcome {
    pub subscription_id: Uuid,
    pub external_id: String,
    pub checkout_url: String,
    pub amount_cents: i64,
}

/// Result of verifying a payment. `success: false` means the provider
/// has not (yet) confirmed payment; the client is expected to poll.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyOutcome {
    pub success: bool,
    pub subscription: Subscription,
}

pub struct SubscriptionService {
    pool: PgPool,
    coupons: CouponService,
    providers: Arc<ProviderRegistry>,
}

impl SubscriptionService {
    pub fn new(pool: PgPool, providers: Arc<ProviderRegistry>) -> Self {
        Self {
            coupons: CouponService::new(pool.clone()),
            pool,
            providers,
        }
    }

    /// Open a provider checkout for a new subscription.
    ///
    /// Coupon failures reject before anything is persisted. A provider
    /// failure after the pending row is written leaves the row orphaned;
    /// the reconciliation sweep cancels those rather than masking the
    /// error here.
    pub async fn create(
        &self,
        user_id: &str,
        email: &str,
        tier: Tier,
        is_annual: bool,
        provider: Provider,
        coupon_code: Option<&str>,
    ) -> BillingResult<CheckoutOutcome> {
        let adapter = self.providers.get(provider)?;

        let base_price = price_cents(tier, is_annual);
        let quote = self.coupons.validate(coupon_code, tier, base_price).await?;

        let subscription_id = Uuid::new_v4();
        let coupon_code_stored = coupon_code
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_uppercase);

        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (id, user_id, tier, is_annual, status, provider,
                 coupon_id, coupon_code, discounted_price_cents)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, $8)
            "#,
        )
        .bind(subscription_id)
        .bind(user_id)
        .bind(tier)
        .bind(is_annual)
        .bind(provider)
        .bind(quote.coupon_id)
        .bind(&coupon_code_stored)
        .bind(quote.discounted_price_cents)
        .execute(&self.pool)
        .await?;

        let checkout = adapter
            .create_checkout(&CheckoutRequest {
                subscription_id,
                user_id: user_id.to_string(),
                email: email.to_string(),
                tier,
                is_annual,
                amount_cents: quote.discounted_price_cents,
                coupon_id: quote.coupon_id,
            })
            .await
            .map_err(|e| {
                tracing::warn!(
                    subscription_id = %subscription_id,
                    provider = %provider,
                    error = %e,
                    "Checkout creation failed, pending subscription left for reconciliation"
                );
                e
            })?;

        sqlx::query(
            "UPDATE subscriptions SET external_transaction_id = $2, updated_at = now() WHERE id = $1",
        )
        .bind(subscription_id)
        .bind(&checkout.external_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            subscription_id = %subscription_id,
            provider = %provider,
            tier = %tier,
            amount_cents = quote.discounted_price_cents,
            "Opened checkout for subscription"
        );

        Ok(CheckoutOutcome {
            subscription_id,
            external_id: checkout.external_id,
            checkout_url: checkout.checkout_url,
            amount_cents: quote.discounted_price_cents,
        })
    }

    /// Verify a payment by provider reference (or subscription id) and
    /// activate the subscription when the provider confirms it.
    pub async fn verify(&self, reference: &str, user_id: &str) -> BillingResult<VerifyOutcome> {
        let subscription = self.find_by_reference(reference).await?;

        if subscription.user_id != user_id {
            return Err(BillingError::Unauthorized(
                "Subscription does not belong to this user".to_string(),
            ));
        }

        // Already active: verified previously, nothing left to do
        if subscription.status == SubscriptionStatus::Active {
            return Ok(VerifyOutcome {
                success: true,
                subscription,
            });
        }

        let external_id = match subscription.external_transaction_id.as_deref() {
            Some(id) => id,
            // Checkout was never opened; there is nothing to verify
            None => {
                return Ok(VerifyOutcome {
                    success: false,
                    subscription,
                })
            }
        };

        let adapter = self.providers.get(subscription.provider)?;
        let payment = adapter.verify_payment(external_id).await?;

        if !payment.paid {
            tracing::debug!(
                subscription_id = %subscription.id,
                provider_status = %payment.provider_status,
                "Payment not confirmed yet"
            );
            return Ok(VerifyOutcome {
                success: false,
                subscription,
            });
        }

        self.activate(&subscription, external_id, &payment).await
    }

    /// Flip a confirmed subscription to active in one transaction:
    /// status CAS, coupon increment, invoice write. Safe to call twice
    /// with the same reference; the second call observes zero CAS rows
    /// and just reports the current state.
    async fn activate(
        &self,
        subscription: &Subscription,
        external_id: &str,
        payment: &VerifiedPayment,
    ) -> BillingResult<VerifyOutcome> {
        let amount = payment
            .amount
            .unwrap_or(subscription.discounted_price_cents as f64 / 100.0);
        let currency = payment.currency.clone().unwrap_or_else(|| "USD".to_string());

        let mut tx = self.pool.begin().await?;

        let start = OffsetDateTime::now_utc();
        let end = one_year_after(start);

        // CAS on status: only the first confirmed verify flips the row
        let activated: Option<Subscription> = sqlx::query_as(
            r#"
            UPDATE subscriptions
            SET status = 'active', start_date = $2, end_date = $3, updated_at = now()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(subscription.id)
        .bind(start)
        .bind(end)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(active) = activated else {
            tx.rollback().await?;
            // Lost the race or the row was cancelled under us
            let current = self.find_by_id(subscription.id).await?;
            return Ok(VerifyOutcome {
                success: current.status == SubscriptionStatus::Active,
                subscription: current,
            });
        };

        if let Some(coupon_id) = active.coupon_id {
            sqlx::query(
                "UPDATE coupons SET current_uses = current_uses + 1, updated_at = now() WHERE id = $1",
            )
            .bind(coupon_id)
            .execute(&mut *tx)
            .await?;
        }

        // Unique index on external_id backstops the CAS
        sqlx::query(
            r#"
            INSERT INTO invoices
                (id, user_id, amount, currency, status, provider,
                 subscription_id, external_id, tier, description, receipt_url, paid_at)
            VALUES ($1, $2, $3, $4, 'paid', $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (external_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&active.user_id)
        .bind(amount)
        .bind(&currency)
        .bind(active.provider)
        .bind(active.id)
        .bind(external_id)
        .bind(active.tier.to_string())
        .bind(plan_description(active.tier, active.is_annual))
        .bind(&payment.receipt_url)
        .bind(start)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            subscription_id = %active.id,
            provider = %active.provider,
            amount = amount,
            currency = %currency,
            "Subscription activated"
        );

        Ok(VerifyOutcome {
            success: true,
            subscription: active,
        })
    }

    /// Cancel a subscription. This is a local status flip only; no
    /// provider-side cancellation is issued. Idempotent: cancelling an
    /// already-cancelled subscription succeeds.
    pub async fn cancel(
        &self,
        subscription_id: Uuid,
        user_id: &str,
        is_admin: bool,
    ) -> BillingResult<Subscription> {
        let subscription = self.find_by_id(subscription_id).await?;

        if !is_admin && subscription.user_id != user_id {
            return Err(BillingError::Unauthorized(
                "Subscription does not belong to this user".to_string(),
            ));
        }

        if subscription.status == SubscriptionStatus::Cancelled {
            return Ok(subscription);
        }

        let cancelled: Subscription = sqlx::query_as(
            r#"
            UPDATE subscriptions
            SET status = 'cancelled', updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(subscription_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(subscription_id = %subscription_id, "Subscription cancelled");

        Ok(cancelled)
    }

    /// Reconciliation sweep: cancel pending subscriptions whose checkout
    /// was opened (or attempted) more than `older_than_hours` ago and
    /// never verified. Returns the number of rows cancelled.
    pub async fn expire_orphaned_pending(&self, older_than_hours: i64) -> BillingResult<u64> {
        let cutoff = OffsetDateTime::now_utc() - Duration::hours(older_than_hours);

        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'cancelled', updated_at = now()
            WHERE status = 'pending' AND created_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let expired = result.rows_affected();
        if expired > 0 {
            tracing::info!(count = expired, "Expired orphaned pending subscriptions");
        }

        Ok(expired)
    }

    pub async fn find_by_id(&self, id: Uuid) -> BillingResult<Subscription> {
        let subscription: Option<Subscription> =
            sqlx::query_as("SELECT * FROM subscriptions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        subscription.ok_or_else(|| BillingError::NotFound("Subscription not found".to_string()))
    }

    /// Lookup by provider reference, falling back to the subscription id
    /// (Paystack uses the subscription id as its reference).
    async fn find_by_reference(&self, reference: &str) -> BillingResult<Subscription> {
        let by_external: Option<Subscription> =
            sqlx::query_as("SELECT * FROM subscriptions WHERE external_transaction_id = $1")
                .bind(reference)
                .fetch_optional(&self.pool)
                .await?;

        if let Some(subscription) = by_external {
            return Ok(subscription);
        }

        match reference.parse::<Uuid>() {
            Ok(id) => self.find_by_id(id).await,
            Err(_) => Err(BillingError::NotFound(
                "Subscription not found".to_string(),
            )),
        }
    }
}

/// One calendar year later; Feb 29 starts fall back to a 365-day offset.
fn one_year_after(start: OffsetDateTime) -> OffsetDateTime {
    start
        .replace_year(start.year() + 1)
        .unwrap_or_else(|_| start + Duration::days(365))
}

fn plan_description(tier: Tier, is_annual: bool) -> String {
    format!(
        "Payflow {} Plan ({})",
        tier.display_name(),
        if is_annual { "Annual" } else { "Monthly" }
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use sqlx::PgPool;
    use time::macros::datetime;

    #[test]
    fn test_one_year_after_plain_date() {
        let start = datetime!(2026-08-23 12:00:00 UTC);
        assert_eq!(one_year_after(start), datetime!(2027-08-23 12:00:00 UTC));
    }

    #[test]
    fn test_one_year_after_leap_day() {
        let start = datetime!(2028-02-29 09:30:00 UTC);
        // 2029 has no Feb 29; falls back to 365 days out
        assert_eq!(one_year_after(start), datetime!(2029-02-28 09:30:00 UTC));
    }

    #[test]
    fn test_plan_description() {
        assert_eq!(
            plan_description(Tier::Portfolio, true),
            "Payflow Portfolio Plan (Annual)"
        );
        assert_eq!(
            plan_description(Tier::Project, false),
            "Payflow Project Plan (Monthly)"
        );
    }

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = payflow_shared::create_pool(&url, 5)
            .await
            .expect("Failed to create pool");
        payflow_shared::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    fn test_service(pool: PgPool) -> SubscriptionService {
        SubscriptionService::new(pool, Arc::new(ProviderRegistry::default()))
    }

    async fn insert_pending(
        pool: &PgPool,
        user_id: &str,
        external_id: Option<&str>,
        coupon_id: Option<Uuid>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (id, user_id, tier, is_annual, status, provider,
                 external_transaction_id, coupon_id, discounted_price_cents)
            VALUES ($1, $2, 'project', FALSE, 'pending', 'stripe', $3, $4, 7110)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(external_id)
        .bind(coupon_id)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    fn paid_payment() -> VerifiedPayment {
        VerifiedPayment {
            paid: true,
            provider_status: "paid".to_string(),
            amount: Some(71.10),
            currency: Some("USD".to_string()),
            receipt_url: None,
        }
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_activation_is_idempotent() {
        let pool = test_pool().await;
        let service = test_service(pool.clone());

        let coupon_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO coupons
                (id, code, is_active, valid_from, valid_until, discount_percent, max_uses)
            VALUES ($1, $2, TRUE, now() - interval '1 day', now() + interval '30 days', 10, 100)
            "#,
        )
        .bind(coupon_id)
        .bind(format!("ONCE-{}", &coupon_id.simple().to_string()[..8]))
        .execute(&pool)
        .await
        .unwrap();

        let external_id = format!("cs_test_{}", Uuid::new_v4().simple());
        let subscription_id =
            insert_pending(&pool, "user-once", Some(&external_id), Some(coupon_id)).await;
        let subscription = service.find_by_id(subscription_id).await.unwrap();

        let first = service
            .activate(&subscription, &external_id, &paid_payment())
            .await
            .unwrap();
        assert!(first.success);
        assert_eq!(first.subscription.status, SubscriptionStatus::Active);
        let start = first.subscription.start_date.unwrap();
        let end = first.subscription.end_date.unwrap();
        assert_eq!(end, one_year_after(start));

        // Replayed activation with the same reference reports success
        // without re-crediting
        let second = service
            .activate(&subscription, &external_id, &paid_payment())
            .await
            .unwrap();
        assert!(second.success);
        assert_eq!(second.subscription.status, SubscriptionStatus::Active);

        let invoices: i64 =
            sqlx::query_scalar("SELECT count(*) FROM invoices WHERE subscription_id = $1")
                .bind(subscription_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(invoices, 1);

        let uses: i32 = sqlx::query_scalar("SELECT current_uses FROM coupons WHERE id = $1")
            .bind(coupon_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(uses, 1);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_verify_rejects_foreign_subscription() {
        let pool = test_pool().await;
        let service = test_service(pool.clone());

        let subscription_id = insert_pending(&pool, "owner-1", None, None).await;

        let err = service
            .verify(&subscription_id.to_string(), "intruder")
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Unauthorized(_)));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_verify_without_checkout_reports_unpaid() {
        let pool = test_pool().await;
        let service = test_service(pool.clone());

        // Pending row whose checkout was never opened
        let subscription_id = insert_pending(&pool, "user-stub", None, None).await;

        let outcome = service
            .verify(&subscription_id.to_string(), "user-stub")
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.subscription.status, SubscriptionStatus::Pending);
    }
}
