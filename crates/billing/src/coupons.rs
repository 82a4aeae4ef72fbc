//! Coupon lookup and validation
//!
//! Validation is read-only: the usage counter is incremented by the
//! subscription orchestrator inside the activation transaction, never
//! here. Applying a coupon twice through this service is therefore
//! always safe.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use payflow_shared::{Coupon, Tier};

use crate::error::{BillingError, BillingResult};

/// Result of validating a coupon against a base price
#[derive(Debug, Clone, Serialize)]
pub struct CouponQuote {
    pub coupon_id: Option<Uuid>,
    pub discounted_price_cents: i64,
    pub discount_percent: i32,
    pub discount_amount: i64,
}

impl CouponQuote {
    /// Quote for the no-coupon case: price unchanged
    fn pass_through(base_price_cents: i64) -> Self {
        Self {
            coupon_id: None,
            discounted_price_cents: base_price_cents,
            discount_percent: 0,
            discount_amount: 0,
        }
    }
}

/// Coupon validation service
pub struct CouponService {
    pool: PgPool,
}

impl CouponService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Validate a coupon code for a tier and compute the discounted
    /// price in cents. A missing code is not an error: it yields a
    /// pass-through quote with no discount.
    pub async fn validate(
        &self,
        code: Option<&str>,
        tier: Tier,
        base_price_cents: i64,
    ) -> BillingResult<CouponQuote> {
        let code = match code.map(str::trim) {
            Some(c) if !c.is_empty() => c.to_uppercase(),
            _ => return Ok(CouponQuote::pass_through(base_price_cents)),
        };

        let coupon: Option<Coupon> = sqlx::query_as("SELECT * FROM coupons WHERE code = $1")
            .bind(&code)
            .fetch_optional(&self.pool)
            .await?;

        let coupon = coupon.ok_or(BillingError::CouponNotFound)?;

        check_coupon(&coupon, tier, OffsetDateTime::now_utc())?;

        Ok(CouponQuote {
            coupon_id: Some(coupon.id),
            discounted_price_cents: discounted_price(
                base_price_cents,
                coupon.discount_amount,
                coupon.discount_percent,
            ),
            discount_percent: coupon.discount_percent.unwrap_or(0),
            discount_amount: coupon.discount_amount.unwrap_or(0),
        })
    }
}

/// Eligibility checks, separated from the lookup so the full rejection
/// matrix is unit-testable.
pub(crate) fn check_coupon(coupon: &Coupon, tier: Tier, now: OffsetDateTime) -> BillingResult<()> {
    if !coupon.is_active {
        return Err(BillingError::CouponInactive);
    }
    if now < coupon.valid_from || now > coupon.valid_until {
        return Err(BillingError::CouponExpired);
    }
    if let Some(max_uses) = coupon.max_uses {
        if coupon.current_uses >= max_uses {
            return Err(BillingError::CouponExhausted);
        }
    }
    if !coupon.applicable_tiers.is_empty()
        && !coupon.applicable_tiers.iter().any(|t| t == &tier.to_string())
    {
        return Err(BillingError::CouponTierMismatch);
    }
    Ok(())
}

/// Discounted price in cents, floored at zero.
///
/// A fixed discount amount (whole currency units) takes precedence over
/// a percentage; both absent or zero means no discount.
pub(crate) fn discounted_price(
    base_price_cents: i64,
    discount_amount: Option<i64>,
    discount_percent: Option<i32>,
) -> i64 {
    if let Some(amount) = discount_amount.filter(|a| *a > 0) {
        return (base_price_cents - amount * 100).max(0);
    }
    if let Some(percent) = discount_percent.filter(|p| *p > 0) {
        let discounted = (base_price_cents as f64) * (1.0 - percent as f64 / 100.0);
        return (discounted.round() as i64).max(0);
    }
    base_price_cents
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use time::Duration;

    fn test_coupon() -> Coupon {
        let now = OffsetDateTime::now_utc();
        Coupon {
            id: Uuid::new_v4(),
            code: "WELCOME10".to_string(),
            is_active: true,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(30),
            discount_percent: Some(10),
            discount_amount: None,
            max_uses: Some(100),
            current_uses: 0,
            applicable_tiers: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_valid_coupon_passes_all_checks() {
        let coupon = test_coupon();
        assert!(check_coupon(&coupon, Tier::Project, OffsetDateTime::now_utc()).is_ok());
    }

    #[test]
    fn test_inactive_coupon_rejected() {
        let coupon = Coupon {
            is_active: false,
            ..test_coupon()
        };
        let err = check_coupon(&coupon, Tier::Project, OffsetDateTime::now_utc()).unwrap_err();
        assert!(matches!(err, BillingError::CouponInactive));
    }

    #[test]
    fn test_coupon_outside_validity_window_rejected() {
        let now = OffsetDateTime::now_utc();
        let not_yet_valid = Coupon {
            valid_from: now + Duration::days(1),
            valid_until: now + Duration::days(30),
            ..test_coupon()
        };
        assert!(matches!(
            check_coupon(&not_yet_valid, Tier::Project, now).unwrap_err(),
            BillingError::CouponExpired
        ));

        let lapsed = Coupon {
            valid_from: now - Duration::days(30),
            valid_until: now - Duration::days(1),
            ..test_coupon()
        };
        assert!(matches!(
            check_coupon(&lapsed, Tier::Project, now).unwrap_err(),
            BillingError::CouponExpired
        ));
    }

    #[test]
    fn test_exhausted_coupon_rejected() {
        let coupon = Coupon {
            max_uses: Some(5),
            current_uses: 5,
            ..test_coupon()
        };
        assert!(matches!(
            check_coupon(&coupon, Tier::Project, OffsetDateTime::now_utc()).unwrap_err(),
            BillingError::CouponExhausted
        ));
    }

    #[test]
    fn test_unlimited_coupon_never_exhausts() {
        let coupon = Coupon {
            max_uses: None,
            current_uses: 1_000_000,
            ..test_coupon()
        };
        assert!(check_coupon(&coupon, Tier::Project, OffsetDateTime::now_utc()).is_ok());
    }

    #[test]
    fn test_tier_restriction() {
        let coupon = Coupon {
            applicable_tiers: vec!["program".to_string(), "portfolio".to_string()],
            ..test_coupon()
        };
        let now = OffsetDateTime::now_utc();
        assert!(check_coupon(&coupon, Tier::Program, now).is_ok());
        assert!(matches!(
            check_coupon(&coupon, Tier::Project, now).unwrap_err(),
            BillingError::CouponTierMismatch
        ));
    }

    #[test]
    fn test_empty_tier_list_applies_to_all() {
        let coupon = test_coupon();
        let now = OffsetDateTime::now_utc();
        for tier in [Tier::Project, Tier::Program, Tier::Portfolio] {
            assert!(check_coupon(&coupon, tier, now).is_ok());
        }
    }

    #[test]
    fn test_percent_discount() {
        // 10% off 7900 -> 7110 (the §8 worked example)
        assert_eq!(discounted_price(7_900, None, Some(10)), 7_110);
        assert_eq!(discounted_price(18_900, None, Some(50)), 9_450);
    }

    #[test]
    fn test_fixed_amount_takes_precedence_over_percent() {
        // $20 fixed beats the 10% even though both are set
        assert_eq!(discounted_price(7_900, Some(20), Some(10)), 5_900);
    }

    #[test]
    fn test_discount_never_goes_negative() {
        assert_eq!(discounted_price(7_900, Some(1_000), None), 0);
        assert_eq!(discounted_price(7_900, None, Some(100)), 0);
    }

    #[test]
    fn test_zero_or_absent_discount_is_pass_through() {
        assert_eq!(discounted_price(7_900, None, None), 7_900);
        assert_eq!(discounted_price(7_900, Some(0), Some(0)), 7_900);
    }

    #[test]
    fn test_discount_never_exceeds_base() {
        for base in [0, 1, 99, 7_900, 449_000] {
            for pct in [0, 1, 10, 50, 99, 100] {
                let price = discounted_price(base, None, Some(pct));
                assert!(price <= base);
                assert!(price >= 0);
            }
        }
    }
}
