//! Subscription pricing table
//!
//! Pure tier/period -> price lookup in USD cents. Unknown tiers never
//! reach this module: the lossy tier parse in `payflow-shared` maps
//! them to Project first.

use payflow_shared::Tier;

/// Price in USD cents for a tier and billing period.
///
/// Annual plans are priced at 10x monthly (two months free).
pub fn price_cents(tier: Tier, is_annual: bool) -> i64 {
    let (monthly, annual) = match tier {
        Tier::Project => (7_900, 79_000),
        Tier::Program => (18_900, 189_000),
        Tier::Portfolio => (44_900, 449_000),
    };
    if is_annual {
        annual
    } else {
        monthly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TIERS: [Tier; 3] = [Tier::Project, Tier::Program, Tier::Portfolio];

    #[test]
    fn test_known_prices() {
        assert_eq!(price_cents(Tier::Project, false), 7_900);
        assert_eq!(price_cents(Tier::Project, true), 79_000);
        assert_eq!(price_cents(Tier::Program, false), 18_900);
        assert_eq!(price_cents(Tier::Portfolio, true), 449_000);
    }

    #[test]
    fn test_pricing_is_deterministic() {
        for tier in ALL_TIERS {
            for is_annual in [false, true] {
                assert_eq!(
                    price_cents(tier, is_annual),
                    price_cents(tier, is_annual)
                );
            }
        }
    }

    #[test]
    fn test_annual_is_discounted_vs_monthly() {
        for tier in ALL_TIERS {
            assert!(price_cents(tier, true) < 12 * price_cents(tier, false));
        }
    }

    #[test]
    fn test_unknown_tier_falls_back_to_project_pricing() {
        let tier = Tier::from_str_lossy("not-a-plan");
        assert_eq!(price_cents(tier, false), 7_900);
    }
}
