//! Common types used across Payflow

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Subscription plan tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Project,
    Program,
    Portfolio,
}

impl Default for Tier {
    fn default() -> Self {
        Self::Project
    }
}

impl Tier {
    /// Parse a tier from string, falling back to Project for unknown
    /// values. The pricing table treats unknown tiers as Project rather
    /// than failing, so checkout never 500s on a stale client payload.
    pub fn from_str_lossy(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// Capitalized tier name for invoice/checkout descriptions
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Project => "Project",
            Self::Program => "Program",
            Self::Portfolio => "Portfolio",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Project => write!(f, "project"),
            Self::Program => write!(f, "program"),
            Self::Portfolio => write!(f, "portfolio"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "project" => Ok(Self::Project),
            "program" => Ok(Self::Program),
            "portfolio" => Ok(Self::Portfolio),
            _ => Err(format!("Invalid tier: {}", s)),
        }
    }
}

/// Payment provider backing a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Stripe,
    Paypal,
    Paystack,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stripe => write!(f, "stripe"),
            Self::Paypal => write!(f, "paypal"),
            Self::Paystack => write!(f, "paystack"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stripe" => Ok(Self::Stripe),
            "paypal" => Ok(Self::Paypal),
            "paystack" => Ok(Self::Paystack),
            _ => Err(format!("Invalid provider: {}", s)),
        }
    }
}

/// Subscription status
///
/// Transitions are pending -> active or pending|active -> cancelled.
/// Active and cancelled are terminal with respect to activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Cancelled,
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// Subscription model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: String,
    pub tier: Tier,
    pub is_annual: bool,
    pub status: SubscriptionStatus,
    pub provider: Provider,
    /// Provider-side handle (checkout session / order id / reference),
    /// set once the provider transaction has been opened
    pub external_transaction_id: Option<String>,
    pub coupon_id: Option<Uuid>,
    pub coupon_code: Option<String>,
    pub discounted_price_cents: i64,
    pub start_date: Option<OffsetDateTime>,
    pub end_date: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Coupon model
///
/// `current_uses` is owned by the store and only mutated through an
/// atomic increment at payment confirmation, never during validation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Coupon {
    pub id: Uuid,
    /// Unique, stored uppercase; lookups normalize to uppercase
    pub code: String,
    pub is_active: bool,
    pub valid_from: OffsetDateTime,
    pub valid_until: OffsetDateTime,
    /// Percentage discount (0-100); ignored when discount_amount is set
    pub discount_percent: Option<i32>,
    /// Fixed discount in whole currency units; takes precedence
    pub discount_amount: Option<i64>,
    /// None = unlimited
    pub max_uses: Option<i32>,
    pub current_uses: i32,
    /// Empty = valid for all tiers
    pub applicable_tiers: Vec<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Invoice model - created exactly once per completed payment, immutable
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub user_id: String,
    /// Decimal currency units (not minor units)
    pub amount: f64,
    pub currency: String,
    pub status: String,
    pub provider: Provider,
    pub subscription_id: Option<Uuid>,
    pub external_id: String,
    pub tier: Option<String>,
    pub description: String,
    pub receipt_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub paid_at: Option<OffsetDateTime>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_display_and_parse() {
        assert_eq!(format!("{}", Tier::Project), "project");
        assert_eq!(format!("{}", Tier::Portfolio), "portfolio");
        assert_eq!("program".parse::<Tier>().unwrap(), Tier::Program);
        assert_eq!("PORTFOLIO".parse::<Tier>().unwrap(), Tier::Portfolio);
        assert!("platinum".parse::<Tier>().is_err());
    }

    #[test]
    fn test_tier_lossy_parse_falls_back_to_project() {
        assert_eq!(Tier::from_str_lossy("program"), Tier::Program);
        assert_eq!(Tier::from_str_lossy("platinum"), Tier::Project);
        assert_eq!(Tier::from_str_lossy(""), Tier::Project);
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("stripe".parse::<Provider>().unwrap(), Provider::Stripe);
        assert_eq!("PayPal".parse::<Provider>().unwrap(), Provider::Paypal);
        assert_eq!("paystack".parse::<Provider>().unwrap(), Provider::Paystack);
        assert!("venmo".parse::<Provider>().is_err());
    }

    #[test]
    fn test_subscription_status_default_is_pending() {
        assert_eq!(SubscriptionStatus::default(), SubscriptionStatus::Pending);
    }
}
