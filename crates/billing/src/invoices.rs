//! Invoice aggregation
//!
//! Locally written invoices are authoritative; provider histories are
//! fetched live by email and merged in as best-effort extras. A
//! provider lookup failure is logged and skipped, never fatal.
//! Deduplication is keyed on the provider transaction id.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use payflow_shared::{Invoice, Provider};

use crate::error::{BillingError, BillingResult};
use crate::providers::{ProviderCharge, ProviderRegistry};

/// One row of a user's billing history. Locally stored invoices carry
/// an id and usually a subscription link; provider-fetched rows carry
/// neither.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceEntry {
    pub id: Option<Uuid>,
    pub amount: f64,
    pub currency: String,
    pub status: String,
    pub provider: Provider,
    pub subscription_id: Option<Uuid>,
    pub external_id: String,
    pub tier: Option<String>,
    pub description: String,
    pub receipt_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Invoice> for InvoiceEntry {
    fn from(invoice: Invoice) -> Self {
        Self {
            id: Some(invoice.id),
            amount: invoice.amount,
            currency: invoice.currency,
            status: invoice.status,
            provider: invoice.provider,
            subscription_id: invoice.subscription_id,
            external_id: invoice.external_id,
            tier: invoice.tier,
            description: invoice.description,
            receipt_url: invoice.receipt_url,
            created_at: invoice.created_at,
        }
    }
}

impl InvoiceEntry {
    fn from_charge(provider: Provider, charge: ProviderCharge) -> Self {
        Self {
            id: None,
            amount: charge.amount,
            currency: charge.currency,
            status: charge.status,
            provider,
            subscription_id: None,
            external_id: charge.external_id,
            tier: None,
            description: charge.description,
            receipt_url: charge.receipt_url,
            created_at: charge.created_at,
        }
    }
}

pub struct InvoiceService {
    pool: PgPool,
    providers: Arc<ProviderRegistry>,
}

impl InvoiceService {
    pub fn new(pool: PgPool, providers: Arc<ProviderRegistry>) -> Self {
        Self { pool, providers }
    }

    /// Full billing history for a user, newest first. Callers may only
    /// read their own history unless they are an administrator.
    pub async fn list(
        &self,
        user_id: &str,
        email: &str,
        caller_id: &str,
        is_admin: bool,
    ) -> BillingResult<Vec<InvoiceEntry>> {
        if !is_admin && user_id != caller_id {
            return Err(BillingError::Unauthorized(
                "Cannot read another user's invoices".to_string(),
            ));
        }

        let local: Vec<Invoice> = sqlx::query_as(
            "SELECT * FROM invoices WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut remote = Vec::new();
        for (provider, adapter) in self.providers.configured() {
            match adapter.list_charges(email).await {
                Ok(charges) => {
                    remote.extend(
                        charges
                            .into_iter()
                            .map(|c| InvoiceEntry::from_charge(provider, c)),
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        provider = %provider,
                        error = %e,
                        "Provider history lookup failed, skipping"
                    );
                }
            }
        }

        Ok(merge_invoices(
            local.into_iter().map(InvoiceEntry::from).collect(),
            remote,
        ))
    }
}

/// Merge local and provider-fetched entries, dropping any fetched entry
/// whose external id is already present, then order newest first.
fn merge_invoices(local: Vec<InvoiceEntry>, remote: Vec<InvoiceEntry>) -> Vec<InvoiceEntry> {
    let mut seen: HashSet<String> = local.iter().map(|e| e.external_id.clone()).collect();

    let mut merged = local;
    for entry in remote {
        if seen.insert(entry.external_id.clone()) {
            merged.push(entry);
        }
    }

    merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn entry(external_id: &str, age_days: i64, local: bool) -> InvoiceEntry {
        InvoiceEntry {
            id: local.then(Uuid::new_v4),
            amount: 79.0,
            currency: "USD".to_string(),
            status: "paid".to_string(),
            provider: Provider::Stripe,
            subscription_id: None,
            external_id: external_id.to_string(),
            tier: None,
            description: "Payflow Project Plan (Monthly)".to_string(),
            receipt_url: None,
            created_at: OffsetDateTime::now_utc() - Duration::days(age_days),
        }
    }

    #[test]
    fn test_remote_duplicate_of_local_is_dropped() {
        let local = vec![entry("cs_1", 1, true)];
        let remote = vec![entry("cs_1", 1, false), entry("ch_2", 2, false)];
        let merged = merge_invoices(local, remote);
        assert_eq!(merged.len(), 2);
        // The surviving cs_1 is the local one
        assert!(merged.iter().any(|e| e.external_id == "cs_1" && e.id.is_some()));
    }

    #[test]
    fn test_duplicates_within_remote_are_dropped() {
        let remote = vec![entry("T1", 1, false), entry("T1", 1, false)];
        let merged = merge_invoices(vec![], remote);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_merged_output_is_newest_first() {
        let local = vec![entry("a", 5, true), entry("b", 1, true)];
        let remote = vec![entry("c", 3, false)];
        let merged = merge_invoices(local, remote);
        let ids: Vec<&str> = merged.iter().map(|e| e.external_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(merge_invoices(vec![], vec![]).is_empty());
    }
}
