//! Quota ledger repository.

use crate::error::MetadataResult;
use crate::models::QuotaRow;
use async_trait::async_trait;
use sheetpress_core::{QuotaDecision, QuotaRolloverPolicy, Tier};
use time::OffsetDateTime;

/// Repository for per-owner quota records.
#[async_trait]
pub trait QuotaRepo: Send + Sync {
    /// Get an owner's quota record.
    async fn get_quota(&self, owner_id: &str) -> MetadataResult<Option<QuotaRow>>;

    /// Check the free allotment and reserve one slot if available.
    ///
    /// Lazily creates the record. Paid owners are always admitted. For free
    /// owners the rollover policy is applied first, then the
    /// check-and-increment runs as one atomic conditional update: two racing
    /// calls at the allotment boundary admit exactly one.
    async fn reserve_slot(
        &self,
        owner_id: &str,
        allotment: i64,
        policy: QuotaRolloverPolicy,
        now: OffsetDateTime,
    ) -> MetadataResult<QuotaDecision>;

    /// Return a reserved slot (decrement floored at zero). Used only when a
    /// job fails validation before any extraction attempt was made.
    async fn release_slot(&self, owner_id: &str, now: OffsetDateTime) -> MetadataResult<()>;

    /// Set an owner's tier. Driven by the billing collaborator's webhook;
    /// lazily creates the record.
    async fn set_tier(
        &self,
        owner_id: &str,
        tier: Tier,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;
}
