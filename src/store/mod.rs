//! Store seam for the pipeline. All durable state lives behind this
//! trait; the pipeline components hold no state of their own across
//! calls. Contended read-modify-write is pushed into the store as single
//! atomic capabilities (`upsert_error`, `apply_analytics`) so the core
//! never needs in-process locking of its own.

pub mod memory;
pub mod sqlite;

use crate::error::Result;
use crate::types::{Analytics, AnalyticDeltas, BucketKey, ErrorEvent};
use async_trait::async_trait;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Result of an error upsert: the stored record (id assigned, count
/// current) and whether this call created it.
#[derive(Debug, Clone)]
pub struct ErrorUpsert {
    pub event: ErrorEvent,
    pub created: bool,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Atomic increment-or-create keyed by (ticket, fingerprint).
    ///
    /// The event must arrive validated, fingerprinted, with `count == 1`
    /// and `last_seen` set. Not found: insert as-is and assign an id.
    /// Found: increment the count, bump `last_seen` and the day's
    /// evolution counter, and refresh the volatile content fields (logs,
    /// user interactions, metrics, badges, snippet) from the new
    /// occurrence. Two concurrent upserts of the same key must never both
    /// report `created`, and no increment may be lost.
    async fn upsert_error(&self, event: ErrorEvent) -> Result<ErrorUpsert>;

    /// Look up the aggregated record for (ticket, fingerprint).
    async fn find_error(&self, ticket: &str, fingerprint: &str) -> Result<Option<ErrorEvent>>;

    /// Operator action: flip the resolved flag. Never called by ingestion.
    async fn set_resolved(&self, ticket: &str, fingerprint: &str, resolved: bool) -> Result<()>;

    /// Operator action: record that `user` has acknowledged the event.
    /// Idempotent per user.
    async fn mark_seen(&self, ticket: &str, fingerprint: &str, user: &str) -> Result<()>;

    /// Apply one analytic event's deltas to the addressed bucket and to
    /// the month's rollup, lazily creating document and bucket. All
    /// increments land atomically as a unit: a failure applies none of
    /// them.
    async fn apply_analytics(&self, key: &BucketKey, deltas: &AnalyticDeltas) -> Result<()>;

    /// Analytics documents for a ticket with `from_month <= month <=
    /// to_month`, ordered by month.
    async fn analytics_in_range(
        &self,
        ticket: &str,
        from_month: i64,
        to_month: i64,
    ) -> Result<Vec<Analytics>>;
}
