use crate::analytics::day_key;
use crate::error::{Error, Result};
use crate::store::{ErrorUpsert, Store};
use crate::types::{Analytics, AnalyticDeltas, BucketKey, ErrorEvent, EventId};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// Embedded in-memory store. The dashmap entry API holds the shard lock
/// for the duration of a read-modify-write, which gives the per-key
/// atomicity the pipeline requires without any store-external locking.
#[derive(Debug, Default)]
pub struct MemoryStore {
    errors: DashMap<(String, String), ErrorEvent>,
    analytics: DashMap<(String, i64), Analytics>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Merge a re-occurrence into the stored record: bump counters and
/// refresh the volatile content fields with the latest occurrence.
fn merge_occurrence(stored: &mut ErrorEvent, incoming: ErrorEvent) {
    stored.count += 1;
    stored.last_seen = incoming.last_seen;
    *stored
        .evolution
        .entry(day_key(incoming.last_seen))
        .or_insert(0) += 1;
    stored.logs = incoming.logs;
    stored.user_interactions = incoming.user_interactions;
    stored.metrics = incoming.metrics;
    stored.badges = incoming.badges;
    stored.snippet = incoming.snippet;
    stored.user_agent = incoming.user_agent;
    stored.client_ip = incoming.client_ip;
    stored.host = incoming.host;
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_error(&self, event: ErrorEvent) -> Result<ErrorUpsert> {
        let key = (event.ticket.clone(), event.fingerprint.clone());
        match self.errors.entry(key) {
            Entry::Occupied(mut occupied) => {
                merge_occurrence(occupied.get_mut(), event);
                Ok(ErrorUpsert {
                    event: occupied.get().clone(),
                    created: false,
                })
            }
            Entry::Vacant(vacant) => {
                let mut event = event;
                event.id = EventId::Assigned(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
                vacant.insert(event.clone());
                Ok(ErrorUpsert {
                    event,
                    created: true,
                })
            }
        }
    }

    async fn find_error(&self, ticket: &str, fingerprint: &str) -> Result<Option<ErrorEvent>> {
        Ok(self
            .errors
            .get(&(ticket.to_string(), fingerprint.to_string()))
            .map(|entry| entry.clone()))
    }

    async fn set_resolved(&self, ticket: &str, fingerprint: &str, resolved: bool) -> Result<()> {
        let mut entry = self
            .errors
            .get_mut(&(ticket.to_string(), fingerprint.to_string()))
            .ok_or_else(|| Error::NotFound(format!("error {ticket}/{fingerprint}")))?;
        entry.resolved = resolved;
        Ok(())
    }

    async fn mark_seen(&self, ticket: &str, fingerprint: &str, user: &str) -> Result<()> {
        let mut entry = self
            .errors
            .get_mut(&(ticket.to_string(), fingerprint.to_string()))
            .ok_or_else(|| Error::NotFound(format!("error {ticket}/{fingerprint}")))?;
        if !entry.seen_by.iter().any(|u| u == user) {
            entry.seen_by.push(user.to_string());
        }
        Ok(())
    }

    async fn apply_analytics(&self, key: &BucketKey, deltas: &AnalyticDeltas) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut doc = self
            .analytics
            .entry((key.ticket.clone(), key.month))
            .or_insert_with(|| Analytics {
                ticket: key.ticket.clone(),
                month: key.month,
                human_readable_month: key.human_month.clone(),
                aggregated_monthly_data: crate::types::AnalyticData::at(key.month, 0),
                data: Default::default(),
                created_at: now,
                updated_at: now,
            });
        doc.data
            .entry(key.bucket_key())
            .or_insert_with(|| crate::types::AnalyticData::at(key.day, key.hour))
            .apply(deltas);
        doc.aggregated_monthly_data.apply(deltas);
        doc.updated_at = now;
        Ok(())
    }

    async fn analytics_in_range(
        &self,
        ticket: &str,
        from_month: i64,
        to_month: i64,
    ) -> Result<Vec<Analytics>> {
        let mut docs: Vec<Analytics> = self
            .analytics
            .iter()
            .filter(|entry| {
                let (t, month) = entry.key();
                t == ticket && (from_month..=to_month).contains(month)
            })
            .map(|entry| entry.value().clone())
            .collect();
        docs.sort_by_key(|doc| doc.month);
        Ok(docs)
    }
}
