use crate::alert::AlertDispatcher;
use crate::analytics::day_key;
use crate::config::AlertingConfig;
use crate::error::{Error, Result};
use crate::fingerprint;
use crate::store::Store;
use crate::types::{ErrorEvent, Service};
use std::sync::Arc;

/// What ingestion did with the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// First sighting of the fingerprint for this ticket.
    Created,
    /// Merged into an existing record.
    Merged,
}

/// Which occurrences trigger an alert beyond the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertPolicy {
    /// Alert only when a fingerprint is first created.
    OnCreate,
    /// Alert on creation and again whenever the occurrence count is a
    /// multiple of n.
    EveryNth(u64),
}

impl AlertPolicy {
    pub fn from_config(alerting: &AlertingConfig) -> Self {
        match alerting.realert_every {
            0 => AlertPolicy::OnCreate,
            n => AlertPolicy::EveryNth(n),
        }
    }

    fn should_alert(&self, outcome: IngestOutcome, count: i64) -> bool {
        match (self, outcome) {
            (_, IngestOutcome::Created) => true,
            (AlertPolicy::OnCreate, IngestOutcome::Merged) => false,
            (AlertPolicy::EveryNth(n), IngestOutcome::Merged) => {
                count > 0 && count as u64 % n == 0
            }
        }
    }
}

/// The central state-changing operation: validate, fingerprint, then
/// merge-or-insert against the store. Stateless across calls; safe to
/// share and call concurrently.
pub struct Ingestor {
    store: Arc<dyn Store>,
    dispatcher: Arc<AlertDispatcher>,
    policy: AlertPolicy,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: Arc<AlertDispatcher>,
        policy: AlertPolicy,
    ) -> Self {
        Self {
            store,
            dispatcher,
            policy,
        }
    }

    /// Ingest one error event reported for `service`.
    ///
    /// Validation failure rejects the payload before any store access.
    /// Otherwise the event is upserted atomically under its (ticket,
    /// fingerprint) key, and a qualifying occurrence triggers an alert
    /// dispatched on a detached task; ingestion never waits on delivery.
    pub async fn ingest(&self, service: &Service, event: ErrorEvent) -> Result<IngestOutcome> {
        self.ingest_at(service, event, chrono::Utc::now().timestamp_millis())
            .await
    }

    /// Like [`ingest`](Self::ingest) with an explicit arrival time.
    pub async fn ingest_at(
        &self,
        service: &Service,
        mut event: ErrorEvent,
        now_ms: i64,
    ) -> Result<IngestOutcome> {
        if !event.is_valid() {
            return Err(Error::Validation(
                "payload exceeds size limits or contains server-populated fields".into(),
            ));
        }

        // Server-owned fields; whatever the client sent is overridden.
        event.ticket = service.ticket.clone();
        event.fingerprint = fingerprint::compute(&event);
        event.count = 1;
        event.last_seen = now_ms;
        event.resolved = false;
        event.seen_by.clear();
        event.evolution.clear();
        event.evolution.insert(day_key(now_ms), 1);
        if event.timestamp == 0 {
            event.timestamp = now_ms;
        }
        if event.anonymize_data {
            event.client_ip.clear();
        }

        let upsert = self.store.upsert_error(event).await?;
        let outcome = if upsert.created {
            IngestOutcome::Created
        } else {
            IngestOutcome::Merged
        };

        if self.policy.should_alert(outcome, upsert.event.count) {
            let dispatcher = self.dispatcher.clone();
            let service = service.clone();
            let event = upsert.event;
            tokio::spawn(async move {
                dispatcher.dispatch(&service, &event).await;
            });
        }

        Ok(outcome)
    }
}
