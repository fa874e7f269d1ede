use crate::useragent::{Browser, Device, Platform};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum number of recent log lines a client may attach to an event.
pub const MAX_LOGS: usize = 50;
/// Maximum number of recorded user interactions per event.
pub const MAX_USER_INTERACTIONS: usize = 50;
/// Maximum number of badge entries per event.
pub const MAX_BADGES: usize = 200;
/// Maximum number of snippet entries per event.
pub const MAX_SNIPPET: usize = 50;

/// Store-assigned identity of a persisted error event.
///
/// A freshly submitted event is `Unassigned`; the store assigns an id on
/// first insert. Modeled as a sum type so "not yet persisted" is a
/// type-checked state rather than a sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventId {
    #[default]
    Unassigned,
    Assigned(i64),
}

impl EventId {
    pub fn is_assigned(&self) -> bool {
        matches!(self, EventId::Assigned(_))
    }

    pub fn is_unassigned(&self) -> bool {
        !self.is_assigned()
    }

    pub fn value(&self) -> Option<i64> {
        match self {
            EventId::Assigned(id) => Some(*id),
            EventId::Unassigned => None,
        }
    }
}

/// Client adapter that reported the event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adapter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
}

/// One captured log line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub log: String,
}

/// System details reported alongside an event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub browser: String,
    #[serde(default)]
    pub is_mobile: String,
}

/// An element the user interacted with before the error occurred.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInteraction {
    pub timestamp: i64,
    pub element: String,
    pub inner_text: String,
    pub element_id: String,
    pub location: String,
}

/// One error occurrence as reported by an adapter, or the aggregated
/// record stored under its (ticket, fingerprint) key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    #[serde(default, skip_serializing_if = "EventId::is_unassigned")]
    pub id: EventId,
    pub message: String,
    #[serde(default)]
    pub stacktrace: String,
    /// Occurrences per day, keyed by the day's midnight epoch millis.
    /// Server-populated; must be empty on submission.
    #[serde(default)]
    pub evolution: HashMap<String, i64>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub line: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub adapter: Adapter,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub badges: HashMap<String, String>,
    #[serde(default)]
    pub snippet: HashMap<String, String>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub ticket: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub metrics: SystemMetrics,
    #[serde(default)]
    pub user_interactions: Vec<UserInteraction>,
    /// Input-only flag; when set, the client IP is blanked before the
    /// event reaches the store.
    #[serde(default, skip_serializing)]
    pub anonymize_data: bool,
    #[serde(default)]
    pub client_ip: String,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub resolved: bool,
    /// Operator ids that acknowledged the event. Server-populated; must
    /// be empty on submission.
    #[serde(default)]
    pub seen_by: Vec<String>,
    #[serde(default)]
    pub last_seen: i64,
}

impl ErrorEvent {
    /// Validate size and shape limits on a freshly submitted event.
    ///
    /// Pure predicate: returns false iff any bound is exceeded or a
    /// server-populated field (`seen_by`, `evolution`) is non-empty.
    /// Callers must reject the event outright on false.
    pub fn is_valid(&self) -> bool {
        if self.logs.len() > MAX_LOGS {
            return false;
        }
        if self.user_interactions.len() > MAX_USER_INTERACTIONS {
            return false;
        }
        if !self.seen_by.is_empty() {
            return false;
        }
        if self.badges.len() > MAX_BADGES {
            return false;
        }
        if self.snippet.len() > MAX_SNIPPET {
            return false;
        }
        if !self.evolution.is_empty() {
            return false;
        }
        true
    }
}

/// A customer project/service. The ticket is the partition key for all
/// stored data; the webhook URL, when set, receives alert notifications.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub name: String,
    pub ticket: String,
    #[serde(default)]
    pub slack_webhook_url: Option<String>,
}

/// Raw page-visit event sent by an adapter. Transient: never persisted
/// verbatim, only folded into buckets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticEvent {
    pub ticket: String,
    #[serde(default)]
    pub is_new_visitor: bool,
    #[serde(default)]
    pub is_new_session: bool,
    #[serde(default)]
    pub time_on_page: i64,
    #[serde(default)]
    pub referrer: String,
    pub page: String,
    #[serde(default)]
    pub user_agent: String,
}

/// One time-bucketed rollup at (day, hour) granularity, or the monthly
/// summary. Counters are append-only accumulators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticData {
    pub day: i64,
    pub hour: i64,
    #[serde(default)]
    pub windows: i64,
    #[serde(default)]
    pub mac: i64,
    #[serde(default)]
    pub linux: i64,
    #[serde(default)]
    pub other_platforms: i64,
    #[serde(default)]
    pub chrome: i64,
    #[serde(default)]
    pub firefox: i64,
    #[serde(default)]
    pub safari: i64,
    #[serde(default)]
    pub edge: i64,
    #[serde(default)]
    pub ie: i64,
    #[serde(default)]
    pub opera: i64,
    #[serde(default)]
    pub other_browsers: i64,
    #[serde(default)]
    pub mobile: i64,
    #[serde(default)]
    pub tablet: i64,
    #[serde(default)]
    pub desktop: i64,
    #[serde(default)]
    pub visits: i64,
    #[serde(default)]
    pub new_visitors: i64,
    #[serde(default)]
    pub sessions: i64,
    #[serde(default)]
    pub total_time_on_page: i64,
    #[serde(default)]
    pub pages: HashMap<String, i64>,
    #[serde(default)]
    pub referrer: HashMap<String, i64>,
}

impl AnalyticData {
    /// Empty bucket positioned at (day, hour).
    pub fn at(day: i64, hour: i64) -> Self {
        Self {
            day,
            hour,
            ..Self::default()
        }
    }

    /// Fold one event's deltas into this accumulator. Counters only ever
    /// grow; the store applies the same deltas to the bucket and to the
    /// owning month's rollup so both stay consistent.
    pub fn apply(&mut self, d: &AnalyticDeltas) {
        match d.platform {
            Platform::Windows => self.windows += 1,
            Platform::Mac => self.mac += 1,
            Platform::Linux => self.linux += 1,
            Platform::Other => self.other_platforms += 1,
        }
        match d.browser {
            Browser::Chrome => self.chrome += 1,
            Browser::Firefox => self.firefox += 1,
            Browser::Safari => self.safari += 1,
            Browser::Edge => self.edge += 1,
            Browser::Ie => self.ie += 1,
            Browser::Opera => self.opera += 1,
            Browser::Other => self.other_browsers += 1,
        }
        match d.device {
            Device::Mobile => self.mobile += 1,
            Device::Tablet => self.tablet += 1,
            Device::Desktop => self.desktop += 1,
        }
        self.visits += 1;
        if d.new_visitor {
            self.new_visitors += 1;
        }
        if d.new_session {
            self.sessions += 1;
        }
        self.total_time_on_page += d.time_on_page;
        *self.pages.entry(d.page.clone()).or_insert(0) += 1;
        if !d.referrer.is_empty() {
            *self.referrer.entry(d.referrer.clone()).or_insert(0) += 1;
        }
    }
}

/// Classified increments derived from one analytic event. The store
/// applies these atomically to a bucket and its monthly rollup.
#[derive(Debug, Clone)]
pub struct AnalyticDeltas {
    pub platform: Platform,
    pub browser: Browser,
    pub device: Device,
    pub new_visitor: bool,
    pub new_session: bool,
    pub time_on_page: i64,
    pub page: String,
    pub referrer: String,
}

/// Address of one (day, hour) bucket within a project's month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketKey {
    pub ticket: String,
    /// Epoch millis of the month's first midnight.
    pub month: i64,
    /// Label like "August 2026", stored on the analytics document.
    pub human_month: String,
    /// Epoch millis of the day's midnight.
    pub day: i64,
    /// Hour of day, 0-23.
    pub hour: i64,
}

impl BucketKey {
    /// Stable key of the bucket inside the document's data map.
    pub fn bucket_key(&self) -> String {
        format!("{}-{}", self.day, self.hour)
    }
}

/// Analytics document for one (ticket, month).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub ticket: String,
    pub month: i64,
    pub human_readable_month: String,
    /// Incrementally maintained sum of all buckets in `data`.
    pub aggregated_monthly_data: AnalyticData,
    pub data: HashMap<String, AnalyticData>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

/// Read-side view over a time window: totals plus the ordered bucket
/// sequence. Computed on demand, never stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticInsights {
    pub timeframe_start: i64,
    pub timeframe_end: i64,
    pub total_visits: i64,
    pub total_new_visitors: i64,
    pub total_sessions: i64,
    #[serde(rename = "pageViews")]
    pub data: Vec<AnalyticData>,
}
