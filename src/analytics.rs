//! Aggregation of raw page-visit events into (day, hour) buckets with an
//! incrementally maintained monthly rollup, plus the read-side insights
//! view. Raw events are never retained.

use crate::error::Result;
use crate::store::Store;
use crate::types::{AnalyticData, AnalyticDeltas, AnalyticEvent, AnalyticInsights, BucketKey};
use crate::useragent;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use std::sync::Arc;

const DAY_MS: i64 = 86_400_000;
const HOUR_MS: i64 = 3_600_000;

/// Midnight epoch millis of the day containing `ts_ms`.
pub fn midnight_ms(ts_ms: i64) -> i64 {
    ts_ms - ts_ms.rem_euclid(DAY_MS)
}

/// Hour of day (0-23) for `ts_ms`.
pub fn hour_of(ts_ms: i64) -> i64 {
    ts_ms.rem_euclid(DAY_MS) / HOUR_MS
}

/// Evolution map key for the day containing `ts_ms`.
pub fn day_key(ts_ms: i64) -> String {
    midnight_ms(ts_ms).to_string()
}

fn utc(ts_ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts_ms).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Epoch millis of the first midnight of the month containing `ts_ms`.
pub fn month_start_ms(ts_ms: i64) -> i64 {
    let dt = utc(ts_ms);
    Utc.with_ymd_and_hms(dt.year(), dt.month(), 1, 0, 0, 0)
        .single()
        .map(|start| start.timestamp_millis())
        .unwrap_or(0)
}

/// Month label stored on the analytics document, e.g. "August 2026".
pub fn human_month(ts_ms: i64) -> String {
    utc(ts_ms).format("%B %Y").to_string()
}

/// Folds raw analytic events into per-(day, hour) buckets. Stateless
/// between calls; all accumulation lives in the store.
pub struct Aggregator {
    store: Arc<dyn Store>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Fold one event into the bucket for the current (day, hour) and the
    /// month's rollup.
    pub async fn record(&self, event: &AnalyticEvent) -> Result<()> {
        self.record_at(event, Utc::now().timestamp_millis()).await
    }

    /// Like [`record`](Self::record) with an explicit arrival time.
    pub async fn record_at(&self, event: &AnalyticEvent, arrived_ms: i64) -> Result<()> {
        let key = BucketKey {
            ticket: event.ticket.clone(),
            month: month_start_ms(arrived_ms),
            human_month: human_month(arrived_ms),
            day: midnight_ms(arrived_ms),
            hour: hour_of(arrived_ms),
        };

        let (platform, browser, device) = useragent::classify(&event.user_agent);
        let deltas = AnalyticDeltas {
            platform,
            browser,
            device,
            new_visitor: event.is_new_visitor,
            new_session: event.is_new_session,
            time_on_page: event.time_on_page,
            page: event.page.clone(),
            referrer: event.referrer.clone(),
        };

        self.store.apply_analytics(&key, &deltas).await
    }

    /// Totals plus the ordered bucket sequence for [from_ms, to_ms].
    pub async fn insights(
        &self,
        ticket: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<AnalyticInsights> {
        let docs = self
            .store
            .analytics_in_range(ticket, month_start_ms(from_ms), month_start_ms(to_ms))
            .await?;

        let mut buckets: Vec<AnalyticData> = docs
            .into_iter()
            .flat_map(|doc| doc.data.into_values())
            .filter(|bucket| {
                let at = bucket.day + bucket.hour * HOUR_MS;
                (from_ms..=to_ms).contains(&at)
            })
            .collect();
        buckets.sort_by_key(|bucket| (bucket.day, bucket.hour));

        Ok(AnalyticInsights {
            timeframe_start: from_ms,
            timeframe_end: to_ms,
            total_visits: buckets.iter().map(|b| b.visits).sum(),
            total_new_visitors: buckets.iter().map(|b| b.new_visitors).sum(),
            total_sessions: buckets.iter().map(|b| b.sessions).sum(),
            data: buckets,
        })
    }
}
