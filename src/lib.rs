//! faultline — ingestion and aggregation core for self-hosted error
//! tracking and web analytics.
//!
//! Client adapters report error events and page visits tagged with a
//! per-project ticket. Error events are validated, fingerprinted and
//! merged into one aggregated record per (ticket, fingerprint); page
//! visits are folded into (day, hour) buckets with an incrementally
//! maintained monthly rollup. Qualifying error occurrences trigger a
//! best-effort webhook notification that never blocks ingestion.
//!
//! The HTTP surface, authentication and dashboard are external
//! collaborators; durable state lives behind the [`store::Store`] trait.

pub mod alert;
pub mod analytics;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod ingest;
pub mod store;
pub mod types;
pub mod useragent;

pub use crate::error::{Error, Result};
