use crate::types::ErrorEvent;
use once_cell::sync::Lazy;
use regex::Regex;
use xxhash_rust::xxh3::xxh3_64;

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});

static IP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}").unwrap());

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// Normalize an error message for fingerprinting. Volatile request data
/// (uuids, addresses, counters, timestamps embedded in the text) is
/// replaced with placeholders so repeats of the same error hash equally.
pub fn normalize_message(message: &str) -> String {
    let s = UUID_RE.replace_all(message, "<uuid>");
    let s = IP_RE.replace_all(&s, "<ip>");
    let s = NUMBER_RE.replace_all(&s, "<n>");
    s.to_lowercase().trim().to_string()
}

/// Compute the deduplication fingerprint for an event.
///
/// Identity is derived from the stable content only: adapter name, error
/// type, source path and line, and the normalized message. Fingerprint
/// equality is the sole merge key, so nothing request-specific (timestamp,
/// client IP, user agent) may participate.
pub fn compute(event: &ErrorEvent) -> String {
    let normalized = normalize_message(&event.message);
    let input = format!(
        "{}:{}:{}:{}:{normalized}",
        event.adapter.name, event.kind, event.path, event.line
    );
    let hash = xxh3_64(input.as_bytes());
    format!("{hash:016x}")
}
