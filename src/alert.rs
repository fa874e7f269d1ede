use crate::types::{ErrorEvent, Service};
use serde_json::json;
use std::time::Duration;

/// Validate that a webhook URL is safe to call (no private/loopback targets).
pub fn validate_webhook_url(url: &str) -> Result<(), String> {
    let parsed = url::Url::parse(url).map_err(|e| format!("invalid URL: {e}"))?;
    match parsed.scheme() {
        "https" => {}
        "http" => {
            tracing::warn!(url = url, "webhook URL uses HTTP; HTTPS is recommended");
        }
        scheme => return Err(format!("unsupported scheme: {scheme}")),
    }
    if let Some(host) = parsed.host_str() {
        if host == "localhost"
            || host == "127.0.0.1"
            || host == "::1"
            || host.starts_with("10.")
            || host.starts_with("192.168.")
            || host.starts_with("169.254.")
            || (host.starts_with("172.")
                && host
                    .split('.')
                    .nth(1)
                    .and_then(|s| s.parse::<u8>().ok())
                    .is_some_and(|n| (16..=31).contains(&n)))
        {
            return Err(format!(
                "webhook URL must not point to private/loopback address: {host}"
            ));
        }
    }
    Ok(())
}

/// Posts best-effort alert notifications to a service's webhook.
///
/// Fire-and-forget relative to ingestion: delivery failures are logged
/// and swallowed, never surfaced and never retried. At most one attempt
/// per triggering call.
pub struct AlertDispatcher {
    client: reqwest::Client,
    client_url: String,
}

impl AlertDispatcher {
    /// Dispatcher with the default 10 second request timeout. Alert links
    /// point into the dashboard at `client_url`.
    pub fn new(client_url: impl Into<String>) -> Self {
        Self::with_timeout(client_url, Duration::from_secs(10))
    }

    pub fn with_timeout(client_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            client_url: client_url.into(),
        }
    }

    /// Send one notification for `event` to the service's webhook.
    /// Returns normally on every outcome.
    pub async fn dispatch(&self, service: &Service, event: &ErrorEvent) {
        let Some(url) = service.slack_webhook_url.as_deref() else {
            tracing::debug!(service = %service.name, "no webhook configured, alert skipped");
            return;
        };
        if let Err(e) = validate_webhook_url(url) {
            tracing::warn!(service = %service.name, error = %e, "webhook URL rejected, alert skipped");
            return;
        }

        let payload = build_payload(&self.client_url, service, event);
        match self.client.post(url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(
                    service = %service.name,
                    fingerprint = %event.fingerprint,
                    "alert sent"
                );
            }
            Ok(resp) => {
                tracing::warn!(
                    service = %service.name,
                    status = %resp.status(),
                    "alert delivery failed"
                );
            }
            Err(e) => {
                tracing::error!(service = %service.name, error = %e, "alert delivery error");
            }
        }
    }
}

/// Slack-style attachment body. `ts` carries the occurrence time in epoch
/// seconds.
fn build_payload(client_url: &str, service: &Service, event: &ErrorEvent) -> serde_json::Value {
    let event_ref = event
        .id
        .value()
        .map(|id| id.to_string())
        .unwrap_or_else(|| event.fingerprint.clone());

    json!({
        "attachments": [{
            "mrkdwn_in": ["text"],
            "color": "#FF0055",
            "pretext": format!("An error occurred in {}", service.name),
            "author_name": event.kind,
            "title": event.message,
            "title_link": format!(
                "{}/services/{}/error/{}",
                client_url.trim_end_matches('/'),
                service.id,
                event_ref
            ),
            "text": "Visit your dashboard for more details",
            "fields": [
                { "title": "In Service", "value": service.name, "short": true },
                { "title": "Occurrences", "value": event.count.to_string(), "short": true },
                { "title": "Resolved", "value": event.resolved.to_string(), "short": true },
                {
                    "title": "Adapter",
                    "value": format!("{} {}", event.adapter.name, event.adapter.version),
                    "short": true
                },
            ],
            "footer": "faultline",
            "ts": event.timestamp / 1000,
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Adapter, EventId};

    fn service() -> Service {
        Service {
            id: "svc-1".into(),
            name: "checkout".into(),
            ticket: "t1".into(),
            slack_webhook_url: Some("https://hooks.example.com/T000/B000".into()),
        }
    }

    fn event() -> ErrorEvent {
        ErrorEvent {
            id: EventId::Assigned(17),
            message: "payment declined unexpectedly".into(),
            kind: "PaymentError".into(),
            count: 4,
            timestamp: 1_724_580_000_000,
            adapter: Adapter {
                name: "browser".into(),
                kind: "javascript".into(),
                version: "1.2.0".into(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_payload_shape() {
        let payload = build_payload("https://app.example.com/", &service(), &event());
        let attachment = &payload["attachments"][0];

        assert_eq!(attachment["pretext"], "An error occurred in checkout");
        assert_eq!(attachment["author_name"], "PaymentError");
        assert_eq!(attachment["title"], "payment declined unexpectedly");
        assert_eq!(
            attachment["title_link"],
            "https://app.example.com/services/svc-1/error/17"
        );
        assert_eq!(attachment["ts"], 1_724_580_000);

        let fields = attachment["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0]["title"], "In Service");
        assert_eq!(fields[1]["value"], "4");
        assert_eq!(fields[2]["value"], "false");
        assert_eq!(fields[3]["value"], "browser 1.2.0");
        assert!(fields.iter().all(|f| f["short"] == true));
    }

    #[test]
    fn test_unpersisted_event_links_by_fingerprint() {
        let mut unpersisted = event();
        unpersisted.id = EventId::Unassigned;
        unpersisted.fingerprint = "deadbeefdeadbeef".into();
        let payload = build_payload("https://app.example.com", &service(), &unpersisted);
        assert_eq!(
            payload["attachments"][0]["title_link"],
            "https://app.example.com/services/svc-1/error/deadbeefdeadbeef"
        );
    }

    #[test]
    fn test_validate_webhook_url() {
        assert!(validate_webhook_url("https://hooks.example.com/x").is_ok());
        assert!(validate_webhook_url("ftp://hooks.example.com/x").is_err());
        assert!(validate_webhook_url("https://127.0.0.1/x").is_err());
        assert!(validate_webhook_url("https://192.168.1.4/x").is_err());
        assert!(validate_webhook_url("https://172.20.0.1/x").is_err());
        assert!(validate_webhook_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_dispatch_without_webhook_is_a_noop() {
        let dispatcher = AlertDispatcher::with_timeout("http://localhost:3000", Duration::from_millis(100));
        let mut service = service();
        service.slack_webhook_url = None;
        dispatcher.dispatch(&service, &event()).await;
    }
}
