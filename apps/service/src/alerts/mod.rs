// Alert System - cooldown-gated notifications on status transitions

pub mod sink;
pub mod webhook;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::AlertConfig;
use crate::monitoring::types::{Check, Target};

pub use sink::{AlertSink, SinkError};
pub use webhook::WebhookSink;

/// Title and body sent to every sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn for_check(target: &Target, check: &Check, now: DateTime<Utc>) -> Self {
        let time = now.to_rfc3339();

        if check.is_up {
            Self {
                title: format!("🟢 {} is UP", target.name),
                message: format!(
                    "**{}** ({}) is back UP!\nResponse Time: {}ms\nTime: {}",
                    target.name, target.url, check.response_time_ms, time
                ),
            }
        } else {
            let reason = match (&check.error, check.status_code) {
                (Some(error), _) => error.clone(),
                (None, Some(code)) => format!("HTTP {}", code),
                (None, None) => "HTTP unknown".to_string(),
            };
            Self {
                title: format!("🔴 {} is DOWN", target.name),
                message: format!(
                    "**{}** ({}) is DOWN!\nError: {}\nTime: {}",
                    target.name, target.url, reason, time
                ),
            }
        }
    }
}

/// Delivery result for one sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { sink: String },
    Failed { sink: String, error: String },
}

/// What a call to [`Alerter::notify`] ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Disabled,
    NoSinks,
    CoolingDown,
    Dispatched(Vec<DeliveryOutcome>),
}

/// Last dispatch time per target, in memory only
#[derive(Debug, Default)]
pub struct CooldownStore {
    last_alerts: Mutex<HashMap<Uuid, Instant>>,
}

impl CooldownStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the right to alert for `target_id` at `now`
    ///
    /// Succeeds when no alert was dispatched within `window`; the claim is
    /// recorded before returning so concurrent callers cannot both win.
    pub fn try_claim(&self, target_id: Uuid, now: Instant, window: Duration) -> bool {
        let mut last_alerts = self.last_alerts.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(last) = last_alerts.get(&target_id) {
            if now.saturating_duration_since(*last) < window {
                return false;
            }
        }

        last_alerts.insert(target_id, now);
        true
    }
}

/// Alerter - dispatches transition notifications to every registered sink
pub struct Alerter {
    enabled: bool,
    cooldown: Duration,
    sinks: Vec<Arc<dyn AlertSink>>,
    cooldowns: CooldownStore,
}

impl Alerter {
    pub fn new(enabled: bool, cooldown: Duration) -> Self {
        Self { enabled, cooldown, sinks: Vec::new(), cooldowns: CooldownStore::new() }
    }

    /// Create from configuration, registering one webhook sink per entry
    pub fn from_config(config: &AlertConfig) -> Result<Self> {
        let cooldown = Duration::from_secs(config.cooldown_minutes.saturating_mul(60));
        let mut alerter = Self::new(config.enabled, cooldown);

        for webhook in &config.webhooks {
            alerter.add_sink(Arc::new(WebhookSink::new(webhook)?));
        }

        Ok(alerter)
    }

    pub fn add_sink(&mut self, sink: Arc<dyn AlertSink>) {
        self.sinks.push(sink);
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Notify sinks about a check that flipped its target's status
    ///
    /// Never fails: sink errors are logged and reported in the outcome.
    pub async fn notify(&self, target: &Target, check: &Check) -> NotifyOutcome {
        if !self.enabled {
            return NotifyOutcome::Disabled;
        }
        if self.sinks.is_empty() {
            return NotifyOutcome::NoSinks;
        }
        if !self.cooldowns.try_claim(target.id, Instant::now(), self.cooldown) {
            debug!(monitor = %target.name, "Alert suppressed by cooldown");
            return NotifyOutcome::CoolingDown;
        }

        let notification = Notification::for_check(target, check, Utc::now());

        let deliveries = self.sinks.iter().map(|sink| {
            let notification = &notification;
            async move {
                let name = sink.name().to_string();
                match sink.deliver(&notification.title, &notification.message).await {
                    Ok(()) => {
                        info!(sink = %name, "Alert sent: {}", notification.title);
                        DeliveryOutcome::Delivered { sink: name }
                    }
                    Err(e) => {
                        error!(sink = %name, "Failed to send alert: {}", e);
                        DeliveryOutcome::Failed { sink: name, error: e.to_string() }
                    }
                }
            }
        });

        NotifyOutcome::Dispatched(join_all(deliveries).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::test_target;
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingSink {
        received: Mutex<Vec<Notification>>,
    }

    impl RecordingSink {
        fn count(&self) -> usize {
            self.received.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn deliver(&self, title: &str, message: &str) -> Result<(), SinkError> {
            self.received.lock().unwrap().push(Notification {
                title: title.to_string(),
                message: message.to_string(),
            });
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct RejectingSink;

    #[async_trait]
    impl AlertSink for RejectingSink {
        async fn deliver(&self, _title: &str, _message: &str) -> Result<(), SinkError> {
            Err(SinkError::Status(502))
        }

        fn name(&self) -> &str {
            "rejecting"
        }
    }

    fn check(target: &Target, is_up: bool) -> Check {
        Check {
            target_id: target.id,
            status_code: Some(if is_up { 200 } else { 503 }),
            response_time_ms: 87,
            is_up,
            error: (!is_up).then(|| "Expected status 200, got 503".to_string()),
            ssl_days_remaining: None,
            checked_at: Utc::now(),
        }
    }

    fn alerter_with(sink: Arc<dyn AlertSink>, cooldown: Duration) -> Alerter {
        let mut alerter = Alerter::new(true, cooldown);
        alerter.add_sink(sink);
        alerter
    }

    #[test]
    fn test_cooldown_minutes_from_config() {
        let config = AlertConfig { enabled: true, cooldown_minutes: 5, webhooks: Vec::new() };
        assert_eq!(Alerter::from_config(&config).unwrap().cooldown, Duration::from_secs(300));

        let config = AlertConfig { cooldown_minutes: u64::MAX, ..config };
        assert_eq!(Alerter::from_config(&config).unwrap().cooldown, Duration::from_secs(u64::MAX));
    }

    #[tokio::test]
    async fn test_disabled_is_noop() {
        let sink = Arc::new(RecordingSink::default());
        let mut alerter = Alerter::new(false, Duration::ZERO);
        alerter.add_sink(sink.clone());
        let target = test_target("http://example.com");

        assert_eq!(alerter.notify(&target, &check(&target, false)).await, NotifyOutcome::Disabled);
        assert_eq!(sink.count(), 0);
    }

    #[tokio::test]
    async fn test_no_sinks_is_noop() {
        let alerter = Alerter::new(true, Duration::ZERO);
        let target = test_target("http://example.com");

        assert_eq!(alerter.notify(&target, &check(&target, false)).await, NotifyOutcome::NoSinks);
    }

    #[tokio::test]
    async fn test_cooldown_ignores_direction() {
        let sink = Arc::new(RecordingSink::default());
        let alerter = alerter_with(sink.clone(), Duration::from_secs(300));
        let target = test_target("http://example.com");

        let first = alerter.notify(&target, &check(&target, false)).await;
        assert!(matches!(first, NotifyOutcome::Dispatched(_)));

        // Recovery and a second failure inside the window are both suppressed
        assert_eq!(alerter.notify(&target, &check(&target, true)).await, NotifyOutcome::CoolingDown);
        assert_eq!(alerter.notify(&target, &check(&target, false)).await, NotifyOutcome::CoolingDown);
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test]
    async fn test_cooldown_is_per_target() {
        let sink = Arc::new(RecordingSink::default());
        let alerter = alerter_with(sink.clone(), Duration::from_secs(300));
        let a = test_target("http://a.example");
        let b = test_target("http://b.example");

        alerter.notify(&a, &check(&a, false)).await;
        alerter.notify(&b, &check(&b, false)).await;
        assert_eq!(sink.count(), 2);
    }

    #[tokio::test]
    async fn test_zero_cooldown_always_dispatches() {
        let sink = Arc::new(RecordingSink::default());
        let alerter = alerter_with(sink.clone(), Duration::ZERO);
        let target = test_target("http://example.com");

        alerter.notify(&target, &check(&target, false)).await;
        alerter.notify(&target, &check(&target, true)).await;
        assert_eq!(sink.count(), 2);
    }

    #[test]
    fn test_cooldown_window_boundary() {
        let store = CooldownStore::new();
        let id = Uuid::new_v4();
        let window = Duration::from_secs(300);
        let t0 = Instant::now();

        assert!(store.try_claim(id, t0, window));
        assert!(!store.try_claim(id, t0 + window - Duration::from_millis(1), window));
        assert!(store.try_claim(id, t0 + window, window));
        // The successful claim restarts the window
        assert!(!store.try_claim(id, t0 + window + Duration::from_secs(1), window));
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_others() {
        let recording = Arc::new(RecordingSink::default());
        let mut alerter = Alerter::new(true, Duration::ZERO);
        alerter.add_sink(Arc::new(RejectingSink));
        alerter.add_sink(recording.clone());
        let target = test_target("http://example.com");

        let outcome = alerter.notify(&target, &check(&target, false)).await;

        assert_eq!(
            outcome,
            NotifyOutcome::Dispatched(vec![
                DeliveryOutcome::Failed {
                    sink: "rejecting".to_string(),
                    error: "sink responded with status 502".to_string(),
                },
                DeliveryOutcome::Delivered { sink: "recording".to_string() },
            ])
        );
        assert_eq!(recording.count(), 1);
    }

    #[test]
    fn test_down_notification_text() {
        let target = test_target("http://example.com");
        let now = Utc::now();
        let notification = Notification::for_check(&target, &check(&target, false), now);

        assert_eq!(notification.title, "🔴 Example is DOWN");
        assert_eq!(
            notification.message,
            format!(
                "**Example** (http://example.com) is DOWN!\nError: Expected status 200, got 503\nTime: {}",
                now.to_rfc3339()
            )
        );
    }

    #[test]
    fn test_down_notification_falls_back_to_status() {
        let target = test_target("http://example.com");
        let mut down = check(&target, false);
        down.error = None;

        let notification = Notification::for_check(&target, &down, Utc::now());
        assert!(notification.message.contains("Error: HTTP 503"));
    }

    #[test]
    fn test_up_notification_text() {
        let target = test_target("http://example.com");
        let notification = Notification::for_check(&target, &check(&target, true), Utc::now());

        assert_eq!(notification.title, "🟢 Example is UP");
        assert!(notification.message.starts_with("**Example** (http://example.com) is back UP!"));
        assert!(notification.message.contains("Response Time: 87ms"));
    }
}
