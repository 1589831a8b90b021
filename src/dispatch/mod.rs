//! Alert and rollback dispatch (PRM-006)
//!
//! Turns audit events and drift verdicts into operator notifications and
//! fans them out to the configured channels. Delivery is at-least-once
//! with bounded retry per channel; a channel that stays down after the
//! retry budget is reported in the delivery outcome, never silently
//! dropped.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::{AuditEvent, EventKind};
use crate::drift::{DriftStatus, DriftVerdict};

/// What a notification announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    /// A drift verdict crossed the warning threshold
    DriftWarning,
    /// A drift verdict crossed the critical threshold
    DriftCritical,
    /// A version was promoted into Production
    PromotionCompleted,
    /// A promotion attempt failed its gate
    GateRejected,
    /// A production version was rolled back
    RollbackExecuted,
    /// Rollback left the slot without a healthy version
    SlotUnhealthy,
}

/// One message bound for the notification channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub slot: String,
    pub model_version_id: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl Notification {
    /// Map an audit event to a notification, if it is operator-relevant.
    pub fn from_event(event: &AuditEvent) -> Option<Self> {
        let kind = match event.kind {
            EventKind::PromotedToProduction => NotificationKind::PromotionCompleted,
            EventKind::GateRejected => NotificationKind::GateRejected,
            EventKind::RolledBack => NotificationKind::RollbackExecuted,
            EventKind::SlotUnhealthy => NotificationKind::SlotUnhealthy,
            _ => return None,
        };
        let mut message = event.reason.clone();
        if let Some(failing) = event.details.get("failing_metrics") {
            message = format!("{message}: {failing}");
        }
        Some(Self {
            kind,
            slot: event.slot.clone(),
            model_version_id: event.model_version_id.clone(),
            message,
            occurred_at: event.recorded_at,
        })
    }

    /// Map a drift verdict to a notification. Stable verdicts are quiet.
    pub fn from_verdict(slot: &str, verdict: &DriftVerdict) -> Option<Self> {
        let kind = match verdict.status {
            DriftStatus::Stable => return None,
            DriftStatus::Warning => NotificationKind::DriftWarning,
            DriftStatus::Critical => NotificationKind::DriftCritical,
        };
        Some(Self {
            kind,
            slot: slot.to_string(),
            model_version_id: verdict.model_version_id.clone(),
            message: format!("drifting features: {}", verdict.triggering_features.join(", ")),
            occurred_at: verdict.window_end,
        })
    }
}

/// Errors from a notification channel
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("channel unavailable: {0}")]
    Unavailable(String),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// A notification channel (pager, chat webhook, ticket queue, ...).
pub trait Notifier: Send + Sync {
    /// Channel name, used in delivery reports
    fn name(&self) -> &str;

    /// Deliver one notification
    fn notify(&self, notification: &Notification) -> std::result::Result<(), NotifyError>;
}

/// Per-channel outcome of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Channels that acknowledged delivery
    pub delivered: Vec<String>,
    /// Channels that failed after the full retry budget, with the last error
    pub failed: Vec<(String, String)>,
}

impl DeliveryReport {
    /// Whether every channel acknowledged
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fan-out dispatcher over a set of notification channels.
pub struct Dispatcher {
    notifiers: Vec<Box<dyn Notifier>>,
    max_attempts: usize,
}

impl Dispatcher {
    /// Dispatcher with the default retry budget of 3 attempts per channel
    pub fn new() -> Self {
        Self { notifiers: Vec::new(), max_attempts: 3 }
    }

    /// Override the per-channel attempt budget (minimum 1)
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Add a notification channel
    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifiers.push(Box::new(notifier));
        self
    }

    /// Deliver a notification to every channel.
    ///
    /// Each channel is retried independently up to the attempt budget, so
    /// one dead channel never starves the others. Retries mean a channel
    /// may observe the same notification more than once.
    pub fn dispatch(&self, notification: &Notification) -> DeliveryReport {
        let mut report = DeliveryReport { delivered: Vec::new(), failed: Vec::new() };

        for notifier in &self.notifiers {
            let mut last_error = String::new();
            let mut done = false;
            for _ in 0..self.max_attempts {
                match notifier.notify(notification) {
                    Ok(()) => {
                        report.delivered.push(notifier.name().to_string());
                        done = true;
                        break;
                    }
                    Err(err) => last_error = err.to_string(),
                }
            }
            if !done {
                report.failed.push((notifier.name().to_string(), last_error));
            }
        }

        report
    }

    /// Dispatch the notification derived from an audit event, if any.
    pub fn dispatch_event(&self, event: &AuditEvent) -> Option<DeliveryReport> {
        Notification::from_event(event).map(|n| self.dispatch(&n))
    }

    /// Dispatch the notification derived from a drift verdict, if any.
    pub fn dispatch_verdict(&self, slot: &str, verdict: &DriftVerdict) -> Option<DeliveryReport> {
        Notification::from_verdict(slot, verdict).map(|n| self.dispatch(&n))
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Channel that writes one line per notification to stderr.
#[derive(Debug, Default)]
pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn name(&self) -> &str {
        "stderr"
    }

    fn notify(&self, n: &Notification) -> std::result::Result<(), NotifyError> {
        eprintln!(
            "[{:?}] slot={} version={} {}",
            n.kind, n.slot, n.model_version_id, n.message
        );
        Ok(())
    }
}

/// In-memory channel for tests; records everything it is handed.
#[derive(Debug, Default)]
pub struct BufferNotifier {
    received: Mutex<Vec<Notification>>,
}

impl BufferNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far
    pub fn received(&self) -> Vec<Notification> {
        self.received.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Notifier for BufferNotifier {
    fn name(&self) -> &str {
        "buffer"
    }

    fn notify(&self, notification: &Notification) -> std::result::Result<(), NotifyError> {
        self.received
            .lock()
            .map_err(|_| NotifyError::Unavailable("buffer lock poisoned".into()))?
            .push(notification.clone());
        Ok(())
    }
}

impl<N: Notifier + ?Sized> Notifier for std::sync::Arc<N> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn notify(&self, notification: &Notification) -> std::result::Result<(), NotifyError> {
        (**self).notify(notification)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::audit::{AuditEvent, EventKind};
    use crate::controller::Stage;
    use crate::drift::{DriftStatus, DriftVerdict};

    fn notification(kind: NotificationKind) -> Notification {
        Notification {
            kind,
            slot: "slot-a".to_string(),
            model_version_id: "v1".to_string(),
            message: "test".to_string(),
            occurred_at: Utc::now(),
        }
    }

    /// Fails the first `failures` deliveries, then succeeds.
    struct FlakyNotifier {
        failures: usize,
        attempts: Arc<AtomicUsize>,
    }

    impl Notifier for FlakyNotifier {
        fn name(&self) -> &str {
            "flaky"
        }

        fn notify(&self, _n: &Notification) -> std::result::Result<(), NotifyError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                Err(NotifyError::Unavailable("down".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_delivery_succeeds_within_retry_budget() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new()
            .with_notifier(FlakyNotifier { failures: 2, attempts: Arc::clone(&attempts) });

        let report = dispatcher.dispatch(&notification(NotificationKind::DriftCritical));
        assert!(report.all_delivered());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_exhausted_budget_reports_failure() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new()
            .with_max_attempts(2)
            .with_notifier(FlakyNotifier { failures: 5, attempts: Arc::clone(&attempts) });

        let report = dispatcher.dispatch(&notification(NotificationKind::SlotUnhealthy));
        assert!(!report.all_delivered());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "flaky");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dead_channel_does_not_starve_others() {
        let buffer = Arc::new(BufferNotifier::new());
        let attempts = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new()
            .with_notifier(FlakyNotifier { failures: 100, attempts })
            .with_notifier(Arc::clone(&buffer));

        let report = dispatcher.dispatch(&notification(NotificationKind::RollbackExecuted));
        assert_eq!(report.delivered, vec!["buffer".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(buffer.received().len(), 1);
    }

    #[test]
    fn test_event_mapping() {
        let rolled_back = AuditEvent::new(EventKind::RolledBack, "slot-a", "v2", "critical drift")
            .with_edge(Stage::Production, Stage::Staging);
        let n = Notification::from_event(&rolled_back).unwrap();
        assert_eq!(n.kind, NotificationKind::RollbackExecuted);
        assert_eq!(n.slot, "slot-a");

        let rejected =
            AuditEvent::new(EventKind::GateRejected, "slot-a", "v3", "staging gate failed")
                .with_detail("failing_metrics", "accuracy");
        let n = Notification::from_event(&rejected).unwrap();
        assert_eq!(n.kind, NotificationKind::GateRejected);
        assert!(n.message.contains("accuracy"));

        // Routine transitions stay quiet.
        let retired = AuditEvent::new(EventKind::Retired, "slot-a", "v1", "displaced");
        assert!(Notification::from_event(&retired).is_none());
    }

    #[test]
    fn test_verdict_mapping() {
        let verdict = DriftVerdict {
            model_version_id: "v1".to_string(),
            window_start: Utc::now(),
            window_end: Utc::now(),
            scores: BTreeMap::new(),
            status: DriftStatus::Warning,
            triggering_features: vec!["reading_score".to_string()],
        };
        let n = Notification::from_verdict("slot-a", &verdict).unwrap();
        assert_eq!(n.kind, NotificationKind::DriftWarning);
        assert!(n.message.contains("reading_score"));

        let stable = DriftVerdict { status: DriftStatus::Stable, ..verdict };
        assert!(Notification::from_verdict("slot-a", &stable).is_none());
    }
}
