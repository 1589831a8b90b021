//! Audit log (PRM-004)
//!
//! Append-only record of everything that happened to every deployment
//! slot. There is no mutable "current stage" anywhere in the system: the
//! stage of a version and the production occupant of a slot are always a
//! left-fold over this log ([`SlotView::replay`]), which makes state
//! reconstruction after a crash trivial and keeps read paths lock-free.
//!
//! Transitions append their events *before* acknowledging success
//! (write-ahead discipline); a multi-event transition goes through
//! [`AuditLog::append_batch`], which is all-or-nothing.

mod storage;

pub use storage::{AuditError, InMemoryLog, JsonFileLog, Result};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::controller::Stage;

/// What an audit event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Candidate passed the staging gate
    PromotedToStaging,
    /// Staging version passed the production gate and took the slot
    PromotedToProduction,
    /// Version left active service (displaced incumbent or retired from staging)
    Retired,
    /// Production version demoted to Staging by rollback
    RolledBack,
    /// Production version condemned; never to serve again
    Condemned,
    /// Previously retired incumbent reinstated to Production
    Reinstated,
    /// Gate preconditions not met; no state change
    GateRejected,
    /// Illegal edge or failed approval; no state change
    TransitionRejected,
    /// Rollback found no healthy fallback; slot needs an operator
    SlotUnhealthy,
}

/// One append-only log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub kind: EventKind,
    /// Deployment slot the event concerns
    pub slot: String,
    pub model_version_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_stage: Option<Stage>,
    /// Human-readable cause
    pub reason: String,
    /// Structured context (failing metrics, gate dataset ids, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Build an event; timestamps at construction time.
    pub fn new(kind: EventKind, slot: &str, model_version_id: &str, reason: impl Into<String>) -> Self {
        Self {
            kind,
            slot: slot.to_string(),
            model_version_id: model_version_id.to_string(),
            from_stage: None,
            to_stage: None,
            reason: reason.into(),
            details: BTreeMap::new(),
            recorded_at: Utc::now(),
        }
    }

    /// Record the stage edge this event represents
    pub fn with_edge(mut self, from: Stage, to: Stage) -> Self {
        self.from_stage = Some(from);
        self.to_stage = Some(to);
        self
    }

    /// Attach a structured detail
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Append-only audit log.
///
/// `append_batch` is the only mutation and must be all-or-nothing: either
/// every event of a transition becomes visible or none does.
pub trait AuditLog: Send + Sync {
    /// Append a batch of events atomically
    fn append_batch(&self, events: &[AuditEvent]) -> Result<()>;

    /// Every event, oldest first
    fn events(&self) -> Result<Vec<AuditEvent>>;

    /// Append a single event
    fn append(&self, event: AuditEvent) -> Result<()> {
        self.append_batch(std::slice::from_ref(&event))
    }

    /// Events for one slot, oldest first
    fn for_slot(&self, slot: &str) -> Result<Vec<AuditEvent>> {
        Ok(self.events()?.into_iter().filter(|e| e.slot == slot).collect())
    }

    /// Events referencing one version, oldest first
    fn for_version(&self, model_version_id: &str) -> Result<Vec<AuditEvent>> {
        Ok(self
            .events()?
            .into_iter()
            .filter(|e| e.model_version_id == model_version_id)
            .collect())
    }

    /// Events recorded inside `[from, to]`
    fn in_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<AuditEvent>> {
        Ok(self
            .events()?
            .into_iter()
            .filter(|e| e.recorded_at >= from && e.recorded_at <= to)
            .collect())
    }
}

/// Derived view of one deployment slot, reconstructed by replaying its
/// audit events from an empty state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SlotView {
    pub slot: String,
    /// Version currently occupying Production, if any
    pub production: Option<String>,
    /// The incumbent most recently displaced by a promotion; rollback's
    /// reinstatement candidate
    pub previous_production: Option<String>,
    /// Last known stage per version seen on this slot
    pub stages: BTreeMap<String, Stage>,
    /// Dataset id each version's staging gate was evaluated on
    pub staging_datasets: BTreeMap<String, String>,
    /// Whether rollback left the slot without a healthy version
    pub unhealthy: bool,
}

impl SlotView {
    /// Fold the slot's events (oldest first) into the current view.
    ///
    /// Replay is deterministic and idempotent: the same event sequence
    /// always reproduces the same view.
    pub fn replay<'a, I>(slot: &str, events: I) -> Self
    where
        I: IntoIterator<Item = &'a AuditEvent>,
    {
        let mut view = SlotView { slot: slot.to_string(), ..Default::default() };

        for event in events {
            if event.slot != slot {
                continue;
            }
            let version = event.model_version_id.clone();
            match event.kind {
                EventKind::PromotedToStaging => {
                    view.stages.insert(version.clone(), Stage::Staging);
                    if let Some(ds) = event.details.get("dataset_id") {
                        view.staging_datasets.insert(version, ds.clone());
                    }
                }
                EventKind::PromotedToProduction => {
                    view.stages.insert(version.clone(), Stage::Production);
                    view.production = Some(version);
                    view.unhealthy = false;
                }
                EventKind::Retired => {
                    view.stages.insert(version.clone(), Stage::Retired);
                    if view.production.as_deref() == Some(version.as_str()) {
                        view.production = None;
                        view.previous_production = Some(version);
                    }
                }
                EventKind::RolledBack => {
                    view.stages.insert(version.clone(), Stage::Staging);
                    if view.production.as_deref() == Some(version.as_str()) {
                        view.production = None;
                    }
                }
                EventKind::Condemned => {
                    view.stages.insert(version.clone(), Stage::RolledBack);
                    if view.production.as_deref() == Some(version.as_str()) {
                        view.production = None;
                    }
                }
                EventKind::Reinstated => {
                    view.stages.insert(version.clone(), Stage::Production);
                    view.production = Some(version);
                    // The rolled-back version is in Staging, not Retired;
                    // there is no further fallback until the next promotion.
                    view.previous_production = None;
                    view.unhealthy = false;
                }
                EventKind::SlotUnhealthy => {
                    view.unhealthy = true;
                }
                EventKind::GateRejected | EventKind::TransitionRejected => {}
            }
        }

        view
    }

    /// Current stage of a version on this slot; `Candidate` when the log
    /// has never recorded a transition for it.
    pub fn stage_of(&self, model_version_id: &str) -> Stage {
        self.stages.get(model_version_id).copied().unwrap_or(Stage::Candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn promote_batch(slot: &str, old: Option<&str>, new: &str) -> Vec<AuditEvent> {
        let mut batch = Vec::new();
        if let Some(old) = old {
            batch.push(
                AuditEvent::new(EventKind::Retired, slot, old, "displaced by promotion")
                    .with_edge(Stage::Production, Stage::Retired),
            );
        }
        batch.push(
            AuditEvent::new(EventKind::PromotedToProduction, slot, new, "production gate passed")
                .with_edge(Stage::Staging, Stage::Production),
        );
        batch
    }

    #[test]
    fn test_replay_empty() {
        let view = SlotView::replay("slot-a", []);
        assert!(view.production.is_none());
        assert!(!view.unhealthy);
        assert_eq!(view.stage_of("v1"), Stage::Candidate);
    }

    #[test]
    fn test_replay_promotion_sequence() {
        let mut events = vec![AuditEvent::new(
            EventKind::PromotedToStaging,
            "slot-a",
            "v1",
            "staging gate passed",
        )
        .with_edge(Stage::Candidate, Stage::Staging)
        .with_detail("dataset_id", "holdout-1")];
        events.extend(promote_batch("slot-a", None, "v1"));

        let view = SlotView::replay("slot-a", &events);
        assert_eq!(view.production.as_deref(), Some("v1"));
        assert_eq!(view.stage_of("v1"), Stage::Production);
        assert_eq!(view.staging_datasets.get("v1").map(String::as_str), Some("holdout-1"));
    }

    #[test]
    fn test_replay_displacement_tracks_previous() {
        let mut events = promote_batch("slot-a", None, "v1");
        events.extend(promote_batch("slot-a", Some("v1"), "v2"));

        let view = SlotView::replay("slot-a", &events);
        assert_eq!(view.production.as_deref(), Some("v2"));
        assert_eq!(view.previous_production.as_deref(), Some("v1"));
        assert_eq!(view.stage_of("v1"), Stage::Retired);
    }

    #[test]
    fn test_replay_rollback_and_reinstatement() {
        let mut events = promote_batch("slot-a", None, "v1");
        events.extend(promote_batch("slot-a", Some("v1"), "v2"));
        events.push(
            AuditEvent::new(EventKind::RolledBack, "slot-a", "v2", "sustained critical drift")
                .with_edge(Stage::Production, Stage::Staging),
        );
        events.push(
            AuditEvent::new(EventKind::Reinstated, "slot-a", "v1", "prior incumbent healthy")
                .with_edge(Stage::Retired, Stage::Production),
        );

        let view = SlotView::replay("slot-a", &events);
        assert_eq!(view.production.as_deref(), Some("v1"));
        assert_eq!(view.stage_of("v2"), Stage::Staging);
        assert!(view.previous_production.is_none());
        assert!(!view.unhealthy);
    }

    #[test]
    fn test_replay_unhealthy_slot() {
        let mut events = promote_batch("slot-a", None, "v1");
        events.push(
            AuditEvent::new(EventKind::RolledBack, "slot-a", "v1", "sustained critical drift")
                .with_edge(Stage::Production, Stage::Staging),
        );
        events.push(AuditEvent::new(
            EventKind::SlotUnhealthy,
            "slot-a",
            "v1",
            "no healthy fallback version",
        ));

        let view = SlotView::replay("slot-a", &events);
        assert!(view.production.is_none());
        assert!(view.unhealthy);
    }

    #[test]
    fn test_replay_ignores_other_slots() {
        let events = promote_batch("slot-b", None, "v9");
        let view = SlotView::replay("slot-a", &events);
        assert!(view.production.is_none());
        assert!(view.stages.is_empty());
    }

    #[test]
    fn test_rejections_do_not_change_state() {
        let mut events = promote_batch("slot-a", None, "v1");
        events.push(AuditEvent::new(
            EventKind::GateRejected,
            "slot-a",
            "v2",
            "accuracy out of bounds",
        ));
        events.push(AuditEvent::new(
            EventKind::TransitionRejected,
            "slot-a",
            "v2",
            "illegal edge",
        ));

        let view = SlotView::replay("slot-a", &events);
        assert_eq!(view.production.as_deref(), Some("v1"));
        assert_eq!(view.stage_of("v2"), Stage::Candidate);
    }

    #[test]
    fn test_replay_deterministic() {
        let mut events = promote_batch("slot-a", None, "v1");
        events.extend(promote_batch("slot-a", Some("v1"), "v2"));

        let a = SlotView::replay("slot-a", &events);
        let b = SlotView::replay("slot-a", &events);
        assert_eq!(a, b);
    }
}
