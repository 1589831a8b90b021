//! Promotion Controller (PRM-005)
//!
//! The state machine governing a model version's lifecycle across stages,
//! with gated transitions driven by evaluation reports and drift verdicts.
//!
//! Stages flow `Candidate -> Staging -> Production -> {Retired | RolledBack}`,
//! with `Staging -> Retired`, forced rollback `Production -> Staging`, and
//! `Retired -> Production` reserved for rollback reinstatement. Edge
//! legality is validated centrally on [`Stage`]; everything else fails with
//! `InvalidTransition` and leaves state untouched.
//!
//! The controller keeps no mutable stage anywhere: every decision starts
//! by replaying the slot's audit events into a [`SlotView`], and every
//! transition appends its events before acknowledging success. Stage
//! mutations are serialized per deployment slot; distinct slots never
//! block each other.


use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::{AuditError, AuditEvent, AuditLog, EventKind, SlotView};
use crate::config::DeployConfig;
use crate::drift::verdicts::{InMemoryVerdicts, VerdictStore, VerdictStoreError};
use crate::drift::{DriftStatus, DriftVerdict};
use crate::evaluate::EvaluationReport;

/// A named position in a model version's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Freshly trained, not yet validated
    Candidate,
    /// Passed the staging gate; under shadow/canary validation
    Staging,
    /// Serving live traffic
    Production,
    /// Displaced or withdrawn from active service
    Retired,
    /// Condemned after rollback; never to serve again
    RolledBack,
}

impl Stage {
    /// Whether the edge from `self` to `target` is in the legal set.
    ///
    /// `Retired -> Production` is legal but only the rollback
    /// reinstatement path exercises it.
    pub fn can_transition_to(self, target: Stage) -> bool {
        matches!(
            (self, target),
            (Stage::Candidate, Stage::Staging)
                | (Stage::Staging, Stage::Production)
                | (Stage::Staging, Stage::Retired)
                | (Stage::Production, Stage::Retired)
                | (Stage::Production, Stage::Staging)
                | (Stage::Production, Stage::RolledBack)
                | (Stage::Retired, Stage::Production)
        )
    }

    /// Display name for the stage
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Candidate => "Candidate",
            Stage::Staging => "Staging",
            Stage::Production => "Production",
            Stage::Retired => "Retired",
            Stage::RolledBack => "RolledBack",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of an approval check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    Approved,
    Rejected,
    /// No decision yet; the attempt fails without consuming anything and
    /// may be retried once a decision exists.
    Pending,
}

/// Human-in-the-loop approval as an injected capability.
///
/// The controller never blocks waiting for a person; it asks the gate for
/// the current decision and fails the attempt if there is none yet.
pub trait ApprovalGate: Send + Sync {
    /// Current approval decision for promoting `version` into `slot`
    fn check(&self, slot: &str, version: &str) -> Approval;
}

/// Approval gate that approves everything; for automated pipelines and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl ApprovalGate for AutoApprove {
    fn check(&self, _slot: &str, _version: &str) -> Approval {
        Approval::Approved
    }
}

/// Errors from promotion controller operations
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Illegal state-machine edge attempted; state unchanged
    #[error("invalid transition for {version}: {from} -> {to}")]
    InvalidTransition { version: String, from: Stage, to: Stage },

    /// Gate preconditions not met; carries the failing metric names
    #[error("gate rejected for {version}: failing metrics {failing:?}")]
    GateRejected { version: String, failing: Vec<String> },

    /// The report passed in was produced for a different version
    #[error("report is for {report_version}, expected {version}")]
    ReportMismatch { version: String, report_version: String },

    /// Production promotion requires evaluation on a dataset other than
    /// the one the staging gate used
    #[error("production gate requires an independent evaluation; dataset '{dataset_id}' already used at the staging gate")]
    IndependentEvaluationRequired { dataset_id: String },

    #[error("approval pending for {version}")]
    ApprovalPending { version: String },

    #[error("approval rejected for {version}")]
    ApprovalRejected { version: String },

    /// Rollback found nothing safe to serve; operator intervention required
    #[error("no healthy version for slot {slot}")]
    NoHealthyVersion { slot: String },

    /// Slot not declared in the deployment configuration
    #[error("unknown deployment slot: {0}")]
    UnknownSlot(String),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Verdicts(#[from] VerdictStoreError),
}

/// Result type for controller operations
pub type Result<T> = std::result::Result<T, ControllerError>;

/// What a rollback did to the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// Prior incumbent reinstated to Production
    Reinstated { version: String },
    /// No safe fallback; the slot is explicitly unhealthy
    NoHealthyVersion,
}

/// Action taken in response to a recorded drift verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerdictAction {
    /// Verdict recorded; nothing to do
    None,
    /// Critical or warning verdict below the debounce threshold; alert only
    AlertRaised,
    /// Debounce threshold reached; rollback executed
    RollbackTriggered { outcome: RollbackOutcome },
}

/// Observer invoked for every successfully appended audit event.
pub type EventObserver = Box<dyn Fn(&AuditEvent) + Send + Sync>;

/// The promotion controller for a set of deployment slots.
pub struct PromotionController<L: AuditLog, A: ApprovalGate> {
    config: DeployConfig,
    log: L,
    approval: A,
    verdicts: Arc<dyn VerdictStore>,
    slot_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    observers: Mutex<Vec<EventObserver>>,
}

impl<L: AuditLog, A: ApprovalGate> PromotionController<L, A> {
    /// Create a controller with an in-memory verdict store.
    pub fn new(config: DeployConfig, log: L, approval: A) -> Self {
        Self {
            config,
            log,
            approval,
            verdicts: Arc::new(InMemoryVerdicts::new()),
            slot_locks: Mutex::new(HashMap::new()),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Use a persistent verdict store instead of the in-memory default.
    pub fn with_verdict_store(mut self, verdicts: Arc<dyn VerdictStore>) -> Self {
        self.verdicts = verdicts;
        self
    }

    /// Register an observer for appended audit events (alerting hook).
    pub fn on_event<F>(&self, observer: F)
    where
        F: Fn(&AuditEvent) + Send + Sync + 'static,
    {
        if let Ok(mut observers) = self.observers.lock() {
            observers.push(Box::new(observer));
        }
    }

    /// The audit log backing this controller
    pub fn log(&self) -> &L {
        &self.log
    }

    /// The active configuration
    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    fn slot_lock(&self, slot: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .slot_locks
            .lock()
            .map_err(|_| AuditError::Poisoned)
            .map_err(ControllerError::Audit)?;
        Ok(Arc::clone(locks.entry(slot.to_string()).or_default()))
    }

    /// Undeclared slots are a caller error rejected before the log is
    /// touched; there is no slot record to annotate.
    fn check_slot(&self, slot: &str) -> Result<()> {
        if !self.config.slots.is_empty() && !self.config.slots.iter().any(|s| s == slot) {
            return Err(ControllerError::UnknownSlot(slot.to_string()));
        }
        Ok(())
    }

    /// Derived view of a slot, replayed from the audit log.
    pub fn view(&self, slot: &str) -> Result<SlotView> {
        let events = self.log.for_slot(slot)?;
        Ok(SlotView::replay(slot, &events))
    }

    /// Current production version for a slot, answered purely from stored
    /// records.
    pub fn current_production(&self, slot: &str) -> Result<Option<String>> {
        Ok(self.view(slot)?.production)
    }

    /// Latest drift verdict recorded for a slot.
    pub fn latest_verdict(&self, slot: &str) -> Result<Option<DriftVerdict>> {
        Ok(self.verdicts.latest(slot)?)
    }

    /// Full audit history for a version, oldest first.
    pub fn history(&self, model_version_id: &str) -> Result<Vec<AuditEvent>> {
        Ok(self.log.for_version(model_version_id)?)
    }

    fn append(&self, events: Vec<AuditEvent>) -> Result<()> {
        self.log.append_batch(&events)?;
        if let Ok(observers) = self.observers.lock() {
            for event in &events {
                for observer in observers.iter() {
                    observer(event);
                }
            }
        }
        Ok(())
    }

    /// Record a rejected attempt so the audit log stays complete, then
    /// surface the original error.
    fn reject(&self, event: AuditEvent, err: ControllerError) -> ControllerError {
        match self.append(vec![event]) {
            Ok(()) => err,
            Err(append_err) => append_err,
        }
    }

    /// Promote a candidate into Staging.
    ///
    /// Requires a non-empty evaluation report for the version meeting the
    /// configured staging gate. Gate failures record a `GateRejected`
    /// audit event and carry the failing metric list.
    pub fn promote_to_staging(
        &self,
        slot: &str,
        version: &str,
        report: &EvaluationReport,
    ) -> Result<()> {
        self.check_slot(slot)?;
        let lock = self.slot_lock(slot)?;
        let _guard = lock.lock().map_err(|_| ControllerError::Audit(AuditError::Poisoned))?;

        let view = self.view(slot)?;
        let from = view.stage_of(version);
        if from != Stage::Candidate {
            return Err(self.reject(
                AuditEvent::new(EventKind::TransitionRejected, slot, version, "illegal edge")
                    .with_edge(from, Stage::Staging),
                ControllerError::InvalidTransition {
                    version: version.to_string(),
                    from,
                    to: Stage::Staging,
                },
            ));
        }

        if report.model_version_id != version {
            return Err(self.reject(
                AuditEvent::new(
                    EventKind::TransitionRejected,
                    slot,
                    version,
                    "report version mismatch",
                )
                .with_detail("report_version", report.model_version_id.clone()),
                ControllerError::ReportMismatch {
                    version: version.to_string(),
                    report_version: report.model_version_id.clone(),
                },
            ));
        }

        let outcome = self.config.staging_gate.check(report);
        if !outcome.passed {
            let failing = outcome.failing_metrics();
            return Err(self.reject(
                AuditEvent::new(EventKind::GateRejected, slot, version, "staging gate failed")
                    .with_detail("failing_metrics", failing.join(","))
                    .with_detail("dataset_id", report.dataset_id.clone()),
                ControllerError::GateRejected { version: version.to_string(), failing },
            ));
        }

        self.append(vec![AuditEvent::new(
            EventKind::PromotedToStaging,
            slot,
            version,
            "staging gate passed",
        )
        .with_edge(Stage::Candidate, Stage::Staging)
        .with_detail("dataset_id", report.dataset_id.clone())])
    }

    /// Promote a staging version into Production.
    ///
    /// Requires a second, independent evaluation (different dataset id than
    /// the staging gate used) meeting the production gate, plus approval
    /// unless the pipeline is configured automated. On success the
    /// incumbent is retired and the new version promoted in one atomic
    /// append batch.
    pub fn promote_to_production(
        &self,
        slot: &str,
        version: &str,
        report: &EvaluationReport,
    ) -> Result<()> {
        self.check_slot(slot)?;
        let lock = self.slot_lock(slot)?;
        let _guard = lock.lock().map_err(|_| ControllerError::Audit(AuditError::Poisoned))?;

        let view = self.view(slot)?;
        let from = view.stage_of(version);
        if from != Stage::Staging {
            return Err(self.reject(
                AuditEvent::new(EventKind::TransitionRejected, slot, version, "illegal edge")
                    .with_edge(from, Stage::Production),
                ControllerError::InvalidTransition {
                    version: version.to_string(),
                    from,
                    to: Stage::Production,
                },
            ));
        }

        if report.model_version_id != version {
            return Err(self.reject(
                AuditEvent::new(
                    EventKind::TransitionRejected,
                    slot,
                    version,
                    "report version mismatch",
                )
                .with_detail("report_version", report.model_version_id.clone()),
                ControllerError::ReportMismatch {
                    version: version.to_string(),
                    report_version: report.model_version_id.clone(),
                },
            ));
        }

        if view.staging_datasets.get(version) == Some(&report.dataset_id) {
            return Err(self.reject(
                AuditEvent::new(
                    EventKind::TransitionRejected,
                    slot,
                    version,
                    "independent evaluation required",
                )
                .with_detail("dataset_id", report.dataset_id.clone()),
                ControllerError::IndependentEvaluationRequired {
                    dataset_id: report.dataset_id.clone(),
                },
            ));
        }

        let outcome = self.config.production_gate.check(report);
        if !outcome.passed {
            let failing = outcome.failing_metrics();
            return Err(self.reject(
                AuditEvent::new(EventKind::GateRejected, slot, version, "production gate failed")
                    .with_detail("failing_metrics", failing.join(","))
                    .with_detail("dataset_id", report.dataset_id.clone()),
                ControllerError::GateRejected { version: version.to_string(), failing },
            ));
        }

        if !self.config.automated_promotion {
            match self.approval.check(slot, version) {
                Approval::Approved => {}
                Approval::Pending => {
                    return Err(self.reject(
                        AuditEvent::new(
                            EventKind::TransitionRejected,
                            slot,
                            version,
                            "approval pending",
                        ),
                        ControllerError::ApprovalPending { version: version.to_string() },
                    ));
                }
                Approval::Rejected => {
                    return Err(self.reject(
                        AuditEvent::new(
                            EventKind::TransitionRejected,
                            slot,
                            version,
                            "approval rejected",
                        ),
                        ControllerError::ApprovalRejected { version: version.to_string() },
                    ));
                }
            }
        }

        let mut batch = Vec::new();
        if let Some(incumbent) = &view.production {
            batch.push(
                AuditEvent::new(EventKind::Retired, slot, incumbent, "displaced by promotion")
                    .with_edge(Stage::Production, Stage::Retired)
                    .with_detail("displaced_by", version.to_string()),
            );
        }
        batch.push(
            AuditEvent::new(
                EventKind::PromotedToProduction,
                slot,
                version,
                "production gate passed",
            )
            .with_edge(Stage::Staging, Stage::Production)
            .with_detail("dataset_id", report.dataset_id.clone()),
        );
        self.append(batch)
    }

    /// Withdraw a version from Staging or Production.
    pub fn retire(&self, slot: &str, version: &str, reason: &str) -> Result<()> {
        self.check_slot(slot)?;
        let lock = self.slot_lock(slot)?;
        let _guard = lock.lock().map_err(|_| ControllerError::Audit(AuditError::Poisoned))?;

        let view = self.view(slot)?;
        let from = view.stage_of(version);
        if !from.can_transition_to(Stage::Retired) {
            return Err(self.reject(
                AuditEvent::new(EventKind::TransitionRejected, slot, version, "illegal edge")
                    .with_edge(from, Stage::Retired),
                ControllerError::InvalidTransition {
                    version: version.to_string(),
                    from,
                    to: Stage::Retired,
                },
            ));
        }

        self.append(vec![AuditEvent::new(EventKind::Retired, slot, version, reason)
            .with_edge(from, Stage::Retired)])
    }

    /// Condemn a production version: it leaves the slot and may never be
    /// reinstated.
    pub fn condemn(&self, slot: &str, version: &str, reason: &str) -> Result<()> {
        self.check_slot(slot)?;
        let lock = self.slot_lock(slot)?;
        let _guard = lock.lock().map_err(|_| ControllerError::Audit(AuditError::Poisoned))?;

        let view = self.view(slot)?;
        let from = view.stage_of(version);
        if from != Stage::Production {
            return Err(self.reject(
                AuditEvent::new(EventKind::TransitionRejected, slot, version, "illegal edge")
                    .with_edge(from, Stage::RolledBack),
                ControllerError::InvalidTransition {
                    version: version.to_string(),
                    from,
                    to: Stage::RolledBack,
                },
            ));
        }

        self.append(vec![AuditEvent::new(EventKind::Condemned, slot, version, reason)
            .with_edge(Stage::Production, Stage::RolledBack)])
    }

    /// Force a rollback of the slot's production version.
    ///
    /// Demotes the incumbent to Staging and reinstates the immediately
    /// prior Retired incumbent, but only if that version still exists in
    /// the log and has no Critical verdict on record. Otherwise the slot
    /// is left explicitly unhealthy; automation never promotes an
    /// unvalidated version.
    pub fn rollback(&self, slot: &str, reason: &str) -> Result<RollbackOutcome> {
        self.check_slot(slot)?;
        let lock = self.slot_lock(slot)?;
        let _guard = lock.lock().map_err(|_| ControllerError::Audit(AuditError::Poisoned))?;
        self.rollback_locked(slot, reason)
    }

    fn rollback_locked(&self, slot: &str, reason: &str) -> Result<RollbackOutcome> {
        let view = self.view(slot)?;
        let Some(incumbent) = view.production.clone() else {
            return Err(ControllerError::NoHealthyVersion { slot: slot.to_string() });
        };

        let demotion = AuditEvent::new(EventKind::RolledBack, slot, &incumbent, reason)
            .with_edge(Stage::Production, Stage::Staging);

        let fallback = view
            .previous_production
            .clone()
            .filter(|v| view.stage_of(v) == Stage::Retired)
            .filter(|v| !self.verdicts.has_critical(v).unwrap_or(true));

        match fallback {
            Some(prior) => {
                self.append(vec![
                    demotion,
                    AuditEvent::new(
                        EventKind::Reinstated,
                        slot,
                        &prior,
                        "prior incumbent reinstated after rollback",
                    )
                    .with_edge(Stage::Retired, Stage::Production),
                ])?;
                Ok(RollbackOutcome::Reinstated { version: prior })
            }
            None => {
                self.append(vec![
                    demotion,
                    AuditEvent::new(
                        EventKind::SlotUnhealthy,
                        slot,
                        &incumbent,
                        "no healthy fallback version",
                    ),
                ])?;
                Ok(RollbackOutcome::NoHealthyVersion)
            }
        }
    }

    /// Record a drift verdict for a slot and apply the debounce policy.
    ///
    /// The consecutive-Critical count is derived from the stored verdict
    /// sequence, never from an in-memory counter, so the decision is
    /// reproducible after a restart. Critical verdicts below the debounce
    /// threshold (and all Warning verdicts) raise an alert only.
    pub fn record_verdict(&self, slot: &str, verdict: DriftVerdict) -> Result<VerdictAction> {
        self.check_slot(slot)?;
        let lock = self.slot_lock(slot)?;
        let _guard = lock.lock().map_err(|_| ControllerError::Audit(AuditError::Poisoned))?;

        let status = verdict.status;
        let verdict_version = verdict.model_version_id.clone();
        self.verdicts.append(slot, verdict)?;

        let view = self.view(slot)?;
        if view.production.as_deref() != Some(verdict_version.as_str()) {
            // Verdict for a version no longer (or not yet) serving; retain
            // for audit but take no action.
            return Ok(VerdictAction::None);
        }

        match status {
            DriftStatus::Stable => Ok(VerdictAction::None),
            DriftStatus::Warning => Ok(VerdictAction::AlertRaised),
            DriftStatus::Critical => {
                let streak = self.critical_streak(slot, &verdict_version)?;
                if streak >= self.config.debounce_n.max(1) {
                    let outcome = self.rollback_locked(
                        slot,
                        &format!("{streak} consecutive critical drift verdicts"),
                    )?;
                    Ok(VerdictAction::RollbackTriggered { outcome })
                } else {
                    Ok(VerdictAction::AlertRaised)
                }
            }
        }
    }

    /// Trailing run of Critical verdicts for the given production version.
    fn critical_streak(&self, slot: &str, version: &str) -> Result<usize> {
        let verdicts = self.verdicts.for_slot(slot)?;
        let streak = verdicts
            .iter()
            .rev()
            .take_while(|v| v.model_version_id == version && v.status == DriftStatus::Critical)
            .count();
        Ok(streak)
    }
}
