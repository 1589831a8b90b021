//! Promover: model promotion control and drift monitoring
//!
//! Governs the lifecycle of trained model artifacts across deployment slots:
//! a gated stage state machine (Candidate → Staging → Production) driven by
//! evaluation reports, and a drift monitor that compares live traffic against
//! the statistical baseline captured at promotion time.
//!
//! # Architecture
//!
//! - [`store`] - Content-addressed artifact storage and lineage records
//! - [`evaluate`] - Metric evaluator contract and promotion gate rules
//! - [`drift`] - Baseline profiles, drift scoring, and verdicts
//! - [`audit`] - Append-only audit log; current state is a fold over it
//! - [`controller`] - The promotion state machine and rollback logic
//! - [`dispatch`] - Alert/rollback notification dispatch
//! - [`config`] - Per-environment YAML configuration
//!
//! # Example
//!
//! ```
//! use promover::audit::InMemoryLog;
//! use promover::controller::{PromotionController, AutoApprove};
//! use promover::evaluate::{EvaluationReport, GateConfig, MetricBound};
//! use promover::config::DeployConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = DeployConfig::default();
//! config.staging_gate = GateConfig::new().with_bound("accuracy", MetricBound::at_least(0.90));
//!
//! let controller = PromotionController::new(config, InMemoryLog::new(), AutoApprove);
//! let report = EvaluationReport::new("v-abc", "holdout-2024", [("accuracy", 0.92)]);
//! controller.promote_to_staging("slot-a", "v-abc", &report)?;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod cli;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod drift;
pub mod evaluate;
pub mod store;

pub use audit::{AuditEvent, AuditLog, EventKind, InMemoryLog, JsonFileLog, SlotView};
pub use config::DeployConfig;
pub use controller::{
    Approval, ApprovalGate, AutoApprove, ControllerError, PromotionController, Stage,
};
pub use dispatch::{Dispatcher, Notification, NotificationKind, Notifier};
pub use drift::{
    BaselineProfile, DriftMonitor, DriftOutcome, DriftStatus, DriftVerdict, TrafficWindow,
};
pub use evaluate::{EvalError, EvaluationReport, Evaluator, GateConfig, GateOutcome, MetricBound};
pub use store::{ArtifactStore, FsStore, InMemoryStore, Lineage, ModelVersion, StoreError};
