//! WARDEN Core - governance engine for AI-assisted code modification
//!
//! WARDEN mediates between agent-produced change proposals and the target
//! codebase: a declarative change spec is executed as typed AST operations,
//! verified against its post-conditions, cost-tracked, and audited.
//!
//! # Architecture
//!
//! Five cooperating components, leaves first:
//!
//! 1. **Redactor** (`redactor`): secret/PII detection and redaction at the
//!    trust boundary
//! 2. **Evidence Log** (`evidence`): append-only events, provenance chains,
//!    audit packs
//! 3. **Cost Ledger** (`ledger`): pricing, budgets, routing, forecasts
//! 4. **Transform Engine** (`transform`): AST parse/query/mutate per
//!    language, invariant runner, mutation-test orchestration
//! 5. **Mission Coordinator** (`mission`): the plan/execute/verify/finalize
//!    lifecycle with reversible batches
//!
//! Components are plain values wired together at startup; tests build fresh
//! instances per scenario. Nothing in this crate is a process-lifetime
//! singleton.

#![deny(unsafe_code)]

pub mod changespec;
pub mod error;
pub mod evidence;
pub mod ledger;
pub mod mission;
pub mod redactor;
pub mod selector;
pub mod transform;
pub mod types;

// Re-export commonly used types for convenience
pub use changespec::{AstOp, ChangeSpec, InvariantSpec, Patch, PatchDetails, TestPlan, TestStrategy};
pub use error::{Result, WardenError};
pub use evidence::{AuditExtras, AuditPackRecord, Event, EventKind, EvidenceLog, ProvenanceGraph};
pub use ledger::{Budget, BudgetModel, CostLedger, Forecast, ModelPricing};
pub use mission::{
    ApplyOutcome, ApplyState, Batch, Checkpoint, CheckpointName, CheckpointStatus, Mission,
    MissionCoordinator, Snapshot, SnapshotStore,
};
pub use redactor::{Finding, Policy, PolicyAction, PolicyType, Redactor, ScanResult, Severity};
pub use selector::Selector;
pub use transform::{
    ApplyOptions, ApplyResult, InvariantResult, MutationConfig, MutationReport, TransformEngine,
    VerifyResult,
};
pub use types::{Actor, ContentHash, Language, RiskLevel, Timestamp};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
