//! Core audit domain for RepoWarden.
//!
//! This crate contains every domain concept of an audit run: the snapshot
//! value types handed to the policy engine, the cross-cutting error type, the
//! port traits infrastructure crates implement, and the concurrent
//! orchestrator that drives a run from repository discovery to the final
//! aggregated result.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no HTTP or policy
//! engine dependencies. It defines *what* data an audit needs; the `github`,
//! `policy`, and `notify` crates define *how* to supply and deliver it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`types`] | Snapshot value types (`RepositoryDescriptor`, `AuditInput`, …) |
//! | [`errors`] | The [`AuditError`] taxonomy shared by every crate |
//! | [`ports`] | Collaborator traits (`RepositorySource`, `PolicyEvaluator`, `NotificationSink`) |
//! | [`snapshot`] | [`SnapshotBuilder`] — assembles and persists one `AuditInput` |
//! | [`orchestrator`] | [`AuditOrchestrator`] — worker pool, limit handling, error short-circuit |
//! | [`report`] | Console rendering and notification message building |

pub mod errors;
pub mod orchestrator;
pub mod ports;
pub mod report;
pub mod snapshot;
pub mod types;

// Re-export the main surface at the crate root for ergonomic usage by
// downstream crates.
pub use errors::AuditError;
pub use orchestrator::{AuditOrchestrator, DEFAULT_WORKERS};
pub use ports::{NotificationSink, PolicyEvaluator, RepositorySource};
pub use report::{
    format_elapsed, CategorySummary, Notification, ReportSink, ViolationEntry,
    CATEGORY_DISPLAY_LIMIT,
};
pub use snapshot::SnapshotBuilder;
pub use types::{
    AuditInput, AuditRecord, AuditResult, BranchHead, BranchSnapshot, Collaborator, OwnerRef,
    PolicyViolation, ProtectionRuleset, RepositoryDescriptor, RunId, TeamAssociation, Webhook,
};
