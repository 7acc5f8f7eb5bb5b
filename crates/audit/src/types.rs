//! Snapshot value types for the audit domain.
//!
//! Everything here is a plain serde value: the exact structures that are
//! handed to the policy engine as JSON, written to dump files, and read back
//! by the offline loader. Fields the audit itself does not interpret are kept
//! in flattened `extra` maps so a persisted snapshot round-trips with every
//! field the policy may consume, not just the ones RepoWarden names.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AuditError;

// ---------------------------------------------------------------------------
// Run identity
// ---------------------------------------------------------------------------

/// Identifies a single audit run (one invocation of the orchestrator).
///
/// Generated fresh for every run; propagated through spans so all activity
/// from a single run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Repository snapshot types
// ---------------------------------------------------------------------------

/// The account that owns a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerRef {
    /// Login name of the owning organization or user.
    pub login: String,
    /// Upstream fields the audit does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One repository as returned by the listing call.
///
/// Identity is the `full_name` (`owner/name`); descriptors are never mutated
/// after discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    /// Repository name without the owner prefix.
    pub name: String,
    /// `owner/name`, the repository's identity within a run.
    pub full_name: String,
    /// Owning account.
    pub owner: OwnerRef,
    /// Whether the repository is private.
    #[serde(default)]
    pub private: bool,
    /// Whether the repository is archived.
    #[serde(default)]
    pub archived: bool,
    /// Web URL, used in notification links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
    /// Name of the default branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
    /// Upstream fields the audit does not interpret but the policy may.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The commit a branch currently points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchHead {
    /// Head commit SHA.
    pub sha: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The protection ruleset of a protected branch.
///
/// Opaque to the orchestrator; only the policy engine interprets it. Kept as
/// raw JSON so every upstream field survives persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtectionRuleset(pub serde_json::Value);

/// One branch within a repository snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchSnapshot {
    /// Branch name.
    pub name: String,
    /// Head commit reference.
    pub commit: BranchHead,
    /// Whether branch protection is enabled.
    #[serde(default)]
    pub protected: bool,
    /// Resolved protection ruleset; present only for protected branches.
    ///
    /// Resolved lazily by the snapshot builder because the underlying call
    /// is expensive and rejects unprotected branches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection: Option<ProtectionRuleset>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A user with access to the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collaborator {
    /// Login name of the collaborator.
    pub login: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A webhook configured on the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    /// Upstream-assigned hook id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A team granted access to the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamAssociation {
    /// Team display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// URL-safe team slug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Audit input
// ---------------------------------------------------------------------------

/// One repository's complete point-in-time snapshot.
///
/// Built exactly once per repository per run, never mutated afterwards, and
/// owned by the worker that built it until it is handed to the evaluator.
/// The serialized field names are the dump-file format consumed by the
/// offline loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditInput {
    /// The repository the snapshot belongs to.
    pub repo: RepositoryDescriptor,
    /// Branches in listing order, with protection resolved where enabled.
    pub branches: Vec<BranchSnapshot>,
    /// Accounts with access to the repository.
    pub collaborators: Vec<Collaborator>,
    /// Configured webhooks.
    pub hooks: Vec<Webhook>,
    /// Teams associated with the repository.
    pub teams: Vec<TeamAssociation>,
    /// Capture time, seconds since the Unix epoch (UTC).
    pub timestamp: i64,
}

impl AuditInput {
    /// The capture time as a UTC datetime.
    ///
    /// Falls back to the epoch if the stored timestamp is out of range,
    /// which cannot happen for snapshots this crate produced.
    pub fn captured_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.timestamp, 0)
            .single()
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Violations and the run-level aggregate
// ---------------------------------------------------------------------------

/// A named policy failure emitted by the evaluator for one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyViolation {
    /// Policy identifier, used to group records in the report.
    pub category: String,
    /// Human-readable detail.
    #[serde(default)]
    pub message: String,
}

/// One detected violation tied back to the repository it was found in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// The violation as emitted by the evaluator.
    #[serde(flatten)]
    pub violation: PolicyViolation,
    /// The repository the violation applies to.
    pub repo: RepositoryDescriptor,
    /// When the repository snapshot was captured.
    pub scanned_at: DateTime<Utc>,
}

/// The aggregate outcome of one audit run.
///
/// Created once per run, populated incrementally by the orchestrator's merge
/// step (the only place that mutates [`AuditResult::records`]), and finalized
/// with a completion timestamp before it reaches the report sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResult {
    /// Correlates this result with the run's log output.
    pub run_id: RunId,
    /// The full repository list as discovered, before limit truncation.
    pub repos: Vec<RepositoryDescriptor>,
    /// Violation records grouped by category.
    ///
    /// Order within a category is completion order, not listing order.
    pub records: HashMap<String, Vec<AuditRecord>>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished; `None` while the run is still in flight.
    pub completed_at: Option<DateTime<Utc>>,
}

impl AuditResult {
    /// Creates an empty result for a freshly discovered repository list.
    pub fn new(run_id: RunId, repos: Vec<RepositoryDescriptor>, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            repos,
            records: HashMap::new(),
            started_at,
            completed_at: None,
        }
    }

    /// Merges a batch of records into the per-category sequences.
    ///
    /// Callers must hold the orchestrator's result lock; this is the single
    /// mutation point for [`AuditResult::records`].
    pub fn add(&mut self, records: impl IntoIterator<Item = AuditRecord>) {
        for record in records {
            self.records
                .entry(record.violation.category.clone())
                .or_default()
                .push(record);
        }
    }

    /// Total number of violation records across all categories.
    pub fn violation_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    /// `true` when the run found no violations.
    pub fn is_clean(&self) -> bool {
        self.records.is_empty()
    }

    /// Wall-clock duration of the run.
    ///
    /// Zero until the completion timestamp has been stamped.
    pub fn elapsed(&self) -> chrono::Duration {
        match self.completed_at {
            Some(done) => done - self.started_at,
            None => chrono::Duration::zero(),
        }
    }

    /// The error the caller should treat as the run outcome: `Ok` for a
    /// clean run, [`AuditError::ViolationDetected`] otherwise.
    pub fn outcome(&self) -> Result<(), AuditError> {
        match self.violation_count() {
            0 => Ok(()),
            count => Err(AuditError::ViolationDetected { count }),
        }
    }
}
