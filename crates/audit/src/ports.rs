//! Port traits implemented by the infrastructure crates.
//!
//! The orchestrator only ever sees these traits; which concrete
//! implementation backs them (live GitHub App client vs. offline loader,
//! local Rego engine vs. remote OPA server) is decided at construction time
//! by the composition root.

use async_trait::async_trait;

use crate::errors::AuditError;
use crate::report::Notification;
use crate::types::{
    AuditInput, BranchSnapshot, Collaborator, PolicyViolation, ProtectionRuleset,
    RepositoryDescriptor, TeamAssociation, Webhook,
};

/// Supplies repository listings and per-repository sub-resources.
///
/// Implementations paginate internally and return complete sequences; a
/// transport failure or non-success status surfaces as
/// [`AuditError::Transport`] / [`AuditError::UnexpectedResponse`].
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Lists every repository belonging to `owner`, in upstream order.
    async fn list_repositories(&self, owner: &str)
        -> Result<Vec<RepositoryDescriptor>, AuditError>;

    /// Lists the branches of one repository.
    ///
    /// The returned snapshots carry the `protected` flag but no resolved
    /// ruleset; protection is fetched separately, and only for protected
    /// branches.
    async fn list_branches(&self, owner: &str, repo: &str)
        -> Result<Vec<BranchSnapshot>, AuditError>;

    /// Resolves the protection ruleset of one protected branch.
    ///
    /// The upstream call rejects unprotected branches, so callers must check
    /// the `protected` flag first.
    async fn get_branch_protection(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<ProtectionRuleset, AuditError>;

    /// Lists accounts with access to one repository.
    async fn list_collaborators(&self, owner: &str, repo: &str)
        -> Result<Vec<Collaborator>, AuditError>;

    /// Lists webhooks configured on one repository.
    async fn list_webhooks(&self, owner: &str, repo: &str) -> Result<Vec<Webhook>, AuditError>;

    /// Lists teams associated with one repository.
    async fn list_teams(&self, owner: &str, repo: &str)
        -> Result<Vec<TeamAssociation>, AuditError>;
}

/// Scores one snapshot against the configured policy.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Evaluates `input` and returns the violations it triggers.
    ///
    /// Any non-error return is authoritative; an empty vector means the
    /// repository is compliant.
    async fn evaluate(&self, input: &AuditInput) -> Result<Vec<PolicyViolation>, AuditError>;
}

/// Delivers the end-of-run notification.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Posts one notification message.
    async fn post(&self, notification: &Notification) -> Result<(), AuditError>;
}
