//! Assembles one [`AuditInput`] snapshot per repository.
//!
//! The builder is the only component that talks to the
//! [`RepositorySource`] sub-resource calls. A snapshot is built atomically:
//! if any sub-fetch fails, the error surfaces and no partial input exists.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::errors::AuditError;
use crate::ports::RepositorySource;
use crate::types::{AuditInput, RepositoryDescriptor};

/// Builds (and optionally persists) one snapshot per repository.
pub struct SnapshotBuilder {
    source: Arc<dyn RepositorySource>,
    dump_dir: Option<PathBuf>,
}

impl SnapshotBuilder {
    /// Creates a builder over `source` with persistence disabled.
    pub fn new(source: Arc<dyn RepositorySource>) -> Self {
        Self {
            source,
            dump_dir: None,
        }
    }

    /// Enables persistence: every completed snapshot is written to
    /// `dir/<repository-name>.json` before it is evaluated.
    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    /// Assembles the full snapshot for `repo`.
    ///
    /// Branch protection is resolved only for branches flagged as protected;
    /// the upstream call rejects unprotected branches. Collaborators, hooks,
    /// and teams are fetched concurrently once the branch data is in.
    ///
    /// When a dump directory is configured the finished snapshot is written
    /// out regardless of how evaluation goes later; a failed write is fatal
    /// for this repository because dump files feed offline replay.
    pub async fn build(&self, repo: &RepositoryDescriptor) -> Result<AuditInput, AuditError> {
        let owner = repo.owner.login.as_str();
        let name = repo.name.as_str();
        tracing::trace!(repo = %repo.full_name, "retrieving repository data");

        let mut branches = self.source.list_branches(owner, name).await?;
        for branch in &mut branches {
            if branch.protected {
                let ruleset = self
                    .source
                    .get_branch_protection(owner, name, &branch.name)
                    .await?;
                branch.protection = Some(ruleset);
            }
        }

        let (collaborators, hooks, teams) = tokio::try_join!(
            self.source.list_collaborators(owner, name),
            self.source.list_webhooks(owner, name),
            self.source.list_teams(owner, name),
        )?;

        let input = AuditInput {
            repo: repo.clone(),
            branches,
            collaborators,
            hooks,
            teams,
            timestamp: Utc::now().timestamp(),
        };
        tracing::trace!(repo = %input.repo.full_name, "snapshot assembled");

        if let Some(dir) = &self.dump_dir {
            persist(dir, &input).await?;
        }

        Ok(input)
    }
}

/// Writes `input` to `dir/<repository-name>.json`.
async fn persist(dir: &Path, input: &AuditInput) -> Result<(), AuditError> {
    let path = dir.join(format!("{}.json", input.repo.name));
    let bytes = serde_json::to_vec_pretty(input).map_err(|err| AuditError::Persistence {
        path: path.clone(),
        message: err.to_string(),
    })?;
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|err| AuditError::Persistence {
            path: path.clone(),
            message: err.to_string(),
        })?;
    tracing::debug!(repo = %input.repo.full_name, path = %path.display(), "snapshot persisted");
    Ok(())
}
