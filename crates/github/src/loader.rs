//! Offline repository source backed by dumped snapshot files.
//!
//! A dump directory produced with `--dump` holds one `<repo-name>.json` per
//! repository. The loader reads every file up front and then serves the
//! repository list and all sub-resources from memory, keyed by
//! `owner/name`, so a previous run can be replayed against a changed policy
//! without any upstream calls.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use audit::{
    AuditError, AuditInput, BranchSnapshot, Collaborator, ProtectionRuleset,
    RepositoryDescriptor, RepositorySource, TeamAssociation, Webhook,
};

/// In-memory [`RepositorySource`] over persisted snapshots.
pub struct SnapshotLoader {
    inputs: HashMap<String, AuditInput>,
}

impl SnapshotLoader {
    /// Reads every `*.json` file in `dir`.
    ///
    /// Files without a `.json` extension are ignored; a file that fails to
    /// parse is a hard error rather than a silently missing repository.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, AuditError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|err| AuditError::Persistence {
            path: dir.to_path_buf(),
            message: err.to_string(),
        })?;

        let mut inputs = HashMap::new();
        for entry in entries {
            let path = entry
                .map_err(|err| AuditError::Persistence {
                    path: dir.to_path_buf(),
                    message: err.to_string(),
                })?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let raw = std::fs::read(&path).map_err(|err| AuditError::Persistence {
                path: path.clone(),
                message: err.to_string(),
            })?;
            let input: AuditInput =
                serde_json::from_slice(&raw).map_err(|err| AuditError::Persistence {
                    path: path.clone(),
                    message: err.to_string(),
                })?;
            inputs.insert(input.repo.full_name.clone(), input);
        }

        tracing::debug!(snapshots = inputs.len(), dir = %dir.display(), "snapshots loaded");
        Ok(Self { inputs })
    }

    /// Number of snapshots available.
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    /// `true` when the directory held no snapshots.
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    fn get(&self, owner: &str, repo: &str) -> Result<&AuditInput, AuditError> {
        let key = format!("{owner}/{repo}");
        self.inputs
            .get(&key)
            .ok_or(AuditError::MissingSnapshot { repo: key })
    }
}

#[async_trait]
impl RepositorySource for SnapshotLoader {
    /// Returns every dumped repository, sorted by full name.
    ///
    /// The dump already fixes which owner was audited, so the `owner`
    /// argument is not used as a filter; sorting keeps the listing order
    /// (and with it limit truncation) deterministic across runs.
    async fn list_repositories(
        &self,
        _owner: &str,
    ) -> Result<Vec<RepositoryDescriptor>, AuditError> {
        let mut repos: Vec<RepositoryDescriptor> =
            self.inputs.values().map(|input| input.repo.clone()).collect();
        repos.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(repos)
    }

    async fn list_branches(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<BranchSnapshot>, AuditError> {
        Ok(self.get(owner, repo)?.branches.clone())
    }

    async fn get_branch_protection(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<ProtectionRuleset, AuditError> {
        let input = self.get(owner, repo)?;
        input
            .branches
            .iter()
            .find(|b| b.name == branch)
            .and_then(|b| b.protection.clone())
            .ok_or(AuditError::MissingSnapshot {
                repo: format!("{owner}/{repo}#{branch}"),
            })
    }

    async fn list_collaborators(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<Collaborator>, AuditError> {
        Ok(self.get(owner, repo)?.collaborators.clone())
    }

    async fn list_webhooks(&self, owner: &str, repo: &str) -> Result<Vec<Webhook>, AuditError> {
        Ok(self.get(owner, repo)?.hooks.clone())
    }

    async fn list_teams(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<TeamAssociation>, AuditError> {
        Ok(self.get(owner, repo)?.teams.clone())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn dump(dir: &Path, name: &str, value: serde_json::Value) {
        std::fs::write(
            dir.join(format!("{name}.json")),
            serde_json::to_vec(&value).unwrap(),
        )
        .unwrap();
    }

    fn snapshot_json(full_name: &str) -> serde_json::Value {
        let (owner, name) = full_name.split_once('/').unwrap();
        json!({
            "repo": {
                "name": name,
                "full_name": full_name,
                "owner": {"login": owner},
                "private": true,
                "archived": false,
                "visibility": "private"
            },
            "branches": [{
                "name": "main",
                "commit": {"sha": "0a1b2c"},
                "protected": true,
                "protection": {"enforce_admins": {"enabled": true}}
            }],
            "collaborators": [{"login": "octocat", "permissions": {"admin": true}}],
            "hooks": [{"id": 5, "config": {"url": "https://hooks.example.invalid"}}],
            "teams": [{"name": "Platform", "slug": "platform"}],
            "timestamp": 1700000000
        })
    }

    #[tokio::test]
    async fn lists_repositories_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        dump(dir.path(), "zeta", snapshot_json("acme/zeta"));
        dump(dir.path(), "api", snapshot_json("acme/api"));
        std::fs::write(dir.path().join("README.md"), "not a snapshot").unwrap();

        let loader = SnapshotLoader::from_dir(dir.path()).unwrap();
        assert_eq!(loader.len(), 2);

        let repos = loader.list_repositories("acme").await.unwrap();
        let names: Vec<&str> = repos.iter().map(|r| r.full_name.as_str()).collect();
        assert_eq!(names, ["acme/api", "acme/zeta"]);
    }

    #[tokio::test]
    async fn sub_resources_round_trip_from_dump() {
        let dir = tempfile::tempdir().unwrap();
        dump(dir.path(), "api", snapshot_json("acme/api"));
        let loader = SnapshotLoader::from_dir(dir.path()).unwrap();

        let branches = loader.list_branches("acme", "api").await.unwrap();
        assert_eq!(branches[0].name, "main");
        assert!(branches[0].protection.is_some());

        let protection = loader
            .get_branch_protection("acme", "api", "main")
            .await
            .unwrap();
        assert_eq!(protection.0, json!({"enforce_admins": {"enabled": true}}));

        let collaborators = loader.list_collaborators("acme", "api").await.unwrap();
        assert_eq!(collaborators[0].login, "octocat");
        assert_eq!(
            collaborators[0].extra["permissions"],
            json!({"admin": true})
        );

        assert_eq!(loader.list_webhooks("acme", "api").await.unwrap()[0].id, Some(5));
        assert_eq!(
            loader.list_teams("acme", "api").await.unwrap()[0].slug.as_deref(),
            Some("platform")
        );
    }

    #[tokio::test]
    async fn unknown_repository_is_a_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        dump(dir.path(), "api", snapshot_json("acme/api"));
        let loader = SnapshotLoader::from_dir(dir.path()).unwrap();

        let err = loader.list_branches("acme", "ghost").await.unwrap_err();
        assert!(matches!(err, AuditError::MissingSnapshot { repo } if repo == "acme/ghost"));
    }

    #[test]
    fn malformed_dump_file_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();

        let err = SnapshotLoader::from_dir(dir.path())
            .err()
            .expect("loading must fail");
        assert!(matches!(err, AuditError::Persistence { .. }));
    }
}
