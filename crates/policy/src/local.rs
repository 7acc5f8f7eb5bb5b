//! Embedded Rego evaluation via [`regorus`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use audit::{AuditError, AuditInput, PolicyEvaluator, PolicyViolation};

/// Evaluates snapshots against locally loaded Rego policies.
///
/// Policies are compiled once at construction; evaluation clones the
/// prepared engine, which is cheap, so concurrent workers never contend on
/// engine state.
pub struct LocalEvaluator {
    engine: regorus::Engine,
    package: String,
}

impl LocalEvaluator {
    /// Loads every `.rego` file under `path` (a single file or a directory
    /// walked recursively) and queries `data.<package>.fail`.
    pub fn from_path(
        path: impl AsRef<Path>,
        package: impl Into<String>,
    ) -> Result<Self, AuditError> {
        let path = path.as_ref();
        let files = rego_files(path)?;
        if files.is_empty() {
            return Err(AuditError::InvalidConfig {
                message: format!("no .rego policies found under {}", path.display()),
            });
        }

        let mut engine = regorus::Engine::new();
        for file in &files {
            engine
                .add_policy_from_file(file.to_string_lossy().as_ref())
                .map_err(|err| AuditError::InvalidConfig {
                    message: format!("failed to load policy {}: {err}", file.display()),
                })?;
        }
        tracing::debug!(policies = files.len(), path = %path.display(), "policies loaded");

        Ok(Self {
            engine,
            package: package.into(),
        })
    }
}

#[async_trait]
impl PolicyEvaluator for LocalEvaluator {
    async fn evaluate(&self, input: &AuditInput) -> Result<Vec<PolicyViolation>, AuditError> {
        let input_json =
            serde_json::to_string(input).map_err(|err| AuditError::PolicyEval {
                message: format!("failed to serialize snapshot: {err}"),
            })?;
        let value =
            regorus::Value::from_json_str(&input_json).map_err(|err| AuditError::PolicyEval {
                message: format!("failed to convert snapshot: {err}"),
            })?;

        let mut engine = self.engine.clone();
        engine.set_input(value);
        let result = engine
            .eval_rule(format!("data.{}.fail", self.package))
            .map_err(|err| AuditError::PolicyEval {
                message: err.to_string(),
            })?;

        let json = result.to_json_str().map_err(|err| AuditError::PolicyEval {
            message: err.to_string(),
        })?;
        serde_json::from_str(&json).map_err(|err| AuditError::PolicyEval {
            message: format!("policy returned malformed violations: {err}"),
        })
    }
}

/// Collects `.rego` files from a file or directory tree.
fn rego_files(path: &Path) -> Result<Vec<PathBuf>, AuditError> {
    let io_err = |err: std::io::Error| AuditError::InvalidConfig {
        message: format!("cannot read policy path {}: {err}", path.display()),
    };

    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    let mut stack = vec![path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).map_err(io_err)? {
            let entry_path = entry.map_err(io_err)?.path();
            if entry_path.is_dir() {
                stack.push(entry_path);
            } else if entry_path.extension().and_then(|ext| ext.to_str()) == Some("rego") {
                files.push(entry_path);
            }
        }
    }
    files.sort();
    Ok(files)
}
