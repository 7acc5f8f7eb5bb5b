//! The error taxonomy shared by every RepoWarden crate.
//!
//! [`AuditError`] distinguishes true pipeline failures (configuration,
//! upstream data, evaluation, persistence) from the
//! [`AuditError::ViolationDetected`] outcome, which is a *successful* run
//! that found policy violations. Callers use that distinction to decide the
//! process exit code.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced anywhere in the audit pipeline.
///
/// Fatal variants abort the remaining dispatch under the first-error-wins
/// policy and are returned verbatim from the orchestrator with
/// repository/owner context attached. Nothing is silently swallowed except
/// pagination completion, which is a normal loop terminator.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Invalid or missing required settings.
    ///
    /// Detected before orchestration starts; never retried.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration problem.
        message: String,
    },

    /// An upstream call returned a non-success status.
    #[error("unexpected response from {url}: status {status}")]
    UnexpectedResponse {
        /// The request URL, without credentials.
        url: String,
        /// HTTP status code of the response.
        status: u16,
        /// Response body, for diagnosis.
        body: String,
    },

    /// An upstream call failed at the transport level.
    #[error("request to {url} failed: {message}")]
    Transport {
        /// The request URL, without credentials.
        url: String,
        /// Underlying transport error description.
        message: String,
    },

    /// A per-repository step failed; wraps the underlying error with the
    /// repository's identity.
    #[error("audit of {repo} failed")]
    Repository {
        /// `owner/name` of the repository whose unit of work failed.
        repo: String,
        /// The failure as observed by the worker.
        #[source]
        source: Box<AuditError>,
    },

    /// The policy engine could not evaluate a snapshot.
    #[error("policy evaluation failed: {message}")]
    PolicyEval {
        /// Engine-specific failure description.
        message: String,
    },

    /// A snapshot could not be written to or read from the dump directory.
    ///
    /// Fatal for the affected repository: dump files are load-bearing for
    /// offline replay, so a missed write is never skipped silently.
    #[error("snapshot persistence failed for {}: {message}", path.display())]
    Persistence {
        /// The file the operation targeted.
        path: PathBuf,
        /// Underlying I/O or serialization failure.
        message: String,
    },

    /// The offline loader has no persisted snapshot for a repository.
    #[error("no persisted snapshot for {repo}")]
    MissingSnapshot {
        /// `owner/name` that was requested.
        repo: String,
    },

    /// Posting the notification failed.
    ///
    /// Does not retroactively invalidate the audit result already computed.
    #[error("notification delivery failed: {message}")]
    Notification {
        /// Underlying delivery failure description.
        message: String,
    },

    /// The run completed and found policy violations.
    ///
    /// Not a pipeline failure: whether this becomes a non-zero exit is the
    /// caller's decision (`--fail`).
    #[error("{count} policy violation(s) detected")]
    ViolationDetected {
        /// Total number of violation records in the run.
        count: usize,
    },

    /// The caller cancelled the run before it completed.
    #[error("audit run cancelled")]
    Cancelled,

    /// An audit worker task panicked.
    #[error("audit worker failed: {message}")]
    Worker {
        /// Join failure description.
        message: String,
    },
}

impl AuditError {
    /// Wraps `source` with the identity of the repository being processed.
    ///
    /// Used by orchestrator workers so every per-repository failure carries
    /// the `owner/name` it belongs to.
    pub fn for_repository(repo: impl Into<String>, source: AuditError) -> Self {
        Self::Repository {
            repo: repo.into(),
            source: Box::new(source),
        }
    }

    /// `true` for the violation outcome, which is not a pipeline failure.
    pub fn is_violation(&self) -> bool {
        matches!(self, Self::ViolationDetected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_context_preserves_source() {
        let inner = AuditError::UnexpectedResponse {
            url: "https://api.github.com/repos/acme/api/branches".to_string(),
            status: 503,
            body: "upstream unavailable".to_string(),
        };
        let wrapped = AuditError::for_repository("acme/api", inner);

        assert!(wrapped.to_string().contains("acme/api"));
        let source = std::error::Error::source(&wrapped).expect("source retained");
        assert!(source.to_string().contains("status 503"));
    }

    #[test]
    fn violation_is_not_a_failure() {
        assert!(AuditError::ViolationDetected { count: 3 }.is_violation());
        assert!(!AuditError::Cancelled.is_violation());
    }
}
