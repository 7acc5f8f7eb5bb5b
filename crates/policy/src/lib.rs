//! RepoWarden policy evaluation infrastructure.
//!
//! Implements the [`audit::PolicyEvaluator`] trait twice:
//!
//! - [`LocalEvaluator`] — embeds the [`regorus`] Rego engine and evaluates
//!   policies loaded from a local file or directory, no server required.
//! - [`RemoteEvaluator`] — queries an OPA server's data API over HTTP,
//!   forwarding any configured extra headers (authentication proxies etc.).
//!
//! Both speak the same policy contract: the configured package exposes a
//! `fail` rule producing `{"category": ..., "message": ...}` objects, one
//! per violation. The snapshot is passed as the policy input document.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** The `audit` crate never sees Rego, HTTP, or the
//! package layout; it only receives `Vec<PolicyViolation>`.

mod local;
mod remote;

pub use local::LocalEvaluator;
pub use remote::RemoteEvaluator;

/// Package queried when no `--package` override is given.
pub const DEFAULT_PACKAGE: &str = "repowarden";
