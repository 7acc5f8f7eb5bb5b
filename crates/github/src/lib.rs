//! RepoWarden GitHub infrastructure adapter.
//!
//! Implements the [`audit::RepositorySource`] trait twice:
//!
//! - [`AppClient`] — live GitHub REST client authenticated as a GitHub App
//!   installation. Handles the RS256 app JWT, installation-token caching,
//!   and pagination; the `audit` crate never sees any of it.
//! - [`SnapshotLoader`] — offline source that reconstructs repository lists
//!   and sub-resources purely from previously dumped snapshot files, for
//!   replaying an audit without touching the network.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain audit rules. All GitHub
//! API details (authentication, pagination, status handling) live here.

mod auth;
mod client;
mod loader;

pub use auth::AppCredentials;
pub use client::AppClient;
pub use loader::SnapshotLoader;
