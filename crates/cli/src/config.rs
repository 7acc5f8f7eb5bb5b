//! CLI configuration: argument/env parsing and startup validation.
//!
//! Every flag has a `REPOWARDEN_*` environment fallback so the tool drops
//! into CI pipelines without long command lines. Validation runs once,
//! before any orchestration starts; an invalid configuration never reaches
//! the audit pipeline.

use std::path::PathBuf;

use audit::AuditError;
use clap::{Parser, ValueEnum};

/// Console log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable console lines.
    Text,
    /// One JSON object per event.
    Json,
}

/// Audit GitHub repositories against Rego policies.
#[derive(Debug, Parser)]
#[command(name = "repowarden", version, about)]
pub struct Config {
    /// GitHub owner (organization or user) to audit.
    #[arg(long, short = 'o', env = "REPOWARDEN_OWNER")]
    pub owner: Option<String>,

    /// GitHub App ID.
    #[arg(long, env = "REPOWARDEN_APP_ID")]
    pub app_id: Option<u64>,

    /// GitHub App installation ID.
    #[arg(long, env = "REPOWARDEN_INSTALL_ID")]
    pub install_id: Option<u64>,

    /// Path to the GitHub App private key file.
    #[arg(long, env = "REPOWARDEN_PRIVATE_KEY_FILE")]
    pub private_key_file: Option<PathBuf>,

    /// GitHub App private key data (PEM).
    #[arg(long, env = "REPOWARDEN_PRIVATE_KEY_DATA", hide_env_values = true)]
    pub private_key_data: Option<String>,

    /// Local Rego policy file or directory.
    #[arg(long, short = 'p', env = "REPOWARDEN_POLICY")]
    pub policy: Option<PathBuf>,

    /// Policy package to query.
    #[arg(long, env = "REPOWARDEN_PACKAGE", default_value = policy::DEFAULT_PACKAGE)]
    pub package: String,

    /// OPA server URL (data API path including the package).
    #[arg(long, short = 'u', env = "REPOWARDEN_URL")]
    pub url: Option<String>,

    /// Extra HTTP header(s) for the OPA server, as "Name: Value".
    #[arg(long = "header", short = 'H', env = "REPOWARDEN_HEADER", hide_env_values = true)]
    pub headers: Vec<String>,

    /// Log level or tracing filter directive.
    #[arg(long, short = 'l', env = "REPOWARDEN_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, short = 'f', env = "REPOWARDEN_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Exit with a non-zero code when a violation is detected.
    #[arg(long, env = "REPOWARDEN_FAIL")]
    pub fail: bool,

    /// Number of concurrent audit workers.
    #[arg(long, env = "REPOWARDEN_THREAD", default_value_t = audit::DEFAULT_WORKERS)]
    pub thread: usize,

    /// Process at most this many repositories (0 = unbounded).
    #[arg(long, env = "REPOWARDEN_LIMIT", default_value_t = 0)]
    pub limit: usize,

    /// Directory to dump snapshot data into.
    #[arg(long, env = "REPOWARDEN_DUMP")]
    pub dump: Option<PathBuf>,

    /// Directory to load previously dumped snapshot data from
    /// (replaces the live GitHub client).
    #[arg(long, env = "REPOWARDEN_LOAD")]
    pub load: Option<PathBuf>,

    /// Webhook URL to notify with the run result.
    #[arg(long, env = "REPOWARDEN_NOTIFY_WEBHOOK", hide_env_values = true)]
    pub notify_webhook: Option<String>,
}

fn invalid(message: impl Into<String>) -> AuditError {
    AuditError::InvalidConfig {
        message: message.into(),
    }
}

impl Config {
    /// Validates the whole configuration once, before orchestration starts.
    pub fn validate(&self) -> Result<(), AuditError> {
        // Live mode needs an owner and App credentials; load mode audits
        // whatever the dump directory holds.
        if self.load.is_none() {
            match &self.owner {
                Some(owner) if is_valid_owner(owner) => {}
                Some(owner) => {
                    return Err(invalid(format!("invalid owner name: {owner:?}")));
                }
                None => return Err(invalid("owner is required")),
            }
            if self.app_id.is_none() {
                return Err(invalid("app-id is required"));
            }
            if self.install_id.is_none() {
                return Err(invalid("install-id is required"));
            }
            match (&self.private_key_file, &self.private_key_data) {
                (None, None) | (Some(_), Some(_)) => {
                    return Err(invalid(
                        "exactly one of private-key-file or private-key-data is required",
                    ));
                }
                _ => {}
            }
        }

        match (&self.policy, &self.url) {
            (None, None) => {
                return Err(invalid("either a policy path or an OPA server URL is required"));
            }
            (Some(_), Some(_)) => {
                return Err(invalid("policy path and OPA server URL are mutually exclusive"));
            }
            (None, Some(url)) if !is_http_url(url) => {
                return Err(invalid(format!("invalid OPA server URL: {url:?}")));
            }
            _ => {}
        }

        if let Some(url) = &self.notify_webhook {
            if !is_http_url(url) {
                return Err(invalid(format!("invalid notification webhook URL: {url:?}")));
            }
        }
        if self.thread < 1 {
            return Err(invalid("thread must be at least 1"));
        }

        self.parsed_headers().map(|_| ())
    }

    /// Splits every `--header "Name: Value"` argument.
    pub fn parsed_headers(&self) -> Result<Vec<(String, String)>, AuditError> {
        self.headers
            .iter()
            .map(|raw| {
                raw.split_once(':')
                    .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
                    .filter(|(name, _)| !name.is_empty())
                    .ok_or_else(|| invalid(format!("invalid HTTP header format: {raw:?}")))
            })
            .collect()
    }

    /// Returns the App private key PEM from whichever setting was given.
    pub fn private_key(&self) -> Result<String, AuditError> {
        if let Some(data) = &self.private_key_data {
            return Ok(data.clone());
        }
        let path = self
            .private_key_file
            .as_ref()
            .ok_or_else(|| invalid("no private key configured"))?;
        std::fs::read_to_string(path).map_err(|err| {
            invalid(format!(
                "failed to read private key file {}: {err}",
                path.display()
            ))
        })
    }
}

fn is_valid_owner(owner: &str) -> bool {
    !owner.is_empty()
        && owner
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["repowarden"];
        argv.extend(args);
        Config::try_parse_from(argv).unwrap()
    }

    const LIVE: &[&str] = &[
        "--owner",
        "acme",
        "--app-id",
        "7",
        "--install-id",
        "42",
        "--private-key-file",
        "key.pem",
        "--policy",
        "policies/",
    ];

    #[test]
    fn live_configuration_passes() {
        parse(LIVE).validate().unwrap();
    }

    #[test]
    fn owner_is_required_in_live_mode() {
        let cfg = parse(&[
            "--app-id", "7", "--install-id", "42",
            "--private-key-file", "key.pem", "--policy", "p/",
        ]);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("owner"));
    }

    #[test]
    fn owner_name_is_constrained() {
        let cfg = parse(&[
            "--owner", "a cme", "--app-id", "7", "--install-id", "42",
            "--private-key-file", "key.pem", "--policy", "p/",
        ]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_mode_skips_credential_checks() {
        let cfg = parse(&["--load", "dumps/", "--policy", "policies/"]);
        cfg.validate().unwrap();
    }

    #[test]
    fn key_file_and_key_data_are_mutually_exclusive() {
        let cfg = parse(&[
            "--owner", "acme", "--app-id", "7", "--install-id", "42",
            "--private-key-file", "key.pem", "--private-key-data", "pem",
            "--policy", "p/",
        ]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn policy_or_url_is_required() {
        let cfg = parse(&[
            "--owner", "acme", "--app-id", "7", "--install-id", "42",
            "--private-key-file", "key.pem",
        ]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn policy_and_url_are_mutually_exclusive() {
        let cfg = parse(&[
            "--owner", "acme", "--app-id", "7", "--install-id", "42",
            "--private-key-file", "key.pem", "--policy", "p/",
            "--url", "https://opa.example.invalid/v1/data/repowarden",
        ]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_threads_is_rejected() {
        let mut cfg = parse(LIVE);
        cfg.thread = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn headers_parse_into_pairs() {
        let mut cfg = parse(LIVE);
        cfg.headers = vec!["Authorization: Bearer abc:def".to_string()];
        assert_eq!(
            cfg.parsed_headers().unwrap(),
            vec![("Authorization".to_string(), "Bearer abc:def".to_string())]
        );

        cfg.headers = vec!["no-colon-here".to_string()];
        assert!(cfg.parsed_headers().is_err());
    }

    #[test]
    fn defaults_are_applied() {
        let cfg = parse(LIVE);
        assert_eq!(cfg.thread, audit::DEFAULT_WORKERS);
        assert_eq!(cfg.limit, 0);
        assert_eq!(cfg.package, policy::DEFAULT_PACKAGE);
        assert_eq!(cfg.log_format, LogFormat::Text);
        assert!(!cfg.fail);
    }
}
