//! `repowarden` binary: wires the GitHub source, policy evaluator, and
//! notifier together and runs one audit.
//!
//! This is the composition root. All policy lives in the library crates;
//! this file only reads configuration, constructs the concrete adapters,
//! and maps the final outcome to an exit code.

mod config;

use std::process::ExitCode;
use std::sync::Arc;

use audit::{
    AuditError, AuditOrchestrator, NotificationSink, PolicyEvaluator, ReportSink,
    RepositorySource,
};
use clap::Parser;
use github::{AppClient, AppCredentials, SnapshotLoader};
use notify::WebhookNotifier;
use policy::{LocalEvaluator, RemoteEvaluator};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, LogFormat};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();
    if let Err(err) = init_tracing(&config) {
        eprintln!("failed to initialise logging: {err}");
        return ExitCode::FAILURE;
    }

    match run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_violation() => {
            if config.fail {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            tracing::error!(error = %err, "audit failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &Config) -> Result<(), AuditError> {
    let filter =
        EnvFilter::try_new(&config.log_level).map_err(|err| AuditError::InvalidConfig {
            message: format!("invalid log level {:?}: {err}", config.log_level),
        })?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

async fn run(config: &Config) -> Result<(), AuditError> {
    config.validate()?;

    let source = build_source(config)?;
    let evaluator = build_evaluator(config)?;

    if let Some(dir) = &config.dump {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|err| AuditError::Persistence {
                path: dir.clone(),
                message: err.to_string(),
            })?;
    }

    let mut orchestrator = AuditOrchestrator::new(source, evaluator)
        .with_workers(config.thread)
        .with_limit(config.limit);
    if let Some(dir) = &config.dump {
        orchestrator = orchestrator.with_dump_dir(dir);
    }

    let owner = config.owner.as_deref().unwrap_or_default();
    tracing::info!(
        owner,
        workers = config.thread,
        limit = config.limit,
        offline = config.load.is_some(),
        "starting audit"
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping dispatch");
            interrupt.cancel();
        }
    });

    let result = orchestrator.audit(cancel, owner).await?;

    let mut sink = ReportSink::new();
    if let Some(url) = &config.notify_webhook {
        let notifier: Arc<dyn NotificationSink> = Arc::new(WebhookNotifier::new(url)?);
        sink = sink.with_notifier(notifier);
    }
    sink.report(&result).await
}

fn build_source(config: &Config) -> Result<Arc<dyn RepositorySource>, AuditError> {
    if let Some(dir) = &config.load {
        let loader = SnapshotLoader::from_dir(dir)?;
        tracing::info!(snapshots = loader.len(), dir = %dir.display(), "loaded snapshots");
        return Ok(Arc::new(loader));
    }

    // validate() guarantees both IDs and exactly one key source are present.
    let credentials = AppCredentials {
        app_id: config.app_id.unwrap_or_default(),
        installation_id: config.install_id.unwrap_or_default(),
        private_key_pem: config.private_key()?,
    };
    Ok(Arc::new(AppClient::new(credentials)?))
}

fn build_evaluator(config: &Config) -> Result<Arc<dyn PolicyEvaluator>, AuditError> {
    if let Some(path) = &config.policy {
        let evaluator = LocalEvaluator::from_path(path, &config.package)?;
        return Ok(Arc::new(evaluator));
    }
    // validate() guarantees a URL when no local policy is set.
    let url = config.url.as_deref().unwrap_or_default();
    let evaluator = RemoteEvaluator::new(url, config.parsed_headers()?)?;
    Ok(Arc::new(evaluator))
}
