//! The audit run state machine.
//!
//! One run moves through Listing (repository discovery), Dispatching (a
//! fixed pool of workers pulling repositories from a shared FIFO cursor),
//! Draining (joining in-flight workers), and Finalized. A fatal error in any
//! worker aborts the run: the first observed error is stored, the run's
//! cancellation token fires so no further repositories are pulled, and that
//! error is returned once every worker has been joined.
//!
//! Workers never send on a channel, so an aborting run cannot strand a
//! blocked sender: the shared [`AuditResult`] behind a mutex is the only
//! cross-worker output path, and the error slot is a mutex too.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::errors::AuditError;
use crate::ports::{PolicyEvaluator, RepositorySource};
use crate::snapshot::SnapshotBuilder;
use crate::types::{AuditRecord, AuditResult, RepositoryDescriptor, RunId};

/// Worker pool size when none is configured.
pub const DEFAULT_WORKERS: usize = 4;

/// Drives one audit run end to end.
///
/// Owns limit enforcement, the worker pool, result aggregation, and the
/// first-error-wins abort policy. Collaborators are trait objects chosen by
/// the composition root.
pub struct AuditOrchestrator {
    source: Arc<dyn RepositorySource>,
    evaluator: Arc<dyn PolicyEvaluator>,
    workers: usize,
    limit: usize,
    dump_dir: Option<PathBuf>,
}

impl AuditOrchestrator {
    /// Creates an orchestrator with [`DEFAULT_WORKERS`] workers, no
    /// processing limit, and persistence disabled.
    pub fn new(source: Arc<dyn RepositorySource>, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        Self {
            source,
            evaluator,
            workers: DEFAULT_WORKERS,
            limit: 0,
            dump_dir: None,
        }
    }

    /// Sets the worker pool size; values below 1 are clamped to 1.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Limits the run to the first `limit` repositories in listing order.
    /// `0` means unbounded.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Persists every completed snapshot under `dir` for offline replay.
    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    /// Runs one audit over every repository `owner` owns (subject to the
    /// configured limit).
    ///
    /// Returns the finalized [`AuditResult`] on success; the caller decides
    /// how to report it. Cancelling `cancel` stops further dispatch promptly
    /// and yields [`AuditError::Cancelled`].
    pub async fn audit(
        &self,
        cancel: CancellationToken,
        owner: &str,
    ) -> Result<AuditResult, AuditError> {
        let run_id = RunId::new_random();
        let span = tracing::info_span!("audit", run = %run_id, owner);
        self.run(cancel, owner, run_id).instrument(span).await
    }

    async fn run(
        &self,
        cancel: CancellationToken,
        owner: &str,
        run_id: RunId,
    ) -> Result<AuditResult, AuditError> {
        let started_at = Utc::now();

        let repos = self.source.list_repositories(owner).await?;
        tracing::debug!(total = repos.len(), "retrieved repository list");

        let effective = match self.limit {
            0 => repos.len(),
            limit => repos.len().min(limit),
        };

        let queue = Arc::new(WorkQueue::new(repos[..effective].to_vec()));
        let shared = Arc::new(SharedRun {
            result: Mutex::new(AuditResult::new(run_id, repos, started_at)),
            first_error: Mutex::new(None),
            // Child token: a worker abort must not cancel the caller's token,
            // while caller cancellation still propagates to the workers.
            cancel: cancel.child_token(),
        });

        let builder = Arc::new(match &self.dump_dir {
            Some(dir) => SnapshotBuilder::new(self.source.clone()).with_dump_dir(dir),
            None => SnapshotBuilder::new(self.source.clone()),
        });

        let mut pool = JoinSet::new();
        for _ in 0..self.workers {
            let queue = queue.clone();
            let shared = shared.clone();
            let builder = builder.clone();
            let evaluator = self.evaluator.clone();
            pool.spawn(
                async move { worker(queue, builder, evaluator, shared).await }
                    .in_current_span(),
            );
        }
        tracing::debug!(
            workers = self.workers,
            dispatched = effective,
            "dispatching repositories"
        );

        // Draining: every worker is joined whether the run aborts or not.
        while let Some(joined) = pool.join_next().await {
            if let Err(err) = joined {
                shared.record_error(AuditError::Worker {
                    message: err.to_string(),
                });
            }
        }

        let externally_cancelled = cancel.is_cancelled();
        let shared = Arc::try_unwrap(shared).map_err(|_| AuditError::Worker {
            message: "run state still referenced after join".to_string(),
        })?;

        if let Some(err) = shared
            .first_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
        {
            tracing::warn!(error = %err, "audit run aborted");
            return Err(err);
        }
        if externally_cancelled {
            return Err(AuditError::Cancelled);
        }

        let mut result = shared
            .result
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        result.completed_at = Some(Utc::now());
        tracing::info!(
            repos = effective,
            violations = result.violation_count(),
            "audit run finalized"
        );
        Ok(result)
    }
}

/// State shared by the workers of one run.
struct SharedRun {
    result: Mutex<AuditResult>,
    first_error: Mutex<Option<AuditError>>,
    cancel: CancellationToken,
}

impl SharedRun {
    /// Stores the first observed error and stops further dispatch.
    fn record_error(&self, err: AuditError) {
        let mut slot = self
            .first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
        self.cancel.cancel();
    }
}

/// The truncated repository list with a shared dispatch cursor.
///
/// `fetch_add` hands every index out exactly once, so no repository is
/// dispatched twice or skipped even under concurrent pulls.
struct WorkQueue {
    repos: Vec<RepositoryDescriptor>,
    next: AtomicUsize,
}

impl WorkQueue {
    fn new(repos: Vec<RepositoryDescriptor>) -> Self {
        Self {
            repos,
            next: AtomicUsize::new(0),
        }
    }

    fn next(&self) -> Option<RepositoryDescriptor> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        self.repos.get(index).cloned()
    }
}

/// One pool worker: pulls repositories until the queue is exhausted or the
/// run is cancelled.
async fn worker(
    queue: Arc<WorkQueue>,
    builder: Arc<SnapshotBuilder>,
    evaluator: Arc<dyn PolicyEvaluator>,
    shared: Arc<SharedRun>,
) {
    loop {
        if shared.cancel.is_cancelled() {
            return;
        }
        let Some(repo) = queue.next() else { return };

        tokio::select! {
            // Abandon the in-flight unit when the run aborts; its partial
            // output never reaches the shared result.
            _ = shared.cancel.cancelled() => return,
            outcome = process(&builder, evaluator.as_ref(), &repo) => match outcome {
                Ok(records) => {
                    tracing::info!(
                        repo = %repo.full_name,
                        violations = records.len(),
                        "repository evaluated"
                    );
                    shared
                        .result
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .add(records);
                }
                Err(err) => {
                    shared.record_error(err);
                    return;
                }
            }
        }
    }
}

/// One unit of work: snapshot, evaluate, convert violations to records.
async fn process(
    builder: &SnapshotBuilder,
    evaluator: &dyn PolicyEvaluator,
    repo: &RepositoryDescriptor,
) -> Result<Vec<AuditRecord>, AuditError> {
    let input = builder
        .build(repo)
        .await
        .map_err(|err| AuditError::for_repository(&repo.full_name, err))?;
    let violations = evaluator
        .evaluate(&input)
        .await
        .map_err(|err| AuditError::for_repository(&repo.full_name, err))?;

    let scanned_at = input.captured_at();
    Ok(violations
        .into_iter()
        .map(|violation| AuditRecord {
            violation,
            repo: input.repo.clone(),
            scanned_at,
        })
        .collect())
}
