//! Turns a finalized [`AuditResult`] into its outward-facing forms: the
//! console summary, the notification message, and the outcome signal the
//! caller maps to a process exit code.

use std::sync::Arc;

use crate::errors::AuditError;
use crate::ports::NotificationSink;
use crate::types::AuditResult;

/// Maximum repository entries rendered per category in a notification.
/// Categories with more records get an "and N more" tail.
pub const CATEGORY_DISPLAY_LIMIT: usize = 16;

/// The end-of-run message handed to a [`NotificationSink`].
///
/// A domain value, deliberately free of any transport format: the sink
/// decides how to render it (Slack blocks, plain JSON, …).
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The run finished with no violations.
    Success {
        /// Number of repositories discovered.
        scanned_repos: usize,
        /// Wall-clock duration of the run.
        elapsed: chrono::Duration,
    },
    /// The run finished and found violations.
    Violations {
        /// Total violation records across all categories.
        violation_count: usize,
        /// Number of repositories discovered.
        scanned_repos: usize,
        /// Wall-clock duration of the run.
        elapsed: chrono::Duration,
        /// Per-category detail, capped at [`CATEGORY_DISPLAY_LIMIT`] entries.
        categories: Vec<CategorySummary>,
    },
}

/// The rendered detail for one violation category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySummary {
    /// Policy identifier.
    pub category: String,
    /// Up to [`CATEGORY_DISPLAY_LIMIT`] affected repositories.
    pub entries: Vec<ViolationEntry>,
    /// Records beyond the display limit ("and N more").
    pub omitted: usize,
}

/// One affected repository within a category summary.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationEntry {
    /// `owner/name` of the repository.
    pub repo_full_name: String,
    /// Web URL for linking, when known.
    pub html_url: Option<String>,
    /// Violation detail from the evaluator.
    pub message: String,
}

impl Notification {
    /// Builds the message shape matching `result`.
    ///
    /// Categories are emitted in lexical order so the same result always
    /// produces the same message.
    pub fn from_result(result: &AuditResult) -> Self {
        let elapsed = result.elapsed();
        if result.is_clean() {
            return Self::Success {
                scanned_repos: result.repos.len(),
                elapsed,
            };
        }

        let mut names: Vec<&String> = result.records.keys().collect();
        names.sort();
        let categories = names
            .into_iter()
            .map(|name| {
                let records = &result.records[name];
                CategorySummary {
                    category: name.clone(),
                    entries: records
                        .iter()
                        .take(CATEGORY_DISPLAY_LIMIT)
                        .map(|record| ViolationEntry {
                            repo_full_name: record.repo.full_name.clone(),
                            html_url: record.repo.html_url.clone(),
                            message: record.violation.message.clone(),
                        })
                        .collect(),
                    omitted: records.len().saturating_sub(CATEGORY_DISPLAY_LIMIT),
                }
            })
            .collect();

        Self::Violations {
            violation_count: result.violation_count(),
            scanned_repos: result.repos.len(),
            elapsed,
            categories,
        }
    }
}

/// Formats a run duration for human-facing output.
pub fn format_elapsed(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds();
    if secs >= 60 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", elapsed.num_milliseconds() as f64 / 1000.0)
    }
}

/// Renders the console summary for `result`.
pub fn render_console(result: &AuditResult) -> String {
    if result.is_clean() {
        return "\n----- No violation detected -----\n\n".to_string();
    }

    let mut out = format!(
        "\n===== {} violation detected =====\n",
        result.violation_count()
    );
    let mut names: Vec<&String> = result.records.keys().collect();
    names.sort();
    for name in names {
        out.push_str(&format!("[{name}]\n"));
        for record in &result.records[name] {
            out.push_str(&format!(
                "- {}: {}\n",
                record.repo.full_name, record.violation.message
            ));
        }
    }
    out.push('\n');
    out
}

/// Renders the aggregate result and maps it to the run outcome.
pub struct ReportSink {
    notifier: Option<Arc<dyn NotificationSink>>,
}

impl Default for ReportSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportSink {
    /// Creates a sink that only prints the console summary.
    pub fn new() -> Self {
        Self { notifier: None }
    }

    /// Also posts a notification at the end of every run.
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Reports `result` and returns the run outcome.
    ///
    /// Returns [`AuditError::ViolationDetected`] whenever the result holds
    /// any record, independent of notification delivery: a failed post on a
    /// run with findings is logged, while on a clean run it is the returned
    /// error (there is no violation signal to preserve).
    pub async fn report(&self, result: &AuditResult) -> Result<(), AuditError> {
        print!("{}", render_console(result));

        if let Some(notifier) = &self.notifier {
            let notification = Notification::from_result(result);
            if let Err(err) = notifier.post(&notification).await {
                if result.is_clean() {
                    return Err(err);
                }
                tracing::error!(error = %err, "notification delivery failed");
            }
        }

        result.outcome()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::types::{
        AuditRecord, OwnerRef, PolicyViolation, RepositoryDescriptor, RunId,
    };

    fn descriptor(full_name: &str) -> RepositoryDescriptor {
        let (owner, name) = full_name.split_once('/').unwrap();
        RepositoryDescriptor {
            name: name.to_string(),
            full_name: full_name.to_string(),
            owner: OwnerRef {
                login: owner.to_string(),
                extra: serde_json::Map::new(),
            },
            private: false,
            archived: false,
            html_url: Some(format!("https://github.com/{full_name}")),
            default_branch: None,
            extra: serde_json::Map::new(),
        }
    }

    fn result_with(records: &[(&str, &str, &str)]) -> AuditResult {
        let mut result = AuditResult::new(RunId::new_random(), vec![], Utc::now());
        result.add(records.iter().map(|(category, repo, message)| AuditRecord {
            violation: PolicyViolation {
                category: category.to_string(),
                message: message.to_string(),
            },
            repo: descriptor(repo),
            scanned_at: Utc::now(),
        }));
        result.completed_at = Some(Utc::now());
        result
    }

    struct FakeSink {
        posted: Mutex<Vec<Notification>>,
        fail: bool,
    }

    impl FakeSink {
        fn new(fail: bool) -> Self {
            Self {
                posted: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl NotificationSink for FakeSink {
        async fn post(&self, notification: &Notification) -> Result<(), AuditError> {
            if self.fail {
                return Err(AuditError::Notification {
                    message: "webhook returned 500".to_string(),
                });
            }
            self.posted.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    #[test]
    fn clean_result_renders_banner() {
        let result = result_with(&[]);
        assert!(render_console(&result).contains("No violation detected"));
    }

    #[test]
    fn violations_render_grouped_and_sorted() {
        let rendered = render_console(&result_with(&[
            ("hooks", "acme/web", "insecure url"),
            ("branch_protection", "acme/api", "main is unprotected"),
        ]));

        assert!(rendered.contains("===== 2 violation detected ====="));
        let bp = rendered.find("[branch_protection]").unwrap();
        let hooks = rendered.find("[hooks]").unwrap();
        assert!(bp < hooks);
        assert!(rendered.contains("- acme/api: main is unprotected"));
    }

    #[test]
    fn notification_caps_entries_at_display_limit() {
        let records: Vec<(String, String, String)> = (0..20)
            .map(|i| {
                (
                    "branch_protection".to_string(),
                    format!("acme/repo{i}"),
                    "unprotected".to_string(),
                )
            })
            .collect();
        let refs: Vec<(&str, &str, &str)> = records
            .iter()
            .map(|(c, r, m)| (c.as_str(), r.as_str(), m.as_str()))
            .collect();

        match Notification::from_result(&result_with(&refs)) {
            Notification::Violations {
                violation_count,
                categories,
                ..
            } => {
                assert_eq!(violation_count, 20);
                assert_eq!(categories.len(), 1);
                assert_eq!(categories[0].entries.len(), CATEGORY_DISPLAY_LIMIT);
                assert_eq!(categories[0].omitted, 4);
            }
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[test]
    fn clean_result_builds_success_notification() {
        let mut result = result_with(&[]);
        result.repos = vec![descriptor("acme/a"), descriptor("acme/b")];

        match Notification::from_result(&result) {
            Notification::Success { scanned_repos, .. } => assert_eq!(scanned_repos, 2),
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[tokio::test]
    async fn report_returns_violation_outcome() {
        let sink = Arc::new(FakeSink::new(false));
        let report = ReportSink::new().with_notifier(sink.clone());
        let result = result_with(&[("hooks", "acme/web", "insecure url")]);

        let err = report.report(&result).await.unwrap_err();
        assert!(matches!(err, AuditError::ViolationDetected { count: 1 }));
        assert_eq!(sink.posted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn violation_outcome_survives_failed_notification() {
        let report = ReportSink::new().with_notifier(Arc::new(FakeSink::new(true)));
        let result = result_with(&[("hooks", "acme/web", "insecure url")]);

        let err = report.report(&result).await.unwrap_err();
        assert!(err.is_violation());
    }

    #[tokio::test]
    async fn clean_run_surfaces_notification_failure() {
        let report = ReportSink::new().with_notifier(Arc::new(FakeSink::new(true)));
        let result = result_with(&[]);

        let err = report.report(&result).await.unwrap_err();
        assert!(matches!(err, AuditError::Notification { .. }));
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(chrono::Duration::milliseconds(2500)), "2.5s");
        assert_eq!(format_elapsed(chrono::Duration::seconds(92)), "1m32s");
    }
}
