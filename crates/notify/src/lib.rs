//! RepoWarden notification infrastructure.
//!
//! Implements [`audit::NotificationSink`] for Slack-compatible incoming
//! webhooks. The domain hands over an [`audit::Notification`]; this crate
//! renders it into Slack's Block Kit layout and posts it. No other crate
//! knows the message wire format.

use async_trait::async_trait;
use audit::{format_elapsed, AuditError, Notification, NotificationSink};
use serde_json::{json, Value};

const MESSAGE_TITLE: &str = "RepoWarden: audit completed";
const COLOR_SUCCESS: &str = "#2EB67D";
const COLOR_VIOLATION: &str = "#E01E5A";
const USER_AGENT: &str = concat!("repowarden/", env!("CARGO_PKG_VERSION"));

/// Posts run notifications to a Slack-compatible incoming webhook.
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// Creates a notifier posting to `url`.
    pub fn new(url: impl Into<String>) -> Result<Self, AuditError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| AuditError::InvalidConfig {
                message: format!("failed to build HTTP client: {err}"),
            })?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn post(&self, notification: &Notification) -> Result<(), AuditError> {
        let body = payload(notification);
        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|err| AuditError::Notification {
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AuditError::Notification {
                message: format!("webhook returned status {status}: {text}"),
            });
        }
        tracing::debug!("notification posted");
        Ok(())
    }
}

/// Renders a [`Notification`] as a Slack webhook payload.
pub fn payload(notification: &Notification) -> Value {
    match notification {
        Notification::Success {
            scanned_repos,
            elapsed,
        } => message(
            COLOR_SUCCESS,
            ":white_check_mark: RepoWarden: no violation detected",
            *scanned_repos,
            *elapsed,
            Vec::new(),
        ),
        Notification::Violations {
            violation_count,
            scanned_repos,
            elapsed,
            categories,
        } => {
            let mut blocks = Vec::new();
            for category in categories {
                let mut lines = vec![format!("Policy: *{}*", category.category)];
                for entry in &category.entries {
                    let link = match &entry.html_url {
                        Some(url) => format!("<{url}|{}>", entry.repo_full_name),
                        None => entry.repo_full_name.clone(),
                    };
                    if entry.message.is_empty() {
                        lines.push(format!("- {link}"));
                    } else {
                        lines.push(format!("- {link}: {}", entry.message));
                    }
                }
                if category.omitted > 0 {
                    lines.push(String::new());
                    lines.push(format!("and {} more repos", category.omitted));
                }

                blocks.push(json!({"type": "divider"}));
                blocks.push(json!({
                    "type": "section",
                    "text": {"type": "mrkdwn", "text": lines.join("\n")}
                }));
            }

            message(
                COLOR_VIOLATION,
                &format!(":rotating_light: {violation_count} policy violation(s) detected"),
                *scanned_repos,
                *elapsed,
                blocks,
            )
        }
    }
}

fn message(
    color: &str,
    headline: &str,
    scanned_repos: usize,
    elapsed: chrono::Duration,
    detail_blocks: Vec<Value>,
) -> Value {
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": {"type": "plain_text", "text": headline}
        }),
        json!({
            "type": "section",
            "fields": [
                {"type": "mrkdwn", "text": format!("*Scanned*: {scanned_repos} repos")},
                {"type": "mrkdwn", "text": format!("*Elapsed*: {}", format_elapsed(elapsed))}
            ]
        }),
    ];
    blocks.extend(detail_blocks);

    json!({
        "text": MESSAGE_TITLE,
        "attachments": [{
            "color": color,
            "blocks": blocks
        }]
    })
}
