//! Remote OPA server client.
//!
//! Posts each snapshot to the server's data API (`POST <url>` with
//! `{"input": <snapshot>}`) and reads violations out of the standard
//! `{"result": {"fail": [...]}}` envelope. The URL carries the package
//! path; extra headers cover deployments behind authenticating proxies.

use async_trait::async_trait;
use audit::{AuditError, AuditInput, PolicyEvaluator, PolicyViolation};
use serde::Deserialize;

const USER_AGENT: &str = concat!("repowarden/", env!("CARGO_PKG_VERSION"));

/// [`PolicyEvaluator`] backed by an OPA server.
pub struct RemoteEvaluator {
    http: reqwest::Client,
    url: String,
    headers: Vec<(String, String)>,
}

#[derive(Deserialize)]
struct DataResponse {
    result: Option<PackageDocument>,
}

#[derive(Deserialize)]
struct PackageDocument {
    #[serde(default)]
    fail: Vec<PolicyViolation>,
}

impl RemoteEvaluator {
    /// Creates an evaluator posting to `url` with the given extra headers.
    pub fn new(
        url: impl Into<String>,
        headers: Vec<(String, String)>,
    ) -> Result<Self, AuditError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| AuditError::InvalidConfig {
                message: format!("failed to build HTTP client: {err}"),
            })?;
        Ok(Self {
            http,
            url: url.into(),
            headers,
        })
    }
}

#[async_trait]
impl PolicyEvaluator for RemoteEvaluator {
    async fn evaluate(&self, input: &AuditInput) -> Result<Vec<PolicyViolation>, AuditError> {
        let mut request = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({ "input": input }));
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|err| AuditError::Transport {
            url: self.url.clone(),
            message: err.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuditError::UnexpectedResponse {
                url: self.url.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let data: DataResponse =
            response.json().await.map_err(|err| AuditError::Transport {
                url: self.url.clone(),
                message: err.to_string(),
            })?;

        // An absent result means the package path does not exist on the
        // server; treating that as compliant would hide a misconfiguration.
        match data.result {
            Some(document) => Ok(document.fail),
            None => Err(AuditError::PolicyEval {
                message: format!("no evaluation result from {}", self.url),
            }),
        }
    }
}
