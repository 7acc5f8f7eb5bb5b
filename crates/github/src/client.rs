//! Live GitHub REST client, authenticated as a GitHub App installation.

use async_trait::async_trait;
use audit::{
    AuditError, BranchSnapshot, Collaborator, ProtectionRuleset, RepositoryDescriptor,
    RepositorySource, TeamAssociation, Webhook,
};
use serde::de::DeserializeOwned;

use crate::auth::{AppCredentials, TokenManager};

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const PER_PAGE: usize = 100;
pub(crate) const ACCEPT_HEADER: &str = "application/vnd.github+json";
const USER_AGENT: &str = concat!("repowarden/", env!("CARGO_PKG_VERSION"));

/// GitHub REST client implementing [`RepositorySource`].
///
/// Every listing endpoint is paginated with `per_page = 100` until a short
/// page arrives; end-of-pages is a loop terminator, never an error. Any
/// non-success status surfaces as [`AuditError::UnexpectedResponse`] with
/// the status code and body.
pub struct AppClient {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenManager,
}

impl AppClient {
    /// Creates a client against the public GitHub API.
    pub fn new(credentials: AppCredentials) -> Result<Self, AuditError> {
        Self::with_base_url(credentials, DEFAULT_BASE_URL)
    }

    /// Creates a client against a different API root (GitHub Enterprise,
    /// tests).
    pub fn with_base_url(
        credentials: AppCredentials,
        base_url: impl Into<String>,
    ) -> Result<Self, AuditError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| AuditError::InvalidConfig {
                message: format!("failed to build HTTP client: {err}"),
            })?;
        let tokens = TokenManager::new(credentials, http.clone(), base_url.clone())?;
        Ok(Self {
            http,
            base_url,
            tokens,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AuditError> {
        let url = format!("{}{}", self.base_url, path);
        let token = self.tokens.installation_token().await?;
        let response = self
            .http
            .get(&url)
            .query(query)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, ACCEPT_HEADER)
            .send()
            .await
            .map_err(|err| AuditError::Transport {
                url: url.clone(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuditError::UnexpectedResponse {
                url,
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|err| AuditError::Transport {
                url,
                message: err.to_string(),
            })
    }

    async fn get_paged<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, AuditError> {
        let mut items = Vec::new();
        for page in 1usize.. {
            let got: Vec<T> = self
                .get_json(
                    path,
                    &[
                        ("per_page", PER_PAGE.to_string()),
                        ("page", page.to_string()),
                    ],
                )
                .await?;
            let count = got.len();
            items.extend(got);
            if count < PER_PAGE {
                break;
            }
        }
        Ok(items)
    }

    fn repo_path(owner: &str, repo: &str, resource: &str) -> String {
        format!("/repos/{owner}/{repo}/{resource}")
    }
}

#[async_trait]
impl RepositorySource for AppClient {
    async fn list_repositories(
        &self,
        owner: &str,
    ) -> Result<Vec<RepositoryDescriptor>, AuditError> {
        let repos: Vec<RepositoryDescriptor> =
            self.get_paged(&format!("/orgs/{owner}/repos")).await?;
        tracing::trace!(owner, total = repos.len(), "retrieved repository list");
        Ok(repos)
    }

    async fn list_branches(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<BranchSnapshot>, AuditError> {
        self.get_paged(&Self::repo_path(owner, repo, "branches"))
            .await
    }

    async fn get_branch_protection(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<ProtectionRuleset, AuditError> {
        let value: serde_json::Value = self
            .get_json(
                &Self::repo_path(owner, repo, &format!("branches/{branch}/protection")),
                &[],
            )
            .await?;
        Ok(ProtectionRuleset(value))
    }

    async fn list_collaborators(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<Collaborator>, AuditError> {
        self.get_paged(&Self::repo_path(owner, repo, "collaborators"))
            .await
    }

    async fn list_webhooks(&self, owner: &str, repo: &str) -> Result<Vec<Webhook>, AuditError> {
        self.get_paged(&Self::repo_path(owner, repo, "hooks")).await
    }

    async fn list_teams(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<TeamAssociation>, AuditError> {
        self.get_paged(&Self::repo_path(owner, repo, "teams")).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    // Throwaway RSA key generated for these tests; it has never signed
    // anything outside this file.
    const TEST_KEY: &str = include_str!("../tests/data/test_rsa.pem");

    async fn client_for(server: &MockServer) -> AppClient {
        Mock::given(method("POST"))
            .and(path("/app/installations/42/access_tokens"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "token": "ghs_testtoken",
                "expires_at": "2099-01-01T00:00:00Z"
            })))
            .mount(server)
            .await;

        AppClient::with_base_url(
            AppCredentials {
                app_id: 7,
                installation_id: 42,
                private_key_pem: TEST_KEY.to_string(),
            },
            server.uri(),
        )
        .unwrap()
    }

    fn repo_json(index: usize) -> serde_json::Value {
        json!({
            "name": format!("repo{index}"),
            "full_name": format!("acme/repo{index}"),
            "owner": {"login": "acme"},
            "private": false,
            "archived": false
        })
    }

    #[tokio::test]
    async fn lists_repositories_across_pages() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;

        let first_page: Vec<_> = (0..100).map(repo_json).collect();
        Mock::given(method("GET"))
            .and(path("/orgs/acme/repos"))
            .and(query_param("page", "1"))
            .and(header("authorization", "Bearer ghs_testtoken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(first_page))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme/repos"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([repo_json(100)])))
            .mount(&server)
            .await;

        let repos = client.list_repositories("acme").await.unwrap();
        assert_eq!(repos.len(), 101);
        assert_eq!(repos[0].full_name, "acme/repo0");
        assert_eq!(repos[100].full_name, "acme/repo100");
    }

    #[tokio::test]
    async fn short_page_terminates_pagination() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/api/branches"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "main", "commit": {"sha": "0a1b2c"}, "protected": true}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let branches = client.list_branches("acme", "api").await.unwrap();
        assert_eq!(branches.len(), 1);
        assert!(branches[0].protected);
        assert!(branches[0].protection.is_none());
    }

    #[tokio::test]
    async fn non_success_status_surfaces_with_body() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/api/hooks"))
            .respond_with(ResponseTemplate::new(403).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = client.list_webhooks("acme", "api").await.unwrap_err();
        match err {
            AuditError::UnexpectedResponse { status, body, .. } => {
                assert_eq!(status, 403);
                assert_eq!(body, "rate limited");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn branch_protection_is_fetched_verbatim() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;

        let ruleset = json!({
            "enforce_admins": {"enabled": true},
            "required_pull_request_reviews": {"required_approving_review_count": 2}
        });
        Mock::given(method("GET"))
            .and(path("/repos/acme/api/branches/main/protection"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ruleset.clone()))
            .mount(&server)
            .await;

        let protection = client
            .get_branch_protection("acme", "api", "main")
            .await
            .unwrap();
        assert_eq!(protection.0, ruleset);
    }

    #[tokio::test]
    async fn failed_token_exchange_is_an_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/app/installations/42/access_tokens"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let client = AppClient::with_base_url(
            AppCredentials {
                app_id: 7,
                installation_id: 42,
                private_key_pem: TEST_KEY.to_string(),
            },
            server.uri(),
        )
        .unwrap();

        let err = client.list_repositories("acme").await.unwrap_err();
        assert!(matches!(
            err,
            AuditError::UnexpectedResponse { status: 401, .. }
        ));
    }
}
