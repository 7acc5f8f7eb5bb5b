//! GitHub App authentication.
//!
//! A GitHub App authenticates in two hops: a short-lived RS256 JWT signed
//! with the App's private key, exchanged for an installation access token
//! that the REST calls use. Installation tokens last an hour; the manager
//! caches one and refreshes shortly before expiry.

use audit::AuditError;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Refresh the cached token when it has less than this left to live.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// GitHub App credentials as supplied by configuration.
pub struct AppCredentials {
    /// The App's numeric identifier.
    pub app_id: u64,
    /// The installation to authenticate as.
    pub installation_id: u64,
    /// PEM-encoded RSA private key of the App.
    pub private_key_pem: String,
}

#[derive(Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Deserialize)]
struct InstallationToken {
    token: String,
    expires_at: DateTime<Utc>,
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Exchanges and caches installation access tokens.
pub(crate) struct TokenManager {
    app_id: u64,
    installation_id: u64,
    key: EncodingKey,
    http: reqwest::Client,
    base_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    /// Validates the private key and prepares the manager.
    ///
    /// A malformed key is a configuration error caught here, before any
    /// orchestration starts.
    pub(crate) fn new(
        credentials: AppCredentials,
        http: reqwest::Client,
        base_url: String,
    ) -> Result<Self, AuditError> {
        let key = EncodingKey::from_rsa_pem(credentials.private_key_pem.as_bytes()).map_err(
            |err| AuditError::InvalidConfig {
                message: format!("invalid GitHub App private key: {err}"),
            },
        )?;
        Ok(Self {
            app_id: credentials.app_id,
            installation_id: credentials.installation_id,
            key,
            http,
            base_url,
            cached: Mutex::new(None),
        })
    }

    /// Returns a valid installation token, exchanging a fresh one if the
    /// cached token is missing or close to expiry.
    pub(crate) async fn installation_token(&self) -> Result<String, AuditError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at - Utc::now() > Duration::seconds(EXPIRY_MARGIN_SECS) {
                return Ok(token.token.clone());
            }
        }

        let fresh = self.exchange().await?;
        tracing::debug!(expires_at = %fresh.expires_at, "installation token refreshed");
        let value = fresh.token.clone();
        *cached = Some(CachedToken {
            token: fresh.token,
            expires_at: fresh.expires_at,
        });
        Ok(value)
    }

    async fn exchange(&self) -> Result<InstallationToken, AuditError> {
        let now = Utc::now().timestamp();
        // Backdated iat per GitHub's clock-drift guidance; max lifetime is
        // ten minutes.
        let claims = AppClaims {
            iat: now - 60,
            exp: now + 540,
            iss: self.app_id.to_string(),
        };
        let jwt = encode(&Header::new(Algorithm::RS256), &claims, &self.key).map_err(|err| {
            AuditError::InvalidConfig {
                message: format!("failed to sign GitHub App JWT: {err}"),
            }
        })?;

        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.base_url, self.installation_id
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(jwt)
            .header(reqwest::header::ACCEPT, super::client::ACCEPT_HEADER)
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_private_key_is_a_config_error() {
        let err = TokenManager::new(
            AppCredentials {
                app_id: 1,
                installation_id: 2,
                private_key_pem: "not a pem".to_string(),
            },
            reqwest::Client::new(),
            "https://api.github.invalid".to_string(),
        )
        .err()
        .expect("construction must fail");

        assert!(matches!(err, AuditError::InvalidConfig { .. }));
    }
}
