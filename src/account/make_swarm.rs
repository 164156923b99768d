//! Rackspace public cloud account used with make-swarm.

use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{Grant, account_id};
use crate::error::{BackendKind, ClusterError};
use crate::session::AUTH_TOKEN_HEADER;

/// Rackspace identity service issuing tokens for API keys.
pub const DEFAULT_IDENTITY_ENDPOINT: &str = "https://identity.api.rackspacecloud.com/v2.0";

/// Carina make-swarm API.
pub const DEFAULT_MAKE_SWARM_ENDPOINT: &str = "https://app.getcarina.com";

/// Username and API key for the public cloud.
#[derive(Clone, Eq, PartialEq)]
pub struct MakeSwarmAccount {
    /// Identity endpoint used to exchange the API key.
    pub identity_endpoint: String,
    /// make-swarm API endpoint.
    pub endpoint: String,
    /// User name.
    pub username: String,
    /// API key.
    pub api_key: String,
    /// Current token, empty until authenticated.
    pub token: String,
}

impl fmt::Debug for MakeSwarmAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MakeSwarmAccount")
            .field("identity_endpoint", &self.identity_endpoint)
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("has_token", &!self.token.is_empty())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct AccessResponse {
    access: Access,
}

#[derive(Debug, Deserialize)]
struct Access {
    token: AccessToken,
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    id: String,
}

impl MakeSwarmAccount {
    /// Creates an account against the default identity and API endpoints.
    #[must_use]
    pub fn new(username: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            identity_endpoint: DEFAULT_IDENTITY_ENDPOINT.to_owned(),
            endpoint: DEFAULT_MAKE_SWARM_ENDPOINT.to_owned(),
            username: username.into(),
            api_key: api_key.into(),
            token: String::new(),
        }
    }

    /// Returns a unique id for the account: `public-<hash>-<username>`.
    #[must_use]
    pub fn id(&self) -> String {
        account_id("public", &self.identity_endpoint, &self.username)
    }

    /// make-swarm API endpoint, falling back to the public default when
    /// none is configured.
    pub(crate) const fn service_endpoint(&self) -> &str {
        if self.endpoint.is_empty() {
            DEFAULT_MAKE_SWARM_ENDPOINT
        } else {
            self.endpoint.as_str()
        }
    }

    fn identity_url(&self, path: &str) -> String {
        format!("{}{path}", self.identity_endpoint.trim_end_matches('/'))
    }

    fn auth_failed(message: impl Into<String>) -> ClusterError {
        ClusterError::Authentication {
            backend: BackendKind::MakeSwarm,
            message: message.into(),
        }
    }

    pub(super) async fn probe(&self, http: &reqwest::Client) -> bool {
        let response = http
            .head(self.identity_url(&format!("/tokens/{}", self.token)))
            .header(AUTH_TOKEN_HEADER, &self.token)
            .send()
            .await;
        match response {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(err) => {
                debug!("[make-swarm] Cached token probe failed: {err}");
                false
            }
        }
    }

    pub(super) async fn exchange(&self, http: &reqwest::Client) -> Result<Grant, ClusterError> {
        let body = json!({
            "auth": {
                "RAX-KSKEY:apiKeyCredentials": {
                    "username": self.username,
                    "apiKey": self.api_key,
                }
            }
        });

        let response = http
            .post(self.identity_url("/tokens"))
            .json(&body)
            .send()
            .await
            .map_err(|err| Self::auth_failed(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::auth_failed(format!(
                "identity service returned {status}: {}",
                text.trim()
            )));
        }

        let parsed: AccessResponse = response
            .json()
            .await
            .map_err(|err| Self::auth_failed(format!("unreadable identity response: {err}")))?;

        Ok(Grant {
            token: parsed.access.token.id,
            endpoint: self.service_endpoint().to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_hashes_identity_endpoint() {
        let account = MakeSwarmAccount::new("alicia", "abc123");
        let moved = MakeSwarmAccount {
            identity_endpoint: String::from("https://identity.example.com/v2.0"),
            ..account.clone()
        };
        assert!(account.id().starts_with("public-"));
        assert!(account.id().ends_with("-alicia"));
        assert_ne!(account.id(), moved.id());
    }

    #[test]
    fn debug_output_hides_api_key() {
        let rendered = format!("{:?}", MakeSwarmAccount::new("alicia", "abc123"));
        assert!(!rendered.contains("abc123"));
    }
}
