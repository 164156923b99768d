//! OpenStack Keystone v3 account used with Magnum.

use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{Grant, account_id};
use crate::error::{BackendKind, ClusterError};
use crate::session::AUTH_TOKEN_HEADER;

const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";
const SERVICE_TYPE: &str = "container-infra";
const PUBLIC_INTERFACE: &str = "public";
const DEFAULT_DOMAIN: &str = "default";

/// Credentials accepted by OpenStack Identity (Keystone) v3.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct MagnumAccount {
    /// Identity endpoint, for example `https://keystone.example.com/v3`.
    pub auth_endpoint: String,
    /// Magnum endpoint, resolved from the service catalog or the cache.
    pub endpoint: String,
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
    /// Project name the token is scoped to.
    pub project: String,
    /// Domain of the user and project; `default` when empty.
    pub domain: String,
    /// Region used to pick the catalog endpoint; any region when empty.
    pub region: String,
    /// Current token, empty until authenticated.
    pub token: String,
}

impl fmt::Debug for MagnumAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MagnumAccount")
            .field("auth_endpoint", &self.auth_endpoint)
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("project", &self.project)
            .field("domain", &self.domain)
            .field("region", &self.region)
            .field("has_token", &!self.token.is_empty())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Default, Deserialize)]
struct TokenBody {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Deserialize)]
struct CatalogEndpoint {
    interface: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    region_id: Option<String>,
    url: String,
}

impl CatalogEndpoint {
    fn in_region(&self, region: &str) -> bool {
        region.is_empty()
            || self.region.as_deref() == Some(region)
            || self.region_id.as_deref() == Some(region)
    }
}

impl MagnumAccount {
    /// Returns a unique id for the account: `private-<hash>-<username>`.
    #[must_use]
    pub fn id(&self) -> String {
        account_id("private", &self.auth_endpoint, &self.username)
    }

    fn tokens_url(&self) -> String {
        format!("{}/auth/tokens", self.auth_endpoint.trim_end_matches('/'))
    }

    fn domain(&self) -> &str {
        if self.domain.is_empty() {
            DEFAULT_DOMAIN
        } else {
            &self.domain
        }
    }

    fn auth_failed(message: impl Into<String>) -> ClusterError {
        ClusterError::Authentication {
            backend: BackendKind::Magnum,
            message: message.into(),
        }
    }

    pub(super) async fn probe(&self, http: &reqwest::Client) -> bool {
        let response = http
            .head(self.tokens_url())
            .header(AUTH_TOKEN_HEADER, &self.token)
            .header(SUBJECT_TOKEN_HEADER, &self.token)
            .send()
            .await;
        match response {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(err) => {
                debug!("[magnum] Cached token probe failed: {err}");
                false
            }
        }
    }

    pub(super) async fn exchange(&self, http: &reqwest::Client) -> Result<Grant, ClusterError> {
        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": self.username,
                            "domain": { "name": self.domain() },
                            "password": self.password,
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": self.project,
                        "domain": { "name": self.domain() },
                    }
                }
            }
        });

        let response = http
            .post(self.tokens_url())
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

        let token = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| Self::auth_failed("identity response did not include a token"))?;

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|err| Self::auth_failed(format!("unreadable identity response: {err}")))?;

        let endpoint = self.resolve_endpoint(&parsed.token.catalog)?;
        Ok(Grant { token, endpoint })
    }

    fn resolve_endpoint(&self, catalog: &[CatalogEntry]) -> Result<String, ClusterError> {
        catalog
            .iter()
            .filter(|entry| entry.service_type == SERVICE_TYPE)
            .flat_map(|entry| entry.endpoints.iter())
            .find(|endpoint| {
                endpoint.interface == PUBLIC_INTERFACE && endpoint.in_region(&self.region)
            })
            .map(|endpoint| endpoint.url.trim_end_matches('/').to_owned())
            .ok_or_else(|| {
                Self::auth_failed(format!(
                    "no public {SERVICE_TYPE} endpoint in the service catalog for region '{}'",
                    self.region
                ))
            })
    }
}
