//! Authenticated HTTP session bound to one backend.
//!
//! A session carries the service endpoint, the current token, and the full
//! account credentials. When the provider rejects the token with `401` the
//! session refreshes itself once through [`Session::refresh`] and retries.

use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{OnceCell, RwLock};
use tracing::debug;

use crate::account::Account;
use crate::cache::CacheEntry;
use crate::error::{BackendKind, ClusterError};

/// Header carrying the token on every request.
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// User agent sent to identity services and cluster APIs.
pub const USER_AGENT: &str = concat!("getcarina/carina ", env!("CARGO_PKG_VERSION"));

/// Builds the HTTP client shared by authentication and lifecycle calls.
///
/// # Errors
///
/// Returns [`ClusterError::Transport`] when the TLS backend cannot be
/// initialised.
pub fn build_http_client(
    backend: BackendKind,
    timeout: Duration,
) -> Result<reqwest::Client, ClusterError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|err| ClusterError::transport(backend, "build the HTTP client", err))
}

/// Authenticated handle owned by a single backend adapter.
#[derive(Debug)]
pub struct Session {
    backend: BackendKind,
    http: reqwest::Client,
    endpoint: String,
    token: RwLock<String>,
    credentials: Account,
}

impl Session {
    pub(crate) fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        token: impl Into<String>,
        credentials: Account,
    ) -> Self {
        Self {
            backend: credentials.kind(),
            http,
            endpoint: endpoint.into(),
            token: RwLock::new(token.into()),
            credentials,
        }
    }

    /// Backend this session talks to.
    #[must_use]
    pub const fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Service endpoint every request path is joined onto.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the token currently in use.
    pub async fn token(&self) -> String {
        self.token.read().await.clone()
    }

    /// Returns the account as it stands now, including any refreshed token.
    pub async fn account(&self) -> Account {
        let mut account = self.credentials.clone();
        account.apply_cache(&CacheEntry {
            endpoint: self.endpoint.clone(),
            token: self.token().await,
            last_update_check: None,
        });
        account
    }

    /// Exchanges the stored credentials for a fresh token.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Authentication`] when the identity service
    /// rejects the credentials.
    pub async fn refresh(&self) -> Result<(), ClusterError> {
        debug!("[{}] Reauthenticating with the stored credentials", self.backend);
        let grant = self.credentials.exchange(&self.http).await?;
        *self.token.write().await = grant.token;
        Ok(())
    }

    /// Sends a request to `path` under the service endpoint.
    ///
    /// A `401` triggers one refresh and one retry.
    pub(crate) async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        operation: &str,
    ) -> Result<Response, ClusterError> {
        let url = format!("{}{path}", self.endpoint.trim_end_matches('/'));
        let response = self.dispatch(&method, &url, body, operation).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        self.refresh().await?;
        let retried = self.dispatch(&method, &url, body, operation).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            return Err(ClusterError::Authentication {
                backend: self.backend,
                message: String::from("token rejected after reauthentication"),
            });
        }
        Ok(retried)
    }

    async fn dispatch(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        operation: &str,
    ) -> Result<Response, ClusterError> {
        let token = self.token().await;
        let mut request = self
            .http
            .request(method.clone(), url)
            .header(AUTH_TOKEN_HEADER, token)
            .header(ACCEPT, "application/json");
        if let Some(json) = body {
            request = request.json(json);
        }
        request
            .send()
            .await
            .map_err(|err| ClusterError::transport(self.backend, operation, err))
    }

    /// Sends a request and maps non-success statuses onto the taxonomy.
    ///
    /// `404` becomes [`ClusterError::NotFound`] when `cluster` names the
    /// resource being addressed.
    pub(crate) async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        operation: &str,
        cluster: Option<&str>,
    ) -> Result<Response, ClusterError> {
        let response = self.send(method, path, body, operation).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::NOT_FOUND
            && let Some(name) = cluster
        {
            return Err(ClusterError::NotFound {
                backend: self.backend,
                name: name.to_owned(),
            });
        }

        let message = response.text().await.unwrap_or_default();
        Err(ClusterError::Provider {
            backend: self.backend,
            operation: operation.to_owned(),
            status: status.as_u16(),
            message: message.trim().to_owned(),
        })
    }

    /// Like [`Session::call`], decoding the JSON body into `T`.
    pub(crate) async fn call_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        operation: &str,
        cluster: Option<&str>,
    ) -> Result<T, ClusterError> {
        let response = self.call(method, path, body, operation, cluster).await?;
        let text = response
            .text()
            .await
            .map_err(|err| ClusterError::transport(self.backend, operation, err))?;
        serde_json::from_str(&text).map_err(|err| ClusterError::decode(self.backend, operation, err))
    }
}

/// Account plus the session it authenticates into, created on first use.
#[derive(Debug)]
pub(crate) struct LazySession {
    account: Account,
    http: reqwest::Client,
    cell: OnceCell<Session>,
}

impl LazySession {
    pub(crate) const fn new(account: Account, http: reqwest::Client) -> Self {
        Self {
            account,
            http,
            cell: OnceCell::const_new(),
        }
    }

    /// Account as configured, before any authentication.
    pub(crate) const fn account(&self) -> &Account {
        &self.account
    }

    /// Returns the session, authenticating once on first call.
    pub(crate) async fn get(&self) -> Result<&Session, ClusterError> {
        self.cell
            .get_or_try_init(|| async {
                let mut account = self.account.clone();
                account.authenticate(&self.http).await
            })
            .await
    }

    /// Account state after authentication, or `None` if none happened yet.
    pub(crate) async fn authenticated_account(&self) -> Option<Account> {
        let session = self.cell.get()?;
        Some(session.account().await)
    }
}
