//! Accounts: who is talking to which cloud, and how they authenticate.
//!
//! An [`Account`] is selected from the resolved [`Credentials`], produces an
//! authenticated [`Session`], and round-trips its token through the
//! credential cache.

mod magnum;
mod make_swarm;

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::cache::CacheEntry;
use crate::config::ConfigError;
use crate::error::{BackendKind, ClusterError};
use crate::session::Session;

pub use magnum::MagnumAccount;
pub use make_swarm::{DEFAULT_IDENTITY_ENDPOINT, DEFAULT_MAKE_SWARM_ENDPOINT, MakeSwarmAccount};

/// Which cloud the caller wants to use.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CloudType {
    /// Carina public cloud (make-swarm).
    Public,
    /// OpenStack private cloud (Magnum).
    Private,
}

impl FromStr for CloudType {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(ConfigError::InvalidValue(format!(
                "unknown cloud type '{other}': use public or private"
            ))),
        }
    }
}

/// Fully resolved credential inputs, independent of where they came from.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct Credentials {
    /// Explicit cloud selection; inferred from the secrets when absent.
    pub cloud: Option<CloudType>,
    /// Account user name.
    pub username: Option<String>,
    /// Public cloud API key.
    pub api_key: Option<String>,
    /// Private cloud password.
    pub password: Option<String>,
    /// Private cloud project name.
    pub project: Option<String>,
    /// Private cloud domain name.
    pub domain: Option<String>,
    /// Private cloud region name.
    pub region: Option<String>,
    /// Identity endpoint.
    pub auth_endpoint: Option<String>,
    /// Cluster API endpoint override.
    pub endpoint: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("cloud", &self.cloud)
            .field("username", &self.username)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("project", &self.project)
            .field("domain", &self.domain)
            .field("region", &self.region)
            .field("auth_endpoint", &self.auth_endpoint)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

fn present(value: Option<&String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_owned())
        .filter(|trimmed| !trimmed.is_empty())
}

fn require(value: Option<&String>, field: &str, cloud: &str) -> Result<String, ConfigError> {
    present(value).ok_or_else(|| {
        ConfigError::MissingField(format!("{field} is required for the {cloud} cloud"))
    })
}

/// Token and endpoint returned by a full credential exchange.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Grant {
    pub(crate) token: String,
    pub(crate) endpoint: String,
}

/// Account for one of the supported backends.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Account {
    /// OpenStack Keystone account used with Magnum.
    Magnum(MagnumAccount),
    /// Rackspace API-key account used with make-swarm.
    MakeSwarm(MakeSwarmAccount),
}

impl From<MagnumAccount> for Account {
    fn from(value: MagnumAccount) -> Self {
        Self::Magnum(value)
    }
}

impl From<MakeSwarmAccount> for Account {
    fn from(value: MakeSwarmAccount) -> Self {
        Self::MakeSwarm(value)
    }
}

impl Account {
    /// Selects and builds the account variant matching `credentials`.
    ///
    /// An explicit cloud wins. Otherwise an API key selects the public cloud
    /// and a password selects the private cloud.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the cloud cannot be inferred
    /// or a field required by the selected cloud is missing.
    pub fn from_credentials(credentials: &Credentials) -> Result<Self, ConfigError> {
        let cloud = match credentials.cloud {
            Some(cloud) => cloud,
            None if present(credentials.api_key.as_ref()).is_some() => CloudType::Public,
            None if present(credentials.password.as_ref()).is_some() => CloudType::Private,
            None => {
                return Err(ConfigError::MissingField(String::from(
                    "no credentials found: provide username and api_key for the public cloud, \
                     or username, password, project and auth_endpoint for the private cloud",
                )));
            }
        };

        match cloud {
            CloudType::Public => {
                let mut account = MakeSwarmAccount::new(
                    require(credentials.username.as_ref(), "username", "public")?,
                    require(credentials.api_key.as_ref(), "api_key", "public")?,
                );
                if let Some(identity) = present(credentials.auth_endpoint.as_ref()) {
                    account.identity_endpoint = identity;
                }
                if let Some(endpoint) = present(credentials.endpoint.as_ref()) {
                    account.endpoint = endpoint;
                }
                Ok(Self::MakeSwarm(account))
            }
            CloudType::Private => Ok(Self::Magnum(MagnumAccount {
                auth_endpoint: require(
                    credentials.auth_endpoint.as_ref(),
                    "auth_endpoint",
                    "private",
                )?,
                endpoint: present(credentials.endpoint.as_ref()).unwrap_or_default(),
                username: require(credentials.username.as_ref(), "username", "private")?,
                password: require(credentials.password.as_ref(), "password", "private")?,
                project: require(credentials.project.as_ref(), "project", "private")?,
                domain: present(credentials.domain.as_ref()).unwrap_or_default(),
                region: present(credentials.region.as_ref()).unwrap_or_default(),
                token: String::new(),
            })),
        }
    }

    /// Backend this account authenticates against.
    #[must_use]
    pub const fn kind(&self) -> BackendKind {
        match self {
            Self::Magnum(_) => BackendKind::Magnum,
            Self::MakeSwarm(_) => BackendKind::MakeSwarm,
        }
    }

    /// Stable identifier used as the credential cache key.
    #[must_use]
    pub fn id(&self) -> String {
        match self {
            Self::Magnum(account) => account.id(),
            Self::MakeSwarm(account) => account.id(),
        }
    }

    /// Account user name.
    #[must_use]
    pub fn username(&self) -> &str {
        match self {
            Self::Magnum(account) => &account.username,
            Self::MakeSwarm(account) => &account.username,
        }
    }

    /// Service endpoint resolved by the last authentication, if any.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Magnum(account) => &account.endpoint,
            Self::MakeSwarm(account) => &account.endpoint,
        }
    }

    /// Token obtained by the last authentication, if any.
    #[must_use]
    pub fn token(&self) -> &str {
        match self {
            Self::Magnum(account) => &account.token,
            Self::MakeSwarm(account) => &account.token,
        }
    }

    fn set_token(&mut self, token: String) {
        match self {
            Self::Magnum(account) => account.token = token,
            Self::MakeSwarm(account) => account.token = token,
        }
    }

    fn set_endpoint(&mut self, endpoint: String) {
        match self {
            Self::Magnum(account) => account.endpoint = endpoint,
            Self::MakeSwarm(account) => account.endpoint = endpoint,
        }
    }

    /// Captures the cacheable state of the account.
    #[must_use]
    pub fn build_cache(&self) -> CacheEntry {
        CacheEntry {
            endpoint: self.endpoint().to_owned(),
            token: self.token().to_owned(),
            last_update_check: None,
        }
    }

    /// Returns true when `entry` may be applied to this account.
    ///
    /// The entry must hold a token and an endpoint. make-swarm endpoints are
    /// configured rather than discovered, so an entry recorded against a
    /// different make-swarm endpoint is rejected.
    #[must_use]
    pub fn accepts_cache(&self, entry: &CacheEntry) -> bool {
        if !entry.has_credentials() {
            return false;
        }
        match self {
            Self::Magnum(_) => true,
            Self::MakeSwarm(account) => entry.endpoint == account.service_endpoint(),
        }
    }

    /// Restores state captured by [`Account::build_cache`].
    pub fn apply_cache(&mut self, entry: &CacheEntry) {
        self.set_endpoint(entry.endpoint.clone());
        self.set_token(entry.token.clone());
    }

    /// Produces an authenticated session.
    ///
    /// A cached token is probed first and reused when the identity service
    /// still accepts it; otherwise it is discarded and the full credentials
    /// are exchanged. On success the account's token and endpoint are
    /// updated so the caller can persist them.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Authentication`] when the credential exchange
    /// fails.
    pub async fn authenticate(&mut self, http: &reqwest::Client) -> Result<Session, ClusterError> {
        let kind = self.kind();
        if !self.token().is_empty() {
            debug!(
                "[{kind}] Attempting to authenticate with a cached token for {}",
                self.endpoint()
            );
            if !self.endpoint().is_empty() && self.probe(http).await {
                debug!("[{kind}] Authentication successful");
                return Ok(self.session(http));
            }

            debug!("[{kind}] Discarding expired cached token");
            self.set_token(String::new());
        }

        debug!("[{kind}] Attempting to authenticate with the account credentials");
        let grant = self.exchange(http).await?;
        self.set_token(grant.token);
        self.set_endpoint(grant.endpoint);
        debug!("[{kind}] Authentication successful");
        Ok(self.session(http))
    }

    fn session(&self, http: &reqwest::Client) -> Session {
        Session::new(http.clone(), self.endpoint(), self.token(), self.clone())
    }

    async fn probe(&self, http: &reqwest::Client) -> bool {
        match self {
            Self::Magnum(account) => account.probe(http).await,
            Self::MakeSwarm(account) => account.probe(http).await,
        }
    }

    pub(crate) async fn exchange(&self, http: &reqwest::Client) -> Result<Grant, ClusterError> {
        match self {
            Self::Magnum(account) => account.exchange(http).await,
            Self::MakeSwarm(account) => account.exchange(http).await,
        }
    }
}

/// Derives `<prefix>-<hash>-<username>` where `<hash>` is the first four
/// bytes of the SHA-256 of the authentication endpoint.
pub(crate) fn account_id(prefix: &str, auth_endpoint: &str, username: &str) -> String {
    let digest = Sha256::digest(auth_endpoint.as_bytes());
    let short = digest.get(..4).map(hex::encode).unwrap_or_default();
    format!("{prefix}-{short}-{username}")
}
