//! High-level entry point tying accounts, the credential cache, and the
//! backend adapters together.
//!
//! A [`Client`] restores cached tokens before the first call, dispatches to
//! the backend matching the account, optionally waits for the cluster to
//! settle, and writes the account's current token back to the cache after
//! every operation.

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use crate::account::Account;
use crate::backend::{ClusterBackend, ClusterRequest};
use crate::cache::{CacheError, CredentialCache};
use crate::cluster::{Cluster, ClusterTemplate, CredentialsBundle, Quotas};
use crate::config::{CarinaConfig, ClientSettings, ConfigError};
use crate::error::ClusterError;
use crate::magnum::MagnumBackend;
use crate::make_swarm::MakeSwarmBackend;

/// Errors surfaced by [`Client`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Raised when configuration or credentials are unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Raised when the credential cache cannot be loaded.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// Raised by the backend or the polling engine.
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// Executes cluster operations against the backend selected by the account.
pub struct Client {
    backend: Box<dyn ClusterBackend>,
    cache: Option<CredentialCache>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("backend", &self.backend.kind())
            .field("cache", &self.cache.as_ref().map(CredentialCache::path))
            .finish()
    }
}

impl Client {
    /// Builds a client from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when validation fails and
    /// [`ClientError::Cache`] when an existing cache file is unreadable.
    pub fn new(config: &CarinaConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let settings = config.settings()?;
        let account = config.account()?;
        let cache = settings
            .cache_path
            .clone()
            .map(CredentialCache::load)
            .transpose()?;
        Self::with_parts(account, &settings, cache)
    }

    /// Builds a client from an account, runtime settings, and an optional
    /// cache. A cached entry for the account is applied before any call.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Cluster`] when the HTTP client cannot be built.
    pub fn with_parts(
        mut account: Account,
        settings: &ClientSettings,
        cache: Option<CredentialCache>,
    ) -> Result<Self, ClientError> {
        let id = account.id();
        if let Some(entry) = cache.as_ref().and_then(|store| store.entry(&id)) {
            if account.accepts_cache(entry) {
                debug!("[{}] Loaded cached credentials for {id}", account.kind());
                account.apply_cache(entry);
            } else {
                debug!("[{}] Ignoring unusable cached credentials for {id}", account.kind());
            }
        }

        let backend: Box<dyn ClusterBackend> = match account {
            Account::Magnum(magnum) => Box::new(MagnumBackend::new(magnum, settings)?),
            Account::MakeSwarm(make_swarm) => {
                Box::new(MakeSwarmBackend::new(make_swarm, settings)?)
            }
        };
        Ok(Self { backend, cache })
    }

    /// Wraps an already constructed backend.
    #[must_use]
    pub fn with_backend(backend: Box<dyn ClusterBackend>, cache: Option<CredentialCache>) -> Self {
        Self { backend, cache }
    }

    /// Backend in use.
    #[must_use]
    pub fn backend(&self) -> &dyn ClusterBackend {
        self.backend.as_ref()
    }

    /// Credential cache in use, if caching is enabled.
    #[must_use]
    pub const fn cache(&self) -> Option<&CredentialCache> {
        self.cache.as_ref()
    }

    /// Creates a cluster, optionally waiting until it is active.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Cluster`] when the backend or the wait fails.
    pub async fn create_cluster(
        &mut self,
        request: &ClusterRequest,
        wait: bool,
    ) -> Result<Cluster, ClientError> {
        let backend = self.backend.as_ref();
        let result = settle(backend, backend.create_cluster(request).await, wait).await;
        self.finish(result).await
    }

    /// Retrieves a cluster, optionally waiting until it is active.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Cluster`] when the backend or the wait fails.
    pub async fn get_cluster(&mut self, name: &str, wait: bool) -> Result<Cluster, ClientError> {
        let backend = self.backend.as_ref();
        let result = settle(backend, backend.get_cluster(name).await, wait).await;
        self.finish(result).await
    }

    /// Lists the account's clusters.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Cluster`] when the backend fails.
    pub async fn list_clusters(&mut self) -> Result<Vec<Cluster>, ClientError> {
        let result = self.backend.list_clusters().await;
        self.finish(result).await
    }

    /// Deletes a cluster, optionally waiting until it is gone.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Cluster`] when the backend or the wait fails.
    pub async fn delete_cluster(&mut self, name: &str, wait: bool) -> Result<Cluster, ClientError> {
        let backend = self.backend.as_ref();
        let result = match backend.delete_cluster(name).await {
            Ok(cluster) if wait => backend
                .wait_until_deleted(cluster.clone())
                .await
                .map(|()| cluster),
            other => other,
        };
        self.finish(result).await
    }

    /// Adds `nodes` nodes to a cluster, optionally waiting until it is
    /// active again.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Cluster`] when the backend or the wait fails.
    pub async fn grow_cluster(
        &mut self,
        name: &str,
        nodes: u32,
        wait: bool,
    ) -> Result<Cluster, ClientError> {
        let backend = self.backend.as_ref();
        let result = settle(backend, backend.grow_cluster(name, nodes).await, wait).await;
        self.finish(result).await
    }

    /// Resizes a cluster to `nodes` nodes, optionally waiting until it is
    /// active again.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Cluster`] when the backend or the wait fails.
    pub async fn resize_cluster(
        &mut self,
        name: &str,
        nodes: u32,
        wait: bool,
    ) -> Result<Cluster, ClientError> {
        let backend = self.backend.as_ref();
        let result = settle(backend, backend.resize_cluster(name, nodes).await, wait).await;
        self.finish(result).await
    }

    /// Rebuilds a cluster, optionally waiting until it is active again.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Cluster`] when the backend or the wait fails.
    pub async fn rebuild_cluster(&mut self, name: &str, wait: bool) -> Result<Cluster, ClientError> {
        let backend = self.backend.as_ref();
        let result = settle(backend, backend.rebuild_cluster(name).await, wait).await;
        self.finish(result).await
    }

    /// Turns autoscaling on or off.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Cluster`] when the backend fails.
    pub async fn set_autoscale(&mut self, name: &str, enabled: bool) -> Result<Cluster, ClientError> {
        let result = self.backend.set_autoscale(name, enabled).await;
        self.finish(result).await
    }

    /// Downloads the credentials bundle for a cluster.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Cluster`] when the backend fails.
    pub async fn get_cluster_credentials(
        &mut self,
        name: &str,
    ) -> Result<CredentialsBundle, ClientError> {
        let result = self.backend.get_cluster_credentials(name).await;
        self.finish(result).await
    }

    /// Retrieves the account limits.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Cluster`] when the backend fails.
    pub async fn get_quotas(&mut self) -> Result<Quotas, ClientError> {
        let result = self.backend.get_quotas().await;
        self.finish(result).await
    }

    /// Lists the templates accepted when creating a cluster.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Cluster`] when the backend fails.
    pub async fn list_cluster_templates(&mut self) -> Result<Vec<ClusterTemplate>, ClientError> {
        let result = self.backend.list_cluster_templates().await;
        self.finish(result).await
    }

    async fn finish<T>(&mut self, result: Result<T, ClusterError>) -> Result<T, ClientError> {
        self.persist().await;
        result.map_err(ClientError::from)
    }

    async fn persist(&mut self) {
        let Some(cache) = self.cache.as_mut() else {
            return;
        };
        let account = match self.backend.authenticated_account().await {
            Ok(Some(account)) => account,
            Ok(None) => return,
            Err(err) => {
                warn!("Unable to read the account state to cache: {err}");
                return;
            }
        };
        if let Err(err) = cache.save_account(&account) {
            warn!("Unable to update the credential cache: {err}");
        }
    }
}

async fn settle(
    backend: &dyn ClusterBackend,
    result: Result<Cluster, ClusterError>,
    wait: bool,
) -> Result<Cluster, ClusterError> {
    match result {
        Ok(cluster) if wait => backend.wait_until_active(cluster).await,
        other => other,
    }
}
