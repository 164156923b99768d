//! Backend abstraction over cluster providers.
//!
//! Each provider implements [`ClusterBackend`]. Operations a provider cannot
//! perform return [`ClusterError::Unsupported`] without touching the network.

use std::future::Future;
use std::pin::Pin;

use crate::account::Account;
use crate::cluster::{Cluster, ClusterTemplate, CredentialsBundle, Quotas};
use crate::error::{BackendKind, ClusterError, InvalidRequest};
use crate::poll::{self, PollPolicy};

/// Parameters required to create a new cluster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterRequest {
    /// Name of the new cluster, unique per account.
    pub name: String,
    /// Template name or identifier. Required on Magnum, ignored on make-swarm.
    pub template: Option<String>,
    /// Number of nodes to provision.
    pub nodes: u32,
}

impl ClusterRequest {
    /// Starts a builder for a [`ClusterRequest`].
    #[must_use]
    pub fn builder() -> ClusterRequestBuilder {
        ClusterRequestBuilder::new()
    }

    /// Validates the request on behalf of `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Validation`] when the name is empty, the
    /// template is blank, or no nodes were requested.
    pub fn validate(&self, backend: BackendKind) -> Result<(), ClusterError> {
        match self.invalid_field() {
            Some(field) => Err(ClusterError::validation(backend, field)),
            None => Ok(()),
        }
    }

    fn invalid_field(&self) -> Option<&'static str> {
        if self.name.is_empty() {
            return Some("name");
        }
        if self
            .template
            .as_deref()
            .is_some_and(|template| template.is_empty())
        {
            return Some("template");
        }
        if self.nodes == 0 {
            return Some("nodes");
        }
        None
    }
}

/// Builder for [`ClusterRequest`] that trims inputs and validates on build.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterRequestBuilder {
    name: String,
    template: Option<String>,
    nodes: u32,
}

impl Default for ClusterRequestBuilder {
    fn default() -> Self {
        Self {
            name: String::new(),
            template: None,
            nodes: 1,
        }
    }
}

impl ClusterRequestBuilder {
    /// Creates a builder for a single-node cluster with no name.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cluster name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the template. Blank values are treated as absent.
    #[must_use]
    pub fn template(mut self, value: Option<String>) -> Self {
        self.template = value;
        self
    }

    /// Sets the node count.
    #[must_use]
    pub const fn nodes(mut self, value: u32) -> Self {
        self.nodes = value;
        self
    }

    /// Builds and validates the [`ClusterRequest`].
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRequest`] when a required field is missing.
    pub fn build(self) -> Result<ClusterRequest, InvalidRequest> {
        let request = ClusterRequest {
            name: self.name.trim().to_owned(),
            template: self
                .template
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty()),
            nodes: self.nodes,
        };
        if let Some(field) = request.invalid_field() {
            return Err(InvalidRequest(field.to_owned()));
        }
        Ok(request)
    }
}

/// Future returned by backend operations.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ClusterError>> + Send + 'a>>;

/// Lifecycle operations every cluster provider exposes.
///
/// Implementations authenticate lazily on first use and reuse the session
/// for the lifetime of the value.
pub trait ClusterBackend: Send + Sync {
    /// Which provider this backend talks to.
    fn kind(&self) -> BackendKind;

    /// Account state after authentication, including any refreshed token,
    /// or `None` when the backend has not authenticated yet.
    fn authenticated_account(&self) -> BackendFuture<'_, Option<Account>> {
        Box::pin(async { Ok(None) })
    }

    /// Polling settings used by the wait operations.
    fn poll_policy(&self) -> PollPolicy;

    /// Creates a cluster and returns it in its initial state.
    fn create_cluster<'a>(&'a self, request: &'a ClusterRequest) -> BackendFuture<'a, Cluster>;

    /// Retrieves a cluster by name.
    fn get_cluster<'a>(&'a self, name: &'a str) -> BackendFuture<'a, Cluster>;

    /// Lists every cluster owned by the account.
    fn list_clusters(&self) -> BackendFuture<'_, Vec<Cluster>>;

    /// Deletes a cluster, returning its last known state.
    fn delete_cluster<'a>(&'a self, name: &'a str) -> BackendFuture<'a, Cluster>;

    /// Adds `nodes` nodes to a cluster.
    fn grow_cluster<'a>(&'a self, name: &'a str, nodes: u32) -> BackendFuture<'a, Cluster>;

    /// Resizes a cluster to exactly `nodes` nodes.
    fn resize_cluster<'a>(&'a self, name: &'a str, nodes: u32) -> BackendFuture<'a, Cluster>;

    /// Destroys and recreates the cluster's nodes.
    fn rebuild_cluster<'a>(&'a self, name: &'a str) -> BackendFuture<'a, Cluster>;

    /// Turns autoscaling on or off.
    fn set_autoscale<'a>(&'a self, name: &'a str, enabled: bool) -> BackendFuture<'a, Cluster>;

    /// Downloads the TLS material and scripts needed to reach the cluster.
    fn get_cluster_credentials<'a>(&'a self, name: &'a str)
    -> BackendFuture<'a, CredentialsBundle>;

    /// Retrieves the account limits.
    fn get_quotas(&self) -> BackendFuture<'_, Quotas>;

    /// Lists the templates accepted by `create_cluster`.
    fn list_cluster_templates(&self) -> BackendFuture<'_, Vec<ClusterTemplate>>;

    /// Blocks until the cluster leaves the in-progress states.
    fn wait_until_active(&self, cluster: Cluster) -> BackendFuture<'_, Cluster> {
        Box::pin(async move { poll::wait_until_active(self, cluster, self.poll_policy()).await })
    }

    /// Blocks until the cluster no longer exists.
    fn wait_until_deleted(&self, cluster: Cluster) -> BackendFuture<'_, ()>;
}
