//! Carina public cloud backend backed by the make-swarm API.
//!
//! Clusters are addressed by `{username}/{name}`. make-swarm has no
//! templates and no absolute resize; the adapter reports those as
//! unsupported without contacting the service.

mod types;

use reqwest::Method;
use serde_json::json;
use tracing::{debug, warn};

use crate::account::{Account, MakeSwarmAccount};
use crate::backend::{BackendFuture, ClusterBackend, ClusterRequest};
use crate::cluster::{Cluster, ClusterTemplate, CredentialsBundle, Quotas};
use crate::config::ClientSettings;
use crate::error::{BackendKind, ClusterError};
use crate::poll::PollPolicy;
use crate::session::{LazySession, Session, build_http_client};

use types::{ClusterRecord, CredentialsRecord, QuotasRecord};

const BACKEND: BackendKind = BackendKind::MakeSwarm;

/// Backend that manages clusters through make-swarm.
#[derive(Debug)]
pub struct MakeSwarmBackend {
    session: LazySession,
    poll_policy: PollPolicy,
}

impl MakeSwarmBackend {
    /// Constructs a backend for `account`. Authentication happens on the
    /// first operation.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Transport`] when the HTTP client cannot be
    /// built.
    pub fn new(account: MakeSwarmAccount, settings: &ClientSettings) -> Result<Self, ClusterError> {
        let http = build_http_client(BACKEND, settings.http_timeout)?;
        Ok(Self::with_http(account, http, settings.poll_policy))
    }

    /// Constructs a backend around an existing HTTP client.
    #[must_use]
    pub const fn with_http(
        account: MakeSwarmAccount,
        http: reqwest::Client,
        poll_policy: PollPolicy,
    ) -> Self {
        Self {
            session: LazySession::new(Account::MakeSwarm(account), http),
            poll_policy,
        }
    }

    fn username(&self) -> &str {
        self.session.account().username()
    }

    fn clusters_path(&self) -> String {
        format!("/clusters/{}", self.username())
    }

    fn cluster_path(&self, name: &str) -> String {
        format!("/clusters/{}/{name}", self.username())
    }

    async fn session(&self) -> Result<&Session, ClusterError> {
        self.session.get().await
    }

    async fn fetch_cluster(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        operation: &str,
        name: &str,
    ) -> Result<Cluster, ClusterError> {
        let record: ClusterRecord = self
            .session()
            .await?
            .call_json(method, path, body, operation, Some(name))
            .await?;
        Ok(record.into())
    }
}

impl ClusterBackend for MakeSwarmBackend {
    fn kind(&self) -> BackendKind {
        BACKEND
    }

    fn authenticated_account(&self) -> BackendFuture<'_, Option<Account>> {
        Box::pin(async move { Ok(self.session.authenticated_account().await) })
    }

    fn poll_policy(&self) -> PollPolicy {
        self.poll_policy
    }

    fn create_cluster<'a>(&'a self, request: &'a ClusterRequest) -> BackendFuture<'a, Cluster> {
        Box::pin(async move {
            request.validate(BACKEND)?;
            if request.template.is_some() {
                warn!("[make-swarm] Ignoring --template, not supported.");
            }

            debug!(
                "[make-swarm] Creating {}-node cluster ({})",
                request.nodes, request.name
            );
            let body = json!({
                "cluster_name": request.name,
                "nodes": request.nodes,
                "autoscale": false,
            });
            let record: ClusterRecord = self
                .session()
                .await?
                .call_json(
                    Method::POST,
                    &self.clusters_path(),
                    Some(&body),
                    "create the cluster",
                    None,
                )
                .await?;
            Ok(record.into())
        })
    }

    fn get_cluster<'a>(&'a self, name: &'a str) -> BackendFuture<'a, Cluster> {
        Box::pin(async move {
            debug!("[make-swarm] Retrieving cluster ({name})");
            self.fetch_cluster(
                Method::GET,
                &self.cluster_path(name),
                None,
                &format!("retrieve cluster ({name})"),
                name,
            )
            .await
        })
    }

    fn list_clusters(&self) -> BackendFuture<'_, Vec<Cluster>> {
        Box::pin(async move {
            debug!("[make-swarm] Listing clusters");
            let records: Vec<ClusterRecord> = self
                .session()
                .await?
                .call_json(
                    Method::GET,
                    &self.clusters_path(),
                    None,
                    "list clusters",
                    None,
                )
                .await?;
            Ok(records.into_iter().map(Cluster::from).collect())
        })
    }

    fn delete_cluster<'a>(&'a self, name: &'a str) -> BackendFuture<'a, Cluster> {
        Box::pin(async move {
            debug!("[make-swarm] Deleting cluster ({name})");
            self.fetch_cluster(
                Method::DELETE,
                &self.cluster_path(name),
                None,
                &format!("delete cluster ({name})"),
                name,
            )
            .await
        })
    }

    fn grow_cluster<'a>(&'a self, name: &'a str, nodes: u32) -> BackendFuture<'a, Cluster> {
        Box::pin(async move {
            debug!("[make-swarm] Growing cluster ({name}) by {nodes} nodes");
            let body = json!({ "nodes": nodes });
            self.fetch_cluster(
                Method::POST,
                &format!("{}/grow", self.cluster_path(name)),
                Some(&body),
                &format!("grow cluster ({name})"),
                name,
            )
            .await
        })
    }

    fn resize_cluster<'a>(&'a self, _name: &'a str, _nodes: u32) -> BackendFuture<'a, Cluster> {
        Box::pin(async move {
            Err(ClusterError::unsupported(
                BACKEND,
                "Resizing clusters",
                "Please use 'grow'.",
            ))
        })
    }

    fn rebuild_cluster<'a>(&'a self, name: &'a str) -> BackendFuture<'a, Cluster> {
        Box::pin(async move {
            debug!("[make-swarm] Rebuilding cluster ({name})");
            self.fetch_cluster(
                Method::POST,
                &format!("{}/rebuild", self.cluster_path(name)),
                None,
                &format!("rebuild cluster ({name})"),
                name,
            )
            .await
        })
    }

    fn set_autoscale<'a>(&'a self, name: &'a str, enabled: bool) -> BackendFuture<'a, Cluster> {
        Box::pin(async move {
            debug!(
                "[make-swarm] Changing the autoscale setting on the cluster ({name}) to {enabled}"
            );
            self.fetch_cluster(
                Method::PUT,
                &format!("{}/autoscale/{enabled}", self.cluster_path(name)),
                None,
                &format!("change the cluster's autoscale setting ({name})"),
                name,
            )
            .await
        })
    }

    fn get_cluster_credentials<'a>(
        &'a self,
        name: &'a str,
    ) -> BackendFuture<'a, CredentialsBundle> {
        Box::pin(async move {
            debug!("[make-swarm] Retrieving cluster credentials ({name})");
            let record: CredentialsRecord = self
                .session()
                .await?
                .call_json(
                    Method::GET,
                    &format!("{}/credentials", self.cluster_path(name)),
                    None,
                    "retrieve the cluster credentials",
                    Some(name),
                )
                .await?;
            Ok(record.into())
        })
    }

    fn get_quotas(&self) -> BackendFuture<'_, Quotas> {
        Box::pin(async move {
            debug!("[make-swarm] Retrieving account quotas");
            let record: QuotasRecord = self
                .session()
                .await?
                .call_json(
                    Method::GET,
                    &format!("/quotas/{}", self.username()),
                    None,
                    "retrieve account quotas",
                    None,
                )
                .await?;
            Ok(record.into())
        })
    }

    fn list_cluster_templates(&self) -> BackendFuture<'_, Vec<ClusterTemplate>> {
        Box::pin(async move {
            Err(ClusterError::unsupported(
                BACKEND,
                "Cluster templates",
                "Use `carina create [cluster-name]` and omit the --template flag.",
            ))
        })
    }

    fn wait_until_deleted(&self, cluster: Cluster) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            debug!(
                "[make-swarm] Cluster ({}) is removed as soon as it is deleted",
                cluster.name
            );
            Ok(())
        })
    }
}
