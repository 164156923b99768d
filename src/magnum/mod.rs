//! OpenStack private cloud backend backed by the Magnum v1 API.
//!
//! Magnum addresses clusters by name or UUID, requires a template on
//! create, and scales by setting an absolute node count. Create, resize and
//! delete complete asynchronously; the returned cluster is re-read after the
//! call is accepted.

mod credentials;
mod types;

use reqwest::Method;
use serde_json::json;
use tracing::debug;

use crate::account::{Account, MagnumAccount};
use crate::backend::{BackendFuture, ClusterBackend, ClusterRequest};
use crate::cluster::{Cluster, ClusterStatus, ClusterTemplate, CredentialsBundle, Quotas};
use crate::config::ClientSettings;
use crate::error::{BackendKind, ClusterError};
use crate::poll::{self, PollPolicy};
use crate::session::{LazySession, Session, build_http_client};

pub use credentials::{CA_FILE, CERT_FILE, DOCKER_ENV_FILE, KEY_FILE};
use credentials::ClientCertRequest;
use types::{
    CertificateRecord, ClusterAccepted, ClusterList, ClusterRecord, QuotaList, TemplateList,
};

const BACKEND: BackendKind = BackendKind::Magnum;

/// Backend that manages clusters through OpenStack Magnum.
#[derive(Debug)]
pub struct MagnumBackend {
    session: LazySession,
    poll_policy: PollPolicy,
}

impl MagnumBackend {
    /// Constructs a backend for `account`. Authentication happens on the
    /// first operation.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Transport`] when the HTTP client cannot be
    /// built.
    pub fn new(account: MagnumAccount, settings: &ClientSettings) -> Result<Self, ClusterError> {
        let http = build_http_client(BACKEND, settings.http_timeout)?;
        Ok(Self::with_http(account, http, settings.poll_policy))
    }

    /// Constructs a backend around an existing HTTP client.
    #[must_use]
    pub const fn with_http(
        account: MagnumAccount,
        http: reqwest::Client,
        poll_policy: PollPolicy,
    ) -> Self {
        Self {
            session: LazySession::new(Account::Magnum(account), http),
            poll_policy,
        }
    }

    async fn session(&self) -> Result<&Session, ClusterError> {
        self.session.get().await
    }

    async fn fetch(&self, name: &str) -> Result<Cluster, ClusterError> {
        let record: ClusterRecord = self
            .session()
            .await?
            .call_json(
                Method::GET,
                &format!("/v1/clusters/{name}"),
                None,
                &format!("retrieve cluster ({name})"),
                Some(name),
            )
            .await?;
        Ok(record.into())
    }

    async fn resize_to(&self, name: &str, nodes: u32) -> Result<Cluster, ClusterError> {
        if nodes == 0 {
            return Err(ClusterError::validation(BACKEND, "nodes"));
        }
        let patch = json!([{ "op": "replace", "path": "/node_count", "value": nodes }]);
        let accepted: ClusterAccepted = self
            .session()
            .await?
            .call_json(
                Method::PATCH,
                &format!("/v1/clusters/{name}"),
                Some(&patch),
                &format!("resize cluster ({name})"),
                Some(name),
            )
            .await?;
        debug!("[magnum] Resize of cluster ({name}) accepted as {}", accepted.uuid);
        self.fetch(name).await
    }
}

impl ClusterBackend for MagnumBackend {
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
            let template = request
                .template
                .as_deref()
                .ok_or_else(|| ClusterError::validation(BACKEND, "template"))?;

            debug!(
                "[magnum] Creating {}-node cluster ({}) from template ({template})",
                request.nodes, request.name
            );
            let body = json!({
                "name": request.name,
                "cluster_template_id": template,
                "node_count": request.nodes,
            });
            let accepted: ClusterAccepted = self
                .session()
                .await?
                .call_json(
                    Method::POST,
                    "/v1/clusters",
                    Some(&body),
                    "create the cluster",
                    None,
                )
                .await?;
            debug!(
                "[magnum] Cluster ({}) accepted as {}",
                request.name, accepted.uuid
            );
            self.fetch(&request.name).await
        })
    }

    fn get_cluster<'a>(&'a self, name: &'a str) -> BackendFuture<'a, Cluster> {
        Box::pin(async move {
            debug!("[magnum] Retrieving cluster ({name})");
            self.fetch(name).await
        })
    }

    fn list_clusters(&self) -> BackendFuture<'_, Vec<Cluster>> {
        Box::pin(async move {
            debug!("[magnum] Listing clusters");
            let list: ClusterList = self
                .session()
                .await?
                .call_json(Method::GET, "/v1/clusters", None, "list clusters", None)
                .await?;
            Ok(list.clusters.into_iter().map(Cluster::from).collect())
        })
    }

    fn delete_cluster<'a>(&'a self, name: &'a str) -> BackendFuture<'a, Cluster> {
        Box::pin(async move {
            debug!("[magnum] Deleting cluster ({name})");
            let existing = self.fetch(name).await?;
            self.session()
                .await?
                .call(
                    Method::DELETE,
                    &format!("/v1/clusters/{name}"),
                    None,
                    &format!("delete cluster ({name})"),
                    Some(name),
                )
                .await?;

            match self.fetch(name).await {
                Ok(cluster) => Ok(cluster),
                Err(err) if err.is_not_found() => Ok(Cluster {
                    status: ClusterStatus::Deleted,
                    raw_status: String::from("DELETE_COMPLETE"),
                    ..existing
                }),
                Err(err) => Err(err),
            }
        })
    }

    fn grow_cluster<'a>(&'a self, name: &'a str, nodes: u32) -> BackendFuture<'a, Cluster> {
        Box::pin(async move {
            debug!("[magnum] Growing cluster ({name}) by {nodes} nodes");
            let current = self.fetch(name).await?;
            let target = current
                .node_count
                .checked_add(nodes)
                .ok_or_else(|| ClusterError::validation(BACKEND, "nodes"))?;
            self.resize_to(name, target).await
        })
    }

    fn resize_cluster<'a>(&'a self, name: &'a str, nodes: u32) -> BackendFuture<'a, Cluster> {
        Box::pin(async move {
            debug!("[magnum] Resizing cluster ({name}) to {nodes} nodes");
            self.resize_to(name, nodes).await
        })
    }

    fn rebuild_cluster<'a>(&'a self, _name: &'a str) -> BackendFuture<'a, Cluster> {
        Box::pin(async move {
            Err(ClusterError::unsupported(
                BACKEND,
                "Rebuilding clusters",
                "Delete and recreate the cluster instead.",
            ))
        })
    }

    fn set_autoscale<'a>(&'a self, _name: &'a str, _enabled: bool) -> BackendFuture<'a, Cluster> {
        Box::pin(async move {
            Err(ClusterError::unsupported(
                BACKEND,
                "Autoscaling",
                "Use 'resize' to set the node count.",
            ))
        })
    }

    fn get_cluster_credentials<'a>(
        &'a self,
        name: &'a str,
    ) -> BackendFuture<'a, CredentialsBundle> {
        Box::pin(async move {
            debug!("[magnum] Retrieving cluster credentials ({name})");
            let cluster = self.fetch(name).await?;
            let session = self.session().await?;
            let operation = "retrieve the cluster credentials";

            let ca: CertificateRecord = session
                .call_json(
                    Method::GET,
                    &format!("/v1/certificates/{}", cluster.id),
                    None,
                    operation,
                    Some(name),
                )
                .await?;

            let request = ClientCertRequest::generate(self.session.account().username())?;
            let body = json!({ "cluster_uuid": cluster.id, "csr": request.csr_pem });
            let signed: CertificateRecord = session
                .call_json(
                    Method::POST,
                    "/v1/certificates",
                    Some(&body),
                    operation,
                    Some(name),
                )
                .await?;

            Ok(credentials::bundle(
                ca.pem,
                signed.pem,
                request,
                cluster.endpoint.as_deref(),
            ))
        })
    }

    fn get_quotas(&self) -> BackendFuture<'_, Quotas> {
        Box::pin(async move {
            debug!("[magnum] Retrieving account quotas");
            let quotas: QuotaList = self
                .session()
                .await?
                .call_json(
                    Method::GET,
                    "/v1/quotas",
                    None,
                    "retrieve account quotas",
                    None,
                )
                .await?;
            Ok(Quotas {
                max_clusters: quotas.cluster_limit(),
                max_nodes_per_cluster: None,
            })
        })
    }

    fn list_cluster_templates(&self) -> BackendFuture<'_, Vec<ClusterTemplate>> {
        Box::pin(async move {
            debug!("[magnum] Listing cluster templates");
            let list: TemplateList = self
                .session()
                .await?
                .call_json(
                    Method::GET,
                    "/v1/clustertemplates",
                    None,
                    "list cluster templates",
                    None,
                )
                .await?;
            Ok(list
                .clustertemplates
                .into_iter()
                .map(ClusterTemplate::from)
                .collect())
        })
    }

    fn wait_until_deleted(&self, cluster: Cluster) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            if cluster.status == ClusterStatus::Deleted {
                return Ok(());
            }
            poll::wait_until_deleted(self, &cluster, self.poll_policy).await
        })
    }
}
