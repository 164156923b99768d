//! Test support utilities shared across unit and integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::account::Account;
use crate::backend::{BackendFuture, ClusterBackend, ClusterRequest};
use crate::cluster::{Cluster, ClusterStatus, ClusterTemplate, CredentialsBundle, Quotas};
use crate::error::{BackendKind, ClusterError};
use crate::poll::{self, PollPolicy};

/// Builds a cluster in `status` with a single node.
#[must_use]
pub fn cluster_in(name: &str, status: ClusterStatus) -> Cluster {
    Cluster {
        id: format!("{name}-id"),
        name: name.to_owned(),
        status,
        raw_status: status.as_str().to_owned(),
        node_count: 1,
        endpoint: None,
        autoscale: None,
        template: None,
    }
}

#[derive(Debug)]
struct ScriptState {
    responses: VecDeque<Result<Cluster, ClusterError>>,
    calls: Vec<String>,
    account: Option<Account>,
}

/// Backend double that answers cluster operations from a FIFO script.
///
/// Every operation returning a [`Cluster`] pops the next scripted response;
/// an empty script yields a transport error. All calls are recorded by
/// name.
#[derive(Clone, Debug)]
pub struct ScriptedBackend {
    kind: BackendKind,
    policy: PollPolicy,
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedBackend {
    /// Creates a backend with an empty script that polls every second for
    /// up to a minute.
    #[must_use]
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            policy: PollPolicy::new(Duration::from_secs(1), Duration::from_secs(60)),
            state: Arc::new(Mutex::new(ScriptState {
                responses: VecDeque::new(),
                calls: Vec::new(),
                account: None,
            })),
        }
    }

    /// Overrides the polling policy.
    #[must_use]
    pub const fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Makes [`ClusterBackend::authenticated_account`] report `account`.
    #[must_use]
    pub fn with_account(self, account: Account) -> Self {
        self.lock().account = Some(account);
        self
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a successful cluster response.
    pub fn push_cluster(&self, cluster: Cluster) {
        self.lock().responses.push_back(Ok(cluster));
    }

    /// Queues a failing response.
    pub fn push_error(&self, error: ClusterError) {
        self.lock().responses.push_back(Err(error));
    }

    /// Names of the operations invoked so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of `get_cluster` calls made so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.as_str() == "get_cluster")
            .count()
    }

    fn record(&self, call: &str) {
        self.lock().calls.push(call.to_owned());
    }

    fn next_cluster(&self, call: &str) -> Result<Cluster, ClusterError> {
        let mut state = self.lock();
        state.calls.push(call.to_owned());
        state.responses.pop_front().unwrap_or_else(|| {
            Err(ClusterError::transport(
                self.kind,
                call,
                "no scripted response available",
            ))
        })
    }
}

impl ClusterBackend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn authenticated_account(&self) -> BackendFuture<'_, Option<Account>> {
        let account = self.lock().account.clone();
        Box::pin(async move { Ok(account) })
    }

    fn poll_policy(&self) -> PollPolicy {
        self.policy
    }

    fn create_cluster<'a>(&'a self, _request: &'a ClusterRequest) -> BackendFuture<'a, Cluster> {
        Box::pin(async move { self.next_cluster("create_cluster") })
    }

    fn get_cluster<'a>(&'a self, _name: &'a str) -> BackendFuture<'a, Cluster> {
        Box::pin(async move { self.next_cluster("get_cluster") })
    }

    fn list_clusters(&self) -> BackendFuture<'_, Vec<Cluster>> {
        Box::pin(async move {
            self.record("list_clusters");
            let mut state = self.lock();
            let mut clusters = Vec::new();
            while let Some(Ok(cluster)) = state.responses.pop_front() {
                clusters.push(cluster);
            }
            Ok(clusters)
        })
    }

    fn delete_cluster<'a>(&'a self, _name: &'a str) -> BackendFuture<'a, Cluster> {
        Box::pin(async move { self.next_cluster("delete_cluster") })
    }

    fn grow_cluster<'a>(&'a self, _name: &'a str, _nodes: u32) -> BackendFuture<'a, Cluster> {
        Box::pin(async move { self.next_cluster("grow_cluster") })
    }

    fn resize_cluster<'a>(&'a self, _name: &'a str, _nodes: u32) -> BackendFuture<'a, Cluster> {
        Box::pin(async move { self.next_cluster("resize_cluster") })
    }

    fn rebuild_cluster<'a>(&'a self, _name: &'a str) -> BackendFuture<'a, Cluster> {
        Box::pin(async move { self.next_cluster("rebuild_cluster") })
    }

    fn set_autoscale<'a>(&'a self, _name: &'a str, _enabled: bool) -> BackendFuture<'a, Cluster> {
        Box::pin(async move { self.next_cluster("set_autoscale") })
    }

    fn get_cluster_credentials<'a>(
        &'a self,
        _name: &'a str,
    ) -> BackendFuture<'a, CredentialsBundle> {
        Box::pin(async move {
            self.record("get_cluster_credentials");
            Ok(CredentialsBundle::default())
        })
    }

    fn get_quotas(&self) -> BackendFuture<'_, Quotas> {
        Box::pin(async move {
            self.record("get_quotas");
            Ok(Quotas::default())
        })
    }

    fn list_cluster_templates(&self) -> BackendFuture<'_, Vec<ClusterTemplate>> {
        Box::pin(async move {
            self.record("list_cluster_templates");
            Ok(Vec::new())
        })
    }

    fn wait_until_deleted(&self, cluster: Cluster) -> BackendFuture<'_, ()> {
        Box::pin(async move { poll::wait_until_deleted(self, &cluster, self.policy).await })
    }
}
