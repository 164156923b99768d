//! Convergence loops that turn asynchronous provisioning into a blocking wait.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::backend::ClusterBackend;
use crate::cluster::Cluster;
use crate::error::ClusterError;

/// Delay between two status probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound on a single wait. Cluster builds routinely take several
/// minutes, so this is generous.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// How often and for how long the wait operations poll.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    /// Delay before each re-fetch.
    pub interval: Duration,
    /// Total time allowed before giving up with [`ClusterError::Timeout`].
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

impl PollPolicy {
    /// Builds a policy from explicit values.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Polls until `cluster` leaves the `new`, `building`, and `rebuilding`
/// states and returns the refreshed cluster.
///
/// A cluster that is already settled is returned without any request.
///
/// # Errors
///
/// Propagates the first fetch error unchanged and returns
/// [`ClusterError::Timeout`] once `policy.timeout` has elapsed.
pub async fn wait_until_active<B>(
    backend: &B,
    cluster: Cluster,
    policy: PollPolicy,
) -> Result<Cluster, ClusterError>
where
    B: ClusterBackend + ?Sized,
{
    if cluster.is_settled() {
        return Ok(cluster);
    }

    let deadline = Instant::now() + policy.timeout;
    let mut current = cluster;
    loop {
        if Instant::now() >= deadline {
            return Err(ClusterError::Timeout {
                backend: backend.kind(),
                name: current.name,
                waited: policy.timeout,
            });
        }

        debug!(
            "[{}] Waiting until cluster ({}) is active, currently in {}",
            backend.kind(),
            current.name,
            current.raw_status
        );
        sleep(policy.interval.min(deadline.saturating_duration_since(Instant::now()))).await;

        current = backend.get_cluster(&current.name).await?;
        if current.is_settled() {
            return Ok(current);
        }
    }
}

/// Polls until fetching `cluster` reports [`ClusterError::NotFound`].
///
/// # Errors
///
/// Propagates any fetch error other than not-found and returns
/// [`ClusterError::Timeout`] once `policy.timeout` has elapsed.
pub async fn wait_until_deleted<B>(
    backend: &B,
    cluster: &Cluster,
    policy: PollPolicy,
) -> Result<(), ClusterError>
where
    B: ClusterBackend + ?Sized,
{
    let deadline = Instant::now() + policy.timeout;
    loop {
        if Instant::now() >= deadline {
            return Err(ClusterError::Timeout {
                backend: backend.kind(),
                name: cluster.name.clone(),
                waited: policy.timeout,
            });
        }

        debug!(
            "[{}] Waiting until cluster ({}) is deleted",
            backend.kind(),
            cluster.name
        );
        sleep(policy.interval.min(deadline.saturating_duration_since(Instant::now()))).await;

        match backend.get_cluster(&cluster.name).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        }
    }
}
