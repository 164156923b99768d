//! Core library for the Carina cluster tool.
//!
//! The crate exposes one lifecycle surface over two container-cluster
//! providers: OpenStack Magnum (private cloud, Keystone v3) and make-swarm
//! (Carina public cloud, Rackspace API keys). Accounts authenticate lazily,
//! reuse cached tokens when the identity service still accepts them, and
//! reauthenticate once when a token is rejected mid-session.

pub mod account;
pub mod backend;
pub mod cache;
pub mod client;
pub mod cluster;
pub mod config;
pub mod error;
pub mod magnum;
pub mod make_swarm;
pub mod poll;
pub mod session;
pub mod test_support;

pub use account::{
    Account, CloudType, Credentials, DEFAULT_IDENTITY_ENDPOINT, DEFAULT_MAKE_SWARM_ENDPOINT,
    MagnumAccount, MakeSwarmAccount,
};
pub use backend::{BackendFuture, ClusterBackend, ClusterRequest, ClusterRequestBuilder};
pub use cache::{CacheEntry, CacheError, CredentialCache};
pub use client::{Client, ClientError};
pub use cluster::{
    BundleError, Cluster, ClusterStatus, ClusterTemplate, CredentialsBundle, Quotas,
};
pub use config::{CarinaConfig, ClientSettings, ConfigError};
pub use error::{BackendKind, ClusterError, InvalidRequest};
pub use magnum::MagnumBackend;
pub use make_swarm::MakeSwarmBackend;
pub use poll::{DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT, PollPolicy};
pub use session::Session;
