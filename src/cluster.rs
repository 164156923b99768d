//! Normalized cluster read-model shared by every backend.
//!
//! Backends translate their own wire representations into [`Cluster`] so
//! callers never see provider specific status strings or field names. The
//! status classification here is what drives the polling engine.

use std::collections::BTreeMap;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

/// Normalized lifecycle state of a cluster.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ClusterStatus {
    /// Accepted by the provider but not yet provisioning.
    New,
    /// Nodes are being provisioned or resized.
    Building,
    /// The cluster is being torn down and recreated.
    Rebuilding,
    /// Provisioning finished successfully.
    Active,
    /// Deletion has been requested and is in progress.
    Deleting,
    /// Deletion finished; the cluster no longer exists.
    Deleted,
    /// The last operation failed.
    Error,
    /// A status this crate does not recognise.
    Unknown,
}

impl ClusterStatus {
    /// Classifies a make-swarm status string.
    #[must_use]
    pub fn from_make_swarm(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "new" => Self::New,
            "building" => Self::Building,
            "rebuilding-swarm" | "rebuilding" => Self::Rebuilding,
            "active" => Self::Active,
            "deleting" => Self::Deleting,
            "error" => Self::Error,
            _ => Self::Unknown,
        }
    }

    /// Classifies a Magnum status string such as `CREATE_IN_PROGRESS`.
    #[must_use]
    pub fn from_magnum(raw: &str) -> Self {
        let status = raw.trim().to_ascii_uppercase();
        match status.as_str() {
            "CREATE_IN_PROGRESS" | "UPDATE_IN_PROGRESS" => Self::Building,
            "CREATE_COMPLETE" | "UPDATE_COMPLETE" => Self::Active,
            "DELETE_IN_PROGRESS" => Self::Deleting,
            "DELETE_COMPLETE" => Self::Deleted,
            _ if status.ends_with("_FAILED") => Self::Error,
            _ => Self::Unknown,
        }
    }

    /// Returns true while the provider is still working on the cluster.
    ///
    /// Anything outside `new`, `building`, and `rebuilding` is terminal,
    /// including failures.
    #[must_use]
    pub const fn is_in_progress(self) -> bool {
        matches!(self, Self::New | Self::Building | Self::Rebuilding)
    }

    /// Lower-case label for display.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Building => "building",
            Self::Rebuilding => "rebuilding",
            Self::Active => "active",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cluster as returned by any backend.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Cluster {
    /// Provider identifier (Magnum UUID, or the name on make-swarm).
    pub id: String,
    /// User-assigned name, unique per account.
    pub name: String,
    /// Normalized status.
    pub status: ClusterStatus,
    /// Status exactly as the provider reported it.
    pub raw_status: String,
    /// Number of worker nodes.
    pub node_count: u32,
    /// Control endpoint, when the provider exposes one.
    pub endpoint: Option<String>,
    /// Autoscale flag, when the provider supports it.
    pub autoscale: Option<bool>,
    /// Template the cluster was created from, when applicable.
    pub template: Option<String>,
}

impl Cluster {
    /// Returns true once the cluster has left the in-progress states.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        !self.status.is_in_progress()
    }
}

/// Template describing how a cluster is orchestrated.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterTemplate {
    /// Provider identifier.
    pub id: String,
    /// Human readable name accepted by `create`.
    pub name: String,
    /// Container orchestration engine (for example `swarm` or `kubernetes`).
    pub coe: String,
}

/// Account limits reported by the provider.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Quotas {
    /// Maximum number of clusters, when limited.
    pub max_clusters: Option<u32>,
    /// Maximum number of nodes in a single cluster, when limited.
    pub max_nodes_per_cluster: Option<u32>,
}

/// TLS material and connection scripts needed to reach a cluster.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CredentialsBundle {
    /// File name to contents.
    pub files: BTreeMap<String, Vec<u8>>,
}

/// Errors raised while writing a credentials bundle to disk.
#[derive(Debug, Error)]
pub enum BundleError {
    /// Raised when a file name would escape the target directory.
    #[error("refusing to write credentials file with unsafe name {name}")]
    UnsafeName {
        /// Offending file name.
        name: String,
    },
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

impl CredentialsBundle {
    /// Adds or replaces a file in the bundle.
    pub fn insert(&mut self, name: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.insert(name.into(), contents.into());
    }

    /// Returns a file's contents.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    /// Writes every file into `dir`, creating the directory when needed.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError`] when a file name contains a path separator or
    /// when the directory cannot be created or written.
    pub fn write_to(&self, dir: &Utf8Path) -> Result<(), BundleError> {
        for name in self.files.keys() {
            if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
                return Err(BundleError::UnsafeName { name: name.clone() });
            }
        }

        Dir::create_ambient_dir_all(dir, ambient_authority()).map_err(|err| BundleError::Io {
            path: dir.to_path_buf(),
            message: err.to_string(),
        })?;
        let target =
            Dir::open_ambient_dir(dir, ambient_authority()).map_err(|err| BundleError::Io {
                path: dir.to_path_buf(),
                message: err.to_string(),
            })?;

        for (name, contents) in &self.files {
            target
                .write(name, contents)
                .map_err(|err| BundleError::Io {
                    path: dir.join(name),
                    message: err.to_string(),
                })?;
        }
        Ok(())
    }
}
