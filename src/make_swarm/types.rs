//! JSON shapes exchanged with the make-swarm API.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

use crate::cluster::{Cluster, ClusterStatus, CredentialsBundle, Quotas};

/// Cluster as reported by make-swarm.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub(crate) struct ClusterRecord {
    pub(crate) cluster_name: String,
    #[serde(default, deserialize_with = "node_count")]
    pub(crate) nodes: u32,
    #[serde(default)]
    pub(crate) autoscale: bool,
    #[serde(default)]
    pub(crate) status: String,
}

impl From<ClusterRecord> for Cluster {
    fn from(record: ClusterRecord) -> Self {
        Self {
            id: record.cluster_name.clone(),
            name: record.cluster_name,
            status: ClusterStatus::from_make_swarm(&record.status),
            raw_status: record.status,
            node_count: record.nodes,
            endpoint: None,
            autoscale: Some(record.autoscale),
            template: None,
        }
    }
}

/// The API reports node counts either as numbers or as numeric strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum NodeCount {
    Number(u32),
    Text(String),
}

fn node_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match NodeCount::deserialize(deserializer)? {
        NodeCount::Number(value) => Ok(value),
        NodeCount::Text(text) if text.trim().is_empty() => Ok(0),
        NodeCount::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CredentialsRecord {
    #[serde(default)]
    pub(crate) files: BTreeMap<String, String>,
}

impl From<CredentialsRecord> for CredentialsBundle {
    fn from(record: CredentialsRecord) -> Self {
        let mut bundle = Self::default();
        for (name, contents) in record.files {
            bundle.insert(name, contents);
        }
        bundle
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuotasRecord {
    #[serde(default)]
    pub(crate) max_clusters: Option<u32>,
    #[serde(default)]
    pub(crate) max_nodes_per_cluster: Option<u32>,
}

impl From<QuotasRecord> for Quotas {
    fn from(record: QuotasRecord) -> Self {
        Self {
            max_clusters: record.max_clusters,
            max_nodes_per_cluster: record.max_nodes_per_cluster,
        }
    }
}
