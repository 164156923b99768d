//! JSON shapes exchanged with the Magnum v1 API.

use serde::Deserialize;

use crate::cluster::{Cluster, ClusterStatus, ClusterTemplate};

/// Cluster as reported by Magnum.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub(crate) struct ClusterRecord {
    #[serde(default)]
    pub(crate) uuid: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) status: String,
    #[serde(default)]
    pub(crate) node_count: u32,
    #[serde(default)]
    pub(crate) api_address: Option<String>,
    #[serde(default)]
    pub(crate) cluster_template_id: Option<String>,
}

impl From<ClusterRecord> for Cluster {
    fn from(record: ClusterRecord) -> Self {
        Self {
            id: record.uuid,
            name: record.name,
            status: ClusterStatus::from_magnum(&record.status),
            raw_status: record.status,
            node_count: record.node_count,
            endpoint: record.api_address.filter(|address| !address.is_empty()),
            autoscale: None,
            template: record.cluster_template_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClusterList {
    #[serde(default)]
    pub(crate) clusters: Vec<ClusterRecord>,
}

/// Body returned by create and update calls, which complete asynchronously.
#[derive(Debug, Deserialize)]
pub(crate) struct ClusterAccepted {
    pub(crate) uuid: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TemplateRecord {
    pub(crate) uuid: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) coe: String,
}

impl From<TemplateRecord> for ClusterTemplate {
    fn from(record: TemplateRecord) -> Self {
        Self {
            id: record.uuid,
            name: record.name,
            coe: record.coe,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TemplateList {
    #[serde(default)]
    pub(crate) clustertemplates: Vec<TemplateRecord>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuotaRecord {
    pub(crate) resource: String,
    pub(crate) hard_limit: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuotaList {
    #[serde(default)]
    pub(crate) quotas: Vec<QuotaRecord>,
}

impl QuotaList {
    /// Hard limit on clusters, if one is set. Negative limits mean unlimited.
    pub(crate) fn cluster_limit(&self) -> Option<u32> {
        self.quotas
            .iter()
            .find(|quota| quota.resource.eq_ignore_ascii_case("cluster"))
            .and_then(|quota| u32::try_from(quota.hard_limit).ok())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CertificateRecord {
    pub(crate) pem: String,
}
