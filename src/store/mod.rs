//! ResourceStore trait and error types.
//!
//! Every read and write the reconciler performs goes through this trait.
//! `KubeStore` talks to the API server; `MockStore` keeps objects in memory
//! for tests.

mod k8s;
pub mod mock;

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use serde::Serialize;

use crate::api::{ChannelDefinition, ChannelTopology, Cluster, OpsRequest, StatusPatch};

pub use k8s::KubeStore;
pub use mock::MockStore;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Equality label selector.
pub type Labels = BTreeMap<String, String>;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("API error: {0}")]
    Api(String),

    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 409 => StoreError::Conflict(resp.message),
            kube::Error::Api(resp) => StoreError::Api(resp.message),
            kube::Error::SerdeError(e) => StoreError::Serialization(e.to_string()),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Labels and annotations merged into an object's metadata.
///
/// With `resource_version` set, the write is rejected if the object changed
/// since it was read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPatch {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

/// Build an equality selector from key/value pairs.
pub fn labels<const N: usize>(pairs: [(&str, &str); N]) -> Labels {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Render a selector in `k=v,k2=v2` form.
pub fn selector_string(labels: &Labels) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Typed access to the objects the reconciler reads and writes.
///
/// Soft lookups return `Ok(None)` when the object does not exist.
#[async_trait]
pub trait ResourceStore: Send + Sync + 'static {
    async fn get_topology(&self, namespace: &str, name: &str) -> Result<Option<ChannelTopology>>;

    /// Merge-patch the status subresource.
    async fn patch_topology_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &StatusPatch,
    ) -> Result<()>;

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>>;

    async fn list_clusters(&self, namespace: &str, labels: &Labels) -> Result<Vec<Cluster>>;

    /// Merge labels and annotations into a cluster.
    async fn patch_cluster_metadata(
        &self,
        namespace: &str,
        name: &str,
        patch: &MetadataPatch,
    ) -> Result<()>;

    async fn create_cluster(&self, namespace: &str, cluster: &Cluster) -> Result<Cluster>;

    /// Channel definitions are cluster scoped.
    async fn get_channel_definition(&self, name: &str) -> Result<Option<ChannelDefinition>>;

    async fn list_channel_definitions(&self, labels: &Labels) -> Result<Vec<ChannelDefinition>>;

    async fn list_ops_requests(&self, namespace: &str, labels: &Labels)
        -> Result<Vec<OpsRequest>>;

    /// Submit an ops request. `metadata.generateName` is honoured.
    async fn create_ops_request(&self, namespace: &str, ops: &OpsRequest) -> Result<OpsRequest>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;
}
