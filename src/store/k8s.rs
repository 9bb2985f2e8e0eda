//! Kubernetes API implementation of `ResourceStore`.
//!
//! Writes are JSON merge patches so only the touched fields change.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{Api, ListParams, Patch, PatchParams, PostParams},
    Client,
};
use serde_json::json;
use tracing::debug;

use super::{selector_string, Labels, MetadataPatch, ResourceStore, Result};
use crate::api::{ChannelDefinition, ChannelTopology, Cluster, OpsRequest, StatusPatch};

/// Field manager recorded on every write.
const FIELD_MANAGER: &str = "datachannel-controller";

/// Store backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn patch_params() -> PatchParams {
        PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }

    fn list_params(labels: &Labels) -> ListParams {
        ListParams::default().labels(&selector_string(labels))
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get_topology(&self, namespace: &str, name: &str) -> Result<Option<ChannelTopology>> {
        let api: Api<ChannelTopology> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_topology_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &StatusPatch,
    ) -> Result<()> {
        let api: Api<ChannelTopology> = Api::namespaced(self.client.clone(), namespace);
        let body = json!({ "status": patch });

        debug!(topology = %name, namespace = %namespace, ?patch, "Patching topology status");

        api.patch_status(name, &Self::patch_params(), &Patch::Merge(&body))
            .await?;
        Ok(())
    }

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>> {
        let api: Api<Cluster> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_clusters(&self, namespace: &str, labels: &Labels) -> Result<Vec<Cluster>> {
        let api: Api<Cluster> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&Self::list_params(labels)).await?.items)
    }

    async fn patch_cluster_metadata(
        &self,
        namespace: &str,
        name: &str,
        patch: &MetadataPatch,
    ) -> Result<()> {
        let api: Api<Cluster> = Api::namespaced(self.client.clone(), namespace);
        let body = json!({ "metadata": patch });

        debug!(cluster = %name, namespace = %namespace, "Patching cluster metadata");

        api.patch(name, &Self::patch_params(), &Patch::Merge(&body))
            .await?;
        Ok(())
    }

    async fn create_cluster(&self, namespace: &str, cluster: &Cluster) -> Result<Cluster> {
        let api: Api<Cluster> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.create(&Self::post_params(), cluster).await?)
    }

    async fn get_channel_definition(&self, name: &str) -> Result<Option<ChannelDefinition>> {
        let api: Api<ChannelDefinition> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn list_channel_definitions(&self, labels: &Labels) -> Result<Vec<ChannelDefinition>> {
        let api: Api<ChannelDefinition> = Api::all(self.client.clone());
        Ok(api.list(&Self::list_params(labels)).await?.items)
    }

    async fn list_ops_requests(
        &self,
        namespace: &str,
        labels: &Labels,
    ) -> Result<Vec<OpsRequest>> {
        let api: Api<OpsRequest> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&Self::list_params(labels)).await?.items)
    }

    async fn create_ops_request(&self, namespace: &str, ops: &OpsRequest) -> Result<OpsRequest> {
        let api: Api<OpsRequest> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.create(&Self::post_params(), ops).await?)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}
