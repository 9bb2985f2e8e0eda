//! In-memory `ResourceStore` for testing.
//!
//! Mirrors the API server closely enough for reconciliation tests:
//! resource versions bump on every write, stale metadata patches conflict,
//! and `generateName` gets a numeric suffix.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use tokio::sync::RwLock;

use super::{Labels, MetadataPatch, ResourceStore, Result, StoreError};
use crate::api::{
    ChannelDefinition, ChannelTopology, ChannelTopologyStatus, Cluster, ClusterPhase,
    ClusterStatus, OpsPhase, OpsRequest, OpsRequestStatus, StatusPatch,
};

/// Key type for namespaced objects: (namespace, name).
type ObjectKey = (String, String);

fn key(namespace: &str, name: &str) -> ObjectKey {
    (namespace.to_string(), name.to_string())
}

fn matches_labels(meta: &ObjectMeta, selector: &Labels) -> bool {
    let labels = meta.labels.clone().unwrap_or_default();
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

/// Mock store that keeps every object in memory.
#[derive(Default)]
pub struct MockStore {
    topologies: RwLock<HashMap<ObjectKey, ChannelTopology>>,
    clusters: RwLock<HashMap<ObjectKey, Cluster>>,
    definitions: RwLock<BTreeMap<String, ChannelDefinition>>,
    ops_requests: RwLock<HashMap<ObjectKey, OpsRequest>>,
    secrets: RwLock<HashMap<ObjectKey, Secret>>,
    revision: RwLock<u64>,
    status_patches: RwLock<Vec<StatusPatch>>,
    fail_on_get: RwLock<bool>,
    fail_on_list: RwLock<bool>,
    fail_on_create: RwLock<bool>,
    fail_on_patch: RwLock<bool>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_get(&self, fail: bool) {
        *self.fail_on_get.write().await = fail;
    }

    pub async fn set_fail_on_list(&self, fail: bool) {
        *self.fail_on_list.write().await = fail;
    }

    pub async fn set_fail_on_create(&self, fail: bool) {
        *self.fail_on_create.write().await = fail;
    }

    pub async fn set_fail_on_patch(&self, fail: bool) {
        *self.fail_on_patch.write().await = fail;
    }

    async fn next_revision(&self) -> String {
        let mut revision = self.revision.write().await;
        *revision += 1;
        revision.to_string()
    }

    async fn stamp(&self, meta: &mut ObjectMeta) {
        meta.resource_version = Some(self.next_revision().await);
        if meta.uid.is_none() {
            meta.uid = Some(format!("uid-{}", meta.name.clone().unwrap_or_default()));
        }
    }

    async fn check(&self, flag: &RwLock<bool>, op: &str) -> Result<()> {
        if *flag.read().await {
            return Err(StoreError::Unavailable(format!("{} failed", op)));
        }
        Ok(())
    }

    pub async fn insert_topology(&self, mut topology: ChannelTopology) {
        self.stamp(&mut topology.metadata).await;
        let k = key(&topology.namespace().unwrap_or_default(), &topology.name_any());
        self.topologies.write().await.insert(k, topology);
    }

    pub async fn insert_cluster(&self, mut cluster: Cluster) {
        self.stamp(&mut cluster.metadata).await;
        let k = key(&cluster.namespace().unwrap_or_default(), &cluster.name_any());
        self.clusters.write().await.insert(k, cluster);
    }

    pub async fn insert_channel_definition(&self, mut definition: ChannelDefinition) {
        self.stamp(&mut definition.metadata).await;
        self.definitions
            .write()
            .await
            .insert(definition.name_any(), definition);
    }

    pub async fn insert_ops_request(&self, mut ops: OpsRequest) {
        self.stamp(&mut ops.metadata).await;
        let k = key(&ops.namespace().unwrap_or_default(), &ops.name_any());
        self.ops_requests.write().await.insert(k, ops);
    }

    pub async fn insert_secret(&self, secret: Secret) {
        let k = key(&secret.namespace().unwrap_or_default(), &secret.name_any());
        self.secrets.write().await.insert(k, secret);
    }

    pub async fn topology(&self, namespace: &str, name: &str) -> Option<ChannelTopology> {
        self.topologies.read().await.get(&key(namespace, name)).cloned()
    }

    pub async fn cluster(&self, namespace: &str, name: &str) -> Option<Cluster> {
        self.clusters.read().await.get(&key(namespace, name)).cloned()
    }

    /// All clusters in a namespace, sorted by name.
    pub async fn clusters_in(&self, namespace: &str) -> Vec<Cluster> {
        let mut clusters: Vec<Cluster> = self
            .clusters
            .read()
            .await
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, c)| c.clone())
            .collect();
        clusters.sort_by_key(|c| c.name_any());
        clusters
    }

    /// All ops requests in a namespace, sorted by name.
    pub async fn ops_requests_in(&self, namespace: &str) -> Vec<OpsRequest> {
        let mut ops: Vec<OpsRequest> = self
            .ops_requests
            .read()
            .await
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, o)| o.clone())
            .collect();
        ops.sort_by_key(|o| o.name_any());
        ops
    }

    /// Every status patch applied so far, oldest first.
    pub async fn status_patches(&self) -> Vec<StatusPatch> {
        self.status_patches.read().await.clone()
    }

    /// Simulate the platform moving a cluster to a new phase.
    pub async fn set_cluster_phase(&self, namespace: &str, name: &str, phase: ClusterPhase) {
        let revision = self.next_revision().await;
        if let Some(cluster) = self.clusters.write().await.get_mut(&key(namespace, name)) {
            cluster.status = Some(ClusterStatus {
                phase: Some(phase),
                message: None,
            });
            cluster.metadata.resource_version = Some(revision);
        }
    }

    /// Simulate the platform completing or failing an ops request.
    pub async fn set_ops_phase(&self, namespace: &str, name: &str, phase: OpsPhase) {
        let revision = self.next_revision().await;
        if let Some(ops) = self.ops_requests.write().await.get_mut(&key(namespace, name)) {
            ops.status = Some(OpsRequestStatus { phase: Some(phase) });
            ops.metadata.resource_version = Some(revision);
        }
    }

    /// Set every ops request in a namespace to `phase`.
    pub async fn set_all_ops_phase(&self, namespace: &str, phase: OpsPhase) {
        for ops in self.ops_requests_in(namespace).await {
            self.set_ops_phase(namespace, &ops.name_any(), phase).await;
        }
    }
}

#[async_trait]
impl ResourceStore for MockStore {
    async fn get_topology(&self, namespace: &str, name: &str) -> Result<Option<ChannelTopology>> {
        self.check(&self.fail_on_get, "get").await?;
        Ok(self.topology(namespace, name).await)
    }

    async fn patch_topology_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &StatusPatch,
    ) -> Result<()> {
        self.check(&self.fail_on_patch, "patch").await?;
        let revision = self.next_revision().await;
        let mut topologies = self.topologies.write().await;
        let topology = topologies
            .get_mut(&key(namespace, name))
            .ok_or_else(|| StoreError::Api(format!("channeltopology {} not found", name)))?;
        let status = topology
            .status
            .get_or_insert_with(ChannelTopologyStatus::default);
        patch.apply_to(status);
        topology.metadata.resource_version = Some(revision);
        self.status_patches.write().await.push(patch.clone());
        Ok(())
    }

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>> {
        self.check(&self.fail_on_get, "get").await?;
        Ok(self.cluster(namespace, name).await)
    }

    async fn list_clusters(&self, namespace: &str, labels: &Labels) -> Result<Vec<Cluster>> {
        self.check(&self.fail_on_list, "list").await?;
        Ok(self
            .clusters_in(namespace)
            .await
            .into_iter()
            .filter(|c| matches_labels(&c.metadata, labels))
            .collect())
    }

    async fn patch_cluster_metadata(
        &self,
        namespace: &str,
        name: &str,
        patch: &MetadataPatch,
    ) -> Result<()> {
        self.check(&self.fail_on_patch, "patch").await?;
        let revision = self.next_revision().await;
        let mut clusters = self.clusters.write().await;
        let cluster = clusters
            .get_mut(&key(namespace, name))
            .ok_or_else(|| StoreError::Api(format!("cluster {} not found", name)))?;

        if let Some(expected) = &patch.resource_version {
            if cluster.metadata.resource_version.as_ref() != Some(expected) {
                return Err(StoreError::Conflict(format!(
                    "cluster {} has been modified",
                    name
                )));
            }
        }

        cluster.labels_mut().extend(patch.labels.clone());
        cluster.annotations_mut().extend(patch.annotations.clone());
        cluster.metadata.resource_version = Some(revision);
        Ok(())
    }

    async fn create_cluster(&self, namespace: &str, cluster: &Cluster) -> Result<Cluster> {
        self.check(&self.fail_on_create, "create").await?;
        let name = cluster.name_any();
        if self.cluster(namespace, &name).await.is_some() {
            return Err(StoreError::Api(format!("cluster {} already exists", name)));
        }
        let mut created = cluster.clone();
        created.metadata.namespace = Some(namespace.to_string());
        self.insert_cluster(created).await;
        self.cluster(namespace, &name)
            .await
            .ok_or_else(|| StoreError::Api(format!("cluster {} vanished", name)))
    }

    async fn get_channel_definition(&self, name: &str) -> Result<Option<ChannelDefinition>> {
        self.check(&self.fail_on_get, "get").await?;
        Ok(self.definitions.read().await.get(name).cloned())
    }

    async fn list_channel_definitions(&self, labels: &Labels) -> Result<Vec<ChannelDefinition>> {
        self.check(&self.fail_on_list, "list").await?;
        Ok(self
            .definitions
            .read()
            .await
            .values()
            .filter(|d| matches_labels(&d.metadata, labels))
            .cloned()
            .collect())
    }

    async fn list_ops_requests(
        &self,
        namespace: &str,
        labels: &Labels,
    ) -> Result<Vec<OpsRequest>> {
        self.check(&self.fail_on_list, "list").await?;
        Ok(self
            .ops_requests_in(namespace)
            .await
            .into_iter()
            .filter(|o| matches_labels(&o.metadata, labels))
            .collect())
    }

    async fn create_ops_request(&self, namespace: &str, ops: &OpsRequest) -> Result<OpsRequest> {
        self.check(&self.fail_on_create, "create").await?;
        let mut created = ops.clone();
        created.metadata.namespace = Some(namespace.to_string());
        if created.metadata.name.is_none() {
            let prefix = created.metadata.generate_name.clone().unwrap_or_default();
            let suffix = self.next_revision().await;
            created.metadata.name = Some(format!("{}{:0>5}", prefix, suffix));
        }
        let name = created.name_any();
        if self.ops_requests.read().await.contains_key(&key(namespace, &name)) {
            return Err(StoreError::Api(format!("opsrequest {} already exists", name)));
        }
        self.insert_ops_request(created).await;
        self.ops_requests
            .read()
            .await
            .get(&key(namespace, &name))
            .cloned()
            .ok_or_else(|| StoreError::Api(format!("opsrequest {} vanished", name)))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        self.check(&self.fail_on_get, "get").await?;
        Ok(self.secrets.read().await.get(&key(namespace, name)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ClusterSpec, OpsRequestSpec, OpsType, TopologyPhase};
    use crate::store::labels;

    fn cluster(name: &str, label: Option<(&str, &str)>) -> Cluster {
        let mut cluster = Cluster::new(name, ClusterSpec::default());
        cluster.metadata.namespace = Some("default".into());
        if let Some((k, v)) = label {
            cluster.labels_mut().insert(k.into(), v.into());
        }
        cluster
    }

    #[tokio::test]
    async fn test_list_clusters_filters_by_label() {
        let store = MockStore::new();
        store.insert_cluster(cluster("a", Some(("team", "x")))).await;
        store.insert_cluster(cluster("b", Some(("team", "y")))).await;
        store.insert_cluster(cluster("c", None)).await;

        let found = store
            .list_clusters("default", &labels([("team", "x")]))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name_any(), "a");

        let all = store.list_clusters("default", &Labels::new()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_stale_metadata_patch_conflicts() {
        let store = MockStore::new();
        store.insert_cluster(cluster("a", None)).await;
        let observed = store.cluster("default", "a").await.unwrap();

        let patch = MetadataPatch {
            labels: labels([("l", "1")]),
            resource_version: observed.metadata.resource_version.clone(),
            ..Default::default()
        };
        store
            .patch_cluster_metadata("default", "a", &patch)
            .await
            .unwrap();

        let err = store
            .patch_cluster_metadata("default", "a", &patch)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(
            store.cluster("default", "a").await.unwrap().labels().get("l"),
            Some(&"1".to_string())
        );
    }

    #[tokio::test]
    async fn test_generate_name_assigns_unique_names() {
        let store = MockStore::new();
        let mut ops = OpsRequest::new(
            "",
            OpsRequestSpec {
                cluster_ref: "mysql".into(),
                ops_type: OpsType::Reconfiguring,
                reconfigure: None,
            },
        );
        ops.metadata.name = None;
        ops.metadata.generate_name = Some("mysql-".into());

        let first = store.create_ops_request("default", &ops).await.unwrap();
        let second = store.create_ops_request("default", &ops).await.unwrap();
        assert!(first.name_any().starts_with("mysql-"));
        assert_ne!(first.name_any(), second.name_any());
        assert_eq!(store.ops_requests_in("default").await.len(), 2);
    }

    #[tokio::test]
    async fn test_create_cluster_rejects_duplicates() {
        let store = MockStore::new();
        store.create_cluster("default", &cluster("a", None)).await.unwrap();
        assert!(store.create_cluster("default", &cluster("a", None)).await.is_err());
    }

    #[tokio::test]
    async fn test_fail_toggles() {
        let store = MockStore::new();
        store.set_fail_on_get(true).await;
        assert!(matches!(
            store.get_cluster("default", "a").await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_fail_on_get(false).await;
        assert!(store.get_cluster("default", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_patch_recorded() {
        let store = MockStore::new();
        let mut topology = ChannelTopology::new("t", Default::default());
        topology.metadata.namespace = Some("default".into());
        store.insert_topology(topology).await;

        store
            .patch_topology_status(
                "default",
                "t",
                &StatusPatch::phase(TopologyPhase::Preparing, "waiting", 1),
            )
            .await
            .unwrap();

        let stored = store.topology("default", "t").await.unwrap();
        assert_eq!(stored.phase(), Some(TopologyPhase::Preparing));
        assert_eq!(store.status_patches().await.len(), 1);
    }
}
