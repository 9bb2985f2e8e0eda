//! Cluster platform resources consumed by the controller.
//!
//! Unknown spec fields are kept in `extra` so worker templates round-trip
//! whatever the platform accepts.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Toleration;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "apps.kubeblocks.io",
    version = "v1alpha1",
    kind = "Cluster",
    namespaced,
    status = "ClusterStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default)]
    pub cluster_definition_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_version_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub component_specs: Vec<ClusterComponentSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterComponentSpec {
    pub name: String,
    #[serde(default)]
    pub component_def_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Platform-level placement rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Affinity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_anti_affinity: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topology_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenancy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ClusterPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterPhase {
    Creating,
    Running,
    Updating,
    Stopping,
    Stopped,
    Deleting,
    Failed,
    Abnormal,
    #[serde(other)]
    Unknown,
}

impl Cluster {
    pub fn phase(&self) -> Option<ClusterPhase> {
        self.status.as_ref().and_then(|s| s.phase)
    }

    pub fn is_running(&self) -> bool {
        self.phase() == Some(ClusterPhase::Running)
    }
}

#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "apps.kubeblocks.io",
    version = "v1alpha1",
    kind = "OpsRequest",
    namespaced,
    status = "OpsRequestStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct OpsRequestSpec {
    pub cluster_ref: String,
    #[serde(rename = "type")]
    pub ops_type: OpsType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconfigure: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpsType {
    Reconfiguring,
    Upgrade,
    VerticalScaling,
    HorizontalScaling,
    VolumeExpansion,
    Restart,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpsRequestStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<OpsPhase>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpsPhase {
    Pending,
    Creating,
    Running,
    Cancelling,
    Cancelled,
    Succeed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl OpsRequest {
    pub fn phase(&self) -> Option<OpsPhase> {
        self.status.as_ref().and_then(|s| s.phase)
    }

    pub fn is_succeeded(&self) -> bool {
        self.phase() == Some(OpsPhase::Succeed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_cluster_phase() {
        let status: ClusterStatus = serde_json::from_str(r#"{"phase":"Hibernating"}"#).unwrap();
        assert_eq!(status.phase, Some(ClusterPhase::Unknown));
    }

    #[test]
    fn test_cluster_spec_keeps_unknown_fields() {
        let json = serde_json::json!({
            "clusterDefinitionRef": "mysql",
            "terminationPolicy": "Delete",
            "componentSpecs": [{"name": "worker", "componentDefRef": "worker", "replicas": 1, "resources": {}}]
        });
        let spec: ClusterSpec = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(spec.cluster_definition_ref, "mysql");
        assert_eq!(spec.extra.get("terminationPolicy"), Some(&serde_json::json!("Delete")));
        assert!(spec.component_specs[0].extra.contains_key("resources"));
        assert_eq!(serde_json::to_value(&spec).unwrap(), json);
    }

    #[test]
    fn test_ops_request_type_field() {
        let spec: OpsRequestSpec =
            serde_json::from_str(r#"{"clusterRef":"mysql","type":"Reconfiguring"}"#).unwrap();
        assert_eq!(spec.ops_type, OpsType::Reconfiguring);
        let spec: OpsRequestSpec =
            serde_json::from_str(r#"{"clusterRef":"mysql","type":"Switchover"}"#).unwrap();
        assert_eq!(spec.ops_type, OpsType::Other);
    }
}
