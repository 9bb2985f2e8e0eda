//! `ChannelDefinition` custom resource: how to build each side of a channel
//! for one cluster definition.

use std::collections::BTreeMap;

use kube::CustomResource;
use serde::{Deserialize, Serialize};

use super::cluster::ClusterSpec;
use super::metadata::MetadataExpression;
use super::topology::TopologyStruct;
use super::ChannelRole;

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "datachannel.kubeblocks.io",
    version = "v1alpha1",
    kind = "ChannelDefinition",
    shortname = "cd",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDefinitionSpec {
    /// Fallback entry when an endpoint names no definition.
    #[serde(default)]
    pub is_default: bool,
    /// Supported disciplines. Empty supports all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topology_structs: Vec<TopologyStruct>,
    #[serde(default)]
    pub kube_blocks: DefinitionSettings,
    #[serde(default)]
    pub source: WorkerDefinition,
    #[serde(default)]
    pub sink: WorkerDefinition,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionSettings {
    #[serde(default)]
    pub expose: ExposeSettings,
}

/// Where workers reach a cluster of this definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposeSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_def_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServicePort>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerDefinition {
    #[serde(default)]
    pub kube_blocks: WorkerSettings,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sync_obj_env_express: Vec<MetadataExpression>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_requests: Option<AccountRequest>,
    /// Reconfiguration submitted to the source cluster before building.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configure_requests: Option<serde_json::Value>,
    /// Cluster spec template for the worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<ClusterSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_envs: BTreeMap<String, String>,
}

/// Database account a worker connects with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRequest {
    pub component_name: String,
    pub account_name: String,
}

impl ChannelDefinitionSpec {
    pub fn supports(&self, discipline: TopologyStruct) -> bool {
        self.topology_structs.is_empty() || self.topology_structs.contains(&discipline)
    }

    pub fn worker(&self, role: ChannelRole) -> &WorkerDefinition {
        match role {
            ChannelRole::Source => &self.source,
            ChannelRole::Sink => &self.sink,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports_empty_list_means_all() {
        let spec = ChannelDefinitionSpec::default();
        assert!(spec.supports(TopologyStruct::Dag));
        assert!(spec.supports(TopologyStruct::Dcg));

        let spec = ChannelDefinitionSpec {
            topology_structs: vec![TopologyStruct::Dag],
            ..Default::default()
        };
        assert!(spec.supports(TopologyStruct::Dag));
        assert!(!spec.supports(TopologyStruct::Dcg));
    }

    #[test]
    fn test_definition_wire_shape() {
        let json = serde_json::json!({
            "isDefault": true,
            "topologyStructs": ["dag"],
            "kubeBlocks": {"expose": {"componentDefRef": "mysql", "service": {"port": 3306}}},
            "source": {
                "kubeBlocks": {
                    "accountRequests": {"componentName": "mysql", "accountName": "repl"},
                    "extraEnvs": {"log-level": "info"}
                },
                "syncObjEnvExpress": [{"name": "tables", "metaTypeRequired": ["Database", "Table"]}]
            }
        });
        let spec: ChannelDefinitionSpec = serde_json::from_value(json).unwrap();
        assert!(spec.is_default);
        assert_eq!(spec.kube_blocks.expose.service, Some(ServicePort { port: Some(3306) }));
        let source = spec.worker(ChannelRole::Source);
        assert_eq!(
            source.kube_blocks.account_requests.as_ref().map(|a| a.account_name.as_str()),
            Some("repl")
        );
        assert_eq!(source.sync_obj_env_express.len(), 1);
        assert!(spec.worker(ChannelRole::Sink).kube_blocks.worker.is_none());
    }
}
