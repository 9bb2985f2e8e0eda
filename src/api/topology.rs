//! `ChannelTopology` custom resource.

use std::fmt;

use k8s_openapi::api::core::v1::Toleration;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

use super::cluster::Affinity;
use super::metadata::MetadataObject;

/// Declared set of channels plus the policy used to build them.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "datachannel.kubeblocks.io",
    version = "v1alpha1",
    kind = "ChannelTopology",
    namespaced,
    status = "ChannelTopologyStatus",
    shortname = "ct",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ChannelTopologySpec {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub channels: Vec<ChannelDeclaration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hubs: Vec<HubDeclaration>,
    #[serde(default)]
    pub settings: TopologySettings,
}

/// A directed synchronization link from one endpoint to another.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDeclaration {
    pub name: String,
    pub from: ChannelEndpoint,
    pub to: ChannelEndpoint,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_objs: Vec<MetadataObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_objs: Vec<MetadataObject>,
}

/// Reference to a cluster, directly or through a declared hub.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEndpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_definition_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hub_ref: Option<String>,
}

impl ChannelEndpoint {
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            cluster_ref: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn hub(name: impl Into<String>) -> Self {
        Self {
            hub_ref: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.cluster_namespace = Some(namespace.into());
        self
    }

    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.channel_definition_ref = Some(definition.into());
        self
    }

    /// Graph vertex naming this endpoint.
    ///
    /// `clusterRef-namespace` for cluster endpoints, the hub name for hub
    /// endpoints, `None` when neither is set.
    pub fn vertex_symbol(&self, default_namespace: &str) -> Option<String> {
        match (&self.cluster_ref, &self.hub_ref) {
            (Some(cluster), _) if !cluster.is_empty() => {
                let namespace = self
                    .cluster_namespace
                    .as_deref()
                    .filter(|ns| !ns.is_empty())
                    .unwrap_or(default_namespace);
                Some(format!("{}-{}", cluster, namespace))
            }
            (_, Some(hub)) if !hub.is_empty() => Some(hub.clone()),
            _ => None,
        }
    }
}

/// Named shared endpoint several channels may refer to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubDeclaration {
    pub name: String,
    pub cluster_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_definition_ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologySettings {
    #[serde(default)]
    pub topology: TopologyPolicy,
    #[serde(default)]
    pub schedule: ScheduleSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology_struct: Option<TopologyStruct>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_policy: Option<BuildingPolicy>,
    /// Minutes a topology may wait for its clusters before failing. 0 is unset.
    #[serde(default, rename = "prepareTtlMinutes")]
    pub prepare_ttl_minutes: u32,
}

impl TopologyPolicy {
    pub fn discipline(&self) -> TopologyStruct {
        self.topology_struct.unwrap_or_default()
    }

    pub fn policy(&self) -> BuildingPolicy {
        self.building_policy.unwrap_or_default()
    }
}

/// Scheduling overrides applied to every worker cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
}

/// Whether the channel graph must be acyclic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopologyStruct {
    #[default]
    Dag,
    Dcg,
}

impl fmt::Display for TopologyStruct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyStruct::Dag => f.write_str("dag"),
            TopologyStruct::Dcg => f.write_str("dcg"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildingPolicy {
    /// Prefer reusing an already built side.
    #[default]
    ClusterPriority,
    ChannelPriority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopologyPhase {
    Preparing,
    Running,
    Failed,
}

impl fmt::Display for TopologyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyPhase::Preparing => f.write_str("Preparing"),
            TopologyPhase::Running => f.write_str("Running"),
            TopologyPhase::Failed => f.write_str("Failed"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelTopologyStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<TopologyPhase>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub channel_total: u32,
    #[serde(default)]
    pub channel_established: u32,
    #[serde(default)]
    pub channel_wait_for_building: u32,
}

/// Merge patch for the status subresource. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<TopologyPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_total: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_established: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_wait_for_building: Option<u32>,
}

impl StatusPatch {
    /// Phase change with a diagnostic, as written by the wait and failure paths.
    pub fn phase(phase: TopologyPhase, message: impl Into<String>, channel_total: u32) -> Self {
        Self {
            phase: Some(phase),
            message: Some(message.into()),
            channel_total: Some(channel_total),
            ..Default::default()
        }
    }

    pub fn apply_to(&self, status: &mut ChannelTopologyStatus) {
        if let Some(phase) = self.phase {
            status.phase = Some(phase);
        }
        if let Some(message) = &self.message {
            status.message = message.clone();
        }
        if let Some(total) = self.channel_total {
            status.channel_total = total;
        }
        if let Some(established) = self.channel_established {
            status.channel_established = established;
        }
        if let Some(waiting) = self.channel_wait_for_building {
            status.channel_wait_for_building = waiting;
        }
    }
}

impl ChannelTopology {
    pub fn phase(&self) -> Option<TopologyPhase> {
        self.status.as_ref().and_then(|s| s.phase)
    }

    pub fn is_failed(&self) -> bool {
        self.phase() == Some(TopologyPhase::Failed)
    }

    pub fn hub(&self, name: &str) -> Option<&HubDeclaration> {
        self.spec.hubs.iter().find(|hub| hub.name == name)
    }
}
