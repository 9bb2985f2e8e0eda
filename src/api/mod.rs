//! Kubernetes resource types.
//!
//! `ChannelTopology` and `ChannelDefinition` are owned by this controller.
//! `Cluster` and `OpsRequest` belong to the cluster platform; only the
//! fields the controller reads or writes are modelled.

mod cluster;
mod definition;
pub mod labels;
mod metadata;
mod topology;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use cluster::{
    Affinity, Cluster, ClusterComponentSpec, ClusterPhase, ClusterSpec, ClusterStatus, OpsPhase,
    OpsRequest, OpsRequestSpec, OpsRequestStatus, OpsType,
};
pub use definition::{
    AccountRequest, ChannelDefinition, ChannelDefinitionSpec, DefinitionSettings, ExposeSettings,
    ServicePort, WorkerDefinition, WorkerSettings,
};
pub use metadata::{MetaType, MetadataExpression, MetadataObject, SelectMode};
pub use topology::{
    BuildingPolicy, ChannelDeclaration, ChannelEndpoint, ChannelTopology, ChannelTopologySpec,
    ChannelTopologyStatus, HubDeclaration, ScheduleSettings, StatusPatch, TopologyPhase,
    TopologyPolicy, TopologySettings, TopologyStruct,
};

/// Side of a channel a worker cluster serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelRole {
    Source,
    Sink,
}

impl ChannelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelRole::Source => "source",
            ChannelRole::Sink => "sink",
        }
    }

    /// Annotation on a user cluster listing the channels it serves in this role.
    pub fn relation_annotation(&self) -> &'static str {
        match self {
            ChannelRole::Source => labels::SOURCE_RELATION_ANNOTATION,
            ChannelRole::Sink => labels::SINK_RELATION_ANNOTATION,
        }
    }

    /// Prefix for the worker settings describing this side.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            ChannelRole::Source => "SOURCE",
            ChannelRole::Sink => "SINK",
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
