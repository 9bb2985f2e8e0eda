//! Resource gathering: the first read of every pass.

use chrono::{DateTime, Utc};
use kube::ResourceExt;
use tracing::{debug, info};

use super::{Outcome, Pass, TopologyReconciler};
use crate::api::{
    BuildingPolicy, ChannelDeclaration, ChannelDefinition, ChannelEndpoint, ChannelRole,
    ChannelTopology, Cluster, TopologyStruct,
};
use crate::error::{ControllerError, Result};

pub(super) enum Gathered {
    Ready(Pass),
    Stop(Outcome),
}

/// Cluster an endpoint points at, after hub indirection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub cluster: String,
    pub namespace: String,
    /// Explicit channel definition, if the endpoint or its hub names one.
    pub definition: Option<String>,
}

/// One side of a channel as found in the store.
#[derive(Debug, Clone, Default)]
pub struct EndpointResources {
    pub reference: Option<ResolvedEndpoint>,
    pub cluster: Option<Cluster>,
    /// Filled in by validation.
    pub definition: Option<ChannelDefinition>,
}

impl EndpointResources {
    /// Name used in diagnostics.
    pub fn display_name(&self) -> &str {
        self.reference
            .as_ref()
            .map(|r| r.cluster.as_str())
            .unwrap_or("<unset>")
    }

    pub fn namespace(&self) -> Option<&str> {
        self.reference.as_ref().map(|r| r.namespace.as_str())
    }

    /// Whether both sides refer to the same cluster object.
    pub fn same_cluster(&self, other: &EndpointResources) -> bool {
        match (&self.reference, &other.reference) {
            (Some(a), Some(b)) => a.cluster == b.cluster && a.namespace == b.namespace,
            _ => false,
        }
    }
}

/// A declared channel together with the objects both ends resolve to.
#[derive(Debug, Clone)]
pub struct ChannelResources {
    pub channel: ChannelDeclaration,
    pub source: EndpointResources,
    pub sink: EndpointResources,
}

impl ChannelResources {
    pub fn side(&self, role: ChannelRole) -> &EndpointResources {
        match role {
            ChannelRole::Source => &self.source,
            ChannelRole::Sink => &self.sink,
        }
    }

    pub fn side_mut(&mut self, role: ChannelRole) -> &mut EndpointResources {
        match role {
            ChannelRole::Source => &mut self.source,
            ChannelRole::Sink => &mut self.sink,
        }
    }

    pub fn name(&self) -> &str {
        &self.channel.name
    }
}

/// Fill unset topology settings in place. Nothing is persisted.
pub fn apply_defaults(topology: &mut ChannelTopology, default_ttl_minutes: u32) {
    let policy = &mut topology.spec.settings.topology;
    if policy.prepare_ttl_minutes == 0 {
        policy.prepare_ttl_minutes = default_ttl_minutes;
    }
    policy.topology_struct.get_or_insert(TopologyStruct::Dag);
    policy.building_policy.get_or_insert(BuildingPolicy::ClusterPriority);
}

/// Resolve an endpoint to a namespaced cluster reference.
///
/// Hub endpoints take the cluster, namespace and definition declared on the
/// hub. A definition on the endpoint itself wins over the hub's.
pub fn resolve_endpoint(
    endpoint: &ChannelEndpoint,
    topology: &ChannelTopology,
    default_namespace: &str,
) -> Option<ResolvedEndpoint> {
    let namespace_or_default = |ns: Option<&String>| {
        ns.filter(|ns| !ns.is_empty())
            .cloned()
            .unwrap_or_else(|| default_namespace.to_string())
    };
    let definition = endpoint
        .channel_definition_ref
        .clone()
        .filter(|d| !d.is_empty());

    if let Some(cluster) = endpoint.cluster_ref.as_ref().filter(|c| !c.is_empty()) {
        return Some(ResolvedEndpoint {
            cluster: cluster.clone(),
            namespace: namespace_or_default(endpoint.cluster_namespace.as_ref()),
            definition,
        });
    }

    let hub_name = endpoint.hub_ref.as_ref().filter(|h| !h.is_empty())?;
    let hub = topology.hub(hub_name)?;
    if hub.cluster_ref.is_empty() {
        return None;
    }
    Some(ResolvedEndpoint {
        cluster: hub.cluster_ref.clone(),
        namespace: namespace_or_default(hub.cluster_namespace.as_ref()),
        definition: definition.or_else(|| {
            hub.channel_definition_ref
                .clone()
                .filter(|d| !d.is_empty())
        }),
    })
}

impl TopologyReconciler {
    pub(super) async fn gather(
        &self,
        namespace: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Gathered> {
        let mut topology = self
            .store
            .get_topology(namespace, name)
            .await?
            .ok_or_else(|| ControllerError::TopologyNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;

        if topology.is_failed() {
            debug!("Topology already failed, nothing to do");
            return Ok(Gathered::Stop(Outcome::Done));
        }

        apply_defaults(&mut topology, self.settings.default_prepare_ttl_minutes);

        let default_namespace = topology.namespace().unwrap_or_else(|| namespace.to_string());
        let mut channels = Vec::with_capacity(topology.spec.channels.len());
        for channel in &topology.spec.channels {
            let source = self
                .gather_endpoint(&channel.from, &topology, &default_namespace)
                .await?;
            let sink = self
                .gather_endpoint(&channel.to, &topology, &default_namespace)
                .await?;
            channels.push(ChannelResources {
                channel: channel.clone(),
                source,
                sink,
            });
        }

        Ok(Gathered::Ready(Pass {
            namespace: namespace.to_string(),
            name: name.to_string(),
            topology,
            channels,
            members: Vec::new(),
            plans: Vec::new(),
            now,
        }))
    }

    async fn gather_endpoint(
        &self,
        endpoint: &ChannelEndpoint,
        topology: &ChannelTopology,
        default_namespace: &str,
    ) -> Result<EndpointResources> {
        let Some(reference) = resolve_endpoint(endpoint, topology, default_namespace) else {
            info!(endpoint = ?endpoint, "Endpoint references no cluster");
            return Ok(EndpointResources::default());
        };

        let cluster = self
            .store
            .get_cluster(&reference.namespace, &reference.cluster)
            .await?;
        if cluster.is_none() {
            info!(
                cluster = %reference.cluster,
                namespace = %reference.namespace,
                "Referenced cluster not found"
            );
        }

        Ok(EndpointResources {
            reference: Some(reference),
            cluster,
            definition: None,
        })
    }
}
