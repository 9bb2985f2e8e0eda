//! Build-plan generation.

use tracing::debug;

use super::dependency::is_worker_for;
use super::{ChannelResources, Flow, Pass, TopologyReconciler};
use crate::api::{BuildingPolicy, ChannelRole, Cluster};

/// One worker cluster still to be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildingPlan {
    pub role: ChannelRole,
    /// Index into the pass's channels.
    pub channel: usize,
    /// Sink plans only: channel whose built source worker reads from the
    /// same cluster.
    pub reused: Option<usize>,
}

fn is_built(members: &[Cluster], channel: &str, role: ChannelRole) -> bool {
    members.iter().any(|c| is_worker_for(c, channel, role))
}

/// Another channel reading from the same source cluster whose source
/// worker is already built.
fn find_reusable_source(
    idx: usize,
    channels: &[ChannelResources],
    members: &[Cluster],
) -> Option<usize> {
    let wanted = &channels[idx].source;
    channels.iter().enumerate().find_map(|(other, resources)| {
        (other != idx
            && resources.source.same_cluster(wanted)
            && is_built(members, resources.name(), ChannelRole::Source))
        .then_some(other)
    })
}

/// Plans for every side without a worker, in declaration order, source
/// before sink.
pub fn generate_plans(
    channels: &[ChannelResources],
    members: &[Cluster],
    policy: BuildingPolicy,
) -> Vec<BuildingPlan> {
    let mut plans = Vec::new();
    for (idx, resources) in channels.iter().enumerate() {
        let reused = match policy {
            BuildingPolicy::ClusterPriority => find_reusable_source(idx, channels, members),
            BuildingPolicy::ChannelPriority => None,
        };

        // The source side is always built. Reuse only feeds the sink's source endpoint.
        if !is_built(members, resources.name(), ChannelRole::Source) {
            plans.push(BuildingPlan {
                role: ChannelRole::Source,
                channel: idx,
                reused: None,
            });
        }
        if !is_built(members, resources.name(), ChannelRole::Sink) {
            plans.push(BuildingPlan {
                role: ChannelRole::Sink,
                channel: idx,
                reused,
            });
        }
    }
    plans
}

impl TopologyReconciler {
    pub(super) fn plan_builds(&self, pass: &mut Pass) -> Flow {
        let policy = pass.topology.spec.settings.topology.policy();
        pass.plans = generate_plans(&pass.channels, &pass.members, policy);
        debug!(plans = pass.plans.len(), ?policy, "Generated building plans");
        Flow::Continue
    }
}
