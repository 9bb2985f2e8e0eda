//! Plan execution: mark the user cluster, then submit one worker.

use kube::ResourceExt;
use tracing::info;

use super::{BuildingPlan, Flow, Pass, TopologyReconciler};
use crate::api::labels::TOPOLOGY_LABEL;
use crate::api::{ChannelRole, Cluster};
use crate::error::{ControllerError, Result};
use crate::ledger::ChannelSet;
use crate::store::{labels, MetadataPatch};

/// How a user cluster relates to a topology for one channel and role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    /// Needs the topology label or the channel in its role annotation.
    Unmarked,
    Marked,
    /// Labelled for another topology.
    Claimed(String),
}

pub fn membership(cluster: &Cluster, topology: &str, channel: &str, role: ChannelRole) -> Membership {
    match cluster.labels().get(TOPOLOGY_LABEL) {
        Some(owner) if owner != topology => Membership::Claimed(owner.clone()),
        Some(_) => {
            let marked = cluster
                .annotations()
                .get(role.relation_annotation())
                .map(|raw| ChannelSet::parse(raw).contains(channel))
                .unwrap_or(false);
            if marked {
                Membership::Marked
            } else {
                Membership::Unmarked
            }
        }
        None => Membership::Unmarked,
    }
}

/// Patch recording `channel` on `cluster`, guarded by its resource version.
fn marking_patch(cluster: &Cluster, topology: &str, channel: &str, role: ChannelRole) -> MetadataPatch {
    let mut channels = cluster
        .annotations()
        .get(role.relation_annotation())
        .map(String::as_str)
        .map(ChannelSet::parse)
        .unwrap_or_default();
    channels.insert(channel);
    let channels = channels.to_string();

    MetadataPatch {
        labels: labels([(TOPOLOGY_LABEL, topology)]),
        annotations: labels([(role.relation_annotation(), channels.as_str())]),
        resource_version: cluster.resource_version(),
    }
}

impl TopologyReconciler {
    pub(super) async fn execute_plans(&self, pass: &mut Pass) -> Result<Flow> {
        let Some(plan) = pass.plans.first().copied() else {
            return Ok(Flow::Continue);
        };
        self.execute(pass, plan).await
    }

    async fn execute(&self, pass: &Pass, plan: BuildingPlan) -> Result<Flow> {
        let resources = pass.channels.get(plan.channel).ok_or_else(|| {
            ControllerError::materialization("", format!("no channel at index {}", plan.channel))
        })?;
        let channel = resources.name();
        let side = resources.side(plan.role);
        let Some(target) = side.cluster.as_ref() else {
            return Err(ControllerError::materialization(
                channel,
                format!("{} cluster {} is not resolved", plan.role, side.display_name()),
            ));
        };

        match membership(target, &pass.name, channel, plan.role) {
            Membership::Claimed(owner) => {
                let message = format!(
                    "cluster:[{}] is used for channel topology:[{}], can't use for another topology.",
                    target.name_any(),
                    owner
                );
                return self.fail(pass, message).await;
            }
            Membership::Unmarked => {
                let patch = marking_patch(target, &pass.name, channel, plan.role);
                let namespace = side.namespace().unwrap_or(pass.namespace.as_str());
                self.store
                    .patch_cluster_metadata(namespace, &target.name_any(), &patch)
                    .await?;
                info!(
                    cluster = %target.name_any(),
                    channel = %channel,
                    role = %plan.role,
                    "Marked cluster for topology"
                );
                return Ok(self.requeue_after_write());
            }
            Membership::Marked => {}
        }

        let worker = match self.materialize(pass, plan).await {
            Ok(worker) => worker,
            Err(err) => {
                self.fail(pass, err.to_string()).await?;
                return Err(err);
            }
        };

        let worker_name = worker.name_any();
        match self.store.create_cluster(&pass.namespace, &worker).await {
            Ok(_) => {
                info!(
                    cluster = %worker_name,
                    channel = %channel,
                    role = %plan.role,
                    "Created worker cluster"
                );
                Ok(self.requeue_after_write())
            }
            Err(source) => {
                let err = ControllerError::Provisioning {
                    cluster: worker_name,
                    source,
                };
                self.fail(pass, err.to_string()).await?;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::labels::{SINK_RELATION_ANNOTATION, SOURCE_RELATION_ANNOTATION};
    use crate::api::ClusterSpec;

    fn cluster(topology: Option<&str>, sources: Option<&str>) -> Cluster {
        let mut cluster = Cluster::new("mysql", ClusterSpec::default());
        cluster.metadata.resource_version = Some("7".to_string());
        if let Some(topology) = topology {
            cluster
                .labels_mut()
                .insert(TOPOLOGY_LABEL.to_string(), topology.to_string());
        }
        if let Some(sources) = sources {
            cluster
                .annotations_mut()
                .insert(SOURCE_RELATION_ANNOTATION.to_string(), sources.to_string());
        }
        cluster
    }

    #[test]
    fn test_membership() {
        assert_eq!(
            membership(&cluster(None, None), "t", "c1", ChannelRole::Source),
            Membership::Unmarked
        );
        assert_eq!(
            membership(&cluster(Some("t"), Some("c0")), "t", "c1", ChannelRole::Source),
            Membership::Unmarked
        );
        assert_eq!(
            membership(&cluster(Some("t"), Some("c0,c1")), "t", "c1", ChannelRole::Source),
            Membership::Marked
        );
        assert_eq!(
            membership(&cluster(Some("t"), Some("c1")), "t", "c1", ChannelRole::Sink),
            Membership::Unmarked
        );
        assert_eq!(
            membership(&cluster(Some("other"), Some("c1")), "t", "c1", ChannelRole::Source),
            Membership::Claimed("other".to_string())
        );
    }

    #[test]
    fn test_marking_patch_appends() {
        let patch = marking_patch(&cluster(Some("t"), Some("c0")), "t", "c1", ChannelRole::Source);
        assert_eq!(patch.labels.get(TOPOLOGY_LABEL).map(String::as_str), Some("t"));
        assert_eq!(
            patch.annotations.get(SOURCE_RELATION_ANNOTATION).map(String::as_str),
            Some("c0,c1")
        );
        assert_eq!(patch.resource_version.as_deref(), Some("7"));
    }

    #[test]
    fn test_marking_patch_uses_role_annotation() {
        let patch = marking_patch(&cluster(None, None), "t", "c1", ChannelRole::Sink);
        assert_eq!(
            patch.annotations.get(SINK_RELATION_ANNOTATION).map(String::as_str),
            Some("c1")
        );
        assert!(!patch.annotations.contains_key(SOURCE_RELATION_ANNOTATION));
    }
}
