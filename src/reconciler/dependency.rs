//! Dependency gate: source clusters must finish their configure request
//! before any worker is built against them.

use std::collections::BTreeMap;

use kube::api::ObjectMeta;
use kube::ResourceExt;
use tracing::{debug, info};

use super::{ChannelResources, Flow, Outcome, Pass, TopologyReconciler};
use crate::api::labels::{
    APP_INSTANCE_LABEL, CHANNEL_NAME_ANNOTATION, CHANNEL_TYPE_ANNOTATION, TOPOLOGY_LABEL,
};
use crate::api::{
    ChannelRole, Cluster, OpsRequest, OpsRequestSpec, OpsType, StatusPatch, TopologyPhase,
};
use crate::error::Result;
use crate::store::labels;

/// Whether `cluster` is the worker built for `role` of `channel`.
pub fn is_worker_for(cluster: &Cluster, channel: &str, role: ChannelRole) -> bool {
    let annotations = cluster.annotations();
    annotations.get(CHANNEL_NAME_ANNOTATION).map(String::as_str) == Some(channel)
        && annotations.get(CHANNEL_TYPE_ANNOTATION).map(String::as_str) == Some(role.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceState {
    Ready,
    NotRequested,
    NotReady,
}

/// Configure request for a source cluster on behalf of one channel.
fn configure_request(
    topology: &str,
    cluster: &str,
    channel: &str,
    reconfigure: serde_json::Value,
) -> OpsRequest {
    let mut ops = OpsRequest::new(
        "",
        OpsRequestSpec {
            cluster_ref: cluster.to_string(),
            ops_type: OpsType::Reconfiguring,
            reconfigure: Some(reconfigure),
        },
    );
    ops.metadata = ObjectMeta {
        generate_name: Some(format!("{}-", cluster)),
        labels: Some(labels([
            (TOPOLOGY_LABEL, topology),
            (APP_INSTANCE_LABEL, cluster),
        ])),
        annotations: Some(labels([(CHANNEL_NAME_ANNOTATION, channel)])),
        ..Default::default()
    };
    ops
}

impl TopologyReconciler {
    async fn source_state(&self, topology: &str, resources: &ChannelResources) -> Result<SourceState> {
        let configure = resources
            .source
            .definition
            .as_ref()
            .and_then(|d| d.spec.source.kube_blocks.configure_requests.as_ref());
        let (Some(_), Some(reference)) = (configure, resources.source.reference.as_ref()) else {
            return Ok(SourceState::Ready);
        };

        let requests = self
            .store
            .list_ops_requests(
                &reference.namespace,
                &labels([
                    (TOPOLOGY_LABEL, topology),
                    (APP_INSTANCE_LABEL, reference.cluster.as_str()),
                ]),
            )
            .await?;
        let matching: Vec<&OpsRequest> = requests
            .iter()
            .filter(|ops| {
                ops.spec.ops_type == OpsType::Reconfiguring
                    && ops.annotations().get(CHANNEL_NAME_ANNOTATION).map(String::as_str)
                        == Some(resources.name())
            })
            .collect();

        Ok(if matching.iter().any(|ops| ops.is_succeeded()) {
            SourceState::Ready
        } else if matching.is_empty() {
            SourceState::NotRequested
        } else {
            SourceState::NotReady
        })
    }

    pub(super) async fn configure_dependencies(&self, pass: &mut Pass) -> Result<Flow> {
        pass.members = self
            .store
            .list_clusters(&pass.namespace, &labels([(TOPOLOGY_LABEL, pass.name.as_str())]))
            .await?;

        let pending: Vec<usize> = pass
            .channels
            .iter()
            .enumerate()
            .filter(|(_, resources)| {
                !pass
                    .members
                    .iter()
                    .any(|c| is_worker_for(c, resources.name(), ChannelRole::Sink))
            })
            .map(|(idx, _)| idx)
            .collect();

        let mut to_request: BTreeMap<(String, String), usize> = BTreeMap::new();
        let mut waiting = false;
        for &idx in &pending {
            let resources = &pass.channels[idx];
            match self.source_state(&pass.name, resources).await? {
                SourceState::Ready => {}
                SourceState::NotReady => waiting = true,
                SourceState::NotRequested => {
                    if let Some(reference) = &resources.source.reference {
                        to_request
                            .entry((reference.namespace.clone(), reference.cluster.clone()))
                            .or_insert(idx);
                    }
                }
            }
        }

        let total = pass.channel_total();
        let wait_for_building = pending.len() as u32;
        let phase = if wait_for_building == 0 {
            TopologyPhase::Running
        } else {
            TopologyPhase::Preparing
        };
        let stored = pass.topology.status.clone().unwrap_or_default();
        if stored.phase != Some(phase)
            || stored.channel_total != total
            || stored.channel_wait_for_building != wait_for_building
            || !stored.message.is_empty()
        {
            info!(
                %phase,
                total,
                established = total - wait_for_building,
                waiting = wait_for_building,
                "Updating channel counts"
            );
            self.write_status(
                pass,
                StatusPatch {
                    phase: Some(phase),
                    // Readiness has passed, so any message it left is stale.
                    message: Some(String::new()),
                    channel_total: Some(total),
                    channel_established: Some(total - wait_for_building),
                    channel_wait_for_building: Some(wait_for_building),
                },
            )
            .await?;
            return Ok(self.requeue_after_write());
        }

        if !to_request.is_empty() {
            for ((namespace, cluster), idx) in &to_request {
                let resources = &pass.channels[*idx];
                let Some(reconfigure) = resources
                    .source
                    .definition
                    .as_ref()
                    .and_then(|d| d.spec.source.kube_blocks.configure_requests.clone())
                else {
                    continue;
                };
                let ops = configure_request(&pass.name, cluster, resources.name(), reconfigure);
                let created = self.store.create_ops_request(namespace, &ops).await?;
                info!(
                    cluster = %cluster,
                    channel = %resources.name(),
                    ops = %created.name_any(),
                    "Requested source configuration"
                );
            }
            return Ok(self.requeue_after_write());
        }

        if waiting {
            debug!("Waiting for source configuration to finish");
            return Ok(Flow::Stop(Outcome::Requeue(self.settings.dependency_wait)));
        }

        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ClusterSpec;

    #[test]
    fn test_is_worker_for_matches_name_and_role() {
        let mut cluster = Cluster::new("t-c1-sink", ClusterSpec::default());
        cluster
            .annotations_mut()
            .insert(CHANNEL_NAME_ANNOTATION.to_string(), "c1".to_string());
        cluster
            .annotations_mut()
            .insert(CHANNEL_TYPE_ANNOTATION.to_string(), "sink".to_string());

        assert!(is_worker_for(&cluster, "c1", ChannelRole::Sink));
        assert!(!is_worker_for(&cluster, "c1", ChannelRole::Source));
        assert!(!is_worker_for(&cluster, "c2", ChannelRole::Sink));
    }

    #[test]
    fn test_configure_request_shape() {
        let ops = configure_request("topo", "mysql", "c1", serde_json::json!({"k": "v"}));
        assert_eq!(ops.metadata.generate_name.as_deref(), Some("mysql-"));
        assert!(ops.metadata.name.is_none());
        assert_eq!(ops.labels().get(TOPOLOGY_LABEL).map(String::as_str), Some("topo"));
        assert_eq!(ops.labels().get(APP_INSTANCE_LABEL).map(String::as_str), Some("mysql"));
        assert_eq!(
            ops.annotations().get(CHANNEL_NAME_ANNOTATION).map(String::as_str),
            Some("c1")
        );
        assert_eq!(ops.spec.ops_type, OpsType::Reconfiguring);
    }
}
