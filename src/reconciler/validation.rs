//! Channel definition resolution and topology policy checks.

use kube::ResourceExt;
use tracing::{debug, warn};

use super::{EndpointResources, Flow, Pass, TopologyReconciler};
use crate::api::labels::CLUSTER_DEFINITION_LABEL;
use crate::api::{ChannelDefinition, ChannelRole};
use crate::error::Result;
use crate::graph::validate_channels;
use crate::store::labels;

/// Pick the default definition among candidates for one cluster definition.
///
/// The `isDefault` candidate with the smallest name wins.
pub fn pick_default(candidates: &[ChannelDefinition]) -> Option<&ChannelDefinition> {
    let mut defaults: Vec<&ChannelDefinition> =
        candidates.iter().filter(|d| d.spec.is_default).collect();
    defaults.sort_by_key(|d| d.name_any());
    if defaults.len() > 1 {
        warn!(
            candidates = ?defaults.iter().map(|d| d.name_any()).collect::<Vec<_>>(),
            "Several channel definitions are marked default"
        );
    }
    defaults.into_iter().next()
}

enum Resolution {
    Found(Box<ChannelDefinition>),
    Empty { requested: String },
}

impl TopologyReconciler {
    async fn resolve_definition(&self, side: &EndpointResources) -> Result<Resolution> {
        if let Some(explicit) = side.reference.as_ref().and_then(|r| r.definition.clone()) {
            return Ok(match self.store.get_channel_definition(&explicit).await? {
                Some(definition) => Resolution::Found(Box::new(definition)),
                None => Resolution::Empty { requested: explicit },
            });
        }

        let requested = "default".to_string();
        let Some(cluster_definition) = side
            .cluster
            .as_ref()
            .map(|c| c.spec.cluster_definition_ref.clone())
            .filter(|d| !d.is_empty())
        else {
            return Ok(Resolution::Empty { requested });
        };

        let candidates = self
            .store
            .list_channel_definitions(&labels([(
                CLUSTER_DEFINITION_LABEL,
                cluster_definition.as_str(),
            )]))
            .await?;
        Ok(match pick_default(&candidates) {
            Some(definition) => Resolution::Found(Box::new(definition.clone())),
            None => Resolution::Empty { requested },
        })
    }

    pub(super) async fn validate(&self, pass: &mut Pass) -> Result<Flow> {
        for idx in 0..pass.channels.len() {
            for role in [ChannelRole::Source, ChannelRole::Sink] {
                let side = pass.channels[idx].side(role);
                match self.resolve_definition(side).await? {
                    Resolution::Found(definition) => {
                        debug!(
                            channel = %pass.channels[idx].name(),
                            %role,
                            definition = %definition.name_any(),
                            "Resolved channel definition"
                        );
                        pass.channels[idx].side_mut(role).definition = Some(*definition);
                    }
                    Resolution::Empty { requested } => {
                        let message = format!(
                            "Cluster:[{}] has no channel-definition:[{}] in Topology:[{}].",
                            side.display_name(),
                            requested,
                            pass.name
                        );
                        return self.fail(pass, message).await;
                    }
                }
            }
        }

        let discipline = pass.topology.spec.settings.topology.discipline();
        let mut violations = Vec::new();
        for resources in &pass.channels {
            let supported = resources
                .source
                .definition
                .as_ref()
                .map(|d| d.spec.supports(discipline))
                .unwrap_or(false);
            if !supported {
                violations.push(format!(
                    "cluster:[{}] channel definition is not support Topology-struct:[{}].",
                    resources.source.display_name(),
                    discipline
                ));
            }
        }

        let verdict = validate_channels(&pass.topology.spec.channels, discipline, &pass.namespace);
        if !verdict.valid {
            violations.push(verdict.message);
        }

        if violations.is_empty() {
            Ok(Flow::Continue)
        } else {
            self.fail(pass, violations.join(";")).await
        }
    }
}
