//! Readiness gate: wait for every referenced cluster to be running.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::info;

use super::{ChannelResources, Flow, Outcome, Pass, TopologyReconciler};
use crate::api::{StatusPatch, TopologyPhase};
use crate::error::Result;

/// What to do while dependencies are not ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitDecision {
    /// The prepare window has elapsed.
    Fail,
    /// Enter `Preparing` before waiting.
    MarkPreparing,
    /// Already preparing; check again later.
    Retry,
}

/// Decide how to wait. The window starts at the topology's creation.
pub fn wait_decision(
    phase: Option<TopologyPhase>,
    created: Option<DateTime<Utc>>,
    ttl_minutes: u32,
    now: DateTime<Utc>,
) -> WaitDecision {
    let preparing = phase == Some(TopologyPhase::Preparing);
    let expired = created
        .map(|created| created + ChronoDuration::minutes(i64::from(ttl_minutes)) < now)
        .unwrap_or(false);

    if preparing && expired {
        WaitDecision::Fail
    } else if !preparing {
        WaitDecision::MarkPreparing
    } else {
        WaitDecision::Retry
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

/// Diagnostic for the first unmet dependency, if any.
pub(crate) fn readiness_message(channels: &[ChannelResources]) -> Option<String> {
    let mut missing = Vec::new();
    let mut unready = Vec::new();
    for resources in channels {
        for side in [&resources.source, &resources.sink] {
            match &side.cluster {
                None => push_unique(&mut missing, side.display_name()),
                Some(cluster) if !cluster.is_running() => {
                    push_unique(&mut unready, side.display_name())
                }
                Some(_) => {}
            }
        }
    }

    if !missing.is_empty() {
        Some(format!("cluster:[{}] not existed yet.", missing.join(",")))
    } else if !unready.is_empty() {
        Some(format!("cluster:[{}] not ready yet.", unready.join(",")))
    } else {
        None
    }
}

impl TopologyReconciler {
    pub(super) async fn await_readiness(&self, pass: &mut Pass) -> Result<Flow> {
        let Some(message) = readiness_message(&pass.channels) else {
            return Ok(Flow::Continue);
        };

        let ttl = pass.topology.spec.settings.topology.prepare_ttl_minutes;
        let created = pass.topology.metadata.creation_timestamp.as_ref().map(|t| t.0);
        match wait_decision(pass.topology.phase(), created, ttl, pass.now) {
            WaitDecision::Fail => {
                self.fail(
                    pass,
                    format!("{} Prepare TTL of {} minutes exceeded.", message, ttl),
                )
                .await
            }
            WaitDecision::MarkPreparing => {
                info!(message = %message, "Waiting for clusters");
                self.write_status(
                    pass,
                    StatusPatch::phase(TopologyPhase::Preparing, message, pass.channel_total()),
                )
                .await?;
                Ok(self.requeue_after_write())
            }
            WaitDecision::Retry => Ok(Flow::Stop(Outcome::Requeue(
                self.settings.dependency_wait,
            ))),
        }
    }
}
