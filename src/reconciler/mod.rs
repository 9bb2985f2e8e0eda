//! Topology reconciliation pipeline.
//!
//! A pass gathers the topology and everything it references, then runs a
//! fixed sequence of steps. Each step either lets the pass continue or
//! stops it with an [`Outcome`]. Every step that writes to the store stops
//! the pass, so the next pass starts from a fresh read.
//!
//! ```text
//! gather -> await readiness -> validate -> configure dependencies
//!        -> plan builds -> execute plans
//! ```

mod dependency;
mod executor;
mod gather;
mod materialize;
mod plan;
mod readiness;
mod validation;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, info_span, Instrument};

use crate::api::{ChannelTopology, Cluster, StatusPatch, TopologyPhase};
use crate::config::ControllerConfig;
use crate::error::Result;
use crate::store::ResourceStore;

pub use dependency::is_worker_for;
pub use executor::{membership, Membership};
pub use gather::{apply_defaults, resolve_endpoint, ChannelResources, EndpointResources, ResolvedEndpoint};
pub use materialize::decode_secret_value;
pub use plan::{generate_plans, BuildingPlan};
pub use readiness::{wait_decision, WaitDecision};
pub use validation::pick_default;

/// What the caller should do once a pass ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing left to do until the topology or a dependent changes.
    Done,
    /// Run another pass after the delay.
    Requeue(Duration),
}

#[derive(Debug)]
pub(crate) enum Flow {
    Continue,
    Stop(Outcome),
}

/// Pipeline steps run after gathering, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    AwaitReadiness,
    Validate,
    ConfigureDependencies,
    PlanBuilds,
    ExecutePlans,
}

const PIPELINE: [Step; 5] = [
    Step::AwaitReadiness,
    Step::Validate,
    Step::ConfigureDependencies,
    Step::PlanBuilds,
    Step::ExecutePlans,
];

/// Tunables for a reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub default_prepare_ttl_minutes: u32,
    pub dependency_wait: Duration,
    pub requeue_after_write: Duration,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self::from(&ControllerConfig::default())
    }
}

impl From<&ControllerConfig> for ReconcileSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            default_prepare_ttl_minutes: config.default_prepare_ttl_minutes,
            dependency_wait: config.dependency_wait(),
            requeue_after_write: config.requeue_after_write(),
        }
    }
}

/// Working set of one pass. Rebuilt from the store every time.
#[derive(Debug)]
pub struct Pass {
    pub namespace: String,
    pub name: String,
    pub topology: ChannelTopology,
    pub channels: Vec<ChannelResources>,
    /// Clusters carrying this topology's label, read by the dependency step.
    pub members: Vec<Cluster>,
    pub plans: Vec<BuildingPlan>,
    pub now: DateTime<Utc>,
}

impl Pass {
    pub fn channel_total(&self) -> u32 {
        self.channels.len() as u32
    }
}

/// Drives a topology towards its declared channels.
#[derive(Clone)]
pub struct TopologyReconciler {
    store: Arc<dyn ResourceStore>,
    settings: ReconcileSettings,
}

impl TopologyReconciler {
    pub fn new(store: Arc<dyn ResourceStore>, settings: ReconcileSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    /// Run one pass for the named topology.
    pub async fn reconcile(&self, namespace: &str, name: &str, now: DateTime<Utc>) -> Result<Outcome> {
        let span = info_span!("reconcile", topology = %name, namespace = %namespace);
        async move {
            let mut pass = match self.gather(namespace, name, now).await? {
                gather::Gathered::Ready(pass) => pass,
                gather::Gathered::Stop(outcome) => return Ok(outcome),
            };

            for step in PIPELINE {
                match self.run_step(step, &mut pass).await? {
                    Flow::Continue => debug!(?step, "Step passed"),
                    Flow::Stop(outcome) => {
                        debug!(?step, ?outcome, "Pass stopped");
                        return Ok(outcome);
                    }
                }
            }

            debug!("Topology fully built");
            Ok(Outcome::Done)
        }
        .instrument(span)
        .await
    }

    async fn run_step(&self, step: Step, pass: &mut Pass) -> Result<Flow> {
        match step {
            Step::AwaitReadiness => self.await_readiness(pass).await,
            Step::Validate => self.validate(pass).await,
            Step::ConfigureDependencies => self.configure_dependencies(pass).await,
            Step::PlanBuilds => Ok(self.plan_builds(pass)),
            Step::ExecutePlans => self.execute_plans(pass).await,
        }
    }

    fn requeue_after_write(&self) -> Flow {
        Flow::Stop(Outcome::Requeue(self.settings.requeue_after_write))
    }

    async fn write_status(&self, pass: &Pass, patch: StatusPatch) -> Result<()> {
        self.store
            .patch_topology_status(&pass.namespace, &pass.name, &patch)
            .await?;
        Ok(())
    }

    /// Move the topology to `Failed`. Terminal: later passes stop at gather.
    async fn fail(&self, pass: &Pass, message: impl Into<String>) -> Result<Flow> {
        let message = message.into();
        info!(message = %message, "Topology failed");
        self.write_status(
            pass,
            StatusPatch::phase(TopologyPhase::Failed, message, pass.channel_total()),
        )
        .await?;
        Ok(Flow::Stop(Outcome::Done))
    }
}
