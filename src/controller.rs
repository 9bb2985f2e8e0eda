//! Kubernetes controller wiring.
//!
//! Watches `ChannelTopology` objects and the clusters and ops requests
//! labelled for them. A change to a labelled dependent re-triggers its
//! topology. `kube::runtime` serializes passes per object.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::StreamExt;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::{Api, Client, Resource, ResourceExt};
use tracing::{debug, error, info, warn};

use crate::api::labels::TOPOLOGY_LABEL;
use crate::api::{ChannelTopology, Cluster, OpsRequest};
use crate::config::Config;
use crate::error::{ControllerError, Result};
use crate::reconciler::{Outcome, ReconcileSettings, TopologyReconciler};
use crate::store::{KubeStore, ResourceStore};
use crate::utils::retry::RetryConfig;

/// Shared state handed to every reconciliation.
pub struct Context {
    reconciler: TopologyReconciler,
    retry: RetryConfig,
    /// Consecutive failed passes per topology, keyed `namespace/name`.
    failures: Mutex<HashMap<String, u32>>,
}

impl Context {
    pub fn new(reconciler: TopologyReconciler, retry: RetryConfig) -> Self {
        Self {
            reconciler,
            retry,
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn counters(&self) -> std::sync::MutexGuard<'_, HashMap<String, u32>> {
        self.failures.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count a failure and return the attempt index it starts from.
    pub fn record_failure(&self, key: &str) -> u32 {
        let mut counters = self.counters();
        let count = counters.entry(key.to_string()).or_insert(0);
        let attempt = *count;
        *count += 1;
        attempt
    }

    pub fn clear_failures(&self, key: &str) {
        self.counters().remove(key);
    }

    pub fn failures(&self, key: &str) -> u32 {
        self.counters().get(key).copied().unwrap_or(0)
    }
}

fn object_key(topology: &ChannelTopology) -> String {
    format!(
        "{}/{}",
        topology.namespace().unwrap_or_default(),
        topology.name_any()
    )
}

pub fn to_action(outcome: Outcome) -> Action {
    match outcome {
        Outcome::Done => Action::await_change(),
        Outcome::Requeue(delay) => Action::requeue(delay),
    }
}

/// Topology a dependent object is labelled for, in the dependent's namespace.
pub fn topology_of<K: Resource>(object: K) -> Option<ObjectRef<ChannelTopology>> {
    let topology = object.labels().get(TOPOLOGY_LABEL)?;
    let namespace = object.namespace()?;
    Some(ObjectRef::new(topology).within(&namespace))
}

pub async fn reconcile(topology: Arc<ChannelTopology>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = topology.namespace().unwrap_or_default();
    let name = topology.name_any();
    let outcome = ctx.reconciler.reconcile(&namespace, &name, Utc::now()).await?;
    ctx.clear_failures(&object_key(&topology));
    Ok(to_action(outcome))
}

pub fn error_policy(topology: Arc<ChannelTopology>, err: &ControllerError, ctx: Arc<Context>) -> Action {
    let key = object_key(&topology);

    if !err.is_retryable() {
        error!(topology = %key, error = %err, "Reconciliation failed permanently");
        ctx.clear_failures(&key);
        return Action::await_change();
    }

    let attempt = ctx.record_failure(&key);
    if !ctx.retry.should_retry(attempt) {
        error!(
            topology = %key,
            error = %err,
            attempts = attempt,
            "Retry budget exhausted, waiting for the next change"
        );
        ctx.clear_failures(&key);
        return Action::await_change();
    }

    let delay = ctx.retry.delay_for_attempt(attempt);
    warn!(
        topology = %key,
        error = %err,
        attempt = attempt + 1,
        delay = ?delay,
        "Reconciliation failed, requeueing"
    );
    Action::requeue(delay)
}

/// Run the controller until a shutdown signal arrives.
pub async fn run(client: Client, config: &Config) {
    let namespace = config.controller.namespace.as_deref();
    let (topologies, clusters, ops_requests): (
        Api<ChannelTopology>,
        Api<Cluster>,
        Api<OpsRequest>,
    ) = match namespace {
        Some(ns) => (
            Api::namespaced(client.clone(), ns),
            Api::namespaced(client.clone(), ns),
            Api::namespaced(client.clone(), ns),
        ),
        None => (
            Api::all(client.clone()),
            Api::all(client.clone()),
            Api::all(client.clone()),
        ),
    };

    let store: Arc<dyn ResourceStore> = Arc::new(KubeStore::new(client));
    let reconciler = TopologyReconciler::new(store, ReconcileSettings::from(&config.controller));
    let ctx = Arc::new(Context::new(reconciler, RetryConfig::from(&config.retry)));

    info!(namespace = ?namespace, "Starting channel topology controller");

    let dependents = || watcher::Config::default().labels(TOPOLOGY_LABEL);
    Controller::new(topologies, watcher::Config::default())
        .watches(clusters, dependents(), topology_of::<Cluster>)
        .watches(ops_requests, dependents(), topology_of::<OpsRequest>)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, action)) => {
                    debug!(topology = %object.name, ?action, "Reconciled")
                }
                Err(err) => warn!(error = %err, "Reconcile stream error"),
            }
        })
        .await;

    info!("Controller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::api::{ChannelTopologySpec, ClusterSpec};
    use crate::config::RetrySettings;
    use crate::store::{MockStore, StoreError};

    fn context(max_retries: u32) -> Arc<Context> {
        let reconciler = TopologyReconciler::new(
            Arc::new(MockStore::new()),
            ReconcileSettings::default(),
        );
        let retry = RetryConfig::from(&RetrySettings {
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            max_retries,
            jitter: 0.0,
        });
        Arc::new(Context::new(reconciler, retry))
    }

    fn topology() -> Arc<ChannelTopology> {
        let mut topology = ChannelTopology::new("orders", ChannelTopologySpec::default());
        topology.metadata.namespace = Some("data".to_string());
        Arc::new(topology)
    }

    fn unavailable() -> ControllerError {
        ControllerError::Store(StoreError::Unavailable("connection reset".to_string()))
    }

    #[test]
    fn test_to_action() {
        assert_eq!(to_action(Outcome::Done), Action::await_change());
        assert_eq!(
            to_action(Outcome::Requeue(Duration::from_secs(5))),
            Action::requeue(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_topology_of_uses_label_and_namespace() {
        let mut cluster = Cluster::new("orders-c1-sink", ClusterSpec::default());
        assert!(topology_of(cluster.clone()).is_none());

        cluster
            .labels_mut()
            .insert(TOPOLOGY_LABEL.to_string(), "orders".to_string());
        assert!(topology_of(cluster.clone()).is_none());

        cluster.metadata.namespace = Some("data".to_string());
        assert_eq!(
            topology_of(cluster),
            Some(ObjectRef::new("orders").within("data"))
        );
    }

    #[test]
    fn test_error_policy_backs_off() {
        let ctx = context(3);
        let err = unavailable();

        assert_eq!(
            error_policy(topology(), &err, ctx.clone()),
            Action::requeue(Duration::from_millis(100))
        );
        assert_eq!(
            error_policy(topology(), &err, ctx.clone()),
            Action::requeue(Duration::from_millis(200))
        );
        assert_eq!(ctx.failures("data/orders"), 2);
    }

    #[test]
    fn test_error_policy_stops_after_budget() {
        let ctx = context(1);
        let err = unavailable();

        assert_eq!(
            error_policy(topology(), &err, ctx.clone()),
            Action::requeue(Duration::from_millis(100))
        );
        assert_eq!(error_policy(topology(), &err, ctx.clone()), Action::await_change());
        assert_eq!(ctx.failures("data/orders"), 0);
    }

    #[test]
    fn test_error_policy_does_not_retry_serialization() {
        let ctx = context(3);
        let err = ControllerError::Serialization(
            serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
        );
        assert_eq!(error_policy(topology(), &err, ctx.clone()), Action::await_change());
        assert_eq!(ctx.failures("data/orders"), 0);
    }

    #[tokio::test]
    async fn test_reconcile_missing_topology_errors() {
        let ctx = context(3);
        let err = reconcile(topology(), ctx).await.unwrap_err();
        assert!(matches!(err, ControllerError::TopologyNotFound { .. }));
    }
}
