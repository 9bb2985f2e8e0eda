//! Worker materialization.
//!
//! Turns one building plan into a `Cluster` ready for submission. Each stage
//! adds to the worker's extra settings, which are written as a single JSON
//! annotation at the end:
//!
//! 1. init: template from the channel definition, schedule overrides, naming
//! 2. owner reference to the topology
//! 3. account credentials for both ends
//! 4. service endpoints for both ends
//! 5. compiled sync-object expressions
//! 6. fixed and definition-supplied extra settings

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use kube::{Resource, ResourceExt};
use rand::Rng;
use tracing::{debug, error, warn};

use super::{BuildingPlan, ChannelResources, EndpointResources, Pass, TopologyReconciler};
use crate::api::labels::{
    CHANNEL_NAME_ANNOTATION, CHANNEL_TYPE_ANNOTATION, EXTRA_ENV_ANNOTATION, TOPOLOGY_LABEL,
};
use crate::api::{ChannelDefinition, ChannelRole, ChannelTopology, Cluster};
use crate::error::{ControllerError, Result};
use crate::expression::{compile_objects, substitute};
use crate::ledger::{env_name, ExtraSettings};

const CHANNEL_NAME_VAR: &str = "CHANNEL_NAME";
const TOPOLOGY_NAME_VAR: &str = "CHANNEL_TOPOLOGY_NAME";
const RANDOM_INT16_KEY: &str = "CHANNEL_RANDOM_INT16";
const CHANNEL_TYPE_KEY: &str = "CHANNEL_TYPE";
const UDF_PREFIX: &str = "UDF_";

/// Secret values are stored raw or base64-encoded a second time.
pub fn decode_secret_value(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw).trim().to_string();
    match STANDARD.decode(text.as_bytes()) {
        Ok(bytes) => String::from_utf8(bytes).unwrap_or(text),
        Err(_) => text,
    }
}

struct WorkerBuild<'a> {
    pass: &'a Pass,
    resources: &'a ChannelResources,
    /// Source side whose service the worker connects to, possibly borrowed
    /// from a reused channel.
    source_endpoint: &'a EndpointResources,
    role: ChannelRole,
    definition: &'a ChannelDefinition,
    vars: BTreeMap<String, String>,
    cluster: Cluster,
    settings: ExtraSettings,
}

impl<'a> WorkerBuild<'a> {
    fn init(
        pass: &'a Pass,
        resources: &'a ChannelResources,
        reused: Option<&'a ChannelResources>,
        role: ChannelRole,
    ) -> Result<Self> {
        let channel = resources.name();
        let definition = resources.side(role).definition.as_ref().ok_or_else(|| {
            ControllerError::materialization(channel, format!("{} channel definition is not resolved", role))
        })?;
        let mut spec = definition
            .spec
            .worker(role)
            .kube_blocks
            .worker
            .clone()
            .ok_or_else(|| {
                ControllerError::materialization(
                    channel,
                    format!(
                        "channel definition [{}] declares no {} worker",
                        definition.name_any(),
                        role
                    ),
                )
            })?;

        let schedule = &pass.topology.spec.settings.schedule;
        if let Some(affinity) = &schedule.affinity {
            spec.affinity = Some(affinity.clone());
        }
        if !schedule.tolerations.is_empty() {
            spec.tolerations = schedule.tolerations.clone();
        }

        let name = format!("{}-{}-{}", pass.name, channel, role);
        let mut cluster = Cluster::new(&name, spec);
        cluster.metadata.namespace = Some(pass.namespace.clone());
        cluster
            .labels_mut()
            .insert(TOPOLOGY_LABEL.to_string(), pass.name.clone());
        let annotations = cluster.annotations_mut();
        annotations.insert(CHANNEL_NAME_ANNOTATION.to_string(), channel.to_string());
        annotations.insert(CHANNEL_TYPE_ANNOTATION.to_string(), role.as_str().to_string());

        let mut settings = ExtraSettings::new();
        settings.insert(CHANNEL_TYPE_KEY, role.as_str());

        let vars = BTreeMap::from([
            (CHANNEL_NAME_VAR.to_string(), channel.to_string()),
            (TOPOLOGY_NAME_VAR.to_string(), pass.name.clone()),
        ]);

        Ok(Self {
            pass,
            resources,
            source_endpoint: reused.map(|r| &r.source).unwrap_or(&resources.source),
            role,
            definition,
            vars,
            cluster,
            settings,
        })
    }

    fn channel(&self) -> &str {
        self.resources.name()
    }

    fn ends(&self) -> [(ChannelRole, &'a EndpointResources); 2] {
        [
            (ChannelRole::Source, &self.resources.source),
            (ChannelRole::Sink, &self.resources.sink),
        ]
    }

    fn endpoints(&self) -> [(ChannelRole, &'a EndpointResources); 2] {
        [
            (ChannelRole::Source, self.source_endpoint),
            (ChannelRole::Sink, &self.resources.sink),
        ]
    }

    fn with_owner_reference(&mut self, topology: &ChannelTopology) {
        match topology.controller_owner_ref(&()) {
            Some(owner) => self.cluster.metadata.owner_references = Some(vec![owner]),
            None => error!(
                channel = %self.channel(),
                "Topology has no uid, worker is created without an owner"
            ),
        }
    }

    async fn with_accounts(&mut self, reconciler: &TopologyReconciler) {
        for (role, side) in self.ends() {
            let (user, password) = reconciler.account_credentials(side, role).await;
            self.settings
                .insert(&format!("{}_USER", role.env_prefix()), user);
            self.settings
                .insert(&format!("{}_PASSWORD", role.env_prefix()), password);
        }
    }

    fn with_endpoints(&mut self) {
        for (role, side) in self.endpoints() {
            let (Some(reference), Some(definition)) = (&side.reference, &side.definition) else {
                continue;
            };
            let expose = &definition.spec.kube_blocks.expose;
            let component = expose.component_def_ref.as_deref().filter(|c| !c.is_empty());
            let port = expose.service.as_ref().and_then(|s| s.port);
            let (Some(component), Some(port)) = (component, port) else {
                debug!(cluster = %reference.cluster, %role, "Definition exposes no service");
                continue;
            };
            self.settings.insert(
                &format!("{}_HOSTNAME", role.env_prefix()),
                format!("{}-{}", reference.cluster, component),
            );
            self.settings
                .insert(&format!("{}_PORT", role.env_prefix()), port.to_string());
        }
    }

    fn with_sync_objects(&mut self) -> Result<()> {
        let is_source = self.role == ChannelRole::Source;
        for expression in &self.definition.spec.worker(self.role).sync_obj_env_express {
            if expression.is_empty() {
                continue;
            }
            let mut expression = expression.clone();
            expression.prefix = substitute(&expression.prefix, &self.vars)?;
            expression.suffix = substitute(&expression.suffix, &self.vars)?;

            let compiled =
                compile_objects(&expression, &self.resources.channel.include_objs, is_source);
            if !compiled.is_empty() {
                self.settings
                    .insert(&format!("{}{}", UDF_PREFIX, env_name(&expression.name)), compiled);
            }
        }
        Ok(())
    }

    fn with_extra_settings(&mut self) {
        self.settings.insert(TOPOLOGY_NAME_VAR, self.pass.name.as_str());
        self.settings.insert(CHANNEL_NAME_VAR, self.resources.name());
        let random: u16 = rand::rng().random_range(1..=u16::MAX);
        self.settings.insert(RANDOM_INT16_KEY, random.to_string());

        for (key, raw) in &self.definition.spec.worker(self.role).kube_blocks.extra_envs {
            let value = substitute(raw, &self.vars).unwrap_or_else(|err| {
                warn!(key = %key, error = %err, "Keeping extra setting unsubstituted");
                raw.clone()
            });
            self.settings.insert(key, value);
        }
    }

    fn finish(mut self) -> Result<Cluster> {
        let settings = self.settings.to_json()?;
        self.cluster
            .annotations_mut()
            .insert(EXTRA_ENV_ANNOTATION.to_string(), settings);
        Ok(self.cluster)
    }
}

impl TopologyReconciler {
    /// Build the worker cluster for one plan. Nothing is written.
    pub(super) async fn materialize(&self, pass: &Pass, plan: BuildingPlan) -> Result<Cluster> {
        let resources = pass.channels.get(plan.channel).ok_or_else(|| {
            ControllerError::materialization("", format!("no channel at index {}", plan.channel))
        })?;
        let reused = plan.reused.and_then(|idx| pass.channels.get(idx));

        let mut build = WorkerBuild::init(pass, resources, reused, plan.role)?;
        build.with_owner_reference(&pass.topology);
        build.with_accounts(self).await;
        build.with_endpoints();
        build.with_sync_objects()?;
        build.with_extra_settings();
        build.finish()
    }

    /// User and password for one end. Lookup failures degrade to empty values.
    async fn account_credentials(
        &self,
        side: &EndpointResources,
        role: ChannelRole,
    ) -> (String, String) {
        let (Some(reference), Some(definition)) = (&side.reference, &side.definition) else {
            return Default::default();
        };
        let Some(account) = &definition.spec.worker(role).kube_blocks.account_requests else {
            return Default::default();
        };

        let secret_name = format!(
            "{}-{}-{}",
            reference.cluster, account.component_name, account.account_name
        );
        let secret = match self.store.get_secret(&reference.namespace, &secret_name).await {
            Ok(Some(secret)) => secret,
            Ok(None) => {
                warn!(secret = %secret_name, namespace = %reference.namespace, "Account secret not found");
                return Default::default();
            }
            Err(err) => {
                error!(secret = %secret_name, error = %err, "Failed to read account secret");
                return Default::default();
            }
        };

        let data = secret.data.unwrap_or_default();
        let value = |key: &str| {
            data.get(key)
                .map(|bytes| decode_secret_value(&bytes.0))
                .unwrap_or_default()
        };
        (value("username"), value("password"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_secret_value_raw() {
        assert_eq!(decode_secret_value(b"admin"), "admin");
        assert_eq!(decode_secret_value(b"root"), "root");
    }

    #[test]
    fn test_decode_secret_value_double_encoded() {
        assert_eq!(decode_secret_value(b"cm9vdA=="), "root");
        assert_eq!(decode_secret_value(b"  cm9vdA==\n"), "root");
    }

    #[test]
    fn test_decode_secret_value_non_utf8_decoding_keeps_raw() {
        // "abcd" is valid base64 but decodes to bytes that are not UTF-8.
        assert_eq!(decode_secret_value(b"abcd"), "abcd");
    }
}
