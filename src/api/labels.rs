//! Well-known label and annotation keys.
//!
//! The annotation keys double as the progress ledger: marked user clusters
//! and worker clusters carry enough metadata for every pass to recompute
//! what has already been built.

/// Topology membership label. Value is the topology name.
pub const TOPOLOGY_LABEL: &str = "datachannel.kubeblocks.io/topology-name";

/// Channel owning a worker cluster or configuration request.
pub const CHANNEL_NAME_ANNOTATION: &str = "datachannel.kubeblocks.io/channel-name";

/// Role of a worker cluster (`source` or `sink`).
pub const CHANNEL_TYPE_ANNOTATION: &str = "datachannel.kubeblocks.io/channel-type";

/// Channels using a user cluster as their source, comma joined.
pub const SOURCE_RELATION_ANNOTATION: &str = "datachannel.kubeblocks.io/source-channels";

/// Channels using a user cluster as their sink, comma joined.
pub const SINK_RELATION_ANNOTATION: &str = "datachannel.kubeblocks.io/sink-channels";

/// Derived worker settings, serialized as a JSON object.
pub const EXTRA_ENV_ANNOTATION: &str = "kubeblocks.io/extra-env";

/// Target cluster of an ops request.
pub const APP_INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

/// Cluster definition a channel definition belongs to.
pub const CLUSTER_DEFINITION_LABEL: &str = "clusterdefinition.kubeblocks.io/name";
