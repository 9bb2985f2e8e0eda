//! Reconciler error type.

use crate::expression::ExpressionError;
use crate::store::StoreError;

/// Result type for reconciliation.
pub type Result<T> = std::result::Result<T, ControllerError>;

/// Errors returned from a reconciliation pass.
///
/// Policy violations never surface here: they are written to the topology
/// status and the pass ends normally.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("topology {namespace}/{name} not found")]
    TopologyNotFound { namespace: String, name: String },

    #[error("channel {channel}: {message}")]
    Materialization { channel: String, message: String },

    #[error("failed to provision cluster {cluster}: {source}")]
    Provisioning {
        cluster: String,
        #[source]
        source: StoreError,
    },

    #[error("template error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ControllerError {
    pub fn materialization(channel: &str, message: impl Into<String>) -> Self {
        ControllerError::Materialization {
            channel: channel.to_string(),
            message: message.into(),
        }
    }

    /// Whether requeueing the object may resolve the error.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ControllerError::Serialization(_))
    }
}
