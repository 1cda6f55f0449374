//! Driver error taxonomy.

use doks_reconcile::{Interrupted, WaitError};
use doks_state::StateError;
use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors returned by driver operations.
///
/// Every variant names the operation and the identifiers involved, so a host
/// log line is enough to diagnose a failure without re-running it.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The host's configuration is unusable for this call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Persisted state is missing, corrupt, or from an unsupported schema.
    #[error(transparent)]
    State(#[from] StateError),

    /// The provider rejected or failed a call.
    #[error("{operation} failed for {resource}: {source}")]
    Provider {
        operation: &'static str,
        resource: String,
        #[source]
        source: GatewayError,
    },

    /// The cluster entered an error status while being waited on.
    #[error("{operation} failed: {resource} entered status {status}")]
    TerminalFailure {
        operation: &'static str,
        resource: String,
        status: String,
    },

    /// The call was cancelled or ran out of time.
    #[error("{operation} stopped for {resource}: {source}")]
    Interrupted {
        operation: &'static str,
        resource: String,
        #[source]
        source: Interrupted,
    },

    /// The provider accepted the cluster but its state could not be saved.
    #[error(
        "cluster {cluster_id} (node pool {node_pool_id}) was created but its state could not be saved: {source}"
    )]
    Orphaned {
        cluster_id: String,
        node_pool_id: String,
        #[source]
        source: StateError,
    },

    #[error("the kubeconfig file for cluster {cluster_id} is invalid. Cluster not found")]
    KubeConfigMissingCluster { cluster_id: String },

    #[error("the kubeconfig file for cluster {cluster_id} is invalid. Token not found")]
    KubeConfigMissingUser { cluster_id: String },

    /// Permanently unsupported; no work is attempted.
    #[error("{0} operations are not implemented")]
    NotImplemented(&'static str),
}

impl DriverError {
    /// Wrap a gateway failure, keeping interruption distinct from provider errors.
    pub fn provider(
        operation: &'static str,
        resource: impl Into<String>,
        source: GatewayError,
    ) -> Self {
        match source {
            GatewayError::Interrupted(source) => Self::Interrupted {
                operation,
                resource: resource.into(),
                source,
            },
            source => Self::Provider {
                operation,
                resource: resource.into(),
                source,
            },
        }
    }

    pub fn from_wait(operation: &'static str, err: WaitError<GatewayError>) -> Self {
        match err {
            WaitError::Failed { resource, status } => Self::TerminalFailure {
                operation,
                resource,
                status,
            },
            WaitError::Fetch { resource, source } => Self::provider(operation, resource, source),
            WaitError::Interrupted { resource, source } => Self::Interrupted {
                operation,
                resource,
                source,
            },
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::State(StateError::Missing { .. }) => "state_missing",
            Self::State(StateError::UnsupportedSchema { .. }) => "state_unsupported_schema",
            Self::State(_) => "state_corrupt",
            Self::Provider { .. } => "provider_error",
            Self::TerminalFailure { .. } => "provider_terminal_failure",
            Self::Interrupted {
                source: Interrupted::DeadlineExceeded,
                ..
            } => "deadline_exceeded",
            Self::Interrupted { .. } => "cancelled",
            Self::Orphaned { .. } => "cluster_orphaned",
            Self::KubeConfigMissingCluster { .. } => "kubeconfig_missing_cluster",
            Self::KubeConfigMissingUser { .. } => "kubeconfig_missing_user",
            Self::NotImplemented(_) => "not_implemented",
        }
    }

    /// Whether the host may repeat the call unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Interrupted { .. } => true,
            Self::Provider { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupted_gateway_error_is_not_a_provider_error() {
        let err = DriverError::provider(
            "Remove",
            "cluster c1",
            GatewayError::Interrupted(Interrupted::Cancelled),
        );

        assert!(matches!(err, DriverError::Interrupted { .. }));
        assert_eq!(err.code(), "cancelled");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_wait_failure_maps_to_terminal_failure() {
        let err = DriverError::from_wait(
            "Create",
            WaitError::Failed {
                resource: "cluster c1".into(),
                status: "error".into(),
            },
        );

        assert_eq!(
            err.to_string(),
            "Create failed: cluster c1 entered status error"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_etcd_message() {
        assert_eq!(
            DriverError::NotImplemented("etcd backup").to_string(),
            "etcd backup operations are not implemented"
        );
    }
}
