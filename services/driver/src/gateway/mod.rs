//! Provider gateway interface and implementations.
//!
//! The gateway is the only place the driver talks to the cloud provider:
//! - [`DigitalOceanGateway`]: the DigitalOcean REST API
//! - [`InMemoryGateway`]: a scripted in-process provider for tests and dev mode
//!
//! Gateways are bound to one access token and built per call through a
//! [`GatewayFactory`]; nothing is shared between calls.

mod digitalocean;
mod memory;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use doks_reconcile::{Interrupted, OpContext};
use doks_state::{AccessToken, ClusterState, NodePoolState};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kubeconfig::KubeConfig;

pub use digitalocean::{DigitalOceanFactory, DigitalOceanGateway};
pub use memory::InMemoryGateway;

/// Provider-side lifecycle state of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    Running,
    Provisioning,
    Degraded,
    Error,
    Deleted,
    Upgrading,
    Deleting,
    Invalid,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClusterStatus::Running => "running",
            ClusterStatus::Provisioning => "provisioning",
            ClusterStatus::Degraded => "degraded",
            ClusterStatus::Error => "error",
            ClusterStatus::Deleted => "deleted",
            ClusterStatus::Upgrading => "upgrading",
            ClusterStatus::Deleting => "deleting",
            ClusterStatus::Invalid => "invalid",
            ClusterStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Identifiers assigned by the provider on create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedCluster {
    pub cluster_id: String,
    pub node_pool_id: String,
}

/// Live view of a cluster. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSnapshot {
    pub id: String,
    pub name: String,
    pub status: ClusterStatus,
    pub version: String,
    pub tags: Vec<String>,
    pub auto_upgrade: bool,
    pub node_pool_ids: Vec<String>,
}

/// Live view of a node pool. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePoolSnapshot {
    pub id: String,
    pub name: String,
    pub size: String,
    pub count: u32,
    pub labels: BTreeMap<String, String>,
    pub auto_scale: bool,
    pub min_nodes: u32,
    pub max_nodes: u32,
}

impl NodePoolSnapshot {
    /// The live shape as a desired state, ready to be modified and submitted.
    pub fn to_desired(&self) -> NodePoolState {
        NodePoolState {
            name: self.name.clone(),
            size: self.size.clone(),
            count: self.count,
            labels: self.labels.clone(),
            auto_scale: Some(self.auto_scale),
            min_nodes: self.min_nodes,
            max_nodes: self.max_nodes,
        }
    }
}

/// Errors returned by gateway calls.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("provider API error ({status}): {message}")]
    Api {
        status: u16,
        id: String,
        message: String,
    },

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("failed to decode provider response: {0}")]
    Decode(String),

    #[error("access token is not a valid header value")]
    InvalidToken,

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound { .. })
    }

    /// Whether repeating the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Api { status, .. } => *status == 429 || *status >= 500,
            GatewayError::Network(_) | GatewayError::Interrupted(_) => true,
            _ => false,
        }
    }
}

/// The remote cluster-management API.
///
/// Every call takes an [`OpContext`]; an interrupted context aborts the call
/// with [`GatewayError::Interrupted`].
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Request a cluster with exactly one node pool. Returns once the provider
    /// accepts the request, before provisioning completes.
    async fn create_cluster(
        &self,
        ctx: &OpContext,
        cluster: &ClusterState,
        pool: &NodePoolState,
    ) -> Result<CreatedCluster, GatewayError>;

    /// Apply name, tags and auto-upgrade (when set) to an existing cluster.
    async fn update_cluster(
        &self,
        ctx: &OpContext,
        cluster_id: &str,
        cluster: &ClusterState,
    ) -> Result<(), GatewayError>;

    /// Request deletion. Acceptance does not imply completion.
    async fn delete_cluster(&self, ctx: &OpContext, cluster_id: &str) -> Result<(), GatewayError>;

    async fn get_cluster(
        &self,
        ctx: &OpContext,
        cluster_id: &str,
    ) -> Result<ClusterSnapshot, GatewayError>;

    async fn get_node_pool(
        &self,
        ctx: &OpContext,
        cluster_id: &str,
        pool_id: &str,
    ) -> Result<NodePoolSnapshot, GatewayError>;

    /// Submit a node pool shape. Autoscale bounds are sent only when
    /// autoscaling is enabled.
    async fn update_node_pool(
        &self,
        ctx: &OpContext,
        cluster_id: &str,
        pool_id: &str,
        desired: &NodePoolState,
    ) -> Result<(), GatewayError>;

    async fn get_kubernetes_cluster_version(
        &self,
        ctx: &OpContext,
        cluster_id: &str,
    ) -> Result<String, GatewayError> {
        self.get_cluster(ctx, cluster_id)
            .await
            .map(|cluster| cluster.version)
    }

    async fn upgrade_kubernetes_version(
        &self,
        ctx: &OpContext,
        cluster_id: &str,
        version: &str,
    ) -> Result<(), GatewayError>;

    /// Fetch the credentials bundle, retrying while it is not yet available.
    async fn get_kube_config(
        &self,
        ctx: &OpContext,
        cluster_id: &str,
    ) -> Result<KubeConfig, GatewayError>;
}

/// Builds a gateway bound to one access token.
pub trait GatewayFactory: Send + Sync {
    fn connect(&self, token: &AccessToken) -> Result<Arc<dyn ProviderGateway>, GatewayError>;
}

impl<F> GatewayFactory for F
where
    F: Fn(&AccessToken) -> Result<Arc<dyn ProviderGateway>, GatewayError> + Send + Sync,
{
    fn connect(&self, token: &AccessToken) -> Result<Arc<dyn ProviderGateway>, GatewayError> {
        self(token)
    }
}
