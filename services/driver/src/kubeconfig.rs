//! Kubeconfig credentials bundle.

use serde::{Deserialize, Serialize};

use crate::gateway::GatewayError;

/// The subset of a kubeconfig file the driver reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeConfig {
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,

    #[serde(default)]
    pub users: Vec<NamedUser>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCluster {
    #[serde(default)]
    pub name: String,
    pub cluster: ClusterEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEntry {
    #[serde(default)]
    pub server: String,

    /// Base64-encoded CA bundle, passed through as is.
    #[serde(default, rename = "certificate-authority-data")]
    pub certificate_authority_data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedUser {
    #[serde(default)]
    pub name: String,
    pub user: UserEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    #[serde(default)]
    pub token: String,
}

impl KubeConfig {
    pub fn from_yaml(raw: &str) -> Result<Self, GatewayError> {
        serde_yaml_ng::from_str(raw)
            .map_err(|e| GatewayError::Decode(format!("invalid kubeconfig: {e}")))
    }

    pub fn first_cluster(&self) -> Option<&ClusterEntry> {
        self.clusters.first().map(|c| &c.cluster)
    }

    pub fn first_user(&self) -> Option<&UserEntry> {
        self.users.first().map(|u| &u.user)
    }
}
