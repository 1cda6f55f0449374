//! Cluster record exchanged with the host.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// What the host knows about a cluster between calls.
///
/// The driver owns `metadata`; everything else is filled in for the host's
/// benefit after provisioning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub service_account_token: String,

    #[serde(default)]
    pub node_count: i64,

    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub root_ca_certificate: String,

    #[serde(default)]
    pub status: String,

    /// Opaque driver-private state, round-tripped by the host.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}
