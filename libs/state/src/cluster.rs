//! Desired-state records and their extraction from the configuration bag.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::options::{parse_labels, DriverOptions};

/// Option keys, hyphenated form first.
pub mod keys {
    pub const TOKEN: &[&str] = &["token", "accessToken"];
    pub const DISPLAY_NAME: &[&str] = &["display-name", "displayName"];
    pub const NAME: &[&str] = &["name", "cluster-name", "clusterName"];
    pub const TAGS: &[&str] = &["tags"];
    pub const AUTO_UPGRADE: &[&str] = &["auto-upgraded", "autoUpgraded"];
    pub const REGION: &[&str] = &["region-slug", "regionSlug"];
    pub const VPC: &[&str] = &["vpc-id", "vpcID"];
    pub const VERSION: &[&str] = &["version-slug", "versionSlug"];
    pub const NODE_POOL_NAME: &[&str] = &["node-pool-name", "nodePoolName"];
    pub const NODE_POOL_SIZE: &[&str] = &["node-pool-size", "nodePoolSize"];
    pub const NODE_POOL_COUNT: &[&str] = &["node-pool-count", "nodePoolCount"];
    pub const NODE_POOL_AUTOSCALE: &[&str] = &["node-pool-autoscale", "nodePoolAutoscale"];
    pub const NODE_POOL_MIN: &[&str] = &["node-pool-min", "nodePoolMin"];
    pub const NODE_POOL_MAX: &[&str] = &["node-pool-max", "nodePoolMax"];
    pub const NODE_POOL_LABELS: &[&str] = &["node-pool-labels", "nodePoolLabels"];
}

/// Opaque provider access token.
///
/// Never serialized with the state document, and redacted from debug output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "AccessToken(<empty>)")
        } else {
            write!(f, "AccessToken(<redacted>)")
        }
    }
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// Desired cluster configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterState {
    /// Supplied per call; see [`crate::TOKEN_KEY`].
    #[serde(skip)]
    pub token: AccessToken,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    /// `None` leaves the provider's current value alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_upgrade: Option<bool>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region_slug: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vpc_id: String,

    /// Kubernetes version last requested for the cluster.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version_slug: String,
}

/// Desired node pool shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePoolState {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Machine size slug.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub size: String,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub count: u32,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_scale: Option<bool>,

    /// Only meaningful while autoscaling is enabled.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub min_nodes: u32,

    /// Only meaningful while autoscaling is enabled.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_nodes: u32,
}

impl NodePoolState {
    pub fn autoscale_enabled(&self) -> bool {
        self.auto_scale == Some(true)
    }
}

/// Everything the driver needs to manage an existing cluster on a later call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_pool_id: String,

    #[serde(default)]
    pub cluster: ClusterState,

    #[serde(default)]
    pub node_pool: NodePoolState,
}

fn non_negative(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// Resolve the configuration bag into desired cluster and node pool state.
///
/// Never fails: missing or blank options mean "not configured". Autoscale
/// bounds are read only when autoscaling is explicitly enabled.
pub fn states_from_options(options: &DriverOptions) -> (ClusterState, NodePoolState) {
    let cluster = ClusterState {
        token: AccessToken::new(options.string(keys::TOKEN)),
        display_name: options.string(keys::DISPLAY_NAME),
        name: options.string(keys::NAME),
        tags: options.strings(keys::TAGS).into_iter().collect(),
        auto_upgrade: options.tri_state(keys::AUTO_UPGRADE),
        region_slug: options.string(keys::REGION),
        vpc_id: options.string(keys::VPC),
        version_slug: options.string(keys::VERSION),
    };

    let auto_scale = options.tri_state(keys::NODE_POOL_AUTOSCALE);
    let (min_nodes, max_nodes) = if auto_scale == Some(true) {
        (
            non_negative(options.int(keys::NODE_POOL_MIN)),
            non_negative(options.int(keys::NODE_POOL_MAX)),
        )
    } else {
        (0, 0)
    };

    let node_pool = NodePoolState {
        name: options.string(keys::NODE_POOL_NAME),
        size: options.string(keys::NODE_POOL_SIZE),
        count: non_negative(options.int(keys::NODE_POOL_COUNT)),
        labels: parse_labels(options.strings(keys::NODE_POOL_LABELS)),
        auto_scale,
        min_nodes,
        max_nodes,
    };

    (cluster, node_pool)
}
