//! Driver option schema and capability records reported to the host.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlagType {
    String,
    Bool,
    Int,
    StringSlice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    #[serde(rename = "type")]
    pub kind: FlagType,
    pub usage: String,
}

/// Option name to flag description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverFlags {
    pub options: BTreeMap<String, Flag>,
}

impl DriverFlags {
    fn with(mut self, name: &str, kind: FlagType, usage: &str) -> Self {
        self.options.insert(
            name.to_string(),
            Flag {
                kind,
                usage: usage.to_string(),
            },
        );
        self
    }

    /// Options accepted when creating a cluster.
    pub fn create() -> Self {
        Self::default()
            .with("token", FlagType::String, "DigitalOcean API access token")
            .with(
                "display-name",
                FlagType::String,
                "The displayed name of the cluster in the host UI",
            )
            .with("name", FlagType::String, "Name of the cluster at DigitalOcean")
            .with("tags", FlagType::StringSlice, "Optional tags for the cluster")
            .with(
                "auto-upgraded",
                FlagType::Bool,
                "Automatically upgrade to new Kubernetes patch releases",
            )
            .with(
                "region-slug",
                FlagType::String,
                "Region the cluster is created in",
            )
            .with("vpc-id", FlagType::String, "VPC the cluster is attached to")
            .with("version-slug", FlagType::String, "Kubernetes version")
            .with("node-pool-name", FlagType::String, "Name of the worker node pool")
            .with(
                "node-pool-size",
                FlagType::String,
                "Machine size slug of the worker nodes",
            )
            .with(
                "node-pool-count",
                FlagType::Int,
                "The desired number of worker nodes",
            )
            .with(
                "node-pool-autoscale",
                FlagType::Bool,
                "Let the provider scale the node pool",
            )
            .with(
                "node-pool-min",
                FlagType::Int,
                "Minimum number of worker nodes when autoscaling",
            )
            .with(
                "node-pool-max",
                FlagType::Int,
                "Maximum number of worker nodes when autoscaling",
            )
            .with(
                "node-pool-labels",
                FlagType::StringSlice,
                "Worker node labels as key=value",
            )
    }

    /// Options accepted when updating an existing cluster.
    pub fn update() -> Self {
        Self::default()
            .with("token", FlagType::String, "DigitalOcean API access token")
            .with("tags", FlagType::StringSlice, "Replace the cluster tags")
            .with(
                "auto-upgraded",
                FlagType::Bool,
                "Automatically upgrade to new Kubernetes patch releases",
            )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    GetVersion,
    SetVersion,
    GetClusterSize,
    SetClusterSize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub capabilities: Vec<Capability>,
}

impl Capabilities {
    pub fn add(&mut self, capability: Capability) {
        if !self.has(capability) {
            self.capabilities.push(capability);
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Kubernetes-level capabilities. The driver advertises none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct K8sCapabilities {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub load_balancer_providers: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingress_providers: Vec<String>,
}

#[cfg(test)]
mod tests {
    use doks_state::keys;

    use super::*;

    #[test]
    fn test_create_flags_use_recognised_keys() {
        let flags = DriverFlags::create();

        let recognised = [
            keys::TOKEN,
            keys::DISPLAY_NAME,
            keys::NAME,
            keys::TAGS,
            keys::AUTO_UPGRADE,
            keys::REGION,
            keys::VPC,
            keys::VERSION,
            keys::NODE_POOL_NAME,
            keys::NODE_POOL_SIZE,
            keys::NODE_POOL_COUNT,
            keys::NODE_POOL_AUTOSCALE,
            keys::NODE_POOL_MIN,
            keys::NODE_POOL_MAX,
            keys::NODE_POOL_LABELS,
        ];
        for names in recognised {
            assert!(flags.options.contains_key(names[0]), "missing {}", names[0]);
        }
        assert_eq!(flags.options.len(), recognised.len());
    }

    #[test]
    fn test_flag_wire_format() {
        let json = serde_json::to_value(DriverFlags::update()).unwrap();
        assert_eq!(json["options"]["tags"]["type"], "stringSlice");
        assert_eq!(json["options"]["auto-upgraded"]["type"], "bool");
    }

    #[test]
    fn test_capabilities_deduplicate() {
        let mut caps = Capabilities::default();
        caps.add(Capability::GetVersion);
        caps.add(Capability::GetVersion);
        assert_eq!(caps.capabilities.len(), 1);
        assert!(caps.has(Capability::GetVersion));
        assert!(!caps.has(Capability::SetClusterSize));
    }
}
