//! Versioned persisted-state document.
//!
//! The document is stored under [`STATE_KEY`] and always carries a
//! `schema_version` discriminant. Older versions are migrated forward
//! explicitly; the shape is never guessed from field presence.
//!
//! | Version | Shape |
//! |---|---|
//! | 1 | combined: cluster fields at the top level, `node_pool` nested, plain booleans, embedded token |
//! | 2 | split: `cluster` and `node_pool` objects, tri-state booleans, no token |

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cluster::{AccessToken, ClusterState, NodePoolState, PersistedState};
use crate::error::StateError;

/// Metadata key holding the encoded state document.
pub const STATE_KEY: &str = "state";

/// Metadata key holding the provider token, kept out of the state document.
pub const TOKEN_KEY: &str = "token";

/// Version written by [`encode`].
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

const VERSION_FIELD: &str = "schema_version";

#[derive(Serialize)]
struct DocumentRef<'a> {
    schema_version: u32,
    #[serde(flatten)]
    state: &'a PersistedState,
}

#[derive(Debug, Default, Deserialize)]
struct DocumentV1 {
    #[serde(default)]
    cluster_id: String,
    #[serde(default)]
    token: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    auto_upgrade: bool,
    #[serde(default)]
    region_slug: String,
    #[serde(default)]
    vpc_id: String,
    #[serde(default)]
    version_slug: String,
    #[serde(default)]
    node_pool_id: String,
    #[serde(default)]
    node_pool: Option<NodePoolV1>,
}

#[derive(Debug, Default, Deserialize)]
struct NodePoolV1 {
    #[serde(default)]
    name: String,
    #[serde(default)]
    size: String,
    #[serde(default)]
    count: i64,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    auto_scale: bool,
    #[serde(default)]
    min_nodes: i64,
    #[serde(default)]
    max_nodes: i64,
}

/// Serialize `state` as a current-version document.
pub fn encode(state: &PersistedState) -> Result<String, StateError> {
    serde_json::to_string(&DocumentRef {
        schema_version: CURRENT_SCHEMA_VERSION,
        state,
    })
    .map_err(|e| StateError::Encode(e.to_string()))
}

/// Parse a document of any supported version into the current shape.
///
/// The token is never read from a version 2 document. A version 1 document
/// may still carry one, and it is carried into the in-memory state.
pub fn decode(raw: &str) -> Result<PersistedState, StateError> {
    let value: Value = serde_json::from_str(raw).map_err(StateError::corrupt)?;

    let found = value.get(VERSION_FIELD).and_then(Value::as_u64);
    match found {
        Some(1) => {
            let doc: DocumentV1 = serde_json::from_value(value).map_err(StateError::corrupt)?;
            Ok(migrate_v1(doc))
        }
        Some(2) => {
            serde_json::from_value::<PersistedState>(value).map_err(StateError::corrupt)
        }
        _ => Err(StateError::UnsupportedSchema {
            found,
            current: CURRENT_SCHEMA_VERSION,
        }),
    }
}

fn clamp(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// A version 1 `false` was indistinguishable from "not set"; it migrates to unset.
fn tri_state(value: bool) -> Option<bool> {
    value.then_some(true)
}

fn migrate_v1(doc: DocumentV1) -> PersistedState {
    let pool = doc.node_pool.unwrap_or_default();

    PersistedState {
        cluster_id: doc.cluster_id,
        node_pool_id: doc.node_pool_id,
        cluster: ClusterState {
            token: AccessToken::new(doc.token),
            display_name: doc.display_name,
            name: doc.name,
            tags: doc.tags.into_iter().collect::<BTreeSet<_>>(),
            auto_upgrade: tri_state(doc.auto_upgrade),
            region_slug: doc.region_slug,
            vpc_id: doc.vpc_id,
            version_slug: doc.version_slug,
        },
        node_pool: NodePoolState {
            name: pool.name,
            size: pool.size,
            count: clamp(pool.count),
            labels: pool.labels,
            auto_scale: tri_state(pool.auto_scale),
            min_nodes: if pool.auto_scale { clamp(pool.min_nodes) } else { 0 },
            max_nodes: if pool.auto_scale { clamp(pool.max_nodes) } else { 0 },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> PersistedState {
        PersistedState {
            cluster_id: "c-123".into(),
            node_pool_id: "p-456".into(),
            cluster: ClusterState {
                token: AccessToken::new("do-secret"),
                display_name: "Cluster Test".into(),
                name: "doks-cluster".into(),
                tags: BTreeSet::from(["web".to_string(), "prod".to_string()]),
                auto_upgrade: Some(false),
                region_slug: "nyc3".into(),
                vpc_id: "vpc-1".into(),
                version_slug: "1.17.5-do.0".into(),
            },
            node_pool: NodePoolState {
                name: "pool-1".into(),
                size: "s-2vcpu-2gb".into(),
                count: 3,
                labels: BTreeMap::from([("tier".to_string(), "web".to_string())]),
                auto_scale: Some(true),
                min_nodes: 2,
                max_nodes: 6,
            },
        }
    }

    #[test]
    fn test_round_trip_preserves_populated_fields() {
        let state = populated();

        let decoded = decode(&encode(&state).unwrap()).unwrap();

        let mut expected = state;
        expected.cluster.token = AccessToken::default();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_empty_fields_are_omitted_and_decode_to_zero() {
        let state = PersistedState {
            cluster_id: "c-1".into(),
            ..Default::default()
        };

        let raw = encode(&state).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(value["schema_version"], 2);
        assert!(value["cluster"].as_object().unwrap().is_empty());
        assert!(value.get("node_pool_id").is_none());
        assert_eq!(decode(&raw).unwrap(), state);
    }

    #[test]
    fn test_explicit_false_survives_round_trip() {
        let mut state = PersistedState::default();
        state.cluster.auto_upgrade = Some(false);
        state.node_pool.auto_scale = Some(false);

        let decoded = decode(&encode(&state).unwrap()).unwrap();

        assert_eq!(decoded.cluster.auto_upgrade, Some(false));
        assert_eq!(decoded.node_pool.auto_scale, Some(false));
    }

    #[test]
    fn test_token_is_never_written() {
        let raw = encode(&populated()).unwrap();
        assert!(!raw.contains("do-secret"));
        assert!(!raw.contains("token"));
    }

    #[test]
    fn test_migrates_combined_shape() {
        let raw = r#"{
            "schema_version": 1,
            "cluster_id": "c-9",
            "token": "legacy-token",
            "name": "old",
            "tags": ["a", "a", "b"],
            "auto_upgrade": false,
            "region_slug": "sfo2",
            "node_pool": {
                "name": "pool",
                "size": "s-1vcpu-2gb",
                "count": 2,
                "auto_scale": true,
                "min_nodes": 1,
                "max_nodes": 3,
                "labels": {"k": "v"}
            }
        }"#;

        let state = decode(raw).unwrap();

        assert_eq!(state.cluster_id, "c-9");
        assert_eq!(state.cluster.token.as_str(), "legacy-token");
        assert_eq!(state.cluster.tags.len(), 2);
        assert_eq!(state.cluster.auto_upgrade, None);
        assert_eq!(state.cluster.region_slug, "sfo2");
        assert_eq!(state.node_pool.auto_scale, Some(true));
        assert_eq!(state.node_pool.count, 2);
        assert_eq!(state.node_pool.min_nodes, 1);
        assert_eq!(state.node_pool.max_nodes, 3);
        assert_eq!(state.node_pool.labels["k"], "v");
    }

    #[test]
    fn test_missing_discriminant_is_unsupported() {
        let err = decode(r#"{"cluster_id": "c-1"}"#).unwrap_err();
        assert!(matches!(
            err,
            StateError::UnsupportedSchema {
                found: None,
                current: 2
            }
        ));
    }

    #[test]
    fn test_unknown_version_is_unsupported() {
        let err = decode(r#"{"schema_version": 7}"#).unwrap_err();
        assert!(matches!(
            err,
            StateError::UnsupportedSchema { found: Some(7), .. }
        ));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        assert!(matches!(decode("{not json"), Err(StateError::Corrupt { .. })));
        assert!(matches!(
            decode(r#"{"schema_version": 2, "node_pool": {"count": "three"}}"#),
            Err(StateError::Corrupt { .. })
        ));
    }
}
