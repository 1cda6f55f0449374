//! Host contract types and persisted state for the managed Kubernetes driver.
//!
//! - [`DriverOptions`] / [`ClusterInfo`]: what the orchestration host sends
//!   and keeps between calls.
//! - [`states_from_options`]: turns the dual-cased configuration bag into
//!   typed desired state.
//! - [`schema`]: the versioned state document stored in the host's metadata.
//! - [`StateBuilder`]: the seam the driver loads and saves state through.

pub mod builder;
pub mod cluster;
pub mod error;
pub mod info;
pub mod options;
pub mod schema;

pub use builder::{JsonStateBuilder, StateBuilder};
pub use cluster::{
    keys, states_from_options, AccessToken, ClusterState, NodePoolState, PersistedState,
};
pub use error::StateError;
pub use info::ClusterInfo;
pub use options::{parse_labels, DriverOptions};
pub use schema::{CURRENT_SCHEMA_VERSION, STATE_KEY, TOKEN_KEY};
