//! Loading and saving driver state through the host's metadata map.

use crate::cluster::{states_from_options, AccessToken, ClusterState, NodePoolState, PersistedState};
use crate::error::StateError;
use crate::info::ClusterInfo;
use crate::options::DriverOptions;
use crate::schema::{self, STATE_KEY, TOKEN_KEY};

/// Builds desired state from configuration and moves persisted state in and
/// out of a [`ClusterInfo`].
pub trait StateBuilder: Send + Sync {
    /// Extract desired cluster and node pool state from a configuration bag.
    fn build_from_options(&self, options: &DriverOptions) -> (ClusterState, NodePoolState) {
        states_from_options(options)
    }

    /// Decode the state the host handed back.
    fn load(&self, info: &ClusterInfo) -> Result<PersistedState, StateError>;

    /// Write `state` into `info`, replacing any previous state.
    fn save(&self, state: &PersistedState, info: &mut ClusterInfo) -> Result<(), StateError>;
}

/// JSON state stored under [`STATE_KEY`], token under [`TOKEN_KEY`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonStateBuilder;

impl StateBuilder for JsonStateBuilder {
    fn load(&self, info: &ClusterInfo) -> Result<PersistedState, StateError> {
        let raw = info
            .metadata
            .get(STATE_KEY)
            .ok_or(StateError::Missing { key: STATE_KEY })?;

        let mut state = schema::decode(raw)?;
        if let Some(token) = info.metadata.get(TOKEN_KEY).filter(|t| !t.is_empty()) {
            state.cluster.token = AccessToken::new(token.as_str());
        }
        Ok(state)
    }

    fn save(&self, state: &PersistedState, info: &mut ClusterInfo) -> Result<(), StateError> {
        let encoded = schema::encode(state)?;
        info.metadata.insert(STATE_KEY.to_string(), encoded);

        if !state.cluster.token.is_empty() {
            info.metadata
                .insert(TOKEN_KEY.to_string(), state.cluster.token.as_str().to_string());
        }
        Ok(())
    }
}
