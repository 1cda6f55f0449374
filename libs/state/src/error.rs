//! Error types for persisted state.

use thiserror::Error;

/// Errors that can occur when loading or saving driver state.
#[derive(Debug, Error)]
pub enum StateError {
    /// The host handed back metadata without a state entry.
    #[error("no persisted state under metadata key `{key}`")]
    Missing { key: &'static str },

    /// The state entry is not valid JSON for any known shape.
    #[error("persisted state is corrupt: {source}")]
    Corrupt {
        #[source]
        source: serde_json::Error,
    },

    /// The state entry was written by an incompatible driver version.
    #[error("unsupported state schema version {found:?} (current is {current})")]
    UnsupportedSchema { found: Option<u64>, current: u32 },

    /// Serialization failed.
    #[error("failed to encode state: {0}")]
    Encode(String),
}

impl StateError {
    pub(crate) fn corrupt(source: serde_json::Error) -> Self {
        Self::Corrupt { source }
    }
}
