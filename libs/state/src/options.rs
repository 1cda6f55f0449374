//! The host's flat configuration bag.
//!
//! The host sends user-entered configuration as four maps keyed by option
//! name. The same logical option may arrive under a hyphenated key
//! (`node-pool-count`) or a camelCase key (`nodePoolCount`); lookups take a
//! list of keys and return the value of the first one present.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Configuration bag supplied by the host on create and update calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverOptions {
    #[serde(default)]
    pub string_options: BTreeMap<String, String>,

    #[serde(default)]
    pub bool_options: BTreeMap<String, bool>,

    #[serde(default)]
    pub int_options: BTreeMap<String, i64>,

    #[serde(default)]
    pub string_slice_options: BTreeMap<String, Vec<String>>,
}

fn lookup<'a, V>(map: &'a BTreeMap<String, V>, keys: &[&str]) -> Option<&'a V> {
    keys.iter().find_map(|key| map.get(*key))
}

impl DriverOptions {
    /// First present string value, or empty.
    pub fn string(&self, keys: &[&str]) -> String {
        lookup(&self.string_options, keys).cloned().unwrap_or_default()
    }

    /// First present boolean value, or `None` when no key is present.
    pub fn tri_state(&self, keys: &[&str]) -> Option<bool> {
        lookup(&self.bool_options, keys).copied()
    }

    /// First present boolean value, or `false`.
    pub fn flag(&self, keys: &[&str]) -> bool {
        self.tri_state(keys).unwrap_or(false)
    }

    /// First present integer value, or zero.
    pub fn int(&self, keys: &[&str]) -> i64 {
        lookup(&self.int_options, keys).copied().unwrap_or(0)
    }

    /// First present string list, or empty.
    pub fn strings(&self, keys: &[&str]) -> Vec<String> {
        lookup(&self.string_slice_options, keys)
            .cloned()
            .unwrap_or_default()
    }

    pub fn with_string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.string_options.insert(key.into(), value.into());
        self
    }

    pub fn with_bool(mut self, key: impl Into<String>, value: bool) -> Self {
        self.bool_options.insert(key.into(), value);
        self
    }

    pub fn with_int(mut self, key: impl Into<String>, value: i64) -> Self {
        self.int_options.insert(key.into(), value);
        self
    }

    pub fn with_strings<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.string_slice_options
            .insert(key.into(), values.into_iter().map(Into::into).collect());
        self
    }
}

/// Parse `key=value` tokens into a label map.
///
/// Tokens that do not split into exactly two parts on `=` are dropped
/// silently; hosts have always relied on that leniency.
pub fn parse_labels<I, S>(tokens: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tokens
        .into_iter()
        .filter_map(|token| {
            let mut parts = token.as_ref().split('=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) => Some((key.to_string(), value.to_string())),
                _ => None,
            }
        })
        .collect()
}
