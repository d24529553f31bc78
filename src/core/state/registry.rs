//=========================================================================
// State Registry
//=========================================================================
//
// Maps logical state names to the bundle keys they require.
//
// Architecture:
//   JSON config ──serde──> RegistryConfig ──from_config()──> RegistryTable
//                                                              │
//   UiStateManager ── resolve(name) ─────────── StateRegistry ─┘
//
// The table is built once at startup; there is no lookup by type.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::HashMap;

use log::{debug, warn};
use serde::Deserialize;

//=== Internal Dependencies ===============================================

use crate::core::bundle::BundleKey;
use crate::core::error::NavigationError;

//=== StateRegistry Trait =================================================

/// Source of state definitions consumed by the manager.
pub trait StateRegistry: Send + Sync {
    /// Bundle keys required by `name`, in definition order.
    fn resolve(&self, name: &str) -> Option<Vec<BundleKey>>;
}

//=== Configuration =======================================================

/// One state definition as authored in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StateEntryConfig {
    pub state_key: String,
    #[serde(default)]
    pub bundles: Vec<BundleKey>,
}

/// Serialized form of the whole registry.
///
/// ```json
/// { "entries": [ { "state_key": "MainMenu", "bundles": ["a1f3", "9c0d"] } ] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub entries: Vec<StateEntryConfig>,
}

//=== RegistryTable =======================================================

/// Explicit name → bundle-keys table.
#[derive(Debug, Clone, Default)]
pub struct RegistryTable {
    entries: HashMap<String, Vec<BundleKey>>,
}

impl RegistryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces the definition of `name`.
    pub fn register<K>(&mut self, name: impl Into<String>, bundles: impl IntoIterator<Item = K>)
    where
        K: Into<BundleKey>,
    {
        let name = name.into();
        let bundles: Vec<BundleKey> = bundles.into_iter().map(Into::into).collect();

        if self.entries.insert(name.clone(), bundles).is_some() {
            warn!("UI state '{}' was already registered and has been replaced", name);
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_state<K>(mut self, name: impl Into<String>, bundles: impl IntoIterator<Item = K>) -> Self
    where
        K: Into<BundleKey>,
    {
        self.register(name, bundles);
        self
    }

    /// Builds the table from a parsed configuration.
    ///
    /// Rejects blank and duplicate state keys.
    pub fn from_config(config: RegistryConfig) -> Result<Self, NavigationError> {
        let mut entries = HashMap::with_capacity(config.entries.len());

        for entry in config.entries {
            if entry.state_key.trim().is_empty() {
                return Err(NavigationError::InvalidConfig("state entry with empty state_key".into()));
            }

            if entry.bundles.is_empty() {
                warn!("UI state '{}' lists no bundles", entry.state_key);
            }

            if entries.insert(entry.state_key.clone(), entry.bundles).is_some() {
                return Err(NavigationError::InvalidConfig(format!(
                    "duplicate state_key '{}'",
                    entry.state_key
                )));
            }
        }

        debug!("Built UI state registry with {} entries", entries.len());
        Ok(Self { entries })
    }

    /// Parses a JSON [`RegistryConfig`] and builds the table.
    pub fn from_json(json: &str) -> Result<Self, NavigationError> {
        let config: RegistryConfig =
            serde_json::from_str(json).map_err(|e| NavigationError::InvalidConfig(e.to_string()))?;
        Self::from_config(config)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered state names, sorted.
    pub fn state_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl StateRegistry for RegistryTable {
    fn resolve(&self, name: &str) -> Option<Vec<BundleKey>> {
        self.entries.get(name).cloned()
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_registered_states() {
        let table = RegistryTable::new()
            .with_state("Main", ["x"])
            .with_state("Store", ["x", "y"]);

        assert_eq!(table.resolve("Store"), Some(vec![BundleKey::from("x"), BundleKey::from("y")]));
        assert_eq!(table.resolve("Settings"), None);
        assert_eq!(table.state_names(), vec!["Main", "Store"]);
    }

    #[test]
    fn register_replaces_existing_definition() {
        let mut table = RegistryTable::new();
        table.register("Main", ["x"]);
        table.register("Main", ["z"]);

        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve("Main"), Some(vec![BundleKey::from("z")]));
    }

    #[test]
    fn builds_from_json() {
        let json = r#"{
            "entries": [
                { "state_key": "Main", "bundles": ["guid-x"] },
                { "state_key": "Profile" }
            ]
        }"#;

        let table = RegistryTable::from_json(json).unwrap();
        assert_eq!(table.resolve("Main"), Some(vec![BundleKey::from("guid-x")]));
        assert_eq!(table.resolve("Profile"), Some(vec![]));
    }

    #[test]
    fn rejects_duplicate_state_keys() {
        let json = r#"{ "entries": [
            { "state_key": "Main", "bundles": ["a"] },
            { "state_key": "Main", "bundles": ["b"] }
        ] }"#;

        let err = RegistryTable::from_json(json).unwrap_err();
        assert!(matches!(err, NavigationError::InvalidConfig(msg) if msg.contains("Main")));
    }

    #[test]
    fn rejects_blank_state_keys_and_bad_json() {
        let blank = r#"{ "entries": [ { "state_key": "  ", "bundles": [] } ] }"#;
        assert!(RegistryTable::from_json(blank).is_err());
        assert!(RegistryTable::from_json("not json").is_err());
    }
}
