//! Identity-mapped entity store for rowmap.
//!
//! The [`EntityStore`] binds record types to tables and hands out rows as
//! [`Entity`] handles. It owns one identity cache per registered type, so
//! every read of the same identifier yields the same instance, and it writes
//! changes back in batched, transactional round trips.
//!
//! # Design Philosophy
//!
//! - **One instance per row**: entities are shared handles owned by the cache
//! - **No write-through**: changes are staged on a [`Draft`] and applied to
//!   the cached entity only after the transaction commits
//! - **Explicit context**: the store is an ordinary value; there is no global
//!   registry
//! - **Blocking**: every call completes its database round trips before
//!   returning
//!
//! # Example
//!
//! ```ignore
//! let store = EntityStore::new(connection);
//! store.register::<Widget>()?;
//!
//! // Insert two rows with generated ids
//! let widgets = store.new_objects_count::<Widget>(2)?;
//!
//! // Change one and write it back
//! let mut draft = widgets[0].modify();
//! draft.set("price", 12)?;
//! store.persist(vec![draft.finish()])?;
//!
//! // Same instance on every lookup
//! let again = store.get::<Widget>(widgets[0].id(), GetPolicy::LocalOnly)?;
//! assert_eq!(again.as_ref(), Some(&widgets[0]));
//!
//! store.delete::<Widget>(&[*widgets[1].id()])?;
//! ```

pub mod entity;
pub mod identity;
pub mod initializer;
pub mod normalize;
pub mod refresh;
mod registry;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use rowmap_core::IsolationLevel;
use serde::{Deserialize, Serialize};

pub use entity::{Draft, Entity, Lifecycle, Persistable};
pub use identity::IdentityCache;
pub use initializer::{EntityInitializer, FieldDefaults, NullInitializer, RecordDefaults};
pub use normalize::{normalize_generated_id, try_normalize_generated_id};
pub use refresh::{
    RefreshOutcome, RefreshReport, RefreshStrategy, RefreshTask, Sequential, Threaded,
};
pub use store::{EntityStore, GetPolicy, RegisterOptions, StoreDebugInfo};

// ============================================================================
// Store Configuration
// ============================================================================

/// How key lists are sent in select-by-key and delete statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyBinding {
    /// One bind parameter per key.
    #[default]
    Parameters,
    /// Keys rendered as literals by the dialect.
    Inline,
}

/// Configuration for [`EntityStore`] behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Isolation level of persist, delete and creation transactions.
    pub write_isolation: IsolationLevel,
    /// How key lists are sent.
    pub key_binding: KeyBinding,
    /// Fail instead of passing through generated keys that cannot be
    /// converted losslessly to the declared id type.
    pub strict_id_normalization: bool,
    /// Split key lists longer than this into several statements.
    pub max_keys_per_statement: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            write_isolation: IsolationLevel::ReadUncommitted,
            key_binding: KeyBinding::Parameters,
            strict_id_normalization: false,
            max_keys_per_statement: None,
        }
    }
}

impl StoreConfig {
    /// Set the write transaction isolation level.
    pub fn with_write_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.write_isolation = isolation;
        self
    }

    /// Set how key lists are sent.
    pub fn with_key_binding(mut self, binding: KeyBinding) -> Self {
        self.key_binding = binding;
        self
    }

    /// Enable or disable strict generated-key normalization.
    pub fn with_strict_id_normalization(mut self, strict: bool) -> Self {
        self.strict_id_normalization = strict;
        self
    }

    /// Limit the number of keys per statement.
    pub fn with_max_keys_per_statement(mut self, max: usize) -> Self {
        self.max_keys_per_statement = Some(max);
        self
    }

    /// Load a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> rowmap_core::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| rowmap_core::Error::invalid_argument(format!("invalid store config: {}", e)))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.write_isolation, IsolationLevel::ReadUncommitted);
        assert_eq!(config.key_binding, KeyBinding::Parameters);
        assert!(!config.strict_id_normalization);
        assert!(config.max_keys_per_statement.is_none());
    }

    #[test]
    fn test_store_config_from_json() {
        let config =
            StoreConfig::from_json(r#"{"key_binding": "inline", "max_keys_per_statement": 100}"#)
                .unwrap();
        assert_eq!(config.key_binding, KeyBinding::Inline);
        assert_eq!(config.max_keys_per_statement, Some(100));
        assert_eq!(config.write_isolation, IsolationLevel::ReadUncommitted);

        assert!(StoreConfig::from_json("{\"key_binding\": 3}").unwrap_err().is_config());
    }

    #[test]
    fn test_store_config_builders() {
        let config = StoreConfig::default()
            .with_write_isolation(IsolationLevel::Serializable)
            .with_strict_id_normalization(true)
            .with_max_keys_per_statement(2);
        assert_eq!(config.write_isolation, IsolationLevel::Serializable);
        assert!(config.strict_id_normalization);
        assert_eq!(config.max_keys_per_statement, Some(2));
    }
}
