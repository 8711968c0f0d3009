//! Versioned option sets
//!
//! Each option set owns a base key carrying a `version` attribute. When the
//! stored version is older than the current one the legacy layout is migrated
//! before the options are parsed.

use std::sync::Arc;

use parking_lot::RwLock;

use super::ConfigTree;

/// Configuration tree shared by every option set
pub type SharedConfig = Arc<RwLock<ConfigTree>>;

/// The configuration has no version, it was never written by a versioned option set
pub const NO_CONFIG_VERSION: i32 = -1;

/// The version attribute exists but is not a number
pub const ERROR_READING_CONFIG_VERSION: i32 = -2;

/// Create a new, empty shared configuration
pub fn shared(tree: ConfigTree) -> SharedConfig {
    Arc::new(RwLock::new(tree))
}

/// Read the version stored under `key`
pub fn config_version(tree: &ConfigTree, key: &str) -> i32 {
    match tree.get_string(key) {
        None => NO_CONFIG_VERSION,
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Failed to read config version from '{}': {:?}", key, value);
            ERROR_READING_CONFIG_VERSION
        }),
    }
}

/// A set of options persisted under a versioned base key
pub trait VersionedOptions {
    /// Key of the version attribute, e.g. `network.connection[@version]`
    fn config_version_key(&self) -> &'static str;

    /// Version written by this implementation
    fn current_version(&self) -> i32;

    /// Migrate the configuration from `from_version` to the current layout
    fn update_config(&self, tree: &mut ConfigTree, from_version: i32);

    /// Read the options from the (already migrated) configuration
    fn parse(&mut self, tree: &ConfigTree);

    /// Keep a handle to the configuration so setters can persist changes
    fn set_config(&mut self, config: SharedConfig);

    /// Migrate, parse and bind the options to `config`
    fn load(&mut self, config: SharedConfig) {
        {
            let mut tree = config.write();
            let key = self.config_version_key();
            let version = config_version(&tree, key);
            if version < self.current_version() {
                tracing::debug!(
                    key,
                    from = version,
                    to = self.current_version(),
                    "Updating configuration"
                );
                self.update_config(&mut tree, version);
                tree.set_property(key, self.current_version());
            }
        }
        {
            let tree = config.read();
            self.parse(&tree);
        }
        self.set_config(config);
    }
}
