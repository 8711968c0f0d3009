//! Server certificates options
//!
//! The root CA key store and the validity of the root CA and server
//! certificates, persisted under `network.serverCertificates`.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Duration;

use crate::config::{shared, ConfigTree, SharedConfig, VersionedOptions};
use crate::error::CertificateError;

pub const DEFAULT_ROOT_CA_CERT_VALIDITY_DAYS: i64 = 365;
pub const DEFAULT_SERVER_CERT_VALIDITY_DAYS: i64 = 90;

const CURRENT_CONFIG_VERSION: i32 = 1;
const CONFIG_VERSION_KEY: &str = "network.serverCertificates[@version]";

const CORE_KEY_STORE_KEY: &str = "dynssl.param.rootca";
const ROOT_CA_KEY_STORE_KEY: &str = "network.serverCertificates.rootCa.ks";
const ROOT_CA_CERT_VALIDITY_DAYS_KEY: &str = "network.serverCertificates.rootCa.certValidityDays";
const SERVER_CERT_VALIDITY_DAYS_KEY: &str = "network.serverCertificates.server.certValidityDays";

/// Options of the root CA and server certificates
pub struct ServerCertificatesOptions {
    config: SharedConfig,
    root_ca_key_store: Option<String>,
    root_ca_cert_validity: Duration,
    server_cert_validity: Duration,
}

impl Default for ServerCertificatesOptions {
    fn default() -> Self {
        Self {
            config: shared(ConfigTree::new()),
            root_ca_key_store: None,
            root_ca_cert_validity: Duration::days(DEFAULT_ROOT_CA_CERT_VALIDITY_DAYS),
            server_cert_validity: Duration::days(DEFAULT_SERVER_CERT_VALIDITY_DAYS),
        }
    }
}

fn decode_key_store(value: &str) -> Option<String> {
    let bytes = match STANDARD.decode(value.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("Failed to read the root CA key store: {}", e);
            return None;
        }
    };
    match String::from_utf8(bytes) {
        Ok(key_store) => Some(key_store),
        Err(e) => {
            tracing::error!("Failed to read the root CA key store: {}", e);
            None
        }
    }
}

/// Validity in days, the default when absent, malformed, not positive or too large
fn read_validity(tree: &ConfigTree, key: &str, default_days: i64) -> Duration {
    let Some(value) = tree.get_string(key) else {
        return Duration::days(default_days);
    };
    value
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|days| *days > 0)
        .and_then(Duration::try_days)
        .unwrap_or_else(|| {
            tracing::warn!("Invalid validity in '{}': {:?}", key, value);
            Duration::days(default_days)
        })
}

impl VersionedOptions for ServerCertificatesOptions {
    fn config_version_key(&self) -> &'static str {
        CONFIG_VERSION_KEY
    }

    fn current_version(&self) -> i32 {
        CURRENT_CONFIG_VERSION
    }

    fn update_config(&self, tree: &mut ConfigTree, _from_version: i32) {
        if let Some(key_store) = tree.get_string(CORE_KEY_STORE_KEY) {
            tree.set_property(ROOT_CA_KEY_STORE_KEY, key_store);
            tree.clear_property(CORE_KEY_STORE_KEY);
        }
    }

    fn parse(&mut self, tree: &ConfigTree) {
        self.root_ca_key_store = tree
            .get_string(ROOT_CA_KEY_STORE_KEY)
            .filter(|v| !v.trim().is_empty())
            .and_then(|v| decode_key_store(&v));
        self.root_ca_cert_validity = read_validity(
            tree,
            ROOT_CA_CERT_VALIDITY_DAYS_KEY,
            DEFAULT_ROOT_CA_CERT_VALIDITY_DAYS,
        );
        self.server_cert_validity = read_validity(
            tree,
            SERVER_CERT_VALIDITY_DAYS_KEY,
            DEFAULT_SERVER_CERT_VALIDITY_DAYS,
        );
    }

    fn set_config(&mut self, config: SharedConfig) {
        self.config = config;
    }
}

impl ServerCertificatesOptions {
    pub fn new() -> Self {
        Self::default()
    }

    fn persist(&self, update: impl FnOnce(&mut ConfigTree)) {
        let mut tree = self.config.write();
        update(&mut tree);
    }

    /// The root CA key store, PEM certificate and private key
    pub fn root_ca_key_store(&self) -> Option<&str> {
        self.root_ca_key_store.as_deref()
    }

    pub fn set_root_ca_key_store(&mut self, key_store: String) {
        let encoded = STANDARD.encode(key_store.as_bytes());
        self.root_ca_key_store = Some(key_store);
        self.persist(|tree| tree.set_property(ROOT_CA_KEY_STORE_KEY, encoded));
    }

    pub fn root_ca_cert_validity(&self) -> Duration {
        self.root_ca_cert_validity
    }

    pub fn set_root_ca_cert_validity(&mut self, validity: Duration) -> Result<(), CertificateError> {
        validate_validity(validity)?;
        self.root_ca_cert_validity = validity;
        self.persist(|tree| tree.set_property(ROOT_CA_CERT_VALIDITY_DAYS_KEY, validity.num_days()));
        Ok(())
    }

    pub fn server_cert_validity(&self) -> Duration {
        self.server_cert_validity
    }

    pub fn set_server_cert_validity(&mut self, validity: Duration) -> Result<(), CertificateError> {
        validate_validity(validity)?;
        self.server_cert_validity = validity;
        self.persist(|tree| tree.set_property(SERVER_CERT_VALIDITY_DAYS_KEY, validity.num_days()));
        Ok(())
    }
}

fn validate_validity(validity: Duration) -> Result<(), CertificateError> {
    if validity.num_days() <= 0 {
        return Err(CertificateError::InvalidValidity(validity.num_days()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(tree: ConfigTree) -> (ServerCertificatesOptions, SharedConfig) {
        let config = shared(tree);
        let mut options = ServerCertificatesOptions::new();
        options.load(config.clone());
        (options, config)
    }

    #[test]
    fn test_defaults() {
        let (options, _) = load(ConfigTree::new());
        assert!(options.root_ca_key_store().is_none());
        assert_eq!(options.root_ca_cert_validity(), Duration::days(365));
        assert_eq!(options.server_cert_validity(), Duration::days(90));
    }

    #[test]
    fn test_invalid_validities_use_default() {
        for value in ["", "abc", "0", "-1", "9223372036854775807", "99999999999999999999"] {
            let mut tree = ConfigTree::new();
            tree.set_property(ROOT_CA_CERT_VALIDITY_DAYS_KEY, value);
            tree.set_property(SERVER_CERT_VALIDITY_DAYS_KEY, value);
            let (options, _) = load(tree);
            assert_eq!(options.root_ca_cert_validity(), Duration::days(365), "{}", value);
            assert_eq!(options.server_cert_validity(), Duration::days(90), "{}", value);
        }
    }

    #[test]
    fn test_loads_validities() {
        let mut tree = ConfigTree::new();
        tree.set_property(ROOT_CA_CERT_VALIDITY_DAYS_KEY, 60);
        tree.set_property(SERVER_CERT_VALIDITY_DAYS_KEY, 30);
        let (options, _) = load(tree);
        assert_eq!(options.root_ca_cert_validity(), Duration::days(60));
        assert_eq!(options.server_cert_validity(), Duration::days(30));
    }

    #[test]
    fn test_set_validity() {
        let (mut options, config) = load(ConfigTree::new());
        options.set_root_ca_cert_validity(Duration::days(10)).unwrap();
        assert!(options.set_server_cert_validity(Duration::days(0)).is_err());
        assert_eq!(options.server_cert_validity(), Duration::days(90));

        let tree = config.read();
        assert_eq!(tree.get_int_or(ROOT_CA_CERT_VALIDITY_DAYS_KEY, 0), 10);
        assert!(!tree.contains_key(SERVER_CERT_VALIDITY_DAYS_KEY));
    }

    #[test]
    fn test_key_store() {
        let mut tree = ConfigTree::new();
        tree.set_property(ROOT_CA_KEY_STORE_KEY, "not base64!");
        let (mut options, config) = load(tree);
        assert!(options.root_ca_key_store().is_none());

        options.set_root_ca_key_store("PEM".to_string());
        assert_eq!(options.root_ca_key_store(), Some("PEM"));
        assert_eq!(
            config.read().get_string(ROOT_CA_KEY_STORE_KEY).as_deref(),
            Some(STANDARD.encode("PEM").as_str())
        );
    }

    #[test]
    fn test_migrates_core_key_store() {
        let mut tree = ConfigTree::new();
        tree.set_property(CORE_KEY_STORE_KEY, STANDARD.encode("PEM"));
        let (options, config) = load(tree);
        assert_eq!(options.root_ca_key_store(), Some("PEM"));
        assert!(!config.read().contains_key(CORE_KEY_STORE_KEY));
    }
}
