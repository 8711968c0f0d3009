//! Client certificates options
//!
//! PKCS#12 and PKCS#11 client certificate settings, persisted under
//! `network.clientCertificates`.

use std::path::{Path, PathBuf};

use crate::config::{shared, ConfigTree, SharedConfig, VersionedOptions};
use crate::error::CertificateError;

const CURRENT_CONFIG_VERSION: i32 = 1;
const CONFIG_VERSION_KEY: &str = "network.clientCertificates[@version]";

const USE_CERTIFICATE: &str = "network.clientCertificates.use";
const PKCS12_FILE_KEY: &str = "network.clientCertificates.pkcs12.file";
const PKCS12_PASSWORD_KEY: &str = "network.clientCertificates.pkcs12.password";
const PKCS12_INDEX_KEY: &str = "network.clientCertificates.pkcs12.index";
const PKCS12_STORE_KEY: &str = "network.clientCertificates.pkcs12.store";
const PKCS11_USE_SLI_KEY: &str = "network.clientCertificates.pkcs11.useSli";

/// A PKCS#12 file added as client certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkcs12Certificate {
    pub file: PathBuf,
    pub index: i32,
}

/// Options of the client certificates
pub struct ClientCertificatesOptions {
    config: SharedConfig,
    use_certificate: bool,
    pkcs12_file: String,
    pkcs12_password: String,
    pkcs12_index: i32,
    pkcs12_store: bool,
    pkcs11_use_slot_list_index: bool,
    key_stores: Vec<Pkcs12Certificate>,
}

impl Default for ClientCertificatesOptions {
    fn default() -> Self {
        Self {
            config: shared(ConfigTree::new()),
            use_certificate: false,
            pkcs12_file: String::new(),
            pkcs12_password: String::new(),
            pkcs12_index: 0,
            pkcs12_store: false,
            pkcs11_use_slot_list_index: false,
            key_stores: Vec::new(),
        }
    }
}

fn migrate(tree: &mut ConfigTree, old_key: &str, new_key: &str) {
    if let Some(value) = tree.get_string(old_key) {
        tree.set_property(new_key, value);
    }
}

impl VersionedOptions for ClientCertificatesOptions {
    fn config_version_key(&self) -> &'static str {
        CONFIG_VERSION_KEY
    }

    fn current_version(&self) -> i32 {
        CURRENT_CONFIG_VERSION
    }

    fn update_config(&self, tree: &mut ConfigTree, _from_version: i32) {
        migrate(tree, "certificate.use", USE_CERTIFICATE);
        migrate(tree, "certificate.pkcs12.path", PKCS12_FILE_KEY);
        migrate(tree, "certificate.pkcs12.password", PKCS12_PASSWORD_KEY);
        migrate(tree, "certificate.pkcs12.index", PKCS12_INDEX_KEY);
        migrate(tree, "certificate.persist", PKCS12_STORE_KEY);
        migrate(tree, "certificate.experimentalSlotListIndex", PKCS11_USE_SLI_KEY);

        // Owned by the connection options, migrated there
        let renegotiation = tree.get_string("certificate.allowUnsafeSslRenegotiation");
        tree.clear_tree("certificate");
        if let Some(value) = renegotiation {
            tree.set_property("certificate.allowUnsafeSslRenegotiation", value);
        }
    }

    fn parse(&mut self, tree: &ConfigTree) {
        self.use_certificate = tree.get_bool_or(USE_CERTIFICATE, false);
        self.pkcs12_file = tree.get_string_or(PKCS12_FILE_KEY, "");
        self.pkcs12_password = tree.get_string_or(PKCS12_PASSWORD_KEY, "");
        self.pkcs12_index = tree.get_int_or(PKCS12_INDEX_KEY, 0).max(0);
        self.pkcs12_store = tree.get_bool_or(PKCS12_STORE_KEY, false);
        self.pkcs11_use_slot_list_index = tree.get_bool_or(PKCS11_USE_SLI_KEY, false);
    }

    fn set_config(&mut self, config: SharedConfig) {
        self.config = config;
    }
}

impl ClientCertificatesOptions {
    pub fn new() -> Self {
        Self::default()
    }

    fn persist(&self, update: impl FnOnce(&mut ConfigTree)) {
        let mut tree = self.config.write();
        update(&mut tree);
    }

    pub fn is_use_certificate(&self) -> bool {
        self.use_certificate
    }

    pub fn set_use_certificate(&mut self, use_certificate: bool) {
        self.use_certificate = use_certificate;
        self.persist(|tree| tree.set_property(USE_CERTIFICATE, use_certificate));
    }

    pub fn pkcs12_file(&self) -> &str {
        &self.pkcs12_file
    }

    /// Set the PKCS#12 file, persisted only if the PKCS#12 settings are stored
    pub fn set_pkcs12_file(&mut self, file: &str) {
        self.pkcs12_file = file.to_string();
        if self.pkcs12_store {
            self.persist(|tree| tree.set_property(PKCS12_FILE_KEY, file));
        }
    }

    pub fn pkcs12_password(&self) -> &str {
        &self.pkcs12_password
    }

    pub fn set_pkcs12_password(&mut self, password: &str) {
        self.pkcs12_password = password.to_string();
        if self.pkcs12_store {
            self.persist(|tree| tree.set_property(PKCS12_PASSWORD_KEY, password));
        }
    }

    pub fn pkcs12_index(&self) -> i32 {
        self.pkcs12_index
    }

    /// Set the index of the certificate in the PKCS#12 file, negative values become 0
    pub fn set_pkcs12_index(&mut self, index: i32) {
        self.pkcs12_index = index.max(0);
        if self.pkcs12_store {
            let index = self.pkcs12_index;
            self.persist(|tree| tree.set_property(PKCS12_INDEX_KEY, index));
        }
    }

    pub fn is_pkcs12_store(&self) -> bool {
        self.pkcs12_store
    }

    /// Whether the PKCS#12 file, password and index are persisted
    pub fn set_pkcs12_store(&mut self, store: bool) {
        self.pkcs12_store = store;
        let (file, password, index) = if store {
            (self.pkcs12_file.clone(), self.pkcs12_password.clone(), self.pkcs12_index)
        } else {
            (String::new(), String::new(), 0)
        };
        self.persist(|tree| {
            tree.set_property(PKCS12_STORE_KEY, store);
            tree.set_property(PKCS12_FILE_KEY, file);
            tree.set_property(PKCS12_PASSWORD_KEY, password);
            tree.set_property(PKCS12_INDEX_KEY, index);
        });
    }

    pub fn is_pkcs11_use_slot_list_index(&self) -> bool {
        self.pkcs11_use_slot_list_index
    }

    pub fn set_pkcs11_use_slot_list_index(&mut self, use_sli: bool) {
        self.pkcs11_use_slot_list_index = use_sli;
        self.persist(|tree| tree.set_property(PKCS11_USE_SLI_KEY, use_sli));
    }

    pub fn key_stores(&self) -> &[Pkcs12Certificate] {
        &self.key_stores
    }

    /// Add a PKCS#12 file as client certificate and select it
    pub fn add_pkcs12_certificate(
        &mut self,
        file: &Path,
        password: &str,
        index: i32,
    ) -> Result<(), CertificateError> {
        if index < 0 {
            return Err(CertificateError::InvalidKeyStore(format!(
                "invalid certificate index {}",
                index
            )));
        }
        let contents = std::fs::read(file).map_err(|e| {
            CertificateError::InvalidKeyStore(format!("failed to read {}: {}", file.display(), e))
        })?;
        if contents.is_empty() {
            return Err(CertificateError::InvalidKeyStore(format!(
                "{} is empty",
                file.display()
            )));
        }

        self.key_stores.push(Pkcs12Certificate {
            file: file.to_path_buf(),
            index,
        });
        self.set_pkcs12_file(&file.display().to_string());
        self.set_pkcs12_password(password);
        self.set_pkcs12_index(index);
        tracing::info!(file = %file.display(), index, "Added PKCS#12 client certificate");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load(tree: ConfigTree) -> (ClientCertificatesOptions, SharedConfig) {
        let config = shared(tree);
        let mut options = ClientCertificatesOptions::new();
        options.load(config.clone());
        (options, config)
    }

    #[test]
    fn test_defaults() {
        let (options, _) = load(ConfigTree::new());
        assert!(!options.is_use_certificate());
        assert_eq!(options.pkcs12_file(), "");
        assert_eq!(options.pkcs12_password(), "");
        assert_eq!(options.pkcs12_index(), 0);
        assert!(!options.is_pkcs12_store());
        assert!(!options.is_pkcs11_use_slot_list_index());
        assert!(options.key_stores().is_empty());
    }

    #[test]
    fn test_invalid_values() {
        let mut tree = ConfigTree::new();
        tree.set_property(CONFIG_VERSION_KEY, 1);
        tree.set_property(PKCS12_INDEX_KEY, -3);
        tree.set_property(PKCS12_STORE_KEY, "not a boolean");
        let (options, _) = load(tree);
        assert_eq!(options.pkcs12_index(), 0);
        assert!(!options.is_pkcs12_store());
    }

    #[test]
    fn test_not_persisted_unless_stored() {
        let (mut options, config) = load(ConfigTree::new());
        options.set_pkcs12_file("/path/to/file");
        options.set_pkcs12_password("password");
        options.set_pkcs12_index(1234);
        assert!(config.read().get_string(PKCS12_FILE_KEY).is_none());

        options.set_pkcs12_store(true);
        {
            let tree = config.read();
            assert_eq!(tree.get_string(PKCS12_FILE_KEY).as_deref(), Some("/path/to/file"));
            assert_eq!(tree.get_string(PKCS12_PASSWORD_KEY).as_deref(), Some("password"));
            assert_eq!(tree.get_int_or(PKCS12_INDEX_KEY, 0), 1234);
        }

        options.set_pkcs12_store(false);
        let tree = config.read();
        assert_eq!(tree.get_string(PKCS12_FILE_KEY).as_deref(), Some(""));
        assert_eq!(tree.get_string(PKCS12_PASSWORD_KEY).as_deref(), Some(""));
        assert_eq!(tree.get_int_or(PKCS12_INDEX_KEY, -1), 0);
        assert_eq!(options.pkcs12_file(), "/path/to/file");
    }

    #[test]
    fn test_migrates_legacy_config() {
        let mut tree = ConfigTree::new();
        tree.set_property("certificate.use", true);
        tree.set_property("certificate.pkcs12.path", "/path/to/file");
        tree.set_property("certificate.pkcs12.password", "password");
        tree.set_property("certificate.pkcs12.index", 1234);
        tree.set_property("certificate.persist", true);
        tree.set_property("certificate.experimentalSlotListIndex", true);
        tree.set_property("certificate.allowUnsafeSslRenegotiation", true);

        let (options, config) = load(tree);
        assert!(options.is_use_certificate());
        assert_eq!(options.pkcs12_file(), "/path/to/file");
        assert_eq!(options.pkcs12_password(), "password");
        assert_eq!(options.pkcs12_index(), 1234);
        assert!(options.is_pkcs12_store());
        assert!(options.is_pkcs11_use_slot_list_index());

        let tree = config.read();
        assert!(!tree.contains_key("certificate.use"));
        assert!(tree.contains_key("certificate.allowUnsafeSslRenegotiation"));
    }

    #[test]
    fn test_add_pkcs12_certificate() {
        let (mut options, _) = load(ConfigTree::new());
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.p12");
        assert!(options.add_pkcs12_certificate(&missing, "pass", 0).is_err());

        let empty = dir.path().join("empty.p12");
        std::fs::File::create(&empty).unwrap();
        assert!(options.add_pkcs12_certificate(&empty, "pass", 0).is_err());

        let file = dir.path().join("cert.p12");
        std::fs::File::create(&file)
            .unwrap()
            .write_all(&[0x30, 0x82, 0x01])
            .unwrap();
        assert!(options.add_pkcs12_certificate(&file, "pass", -1).is_err());
        options.add_pkcs12_certificate(&file, "pass", 2).unwrap();

        assert_eq!(options.key_stores().len(), 1);
        assert_eq!(options.pkcs12_index(), 2);
        assert_eq!(options.pkcs12_password(), "pass");
    }
}
