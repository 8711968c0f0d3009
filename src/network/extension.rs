//! Network extension
//!
//! Owns the network options, bound to one configuration tree, and the root CA
//! used to issue the server certificates.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::certificates::{
    extract_der, pem_block, CertificateAuthority, BEGIN_CERTIFICATE_TOKEN,
    BEGIN_PRIVATE_KEY_TOKEN, END_CERTIFICATE_TOKEN, END_PRIVATE_KEY_TOKEN,
};
use super::{
    ClientCertificatesOptions, ConnectionOptions, GlobalExclusionsOptions, LocalServerConfig,
    LocalServersOptions, Pkcs11Drivers, RateLimitOptions, ServerCertificatesOptions,
};
use crate::config::{shared, ConfigTree, SharedConfig, VersionedOptions};
use crate::error::{CertificateError, ConfigError, NetworkError, ServerError};

/// Domain of the API, never used as proxy address in the PAC
pub const API_DOMAIN: &str = "zap";

/// The network options and root CA
pub struct ExtensionNetwork {
    config: SharedConfig,
    config_path: Option<PathBuf>,

    connection: ConnectionOptions,
    local_servers: LocalServersOptions,
    client_certificates: ClientCertificatesOptions,
    server_certificates: ServerCertificatesOptions,
    global_exclusions: GlobalExclusionsOptions,
    rate_limit: RateLimitOptions,
    pkcs11_drivers: Pkcs11Drivers,

    root_ca: Option<CertificateAuthority>,
    global_http_state: Arc<AtomicBool>,
}

impl Default for ExtensionNetwork {
    fn default() -> Self {
        Self::new(shared(ConfigTree::new()))
    }
}

impl ExtensionNetwork {
    /// Load all the options from `config`, migrating legacy keys
    pub fn new(config: SharedConfig) -> Self {
        let global_http_state = Arc::new(AtomicBool::new(false));

        let mut connection = ConnectionOptions::new();
        let state = global_http_state.clone();
        connection.add_change_listener(Arc::new(move |options: &ConnectionOptions| {
            state.store(options.is_use_global_http_state(), Ordering::SeqCst);
        }));
        connection.load(config.clone());

        let mut local_servers = LocalServersOptions::new();
        local_servers.load(config.clone());
        let mut client_certificates = ClientCertificatesOptions::new();
        client_certificates.load(config.clone());
        let mut server_certificates = ServerCertificatesOptions::new();
        server_certificates.load(config.clone());
        let mut global_exclusions = GlobalExclusionsOptions::new();
        global_exclusions.load(config.clone());
        let mut rate_limit = RateLimitOptions::new();
        rate_limit.load(config.clone());
        let pkcs11_drivers = Pkcs11Drivers::load(config.clone());

        let root_ca = server_certificates.root_ca_key_store().and_then(|key_store| {
            CertificateAuthority::from_key_store(key_store)
                .map_err(|e| tracing::error!("Failed to load the root CA certificate: {}", e))
                .ok()
        });

        Self {
            config,
            config_path: None,
            connection,
            local_servers,
            client_certificates,
            server_certificates,
            global_exclusions,
            rate_limit,
            pkcs11_drivers,
            root_ca,
            global_http_state,
        }
    }

    /// Load the options from a TOML file, empty if it does not exist yet
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let tree = if path.exists() {
            ConfigTree::load(path)?
        } else {
            tracing::info!("No configuration at {}, using defaults", path.display());
            ConfigTree::new()
        };
        let mut extension = Self::new(shared(tree));
        extension.config_path = Some(path.to_path_buf());
        Ok(extension)
    }

    /// Save the options to the file they were loaded from, if any
    pub fn save(&self) -> Result<(), ConfigError> {
        match &self.config_path {
            Some(path) => self.save_to(path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.display().to_string(),
                source,
            })?;
        }
        self.config.read().save(path)?;
        tracing::debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn connection_options(&self) -> &ConnectionOptions {
        &self.connection
    }

    pub fn connection_options_mut(&mut self) -> &mut ConnectionOptions {
        &mut self.connection
    }

    pub fn local_servers_options(&self) -> &LocalServersOptions {
        &self.local_servers
    }

    pub fn local_servers_options_mut(&mut self) -> &mut LocalServersOptions {
        &mut self.local_servers
    }

    pub fn client_certificates_options(&self) -> &ClientCertificatesOptions {
        &self.client_certificates
    }

    pub fn client_certificates_options_mut(&mut self) -> &mut ClientCertificatesOptions {
        &mut self.client_certificates
    }

    pub fn server_certificates_options(&self) -> &ServerCertificatesOptions {
        &self.server_certificates
    }

    pub fn server_certificates_options_mut(&mut self) -> &mut ServerCertificatesOptions {
        &mut self.server_certificates
    }

    pub fn global_exclusions_options(&self) -> &GlobalExclusionsOptions {
        &self.global_exclusions
    }

    pub fn global_exclusions_options_mut(&mut self) -> &mut GlobalExclusionsOptions {
        &mut self.global_exclusions
    }

    pub fn rate_limit_options(&self) -> &RateLimitOptions {
        &self.rate_limit
    }

    pub fn rate_limit_options_mut(&mut self) -> &mut RateLimitOptions {
        &mut self.rate_limit
    }

    pub fn pkcs11_drivers(&self) -> &Pkcs11Drivers {
        &self.pkcs11_drivers
    }

    pub fn pkcs11_drivers_mut(&mut self) -> &mut Pkcs11Drivers {
        &mut self.pkcs11_drivers
    }

    /// Whether the HTTP state is shared by all connections
    pub fn is_global_http_state(&self) -> bool {
        self.global_http_state.load(Ordering::SeqCst)
    }

    pub fn root_ca(&self) -> Option<&CertificateAuthority> {
        self.root_ca.as_ref()
    }

    fn apply_root_ca(&mut self, root_ca: CertificateAuthority) {
        self.server_certificates.set_root_ca_key_store(root_ca.key_store());
        self.root_ca = Some(root_ca);
    }

    /// Create a new root CA, replacing the current one
    pub fn generate_root_ca_cert(&mut self) -> bool {
        tracing::info!("Creating new root CA certificate.");
        match CertificateAuthority::generate(self.server_certificates.root_ca_cert_validity()) {
            Ok(root_ca) => {
                self.apply_root_ca(root_ca);
                tracing::info!("New root CA certificate created.");
                true
            }
            Err(e) => {
                tracing::error!("Failed to create new root CA certificate: {}", e);
                false
            }
        }
    }

    /// Import the root CA from a PEM file with the certificate and private key
    ///
    /// Returns `None` on success, otherwise the reason it failed.
    pub fn import_root_ca_cert(&mut self, pem_file: &Path) -> Option<String> {
        let pem = match std::fs::read(pem_file) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => return Some(format!("Failed to read the selected .pem file: {}", e)),
        };

        let certificate = match extract_der(&pem, BEGIN_CERTIFICATE_TOKEN, END_CERTIFICATE_TOKEN) {
            Ok(der) if der.is_empty() => {
                return Some(format!(
                    "No certificate section found in the .pem file. The certificate should be between {} and {}.",
                    BEGIN_CERTIFICATE_TOKEN, END_CERTIFICATE_TOKEN
                ))
            }
            Ok(der) => der,
            Err(_) => return Some("The certificate is not properly base64 encoded.".to_string()),
        };

        let key = match extract_der(&pem, BEGIN_PRIVATE_KEY_TOKEN, END_PRIVATE_KEY_TOKEN) {
            Ok(der) if der.is_empty() => {
                return Some(format!(
                    "No private key section found in the .pem file. The private key should be between {} and {}.",
                    BEGIN_PRIVATE_KEY_TOKEN, END_PRIVATE_KEY_TOKEN
                ))
            }
            Ok(der) => der,
            Err(_) => return Some("The private key is not properly base64 encoded.".to_string()),
        };

        let key_store = format!(
            "{}{}",
            pem_block(BEGIN_CERTIFICATE_TOKEN, END_CERTIFICATE_TOKEN, &certificate),
            pem_block(BEGIN_PRIVATE_KEY_TOKEN, END_PRIVATE_KEY_TOKEN, &key)
        );
        match CertificateAuthority::from_key_store(&key_store) {
            Ok(root_ca) => {
                self.apply_root_ca(root_ca);
                tracing::info!("Imported root CA certificate from {}", pem_file.display());
                None
            }
            Err(e) => Some(format!("Failed to create the KeyStore from the .pem file: {}", e)),
        }
    }

    pub fn root_ca_cert_pem(&self) -> Option<String> {
        self.root_ca.as_ref().map(|ca| ca.ca_cert_pem().to_string())
    }

    /// Write the root CA certificate, for importing into browsers
    pub fn write_root_ca_cert_as_pem(&self, path: &Path) -> Result<(), NetworkError> {
        let root_ca = self.root_ca.as_ref().ok_or(CertificateError::NoRootCa)?;
        std::fs::write(path, root_ca.ca_cert_pem())?;
        tracing::info!("Root CA certificate written to {}", path.display());
        Ok(())
    }

    /// Write the root CA certificate and private key, for importing elsewhere
    pub fn write_root_ca_cert_and_private_key_as_pem(&self, path: &Path) -> Result<(), NetworkError> {
        let root_ca = self.root_ca.as_ref().ok_or(CertificateError::NoRootCa)?;
        std::fs::write(path, root_ca.key_store())?;
        tracing::info!("Root CA certificate and private key written to {}", path.display());
        Ok(())
    }

    /// Issue a certificate for `host`, signed by the root CA
    pub fn generate_server_cert(&self, host: &str) -> Result<(String, String), CertificateError> {
        let root_ca = self.root_ca.as_ref().ok_or(CertificateError::NoRootCa)?;
        root_ca.generate_server_cert(host, self.server_certificates.server_cert_validity())
    }

    /// The proxy auto-config pointing to the main proxy
    pub fn proxy_pac_content(&self, hostname: &str) -> String {
        let main_proxy = self.local_servers.main_proxy();
        let domain = if main_proxy.is_any_local_address() && hostname != API_DOMAIN {
            hostname
        } else {
            main_proxy.address.as_str()
        };

        format!(
            "function FindProxyForURL(url, host) {{\n  return \"PROXY {}:{}\";\n}} // End of function\n",
            domain, main_proxy.port
        )
    }

    /// Check that the server does not clash with the existing ones and can be bound
    pub fn validate_local_server(&self, server: &LocalServerConfig) -> Result<(), ServerError> {
        let main_proxy = self.local_servers.main_proxy();
        let duplicated = std::iter::once(main_proxy)
            .chain(self.local_servers.servers())
            .any(|s| s.is_same_address(server));
        if duplicated {
            return Err(ServerError::Duplicated {
                address: server.address.clone(),
                port: server.port,
            });
        }

        std::net::TcpListener::bind((server.address.as_str(), server.port))
            .map(drop)
            .map_err(|e| ServerError::StartError {
                address: server.address.clone(),
                port: server.port,
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn free_port() -> u16 {
        std::net::TcpListener::bind(("127.0.0.1", 0))
            .and_then(|l| l.local_addr())
            .map(|a| a.port())
            .unwrap()
    }

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_generate_root_ca_cert() {
        let mut extension = ExtensionNetwork::default();
        assert!(extension.root_ca_cert_pem().is_none());
        assert!(matches!(
            extension.generate_server_cert("example.org"),
            Err(CertificateError::NoRootCa)
        ));

        assert!(extension.generate_root_ca_cert());
        assert!(extension.server_certificates_options().root_ca_key_store().is_some());
        assert!(extension
            .root_ca_cert_pem()
            .unwrap()
            .starts_with(BEGIN_CERTIFICATE_TOKEN));
        assert!(extension.generate_server_cert("example.org").is_ok());
    }

    #[test]
    fn test_server_cert_follows_validity() {
        let mut extension = ExtensionNetwork::default();
        assert!(extension.generate_root_ca_cert());
        let (first, _) = extension.generate_server_cert("example.com").unwrap();

        extension
            .server_certificates_options_mut()
            .set_server_cert_validity(chrono::Duration::days(5))
            .unwrap();
        let (second, _) = extension.generate_server_cert("example.com").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_root_ca_loaded_from_config() {
        let mut extension = ExtensionNetwork::default();
        extension.generate_root_ca_cert();
        let tree = extension.config().read().clone();

        let reloaded = ExtensionNetwork::new(shared(tree));
        assert!(reloaded.root_ca().is_some());
    }

    #[test]
    fn test_import_root_ca_cert() {
        let mut source = ExtensionNetwork::default();
        source.generate_root_ca_cert();
        let file = tempfile::NamedTempFile::new().unwrap();
        source
            .write_root_ca_cert_and_private_key_as_pem(file.path())
            .unwrap();

        let mut extension = ExtensionNetwork::default();
        assert_eq!(extension.import_root_ca_cert(file.path()), None);
        assert!(extension.root_ca().is_some());
        assert!(extension.generate_server_cert("example.org").is_ok());
    }

    #[test]
    fn test_import_root_ca_cert_errors() {
        let mut extension = ExtensionNetwork::default();

        let message = extension
            .import_root_ca_cert(Path::new("/not/a/file.pem"))
            .unwrap();
        assert!(message.starts_with("Failed to read the selected .pem file:"));

        let empty = write_temp("");
        let message = extension.import_root_ca_cert(empty.path()).unwrap();
        assert!(message.starts_with("No certificate section found in the .pem file."));

        let bad_cert = write_temp(&format!(
            "{}\nNotBase64Cert\n{}",
            BEGIN_CERTIFICATE_TOKEN, END_CERTIFICATE_TOKEN
        ));
        let message = extension.import_root_ca_cert(bad_cert.path()).unwrap();
        assert!(message.starts_with("The certificate is not properly base64 encoded."));

        let no_key = write_temp(&format!("{}\nAAAA\n{}", BEGIN_CERTIFICATE_TOKEN, END_CERTIFICATE_TOKEN));
        let message = extension.import_root_ca_cert(no_key.path()).unwrap();
        assert!(message.starts_with("No private key section found in the .pem file."));

        let bad_key = write_temp(&format!(
            "{}\nAAAA\n{}\n{}\nNotBase64Cert\n{}",
            BEGIN_CERTIFICATE_TOKEN, END_CERTIFICATE_TOKEN, BEGIN_PRIVATE_KEY_TOKEN, END_PRIVATE_KEY_TOKEN
        ));
        let message = extension.import_root_ca_cert(bad_key.path()).unwrap();
        assert!(message.starts_with("The private key is not properly base64 encoded."));

        let bad_store = write_temp(&format!(
            "{}\nAAAA\n{}\n{}\nAAAA\n{}",
            BEGIN_CERTIFICATE_TOKEN, END_CERTIFICATE_TOKEN, BEGIN_PRIVATE_KEY_TOKEN, END_PRIVATE_KEY_TOKEN
        ));
        let message = extension.import_root_ca_cert(bad_store.path()).unwrap();
        assert!(message.starts_with("Failed to create the KeyStore from the .pem file:"));
        assert!(extension.root_ca().is_none());
    }

    #[test]
    fn test_write_root_ca_cert() {
        let mut extension = ExtensionNetwork::default();
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(extension.write_root_ca_cert_as_pem(file.path()).is_err());

        extension.generate_root_ca_cert();
        extension.write_root_ca_cert_as_pem(file.path()).unwrap();
        let contents = std::fs::read_to_string(file.path()).unwrap();
        assert!(contents.contains(BEGIN_CERTIFICATE_TOKEN));
        assert!(!contents.contains(BEGIN_PRIVATE_KEY_TOKEN));
    }

    #[test]
    fn test_proxy_pac_content() {
        let mut extension = ExtensionNetwork::default();
        assert_eq!(
            extension.proxy_pac_content("example.org"),
            "function FindProxyForURL(url, host) {\n  return \"PROXY localhost:8080\";\n} // End of function\n"
        );

        extension
            .local_servers_options_mut()
            .set_main_proxy(LocalServerConfig::new("0.0.0.0", 8090));
        assert!(extension
            .proxy_pac_content("example.org")
            .contains("PROXY example.org:8090"));
        assert!(extension.proxy_pac_content(API_DOMAIN).contains("PROXY 0.0.0.0:8090"));
    }

    #[test]
    fn test_validate_local_server() {
        let extension = ExtensionNetwork::default();
        assert!(matches!(
            extension.validate_local_server(&LocalServerConfig::new("localhost", 8080)),
            Err(ServerError::Duplicated { .. })
        ));
        let port = free_port();
        assert!(extension
            .validate_local_server(&LocalServerConfig::new("127.0.0.1", port))
            .is_ok());

        let bound = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = bound.local_addr().unwrap().port();
        assert!(matches!(
            extension.validate_local_server(&LocalServerConfig::new("127.0.0.1", port)),
            Err(ServerError::StartError { .. })
        ));
    }

    #[test]
    fn test_global_http_state_follows_options() {
        let mut extension = ExtensionNetwork::default();
        assert!(!extension.is_global_http_state());
        extension.connection_options_mut().set_use_global_http_state(true);
        assert!(extension.is_global_http_state());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut extension = ExtensionNetwork::from_path(&path).unwrap();
        extension.connection_options_mut().set_timeout_in_secs(42);
        extension.save().unwrap();

        let reloaded = ExtensionNetwork::from_path(&path).unwrap();
        assert_eq!(reloaded.connection_options().timeout_in_secs(), 42);
    }
}
