//! Local server (proxy and API listener) configuration

use crate::error::ConfigError;

pub const DEFAULT_ADDRESS: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8080;

/// TLS protocols known to the local servers and outgoing connections
pub const KNOWN_TLS_PROTOCOLS: &[&str] = &["SSLv3", "TLSv1", "TLSv1.1", "TLSv1.2", "TLSv1.3"];

/// Protocols enabled when none, or only invalid ones, are configured
pub const SUPPORTED_TLS_PROTOCOLS: &[&str] = &["TLSv1.2", "TLSv1.3"];

/// What a local server serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerMode {
    Api,
    Proxy,
    #[default]
    ApiAndProxy,
}

impl ServerMode {
    pub fn from_flags(proxy: bool, api: bool) -> Self {
        match (proxy, api) {
            (true, true) => ServerMode::ApiAndProxy,
            (true, false) => ServerMode::Proxy,
            (false, _) => ServerMode::Api,
        }
    }

    pub fn has_api(&self) -> bool {
        matches!(self, ServerMode::Api | ServerMode::ApiAndProxy)
    }

    pub fn has_proxy(&self) -> bool {
        matches!(self, ServerMode::Proxy | ServerMode::ApiAndProxy)
    }
}

/// TLS protocols and renegotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    protocols: Vec<String>,
    allow_unsafe_renegotiation: bool,
}

impl TlsConfig {
    pub fn new(protocols: Vec<String>, allow_unsafe_renegotiation: bool) -> Result<Self, ConfigError> {
        Ok(Self {
            protocols: validate_protocols(protocols)?,
            allow_unsafe_renegotiation,
        })
    }

    pub fn protocols(&self) -> &[String] {
        &self.protocols
    }

    pub fn is_allow_unsafe_renegotiation(&self) -> bool {
        self.allow_unsafe_renegotiation
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            protocols: supported_protocols(),
            allow_unsafe_renegotiation: false,
        }
    }
}

pub fn supported_protocols() -> Vec<String> {
    SUPPORTED_TLS_PROTOCOLS.iter().map(|p| p.to_string()).collect()
}

/// Ensure the list is not empty and has only known protocols
pub fn validate_protocols(protocols: Vec<String>) -> Result<Vec<String>, ConfigError> {
    if protocols.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "tlsProtocols".into(),
            reason: "at least one protocol must be enabled".into(),
        });
    }
    if let Some(unknown) = protocols
        .iter()
        .find(|p| !KNOWN_TLS_PROTOCOLS.contains(&p.as_str()))
    {
        return Err(ConfigError::ValidationError {
            field: "tlsProtocols".into(),
            reason: format!("unsupported protocol {}", unknown),
        });
    }
    Ok(protocols)
}

/// Drop empty and unknown protocols
pub fn filter_unsupported_protocols(protocols: Vec<String>) -> Vec<String> {
    protocols
        .into_iter()
        .filter(|p| KNOWN_TLS_PROTOCOLS.contains(&p.as_str()))
        .collect()
}

/// Configuration of a local server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalServerConfig {
    pub address: String,
    pub port: u16,
    pub mode: ServerMode,
    pub tls_config: TlsConfig,
    pub behind_nat: bool,
    pub remove_accept_encoding: bool,
    pub decode_response: bool,
    pub enabled: bool,
}

impl Default for LocalServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            mode: ServerMode::ApiAndProxy,
            tls_config: TlsConfig::default(),
            behind_nat: false,
            remove_accept_encoding: true,
            decode_response: true,
            enabled: true,
        }
    }
}

impl LocalServerConfig {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            ..Default::default()
        }
    }

    /// Whether the server binds every local interface
    pub fn is_any_local_address(&self) -> bool {
        matches!(self.address.as_str(), "0.0.0.0" | "::" | "[::]")
    }

    /// Whether both servers use the same address (ignoring case) and port
    pub fn is_same_address(&self, other: &LocalServerConfig) -> bool {
        self.port == other.port && self.address.eq_ignore_ascii_case(&other.address)
    }

    /// `address:port`, with IPv6 addresses in brackets
    pub fn authority(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}
