//! SOCKS proxy

use super::PasswordAuthentication;

/// Version of the SOCKS protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocksVersion {
    V4,
    #[default]
    V5,
}

impl SocksVersion {
    pub fn number(&self) -> i32 {
        match self {
            SocksVersion::V4 => 4,
            SocksVersion::V5 => 5,
        }
    }

    /// Parse a version, anything but 4 is version 5
    pub fn from_value(value: &str) -> Self {
        match value.trim() {
            "4" => SocksVersion::V4,
            "5" => SocksVersion::V5,
            other => {
                if !other.is_empty() {
                    tracing::warn!("Unknown SOCKS version {:?}, using 5", other);
                }
                SocksVersion::V5
            }
        }
    }
}

/// The SOCKS proxy used for outgoing connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocksProxy {
    pub host: String,
    pub port: u16,
    pub version: SocksVersion,
    /// Whether host names are resolved by the proxy
    pub use_dns: bool,
    pub authentication: PasswordAuthentication,
}

impl Default for SocksProxy {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1080,
            version: SocksVersion::V5,
            use_dns: true,
            authentication: PasswordAuthentication::default(),
        }
    }
}
