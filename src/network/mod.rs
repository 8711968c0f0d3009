//! Network options and root CA
//!
//! Value objects, the versioned options persisted in the configuration tree
//! and the extension tying them together.

mod alias;
pub mod certificates;
pub mod client_certificates;
pub mod connection;
mod extension;
pub mod global_exclusions;
mod http_proxy;
pub mod local_server;
pub mod local_servers;
mod pass_through;
pub mod pkcs11;
pub mod rate_limit;
pub mod server_certificates;
mod socks_proxy;

use regex::{Regex, RegexBuilder};

pub use alias::Alias;
pub use certificates::CertificateAuthority;
pub use client_certificates::{ClientCertificatesOptions, Pkcs12Certificate};
pub use connection::{ChangeListener, ConnectionOptions};
pub use extension::{ExtensionNetwork, API_DOMAIN};
pub use global_exclusions::{GlobalExclusion, GlobalExclusionsOptions};
pub use http_proxy::{HttpProxy, HttpProxyExclusion, PasswordAuthentication};
pub use local_server::{LocalServerConfig, ServerMode, TlsConfig};
pub use local_servers::{LocalServersOptions, ServersChangedListener};
pub use pass_through::PassThrough;
pub use pkcs11::{Pkcs11Driver, Pkcs11Drivers};
pub use rate_limit::{GroupBy, RateLimitOptions, RateLimitRule};
pub use server_certificates::ServerCertificatesOptions;
pub use socks_proxy::{SocksProxy, SocksVersion};

/// Case-insensitive regex matching the whole input
pub(crate) fn host_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&format!("^(?:{})$", pattern))
        .case_insensitive(true)
        .build()
}

/// Port in 1..=65535, else the default
pub(crate) fn parse_port(value: Option<String>, default: u16) -> u16 {
    let Some(value) = value else {
        return default;
    };
    match value.trim().parse::<u16>() {
        Ok(port) if port > 0 => port,
        _ => {
            tracing::warn!("Invalid port {:?}, using {}", value, default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_pattern() {
        let pattern = host_pattern(r"example\.org").unwrap();
        assert!(pattern.is_match("EXAMPLE.org"));
        assert!(!pattern.is_match("www.example.org"));
        assert!(host_pattern("(").is_err());
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port(None, 8080), 8080);
        assert_eq!(parse_port(Some("8090".into()), 8080), 8090);
        assert_eq!(parse_port(Some("".into()), 8080), 8080);
        assert_eq!(parse_port(Some("0".into()), 8080), 8080);
        assert_eq!(parse_port(Some("65536".into()), 8080), 8080);
        assert_eq!(parse_port(Some("port".into()), 8080), 8080);
    }
}
