//! Upstream HTTP proxy

use regex::Regex;

use super::host_pattern;
use crate::error::ConfigError;

/// User name and password for a proxy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordAuthentication {
    pub user_name: String,
    pub password: String,
}

impl PasswordAuthentication {
    pub fn new(user_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            password: password.into(),
        }
    }
}

/// The HTTP proxy used for outgoing connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpProxy {
    host: String,
    port: u16,
    realm: String,
    authentication: PasswordAuthentication,
}

impl HttpProxy {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        realm: impl Into<String>,
        authentication: PasswordAuthentication,
    ) -> Result<Self, ConfigError> {
        let host = host.into();
        if host.is_empty() {
            return Err(ConfigError::ValidationError {
                field: "host".into(),
                reason: "must not be empty".into(),
            });
        }
        if port == 0 {
            return Err(ConfigError::ValidationError {
                field: "port".into(),
                reason: "must be between 1 and 65535".into(),
            });
        }
        Ok(Self {
            host,
            port,
            realm: realm.into(),
            authentication,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn authentication(&self) -> &PasswordAuthentication {
        &self.authentication
    }
}

impl Default for HttpProxy {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8090,
            realm: String::new(),
            authentication: PasswordAuthentication::default(),
        }
    }
}

/// A host that must be accessed directly, not through the HTTP proxy
#[derive(Debug, Clone)]
pub struct HttpProxyExclusion {
    host: Regex,
    source: String,
    enabled: bool,
}

impl HttpProxyExclusion {
    /// Create an exclusion from a host pattern, matched ignoring case
    pub fn new(host: &str, enabled: bool) -> Result<Self, regex::Error> {
        Ok(Self {
            host: host_pattern(host)?,
            source: host.to_string(),
            enabled,
        })
    }

    /// The host pattern as configured
    pub fn host(&self) -> &str {
        &self.source
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether the exclusion is enabled and the whole host matches
    pub fn test(&self, host: &str) -> bool {
        self.enabled && self.host.is_match(host)
    }
}

impl PartialEq for HttpProxyExclusion {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.enabled == other.enabled
    }
}
