//! Authorities whose TLS connections are not intercepted

use regex::Regex;

use super::host_pattern;

/// Connections to matching authorities (`host:port`) are passed through untouched
#[derive(Debug, Clone)]
pub struct PassThrough {
    authority: Regex,
    source: String,
    enabled: bool,
}

impl PassThrough {
    /// Create a pass-through from an authority pattern, matched ignoring case
    pub fn new(authority: &str, enabled: bool) -> Result<Self, regex::Error> {
        Ok(Self {
            authority: host_pattern(authority)?,
            source: authority.to_string(),
            enabled,
        })
    }

    /// The authority pattern as configured
    pub fn authority(&self) -> &str {
        &self.source
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether `host:port` matches the authority pattern
    pub fn test(&self, host: &str, port: u16) -> bool {
        self.authority.is_match(&format!("{}:{}", host, port))
    }
}

impl PartialEq for PassThrough {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.enabled == other.enabled
    }
}
