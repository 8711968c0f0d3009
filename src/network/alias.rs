//! Alternative names of the local servers

/// A host name the local servers answer to as if it was their own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    name: String,
    enabled: bool,
}

impl Alias {
    /// Create an enabled alias
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_enabled(name, true)
    }

    pub fn with_enabled(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether the given host is this alias
    pub fn test(&self, host: &str) -> bool {
        self.name.eq_ignore_ascii_case(host)
    }
}
