//! Custom error types for zap-network
//!
//! Provides structured error handling with context propagation
//! and user-friendly error messages.

use thiserror::Error;

/// Main error type for network operations
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Certificate errors
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),

    /// Local server errors
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {path}")]
    ReadError { path: String, source: std::io::Error },

    #[error("Failed to write configuration file: {path}")]
    WriteError { path: String, source: std::io::Error },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {field} - {reason}")]
    ValidationError { field: String, reason: String },

    #[error("Invalid configuration key: {0}")]
    InvalidKey(String),
}

/// Certificate and key store errors
#[derive(Error, Debug)]
pub enum CertificateError {
    #[error("Failed to generate certificate: {0}")]
    GenerationError(String),

    #[error("Failed to generate certificate for {domain}: {reason}")]
    ServerCertificateError { domain: String, reason: String },

    #[error("Invalid key store: {0}")]
    InvalidKeyStore(String),

    #[error("No root CA certificate available")]
    NoRootCa,

    #[error("Invalid validity: {0} days")]
    InvalidValidity(i64),
}

/// Local server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to start server on {address}:{port}: {reason}")]
    StartError {
        address: String,
        port: u16,
        reason: String,
    },

    #[error("A server with address {address} and port {port} already exists")]
    Duplicated { address: String, port: u16 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl NetworkError {
    /// Create an error with additional context
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        NetworkError::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            NetworkError::Config(e) => format!("Configuration problem: {}", e.user_hint()),
            NetworkError::Certificate(e) => format!("Certificate issue: {}", e.user_hint()),
            NetworkError::Server(e) => format!("Server issue: {}", e.user_hint()),
            NetworkError::Io(e) => format!("File system issue: {}", e),
            NetworkError::WithContext { context, source } => {
                format!("{}: {}", context, source)
            }
        }
    }
}

/// Trait for providing user-friendly hints
pub trait UserHint {
    fn user_hint(&self) -> String;
}

impl UserHint for ConfigError {
    fn user_hint(&self) -> String {
        match self {
            ConfigError::ReadError { path, .. } => {
                format!("Could not read '{}'. Check if the file exists and you have read permissions.", path)
            }
            ConfigError::WriteError { path, .. } => {
                format!("Could not write '{}'. Check the directory permissions.", path)
            }
            ConfigError::ParseError(_) => {
                "The configuration file has invalid syntax. Check for TOML formatting errors.".into()
            }
            ConfigError::ValidationError { field, reason } => {
                format!("Invalid value for '{}': {}", field, reason)
            }
            ConfigError::InvalidKey(key) => {
                format!("'{}' is not a valid configuration key.", key)
            }
        }
    }
}

impl UserHint for CertificateError {
    fn user_hint(&self) -> String {
        match self {
            CertificateError::NoRootCa => {
                "No root CA certificate is configured. Generate or import one first.".into()
            }
            CertificateError::InvalidKeyStore(_) => {
                "The stored root CA could not be read. Generate a new one or import a PEM file.".into()
            }
            CertificateError::InvalidValidity(days) => {
                format!("Certificate validity must be greater than zero, got {}.", days)
            }
            _ => self.to_string(),
        }
    }
}

impl UserHint for ServerError {
    fn user_hint(&self) -> String {
        match self {
            ServerError::StartError { address, port, .. } => {
                format!("Could not listen on {}:{}. It may already be in use.", address, port)
            }
            ServerError::Duplicated { address, port } => {
                format!("{}:{} is already configured. Choose another port.", address, port)
            }
            _ => self.to_string(),
        }
    }
}

/// Extension trait for adding context to Result types
pub trait ResultExt<T, E> {
    fn with_context<C>(self, context: C) -> Result<T, NetworkError>
    where
        C: Into<String>;
}

impl<T, E> ResultExt<T, E> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_context<C>(self, context: C) -> Result<T, NetworkError>
    where
        C: Into<String>,
    {
        self.map_err(|e| NetworkError::with_context(context, e))
    }
}
