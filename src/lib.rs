//! zap-network
//!
//! Network options for an intercepting security proxy: connection and
//! proxy chaining settings, local servers, client and server certificates,
//! global exclusions, the network API and a passive scanner.

pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod network;
pub mod scanner;

pub use error::{CertificateError, ConfigError, NetworkError, ResultExt, ServerError, UserHint};
