//! HTTP message model
//!
//! Completed request/response pairs inspected by the passive scanner.

mod headers;
mod request;
mod response;

pub use headers::Headers;
pub use request::{Request, RequestBuilder};
pub use response::Response;

use serde::{Deserialize, Serialize};

/// A completed request/response exchange
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpMessage {
    pub request: Request,
    pub response: Response,

    /// Whether the message is in the user's scope
    #[serde(default)]
    pub in_scope: bool,
}

impl HttpMessage {
    pub fn new(request: Request, response: Response) -> Self {
        Self {
            request,
            response,
            in_scope: false,
        }
    }

    /// Mark the message as in scope
    pub fn in_scope(mut self) -> Self {
        self.in_scope = true;
        self
    }

    /// Request URL
    pub fn url(&self) -> &str {
        &self.request.url
    }
}
