//! HTTP request types

use serde::{Deserialize, Serialize};

use super::Headers;

/// HTTP request as seen by the passive scanner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// HTTP method
    pub method: String,

    /// Request URL
    pub url: String,

    /// Request headers, in wire order
    #[serde(default)]
    pub headers: Headers,

    /// Request body
    #[serde(default)]
    pub body: String,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            url: String::new(),
            headers: Headers::default(),
            body: String::new(),
        }
    }
}

impl Request {
    /// Create a new request
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_uppercase(),
            url: url.to_string(),
            ..Default::default()
        }
    }

    /// Create a builder for constructing requests
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    /// Parsed URL, if valid
    pub fn parsed_url(&self) -> Option<url::Url> {
        url::Url::parse(&self.url).ok()
    }

    /// Host name of the request URL, lowercased
    pub fn host(&self) -> Option<String> {
        self.parsed_url()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
    }

    /// Whether the request is sent over HTTPS
    pub fn is_secure(&self) -> bool {
        self.parsed_url()
            .map(|u| u.scheme().eq_ignore_ascii_case("https"))
            .unwrap_or(false)
    }

    /// Query parameters, decoded
    pub fn query_params(&self) -> Vec<(String, String)> {
        self.parsed_url()
            .map(|u| {
                u.query_pairs()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get a header value (case-insensitive, first occurrence)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }
}

/// Builder for constructing requests
#[derive(Debug, Default)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Set the request method
    pub fn method(mut self, method: &str) -> Self {
        self.request.method = method.to_uppercase();
        self
    }

    /// Set the request URL
    pub fn url(mut self, url: &str) -> Self {
        self.request.url = url.to_string();
        self
    }

    /// Add a header
    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.request.headers.add(key, value);
        self
    }

    /// Set the request body
    pub fn body(mut self, body: &str) -> Self {
        self.request.body = body.to_string();
        self
    }

    /// Build the request
    pub fn build(self) -> Request {
        self.request
    }
}
