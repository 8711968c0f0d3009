//! HTTP response types

use serde::{Deserialize, Serialize};

use super::Headers;

/// HTTP response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// HTTP status code
    pub status: u16,

    /// Status text (e.g., "OK", "Not Found")
    #[serde(default)]
    pub status_text: String,

    /// Response headers, in wire order
    #[serde(default)]
    pub headers: Headers,

    /// Response body
    #[serde(default, with = "body_text")]
    pub body: Vec<u8>,

    /// HTTP version
    #[serde(default = "default_http_version")]
    pub http_version: String,
}

fn default_http_version() -> String {
    "HTTP/1.1".to_string()
}

/// Saved messages carry the body as text
mod body_text {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        Ok(String::deserialize(deserializer)?.into_bytes())
    }
}

impl Response {
    /// Create a response with the given status
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.add(name, value);
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Check if response is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if response is redirect (3xx)
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// Check if response is client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check if response is server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Get body as string
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Get a specific header (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Get content type header, lowercased
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type").map(|s| s.to_lowercase())
    }

    fn content_type_contains(&self, needle: &str) -> bool {
        self.content_type()
            .map(|ct| ct.contains(needle))
            .unwrap_or(false)
    }

    /// Check if content is HTML
    pub fn is_html(&self) -> bool {
        self.content_type_contains("html")
    }

    /// Check if content is XML
    pub fn is_xml(&self) -> bool {
        self.content_type_contains("xml")
    }

    /// Check if content is JSON
    pub fn is_json(&self) -> bool {
        self.content_type_contains("json")
    }

    /// Check if content is CSS
    pub fn is_css(&self) -> bool {
        self.content_type_contains("css")
    }

    /// Check if content is JavaScript
    pub fn is_javascript(&self) -> bool {
        self.content_type_contains("javascript") || self.content_type_contains("ecmascript")
    }

    /// Check if content is an image
    pub fn is_image(&self) -> bool {
        self.content_type_contains("image")
    }

    /// Check if content is a font
    pub fn is_font(&self) -> bool {
        self.content_type_contains("font")
    }

    /// Check if content is text based
    pub fn is_text(&self) -> bool {
        match self.content_type() {
            None => true,
            Some(ct) => {
                ct.starts_with("text/")
                    || ct.contains("json")
                    || ct.contains("xml")
                    || ct.contains("javascript")
            }
        }
    }
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            status_text: String::new(),
            headers: Headers::default(),
            body: Vec::new(),
            http_version: default_http_version(),
        }
    }
}
