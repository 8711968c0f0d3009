//! Cache-Control directives on HTTPS content

use crate::http::HttpMessage;
use crate::scanner::findings::{Confidence, Finding, Severity};
use crate::scanner::passive::{AlertThreshold, PassiveRule};

use super::directives;

/// Flags HTTPS responses that may be cached
pub struct CacheControlRule;

impl CacheControlRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CacheControlRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for CacheControlRule {
    fn plugin_id(&self) -> u32 {
        10015
    }

    fn name(&self) -> &str {
        "Re-examine Cache-control Directives"
    }

    fn scan(&self, msg: &HttpMessage, threshold: AlertThreshold) -> Vec<Finding> {
        let response = &msg.response;
        if response.body.is_empty() || !msg.request.is_secure() {
            return Vec::new();
        }

        if threshold != AlertThreshold::Low
            && (response.is_redirect()
                || response.is_client_error()
                || response.is_server_error()
                || response.is_javascript()
                || response.is_css()
                || response.is_image())
        {
            return Vec::new();
        }

        let values = response.headers.get_all("cache-control");
        let tokens = directives(values.iter().copied());
        let protected = ["no-store", "no-cache", "must-revalidate"]
            .iter()
            .all(|d| tokens.iter().any(|t| t == d));
        if protected {
            return Vec::new();
        }

        vec![Finding::new(self.plugin_id(), self.name(), Severity::Informational, msg.url())
            .with_confidence(Confidence::Low)
            .with_description(
                "The cache-control header has not been set properly or is missing, allowing the \
                 browser and proxies to cache content. For static assets like css, js, or image \
                 files this might be intended, however, the resources should be reviewed to \
                 ensure that no sensitive content will be cached.",
            )
            .with_parameter("Cache-Control")
            .with_evidence(values.first().copied().unwrap_or(""))
            .with_remediation(
                "For secure content, ensure the cache-control HTTP header is set with \
                 \"no-cache, no-store, must-revalidate\". If an asset should be cached consider \
                 setting the directives \"public, max-age, immutable\".",
            )
            .with_reference("https://cheatsheetseries.owasp.org/cheatsheets/Session_Management_Cheat_Sheet.html#web-content-caching")
            .with_cwe(525)
            .with_wasc(13)
            .with_scanner("passive/cache-control")]
    }
}
