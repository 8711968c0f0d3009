//! Session ids rewritten into URLs

use scraper::Html;

use crate::http::HttpMessage;
use crate::scanner::findings::{Confidence, Finding, Severity};
use crate::scanner::passive::{AlertThreshold, PassiveRule};

use super::{is_other_host, select};

/// Parameter names that commonly carry session ids
pub const DEFAULT_SESSION_IDS: &[&str] = &[
    "asp.net_sessionid",
    "aspsessionid",
    "siteserver",
    "cfid",
    "cftoken",
    "jsessionid",
    "phpsessid",
    "sessid",
    "sid",
    "viewstate",
    "zenid",
];

/// Shortest value taken for a session id
const MIN_SESSION_ID_LENGTH: usize = 8;

/// Flags session ids in the request URL and links that would leak them
pub struct SessionIdInUrlRule {
    session_ids: Vec<String>,
}

impl SessionIdInUrlRule {
    pub fn new() -> Self {
        Self {
            session_ids: DEFAULT_SESSION_IDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_session_ids(mut self, names: Vec<String>) -> Self {
        self.session_ids = names.into_iter().map(|n| n.to_lowercase()).collect();
        self
    }

    fn is_session_id(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.session_ids.iter().any(|s| *s == name)
    }

    /// Session id name and value found in the query or in `;name=value` path parameters
    fn find_session_id(&self, msg: &HttpMessage) -> Option<(String, String)> {
        let from_query = msg
            .request
            .query_params()
            .into_iter()
            .find(|(name, value)| self.is_session_id(name) && value.len() >= MIN_SESSION_ID_LENGTH);
        if from_query.is_some() {
            return from_query;
        }

        let url = msg.request.parsed_url()?;
        url.path()
            .split(';')
            .skip(1)
            .filter_map(|param| param.split('/').next()?.split_once('='))
            .find(|(name, value)| self.is_session_id(name) && value.len() >= MIN_SESSION_ID_LENGTH)
            .map(|(name, value)| (name.to_string(), value.to_string()))
    }
}

impl Default for SessionIdInUrlRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for SessionIdInUrlRule {
    fn plugin_id(&self) -> u32 {
        3
    }

    fn name(&self) -> &str {
        "Session ID in URL Rewrite"
    }

    fn scan(&self, msg: &HttpMessage, _threshold: AlertThreshold) -> Vec<Finding> {
        let Some((name, value)) = self.find_session_id(msg) else {
            return Vec::new();
        };

        let mut findings = vec![Finding::new(self.plugin_id(), self.name(), Severity::Medium, msg.url())
            .with_confidence(Confidence::High)
            .with_description(
                "URL rewrite is used to track user session ID. The session ID may be disclosed \
                 via cross-site referer header. In addition, the session ID might be stored in \
                 browser history or server logs.",
            )
            .with_parameter(&name)
            .with_evidence(&value)
            .with_remediation(
                "For secure content, put session ID in a cookie. To be even more secure consider \
                 using a combination of cookie and URL rewrite.",
            )
            .with_reference("https://seclists.org/webappsec/2002/q4/111")
            .with_cwe(598)
            .with_wasc(13)
            .with_scanner("passive/session-id-url")];

        if msg.response.is_html() {
            let document = Html::parse_document(&msg.response.body_text());
            let external = select(&document, "a[href], area[href]")
                .into_iter()
                .filter_map(|e| e.value().attr("href"))
                .find(|href| {
                    let lower = href.trim().to_lowercase();
                    (lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("//"))
                        && is_other_host(msg, href)
                });
            if let Some(href) = external {
                findings.push(
                    Finding::new(self.plugin_id(), "Referer Exposes Session ID", Severity::Medium, msg.url())
                        .with_confidence(Confidence::Medium)
                        .with_description(
                            "A hyperlink pointing to another host name was found. As session ID \
                             URL rewrite is used, it may be disclosed in referer header to \
                             external hosts.",
                        )
                        .with_parameter(&name)
                        .with_evidence(href)
                        .with_remediation(
                            "This is a risk if the session ID is sensitive and the hyperlink \
                             refers to an external or third party host. For secure content, put \
                             session ID in secured session cookie.",
                        )
                        .with_cwe(598)
                        .with_wasc(13)
                        .with_scanner("passive/session-id-url"),
                );
            }
        }

        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::passive::rules::test_util;

    #[test]
    fn test_session_id_in_query() {
        let msg = test_util::message("https://example.com/app?PHPSESSID=abcdef123456&x=1", "text/plain", "");
        let findings = SessionIdInUrlRule::new().scan(&msg, AlertThreshold::Medium);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].parameter.as_deref(), Some("PHPSESSID"));
        assert_eq!(findings[0].evidence.as_deref(), Some("abcdef123456"));
    }

    #[test]
    fn test_session_id_in_path() {
        let msg = test_util::message("https://example.com/app;jsessionid=1A2B3C4D5E6F/page", "text/plain", "");
        let findings = SessionIdInUrlRule::new().scan(&msg, AlertThreshold::Medium);
        assert_eq!(findings[0].evidence.as_deref(), Some("1A2B3C4D5E6F"));
    }

    #[test]
    fn test_short_values_ignored() {
        let msg = test_util::message("https://example.com/?sid=123", "text/plain", "");
        assert!(SessionIdInUrlRule::new().scan(&msg, AlertThreshold::Medium).is_empty());
    }

    #[test]
    fn test_referer_exposure() {
        let msg = test_util::message(
            "https://example.com/?jsessionid=0123456789",
            "text/html",
            r#"<a href="/local">a</a><a href="https://other.org/">b</a>"#,
        );
        let findings = SessionIdInUrlRule::new().scan(&msg, AlertThreshold::Medium);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[1].name, "Referer Exposes Session ID");
        assert_eq!(findings[1].evidence.as_deref(), Some("https://other.org/"));
    }
}
