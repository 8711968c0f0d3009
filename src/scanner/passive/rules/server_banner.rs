//! Server and technology banners in response headers

use std::sync::OnceLock;

use regex::Regex;

use crate::http::HttpMessage;
use crate::scanner::findings::{Confidence, Finding, Severity};
use crate::scanner::passive::{AlertThreshold, PassiveRule};

/// Headers naming the framework behind the server
const POWERED_BY_HEADERS: &[&str] = &["X-Powered-By", "X-AspNet-Version", "X-AspNetMvc-Version"];

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d").expect("Invalid version regex"))
}

/// Flags `Server` headers that disclose a version
pub struct ServerHeaderRule;

impl ServerHeaderRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ServerHeaderRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for ServerHeaderRule {
    fn plugin_id(&self) -> u32 {
        10036
    }

    fn name(&self) -> &str {
        "Server Leaks Version Information via \"Server\" HTTP Response Header Field"
    }

    fn scan(&self, msg: &HttpMessage, threshold: AlertThreshold) -> Vec<Finding> {
        let mut findings = Vec::new();

        for server in msg.response.headers.get_all("Server") {
            let finding = if version_regex().is_match(server) {
                Finding::new(self.plugin_id(), self.name(), Severity::Low, msg.url())
                    .with_description(
                        "The web/application server is leaking version information via the \
                         \"Server\" HTTP response header. Access to such information may \
                         facilitate attackers identifying other vulnerabilities your \
                         web/application server is subject to.",
                    )
                    .with_remediation(
                        "Ensure that your web server, application server, load balancer, etc. is \
                         configured to suppress the \"Server\" header or provide generic details.",
                    )
            } else if threshold == AlertThreshold::Low {
                Finding::new(
                    self.plugin_id(),
                    "Server Leaks Information via \"Server\" HTTP Response Header Field",
                    Severity::Informational,
                    msg.url(),
                )
                .with_description(
                    "The web/application server is leaking information via the \"Server\" HTTP \
                     response header.",
                )
                .with_remediation(
                    "Ensure that your web server, application server, load balancer, etc. is \
                     configured to suppress the \"Server\" header.",
                )
            } else {
                continue;
            };

            findings.push(
                finding
                    .with_confidence(Confidence::Medium)
                    .with_evidence(server)
                    .with_reference("https://httpd.apache.org/docs/current/mod/core.html#servertokens")
                    .with_cwe(200)
                    .with_wasc(13)
                    .with_scanner("passive/server-banner"),
            );
        }

        findings
    }
}

/// Flags headers that name the technology stack
pub struct XPoweredByRule;

impl XPoweredByRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for XPoweredByRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for XPoweredByRule {
    fn plugin_id(&self) -> u32 {
        10037
    }

    fn name(&self) -> &str {
        "Server Leaks Information via \"X-Powered-By\" HTTP Response Header Field(s)"
    }

    fn scan(&self, msg: &HttpMessage, _threshold: AlertThreshold) -> Vec<Finding> {
        let banners: Vec<(&str, &str)> = msg
            .response
            .headers
            .iter()
            .filter(|(name, _)| POWERED_BY_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)))
            .collect();
        let Some((name, value)) = banners.first() else {
            return Vec::new();
        };

        let mut finding = Finding::new(self.plugin_id(), self.name(), Severity::Low, msg.url())
            .with_confidence(Confidence::High)
            .with_description(
                "The web/application server is leaking information via one or more \
                 \"X-Powered-By\" HTTP response headers. Access to such information may \
                 facilitate attackers identifying other frameworks/components your web \
                 application is reliant upon and the vulnerabilities such components may be \
                 subject to.",
            )
            .with_parameter(name)
            .with_evidence(&format!("{}: {}", name, value))
            .with_remediation(
                "Ensure that your web server, application server, load balancer, etc. is \
                 configured to suppress \"X-Powered-By\" headers.",
            )
            .with_reference("https://owasp.org/www-project-web-security-testing-guide/v42/4-Web_Application_Security_Testing/01-Information_Gathering/08-Fingerprint_Web_Application_Framework")
            .with_cwe(497)
            .with_wasc(13)
            .with_scanner("passive/server-banner");
        if banners.len() > 1 {
            let all: Vec<String> = banners.iter().map(|(n, v)| format!("{}: {}", n, v)).collect();
            finding = finding.with_other_info(&format!(
                "The following X-Powered-By headers were also found:\n{}",
                all[1..].join("\n")
            ));
        }

        vec![finding]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::passive::rules::test_util;

    #[test]
    fn test_server_version() {
        let mut msg = test_util::html("");
        msg.response.headers.add("Server", "Apache/2.4.41 (Ubuntu)");
        let findings = ServerHeaderRule::new().scan(&msg, AlertThreshold::Medium);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Low);
        assert_eq!(findings[0].evidence.as_deref(), Some("Apache/2.4.41 (Ubuntu)"));
    }

    #[test]
    fn test_server_without_version() {
        let mut msg = test_util::html("");
        msg.response.headers.add("Server", "cloudflare");
        assert!(ServerHeaderRule::new().scan(&msg, AlertThreshold::Medium).is_empty());

        let findings = ServerHeaderRule::new().scan(&msg, AlertThreshold::Low);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Informational);
    }

    #[test]
    fn test_powered_by() {
        let msg = test_util::html("");
        assert!(XPoweredByRule::new().scan(&msg, AlertThreshold::Medium).is_empty());

        let mut msg = test_util::html("");
        msg.response.headers.add("X-Powered-By", "PHP/8.1.2");
        msg.response.headers.add("X-AspNet-Version", "4.0.30319");
        let findings = XPoweredByRule::new().scan(&msg, AlertThreshold::Medium);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].evidence.as_deref(), Some("X-Powered-By: PHP/8.1.2"));
        assert_eq!(findings[0].cwe_id, Some(497));
        assert!(findings[0]
            .other_info
            .as_deref()
            .unwrap()
            .contains("X-AspNet-Version: 4.0.30319"));
    }
}
