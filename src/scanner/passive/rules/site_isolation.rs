//! Site isolation headers (CORP, COEP, COOP)

use crate::http::{HttpMessage, Response};
use crate::scanner::findings::{Confidence, Finding, Severity};
use crate::scanner::passive::{AlertThreshold, PassiveRule};

const CORP: &str = "Cross-Origin-Resource-Policy";
const COEP: &str = "Cross-Origin-Embedder-Policy";
const COOP: &str = "Cross-Origin-Opener-Policy";

/// A header, the values it accepts and when it applies
struct IsolationHeader {
    name: &'static str,
    accepted: &'static [&'static str],
    applies: fn(&Response) -> bool,
    description: &'static str,
}

const HEADERS: &[IsolationHeader] = &[
    IsolationHeader {
        name: CORP,
        accepted: &["same-origin", "same-site", "cross-origin"],
        applies: corp_applies,
        description: "Cross-Origin-Resource-Policy header is an opt-in header designed to counter \
                      side-channels attacks like Spectre. Resource should be specifically set as \
                      shareable amongst different origins.",
    },
    IsolationHeader {
        name: COEP,
        accepted: &["require-corp", "credentialless"],
        applies: is_document,
        description: "Cross-Origin-Embedder-Policy header is a response header that prevents a \
                      document from loading any cross-origin resources that don't explicitly \
                      grant the document permission (using CORP or CORS).",
    },
    IsolationHeader {
        name: COOP,
        accepted: &["same-origin"],
        applies: is_document,
        description: "Cross-Origin-Opener-Policy header is a response header that allows a site \
                      to control if others included documents share the same browsing context. \
                      Sharing the same browsing context with untrusted documents might lead to \
                      data leak.",
    },
];

fn corp_applies(response: &Response) -> bool {
    response.is_success()
        && !response
            .headers
            .iter()
            .any(|(name, _)| name.to_lowercase().starts_with("access-control-allow-"))
}

fn is_document(response: &Response) -> bool {
    response.is_html() || response.is_xml()
}

/// Checks the headers that isolate a site from Spectre-style attacks
pub struct SiteIsolationRule;

impl SiteIsolationRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SiteIsolationRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for SiteIsolationRule {
    fn plugin_id(&self) -> u32 {
        90004
    }

    fn name(&self) -> &str {
        "Insufficient Site Isolation Against Spectre Vulnerability"
    }

    fn scan(&self, msg: &HttpMessage, _threshold: AlertThreshold) -> Vec<Finding> {
        let response = &msg.response;
        let mut findings = Vec::new();

        for header in HEADERS {
            if !(header.applies)(response) {
                continue;
            }
            let values = response.headers.get_all(header.name);
            let isolated = !values.is_empty()
                && values
                    .iter()
                    .all(|v| header.accepted.iter().any(|a| a.eq_ignore_ascii_case(v.trim())));
            if isolated {
                continue;
            }

            findings.push(
                Finding::new(self.plugin_id(), self.name(), Severity::Low, msg.url())
                    .with_confidence(Confidence::Medium)
                    .with_description(header.description)
                    .with_parameter(header.name)
                    .with_evidence(values.first().copied().unwrap_or(""))
                    .with_remediation(&format!(
                        "Ensure that the application/web server sets the {} header \
                         appropriately, to one of: {}.",
                        header.name,
                        header.accepted.join(", ")
                    ))
                    .with_reference("https://web.dev/why-coop-coep/")
                    .with_cwe(693)
                    .with_wasc(14)
                    .with_scanner("passive/site-isolation"),
            );
        }

        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::passive::rules::test_util;

    fn params(msg: &HttpMessage) -> Vec<String> {
        SiteIsolationRule::new()
            .scan(msg, AlertThreshold::Medium)
            .into_iter()
            .filter_map(|f| f.parameter)
            .collect()
    }

    #[test]
    fn test_all_missing_on_html() {
        assert_eq!(params(&test_util::html("<html></html>")), vec![CORP, COEP, COOP]);
    }

    #[test]
    fn test_isolated_document() {
        let mut msg = test_util::html("<html></html>");
        msg.response.headers.add(CORP, "same-origin");
        msg.response.headers.add(COEP, "require-corp");
        msg.response.headers.add(COOP, "same-origin");
        assert!(params(&msg).is_empty());

        msg.response.headers.set(COOP, "same-origin-allow-popups");
        assert_eq!(params(&msg), vec![COOP]);
    }

    #[test]
    fn test_non_document_only_corp() {
        let msg = test_util::message("https://example.com/a.png", "image/png", "");
        assert_eq!(params(&msg), vec![CORP]);
    }

    #[test]
    fn test_corp_skipped_for_cors_and_errors() {
        let mut msg = test_util::message("https://example.com/a.png", "image/png", "");
        msg.response.headers.add("Access-Control-Allow-Origin", "*");
        assert!(params(&msg).is_empty());

        let mut msg = test_util::message("https://example.com/a.png", "image/png", "");
        msg.response.status = 404;
        assert!(params(&msg).is_empty());
    }
}
