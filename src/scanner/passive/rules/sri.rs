//! Sub Resource Integrity

use scraper::Html;

use crate::http::HttpMessage;
use crate::scanner::findings::{Confidence, Finding, Severity};
use crate::scanner::passive::{AlertThreshold, PassiveRule};

use super::{is_other_host, select, start_tag};

/// Elements that load sub resources, and the attribute holding their location
const SUB_RESOURCES: &[(&str, &str)] = &[
    ("script[src]", "src"),
    ("link[rel~=stylesheet][href]", "href"),
];

/// Flags scripts and stylesheets from other hosts lacking an `integrity` attribute
pub struct SriRule;

impl SriRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SriRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for SriRule {
    fn plugin_id(&self) -> u32 {
        90003
    }

    fn name(&self) -> &str {
        "Sub Resource Integrity Attribute Missing"
    }

    fn scan(&self, msg: &HttpMessage, _threshold: AlertThreshold) -> Vec<Finding> {
        if !msg.response.is_html() {
            return Vec::new();
        }

        let body = msg.response.body_text();
        let document = Html::parse_document(&body);
        let mut findings = Vec::new();
        for (css, attr) in SUB_RESOURCES {
            for element in select(&document, css) {
                let Some(location) = element.value().attr(attr) else {
                    continue;
                };
                if element.value().attr("integrity").is_some() || !is_other_host(msg, location) {
                    continue;
                }

                findings.push(
                    Finding::new(self.plugin_id(), self.name(), Severity::Medium, msg.url())
                        .with_confidence(Confidence::High)
                        .with_description(
                            "The integrity attribute is missing on a script or link tag served by \
                             an external server. The integrity tag prevents an attacker who have \
                             gained access to this server from injecting a malicious content.",
                        )
                        .with_evidence(&start_tag(&body, &element))
                        .with_remediation("Provide a valid integrity attribute to the tag.")
                        .with_reference(
                            "https://developer.mozilla.org/en-US/docs/Web/Security/Subresource_Integrity",
                        )
                        .with_cwe(345)
                        .with_wasc(15)
                        .with_scanner("passive/sri"),
                );
            }
        }

        findings
    }
}
