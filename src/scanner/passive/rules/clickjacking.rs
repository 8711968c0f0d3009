//! Anti-clickjacking header checks

use scraper::Html;

use crate::http::HttpMessage;
use crate::scanner::findings::{Confidence, Finding, Severity};
use crate::scanner::passive::{AlertThreshold, PassiveRule};

use super::{select, start_tag};

const HEADER: &str = "X-Frame-Options";

/// Checks X-Frame-Options, unless CSP frame-ancestors takes its place
pub struct AntiClickjackingRule;

impl AntiClickjackingRule {
    pub fn new() -> Self {
        Self
    }

    fn finding(&self, msg: &HttpMessage, name: &str, description: &str, evidence: &str) -> Finding {
        Finding::new(self.plugin_id(), name, Severity::Medium, msg.url())
            .with_confidence(Confidence::Medium)
            .with_description(description)
            .with_parameter(&HEADER.to_lowercase())
            .with_evidence(evidence)
            .with_remediation(
                "Modern Web browsers support the Content-Security-Policy and X-Frame-Options HTTP \
                 headers. Ensure one of them is set on all web pages returned by your site/app. \
                 If you expect the page to be framed only by pages on your server (e.g. it's part \
                 of a FRAMESET) then you'll want to use SAMEORIGIN, otherwise if you never expect \
                 the page to be framed, you should use DENY.",
            )
            .with_reference("https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/X-Frame-Options")
            .with_cwe(1021)
            .with_wasc(15)
            .with_scanner("passive/clickjacking")
    }
}

impl Default for AntiClickjackingRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for AntiClickjackingRule {
    fn plugin_id(&self) -> u32 {
        10020
    }

    fn name(&self) -> &str {
        "Anti-clickjacking Header"
    }

    fn scan(&self, msg: &HttpMessage, threshold: AlertThreshold) -> Vec<Finding> {
        let response = &msg.response;
        let low = threshold == AlertThreshold::Low;
        if !low
            && (!response.is_html()
                || response.is_redirect()
                || response.is_client_error()
                || response.is_server_error())
        {
            return Vec::new();
        }

        let frame_ancestors = response
            .headers
            .get_all("content-security-policy")
            .iter()
            .any(|csp| csp.to_lowercase().contains("frame-ancestors"));
        if frame_ancestors && !low {
            return Vec::new();
        }

        let mut findings = Vec::new();
        let values = response.headers.get_all(HEADER);
        if values.is_empty() {
            findings.push(self.finding(
                msg,
                "Missing Anti-clickjacking Header",
                "The response does not protect against 'ClickJacking' attacks. It should include \
                 either Content-Security-Policy with 'frame-ancestors' directive or \
                 X-Frame-Options.",
                "",
            ));
        } else {
            for value in &values {
                let lower = value.to_lowercase();
                if !lower.contains("deny") && !lower.contains("sameorigin") {
                    findings.push(self.finding(
                        msg,
                        "X-Frame-Options Setting Malformed",
                        "An X-Frame-Options header was present in the response but the value was \
                         not correctly set.",
                        value,
                    ));
                }
            }
            if values.len() > 1 {
                findings.push(self.finding(
                    msg,
                    "Multiple X-Frame-Options Header Entries",
                    "X-Frame-Options (XFO) headers were found, a response with multiple XFO header \
                     entries may not be predictably treated by all user-agents.",
                    "",
                ));
            }
        }

        let body = response.body_text();
        let document = Html::parse_document(&body);
        if let Some(meta) = select(&document, "meta[http-equiv]")
            .into_iter()
            .find(|m| m.value().attr("http-equiv").is_some_and(|v| v.eq_ignore_ascii_case(HEADER)))
        {
            findings.push(self.finding(
                msg,
                "X-Frame-Options Defined via META (Non-compliant with Spec)",
                "An X-Frame-Options (XFO) META tag was found, defining XFO via a META tag is \
                 explicitly not supported by the spec (RFC 7034).",
                &start_tag(&body, &meta),
            ));
        }

        findings
    }
}
