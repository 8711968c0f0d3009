//! Serialized Java objects in traffic

use std::sync::OnceLock;

use regex::Regex;

use crate::http::{Headers, HttpMessage};
use crate::scanner::findings::{Confidence, Finding, Severity};
use crate::scanner::passive::{AlertThreshold, PassiveRule};

/// Stream magic and version of a Java object stream
const MAGIC: [u8; 4] = [0xAC, 0xED, 0x00, 0x05];

fn base64_magic_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\brO0AB").expect("Invalid serialization regex"))
}

/// First header whose value holds a base64 encoded object stream
fn find_in_headers(headers: &Headers) -> Option<(&str, &str)> {
    headers
        .iter()
        .find(|(_, value)| base64_magic_regex().is_match(value))
}

/// Detects Java serialized objects in bodies and headers
pub struct JavaSerializationRule;

impl JavaSerializationRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JavaSerializationRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for JavaSerializationRule {
    fn plugin_id(&self) -> u32 {
        90002
    }

    fn name(&self) -> &str {
        "Java Serialization Object"
    }

    fn scan(&self, msg: &HttpMessage, _threshold: AlertThreshold) -> Vec<Finding> {
        let body = &msg.response.body;
        let (parameter, evidence) = if body.starts_with(&MAGIC) {
            (None, hex::encode(MAGIC))
        } else if let Some(m) = base64_magic_regex().find(&msg.response.body_text()) {
            (None, m.as_str().to_string())
        } else if let Some((name, _)) = find_in_headers(&msg.request.headers)
            .or_else(|| find_in_headers(&msg.response.headers))
        {
            (Some(name.to_string()), "rO0AB".to_string())
        } else {
            return Vec::new();
        };

        let mut finding = Finding::new(self.plugin_id(), self.name(), Severity::Medium, msg.url())
            .with_confidence(Confidence::High)
            .with_description(
                "Java Serialization seems to be in use. If not correctly validated, an attacker \
                 can send a specially crafted object. This can lead to a dangerous \"Remote Code \
                 Execution\". A magic sequence identifying JSO has been detected (Base64: rO0AB, \
                 Raw: 0xac, 0xed, 0x00, 0x05).",
            )
            .with_evidence(&evidence)
            .with_remediation(
                "Deserialization of untrusted data is inherently dangerous and should be avoided.",
            )
            .with_reference("https://cheatsheetseries.owasp.org/cheatsheets/Deserialization_Cheat_Sheet.html")
            .with_cwe(502)
            .with_wasc(20)
            .with_scanner("passive/java-serialization");
        if let Some(name) = parameter {
            finding = finding.with_parameter(&name);
        }

        vec![finding]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Request, Response};
    use crate::scanner::passive::rules::test_util;

    #[test]
    fn test_raw_stream() {
        let mut body = MAGIC.to_vec();
        body.extend_from_slice(b"\x73\x72\x00\x0ejava.util.Date");
        let msg = HttpMessage::new(
            Request::new("GET", "https://example.com/obj"),
            Response::new(200)
                .with_header("Content-Type", "application/x-java-serialized-object")
                .with_body(body),
        );
        let findings = JavaSerializationRule::new().scan(&msg, AlertThreshold::Medium);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].evidence.as_deref(), Some("aced0005"));
    }

    #[test]
    fn test_base64_in_body() {
        let msg = test_util::html(r#"<input name="state" value="rO0ABXNyABFqYXZhLnV0aWwuRGF0ZQ">"#);
        let findings = JavaSerializationRule::new().scan(&msg, AlertThreshold::Medium);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].evidence.as_deref(), Some("rO0AB"));
        assert!(findings[0].parameter.is_none());
    }

    #[test]
    fn test_request_header() {
        let mut msg = test_util::html("<p>hello</p>");
        msg.request.headers.add("Cookie", "session=rO0ABXNyABFqYXZh");
        let findings = JavaSerializationRule::new().scan(&msg, AlertThreshold::Medium);
        assert_eq!(findings[0].parameter.as_deref(), Some("Cookie"));
    }

    #[test]
    fn test_no_magic() {
        // Not on a word boundary
        let msg = test_util::html("<p>XrO0AB and plain text</p>");
        assert!(JavaSerializationRule::new().scan(&msg, AlertThreshold::Medium).is_empty());
    }
}
