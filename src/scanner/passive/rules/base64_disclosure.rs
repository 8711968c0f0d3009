//! Base64-encoded data in responses

use std::sync::OnceLock;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use regex::Regex;

use crate::http::HttpMessage;
use crate::scanner::findings::{Confidence, Finding, Severity};
use crate::scanner::passive::{AlertThreshold, PassiveRule};

fn base64_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-zA-Z0-9+\\/\-_]{30,}={0,2}").expect("Invalid base64 regex"))
}

/// Decoder tolerant of missing padding
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decode a candidate, mapping the URL-safe alphabet onto the standard one
fn decode(candidate: &str) -> Option<Vec<u8>> {
    let standard: String = candidate
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();
    LENIENT.decode(standard).ok()
}

/// Whether random base64 text of this length would plausibly lack a character class
fn is_plausible(candidate: &str, threshold: AlertThreshold) -> bool {
    let limit = match threshold {
        AlertThreshold::Low => 0.10,
        AlertThreshold::High => 0.50,
        _ => 0.25,
    };
    let n = candidate.len() as i32;
    let no_digit = (54.0f64 / 64.0).powi(n);
    let no_alpha = (12.0f64 / 64.0).powi(n);
    let no_case = (38.0f64 / 64.0).powi(n);

    let excluded = (!candidate.chars().any(|c| c.is_ascii_digit()) && no_digit < limit)
        || (!candidate.chars().any(|c| c.is_ascii_alphabetic()) && no_alpha < limit)
        || (!candidate.chars().any(|c| c.is_ascii_lowercase()) && no_case < limit)
        || (!candidate.chars().any(|c| c.is_ascii_uppercase()) && no_case < limit);
    !excluded
}

/// Reports Base64 encoded data found in headers or the body
pub struct Base64DisclosureRule;

impl Base64DisclosureRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Base64DisclosureRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for Base64DisclosureRule {
    fn plugin_id(&self) -> u32 {
        10094
    }

    fn name(&self) -> &str {
        "Base64 Disclosure"
    }

    fn scan(&self, msg: &HttpMessage, threshold: AlertThreshold) -> Vec<Finding> {
        let headers: String = msg
            .response
            .headers
            .iter()
            .map(|(name, value)| format!("{}: {}\r\n", name, value))
            .collect();
        let body = msg.response.body_text();

        let mut findings = Vec::new();
        for haystack in [&headers, &body] {
            for m in base64_regex().find_iter(haystack) {
                let candidate = m.as_str();
                let Some(decoded) = decode(candidate) else {
                    tracing::trace!("{} could not be decoded as Base64 data", candidate);
                    continue;
                };
                if !is_plausible(candidate, threshold) {
                    tracing::trace!("Excluded candidate Base64 on probabilistic grounds: {}", candidate);
                    continue;
                }

                findings.push(
                    Finding::new(self.plugin_id(), self.name(), Severity::Informational, msg.url())
                        .with_confidence(Confidence::Medium)
                        .with_description(
                            "Base64 encoded data was disclosed by the application/web server. \
                             Note: in the interests of performance not all base64 strings in the \
                             response were analyzed individually, the entire response should be \
                             looked at by the analyst/security team/developer(s).",
                        )
                        .with_evidence(candidate)
                        .with_other_info(&format!(
                            "{}\n\ndecodes to:\n{}",
                            candidate,
                            String::from_utf8_lossy(&decoded)
                        ))
                        .with_remediation(
                            "Manually confirm that the Base64 data does not leak sensitive \
                             information, and that the data cannot be aggregated/used to exploit \
                             other vulnerabilities.",
                        )
                        .with_reference("https://projects.webappsec.org/w/page/13246936/Information%20Leakage")
                        .with_cwe(200)
                        .with_wasc(13)
                        .with_scanner("passive/base64"),
                );
                if threshold != AlertThreshold::Low {
                    return findings;
                }
            }
        }

        findings
    }
}
