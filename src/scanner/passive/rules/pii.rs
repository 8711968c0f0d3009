//! Personally identifiable information: credit card numbers

use std::sync::OnceLock;

use regex::Regex;

use crate::http::HttpMessage;
use crate::scanner::findings::{Confidence, Finding, Severity};
use crate::scanner::passive::{AlertThreshold, PassiveRule};

const CARD_PATTERNS: &[(&str, &str)] = &[
    ("American Express", r"\b3[47][0-9]{13}\b"),
    ("Diners Club", r"\b3(?:0[0-5]|[68][0-9])[0-9]{11}\b"),
    ("Discover", r"\b6(?:011|5[0-9]{2})[0-9]{12}\b"),
    ("Jcb", r"\b(?:2131|1800|35[0-9]{3})[0-9]{11}\b"),
    ("Maestro", r"\b(?:5[0678][0-9]{2}|6304|6390|67[0-9]{2})[0-9]{8,15}\b"),
    ("Mastercard", r"\b(?:5[1-5][0-9]{2}|222[1-9]|22[3-9][0-9]|2[3-6][0-9]{2}|27[01][0-9]|2720)[0-9]{12}\b"),
    ("Visa", r"\b4[0-9]{12}(?:[0-9]{3})?\b"),
];

fn card_regexes() -> &'static [(&'static str, Regex)] {
    static RES: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    RES.get_or_init(|| {
        CARD_PATTERNS
            .iter()
            .map(|(name, pattern)| (*name, Regex::new(pattern).expect("Invalid credit card regex")))
            .collect()
    })
}

/// Luhn checksum of a digit string
fn luhn_valid(number: &str) -> bool {
    let mut sum = 0;
    for (i, c) in number.chars().rev().enumerate() {
        let Some(mut digit) = c.to_digit(10) else {
            return false;
        };
        if i % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }
    !number.is_empty() && sum % 10 == 0
}

/// Whether the digits at `start..end` are part of a decimal or exponent
fn in_numeric_context(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let mut after = text[end..].chars();
    let (next, next2) = (after.next(), after.next());

    before == Some('.')
        || (next == Some('.') && next2.is_some_and(|c| c.is_ascii_digit()))
        || (matches!(next, Some('e') | Some('E'))
            && next2.is_some_and(|c| c.is_ascii_digit() || c == '+' || c == '-'))
}

/// Finds credit card numbers in responses
pub struct PiiRule;

impl PiiRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PiiRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for PiiRule {
    fn plugin_id(&self) -> u32 {
        10062
    }

    fn name(&self) -> &str {
        "PII Disclosure"
    }

    fn scan(&self, msg: &HttpMessage, threshold: AlertThreshold) -> Vec<Finding> {
        let response = &msg.response;
        if response.is_css() || response.is_image() || response.is_font() {
            return Vec::new();
        }
        let is_pdf = response.content_type().is_some_and(|ct| ct.contains("pdf"));
        if threshold != AlertThreshold::Low && (is_pdf || response.is_javascript()) {
            return Vec::new();
        }

        let body = response.body_text();
        let mut reported: Vec<String> = Vec::new();
        let mut findings = Vec::new();

        for (card, re) in card_regexes() {
            for m in re.find_iter(&body) {
                let number = m.as_str();
                if reported.iter().any(|r| r == number) || !luhn_valid(number) {
                    continue;
                }
                if threshold != AlertThreshold::Low && in_numeric_context(&body, m.start(), m.end()) {
                    continue;
                }
                reported.push(number.to_string());

                findings.push(
                    Finding::new(self.plugin_id(), self.name(), Severity::High, msg.url())
                        .with_confidence(Confidence::High)
                        .with_description(
                            "The response contains Personally Identifiable Information, such as \
                             CC number, SSN and similar sensitive data.",
                        )
                        .with_evidence(number)
                        .with_other_info(&format!("Credit Card Type detected: {}", card))
                        .with_remediation(
                            "Check the response for the potential presence of personally \
                             identifiable information (PII), ensure nothing sensitive is leaked by \
                             the application.",
                        )
                        .with_cwe(359)
                        .with_wasc(13)
                        .with_scanner("passive/pii"),
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

    fn scan(body: &str, threshold: AlertThreshold) -> Vec<Finding> {
        PiiRule::new().scan(&test_util::html(body), threshold)
    }

    #[test]
    fn test_luhn() {
        assert!(luhn_valid("4111111111111111"));
        assert!(luhn_valid("378282246310005"));
        assert!(!luhn_valid("4111111111111112"));
        assert!(!luhn_valid(""));
    }

    #[test]
    fn test_credit_cards() {
        let findings = scan("<p>Visa 4111111111111111, Amex 378282246310005</p>", AlertThreshold::Medium);
        let info: Vec<&str> = findings.iter().filter_map(|f| f.other_info.as_deref()).collect();
        assert_eq!(
            info,
            vec!["Credit Card Type detected: American Express", "Credit Card Type detected: Visa"]
        );
    }

    #[test]
    fn test_invalid_checksum_ignored() {
        assert!(scan("<p>4111111111111112</p>", AlertThreshold::Low).is_empty());
    }

    #[test]
    fn test_numeric_context_only_at_low() {
        let body = "<p>value 0.4111111111111111</p>";
        assert!(scan(body, AlertThreshold::Medium).is_empty());
        assert_eq!(scan(body, AlertThreshold::Low).len(), 1);
    }

    #[test]
    fn test_content_types() {
        let msg = test_util::message("https://example.com/a.js", "application/javascript", "4111111111111111");
        assert!(PiiRule::new().scan(&msg, AlertThreshold::Medium).is_empty());
        assert_eq!(PiiRule::new().scan(&msg, AlertThreshold::Low).len(), 1);

        let msg = test_util::message("https://example.com/a.css", "text/css", "4111111111111111");
        assert!(PiiRule::new().scan(&msg, AlertThreshold::Low).is_empty());
    }
}
