//! Unix timestamp disclosure

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::http::HttpMessage;
use crate::scanner::findings::{Confidence, Finding, Severity};
use crate::scanner::passive::{AlertThreshold, PassiveRule};

/// Headers whose numeric values are expected
const IGNORED_HEADERS: &[&str] = &[
    "Age",
    "Cache-Control",
    "ETag",
    "Keep-Alive",
    "Strict-Transport-Security",
    "Report-To",
    "NEL",
    "Expect-CT",
];

/// 2001-09-09T01:46:40Z, the first 10 digit timestamp
const ZERO_DAY: i64 = 1_000_000_000;

/// 2038-01-19T03:14:07Z
const EPOCH_Y2038: i64 = i32::MAX as i64;

const YEAR: i64 = 365 * 24 * 60 * 60;

fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:1\d|2[0-2])\d{8}\b").expect("Invalid timestamp regex"))
}

/// Finds values that look like recent Unix timestamps
pub struct TimestampRule {
    now: Option<i64>,
}

impl TimestampRule {
    pub fn new() -> Self {
        Self { now: None }
    }

    /// Evaluate ranges against a fixed time instead of the clock
    pub fn with_now(mut self, now: i64) -> Self {
        self.now = Some(now);
        self
    }

    fn range(&self, threshold: AlertThreshold) -> (i64, i64) {
        let now = self.now.unwrap_or_else(|| Utc::now().timestamp());
        match threshold {
            AlertThreshold::High => (now - YEAR, now + YEAR),
            AlertThreshold::Low => (ZERO_DAY, EPOCH_Y2038),
            _ => (now - 10 * YEAR, (now + 10 * YEAR).min(EPOCH_Y2038)),
        }
    }
}

impl Default for TimestampRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for TimestampRule {
    fn plugin_id(&self) -> u32 {
        10096
    }

    fn name(&self) -> &str {
        "Timestamp Disclosure - Unix"
    }

    fn scan(&self, msg: &HttpMessage, threshold: AlertThreshold) -> Vec<Finding> {
        let response = &msg.response;
        if response.is_font() {
            return Vec::new();
        }
        let (start, stop) = self.range(threshold);

        let mut sources: Vec<(Option<&str>, String)> = response
            .headers
            .iter()
            .filter(|(name, _)| !IGNORED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)))
            .map(|(name, value)| (Some(name), value.to_string()))
            .collect();
        sources.push((None, response.body_text()));

        let mut reported: Vec<String> = Vec::new();
        let mut findings = Vec::new();
        for (header, text) in &sources {
            for m in timestamp_regex().find_iter(text) {
                let evidence = m.as_str();
                let Ok(value) = evidence.parse::<i64>() else {
                    continue;
                };
                if value < start || value > stop || reported.iter().any(|r| r == evidence) {
                    continue;
                }
                reported.push(evidence.to_string());

                let readable = DateTime::<Utc>::from_timestamp(value, 0)
                    .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                let finding = Finding::new(self.plugin_id(), self.name(), Severity::Low, msg.url())
                    .with_confidence(Confidence::Low)
                    .with_description("A timestamp was disclosed by the application/web server. - Unix")
                    .with_evidence(evidence)
                    .with_other_info(&format!("{}, which evaluates to: {}.", evidence, readable))
                    .with_remediation(
                        "Manually confirm that the timestamp data is not sensitive, and that the \
                         data cannot be aggregated to disclose exploitable patterns.",
                    )
                    .with_reference("https://cwe.mitre.org/data/definitions/200.html")
                    .with_cwe(200)
                    .with_wasc(13)
                    .with_scanner("passive/timestamp");
                findings.push(match header {
                    Some(name) => finding.with_parameter(name),
                    None => finding,
                });
            }
        }

        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::passive::rules::test_util;

    /// 2021-11-08T23:19:03Z
    const NOW: i64 = 1_636_413_543;

    fn evidence(msg: &HttpMessage, threshold: AlertThreshold) -> Vec<String> {
        TimestampRule::new()
            .with_now(NOW)
            .scan(msg, threshold)
            .into_iter()
            .filter_map(|f| f.evidence)
            .collect()
    }

    #[test]
    fn test_recent_timestamp() {
        let msg = test_util::html("<p>updated 1636000000</p>");
        let findings = TimestampRule::new().with_now(NOW).scan(&msg, AlertThreshold::Medium);
        assert_eq!(findings.len(), 1);
        assert_eq!(
            findings[0].other_info.as_deref(),
            Some("1636000000, which evaluates to: 2021-11-04 04:26:40.")
        );
    }

    #[test]
    fn test_ranges_per_threshold() {
        // 2002-01-01 and 2012-01-01
        let msg = test_util::html("<p>1009843200 1325376000</p>");
        assert_eq!(evidence(&msg, AlertThreshold::Low), vec!["1009843200", "1325376000"]);
        assert_eq!(evidence(&msg, AlertThreshold::Medium), vec!["1325376000"]);
        assert!(evidence(&msg, AlertThreshold::High).is_empty());
    }

    #[test]
    fn test_headers() {
        let mut msg = test_util::html("");
        msg.response.headers.add("ETag", "1636000000");
        assert!(evidence(&msg, AlertThreshold::Medium).is_empty());

        msg.response.headers.add("X-Generated", "1636000000");
        let findings = TimestampRule::new().with_now(NOW).scan(&msg, AlertThreshold::Medium);
        assert_eq!(findings[0].parameter.as_deref(), Some("X-Generated"));
    }

    #[test]
    fn test_fonts_and_out_of_pattern_values() {
        let msg = test_util::message("https://example.com/f.woff", "font/woff2", "1636000000");
        assert!(evidence(&msg, AlertThreshold::Low).is_empty());

        let msg = test_util::html("<p>2300000000 0999999999 16360000001</p>");
        assert!(evidence(&msg, AlertThreshold::Low).is_empty());
    }
}
