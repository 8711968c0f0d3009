//! Suspicious words in comments

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};
use scraper::Html;

use crate::http::HttpMessage;
use crate::scanner::findings::{Confidence, Finding, Severity};
use crate::scanner::passive::{AlertThreshold, PassiveRule};

use super::select;

pub const DEFAULT_WORDS: &[&str] = &[
    "TODO", "FIXME", "BUG", "BUGS", "XXX", "QUERY", "DB", "ADMIN", "ADMINISTRATOR", "USER", "USERNAME", "SELECT",
    "WHERE", "FROM", "LATER", "DEBUG",
];

/// Characters of the comment quoted in the other info
const SNIPPET_LENGTH: usize = 60;

fn html_comment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--(.*?)-->").expect("Invalid HTML comment regex"))
}

fn js_comment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/|//[^\r\n]*").expect("Invalid JS comment regex"))
}

/// Reports comments that may reveal sensitive details
pub struct SuspiciousCommentsRule {
    patterns: Vec<Regex>,
}

impl SuspiciousCommentsRule {
    pub fn new() -> Self {
        Self::with_words(DEFAULT_WORDS)
    }

    /// Rule matching the given words on word boundaries, case-insensitively
    pub fn with_words(words: &[&str]) -> Self {
        let patterns = words
            .iter()
            .filter_map(|word| {
                RegexBuilder::new(&format!(r"\b{}\b", regex::escape(word.trim())))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| tracing::warn!("Ignoring suspicious comment word {}: {}", word, e))
                    .ok()
            })
            .collect();
        Self { patterns }
    }

    /// Text blocks to inspect: the body of JavaScript, comments of HTML
    fn comments(msg: &HttpMessage) -> Vec<String> {
        let body = msg.response.body_text();
        if msg.response.is_javascript() {
            return body.lines().map(str::to_string).collect();
        }
        if !msg.response.is_html() {
            return Vec::new();
        }

        let mut comments: Vec<String> = html_comment_regex()
            .captures_iter(&body)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect();

        let document = Html::parse_document(&body);
        for script in select(&document, "script") {
            let code: String = script.text().collect();
            comments.extend(js_comment_regex().find_iter(&code).map(|m| m.as_str().to_string()));
        }
        comments
    }
}

impl Default for SuspiciousCommentsRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for SuspiciousCommentsRule {
    fn plugin_id(&self) -> u32 {
        10027
    }

    fn name(&self) -> &str {
        "Information Disclosure - Suspicious Comments"
    }

    fn scan(&self, msg: &HttpMessage, _threshold: AlertThreshold) -> Vec<Finding> {
        let comments = Self::comments(msg);
        let mut findings = Vec::new();

        for pattern in &self.patterns {
            let hit = comments
                .iter()
                .find_map(|c| pattern.find(c).map(|m| (m.as_str().to_string(), c)));
            let Some((evidence, comment)) = hit else {
                continue;
            };
            let snippet: String = comment.trim().chars().take(SNIPPET_LENGTH).collect();

            findings.push(
                Finding::new(self.plugin_id(), self.name(), Severity::Informational, msg.url())
                    .with_confidence(Confidence::Low)
                    .with_description(
                        "The response appears to contain suspicious comments which may help an \
                         attacker.",
                    )
                    .with_evidence(&evidence)
                    .with_other_info(&format!(
                        "The following pattern was used: {} and was detected in the element \
                         starting with: \"{}\", see evidence field for the suspicious \
                         comment/snippet.",
                        pattern.as_str(),
                        snippet
                    ))
                    .with_remediation(
                        "Remove all comments that return information that may help an attacker \
                         and fix any underlying problems they refer to.",
                    )
                    .with_cwe(615)
                    .with_wasc(13)
                    .with_scanner("passive/suspicious-comments"),
            );
        }

        findings
    }
}
