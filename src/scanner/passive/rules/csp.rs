//! Content Security Policy analysis
//!
//! Every policy in the response is evaluated; a source is allowed only
//! when all of them allow it.

use std::collections::HashMap;

use crate::http::HttpMessage;
use crate::scanner::findings::{Confidence, Finding, Severity};
use crate::scanner::passive::{AlertThreshold, PassiveRule};

const CSP: &str = "Content-Security-Policy";
const CSP_REPORT_ONLY: &str = "Content-Security-Policy-Report-Only";
const X_CSP: &str = "X-Content-Security-Policy";
const X_WEBKIT_CSP: &str = "X-WebKit-CSP";

/// Directives checked for wildcard sources, with their fallback chain
const CHECKED_DIRECTIVES: &[(&str, &[&str])] = &[
    ("script-src", &["default-src"]),
    ("script-src-elem", &["script-src", "default-src"]),
    ("script-src-attr", &["script-src", "default-src"]),
    ("style-src", &["default-src"]),
    ("style-src-elem", &["style-src", "default-src"]),
    ("style-src-attr", &["style-src", "default-src"]),
    ("img-src", &["default-src"]),
    ("connect-src", &["default-src"]),
    ("frame-src", &["child-src", "default-src"]),
    ("frame-ancestors", &[]),
    ("font-src", &["default-src"]),
    ("media-src", &["default-src"]),
    ("object-src", &["default-src"]),
    ("manifest-src", &["default-src"]),
    ("worker-src", &["child-src", "script-src", "default-src"]),
    ("form-action", &[]),
];

/// Directives that do not fall back to default-src
const DIRECTIVES_WITHOUT_FALLBACK: &[&str] = &["base-uri", "form-action", "frame-ancestors", "plugin-types", "report-uri", "sandbox"];

const WILDCARD_SOURCES: &[&str] = &["*", "http:", "https:", "http://*", "https://*", "*:*"];

/// A parsed policy: lowercased directive names to their source lists
struct Policy {
    directives: HashMap<String, Vec<String>>,
}

impl Policy {
    fn parse(text: &str) -> Self {
        let mut directives = HashMap::new();
        for part in text.split(';') {
            let mut tokens = part.split_whitespace();
            if let Some(name) = tokens.next() {
                // The first occurrence of a directive wins
                directives
                    .entry(name.to_lowercase())
                    .or_insert_with(|| tokens.map(|t| t.to_lowercase()).collect());
            }
        }
        Self { directives }
    }

    /// Source list in effect for `directive`, `None` when nothing restricts it
    fn effective(&self, directive: &str, fallbacks: &[&str]) -> Option<&Vec<String>> {
        std::iter::once(directive)
            .chain(fallbacks.iter().copied())
            .find_map(|d| self.directives.get(d))
    }

    fn allows_wildcard(&self, directive: &str, fallbacks: &[&str]) -> bool {
        match self.effective(directive, fallbacks) {
            None => true,
            Some(sources) => sources.iter().any(|s| WILDCARD_SOURCES.contains(&s.as_str())),
        }
    }

    /// Whether `keyword` is honoured for the directive.
    /// `'unsafe-inline'` is ignored alongside nonces, hashes or `'strict-dynamic'`.
    fn allows_keyword(&self, directive: &str, fallbacks: &[&str], keyword: &str) -> bool {
        match self.effective(directive, fallbacks) {
            None => true,
            Some(sources) => {
                let neutralized = keyword == "'unsafe-inline'"
                    && sources.iter().any(|s| {
                        s.starts_with("'nonce-")
                            || s.starts_with("'sha256-")
                            || s.starts_with("'sha384-")
                            || s.starts_with("'sha512-")
                            || s == "'strict-dynamic'"
                    });
                sources.iter().any(|s| s == keyword) && !neutralized
            }
        }
    }
}

/// Content Security Policy analysis passive scanner rule
pub struct CspRule;

impl CspRule {
    pub fn new() -> Self {
        Self
    }

    fn finding(&self, msg: &HttpMessage, name: &str, description: &str, severity: Severity, evidence: &str) -> Finding {
        Finding::new(self.plugin_id(), &format!("CSP: {}", name), severity, msg.url())
            .with_confidence(Confidence::High)
            .with_description(description)
            .with_parameter(CSP)
            .with_evidence(evidence)
            .with_remediation("Ensure that your web server, application server, load balancer, etc. is properly configured to set the Content-Security-Policy header.")
            .with_reference("https://developer.mozilla.org/en-US/docs/Web/HTTP/CSP")
            .with_reference("https://www.w3.org/TR/CSP/")
            .with_cwe(693)
            .with_wasc(15)
            .with_scanner("passive/csp")
    }
}

impl Default for CspRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for CspRule {
    fn plugin_id(&self) -> u32 {
        10055
    }

    fn name(&self) -> &str {
        "CSP"
    }

    fn scan(&self, msg: &HttpMessage, threshold: AlertThreshold) -> Vec<Finding> {
        let response = &msg.response;
        if !response.is_html() && threshold != AlertThreshold::Low {
            return Vec::new();
        }

        let mut findings = Vec::new();
        let headers = response.headers.get_all(CSP);

        for (legacy, label) in [(X_CSP, "X-Content-Security-Policy"), (X_WEBKIT_CSP, "X-WebKit-CSP")] {
            if let Some(value) = response.header(legacy) {
                let severity = if headers.is_empty() { Severity::Low } else { Severity::Informational };
                findings.push(
                    self.finding(
                        msg,
                        label,
                        "The response contains a deprecated, browser specific Content Security \
                         Policy header. Use the standard Content-Security-Policy header instead.",
                        severity,
                        value,
                    )
                    .with_parameter(legacy),
                );
            }
        }

        if headers.is_empty() {
            if let Some(value) = response.header(CSP_REPORT_ONLY) {
                findings.push(
                    self.finding(
                        msg,
                        "Header Set as Report-Only",
                        "The Content-Security-Policy-Report-Only header is set but no enforcing \
                         policy exists. Violations are only reported, not blocked.",
                        Severity::Informational,
                        value,
                    )
                    .with_parameter(CSP_REPORT_ONLY),
                );
            }
            return findings;
        }

        let policies: Vec<Policy> = headers.iter().map(|h| Policy::parse(h)).collect();
        let evidence = headers[0];
        let other_info = (headers.len() > 1).then(|| {
            format!(
                "The response contained {} Content-Security-Policy headers; they were evaluated \
                 together: {}",
                headers.len(),
                headers.join(" | ")
            )
        });
        let with_info = |finding: Finding| match &other_info {
            Some(info) => finding.with_other_info(info),
            None => finding,
        };

        let wildcard: Vec<&str> = CHECKED_DIRECTIVES
            .iter()
            .filter(|(d, fallbacks)| policies.iter().all(|p| p.allows_wildcard(d, fallbacks)))
            .map(|(d, _)| *d)
            .collect();
        let missing: Vec<&str> = DIRECTIVES_WITHOUT_FALLBACK
            .iter()
            .filter(|d| policies.iter().all(|p| !p.directives.contains_key(**d)))
            .copied()
            .collect();
        if !wildcard.is_empty() {
            let mut description = format!(
                "The following directives either allow wildcard sources (or ancestors), are not \
                 defined, or are overly broadly defined: {}",
                wildcard.join(", ")
            );
            if !missing.is_empty() {
                description.push_str(&format!(
                    ". The directive(s): {} are among the directives that do not fallback to \
                     default-src, missing/excluding them is the same as allowing anything.",
                    missing.join(", ")
                ));
            }
            findings.push(with_info(self.finding(msg, "Wildcard Directive", &description, Severity::Medium, evidence)));
        }

        let checks = [
            ("script-src", "'unsafe-inline'", "script-src unsafe-inline", "Inline scripts are allowed, which defeats much of the protection against cross-site scripting."),
            ("script-src", "'unsafe-eval'", "script-src unsafe-eval", "Scripts may evaluate strings as code, e.g. via eval()."),
            ("style-src", "'unsafe-inline'", "style-src unsafe-inline", "Inline styles are allowed, which may enable data exfiltration through CSS."),
        ];
        for (directive, keyword, name, description) in checks {
            if policies.iter().all(|p| p.allows_keyword(directive, &["default-src"], keyword)) {
                findings.push(with_info(self.finding(msg, name, description, Severity::Medium, evidence)));
            }
        }

        findings
    }
}
