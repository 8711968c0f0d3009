//! Cross-domain JavaScript inclusion

use scraper::Html;

use crate::http::HttpMessage;
use crate::scanner::findings::{Confidence, Finding, Severity};
use crate::scanner::passive::{AlertThreshold, PassiveRule};

use super::{is_other_host, select, start_tag};

/// Flags scripts loaded from other hosts without an integrity check
pub struct CrossDomainScriptRule;

impl CrossDomainScriptRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CrossDomainScriptRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for CrossDomainScriptRule {
    fn plugin_id(&self) -> u32 {
        10017
    }

    fn name(&self) -> &str {
        "Cross-Domain JavaScript Source File Inclusion"
    }

    fn scan(&self, msg: &HttpMessage, _threshold: AlertThreshold) -> Vec<Finding> {
        if !msg.response.is_html() {
            return Vec::new();
        }

        let body = msg.response.body_text();
        let document = Html::parse_document(&body);
        select(&document, "script[src]")
            .into_iter()
            .filter_map(|script| {
                let src = script.value().attr("src")?;
                let integrity = script.value().attr("integrity").unwrap_or("").trim();
                if !integrity.is_empty() || !is_other_host(msg, src) {
                    return None;
                }
                Some(
                    Finding::new(self.plugin_id(), self.name(), Severity::Low, msg.url())
                        .with_confidence(Confidence::Medium)
                        .with_description(
                            "The page includes one or more script files from a third-party domain.",
                        )
                        .with_parameter(src)
                        .with_evidence(&start_tag(&body, &script))
                        .with_remediation(
                            "Ensure JavaScript source files are loaded from only trusted sources, \
                             and the sources can't be controlled by end users of the application.",
                        )
                        .with_cwe(829)
                        .with_wasc(15)
                        .with_scanner("passive/cross-domain-script"),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::passive::rules::test_util;

    fn params(body: &str) -> Vec<String> {
        CrossDomainScriptRule::new()
            .scan(&test_util::html(body), AlertThreshold::Medium)
            .into_iter()
            .filter_map(|f| f.parameter)
            .collect()
    }

    #[test]
    fn test_third_party_script() {
        let findings = CrossDomainScriptRule::new().scan(
            &test_util::html(r#"<script src="https://cdn.other.org/lib.js"></script>"#),
            AlertThreshold::Medium,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].parameter.as_deref(), Some("https://cdn.other.org/lib.js"));
        assert_eq!(
            findings[0].evidence.as_deref(),
            Some(r#"<script src="https://cdn.other.org/lib.js">"#)
        );
    }

    #[test]
    fn test_evidence_as_written() {
        let body = r#"<SCRIPT type="text/javascript" src='https://cdn.other.org/lib.js' async></SCRIPT>"#;
        let findings = CrossDomainScriptRule::new().scan(&test_util::html(body), AlertThreshold::Medium);
        assert_eq!(
            findings[0].evidence.as_deref(),
            Some(r#"<SCRIPT type="text/javascript" src='https://cdn.other.org/lib.js' async>"#)
        );
    }

    #[test]
    fn test_same_host_and_integrity() {
        assert!(params(r#"<script src="/app.js"></script>"#).is_empty());
        assert!(params(r#"<script src="https://example.com/app.js"></script>"#).is_empty());
        assert!(params(
            r#"<script src="https://cdn.other.org/lib.js" integrity="sha384-abc"></script>"#
        )
        .is_empty());
    }

    #[test]
    fn test_empty_integrity_flagged() {
        assert_eq!(
            params(r#"<script src="//cdn.other.org/a.js" integrity=""></script>"#),
            vec!["//cdn.other.org/a.js"]
        );
    }
}
