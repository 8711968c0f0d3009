//! Reverse tabnabbing through links opened in new windows

use regex::{Regex, RegexBuilder};
use scraper::Html;

use crate::http::HttpMessage;
use crate::scanner::findings::{Confidence, Finding, Severity};
use crate::scanner::passive::{AlertThreshold, PassiveRule};

use super::{resolve_host, select, start_tag};

/// Flags links to other domains that leave `window.opener` reachable
pub struct ReverseTabnabbingRule {
    trusted_domains: Vec<Regex>,
}

impl ReverseTabnabbingRule {
    pub fn new() -> Self {
        Self {
            trusted_domains: Vec::new(),
        }
    }

    /// Domains, as regular expressions, whose links are never reported
    pub fn with_trusted_domains(mut self, patterns: &[&str]) -> Self {
        self.trusted_domains = patterns
            .iter()
            .filter_map(|p| {
                RegexBuilder::new(&format!("^(?:{})$", p.trim()))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| tracing::warn!("Ignoring invalid trusted domain {}: {}", p, e))
                    .ok()
            })
            .collect();
        self
    }

    fn is_trusted(&self, host: &str) -> bool {
        self.trusted_domains.iter().any(|re| re.is_match(host))
    }
}

impl Default for ReverseTabnabbingRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for ReverseTabnabbingRule {
    fn plugin_id(&self) -> u32 {
        10108
    }

    fn name(&self) -> &str {
        "Reverse Tabnabbing"
    }

    fn scan(&self, msg: &HttpMessage, threshold: AlertThreshold) -> Vec<Finding> {
        if !msg.response.is_html() {
            return Vec::new();
        }
        let own_host = msg.request.host().unwrap_or_default();

        let body = msg.response.body_text();
        let document = Html::parse_document(&body);
        let vulnerable = select(&document, "a[href][target], area[href][target]")
            .into_iter()
            .find(|link| {
                let element = link.value();
                let target = element.attr("target").unwrap_or("").trim().to_lowercase();
                let opens_window = if threshold == AlertThreshold::High {
                    target == "_blank"
                } else {
                    !matches!(target.as_str(), "" | "_self" | "_parent" | "_top")
                };
                if !opens_window {
                    return false;
                }

                let rel = element.attr("rel").unwrap_or("").to_lowercase();
                if rel
                    .split_whitespace()
                    .any(|r| r == "noopener" || r == "noreferrer")
                {
                    return false;
                }

                match element.attr("href").and_then(|href| resolve_host(msg, href)) {
                    Some(host) => host != own_host && !self.is_trusted(&host),
                    None => false,
                }
            });

        let Some(link) = vulnerable else {
            return Vec::new();
        };

        vec![Finding::new(self.plugin_id(), self.name(), Severity::Medium, msg.url())
            .with_confidence(Confidence::Medium)
            .with_description(
                "At least one link on this page is vulnerable to Reverse tabnabbing as it uses a \
                 target attribute without using both of the \"noopener\" and \"noreferrer\" \
                 keywords in the \"rel\" attribute, which allows the target page to take control \
                 of this page.",
            )
            .with_evidence(&start_tag(&body, &link))
            .with_remediation(
                "Do not use a target attribute, or if you have to then also add the attribute: \
                 rel=\"noopener noreferrer\".",
            )
            .with_reference("https://owasp.org/www-community/attacks/Reverse_Tabnabbing")
            .with_reference("https://mathiasbynens.github.io/rel-noopener/")
            .with_cwe(1022)
            .with_scanner("passive/reverse-tabnabbing")]
    }
}
