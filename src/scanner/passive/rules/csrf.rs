//! Anti-CSRF Token Detection Rule

use std::collections::BTreeSet;

use scraper::{ElementRef, Html, Selector};

use crate::http::HttpMessage;
use crate::scanner::findings::{Confidence, Finding, Severity};
use crate::scanner::passive::{AlertThreshold, PassiveRule};

use super::{select, start_tag};

/// Field names recognised as anti-CSRF tokens
pub const DEFAULT_TOKEN_NAMES: &[&str] = &[
    "csrf",
    "_csrf",
    "csrfToken",
    "csrf_token",
    "csrfmiddlewaretoken",
    "anticsrf",
    "CSRFToken",
    "__RequestVerificationToken",
    "authenticity_token",
    "OWASP_CSRFTOKEN",
    "_csrfSecret",
    "__csrf_magic",
    "_token",
    "xsrf",
    "_xsrf",
    "XSRF-TOKEN",
];

/// Flags HTML forms that carry no known anti-CSRF token
pub struct CsrfRule {
    token_names: Vec<String>,
    ignore_list: Vec<String>,
}

impl CsrfRule {
    pub fn new() -> Self {
        Self {
            token_names: DEFAULT_TOKEN_NAMES.iter().map(|s| s.to_string()).collect(),
            ignore_list: Vec::new(),
        }
    }

    /// Replace the recognised token names
    pub fn with_token_names(mut self, names: Vec<String>) -> Self {
        self.token_names = names;
        self
    }

    /// Ids or names of forms that never raise an alert
    pub fn with_ignore_list(mut self, ignore: Vec<String>) -> Self {
        self.ignore_list = ignore;
        self
    }

    fn is_token(&self, name: &str) -> bool {
        self.token_names.iter().any(|t| t.eq_ignore_ascii_case(name))
    }

    fn is_ignored(&self, id: Option<&str>, name: Option<&str>) -> bool {
        [id, name]
            .into_iter()
            .flatten()
            .any(|v| self.ignore_list.iter().any(|i| i == v))
    }
}

impl Default for CsrfRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for CsrfRule {
    fn plugin_id(&self) -> u32 {
        10202
    }

    fn name(&self) -> &str {
        "Absence of Anti-CSRF Tokens"
    }

    fn scan(&self, msg: &HttpMessage, threshold: AlertThreshold) -> Vec<Finding> {
        if !msg.response.is_html() {
            return Vec::new();
        }
        if threshold == AlertThreshold::High && !msg.in_scope {
            return Vec::new();
        }

        let body = msg.response.body_text();
        let document = Html::parse_document(&body);
        let forms = select(&document, "form");
        let mut findings = Vec::new();

        for (index, form) in forms.iter().enumerate() {
            let element = form.value();
            if self.is_ignored(element.id(), element.attr("name")) {
                tracing::debug!(url = %msg.url(), "Ignoring form {} on the ignore list", index + 1);
                continue;
            }

            let fields = select_fields(form);
            if fields.iter().any(|f| self.is_token(f)) {
                continue;
            }

            let field_list = fields
                .iter()
                .map(|f| format!("\"{}\"", f))
                .collect::<Vec<_>>()
                .join(" ");
            let other_info = format!(
                "No known Anti-CSRF token [{}] was found in the following HTML form: [Form {}: {} ].",
                self.token_names.join(", "),
                index + 1,
                field_list
            );

            findings.push(
                Finding::new(self.plugin_id(), self.name(), Severity::Medium, msg.url())
                    .with_confidence(Confidence::Low)
                    .with_description(
                        "No Anti-CSRF tokens were found in a HTML submission form. A cross-site \
                         request forgery is an attack that involves forcing a victim to send an \
                         HTTP request to a target destination without their knowledge or intent \
                         in order to perform an action as the victim.",
                    )
                    .with_evidence(&start_tag(&body, form))
                    .with_other_info(&other_info)
                    .with_remediation(
                        "Use a vetted library or framework that does not allow this weakness to \
                         occur or provides constructs that make this weakness easier to avoid. \
                         For example, use anti-CSRF packages such as the OWASP CSRFGuard.",
                    )
                    .with_reference("https://cheatsheetseries.owasp.org/cheatsheets/Cross-Site_Request_Forgery_Prevention_Cheat_Sheet.html")
                    .with_cwe(352)
                    .with_wasc(9)
                    .with_scanner("passive/csrf"),
            );
        }

        findings
    }
}

/// Sorted, unique names (or ids) of the form's input fields
fn select_fields(form: &ElementRef) -> Vec<String> {
    let Ok(selector) = Selector::parse("input, select, textarea, button") else {
        return Vec::new();
    };
    form.select(&selector)
        .filter_map(|e| e.value().attr("name").or_else(|| e.value().id()))
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::passive::rules::test_util;

    const FORM_WITHOUT_TOKEN: &str = r#"<html><body>
        <form id="login" action="/login" method="post">
          <input name="username"><input name="password" type="password"><input name="username">
        </form></body></html>"#;

    #[test]
    fn test_form_without_token() {
        let findings = CsrfRule::new().scan(&test_util::html(FORM_WITHOUT_TOKEN), AlertThreshold::Medium);
        assert_eq!(findings.len(), 1);
        let info = findings[0].other_info.as_deref().unwrap();
        assert!(info.contains(r#"[Form 1: "password" "username" ]"#));
        assert!(findings[0].evidence.as_deref().unwrap().starts_with("<form"));
    }

    #[test]
    fn test_form_with_token() {
        let body = r#"<form action="/x" method="post">
            <input type="hidden" name="__RequestVerificationToken" value="abc">
            <input name="comment"></form>"#;
        assert!(CsrfRule::new().scan(&test_util::html(body), AlertThreshold::Medium).is_empty());

        let body = r#"<form><input name="CSRF_TOKEN"></form>"#;
        assert!(CsrfRule::new().scan(&test_util::html(body), AlertThreshold::Medium).is_empty());
    }

    #[test]
    fn test_ignore_list() {
        let rule = CsrfRule::new().with_ignore_list(vec!["login".to_string()]);
        assert!(rule.scan(&test_util::html(FORM_WITHOUT_TOKEN), AlertThreshold::Medium).is_empty());
    }

    #[test]
    fn test_high_threshold_only_in_scope() {
        let msg = test_util::html(FORM_WITHOUT_TOKEN);
        assert!(CsrfRule::new().scan(&msg, AlertThreshold::High).is_empty());
        assert_eq!(CsrfRule::new().scan(&msg.in_scope(), AlertThreshold::High).len(), 1);
    }
}
