//! Application error disclosure

use std::sync::OnceLock;

use regex::Regex;

use crate::http::HttpMessage;
use crate::scanner::findings::{Confidence, Finding, Severity};
use crate::scanner::passive::{AlertThreshold, PassiveRule};

/// Error messages emitted by common platforms
const ERROR_STRINGS: &[&str] = &[
    "Microsoft OLE DB Provider for ODBC Drivers",
    "Microsoft OLE DB Provider for SQL Server",
    "ODBC Microsoft Access Driver",
    "ODBC SQL Server Driver",
    "Error Executing Database Query",
    "Unhandled Exception",
    "Server Error in '",
    "ASP.NET is configured to show verbose error messages",
    "System.Web.HttpException",
    "Traceback (most recent call last)",
    "Exception in thread \"",
    "javax.servlet.ServletException",
    "org.springframework.web.util.NestedServletException",
    "PHP Parse error",
    "PHP Warning",
    "PHP Error",
    "Warning: mysql_",
    "Warning: pg_",
    "You have an error in your SQL syntax",
    "SQLSTATE[",
    "Syntax error in string in query expression",
    "Stack Trace:",
    "The error occurred in",
    "Internal Server Error",
];

fn error_pattern_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?:\bORA-\d{5}\b|<b>(?:Fatal error|Parse error|Warning)</b>:|\bat (?:java|javax|org|com)\.[\w.$]+\([\w.]+:\d+\)|\bjava\.[a-z]+\.[A-Za-z]*Exception\b)",
        )
        .expect("Invalid error pattern regex")
    })
}

/// Looks for error messages that reveal implementation details
pub struct ApplicationErrorRule;

impl ApplicationErrorRule {
    pub fn new() -> Self {
        Self
    }

    fn finding(&self, msg: &HttpMessage, evidence: &str) -> Finding {
        Finding::new(self.plugin_id(), "Application Error Disclosure", Severity::Medium, msg.url())
            .with_confidence(Confidence::Medium)
            .with_description(
                "This page contains an error/warning message that may disclose sensitive \
                 information like the location of the file that produced the unhandled \
                 exception. This information can be used to launch further attacks against the \
                 web application.",
            )
            .with_evidence(evidence)
            .with_remediation(
                "Review the source code of this page. Implement custom error pages. Consider \
                 implementing a mechanism to provide a unique error reference/identifier to the \
                 client (browser) while logging the details on the server side and not exposing \
                 them to the user.",
            )
            .with_cwe(200)
            .with_wasc(13)
            .with_scanner("passive/app-error")
    }
}

impl Default for ApplicationErrorRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for ApplicationErrorRule {
    fn plugin_id(&self) -> u32 {
        90022
    }

    fn name(&self) -> &str {
        "Application Error Disclosure"
    }

    fn scan(&self, msg: &HttpMessage, threshold: AlertThreshold) -> Vec<Finding> {
        let response = &msg.response;
        if response.status == 404 {
            return Vec::new();
        }
        if response.content_type().is_some_and(|ct| ct.contains("application/wasm")) {
            return Vec::new();
        }

        if response.status == 500 {
            if threshold == AlertThreshold::High {
                return Vec::new();
            }
            let status_line = format!(
                "{} {} {}",
                response.http_version, response.status, response.status_text
            );
            return vec![self.finding(msg, status_line.trim_end())];
        }

        let body = response.body_text();
        if let Some(found) = ERROR_STRINGS.iter().find(|s| body.contains(*s)) {
            return vec![self.finding(msg, found)];
        }
        if let Some(m) = error_pattern_regex().find(&body) {
            return vec![self.finding(msg, m.as_str())];
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Request, Response};
    use crate::scanner::passive::rules::test_util;

    fn scan(msg: &HttpMessage, threshold: AlertThreshold) -> Vec<Finding> {
        ApplicationErrorRule::new().scan(msg, threshold)
    }

    #[test]
    fn test_internal_server_error_status() {
        let mut response = Response::new(500);
        response.status_text = "Internal Server Error".to_string();
        let msg = HttpMessage::new(Request::new("GET", "https://example.com/"), response);

        let findings = scan(&msg, AlertThreshold::Medium);
        assert_eq!(findings[0].evidence.as_deref(), Some("HTTP/1.1 500 Internal Server Error"));
        assert!(scan(&msg, AlertThreshold::High).is_empty());
    }

    #[test]
    fn test_error_strings_in_body() {
        let msg = test_util::html("<p>Warning: mysql_fetch_array() expects parameter 1</p>");
        assert_eq!(scan(&msg, AlertThreshold::Medium)[0].evidence.as_deref(), Some("Warning: mysql_"));

        let msg = test_util::html("<pre>ORA-00933: SQL command not properly ended</pre>");
        assert_eq!(scan(&msg, AlertThreshold::High)[0].evidence.as_deref(), Some("ORA-00933"));
    }

    #[test]
    fn test_ignored_responses() {
        let mut msg = test_util::html("Unhandled Exception");
        msg.response.status = 404;
        assert!(scan(&msg, AlertThreshold::Low).is_empty());

        let msg = test_util::message("https://example.com/a.wasm", "application/wasm", "Unhandled Exception");
        assert!(scan(&msg, AlertThreshold::Low).is_empty());

        assert!(scan(&test_util::html("<p>all good</p>"), AlertThreshold::Low).is_empty());
    }
}
