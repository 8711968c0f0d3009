//! Cross-domain misconfiguration through CORS headers

use crate::http::HttpMessage;
use crate::scanner::findings::{Confidence, Finding, Severity};
use crate::scanner::passive::{AlertThreshold, PassiveRule};

const ACAO: &str = "Access-Control-Allow-Origin";
const ACAC: &str = "Access-Control-Allow-Credentials";
const ACEH: &str = "Access-Control-Expose-Headers";

/// Headers that should never be readable cross-origin
const SENSITIVE_HEADERS: &[&str] = &["authorization", "set-cookie", "x-api-key", "x-auth-token"];

const REMEDIATION: &str = "Ensure that sensitive data is not available in an unauthenticated \
                           manner (using IP address white-listing, for instance). Configure the \
                           \"Access-Control-Allow-Origin\" HTTP header to a more restrictive set \
                           of domains, or remove all CORS headers entirely, to allow the web \
                           browser to enforce the Same Origin Policy (SOP) in a more restrictive \
                           manner.";

/// Reports CORS headers that open the resource to other origins
pub struct CorsRule;

impl CorsRule {
    pub fn new() -> Self {
        Self
    }

    fn finding(&self, msg: &HttpMessage, description: &str, evidence: &str, cwe: u32) -> Finding {
        Finding::new(self.plugin_id(), self.name(), Severity::Medium, msg.url())
            .with_confidence(Confidence::Medium)
            .with_description(description)
            .with_evidence(evidence)
            .with_remediation(REMEDIATION)
            .with_reference("https://developer.mozilla.org/en-US/docs/Web/HTTP/CORS")
            .with_cwe(cwe)
            .with_wasc(14)
            .with_scanner("passive/cors")
    }
}

impl Default for CorsRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for CorsRule {
    fn plugin_id(&self) -> u32 {
        10098
    }

    fn name(&self) -> &str {
        "Cross-Domain Misconfiguration"
    }

    fn scan(&self, msg: &HttpMessage, _threshold: AlertThreshold) -> Vec<Finding> {
        let response = &msg.response;
        let mut findings = Vec::new();
        let credentials = response
            .header(ACAC)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

        if let Some(origin) = response.header(ACAO).map(str::trim) {
            let evidence = format!("{}: {}", ACAO, origin);
            if origin == "*" && !credentials {
                findings.push(self.finding(
                    msg,
                    "Web browser data loading may be possible, due to a Cross Origin Resource \
                     Sharing (CORS) misconfiguration on the web server.",
                    &evidence,
                    264,
                ));
            } else if origin.eq_ignore_ascii_case("null") {
                findings.push(self.finding(
                    msg,
                    "The CORS policy trusts the \"null\" origin, which any sandboxed document or \
                     local file can present.",
                    &evidence,
                    942,
                ));
            } else if msg
                .request
                .header("Origin")
                .is_some_and(|requested| requested.trim().eq_ignore_ascii_case(origin))
            {
                let finding = self.finding(
                    msg,
                    "The CORS policy reflects the request Origin into the \
                     \"Access-Control-Allow-Origin\" header. If any origin is reflected, every \
                     site can read this resource.",
                    &evidence,
                    942,
                );
                findings.push(if credentials {
                    finding.with_other_info("The response also allows credentials.")
                } else {
                    finding
                });
            }
        }

        if let Some(exposed) = response.header(ACEH) {
            let leaked: Vec<&str> = exposed
                .split(',')
                .map(str::trim)
                .filter(|h| SENSITIVE_HEADERS.iter().any(|s| s.eq_ignore_ascii_case(h)))
                .collect();
            if !leaked.is_empty() {
                findings.push(
                    self.finding(
                        msg,
                        "The CORS policy exposes sensitive response headers to other origins.",
                        &format!("{}: {}", ACEH, exposed),
                        200,
                    )
                    .with_other_info(&format!("Exposed headers: {}", leaked.join(", "))),
                );
            }
        }

        findings
    }
}
