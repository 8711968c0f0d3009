//! Private IP disclosure

use std::net::Ipv4Addr;
use std::sync::OnceLock;

use ipnet::Ipv4Net;
use regex::Regex;

use crate::http::HttpMessage;
use crate::scanner::findings::{Confidence, Finding, Severity};
use crate::scanner::passive::{AlertThreshold, PassiveRule};

fn private_ip_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"\b(?:",
            r"10\.\d{1,3}\.\d{1,3}\.\d{1,3}",
            r"|172\.(?:1[6-9]|2\d|3[01])\.\d{1,3}\.\d{1,3}",
            r"|192\.168\.\d{1,3}\.\d{1,3}",
            r"|ip-10-\d{1,3}-\d{1,3}-\d{1,3}",
            r"|ip-172-(?:1[6-9]|2\d|3[01])-\d{1,3}-\d{1,3}",
            r"|ip-192-168-\d{1,3}-\d{1,3}",
            r")(?::(?:6553[0-5]|655[0-2]\d|65[0-4]\d{2}|6[0-4]\d{3}|[1-5]\d{4}|[1-9]\d{0,3}|0))?\b",
        ))
        .expect("Invalid private IP regex")
    })
}

const PRIVATE_NETWORKS: &[&str] = &["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"];

fn private_networks() -> &'static [Ipv4Net] {
    static NETS: OnceLock<Vec<Ipv4Net>> = OnceLock::new();
    NETS.get_or_init(|| {
        PRIVATE_NETWORKS
            .iter()
            .map(|net| net.parse().expect("Invalid private network"))
            .collect()
    })
}

/// Whether a dotted or EC2 style (`ip-10-0-0-1`) address is a private IPv4 address
fn is_private_address(address: &str) -> bool {
    let dotted = match address.strip_prefix("ip-") {
        Some(rest) => rest.replace('-', "."),
        None => address.to_string(),
    };
    dotted
        .parse::<Ipv4Addr>()
        .is_ok_and(|ip| private_networks().iter().any(|net| net.contains(&ip)))
}

/// Finds RFC 1918 addresses and AWS internal host names in responses
pub struct PrivateIpRule;

impl PrivateIpRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PrivateIpRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for PrivateIpRule {
    fn plugin_id(&self) -> u32 {
        2
    }

    fn name(&self) -> &str {
        "Private IP Disclosure"
    }

    fn scan(&self, msg: &HttpMessage, threshold: AlertThreshold) -> Vec<Finding> {
        let host = msg.request.host().unwrap_or_default();
        let body = msg.response.body_text();

        let mut matches: Vec<&str> = Vec::new();
        for m in private_ip_regex().find_iter(&body) {
            let candidate = m.as_str();
            let address = candidate.split(':').next().unwrap_or(candidate);
            if !is_private_address(address) {
                continue;
            }
            if threshold != AlertThreshold::Low && address.eq_ignore_ascii_case(&host) {
                continue;
            }
            if !matches.contains(&candidate) {
                matches.push(candidate);
            }
        }

        let Some(first) = matches.first() else {
            return Vec::new();
        };

        vec![Finding::new(self.plugin_id(), self.name(), Severity::Low, msg.url())
            .with_confidence(Confidence::Medium)
            .with_description(
                "A private IP (such as 10.x.x.x, 172.x.x.x, 192.168.x.x) or an Amazon EC2 private \
                 hostname (for example, ip-10-0-56-78) has been found in the HTTP response body. \
                 This information might be helpful for further attacks targeting internal systems.",
            )
            .with_evidence(first)
            .with_other_info(&matches.join("\n"))
            .with_remediation(
                "Remove the private IP address from the HTTP response body. For comments, use \
                 JSP/ASP/PHP comment instead of HTML/JavaScript comment which can be seen by \
                 client browsers.",
            )
            .with_reference("https://tools.ietf.org/html/rfc1918")
            .with_cwe(497)
            .with_wasc(13)
            .with_scanner("passive/private-ip")]
    }
}
