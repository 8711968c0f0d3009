//! Storability and cacheability of responses, following RFC 7234

use chrono::DateTime;

use crate::http::HttpMessage;
use crate::scanner::findings::{Confidence, Finding, Severity};
use crate::scanner::passive::{AlertThreshold, PassiveRule};

use super::directives;

const CACHEABLE_STATUS: [u16; 11] = [200, 203, 204, 206, 300, 301, 404, 405, 410, 414, 501];

/// Lifetime assumed when the response sets none
const HEURISTIC_LIFETIME: i64 = 60 * 60 * 24 * 365;

enum Verdict {
    NonStorable(String),
    StorableNonCacheable(String),
    StorableCacheable {
        evidence: String,
        other_info: Option<&'static str>,
    },
}

/// Reports whether a shared cache may store and serve the response
pub struct CacheableRule;

impl CacheableRule {
    pub fn new() -> Self {
        Self
    }

    fn verdict(msg: &HttpMessage) -> Verdict {
        let request = &msg.request;
        let response = &msg.response;

        let method = request.method.to_uppercase();
        if !matches!(method.as_str(), "GET" | "HEAD" | "POST") {
            return Verdict::NonStorable(format!("{} ", request.method));
        }
        if !(100..600).contains(&response.status) {
            return Verdict::NonStorable(response.status.to_string());
        }

        let mut all = request.headers.get_all("pragma");
        all.extend(response.headers.get_all("pragma"));
        all.extend(request.headers.get_all("cache-control"));
        all.extend(response.headers.get_all("cache-control"));
        if let Some(token) = directives(all).into_iter().find(|d| d == "no-store") {
            return Verdict::NonStorable(token);
        }

        let cache_control = directives(response.headers.get_all("cache-control"));
        if let Some(token) = cache_control.iter().find(|d| *d == "private") {
            return Verdict::NonStorable(token.clone());
        }

        if request.headers.contains("authorization") {
            let compensated = cache_control
                .iter()
                .any(|d| d == "must-revalidate" || d == "public" || d.starts_with("s-maxage="));
            if !compensated {
                return Verdict::NonStorable("Authorization:".to_string());
            }
        }

        let expires = response.headers.get_all("expires");
        let explicit = !expires.is_empty()
            || cache_control
                .iter()
                .any(|d| d.starts_with("max-age=") || d.starts_with("s-maxage=") || d == "public");
        if !explicit && !CACHEABLE_STATUS.contains(&response.status) {
            return Verdict::NonStorable(response.status.to_string());
        }

        if let Some(token) = cache_control.iter().find(|d| *d == "no-cache") {
            return Verdict::StorableNonCacheable(token.clone());
        }

        let (lifetime, evidence, other_info) = match Self::lifetime(msg, &cache_control) {
            Some((lifetime, evidence)) => (lifetime, evidence, None),
            None => (
                HEURISTIC_LIFETIME,
                String::new(),
                Some(
                    "In the absence of an explicitly specified caching lifetime directive in the \
                     response, a liberal lifetime heuristic of 1 year was assumed. This is \
                     permitted by rfc7234.",
                ),
            ),
        };

        if lifetime > 0 {
            return Verdict::StorableCacheable { evidence, other_info };
        }

        match cache_control.iter().find(|d| {
            *d == "must-revalidate"
                || *d == "proxy-revalidate"
                || d.starts_with("s-maxage=")
                || d.starts_with("max-age=")
        }) {
            Some(token) => Verdict::StorableNonCacheable(token.clone()),
            None => Verdict::StorableCacheable {
                evidence: String::new(),
                other_info: Some(
                    "The content was stale, and retrieval of stale content from the cache is not \
                     blocked by the 'must-revalidate', 'proxy-revalidate', 's-maxage', or \
                     'max-age' response directives.",
                ),
            },
        }
    }

    /// Explicit lifetime in seconds: `s-maxage`, then `max-age`, then Expires minus Date
    fn lifetime(msg: &HttpMessage, cache_control: &[String]) -> Option<(i64, String)> {
        for prefix in ["s-maxage=", "max-age="] {
            let found: Vec<(i64, &String)> = cache_control
                .iter()
                .filter(|d| d.starts_with(prefix))
                .filter_map(|d| d[prefix.len()..].trim().parse().ok().map(|v| (v, d)))
                .collect();
            // Conflicting lifetimes are ignored
            if let [(lifetime, token)] = found.as_slice() {
                return Some((*lifetime, (*token).clone()));
            }
        }

        let expires = msg.response.headers.get_all("expires");
        let dates = msg.response.headers.get_all("date");
        let [expires] = expires.as_slice() else {
            return None;
        };
        let [date] = dates.as_slice() else {
            return None;
        };
        // An invalid expiry date means already expired
        let Ok(expires_at) = DateTime::parse_from_rfc2822(expires.trim()) else {
            return Some((0, expires.to_string()));
        };
        let date = DateTime::parse_from_rfc2822(date.trim()).ok()?;
        Some(((expires_at - date).num_seconds(), expires.to_string()))
    }
}

impl Default for CacheableRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveRule for CacheableRule {
    fn plugin_id(&self) -> u32 {
        10049
    }

    fn name(&self) -> &str {
        "Content Cacheability"
    }

    fn scan(&self, msg: &HttpMessage, _threshold: AlertThreshold) -> Vec<Finding> {
        let finding = match Self::verdict(msg) {
            Verdict::NonStorable(evidence) => {
                Finding::new(self.plugin_id(), "Non-Storable Content", Severity::Informational, msg.url())
                    .with_description(
                        "The response contents are not storable by caching components such as \
                         proxy servers. If the response does not contain sensitive, personal or \
                         user-specific information, it may benefit from being stored and cached, \
                         to improve performance.",
                    )
                    .with_remediation(
                        "The content may be marked as storable by ensuring that the request method \
                         is GET, HEAD or POST, no 'no-store' directive is present, the 'private' \
                         directive is not used, and the response status is understood by caches.",
                    )
                    .with_evidence(&evidence)
            }
            Verdict::StorableNonCacheable(evidence) => Finding::new(
                self.plugin_id(),
                "Storable but Non-Cacheable Content",
                Severity::Informational,
                msg.url(),
            )
            .with_description(
                "The response contents are storable by caching components such as proxy servers, \
                 but will not be retrieved directly from the cache, without validating the request \
                 upstream, in response to similar requests from other users.",
            )
            .with_evidence(&evidence),
            Verdict::StorableCacheable { evidence, other_info } => {
                let finding = Finding::new(
                    self.plugin_id(),
                    "Storable and Cacheable Content",
                    Severity::Informational,
                    msg.url(),
                )
                .with_description(
                    "The response contents are storable by caching components such as proxy \
                     servers, and may be retrieved directly from the cache, rather than from the \
                     origin server by the caching servers, in response to similar requests from \
                     other users. If the response data is sensitive, personal or user-specific, \
                     this may result in sensitive information being leaked.",
                )
                .with_remediation(
                    "Validate that the response does not contain sensitive, personal or \
                     user-specific information. If it does, consider the use of the \
                     \"Cache-Control: no-cache, no-store, must-revalidate, private\" headers.",
                )
                .with_evidence(&evidence);
                match other_info {
                    Some(info) => finding.with_other_info(info),
                    None => finding,
                }
            }
        };

        vec![finding
            .with_confidence(Confidence::Medium)
            .with_reference("https://tools.ietf.org/html/rfc7234")
            .with_cwe(524)
            .with_wasc(13)
            .with_scanner("passive/cacheable")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Request, Response};

    fn scan(request: Request, response: Response) -> Finding {
        let findings = CacheableRule::new().scan(&HttpMessage::new(request, response), AlertThreshold::Medium);
        assert_eq!(findings.len(), 1);
        findings.into_iter().next().unwrap()
    }

    fn get() -> Request {
        Request::new("GET", "https://example.com/")
    }

    #[test]
    fn test_non_storable() {
        let f = scan(Request::new("PUT", "https://example.com/"), Response::new(200));
        assert_eq!(f.name, "Non-Storable Content");
        assert_eq!(f.evidence.as_deref(), Some("PUT "));

        let f = scan(get(), Response::new(200).with_header("Cache-Control", "max-age=60, no-store"));
        assert_eq!(f.name, "Non-Storable Content");
        assert_eq!(f.evidence.as_deref(), Some("no-store"));

        let f = scan(get(), Response::new(200).with_header("Cache-Control", "private"));
        assert_eq!(f.evidence.as_deref(), Some("private"));

        let request = Request::builder().url("https://example.com/").header("Authorization", "Basic x").build();
        let f = scan(request, Response::new(200));
        assert_eq!(f.evidence.as_deref(), Some("Authorization:"));

        let f = scan(get(), Response::new(302));
        assert_eq!(f.evidence.as_deref(), Some("302"));
    }

    #[test]
    fn test_storable_non_cacheable() {
        let f = scan(get(), Response::new(200).with_header("Cache-Control", "no-cache"));
        assert_eq!(f.name, "Storable but Non-Cacheable Content");

        let f = scan(get(), Response::new(200).with_header("Cache-Control", "max-age=0"));
        assert_eq!(f.name, "Storable but Non-Cacheable Content");
        assert_eq!(f.evidence.as_deref(), Some("max-age=0"));
    }

    #[test]
    fn test_storable_cacheable() {
        let f = scan(get(), Response::new(200).with_header("Cache-Control", "public, max-age=3600"));
        assert_eq!(f.name, "Storable and Cacheable Content");
        assert_eq!(f.evidence.as_deref(), Some("max-age=3600"));

        let f = scan(
            get(),
            Response::new(200)
                .with_header("Date", "Mon, 01 Jan 2024 00:00:00 GMT")
                .with_header("Expires", "Mon, 01 Jan 2024 01:00:00 GMT"),
        );
        assert_eq!(f.name, "Storable and Cacheable Content");
        assert_eq!(f.evidence.as_deref(), Some("Mon, 01 Jan 2024 01:00:00 GMT"));

        let f = scan(get(), Response::new(200));
        assert_eq!(f.name, "Storable and Cacheable Content");
        assert!(f.other_info.unwrap().contains("1 year"));
    }

    #[test]
    fn test_expired_without_revalidation() {
        let f = scan(
            get(),
            Response::new(200)
                .with_header("Date", "Mon, 01 Jan 2024 00:00:00 GMT")
                .with_header("Expires", "0"),
        );
        assert_eq!(f.name, "Storable and Cacheable Content");
        assert!(f.other_info.unwrap().contains("stale"));
    }
}
