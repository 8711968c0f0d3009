//! Passive scan rules

mod app_error;
mod base64_disclosure;
mod cache_control;
mod cacheable;
mod clickjacking;
mod cors;
mod cross_domain_script;
mod csp;
mod csrf;
mod java_serialization;
mod pii;
mod private_ip;
mod reverse_tabnabbing;
mod server_banner;
mod session_id_url;
mod site_isolation;
mod source_code;
mod sri;
mod suspicious_comments;
mod timestamp;

pub use app_error::ApplicationErrorRule;
pub use base64_disclosure::Base64DisclosureRule;
pub use cache_control::CacheControlRule;
pub use cacheable::CacheableRule;
pub use clickjacking::AntiClickjackingRule;
pub use cors::CorsRule;
pub use cross_domain_script::CrossDomainScriptRule;
pub use csp::CspRule;
pub use csrf::CsrfRule;
pub use java_serialization::JavaSerializationRule;
pub use pii::PiiRule;
pub use private_ip::PrivateIpRule;
pub use reverse_tabnabbing::ReverseTabnabbingRule;
pub use server_banner::{ServerHeaderRule, XPoweredByRule};
pub use session_id_url::SessionIdInUrlRule;
pub use site_isolation::SiteIsolationRule;
pub use source_code::SourceCodeDisclosureRule;
pub use sri::SriRule;
pub use suspicious_comments::SuspiciousCommentsRule;
pub use timestamp::TimestampRule;

use scraper::{ElementRef, Html, Selector};

use crate::http::HttpMessage;

/// Elements matching a CSS selector
fn select<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

/// Start tag of an element as written in `source`, rebuilt from its attributes
/// when it cannot be found there
fn start_tag(source: &str, element: &ElementRef) -> String {
    let value = element.value();
    let open = format!("<{}", value.name());
    let lowercase = source.to_ascii_lowercase();

    let mut from = 0;
    while let Some(offset) = lowercase[from..].find(&open) {
        let start = from + offset;
        from = start + open.len();
        let delimited = lowercase[from..]
            .bytes()
            .next()
            .is_some_and(|b| b.is_ascii_whitespace() || b == b'>' || b == b'/');
        if !delimited {
            continue;
        }
        let Some(length) = tag_length(&source[start..]) else {
            break;
        };
        let tag = &source[start..start + length];
        let tag_lowercase = &lowercase[start..start + length];
        let same_attributes = value
            .attrs()
            .all(|(name, attr)| tag_lowercase.contains(name) && tag.contains(attr));
        if same_attributes {
            return tag.to_string();
        }
    }

    let mut tag = open;
    for (name, attr) in value.attrs() {
        tag.push_str(&format!(" {}=\"{}\"", name, attr));
    }
    tag.push('>');
    tag
}

/// Length of the tag starting at `source`, up to the first `>` outside quotes
fn tag_length(source: &str) -> Option<usize> {
    let mut quote = None;
    for (i, b) in source.bytes().enumerate() {
        match (quote, b) {
            (None, b'"' | b'\'') => quote = Some(b),
            (Some(q), _) if q == b => quote = None,
            (None, b'>') => return Some(i + 1),
            _ => {}
        }
    }
    None
}

/// Lowercased directive tokens of comma separated header values
fn directives<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    values
        .into_iter()
        .flat_map(|v| v.split(','))
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}

/// Host of `link` resolved against the request URL, lowercased
fn resolve_host(msg: &HttpMessage, link: &str) -> Option<String> {
    let base = msg.request.parsed_url()?;
    let resolved = base.join(link.trim()).ok()?;
    resolved.host_str().map(|h| h.to_lowercase())
}

/// Whether `link` points to a host other than the request's
fn is_other_host(msg: &HttpMessage, link: &str) -> bool {
    match (msg.request.host(), resolve_host(msg, link)) {
        (Some(own), Some(other)) => own != other,
        _ => false,
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use crate::http::{HttpMessage, Request, Response};

    /// GET message with the given response content type and body
    pub fn message(url: &str, content_type: &str, body: &str) -> HttpMessage {
        HttpMessage::new(
            Request::new("GET", url),
            Response::new(200)
                .with_header("Content-Type", content_type)
                .with_body(body),
        )
    }

    pub fn html(body: &str) -> HttpMessage {
        message("https://example.com/page", "text/html; charset=utf-8", body)
    }
}
