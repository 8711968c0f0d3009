//! Ordered, multi-valued HTTP headers

use serde::{Deserialize, Serialize};

/// Header list preserving order and duplicates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any existing one with the same name
    pub fn add(&mut self, name: &str, value: &str) {
        self.0.push((name.to_string(), value.to_string()));
    }

    /// Replace every header with this name
    pub fn set(&mut self, name: &str, value: &str) {
        self.remove(name);
        self.add(name, value);
    }

    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// First value of the header (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of the header (case-insensitive)
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Headers {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_valued() {
        let mut headers = Headers::new();
        headers.add("X-Frame-Options", "DENY");
        headers.add("x-frame-options", "SAMEORIGIN");

        assert_eq!(headers.get("X-FRAME-OPTIONS"), Some("DENY"));
        assert_eq!(headers.get_all("x-frame-options"), vec!["DENY", "SAMEORIGIN"]);

        headers.set("X-Frame-Options", "DENY");
        assert_eq!(headers.len(), 1);

        headers.remove("x-frame-options");
        assert!(headers.is_empty());
    }

    #[test]
    fn test_serde_as_pairs() {
        let headers: Headers = serde_json::from_str(r#"[["Server","nginx"]]"#).unwrap();
        assert_eq!(headers.get("server"), Some("nginx"));
    }
}
