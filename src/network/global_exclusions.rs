//! Global exclusions
//!
//! URLs excluded from everything, persisted under `network.globalExclusions`.

use regex::Regex;

use crate::config::{shared, ConfigTree, SharedConfig, VersionedOptions};

const CURRENT_CONFIG_VERSION: i32 = 1;
const CONFIG_VERSION_KEY: &str = "network.globalExclusions[@version]";

const ALL_EXCLUSIONS_KEY: &str = "network.globalExclusions.exclusion";
const EXCLUSION_NAME: &str = "name";
const EXCLUSION_VALUE: &str = "value";
const EXCLUSION_ENABLED: &str = "enabled";
const CONFIRM_REMOVE_KEY: &str = "network.globalExclusions.confirmRemove";

/// Well known noisy URLs, disabled by default
const BUILT_IN_EXCLUSIONS: &[(&str, &str)] = &[
    ("Extension - Image (ends with .extension)", r"(?i)^.*\.(?:gif|jpe?g|png|ico|icns|bmp|svg|webp)$"),
    ("Extension - Audio/Video (ends with .extension)", r"(?i)^.*\.(?:mp[34]|mpe?g|m4[av]|ogg|flac|wav|webm|avi|mov)$"),
    ("Extension - PDF & Office (ends with .extension)", r"(?i)^.*\.(?:pdf|docx?|xlsx?|pptx?)$"),
    ("Extension - Stylesheet, JavaScript (ends with .extension)", r"(?i)^.*\.(?:css|js)$"),
    ("Extension - Flash & related (ends with .extension)", r"(?i)^.*\.(?:swf|fla|flv)$"),
    ("Site - Mozilla Location Service", r"^https?://location\.services\.mozilla\.com.*$"),
    ("Site - Mozilla Aus5", r"^https?://aus5\.mozilla\.org.*$"),
    ("Site - Mozilla Telemetry", r"^https?://[^/]*\.telemetry\.mozilla\.org.*$"),
    ("Site - Google Safe Browsing", r"^https?://safebrowsing(?:-cache)?\.googleapis\.com.*$"),
    ("Site - Firefox Settings", r"^https?://firefox\.settings\.services\.mozilla\.com.*$"),
    ("Site - Google Update", r"^https?://update\.googleapis\.com.*$"),
];

/// A named regex of URLs to exclude
#[derive(Debug, Clone)]
pub struct GlobalExclusion {
    name: String,
    value: String,
    pattern: Option<Regex>,
    enabled: bool,
}

impl PartialEq for GlobalExclusion {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value == other.value && self.enabled == other.enabled
    }
}

impl GlobalExclusion {
    /// Create an exclusion, an invalid regex never matches
    pub fn new(name: impl Into<String>, value: impl Into<String>, enabled: bool) -> Self {
        let value = value.into();
        let pattern = match Regex::new(&format!("^(?:{})$", value)) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                tracing::warn!("Invalid global exclusion {:?}: {}", value, e);
                None
            }
        };
        Self {
            name: name.into(),
            value,
            pattern,
            enabled,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether the exclusion is enabled and matches the whole URL
    pub fn test(&self, url: &str) -> bool {
        self.enabled && self.pattern.as_ref().is_some_and(|p| p.is_match(url))
    }
}

fn built_in_exclusions() -> Vec<GlobalExclusion> {
    BUILT_IN_EXCLUSIONS
        .iter()
        .map(|(name, value)| GlobalExclusion::new(*name, *value, false))
        .collect()
}

/// Options of the global exclusions
pub struct GlobalExclusionsOptions {
    config: SharedConfig,
    exclusions: Vec<GlobalExclusion>,
    confirm_remove: bool,
}

impl Default for GlobalExclusionsOptions {
    fn default() -> Self {
        Self {
            config: shared(ConfigTree::new()),
            exclusions: built_in_exclusions(),
            confirm_remove: true,
        }
    }
}

impl VersionedOptions for GlobalExclusionsOptions {
    fn config_version_key(&self) -> &'static str {
        CONFIG_VERSION_KEY
    }

    fn current_version(&self) -> i32 {
        CURRENT_CONFIG_VERSION
    }

    fn update_config(&self, _tree: &mut ConfigTree, _from_version: i32) {}

    fn parse(&mut self, tree: &ConfigTree) {
        let mut exclusions: Vec<GlobalExclusion> = tree
            .configurations_at(ALL_EXCLUSIONS_KEY)
            .iter()
            .filter_map(|sub| {
                let name = sub.get_string_or(EXCLUSION_NAME, "");
                let value = sub.get_string_or(EXCLUSION_VALUE, "");
                if name.is_empty() || value.is_empty() {
                    return None;
                }
                Some(GlobalExclusion::new(name, value, sub.get_bool_or(EXCLUSION_ENABLED, true)))
            })
            .collect();

        for built_in in built_in_exclusions() {
            if !exclusions.iter().any(|e| e.name == built_in.name) {
                exclusions.push(built_in);
            }
        }
        self.exclusions = exclusions;
        self.confirm_remove = tree.get_bool_or(CONFIRM_REMOVE_KEY, true);
    }

    fn set_config(&mut self, config: SharedConfig) {
        self.config = config;
    }
}

impl GlobalExclusionsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    fn persist_exclusions(&self) {
        let mut tree = self.config.write();
        tree.clear_tree(ALL_EXCLUSIONS_KEY);
        for (i, exclusion) in self.exclusions.iter().enumerate() {
            let base = format!("{}({})", ALL_EXCLUSIONS_KEY, i);
            tree.set_property(&format!("{}.{}", base, EXCLUSION_NAME), &exclusion.name);
            tree.set_property(&format!("{}.{}", base, EXCLUSION_VALUE), &exclusion.value);
            tree.set_property(&format!("{}.{}", base, EXCLUSION_ENABLED), exclusion.enabled);
        }
    }

    pub fn exclusions(&self) -> &[GlobalExclusion] {
        &self.exclusions
    }

    pub fn add_exclusion(&mut self, exclusion: GlobalExclusion) {
        self.exclusions.push(exclusion);
        self.persist_exclusions();
    }

    pub fn remove_exclusion(&mut self, name: &str) -> bool {
        let Some(index) = self.exclusions.iter().position(|e| e.name == name) else {
            return false;
        };
        self.exclusions.remove(index);
        self.persist_exclusions();
        true
    }

    pub fn set_exclusion_enabled(&mut self, name: &str, enabled: bool) -> bool {
        let Some(exclusion) = self.exclusions.iter_mut().find(|e| e.name == name) else {
            return false;
        };
        exclusion.enabled = enabled;
        self.persist_exclusions();
        true
    }

    pub fn set_exclusions(&mut self, exclusions: Vec<GlobalExclusion>) {
        self.exclusions = exclusions;
        self.persist_exclusions();
    }

    pub fn is_confirm_remove(&self) -> bool {
        self.confirm_remove
    }

    pub fn set_confirm_remove(&mut self, confirm: bool) {
        self.confirm_remove = confirm;
        self.config.write().set_property(CONFIRM_REMOVE_KEY, confirm);
    }

    /// Whether any enabled exclusion matches the URL
    pub fn is_excluded(&self, url: &str) -> bool {
        self.exclusions.iter().any(|e| e.test(url))
    }
}
