//! Rate limit rules
//!
//! Rules throttling the requests sent to matching hosts, persisted under
//! `network.rateLimit`.

use std::fmt;
use std::str::FromStr;

use regex::Regex;

use super::host_pattern;
use crate::config::{shared, ConfigTree, SharedConfig, VersionedOptions};

const CURRENT_CONFIG_VERSION: i32 = 1;
const CONFIG_VERSION_KEY: &str = "network.rateLimit[@version]";

const ALL_RULES_KEY: &str = "network.rateLimit.rules.rule";
const RULE_DESCRIPTION: &str = "description";
const RULE_ENABLED: &str = "enabled";
const RULE_MATCH_REGEX: &str = "matchRegex";
const RULE_MATCH_STRING: &str = "matchString";
const RULE_REQUESTS_PER_SECOND: &str = "requestsPerSecond";
const RULE_GROUP_BY: &str = "groupBy";

/// How matching requests share the limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupBy {
    /// One limit for every host the rule matches
    #[default]
    Rule,
    /// One limit per matching host
    Host,
}

impl GroupBy {
    pub fn name(&self) -> &'static str {
        match self {
            GroupBy::Rule => "RULE",
            GroupBy::Host => "HOST",
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RULE" => Ok(GroupBy::Rule),
            "HOST" => Ok(GroupBy::Host),
            other => Err(format!("Unknown group by: {}", other)),
        }
    }
}

/// Limit of requests per second for the hosts matching a string or regex
#[derive(Debug, Clone)]
pub struct RateLimitRule {
    description: String,
    match_string: String,
    pattern: Option<Regex>,
    requests_per_second: u32,
    group_by: GroupBy,
    enabled: bool,
}

impl PartialEq for RateLimitRule {
    fn eq(&self, other: &Self) -> bool {
        self.description == other.description
            && self.match_string == other.match_string
            && self.is_match_regex() == other.is_match_regex()
            && self.requests_per_second == other.requests_per_second
            && self.group_by == other.group_by
            && self.enabled == other.enabled
    }
}

impl RateLimitRule {
    /// Create a rule, failing if `match_regex` is set and the string is not a valid regex
    pub fn new(
        description: impl Into<String>,
        match_string: impl Into<String>,
        match_regex: bool,
        requests_per_second: u32,
        group_by: GroupBy,
        enabled: bool,
    ) -> Result<Self, regex::Error> {
        let match_string = match_string.into();
        let pattern = if match_regex {
            Some(host_pattern(&match_string)?)
        } else {
            None
        };
        Ok(Self {
            description: description.into(),
            match_string,
            pattern,
            requests_per_second: requests_per_second.max(1),
            group_by,
            enabled,
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn match_string(&self) -> &str {
        &self.match_string
    }

    pub fn is_match_regex(&self) -> bool {
        self.pattern.is_some()
    }

    pub fn requests_per_second(&self) -> u32 {
        self.requests_per_second
    }

    pub fn group_by(&self) -> GroupBy {
        self.group_by
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the rule is enabled and matches the host
    pub fn applies_to(&self, host: &str) -> bool {
        if !self.enabled {
            return false;
        }
        match &self.pattern {
            Some(pattern) => pattern.is_match(host),
            None => host
                .to_ascii_lowercase()
                .contains(&self.match_string.to_ascii_lowercase()),
        }
    }
}

/// Options of the rate limit rules
pub struct RateLimitOptions {
    config: SharedConfig,
    rules: Vec<RateLimitRule>,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            config: shared(ConfigTree::new()),
            rules: Vec::new(),
        }
    }
}

impl VersionedOptions for RateLimitOptions {
    fn config_version_key(&self) -> &'static str {
        CONFIG_VERSION_KEY
    }

    fn current_version(&self) -> i32 {
        CURRENT_CONFIG_VERSION
    }

    fn update_config(&self, _tree: &mut ConfigTree, _from_version: i32) {}

    fn parse(&mut self, tree: &ConfigTree) {
        let mut rules: Vec<RateLimitRule> = Vec::new();
        for sub in tree.configurations_at(ALL_RULES_KEY) {
            let description = sub.get_string_or(RULE_DESCRIPTION, "");
            let match_string = sub.get_string_or(RULE_MATCH_STRING, "");
            if description.is_empty() || match_string.is_empty() {
                continue;
            }
            if rules.iter().any(|r| r.description == description) {
                tracing::warn!("Discarding rate limit rule with duplicated description: {}", description);
                continue;
            }
            let group_by = sub
                .get_string_or(RULE_GROUP_BY, GroupBy::Rule.name())
                .parse()
                .unwrap_or_else(|e| {
                    tracing::warn!("{}, using {}", e, GroupBy::Rule);
                    GroupBy::Rule
                });
            let requests_per_second = sub.get_int_or(RULE_REQUESTS_PER_SECOND, 1);
            match RateLimitRule::new(
                description,
                match_string,
                sub.get_bool_or(RULE_MATCH_REGEX, false),
                u32::try_from(requests_per_second).unwrap_or(1),
                group_by,
                sub.get_bool_or(RULE_ENABLED, true),
            ) {
                Ok(rule) => rules.push(rule),
                Err(e) => tracing::warn!("Ignoring rate limit rule with invalid regex: {}", e),
            }
        }
        self.rules = rules;
    }

    fn set_config(&mut self, config: SharedConfig) {
        self.config = config;
    }
}

impl RateLimitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    fn persist_rules(&self) {
        let mut tree = self.config.write();
        tree.clear_tree(ALL_RULES_KEY);
        for (i, rule) in self.rules.iter().enumerate() {
            let key = |name: &str| format!("{}({}).{}", ALL_RULES_KEY, i, name);
            tree.set_property(&key(RULE_DESCRIPTION), &rule.description);
            tree.set_property(&key(RULE_ENABLED), rule.enabled);
            tree.set_property(&key(RULE_MATCH_REGEX), rule.is_match_regex());
            tree.set_property(&key(RULE_MATCH_STRING), &rule.match_string);
            tree.set_property(&key(RULE_REQUESTS_PER_SECOND), rule.requests_per_second);
            tree.set_property(&key(RULE_GROUP_BY), rule.group_by);
        }
    }

    pub fn rules(&self) -> &[RateLimitRule] {
        &self.rules
    }

    pub fn rule(&self, description: &str) -> Option<&RateLimitRule> {
        self.rules.iter().find(|r| r.description == description)
    }

    /// Add a rule, replacing any with the same description
    pub fn add_rule(&mut self, rule: RateLimitRule) {
        match self.rules.iter_mut().find(|r| r.description == rule.description) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
        self.persist_rules();
    }

    pub fn remove_rule(&mut self, description: &str) -> bool {
        let Some(index) = self.rules.iter().position(|r| r.description == description) else {
            return false;
        };
        self.rules.remove(index);
        self.persist_rules();
        true
    }

    pub fn set_enabled(&mut self, description: &str, enabled: bool) -> bool {
        let Some(rule) = self.rules.iter_mut().find(|r| r.description == description) else {
            return false;
        };
        rule.enabled = enabled;
        self.persist_rules();
        true
    }

    /// First enabled rule matching the host
    pub fn find_rule(&self, host: &str) -> Option<&RateLimitRule> {
        self.rules.iter().find(|r| r.applies_to(host))
    }
}
