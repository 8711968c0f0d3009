//! Passive security scanner
//!
//! Inspects completed HTTP messages without modifying them. Every rule runs
//! at an alert threshold; `Off` disables it.

pub mod rules;

use serde::{Deserialize, Serialize};

use crate::http::HttpMessage;
use crate::scanner::findings::Finding;

/// How eagerly a rule raises alerts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertThreshold {
    Off,
    Low,
    #[default]
    Medium,
    High,
}

impl AlertThreshold {
    pub fn name(&self) -> &'static str {
        match self {
            AlertThreshold::Off => "off",
            AlertThreshold::Low => "low",
            AlertThreshold::Medium => "medium",
            AlertThreshold::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "off" => Some(AlertThreshold::Off),
            "low" => Some(AlertThreshold::Low),
            "medium" | "default" => Some(AlertThreshold::Medium),
            "high" => Some(AlertThreshold::High),
            _ => None,
        }
    }
}

/// Trait for passive scan rules
pub trait PassiveRule: Send + Sync {
    /// Stable id of the rule
    fn plugin_id(&self) -> u32;

    /// Rule name
    fn name(&self) -> &str;

    /// Scan a completed message for issues
    fn scan(&self, msg: &HttpMessage, threshold: AlertThreshold) -> Vec<Finding>;
}

struct RegisteredRule {
    rule: Box<dyn PassiveRule>,
    threshold: AlertThreshold,
}

/// Passive scanner
pub struct PassiveScanner {
    rules: Vec<RegisteredRule>,
}

impl PassiveScanner {
    /// Scanner with every built-in rule at the default threshold
    pub fn new() -> Self {
        Self::with_rules(Self::default_rules())
    }

    pub fn with_rules(rules: Vec<Box<dyn PassiveRule>>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|rule| RegisteredRule {
                    rule,
                    threshold: AlertThreshold::default(),
                })
                .collect(),
        }
    }

    fn default_rules() -> Vec<Box<dyn PassiveRule>> {
        vec![
            Box::new(rules::CacheControlRule::new()),
            Box::new(rules::CacheableRule::new()),
            Box::new(rules::AntiClickjackingRule::new()),
            Box::new(rules::ApplicationErrorRule::new()),
            Box::new(rules::CspRule::new()),
            Box::new(rules::CsrfRule::new()),
            Box::new(rules::PrivateIpRule::new()),
            Box::new(rules::SessionIdInUrlRule::new()),
            Box::new(rules::SuspiciousCommentsRule::new()),
            Box::new(rules::ReverseTabnabbingRule::new()),
            Box::new(rules::PiiRule::new()),
            Box::new(rules::TimestampRule::new()),
            Box::new(rules::SiteIsolationRule::new()),
            Box::new(rules::Base64DisclosureRule::new()),
            Box::new(rules::SourceCodeDisclosureRule::new()),
            Box::new(rules::ServerHeaderRule::new()),
            Box::new(rules::XPoweredByRule::new()),
            Box::new(rules::CrossDomainScriptRule::new()),
            Box::new(rules::SriRule::new()),
            Box::new(rules::JavaSerializationRule::new()),
            Box::new(rules::CorsRule::new()),
        ]
    }

    /// Add a rule at the default threshold
    pub fn add_rule(&mut self, rule: Box<dyn PassiveRule>) {
        self.rules.push(RegisteredRule {
            rule,
            threshold: AlertThreshold::default(),
        });
    }

    /// Scan a completed message
    pub fn scan(&self, msg: &HttpMessage) -> Vec<Finding> {
        let mut findings = Vec::new();

        for entry in &self.rules {
            if entry.threshold == AlertThreshold::Off {
                continue;
            }
            let found = entry.rule.scan(msg, entry.threshold);
            if !found.is_empty() {
                tracing::debug!(
                    plugin_id = entry.rule.plugin_id(),
                    count = found.len(),
                    url = %msg.url(),
                    "{} raised alerts",
                    entry.rule.name()
                );
            }
            findings.extend(found);
        }

        findings
    }

    /// Set the threshold of the rule with this id, false if unknown
    pub fn set_threshold(&mut self, plugin_id: u32, threshold: AlertThreshold) -> bool {
        let mut found = false;
        for entry in self.rules.iter_mut().filter(|e| e.rule.plugin_id() == plugin_id) {
            entry.threshold = threshold;
            found = true;
        }
        found
    }

    pub fn threshold(&self, plugin_id: u32) -> Option<AlertThreshold> {
        self.rules
            .iter()
            .find(|e| e.rule.plugin_id() == plugin_id)
            .map(|e| e.threshold)
    }

    /// Registered rules with their thresholds
    pub fn rules(&self) -> impl Iterator<Item = (&dyn PassiveRule, AlertThreshold)> {
        self.rules.iter().map(|e| (e.rule.as_ref(), e.threshold))
    }
}

impl Default for PassiveScanner {
    fn default() -> Self {
        Self::new()
    }
}
