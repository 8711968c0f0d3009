//! Passive scan findings

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Informational,
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Informational => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Severity::Informational => "Informational",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }
}

/// How sure a rule is about a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    FalsePositive,
    Low,
    Medium,
    High,
    Confirmed,
}

impl Confidence {
    pub fn name(&self) -> &'static str {
        match self {
            Confidence::FalsePositive => "False Positive",
            Confidence::Low => "Low",
            Confidence::Medium => "Medium",
            Confidence::High => "High",
            Confidence::Confirmed => "Confirmed",
        }
    }
}

/// An alert raised by a passive rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Unique ID
    pub id: String,

    /// Id of the rule that raised it
    pub plugin_id: u32,

    pub name: String,
    pub severity: Severity,
    pub confidence: Confidence,
    pub description: String,

    /// URL of the inspected message
    pub url: String,

    /// Affected parameter or header
    pub parameter: Option<String>,

    /// Text of the message that triggered the finding
    pub evidence: Option<String>,

    pub other_info: Option<String>,
    pub remediation: Option<String>,
    pub cwe_id: Option<u32>,
    pub wasc_id: Option<u32>,

    /// Classification tags, e.g. OWASP categories
    pub tags: BTreeMap<String, String>,

    pub references: Vec<String>,
    pub timestamp: DateTime<Utc>,

    /// Scanner/rule that found this
    pub scanner: String,
}

impl Finding {
    /// Create a new finding
    pub fn new(plugin_id: u32, name: &str, severity: Severity, url: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            plugin_id,
            name: name.to_string(),
            severity,
            confidence: Confidence::Medium,
            description: String::new(),
            url: url.to_string(),
            parameter: None,
            evidence: None,
            other_info: None,
            remediation: None,
            cwe_id: None,
            wasc_id: None,
            tags: BTreeMap::new(),
            references: Vec::new(),
            timestamp: Utc::now(),
            scanner: "passive".to_string(),
        }
    }

    /// Builder pattern methods
    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = desc.to_string();
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_parameter(mut self, param: &str) -> Self {
        self.parameter = Some(param.to_string());
        self
    }

    pub fn with_evidence(mut self, evidence: &str) -> Self {
        self.evidence = Some(evidence.to_string());
        self
    }

    pub fn with_other_info(mut self, info: &str) -> Self {
        self.other_info = Some(info.to_string());
        self
    }

    pub fn with_remediation(mut self, remediation: &str) -> Self {
        self.remediation = Some(remediation.to_string());
        self
    }

    pub fn with_cwe(mut self, cwe_id: u32) -> Self {
        self.cwe_id = Some(cwe_id);
        self
    }

    pub fn with_wasc(mut self, wasc_id: u32) -> Self {
        self.wasc_id = Some(wasc_id);
        self
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_reference(mut self, reference: &str) -> Self {
        self.references.push(reference.to_string());
        self
    }

    pub fn with_scanner(mut self, scanner: &str) -> Self {
        self.scanner = scanner.to_string();
        self
    }
}
