//! Passive security scanner
//!
//! Inspects completed HTTP messages and raises findings without sending
//! any traffic of its own.

mod findings;
pub mod passive;

pub use findings::{Confidence, Finding, Severity};
pub use passive::{AlertThreshold, PassiveRule, PassiveScanner};
