//! Rule-based spam scoring over the caller graph.

mod rule;
mod rules;
mod scoring;
mod service;

pub use caller_types::{SpamDetectionResult, SpamScore};
pub use rule::{RuleError, SpamRule, SpamRuleRegistry};
pub use rules::{CallPatternRule, ContactCountRule, SecondLevelContactRule};
pub use scoring::{AverageScorer, MaxScorer, Scorer, WeightedScorer};
pub use service::{SpamDetectionService, SpamServiceError, DEFAULT_RULE_TIMEOUT};
