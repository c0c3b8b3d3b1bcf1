//! Scoring rule contract and the ordered rule registry.

use caller_types::{GraphQuery, GraphStoreError, SpamScore};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error(transparent)]
    Store(#[from] GraphStoreError),
    #[error("rule {rule} timed out after {timeout:?}")]
    Timeout { rule: String, timeout: Duration },
    #[error("{0}")]
    Other(String),
}

/// One independent spam signal computed from the graph.
///
/// Rules are read-only over the store and must return a score in `[0.0, 1.0]`.
#[async_trait::async_trait]
pub trait SpamRule: Send + Sync {
    fn name(&self) -> &str;

    /// Score `phone`. `user_phone` is the callee, when the caller of the API knows it.
    async fn evaluate(
        &self,
        phone: &str,
        user_phone: Option<&str>,
        store: &dyn GraphQuery,
    ) -> Result<SpamScore, RuleError>;
}

/// Append-only, ordered list of rules. Names are not required to be unique.
#[derive(Default, Clone)]
pub struct SpamRuleRegistry {
    rules: Vec<Arc<dyn SpamRule>>,
}

impl SpamRuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, rule: Arc<dyn SpamRule>) {
        if self.rules.iter().any(|r| r.name() == rule.name()) {
            tracing::warn!(rule = %rule.name(), "rule name registered twice; both will run");
        }
        self.rules.push(rule);
    }

    /// Rules in registration order.
    pub fn get_all_rules(&self) -> &[Arc<dyn SpamRule>] {
        &self.rules
    }

    pub fn rule_names(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl std::fmt::Debug for SpamRuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpamRuleRegistry")
            .field("rules", &self.rule_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait::async_trait]
    impl SpamRule for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn evaluate(
            &self,
            _phone: &str,
            _user_phone: Option<&str>,
            _store: &dyn GraphQuery,
        ) -> Result<SpamScore, RuleError> {
            Ok(SpamScore::new(self.0, 0.0, "fixed"))
        }
    }

    #[test]
    fn registry_keeps_order_and_duplicates() {
        let mut registry = SpamRuleRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(Fixed("b")));
        registry.register(Arc::new(Fixed("a")));
        registry.register(Arc::new(Fixed("b")));
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.rule_names(), vec!["b", "a", "b"]);
        assert_eq!(registry.get_all_rules()[1].name(), "a");
    }
}
