//! Spam detection: run every registered rule against the graph and aggregate.

use crate::{AverageScorer, RuleError, Scorer, SpamRule, SpamRuleRegistry};
use caller_types::{ErrorKind, GraphQuery, SpamDetectionResult, SpamScore};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_RULE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum SpamServiceError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("no spam detection rules registered")]
    Configuration,
    #[error("none of the {0} registered rules could be evaluated")]
    NoRuleEvaluated(usize),
}

impl SpamServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpamServiceError::Validation(_) => ErrorKind::Validation,
            SpamServiceError::Configuration => ErrorKind::Configuration,
            SpamServiceError::NoRuleEvaluated(_) => ErrorKind::Internal,
        }
    }
}

pub struct SpamDetectionService {
    store: Arc<dyn GraphQuery>,
    registry: SpamRuleRegistry,
    scorer: Box<dyn Scorer>,
    /// Aggregate score at or above which a number is spam.
    threshold: f64,
    rule_timeout: Duration,
}

impl SpamDetectionService {
    /// Service with no rules and the average scorer.
    pub fn new(store: Arc<dyn GraphQuery>, threshold: f64) -> Self {
        Self {
            store,
            registry: SpamRuleRegistry::new(),
            scorer: Box::new(AverageScorer),
            threshold,
            rule_timeout: DEFAULT_RULE_TIMEOUT,
        }
    }

    pub fn with_scorer(mut self, scorer: impl Scorer + 'static) -> Self {
        self.scorer = Box::new(scorer);
        self
    }

    pub fn with_rule_timeout(mut self, timeout: Duration) -> Self {
        self.rule_timeout = timeout;
        self
    }

    pub fn register_rule(&mut self, rule: impl SpamRule + 'static) {
        self.registry.register(Arc::new(rule));
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Names of all rules, in registration order.
    pub fn get_registered_rules(&self) -> Vec<String> {
        self.registry.rule_names()
    }

    async fn evaluate_rule(
        &self,
        rule: &dyn SpamRule,
        phone: &str,
        user_phone: Option<&str>,
    ) -> Result<SpamScore, RuleError> {
        let evaluation = rule.evaluate(phone, user_phone, self.store.as_ref());
        let mut score = tokio::time::timeout(self.rule_timeout, evaluation)
            .await
            .map_err(|_| RuleError::Timeout {
                rule: rule.name().to_string(),
                timeout: self.rule_timeout,
            })??;
        if !score.score.is_finite() {
            return Err(RuleError::Other(format!(
                "rule {} returned a non-finite score",
                rule.name()
            )));
        }
        score.score = score.score.clamp(0.0, 1.0);
        Ok(score)
    }

    /// Score `phone`, optionally in the context of the user receiving the call.
    ///
    /// Rules run one after another; a rule that errors or times out is logged and left out of the
    /// aggregate. Fails only if no rule is registered or none produced a score.
    pub async fn detect_spam(
        &self,
        phone: &str,
        user_phone: Option<&str>,
    ) -> Result<SpamDetectionResult, SpamServiceError> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(SpamServiceError::Validation(
                "phone_number is required".to_string(),
            ));
        }
        let user_phone = user_phone.map(str::trim).filter(|u| !u.is_empty());

        let rules = self.registry.get_all_rules();
        if rules.is_empty() {
            return Err(SpamServiceError::Configuration);
        }

        let mut rule_scores = Vec::with_capacity(rules.len());
        for rule in rules {
            match self.evaluate_rule(rule.as_ref(), phone, user_phone).await {
                Ok(score) => rule_scores.push(score),
                Err(e) => tracing::warn!(rule = %rule.name(), error = %e, "rule evaluation failed"),
            }
        }
        if rule_scores.is_empty() {
            return Err(SpamServiceError::NoRuleEvaluated(rules.len()));
        }

        let (average_score, is_spam) = self.scorer.calculate_score(&rule_scores, self.threshold);
        tracing::info!(
            phone = %phone,
            score = average_score,
            is_spam,
            rules = rule_scores.len(),
            "spam detection complete"
        );
        Ok(SpamDetectionResult {
            phone_number: phone.to_string(),
            user_phone_number: user_phone.map(str::to_string),
            is_spam,
            average_score,
            rule_scores,
            timestamp: Utc::now(),
        })
    }
}

impl std::fmt::Debug for SpamDetectionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpamDetectionService")
            .field("registry", &self.registry)
            .field("threshold", &self.threshold)
            .field("rule_timeout", &self.rule_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CallPatternRule, ContactCountRule, MaxScorer, SecondLevelContactRule};
    use caller_graph::{GraphStore, InMemoryGraphStore};
    use caller_types::{CallMetadata, ContactMetadata, GraphStoreError};

    struct Fixed {
        name: &'static str,
        score: f64,
    }

    #[async_trait::async_trait]
    impl SpamRule for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn evaluate(
            &self,
            _phone: &str,
            _user_phone: Option<&str>,
            _store: &dyn GraphQuery,
        ) -> Result<SpamScore, RuleError> {
            Ok(SpamScore::new(self.name, self.score, "fixed"))
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl SpamRule for Failing {
        fn name(&self) -> &str {
            "failing_rule"
        }

        async fn evaluate(
            &self,
            phone: &str,
            _user_phone: Option<&str>,
            _store: &dyn GraphQuery,
        ) -> Result<SpamScore, RuleError> {
            Err(GraphStoreError::NodeNotFound(phone.to_string()).into())
        }
    }

    struct Slow;

    #[async_trait::async_trait]
    impl SpamRule for Slow {
        fn name(&self) -> &str {
            "slow_rule"
        }

        async fn evaluate(
            &self,
            _phone: &str,
            _user_phone: Option<&str>,
            _store: &dyn GraphQuery,
        ) -> Result<SpamScore, RuleError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(SpamScore::new("slow_rule", 1.0, "too late"))
        }
    }

    fn empty_service() -> SpamDetectionService {
        SpamDetectionService::new(Arc::new(InMemoryGraphStore::new()), 0.5)
    }

    #[tokio::test]
    async fn no_rules_is_a_configuration_error() {
        let err = empty_service().detect_spam("123", None).await.unwrap_err();
        assert!(matches!(err, SpamServiceError::Configuration));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn blank_phone_is_rejected() {
        let mut service = empty_service();
        service.register_rule(Fixed { name: "a", score: 0.0 });
        let err = service.detect_spam("  ", None).await.unwrap_err();
        assert!(matches!(err, SpamServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn failing_rules_are_left_out() {
        let mut service = empty_service();
        service.register_rule(Failing);
        service.register_rule(Fixed { name: "high", score: 0.8 });
        let result = service.detect_spam("123", None).await.unwrap();
        assert_eq!(result.rule_scores.len(), 1);
        assert_eq!(result.rule_scores[0].rule_name, "high");
        assert!((result.average_score - 0.8).abs() < 1e-12);
        assert!(result.is_spam);
        assert_eq!(
            service.get_registered_rules(),
            vec!["failing_rule", "high"]
        );
    }

    #[tokio::test]
    async fn all_rules_failing_is_an_error() {
        let mut service = empty_service();
        service.register_rule(Failing);
        let err = service.detect_spam("123", None).await.unwrap_err();
        assert!(matches!(err, SpamServiceError::NoRuleEvaluated(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_rules_time_out() {
        let mut service = empty_service().with_rule_timeout(Duration::from_millis(50));
        service.register_rule(Slow);
        service.register_rule(Fixed { name: "low", score: 0.2 });
        let result = service.detect_spam("123", None).await.unwrap();
        assert_eq!(result.rule_scores.len(), 1);
        assert!(!result.is_spam);
    }

    #[tokio::test]
    async fn out_of_range_scores_are_clamped() {
        let mut service = empty_service();
        service.register_rule(Fixed { name: "wild", score: 7.0 });
        service.register_rule(Fixed { name: "neg", score: -1.0 });
        let result = service.detect_spam("123", None).await.unwrap();
        assert_eq!(result.rule_scores[0].score, 1.0);
        assert_eq!(result.rule_scores[1].score, 0.0);
        assert!((result.average_score - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn scorer_is_pluggable() {
        let mut service = empty_service().with_scorer(MaxScorer);
        service.register_rule(Fixed { name: "a", score: 0.1 });
        service.register_rule(Fixed { name: "b", score: 0.6 });
        let result = service.detect_spam("123", Some("999")).await.unwrap();
        assert_eq!(result.average_score, 0.6);
        assert!(result.is_spam);
        assert_eq!(result.user_phone_number.as_deref(), Some("999"));
    }

    #[tokio::test]
    async fn default_rules_end_to_end() {
        let store = Arc::new(InMemoryGraphStore::new());
        for saver in ["A", "B", "C"] {
            store
                .add_edge(saver, "U", ContactMetadata::named("U").into())
                .await
                .unwrap();
        }
        store
            .add_edge("U", "A", CallMetadata::new(true, 10, Utc::now()).into())
            .await
            .unwrap();

        let mut service = SpamDetectionService::new(store.clone(), 0.5);
        service.register_rule(ContactCountRule::new(3, 0.7));
        service.register_rule(CallPatternRule::new(30, Duration::from_secs(3600), 0.6));
        service.register_rule(SecondLevelContactRule::new(2, 0.5));

        let result = service.detect_spam("U", None).await.unwrap();
        let scores: Vec<f64> = result.rule_scores.iter().map(|s| s.score).collect();
        assert!((scores[0] - 0.1).abs() < 1e-12);
        assert!((scores[1] - 0.3).abs() < 1e-12);
        assert_eq!(scores[2], 0.0);
        assert!((result.average_score - 0.4 / 3.0).abs() < 1e-12);
        assert!(!result.is_spam);
        assert!(result.user_phone_number.is_none());

        let stranger = service.detect_spam("X", Some("A")).await.unwrap();
        // 0.7 (no savers) + 0.0 (no calls) + 0.5 (unknown to A's circle).
        assert!((stranger.average_score - 0.4).abs() < 1e-12);
        assert!(!stranger.is_spam);
    }
}
