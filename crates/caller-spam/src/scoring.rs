//! Aggregation of per-rule scores into one verdict.

use caller_types::SpamScore;
use std::collections::HashMap;

/// Turns rule scores into `(aggregate, is_spam)`. An empty slice is `(0.0, false)`.
pub trait Scorer: Send + Sync {
    fn calculate_score(&self, scores: &[SpamScore], threshold: f64) -> (f64, bool);
}

/// Arithmetic mean compared against the threshold (inclusive).
#[derive(Debug, Clone, Copy, Default)]
pub struct AverageScorer;

impl Scorer for AverageScorer {
    fn calculate_score(&self, scores: &[SpamScore], threshold: f64) -> (f64, bool) {
        if scores.is_empty() {
            return (0.0, false);
        }
        let total: f64 = scores.iter().map(|s| s.score).sum();
        let average = total / scores.len() as f64;
        (average, average >= threshold)
    }
}

/// Strongest single signal decides.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxScorer;

impl Scorer for MaxScorer {
    fn calculate_score(&self, scores: &[SpamScore], threshold: f64) -> (f64, bool) {
        match scores.iter().map(|s| s.score).reduce(f64::max) {
            Some(max) => (max, max >= threshold),
            None => (0.0, false),
        }
    }
}

/// Weighted mean keyed by rule name. Rules without an explicit weight count with `default_weight`.
#[derive(Debug, Clone)]
pub struct WeightedScorer {
    weights: HashMap<String, f64>,
    default_weight: f64,
}

impl WeightedScorer {
    pub fn new() -> Self {
        Self {
            weights: HashMap::new(),
            default_weight: 1.0,
        }
    }

    /// Negative weights are treated as zero.
    pub fn with_weight(mut self, rule_name: impl Into<String>, weight: f64) -> Self {
        self.weights.insert(rule_name.into(), weight.max(0.0));
        self
    }

    pub fn with_default_weight(mut self, weight: f64) -> Self {
        self.default_weight = weight.max(0.0);
        self
    }

    fn weight(&self, rule_name: &str) -> f64 {
        self.weights
            .get(rule_name)
            .copied()
            .unwrap_or(self.default_weight)
    }
}

impl Default for WeightedScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl Scorer for WeightedScorer {
    fn calculate_score(&self, scores: &[SpamScore], threshold: f64) -> (f64, bool) {
        let (weighted, total_weight) = scores.iter().fold((0.0, 0.0), |(sum, w_sum), s| {
            let w = self.weight(&s.rule_name);
            (sum + w * s.score, w_sum + w)
        });
        if total_weight <= 0.0 {
            return (0.0, false);
        }
        let score = weighted / total_weight;
        (score, score >= threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scores(values: &[f64]) -> Vec<SpamScore> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| SpamScore::new(format!("rule_{}", i), *v, ""))
            .collect()
    }

    #[test]
    fn empty_scores_are_not_spam() {
        assert_eq!(AverageScorer.calculate_score(&[], 0.5), (0.0, false));
        assert_eq!(MaxScorer.calculate_score(&[], 0.0), (0.0, false));
        assert_eq!(WeightedScorer::new().calculate_score(&[], 0.0), (0.0, false));
    }

    #[test]
    fn average_threshold_is_inclusive() {
        let (avg, spam) = AverageScorer.calculate_score(&scores(&[0.7, 0.3]), 0.5);
        assert!((avg - 0.5).abs() < 1e-12);
        assert!(spam);
        let (_, spam) = AverageScorer.calculate_score(&scores(&[0.7, 0.29]), 0.5);
        assert!(!spam);
    }

    #[test]
    fn max_scorer_follows_strongest_rule() {
        let (max, spam) = MaxScorer.calculate_score(&scores(&[0.1, 0.6, 0.2]), 0.5);
        assert_eq!(max, 0.6);
        assert!(spam);
    }

    #[test]
    fn weighted_scorer_uses_rule_weights() {
        let scorer = WeightedScorer::new()
            .with_weight("rule_0", 3.0)
            .with_weight("rule_1", 1.0);
        let (score, spam) = scorer.calculate_score(&scores(&[1.0, 0.0]), 0.7);
        assert!((score - 0.75).abs() < 1e-12);
        assert!(spam);

        let muted = WeightedScorer::new().with_default_weight(0.0);
        assert_eq!(muted.calculate_score(&scores(&[1.0]), 0.5), (0.0, false));
    }

    proptest! {
        #[test]
        fn aggregates_stay_within_input_bounds(values in proptest::collection::vec(0.0f64..=1.0, 1..12)) {
            let input = scores(&values);
            let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            for (agg, _) in [
                AverageScorer.calculate_score(&input, 0.5),
                MaxScorer.calculate_score(&input, 0.5),
                WeightedScorer::new().with_weight("rule_0", 2.5).calculate_score(&input, 0.5),
            ] {
                prop_assert!(agg >= lo - 1e-9 && agg <= hi + 1e-9);
            }
        }

        #[test]
        fn average_ignores_rule_order(mut values in proptest::collection::vec(0.0f64..=1.0, 1..12)) {
            let (a, _) = AverageScorer.calculate_score(&scores(&values), 0.5);
            values.reverse();
            let (b, _) = AverageScorer.calculate_score(&scores(&values), 0.5);
            prop_assert!((a - b).abs() < 1e-9);
        }
    }
}
