use super::format_window;
use crate::{RuleError, SpamRule};
use caller_types::{CallDirection, CallFilters, GraphQuery, SpamScore};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Flags robocall-like traffic: calls that were answered but cut very short.
#[derive(Debug, Clone)]
pub struct CallPatternRule {
    /// Calls at or under this many seconds count as suspicious.
    duration_threshold: u32,
    time_window: Duration,
    /// Ceiling of the score.
    suspicious_weight: f64,
}

impl CallPatternRule {
    pub const NAME: &'static str = "call_pattern_rule";

    pub fn new(duration_threshold: u32, time_window: Duration, suspicious_weight: f64) -> Self {
        Self {
            duration_threshold,
            time_window,
            suspicious_weight: suspicious_weight.clamp(0.0, 1.0),
        }
    }

    fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.time_window)
            .ok()
            .and_then(|w| now.checked_sub_signed(w))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// `K * (1 - 1/(1+c))`, never above `K`.
    fn pattern_score(&self, suspicious: usize) -> f64 {
        if suspicious == 0 {
            return 0.0;
        }
        let k = self.suspicious_weight;
        (k * (1.0 - 1.0 / (1.0 + suspicious as f64))).min(k)
    }
}

impl Default for CallPatternRule {
    fn default() -> Self {
        Self::new(30, Duration::from_secs(60 * 60), 0.6)
    }
}

#[async_trait::async_trait]
impl SpamRule for CallPatternRule {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn evaluate(
        &self,
        phone: &str,
        _user_phone: Option<&str>,
        store: &dyn GraphQuery,
    ) -> Result<SpamScore, RuleError> {
        let since = self.window_start(Utc::now());
        let window = format_window(self.time_window);

        let suspicious_filters = CallFilters::default()
            .answered(true)
            .max_duration(i64::from(self.duration_threshold))
            .since(since);
        let suspicious = store
            .get_calls_with_filters(phone, &suspicious_filters, CallDirection::Both)
            .await?
            .len();

        if suspicious == 0 {
            return Ok(SpamScore::new(
                Self::NAME,
                0.0,
                format!("No suspicious call patterns found in last {}", window),
            ));
        }

        let total = store
            .get_calls_with_filters(phone, &CallFilters::default().since(since), CallDirection::Both)
            .await?
            .len();
        let score = self.pattern_score(suspicious);
        tracing::debug!(phone = %phone, suspicious, total, score, "call pattern evaluated");
        Ok(SpamScore::new(
            Self::NAME,
            score,
            format!(
                "Found {} suspicious calls (answered but <={}s) out of {} total calls in last {}",
                suspicious, self.duration_threshold, total, window
            ),
        ))
    }
}
