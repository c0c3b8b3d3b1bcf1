use super::trust_score;
use crate::{RuleError, SpamRule};
use caller_types::{GraphQuery, SpamScore};

/// Scores a number by how many users have saved it as a contact.
#[derive(Debug, Clone)]
pub struct ContactCountRule {
    threshold: usize,
    max_score: f64,
}

impl ContactCountRule {
    pub const NAME: &'static str = "contact_count_rule";

    /// `threshold`: savers needed to be trusted. `max_score`: score when nobody saved it.
    pub fn new(threshold: usize, max_score: f64) -> Self {
        Self {
            threshold,
            max_score: max_score.clamp(0.0, 1.0),
        }
    }
}

impl Default for ContactCountRule {
    fn default() -> Self {
        Self::new(3, 0.7)
    }
}

#[async_trait::async_trait]
impl SpamRule for ContactCountRule {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn evaluate(
        &self,
        phone: &str,
        _user_phone: Option<&str>,
        store: &dyn GraphQuery,
    ) -> Result<SpamScore, RuleError> {
        let count = store.get_users_with_contact(phone).await?.len();
        let score = trust_score(count, self.threshold, self.max_score);
        let reason = if count == 0 {
            "Phone number not saved by any user (0 contacts)".to_string()
        } else if count < self.threshold {
            format!(
                "Phone number saved by only {} user(s) (below threshold of {})",
                count, self.threshold
            )
        } else {
            format!("Phone number saved by {} users (trusted)", count)
        };
        tracing::debug!(phone = %phone, count, score, "contact count evaluated");
        Ok(SpamScore::new(Self::NAME, score, reason))
    }
}
