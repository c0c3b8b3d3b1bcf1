use super::trust_score;
use crate::{RuleError, SpamRule};
use caller_types::{GraphQuery, SpamScore};

/// Scores a caller by how close it sits to the user's own contact list.
///
/// Direct contacts score zero without looking any further. Otherwise the number of the user's
/// contacts who saved the caller goes through the same trust curve as [`super::ContactCountRule`].
#[derive(Debug, Clone)]
pub struct SecondLevelContactRule {
    threshold: usize,
    max_score: f64,
}

impl SecondLevelContactRule {
    pub const NAME: &'static str = "second_level_contact_rule";

    pub fn new(threshold: usize, max_score: f64) -> Self {
        Self {
            threshold,
            max_score: max_score.clamp(0.0, 1.0),
        }
    }
}

impl Default for SecondLevelContactRule {
    fn default() -> Self {
        Self::new(2, 0.5)
    }
}

#[async_trait::async_trait]
impl SpamRule for SecondLevelContactRule {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn evaluate(
        &self,
        phone: &str,
        user_phone: Option<&str>,
        store: &dyn GraphQuery,
    ) -> Result<SpamScore, RuleError> {
        let user = match user_phone.map(str::trim).filter(|u| !u.is_empty()) {
            Some(user) => user,
            None => {
                return Ok(SpamScore::new(
                    Self::NAME,
                    0.0,
                    "User phone number not provided, skipping second-level contact check",
                ))
            }
        };

        if store.is_direct_contact(user, phone).await? {
            return Ok(SpamScore::new(
                Self::NAME,
                0.0,
                "Caller is in user's direct contact list (level 1)",
            ));
        }

        let count = store.get_second_level_contact_count(user, phone).await?;
        let score = trust_score(count, self.threshold, self.max_score);
        let reason = if count == 0 {
            "Caller not in user's contacts or contacts of user's contacts (0 level-2 matches)"
                .to_string()
        } else if count < self.threshold {
            format!(
                "Caller found in {} of user's contact's contact lists (below threshold of {})",
                count, self.threshold
            )
        } else {
            format!(
                "Caller found in {} of user's contact's contact lists (trusted via level-2)",
                count
            )
        };
        tracing::debug!(phone = %phone, user = %user, count, score, "second-level contact evaluated");
        Ok(SpamScore::new(Self::NAME, score, reason))
    }
}
