//! Process configuration from environment variables.
//!
//! Every value has a default. Unparseable or out-of-range values are logged and replaced by the
//! default so a typo never keeps the service from starting.

use caller_spam::{
    CallPatternRule, ContactCountRule, SecondLevelContactRule, SpamDetectionService,
    DEFAULT_RULE_TIMEOUT,
};
use caller_types::GraphQuery;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub listen: SocketAddr,
    pub user_seed_data_path: PathBuf,
    pub call_data_path: PathBuf,
    pub spam_threshold: f64,
    pub contact_count_threshold: usize,
    pub contact_count_max_score: f64,
    pub call_pattern_duration_threshold: u32,
    pub call_pattern_time_window: Duration,
    pub call_pattern_suspicious_weight: f64,
    pub second_level_threshold: usize,
    pub second_level_max_score: f64,
    pub rule_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            user_seed_data_path: PathBuf::from("contacts_generated.json"),
            call_data_path: PathBuf::from("call_data.json"),
            spam_threshold: 0.5,
            contact_count_threshold: 3,
            contact_count_max_score: 0.7,
            call_pattern_duration_threshold: 30,
            call_pattern_time_window: Duration::from_secs(60 * 60),
            call_pattern_suspicious_weight: 0.6,
            second_level_threshold: 2,
            second_level_max_score: 0.5,
            rule_timeout: DEFAULT_RULE_TIMEOUT,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the environment, or a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen = match (get("CALLER_LISTEN"), get("SERVER_PORT")) {
            (Some(addr), _) => parse_or("CALLER_LISTEN", &addr, d.listen),
            (None, Some(port)) => {
                let port = parse_or("SERVER_PORT", &port, d.listen.port());
                SocketAddr::from(([0, 0, 0, 0], port))
            }
            (None, None) => d.listen,
        };

        let time_window = match get("CALL_PATTERN_TIME_WINDOW") {
            Some(raw) => parse_duration(&raw).unwrap_or_else(|| {
                tracing::warn!(key = "CALL_PATTERN_TIME_WINDOW", value = %raw, "invalid duration, using default");
                d.call_pattern_time_window
            }),
            None => d.call_pattern_time_window,
        };

        Self {
            listen,
            user_seed_data_path: get("USER_SEED_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or(d.user_seed_data_path),
            call_data_path: get("CALL_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or(d.call_data_path),
            spam_threshold: score_var(&get, "SPAM_THRESHOLD", d.spam_threshold),
            contact_count_threshold: var(&get, "CONTACT_COUNT_THRESHOLD", d.contact_count_threshold),
            contact_count_max_score: score_var(&get, "CONTACT_COUNT_MAX_SCORE", d.contact_count_max_score),
            call_pattern_duration_threshold: var(
                &get,
                "CALL_PATTERN_DURATION_THRESHOLD",
                d.call_pattern_duration_threshold,
            ),
            call_pattern_time_window: time_window,
            call_pattern_suspicious_weight: score_var(
                &get,
                "CALL_PATTERN_SUSPICIOUS_WEIGHT",
                d.call_pattern_suspicious_weight,
            ),
            second_level_threshold: var(&get, "SECOND_LEVEL_THRESHOLD", d.second_level_threshold),
            second_level_max_score: score_var(&get, "SECOND_LEVEL_MAX_SCORE", d.second_level_max_score),
            rule_timeout: Duration::from_millis(var(
                &get,
                "RULE_TIMEOUT_MS",
                d.rule_timeout.as_millis() as u64,
            )),
        }
    }

    /// Detection service with the three built-in rules configured from `self`.
    pub fn build_spam_service(&self, store: Arc<dyn GraphQuery>) -> SpamDetectionService {
        let mut service = SpamDetectionService::new(store, self.spam_threshold)
            .with_rule_timeout(self.rule_timeout);
        service.register_rule(ContactCountRule::new(
            self.contact_count_threshold,
            self.contact_count_max_score,
        ));
        service.register_rule(CallPatternRule::new(
            self.call_pattern_duration_threshold,
            self.call_pattern_time_window,
            self.call_pattern_suspicious_weight,
        ));
        service.register_rule(SecondLevelContactRule::new(
            self.second_level_threshold,
            self.second_level_max_score,
        ));
        service
    }
}

fn parse_or<T: FromStr>(key: &str, raw: &str, default: T) -> T {
    raw.trim().parse().unwrap_or_else(|_| {
        tracing::warn!(key = %key, value = %raw, "invalid config value, using default");
        default
    })
}

fn var<T, G>(get: &G, key: &str, default: T) -> T
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_or(key, &raw, default),
        None => default,
    }
}

/// A float that must lie in `[0, 1]`.
fn score_var<G>(get: &G, key: &str, default: f64) -> f64
where
    G: Fn(&str) -> Option<String>,
{
    let value = var(get, key, default);
    if (0.0..=1.0).contains(&value) {
        value
    } else {
        tracing::warn!(key = %key, value, "score out of range [0, 1], using default");
        default
    }
}

/// Parse `90s`, `60m`, `1h30m`, `500ms`; a bare number is seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let n: u64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];
        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let part = match &rest[..unit_len] {
            "ms" => Duration::from_millis(n),
            "s" => Duration::from_secs(n),
            "m" => Duration::from_secs(n.checked_mul(60)?),
            "h" => Duration::from_secs(n.checked_mul(3600)?),
            _ => return None,
        };
        total = total.checked_add(part)?;
        rest = &rest[unit_len..];
    }
    Some(total)
}
