//! Spam scoring results and HTTP request/response DTOs.

use crate::{Edge, ErrorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Output of one rule. `score` is in `[0.0, 1.0]`; 1.0 means certainly spam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpamScore {
    pub rule_name: String,
    pub score: f64,
    pub reason: String,
}

impl SpamScore {
    pub fn new(rule_name: impl Into<String>, score: f64, reason: impl Into<String>) -> Self {
        Self {
            rule_name: rule_name.into(),
            score,
            reason: reason.into(),
        }
    }
}

/// Aggregated verdict for one phone number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpamDetectionResult {
    pub phone_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_phone_number: Option<String>,
    pub is_spam: bool,
    pub average_score: f64,
    pub rule_scores: Vec<SpamScore>,
    pub timestamp: DateTime<Utc>,
}

/// Body of `POST /api/v1/spam/detect`; also the query of `GET /api/v1/spam/score`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpamDetectionRequest {
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub user_phone_number: Option<String>,
}

impl SpamDetectionRequest {
    /// Blank user phone numbers count as absent.
    pub fn user_phone(&self) -> Option<&str> {
        self.user_phone_number
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// `GET /api/v1/spam/rules`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesResponse {
    pub rules: Vec<String>,
    pub count: usize,
}

/// `GET /api/v1/graph/calls/:phone`.
#[derive(Debug, Clone, Serialize)]
pub struct CallsResponse {
    pub phone_number: String,
    pub edges: Vec<Edge>,
    pub count: usize,
}

/// Error body for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
