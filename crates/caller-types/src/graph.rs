//! Graph model: phone-number nodes, typed directed edges, call query filters.

use crate::EdgeMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::str::FromStr;

/// A phone number in the graph. The phone key is unique and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub phone_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Node {
    pub fn new(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = if name.is_empty() { None } else { Some(name) };
        self
    }
}

/// Relation tag of an edge. `Custom` covers types registered at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EdgeType {
    /// `from` has saved `to` in their contact list.
    Contact,
    /// `from` called `to`.
    Call,
    Custom(String),
}

impl EdgeType {
    /// Parse a type tag. `has_contact` is accepted for contact edges (older seed files).
    pub fn from_tag(tag: &str) -> Self {
        let trimmed = tag.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "contact" | "has_contact" => EdgeType::Contact,
            "call" => EdgeType::Call,
            _ => EdgeType::Custom(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EdgeType::Contact => "contact",
            EdgeType::Call => "call",
            EdgeType::Custom(tag) => tag.as_str(),
        }
    }

    /// At most one edge of this type may exist per ordered (from, to) pair.
    pub fn unique_per_pair(&self) -> bool {
        matches!(self, EdgeType::Contact)
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for EdgeType {
    fn from(tag: String) -> Self {
        EdgeType::from_tag(&tag)
    }
}

impl From<&str> for EdgeType {
    fn from(tag: &str) -> Self {
        EdgeType::from_tag(tag)
    }
}

impl From<EdgeType> for String {
    fn from(edge_type: EdgeType) -> Self {
        edge_type.as_str().to_string()
    }
}

/// Directed, typed relation between two phone numbers.
///
/// The edge type is always derived from the metadata, so the two can never disagree.
/// `created_at` is taken from the metadata as well (contact added / call placed).
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: String,
    pub from: String,
    pub to: String,
    pub metadata: EdgeMetadata,
    pub created_at: DateTime<Utc>,
}

impl Edge {
    pub fn edge_type(&self) -> EdgeType {
        self.metadata.edge_type()
    }

    /// True when `phone` is either endpoint.
    pub fn touches(&self, phone: &str) -> bool {
        self.from == phone || self.to == phone
    }
}

#[derive(Serialize)]
struct EdgeRecord<'a> {
    id: &'a str,
    from: &'a str,
    to: &'a str,
    #[serde(rename = "type")]
    edge_type: EdgeType,
    properties: crate::PropertyMap,
    created_at: DateTime<Utc>,
}

impl Serialize for Edge {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        EdgeRecord {
            id: &self.id,
            from: &self.from,
            to: &self.to,
            edge_type: self.edge_type(),
            properties: self.metadata.to_properties(),
            created_at: self.created_at,
        }
        .serialize(serializer)
    }
}

/// Which call edges of a phone number to consider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Calls placed by the phone number.
    #[default]
    Outgoing,
    /// Calls received by the phone number.
    Incoming,
    Both,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid call direction: {0} (expected outgoing, incoming or both)")]
pub struct InvalidDirection(pub String);

impl FromStr for CallDirection {
    type Err = InvalidDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "outgoing" => Ok(CallDirection::Outgoing),
            "incoming" => Ok(CallDirection::Incoming),
            "both" => Ok(CallDirection::Both),
            _ => Err(InvalidDirection(s.to_string())),
        }
    }
}

/// AND-combined filters over call edges. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallFilters {
    #[serde(default)]
    pub is_answered: Option<bool>,
    /// Inclusive upper bound on duration in seconds.
    #[serde(default)]
    pub max_duration: Option<i64>,
    /// Inclusive lower bound on duration in seconds.
    #[serde(default)]
    pub min_duration: Option<i64>,
    /// Inclusive.
    #[serde(default)]
    pub time_range_start: Option<DateTime<Utc>>,
    /// Inclusive.
    #[serde(default)]
    pub time_range_end: Option<DateTime<Utc>>,
}

impl CallFilters {
    pub fn answered(mut self, is_answered: bool) -> Self {
        self.is_answered = Some(is_answered);
        self
    }

    pub fn max_duration(mut self, seconds: i64) -> Self {
        self.max_duration = Some(seconds);
        self
    }

    pub fn min_duration(mut self, seconds: i64) -> Self {
        self.min_duration = Some(seconds);
        self
    }

    pub fn since(mut self, start: DateTime<Utc>) -> Self {
        self.time_range_start = Some(start);
        self
    }

    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.time_range_end = Some(end);
        self
    }

    /// Whether a call edge passes every set filter. Non-call edges never match.
    pub fn matches(&self, edge: &Edge) -> bool {
        let call = match edge.metadata.as_call() {
            Some(c) => c,
            None => return false,
        };
        if let Some(answered) = self.is_answered {
            if call.is_answered != answered {
                return false;
            }
        }
        if let Some(max) = self.max_duration {
            if call.duration_in_seconds > max {
                return false;
            }
        }
        if let Some(min) = self.min_duration {
            if call.duration_in_seconds < min {
                return false;
            }
        }
        if let Some(start) = self.time_range_start {
            if edge.created_at < start {
                return false;
            }
        }
        if let Some(end) = self.time_range_end {
            if edge.created_at > end {
                return false;
            }
        }
        true
    }
}

/// Node and edge counts for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub edges_by_type: BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CallMetadata, ContactMetadata};
    use chrono::Duration;

    fn call_edge(answered: bool, duration: i64, at: DateTime<Utc>) -> Edge {
        Edge {
            id: "call_1".to_string(),
            from: "a".to_string(),
            to: "b".to_string(),
            metadata: EdgeMetadata::Call(CallMetadata::new(answered, duration, at)),
            created_at: at,
        }
    }

    #[test]
    fn edge_type_tags() {
        assert_eq!(EdgeType::from_tag("has_contact"), EdgeType::Contact);
        assert_eq!(EdgeType::from_tag(" Call "), EdgeType::Call);
        assert_eq!(
            EdgeType::from_tag("sms"),
            EdgeType::Custom("sms".to_string())
        );
        assert_eq!(EdgeType::Contact.to_string(), "contact");
        let json = serde_json::to_string(&EdgeType::Call).unwrap();
        assert_eq!(json, "\"call\"");
    }

    #[test]
    fn direction_parsing_rejects_unknown() {
        assert_eq!("both".parse::<CallDirection>(), Ok(CallDirection::Both));
        assert_eq!(
            "INCOMING".parse::<CallDirection>(),
            Ok(CallDirection::Incoming)
        );
        assert!("sideways".parse::<CallDirection>().is_err());
    }

    #[test]
    fn filters_are_inclusive() {
        let now = Utc::now();
        let edge = call_edge(true, 30, now);
        assert!(CallFilters::default().matches(&edge));
        assert!(CallFilters::default().max_duration(30).matches(&edge));
        assert!(CallFilters::default().min_duration(30).matches(&edge));
        assert!(!CallFilters::default().max_duration(29).matches(&edge));
        assert!(CallFilters::default().since(now).until(now).matches(&edge));
        assert!(!CallFilters::default()
            .since(now + Duration::seconds(1))
            .matches(&edge));
        assert!(!CallFilters::default().answered(false).matches(&edge));
    }

    #[test]
    fn filters_ignore_non_call_edges() {
        let now = Utc::now();
        let edge = Edge {
            id: "contact_1".to_string(),
            from: "a".to_string(),
            to: "b".to_string(),
            metadata: EdgeMetadata::Contact(ContactMetadata::new("B", now)),
            created_at: now,
        };
        assert!(!CallFilters::default().matches(&edge));
    }

    #[test]
    fn edge_serializes_with_properties() {
        let now = Utc::now();
        let edge = call_edge(false, 12, now);
        let j = serde_json::to_value(&edge).unwrap();
        assert_eq!(j["type"], "call");
        assert_eq!(j["properties"]["is_answered"], false);
        assert_eq!(j["properties"]["duration_in_seconds"], 12);
    }
}
