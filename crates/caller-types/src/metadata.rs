//! Edge metadata: typed payloads for contact and call edges.
//!
//! Each variant has its own schema ([`MetadataSchema`]). The flat [`PropertyMap`] form exists only
//! at the storage boundary (seed files, API output); [`MetadataRegistry`] maps an edge type tag back
//! to a decoder so new edge types can be added without touching the store.

use crate::EdgeType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Primitive value in a property map.
///
/// JSON strings always decode as `String`, even when they look like a time; `as_time` parses
/// them on demand. `Time` is only produced from typed metadata and serializes as RFC 3339.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Time(DateTime<Utc>),
}

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Int(_) => "int",
            PropertyValue::Float(_) => "float",
            PropertyValue::Time(_) => "time",
            PropertyValue::String(_) => "string",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integers, and floats truncated toward zero (JSON numbers may arrive as floats).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            PropertyValue::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            _ => None,
        }
    }

    /// Times, and RFC 3339 strings.
    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            PropertyValue::Time(t) => Some(*t),
            PropertyValue::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(v: DateTime<Utc>) -> Self {
        PropertyValue::Time(v)
    }
}

/// Flat, string-keyed property map. Ordered so serialized output is stable.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

/// Per-variant schema: conversion to and from the property map, plus validation.
pub trait MetadataSchema: Sized {
    /// Edge type this metadata belongs to.
    fn edge_type() -> EdgeType;

    fn to_properties(&self) -> PropertyMap;

    /// Inverse of `to_properties`. Missing optional fields are left unset; fields present with
    /// the wrong type fail with `MetadataError::Deserialization`.
    fn from_properties(props: &PropertyMap) -> Result<Self, MetadataError>;

    /// Reject structurally invalid metadata and fill defaults (missing timestamps become now).
    fn validate(&mut self) -> Result<(), MetadataError>;
}

fn mismatch(field: &str, expected: &str, got: &PropertyValue) -> MetadataError {
    MetadataError::Deserialization(format!(
        "{} must be {}, got {}",
        field,
        expected,
        got.type_name()
    ))
}

fn time_field(props: &PropertyMap, key: &str) -> Result<Option<DateTime<Utc>>, MetadataError> {
    match props.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_time()
            .map(Some)
            .ok_or_else(|| mismatch(key, "an RFC 3339 time", v)),
    }
}

/// Payload of a contact edge: the owner saved the target under `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactMetadata {
    pub name: String,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
}

impl ContactMetadata {
    pub fn new(name: impl Into<String>, added_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            added_at: Some(added_at),
        }
    }

    /// Contact added now.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            added_at: None,
        }
    }
}

impl MetadataSchema for ContactMetadata {
    fn edge_type() -> EdgeType {
        EdgeType::Contact
    }

    fn to_properties(&self) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert("name".to_string(), self.name.clone().into());
        if let Some(added_at) = self.added_at {
            props.insert("added_at".to_string(), added_at.into());
        }
        props
    }

    fn from_properties(props: &PropertyMap) -> Result<Self, MetadataError> {
        let name = match props.get("name") {
            None => String::new(),
            Some(v) => v
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| mismatch("name", "a string", v))?,
        };
        Ok(Self {
            name,
            added_at: time_field(props, "added_at")?,
        })
    }

    fn validate(&mut self) -> Result<(), MetadataError> {
        if self.name.trim().is_empty() {
            return Err(MetadataError::Validation(
                "contact name cannot be empty".to_string(),
            ));
        }
        if self.added_at.is_none() {
            self.added_at = Some(Utc::now());
        }
        Ok(())
    }
}

/// Payload of a call edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMetadata {
    pub is_answered: bool,
    pub duration_in_seconds: i64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl CallMetadata {
    pub fn new(is_answered: bool, duration_in_seconds: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            is_answered,
            duration_in_seconds,
            timestamp: Some(timestamp),
        }
    }
}

impl MetadataSchema for CallMetadata {
    fn edge_type() -> EdgeType {
        EdgeType::Call
    }

    fn to_properties(&self) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert("is_answered".to_string(), self.is_answered.into());
        props.insert(
            "duration_in_seconds".to_string(),
            self.duration_in_seconds.into(),
        );
        if let Some(ts) = self.timestamp {
            props.insert("timestamp".to_string(), ts.into());
        }
        props
    }

    fn from_properties(props: &PropertyMap) -> Result<Self, MetadataError> {
        let is_answered = match props.get("is_answered") {
            None => false,
            Some(v) => v
                .as_bool()
                .ok_or_else(|| mismatch("is_answered", "a bool", v))?,
        };
        let duration_in_seconds = match props.get("duration_in_seconds") {
            None => 0,
            Some(v) => v
                .as_i64()
                .ok_or_else(|| mismatch("duration_in_seconds", "a number", v))?,
        };
        // `created_at` is the legacy key for the call time.
        let timestamp = match time_field(props, "timestamp")? {
            Some(ts) => Some(ts),
            None => time_field(props, "created_at")?,
        };
        Ok(Self {
            is_answered,
            duration_in_seconds,
            timestamp,
        })
    }

    fn validate(&mut self) -> Result<(), MetadataError> {
        if self.duration_in_seconds < 0 {
            return Err(MetadataError::Validation(format!(
                "call duration cannot be negative: {}",
                self.duration_in_seconds
            )));
        }
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now());
        }
        Ok(())
    }
}

/// Payload of an edge type registered at runtime; kept as raw properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomMetadata {
    pub edge_type: String,
    #[serde(default)]
    pub properties: PropertyMap,
}

impl CustomMetadata {
    pub fn new(edge_type: impl Into<String>, properties: PropertyMap) -> Self {
        Self {
            edge_type: edge_type.into(),
            properties,
        }
    }

    fn validate(&mut self) -> Result<(), MetadataError> {
        match EdgeType::from_tag(&self.edge_type) {
            EdgeType::Custom(tag) if !tag.is_empty() => {
                self.edge_type = tag;
                Ok(())
            }
            EdgeType::Custom(_) => Err(MetadataError::Validation(
                "custom edge type cannot be empty".to_string(),
            )),
            builtin => Err(MetadataError::Validation(format!(
                "custom metadata cannot use built-in edge type {}",
                builtin
            ))),
        }
    }
}

/// Metadata attached to an edge.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeMetadata {
    Contact(ContactMetadata),
    Call(CallMetadata),
    Custom(CustomMetadata),
}

impl EdgeMetadata {
    pub fn edge_type(&self) -> EdgeType {
        match self {
            EdgeMetadata::Contact(_) => ContactMetadata::edge_type(),
            EdgeMetadata::Call(_) => CallMetadata::edge_type(),
            EdgeMetadata::Custom(c) => EdgeType::from_tag(&c.edge_type),
        }
    }

    pub fn to_properties(&self) -> PropertyMap {
        match self {
            EdgeMetadata::Contact(c) => c.to_properties(),
            EdgeMetadata::Call(c) => c.to_properties(),
            EdgeMetadata::Custom(c) => c.properties.clone(),
        }
    }

    pub fn validate(&mut self) -> Result<(), MetadataError> {
        match self {
            EdgeMetadata::Contact(c) => c.validate(),
            EdgeMetadata::Call(c) => c.validate(),
            EdgeMetadata::Custom(c) => c.validate(),
        }
    }

    /// When the relation came into being: contact added, call placed.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            EdgeMetadata::Contact(c) => c.added_at,
            EdgeMetadata::Call(c) => c.timestamp,
            EdgeMetadata::Custom(c) => c.properties.get("timestamp").and_then(|v| v.as_time()),
        }
    }

    pub fn as_contact(&self) -> Option<&ContactMetadata> {
        match self {
            EdgeMetadata::Contact(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<&CallMetadata> {
        match self {
            EdgeMetadata::Call(c) => Some(c),
            _ => None,
        }
    }
}

impl From<ContactMetadata> for EdgeMetadata {
    fn from(m: ContactMetadata) -> Self {
        EdgeMetadata::Contact(m)
    }
}

impl From<CallMetadata> for EdgeMetadata {
    fn from(m: CallMetadata) -> Self {
        EdgeMetadata::Call(m)
    }
}

impl From<CustomMetadata> for EdgeMetadata {
    fn from(m: CustomMetadata) -> Self {
        EdgeMetadata::Custom(m)
    }
}

/// Decodes a property map into metadata for one edge type.
pub type MetadataDecoder =
    Arc<dyn Fn(&PropertyMap) -> Result<EdgeMetadata, MetadataError> + Send + Sync>;

/// Edge type -> decoder. `new()` registers contact and call.
#[derive(Clone)]
pub struct MetadataRegistry {
    decoders: HashMap<EdgeType, MetadataDecoder>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(EdgeType::Contact, |props| {
            ContactMetadata::from_properties(props).map(EdgeMetadata::Contact)
        });
        registry.register(EdgeType::Call, |props| {
            CallMetadata::from_properties(props).map(EdgeMetadata::Call)
        });
        registry
    }

    /// Registry with no edge types at all.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register (or replace) the decoder for an edge type.
    pub fn register<F>(&mut self, edge_type: EdgeType, decoder: F)
    where
        F: Fn(&PropertyMap) -> Result<EdgeMetadata, MetadataError> + Send + Sync + 'static,
    {
        self.decoders.insert(edge_type, Arc::new(decoder));
    }

    /// Register a custom edge type whose properties are kept verbatim.
    pub fn register_custom(&mut self, tag: &str) {
        let edge_type = EdgeType::from_tag(tag);
        let name = edge_type.as_str().to_string();
        self.register(edge_type, move |props| {
            Ok(EdgeMetadata::Custom(CustomMetadata::new(
                name.clone(),
                props.clone(),
            )))
        });
    }

    pub fn is_registered(&self, edge_type: &EdgeType) -> bool {
        self.decoders.contains_key(edge_type)
    }

    /// Build metadata for `edge_type` from its properties.
    pub fn decode(
        &self,
        edge_type: &EdgeType,
        props: &PropertyMap,
    ) -> Result<EdgeMetadata, MetadataError> {
        let decoder = self.decoders.get(edge_type).ok_or_else(|| {
            MetadataError::Deserialization(format!("unknown edge type: {}", edge_type))
        })?;
        decoder(props)
    }

    /// Registered types, sorted by tag.
    pub fn registered_types(&self) -> Vec<EdgeType> {
        let mut types: Vec<EdgeType> = self.decoders.keys().cloned().collect();
        types.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        types
    }
}

impl Default for MetadataRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetadataRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}
