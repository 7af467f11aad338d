//! Parsed feed document
//!
//! The shape a feed fetcher hands to the store: feed-level metadata plus an
//! ordered list of entries. Entries are open field dictionaries because feeds
//! in the wild omit fields freely; every read goes through
//! [`FeedEntry::get_field`], which keeps "absent" distinct from "empty".

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A parsed feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedDocument {
    #[serde(default)]
    pub meta: FeedMeta,
    #[serde(default)]
    pub entries: Vec<FeedEntry>,
}

/// Channel-level metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedMeta {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub copyright: Option<String>,
    pub language: Option<String>,
}

/// One feed entry as a field dictionary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedEntry {
    fields: Map<String, Value>,
}

impl FeedDocument {
    pub fn new(meta: FeedMeta, entries: Vec<FeedEntry>) -> Self {
        Self { meta, entries }
    }

    /// Parse a document serialized as JSON by an upstream fetcher
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl FeedEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
    }

    /// Look up a field. JSON `null` counts as absent.
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// Scalar field as text; numbers and booleans are rendered, containers are not text.
    pub fn get_text(&self, name: &str) -> Option<String> {
        self.get_field(name).and_then(scalar_text)
    }

    /// First element of a list field, or the field itself when it is not a list
    pub fn first_of(&self, name: &str) -> Option<&Value> {
        match self.get_field(name)? {
            Value::Array(items) => items.first().filter(|v| !v.is_null()),
            other => Some(other),
        }
    }

    /// Every element of a list field; a scalar counts as a one-element list
    pub fn list(&self, name: &str) -> Vec<&Value> {
        match self.get_field(name) {
            Some(Value::Array(items)) => items.iter().filter(|v| !v.is_null()).collect(),
            Some(other) => vec![other],
            None => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Render a scalar JSON value as text
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
