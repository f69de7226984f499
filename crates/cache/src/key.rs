//! Deterministic cache keys.
//!
//! A key is `{prefix}:{operation}:{digest}` where the digest is the SHA-256
//! of the canonical JSON of the normalized parameters. Object keys are
//! sorted and string values are trimmed and lowercased, so "Computer
//! Science" and " computer science" produce the same key.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheKey {
    operation: String,
    params: BTreeMap<String, Value>,
    profile: Option<String>,
}

impl CacheKey {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            params: BTreeMap::new(),
            profile: None,
        }
    }

    /// Add a parameter. Values that fail to serialize are stored as null.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.params
            .insert(name.into().trim().to_lowercase(), normalize(value));
        self
    }

    /// Scope the key to a user profile fingerprint.
    pub fn with_profile(mut self, fingerprint: impl Into<String>) -> Self {
        self.profile = Some(fingerprint.into());
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Render the full key under `prefix`.
    pub fn render(&self, prefix: &str) -> String {
        let mut payload = Map::new();
        for (name, value) in &self.params {
            payload.insert(name.clone(), value.clone());
        }
        if let Some(profile) = &self.profile {
            payload.insert("__profile".into(), Value::String(profile.clone()));
        }
        let canonical = Value::Object(payload).to_string();
        let digest = format!("{:x}", Sha256::digest(canonical.as_bytes()));
        format!("{prefix}:{}:{digest}", self.operation)
    }
}

fn normalize(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_lowercase()),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        Value::Object(fields) => {
            let sorted: BTreeMap<String, Value> = fields
                .into_iter()
                .map(|(k, v)| (k.trim().to_lowercase(), normalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        other => other,
    }
}
