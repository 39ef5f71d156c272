//! Context and grounding accumulators.
//!
//! Both are flat string-keyed maps of conversational facts:
//!
//! | Accumulator | Lifetime |
//! |-------------|----------|
//! | [`Context`] | current topic; reset whenever the topic changes |
//! | [`Grounding`] | whole session; absorbs context at every topic change |
//!
//! Lookups of absent keys return `None`. Absence means "unknown".

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::message::InboundMessage;
use crate::nlu::ParsedTurn;

/// Flat feature mapping handed to intent classification.
pub type Features = BTreeMap<String, Value>;

/// Key under which message attributes are supplied by the transport.
const ATTRIBUTES_KEY: &str = "attributes";

// ============================================================================
// Context
// ============================================================================

/// Short-lived facts about the current topic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    values: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh context derived from a message.
    pub fn from_message(message: &InboundMessage) -> Self {
        let mut context = Self::new();
        context.consume(message);
        context
    }

    /// Fold message fields into the context.
    ///
    /// Records `user` and `customer`, plus every entry of an `attributes`
    /// object in the metadata, with keys trimmed and lowercased.
    pub fn consume(&mut self, message: &InboundMessage) {
        self.values
            .insert("user".into(), Value::String(message.user.clone()));
        if let Some(customer) = &message.customer {
            self.values
                .insert("customer".into(), Value::String(customer.clone()));
        }
        if let Some(Value::Object(attributes)) = message.metadata.get(ATTRIBUTES_KEY) {
            for (key, value) in attributes {
                let key = key.trim().to_lowercase();
                if !key.is_empty() && !value.is_null() {
                    self.values.insert(key, value.clone());
                }
            }
        }
    }

    /// Fold this turn's entities into the context, keyed by entity type.
    pub fn update(&mut self, parsed: &ParsedTurn) {
        for entity in &parsed.entities {
            self.values
                .insert(entity.kind.clone(), Value::String(entity.value.clone()));
        }
    }

    /// Project the context into classifier features.
    ///
    /// Scalars are copied, nested objects are flattened with dotted keys and
    /// arrays are kept whole. Nulls are dropped.
    pub fn to_features(&self) -> Features {
        let mut features = Features::new();
        for (key, value) in &self.values {
            flatten_into(&mut features, key, value);
        }
        features
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Reset to empty.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }
}

fn flatten_into(features: &mut Features, key: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (child, inner) in map {
                flatten_into(features, &format!("{key}.{child}"), inner);
            }
        }
        other => {
            features.insert(key.to_string(), other.clone());
        }
    }
}

// ============================================================================
// Grounding
// ============================================================================

/// Durable facts carried across topic changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grounding {
    values: BTreeMap<String, Value>,
}

impl Grounding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb the context. Keys already grounded are never overwritten.
    ///
    /// Returns the number of newly grounded keys.
    pub fn update(&mut self, context: &Context) -> usize {
        let mut added = 0;
        for (key, value) in context.iter() {
            if !self.values.contains_key(key) {
                self.values.insert(key.clone(), value.clone());
                added += 1;
            }
        }
        added
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }
}

/// Context features with grounding filling the gaps context leaves.
pub fn merged_view(context: &Context, grounding: &Grounding) -> Features {
    let mut merged = Features::new();
    for (key, value) in grounding.iter() {
        flatten_into(&mut merged, key, value);
    }
    merged.extend(context.to_features());
    merged
}

/// Render a value map as a JSON object.
pub(crate) fn to_object(values: &BTreeMap<String, Value>) -> Map<String, Value> {
    values
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
