//! Natural-language collaborator contracts.
//!
//! Entity extraction and intent classification are supplied by external
//! services; the engine only depends on the traits below. Implementations
//! report failures as [`Error::Collaborator`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Features;
use crate::message::InboundMessage;
use topicbot_common::{Error, Result};

/// A recognized entity span, in character offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub start: usize,
    pub end: usize,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Entity {
    pub fn new(start: usize, end: usize, value: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            start,
            end,
            value: value.into(),
            kind: kind.into(),
        }
    }
}

/// Output of the parse step of a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedTurn {
    /// Entities sorted by `start`, without overlaps.
    pub entities: Vec<Entity>,
    /// Intent labels in classifier order, deduplicated.
    pub intent_labels: Vec<String>,
    /// Text with each entity span replaced by `{type}`.
    pub templated_text: String,
}

impl ParsedTurn {
    /// Parse result for a proactive turn: a single label and nothing else.
    pub fn initiative(label: impl Into<String>) -> Self {
        Self {
            entities: Vec::new(),
            intent_labels: vec![label.into()],
            templated_text: String::new(),
        }
    }
}

/// Entity recognition service.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn ner(&self, text: &str) -> Result<Vec<Entity>>;
}

/// Intent classification service.
///
/// Receives the templated text and the merged context/grounding features.
/// The inbound message is passed along for classifiers that read transport
/// metadata.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn predict(
        &self,
        templated_text: &str,
        features: &Features,
        message: &InboundMessage,
    ) -> Result<Vec<String>>;
}

/// Sort entities, drop overlapping or out-of-range spans, and template the text.
pub fn template_text(text: &str, mut entities: Vec<Entity>) -> (String, Vec<Entity>) {
    entities.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let chars: Vec<char> = text.chars().collect();
    let mut kept = Vec::with_capacity(entities.len());
    let mut templated = String::with_capacity(text.len());
    let mut cursor = 0;

    for entity in entities {
        if entity.start >= entity.end || entity.end > chars.len() {
            tracing::warn!(
                start = entity.start,
                end = entity.end,
                kind = %entity.kind,
                "Dropping entity with invalid span"
            );
            continue;
        }
        if entity.start < cursor {
            tracing::debug!(start = entity.start, kind = %entity.kind, "Dropping overlapping entity");
            continue;
        }
        templated.extend(&chars[cursor..entity.start]);
        templated.push('{');
        templated.push_str(&entity.kind);
        templated.push('}');
        cursor = entity.end;
        kept.push(entity);
    }
    templated.extend(&chars[cursor..]);

    (templated, kept)
}

/// Extractor that never finds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEntityExtractor;

#[async_trait]
impl EntityExtractor for NoopEntityExtractor {
    async fn ner(&self, _text: &str) -> Result<Vec<Entity>> {
        Ok(Vec::new())
    }
}

/// Classifier reading labels the transport already attached to the message.
///
/// Looks at the `intents` metadata field, which may hold a string or an
/// array of strings.
#[derive(Debug, Clone)]
pub struct MetadataIntentClassifier {
    field: String,
}

impl Default for MetadataIntentClassifier {
    fn default() -> Self {
        Self {
            field: "intents".into(),
        }
    }
}

impl MetadataIntentClassifier {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

#[async_trait]
impl IntentClassifier for MetadataIntentClassifier {
    async fn predict(
        &self,
        _templated_text: &str,
        _features: &Features,
        message: &InboundMessage,
    ) -> Result<Vec<String>> {
        match message.metadata.get(&self.field) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::String(label)) => Ok(vec![label.clone()]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        Error::Collaborator(format!("`{}` must contain only strings", self.field))
                    })
                })
                .collect(),
            Some(_) => Err(Error::Collaborator(format!(
                "`{}` must be a string or an array of strings",
                self.field
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_template_text_sorts_and_replaces() {
        let text = "pay 40 dollars on friday";
        let entities = vec![
            Entity::new(18, 24, "friday", "date"),
            Entity::new(4, 14, "40 dollars", "amount"),
        ];
        let (templated, kept) = template_text(text, entities);
        assert_eq!(templated, "pay {amount} on {date}");
        assert_eq!(kept[0].kind, "amount");
        assert_eq!(kept[1].kind, "date");
    }

    #[test]
    fn test_template_text_drops_overlaps_and_bad_spans() {
        let text = "new york city";
        let entities = vec![
            Entity::new(4, 8, "york", "name"),
            Entity::new(0, 13, "new york city", "city"),
            Entity::new(5, 99, "oops", "junk"),
            Entity::new(3, 3, "", "empty"),
        ];
        let (templated, kept) = template_text(text, entities);
        assert_eq!(templated, "{city}");
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_template_text_multibyte() {
        let (templated, _) = template_text("我要去北京", vec![Entity::new(3, 5, "北京", "city")]);
        assert_eq!(templated, "我要去{city}");
    }

    #[test]
    fn test_entity_wire_name() {
        let entity: Entity =
            serde_json::from_value(json!({ "start": 0, "end": 2, "value": "hi", "type": "greeting" }))
                .unwrap();
        assert_eq!(entity.kind, "greeting");
    }

    #[tokio::test]
    async fn test_metadata_classifier() {
        let classifier = MetadataIntentClassifier::default();
        let features = Features::new();

        let msg = InboundMessage::new("u1", "x").with_metadata("intents", json!(["a.b", "c.d"]));
        let labels = classifier.predict("x", &features, &msg).await.unwrap();
        assert_eq!(labels, vec!["a.b", "c.d"]);

        let msg = InboundMessage::new("u1", "x").with_metadata("intents", "a.b");
        assert_eq!(classifier.predict("x", &features, &msg).await.unwrap(), vec!["a.b"]);

        let msg = InboundMessage::new("u1", "x");
        assert!(classifier.predict("x", &features, &msg).await.unwrap().is_empty());

        let msg = InboundMessage::new("u1", "x").with_metadata("intents", json!([1]));
        assert!(classifier
            .predict("x", &features, &msg)
            .await
            .unwrap_err()
            .is_collaborator());
    }

    #[tokio::test]
    async fn test_noop_extractor() {
        assert!(NoopEntityExtractor.ner("anything").await.unwrap().is_empty());
    }
}
