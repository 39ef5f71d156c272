//! The parsed view of one turn handed to topics.

use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::context::{to_object, Context, Grounding};
use crate::message::InboundMessage;
use crate::nlu::{Entity, ParsedTurn};

/// Everything a topic may read while responding to a turn.
#[derive(Debug, Clone)]
pub struct Dialog {
    pub message: InboundMessage,
    pub entities: Vec<Entity>,
    pub intent_labels: Vec<String>,
    pub templated_text: String,
    /// Context snapshot, including this turn's entities.
    pub context: BTreeMap<String, Value>,
    pub grounding: BTreeMap<String, Value>,
}

impl Dialog {
    pub fn new(
        message: InboundMessage,
        parsed: ParsedTurn,
        context: &Context,
        grounding: &Grounding,
    ) -> Self {
        Self {
            message,
            entities: parsed.entities,
            intent_labels: parsed.intent_labels,
            templated_text: parsed.templated_text,
            context: context.values().clone(),
            grounding: grounding.values().clone(),
        }
    }

    /// Whether this turn was synthesized by the silence scheduler.
    pub fn is_initiative(&self) -> bool {
        self.message.initiative
    }

    pub fn text(&self) -> &str {
        &self.message.text
    }

    /// Resolve a slot: this turn's entities first, then context, then grounding.
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(entity) = self.entities.iter().find(|e| e.kind == key) {
            return Some(Value::String(entity.value.clone()));
        }
        self.context
            .get(key)
            .or_else(|| self.grounding.get(key))
            .filter(|v| !v.is_null())
            .cloned()
    }

    /// Whether a slot resolves to a non-empty value.
    pub fn has(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
            None => false,
        }
    }

    /// All resolvable slots, with the same precedence as [`Dialog::get`].
    pub fn slots(&self) -> BTreeMap<String, Value> {
        let mut slots = self.grounding.clone();
        slots.extend(self.context.iter().map(|(k, v)| (k.clone(), v.clone())));
        for entity in self.entities.iter().rev() {
            slots.insert(entity.kind.clone(), Value::String(entity.value.clone()));
        }
        slots
    }

    /// Data exposed to reply templates.
    pub fn template_data(&self) -> Value {
        json!({
            "user": self.message.user,
            "customer": self.message.customer,
            "text": self.message.text,
            "intents": self.intent_labels,
            "initiative": self.message.initiative,
            "slots": to_object(&self.slots()),
            "context": to_object(&self.context),
            "grounding": to_object(&self.grounding),
        })
    }
}
