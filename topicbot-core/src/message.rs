//! Inbound message records.
//!
//! Messages cross the transport boundary as free-form JSON objects. Only
//! `user` is required; everything unrecognized is kept as metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use topicbot_common::util::truncate_with_ellipsis;
use topicbot_common::{Error, Result};

/// A message from a user, or a synthesized proactive message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Session id.
    pub user: String,

    /// What the user said. Empty for proactive turns.
    #[serde(default)]
    pub text: String,

    /// Tenant selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,

    /// Marks a silence-triggered turn.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub initiative: bool,

    /// Transport metadata, passed through untouched.
    #[serde(default, flatten)]
    pub metadata: Map<String, Value>,
}

impl InboundMessage {
    /// Create a text message for `user`.
    pub fn new(user: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            text: text.into(),
            customer: None,
            initiative: false,
            metadata: Map::new(),
        }
    }

    pub fn with_customer(mut self, customer: impl Into<String>) -> Self {
        self.customer = Some(customer.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Parse a message from arbitrary JSON.
    ///
    /// A missing or blank `user` (or the older `user_id`) is a validation
    /// error, as is a non-string `text` or `customer`.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(Error::Validation("message must be a JSON object".into()));
        };

        let user = match fields.remove("user").or_else(|| fields.remove("user_id")) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(Error::Validation("missing required field `user`".into())),
        };

        let text = match fields.remove("text") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s,
            Some(_) => return Err(Error::Validation("`text` must be a string".into())),
        };

        let customer = match fields.remove("customer") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(_) => return Err(Error::Validation("`customer` must be a string".into())),
        };

        let initiative = match fields.remove("initiative") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => b,
            Some(_) => return Err(Error::Validation("`initiative` must be a boolean".into())),
        };

        Ok(Self {
            user,
            text,
            customer,
            initiative,
            metadata: fields,
        })
    }

    /// Parse a message from a JSON string.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| Error::Validation(format!("message is not valid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Check required fields.
    pub fn validate(&self) -> Result<()> {
        if self.user.trim().is_empty() {
            return Err(Error::Validation("missing required field `user`".into()));
        }
        Ok(())
    }

    /// Synthesize the proactive message sent on behalf of a silent user.
    pub fn proactive(&self) -> Self {
        Self {
            user: self.user.clone(),
            text: String::new(),
            customer: self.customer.clone(),
            initiative: true,
            metadata: self.metadata.clone(),
        }
    }

    /// Short text preview for logs.
    pub fn preview(&self) -> String {
        truncate_with_ellipsis(&self.text, 48)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_keeps_metadata() {
        let msg = InboundMessage::from_value(json!({
            "user": "u1",
            "text": "pay my bill",
            "customer": "acme",
            "platform": "web",
            "intents": ["billing.pay"]
        }))
        .unwrap();

        assert_eq!(msg.user, "u1");
        assert_eq!(msg.text, "pay my bill");
        assert_eq!(msg.customer.as_deref(), Some("acme"));
        assert!(!msg.initiative);
        assert_eq!(msg.metadata.get("platform"), Some(&json!("web")));
        assert!(msg.metadata.get("user").is_none());
    }

    #[test]
    fn test_missing_user_is_validation_error() {
        let err = InboundMessage::from_value(json!({ "text": "hi" })).unwrap_err();
        assert!(err.is_validation());

        let err = InboundMessage::from_value(json!({ "user": "   ", "text": "hi" })).unwrap_err();
        assert!(err.is_validation());

        let err = InboundMessage::from_value(json!(["u1"])).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_legacy_user_id_field() {
        let msg = InboundMessage::from_value(json!({ "user_id": 42 })).unwrap();
        assert_eq!(msg.user, "42");
        assert_eq!(msg.text, "");
    }

    #[test]
    fn test_wrong_field_types() {
        assert!(InboundMessage::from_value(json!({ "user": "u1", "text": 5 })).is_err());
        assert!(InboundMessage::from_value(json!({ "user": "u1", "initiative": "yes" })).is_err());
    }

    #[test]
    fn test_from_json_str_rejects_garbage() {
        let err = InboundMessage::from_json_str("{oops").unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_proactive_message() {
        let msg = InboundMessage::new("u1", "hello")
            .with_customer("acme")
            .with_metadata("platform", "sms");
        let nudge = msg.proactive();
        assert!(nudge.initiative);
        assert!(nudge.text.is_empty());
        assert_eq!(nudge.customer.as_deref(), Some("acme"));
        assert_eq!(nudge.metadata.get("platform"), Some(&json!("sms")));
    }

    #[test]
    fn test_serialized_shape_is_flat() {
        let msg = InboundMessage::new("u1", "hi").with_metadata("platform", "web");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({ "user": "u1", "text": "hi", "platform": "web" }));
    }
}
