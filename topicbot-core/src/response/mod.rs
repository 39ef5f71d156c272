//! Response records.
//!
//! Topics produce [`RawOutput`]s. During assembly each one is rendered by
//! the renderer registered for its protocol and given a delivery delay,
//! yielding a [`Response`].

pub mod pacing;
pub mod renderer;

pub use pacing::Pacer;
pub use renderer::{JsonRenderer, Renderer, RendererRegistry, TemplateRenderer, TextRenderer};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Protocol of plain-text replies.
pub const PROTOCOL_TEXT: i32 = 0;
/// Protocol of structured JSON replies.
pub const PROTOCOL_JSON: i32 = 1;

/// What a topic handler returns, before rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOutput {
    #[serde(default)]
    pub protocol: i32,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub raw_data: Value,
    /// Explicit delivery delay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    /// Deliver immediately, overriding pacing.
    #[serde(default)]
    pub no_delay: bool,
}

impl RawOutput {
    pub fn new(protocol: i32, output: Value) -> Self {
        Self {
            protocol,
            output,
            raw_data: Value::Null,
            delay_ms: None,
            no_delay: false,
        }
    }

    /// A plain-text reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(PROTOCOL_TEXT, Value::String(text.into()))
    }

    /// A structured JSON reply.
    pub fn json(output: Value) -> Self {
        Self::new(PROTOCOL_JSON, output)
    }

    pub fn with_raw_data(mut self, raw_data: Value) -> Self {
        self.raw_data = raw_data;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = Some(delay.as_millis() as u64);
        self
    }

    pub fn without_delay(mut self) -> Self {
        self.no_delay = true;
        self
    }

    /// Reply text used for pacing: the output itself when it is a string,
    /// otherwise its `text` field.
    pub fn reply_text(&self) -> Option<&str> {
        match &self.output {
            Value::String(s) => Some(s),
            Value::Object(map) => map.get("text").and_then(Value::as_str),
            _ => None,
        }
    }
}

/// A rendered reply ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub user: String,
    pub protocol: i32,
    /// Name of the topic that produced it.
    pub topic: String,
    pub output: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub raw_data: Value,
    pub delay_ms: u64,
}

impl Response {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}
