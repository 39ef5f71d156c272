//! Output renderers, keyed by protocol.
//!
//! # Built-in protocols
//!
//! | Protocol | Renderer | Output |
//! |----------|----------|--------|
//! | 0 | [`TextRenderer`] | `{"type": "text", "text": ...}` |
//! | 1 | [`JsonRenderer`] | the handler output, unchanged |
//!
//! Further renderers are loaded from JSON manifests of the form
//! `{"protocol": 7, "template": "..."}` where the template is handlebars.

use handlebars::Handlebars;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::{RawOutput, PROTOCOL_JSON, PROTOCOL_TEXT};
use crate::message::InboundMessage;
use crate::plugin::scan_manifests;
use topicbot_common::config::ResponsesConfig;
use topicbot_common::{Error, Result};

/// Turns a raw handler output into its wire form.
pub trait Renderer: Send + Sync {
    fn protocol(&self) -> i32;

    fn render(&self, raw: &RawOutput, message: &InboundMessage) -> Result<Value>;
}

/// Plain-text replies.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextRenderer;

impl Renderer for TextRenderer {
    fn protocol(&self) -> i32 {
        PROTOCOL_TEXT
    }

    fn render(&self, raw: &RawOutput, _message: &InboundMessage) -> Result<Value> {
        let text = match &raw.output {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => raw
                .reply_text()
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string()),
        };
        Ok(json!({ "type": "text", "text": text }))
    }
}

/// Structured replies, passed through.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn protocol(&self) -> i32 {
        PROTOCOL_JSON
    }

    fn render(&self, raw: &RawOutput, _message: &InboundMessage) -> Result<Value> {
        Ok(raw.output.clone())
    }
}

#[derive(Debug, Deserialize)]
struct RendererManifest {
    protocol: i32,
    template: String,
}

/// Renderer backed by a handlebars template.
///
/// The template sees `output`, `raw_data`, `user`, `customer` and `text`.
pub struct TemplateRenderer {
    protocol: i32,
    registry: Handlebars<'static>,
}

impl TemplateRenderer {
    const TEMPLATE: &'static str = "reply";

    pub fn new(protocol: i32, template: &str) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_template_string(Self::TEMPLATE, template)
            .map_err(|e| Error::Internal(format!("invalid template: {e}")))?;
        Ok(Self { protocol, registry })
    }

    /// Load a renderer manifest file.
    pub fn from_manifest(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let raw = fs::read_to_string(path).map_err(|e| Error::plugin_load(&display, e.to_string()))?;
        let manifest: RendererManifest =
            serde_json::from_str(&raw).map_err(|e| Error::plugin_load(&display, e.to_string()))?;
        Self::new(manifest.protocol, &manifest.template)
            .map_err(|e| Error::plugin_load(&display, e.to_string()))
    }
}

impl Renderer for TemplateRenderer {
    fn protocol(&self) -> i32 {
        self.protocol
    }

    fn render(&self, raw: &RawOutput, message: &InboundMessage) -> Result<Value> {
        let data = json!({
            "output": raw.output,
            "raw_data": raw.raw_data,
            "user": message.user,
            "customer": message.customer,
            "text": message.text,
        });
        let rendered = self
            .registry
            .render(Self::TEMPLATE, &data)
            .map_err(|e| Error::Internal(format!("rendering protocol {}: {e}", self.protocol)))?;
        Ok(Value::String(rendered))
    }
}

/// Renderers by protocol. Built once at startup and shared read-only.
#[derive(Clone)]
pub struct RendererRegistry {
    renderers: BTreeMap<i32, Arc<dyn Renderer>>,
}

impl Default for RendererRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl RendererRegistry {
    /// Registry without any renderer.
    pub fn empty() -> Self {
        Self {
            renderers: BTreeMap::new(),
        }
    }

    /// Registry holding the text and JSON renderers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(TextRenderer));
        registry.register(Arc::new(JsonRenderer));
        registry
    }

    /// Built-ins plus every manifest under `response_plugin_path`.
    pub fn from_config(config: &ResponsesConfig) -> Result<Self> {
        let mut registry = Self::with_builtins();
        if let Some(path) = &config.response_plugin_path {
            let loaded = registry.discover(path)?;
            tracing::info!(path = %path.display(), loaded, "Response renderers discovered");
        }
        Ok(registry)
    }

    /// Register a renderer, replacing any previous one for its protocol.
    pub fn register(&mut self, renderer: Arc<dyn Renderer>) {
        let protocol = renderer.protocol();
        if self.renderers.insert(protocol, renderer).is_some() {
            tracing::warn!(protocol, "Renderer replaced");
        }
    }

    /// Load renderer manifests found under `root`.
    ///
    /// Broken files are logged and skipped. Returns how many were loaded.
    pub fn discover(&mut self, root: &Path) -> Result<usize> {
        let mut loaded = 0;
        for result in scan_manifests(root)? {
            match result.and_then(|path| TemplateRenderer::from_manifest(&path)) {
                Ok(renderer) => {
                    tracing::debug!(protocol = renderer.protocol(), "Loaded renderer manifest");
                    self.register(Arc::new(renderer));
                    loaded += 1;
                }
                Err(e) => tracing::warn!(error = %e, "Skipping renderer manifest"),
            }
        }
        Ok(loaded)
    }

    /// Look up the renderer for `protocol`.
    pub fn get(&self, protocol: i32) -> Result<&Arc<dyn Renderer>> {
        self.renderers
            .get(&protocol)
            .ok_or(Error::UnknownProtocol(protocol))
    }

    pub fn render(&self, raw: &RawOutput, message: &InboundMessage) -> Result<Value> {
        self.get(raw.protocol)?.render(raw, message)
    }

    pub fn protocols(&self) -> Vec<i32> {
        self.renderers.keys().copied().collect()
    }
}
