//! Topicbot Core - multi-turn dialogue orchestration.
//!
//! This crate provides:
//! - Inbound message parsing and validation
//! - Per-user sessions with a durable cache (in-memory or Redis)
//! - Context and grounding maintenance across topic changes
//! - Topic plugins, compiled or loaded from JSON manifests
//! - Protocol renderers and human-like response pacing
//! - A bounded session store with silence detection and proactive turns

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod bot;
pub mod cache;
pub mod context;
pub mod dialog;
pub mod message;
pub mod nlu;
pub mod plugin;
pub mod response;
pub mod session;
pub mod topic;

pub use bot::Bot;
pub use cache::{create_cache, CacheBackend, DurableCache, InMemoryCache, RedisCache};
pub use context::{merged_view, Context, Features, Grounding};
pub use dialog::Dialog;
pub use message::InboundMessage;
pub use nlu::{
    template_text, Entity, EntityExtractor, IntentClassifier, MetadataIntentClassifier,
    NoopEntityExtractor, ParsedTurn,
};
pub use response::{
    Pacer, RawOutput, Renderer, RendererRegistry, Response, PROTOCOL_JSON, PROTOCOL_TEXT,
};
pub use session::{Continuity, Engine, Session, SessionRecord, TurnOutcome, TurnSettings, TurnState};
pub use topic::{
    CaseSpec, ParamSpec, Topic, TopicPlugin, TopicRegistry, TopicReply, TopicStack, TopicStatus,
};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::bot::Bot;
    pub use crate::dialog::Dialog;
    pub use crate::message::InboundMessage;
    pub use crate::nlu::{Entity, EntityExtractor, IntentClassifier};
    pub use crate::response::RawOutput;
    pub use crate::session::Engine;
    pub use crate::topic::{CaseSpec, Topic, TopicPlugin};
    pub use topicbot_common::{Error, Result};
}
