//! Session: the per-user turn orchestrator.
//!
//! A turn moves strictly forward through
//! `Restoring → AwaitingParse → DecidingContinuity → Dispatching → Persisting`.
//! Persisting is the last step, so a turn that fails earlier leaves the
//! cached session untouched.
//!
//! Turns of the same session must be serialized by the caller; there is no
//! per-session lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;

use crate::cache::DurableCache;
use crate::context::{merged_view, Context, Grounding};
use crate::dialog::Dialog;
use crate::message::InboundMessage;
use crate::nlu::{template_text, EntityExtractor, IntentClassifier, ParsedTurn};
use crate::response::{Pacer, RendererRegistry, Response};
use crate::topic::{Topic, TopicPlugin, TopicRegistry, TopicStack, TopicStatus};
use topicbot_common::config::{Config, SessionConfig};
use topicbot_common::logging::generate_turn_id;
use topicbot_common::{Result, ResultExt};

// ============================================================================
// Persisted State
// ============================================================================

/// What the durable cache holds per session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub topic_stack: TopicStack,
    #[serde(default)]
    pub context: Context,
    #[serde(default)]
    pub grounding: Grounding,
    /// Last real (non-proactive) message, used to synthesize proactive turns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<InboundMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Turn State
// ============================================================================

/// Where a turn is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Restoring,
    AwaitingParse,
    DecidingContinuity,
    Dispatching,
    Persisting,
}

/// Outcome of the continuity decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuity {
    /// Start fresh topics from this turn's labels.
    NewTopic,
    /// Keep the most recent topic.
    Continue(TopicStatus),
}

impl Continuity {
    /// Decide whether this turn continues the topic on top of the stack.
    ///
    /// An empty stack always starts a new topic. Otherwise the top topic is
    /// continued when at least one label belongs to it, judged against the
    /// registry's longest-prefix pick for that label.
    pub fn decide(stack: &TopicStack, labels: &[String], topics: &TopicRegistry) -> Self {
        match stack.top() {
            Some(top) if labels.iter().any(|label| top.claims(label, topics.best_match(label))) => {
                Self::Continue(top.clone())
            }
            _ => Self::NewTopic,
        }
    }

    pub fn is_new_topic(&self) -> bool {
        matches!(self, Self::NewTopic)
    }
}

/// Result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub session_id: String,
    pub turn_id: String,
    pub responses: Vec<Response>,
    /// Status of every dispatched topic, as pushed onto the stack.
    pub topics: Vec<TopicStatus>,
    pub new_topic: bool,
    /// Persisted session state after the turn.
    pub record: SessionRecord,
}

// ============================================================================
// Engine
// ============================================================================

/// Turn-level settings taken from `session` config.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub initiative_intent: String,
    pub multi_topic: bool,
    pub topic_stack_depth: usize,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for TurnSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            initiative_intent: config.initiative_intent.clone(),
            multi_topic: config.multi_topic,
            topic_stack_depth: config.topic_stack_depth,
        }
    }
}

/// Process-scoped collaborators shared by all sessions.
///
/// Built once at startup and injected; nothing here is global.
#[derive(Clone)]
pub struct Engine {
    pub(crate) topics: Arc<TopicRegistry>,
    pub(crate) renderers: Arc<RendererRegistry>,
    pub(crate) cache: DurableCache,
    pub(crate) extractor: Arc<dyn EntityExtractor>,
    pub(crate) classifier: Arc<dyn IntentClassifier>,
    pub(crate) pacer: Pacer,
    pub(crate) settings: TurnSettings,
}

impl Engine {
    pub fn new(
        topics: TopicRegistry,
        renderers: RendererRegistry,
        cache: DurableCache,
        extractor: Arc<dyn EntityExtractor>,
        classifier: Arc<dyn IntentClassifier>,
    ) -> Self {
        Self {
            topics: Arc::new(topics),
            renderers: Arc::new(renderers),
            cache,
            extractor,
            classifier,
            pacer: Pacer::immediate(),
            settings: TurnSettings::default(),
        }
    }

    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_settings(mut self, settings: TurnSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build every collaborator from configuration.
    ///
    /// Fails on configuration errors: missing default topic, unresolvable
    /// plugin paths, unreachable cache backend.
    pub async fn from_config(
        config: &Config,
        compiled_topics: Vec<TopicPlugin>,
        extractor: Arc<dyn EntityExtractor>,
        classifier: Arc<dyn IntentClassifier>,
    ) -> Result<Self> {
        let topics = TopicRegistry::from_config(&config.topics, compiled_topics)?;
        let renderers = RendererRegistry::from_config(&config.responses)?;
        let cache = DurableCache::from_config(&config.cache).await?;
        let pacer = Pacer::new(&config.pacing)?;

        Ok(Self::new(topics, renderers, cache, extractor, classifier)
            .with_pacer(pacer)
            .with_settings(TurnSettings::from(&config.session)))
    }

    pub fn topics(&self) -> &TopicRegistry {
        &self.topics
    }

    pub fn renderers(&self) -> &RendererRegistry {
        &self.renderers
    }

    pub fn cache(&self) -> &DurableCache {
        &self.cache
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    /// Persisted record of a session, if cached.
    pub async fn load_record(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        self.cache.get_json(session_id).await
    }

    /// Run one turn for `message` at the current time.
    pub async fn turn(&self, message: InboundMessage) -> Result<TurnOutcome> {
        self.turn_at(message, Utc::now()).await
    }

    /// Run one turn for `message` as of `now`.
    pub async fn turn_at(&self, message: InboundMessage, now: DateTime<Utc>) -> Result<TurnOutcome> {
        message.validate()?;

        let turn_id = generate_turn_id();
        let span = tracing::info_span!(
            "turn",
            session_id = %message.user,
            turn_id = %turn_id,
            initiative = message.initiative
        );

        async move {
            let mut session = Session::restore(self, &message).await?;
            session.run(self, message, turn_id, now).await
        }
        .instrument(span)
        .await
    }
}

// ============================================================================
// Session
// ============================================================================

/// One user's conversation state during a turn.
#[derive(Debug)]
pub struct Session {
    id: String,
    record: SessionRecord,
    restored: bool,
    state: TurnState,
}

impl Session {
    /// Load cached state, or start empty with a context derived from the message.
    pub async fn restore(engine: &Engine, message: &InboundMessage) -> Result<Self> {
        let mut session = Self {
            id: message.user.clone(),
            record: SessionRecord::default(),
            restored: false,
            state: TurnState::Restoring,
        };

        match engine
            .load_record(&session.id)
            .await
            .context("restoring session")?
        {
            Some(record) => {
                tracing::debug!(
                    topics = record.topic_stack.len(),
                    context_keys = record.context.len(),
                    grounding_keys = record.grounding.len(),
                    "Session restored"
                );
                session.record = record;
                session.restored = true;
            }
            None => tracing::debug!("No cached session, starting fresh"),
        }
        session.record.context.consume(message);
        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Whether state came from the cache.
    pub fn is_restored(&self) -> bool {
        self.restored
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    async fn parse(&self, engine: &Engine, message: &InboundMessage) -> Result<ParsedTurn> {
        if message.initiative {
            return Ok(ParsedTurn::initiative(&engine.settings.initiative_intent));
        }

        let entities = engine
            .extractor
            .ner(&message.text)
            .await
            .context("entity extraction")?;
        let (templated_text, entities) = template_text(&message.text, entities);

        let features = merged_view(&self.record.context, &self.record.grounding);
        let mut intent_labels: Vec<String> = Vec::new();
        for label in engine
            .classifier
            .predict(&templated_text, &features, message)
            .await
            .context("intent classification")?
        {
            if !intent_labels.contains(&label) {
                intent_labels.push(label);
            }
        }

        Ok(ParsedTurn {
            entities,
            intent_labels,
            templated_text,
        })
    }

    /// Apply the continuity decision to context and grounding and resolve
    /// the topics to dispatch.
    fn decide(
        &mut self,
        engine: &Engine,
        message: &InboundMessage,
        parsed: &ParsedTurn,
    ) -> (Continuity, Vec<Box<dyn Topic>>) {
        let mut continuity =
            Continuity::decide(&self.record.topic_stack, &parsed.intent_labels, &engine.topics);

        if let Continuity::Continue(status) = &continuity {
            match engine.topics.restore(status) {
                Some(topic) => {
                    tracing::info!(topic = %status.name, topic_id = %status.id, "Continuing topic");
                    return (continuity, vec![topic]);
                }
                None => {
                    tracing::warn!(topic = %status.name, "Continued topic no longer registered");
                    continuity = Continuity::NewTopic;
                }
            }
        }

        let absorbed = self.record.grounding.update(&self.record.context);
        self.record.context.clear();
        self.record.context.consume(message);

        let mut topics = engine
            .topics
            .resolve_by_intent_labels(&parsed.intent_labels, None);
        if !engine.settings.multi_topic {
            topics.truncate(1);
        }

        tracing::info!(
            topics = ?topics.iter().map(|t| t.name()).collect::<Vec<_>>(),
            grounded = absorbed,
            "New topic"
        );
        (continuity, topics)
    }

    /// Run the rest of the turn and persist.
    pub async fn run(
        &mut self,
        engine: &Engine,
        message: InboundMessage,
        turn_id: String,
        now: DateTime<Utc>,
    ) -> Result<TurnOutcome> {
        tracing::debug!(text = %message.preview(), "Turn started");

        self.state = TurnState::AwaitingParse;
        let parsed = self.parse(engine, &message).await?;
        tracing::debug!(
            labels = ?parsed.intent_labels,
            entities = parsed.entities.len(),
            "Turn parsed"
        );

        self.state = TurnState::DecidingContinuity;
        let (continuity, topics) = self.decide(engine, &message, &parsed);
        self.record.context.update(&parsed);

        self.state = TurnState::Dispatching;
        let prior_cases = match &continuity {
            Continuity::Continue(status) => status.cases.clone(),
            Continuity::NewTopic => Vec::new(),
        };
        let dialog = Dialog::new(
            message.clone(),
            parsed,
            &self.record.context,
            &self.record.grounding,
        );

        let mut responses = Vec::new();
        let mut statuses = Vec::with_capacity(topics.len());
        for topic in &topics {
            let name = topic.name();
            let reply = topic
                .respond(&dialog, &prior_cases)
                .await
                .context(format!("topic {name}"))?;

            for raw in &reply.outputs {
                let output = engine.renderers.render(raw, &message)?;
                let delay = engine.pacer.delay_for(raw);
                responses.push(Response {
                    user: self.id.clone(),
                    protocol: raw.protocol,
                    topic: name.clone(),
                    output,
                    raw_data: raw.raw_data.clone(),
                    delay_ms: delay.as_millis() as u64,
                });
            }
            statuses.push(topic.status(reply.cases));
        }

        self.state = TurnState::Persisting;
        for status in &statuses {
            self.record
                .topic_stack
                .push(status.clone(), engine.settings.topic_stack_depth);
        }
        if !message.initiative {
            self.record.last_message = Some(message);
        }
        self.record.updated_at = Some(now);
        engine
            .cache
            .set_json(&self.id, &self.record)
            .await
            .map_err(|e| e.with_context("persisting session"))?;

        self.state = TurnState::Idle;
        tracing::info!(
            responses = responses.len(),
            stack_depth = self.record.topic_stack.len(),
            "Turn completed"
        );

        Ok(TurnOutcome {
            session_id: self.id.clone(),
            turn_id,
            responses,
            topics: statuses,
            new_topic: continuity.is_new_topic(),
            record: self.record.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlu::{Entity, NoopEntityExtractor};
    use crate::topic::testing::EchoTopic;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use topicbot_common::Error;

    /// Classifier returning the labels found in the message text, split on spaces,
    /// when they contain a dot. "boom" fails.
    struct TextLabels;

    #[async_trait]
    impl IntentClassifier for TextLabels {
        async fn predict(
            &self,
            _templated: &str,
            _features: &crate::context::Features,
            message: &InboundMessage,
        ) -> Result<Vec<String>> {
            if message.text == "boom" {
                return Err(Error::Collaborator("classifier down".into()));
            }
            Ok(message
                .text
                .split_whitespace()
                .filter(|w| w.contains('.'))
                .map(str::to_string)
                .collect())
        }
    }

    /// Extractor tagging the word "gold" as a plan.
    struct PlanExtractor;

    #[async_trait]
    impl EntityExtractor for PlanExtractor {
        async fn ner(&self, text: &str) -> Result<Vec<Entity>> {
            Ok(text
                .find("gold")
                .map(|i| {
                    let start = text[..i].chars().count();
                    vec![Entity::new(start, start + 4, "gold", "plan")]
                })
                .unwrap_or_default())
        }
    }

    fn build_engine() -> Engine {
        let registry = TopicRegistry::new(
            "chitchat",
            vec![
                EchoTopic::plugin("billing", "pay"),
                EchoTopic::plugin("support", "cancel"),
                EchoTopic::plugin("chitchat", ""),
            ],
        )
        .unwrap();
        Engine::new(
            registry,
            RendererRegistry::with_builtins(),
            DurableCache::in_memory(Duration::from_secs(60)),
            Arc::new(PlanExtractor),
            Arc::new(TextLabels),
        )
    }

    fn stack(names: &[(&str, &str)]) -> TopicStack {
        let mut stack = TopicStack::new();
        for (id, name) in names {
            stack.push(TopicStatus::new(*id, *name), 8);
        }
        stack
    }

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_stack_always_new_topic() {
        let topics = build_engine().topics;
        let empty = TopicStack::new();
        assert_eq!(Continuity::decide(&empty, &labels(&["billing.pay"]), &topics), Continuity::NewTopic);
        assert_eq!(Continuity::decide(&empty, &[], &topics), Continuity::NewTopic);
    }

    #[test]
    fn test_label_overlap_continues() {
        let topics = build_engine().topics;
        let stack = stack(&[("t1", "billing.pay")]);
        match Continuity::decide(&stack, &labels(&["billing.pay.retry"]), &topics) {
            Continuity::Continue(status) => assert_eq!(status.id, "t1"),
            other => panic!("expected continue, got {other:?}"),
        }
        assert_eq!(
            Continuity::decide(&stack, &labels(&["support.cancel"]), &topics),
            Continuity::NewTopic
        );
    }

    #[test]
    fn test_only_top_of_stack_is_compared() {
        let topics = build_engine().topics;
        let stack = stack(&[("t1", "billing.pay"), ("t2", "support.cancel")]);
        assert_eq!(
            Continuity::decide(&stack, &labels(&["billing.pay"]), &topics),
            Continuity::NewTopic
        );
    }

    fn nested_engine() -> Engine {
        let registry = TopicRegistry::new(
            "billing",
            vec![EchoTopic::plugin("billing", ""), EchoTopic::plugin("billing", "pay")],
        )
        .unwrap();
        Engine::new(
            registry,
            RendererRegistry::with_builtins(),
            DurableCache::in_memory(Duration::from_secs(60)),
            Arc::new(NoopEntityExtractor),
            Arc::new(TextLabels),
        )
    }

    #[test]
    fn test_longer_registered_prefix_is_not_claimed() {
        let topics = nested_engine().topics;
        let stack = stack(&[("t1", "billing")]);
        assert_eq!(
            Continuity::decide(&stack, &labels(&["billing.pay"]), &topics),
            Continuity::NewTopic
        );
        assert!(matches!(
            Continuity::decide(&stack, &labels(&["billing.refund"]), &topics),
            Continuity::Continue(status) if status.id == "t1"
        ));
    }

    #[tokio::test]
    async fn test_more_specific_topic_takes_over() {
        let engine = nested_engine();
        let first = engine.turn(InboundMessage::new("u1", "billing.refund")).await.unwrap();
        assert_eq!(first.topics[0].name, "billing");

        let second = engine.turn(InboundMessage::new("u1", "billing.refund")).await.unwrap();
        assert!(!second.new_topic);
        assert_eq!(second.topics[0].id, first.topics[0].id);

        let third = engine.turn(InboundMessage::new("u1", "billing.pay")).await.unwrap();
        assert!(third.new_topic);
        assert_eq!(third.topics[0].name, "billing.pay");
        assert_ne!(third.topics[0].id, first.topics[0].id);
    }

    #[tokio::test]
    async fn test_first_turn_creates_topic_and_persists() {
        let engine = build_engine();
        let outcome = engine.turn(InboundMessage::new("u1", "billing.pay")).await.unwrap();

        assert!(outcome.new_topic);
        assert_eq!(outcome.topics.len(), 1);
        assert_eq!(outcome.topics[0].name, "billing.pay");
        assert_eq!(
            outcome.responses[0].output,
            json!({ "type": "text", "text": "billing.pay: billing.pay" })
        );

        let record = engine.load_record("u1").await.unwrap().unwrap();
        assert_eq!(record.topic_stack.len(), 1);
        assert_eq!(record.last_message.unwrap().text, "billing.pay");
    }

    #[tokio::test]
    async fn test_continuation_keeps_id_and_stack_size() {
        let engine = build_engine();
        let first = engine.turn(InboundMessage::new("u1", "billing.pay")).await.unwrap();
        let second = engine
            .turn(InboundMessage::new("u1", "billing.pay.query"))
            .await
            .unwrap();

        assert!(!second.new_topic);
        assert_eq!(second.topics[0].id, first.topics[0].id);
        assert_eq!(second.record.topic_stack.len(), 1);
    }

    #[tokio::test]
    async fn test_topic_change_grounds_context() {
        let engine = build_engine();
        engine
            .turn(InboundMessage::new("u1", "billing.pay gold"))
            .await
            .unwrap();
        let outcome = engine
            .turn(InboundMessage::new("u1", "support.cancel"))
            .await
            .unwrap();

        assert!(outcome.new_topic);
        assert_eq!(outcome.record.grounding.get("plan"), Some(&json!("gold")));
        assert!(outcome.record.context.get("plan").is_none());
        assert_eq!(outcome.record.context.get("user"), Some(&json!("u1")));
        assert_eq!(outcome.record.topic_stack.len(), 2);
    }

    #[tokio::test]
    async fn test_entities_fold_after_decision() {
        let engine = build_engine();
        engine.turn(InboundMessage::new("u1", "billing.pay")).await.unwrap();
        let outcome = engine
            .turn(InboundMessage::new("u1", "support.cancel gold"))
            .await
            .unwrap();

        // Context was reset before this turn's entities were folded in.
        assert_eq!(outcome.record.context.get("plan"), Some(&json!("gold")));
        assert!(outcome.record.grounding.get("plan").is_none());
    }

    #[tokio::test]
    async fn test_unmatched_labels_use_default_topic() {
        let engine = build_engine();
        let outcome = engine.turn(InboundMessage::new("u1", "hello")).await.unwrap();
        assert_eq!(outcome.topics[0].name, "chitchat");
    }

    #[tokio::test]
    async fn test_multi_topic_gate() {
        let engine = build_engine();
        let outcome = engine
            .turn(InboundMessage::new("u1", "support.cancel billing.pay"))
            .await
            .unwrap();
        assert_eq!(outcome.topics.len(), 1);
        assert_eq!(outcome.topics[0].name, "support.cancel");

        let engine = build_engine().with_settings(TurnSettings {
            multi_topic: true,
            ..TurnSettings::default()
        });
        let outcome = engine
            .turn(InboundMessage::new("u2", "support.cancel billing.pay"))
            .await
            .unwrap();
        assert_eq!(outcome.topics.len(), 2);
        assert_eq!(outcome.record.topic_stack.len(), 2);
        assert_eq!(
            outcome.record.topic_stack.top().map(|s| s.name.as_str()),
            Some("billing.pay")
        );
    }

    #[tokio::test]
    async fn test_collaborator_failure_leaves_state_untouched() {
        let engine = build_engine();
        engine.turn(InboundMessage::new("u1", "billing.pay")).await.unwrap();
        let before = engine.load_record("u1").await.unwrap();

        let err = engine.turn(InboundMessage::new("u1", "boom")).await.unwrap_err();
        assert!(err.is_collaborator());

        let err = engine
            .turn(InboundMessage::new("u1", "billing.pay.fail"))
            .await
            .unwrap_err();
        assert!(err.is_collaborator());

        assert_eq!(engine.load_record("u1").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_missing_user_fails_before_anything() {
        let engine = build_engine();
        let err = engine.turn(InboundMessage::new("", "billing.pay")).await.unwrap_err();
        assert!(err.is_validation());
        assert!(!engine.cache().has("").await.unwrap());
    }

    #[tokio::test]
    async fn test_initiative_turn_bypasses_nlu() {
        let registry = TopicRegistry::new(
            "chitchat",
            vec![
                EchoTopic::plugin("chitchat", ""),
                EchoTopic::plugin("initiative", ""),
            ],
        )
        .unwrap();
        let engine = Engine::new(
            registry,
            RendererRegistry::with_builtins(),
            DurableCache::in_memory(Duration::from_secs(60)),
            Arc::new(NoopEntityExtractor),
            Arc::new(TextLabels),
        );

        engine.turn(InboundMessage::new("u1", "hello there")).await.unwrap();
        // "boom" would fail classification if it were consulted.
        let mut nudge = InboundMessage::new("u1", "boom").proactive();
        nudge.text = "boom".into();
        let outcome = engine.turn(nudge).await.unwrap();

        assert_eq!(outcome.topics[0].name, "initiative");
        assert_eq!(
            outcome.record.last_message.map(|m| m.text),
            Some("hello there".to_string())
        );
    }

    #[tokio::test]
    async fn test_unknown_protocol_fails_turn() {
        struct OddTopic {
            cases: std::collections::BTreeMap<String, crate::topic::CaseSpec>,
        }

        #[async_trait]
        impl Topic for OddTopic {
            fn id(&self) -> &str {
                "odd"
            }
            fn domain(&self) -> &str {
                "odd"
            }
            fn intent(&self) -> &str {
                ""
            }
            fn cases(&self) -> &std::collections::BTreeMap<String, crate::topic::CaseSpec> {
                &self.cases
            }
            async fn handle(
                &self,
                _case: &str,
                _handler: &str,
                _dialog: &Dialog,
            ) -> Result<Vec<crate::response::RawOutput>> {
                Ok(vec![crate::response::RawOutput::new(99, json!("?"))])
            }
        }

        let plugin = TopicPlugin::new("odd", "", |_| {
            let mut cases = std::collections::BTreeMap::new();
            cases.insert("odd".to_string(), crate::topic::CaseSpec::new("any"));
            Box::new(OddTopic { cases }) as Box<dyn Topic>
        });
        let engine = Engine::new(
            TopicRegistry::new("odd", vec![plugin]).unwrap(),
            RendererRegistry::with_builtins(),
            DurableCache::in_memory(Duration::from_secs(60)),
            Arc::new(NoopEntityExtractor),
            Arc::new(TextLabels),
        );

        let err = engine.turn(InboundMessage::new("u1", "hi")).await.unwrap_err();
        assert!(matches!(err.root(), Error::UnknownProtocol(99)));
        assert!(engine.load_record("u1").await.unwrap().is_none());
    }
}
