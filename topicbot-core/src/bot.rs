//! Session store and proactive scheduler.
//!
//! The [`Bot`] tracks active sessions and buckets outgoing responses by the
//! instant they become due. Both tables sit behind one coarse mutex.
//! Silence checks and draining are driven by the caller, usually on a timer.
//!
//! # Eviction
//!
//! After every turn, if more than `max_clients` sessions are tracked, only
//! the `max_clients` most recently active ones are kept. Evicted sessions
//! lose nothing durable: their state stays in the cache.

use chrono::{DateTime, Utc};
use rand_distr::{Distribution, Normal};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::message::InboundMessage;
use crate::response::Response;
use crate::session::{Engine, TurnOutcome};
use topicbot_common::config::SessionConfig;
use topicbot_common::{Error, Result};

#[derive(Debug, Clone, Copy)]
struct ActiveSession {
    last_activity: DateTime<Utc>,
    /// Set by a silence check, cleared by the next real user turn.
    nudged: bool,
}

#[derive(Default)]
struct BotState {
    active: HashMap<String, ActiveSession>,
    due: BTreeMap<DateTime<Utc>, Vec<Response>>,
}

impl BotState {
    fn evict(&mut self, max_clients: usize) -> usize {
        if self.active.len() <= max_clients {
            return 0;
        }

        let mut ranked: Vec<(String, DateTime<Utc>)> = self
            .active
            .iter()
            .map(|(id, s)| (id.clone(), s.last_activity))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let evicted = ranked.len() - max_clients;
        for (id, _) in ranked.into_iter().skip(max_clients) {
            self.active.remove(&id);
        }
        evicted
    }
}

/// Bounded table of active sessions plus the outbound response queue.
pub struct Bot {
    engine: Arc<Engine>,
    state: Mutex<BotState>,
    max_clients: usize,
    silence_threshold_secs: f64,
    silence_jitter: Option<Normal<f64>>,
}

impl Bot {
    pub fn new(engine: Arc<Engine>, config: &SessionConfig) -> Result<Self> {
        if config.max_clients == 0 {
            return Err(Error::Config("session.max_clients must be greater than 0".into()));
        }

        let std_dev = config.silence_threshold_variance.max(0.0).sqrt();
        let silence_jitter = if std_dev > 0.0 {
            Some(
                Normal::new(0.0, std_dev)
                    .map_err(|e| Error::Config(format!("session.silence_threshold_variance: {e}")))?,
            )
        } else {
            None
        };

        Ok(Self {
            engine,
            state: Mutex::new(BotState::default()),
            max_clients: config.max_clients,
            silence_threshold_secs: config.silence_threshold_secs,
            silence_jitter,
        })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Run a turn for `message` at the current time.
    pub async fn respond(&self, message: InboundMessage) -> Result<TurnOutcome> {
        self.respond_at(message, Utc::now()).await
    }

    /// Run a turn for `message` as of `now`.
    ///
    /// Responses are queued under `now + delay`; the session's activity is
    /// recorded and the table trimmed to capacity. A failed turn changes
    /// nothing here.
    pub async fn respond_at(&self, message: InboundMessage, now: DateTime<Utc>) -> Result<TurnOutcome> {
        message.validate()?;
        let initiative = message.initiative;

        let outcome = self.engine.turn_at(message, now).await?;

        let mut state = self.state.lock().await;
        for response in &outcome.responses {
            let delay = chrono::Duration::milliseconds(response.delay_ms as i64);
            let due_at = now.checked_add_signed(delay).unwrap_or(now);
            state.due.entry(due_at).or_default().push(response.clone());
        }

        let nudged = initiative
            && state
                .active
                .get(&outcome.session_id)
                .map(|s| s.nudged)
                .unwrap_or(false);
        state.active.insert(
            outcome.session_id.clone(),
            ActiveSession {
                last_activity: now,
                nudged,
            },
        );

        let evicted = state.evict(self.max_clients);
        if evicted > 0 {
            tracing::debug!(evicted, active = state.active.len(), "Evicted idle sessions");
        }

        Ok(outcome)
    }

    /// Flag sessions silent for longer than the threshold, as of now.
    pub async fn check_silent_sessions(&self) -> Vec<String> {
        self.check_silent_sessions_at(Utc::now()).await
    }

    /// Flag sessions silent for longer than `threshold - jitter` as of `now`.
    ///
    /// Jitter is drawn per session per check. Flagged sessions get their
    /// activity refreshed and are not flagged again until a real user turn.
    pub async fn check_silent_sessions_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut state = self.state.lock().await;
        // Created after the last await so the future stays Send.
        let mut rng = rand::thread_rng();

        let mut silent = Vec::new();
        for (id, session) in state.active.iter_mut() {
            if session.nudged {
                continue;
            }
            let jitter = self
                .silence_jitter
                .map(|n| n.sample(&mut rng))
                .unwrap_or(0.0);
            let idle = (now - session.last_activity).num_milliseconds() as f64 / 1000.0;
            if idle > self.silence_threshold_secs - jitter {
                session.last_activity = now;
                session.nudged = true;
                silent.push(id.clone());
            }
        }
        silent.sort();

        if !silent.is_empty() {
            tracing::info!(count = silent.len(), "Silent sessions detected");
        }
        silent
    }

    /// Run a proactive turn for `session_id` at the current time.
    pub async fn trigger_proactive(&self, session_id: &str) -> Result<Option<TurnOutcome>> {
        self.trigger_proactive_at(session_id, Utc::now()).await
    }

    /// Synthesize an initiative message from the session's last cached
    /// message and run it through [`Bot::respond_at`].
    ///
    /// Returns `Ok(None)` when nothing is cached for the session.
    pub async fn trigger_proactive_at(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<TurnOutcome>> {
        let last = self
            .engine
            .load_record(session_id)
            .await?
            .and_then(|record| record.last_message);

        match last {
            Some(message) => {
                tracing::info!(session_id = %session_id, "Triggering proactive turn");
                self.respond_at(message.proactive(), now).await.map(Some)
            }
            None => {
                tracing::debug!(session_id = %session_id, "No cached message, skipping proactive turn");
                Ok(None)
            }
        }
    }

    /// Check for silence and trigger a proactive turn for each silent session.
    ///
    /// Per-session failures are logged and skipped. Returns how many
    /// proactive turns ran.
    pub async fn run_silence_check_at(&self, now: DateTime<Utc>) -> usize {
        let mut triggered = 0;
        for id in self.check_silent_sessions_at(now).await {
            match self.trigger_proactive_at(&id, now).await {
                Ok(Some(_)) => triggered += 1,
                Ok(None) => {}
                Err(e) => tracing::warn!(session_id = %id, error = %e, "Proactive turn failed"),
            }
        }
        triggered
    }

    /// Pop every response due at or before now.
    pub async fn drain_due(&self) -> Vec<Response> {
        self.drain_due_at(Utc::now()).await
    }

    /// Pop every response due at or before `now`, oldest first.
    pub async fn drain_due_at(&self, now: DateTime<Utc>) -> Vec<Response> {
        let mut state = self.state.lock().await;
        let mut ready = Vec::new();
        while let Some(entry) = state.due.first_entry() {
            if *entry.key() > now {
                break;
            }
            ready.extend(entry.remove());
        }
        ready
    }

    /// Active session ids, most recently active first.
    pub async fn active_sessions(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut ranked: Vec<(&String, &ActiveSession)> = state.active.iter().collect();
        ranked.sort_by(|a, b| b.1.last_activity.cmp(&a.1.last_activity).then_with(|| a.0.cmp(b.0)));
        ranked.into_iter().map(|(id, _)| id.clone()).collect()
    }

    pub async fn is_active(&self, session_id: &str) -> bool {
        self.state.lock().await.active.contains_key(session_id)
    }

    /// Number of queued responses.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.due.values().map(Vec::len).sum()
    }
}
