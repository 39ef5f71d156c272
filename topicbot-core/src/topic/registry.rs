//! Topic registry.
//!
//! Maps topic names to factories. Built once at startup from compiled-in
//! plugins and from manifests found under `topics.topic_plugin_path`, then
//! shared read-only by every session.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::manifest::TopicManifest;
use super::{topic_name, Topic, TopicStatus};
use crate::plugin::scan_manifests;
use topicbot_common::config::TopicsConfig;
use topicbot_common::{Error, Result};

/// Builds a topic instance for a given instance id.
pub type TopicFactory = Arc<dyn Fn(String) -> Box<dyn Topic> + Send + Sync>;

/// A registrable topic variant.
#[derive(Clone)]
pub struct TopicPlugin {
    domain: String,
    intent: String,
    factory: TopicFactory,
}

impl TopicPlugin {
    pub fn new<F>(domain: impl Into<String>, intent: impl Into<String>, factory: F) -> Self
    where
        F: Fn(String) -> Box<dyn Topic> + Send + Sync + 'static,
    {
        Self {
            domain: domain.into(),
            intent: intent.into(),
            factory: Arc::new(factory),
        }
    }

    pub fn name(&self) -> String {
        topic_name(&self.domain, &self.intent)
    }

    /// Instantiate with the given id.
    pub fn create(&self, id: String) -> Box<dyn Topic> {
        (self.factory)(id)
    }
}

impl fmt::Debug for TopicPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicPlugin")
            .field("domain", &self.domain)
            .field("intent", &self.intent)
            .finish_non_exhaustive()
    }
}

fn new_topic_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Registered topic variants plus the configured default topic.
#[derive(Debug, Clone)]
pub struct TopicRegistry {
    plugins: BTreeMap<String, TopicPlugin>,
    default_topic: String,
}

impl TopicRegistry {
    /// Build a registry. Fails if the default topic is not among the plugins.
    pub fn new(default_topic: impl Into<String>, plugins: Vec<TopicPlugin>) -> Result<Self> {
        let mut registry = Self {
            plugins: BTreeMap::new(),
            default_topic: default_topic.into(),
        };
        for plugin in plugins {
            registry.register(plugin);
        }
        registry.check_default()?;
        Ok(registry)
    }

    /// Build from configuration: compiled plugins first, then manifests.
    ///
    /// A manifest never replaces a compiled plugin of the same name.
    pub fn from_config(config: &TopicsConfig, compiled: Vec<TopicPlugin>) -> Result<Self> {
        let default_topic = config
            .default_topic
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::Config("topics.default_topic is not configured".into()))?;

        let mut plugins = compiled;
        if let Some(path) = &config.topic_plugin_path {
            let known: Vec<String> = plugins.iter().map(TopicPlugin::name).collect();
            for plugin in discover_manifests(path)? {
                if known.contains(&plugin.name()) {
                    tracing::warn!(topic = %plugin.name(), "Manifest shadowed by compiled topic");
                    continue;
                }
                plugins.push(plugin);
            }
        }

        let registry = Self::new(default_topic, plugins)?;
        tracing::info!(
            topics = registry.plugins.len(),
            default_topic = %registry.default_topic,
            "Topic registry ready"
        );
        Ok(registry)
    }

    /// Register a plugin, replacing any previous one of the same name.
    pub fn register(&mut self, plugin: TopicPlugin) {
        let name = plugin.name();
        if self.plugins.insert(name.clone(), plugin).is_some() {
            tracing::warn!(topic = %name, "Topic plugin replaced");
        }
    }

    fn check_default(&self) -> Result<()> {
        if self.plugins.contains_key(&self.default_topic) {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "default topic {} is not registered",
                self.default_topic
            )))
        }
    }

    pub fn default_topic(&self) -> &str {
        &self.default_topic
    }

    pub fn has_topic(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Longest registered name that is a string prefix of `label`.
    pub fn best_match(&self, label: &str) -> Option<&str> {
        self.plugins
            .keys()
            .filter(|name| label.starts_with(name.as_str()))
            .max_by_key(|name| name.len())
            .map(String::as_str)
    }

    /// One topic per distinct matched name, in label order.
    ///
    /// A topic whose name equals `previous.name` is reconstructed with the
    /// previous id; every other one gets a fresh id. When no label matches,
    /// a single default topic is returned.
    pub fn resolve_by_intent_labels(
        &self,
        labels: &[String],
        previous: Option<&TopicStatus>,
    ) -> Vec<Box<dyn Topic>> {
        let mut names: Vec<&str> = Vec::new();
        for label in labels {
            match self.best_match(label) {
                Some(name) if !names.contains(&name) => names.push(name),
                Some(_) => {}
                None => tracing::debug!(label = %label, "No topic matches intent label"),
            }
        }
        if names.is_empty() {
            names.push(&self.default_topic);
        }

        names
            .into_iter()
            .filter_map(|name| {
                let plugin = self.plugins.get(name)?;
                let id = match previous {
                    Some(status) if status.name == name => status.id.clone(),
                    _ => new_topic_id(),
                };
                Some(plugin.create(id))
            })
            .collect()
    }

    /// Reconstruct the topic a status was taken from, if it is still registered.
    pub fn restore(&self, status: &TopicStatus) -> Option<Box<dyn Topic>> {
        self.plugins
            .get(&status.name)
            .map(|plugin| plugin.create(status.id.clone()))
    }
}

/// Load every topic manifest under `root`. Broken files are logged and skipped.
pub fn discover_manifests(root: &Path) -> Result<Vec<TopicPlugin>> {
    let mut plugins = Vec::new();
    for result in scan_manifests(root)? {
        let loaded = result.and_then(|path| {
            let origin = path.display().to_string();
            TopicManifest::from_file(&path)?.into_plugin(&origin)
        });
        match loaded {
            Ok(plugin) => {
                tracing::debug!(topic = %plugin.name(), "Loaded topic manifest");
                plugins.push(plugin);
            }
            Err(e) => tracing::warn!(error = %e, "Skipping topic manifest"),
        }
    }
    Ok(plugins)
}
