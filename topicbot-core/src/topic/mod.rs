//! Topics: units of task-oriented dialogue.
//!
//! A topic is identified by `"<domain>.<intent>"` and declares a map of
//! cases (intent labels it can answer) to handlers. Topic instances live for
//! a single turn; what survives is the [`TopicStatus`] pushed onto the
//! session's [`TopicStack`].
//!
//! Variants come from [`TopicPlugin`]s held by the [`TopicRegistry`]:
//! compiled-in Rust types or JSON manifests discovered on disk.

pub mod manifest;
pub mod registry;
pub mod stack;

pub use manifest::{ManifestTopic, TopicManifest};
pub use registry::{TopicFactory, TopicPlugin, TopicRegistry};
pub use stack::TopicStack;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::dialog::Dialog;
use crate::response::RawOutput;
use topicbot_common::Result;

/// A slot a case needs before it can be handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub param: String,
    /// Human-readable meaning, used when asking for it.
    #[serde(default)]
    pub meaning: String,
}

impl ParamSpec {
    pub fn new(param: impl Into<String>, meaning: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            meaning: meaning.into(),
        }
    }
}

/// How a topic handles one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseSpec {
    #[serde(default)]
    pub desc: String,
    /// Handler name passed to [`Topic::handle`].
    pub handler: String,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

impl CaseSpec {
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            desc: String::new(),
            handler: handler.into(),
            params: Vec::new(),
        }
    }

    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    pub fn with_param(mut self, param: impl Into<String>, meaning: impl Into<String>) -> Self {
        self.params.push(ParamSpec::new(param, meaning));
        self
    }
}

/// What survives of a topic instance after its turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicStatus {
    pub id: String,
    pub name: String,
    /// Cases handled on the topic's last turn.
    #[serde(default)]
    pub cases: Vec<String>,
}

impl TopicStatus {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            cases: Vec::new(),
        }
    }

    /// Whether an intent label belongs to this topic.
    ///
    /// `best_match` is the registry's pick for the label. The label is
    /// claimed when that pick is this topic or when the label names one of
    /// the cases handled last turn.
    pub fn claims(&self, label: &str, best_match: Option<&str>) -> bool {
        best_match == Some(self.name.as_str()) || self.cases.iter().any(|c| c == label)
    }
}

/// Result of [`Topic::respond`].
#[derive(Debug, Clone, Default)]
pub struct TopicReply {
    pub outputs: Vec<RawOutput>,
    /// Cases that produced the outputs.
    pub cases: Vec<String>,
}

/// Compose a topic name from its static declaration.
pub fn topic_name(domain: &str, intent: &str) -> String {
    if intent.is_empty() {
        domain.to_string()
    } else {
        format!("{domain}.{intent}")
    }
}

/// Base contract for topic variants.
#[async_trait]
pub trait Topic: Send + Sync {
    /// Instance id: fresh for a new topic, restored for a continued one.
    fn id(&self) -> &str;

    fn domain(&self) -> &str;

    fn intent(&self) -> &str;

    /// `"<domain>.<intent>"`, fixed for the lifetime of the instance.
    fn name(&self) -> String {
        topic_name(self.domain(), self.intent())
    }

    /// Case label to handler map.
    fn cases(&self) -> &BTreeMap<String, CaseSpec>;

    /// Case to handle when none of this turn's labels names a case directly.
    ///
    /// Defaults to the first of the cases handled last turn that still
    /// exists, then to the case named like the topic itself.
    fn continuation_case(&self, prior_cases: &[String], _dialog: &Dialog) -> Option<String> {
        prior_cases
            .iter()
            .find(|c| self.cases().contains_key(c.as_str()))
            .cloned()
            .or_else(|| {
                let name = self.name();
                self.cases().contains_key(&name).then_some(name)
            })
    }

    /// Params of `case` that the dialog cannot resolve.
    fn missing_params(&self, case: &str, dialog: &Dialog) -> Vec<ParamSpec> {
        self.cases()
            .get(case)
            .map(|spec| {
                spec.params
                    .iter()
                    .filter(|p| !dialog.has(&p.param))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Reply asking the user for missing params.
    fn param_missing_output(&self, _case: &str, missing: &[ParamSpec]) -> Vec<RawOutput> {
        let wanted: Vec<&str> = missing
            .iter()
            .map(|p| {
                if p.meaning.is_empty() {
                    p.param.as_str()
                } else {
                    p.meaning.as_str()
                }
            })
            .collect();
        vec![RawOutput::text(format!("Could you tell me {}?", wanted.join(", ")))
            .with_raw_data(serde_json::json!({
                "missing": missing.iter().map(|p| p.param.clone()).collect::<Vec<_>>()
            }))]
    }

    /// Run the named handler for `case`.
    async fn handle(&self, case: &str, handler: &str, dialog: &Dialog) -> Result<Vec<RawOutput>>;

    /// Answer the turn.
    ///
    /// Selects the cases named by the dialog's labels (or the continuation
    /// case), then checks params: if any selected case lacks a param, only
    /// the missing-param reply is returned and no handler runs.
    async fn respond(&self, dialog: &Dialog, prior_cases: &[String]) -> Result<TopicReply> {
        let mut selected: Vec<String> = Vec::new();
        for label in &dialog.intent_labels {
            if self.cases().contains_key(label) && !selected.contains(label) {
                selected.push(label.clone());
            }
        }
        if selected.is_empty() {
            if let Some(case) = self.continuation_case(prior_cases, dialog) {
                selected.push(case);
            }
        }
        if selected.is_empty() {
            tracing::warn!(topic = %self.name(), labels = ?dialog.intent_labels, "No case to handle");
            return Ok(TopicReply::default());
        }

        for case in &selected {
            let missing = self.missing_params(case, dialog);
            if !missing.is_empty() {
                tracing::debug!(
                    topic = %self.name(),
                    case = %case,
                    missing = missing.len(),
                    "Params missing, asking user"
                );
                return Ok(TopicReply {
                    outputs: self.param_missing_output(case, &missing),
                    cases: vec![case.clone()],
                });
            }
        }

        let mut outputs = Vec::new();
        for case in &selected {
            let Some(spec) = self.cases().get(case) else {
                continue;
            };
            outputs.extend(self.handle(case, &spec.handler, dialog).await?);
        }
        Ok(TopicReply {
            outputs,
            cases: selected,
        })
    }

    /// Snapshot pushed onto the topic stack.
    fn status(&self, cases: Vec<String>) -> TopicStatus {
        TopicStatus {
            id: self.id().to_string(),
            name: self.name(),
            cases,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Compiled topic used across unit tests.

    use super::*;
    use topicbot_common::Error;

    pub struct EchoTopic {
        id: String,
        domain: String,
        intent: String,
        cases: BTreeMap<String, CaseSpec>,
    }

    impl EchoTopic {
        pub fn new(id: String, domain: &str, intent: &str) -> Self {
            let name = topic_name(domain, intent);
            let mut cases = BTreeMap::new();
            cases.insert(name.clone(), CaseSpec::new("echo"));
            cases.insert(
                format!("{name}.amount"),
                CaseSpec::new("amount").with_param("amount", "how much"),
            );
            cases.insert(format!("{name}.fail"), CaseSpec::new("fail"));
            Self {
                id,
                domain: domain.into(),
                intent: intent.into(),
                cases,
            }
        }

        pub fn plugin(domain: &'static str, intent: &'static str) -> TopicPlugin {
            TopicPlugin::new(domain, intent, move |id| {
                Box::new(EchoTopic::new(id, domain, intent)) as Box<dyn Topic>
            })
        }
    }

    #[async_trait]
    impl Topic for EchoTopic {
        fn id(&self) -> &str {
            &self.id
        }

        fn domain(&self) -> &str {
            &self.domain
        }

        fn intent(&self) -> &str {
            &self.intent
        }

        fn cases(&self) -> &BTreeMap<String, CaseSpec> {
            &self.cases
        }

        async fn handle(&self, case: &str, handler: &str, dialog: &Dialog) -> Result<Vec<RawOutput>> {
            match handler {
                "echo" => Ok(vec![RawOutput::text(format!("{}: {}", case, dialog.text()))]),
                "amount" => {
                    let amount = dialog.get("amount").unwrap_or_default();
                    Ok(vec![RawOutput::text(format!("paying {}", amount))])
                }
                _ => Err(Error::Collaborator(format!("handler {handler} failed"))),
            }
        }
    }
}
