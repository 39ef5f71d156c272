//! Topics declared in JSON manifests.
//!
//! ```json
//! {
//!   "domain": "billing",
//!   "intent": "pay",
//!   "cases": {
//!     "billing.pay": {
//!       "desc": "pay the current bill",
//!       "params": [{ "param": "amount", "meaning": "the amount to pay" }],
//!       "replies": ["Paying {{slots.amount}} for {{user}}."]
//!     }
//!   }
//! }
//! ```
//!
//! Replies are handlebars templates rendered against
//! [`Dialog::template_data`](crate::dialog::Dialog::template_data).

use async_trait::async_trait;
use handlebars::Handlebars;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::{topic_name, CaseSpec, ParamSpec, Topic, TopicPlugin};
use crate::dialog::Dialog;
use crate::response::RawOutput;
use topicbot_common::{Error, Result};

/// One case of a manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestCase {
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    pub replies: Vec<String>,
    #[serde(default)]
    pub protocol: i32,
    #[serde(default)]
    pub no_delay: bool,
}

/// Parsed manifest file.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicManifest {
    pub domain: String,
    #[serde(default)]
    pub intent: String,
    pub cases: BTreeMap<String, ManifestCase>,
}

impl TopicManifest {
    pub fn from_file(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let raw = fs::read_to_string(path).map_err(|e| Error::plugin_load(&display, e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| Error::plugin_load(&display, e.to_string()))
    }

    pub fn name(&self) -> String {
        topic_name(&self.domain, &self.intent)
    }

    /// Compile the manifest into a registrable plugin.
    pub fn into_plugin(self, origin: &str) -> Result<TopicPlugin> {
        if self.domain.trim().is_empty() {
            return Err(Error::plugin_load(origin, "`domain` must not be empty"));
        }
        if self.cases.is_empty() {
            return Err(Error::plugin_load(origin, "manifest declares no cases"));
        }

        let mut templates = Handlebars::new();
        templates.register_escape_fn(handlebars::no_escape);

        let mut cases = BTreeMap::new();
        for (label, case) in &self.cases {
            for (i, reply) in case.replies.iter().enumerate() {
                templates
                    .register_template_string(&template_key(label, i), reply)
                    .map_err(|e| Error::plugin_load(origin, format!("case {label}: {e}")))?;
            }
            cases.insert(
                label.clone(),
                CaseSpec {
                    desc: case.desc.clone(),
                    handler: label.clone(),
                    params: case.params.clone(),
                },
            );
        }

        let compiled = Arc::new(CompiledManifest {
            domain: self.domain.clone(),
            intent: self.intent.clone(),
            cases,
            manifest: self,
            templates,
        });
        let domain = compiled.domain.clone();
        let intent = compiled.intent.clone();

        Ok(TopicPlugin::new(domain, intent, move |id| {
            Box::new(ManifestTopic {
                id,
                compiled: Arc::clone(&compiled),
            }) as Box<dyn Topic>
        }))
    }
}

fn template_key(case: &str, index: usize) -> String {
    format!("{case}#{index}")
}

struct CompiledManifest {
    domain: String,
    intent: String,
    cases: BTreeMap<String, CaseSpec>,
    manifest: TopicManifest,
    templates: Handlebars<'static>,
}

/// Instance of a manifest topic.
pub struct ManifestTopic {
    id: String,
    compiled: Arc<CompiledManifest>,
}

#[async_trait]
impl Topic for ManifestTopic {
    fn id(&self) -> &str {
        &self.id
    }

    fn domain(&self) -> &str {
        &self.compiled.domain
    }

    fn intent(&self) -> &str {
        &self.compiled.intent
    }

    fn cases(&self) -> &BTreeMap<String, CaseSpec> {
        &self.compiled.cases
    }

    async fn handle(&self, case: &str, _handler: &str, dialog: &Dialog) -> Result<Vec<RawOutput>> {
        let spec = self
            .compiled
            .manifest
            .cases
            .get(case)
            .ok_or_else(|| Error::Internal(format!("{} has no case {case}", self.name())))?;

        let data = dialog.template_data();
        let mut outputs = Vec::with_capacity(spec.replies.len());
        for i in 0..spec.replies.len() {
            let text = self
                .compiled
                .templates
                .render(&template_key(case, i), &data)
                .map_err(|e| Error::Collaborator(format!("{} reply {i}: {e}", self.name())))?;
            let mut raw = RawOutput::new(spec.protocol, serde_json::Value::String(text));
            raw.no_delay = spec.no_delay;
            outputs.push(raw);
        }
        Ok(outputs)
    }
}
