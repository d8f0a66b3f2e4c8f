//! Collection of parameter values before an instance is created.

use std::collections::BTreeMap;

use async_trait::async_trait;
use shared::protocol::Template;

/// Asks the user for the values of a template's parameters.
///
/// `Ok(None)` means the user dismissed the prompt and nothing should be
/// submitted.
#[async_trait]
pub trait ParameterPrompt: Send + Sync {
    async fn collect(&self, template: &Template) -> anyhow::Result<Option<BTreeMap<String, String>>>;
}

/// Answers every prompt with the same values.
#[derive(Debug, Clone, Default)]
pub struct PresetParameters {
    values: BTreeMap<String, String>,
}

impl PresetParameters {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }
}

#[async_trait]
impl ParameterPrompt for PresetParameters {
    async fn collect(&self, _template: &Template) -> anyhow::Result<Option<BTreeMap<String, String>>> {
        Ok(Some(self.values.clone()))
    }
}

/// A prompt the user always dismisses.
pub struct DismissedPrompt;

#[async_trait]
impl ParameterPrompt for DismissedPrompt {
    async fn collect(&self, _template: &Template) -> anyhow::Result<Option<BTreeMap<String, String>>> {
        Ok(None)
    }
}
