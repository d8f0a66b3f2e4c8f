use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{InstanceId, InstanceStatus, TemplateId};

/// Server-defined blueprint from which instances are created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: TemplateId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: InstanceId,
    pub template_id: TemplateId,
    pub status: InstanceStatus,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Instance {
    /// Copies every field of `updated` onto `self`.
    ///
    /// Keys present only on `self` are kept. The identifier and the owning
    /// template are never changed; polls of the template decide membership.
    pub fn merge_from(&mut self, updated: Instance) {
        self.status = updated.status;
        for (key, value) in updated.fields {
            self.fields.insert(key, value);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceRequest {
    pub template_id: TemplateId,
    pub parameters: BTreeMap<String, String>,
}
