//! Local view of templates and their instances.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use shared::{
    domain::{InstanceId, TemplateId},
    protocol::{Instance, Template},
};

/// Store epoch captured before an instance fetch is issued.
///
/// Acknowledged deletes bump the epoch; a fetch that started before the
/// backend acknowledged a delete cannot bring the deleted instance back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PollToken(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateView {
    pub template: Template,
    pub instances: Vec<Instance>,
    pub last_polled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tombstone {
    /// The backend has not answered the delete yet. Hides the instance from
    /// every fetch.
    Pending,
    /// Acknowledged at this epoch. Hides the instance from fetches that
    /// started earlier.
    Confirmed(u64),
}

struct TemplateEntry {
    template: Template,
    instances: BTreeMap<InstanceId, Instance>,
    tombstones: HashMap<InstanceId, Tombstone>,
    last_polled_at: Option<DateTime<Utc>>,
}

impl TemplateEntry {
    fn new(template: Template) -> Self {
        Self {
            template,
            instances: BTreeMap::new(),
            tombstones: HashMap::new(),
            last_polled_at: None,
        }
    }
}

#[derive(Default)]
pub struct TemplateStore {
    entries: BTreeMap<TemplateId, TemplateEntry>,
    epoch: u64,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a template with an empty instance mapping.
    ///
    /// An already-known template gets its metadata refreshed and keeps its
    /// instances. Returns `true` when the template was not known before.
    pub fn upsert_template(&mut self, template: Template) -> bool {
        match self.entries.get_mut(&template.id) {
            Some(entry) => {
                entry.template = template;
                false
            }
            None => {
                self.entries
                    .insert(template.id.clone(), TemplateEntry::new(template));
                true
            }
        }
    }

    pub fn remove_template(&mut self, template_id: &TemplateId) -> Option<Template> {
        self.entries
            .remove(template_id)
            .map(|entry| entry.template)
    }

    pub fn contains_template(&self, template_id: &TemplateId) -> bool {
        self.entries.contains_key(template_id)
    }

    pub fn template(&self, template_id: &TemplateId) -> Option<&Template> {
        self.entries.get(template_id).map(|entry| &entry.template)
    }

    pub fn template_ids(&self) -> Vec<TemplateId> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn instances(&self, template_id: &TemplateId) -> Option<&BTreeMap<InstanceId, Instance>> {
        self.entries.get(template_id).map(|entry| &entry.instances)
    }

    pub fn instance(&self, instance_id: &InstanceId) -> Option<&Instance> {
        self.entries
            .values()
            .find_map(|entry| entry.instances.get(instance_id))
    }

    pub fn poll_token(&self) -> PollToken {
        PollToken(self.epoch)
    }

    /// Replaces the whole instance mapping of a template with a fetch result.
    ///
    /// Instances with a pending delete, or a delete acknowledged after `token`
    /// was taken, are dropped from `fetched`. Tombstones acknowledged at or
    /// before `token` are retired. Returns the new instance count, or `None`
    /// if the template is no longer in the store.
    pub fn replace_instances(
        &mut self,
        template_id: &TemplateId,
        token: PollToken,
        fetched: Vec<Instance>,
        polled_at: DateTime<Utc>,
    ) -> Option<usize> {
        let entry = self.entries.get_mut(template_id)?;
        entry.tombstones.retain(|_, tombstone| match tombstone {
            Tombstone::Pending => true,
            Tombstone::Confirmed(at) => *at > token.0,
        });

        entry.instances = fetched
            .into_iter()
            .filter(|instance| !entry.tombstones.contains_key(&instance.id))
            .map(|instance| (instance.id.clone(), instance))
            .collect();
        entry.last_polled_at = Some(polled_at);
        Some(entry.instances.len())
    }

    /// Removes an instance from its template's mapping and marks its delete
    /// as pending.
    ///
    /// The tombstone is recorded even when the instance is not currently
    /// mapped, so an in-flight fetch cannot add it back. Follow up with
    /// [`confirm_delete`](Self::confirm_delete) or
    /// [`abandon_delete`](Self::abandon_delete) once the backend answers.
    pub fn remove_instance(
        &mut self,
        template_id: &TemplateId,
        instance_id: &InstanceId,
    ) -> Option<Instance> {
        let entry = self.entries.get_mut(template_id)?;
        entry
            .tombstones
            .insert(instance_id.clone(), Tombstone::Pending);
        entry.instances.remove(instance_id)
    }

    /// Records that the backend acknowledged the delete.
    ///
    /// Only fetches that start after this call may report the instance again.
    pub fn confirm_delete(&mut self, template_id: &TemplateId, instance_id: &InstanceId) {
        let Some(entry) = self.entries.get_mut(template_id) else {
            return;
        };
        self.epoch += 1;
        entry
            .tombstones
            .insert(instance_id.clone(), Tombstone::Confirmed(self.epoch));
    }

    /// Drops a pending tombstone after the backend rejected the delete.
    ///
    /// The local removal stands; the next fetch decides whether the instance
    /// is still there.
    pub fn abandon_delete(&mut self, template_id: &TemplateId, instance_id: &InstanceId) {
        if let Some(entry) = self.entries.get_mut(template_id) {
            if entry.tombstones.get(instance_id) == Some(&Tombstone::Pending) {
                entry.tombstones.remove(instance_id);
            }
        }
    }

    /// Merges `updated` into the stored instance with the same id.
    ///
    /// Returns the merged instance, or `None` when no such instance is mapped.
    pub fn merge_instance(&mut self, updated: Instance) -> Option<&Instance> {
        let stored = self
            .entries
            .values_mut()
            .find_map(|entry| entry.instances.get_mut(&updated.id))?;
        stored.merge_from(updated);
        Some(&*stored)
    }

    pub fn snapshot(&self) -> Vec<TemplateView> {
        self.entries
            .values()
            .map(|entry| TemplateView {
                template: entry.template.clone(),
                instances: entry.instances.values().cloned().collect(),
                last_polled_at: entry.last_polled_at,
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
