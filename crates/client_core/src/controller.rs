use std::{
    collections::HashMap,
    ops::ControlFlow,
    sync::Arc,
    time::Duration,
};

use futures::future::join_all;
use shared::{
    domain::{InstanceId, InstanceStatus, TemplateId},
    protocol::{CreateInstanceRequest, Instance, Template},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::{
    api::TemplateApi,
    clock::{Clock, TokioClock},
    error::ClientError,
    events::ControllerEvent,
    poller::PollHandle,
    prompt::ParameterPrompt,
    store::{TemplateStore, TemplateView},
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
const DEFAULT_TEMPLATE_LOAD_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Pause between the end of one instance poll and the start of the next.
    pub poll_interval: Duration,
    /// Total attempts at fetching templates. `1` never retries.
    pub template_load_attempts: u32,
    pub template_load_retry_delay: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            template_load_attempts: 1,
            template_load_retry_delay: DEFAULT_TEMPLATE_LOAD_RETRY_DELAY,
        }
    }
}

/// Keeps a local view of templates and instances in sync with the backend.
///
/// Every loaded template gets its own poller, registered by template id.
/// Pollers only hold a weak reference back to the controller, so dropping
/// the last `Arc<Controller>` ends them.
pub struct Controller {
    api: Arc<dyn TemplateApi>,
    clock: Arc<dyn Clock>,
    options: ControllerOptions,
    store: Mutex<TemplateStore>,
    pollers: Mutex<HashMap<TemplateId, PollHandle>>,
    events: broadcast::Sender<ControllerEvent>,
}

impl Controller {
    pub fn new(api: Arc<dyn TemplateApi>, options: ControllerOptions) -> Arc<Self> {
        Self::new_with_clock(api, Arc::new(TokioClock), options)
    }

    pub fn new_with_clock(
        api: Arc<dyn TemplateApi>,
        clock: Arc<dyn Clock>,
        options: ControllerOptions,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            api,
            clock,
            options,
            store: Mutex::new(TemplateStore::new()),
            pollers: Mutex::new(HashMap::new()),
            events,
        })
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }

    /// Loads templates and starts a poller for each of them.
    ///
    /// A failed load leaves the store empty and starts nothing; the failure
    /// is only logged and published as an event.
    pub async fn start(self: &Arc<Self>) -> usize {
        let count = match self.load_templates().await {
            Ok(count) => count,
            Err(err) => {
                warn!(error = %err, "continuing without templates");
                return 0;
            }
        };

        for template_id in self.template_ids().await {
            if let Err(err) = self.start_polling(&template_id).await {
                warn!(template_id = %template_id, error = %err, "could not start poller");
            }
        }
        count
    }

    pub async fn load_templates(&self) -> Result<usize, ClientError> {
        let attempts = self.options.template_load_attempts.max(1);
        let mut attempt = 1;
        let templates = loop {
            match self.api.list_templates().await {
                Ok(templates) => break templates,
                Err(err) if attempt < attempts => {
                    warn!(attempt, attempts, error = %err, "template load failed; retrying");
                    attempt += 1;
                    self.clock
                        .sleep(self.options.template_load_retry_delay)
                        .await;
                }
                Err(err) => {
                    warn!(attempts, error = %err, "template load failed");
                    self.emit(ControllerEvent::Error(format!(
                        "failed to load templates: {err}"
                    )));
                    return Err(err);
                }
            }
        };

        let count = templates.len();
        {
            let mut store = self.store.lock().await;
            for template in templates {
                store.upsert_template(template);
            }
        }
        info!(count, "loaded templates");
        self.emit(ControllerEvent::TemplatesLoaded { count });
        Ok(count)
    }

    /// Registers a poller for a stored template.
    ///
    /// Returns `false` when one is already running for it.
    pub async fn start_polling(
        self: &Arc<Self>,
        template_id: &TemplateId,
    ) -> Result<bool, ClientError> {
        if !self.store.lock().await.contains_template(template_id) {
            return Err(ClientError::UnknownTemplate(template_id.clone()));
        }

        let mut pollers = self.pollers.lock().await;
        if pollers
            .get(template_id)
            .is_some_and(|handle| !handle.is_finished())
        {
            return Ok(false);
        }

        let controller = Arc::downgrade(self);
        let poll_id = template_id.clone();
        let handle = PollHandle::spawn(
            Arc::clone(&self.clock),
            self.options.poll_interval,
            move || {
                let controller = controller.clone();
                let template_id = poll_id.clone();
                async move {
                    let Some(controller) = controller.upgrade() else {
                        return ControlFlow::Break(());
                    };
                    controller.poll_tick(&template_id).await
                }
            },
        );
        pollers.insert(template_id.clone(), handle);
        debug!(template_id = %template_id, "started instance poller");
        Ok(true)
    }

    async fn poll_tick(&self, template_id: &TemplateId) -> ControlFlow<()> {
        match self.poll_once(template_id).await {
            Ok(_) => ControlFlow::Continue(()),
            Err(ClientError::UnknownTemplate(_)) => {
                debug!(template_id = %template_id, "template gone; poller exiting");
                self.emit(ControllerEvent::PollerStopped {
                    template_id: template_id.clone(),
                });
                ControlFlow::Break(())
            }
            Err(err) => {
                warn!(template_id = %template_id, error = %err, "instance poll failed");
                self.emit(ControllerEvent::Error(format!(
                    "failed to poll instances of {template_id}: {err}"
                )));
                ControlFlow::Continue(())
            }
        }
    }

    /// Fetches the instances of one template and replaces its mapping.
    pub async fn poll_once(&self, template_id: &TemplateId) -> Result<usize, ClientError> {
        let token = {
            let store = self.store.lock().await;
            if !store.contains_template(template_id) {
                return Err(ClientError::UnknownTemplate(template_id.clone()));
            }
            store.poll_token()
        };

        let fetched = self.api.list_instances(template_id).await?;
        let count = self
            .store
            .lock()
            .await
            .replace_instances(template_id, token, fetched, self.clock.now())
            .ok_or_else(|| ClientError::UnknownTemplate(template_id.clone()))?;

        debug!(template_id = %template_id, count, "replaced instances");
        self.emit(ControllerEvent::InstancesReplaced {
            template_id: template_id.clone(),
            count,
        });
        Ok(count)
    }

    pub async fn stop_polling(&self, template_id: &TemplateId) -> bool {
        let Some(handle) = self.pollers.lock().await.remove(template_id) else {
            return false;
        };
        handle.shutdown().await;
        debug!(template_id = %template_id, "stopped instance poller");
        self.emit(ControllerEvent::PollerStopped {
            template_id: template_id.clone(),
        });
        true
    }

    /// Stops the template's poller and drops it and its instances from the store.
    pub async fn remove_template(&self, template_id: &TemplateId) -> Option<Template> {
        self.stop_polling(template_id).await;
        self.store.lock().await.remove_template(template_id)
    }

    pub async fn submit_status(
        &self,
        instance_id: &InstanceId,
        status: InstanceStatus,
    ) -> Result<Instance, ClientError> {
        let updated = match self.api.update_status(instance_id, &status).await {
            Ok(updated) => updated,
            Err(err) => {
                warn!(instance_id = %instance_id, %status, error = %err, "status update failed");
                self.emit(ControllerEvent::Error(format!(
                    "failed to set status of {instance_id} to {status}: {err}"
                )));
                return Err(err);
            }
        };

        let merged = self
            .store
            .lock()
            .await
            .merge_instance(updated.clone())
            .cloned();
        match merged {
            Some(instance) => {
                info!(instance_id = %instance_id, status = %instance.status, "instance updated");
                self.emit(ControllerEvent::InstanceUpdated {
                    instance: instance.clone(),
                });
                Ok(instance)
            }
            None => {
                debug!(instance_id = %instance_id, "updated instance is not mapped locally");
                Ok(updated)
            }
        }
    }

    /// Collects parameters through `prompt` and asks the backend to create an
    /// instance.
    ///
    /// The local view is left untouched; the instance shows up with the next
    /// poll of its template. `Ok(None)` means the prompt was dismissed.
    pub async fn create_instance(
        &self,
        template_id: &TemplateId,
        prompt: &dyn ParameterPrompt,
    ) -> Result<Option<Instance>, ClientError> {
        let template = self
            .store
            .lock()
            .await
            .template(template_id)
            .cloned()
            .ok_or_else(|| ClientError::UnknownTemplate(template_id.clone()))?;

        let Some(parameters) = prompt
            .collect(&template)
            .await
            .map_err(|source| ClientError::Prompt { source })?
        else {
            debug!(template_id = %template_id, "instance creation dismissed");
            return Ok(None);
        };

        let request = CreateInstanceRequest {
            template_id: template_id.clone(),
            parameters,
        };
        match self.api.create_instance(&request).await {
            Ok(instance) => {
                info!(template_id = %template_id, instance_id = %instance.id, "instance created");
                self.emit(ControllerEvent::InstanceCreated {
                    instance: instance.clone(),
                });
                Ok(Some(instance))
            }
            Err(err) => {
                error!(template_id = %template_id, error = %err, "failed to create instance");
                self.emit(ControllerEvent::Error(format!(
                    "failed to create instance of {template_id}: {err}"
                )));
                Err(err)
            }
        }
    }

    /// Removes the instance locally, then deletes it on the backend.
    ///
    /// Until the backend answers, no poll result can bring the instance back.
    /// Afterwards only polls started after the answer are authoritative. The
    /// local removal stands even if the backend call fails.
    pub async fn delete_instance(
        &self,
        template_id: &TemplateId,
        instance_id: &InstanceId,
    ) -> Result<(), ClientError> {
        let removed = self
            .store
            .lock()
            .await
            .remove_instance(template_id, instance_id);
        if removed.is_some() {
            self.emit(ControllerEvent::InstanceRemoved {
                template_id: template_id.clone(),
                instance_id: instance_id.clone(),
            });
        }

        if let Err(err) = self.api.delete_instance(instance_id).await {
            self.store
                .lock()
                .await
                .abandon_delete(template_id, instance_id);
            warn!(instance_id = %instance_id, error = %err, "remote delete failed");
            self.emit(ControllerEvent::Error(format!(
                "failed to delete instance {instance_id}: {err}"
            )));
            return Err(err);
        }
        self.store
            .lock()
            .await
            .confirm_delete(template_id, instance_id);
        info!(template_id = %template_id, instance_id = %instance_id, "instance deleted");
        Ok(())
    }

    pub async fn template_ids(&self) -> Vec<TemplateId> {
        self.store.lock().await.template_ids()
    }

    pub async fn instances(&self, template_id: &TemplateId) -> Option<Vec<Instance>> {
        self.store
            .lock()
            .await
            .instances(template_id)
            .map(|instances| instances.values().cloned().collect())
    }

    pub async fn instance(&self, instance_id: &InstanceId) -> Option<Instance> {
        self.store.lock().await.instance(instance_id).cloned()
    }

    pub async fn snapshot(&self) -> Vec<TemplateView> {
        self.store.lock().await.snapshot()
    }

    pub async fn polling_templates(&self) -> Vec<TemplateId> {
        let pollers = self.pollers.lock().await;
        let mut ids: Vec<_> = pollers
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(template_id, _)| template_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Stops every poller and waits for them to exit.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = self.pollers.lock().await.drain().collect();
        let stopped: Vec<TemplateId> = handles.iter().map(|(id, _)| id.clone()).collect();
        join_all(handles.into_iter().map(|(_, handle)| handle.shutdown())).await;
        for template_id in stopped {
            self.emit(ControllerEvent::PollerStopped { template_id });
        }
        info!("controller shut down");
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
