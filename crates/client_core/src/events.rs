//! Notifications published by the controller as its local view changes.

use shared::{
    domain::{InstanceId, TemplateId},
    protocol::Instance,
};

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    TemplatesLoaded {
        count: usize,
    },
    InstancesReplaced {
        template_id: TemplateId,
        count: usize,
    },
    InstanceRemoved {
        template_id: TemplateId,
        instance_id: InstanceId,
    },
    InstanceUpdated {
        instance: Instance,
    },
    InstanceCreated {
        instance: Instance,
    },
    PollerStopped {
        template_id: TemplateId,
    },
    Error(String),
}
