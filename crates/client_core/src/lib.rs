//! Client-side controller for the template/instance backend.
//!
//! [`Controller`] loads templates, keeps one poller per template refreshing its
//! instances, and performs the instance actions (create, delete, status
//! change) against a [`TemplateApi`].

pub mod api;
pub mod clock;
mod controller;
pub mod error;
pub mod events;
pub mod poller;
pub mod prompt;
pub mod store;

pub use api::{HttpTemplateApi, TemplateApi};
pub use clock::{Clock, ManualClock, TokioClock};
pub use controller::{Controller, ControllerOptions};
pub use error::ClientError;
pub use events::ControllerEvent;
pub use prompt::{DismissedPrompt, ParameterPrompt, PresetParameters};
pub use store::{TemplateStore, TemplateView};
