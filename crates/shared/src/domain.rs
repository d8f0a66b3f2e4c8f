use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(TemplateId);
id_newtype!(InstanceId);

/// Lifecycle state reported by the server for an instance.
///
/// Serialized as the bare lowercase string. Statuses this client does not
/// know about survive a round trip through `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstanceStatus {
    Running,
    Stopped,
    Starting,
    Stopping,
    Dead,
    Unknown,
    Other(String),
}

impl InstanceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            InstanceStatus::Running => "running",
            InstanceStatus::Stopped => "stopped",
            InstanceStatus::Starting => "starting",
            InstanceStatus::Stopping => "stopping",
            InstanceStatus::Dead => "dead",
            InstanceStatus::Unknown => "unknown",
            InstanceStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for InstanceStatus {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "running" => InstanceStatus::Running,
            "stopped" => InstanceStatus::Stopped,
            "starting" => InstanceStatus::Starting,
            "stopping" => InstanceStatus::Stopping,
            "dead" => InstanceStatus::Dead,
            "unknown" => InstanceStatus::Unknown,
            _ => InstanceStatus::Other(value),
        }
    }
}

impl From<&str> for InstanceStatus {
    fn from(value: &str) -> Self {
        InstanceStatus::from(value.to_string())
    }
}

impl From<InstanceStatus> for String {
    fn from(value: InstanceStatus) -> Self {
        match value {
            InstanceStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
