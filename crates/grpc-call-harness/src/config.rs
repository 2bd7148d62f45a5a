//! Settings for the out-of-process call driver.

use serde::Deserialize;
use std::path::PathBuf;

use crate::entities::ServiceDescriptor;
use crate::error::HarnessError;
use crate::use_cases::ShutdownPolicy;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:50051";

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

/// Everything the driver needs to start serving a command pipe
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverConfig {
    /// Server the driver calls into
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// JSON service descriptor naming the callable methods
    pub descriptor_path: PathBuf,
    /// Pipe the controlling process writes commands to
    pub command_pipe: PathBuf,
    #[serde(default)]
    pub on_stop: ShutdownPolicy,
}

impl DriverConfig {
    pub fn new(descriptor_path: impl Into<PathBuf>, command_pipe: impl Into<PathBuf>) -> Self {
        Self {
            endpoint: default_endpoint(),
            descriptor_path: descriptor_path.into(),
            command_pipe: command_pipe.into(),
            on_stop: ShutdownPolicy::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_on_stop(mut self, on_stop: ShutdownPolicy) -> Self {
        self.on_stop = on_stop;
        self
    }

    /// Read and parse the service descriptor
    pub fn load_descriptor(&self) -> Result<ServiceDescriptor, HarnessError> {
        let json = std::fs::read_to_string(&self.descriptor_path)?;
        ServiceDescriptor::from_json(&json).map_err(|e| {
            HarnessError::ConfigurationError(format!(
                "invalid service descriptor {}: {e}",
                self.descriptor_path.display()
            ))
        })
    }
}
