use serde::{Deserialize, Serialize};

use super::{Method, MethodDefinition};

/// Static description of a gRPC service: its name and declared methods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub methods: Vec<MethodDefinition>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: MethodDefinition) -> Self {
        self.methods.push(method);
        self
    }

    /// Load a descriptor written as JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Implemented by generated code for each service
pub trait ServiceDefinition: 'static {
    fn descriptor() -> ServiceDescriptor;
}

/// A service hosted by the server: its descriptor plus registered handlers
#[derive(Debug, Clone)]
pub struct Service {
    pub descriptor: ServiceDescriptor,
    pub methods: Vec<Method>,
}

impl Service {
    pub fn new(descriptor: ServiceDescriptor) -> Self {
        Self {
            descriptor,
            methods: Vec::new(),
        }
    }

    pub fn of<D: ServiceDefinition>() -> Self {
        Self::new(D::descriptor())
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    pub fn with_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods.extend(methods);
        self
    }
}
