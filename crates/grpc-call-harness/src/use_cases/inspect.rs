use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

use crate::entities::{
    Cardinality, MessageType, MethodDescriptor, ServiceDefinition, ServiceDescriptor,
};
use crate::error::HarnessError;

/// Method tables for generated definitions, built once per definition type.
///
/// Descriptors are immutable once generated, so entries are never invalidated.
static TABLES: LazyLock<Mutex<HashMap<TypeId, Arc<MethodTable>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

#[derive(Debug)]
struct MethodTable {
    service: String,
    methods: HashMap<String, MethodDescriptor>,
    order: Vec<String>,
}

impl MethodTable {
    fn build(descriptor: &ServiceDescriptor) -> Self {
        let mut methods = HashMap::with_capacity(descriptor.methods.len());
        let mut order = Vec::with_capacity(descriptor.methods.len());
        for definition in &descriptor.methods {
            let method = MethodDescriptor::from_definition(&descriptor.name, definition);
            order.push(method.name.clone());
            methods.insert(method.name.clone(), method);
        }
        Self {
            service: descriptor.name.clone(),
            methods,
            order,
        }
    }
}

/// Resolves routing and typing information for a service's methods.
///
/// Every lookup works purely on descriptor metadata; no connection is needed.
#[derive(Debug, Clone)]
pub struct Inspector {
    table: Arc<MethodTable>,
}

impl Inspector {
    /// Inspector for a generated service definition, cached for the process lifetime
    pub fn of<D: ServiceDefinition>() -> Self {
        let mut tables = TABLES.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let table = tables
            .entry(TypeId::of::<D>())
            .or_insert_with(|| Arc::new(MethodTable::build(&D::descriptor())))
            .clone();
        Self { table }
    }

    /// Inspector for a descriptor loaded at runtime
    pub fn new(descriptor: &ServiceDescriptor) -> Self {
        Self {
            table: Arc::new(MethodTable::build(descriptor)),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.table.service
    }

    /// Every declared method, in declaration order
    pub fn methods(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.table
            .order
            .iter()
            .filter_map(|name| self.table.methods.get(name))
    }

    pub fn describe(&self, name: &str) -> Result<&MethodDescriptor, HarnessError> {
        self.table
            .methods
            .get(name)
            .ok_or_else(|| HarnessError::UnknownMethod {
                service: self.table.service.clone(),
                method: name.to_owned(),
            })
    }

    pub fn path_for_method(&self, name: &str) -> Result<&str, HarnessError> {
        self.describe(name).map(|method| method.path.as_str())
    }

    pub fn input_type_for_method(&self, name: &str) -> Result<&MessageType, HarnessError> {
        self.describe(name).map(|method| &method.request_type)
    }

    pub fn output_type_for_method(&self, name: &str) -> Result<&MessageType, HarnessError> {
        self.describe(name).map(|method| &method.response_type)
    }

    pub fn cardinality_for_method(&self, name: &str) -> Result<Cardinality, HarnessError> {
        self.describe(name).map(|method| method.cardinality)
    }
}
