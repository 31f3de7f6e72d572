//! Service assembly: types, operations and handlers validated together.
//!
//! A [`ServiceBuilder`] collects registrations and [`ServiceBuilder::build`]
//! checks them all at once. The resulting [`Service`] is read-only and can
//! be shared across request workers without locking.

use crate::codec::MessageCodec;
use crate::config::{CodecConfig, ServiceConfig, SettingsConfig};
use crate::error::{CodecError, ConfigError, Fault};
use crate::operation::{Operation, OperationRegistry, Style};
use crate::schema::GlobalElement;
use crate::types::{is_ncname, ComplexType, TypeName, TypeRegistry};
use crate::value::Value;
use crate::wsdl::WsdlGenerator;
use std::collections::HashMap;
use tracing::{debug, info};

/// Business logic behind an operation.
///
/// Receives decoded arguments in the order of the operation's inputs and
/// returns either the result or a fault. A returned fault is sent as is;
/// nothing else from the call is encoded.
pub trait Handler: Send + Sync {
    fn call(&self, args: Vec<Value>) -> Result<Value, Fault>;
}

impl<F> Handler for F
where
    F: Fn(Vec<Value>) -> Result<Value, Fault> + Send + Sync,
{
    fn call(&self, args: Vec<Value>) -> Result<Value, Fault> {
        self(args)
    }
}

/// Everything a WSDL document or a codec needs to know about a service.
#[derive(Debug, Clone)]
pub struct ServiceDescription {
    pub name: String,
    pub target_namespace: String,
    /// Configured endpoint; `None` defers to the transport's hint.
    pub endpoint: Option<String>,
    /// Default binding style.
    pub style: Style,
    pub types: TypeRegistry,
    pub operations: OperationRegistry,
    elements: Vec<GlobalElement>,
    /// Document-style input root element -> operation name.
    document_roots: HashMap<String, String>,
}

impl ServiceDescription {
    /// Global schema elements carrying document-style parts.
    pub fn elements(&self) -> &[GlobalElement] {
        &self.elements
    }

    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    /// Document-style operation whose first input part is carried by `element`.
    pub fn operation_for_element(&self, element: &str) -> Option<&Operation> {
        self.document_roots
            .get(element)
            .and_then(|name| self.operations.get(name))
    }

    /// Operation declaring this SOAPAction.
    pub fn operation_for_action(&self, action: &str) -> Option<&Operation> {
        if action.is_empty() {
            return None;
        }
        self.operations.iter().find(|op| op.soap_action == action)
    }

    pub fn wsdl(&self, endpoint_hint: &str) -> Result<String, CodecError> {
        WsdlGenerator::new(self).generate(endpoint_hint)
    }
}

/// Collects types, operations and handlers for one service.
pub struct ServiceBuilder {
    name: String,
    namespace: String,
    endpoint: Option<String>,
    style: Style,
    codec: CodecConfig,
    settings: SettingsConfig,
    types: TypeRegistry,
    operations: Vec<Operation>,
    handlers: Vec<(String, Box<dyn Handler>)>,
}

impl ServiceBuilder {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            endpoint: None,
            style: Style::Rpc,
            codec: CodecConfig::default(),
            settings: SettingsConfig::default(),
            types: TypeRegistry::new(),
            operations: Vec::new(),
            handlers: Vec::new(),
        }
    }

    /// Start from a configuration file: service identity, codec and
    /// settings sections, plus any declared types and operations.
    /// Handlers for declared operations are bound with [`Self::handler`].
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ConfigError> {
        let mut builder = Self::new(config.service.name.clone(), config.service.namespace.clone())
            .style(config.service.style)
            .apply(config);
        for ty in &config.types {
            builder = builder.complex_type(ty.clone())?;
        }
        for op in &config.operations {
            builder = builder.declare(op.to_operation())?;
        }
        Ok(builder)
    }

    /// Take endpoint, codec and settings from a configuration, keeping the
    /// service identity and registrations.
    pub fn apply(mut self, config: &ServiceConfig) -> Self {
        if let Some(endpoint) = &config.service.endpoint {
            self.endpoint = Some(endpoint.clone());
        }
        self.codec = config.codec.clone();
        self.settings = config.settings.clone();
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    /// Default binding style for operations that do not choose one.
    pub fn style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn codec(mut self, codec: CodecConfig) -> Self {
        self.codec = codec;
        self
    }

    pub fn settings(mut self, settings: SettingsConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn complex_type(mut self, ty: ComplexType) -> Result<Self, ConfigError> {
        self.types.define(ty)?;
        Ok(self)
    }

    /// Add an operation together with its handler.
    pub fn register(self, op: Operation, handler: impl Handler + 'static) -> Result<Self, ConfigError> {
        let name = op.name.clone();
        Ok(self.declare(op)?.handler(name, handler))
    }

    /// Add an operation whose handler is bound separately.
    pub fn declare(mut self, op: Operation) -> Result<Self, ConfigError> {
        if self.operations.iter().any(|o| o.name == op.name) {
            return Err(ConfigError::DuplicateOperation(op.name));
        }
        self.operations.push(op);
        Ok(self)
    }

    /// Bind a handler to an operation by name. A later binding replaces an earlier one.
    pub fn handler(mut self, operation: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.handlers.push((operation.into(), Box::new(handler)));
        self
    }

    /// Validate everything and freeze the service.
    pub fn build(self) -> Result<Service, ConfigError> {
        if !is_ncname(&self.name) {
            return Err(ConfigError::InvalidName(format!("service name '{}'", self.name)));
        }

        self.types.validate_closure()?;

        let mut operations = OperationRegistry::new();
        for mut op in self.operations {
            op.resolve_defaults(&self.namespace, self.style);
            for part in op.inputs.iter().chain(&op.outputs) {
                self.types
                    .resolve(&part.type_name)
                    .map_err(|_| ConfigError::UnknownType {
                        type_name: part.type_name.to_string(),
                        context: format!("part '{}' of operation '{}'", part.name, op.name),
                    })?;
            }
            debug!(
                operation = %op.name,
                style = %op.style(),
                body_use = %op.body_use(),
                soap_action = %op.soap_action,
                "Operation registered"
            );
            operations.register(op)?;
        }

        let mut handlers: HashMap<String, Box<dyn Handler>> = HashMap::new();
        for (name, handler) in self.handlers {
            if operations.get(&name).is_none() {
                return Err(ConfigError::OrphanHandler(name));
            }
            handlers.insert(name, handler);
        }
        if let Some(op) = operations.iter().find(|op| !handlers.contains_key(&op.name)) {
            return Err(ConfigError::MissingHandler(op.name.clone()));
        }

        let (elements, document_roots) = document_elements(&operations)?;

        let description = ServiceDescription {
            name: self.name,
            target_namespace: self.namespace,
            endpoint: self.endpoint,
            style: self.style,
            types: self.types,
            operations,
            elements,
            document_roots,
        };

        info!(
            service = %description.name,
            namespace = %description.target_namespace,
            operations = description.operations.len(),
            types = description.types.len(),
            "Service built"
        );

        Ok(Service {
            description,
            codec: self.codec,
            settings: self.settings,
            handlers,
        })
    }
}

/// Global elements for document-style parts and the input root index.
fn document_elements(
    operations: &OperationRegistry,
) -> Result<(Vec<GlobalElement>, HashMap<String, String>), ConfigError> {
    let mut elements: Vec<GlobalElement> = Vec::new();
    let mut owners: HashMap<String, (TypeName, String)> = HashMap::new();
    let mut roots: HashMap<String, String> = HashMap::new();

    for op in operations.iter().filter(|op| op.style() == Style::Document) {
        for part in op.inputs.iter().chain(&op.outputs) {
            let name = part.element_name();
            match owners.get(name) {
                Some((type_name, owner)) if *type_name != part.type_name => {
                    return Err(ConfigError::AmbiguousElement {
                        element: name.to_string(),
                        first: owner.clone(),
                        second: op.name.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    owners.insert(name.to_string(), (part.type_name.clone(), op.name.clone()));
                    elements.push(GlobalElement {
                        name: name.to_string(),
                        type_name: part.type_name.clone(),
                    });
                }
            }
        }

        if let Some(first) = op.inputs.first() {
            let root = first.element_name().to_string();
            if let Some(previous) = roots.insert(root.clone(), op.name.clone()) {
                return Err(ConfigError::AmbiguousElement {
                    element: root,
                    first: previous,
                    second: op.name.clone(),
                });
            }
        }
    }

    Ok((elements, roots))
}

/// A built service: description, codec options and handlers.
pub struct Service {
    description: ServiceDescription,
    codec: CodecConfig,
    settings: SettingsConfig,
    handlers: HashMap<String, Box<dyn Handler>>,
}

impl Service {
    pub fn description(&self) -> &ServiceDescription {
        &self.description
    }

    pub fn codec(&self) -> MessageCodec<'_> {
        MessageCodec::new(
            &self.description.types,
            &self.description.target_namespace,
            &self.codec,
        )
    }

    pub fn codec_config(&self) -> &CodecConfig {
        &self.codec
    }

    pub fn settings(&self) -> &SettingsConfig {
        &self.settings
    }

    pub fn handler(&self, operation: &str) -> Option<&dyn Handler> {
        self.handlers.get(operation).map(|h| h.as_ref())
    }

    pub fn wsdl(&self, endpoint_hint: &str) -> Result<String, CodecError> {
        self.description.wsdl(endpoint_hint)
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("description", &self.description)
            .field("codec", &self.codec)
            .field("settings", &self.settings)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
