//! Configuration types for a SOAP service.

use crate::error::ConfigError;
use crate::operation::{Operation, Part, Style, Use};
use crate::types::ComplexType;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for a SOAP service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Config version
    pub version: String,

    /// Service identity and defaults
    pub service: ServiceSection,

    /// Decoding strictness
    pub codec: CodecConfig,

    /// General settings
    pub settings: SettingsConfig,

    /// HTTP listener for the server binary
    pub server: ServerConfig,

    /// Declarative complex types, registered in order
    pub types: Vec<ComplexType>,

    /// Declarative operations; handlers are bound in code by name
    pub operations: Vec<OperationConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            service: ServiceSection::default(),
            codec: CodecConfig::default(),
            settings: SettingsConfig::default(),
            server: ServerConfig::default(),
            types: Vec::new(),
            operations: Vec::new(),
        }
    }
}

impl ServiceConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }
}

/// Service identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    /// Service name; also the stem of the WSDL portType, binding and port names
    pub name: String,

    /// Target namespace
    pub namespace: String,

    /// Endpoint URL override. Unset means the transport's endpoint hint.
    pub endpoint: Option<String>,

    /// Default binding style for operations that do not set one
    pub style: Style,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: "SoapService".to_string(),
            namespace: "urn:SoapService".to_string(),
            endpoint: None,
            style: Style::Rpc,
        }
    }
}

/// Decoding strictness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Handling of elements no field or part claims
    pub unknown_elements: UnknownElementPolicy,

    /// Maximum element nesting, including href indirections
    pub max_depth: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            unknown_elements: UnknownElementPolicy::Ignore,
            max_depth: 64,
        }
    }
}

/// What to do with an element that matches no declared field or part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnknownElementPolicy {
    /// Skip it
    #[default]
    Ignore,
    /// Fail with `Client.UnexpectedElement`
    Reject,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Maximum request body size to process (bytes)
    pub max_body_size: usize,

    /// Fault on header blocks flagged mustUnderstand
    pub reject_must_understand: bool,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1_048_576, // 1MB
            reject_must_understand: true,
        }
    }
}

/// HTTP listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub listen: String,

    /// Request path serving both SOAP POSTs and `?wsdl`
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            path: "/".to_string(),
        }
    }
}

/// Declarative operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationConfig {
    pub name: String,

    /// Defaults to the service namespace
    #[serde(default)]
    pub namespace: Option<String>,

    /// Defaults to `<namespace>#<name>` (rpc) or `<namespace>/<name>` (document)
    #[serde(default)]
    pub soap_action: Option<String>,

    #[serde(default)]
    pub style: Option<Style>,

    #[serde(default, rename = "use")]
    pub body_use: Option<Use>,

    #[serde(default)]
    pub inputs: Vec<Part>,

    #[serde(default)]
    pub outputs: Vec<Part>,

    #[serde(default)]
    pub documentation: Option<String>,
}

impl OperationConfig {
    pub fn to_operation(&self) -> Operation {
        let mut op = Operation::new(self.name.clone()).with_binding(self.style, self.body_use);
        if let Some(ns) = &self.namespace {
            op = op.namespace(ns.clone());
        }
        if let Some(action) = &self.soap_action {
            op = op.soap_action(action.clone());
        }
        if let Some(doc) = &self.documentation {
            op = op.documentation(doc.clone());
        }
        op.inputs = self.inputs.clone();
        op.outputs = self.outputs.clone();
        op
    }
}
