//! Operation descriptors and the registry that owns them.

use crate::error::ConfigError;
use crate::types::{is_ncname, TypeName};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// SOAP binding style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    /// Body wraps parts in an element named after the operation.
    #[default]
    Rpc,
    /// Body carries one schema-declared element per part.
    Document,
}

impl Style {
    pub fn as_str(&self) -> &'static str {
        match self {
            Style::Rpc => "rpc",
            Style::Document => "document",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SOAP body use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Use {
    /// SOAP section 5 encoding with `xsi:type` annotations.
    Encoded,
    /// Plain schema-conformant XML.
    Literal,
}

impl Use {
    pub fn as_str(&self) -> &'static str {
        match self {
            Use::Encoded => "encoded",
            Use::Literal => "literal",
        }
    }
}

impl fmt::Display for Use {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, typed input or output slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: TypeName,
}

impl Part {
    pub fn new(name: impl Into<String>, type_name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    /// Body element carrying this part in document style: the complex
    /// type's local name, or the part name for primitive parts.
    pub fn element_name(&self) -> &str {
        if self.type_name.is_xsd() {
            &self.name
        } else {
            self.type_name.local_name()
        }
    }
}

/// Descriptor for a callable operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub name: String,
    /// Empty until resolved against the service's target namespace.
    pub namespace: String,
    /// Empty until resolved to the derived default.
    pub soap_action: String,
    style: Option<Style>,
    use_: Option<Use>,
    pub inputs: Vec<Part>,
    pub outputs: Vec<Part>,
    pub documentation: Option<String>,
}

impl Operation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: String::new(),
            soap_action: String::new(),
            style: None,
            use_: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            documentation: None,
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn soap_action(mut self, action: impl Into<String>) -> Self {
        self.soap_action = action.into();
        self
    }

    pub fn rpc(mut self) -> Self {
        self.style = Some(Style::Rpc);
        self
    }

    pub fn document(mut self) -> Self {
        self.style = Some(Style::Document);
        self
    }

    pub fn encoded(mut self) -> Self {
        self.use_ = Some(Use::Encoded);
        self
    }

    pub fn literal(mut self) -> Self {
        self.use_ = Some(Use::Literal);
        self
    }

    pub fn binding(mut self, style: Style, body_use: Use) -> Self {
        self.style = Some(style);
        self.use_ = Some(body_use);
        self
    }

    pub(crate) fn with_binding(mut self, style: Option<Style>, body_use: Option<Use>) -> Self {
        self.style = style.or(self.style);
        self.use_ = body_use.or(self.use_);
        self
    }

    pub fn input(mut self, name: impl Into<String>, type_name: impl Into<TypeName>) -> Self {
        self.inputs.push(Part::new(name, type_name));
        self
    }

    pub fn output(mut self, name: impl Into<String>, type_name: impl Into<TypeName>) -> Self {
        self.outputs.push(Part::new(name, type_name));
        self
    }

    pub fn documentation(mut self, text: impl Into<String>) -> Self {
        self.documentation = Some(text.into());
        self
    }

    pub fn style(&self) -> Style {
        self.style.unwrap_or_default()
    }

    /// Body use; defaults to encoded for rpc and literal for document.
    pub fn body_use(&self) -> Use {
        self.use_.unwrap_or(match self.style() {
            Style::Rpc => Use::Encoded,
            Style::Document => Use::Literal,
        })
    }

    /// Fill in namespace, style and SOAPAction from service defaults.
    pub fn resolve_defaults(&mut self, namespace: &str, style: Style) {
        if self.namespace.is_empty() {
            self.namespace = namespace.to_string();
        }
        if self.style.is_none() {
            self.style = Some(style);
        }
        if self.soap_action.is_empty() {
            self.soap_action = match self.style() {
                Style::Rpc => format!("{}#{}", self.namespace, self.name),
                Style::Document => format!("{}/{}", self.namespace.trim_end_matches('/'), self.name),
            };
        }
    }

    fn check(&self) -> Result<(), ConfigError> {
        if !is_ncname(&self.name) {
            return Err(ConfigError::InvalidName(format!("operation name '{}'", self.name)));
        }
        if self.style() == Style::Document && self.body_use() == Use::Encoded {
            return Err(ConfigError::UnsupportedBinding {
                operation: self.name.clone(),
                binding: "document/encoded".to_string(),
            });
        }
        for parts in [&self.inputs, &self.outputs] {
            let mut seen = HashSet::new();
            for part in parts {
                if !is_ncname(&part.name) {
                    return Err(ConfigError::InvalidName(format!(
                        "part '{}' of operation '{}'",
                        part.name, self.name
                    )));
                }
                if !seen.insert(part.name.as_str()) {
                    return Err(ConfigError::DuplicatePart {
                        operation: self.name.clone(),
                        part: part.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Operations in registration order, looked up by name.
#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    operations: Vec<Operation>,
    index: HashMap<String, usize>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, operation: Operation) -> Result<(), ConfigError> {
        operation.check()?;
        if self.index.contains_key(&operation.name) {
            return Err(ConfigError::DuplicateOperation(operation.name));
        }
        self.index.insert(operation.name.clone(), self.operations.len());
        self.operations.push(operation);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.index.get(name).map(|&i| &self.operations[i])
    }

    /// Operations in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_use_follows_style() {
        assert_eq!(Operation::new("a").body_use(), Use::Encoded);
        assert_eq!(Operation::new("a").document().body_use(), Use::Literal);
        assert_eq!(Operation::new("a").rpc().literal().body_use(), Use::Literal);
    }

    #[test]
    fn test_resolve_defaults() {
        let mut op = Operation::new("getPerson");
        op.resolve_defaults("urn:PersonService", Style::Rpc);
        assert_eq!(op.namespace, "urn:PersonService");
        assert_eq!(op.soap_action, "urn:PersonService#getPerson");

        let mut op = Operation::new("add");
        op.resolve_defaults("http://example.com/calculator/", Style::Document);
        assert_eq!(op.style(), Style::Document);
        assert_eq!(op.soap_action, "http://example.com/calculator/add");

        let mut op = Operation::new("x").namespace("urn:own").soap_action("custom");
        op.resolve_defaults("urn:svc", Style::Rpc);
        assert_eq!(op.namespace, "urn:own");
        assert_eq!(op.soap_action, "custom");
    }

    #[test]
    fn test_element_name() {
        assert_eq!(Part::new("request", "tns:AddRequest").element_name(), "AddRequest");
        assert_eq!(Part::new("count", "xsd:int").element_name(), "count");
    }

    #[test]
    fn test_duplicate_operation() {
        let mut reg = OperationRegistry::new();
        reg.register(Operation::new("add")).unwrap();
        assert!(matches!(
            reg.register(Operation::new("add")),
            Err(ConfigError::DuplicateOperation(name)) if name == "add"
        ));
    }

    #[test]
    fn test_duplicate_part() {
        let mut reg = OperationRegistry::new();
        let op = Operation::new("add").input("a", "xsd:int").input("a", "xsd:int");
        assert!(matches!(
            reg.register(op),
            Err(ConfigError::DuplicatePart { part, .. }) if part == "a"
        ));
    }

    #[test]
    fn test_document_encoded_rejected() {
        let mut reg = OperationRegistry::new();
        let op = Operation::new("add").binding(Style::Document, Use::Encoded);
        assert!(matches!(
            reg.register(op),
            Err(ConfigError::UnsupportedBinding { .. })
        ));
    }

    #[test]
    fn test_registration_order() {
        let mut reg = OperationRegistry::new();
        for name in ["sayHello", "addNumbers", "getServerTime"] {
            reg.register(Operation::new(name)).unwrap();
        }
        let names: Vec<&str> = reg.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["sayHello", "addNumbers", "getServerTime"]);
        assert!(reg.get("addNumbers").is_some());
        assert!(reg.get("nope").is_none());
    }
}
