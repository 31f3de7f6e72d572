//! XML Schema rendering of the registered complex types.

use crate::error::CodecError;
use crate::types::{ComplexKind, ComplexType, TypeName, TypeRegistry, TNS_PREFIX, XSD_PREFIX};
use crate::xml::{XmlWriter, SOAP_ENC_NS, WSDL_NS, XSD_NS};

/// Top-level `xsd:element` declaration, used for document-style parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalElement {
    pub name: String,
    pub type_name: TypeName,
}

/// Renders complex types in registration order, followed by global elements.
///
/// Assumes `TypeRegistry::validate_closure` has passed. Output depends only
/// on registry contents and order, so repeated calls are byte-identical.
pub struct SchemaEmitter<'a> {
    registry: &'a TypeRegistry,
    target_namespace: &'a str,
    elements: &'a [GlobalElement],
}

impl<'a> SchemaEmitter<'a> {
    pub fn new(registry: &'a TypeRegistry, target_namespace: &'a str) -> Self {
        Self {
            registry,
            target_namespace,
            elements: &[],
        }
    }

    pub fn with_elements(mut self, elements: &'a [GlobalElement]) -> Self {
        self.elements = elements;
        self
    }

    /// Standalone `xsd:schema` fragment carrying its own namespace declarations.
    pub fn emit(&self) -> Result<String, CodecError> {
        let mut w = XmlWriter::new();
        self.write(&mut w, true)?;
        w.finish()
    }

    /// Write the schema into `w`. Inside a WSDL document the prefixes are
    /// already declared on `definitions`.
    pub(crate) fn write(&self, w: &mut XmlWriter, standalone: bool) -> Result<(), CodecError> {
        let tns_decl = format!("xmlns:{}", TNS_PREFIX);
        let xsd_decl = format!("xmlns:{}", XSD_PREFIX);
        let mut attrs = vec![("targetNamespace", self.target_namespace)];
        if standalone {
            attrs.push((xsd_decl.as_str(), XSD_NS));
            attrs.push((tns_decl.as_str(), self.target_namespace));
            attrs.push(("xmlns:SOAP-ENC", SOAP_ENC_NS));
            attrs.push(("xmlns:wsdl", WSDL_NS));
        }

        w.start("xsd:schema", &attrs)?;
        w.empty("xsd:import", &[("namespace", SOAP_ENC_NS)])?;
        w.empty("xsd:import", &[("namespace", WSDL_NS)])?;

        for ty in self.registry.iter() {
            write_complex_type(w, ty)?;
        }
        for element in self.elements {
            let type_name = element.type_name.to_string();
            w.empty(
                "xsd:element",
                &[("name", element.name.as_str()), ("type", type_name.as_str())],
            )?;
        }

        w.end("xsd:schema")
    }
}

fn write_complex_type(w: &mut XmlWriter, ty: &ComplexType) -> Result<(), CodecError> {
    w.start("xsd:complexType", &[("name", ty.name.as_str())])?;

    match &ty.kind {
        ComplexKind::Struct { compositor, fields } => {
            let group = format!("xsd:{}", compositor.as_str());
            if fields.is_empty() {
                w.empty(&group, &[])?;
            } else {
                w.start(&group, &[])?;
                for field in fields {
                    let type_name = field.type_name.to_string();
                    let min = field.min_occurs.to_string();
                    let max = field.max_occurs.to_string();
                    let mut attrs = vec![("name", field.name.as_str()), ("type", type_name.as_str())];
                    if field.min_occurs != 1 {
                        attrs.push(("minOccurs", min.as_str()));
                    }
                    if field.is_repeated() {
                        attrs.push(("maxOccurs", max.as_str()));
                    }
                    w.empty("xsd:element", &attrs)?;
                }
                w.end(&group)?;
            }
        }
        ComplexKind::Array { element_type } => {
            let array_type = format!("{}[]", element_type);
            w.start("xsd:complexContent", &[])?;
            w.start("xsd:restriction", &[("base", "SOAP-ENC:Array")])?;
            w.empty(
                "xsd:attribute",
                &[("ref", "SOAP-ENC:arrayType"), ("wsdl:arrayType", array_type.as_str())],
            )?;
            w.end("xsd:restriction")?;
            w.end("xsd:complexContent")?;
        }
    }

    w.end("xsd:complexType")
}
