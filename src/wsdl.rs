//! WSDL 1.1 document generation.

use crate::error::CodecError;
use crate::operation::{Operation, Part, Style, Use};
use crate::schema::SchemaEmitter;
use crate::service::ServiceDescription;
use crate::xml::{
    XmlWriter, SOAP_ENC_NS, SOAP_ENV_NS, SOAP_HTTP_TRANSPORT, WSDL_NS, WSDL_SOAP_NS, XSD_NS, XSI_NS,
};

/// Assembles `definitions > types > message* > portType > binding > service`.
///
/// Operations appear in registration order, so the same description
/// always yields the same document.
pub struct WsdlGenerator<'a> {
    description: &'a ServiceDescription,
}

impl<'a> WsdlGenerator<'a> {
    pub fn new(description: &'a ServiceDescription) -> Self {
        Self { description }
    }

    /// Render the document. `endpoint_hint` fills the service address when
    /// no endpoint is configured.
    pub fn generate(&self, endpoint_hint: &str) -> Result<String, CodecError> {
        let desc = self.description;
        let ns = desc.target_namespace.as_str();
        let mut w = XmlWriter::new();
        w.declaration()?;

        w.start(
            "definitions",
            &[
                ("xmlns:SOAP-ENV", SOAP_ENV_NS),
                ("xmlns:xsd", XSD_NS),
                ("xmlns:xsi", XSI_NS),
                ("xmlns:SOAP-ENC", SOAP_ENC_NS),
                ("xmlns:tns", ns),
                ("xmlns:soap", WSDL_SOAP_NS),
                ("xmlns:wsdl", WSDL_NS),
                ("xmlns", WSDL_NS),
                ("targetNamespace", ns),
            ],
        )?;

        w.start("types", &[])?;
        SchemaEmitter::new(&desc.types, ns)
            .with_elements(desc.elements())
            .write(&mut w, false)?;
        w.end("types")?;

        for op in desc.operations.iter() {
            write_message(&mut w, &format!("{}In", op.name), op, &op.inputs)?;
            write_message(&mut w, &format!("{}Out", op.name), op, &op.outputs)?;
        }

        let port_type = format!("{}PortType", desc.name);
        w.start("portType", &[("name", port_type.as_str())])?;
        for op in desc.operations.iter() {
            let input = format!("tns:{}In", op.name);
            let output = format!("tns:{}Out", op.name);
            w.start("operation", &[("name", op.name.as_str())])?;
            if let Some(doc) = &op.documentation {
                w.leaf("documentation", &[], doc)?;
            }
            w.empty("input", &[("message", input.as_str())])?;
            w.empty("output", &[("message", output.as_str())])?;
            w.end("operation")?;
        }
        w.end("portType")?;

        let binding = format!("{}Binding", desc.name);
        let port_type_ref = format!("tns:{}", port_type);
        w.start(
            "binding",
            &[("name", binding.as_str()), ("type", port_type_ref.as_str())],
        )?;
        w.empty(
            "soap:binding",
            &[("style", desc.style.as_str()), ("transport", SOAP_HTTP_TRANSPORT)],
        )?;
        for op in desc.operations.iter() {
            w.start("operation", &[("name", op.name.as_str())])?;
            w.empty(
                "soap:operation",
                &[("soapAction", op.soap_action.as_str()), ("style", op.style().as_str())],
            )?;
            for direction in ["input", "output"] {
                w.start(direction, &[])?;
                w.empty("soap:body", &body_attributes(op))?;
                w.end(direction)?;
            }
            w.end("operation")?;
        }
        w.end("binding")?;

        let port = format!("{}Port", desc.name);
        let binding_ref = format!("tns:{}", binding);
        let location = desc.endpoint.as_deref().unwrap_or(endpoint_hint);
        w.start("service", &[("name", desc.name.as_str())])?;
        w.start(
            "port",
            &[("name", port.as_str()), ("binding", binding_ref.as_str())],
        )?;
        w.empty("soap:address", &[("location", location)])?;
        w.end("port")?;
        w.end("service")?;

        w.end("definitions")?;
        w.finish()
    }
}

fn write_message(w: &mut XmlWriter, name: &str, op: &Operation, parts: &[Part]) -> Result<(), CodecError> {
    if parts.is_empty() {
        return w.empty("message", &[("name", name)]);
    }
    w.start("message", &[("name", name)])?;
    for part in parts {
        match op.style() {
            Style::Rpc => {
                let type_name = part.type_name.to_string();
                w.empty("part", &[("name", part.name.as_str()), ("type", type_name.as_str())])?;
            }
            Style::Document => {
                let element = format!("tns:{}", part.element_name());
                w.empty("part", &[("name", part.name.as_str()), ("element", element.as_str())])?;
            }
        }
    }
    w.end("message")
}

fn body_attributes(op: &Operation) -> Vec<(&'static str, &str)> {
    match (op.style(), op.body_use()) {
        (Style::Rpc, Use::Encoded) => vec![
            ("use", "encoded"),
            ("namespace", op.namespace.as_str()),
            ("encodingStyle", SOAP_ENC_NS),
        ],
        (Style::Rpc, Use::Literal) => vec![("use", "literal"), ("namespace", op.namespace.as_str())],
        (Style::Document, _) => vec![("use", "literal")],
    }
}
