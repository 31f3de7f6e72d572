//! SOAP XML parsing.
//!
//! quick-xml never expands external entities; DOCTYPE declarations are
//! rejected outright so no entity declaration can reach the codec.

use crate::error::{CodecError, Fault, FaultCode};
use crate::xml::{SOAP_12_ENV_NS, SOAP_ENV_NS, XSI_NS};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

/// Attribute with its namespace resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlAttribute {
    pub prefix: Option<String>,
    pub local_name: String,
    pub namespace: Option<String>,
    pub value: String,
}

/// Owned element tree node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    pub prefix: Option<String>,
    pub local_name: String,
    pub namespace: Option<String>,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlElement>,
    /// Concatenated character data directly under this element, unescaped
    /// and untrimmed.
    pub text: String,
    /// Prefix bindings in scope at this element, `""` for the default namespace.
    scope: HashMap<String, String>,
}

impl XmlElement {
    /// Attribute value by local name, ignoring its namespace.
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    /// Attribute value by namespace and local name.
    pub fn attribute_ns(&self, namespace: &str, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.local_name == local_name && a.namespace.as_deref() == Some(namespace))
            .map(|a| a.value.as_str())
    }

    /// First child element by local name.
    pub fn child(&self, local_name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.local_name == local_name)
    }

    pub fn is_named(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(namespace)
    }

    /// `xsi:nil="true"` (or `"1"`).
    pub fn is_nil(&self) -> bool {
        matches!(self.attribute_ns(XSI_NS, "nil"), Some("true" | "1"))
    }

    /// Text of this element and all descendants in document order.
    pub fn text_content(&self) -> String {
        let mut out = self.text.clone();
        for child in &self.children {
            out.push_str(&child.text_content());
        }
        out
    }
}

/// Parse a UTF-8 document into an element tree.
///
/// Nesting deeper than `max_depth` elements is rejected with `DepthExceeded`.
pub fn parse_document(data: &[u8], max_depth: usize) -> Result<XmlElement, CodecError> {
    let xml_str = std::str::from_utf8(data)
        .map_err(|e| CodecError::MalformedEnvelope(format!("Invalid UTF-8: {}", e)))?;

    let mut reader = Reader::from_str(xml_str);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if root.is_some() {
                    return Err(malformed("Content after the document element"));
                }
                if stack.len() >= max_depth {
                    return Err(CodecError::DepthExceeded(max_depth));
                }
                let element = open_element(e, stack.last())?;
                stack.push(element);
            }

            Ok(Event::Empty(ref e)) => {
                if root.is_some() {
                    return Err(malformed("Content after the document element"));
                }
                if stack.len() >= max_depth {
                    return Err(CodecError::DepthExceeded(max_depth));
                }
                let element = open_element(e, stack.last())?;
                close_element(element, &mut stack, &mut root);
            }

            Ok(Event::End(_)) => match stack.pop() {
                Some(element) => close_element(element, &mut stack, &mut root),
                None => return Err(malformed("Unbalanced end tag")),
            },

            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| malformed(&format!("Invalid character data: {}", err)))?;
                match stack.last_mut() {
                    Some(current) => current.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err(malformed("Text outside the document element")),
                }
            }

            Ok(Event::CData(e)) => {
                let bytes = e.into_inner();
                let text = std::str::from_utf8(&bytes)
                    .map_err(|err| malformed(&format!("Invalid CDATA: {}", err)))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(text);
                }
            }

            Ok(Event::DocType(_)) => {
                return Err(malformed("DOCTYPE declarations are not allowed"));
            }

            Ok(Event::Eof) => break,

            Err(e) => {
                return Err(malformed(&format!("XML parse error: {}", e)));
            }

            // Declarations, comments, processing instructions.
            _ => {}
        }

        buf.clear();
    }

    if !stack.is_empty() {
        return Err(malformed("Unexpected end of document"));
    }
    root.ok_or_else(|| malformed("Empty document"))
}

fn malformed(message: &str) -> CodecError {
    CodecError::MalformedEnvelope(message.to_string())
}

fn open_element(e: &BytesStart, parent: Option<&XmlElement>) -> Result<XmlElement, CodecError> {
    let mut scope = parent.map(|p| p.scope.clone()).unwrap_or_default();
    let mut raw_attributes = Vec::new();

    for attr in e.attributes() {
        let attr = attr.map_err(|err| malformed(&format!("Invalid attribute: {}", err)))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|err| malformed(&format!("Invalid attribute name: {}", err)))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| malformed(&format!("Invalid attribute value: {}", err)))?
            .into_owned();

        if key == "xmlns" {
            scope.insert(String::new(), value);
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            scope.insert(prefix.to_string(), value);
        } else {
            raw_attributes.push((key, value));
        }
    }

    let (prefix, local_name) = split_qname(&qname_str(e)?);
    let namespace = match &prefix {
        Some(p) => Some(
            scope
                .get(p)
                .cloned()
                .ok_or_else(|| malformed(&format!("Undeclared namespace prefix '{}'", p)))?,
        ),
        None => scope.get("").cloned().filter(|ns| !ns.is_empty()),
    };

    let attributes = raw_attributes
        .into_iter()
        .map(|(key, value)| {
            let (prefix, local_name) = split_qname(&key);
            // Unprefixed attributes are in no namespace.
            let namespace = prefix.as_ref().and_then(|p| scope.get(p).cloned());
            XmlAttribute {
                prefix,
                local_name,
                namespace,
                value,
            }
        })
        .collect();

    Ok(XmlElement {
        prefix,
        local_name,
        namespace,
        attributes,
        children: Vec::new(),
        text: String::new(),
        scope,
    })
}

fn close_element(element: XmlElement, stack: &mut [XmlElement], root: &mut Option<XmlElement>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

fn qname_str(e: &BytesStart) -> Result<String, CodecError> {
    let name = e.name();
    std::str::from_utf8(name.as_ref())
        .map(str::to_string)
        .map_err(|err| malformed(&format!("Invalid element name: {}", err)))
}

fn split_qname(qname: &str) -> (Option<String>, String) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, qname.to_string()),
    }
}

/// Parsed SOAP envelope.
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    /// SOAP Header (if present)
    pub header: Option<SoapHeader>,
    /// Child elements of the SOAP Body, in document order.
    pub body: Vec<XmlElement>,
}

/// Parsed SOAP Header.
#[derive(Debug, Clone, Default)]
pub struct SoapHeader {
    pub elements: Vec<HeaderElement>,
}

/// A header block.
#[derive(Debug, Clone)]
pub struct HeaderElement {
    pub local_name: String,
    pub namespace: Option<String>,
    pub must_understand: bool,
    pub actor: Option<String>,
}

impl SoapHeader {
    /// First block flagged mustUnderstand.
    pub fn must_understand(&self) -> Option<&HeaderElement> {
        self.elements.iter().find(|e| e.must_understand)
    }
}

impl SoapEnvelope {
    /// The element naming the operation (rpc) or carrying the first part (document).
    pub fn first_body_element(&self) -> Option<&XmlElement> {
        self.body.first()
    }

    /// Read a SOAP Fault out of the Body, if the Body holds one.
    pub fn fault(&self) -> Option<Fault> {
        let fault = self
            .body
            .iter()
            .find(|e| e.is_named(SOAP_ENV_NS, "Fault"))?;

        let text_of = |name: &str| fault.child(name).map(|c| c.text_content().trim().to_string());
        let (code, subcode) = text_of("faultcode")
            .as_deref()
            .and_then(FaultCode::parse)
            .unwrap_or((FaultCode::Server, None));

        Some(Fault {
            code,
            subcode,
            message: text_of("faultstring").unwrap_or_default(),
            actor: text_of("faultactor"),
            detail: text_of("detail"),
        })
    }
}

/// Parse raw bytes as a SOAP 1.1 envelope.
pub fn parse_soap_envelope(data: &[u8], max_depth: usize) -> Result<SoapEnvelope, CodecError> {
    let root = parse_document(data, max_depth)?;

    if root.local_name != "Envelope" {
        return Err(malformed("Root element is not a SOAP Envelope"));
    }
    match root.namespace.as_deref() {
        Some(SOAP_ENV_NS) => {}
        Some(SOAP_12_ENV_NS) => {
            return Err(CodecError::VersionMismatch(
                "SOAP 1.2 envelopes are not supported".to_string(),
            ))
        }
        Some(other) => {
            return Err(CodecError::VersionMismatch(format!(
                "Unrecognized envelope namespace '{}'",
                other
            )))
        }
        None => return Err(malformed("Envelope has no namespace")),
    }

    let mut header = None;
    let mut body = None;
    for child in root.children {
        if child.namespace.as_deref() != Some(SOAP_ENV_NS) {
            continue;
        }
        match child.local_name.as_str() {
            "Header" if header.is_none() && body.is_none() => {
                header = Some(SoapHeader {
                    elements: child.children.iter().map(header_element).collect(),
                });
            }
            "Body" if body.is_none() => body = Some(child.children),
            other => {
                return Err(malformed(&format!("Unexpected envelope element '{}'", other)));
            }
        }
    }

    let body = body.ok_or_else(|| malformed("Envelope has no Body"))?;
    Ok(SoapEnvelope { header, body })
}

fn header_element(e: &XmlElement) -> HeaderElement {
    HeaderElement {
        local_name: e.local_name.clone(),
        namespace: e.namespace.clone(),
        must_understand: get_must_understand(e),
        actor: e.attribute_ns(SOAP_ENV_NS, "actor").map(str::to_string),
    }
}

/// Check mustUnderstand attribute.
fn get_must_understand(e: &XmlElement) -> bool {
    e.attributes
        .iter()
        .filter(|a| a.local_name == "mustUnderstand")
        .filter(|a| a.namespace.is_none() || a.namespace.as_deref() == Some(SOAP_ENV_NS))
        .any(|a| matches!(a.value.trim(), "1" | "true"))
}

/// Extract SOAPAction from HTTP header value (removes quotes).
pub fn parse_soap_action(header_value: &str) -> String {
    header_value.trim().trim_matches('"').to_string()
}
