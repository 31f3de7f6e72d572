//! Namespace URIs and the XML writer shared by schema, WSDL and envelope output.

use crate::error::CodecError;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

/// SOAP 1.1 envelope namespace.
pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// SOAP 1.2 envelope namespace; only recognised in order to reject it.
pub const SOAP_12_ENV_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
/// SOAP 1.1 encoding namespace, also the `encodingStyle` URI.
pub const SOAP_ENC_NS: &str = "http://schemas.xmlsoap.org/soap/encoding/";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const WSDL_NS: &str = "http://schemas.xmlsoap.org/wsdl/";
pub const WSDL_SOAP_NS: &str = "http://schemas.xmlsoap.org/wsdl/soap/";
pub const SOAP_HTTP_TRANSPORT: &str = "http://schemas.xmlsoap.org/soap/http";

/// Indenting writer over an in-memory buffer.
///
/// Text-only elements stay on one line and empty text is written as an
/// empty element, so no indentation whitespace ever leaks into a value.
pub(crate) struct XmlWriter {
    writer: Writer<Vec<u8>>,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    pub fn declaration(&mut self) -> Result<(), CodecError> {
        self.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
    }

    pub fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), CodecError> {
        self.write(Event::Start(element(name, attrs)))
    }

    pub fn end(&mut self, name: &str) -> Result<(), CodecError> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    pub fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), CodecError> {
        self.write(Event::Empty(element(name, attrs)))
    }

    /// Element holding only text.
    pub fn leaf(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> Result<(), CodecError> {
        if text.is_empty() {
            return self.empty(name, attrs);
        }
        self.start(name, attrs)?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    pub fn finish(self) -> Result<String, CodecError> {
        String::from_utf8(self.writer.into_inner()).map_err(|e| CodecError::Xml(e.to_string()))
    }

    fn write(&mut self, event: Event<'_>) -> Result<(), CodecError> {
        self.writer
            .write_event(event)
            .map_err(|e| CodecError::Xml(e.to_string()))
    }
}

fn element<'a>(name: &'a str, attrs: &[(&str, &str)]) -> BytesStart<'a> {
    let mut start = BytesStart::new(name);
    for &attr in attrs {
        start.push_attribute(attr);
    }
    start
}
