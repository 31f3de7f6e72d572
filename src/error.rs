//! Error types for the SOAP toolkit.
//!
//! Three layers:
//! - [`ConfigError`]: detected while a service is being set up, fatal to startup.
//! - [`CodecError`]: per-request routing, decoding and encoding failures.
//! - [`Fault`]: the SOAP 1.1 fault a request ends in when it does not succeed.

use crate::xml::SOAP_ENV_NS;
use quick_xml::escape::escape;
use std::fmt;
use thiserror::Error;

/// Setup-time errors. Never surfaced as SOAP faults.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Duplicate type: {0}")]
    DuplicateType(String),

    #[error("Unknown type '{type_name}' referenced by {context}")]
    UnknownType { type_name: String, context: String },

    #[error("Type '{owner}' member '{member}' refers to unresolved type '{reference}'")]
    UnresolvedReference {
        owner: String,
        member: String,
        reference: String,
    },

    #[error("Cyclic type reference: {}", .cycle.join(" -> "))]
    CyclicReference { cycle: Vec<String> },

    #[error("Duplicate operation: {0}")]
    DuplicateOperation(String),

    #[error("Duplicate part '{part}' in operation '{operation}'")]
    DuplicatePart { operation: String, part: String },

    #[error("Duplicate field '{field}' in type '{owner}'")]
    DuplicateField { owner: String, field: String },

    #[error("Unsupported binding for operation '{operation}': {binding}")]
    UnsupportedBinding { operation: String, binding: String },

    #[error("Element '{element}' is claimed by both '{first}' and '{second}'")]
    AmbiguousElement {
        element: String,
        first: String,
        second: String,
    },

    #[error("No handler registered for operation '{0}'")]
    MissingHandler(String),

    #[error("Handler registered for unknown operation '{0}'")]
    OrphanHandler(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Per-request routing and coding errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Version mismatch: {0}")]
    VersionMismatch(String),

    #[error("Header '{0}' is marked mustUnderstand but is not understood")]
    MustUnderstand(String),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Cannot convert '{value}' in element '{element}' to {expected}")]
    TypeCoercion {
        element: String,
        expected: String,
        value: String,
    },

    #[error("Missing required element '{field}' in '{element}'")]
    MissingRequiredField { element: String, field: String },

    #[error("Unexpected element '{element}' in '{parent}'")]
    UnexpectedElement { parent: String, element: String },

    #[error("Element '{element}' in '{parent}' is out of sequence order")]
    OutOfOrder { parent: String, element: String },

    #[error("Element '{element}' in '{parent}' occurs {count} times, at most {max} allowed")]
    TooManyOccurrences {
        parent: String,
        element: String,
        count: usize,
        max: u32,
    },

    #[error("Nesting depth exceeds maximum {0}")]
    DepthExceeded(usize),

    #[error("Unresolved reference '{0}'")]
    UnresolvedHref(String),

    #[error("Request body size {size} exceeds maximum {max}")]
    RequestTooLarge { size: usize, max: usize },

    #[error("Value for '{element}' does not match type {expected}")]
    ValueMismatch { element: String, expected: String },

    #[error("Result of '{operation}' does not match its output parts: {reason}")]
    ResultShape { operation: String, reason: String },

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("XML error: {0}")]
    Xml(String),
}

impl CodecError {
    /// Stable subcode used in `Client.*` / `Server.*` fault codes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedEnvelope(_) => "MalformedEnvelope",
            Self::VersionMismatch(_) => "VersionMismatch",
            Self::MustUnderstand(_) => "MustUnderstand",
            Self::UnknownOperation(_) => "UnknownOperation",
            Self::TypeCoercion { .. } => "TypeCoercion",
            Self::MissingRequiredField { .. } => "MissingRequiredField",
            Self::UnexpectedElement { .. } => "UnexpectedElement",
            Self::OutOfOrder { .. } => "OutOfOrder",
            Self::TooManyOccurrences { .. } => "TooManyOccurrences",
            Self::DepthExceeded(_) => "DepthExceeded",
            Self::UnresolvedHref(_) => "UnresolvedHref",
            Self::RequestTooLarge { .. } => "RequestTooLarge",
            Self::ValueMismatch { .. } => "ValueMismatch",
            Self::ResultShape { .. } => "ResultShape",
            Self::UnknownType(_) => "UnknownType",
            Self::Xml(_) => "Xml",
        }
    }

    /// Whether the failure lies with the engine rather than the caller.
    pub fn is_server_side(&self) -> bool {
        matches!(
            self,
            Self::ValueMismatch { .. } | Self::ResultShape { .. } | Self::UnknownType(_) | Self::Xml(_)
        )
    }

    /// Convert into the fault reported to the caller.
    pub fn to_fault(&self) -> Fault {
        match self {
            Self::VersionMismatch(_) => Fault::new(FaultCode::VersionMismatch, self.to_string()),
            Self::MustUnderstand(_) => Fault::new(FaultCode::MustUnderstand, self.to_string()),
            _ if self.is_server_side() => Fault::server(self.to_string()).with_subcode(self.as_str()),
            _ => Fault::client(self.to_string()).with_subcode(self.as_str()),
        }
    }
}

/// SOAP 1.1 fault codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultCode {
    VersionMismatch,
    MustUnderstand,
    Client,
    Server,
}

impl FaultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VersionMismatch => "VersionMismatch",
            Self::MustUnderstand => "MustUnderstand",
            Self::Client => "Client",
            Self::Server => "Server",
        }
    }

    /// Parse a code such as `SOAP-ENV:Client.NotFound` into the code and
    /// its dotted subcode.
    pub fn parse(qualified: &str) -> Option<(Self, Option<String>)> {
        let unprefixed = qualified
            .trim()
            .rsplit_once(':')
            .map_or(qualified.trim(), |(_, local)| local);
        let (head, subcode) = match unprefixed.split_once('.') {
            Some((head, rest)) => (head, Some(rest.to_string())),
            None => (unprefixed, None),
        };
        let code = match head {
            "VersionMismatch" => Self::VersionMismatch,
            "MustUnderstand" => Self::MustUnderstand,
            "Client" => Self::Client,
            "Server" => Self::Server,
            _ => return None,
        };
        Some((code, subcode))
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The alternate outcome of a dispatch.
///
/// Handlers return `Err(Fault)` to signal business failures such as
/// "not found"; the dispatcher never encodes a result alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub code: FaultCode,
    /// Dotted refinement of `code`, e.g. `UnknownOperation` in `Client.UnknownOperation`.
    pub subcode: Option<String>,
    pub message: String,
    pub actor: Option<String>,
    pub detail: Option<String>,
}

impl Fault {
    pub fn new(code: FaultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            subcode: None,
            message: message.into(),
            actor: None,
            detail: None,
        }
    }

    /// A fault caused by the caller.
    pub fn client(message: impl Into<String>) -> Self {
        Self::new(FaultCode::Client, message)
    }

    /// A fault caused by the engine or the handler's own failure.
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(FaultCode::Server, message)
    }

    pub fn with_subcode(mut self, subcode: impl Into<String>) -> Self {
        self.subcode = Some(subcode.into());
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Code as written in `faultcode`, without the envelope prefix.
    pub fn qualified_code(&self) -> String {
        match &self.subcode {
            Some(sub) => format!("{}.{}", self.code, sub),
            None => self.code.to_string(),
        }
    }

    pub fn is_client(&self) -> bool {
        self.code == FaultCode::Client
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.qualified_code(), self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for Fault {}

impl From<CodecError> for Fault {
    fn from(err: CodecError) -> Self {
        err.to_fault()
    }
}

/// Render a SOAP 1.1 Fault envelope.
pub fn soap_fault_response(fault: &Fault) -> String {
    let actor = fault
        .actor
        .as_deref()
        .map(|a| format!("\n      <faultactor>{}</faultactor>", escape(a)))
        .unwrap_or_default();
    let detail = fault
        .detail
        .as_deref()
        .map(|d| format!("\n      <detail>{}</detail>", escape(d)))
        .unwrap_or_default();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="{}">
  <SOAP-ENV:Body>
    <SOAP-ENV:Fault>
      <faultcode>SOAP-ENV:{}</faultcode>
      <faultstring>{}</faultstring>{}{}
    </SOAP-ENV:Fault>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#,
        SOAP_ENV_NS,
        escape(&fault.qualified_code()),
        escape(&fault.message),
        actor,
        detail
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_as_str() {
        assert_eq!(
            CodecError::UnknownOperation("x".into()).as_str(),
            "UnknownOperation"
        );
        assert_eq!(CodecError::DepthExceeded(3).as_str(), "DepthExceeded");
    }

    #[test]
    fn test_decode_errors_become_client_faults() {
        let fault = CodecError::TypeCoercion {
            element: "a".into(),
            expected: "int".into(),
            value: "x".into(),
        }
        .to_fault();
        assert_eq!(fault.code, FaultCode::Client);
        assert_eq!(fault.qualified_code(), "Client.TypeCoercion");
    }

    #[test]
    fn test_encode_errors_become_server_faults() {
        let fault = CodecError::ValueMismatch {
            element: "result".into(),
            expected: "float".into(),
        }
        .to_fault();
        assert_eq!(fault.qualified_code(), "Server.ValueMismatch");
    }

    #[test]
    fn test_version_mismatch_code() {
        let fault = CodecError::VersionMismatch("SOAP 1.2".into()).to_fault();
        assert_eq!(fault.code, FaultCode::VersionMismatch);
        assert!(fault.subcode.is_none());
    }

    #[test]
    fn test_fault_code_parse() {
        assert_eq!(
            FaultCode::parse("SOAP-ENV:Client"),
            Some((FaultCode::Client, None))
        );
        assert_eq!(
            FaultCode::parse("soap:Server.Internal"),
            Some((FaultCode::Server, Some("Internal".to_string())))
        );
        assert_eq!(FaultCode::parse("Bogus"), None);
    }

    #[test]
    fn test_soap_11_fault() {
        let fault = Fault::client("Person not found")
            .with_detail("No person exists with ID: 7")
            .with_actor("urn:PersonService");
        let xml = soap_fault_response(&fault);
        assert!(xml.contains(SOAP_ENV_NS));
        assert!(xml.contains("<faultcode>SOAP-ENV:Client</faultcode>"));
        assert!(xml.contains("<faultstring>Person not found</faultstring>"));
        assert!(xml.contains("<faultactor>urn:PersonService</faultactor>"));
        assert!(xml.contains("<detail>No person exists with ID: 7</detail>"));
    }

    #[test]
    fn test_fault_text_is_escaped() {
        let fault = Fault::server("a < b & c");
        let xml = soap_fault_response(&fault);
        assert!(xml.contains("a &lt; b &amp; c"));
        assert!(!xml.contains("<faultactor>"));
        assert!(!xml.contains("<detail>"));
    }

    #[test]
    fn test_fault_display() {
        let fault = Fault::client("Division by zero")
            .with_subcode("Arithmetic")
            .with_detail("Cannot divide by zero");
        assert_eq!(
            fault.to_string(),
            "Client.Arithmetic: Division by zero (Cannot divide by zero)"
        );
    }
}
