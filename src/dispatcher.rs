//! Request dispatch.
//!
//! Each request moves through `Received -> Routed -> Decoded -> Invoked`
//! and ends `Encoded` or `Faulted` before it is `Sent`. Every failure is
//! turned into a SOAP fault here; nothing below this layer reaches the
//! transport as an error.

use crate::error::{soap_fault_response, CodecError, Fault};
use crate::operation::{Operation, Style};
use crate::parser::{parse_soap_action, parse_soap_envelope, SoapEnvelope};
use crate::service::{Service, ServiceDescription};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Content type of every response, fault or not.
pub const CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// What the transport hands to [`Dispatcher::handle`].
#[derive(Debug, Clone, Copy)]
pub struct SoapRequest<'a> {
    /// Raw request body
    pub body: &'a [u8],
    /// The transport recognised a WSDL introspection request
    pub wsdl: bool,
    /// Externally visible URL of this endpoint
    pub endpoint: &'a str,
    /// `SOAPAction` header, if sent
    pub soap_action: Option<&'a str>,
}

impl<'a> SoapRequest<'a> {
    pub fn post(body: &'a [u8], endpoint: &'a str) -> Self {
        Self {
            body,
            wsdl: false,
            endpoint,
            soap_action: None,
        }
    }

    pub fn wsdl(endpoint: &'a str) -> Self {
        Self {
            body: &[],
            wsdl: true,
            endpoint,
            soap_action: None,
        }
    }

    pub fn with_soap_action(mut self, action: &'a str) -> Self {
        self.soap_action = Some(action);
        self
    }
}

/// Per-request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Routed,
    Decoded,
    Invoked,
    Encoded,
    Faulted,
    Sent,
}

/// How a request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success,
    Fault(Fault),
    Wsdl,
}

/// What the dispatcher hands back to the transport.
#[derive(Debug, Clone)]
pub struct SoapResponse {
    pub body: Vec<u8>,
    /// HTTP status hint: 200, or 500 for faults
    pub status: u16,
    pub content_type: &'static str,
    /// Operation the request was routed to, if routing got that far
    pub operation: Option<String>,
    pub outcome: Outcome,
}

impl SoapResponse {
    pub fn is_fault(&self) -> bool {
        matches!(self.outcome, Outcome::Fault(_))
    }

    pub fn fault(&self) -> Option<&Fault> {
        match &self.outcome {
            Outcome::Fault(fault) => Some(fault),
            _ => None,
        }
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchMetrics {
    pub requests_processed: u64,
    pub faults_returned: u64,
    pub wsdl_served: u64,
}

/// Tracks one request through its stages.
struct Exchange {
    stage: Stage,
    operation: Option<String>,
}

impl Exchange {
    fn new() -> Self {
        Self {
            stage: Stage::Received,
            operation: None,
        }
    }

    fn advance(&mut self, next: Stage) {
        debug!(
            operation = ?self.operation,
            from = ?self.stage,
            to = ?next,
            "Stage transition"
        );
        self.stage = next;
    }
}

/// Routes SOAP requests to handlers and renders the outcome.
///
/// Holds the built [`Service`] read-only; share it behind an `Arc` to
/// serve requests from many workers.
pub struct Dispatcher {
    service: Service,
    requests_processed: AtomicU64,
    faults_returned: AtomicU64,
    wsdl_served: AtomicU64,
}

impl Dispatcher {
    pub fn new(service: Service) -> Self {
        Self {
            service,
            requests_processed: AtomicU64::new(0),
            faults_returned: AtomicU64::new(0),
            wsdl_served: AtomicU64::new(0),
        }
    }

    pub fn description(&self) -> &ServiceDescription {
        self.service.description()
    }

    pub fn inner(&self) -> &Service {
        &self.service
    }

    /// Raw entry point: request bytes in, response bytes out.
    pub fn service(&self, raw_request: &[u8]) -> Vec<u8> {
        let endpoint = self.description().endpoint.clone().unwrap_or_default();
        self.handle(&SoapRequest::post(raw_request, &endpoint)).body
    }

    /// Process one request from the transport.
    pub fn handle(&self, request: &SoapRequest<'_>) -> SoapResponse {
        if request.wsdl {
            return self.serve_wsdl(request.endpoint);
        }

        self.requests_processed.fetch_add(1, Ordering::Relaxed);
        debug!(
            body_size = request.body.len(),
            soap_action = ?request.soap_action,
            "Processing SOAP request"
        );

        let mut exchange = Exchange::new();
        match self.process(request, &mut exchange) {
            Ok(xml) => {
                exchange.advance(Stage::Encoded);
                exchange.advance(Stage::Sent);
                SoapResponse {
                    body: xml.into_bytes(),
                    status: 200,
                    content_type: CONTENT_TYPE,
                    operation: exchange.operation,
                    outcome: Outcome::Success,
                }
            }
            Err(fault) => {
                exchange.advance(Stage::Faulted);
                self.fault_response(fault, exchange)
            }
        }
    }

    /// Fault a request the transport could not hand over, such as a body
    /// that outgrew `max_body_size` while it was being read.
    pub fn reject(&self, err: CodecError) -> SoapResponse {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
        let mut exchange = Exchange::new();
        exchange.advance(Stage::Faulted);
        self.fault_response(err.into(), exchange)
    }

    pub fn metrics(&self) -> DispatchMetrics {
        DispatchMetrics {
            requests_processed: self.requests_processed.load(Ordering::Relaxed),
            faults_returned: self.faults_returned.load(Ordering::Relaxed),
            wsdl_served: self.wsdl_served.load(Ordering::Relaxed),
        }
    }

    fn serve_wsdl(&self, endpoint: &str) -> SoapResponse {
        self.wsdl_served.fetch_add(1, Ordering::Relaxed);
        match self.service.wsdl(endpoint) {
            Ok(document) => {
                debug!(endpoint = %endpoint, "Serving WSDL");
                SoapResponse {
                    body: document.into_bytes(),
                    status: 200,
                    content_type: CONTENT_TYPE,
                    operation: None,
                    outcome: Outcome::Wsdl,
                }
            }
            Err(err) => self.fault_response(err.to_fault(), Exchange::new()),
        }
    }

    fn process(&self, request: &SoapRequest<'_>, exchange: &mut Exchange) -> Result<String, Fault> {
        let settings = self.service.settings();
        if request.body.len() > settings.max_body_size {
            return Err(CodecError::RequestTooLarge {
                size: request.body.len(),
                max: settings.max_body_size,
            }
            .into());
        }

        let envelope = parse_soap_envelope(request.body, self.service.codec_config().max_depth)?;

        if settings.reject_must_understand {
            if let Some(block) = envelope.header.as_ref().and_then(|h| h.must_understand()) {
                return Err(CodecError::MustUnderstand(block.local_name.clone()).into());
            }
        }

        let op = self.route(&envelope, request.soap_action)?;
        exchange.operation = Some(op.name.clone());
        exchange.advance(Stage::Routed);

        let codec = self.service.codec();
        let args = codec.decode_request(op, &envelope)?;
        exchange.advance(Stage::Decoded);

        let handler = self.service.handler(&op.name).ok_or_else(|| {
            Fault::server(format!("No handler for operation '{}'", op.name)).with_subcode("MissingHandler")
        })?;
        let result = catch_unwind(AssertUnwindSafe(|| handler.call(args))).map_err(|payload| {
            Fault::server("Handler panicked")
                .with_subcode("HandlerPanicked")
                .with_detail(panic_message(payload.as_ref()))
        })?;
        exchange.advance(Stage::Invoked);

        // A handler fault replaces the result entirely.
        let value = result?;

        codec.encode_response(op, &value).map_err(|err| err.to_fault())
    }

    fn route(&self, envelope: &SoapEnvelope, soap_action: Option<&str>) -> Result<&Operation, CodecError> {
        let desc = self.service.description();
        let first = envelope.first_body_element();

        if let Some(element) = first {
            if let Some(op) = desc
                .operation(&element.local_name)
                .filter(|op| op.style() == Style::Rpc)
            {
                return Ok(op);
            }
            if let Some(op) = desc.operation_for_element(&element.local_name) {
                return Ok(op);
            }
        }

        if let Some(action) = soap_action.map(parse_soap_action) {
            if let Some(op) = desc.operation_for_action(&action) {
                debug!(operation = %op.name, soap_action = %action, "Routed by SOAPAction");
                return Ok(op);
            }
        }

        match first {
            Some(element) => Err(CodecError::UnknownOperation(element.local_name.clone())),
            None => Err(CodecError::MalformedEnvelope("Body is empty".to_string())),
        }
    }

    fn fault_response(&self, fault: Fault, exchange: Exchange) -> SoapResponse {
        self.faults_returned.fetch_add(1, Ordering::Relaxed);
        warn!(
            operation = ?exchange.operation,
            code = %fault.qualified_code(),
            message = %fault.message,
            "SOAP fault returned"
        );
        SoapResponse {
            body: soap_fault_response(&fault).into_bytes(),
            status: 500,
            content_type: CONTENT_TYPE,
            operation: exchange.operation,
            outcome: Outcome::Fault(fault),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SettingsConfig;
    use crate::error::FaultCode;
    use crate::operation::Operation;
    use crate::service::ServiceBuilder;
    use crate::value::Value;

    const NS: &str = "urn:TestService";

    fn add(args: Vec<Value>) -> Result<Value, Fault> {
        let sum = args.iter().filter_map(Value::as_i64).sum::<i64>();
        Ok(Value::Int(sum))
    }

    fn reject(_args: Vec<Value>) -> Result<Value, Fault> {
        Err(Fault::client("Not allowed").with_detail("always"))
    }

    fn explode(_args: Vec<Value>) -> Result<Value, Fault> {
        panic!("boom")
    }

    fn dispatcher_with(settings: SettingsConfig) -> Dispatcher {
        let service = ServiceBuilder::new("TestService", NS)
            .settings(settings)
            .register(
                Operation::new("add").input("a", "xsd:int").input("b", "xsd:int").output("return", "xsd:int"),
                add,
            )
            .unwrap()
            .register(Operation::new("reject").output("return", "xsd:string"), reject)
            .unwrap()
            .register(Operation::new("explode"), explode)
            .unwrap()
            .build()
            .unwrap();
        Dispatcher::new(service)
    }

    fn dispatcher() -> Dispatcher {
        dispatcher_with(SettingsConfig::default())
    }

    fn envelope(body: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/" xmlns:ns1="urn:TestService">
  <SOAP-ENV:Body>{}</SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#,
            body
        )
    }

    fn post(d: &Dispatcher, xml: &str) -> SoapResponse {
        d.handle(&SoapRequest::post(xml.as_bytes(), "http://localhost/soap"))
    }

    #[test]
    fn test_successful_call() {
        let d = dispatcher();
        let resp = post(&d, &envelope("<ns1:add><a>2</a><b>3</b></ns1:add>"));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.outcome, Outcome::Success);
        assert_eq!(resp.operation.as_deref(), Some("add"));
        assert_eq!(resp.content_type, CONTENT_TYPE);
        assert!(resp.body_text().contains(r#"<return xsi:type="xsd:int">5</return>"#));
    }

    #[test]
    fn test_unknown_operation_is_client_fault() {
        let d = dispatcher();
        let resp = post(&d, &envelope("<ns1:multiply/>"));
        assert_eq!(resp.status, 500);
        let fault = resp.fault().unwrap();
        assert_eq!(fault.code, FaultCode::Client);
        assert_eq!(fault.subcode.as_deref(), Some("UnknownOperation"));
        assert!(resp.body_text().contains("SOAP-ENV:Client.UnknownOperation"));
    }

    #[test]
    fn test_handler_fault_passed_through() {
        let d = dispatcher();
        let resp = post(&d, &envelope("<ns1:reject/>"));
        assert_eq!(
            resp.fault(),
            Some(&Fault::client("Not allowed").with_detail("always"))
        );
        let body = resp.body_text();
        assert!(body.contains("<faultcode>SOAP-ENV:Client</faultcode>"));
        assert!(!body.contains("rejectResponse"));
    }

    #[test]
    fn test_handler_panic_is_server_fault() {
        let d = dispatcher();
        let resp = post(&d, &envelope("<ns1:explode/>"));
        let fault = resp.fault().unwrap();
        assert_eq!(fault.qualified_code(), "Server.HandlerPanicked");
        assert_eq!(fault.detail.as_deref(), Some("boom"));
    }

    #[test]
    fn test_decode_error_is_client_fault() {
        let d = dispatcher();
        let resp = post(&d, &envelope("<ns1:add><a>two</a><b>3</b></ns1:add>"));
        assert_eq!(resp.fault().unwrap().qualified_code(), "Client.TypeCoercion");
    }

    #[test]
    fn test_malformed_and_version_mismatch() {
        let d = dispatcher();
        let resp = post(&d, "<not-xml");
        assert_eq!(resp.fault().unwrap().qualified_code(), "Client.MalformedEnvelope");

        let soap12 = r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope"><env:Body/></env:Envelope>"#;
        let resp = post(&d, soap12);
        assert_eq!(resp.fault().unwrap().code, FaultCode::VersionMismatch);

        let resp = post(&d, &envelope(""));
        assert_eq!(resp.fault().unwrap().qualified_code(), "Client.MalformedEnvelope");
    }

    #[test]
    fn test_must_understand() {
        let xml = r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
  <SOAP-ENV:Header><t:Tx xmlns:t="urn:tx" SOAP-ENV:mustUnderstand="1">5</t:Tx></SOAP-ENV:Header>
  <SOAP-ENV:Body><ns1:add xmlns:ns1="urn:TestService"><a>1</a><b>1</b></ns1:add></SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#;
        let resp = post(&dispatcher(), xml);
        assert_eq!(resp.fault().unwrap().code, FaultCode::MustUnderstand);

        let lenient = dispatcher_with(SettingsConfig {
            reject_must_understand: false,
            ..SettingsConfig::default()
        });
        assert_eq!(post(&lenient, xml).status, 200);
    }

    #[test]
    fn test_body_too_large() {
        let d = dispatcher_with(SettingsConfig {
            max_body_size: 16,
            ..SettingsConfig::default()
        });
        let resp = post(&d, &envelope("<ns1:add><a>1</a><b>1</b></ns1:add>"));
        assert_eq!(resp.fault().unwrap().qualified_code(), "Client.RequestTooLarge");
    }

    #[test]
    fn test_soap_action_fallback() {
        let d = dispatcher();
        let xml = envelope("");
        let request = SoapRequest::post(xml.as_bytes(), "http://x/").with_soap_action("\"urn:TestService#reject\"");
        let resp = d.handle(&request);
        assert_eq!(resp.operation.as_deref(), Some("reject"));
    }

    #[test]
    fn test_wsdl_bypasses_pipeline() {
        let d = dispatcher();
        let resp = d.handle(&SoapRequest::wsdl("http://localhost:8080/soap"));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.outcome, Outcome::Wsdl);
        assert!(resp.body_text().contains(r#"<soap:address location="http://localhost:8080/soap"/>"#));
        assert_eq!(d.metrics().requests_processed, 0);
    }

    #[test]
    fn test_raw_service_entry_point() {
        let d = dispatcher();
        let out = d.service(envelope("<ns1:add><a>4</a><b>5</b></ns1:add>").as_bytes());
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(">9</return>"));
    }

    #[test]
    fn test_metrics() {
        let d = dispatcher();
        post(&d, &envelope("<ns1:add><a>1</a><b>1</b></ns1:add>"));
        post(&d, &envelope("<ns1:nope/>"));
        d.handle(&SoapRequest::wsdl("http://x/"));
        assert_eq!(
            d.metrics(),
            DispatchMetrics {
                requests_processed: 2,
                faults_returned: 1,
                wsdl_served: 1,
            }
        );
    }
}
