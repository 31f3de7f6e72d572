//! Integration tests for the soapkit crate.
//!
//! These tests exercise the public API surface end-to-end: service
//! assembly, WSDL generation, the message codec and the dispatcher,
//! using the bundled sample services where possible.

use proptest::prelude::*;
use soapkit::config::{CodecConfig, ServiceConfig, UnknownElementPolicy};
use soapkit::dispatcher::{Outcome, CONTENT_TYPE};
use soapkit::parser::parse_soap_envelope;
use soapkit::samples::orders::OrderStore;
use soapkit::samples::person::{self, PersonStore};
use soapkit::samples::{self, SampleService};
use soapkit::schema::SchemaEmitter;
use soapkit::{
    ComplexType, Compositor, ConfigError, Dispatcher, Fault, FaultCode, Operation, ServiceBuilder,
    SoapRequest, SoapResponse, Value,
};
use std::sync::Arc;

const ENV_OPEN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
    xmlns:xsd="http://www.w3.org/2001/XMLSchema"
    xmlns:SOAP-ENC="http://schemas.xmlsoap.org/soap/encoding/">
  <SOAP-ENV:Body>"#;
const ENV_CLOSE: &str = "</SOAP-ENV:Body>\n</SOAP-ENV:Envelope>";

// ============================================================================
// Helpers
// ============================================================================

fn dispatcher(sample: SampleService) -> Dispatcher {
    Dispatcher::new(samples::build(sample, &ServiceConfig::default()).unwrap())
}

fn envelope(body: &str) -> String {
    format!("{}{}{}", ENV_OPEN, body, ENV_CLOSE)
}

fn post(d: &Dispatcher, body: &str) -> SoapResponse {
    let xml = envelope(body);
    d.handle(&SoapRequest::post(xml.as_bytes(), "http://localhost/soap"))
}

/// Feed a response back through the service's own codec.
fn decode(d: &Dispatcher, operation: &str, response: &SoapResponse) -> Value {
    let service = d.inner();
    let op = service.description().operation(operation).unwrap();
    let envelope = parse_soap_envelope(&response.body, 64).unwrap();
    service.codec().decode_response(op, &envelope).unwrap()
}

fn john() -> Value {
    Value::structure([
        ("id", Value::Int(1)),
        ("firstName", Value::from("John")),
        ("lastName", Value::from("Doe")),
        ("email", Value::from("john@example.com")),
        ("age", Value::Int(30)),
    ])
}

// ============================================================================
// Configuration errors are caught at build time
// ============================================================================

#[test]
fn test_duplicate_type_rejected() {
    let err = ServiceBuilder::new("S", "urn:s")
        .complex_type(ComplexType::structure("A", Compositor::All))
        .unwrap()
        .complex_type(ComplexType::structure("A", Compositor::All))
        .err()
        .unwrap();
    assert!(matches!(err, ConfigError::DuplicateType(name) if name == "A"));
}

#[test]
fn test_unresolved_reference_names_field() {
    let err = ServiceBuilder::new("S", "urn:s")
        .complex_type(
            ComplexType::structure("Order", Compositor::All)
                .field(soapkit::Field::new("customer", "tns:Customer")),
        )
        .unwrap()
        .build()
        .unwrap_err();
    match err {
        ConfigError::UnresolvedReference { owner, member, reference } => {
            assert_eq!(owner, "Order");
            assert_eq!(member, "customer");
            assert_eq!(reference, "tns:Customer");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_cyclic_reference_names_cycle() {
    let err = ServiceBuilder::new("S", "urn:s")
        .complex_type(ComplexType::structure("A", Compositor::All).field(soapkit::Field::new("b", "tns:B")))
        .unwrap()
        .complex_type(ComplexType::structure("B", Compositor::All).field(soapkit::Field::new("a", "tns:A")))
        .unwrap()
        .build()
        .unwrap_err();
    match err {
        ConfigError::CyclicReference { cycle } => {
            assert!(cycle.contains(&"A".to_string()));
            assert!(cycle.contains(&"B".to_string()));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_duplicate_operation_rejected() {
    let handler = |_args: Vec<Value>| -> Result<Value, Fault> { Ok(Value::Absent) };
    let err = ServiceBuilder::new("S", "urn:s")
        .register(Operation::new("ping"), handler)
        .unwrap()
        .register(Operation::new("ping"), handler)
        .err()
        .unwrap();
    assert!(matches!(err, ConfigError::DuplicateOperation(name) if name == "ping"));
}

#[test]
fn test_document_encoded_rejected() {
    let err = ServiceBuilder::new("S", "urn:s")
        .register(
            Operation::new("ping").document().encoded(),
            |_args: Vec<Value>| -> Result<Value, Fault> { Ok(Value::Absent) },
        )
        .unwrap()
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedBinding { .. }));
}

// ============================================================================
// Schema and WSDL determinism
// ============================================================================

#[test]
fn test_schema_and_wsdl_are_deterministic() {
    for sample in SampleService::ALL {
        let d = dispatcher(sample);
        let desc = d.description();
        let emitter = SchemaEmitter::new(&desc.types, &desc.target_namespace).with_elements(desc.elements());
        assert_eq!(emitter.emit().unwrap(), emitter.emit().unwrap(), "{sample}");
        assert_eq!(
            desc.wsdl("http://localhost/").unwrap(),
            desc.wsdl("http://localhost/").unwrap(),
            "{sample}"
        );
    }
}

#[test]
fn test_schema_declares_types_in_registration_order() {
    let d = dispatcher(SampleService::Orders);
    let desc = d.description();
    let schema = SchemaEmitter::new(&desc.types, &desc.target_namespace).emit().unwrap();

    let order: Vec<usize> = ["Address", "Customer", "OrderItem", "OrderItemArray", "Order", "OrderArray"]
        .iter()
        .map(|name| schema.find(&format!(r#"<xsd:complexType name="{}">"#, name)).unwrap())
        .collect();
    let mut sorted = order.clone();
    sorted.sort_unstable();
    assert_eq!(order, sorted);
    assert!(schema.contains(r#"wsdl:arrayType="tns:OrderItem[]""#));
    assert!(schema.contains(r#"<xsd:element name="totalPrice" type="xsd:float" minOccurs="0"/>"#));
}

#[test]
fn test_wsdl_endpoint_from_config() {
    let config = ServiceConfig::from_yaml(
        r#"
service:
  endpoint: "https://soap.example.com/hello"
"#,
    )
    .unwrap();
    let d = Dispatcher::new(samples::build(SampleService::Hello, &config).unwrap());
    let resp = d.handle(&SoapRequest::wsdl("http://ignored/"));
    assert_eq!(resp.outcome, Outcome::Wsdl);
    assert!(resp
        .body_text()
        .contains(r#"<soap:address location="https://soap.example.com/hello"/>"#));
}

// ============================================================================
// Encoded round-trips
// ============================================================================

#[test]
fn test_encoded_roundtrip_nested_order() {
    let d = dispatcher(SampleService::Orders);
    let service = d.inner();
    let op = service.description().operation("getOrder").unwrap();
    let order = OrderStore::seeded().order(1001).unwrap().to_value();

    let xml = service.codec().encode_response(op, &order).unwrap();
    assert!(xml.contains(r#"SOAP-ENC:arrayType="tns:OrderItem[2]""#));

    let envelope = parse_soap_envelope(xml.as_bytes(), 64).unwrap();
    assert_eq!(service.codec().decode_response(op, &envelope).unwrap(), order);
}

#[test]
fn test_array_roundtrip_lengths() {
    let d = dispatcher(SampleService::Person);
    let service = d.inner();
    let op = service.description().operation("getAllPersons").unwrap();
    let persons = PersonStore::seeded().all();

    for n in [0, 1, 3] {
        let list = Value::list(persons.iter().take(n).map(person::Person::to_value));
        let xml = service.codec().encode_response(op, &list).unwrap();
        let envelope = parse_soap_envelope(xml.as_bytes(), 64).unwrap();
        let decoded = service.codec().decode_response(op, &envelope).unwrap();
        assert_eq!(decoded.as_list().map(<[Value]>::len), Some(n));
        assert_eq!(decoded, list);
    }
}

#[test]
fn test_literal_element_names_match_wsdl() {
    let d = dispatcher(SampleService::Calculator);
    let desc = d.description();
    let wsdl = desc.wsdl("http://localhost/").unwrap();

    for op in desc.operations.iter() {
        for part in &op.outputs {
            let name = part.element_name();
            assert!(wsdl.contains(&format!(r#"<xsd:element name="{}" type="{}"/>"#, name, part.type_name)));
            assert!(wsdl.contains(&format!(r#"<part name="{}" element="tns:{}"/>"#, part.name, name)));
        }
    }

    let resp = post(
        &d,
        r#"<tns:AddRequest xmlns:tns="urn:CalculatorService"><a>1</a><b>1</b></tns:AddRequest>"#,
    );
    let envelope = parse_soap_envelope(&resp.body, 64).unwrap();
    let body_names: Vec<&str> = envelope.body.iter().map(|e| e.local_name.as_str()).collect();
    assert_eq!(body_names, vec!["AddResponse"]);
}

// ============================================================================
// End-to-end dispatch
// ============================================================================

#[test]
fn test_get_person_end_to_end() {
    let d = dispatcher(SampleService::Person);
    let resp = post(
        &d,
        r#"<ns1:getPerson xmlns:ns1="urn:PersonService"><id xsi:type="xsd:int">1</id></ns1:getPerson>"#,
    );
    assert_eq!(resp.status, 200);
    assert_eq!(resp.content_type, CONTENT_TYPE);
    assert_eq!(resp.operation.as_deref(), Some("getPerson"));
    assert_eq!(decode(&d, "getPerson", &resp), john());
}

#[test]
fn test_document_add_end_to_end() {
    let d = dispatcher(SampleService::Calculator);
    let resp = post(
        &d,
        r#"<tns:AddRequest xmlns:tns="urn:CalculatorService"><a>2.0</a><b>3.0</b></tns:AddRequest>"#,
    );
    assert_eq!(resp.status, 200);
    assert_eq!(
        decode(&d, "add", &resp),
        Value::structure([("result", Value::Float(5.0))])
    );
}

#[test]
fn test_divide_by_zero_faults_without_result() {
    let d = dispatcher(SampleService::Calculator);
    let resp = post(
        &d,
        r#"<tns:DivideRequest xmlns:tns="urn:CalculatorService"><dividend>10</dividend><divisor>0</divisor></tns:DivideRequest>"#,
    );
    assert_eq!(resp.status, 500);
    let fault = resp.fault().unwrap();
    assert_eq!(fault.code, FaultCode::Client);
    assert!(fault.message.contains("Division by zero"));

    let body = resp.body_text();
    assert!(!body.contains("quotient"));
    assert!(!body.contains("remainder"));
    assert!(!body.contains("DivideResponse"));

    let envelope = parse_soap_envelope(&resp.body, 64).unwrap();
    assert_eq!(envelope.fault().as_ref(), Some(fault));
}

#[test]
fn test_unknown_operation_is_client_fault() {
    let d = dispatcher(SampleService::Hello);
    let resp = post(&d, r#"<ns1:sayGoodbye xmlns:ns1="urn:HelloService"/>"#);
    let fault = resp.fault().unwrap();
    assert_eq!(fault.code, FaultCode::Client);
    assert_eq!(fault.qualified_code(), "Client.UnknownOperation");
    assert!(resp.body_text().contains("<faultcode>SOAP-ENV:Client.UnknownOperation</faultcode>"));
}

#[test]
fn test_handler_fault_passed_through_exactly() {
    let d = dispatcher(SampleService::Person);
    let resp = post(
        &d,
        r#"<ns1:getPerson xmlns:ns1="urn:PersonService"><id>99</id></ns1:getPerson>"#,
    );
    assert_eq!(
        resp.fault(),
        Some(&Fault::client("Person not found").with_detail("No person exists with ID: 99"))
    );
    assert!(!resp.body_text().contains("getPersonResponse"));
}

#[test]
fn test_multiple_output_parts() {
    let d = dispatcher(SampleService::Orders);
    let resp = post(
        &d,
        r#"<ns1:calculateOrderTotal xmlns:ns1="urn:OrderService">
      <items xsi:type="SOAP-ENC:Array" SOAP-ENC:arrayType="tns:OrderItem[2]">
        <item><productId>1</productId><productName>A</productName><quantity>2</quantity><unitPrice>50</unitPrice></item>
        <item><productId>2</productId><productName>B</productName><quantity>1</quantity><unitPrice>100</unitPrice></item>
      </items>
    </ns1:calculateOrderTotal>"#,
    );
    assert_eq!(resp.status, 200, "{}", resp.body_text());

    let totals = decode(&d, "calculateOrderTotal", &resp);
    assert_eq!(totals.get("subtotal"), Some(&Value::Float(200.0)));
    let tax = totals.get("tax").and_then(Value::as_f64).unwrap();
    let total = totals.get("total").and_then(Value::as_f64).unwrap();
    assert!((tax - 16.0).abs() < 1e-6);
    assert!((total - 216.0).abs() < 1e-6);
}

#[test]
fn test_create_order_and_read_back() {
    let store = Arc::new(OrderStore::seeded());
    let service = samples::orders::builder_with(Arc::clone(&store)).unwrap().build().unwrap();
    let d = Dispatcher::new(service);

    let resp = post(
        &d,
        r#"<ns1:createOrder xmlns:ns1="urn:OrderService">
      <customerId>1</customerId>
      <items><item><productId>7</productId><productName>Gadget</productName><quantity>4</quantity><unitPrice>2.5</unitPrice></item></items>
    </ns1:createOrder>"#,
    );
    let order = decode(&d, "createOrder", &resp);
    assert_eq!(order.get("orderId"), Some(&Value::Int(1002)));
    assert_eq!(order.get("status"), Some(&Value::from("pending")));
    assert_eq!(store.customer_orders(1).len(), 2);

    let resp = post(
        &d,
        r#"<ns1:createOrder xmlns:ns1="urn:OrderService"><customerId>5</customerId><items/></ns1:createOrder>"#,
    );
    assert_eq!(resp.fault().unwrap().message, "Customer not found");
}

#[test]
fn test_href_multiref_request() {
    let store = Arc::new(PersonStore::seeded());
    let d = Dispatcher::new(person::builder_with(Arc::clone(&store)).unwrap().build().unwrap());

    let resp = post(
        &d,
        r##"<ns1:createPerson xmlns:ns1="urn:PersonService"><person href="#p1"/></ns1:createPerson>
    <multiRef id="p1" xsi:type="ns1:Person" xmlns:ns1="urn:PersonService">
      <id>0</id><firstName>Ada</firstName><lastName>Lovelace</lastName><email>ada@example.com</email><age>36</age>
    </multiRef>"##,
    );
    assert_eq!(decode(&d, "createPerson", &resp), Value::Int(4));
    assert_eq!(store.get(4).unwrap().last_name, "Lovelace");
}

#[test]
fn test_search_persons() {
    let d = dispatcher(SampleService::Person);
    let resp = post(
        &d,
        r#"<ns1:searchPersons xmlns:ns1="urn:PersonService"><searchTerm>SMI</searchTerm></ns1:searchPersons>"#,
    );
    let found = decode(&d, "searchPersons", &resp);
    let names: Vec<&str> = found
        .as_list()
        .unwrap()
        .iter()
        .filter_map(|p| p.get("lastName").and_then(Value::as_str))
        .collect();
    assert_eq!(names, vec!["Smith"]);
}

#[test]
fn test_soap_action_routes_empty_body() {
    let d = dispatcher(SampleService::Hello);
    let xml = envelope("");
    let request = SoapRequest::post(xml.as_bytes(), "http://localhost/soap")
        .with_soap_action("\"urn:HelloService#getServerTime\"");
    let resp = d.handle(&request);
    assert_eq!(resp.status, 200, "{}", resp.body_text());
    assert_eq!(resp.operation.as_deref(), Some("getServerTime"));
}

#[test]
fn test_strict_unknown_elements() {
    let config = ServiceConfig {
        codec: CodecConfig {
            unknown_elements: UnknownElementPolicy::Reject,
            ..CodecConfig::default()
        },
        ..ServiceConfig::default()
    };
    let strict = Dispatcher::new(samples::build(SampleService::Hello, &config).unwrap());
    let body = r#"<ns1:sayHello xmlns:ns1="urn:HelloService"><name>A</name><extra>1</extra></ns1:sayHello>"#;

    assert_eq!(
        post(&strict, body).fault().unwrap().qualified_code(),
        "Client.UnexpectedElement"
    );
    assert_eq!(post(&dispatcher(SampleService::Hello), body).status, 200);
}

#[test]
fn test_doctype_rejected() {
    let d = dispatcher(SampleService::Hello);
    let xml = r#"<?xml version="1.0"?>
<!DOCTYPE foo [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
  <SOAP-ENV:Body><ns1:sayHello xmlns:ns1="urn:HelloService"><name>&xxe;</name></ns1:sayHello></SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#;
    let resp = d.handle(&SoapRequest::post(xml.as_bytes(), "http://localhost/"));
    assert_eq!(resp.fault().unwrap().qualified_code(), "Client.MalformedEnvelope");
}

// ============================================================================
// Declarative configuration
// ============================================================================

#[test]
fn test_service_from_yaml() {
    let config = ServiceConfig::from_yaml(
        r#"
version: "1"
service:
  name: InventoryService
  namespace: urn:Inventory
types:
  - name: Item
    kind: struct
    compositor: sequence
    fields:
      - name: sku
        type: xsd:string
      - name: tags
        type: xsd:string
        min_occurs: 0
        max_occurs: unbounded
operations:
  - name: getItem
    inputs:
      - name: sku
        type: xsd:string
    outputs:
      - name: return
        type: tns:Item
"#,
    )
    .unwrap();

    let service = ServiceBuilder::from_config(&config)
        .unwrap()
        .handler("getItem", |args: Vec<Value>| -> Result<Value, Fault> {
            let sku = args[0].as_str().unwrap_or_default().to_string();
            Ok(Value::structure([
                ("sku", Value::String(sku)),
                ("tags", Value::list([Value::from("red"), Value::from("large")])),
            ]))
        })
        .build()
        .unwrap();
    let d = Dispatcher::new(service);

    let resp = post(
        &d,
        r#"<ns1:getItem xmlns:ns1="urn:Inventory"><sku>X-1</sku></ns1:getItem>"#,
    );
    let body = resp.body_text();
    assert_eq!(body.matches("<tags").count(), 2, "{body}");

    let item = decode(&d, "getItem", &resp);
    assert_eq!(item.get("sku"), Some(&Value::from("X-1")));
    assert_eq!(
        item.get("tags"),
        Some(&Value::list([Value::from("red"), Value::from("large")]))
    );
}

#[test]
fn test_yaml_duplicate_field_rejected() {
    let config = ServiceConfig::from_yaml(
        r#"
version: "1"
service:
  name: InventoryService
  namespace: urn:Inventory
types:
  - name: Item
    kind: struct
    compositor: sequence
    fields:
      - name: sku
        type: xsd:string
      - name: sku
        type: xsd:int
"#,
    )
    .unwrap();

    assert!(matches!(
        ServiceBuilder::from_config(&config),
        Err(ConfigError::DuplicateField { owner, field }) if owner == "Item" && field == "sku"
    ));
}

#[test]
fn test_yaml_invalid_field_name_rejected() {
    let config = ServiceConfig::from_yaml(
        r#"
version: "1"
service:
  name: InventoryService
  namespace: urn:Inventory
types:
  - name: Item
    kind: struct
    compositor: all
    fields:
      - name: "bad name<"
        type: xsd:int
"#,
    )
    .unwrap();

    assert!(matches!(
        ServiceBuilder::from_config(&config),
        Err(ConfigError::InvalidName(msg)) if msg.contains("bad name<")
    ));
}

// ============================================================================
// Text escaping survives the codec
// ============================================================================

proptest! {
    #[test]
    fn prop_string_escaping_roundtrip(text in "[ -~éü€]{0,40}") {
        let d = dispatcher(SampleService::Hello);
        let service = d.inner();
        let op = service.description().operation("sayHello").unwrap();
        let value = Value::String(text);

        let xml = service.codec().encode_response(op, &value).unwrap();
        let envelope = parse_soap_envelope(xml.as_bytes(), 64).unwrap();
        prop_assert_eq!(service.codec().decode_response(op, &envelope).unwrap(), value);
    }
}
