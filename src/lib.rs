//! Server-side SOAP 1.1 / WSDL 1.1 toolkit.
//!
//! Describe a service as complex types plus operations, bind a handler to
//! each operation, and let the toolkit generate the WSDL, decode incoming
//! envelopes into native [`Value`]s, call the handler and encode the result
//! or a SOAP Fault.
//!
//! # Features
//!
//! - Type registry with struct (`all`/`sequence`) and SOAP-encoded array types
//! - Closure validation: unresolved and cyclic type references fail at build
//! - WSDL generation with rpc/encoded, rpc/literal and document/literal bindings
//! - Message codec for both styles, including `href` multi-references and `xsi:nil`
//! - Dispatcher mapping every failure to a `Client.*` or `Server.*` fault
//! - axum transport serving `POST` requests and `GET ?wsdl`
//!
//! # Example
//!
//! ```ignore
//! use soapkit::{Dispatcher, Operation, ServiceBuilder, Value};
//!
//! let service = ServiceBuilder::new("HelloService", "urn:HelloService")
//!     .register(
//!         Operation::new("sayHello").input("name", "xsd:string").output("return", "xsd:string"),
//!         |args: Vec<Value>| Ok(Value::from(format!("Hello, {}!", args[0].as_str().unwrap_or("")))),
//!     )?
//!     .build()?;
//!
//! let dispatcher = Dispatcher::new(service);
//! let response = dispatcher.service(request_body);
//! ```

pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod operation;
pub mod parser;
pub mod samples;
pub mod schema;
pub mod service;
pub mod transport;
pub mod types;
pub mod value;
pub mod wsdl;
mod xml;

pub use codec::MessageCodec;
pub use config::ServiceConfig;
pub use dispatcher::{Dispatcher, SoapRequest, SoapResponse};
pub use error::{CodecError, ConfigError, Fault, FaultCode};
pub use operation::{Operation, Style, Use};
pub use service::{Handler, Service, ServiceBuilder, ServiceDescription};
pub use types::{ComplexType, Compositor, Field, MaxOccurs, TypeName, TypeRegistry};
pub use value::Value;
