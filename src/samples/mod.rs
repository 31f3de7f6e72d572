//! Ready-made services exercising every binding the toolkit supports.
//!
//! - [`hello`]: scalar rpc/encoded operations
//! - [`person`]: a struct, an array of structs and an in-memory store
//! - [`orders`]: nested structs, arrays inside structs, several output parts
//! - [`calculator`]: document/literal wrapper types

pub mod calculator;
pub mod hello;
pub mod orders;
pub mod person;

use crate::config::ServiceConfig;
use crate::error::{ConfigError, Fault};
use crate::service::{Service, ServiceBuilder};
use crate::value::Value;
use std::fmt;
use std::str::FromStr;

/// Selects one of the bundled services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleService {
    Hello,
    Person,
    Orders,
    Calculator,
}

impl SampleService {
    pub const ALL: [SampleService; 4] = [
        SampleService::Hello,
        SampleService::Person,
        SampleService::Orders,
        SampleService::Calculator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SampleService::Hello => "hello",
            SampleService::Person => "person",
            SampleService::Orders => "orders",
            SampleService::Calculator => "calculator",
        }
    }

    /// Builder with the sample's types, operations and handlers registered.
    pub fn builder(&self) -> Result<ServiceBuilder, ConfigError> {
        match self {
            SampleService::Hello => hello::builder(),
            SampleService::Person => person::builder(),
            SampleService::Orders => orders::builder(),
            SampleService::Calculator => calculator::builder(),
        }
    }
}

impl fmt::Display for SampleService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleService {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|sample| sample.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(SampleService::as_str).collect();
                format!("unknown sample '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

/// Build a sample with endpoint, codec and settings taken from `config`.
pub fn build(sample: SampleService, config: &ServiceConfig) -> Result<Service, ConfigError> {
    sample.builder()?.apply(config).build()
}

/// Positional argument, faulting when it was omitted or nil.
pub(crate) fn required<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a Value, Fault> {
    args.get(index)
        .filter(|v| !v.is_absent())
        .ok_or_else(|| Fault::client(format!("Missing argument '{}'", name)))
}

/// Struct field as text; absent fields read as empty.
pub(crate) fn text_field(value: &Value, name: &str) -> String {
    value
        .get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn int_field(value: &Value, name: &str) -> i64 {
    value.get(name).and_then(Value::as_i64).unwrap_or_default()
}

pub(crate) fn float_field(value: &Value, name: &str) -> f64 {
    value.get(name).and_then(Value::as_f64).unwrap_or_default()
}
