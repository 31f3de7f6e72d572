//! HelloService: scalar rpc/encoded operations.

use super::required;
use crate::error::{ConfigError, Fault};
use crate::operation::Operation;
use crate::service::ServiceBuilder;
use crate::types::PrimitiveKind;
use crate::value::Value;
use chrono::{Local, SecondsFormat};

pub const NAMESPACE: &str = "urn:HelloService";

pub fn builder() -> Result<ServiceBuilder, ConfigError> {
    ServiceBuilder::new("HelloService", NAMESPACE)
        .register(
            Operation::new("sayHello")
                .rpc()
                .encoded()
                .input("name", "xsd:string")
                .output("return", "xsd:string")
                .documentation("Returns a greeting message for the given name"),
            say_hello,
        )?
        .register(
            Operation::new("addNumbers")
                .rpc()
                .encoded()
                .input("a", "xsd:int")
                .input("b", "xsd:int")
                .output("return", "xsd:int")
                .documentation("Adds two integers and returns the result"),
            add_numbers,
        )?
        .register(
            Operation::new("getServerTime")
                .rpc()
                .encoded()
                .output("return", "xsd:string")
                .documentation("Returns the current server timestamp"),
            get_server_time,
        )
}

fn say_hello(args: Vec<Value>) -> Result<Value, Fault> {
    let name = args.first().and_then(Value::as_str).unwrap_or_default();
    Ok(Value::String(format!("Hello, {}!", name)))
}

fn add_numbers(args: Vec<Value>) -> Result<Value, Fault> {
    let a = required(&args, 0, "a")?.as_i64().unwrap_or_default();
    let b = required(&args, 1, "b")?.as_i64().unwrap_or_default();
    a.checked_add(b)
        .filter(|sum| PrimitiveKind::Int.admits(*sum))
        .map(Value::Int)
        .ok_or_else(|| {
            Fault::client("Integer overflow").with_detail(format!("{} + {} does not fit in xsd:int", a, b))
        })
}

fn get_server_time(_args: Vec<Value>) -> Result<Value, Fault> {
    Ok(Value::String(Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_say_hello() {
        assert_eq!(
            say_hello(vec![Value::from("World")]).unwrap(),
            Value::from("Hello, World!")
        );
    }

    #[test]
    fn test_add_numbers() {
        assert_eq!(add_numbers(vec![Value::Int(2), Value::Int(40)]).unwrap(), Value::Int(42));

        let fault = add_numbers(vec![Value::Int(i32::MAX as i64), Value::Int(1)]).unwrap_err();
        assert!(fault.is_client());
        assert_eq!(fault.message, "Integer overflow");

        assert!(add_numbers(vec![Value::Int(1)]).is_err());
    }

    #[test]
    fn test_server_time_is_rfc3339() {
        let value = get_server_time(Vec::new()).unwrap();
        let text = value.as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(text).is_ok(), "{}", text);
    }
}
