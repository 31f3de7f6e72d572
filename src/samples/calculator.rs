//! CalculatorService: document/literal operations on wrapper types.

use super::float_field;
use crate::error::{ConfigError, Fault};
use crate::operation::{Operation, Style};
use crate::service::ServiceBuilder;
use crate::types::{ComplexType, Compositor, Field};
use crate::value::Value;

pub const NAMESPACE: &str = "urn:CalculatorService";

pub fn builder() -> Result<ServiceBuilder, ConfigError> {
    ServiceBuilder::new("CalculatorService", NAMESPACE)
        .style(Style::Document)
        .complex_type(
            ComplexType::structure("AddRequest", Compositor::Sequence)
                .field(Field::new("a", "xsd:float"))
                .field(Field::new("b", "xsd:float")),
        )?
        .complex_type(
            ComplexType::structure("AddResponse", Compositor::Sequence).field(Field::new("result", "xsd:float")),
        )?
        .complex_type(
            ComplexType::structure("DivideRequest", Compositor::Sequence)
                .field(Field::new("dividend", "xsd:float"))
                .field(Field::new("divisor", "xsd:float")),
        )?
        .complex_type(
            ComplexType::structure("DivideResponse", Compositor::Sequence)
                .field(Field::new("quotient", "xsd:float"))
                .field(Field::new("remainder", "xsd:float")),
        )?
        .complex_type(ComplexType::array("NumberArray", "xsd:float"))?
        .complex_type(
            ComplexType::structure("StatisticsRequest", Compositor::Sequence)
                .field(Field::new("numbers", "tns:NumberArray")),
        )?
        .complex_type(
            ComplexType::structure("StatisticsResponse", Compositor::Sequence)
                .field(Field::new("count", "xsd:int"))
                .field(Field::new("sum", "xsd:float"))
                .field(Field::new("average", "xsd:float"))
                .field(Field::new("min", "xsd:float"))
                .field(Field::new("max", "xsd:float")),
        )?
        .register(
            Operation::new("add")
                .document()
                .literal()
                .input("parameters", "tns:AddRequest")
                .output("parameters", "tns:AddResponse")
                .documentation("Adds two numbers together"),
            add,
        )?
        .register(
            Operation::new("divide")
                .document()
                .literal()
                .input("parameters", "tns:DivideRequest")
                .output("parameters", "tns:DivideResponse")
                .documentation("Divides two numbers and returns quotient and remainder"),
            divide,
        )?
        .register(
            Operation::new("calculateStatistics")
                .document()
                .literal()
                .input("parameters", "tns:StatisticsRequest")
                .output("parameters", "tns:StatisticsResponse")
                .documentation("Calculates statistics for a list of numbers"),
            calculate_statistics,
        )
}

fn params(args: &[Value]) -> &Value {
    static EMPTY: Value = Value::Struct(Vec::new());
    args.first().unwrap_or(&EMPTY)
}

fn add(args: Vec<Value>) -> Result<Value, Fault> {
    let p = params(&args);
    let result = float_field(p, "a") + float_field(p, "b");
    Ok(Value::structure([("result", Value::Float(result))]))
}

fn divide(args: Vec<Value>) -> Result<Value, Fault> {
    let p = params(&args);
    let dividend = float_field(p, "dividend");
    let divisor = float_field(p, "divisor");
    if divisor == 0.0 {
        return Err(Fault::client("Division by zero").with_detail("Cannot divide by zero"));
    }
    Ok(Value::structure([
        ("quotient", Value::Float((dividend / divisor).floor())),
        ("remainder", Value::Float(dividend % divisor)),
    ]))
}

fn calculate_statistics(args: Vec<Value>) -> Result<Value, Fault> {
    let numbers: Vec<f64> = params(&args)
        .get("numbers")
        .and_then(Value::as_list)
        .map(|items| items.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();
    if numbers.is_empty() {
        return Err(Fault::client("Empty input").with_detail("At least one number is required"));
    }

    let count = numbers.len();
    let sum: f64 = numbers.iter().sum();
    let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
    let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok(Value::structure([
        ("count", Value::Int(count as i64)),
        ("sum", Value::Float(sum)),
        ("average", Value::Float(sum / count as f64)),
        ("min", Value::Float(min)),
        ("max", Value::Float(max)),
    ]))
}
