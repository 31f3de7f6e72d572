//! SOAP message codec: Body XML to native values and back.
//!
//! Decoding checks values against the type registry, so type errors
//! surface while decoding rather than in the handler. Encoding produces
//! exactly the element shapes the WSDL declares for each part.

use crate::config::{CodecConfig, UnknownElementPolicy};
use crate::error::CodecError;
use crate::operation::{Operation, Part, Style, Use};
use crate::parser::{SoapEnvelope, XmlElement};
use crate::types::{
    ComplexKind, Compositor, Field, MaxOccurs, PrimitiveKind, ResolvedType, TypeName, TypeRegistry,
};
use crate::value::Value;
use crate::xml::{XmlWriter, SOAP_ENC_NS, SOAP_ENV_NS, XSD_NS, XSI_NS};
use std::collections::HashMap;

static ABSENT: Value = Value::Absent;

/// Element name of SOAP-encoded array members.
const ARRAY_ITEM: &str = "item";

/// Encodes and decodes messages for the operations of one service.
#[derive(Debug, Clone, Copy)]
pub struct MessageCodec<'a> {
    registry: &'a TypeRegistry,
    target_namespace: &'a str,
    options: &'a CodecConfig,
}

/// Which side of the exchange a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Request,
    Response,
}

struct DecodeContext<'x> {
    /// Multi-reference targets by `id`.
    ids: HashMap<&'x str, &'x XmlElement>,
}

impl<'a> MessageCodec<'a> {
    pub fn new(registry: &'a TypeRegistry, target_namespace: &'a str, options: &'a CodecConfig) -> Self {
        Self {
            registry,
            target_namespace,
            options,
        }
    }

    /// Decode request arguments in the order of `op.inputs`.
    pub fn decode_request(&self, op: &Operation, envelope: &SoapEnvelope) -> Result<Vec<Value>, CodecError> {
        self.decode_parts(op, &op.inputs, &envelope.body, Direction::Request)
    }

    /// Decode a response into the shape a handler returns: `Absent` for no
    /// outputs, the value itself for one, a struct keyed by part name otherwise.
    pub fn decode_response(&self, op: &Operation, envelope: &SoapEnvelope) -> Result<Value, CodecError> {
        let mut values = self.decode_parts(op, &op.outputs, &envelope.body, Direction::Response)?;
        Ok(match values.len() {
            0 => Value::Absent,
            1 => values.remove(0),
            _ => Value::Struct(
                op.outputs
                    .iter()
                    .map(|p| p.name.clone())
                    .zip(values)
                    .collect(),
            ),
        })
    }

    /// Encode a handler result as a response envelope.
    pub fn encode_response(&self, op: &Operation, result: &Value) -> Result<String, CodecError> {
        let values = split_result(op, result)?;
        self.encode_message(op, &op.outputs, &values, Direction::Response)
    }

    /// Encode call arguments as a request envelope.
    pub fn encode_request(&self, op: &Operation, args: &[Value]) -> Result<String, CodecError> {
        if args.len() != op.inputs.len() {
            return Err(CodecError::ResultShape {
                operation: op.name.clone(),
                reason: format!("expected {} arguments, got {}", op.inputs.len(), args.len()),
            });
        }
        let values: Vec<&Value> = args.iter().collect();
        self.encode_message(op, &op.inputs, &values, Direction::Request)
    }

    // ======================================================================
    // Decode
    // ======================================================================

    fn decode_parts(
        &self,
        op: &Operation,
        parts: &[Part],
        body: &[XmlElement],
        direction: Direction,
    ) -> Result<Vec<Value>, CodecError> {
        let mut ctx = DecodeContext { ids: HashMap::new() };
        for element in body {
            collect_ids(element, &mut ctx.ids);
        }

        match op.style() {
            Style::Rpc => {
                // An operation without parts may be selected by SOAPAction alone.
                if body.is_empty() && parts.is_empty() {
                    return Ok(Vec::new());
                }
                let wrapper = body
                    .first()
                    .ok_or_else(|| CodecError::MalformedEnvelope("Body is empty".to_string()))?;
                let expected = match direction {
                    Direction::Request => op.name.clone(),
                    Direction::Response => format!("{}Response", op.name),
                };
                if wrapper.local_name != expected {
                    return Err(CodecError::UnexpectedElement {
                        parent: "Body".to_string(),
                        element: wrapper.local_name.clone(),
                    });
                }

                if self.options.unknown_elements == UnknownElementPolicy::Reject {
                    if let Some(stray) = wrapper
                        .children
                        .iter()
                        .find(|c| !parts.iter().any(|p| p.name == c.local_name))
                    {
                        return Err(CodecError::UnexpectedElement {
                            parent: wrapper.local_name.clone(),
                            element: stray.local_name.clone(),
                        });
                    }
                }

                parts
                    .iter()
                    .map(|part| match wrapper.child(&part.name) {
                        Some(el) => self.decode_value(el, &part.type_name, &ctx, 1),
                        None => Err(CodecError::MissingRequiredField {
                            element: wrapper.local_name.clone(),
                            field: part.name.clone(),
                        }),
                    })
                    .collect()
            }
            Style::Document => {
                if self.options.unknown_elements == UnknownElementPolicy::Reject {
                    if let Some(stray) = body.get(parts.len()) {
                        return Err(CodecError::UnexpectedElement {
                            parent: "Body".to_string(),
                            element: stray.local_name.clone(),
                        });
                    }
                }

                parts
                    .iter()
                    .enumerate()
                    .map(|(i, part)| {
                        let el = body.get(i).ok_or_else(|| CodecError::MissingRequiredField {
                            element: "Body".to_string(),
                            field: part.element_name().to_string(),
                        })?;
                        if el.local_name != part.element_name() {
                            return Err(CodecError::UnexpectedElement {
                                parent: "Body".to_string(),
                                element: el.local_name.clone(),
                            });
                        }
                        self.decode_value(el, &part.type_name, &ctx, 1)
                    })
                    .collect()
            }
        }
    }

    fn decode_value<'x>(
        &self,
        el: &'x XmlElement,
        ty: &TypeName,
        ctx: &DecodeContext<'x>,
        depth: usize,
    ) -> Result<Value, CodecError> {
        if depth > self.options.max_depth {
            return Err(CodecError::DepthExceeded(self.options.max_depth));
        }

        if let Some(href) = unqualified_attribute(el, "href") {
            let id = href.strip_prefix('#').unwrap_or(href);
            let target = ctx
                .ids
                .get(id)
                .copied()
                .ok_or_else(|| CodecError::UnresolvedHref(href.to_string()))?;
            return self.decode_value(target, ty, ctx, depth + 1);
        }

        if el.is_nil() {
            return Ok(Value::Absent);
        }

        match self.resolve(ty)? {
            ResolvedType::Primitive(kind) => {
                if let Some(child) = el.children.first() {
                    return Err(CodecError::TypeCoercion {
                        element: el.local_name.clone(),
                        expected: ty.to_string(),
                        value: format!("<{}>", child.local_name),
                    });
                }
                parse_scalar(kind, &el.text, &el.local_name, ty)
            }
            ResolvedType::Complex(complex) => match &complex.kind {
                ComplexKind::Struct { compositor, fields } => {
                    self.decode_struct(el, fields, *compositor == Compositor::Sequence, ctx, depth)
                }
                // Item tag names carry no meaning; every child is a member.
                ComplexKind::Array { element_type } => el
                    .children
                    .iter()
                    .map(|item| self.decode_value(item, element_type, ctx, depth + 1))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List),
            },
        }
    }

    fn decode_struct<'x>(
        &self,
        el: &'x XmlElement,
        fields: &[Field],
        ordered: bool,
        ctx: &DecodeContext<'x>,
        depth: usize,
    ) -> Result<Value, CodecError> {
        let mut buckets: Vec<Vec<&XmlElement>> = vec![Vec::new(); fields.len()];
        let mut last = 0;

        for child in &el.children {
            let Some(idx) = fields.iter().position(|f| f.name == child.local_name) else {
                if self.options.unknown_elements == UnknownElementPolicy::Reject {
                    return Err(CodecError::UnexpectedElement {
                        parent: el.local_name.clone(),
                        element: child.local_name.clone(),
                    });
                }
                continue;
            };
            if ordered && idx < last {
                return Err(CodecError::OutOfOrder {
                    parent: el.local_name.clone(),
                    element: child.local_name.clone(),
                });
            }
            last = idx;
            buckets[idx].push(child);
        }

        let mut out = Vec::with_capacity(fields.len());
        for (field, bucket) in fields.iter().zip(buckets) {
            if !field.max_occurs.admits(bucket.len()) {
                return Err(CodecError::TooManyOccurrences {
                    parent: el.local_name.clone(),
                    element: field.name.clone(),
                    count: bucket.len(),
                    max: match field.max_occurs {
                        MaxOccurs::Bounded(n) => n,
                        MaxOccurs::Unbounded => u32::MAX,
                    },
                });
            }
            if bucket.len() < field.min_occurs as usize {
                return Err(CodecError::MissingRequiredField {
                    element: el.local_name.clone(),
                    field: field.name.clone(),
                });
            }

            let value = if field.is_repeated() {
                bucket
                    .iter()
                    .map(|child| self.decode_value(child, &field.type_name, ctx, depth + 1))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List)?
            } else {
                match bucket.first() {
                    Some(child) => self.decode_value(child, &field.type_name, ctx, depth + 1)?,
                    None => Value::Absent,
                }
            };
            out.push((field.name.clone(), value));
        }

        Ok(Value::Struct(out))
    }

    // ======================================================================
    // Encode
    // ======================================================================

    fn encode_message(
        &self,
        op: &Operation,
        parts: &[Part],
        values: &[&Value],
        direction: Direction,
    ) -> Result<String, CodecError> {
        let encoded = op.body_use() == Use::Encoded;
        let mut w = XmlWriter::new();
        w.declaration()?;

        let mut envelope_attrs = vec![
            ("xmlns:SOAP-ENV", SOAP_ENV_NS),
            ("xmlns:xsd", XSD_NS),
            ("xmlns:xsi", XSI_NS),
            ("xmlns:SOAP-ENC", SOAP_ENC_NS),
            ("xmlns:tns", self.target_namespace),
        ];
        if encoded {
            envelope_attrs.push(("SOAP-ENV:encodingStyle", SOAP_ENC_NS));
        }
        w.start("SOAP-ENV:Envelope", &envelope_attrs)?;
        w.start("SOAP-ENV:Body", &[])?;

        match op.style() {
            Style::Rpc => {
                let wrapper = match direction {
                    Direction::Request => format!("ns1:{}", op.name),
                    Direction::Response => format!("ns1:{}Response", op.name),
                };
                w.start(&wrapper, &[("xmlns:ns1", op.namespace.as_str())])?;
                for (part, value) in parts.iter().zip(values) {
                    self.write_value(&mut w, &part.name, &part.type_name, value, encoded)?;
                }
                w.end(&wrapper)?;
            }
            Style::Document => {
                for (part, value) in parts.iter().zip(values) {
                    let name = format!("tns:{}", part.element_name());
                    self.write_value(&mut w, &name, &part.type_name, value, encoded)?;
                }
            }
        }

        w.end("SOAP-ENV:Body")?;
        w.end("SOAP-ENV:Envelope")?;
        w.finish()
    }

    fn write_value(
        &self,
        w: &mut XmlWriter,
        name: &str,
        ty: &TypeName,
        value: &Value,
        encoded: bool,
    ) -> Result<(), CodecError> {
        if value.is_absent() {
            return w.empty(name, &[("xsi:nil", "true")]);
        }

        let xsi_type = ty.to_string();
        match self.resolve(ty)? {
            ResolvedType::Primitive(kind) => {
                let text = scalar_text(kind, value, name, ty)?;
                let mut attrs = Vec::new();
                if encoded {
                    attrs.push(("xsi:type", xsi_type.as_str()));
                }
                w.leaf(name, &attrs, &text)
            }
            ResolvedType::Complex(complex) => match &complex.kind {
                ComplexKind::Struct { fields, .. } => {
                    if value.as_struct().is_none() {
                        return Err(mismatch(name, ty));
                    }
                    let mut attrs = Vec::new();
                    if encoded {
                        attrs.push(("xsi:type", xsi_type.as_str()));
                    }
                    w.start(name, &attrs)?;
                    for field in fields {
                        let field_value = value.get(&field.name).unwrap_or(&ABSENT);
                        self.write_field(w, field, field_value, encoded)?;
                    }
                    w.end(name)
                }
                ComplexKind::Array { element_type } => {
                    let items = value.as_list().ok_or_else(|| mismatch(name, ty))?;
                    let array_type = format!("{}[{}]", element_type, items.len());
                    let mut attrs = Vec::new();
                    if encoded {
                        attrs.push(("xsi:type", "SOAP-ENC:Array"));
                        attrs.push(("SOAP-ENC:arrayType", array_type.as_str()));
                    }
                    if items.is_empty() {
                        return w.empty(name, &attrs);
                    }
                    w.start(name, &attrs)?;
                    for item in items {
                        self.write_value(w, ARRAY_ITEM, element_type, item, encoded)?;
                    }
                    w.end(name)
                }
            },
        }
    }

    fn write_field(&self, w: &mut XmlWriter, field: &Field, value: &Value, encoded: bool) -> Result<(), CodecError> {
        if field.is_repeated() {
            return match value {
                Value::List(items) => {
                    for item in items {
                        self.write_value(w, &field.name, &field.type_name, item, encoded)?;
                    }
                    Ok(())
                }
                Value::Absent if field.min_occurs == 0 => Ok(()),
                _ => Err(mismatch(&field.name, &field.type_name)),
            };
        }
        if value.is_absent() && field.min_occurs == 0 {
            return Ok(());
        }
        self.write_value(w, &field.name, &field.type_name, value, encoded)
    }

    fn resolve(&self, ty: &TypeName) -> Result<ResolvedType<'a>, CodecError> {
        self.registry
            .resolve(ty)
            .map_err(|_| CodecError::UnknownType(ty.to_string()))
    }
}

/// Spread a handler result over the operation's output parts.
fn split_result<'v>(op: &Operation, result: &'v Value) -> Result<Vec<&'v Value>, CodecError> {
    match op.outputs.len() {
        0 => Ok(Vec::new()),
        1 => Ok(vec![result]),
        _ => {
            if result.as_struct().is_none() {
                return Err(CodecError::ResultShape {
                    operation: op.name.clone(),
                    reason: format!(
                        "{} output parts need a struct keyed by part name, got {}",
                        op.outputs.len(),
                        result.kind_name()
                    ),
                });
            }
            Ok(op
                .outputs
                .iter()
                .map(|part| result.get(&part.name).unwrap_or(&ABSENT))
                .collect())
        }
    }
}

fn collect_ids<'x>(el: &'x XmlElement, ids: &mut HashMap<&'x str, &'x XmlElement>) {
    if let Some(id) = unqualified_attribute(el, "id") {
        ids.entry(id).or_insert(el);
    }
    for child in &el.children {
        collect_ids(child, ids);
    }
}

fn unqualified_attribute<'x>(el: &'x XmlElement, local_name: &str) -> Option<&'x str> {
    el.attributes
        .iter()
        .find(|a| a.local_name == local_name && a.namespace.is_none())
        .map(|a| a.value.as_str())
}

fn mismatch(element: &str, ty: &TypeName) -> CodecError {
    CodecError::ValueMismatch {
        element: element.to_string(),
        expected: ty.to_string(),
    }
}

fn coercion(element: &str, ty: &TypeName, text: &str) -> CodecError {
    CodecError::TypeCoercion {
        element: element.to_string(),
        expected: ty.to_string(),
        value: text.to_string(),
    }
}

/// Parse scalar text. Strings keep their whitespace; other lexicals are trimmed.
fn parse_scalar(kind: PrimitiveKind, text: &str, element: &str, ty: &TypeName) -> Result<Value, CodecError> {
    if kind.is_textual() {
        return Ok(Value::String(text.to_string()));
    }

    let t = text.trim();
    match kind {
        PrimitiveKind::Boolean => match t {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(coercion(element, ty, text)),
        },
        k if k.is_integer() => t
            .parse::<i64>()
            .ok()
            .filter(|&i| k.admits(i))
            .map(Value::Int)
            .ok_or_else(|| coercion(element, ty, text)),
        _ => match t {
            "INF" => Ok(Value::Float(f64::INFINITY)),
            "-INF" => Ok(Value::Float(f64::NEG_INFINITY)),
            "NaN" => Ok(Value::Float(f64::NAN)),
            _ if !t.is_empty()
                && t.chars()
                    .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')) =>
            {
                t.parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| coercion(element, ty, text))
            }
            _ => Err(coercion(element, ty, text)),
        },
    }
}

fn scalar_text(kind: PrimitiveKind, value: &Value, element: &str, ty: &TypeName) -> Result<String, CodecError> {
    let text = match (kind, value) {
        (k, Value::String(s)) if k.is_textual() => s.clone(),
        (PrimitiveKind::Boolean, Value::Bool(b)) => b.to_string(),
        (k, Value::Int(i)) if k.is_integer() && k.admits(*i) => i.to_string(),
        (k, Value::Int(i)) if k.is_floating() => i.to_string(),
        (k, Value::Float(f)) if k.is_floating() => format_float(*f),
        _ => return Err(mismatch(element, ty)),
    };
    Ok(text)
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f == f64::INFINITY {
        "INF".to_string()
    } else if f == f64::NEG_INFINITY {
        "-INF".to_string()
    } else {
        f.to_string()
    }
}
