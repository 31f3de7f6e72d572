//! Type model: primitive kinds, complex types and the registry holding them.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Prefix bound to the XML Schema namespace in every document this crate writes.
pub const XSD_PREFIX: &str = "xsd";
/// Prefix bound to the service's target namespace.
pub const TNS_PREFIX: &str = "tns";

/// Qualified type reference such as `xsd:int` or `tns:Person`.
///
/// An unprefixed name refers to the target namespace; `xs:` is accepted
/// as an alias of `xsd:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TypeName {
    prefix: String,
    local: String,
}

impl TypeName {
    pub fn new(prefix: impl Into<String>, local: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = if prefix == "xs" {
            XSD_PREFIX.to_string()
        } else {
            prefix
        };
        Self {
            prefix,
            local: local.into(),
        }
    }

    pub fn xsd(local: impl Into<String>) -> Self {
        Self::new(XSD_PREFIX, local)
    }

    pub fn tns(local: impl Into<String>) -> Self {
        Self::new(TNS_PREFIX, local)
    }

    pub fn parse(s: &str) -> Self {
        match s.split_once(':') {
            Some((prefix, local)) => Self::new(prefix, local),
            None => Self::tns(s),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn local_name(&self) -> &str {
        &self.local
    }

    pub fn is_xsd(&self) -> bool {
        self.prefix == XSD_PREFIX
    }

    pub fn is_tns(&self) -> bool {
        self.prefix == TNS_PREFIX
    }

    pub fn primitive(&self) -> Option<PrimitiveKind> {
        if self.is_xsd() {
            PrimitiveKind::from_xsd_name(&self.local)
        } else {
            None
        }
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.prefix, self.local)
    }
}

impl From<&str> for TypeName {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for TypeName {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<TypeName> for String {
    fn from(name: TypeName) -> Self {
        name.to_string()
    }
}

/// Native scalar kinds behind the supported `xsd:` types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    String,
    Boolean,
    Int,
    Short,
    Long,
    Float,
    Double,
    Decimal,
    DateTime,
    Date,
    Time,
}

impl PrimitiveKind {
    pub fn from_xsd_name(name: &str) -> Option<Self> {
        let kind = match name {
            "string" | "normalizedString" | "token" | "anyURI" => Self::String,
            "boolean" => Self::Boolean,
            "int" => Self::Int,
            "short" => Self::Short,
            "long" | "integer" => Self::Long,
            "float" => Self::Float,
            "double" => Self::Double,
            "decimal" => Self::Decimal,
            "dateTime" => Self::DateTime,
            "date" => Self::Date,
            "time" => Self::Time,
            _ => return None,
        };
        Some(kind)
    }

    pub fn xsd_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Int => "int",
            Self::Short => "short",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Decimal => "decimal",
            Self::DateTime => "dateTime",
            Self::Date => "date",
            Self::Time => "time",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Int | Self::Short | Self::Long)
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, Self::Float | Self::Double | Self::Decimal)
    }

    /// Kinds carried as `Value::String`.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::String | Self::DateTime | Self::Date | Self::Time)
    }

    /// Whether an integer fits this kind's value space.
    pub fn admits(&self, value: i64) -> bool {
        match self {
            Self::Int => i32::try_from(value).is_ok(),
            Self::Short => i16::try_from(value).is_ok(),
            _ => true,
        }
    }
}

/// Group compositor of a struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compositor {
    /// Order-insensitive.
    #[default]
    All,
    /// Order-significant.
    Sequence,
}

impl Compositor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Sequence => "sequence",
        }
    }
}

/// Upper occurrence bound of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MaxOccursRepr", into = "MaxOccursRepr")]
pub enum MaxOccurs {
    Bounded(u32),
    Unbounded,
}

impl Default for MaxOccurs {
    fn default() -> Self {
        MaxOccurs::Bounded(1)
    }
}

impl MaxOccurs {
    pub fn admits(&self, count: usize) -> bool {
        match self {
            MaxOccurs::Bounded(max) => count <= *max as usize,
            MaxOccurs::Unbounded => true,
        }
    }
}

impl fmt::Display for MaxOccurs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxOccurs::Bounded(n) => write!(f, "{}", n),
            MaxOccurs::Unbounded => f.write_str("unbounded"),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum MaxOccursRepr {
    Number(u32),
    Text(String),
}

impl TryFrom<MaxOccursRepr> for MaxOccurs {
    type Error = String;

    fn try_from(repr: MaxOccursRepr) -> Result<Self, Self::Error> {
        match repr {
            MaxOccursRepr::Number(n) => Ok(MaxOccurs::Bounded(n)),
            MaxOccursRepr::Text(s) if s == "unbounded" => Ok(MaxOccurs::Unbounded),
            MaxOccursRepr::Text(s) => s
                .parse()
                .map(MaxOccurs::Bounded)
                .map_err(|_| format!("invalid maxOccurs '{}'", s)),
        }
    }
}

impl From<MaxOccurs> for MaxOccursRepr {
    fn from(max: MaxOccurs) -> Self {
        match max {
            MaxOccurs::Bounded(n) => MaxOccursRepr::Number(n),
            MaxOccurs::Unbounded => MaxOccursRepr::Text("unbounded".to_string()),
        }
    }
}

fn default_min_occurs() -> u32 {
    1
}

/// A struct member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: TypeName,
    #[serde(default = "default_min_occurs")]
    pub min_occurs: u32,
    #[serde(default)]
    pub max_occurs: MaxOccurs,
}

impl Field {
    pub fn new(name: impl Into<String>, type_name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            min_occurs: 1,
            max_occurs: MaxOccurs::Bounded(1),
        }
    }

    /// `minOccurs="0"`.
    pub fn optional(mut self) -> Self {
        self.min_occurs = 0;
        self
    }

    pub fn occurs(mut self, min: u32, max: MaxOccurs) -> Self {
        self.min_occurs = min;
        self.max_occurs = max;
        self
    }

    /// Whether the field maps to a `Value::List` of sibling elements.
    pub fn is_repeated(&self) -> bool {
        self.max_occurs != MaxOccurs::Bounded(1)
    }
}

/// Shape of a complex type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ComplexKind {
    Struct {
        #[serde(default)]
        compositor: Compositor,
        #[serde(default)]
        fields: Vec<Field>,
    },
    Array {
        element_type: TypeName,
    },
}

/// A user-defined type living in the target namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexType {
    pub name: String,
    #[serde(flatten)]
    pub kind: ComplexKind,
}

impl ComplexType {
    pub fn structure(name: impl Into<String>, compositor: Compositor) -> Self {
        Self {
            name: name.into(),
            kind: ComplexKind::Struct {
                compositor,
                fields: Vec::new(),
            },
        }
    }

    pub fn array(name: impl Into<String>, element_type: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            kind: ComplexKind::Array {
                element_type: element_type.into(),
            },
        }
    }

    /// Append a field. No effect on array types.
    pub fn field(mut self, field: Field) -> Self {
        if let ComplexKind::Struct { fields, .. } = &mut self.kind {
            fields.push(field);
        }
        self
    }

    pub fn type_name(&self) -> TypeName {
        TypeName::tns(self.name.clone())
    }

    /// `(member, referenced type)` pairs in declaration order.
    pub fn references(&self) -> Vec<(&str, &TypeName)> {
        match &self.kind {
            ComplexKind::Struct { fields, .. } => fields
                .iter()
                .map(|f| (f.name.as_str(), &f.type_name))
                .collect(),
            ComplexKind::Array { element_type } => vec![("arrayType", element_type)],
        }
    }
}

/// Result of resolving a [`TypeName`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolvedType<'a> {
    Primitive(PrimitiveKind),
    Complex(&'a ComplexType),
}

/// Complex types in registration order, looked up by name.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: Vec<ComplexType>,
    index: HashMap<String, usize>,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    Active,
    Done,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a complex type under its unique name.
    pub fn define(&mut self, ty: ComplexType) -> Result<(), ConfigError> {
        if !is_ncname(&ty.name) {
            return Err(ConfigError::InvalidName(format!("type name '{}'", ty.name)));
        }
        if let ComplexKind::Struct { fields, .. } = &ty.kind {
            let mut seen = HashSet::new();
            for field in fields {
                if !is_ncname(&field.name) {
                    return Err(ConfigError::InvalidName(format!(
                        "field name '{}' in type '{}'",
                        field.name, ty.name
                    )));
                }
                if !seen.insert(field.name.as_str()) {
                    return Err(ConfigError::DuplicateField {
                        owner: ty.name.clone(),
                        field: field.name.clone(),
                    });
                }
            }
        }
        if self.index.contains_key(&ty.name) {
            return Err(ConfigError::DuplicateType(ty.name));
        }
        self.index.insert(ty.name.clone(), self.types.len());
        self.types.push(ty);
        Ok(())
    }

    /// Resolve a reference to a primitive kind or a registered complex type.
    pub fn resolve(&self, name: &TypeName) -> Result<ResolvedType<'_>, ConfigError> {
        if let Some(kind) = name.primitive() {
            return Ok(ResolvedType::Primitive(kind));
        }
        if name.is_tns() {
            if let Some(ty) = self.get(name.local_name()) {
                return Ok(ResolvedType::Complex(ty));
            }
        }
        Err(ConfigError::UnknownType {
            type_name: name.to_string(),
            context: "type lookup".to_string(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&ComplexType> {
        self.index.get(name).map(|&i| &self.types[i])
    }

    pub fn contains(&self, name: &TypeName) -> bool {
        self.resolve(name).is_ok()
    }

    /// Complex types in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ComplexType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Check that every member reference resolves and that no type reaches
    /// itself. Called once at the end of configuration.
    pub fn validate_closure(&self) -> Result<(), ConfigError> {
        for ty in &self.types {
            for (member, reference) in ty.references() {
                if !self.contains(reference) {
                    return Err(ConfigError::UnresolvedReference {
                        owner: ty.name.clone(),
                        member: member.to_string(),
                        reference: reference.to_string(),
                    });
                }
            }
        }

        let mut marks = vec![Mark::Unvisited; self.types.len()];
        let mut path = Vec::new();
        for start in 0..self.types.len() {
            if marks[start] == Mark::Unvisited {
                if let Some(cycle) = self.find_cycle(start, &mut marks, &mut path) {
                    return Err(ConfigError::CyclicReference { cycle });
                }
            }
        }
        Ok(())
    }

    fn find_cycle(&self, idx: usize, marks: &mut [Mark], path: &mut Vec<usize>) -> Option<Vec<String>> {
        marks[idx] = Mark::Active;
        path.push(idx);

        for (_, reference) in self.types[idx].references() {
            if !reference.is_tns() {
                continue;
            }
            let Some(&next) = self.index.get(reference.local_name()) else {
                continue;
            };
            match marks[next] {
                Mark::Active => {
                    let pos = path.iter().position(|&p| p == next).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[pos..].iter().map(|&i| self.types[i].name.clone()).collect();
                    cycle.push(self.types[next].name.clone());
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    if let Some(cycle) = self.find_cycle(next, marks, path) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }

        path.pop();
        marks[idx] = Mark::Done;
        None
    }
}

/// XML NCName check, restricted to the characters a type or element name needs.
pub(crate) fn is_ncname(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
