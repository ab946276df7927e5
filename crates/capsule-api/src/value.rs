//! Dynamic values and declared types
//!
//! Parameters, properties and operation results cross the host boundary as
//! [`Value`]s. Every declared slot carries a [`DataType`]; scalar slots come in
//! a primitive form (never null) and a boxed form (nullable). A value held in
//! a map is always boxed, so assignability compares types after mapping
//! primitives to their boxed counterparts.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

/// Scalar kinds that have both a primitive and a boxed form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    /// `true` / `false`
    Boolean,
    /// Single character
    Char,
    /// 8-bit signed integer
    Byte,
    /// 16-bit signed integer
    Short,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
}

impl Primitive {
    /// All primitive kinds
    pub const ALL: [Primitive; 8] = [
        Primitive::Boolean,
        Primitive::Char,
        Primitive::Byte,
        Primitive::Short,
        Primitive::Int,
        Primitive::Long,
        Primitive::Float,
        Primitive::Double,
    ];

    /// Textual name
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Char => "char",
            Primitive::Byte => "byte",
            Primitive::Short => "short",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Primitive::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// Declared type of a parameter, property or operation argument
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Non-nullable scalar
    Primitive(Primitive),
    /// Nullable scalar
    Boxed(Primitive),
    /// UTF-8 string
    String,
    /// Absolute URL
    Url,
    /// Ordered list of values
    List,
    /// String-keyed map of values
    Map,
    /// Host object identified by type name
    Object(String),
    /// Reserved type of the event-callback argument of source operations
    SourceCallback,
    /// Accepts any value
    Any,
}

/// Fixed primitive ↔ boxed bridge
const BRIDGE: [(DataType, DataType); 8] = [
    (DataType::Primitive(Primitive::Boolean), DataType::Boxed(Primitive::Boolean)),
    (DataType::Primitive(Primitive::Char), DataType::Boxed(Primitive::Char)),
    (DataType::Primitive(Primitive::Byte), DataType::Boxed(Primitive::Byte)),
    (DataType::Primitive(Primitive::Short), DataType::Boxed(Primitive::Short)),
    (DataType::Primitive(Primitive::Int), DataType::Boxed(Primitive::Int)),
    (DataType::Primitive(Primitive::Long), DataType::Boxed(Primitive::Long)),
    (DataType::Primitive(Primitive::Float), DataType::Boxed(Primitive::Float)),
    (DataType::Primitive(Primitive::Double), DataType::Boxed(Primitive::Double)),
];

impl DataType {
    /// Whether this is a non-nullable scalar
    pub fn is_primitive(&self) -> bool {
        matches!(self, DataType::Primitive(_))
    }

    /// Primitive counterpart of a boxed type
    pub fn to_primitive(&self) -> Option<DataType> {
        BRIDGE
            .iter()
            .find(|(_, boxed)| boxed == self)
            .map(|(primitive, _)| primitive.clone())
    }

    /// Boxed counterpart of a primitive type
    pub fn to_boxed(&self) -> Option<DataType> {
        BRIDGE
            .iter()
            .find(|(primitive, _)| primitive == self)
            .map(|(_, boxed)| boxed.clone())
    }

    /// Type used for assignability checks: primitives become boxed
    pub fn as_type(&self) -> DataType {
        self.to_boxed().unwrap_or_else(|| self.clone())
    }

    /// Whether a value of type `other` can be stored in a slot of this type
    pub fn is_assignable_from(&self, other: &DataType) -> bool {
        let expected = self.as_type();
        expected == DataType::Any || expected == other.as_type()
    }

    /// Whether `value` can be stored in a slot of this type
    pub fn accepts(&self, value: &Value) -> bool {
        match value {
            Value::Null => !self.is_primitive(),
            value => self.is_assignable_from(&value.data_type()),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Primitive(p) => write!(f, "{}", p.name()),
            DataType::Boxed(p) => write!(f, "{}?", p.name()),
            DataType::String => write!(f, "string"),
            DataType::Url => write!(f, "url"),
            DataType::List => write!(f, "list"),
            DataType::Map => write!(f, "map"),
            DataType::Object(name) => write!(f, "{}", name),
            DataType::SourceCallback => write!(f, "callback"),
            DataType::Any => write!(f, "any"),
        }
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty type name".to_string());
        }

        if let Some(name) = s.strip_suffix('?') {
            return Primitive::from_name(name)
                .map(DataType::Boxed)
                .ok_or_else(|| format!("<{name}> has no boxed form"));
        }

        if let Some(p) = Primitive::from_name(s) {
            return Ok(DataType::Primitive(p));
        }

        Ok(match s {
            "string" => DataType::String,
            "url" => DataType::Url,
            "list" => DataType::List,
            "map" => DataType::Map,
            "callback" => DataType::SourceCallback,
            "any" => DataType::Any,
            other => DataType::Object(other.to_string()),
        })
    }
}

/// Host object carried inside a [`Value`]
#[derive(Clone)]
pub struct OpaqueValue {
    type_name: String,
    inner: Arc<dyn Any + Send + Sync>,
}

impl OpaqueValue {
    /// Wrap a host object under the given type name
    pub fn new<T: Any + Send + Sync>(type_name: impl Into<String>, value: T) -> Self {
        Self {
            type_name: type_name.into(),
            inner: Arc::new(value),
        }
    }

    /// Declared type name
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Borrow the wrapped object as `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl PartialEq for OpaqueValue {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OpaqueValue").field(&self.type_name).finish()
    }
}

/// Dynamically typed value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value
    Null,
    /// Boolean
    Boolean(bool),
    /// Character
    Char(char),
    /// 8-bit integer
    Byte(i8),
    /// 16-bit integer
    Short(i16),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// String
    String(String),
    /// URL
    Url(Url),
    /// List
    List(Vec<Value>),
    /// Map
    Map(BTreeMap<String, Value>),
    /// Host object
    Object(OpaqueValue),
}

impl Value {
    /// Runtime type of this value; scalars report their boxed form
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Any,
            Value::Boolean(_) => DataType::Boxed(Primitive::Boolean),
            Value::Char(_) => DataType::Boxed(Primitive::Char),
            Value::Byte(_) => DataType::Boxed(Primitive::Byte),
            Value::Short(_) => DataType::Boxed(Primitive::Short),
            Value::Int(_) => DataType::Boxed(Primitive::Int),
            Value::Long(_) => DataType::Boxed(Primitive::Long),
            Value::Float(_) => DataType::Boxed(Primitive::Float),
            Value::Double(_) => DataType::Boxed(Primitive::Double),
            Value::String(_) => DataType::String,
            Value::Url(_) => DataType::Url,
            Value::List(_) => DataType::List,
            Value::Map(_) => DataType::Map,
            Value::Object(o) => DataType::Object(o.type_name().to_string()),
        }
    }

    /// Type name used in diagnostics
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            other => other.data_type().to_string(),
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Read as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Read any integer as `i64`
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(i64::from(*v)),
            Value::Short(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Read any number as `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Borrow as URL
    pub fn as_url(&self) -> Option<&Url> {
        match self {
            Value::Url(u) => Some(u),
            _ => None,
        }
    }

    /// Borrow as list
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow as map
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Url(v) => write!(f, "{v}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                write!(f, "}}")
            }
            Value::Object(o) => write!(f, "<{}>", o.type_name()),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from!(
    bool => Boolean,
    char => Char,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => String,
    Url => Url,
    Vec<Value> => List,
    BTreeMap<String, Value> => Map,
    OpaqueValue => Object,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
