//! Value converters
//!
//! Converters turn a value of one of their source types into their return
//! type. Every execution context starts with the string converters from
//! [`default_converters`]; module transformers are added on top with their
//! priority weighting.

use crate::error::{OperationError, Result};
use crate::value::{DataType, Primitive, Value};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::trace;
use url::Url;

/// Priority given to built-in converters and to transformers that do not
/// declare a weighting
pub const DEFAULT_PRIORITY_WEIGHTING: i32 = 1;

/// Converts values between declared types
pub trait Converter: Send + Sync + fmt::Debug {
    /// Types this converter accepts
    fn source_types(&self) -> &[DataType];

    /// Type this converter produces
    fn return_type(&self) -> &DataType;

    /// Convert `value`
    fn convert(&self, value: &Value) -> Result<Value>;

    /// Whether this converter accepts values of `source`
    fn accepts(&self, source: &DataType) -> bool {
        self.source_types()
            .iter()
            .any(|t| t.is_assignable_from(source))
    }
}

/// Parses strings into a scalar, string, char or URL type
#[derive(Debug, Clone)]
pub struct StringConverter {
    source: [DataType; 1],
    target: DataType,
}

impl StringConverter {
    /// Create a converter from string to `target`
    pub fn new(target: DataType) -> Self {
        Self {
            source: [DataType::String],
            target,
        }
    }

    fn parse<T: std::str::FromStr>(&self, text: &str) -> Result<T>
    where
        T::Err: fmt::Display,
    {
        text.trim().parse::<T>().map_err(|e| {
            OperationError::conversion(format!("<{}> is not a valid {}: {}", text, self.target, e))
        })
    }
}

impl Converter for StringConverter {
    fn source_types(&self) -> &[DataType] {
        &self.source
    }

    fn return_type(&self) -> &DataType {
        &self.target
    }

    fn convert(&self, value: &Value) -> Result<Value> {
        let text = value.as_str().ok_or_else(|| {
            OperationError::conversion(format!("expected a string, got {}", value.type_name()))
        })?;

        let primitive = match &self.target {
            DataType::Primitive(p) | DataType::Boxed(p) => *p,
            DataType::String => return Ok(Value::String(text.to_string())),
            DataType::Url => {
                return Url::parse(text).map(Value::Url).map_err(|e| {
                    OperationError::conversion(format!("<{}> is not a valid url: {}", text, e))
                })
            }
            other => {
                return Err(OperationError::conversion(format!(
                    "no string conversion to {}",
                    other
                )))
            }
        };

        Ok(match primitive {
            Primitive::Boolean => Value::Boolean(self.parse(text)?),
            Primitive::Char => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Value::Char(c),
                    _ => {
                        return Err(OperationError::conversion(format!(
                            "<{}> is not a single character",
                            text
                        )))
                    }
                }
            }
            Primitive::Byte => Value::Byte(self.parse(text)?),
            Primitive::Short => Value::Short(self.parse(text)?),
            Primitive::Int => Value::Int(self.parse(text)?),
            Primitive::Long => Value::Long(self.parse(text)?),
            Primitive::Float => Value::Float(self.parse(text)?),
            Primitive::Double => Value::Double(self.parse(text)?),
        })
    }
}

/// Converters registered in every fresh execution context
pub fn default_converters() -> Vec<Arc<dyn Converter>> {
    let mut converters: Vec<Arc<dyn Converter>> = Primitive::ALL
        .into_iter()
        .map(|p| Arc::new(StringConverter::new(DataType::Boxed(p))) as Arc<dyn Converter>)
        .collect();
    converters.push(Arc::new(StringConverter::new(DataType::String)));
    converters.push(Arc::new(StringConverter::new(DataType::Url)));
    converters
}

struct Registration {
    priority: i32,
    converter: Arc<dyn Converter>,
}

/// Priority-ordered converter registry
#[derive(Default)]
pub struct ConverterRegistry {
    entries: RwLock<Vec<Registration>>,
}

impl ConverterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the default converters
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for converter in default_converters() {
            registry.register(converter, DEFAULT_PRIORITY_WEIGHTING);
        }
        registry
    }

    /// Register a converter with a priority weighting
    pub fn register(&self, converter: Arc<dyn Converter>, priority: i32) {
        trace!(
            return_type = %converter.return_type(),
            priority,
            "Registering converter"
        );
        self.entries.write().push(Registration {
            priority,
            converter,
        });
    }

    /// Find the converter from `source` to `target`
    ///
    /// The highest weighting wins; equal weightings keep the earliest
    /// registration.
    pub fn lookup(&self, source: &DataType, target: &DataType) -> Option<Arc<dyn Converter>> {
        let target = target.as_type();
        let entries = self.entries.read();
        let mut best: Option<&Registration> = None;

        for entry in entries.iter() {
            if entry.converter.return_type().as_type() != target
                || !entry.converter.accepts(source)
            {
                continue;
            }
            if best.map_or(true, |b| entry.priority > b.priority) {
                best = Some(entry);
            }
        }

        best.map(|b| b.converter.clone())
    }

    /// Number of registered converters
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if no converter is registered
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every registration
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("converters", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Shout {
        source: [DataType; 1],
        target: DataType,
    }

    impl Converter for Shout {
        fn source_types(&self) -> &[DataType] {
            &self.source
        }

        fn return_type(&self) -> &DataType {
            &self.target
        }

        fn convert(&self, value: &Value) -> Result<Value> {
            Ok(Value::from(value.to_string().to_uppercase()))
        }
    }

    #[test]
    fn test_string_to_scalars() {
        let int = StringConverter::new(DataType::Primitive(Primitive::Int));
        assert_eq!(int.convert(&Value::from("42")).unwrap(), Value::Int(42));
        assert!(int.convert(&Value::from("x")).is_err());
        assert!(int.convert(&Value::Int(1)).is_err());

        let flag = StringConverter::new(DataType::Boxed(Primitive::Boolean));
        assert_eq!(flag.convert(&Value::from("true")).unwrap(), Value::Boolean(true));

        let c = StringConverter::new(DataType::Boxed(Primitive::Char));
        assert_eq!(c.convert(&Value::from("z")).unwrap(), Value::Char('z'));
        assert!(c.convert(&Value::from("zz")).is_err());

        let url = StringConverter::new(DataType::Url);
        let value = url.convert(&Value::from("https://example.com/a")).unwrap();
        assert_eq!(value.as_url().map(|u| u.host_str()), Some(Some("example.com")));
    }

    #[test]
    fn test_lookup_bridges_primitive_targets() {
        let registry = ConverterRegistry::with_defaults();
        let converter = registry
            .lookup(&DataType::String, &DataType::Primitive(Primitive::Long))
            .unwrap();
        assert_eq!(converter.convert(&Value::from("7")).unwrap(), Value::Long(7));

        assert!(registry.lookup(&DataType::Map, &DataType::Boxed(Primitive::Long)).is_none());
        assert!(registry.lookup(&DataType::String, &DataType::List).is_none());
    }

    #[test]
    fn test_lookup_prefers_highest_weighting() {
        let registry = ConverterRegistry::with_defaults();
        registry.register(
            Arc::new(Shout {
                source: [DataType::Any],
                target: DataType::String,
            }),
            10,
        );

        let converter = registry.lookup(&DataType::String, &DataType::String).unwrap();
        assert_eq!(converter.convert(&Value::from("hi")).unwrap(), Value::from("HI"));
    }

    #[test]
    fn test_clear() {
        let registry = ConverterRegistry::with_defaults();
        assert!(!registry.is_empty());
        registry.clear();
        assert!(registry.is_empty());
    }
}
