//! Property access contract
//!
//! Objects loaded by the host never expose their concrete type. Instead they
//! implement [`Bindable`], which answers two kinds of lookups:
//!
//! - **methods**, addressed by the accessor/setter naming convention
//!   (`api_key` / `set_api_key` for property `apiKey`), where setters are
//!   resolved by their argument type;
//! - **fields**, addressed by the property name itself.
//!
//! Every lookup returns `None` when the member does not exist, which lets the
//! binder fall back to the next strategy.

use crate::error::{BindingError, Result};
use crate::value::{DataType, Value};

/// Named property access on an opaque object
pub trait Bindable: Send + Sync {
    /// Type name used in diagnostics
    fn type_name(&self) -> &str;

    /// Call the accessor named `method`
    fn invoke_getter(&self, _method: &str) -> Option<Value> {
        None
    }

    /// Call the setter named `method` whose argument is declared as `arg_type`
    fn invoke_setter(
        &mut self,
        _method: &str,
        _arg_type: &DataType,
        _value: &Value,
    ) -> Option<Result<()>> {
        None
    }

    /// Read a field
    fn field(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Write a field
    fn set_field(&mut self, _name: &str, _value: &Value) -> Option<Result<()>> {
        None
    }
}

/// Accessor name for a property (`apiKey` → `api_key`)
pub fn getter_name(property: &str) -> String {
    snake_case(property)
}

/// Setter name for a property (`apiKey` → `set_api_key`)
pub fn setter_name(property: &str) -> String {
    format!("set_{}", snake_case(property))
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c == '-' {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

/// Typed field storage for [`Bindable`] implementors
///
/// Fields keep their declaration order, which generated adapters rely on for
/// parameter shadow fields.
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    fields: Vec<(String, DataType, Value)>,
}

impl FieldSet {
    /// Create an empty field set
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field with its initial value
    pub fn declare(mut self, name: impl Into<String>, data_type: DataType, initial: Value) -> Self {
        self.fields.push((name.into(), data_type, initial));
        self
    }

    /// Read a field
    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, _, v)| v.clone())
    }

    /// Write a field, enforcing its declared type
    ///
    /// Returns `None` if no such field is declared.
    pub fn set(&mut self, owner: &str, name: &str, value: &Value) -> Option<Result<()>> {
        let (_, data_type, slot) = self.fields.iter_mut().find(|(n, _, _)| n == name)?;
        if !data_type.accepts(value) {
            return Some(Err(BindingError::set(
                name,
                owner,
                format!("{} is not assignable to {}", value.type_name(), data_type),
            )
            .into()));
        }
        *slot = value.clone();
        Some(Ok(()))
    }

    /// Declared type of a field
    pub fn data_type(&self, name: &str) -> Option<&DataType> {
        self.fields
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, t, _)| t)
    }

    /// Field names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _, _)| n.as_str())
    }
}
