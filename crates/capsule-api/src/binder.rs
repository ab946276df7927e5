//! Convention-based property binding
//!
//! Reads try the accessor first and fall back to the field. Writes try the
//! setter typed to the value's runtime type, then the setter typed to its
//! primitive counterpart, then the field.

use crate::bindable::{getter_name, setter_name, Bindable};
use crate::error::{BindingError, OperationError};
use crate::value::Value;
use std::collections::BTreeMap;
use tracing::trace;

/// Named parameter values
pub type ParameterMap = BTreeMap<String, Value>;

/// Read `property` from `target`
pub fn get<T: Bindable + ?Sized>(target: &T, property: &str) -> Result<Value, BindingError> {
    if let Some(value) = target.invoke_getter(&getter_name(property)) {
        return Ok(value);
    }

    trace!(target_type = %target.type_name(), property, "No accessor, reading field");
    target.field(property).ok_or_else(|| {
        BindingError::get(property, target.type_name(), "no accessor or field")
    })
}

/// Write `value` to `property` on `target`
pub fn set<T: Bindable + ?Sized>(
    target: &mut T,
    property: &str,
    value: &Value,
) -> Result<(), BindingError> {
    let method = setter_name(property);
    let runtime_type = value.data_type();

    let mut outcome = target.invoke_setter(&method, &runtime_type, value);

    if outcome.is_none() {
        if let Some(primitive) = runtime_type.to_primitive() {
            trace!(
                target_type = %target.type_name(),
                method = %method,
                arg_type = %primitive,
                "Retrying setter with primitive argument"
            );
            outcome = target.invoke_setter(&method, &primitive, value);
        }
    }

    if outcome.is_none() {
        trace!(target_type = %target.type_name(), property, "No setter, writing field");
        outcome = target.set_field(property, value);
    }

    match outcome {
        Some(Ok(())) => Ok(()),
        Some(Err(OperationError::Binding(err))) => Err(err),
        Some(Err(err)) => Err(BindingError::set(property, target.type_name(), err)),
        None => Err(BindingError::set(
            property,
            target.type_name(),
            format!("no {method}({runtime_type}) setter or field"),
        )),
    }
}

/// Apply every entry of `parameters` to `target`, stopping at the first failure
pub fn set_all<T: Bindable + ?Sized>(
    target: &mut T,
    parameters: &ParameterMap,
) -> Result<(), BindingError> {
    for (property, value) in parameters {
        set(target, property, value)?;
    }
    Ok(())
}
