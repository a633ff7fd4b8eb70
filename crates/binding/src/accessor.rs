//! Typed accessor dispatch
//!
//! Given resolved [`PropertyMetadata`] and a row handle, pick the narrowest
//! native accessor for the property's kind:
//!
//! | Kind                       | Non-nullable       | Nullable                    |
//! |----------------------------|--------------------|-----------------------------|
//! | int, bool, float, double   | `get_*` / `set_*`  | `get_nullable_*` + out-flag |
//! | timestamp                  | `get_timestamp`    | `get_nullable_timestamp`    |
//! | string, binary             | two-phase read     | two-phase read              |
//! | link                       | n/a                | `get_link` / `set_link`     |
//!
//! Link lists are not values; they are reached through their own handle.

use crate::handle::NativeHandle;
use crate::marshal;
use crate::metadata::PropertyMetadata;
use chrono::{DateTime, TimeZone, Utc};
use tether_core::{Error, Result, RowKey, Value, ValueKind};

fn timestamp(seconds: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| Error::corrupted(format!("timestamp {} is out of range", seconds)))
}

fn list_as_value(property: &PropertyMetadata) -> Error {
    Error::schema_mismatch(format!(
        "link list property '{}' has no scalar value",
        property.name
    ))
}

/// Read a property value from `row`.
///
/// `capacity` is the first-phase buffer size for strings and blobs.
pub fn get_value(row: &NativeHandle, property: &PropertyMetadata, capacity: usize) -> Result<Value> {
    let col = property.column.get();
    match (property.kind, property.nullable) {
        (ValueKind::Int, false) => row.call(|e, raw, err| e.get_int(raw, col, err)).map(Value::Int),
        (ValueKind::Int, true) => {
            let mut value = 0;
            let present = row.call(|e, raw, err| e.get_nullable_int(raw, col, &mut value, err))?;
            Ok(if present { Value::Int(value) } else { Value::Null })
        }
        (ValueKind::Bool, false) => row
            .call(|e, raw, err| e.get_bool(raw, col, err))
            .map(Value::Bool),
        (ValueKind::Bool, true) => {
            let mut value = false;
            let present = row.call(|e, raw, err| e.get_nullable_bool(raw, col, &mut value, err))?;
            Ok(if present { Value::Bool(value) } else { Value::Null })
        }
        (ValueKind::Float, false) => row
            .call(|e, raw, err| e.get_float(raw, col, err))
            .map(Value::Float),
        (ValueKind::Float, true) => {
            let mut value = 0.0;
            let present = row.call(|e, raw, err| e.get_nullable_float(raw, col, &mut value, err))?;
            Ok(if present { Value::Float(value) } else { Value::Null })
        }
        (ValueKind::Double, false) => row
            .call(|e, raw, err| e.get_double(raw, col, err))
            .map(Value::Double),
        (ValueKind::Double, true) => {
            let mut value = 0.0;
            let present =
                row.call(|e, raw, err| e.get_nullable_double(raw, col, &mut value, err))?;
            Ok(if present { Value::Double(value) } else { Value::Null })
        }
        (ValueKind::Timestamp, false) => {
            let seconds = row.call(|e, raw, err| e.get_timestamp(raw, col, err))?;
            timestamp(seconds).map(Value::Timestamp)
        }
        (ValueKind::Timestamp, true) => {
            let mut seconds = 0;
            let present =
                row.call(|e, raw, err| e.get_nullable_timestamp(raw, col, &mut seconds, err))?;
            if present {
                timestamp(seconds).map(Value::Timestamp)
            } else {
                Ok(Value::Null)
            }
        }
        (ValueKind::String, _) => {
            let value = row.with_raw(|e, raw| {
                marshal::read_string(capacity, |buf, is_null, err| {
                    e.get_string(raw, col, buf, is_null, err)
                })
            })?;
            Ok(value.map_or(Value::Null, Value::String))
        }
        (ValueKind::Binary, _) => {
            let value = row.with_raw(|e, raw| {
                marshal::read_variable_length(capacity, |buf, is_null, err| {
                    e.get_binary(raw, col, buf, is_null, err)
                })
            })?;
            Ok(value.map_or(Value::Null, Value::Binary))
        }
        (ValueKind::Link, _) => Ok(get_link(row, property)?.map_or(Value::Null, Value::Link)),
        (ValueKind::LinkList, _) => Err(list_as_value(property)),
    }
}

/// Write a property value to `row`.
///
/// # Errors
///
/// [`Error::SchemaMismatch`] if the value's kind differs from the property's
/// or null is written to a non-nullable property; native failures.
pub fn set_value(row: &NativeHandle, property: &PropertyMetadata, value: Value) -> Result<()> {
    let col = property.column.get();
    if property.kind == ValueKind::LinkList {
        return Err(list_as_value(property));
    }
    if value.is_null() {
        if !property.nullable {
            return Err(Error::schema_mismatch(format!(
                "property '{}' is not nullable",
                property.name
            )));
        }
        return row.call(|e, raw, err| e.set_null(raw, col, err));
    }
    if value.kind() != Some(property.kind) {
        return Err(Error::schema_mismatch(format!(
            "cannot store {} value in {} property '{}'",
            value.type_name(),
            property.kind,
            property.name
        )));
    }

    match value {
        Value::Int(v) => row.call(|e, raw, err| e.set_int(raw, col, v, err)),
        Value::Bool(v) => row.call(|e, raw, err| e.set_bool(raw, col, v, err)),
        Value::Float(v) => row.call(|e, raw, err| e.set_float(raw, col, v, err)),
        Value::Double(v) => row.call(|e, raw, err| e.set_double(raw, col, v, err)),
        Value::Timestamp(v) => {
            row.call(|e, raw, err| e.set_timestamp(raw, col, v.timestamp(), err))
        }
        Value::String(v) => row.call(|e, raw, err| e.set_string(raw, col, v.as_bytes(), err)),
        Value::Binary(v) => row.call(|e, raw, err| e.set_binary(raw, col, &v, err)),
        Value::Link(key) => set_link(row, property, Some(key)),
        Value::Null => Ok(()),
    }
}

/// Read the key a link property points at; `None` for a null link
pub fn get_link(row: &NativeHandle, property: &PropertyMetadata) -> Result<Option<RowKey>> {
    expect_kind(property, ValueKind::Link)?;
    let col = property.column.get();
    let mut key = 0;
    let present = row.call(|e, raw, err| e.get_link(raw, col, &mut key, err))?;
    Ok(present.then(|| RowKey::new(key)))
}

/// Point a link property at `target`, or clear it with `None`
pub fn set_link(row: &NativeHandle, property: &PropertyMetadata, target: Option<RowKey>) -> Result<()> {
    expect_kind(property, ValueKind::Link)?;
    let col = property.column.get();
    match target {
        Some(key) => row.call(|e, raw, err| e.set_link(raw, col, key.get(), err)),
        None => row.call(|e, raw, err| e.set_null(raw, col, err)),
    }
}

/// Check a property has the expected kind
pub fn expect_kind(property: &PropertyMetadata, expected: ValueKind) -> Result<()> {
    if property.kind != expected {
        return Err(Error::schema_mismatch(format!(
            "property '{}' is a {} property, not a {}",
            property.name, property.kind, expected
        )));
    }
    Ok(())
}
