//! Value-kind tags and the type-indexed kind table
//!
//! A [`ValueKind`] is the native column storage category. The tag values are
//! the engine's column type codes and are stable across the boundary.
//!
//! Language-level property types are mapped to kinds through a table keyed by
//! `TypeId`, built once on first use. There is no runtime introspection: a type
//! that is not in the table is rejected with [`Error::UnsupportedType`].

use crate::error::{Error, Result};
use crate::value::Value;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::any::{type_name, TypeId};
use std::fmt;

/// Native column storage kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueKind {
    /// 64-bit integer
    Int = 0,
    /// Boolean
    Bool = 1,
    /// UTF-8 string
    String = 2,
    /// Binary blob
    Binary = 4,
    /// Timestamp (seconds since epoch)
    Timestamp = 7,
    /// 32-bit float
    Float = 9,
    /// 64-bit float
    Double = 10,
    /// Single link to a row of another table
    Link = 12,
    /// Ordered list of links
    LinkList = 13,
}

impl ValueKind {
    /// Native type code
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Decode a native type code
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ValueKind::Int),
            1 => Some(ValueKind::Bool),
            2 => Some(ValueKind::String),
            4 => Some(ValueKind::Binary),
            7 => Some(ValueKind::Timestamp),
            9 => Some(ValueKind::Float),
            10 => Some(ValueKind::Double),
            12 => Some(ValueKind::Link),
            13 => Some(ValueKind::LinkList),
            _ => None,
        }
    }

    /// True for kinds accessed through the variable-length protocol
    pub fn is_variable_length(self) -> bool {
        matches!(self, ValueKind::String | ValueKind::Binary)
    }

    /// True for link and link-list kinds
    pub fn is_relationship(self) -> bool {
        matches!(self, ValueKind::Link | ValueKind::LinkList)
    }

    /// Lowercase name used in diagnostics
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Int => "int",
            ValueKind::Bool => "bool",
            ValueKind::String => "string",
            ValueKind::Binary => "binary",
            ValueKind::Timestamp => "timestamp",
            ValueKind::Float => "float",
            ValueKind::Double => "double",
            ValueKind::Link => "link",
            ValueKind::LinkList => "link list",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind table entry for one language-level type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindInfo {
    /// Native storage kind
    pub kind: ValueKind,
    /// Whether the type admits null
    pub nullable: bool,
}

macro_rules! kind_entries {
    ($table:ident; $($ty:ty => $kind:expr),* $(,)?) => {
        $(
            $table.insert(TypeId::of::<$ty>(), KindInfo { kind: $kind, nullable: false });
            $table.insert(TypeId::of::<Option<$ty>>(), KindInfo { kind: $kind, nullable: true });
        )*
    };
}

static KIND_TABLE: Lazy<FxHashMap<TypeId, KindInfo>> = Lazy::new(|| {
    let mut table = FxHashMap::default();
    kind_entries!(table;
        bool => ValueKind::Bool,
        i16 => ValueKind::Int,
        i32 => ValueKind::Int,
        i64 => ValueKind::Int,
        f32 => ValueKind::Float,
        f64 => ValueKind::Double,
        String => ValueKind::String,
        Vec<u8> => ValueKind::Binary,
        DateTime<Utc> => ValueKind::Timestamp,
    );
    table
});

/// Look up the native kind of a property type
///
/// # Errors
///
/// Returns [`Error::UnsupportedType`] for any type without a mapping.
pub fn kind_of<T: 'static>() -> Result<KindInfo> {
    KIND_TABLE
        .get(&TypeId::of::<T>())
        .copied()
        .ok_or(Error::UnsupportedType {
            type_name: type_name::<T>(),
        })
}

/// Conversion between a property type and [`Value`]
///
/// Implemented for every type in the kind table. Conversions never coerce
/// across kinds: reading a `Double` column as `i64` is a schema mismatch.
pub trait ColumnType: Sized + 'static {
    /// Convert into a boundary value
    fn into_value(self) -> Value;

    /// Convert from a boundary value
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch<T>(value: &Value) -> Error {
    Error::schema_mismatch(format!(
        "cannot read {} value as {}",
        value.type_name(),
        type_name::<T>()
    ))
}

impl ColumnType for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(v) => Ok(v),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl ColumnType for i64 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(v) => Ok(v),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

macro_rules! narrow_int {
    ($($ty:ty),*) => {
        $(
            impl ColumnType for $ty {
                fn into_value(self) -> Value {
                    Value::Int(i64::from(self))
                }

                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::Int(v) => <$ty>::try_from(v).map_err(|_| {
                            Error::corrupted(format!(
                                "stored integer {} does not fit in {}",
                                v,
                                type_name::<$ty>()
                            ))
                        }),
                        other => Err(mismatch::<Self>(&other)),
                    }
                }
            }
        )*
    };
}

narrow_int!(i16, i32);

impl ColumnType for f32 {
    fn into_value(self) -> Value {
        Value::Float(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(v) => Ok(v),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl ColumnType for f64 {
    fn into_value(self) -> Value {
        Value::Double(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Double(v) => Ok(v),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl ColumnType for String {
    fn into_value(self) -> Value {
        Value::String(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(v) => Ok(v),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl ColumnType for Vec<u8> {
    fn into_value(self) -> Value {
        Value::Binary(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Binary(v) => Ok(v),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl ColumnType for DateTime<Utc> {
    fn into_value(self) -> Value {
        Value::Timestamp(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Timestamp(v) => Ok(v),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: ColumnType> ColumnType for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}
