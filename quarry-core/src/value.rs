use rust_decimal::Decimal;
use serde_json::Value as Json;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

/// A runtime value crossing the wire boundary in either direction.
///
/// Every variant carries `Option<T>` so a typed NULL keeps its column type;
/// `Null` is an untyped NULL. `List` carries the element prototype used when
/// binding an empty or null list.
#[derive(Default, Debug, Clone)]
pub enum Value {
    #[default]
    Null,
    Boolean(Option<bool>),
    Int16(Option<i16>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    Float32(Option<f32>),
    Float64(Option<f64>),
    Decimal(Option<Decimal>),
    Varchar(Option<String>),
    Blob(Option<Box<[u8]>>),
    Date(Option<Date>),
    Time(Option<Time>),
    Timestamp(Option<PrimitiveDateTime>),
    TimestampWithTimezone(Option<OffsetDateTime>),
    Uuid(Option<Uuid>),
    Json(Option<Json>),
    List(Option<Vec<Value>>, /* type: */ Box<Value>),
}

/// Coarse category a column's values fall into, used to resolve which
/// operator families apply. See [`crate::operators::families_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCategory {
    Boolean,
    Numeric,
    OrdinalText,
    Temporal,
    Binary,
    Uuid,
    Json,
    Array,
}

impl Value {
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Boolean(v) => v.is_none(),
            Value::Int16(v) => v.is_none(),
            Value::Int32(v) => v.is_none(),
            Value::Int64(v) => v.is_none(),
            Value::Float32(v) => v.is_none(),
            Value::Float64(v) => v.is_none(),
            Value::Decimal(v) => v.is_none(),
            Value::Varchar(v) => v.is_none(),
            Value::Blob(v) => v.is_none(),
            Value::Date(v) => v.is_none(),
            Value::Time(v) => v.is_none(),
            Value::Timestamp(v) => v.is_none(),
            Value::TimestampWithTimezone(v) => v.is_none(),
            Value::Uuid(v) => v.is_none(),
            Value::Json(v) => v.is_none(),
            Value::List(v, ..) => v.is_none(),
        }
    }

    pub fn same_type(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::List(.., l), Self::List(.., r)) => l.same_type(r),
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }

    pub fn category(&self) -> ValueCategory {
        match self {
            Value::Null => ValueCategory::OrdinalText,
            Value::Boolean(..) => ValueCategory::Boolean,
            Value::Int16(..)
            | Value::Int32(..)
            | Value::Int64(..)
            | Value::Float32(..)
            | Value::Float64(..)
            | Value::Decimal(..) => ValueCategory::Numeric,
            Value::Varchar(..) => ValueCategory::OrdinalText,
            Value::Blob(..) => ValueCategory::Binary,
            Value::Date(..)
            | Value::Time(..)
            | Value::Timestamp(..)
            | Value::TimestampWithTimezone(..) => ValueCategory::Temporal,
            Value::Uuid(..) => ValueCategory::Uuid,
            Value::Json(..) => ValueCategory::Json,
            Value::List(..) => ValueCategory::Array,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(l), Self::Boolean(r)) => l == r,
            (Self::Int16(l), Self::Int16(r)) => l == r,
            (Self::Int32(l), Self::Int32(r)) => l == r,
            (Self::Int64(l), Self::Int64(r)) => l == r,
            (Self::Float32(l), Self::Float32(r)) => l == r,
            (Self::Float64(l), Self::Float64(r)) => l == r,
            (Self::Decimal(l), Self::Decimal(r)) => l == r,
            (Self::Varchar(l), Self::Varchar(r)) => l == r,
            (Self::Blob(l), Self::Blob(r)) => l == r,
            (Self::Date(l), Self::Date(r)) => l == r,
            (Self::Time(l), Self::Time(r)) => l == r,
            (Self::Timestamp(l), Self::Timestamp(r)) => l == r,
            (Self::TimestampWithTimezone(l), Self::TimestampWithTimezone(r)) => l == r,
            (Self::Uuid(l), Self::Uuid(r)) => l == r,
            (Self::Json(l), Self::Json(r)) => l == r,
            (Self::List(l, ..), Self::List(r, ..)) => l == r && self.same_type(other),
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

macro_rules! impl_from {
    ($($source:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$source> for Value {
                fn from(v: $source) -> Self {
                    Value::$variant(Some(v.into()))
                }
            }
            impl From<Option<$source>> for Value {
                fn from(v: Option<$source>) -> Self {
                    Value::$variant(v.map(Into::into))
                }
            }
        )+
    };
}

impl_from!(
    bool => Boolean,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    Decimal => Decimal,
    String => Varchar,
    &str => Varchar,
    Date => Date,
    Time => Time,
    PrimitiveDateTime => Timestamp,
    OffsetDateTime => TimestampWithTimezone,
    Uuid => Uuid,
    Json => Json,
);

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(Some(v.into()))
    }
}

impl Value {
    /// Builds a list value; `prototype` fixes the element type so empty and
    /// null lists still bind with a concrete array type.
    pub fn list(items: impl IntoIterator<Item = impl Into<Value>>, prototype: Value) -> Self {
        Value::List(
            Some(items.into_iter().map(Into::into).collect()),
            Box::new(prototype),
        )
    }
}
