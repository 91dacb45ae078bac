//! Dynamically typed SQL values.
//!
//! `Value` is the only representation that crosses the boundary between the
//! entity store and a driver. Drivers convert their native column types into
//! `Value`, and record fields convert to and from it through `From` and
//! [`FromValue`].

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single SQL value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    /// SQL NULL.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// 8-bit integer.
    TinyInt(i8),
    /// 16-bit integer.
    SmallInt(i16),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    BigInt(i64),
    /// Arbitrary-precision integer (NUMERIC keys, unsigned 64-bit keys, ...).
    BigNum(BigInt),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Decimal kept in its textual form to avoid rounding.
    Decimal(String),
    /// Text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
    /// JSON document.
    Json(serde_json::Value),
}

impl Value {
    /// Whether this value is SQL NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value is one of the integer variants.
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            Value::TinyInt(_)
                | Value::SmallInt(_)
                | Value::Int(_)
                | Value::BigInt(_)
                | Value::BigNum(_)
        )
    }

    /// Short name of the variant, used in conversion errors.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOL",
            Value::TinyInt(_) => "TINYINT",
            Value::SmallInt(_) => "SMALLINT",
            Value::Int(_) => "INT",
            Value::BigInt(_) => "BIGINT",
            Value::BigNum(_) => "BIGNUM",
            Value::Float(_) => "FLOAT",
            Value::Double(_) => "DOUBLE",
            Value::Decimal(_) => "DECIMAL",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BYTES",
            Value::Timestamp(_) => "TIMESTAMP",
            Value::Json(_) => "JSON",
        }
    }

    /// Borrow the value as a string slice, if it is textual.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Decimal(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as a bool, if it is boolean.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the value as an `i64` if it is an integer that fits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::TinyInt(v) => Some(i64::from(*v)),
            Value::SmallInt(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            Value::BigNum(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Get the value as an arbitrary-precision integer if it is integral.
    ///
    /// Decimal text without a fractional part is accepted as well, since some
    /// drivers report NUMERIC keys that way.
    pub fn as_bignum(&self) -> Option<BigInt> {
        match self {
            Value::TinyInt(v) => Some(BigInt::from(*v)),
            Value::SmallInt(v) => Some(BigInt::from(*v)),
            Value::Int(v) => Some(BigInt::from(*v)),
            Value::BigInt(v) => Some(BigInt::from(*v)),
            Value::BigNum(v) => Some(v.clone()),
            Value::Decimal(s) => s.trim().parse::<BigInt>().ok(),
            _ => None,
        }
    }

    /// Compare two values, treating integers of different widths as equal
    /// when they hold the same number.
    pub fn same_as(&self, other: &Value) -> bool {
        if self.is_integer() && other.is_integer() {
            return self.as_bignum() == other.as_bignum();
        }
        self == other
    }
}

/// Conversion from a [`Value`] into a Rust type.
pub trait FromValue: Sized {
    /// Convert a borrowed value.
    fn from_value(value: &Value) -> Result<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::TinyInt(v) => Ok(*v != 0),
            Value::SmallInt(v) => Ok(*v != 0),
            Value::Int(v) => Ok(*v != 0),
            Value::BigInt(v) => Ok(*v != 0),
            other => Err(Error::type_mismatch("BOOL", other)),
        }
    }
}

macro_rules! impl_from_value_int {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self> {
                    let wide = value
                        .as_i64()
                        .ok_or_else(|| Error::type_mismatch($name, value))?;
                    <$ty>::try_from(wide).map_err(|_| Error::type_mismatch($name, value))
                }
            }
        )*
    };
}

impl_from_value_int!(i8 => "TINYINT", i16 => "SMALLINT", i32 => "INT", u32 => "INT UNSIGNED");

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_i64()
            .ok_or_else(|| Error::type_mismatch("BIGINT", value))
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_bignum()
            .and_then(|n| u64::try_from(&n).ok())
            .ok_or_else(|| Error::type_mismatch("BIGINT UNSIGNED", value))
    }
}

impl FromValue for BigInt {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_bignum()
            .ok_or_else(|| Error::type_mismatch("BIGNUM", value))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Float(v) => Ok(f64::from(*v)),
            Value::Double(v) => Ok(*v),
            Value::Decimal(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| Error::type_mismatch("DOUBLE", value)),
            other => other
                .as_i64()
                .map(|v| v as f64)
                .ok_or_else(|| Error::type_mismatch("DOUBLE", other)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Float(v) => Ok(*v),
            #[allow(clippy::cast_possible_truncation)]
            Value::Double(v) => Ok(*v as f32),
            other => Err(Error::type_mismatch("FLOAT", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) | Value::Decimal(s) => Ok(s.clone()),
            other => Err(Error::type_mismatch("TEXT", other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.as_bytes().to_vec()),
            other => Err(Error::type_mismatch("BYTES", other)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Json(j) => Ok(j.clone()),
            Value::Text(s) => serde_json::from_str(s).map_err(|_| Error::type_mismatch("JSON", value)),
            other => Err(Error::type_mismatch("JSON", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

macro_rules! impl_into_value {
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

impl_into_value!(
    bool => Bool,
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    BigInt => BigNum,
    f32 => Float,
    f64 => Double,
    String => Text,
    Vec<u8> => Bytes,
    serde_json::Value => Json,
);

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::BigInt(i64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(small) => Value::BigInt(small),
            Err(_) => Value::BigNum(BigInt::from(v)),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
