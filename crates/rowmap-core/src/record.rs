//! Record metadata and field access.
//!
//! A [`Record`] is a plain struct bound to a table. The entity store never
//! inspects the struct itself; it works on ordered value slots described by
//! [`Record::fields`], and converts to and from the struct only on request
//! through [`Record::to_values`] and [`Record::from_values`].
//!
//! Implementations are normally generated with `#[derive(Record)]`.

use std::fmt::Debug;
use std::hash::Hash;

use num_bigint::BigInt;

use crate::error::{ConfigErrorKind, Error, Result};
use crate::types::SqlType;
use crate::value::{FromValue, Value};

/// Metadata about one non-id field of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    /// Rust field name.
    pub name: &'static str,
    /// Default column name (may be overridden by a table mapping).
    pub column_name: &'static str,
    /// SQL type for this field.
    pub sql_type: SqlType,
    /// Whether this field accepts NULL.
    pub nullable: bool,
}

impl FieldInfo {
    /// Create a new, non-null field whose column has the same name.
    pub const fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            column_name: name,
            sql_type,
            nullable: false,
        }
    }

    /// Set the database column name.
    pub const fn column(mut self, name: &'static str) -> Self {
        self.column_name = name;
        self
    }

    /// Set nullable flag.
    pub const fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }
}

/// The representation family of an identifier type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    /// Fixed 32-bit integer.
    Int,
    /// Fixed 64-bit integer.
    BigInt,
    /// Arbitrary-precision integer.
    BigNum,
    /// Textual key (UUIDs, natural keys).
    Text,
}

impl IdKind {
    /// Whether this id kind is an integer family.
    pub const fn is_integer(&self) -> bool {
        !matches!(self, IdKind::Text)
    }

    /// Whether a catalog column of `sql_type` can hold ids of this kind.
    pub const fn accepts_sql_type(&self, sql_type: SqlType) -> bool {
        match self {
            IdKind::Int | IdKind::BigInt | IdKind::BigNum => matches!(
                sql_type,
                SqlType::TinyInt
                    | SqlType::SmallInt
                    | SqlType::Integer
                    | SqlType::BigInt
                    | SqlType::Numeric
                    | SqlType::Other(_)
            ),
            IdKind::Text => matches!(sql_type, SqlType::Text | SqlType::Other(_)),
        }
    }

    /// Whether `value` is already in the representation this kind expects.
    pub fn accepts_value(&self, value: &Value) -> bool {
        match (self, value) {
            (IdKind::Int, Value::Int(_))
            | (IdKind::BigInt, Value::BigInt(_))
            | (IdKind::BigNum, Value::BigNum(_))
            | (IdKind::Text, Value::Text(_)) => true,
            _ => false,
        }
    }
}

/// A type usable as a record identifier.
pub trait RecordId: Clone + Eq + Hash + Debug + Send + Sync + 'static {
    /// Representation family.
    const KIND: IdKind;

    /// Convert to a statement parameter.
    fn to_value(&self) -> Value;

    /// Convert from a fetched or generated value.
    fn from_value(value: &Value) -> Result<Self>;
}

impl RecordId for i32 {
    const KIND: IdKind = IdKind::Int;

    fn to_value(&self) -> Value {
        Value::Int(*self)
    }

    fn from_value(value: &Value) -> Result<Self> {
        <i32 as FromValue>::from_value(value)
    }
}

impl RecordId for i64 {
    const KIND: IdKind = IdKind::BigInt;

    fn to_value(&self) -> Value {
        Value::BigInt(*self)
    }

    fn from_value(value: &Value) -> Result<Self> {
        <i64 as FromValue>::from_value(value)
    }
}

impl RecordId for BigInt {
    const KIND: IdKind = IdKind::BigNum;

    fn to_value(&self) -> Value {
        Value::BigNum(self.clone())
    }

    fn from_value(value: &Value) -> Result<Self> {
        <BigInt as FromValue>::from_value(value)
    }
}

impl RecordId for String {
    const KIND: IdKind = IdKind::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: &Value) -> Result<Self> {
        <String as FromValue>::from_value(value)
    }
}

/// A plain record type bound to a table.
pub trait Record: Send + Sync + Sized + 'static {
    /// Identifier type.
    type Id: RecordId;

    /// Default table name.
    const TABLE_NAME: &'static str;

    /// Default id column name.
    const ID_COLUMN: &'static str = "id";

    /// Non-id fields, in slot order.
    fn fields() -> &'static [FieldInfo];

    /// Values of the non-id fields, in slot order.
    fn to_values(&self) -> Vec<Value>;

    /// Build a record from slot values.
    fn from_values(values: &[Value]) -> Result<Self>;
}

/// Resolve a field name to its slot index.
pub fn field_index<R: Record>(name: &str) -> Result<usize> {
    R::fields()
        .iter()
        .position(|f| f.name == name)
        .ok_or_else(|| {
            Error::config(
                ConfigErrorKind::UnknownField,
                format!("{} has no field '{}'", std::any::type_name::<R>(), name),
            )
        })
}

/// Read access to the fields of something record-shaped.
///
/// Implemented by bound entities and drafts. Generated `<Name>Fields` traits
/// build typed getters on top of this.
pub trait FieldRead {
    /// The record type whose fields are exposed.
    type Record: Record;

    /// Current value of a field.
    fn read(&self, field: &str) -> Result<Value>;

    /// Current value of a field, converted to `T`.
    fn read_as<T: FromValue>(&self, field: &str) -> Result<T> {
        let value = self.read(field)?;
        T::from_value(&value).map_err(|e| match e {
            Error::Type(t) => Error::Type(t.with_column(field)),
            other => other,
        })
    }
}

/// Write access to the fields of something record-shaped.
pub trait FieldWrite: FieldRead {
    /// Stage a new value for a field.
    fn write(&mut self, field: &str, value: Value) -> Result<()>;
}
