//! SQL type descriptors and catalog column metadata.

use num_bigint::BigInt;

/// Logical SQL column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    /// Arbitrary precision NUMERIC/DECIMAL.
    Numeric,
    Real,
    Double,
    Text,
    Blob,
    Timestamp,
    Json,
    /// A driver-specific type the core does not model.
    Other(&'static str),
}

impl SqlType {
    /// Canonical SQL name.
    pub const fn sql_name(&self) -> &'static str {
        match self {
            SqlType::Boolean => "BOOLEAN",
            SqlType::TinyInt => "TINYINT",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Numeric => "NUMERIC",
            SqlType::Real => "REAL",
            SqlType::Double => "DOUBLE PRECISION",
            SqlType::Text => "TEXT",
            SqlType::Blob => "BLOB",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Json => "JSON",
            SqlType::Other(name) => name,
        }
    }

    /// Whether values of this type are integers.
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt
        )
    }

    /// Whether values of this type are numeric (integer, exact or floating).
    pub const fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, SqlType::Numeric | SqlType::Real | SqlType::Double)
    }
}

/// Rust types with a natural SQL column type.
///
/// Used by `#[derive(Record)]` to fill in [`FieldInfo`](crate::FieldInfo)
/// without string matching on type names.
pub trait HasSqlType {
    /// Column type for this Rust type.
    const SQL_TYPE: SqlType;
    /// Whether the column accepts NULL.
    const NULLABLE: bool = false;
}

macro_rules! impl_has_sql_type {
    ($($ty:ty => $sql:ident),* $(,)?) => {
        $(
            impl HasSqlType for $ty {
                const SQL_TYPE: SqlType = SqlType::$sql;
            }
        )*
    };
}

impl_has_sql_type!(
    bool => Boolean,
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Integer,
    u32 => BigInt,
    i64 => BigInt,
    u64 => Numeric,
    BigInt => Numeric,
    f32 => Real,
    f64 => Double,
    String => Text,
    Vec<u8> => Blob,
    serde_json::Value => Json,
);

impl<T: HasSqlType> HasSqlType for Option<T> {
    const SQL_TYPE: SqlType = T::SQL_TYPE;
    const NULLABLE: bool = true;
}

/// Column metadata as reported by the catalog collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name in the database.
    pub name: String,
    /// SQL type.
    pub sql_type: SqlType,
    /// Whether this column is nullable.
    pub nullable: bool,
    /// Whether this is a primary key column.
    pub primary_key: bool,
    /// Whether the server generates values for this column.
    pub auto_increment: bool,
}

impl ColumnInfo {
    /// Create a new, non-null column description.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: false,
            primary_key: false,
            auto_increment: false,
        }
    }

    /// Mark as nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark as primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark as auto-incrementing.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }
}
