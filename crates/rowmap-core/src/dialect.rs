//! SQL dialect formatting.
//!
//! The entity store never escapes identifiers or renders literals itself; every
//! piece of SQL text goes through a [`SqlDialect`]. Implementations must be
//! deterministic and free of side effects.

use crate::error::{Error, Result};
use crate::identifiers::{quote_ident, quote_ident_mysql};
use crate::types::{ColumnInfo, SqlType};
use crate::value::Value;

/// Dialect-specific SQL formatting.
pub trait SqlDialect: Send + Sync {
    /// Dialect name for diagnostics.
    fn name(&self) -> &'static str;

    /// Wrap a table/column name so it is always read as an identifier.
    fn escape_identifier(&self, name: &str) -> String;

    /// Bind-parameter placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String;

    /// Render `value` as a SQL literal of type `target`, for statements that
    /// inline values instead of binding them.
    fn format_value(&self, value: &Value, target: SqlType) -> Result<String>;

    /// Coerce `value` into the representation the driver expects for `column`.
    ///
    /// `column` is `None` when the catalog did not describe the column, in which
    /// case the value should be returned unchanged.
    fn safe_type(&self, column: Option<&ColumnInfo>, value: Value) -> Value;
}

/// The built-in dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// PostgreSQL: `"ident"`, `$n` placeholders.
    #[default]
    Postgres,
    /// SQLite: `"ident"`, `?` placeholders, booleans stored as integers.
    Sqlite,
    /// MySQL: `` `ident` ``, `?` placeholders.
    Mysql,
}

impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
            Dialect::Mysql => "mysql",
        }
    }

    fn escape_identifier(&self, name: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => quote_ident(name),
            Dialect::Mysql => quote_ident_mysql(name),
        }
    }

    fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::Sqlite | Dialect::Mysql => "?".to_string(),
        }
    }

    fn format_value(&self, value: &Value, target: SqlType) -> Result<String> {
        if value.is_null() {
            return Ok("NULL".to_string());
        }
        if target.is_integer() {
            return match value.as_bignum() {
                Some(n) => Ok(n.to_string()),
                None => Err(Error::type_mismatch(target.sql_name(), value)),
            };
        }
        match value {
            Value::Bool(b) => Ok(match (self, b) {
                (Dialect::Postgres, true) => "TRUE".to_string(),
                (Dialect::Postgres, false) => "FALSE".to_string(),
                (_, true) => "1".to_string(),
                (_, false) => "0".to_string(),
            }),
            Value::TinyInt(_)
            | Value::SmallInt(_)
            | Value::Int(_)
            | Value::BigInt(_)
            | Value::BigNum(_) => Ok(value.as_bignum().map_or_else(String::new, |n| n.to_string())),
            Value::Float(v) => Ok(v.to_string()),
            Value::Double(v) => Ok(v.to_string()),
            Value::Decimal(s) if target.is_numeric() => Ok(s.clone()),
            Value::Decimal(s) | Value::Text(s) => Ok(self.escape_string(s)),
            Value::Json(j) => Ok(self.escape_string(&j.to_string())),
            Value::Timestamp(us) => Ok(us.to_string()),
            Value::Bytes(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
                Ok(match self {
                    Dialect::Postgres => format!("'\\x{}'", hex),
                    Dialect::Sqlite | Dialect::Mysql => format!("X'{}'", hex),
                })
            }
            Value::Null => Ok("NULL".to_string()),
        }
    }

    fn safe_type(&self, column: Option<&ColumnInfo>, value: Value) -> Value {
        let Some(column) = column else {
            return value;
        };
        match (column.sql_type, value) {
            (_, Value::Null) => Value::Null,
            (SqlType::Boolean, Value::Bool(b)) if *self != Dialect::Postgres => {
                Value::Int(i32::from(b))
            }
            (SqlType::Integer, Value::TinyInt(v)) => Value::Int(i32::from(v)),
            (SqlType::Integer, Value::SmallInt(v)) => Value::Int(i32::from(v)),
            (SqlType::BigInt, v @ (Value::TinyInt(_) | Value::SmallInt(_) | Value::Int(_))) => {
                v.as_i64().map_or(v, Value::BigInt)
            }
            (SqlType::BigInt, Value::BigNum(n)) => match i64::try_from(&n) {
                Ok(small) => Value::BigInt(small),
                Err(_) => Value::BigNum(n),
            },
            (SqlType::Numeric, v) if v.is_integer() => v.as_bignum().map_or(v, Value::BigNum),
            (SqlType::Double, Value::Float(f)) => Value::Double(f64::from(f)),
            (SqlType::Json, Value::Text(s)) => match serde_json::from_str(&s) {
                Ok(json) => Value::Json(json),
                Err(e) => {
                    tracing::debug!(
                        column = %column.name,
                        error = %e,
                        "Text bound to a JSON column is not valid JSON, sending as text"
                    );
                    Value::Text(s)
                }
            },
            (SqlType::Text, Value::Json(j)) => Value::Text(j.to_string()),
            (_, v) => v,
        }
    }
}

impl Dialect {
    /// Quote a string literal, doubling embedded single quotes.
    pub fn escape_string(&self, s: &str) -> String {
        let mut out = String::with_capacity(s.len() + 2);
        out.push('\'');
        for ch in s.chars() {
            match ch {
                '\'' => out.push_str("''"),
                '\\' if *self == Dialect::Mysql => out.push_str("\\\\"),
                c => out.push(c),
            }
        }
        out.push('\'');
        out
    }
}
