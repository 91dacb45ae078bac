//! Result rows.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::value::{FromValue, Value};

/// A row returned by [`Executor::query`](crate::Executor::query).
///
/// Column names are shared between all rows of one result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row from shared column names and values.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Create a row from owned column names, for drivers that build rows one
    /// at a time.
    pub fn from_pairs(pairs: Vec<(String, Value)>) -> Self {
        let (columns, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column names, in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Value at a column position.
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Convert the value at `idx` to `T`.
    pub fn get_as<T: FromValue>(&self, idx: usize) -> Result<T> {
        let value = self.values.get(idx).ok_or_else(|| {
            Error::invalid_argument(format!(
                "column index {} out of range for row of {} columns",
                idx,
                self.values.len()
            ))
        })?;
        T::from_value(value).map_err(|e| attach_column(e, &self.column_label(idx)))
    }

    /// Convert the value of the named column to `T`.
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let idx = self
            .columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| Error::invalid_argument(format!("no column named '{}'", name)))?;
        self.get_as(idx)
    }

    /// All values, in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Take the values out of the row.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    fn column_label(&self, idx: usize) -> String {
        self.columns
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("#{}", idx))
    }
}

fn attach_column(err: Error, column: &str) -> Error {
    match err {
        Error::Type(e) => Error::Type(e.with_column(column)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget_row() -> Row {
        Row::from_pairs(vec![
            ("id".to_string(), Value::BigInt(1)),
            ("name".to_string(), Value::Text("bolt".into())),
        ])
    }

    #[test]
    fn test_named_access() {
        let row = widget_row();
        assert_eq!(row.get_named::<i64>("id").unwrap(), 1);
        assert_eq!(row.get_named::<String>("name").unwrap(), "bolt");
        assert!(row.get_named::<i64>("price").is_err());
    }

    #[test]
    fn test_conversion_error_names_column() {
        let err = widget_row().get_as::<i64>(1).unwrap_err();
        assert!(err.to_string().contains("'name'"));
    }

    #[test]
    fn test_into_values() {
        let row = widget_row();
        assert_eq!(row.len(), 2);
        assert_eq!(row.into_values()[0], Value::BigInt(1));
    }
}
