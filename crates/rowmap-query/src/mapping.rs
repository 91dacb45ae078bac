//! Record type to table bindings.

use rowmap_core::{ConfigErrorKind, Error, FieldInfo, Record, Result};

/// The table, id column and per-field columns a record type is stored in.
///
/// Start from [`TableMapping::of`], which uses the record's declared table
/// name and column names, and override what differs:
///
/// ```ignore
/// let mapping = TableMapping::of::<Widget>()
///     .with_table("legacy_widgets")
///     .with_id_column("widget_id")
///     .with_column("price", "unit_price")?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMapping {
    record: &'static str,
    table: String,
    id_column: String,
    fields: &'static [FieldInfo],
    columns: Vec<String>,
}

impl TableMapping {
    /// Default mapping for `R`.
    pub fn of<R: Record>() -> Self {
        let fields = R::fields();
        Self {
            record: std::any::type_name::<R>(),
            table: R::TABLE_NAME.to_string(),
            id_column: R::ID_COLUMN.to_string(),
            fields,
            columns: fields.iter().map(|f| f.column_name.to_string()).collect(),
        }
    }

    /// Override the table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Override the id column name.
    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    /// Override the column for one field.
    pub fn with_column(mut self, field: &str, column: impl Into<String>) -> Result<Self> {
        let idx = self.field_index(field)?;
        self.columns[idx] = column.into();
        Ok(self)
    }

    /// Name of the record type this mapping was built for.
    pub fn record_name(&self) -> &'static str {
        self.record
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Id column name.
    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    /// Non-id fields, in slot order.
    pub fn fields(&self) -> &'static [FieldInfo] {
        self.fields
    }

    /// Column names for the non-id fields, in slot order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Column bound to `field`.
    pub fn column_for(&self, field: &str) -> Result<&str> {
        let idx = self.field_index(field)?;
        Ok(&self.columns[idx])
    }

    /// Number of non-id fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn field_index(&self, field: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|f| f.name == field)
            .ok_or_else(|| {
                Error::config(
                    ConfigErrorKind::UnknownField,
                    format!("{} has no field '{}'", self.record, field),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowmap_core::{SqlType, Value};

    struct Widget;

    impl Record for Widget {
        type Id = i64;
        const TABLE_NAME: &'static str = "widgets";

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: [FieldInfo; 2] = [
                FieldInfo::new("name", SqlType::Text),
                FieldInfo::new("price", SqlType::Integer),
            ];
            &FIELDS
        }

        fn to_values(&self) -> Vec<Value> {
            Vec::new()
        }

        fn from_values(_values: &[Value]) -> Result<Self> {
            Ok(Widget)
        }
    }

    #[test]
    fn test_default_mapping() {
        let m = TableMapping::of::<Widget>();
        assert_eq!(m.table(), "widgets");
        assert_eq!(m.id_column(), "id");
        assert_eq!(m.columns(), ["name", "price"]);
    }

    #[test]
    fn test_overrides() {
        let m = TableMapping::of::<Widget>()
            .with_table("legacy_widgets")
            .with_id_column("widget_id")
            .with_column("price", "unit_price")
            .unwrap();
        assert_eq!(m.table(), "legacy_widgets");
        assert_eq!(m.id_column(), "widget_id");
        assert_eq!(m.column_for("price").unwrap(), "unit_price");
        assert_eq!(m.column_for("name").unwrap(), "name");
    }

    #[test]
    fn test_unknown_field() {
        let err = TableMapping::of::<Widget>()
            .with_column("colour", "color")
            .unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnknownField));
    }
}
