//! SQL text for the statement shapes the entity store issues.

use rowmap_core::{Error, Result, SqlDialect, SqlType, Value};

use crate::mapping::TableMapping;

/// Statement generator for one mapping and dialect.
///
/// All selects return the id column first, then the field columns in slot
/// order. Inserts with an explicit id bind the id first, then the fields.
/// Updates bind the fields first, then the id.
#[derive(Clone, Copy)]
pub struct Statements<'a> {
    mapping: &'a TableMapping,
    dialect: &'a dyn SqlDialect,
}

impl<'a> Statements<'a> {
    /// Create a generator.
    pub fn new(mapping: &'a TableMapping, dialect: &'a dyn SqlDialect) -> Self {
        Self { mapping, dialect }
    }

    /// `SELECT id, f1, ... FROM table`
    pub fn select_all(&self) -> String {
        format!("SELECT {} FROM {}", self.select_list(), self.table())
    }

    /// `SELECT id, f1, ... FROM table WHERE id IN (?, ...)` for `n` keys.
    pub fn select_by_keys(&self, n: usize) -> Result<String> {
        let keys = self.placeholders(1, n)?;
        Ok(format!(
            "{} WHERE {} IN ({})",
            self.select_all(),
            self.id(),
            keys
        ))
    }

    /// Like [`select_by_keys`](Self::select_by_keys) with the keys rendered as
    /// literals of `id_type`.
    pub fn select_by_keys_inline(&self, keys: &[Value], id_type: SqlType) -> Result<String> {
        let keys = self.literals(keys, id_type)?;
        Ok(format!(
            "{} WHERE {} IN ({})",
            self.select_all(),
            self.id(),
            keys
        ))
    }

    /// `INSERT INTO table (id, f1, ...) VALUES (?, ?, ...)`
    pub fn insert(&self) -> String {
        let mut columns = Vec::with_capacity(self.mapping.field_count() + 1);
        columns.push(self.id());
        columns.extend(self.field_columns());
        let placeholders: Vec<String> = (1..=columns.len())
            .map(|i| self.dialect.placeholder(i))
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table(),
            columns.join(", "),
            placeholders.join(", ")
        )
    }

    /// `INSERT INTO table (f1, ...) VALUES (?, ...)`, leaving the id to the
    /// server. A record without fields inserts `DEFAULT VALUES`.
    pub fn insert_generated(&self) -> String {
        let columns = self.field_columns();
        if columns.is_empty() {
            return format!("INSERT INTO {} DEFAULT VALUES", self.table());
        }
        let placeholders: Vec<String> = (1..=columns.len())
            .map(|i| self.dialect.placeholder(i))
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table(),
            columns.join(", "),
            placeholders.join(", ")
        )
    }

    /// `UPDATE table SET f1 = ?, ... WHERE id = ?`
    ///
    /// Returns `None` for records without fields, which have nothing to update.
    pub fn update(&self) -> Option<String> {
        let columns = self.field_columns();
        if columns.is_empty() {
            return None;
        }
        let sets: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{} = {}", col, self.dialect.placeholder(i + 1)))
            .collect();
        Some(format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.table(),
            sets.join(", "),
            self.id(),
            self.dialect.placeholder(columns.len() + 1)
        ))
    }

    /// `DELETE FROM table WHERE id IN (?, ...)` for `n` keys.
    pub fn delete(&self, n: usize) -> Result<String> {
        let keys = self.placeholders(1, n)?;
        Ok(format!(
            "DELETE FROM {} WHERE {} IN ({})",
            self.table(),
            self.id(),
            keys
        ))
    }

    /// Like [`delete`](Self::delete) with the keys rendered as literals.
    pub fn delete_inline(&self, keys: &[Value], id_type: SqlType) -> Result<String> {
        let keys = self.literals(keys, id_type)?;
        Ok(format!(
            "DELETE FROM {} WHERE {} IN ({})",
            self.table(),
            self.id(),
            keys
        ))
    }

    fn table(&self) -> String {
        self.dialect.escape_identifier(self.mapping.table())
    }

    fn id(&self) -> String {
        self.dialect.escape_identifier(self.mapping.id_column())
    }

    fn field_columns(&self) -> Vec<String> {
        self.mapping
            .columns()
            .iter()
            .map(|c| self.dialect.escape_identifier(c))
            .collect()
    }

    fn select_list(&self) -> String {
        let mut columns = vec![self.id()];
        columns.extend(self.field_columns());
        columns.join(", ")
    }

    fn placeholders(&self, start: usize, n: usize) -> Result<String> {
        if n == 0 {
            return Err(Error::invalid_argument(format!(
                "key list for {} must not be empty",
                self.mapping.table()
            )));
        }
        Ok((start..start + n)
            .map(|i| self.dialect.placeholder(i))
            .collect::<Vec<_>>()
            .join(", "))
    }

    fn literals(&self, keys: &[Value], id_type: SqlType) -> Result<String> {
        if keys.is_empty() {
            return Err(Error::invalid_argument(format!(
                "key list for {} must not be empty",
                self.mapping.table()
            )));
        }
        let rendered = keys
            .iter()
            .map(|k| self.dialect.format_value(k, id_type))
            .collect::<Result<Vec<_>>>()?;
        tracing::trace!(
            dialect = self.dialect.name(),
            table = self.mapping.table(),
            keys = rendered.len(),
            "Rendered inline key list"
        );
        Ok(rendered.join(", "))
    }
}
