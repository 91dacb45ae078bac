//! Initial field values for newly created entities.

use std::collections::HashMap;

use rowmap_core::{ConfigErrorKind, Error, FieldInfo, Record, Result, Value};

/// Supplies the value each field starts with when an entity is created
/// through `new_objects` or staged for insert.
pub trait EntityInitializer: Send + Sync {
    /// Initial value for `field`.
    fn initial_value(&self, field: &FieldInfo) -> Value;

    /// Validate the initializer against the fields of the record it is
    /// registered for.
    fn check(&self, _fields: &[FieldInfo]) -> Result<()> {
        Ok(())
    }
}

/// Every field starts as NULL.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullInitializer;

impl EntityInitializer for NullInitializer {
    fn initial_value(&self, _field: &FieldInfo) -> Value {
        Value::Null
    }
}

/// Fields start with the values of the record's `Default` implementation.
#[derive(Debug, Clone)]
pub struct RecordDefaults {
    values: Vec<(&'static str, Value)>,
}

impl RecordDefaults {
    /// Capture `R::default()`.
    pub fn new<R: Record + Default>() -> Self {
        let values = R::fields()
            .iter()
            .map(|f| f.name)
            .zip(R::default().to_values())
            .collect();
        Self { values }
    }
}

impl EntityInitializer for RecordDefaults {
    fn initial_value(&self, field: &FieldInfo) -> Value {
        self.values
            .iter()
            .find(|(name, _)| *name == field.name)
            .map_or(Value::Null, |(_, v)| v.clone())
    }
}

/// Explicit per-field defaults; unlisted fields start as NULL.
///
/// ```ignore
/// let defaults = FieldDefaults::new().with("name", "").with("price", 0);
/// store.register_full::<Widget>(TableMapping::of::<Widget>(), defaults)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct FieldDefaults {
    values: HashMap<String, Value>,
}

impl FieldDefaults {
    /// No defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default for one field.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }
}

impl EntityInitializer for FieldDefaults {
    fn initial_value(&self, field: &FieldInfo) -> Value {
        self.values.get(field.name).cloned().unwrap_or_default()
    }

    fn check(&self, fields: &[FieldInfo]) -> Result<()> {
        for name in self.values.keys() {
            if !fields.iter().any(|f| f.name == name.as_str()) {
                return Err(Error::config(
                    ConfigErrorKind::UnknownField,
                    format!("default given for unknown field '{}'", name),
                ));
            }
        }
        Ok(())
    }
}

impl<F> EntityInitializer for F
where
    F: Fn(&FieldInfo) -> Value + Send + Sync,
{
    fn initial_value(&self, field: &FieldInfo) -> Value {
        self(field)
    }
}
