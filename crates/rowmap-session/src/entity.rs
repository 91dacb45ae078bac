//! Entity handles and drafts.
//!
//! An [`Entity`] is the cached, shared view of one row. Every holder of the
//! same identifier sees the same `Entity` instance, and its values change only
//! when the store repopulates it after a refresh or a committed write.
//!
//! Changes are prepared on a [`Draft`], which the caller owns exclusively.
//! [`Draft::finish`] freezes it into a [`Persistable`] for
//! `EntityStore::persist`.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use rowmap_core::{
    Error, FieldRead, FieldWrite, FieldsSet, FromValue, Record, RecordId, Result, Row, Value,
    field_index,
};

// ============================================================================
// Bound Entities
// ============================================================================

struct EntityInner<R: Record> {
    id: R::Id,
    slots: RwLock<Vec<Value>>,
    removed: AtomicBool,
    _record: PhantomData<fn() -> R>,
}

/// Shared handle to a cached row.
///
/// Cloning is cheap; clones refer to the same cached instance. Equality is
/// instance identity, not value equality.
pub struct Entity<R: Record> {
    inner: Arc<EntityInner<R>>,
}

impl<R: Record> Entity<R> {
    pub(crate) fn new(id: R::Id, values: Vec<Value>) -> Self {
        Self {
            inner: Arc::new(EntityInner {
                id,
                slots: RwLock::new(values),
                removed: AtomicBool::new(false),
                _record: PhantomData,
            }),
        }
    }

    /// Identifier of this entity.
    pub fn id(&self) -> &R::Id {
        &self.inner.id
    }

    /// Current value of a field.
    pub fn get(&self, field: &str) -> Result<Value> {
        let idx = field_index::<R>(field)?;
        let slots = self.inner.slots.read().unwrap_or_else(PoisonError::into_inner);
        Ok(slots.get(idx).cloned().unwrap_or_default())
    }

    /// Current value of a field, converted to `T`.
    pub fn get_as<T: FromValue>(&self, field: &str) -> Result<T> {
        self.read_as(field)
    }

    /// Snapshot of all field values, in slot order.
    pub fn values(&self) -> Vec<Value> {
        self.inner
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether this entity was deleted or evicted from the cache.
    ///
    /// A removed entity keeps its last values but will never be updated
    /// again; fetching the same identifier later yields a new instance.
    pub fn is_removed(&self) -> bool {
        self.inner.removed.load(Ordering::Acquire)
    }

    /// Open a draft seeded with the current values, for a later `persist`.
    pub fn modify(&self) -> Draft<R> {
        Draft {
            id: Some(self.inner.id.clone()),
            slots: self.values(),
            dirty: FieldsSet::empty(R::fields().len()),
            origin: Origin::Bound(self.clone()),
        }
    }

    /// Convert the current values into the plain record type.
    pub fn to_record(&self) -> Result<R> {
        R::from_values(&self.values())
    }

    /// Render `{id, field...}` as JSON, for diagnostics.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert(
            R::ID_COLUMN.to_string(),
            value_to_json(&self.inner.id.to_value()),
        );
        for (field, value) in R::fields().iter().zip(self.values()) {
            map.insert(field.name.to_string(), value_to_json(&value));
        }
        serde_json::Value::Object(map)
    }

    /// Whether two handles refer to the same cached instance.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Replace all slots at once.
    pub(crate) fn populate(&self, values: Vec<Value>) {
        let mut slots = self.inner.slots.write().unwrap_or_else(PoisonError::into_inner);
        *slots = values;
    }

    pub(crate) fn mark_removed(&self) {
        self.inner.removed.store(true, Ordering::Release);
    }
}

impl<R: Record> Clone for Entity<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Record> PartialEq for Entity<R> {
    fn eq(&self, other: &Self) -> bool {
        Entity::ptr_eq(self, other)
    }
}

impl<R: Record> Eq for Entity<R> {}

impl<R: Record> fmt::Debug for Entity<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("type", &std::any::type_name::<R>())
            .field("id", &self.inner.id)
            .field("values", &self.values())
            .field("removed", &self.is_removed())
            .finish()
    }
}

impl<R: Record> FieldRead for Entity<R> {
    type Record = R;

    fn read(&self, field: &str) -> Result<Value> {
        self.get(field)
    }
}

/// Split a fetched row into identifier and slot values.
///
/// The row must hold the id in column 0 followed by one column per field.
pub(crate) fn split_row<R: Record>(row: Row) -> Result<(R::Id, Vec<Value>)> {
    let expected = R::fields().len() + 1;
    if row.len() != expected {
        return Err(Error::consistency(format!(
            "row for {} has {} columns, expected {}",
            R::TABLE_NAME,
            row.len(),
            expected
        )));
    }
    let mut values = row.into_values();
    let id_value = values.remove(0);
    let id = <R::Id as RecordId>::from_value(&id_value)?;
    Ok((id, values))
}

/// Plain JSON for a value; arbitrary-precision integers become strings.
pub(crate) fn value_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::TinyInt(v) => Json::from(*v),
        Value::SmallInt(v) => Json::from(*v),
        Value::Int(v) => Json::from(*v),
        Value::BigInt(v) | Value::Timestamp(v) => Json::from(*v),
        Value::BigNum(n) => Json::String(n.to_string()),
        Value::Float(v) => Json::from(f64::from(*v)),
        Value::Double(v) => Json::from(*v),
        Value::Decimal(s) | Value::Text(s) => Json::String(s.clone()),
        Value::Bytes(b) => Json::Array(b.iter().map(|x| Json::from(*x)).collect()),
        Value::Json(j) => j.clone(),
    }
}

// ============================================================================
// Drafts
// ============================================================================

enum Origin<R: Record> {
    Staged,
    Bound(Entity<R>),
}

/// Caller-owned, mutable copy of an entity's values.
///
/// A draft either stages a new row (created by `EntityStore::stage`) or
/// prepares an update of a bound entity (created by [`Entity::modify`]).
/// Setting fields only changes the draft.
pub struct Draft<R: Record> {
    id: Option<R::Id>,
    slots: Vec<Value>,
    dirty: FieldsSet,
    origin: Origin<R>,
}

impl<R: Record> Draft<R> {
    pub(crate) fn staged(id: Option<R::Id>, slots: Vec<Value>) -> Self {
        let len = slots.len();
        Self {
            id,
            slots,
            dirty: FieldsSet::empty(len),
            origin: Origin::Staged,
        }
    }

    /// Identifier, if assigned. `None` on a staged draft means the database
    /// will generate one.
    pub fn id(&self) -> Option<&R::Id> {
        self.id.as_ref()
    }

    /// Whether this draft prepares an update of a bound entity.
    pub fn is_bound(&self) -> bool {
        matches!(self.origin, Origin::Bound(_))
    }

    /// Staged value of a field.
    pub fn get(&self, field: &str) -> Result<&Value> {
        let idx = field_index::<R>(field)?;
        self.slots
            .get(idx)
            .ok_or_else(|| Error::consistency(format!("draft for {} is missing slot {}", R::TABLE_NAME, idx)))
    }

    /// Stage a new value for a field.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let idx = field_index::<R>(field)?;
        if let Some(slot) = self.slots.get_mut(idx) {
            *slot = value.into();
            self.dirty.set(idx);
        }
        Ok(self)
    }

    /// Stage every field from a plain record.
    ///
    /// Only fields whose values differ from the draft are marked dirty.
    pub fn assign(&mut self, record: &R) -> &mut Self {
        for (idx, value) in record.to_values().into_iter().enumerate() {
            if let Some(slot) = self.slots.get_mut(idx) {
                if !slot.same_as(&value) {
                    *slot = value;
                    self.dirty.set(idx);
                }
            }
        }
        self
    }

    /// Whether any field was set since the draft was opened.
    pub fn is_dirty(&self) -> bool {
        self.dirty.any()
    }

    /// Names of the fields set since the draft was opened.
    pub fn dirty_fields(&self) -> Vec<&'static str> {
        let fields = R::fields();
        self.dirty.iter().filter_map(|idx| fields.get(idx).map(|f| f.name)).collect()
    }

    /// Freeze the draft for `persist`.
    pub fn finish(self) -> Persistable<R> {
        let dirty = self.dirty.any();
        match self.origin {
            Origin::Staged => Persistable {
                lifecycle: Lifecycle::Staged,
                id: self.id,
                values: self.slots,
                entity: None,
                dirty: true,
            },
            Origin::Bound(entity) => Persistable {
                lifecycle: Lifecycle::Bound,
                id: Some(entity.id().clone()),
                values: self.slots,
                entity: Some(entity),
                dirty,
            },
        }
    }
}

impl<R: Record> fmt::Debug for Draft<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Draft")
            .field("type", &std::any::type_name::<R>())
            .field("id", &self.id)
            .field("values", &self.slots)
            .field("dirty", &self.dirty_fields())
            .field("bound", &self.is_bound())
            .finish()
    }
}

impl<R: Record> FieldRead for Draft<R> {
    type Record = R;

    fn read(&self, field: &str) -> Result<Value> {
        self.get(field).cloned()
    }
}

impl<R: Record> FieldWrite for Draft<R> {
    fn write(&mut self, field: &str, value: Value) -> Result<()> {
        self.set(field, value).map(|_| ())
    }
}

// ============================================================================
// Persistables
// ============================================================================

/// Whether a persistable becomes a new row or updates an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Not yet written; persisted with INSERT.
    Staged,
    /// Backed by a cached entity; persisted with UPDATE.
    Bound,
}

/// Immutable snapshot of a finished draft.
pub struct Persistable<R: Record> {
    lifecycle: Lifecycle,
    id: Option<R::Id>,
    values: Vec<Value>,
    entity: Option<Entity<R>>,
    dirty: bool,
}

impl<R: Record> Persistable<R> {
    /// Insert or update.
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Identifier, if known before the write.
    pub fn id(&self) -> Option<&R::Id> {
        self.id.as_ref()
    }

    /// Field values, in slot order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Whether persisting this snapshot writes anything.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn into_parts(self) -> (Lifecycle, Option<R::Id>, Vec<Value>, Option<Entity<R>>, bool) {
        (self.lifecycle, self.id, self.values, self.entity, self.dirty)
    }
}

impl<R: Record> fmt::Debug for Persistable<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persistable")
            .field("lifecycle", &self.lifecycle)
            .field("id", &self.id)
            .field("values", &self.values)
            .field("dirty", &self.dirty)
            .finish()
    }
}
