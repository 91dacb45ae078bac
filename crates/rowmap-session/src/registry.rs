//! Registered record types.
//!
//! Each registration owns the type's table mapping, the catalog columns it
//! resolved at registration time, its initializer and its identity cache.
//! Registrations are stored type-erased and recovered by `TypeId`.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rowmap_core::{ColumnInfo, ConfigErrorKind, Connection, Error, Record, Result, Value};
use rowmap_query::TableMapping;

use crate::identity::IdentityCache;
use crate::initializer::EntityInitializer;
use crate::store::EntityStore;

/// Everything the store knows about one record type.
pub(crate) struct Registration<R: Record> {
    pub(crate) mapping: TableMapping,
    pub(crate) id_column: ColumnInfo,
    /// Catalog column per field slot; `None` when the catalog did not report it.
    pub(crate) field_columns: Vec<Option<ColumnInfo>>,
    pub(crate) initializer: Arc<dyn EntityInitializer>,
    pub(crate) cache: IdentityCache<R>,
    gate: Mutex<()>,
}

impl<R: Record> Registration<R> {
    pub(crate) fn new(
        mapping: TableMapping,
        id_column: ColumnInfo,
        field_columns: Vec<Option<ColumnInfo>>,
        initializer: Arc<dyn EntityInitializer>,
    ) -> Self {
        Self {
            mapping,
            id_column,
            field_columns,
            initializer,
            cache: IdentityCache::new(),
            gate: Mutex::new(()),
        }
    }

    /// Serialize database operations on this type.
    pub(crate) fn lock_gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initial slot values for a new entity.
    pub(crate) fn initial_values(&self) -> Vec<Value> {
        R::fields()
            .iter()
            .map(|f| self.initializer.initial_value(f))
            .collect()
    }
}

/// Type-erased operations `refresh_all` and diagnostics need.
pub(crate) trait TypeHandle<C: Connection>: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn table(&self) -> &str;
    fn cached_len(&self) -> usize;
    /// Full refresh; returns the number of rows fetched.
    fn refresh(&self, store: &EntityStore<C>) -> Result<usize>;
}

impl<C: Connection, R: Record> TypeHandle<C> for Registration<R> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<R>()
    }

    fn table(&self) -> &str {
        self.mapping.table()
    }

    fn cached_len(&self) -> usize {
        self.cache.len()
    }

    fn refresh(&self, store: &EntityStore<C>) -> Result<usize> {
        store.refresh_registration(self).map(|entities| entities.len())
    }
}

struct Entry<C: Connection> {
    typed: Arc<dyn Any + Send + Sync>,
    handle: Arc<dyn TypeHandle<C>>,
}

struct RegistryInner<C: Connection> {
    entries: HashMap<TypeId, Entry<C>>,
    order: Vec<TypeId>,
}

/// Registrations keyed by record type.
pub(crate) struct Registry<C: Connection> {
    inner: Mutex<RegistryInner<C>>,
}

impl<C: Connection> Registry<C> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                entries: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner<C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn contains<R: Record>(&self) -> bool {
        self.lock().entries.contains_key(&TypeId::of::<R>())
    }

    /// Add a registration; fails if the type is already registered.
    pub(crate) fn insert<R: Record>(&self, registration: Registration<R>) -> Result<()> {
        let type_id = TypeId::of::<R>();
        let mut inner = self.lock();
        if inner.entries.contains_key(&type_id) {
            return Err(duplicate::<R>());
        }
        let registration = Arc::new(registration);
        inner.entries.insert(
            type_id,
            Entry {
                typed: Arc::clone(&registration) as Arc<dyn Any + Send + Sync>,
                handle: registration as Arc<dyn TypeHandle<C>>,
            },
        );
        inner.order.push(type_id);
        Ok(())
    }

    /// Registration for `R`, or an `Unregistered` error.
    pub(crate) fn get<R: Record>(&self) -> Result<Arc<Registration<R>>> {
        let typed = self
            .lock()
            .entries
            .get(&TypeId::of::<R>())
            .map(|entry| Arc::clone(&entry.typed))
            .ok_or_else(|| {
                Error::config(
                    ConfigErrorKind::Unregistered,
                    format!("{} is not registered", std::any::type_name::<R>()),
                )
            })?;
        typed.downcast::<Registration<R>>().map_err(|_| {
            Error::consistency(format!(
                "registry entry for {} has the wrong type",
                std::any::type_name::<R>()
            ))
        })
    }

    /// Handles for all registered types, in registration order.
    pub(crate) fn handles(&self) -> Vec<Arc<dyn TypeHandle<C>>> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id).map(|e| Arc::clone(&e.handle)))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().order.len()
    }
}

pub(crate) fn duplicate<R: Record>() -> Error {
    Error::config(
        ConfigErrorKind::DuplicateRegistration,
        format!("{} is already registered", std::any::type_name::<R>()),
    )
}
