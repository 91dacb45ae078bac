//! The entity store: registration, reads, refresh and batched writes.

use std::collections::HashSet;
use std::sync::Arc;

use rowmap_core::{
    ColumnInfo, ConfigErrorKind, Connection, Error, Executor, Record, RecordId, Result,
    TransactionOps, Value,
};
use rowmap_query::{Statements, TableMapping};

use crate::entity::{Draft, Entity, Lifecycle, Persistable, split_row};
use crate::initializer::{EntityInitializer, NullInitializer};
use crate::normalize::{normalize_generated_id, try_normalize_generated_id};
use crate::refresh::{RefreshReport, RefreshStrategy, RefreshTask};
use crate::registry::{Registration, Registry, duplicate};
use crate::{KeyBinding, StoreConfig};

// ============================================================================
// Policies and Options
// ============================================================================

/// How [`EntityStore::get`] and [`EntityStore::get_all`] consult the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GetPolicy {
    /// Only look in the cache.
    LocalOnly,
    /// Look in the cache; on a miss, refresh from the database once.
    #[default]
    FetchIfMissing,
    /// Always refresh from the database before looking.
    ForceRefreshFirst,
}

/// Options for [`EntityStore::register_with_options`].
#[derive(Default, Clone)]
pub struct RegisterOptions {
    mapping: Option<TableMapping>,
    initializer: Option<Arc<dyn EntityInitializer>>,
}

impl RegisterOptions {
    /// Default mapping, NULL initial values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom table mapping.
    pub fn mapping(mut self, mapping: TableMapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    /// Use a custom initializer for new entities.
    pub fn initializer(mut self, initializer: impl EntityInitializer + 'static) -> Self {
        self.initializer = Some(Arc::new(initializer));
        self
    }
}

/// Diagnostic snapshot of the store.
#[derive(Debug, Clone)]
pub struct StoreDebugInfo {
    /// Number of registered record types.
    pub registered_types: usize,
    /// Cached entities across all types.
    pub cached_entities: usize,
    /// `(type, table, cached)` per registered type.
    pub types: Vec<(&'static str, String, usize)>,
}

enum RefreshTarget<'k, I> {
    All,
    Keys(&'k [I]),
}

/// A staged row on its way to an INSERT.
struct PendingInsert {
    id: Option<Value>,
    values: Vec<Value>,
}

// ============================================================================
// Entity Store
// ============================================================================

/// Identity-mapped entity store over one connection.
///
/// Register record types once, then read and write them as [`Entity`]
/// handles. Every identifier maps to a single live `Entity` per store.
/// Database work on one record type is serialized; different types proceed
/// independently.
pub struct EntityStore<C: Connection> {
    connection: C,
    config: StoreConfig,
    registry: Registry<C>,
}

impl<C: Connection> EntityStore<C> {
    /// Create a store with the default configuration.
    pub fn new(connection: C) -> Self {
        Self::with_config(connection, StoreConfig::default())
    }

    /// Create a store with a custom configuration.
    pub fn with_config(connection: C, config: StoreConfig) -> Self {
        Self {
            connection,
            config,
            registry: Registry::new(),
        }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// The store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register `R` with its default mapping.
    pub fn register<R: Record>(&self) -> Result<()> {
        self.register_with_options::<R>(RegisterOptions::new())
    }

    /// Register `R` with a custom mapping.
    pub fn register_with<R: Record>(&self, mapping: TableMapping) -> Result<()> {
        self.register_with_options::<R>(RegisterOptions::new().mapping(mapping))
    }

    /// Register `R` with a custom mapping and initializer.
    pub fn register_full<R: Record>(
        &self,
        mapping: TableMapping,
        initializer: impl EntityInitializer + 'static,
    ) -> Result<()> {
        self.register_with_options::<R>(
            RegisterOptions::new().mapping(mapping).initializer(initializer),
        )
    }

    /// Register `R`.
    ///
    /// Reads the catalog for the mapped table and checks that the id column
    /// exists with a type compatible with `R::Id`.
    #[tracing::instrument(level = "debug", skip(self, options), fields(record = std::any::type_name::<R>()))]
    pub fn register_with_options<R: Record>(&self, options: RegisterOptions) -> Result<()> {
        let type_name = std::any::type_name::<R>();
        if self.registry.contains::<R>() {
            return Err(duplicate::<R>());
        }

        let mapping = options.mapping.unwrap_or_else(TableMapping::of::<R>);
        if mapping.record_name() != type_name {
            return Err(Error::invalid_argument(format!(
                "mapping for {} cannot be used to register {}",
                mapping.record_name(),
                type_name
            )));
        }
        let initializer = options
            .initializer
            .unwrap_or_else(|| Arc::new(NullInitializer) as Arc<dyn EntityInitializer>);
        initializer.check(R::fields())?;

        let catalog = self
            .connection
            .table_columns(mapping.table())
            .map_err(|e| e.into_storage("register", type_name, 0))?;

        let id_column = catalog
            .iter()
            .find(|c| c.name == mapping.id_column())
            .cloned()
            .ok_or_else(|| {
                Error::config(
                    ConfigErrorKind::UnresolvedIdType,
                    format!(
                        "table {} has no id column '{}' for {}",
                        mapping.table(),
                        mapping.id_column(),
                        type_name
                    ),
                )
            })?;
        let kind = <R::Id as RecordId>::KIND;
        if !kind.accepts_sql_type(id_column.sql_type) {
            return Err(Error::config(
                ConfigErrorKind::UnresolvedIdType,
                format!(
                    "id column {}.{} has type {}, which cannot hold {:?} ids of {}",
                    mapping.table(),
                    mapping.id_column(),
                    id_column.sql_type.sql_name(),
                    kind,
                    type_name
                ),
            ));
        }

        let field_columns: Vec<Option<ColumnInfo>> = mapping
            .columns()
            .iter()
            .map(|name| catalog.iter().find(|c| c.name == *name).cloned())
            .collect();
        for (field, column) in R::fields().iter().zip(&field_columns) {
            if column.is_none() {
                tracing::debug!(
                    record = type_name,
                    field = field.name,
                    "Field column not reported by catalog; values are sent uncoerced"
                );
            }
        }

        let table = mapping.table().to_string();
        self.registry.insert::<R>(Registration::new(
            mapping,
            id_column,
            field_columns,
            initializer,
        ))?;

        tracing::info!(
            record = type_name,
            table = %table,
            fields = R::fields().len(),
            "Registered record type"
        );
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Look up one entity.
    #[tracing::instrument(level = "debug", skip(self), fields(record = std::any::type_name::<R>()))]
    pub fn get<R: Record>(&self, id: &R::Id, policy: GetPolicy) -> Result<Option<Entity<R>>> {
        let reg = self.registry.get::<R>()?;
        match policy {
            GetPolicy::LocalOnly => Ok(reg.cache.get(id)),
            GetPolicy::ForceRefreshFirst => {
                self.refresh_in(&reg, RefreshTarget::Keys(std::slice::from_ref(id)))?;
                Ok(reg.cache.get(id))
            }
            GetPolicy::FetchIfMissing => match reg.cache.get(id) {
                Some(entity) => Ok(Some(entity)),
                None => {
                    tracing::debug!("Cache miss, fetching");
                    self.refresh_in(&reg, RefreshTarget::Keys(std::slice::from_ref(id)))?;
                    Ok(reg.cache.get(id))
                }
            },
        }
    }

    /// All cached entities of `R`, after a full refresh unless `policy` is
    /// [`GetPolicy::LocalOnly`].
    pub fn get_all<R: Record>(&self, policy: GetPolicy) -> Result<Vec<Entity<R>>> {
        let reg = self.registry.get::<R>()?;
        if policy != GetPolicy::LocalOnly {
            self.refresh_in(&reg, RefreshTarget::All)?;
        }
        Ok(reg.cache.all_values())
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Reload every row of `R`, evicting cached entities whose rows are gone.
    pub fn refresh<R: Record>(&self) -> Result<Vec<Entity<R>>> {
        let reg = self.registry.get::<R>()?;
        self.refresh_in(&reg, RefreshTarget::All)
    }

    /// Reload the given keys, evicting those the database no longer has.
    pub fn refresh_keys<R: Record>(&self, keys: &[R::Id]) -> Result<Vec<Entity<R>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let reg = self.registry.get::<R>()?;
        self.refresh_in(&reg, RefreshTarget::Keys(keys))
    }

    /// Reload the rows behind the given entities.
    pub fn refresh_entities<R: Record>(&self, entities: &[Entity<R>]) -> Result<Vec<Entity<R>>> {
        let keys: Vec<R::Id> = entities.iter().map(|e| e.id().clone()).collect();
        self.refresh_keys::<R>(&keys)
    }

    /// Reload one entity; returns whether its row still exists.
    pub fn refresh_entity<R: Record>(&self, entity: &Entity<R>) -> Result<bool> {
        let found = self.refresh_keys::<R>(std::slice::from_ref(entity.id()))?;
        Ok(!found.is_empty())
    }

    pub(crate) fn refresh_registration<R: Record>(&self, reg: &Registration<R>) -> Result<Vec<Entity<R>>> {
        self.refresh_in(reg, RefreshTarget::All)
    }

    #[tracing::instrument(level = "debug", skip(self, reg, target), fields(record = std::any::type_name::<R>()))]
    fn refresh_in<R: Record>(
        &self,
        reg: &Registration<R>,
        target: RefreshTarget<'_, R::Id>,
    ) -> Result<Vec<Entity<R>>> {
        let type_name = std::any::type_name::<R>();
        let _gate = reg.lock_gate();
        let start = std::time::Instant::now();
        let stmts = Statements::new(&reg.mapping, self.connection.dialect());

        let (expected, rows) = match target {
            RefreshTarget::All => {
                let expected = reg.cache.all_ids();
                let rows = self
                    .connection
                    .query(&stmts.select_all(), &[])
                    .map_err(|e| e.into_storage("refresh", type_name, expected.len()))?;
                (expected, rows)
            }
            RefreshTarget::Keys(keys) => {
                let expected = dedup(keys);
                let mut rows = Vec::new();
                for chunk in self.chunks(&expected) {
                    let fetched = self
                        .select_keys(&stmts, reg, chunk)
                        .map_err(|e| e.into_storage("refresh", type_name, expected.len()))?;
                    rows.extend(fetched);
                }
                (expected, rows)
            }
        };

        // Convert everything before touching the cache.
        let parsed = rows
            .into_iter()
            .map(split_row::<R>)
            .collect::<Result<Vec<_>>>()?;

        let returned: HashSet<R::Id> = parsed.iter().map(|(id, _)| id.clone()).collect();
        let entities = reg.cache.materialize_all(parsed);

        let missing: Vec<&R::Id> = expected.iter().filter(|id| !returned.contains(*id)).collect();
        let evicted = reg.cache.remove_all(missing);
        for entity in &evicted {
            entity.mark_removed();
        }

        tracing::debug!(
            record = type_name,
            fetched = entities.len(),
            evicted = evicted.len(),
            elapsed_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX),
            "Refreshed"
        );
        Ok(entities)
    }

    fn select_keys<R: Record>(
        &self,
        stmts: &Statements<'_>,
        reg: &Registration<R>,
        keys: &[R::Id],
    ) -> Result<Vec<rowmap_core::Row>> {
        let params = self.bind_keys(reg, keys);
        match self.config.key_binding {
            KeyBinding::Parameters => {
                let sql = stmts.select_by_keys(params.len())?;
                self.connection.query(&sql, &params)
            }
            KeyBinding::Inline => {
                let sql = stmts.select_by_keys_inline(&params, reg.id_column.sql_type)?;
                self.connection.query(&sql, &[])
            }
        }
    }

    /// Refresh every registered type using `strategy`.
    ///
    /// A failing type is logged and reported; it does not stop the others.
    #[tracing::instrument(level = "debug", skip(self, strategy))]
    pub fn refresh_all(&self, strategy: &dyn RefreshStrategy) -> RefreshReport {
        let tasks: Vec<RefreshTask<'_>> = self
            .registry
            .handles()
            .into_iter()
            .map(|handle| {
                let type_name = handle.type_name();
                let table = handle.table().to_string();
                RefreshTask::new(type_name, table, move || handle.refresh(self))
            })
            .collect();

        tracing::info!(types = tasks.len(), "Refreshing all registered types");
        let outcomes = strategy.execute(tasks);
        for outcome in &outcomes {
            if let Err(e) = &outcome.result {
                tracing::error!(
                    record = outcome.type_name,
                    table = %outcome.table,
                    error = %e,
                    "Error refreshing record type"
                );
            }
        }
        RefreshReport { outcomes }
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Create one entity per requested id; `None` lets the database generate
    /// the id. Fields start with the registered initializer's values.
    ///
    /// Runs in one transaction. Rows with explicit ids are inserted in one
    /// batch; each generated-id row is inserted on its own to read its key.
    #[tracing::instrument(level = "debug", skip(self, ids), fields(record = std::any::type_name::<R>(), count = ids.len()))]
    pub fn new_objects<R: Record>(&self, ids: Vec<Option<R::Id>>) -> Result<Vec<Entity<R>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let type_name = std::any::type_name::<R>();
        let reg = self.registry.get::<R>()?;
        let _gate = reg.lock_gate();

        let initial = reg.initial_values();
        let pending: Vec<PendingInsert> = ids
            .iter()
            .map(|id| PendingInsert {
                id: id.as_ref().map(RecordId::to_value),
                values: initial.clone(),
            })
            .collect();
        let count = pending.len();

        let resolved = self.in_transaction("new_objects", type_name, count, |tx| {
            self.insert_rows(tx, &reg, &pending)
        })?;

        let entities: Vec<Entity<R>> = resolved
            .into_iter()
            .zip(pending)
            .map(|(id, row)| reg.cache.materialize_or_populate(id, row.values))
            .collect();

        tracing::info!(record = type_name, created = entities.len(), "Created entities");
        Ok(entities)
    }

    /// Create one entity with a generated id.
    pub fn new_object<R: Record>(&self) -> Result<Entity<R>> {
        self.new_objects::<R>(vec![None]).and_then(single)
    }

    /// Create one entity with the given id.
    pub fn new_object_with_id<R: Record>(&self, id: R::Id) -> Result<Entity<R>> {
        self.new_objects::<R>(vec![Some(id)]).and_then(single)
    }

    /// Create `count` entities with generated ids.
    pub fn new_objects_count<R: Record>(&self, count: usize) -> Result<Vec<Entity<R>>> {
        self.new_objects::<R>(vec![None; count])
    }

    /// Open a draft for a new row. `None` lets the database generate the id.
    pub fn stage<R: Record>(&self, id: Option<R::Id>) -> Result<Draft<R>> {
        let reg = self.registry.get::<R>()?;
        Ok(Draft::staged(id, reg.initial_values()))
    }

    /// Insert rows inside `exec`, returning the resolved id of each row in
    /// input order.
    fn insert_rows<R: Record, E: Executor>(
        &self,
        exec: &E,
        reg: &Registration<R>,
        rows: &[PendingInsert],
    ) -> Result<Vec<R::Id>> {
        let stmts = Statements::new(&reg.mapping, self.connection.dialect());
        let mut resolved: Vec<Option<R::Id>> = vec![None; rows.len()];

        let mut explicit_params = Vec::new();
        for (idx, row) in rows.iter().enumerate() {
            if let Some(id) = &row.id {
                let mut params = Vec::with_capacity(row.values.len() + 1);
                params.push(self.bind_id(reg, id.clone()));
                params.extend(self.bind_fields(reg, &row.values));
                explicit_params.push(params);
                resolved[idx] = Some(<R::Id as RecordId>::from_value(id)?);
            }
        }
        if !explicit_params.is_empty() {
            exec.batch_execute(&stmts.insert(), &explicit_params)?;
        }

        let generated_sql = stmts.insert_generated();
        for (idx, row) in rows.iter().enumerate() {
            if row.id.is_some() {
                continue;
            }
            let params = self.bind_fields(reg, &row.values);
            if let Some(raw) = exec.insert(&generated_sql, &params)? {
                resolved[idx] = Some(self.resolve_generated_id::<R>(raw)?);
            }
        }

        let requested = rows.len();
        let found = resolved.iter().filter(|id| id.is_some()).count();
        if found < requested {
            return Err(Error::consistency(format!(
                "{} of {} inserted {} rows reported a key; the driver or table does not return generated keys",
                found,
                requested,
                std::any::type_name::<R>()
            )));
        }
        Ok(resolved.into_iter().flatten().collect())
    }

    fn resolve_generated_id<R: Record>(&self, raw: Value) -> Result<R::Id> {
        let kind = <R::Id as RecordId>::KIND;
        let normalized = if self.config.strict_id_normalization {
            try_normalize_generated_id(kind, &raw).ok_or_else(|| {
                Error::consistency(format!(
                    "generated key {:?} cannot be represented as a {:?} id of {}",
                    raw,
                    kind,
                    std::any::type_name::<R>()
                ))
            })?
        } else {
            normalize_generated_id(kind, raw)
        };
        <R::Id as RecordId>::from_value(&normalized)
    }

    // ========================================================================
    // Persist
    // ========================================================================

    /// Write finished drafts in one transaction: inserts first, then a batch
    /// of updates. Clean bound drafts are not written.
    ///
    /// The cache reflects the written values only after the commit succeeds.
    /// An update lands on the entity currently cached for its id, which may
    /// be a newer instance than the one the draft came from. An update whose
    /// row no longer exists fails with a consistency error and nothing is
    /// written. Returns one entity per input, in input order.
    #[tracing::instrument(level = "debug", skip(self, items), fields(record = std::any::type_name::<R>(), count = items.len()))]
    pub fn persist<R: Record>(&self, items: Vec<Persistable<R>>) -> Result<Vec<Entity<R>>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let type_name = std::any::type_name::<R>();
        let reg = self.registry.get::<R>()?;
        let _gate = reg.lock_gate();

        enum Slot<R: Record> {
            Insert(usize),
            Update(Entity<R>, Vec<Value>),
            Clean(Entity<R>),
        }

        let mut inserts = Vec::new();
        let mut slots = Vec::with_capacity(items.len());
        let mut update_params = Vec::new();
        let mut update_ids = Vec::new();
        for item in items {
            let (lifecycle, id, values, entity, dirty) = item.into_parts();
            match (lifecycle, entity) {
                (Lifecycle::Bound, Some(entity)) if dirty => {
                    let mut params = self.bind_fields(&reg, &values);
                    params.push(self.bind_id(&reg, entity.id().to_value()));
                    update_params.push(params);
                    update_ids.push(entity.id().to_value());
                    slots.push(Slot::Update(entity, values));
                }
                (Lifecycle::Bound, Some(entity)) => slots.push(Slot::Clean(entity)),
                _ => {
                    slots.push(Slot::Insert(inserts.len()));
                    inserts.push(PendingInsert {
                        id: id.as_ref().map(RecordId::to_value),
                        values,
                    });
                }
            }
        }

        let rows = inserts.len() + update_params.len();
        if rows == 0 {
            tracing::debug!("Nothing to write");
        }
        let stmts = Statements::new(&reg.mapping, self.connection.dialect());
        let update_sql = stmts.update();

        let inserted_ids = if rows == 0 {
            Vec::new()
        } else {
            self.in_transaction("persist", type_name, rows, |tx| {
                let ids = if inserts.is_empty() {
                    Vec::new()
                } else {
                    self.insert_rows(tx, &reg, &inserts)?
                };
                if let (Some(sql), false) = (&update_sql, update_params.is_empty()) {
                    let counts = tx.batch_execute(sql, &update_params)?;
                    if let Some((id, _)) = update_ids.iter().zip(&counts).find(|(_, n)| **n == 0) {
                        return Err(Error::consistency(format!(
                            "no {} row with id {:?} to update",
                            reg.mapping.table(),
                            id
                        )));
                    }
                }
                Ok(ids)
            })?
        };

        // Committed; reconcile the cache from the written values.
        let mut inserted: Vec<Option<(R::Id, Vec<Value>)>> = inserted_ids
            .into_iter()
            .zip(inserts)
            .map(|(id, row)| Some((id, row.values)))
            .collect();
        let entities: Vec<Entity<R>> = slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Insert(idx) => inserted
                    .get_mut(idx)
                    .and_then(Option::take)
                    .map(|(id, values)| reg.cache.materialize_or_populate(id, values)),
                Slot::Update(entity, values) => match reg.cache.get(entity.id()) {
                    Some(cached) => {
                        cached.populate(values);
                        Some(cached)
                    }
                    None => {
                        entity.populate(values);
                        Some(entity)
                    }
                },
                Slot::Clean(entity) => Some(entity),
            })
            .collect();

        tracing::info!(
            record = type_name,
            inserted = inserted.len(),
            updated = update_params.len(),
            "Persisted entities"
        );
        Ok(entities)
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Delete rows by id in one transaction, then evict them from the cache.
    ///
    /// Ids without a row are not an error. Returns the number of rows the
    /// database reported deleted.
    #[tracing::instrument(level = "debug", skip(self, ids), fields(record = std::any::type_name::<R>(), count = ids.len()))]
    pub fn delete<R: Record>(&self, ids: &[R::Id]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let type_name = std::any::type_name::<R>();
        let reg = self.registry.get::<R>()?;
        let _gate = reg.lock_gate();
        let keys = dedup(ids);
        let stmts = Statements::new(&reg.mapping, self.connection.dialect());

        let affected = self.in_transaction("delete", type_name, keys.len(), |tx| {
            let mut affected = 0;
            for chunk in self.chunks(&keys) {
                let params = self.bind_keys(&reg, chunk);
                affected += match self.config.key_binding {
                    KeyBinding::Parameters => tx.execute(&stmts.delete(params.len())?, &params)?,
                    KeyBinding::Inline => tx.execute(
                        &stmts.delete_inline(&params, reg.id_column.sql_type)?,
                        &[],
                    )?,
                };
            }
            Ok(affected)
        })?;

        let evicted = reg.cache.remove_all(&keys);
        for entity in &evicted {
            entity.mark_removed();
        }
        tracing::info!(
            record = type_name,
            requested = keys.len(),
            deleted = affected,
            evicted = evicted.len(),
            "Deleted entities"
        );
        Ok(affected)
    }

    /// Delete the rows behind the given entities.
    pub fn delete_entities<R: Record>(&self, entities: &[Entity<R>]) -> Result<u64> {
        let ids: Vec<R::Id> = entities.iter().map(|e| e.id().clone()).collect();
        let affected = self.delete::<R>(&ids)?;
        for entity in entities {
            entity.mark_removed();
        }
        Ok(affected)
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Whether `R` is registered.
    pub fn is_registered<R: Record>(&self) -> bool {
        self.registry.contains::<R>()
    }

    /// Number of cached entities of `R`.
    pub fn cached_count<R: Record>(&self) -> Result<usize> {
        Ok(self.registry.get::<R>()?.cache.len())
    }

    /// Tables of all registered types, in registration order.
    pub fn registered_tables(&self) -> Vec<String> {
        self.registry
            .handles()
            .iter()
            .map(|h| h.table().to_string())
            .collect()
    }

    /// Dump store state for debugging.
    pub fn debug_state(&self) -> StoreDebugInfo {
        let types: Vec<(&'static str, String, usize)> = self
            .registry
            .handles()
            .iter()
            .map(|h| (h.type_name(), h.table().to_string(), h.cached_len()))
            .collect();
        StoreDebugInfo {
            registered_types: self.registry.len(),
            cached_entities: types.iter().map(|(_, _, n)| n).sum(),
            types,
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Run `body` in a write transaction. On error the transaction is rolled
    /// back and driver failures are wrapped with storage context.
    fn in_transaction<'c, T>(
        &'c self,
        operation: &'static str,
        type_name: &'static str,
        rows: usize,
        body: impl FnOnce(&C::Tx<'c>) -> Result<T>,
    ) -> Result<T> {
        let tx = self
            .connection
            .begin_with(self.config.write_isolation)
            .map_err(|e| e.into_storage(operation, type_name, rows))?;
        match body(&tx) {
            Ok(value) => {
                tx.commit()
                    .map_err(|e| e.into_storage(operation, type_name, rows))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    tracing::warn!(
                        operation,
                        record = type_name,
                        error = %rollback,
                        "Rollback failed"
                    );
                }
                tracing::debug!(operation, record = type_name, error = %e, "Rolled back");
                Err(e.into_storage(operation, type_name, rows))
            }
        }
    }

    fn chunks<'k, I>(&self, keys: &'k [I]) -> std::slice::Chunks<'k, I> {
        let size = self
            .config
            .max_keys_per_statement
            .filter(|n| *n > 0)
            .unwrap_or(keys.len())
            .max(1);
        keys.chunks(size)
    }

    fn bind_id<R: Record>(&self, reg: &Registration<R>, id: Value) -> Value {
        self.connection.dialect().safe_type(Some(&reg.id_column), id)
    }

    fn bind_keys<R: Record>(&self, reg: &Registration<R>, keys: &[R::Id]) -> Vec<Value> {
        keys.iter().map(|k| self.bind_id(reg, k.to_value())).collect()
    }

    fn bind_fields<R: Record>(&self, reg: &Registration<R>, values: &[Value]) -> Vec<Value> {
        let dialect = self.connection.dialect();
        values
            .iter()
            .enumerate()
            .map(|(idx, v)| {
                let column = reg.field_columns.get(idx).and_then(Option::as_ref);
                dialect.safe_type(column, v.clone())
            })
            .collect()
    }
}

fn single<R: Record>(mut entities: Vec<Entity<R>>) -> Result<Entity<R>> {
    entities
        .pop()
        .ok_or_else(|| Error::consistency("insert returned no entity"))
}

fn dedup<I: Clone + Eq + std::hash::Hash>(keys: &[I]) -> Vec<I> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.iter().filter(|k| seen.insert(*k)).cloned().collect()
}
