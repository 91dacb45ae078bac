//! rowmap: identity-mapped entities over relational tables.
//!
//! Declare a record with `#[derive(Record)]`, register it with an
//! [`EntityStore`], and work with shared [`Entity`] handles. Each row is
//! materialized once per store; reads of the same id return the same handle,
//! and writes go out in batched transactions.
//!
//! # Crates
//!
//! - `rowmap-core`: values, errors, record metadata and the driver contracts
//! - `rowmap-query`: table mappings and SQL statement text
//! - `rowmap-session`: the entity store, identity caches and refresh strategies
//! - `rowmap-macros`: `#[derive(Record)]`
//!
//! # Example
//!
//! ```ignore
//! use rowmap::prelude::*;
//!
//! #[derive(Record, Debug, Clone, Default)]
//! #[rowmap(table = "widgets", id = i64)]
//! struct Widget {
//!     name: String,
//!     price: i32,
//! }
//!
//! let store = EntityStore::new(connection);
//! store.register_full::<Widget>(
//!     TableMapping::of::<Widget>(),
//!     FieldDefaults::new().with("name", "").with("price", 0),
//! )?;
//!
//! let widget = store.new_object::<Widget>()?;
//! let mut draft = widget.modify();
//! draft.set_price(12)?;
//! store.persist(vec![draft.finish()])?;
//! assert_eq!(widget.price()?, 12);
//! ```

pub use rowmap_core::{
    ColumnInfo, ConfigErrorKind, Connection, Dialect, Error, Executor, FieldInfo, FieldRead,
    FieldWrite, FieldsSet, FromValue, HasSqlType, IdKind, IsolationLevel, QueryErrorKind, Record,
    RecordId, Result, Row, SqlDialect, SqlType, TransactionOps, Value,
};
pub use rowmap_macros::Record;
pub use rowmap_query::{Statements, TableMapping};
pub use rowmap_session::{
    Draft, Entity, EntityInitializer, EntityStore, FieldDefaults, GetPolicy, IdentityCache,
    KeyBinding, Lifecycle, NullInitializer, Persistable, RecordDefaults, RefreshOutcome,
    RefreshReport, RefreshStrategy, RegisterOptions, Sequential, StoreConfig, StoreDebugInfo,
    Threaded,
};

/// Error details, for matching on failure kinds.
pub mod error {
    pub use rowmap_core::error::*;
}

/// The in-memory test connection.
#[cfg(feature = "testing")]
pub mod testing {
    pub use rowmap_session::testing::*;
}

/// Everything needed to declare records and use a store.
pub mod prelude {
    pub use crate::{
        Draft, Entity, EntityStore, Error, FieldDefaults, FieldRead, FieldWrite, GetPolicy,
        Persistable, Record, RecordDefaults, Result, Sequential, StoreConfig, TableMapping,
        Threaded, Value,
    };
}
