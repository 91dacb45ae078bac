//! Core types and traits for rowmap.
//!
//! `rowmap-core` is the **foundation layer** for the workspace. It defines the
//! value model shared by every other crate and the contracts the entity store
//! expects from its external collaborators.
//!
//! # Role In The Architecture
//!
//! - **Contract layer**: `Record` is implemented by user record types (usually via
//!   `#[derive(Record)]`), while `Connection`, `TransactionOps` and `SqlDialect`
//!   are implemented by database drivers.
//! - **Data model**: `Value`, `Row`, `SqlType` and `ColumnInfo` represent statement
//!   inputs/outputs and catalog metadata.
//! - **Errors**: a single `Error` type separates configuration, storage,
//!   consistency and conversion failures.
//!
//! # Who Uses This Crate
//!
//! - `rowmap-query` turns `Record` metadata into dialect-correct SQL text.
//! - `rowmap-session` drives `Connection` round trips and owns the identity cache.
//! - `rowmap-macros` generates `Record` implementations defined here.
//!
//! Most applications should use the `rowmap` facade; reach for `rowmap-core`
//! directly when writing drivers or dialects.

pub mod connection;
pub mod dialect;
pub mod error;
pub mod fields_set;
pub mod identifiers;
pub mod record;
pub mod row;
pub mod types;
pub mod value;

pub use connection::{Connection, Executor, IsolationLevel, TransactionOps};
pub use dialect::{Dialect, SqlDialect};
pub use error::{
    ConfigError, ConfigErrorKind, ConsistencyError, Error, QueryError, QueryErrorKind, Result,
    StorageError, TypeError,
};
pub use fields_set::FieldsSet;
pub use identifiers::{quote_ident, quote_ident_mysql, sanitize_identifier};
pub use record::{FieldInfo, FieldRead, FieldWrite, IdKind, Record, RecordId, field_index};
pub use row::Row;
pub use types::{ColumnInfo, HasSqlType, SqlType};
pub use value::{FromValue, Value};
