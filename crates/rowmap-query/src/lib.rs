//! Table mappings and SQL statement generation for rowmap.
//!
//! A [`TableMapping`] binds a record type to a table, its id column and one
//! column per field. [`Statements`] turns a mapping into the handful of
//! statement shapes the entity store needs: select all, select by key set,
//! insert (explicit or generated id), update by id, and delete by key set.
//!
//! Statement generation is pure. Every identifier goes through
//! [`SqlDialect::escape_identifier`](rowmap_core::SqlDialect::escape_identifier)
//! and every placeholder through
//! [`SqlDialect::placeholder`](rowmap_core::SqlDialect::placeholder).

pub mod mapping;
pub mod statement;

pub use mapping::TableMapping;
pub use statement::Statements;
