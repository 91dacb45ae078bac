//! Contracts for the executor, transaction and catalog collaborators.
//!
//! The entity store does not talk to a database directly. A driver provides a
//! [`Connection`], which can run statements on its own (autocommit), describe
//! table columns, and open a transaction. All calls block until the round trip
//! completes; timeouts and cancellation belong to the driver.

use serde::{Deserialize, Serialize};

use crate::dialect::SqlDialect;
use crate::error::Result;
use crate::row::Row;
use crate::types::ColumnInfo;
use crate::value::Value;

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Dirty reads allowed. Used for writes unless configured otherwise.
    #[default]
    ReadUncommitted,
    /// Only committed data is visible.
    ReadCommitted,
    /// Repeated reads within the transaction see the same rows.
    RepeatableRead,
    /// Full serializability.
    Serializable,
}

impl IsolationLevel {
    /// SQL keywords for `SET TRANSACTION ISOLATION LEVEL ...`.
    pub const fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Statement execution.
pub trait Executor {
    /// Run a query and return all rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run a statement and return the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Run a single-row INSERT and return the generated key, if the driver
    /// reports one.
    fn insert(&self, sql: &str, params: &[Value]) -> Result<Option<Value>>;

    /// Run one statement shape once per parameter row, in order, and return
    /// the affected-row count for each. Counts are matched rows, so an update
    /// that leaves a row unchanged still reports 1.
    ///
    /// An error may leave earlier rows of the batch applied; callers that need
    /// atomicity run batches inside a transaction.
    fn batch_execute(&self, sql: &str, rows: &[Vec<Value>]) -> Result<Vec<u64>> {
        rows.iter().map(|params| self.execute(sql, params)).collect()
    }
}

/// An open transaction.
///
/// Dropping a transaction without calling [`commit`](Self::commit) must roll
/// it back.
pub trait TransactionOps: Executor {
    /// Commit the transaction.
    fn commit(self) -> Result<()>;

    /// Roll back the transaction.
    fn rollback(self) -> Result<()>;
}

/// A database connection.
pub trait Connection: Executor + Send + Sync {
    /// Transaction type borrowed from this connection.
    type Tx<'conn>: TransactionOps
    where
        Self: 'conn;

    /// Formatter used for all SQL text sent over this connection.
    fn dialect(&self) -> &dyn SqlDialect;

    /// Column metadata for `table`. An unknown table yields an empty list.
    fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Begin a transaction at the given isolation level.
    fn begin_with(&self, isolation: IsolationLevel) -> Result<Self::Tx<'_>>;

    /// Begin a transaction at the default isolation level.
    fn begin(&self) -> Result<Self::Tx<'_>> {
        self.begin_with(IsolationLevel::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_sql() {
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadUncommitted);
        assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
    }

    #[test]
    fn test_isolation_serde() {
        let json = serde_json::to_string(&IsolationLevel::RepeatableRead).unwrap();
        assert_eq!(json, "\"repeatable_read\"");
        let back: IsolationLevel = serde_json::from_str("\"read_committed\"").unwrap();
        assert_eq!(back, IsolationLevel::ReadCommitted);
    }
}
