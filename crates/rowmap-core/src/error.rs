//! Error types for rowmap.
//!
//! Errors fall into four families:
//!
//! - **Configuration** ([`ConfigError`]): unregistered types, duplicate
//!   registration, unresolvable id types, unknown field names. These are
//!   programming errors and are never retried.
//! - **Query** ([`QueryError`]): a failure reported by the driver for a single
//!   statement.
//! - **Storage** ([`StorageError`]): a driver failure wrapped by the entity store
//!   with the operation, record type and row count it was working on. The
//!   enclosing transaction has been rolled back by the time it is returned.
//! - **Consistency** ([`ConsistencyError`]): the database behaved in a way the
//!   store cannot reconcile, e.g. it did not report a generated key.
//!
//! Value conversion failures are reported as [`TypeError`].

use std::error::Error as StdError;
use std::fmt;

use crate::value::Value;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for all rowmap operations.
#[derive(Debug)]
pub enum Error {
    /// Misuse of the API or invalid registration.
    Config(ConfigError),
    /// Statement failure reported by the driver.
    Query(QueryError),
    /// Driver failure wrapped with entity-store context.
    Storage(StorageError),
    /// The database result cannot be reconciled with the cache.
    Consistency(ConsistencyError),
    /// A value could not be converted to the requested type.
    Type(TypeError),
}

impl Error {
    /// Build a configuration error.
    pub fn config(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            kind,
            message: message.into(),
        })
    }

    /// Shorthand for an `InvalidArgument` configuration error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::config(ConfigErrorKind::InvalidArgument, message)
    }

    /// Build a driver-level query error.
    pub fn query(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Error::Query(QueryError {
            kind,
            message: message.into(),
            sql: None,
        })
    }

    /// Build a consistency error.
    pub fn consistency(message: impl Into<String>) -> Self {
        Error::Consistency(ConsistencyError {
            message: message.into(),
        })
    }

    /// Build a conversion error for `actual` when `expected` was wanted.
    pub fn type_mismatch(expected: &'static str, actual: &Value) -> Self {
        Error::Type(TypeError {
            expected,
            actual: actual.type_name(),
            column: None,
        })
    }

    /// Wrap this error with storage context.
    ///
    /// Only driver-level failures are wrapped. Configuration, consistency and
    /// conversion errors are returned unchanged, and an error that already
    /// carries storage context keeps its original context.
    pub fn into_storage(self, operation: &'static str, type_name: &'static str, rows: usize) -> Self {
        match self {
            Error::Query(_) => Error::Storage(StorageError {
                operation,
                type_name,
                rows,
                source: Box::new(self),
            }),
            other => other,
        }
    }

    /// Whether this is a configuration (invalid argument) error.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// The configuration error kind, if this is a configuration error.
    pub fn config_kind(&self) -> Option<ConfigErrorKind> {
        match self {
            Error::Config(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Whether this is a wrapped storage error.
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    /// Whether this is a consistency error.
    pub fn is_consistency(&self) -> bool {
        matches!(self, Error::Consistency(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "{}", e),
            Error::Query(e) => write!(f, "{}", e),
            Error::Storage(e) => write!(f, "{}", e),
            Error::Consistency(e) => write!(f, "{}", e),
            Error::Type(e) => write!(f, "{}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Storage(e) => Some(e.source.as_ref()),
            _ => None,
        }
    }
}

/// Kind of configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// The record type has not been registered with the store.
    Unregistered,
    /// The record type is already registered.
    DuplicateRegistration,
    /// The id column could not be resolved against the catalog.
    UnresolvedIdType,
    /// A field name does not exist on the record type.
    UnknownField,
    /// Any other invalid argument.
    InvalidArgument,
}

/// Misuse of the API.
#[derive(Debug, Clone)]
pub struct ConfigError {
    /// What went wrong.
    pub kind: ConfigErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid argument ({:?}): {}", self.kind, self.message)
    }
}

/// Kind of driver-level query error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// SQL syntax or shape not understood by the server.
    Syntax,
    /// Constraint violation (unique, foreign key, not null).
    Constraint,
    /// Parameter count or type mismatch.
    Parameter,
    /// Transaction control failed.
    Transaction,
    /// Anything else reported by the database.
    Database,
}

/// Statement failure reported by a driver.
#[derive(Debug, Clone)]
pub struct QueryError {
    /// Classification.
    pub kind: QueryErrorKind,
    /// Message from the driver.
    pub message: String,
    /// Statement text, if known.
    pub sql: Option<String>,
}

impl QueryError {
    /// Attach the statement text.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query error ({:?}): {}", self.kind, self.message)?;
        if let Some(sql) = &self.sql {
            write!(f, " [sql: {}]", sql)?;
        }
        Ok(())
    }
}

/// Driver failure wrapped with entity-store context.
#[derive(Debug)]
pub struct StorageError {
    /// Store operation, e.g. `"persist"` or `"refresh"`.
    pub operation: &'static str,
    /// Record type name.
    pub type_name: &'static str,
    /// Number of rows/keys the operation was handling.
    pub rows: usize,
    /// Underlying driver error.
    pub source: Box<Error>,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "database error during {} of {} {}: {}",
            self.operation, self.rows, self.type_name, self.source
        )
    }
}

/// The database result cannot be reconciled with the cache.
#[derive(Debug, Clone)]
pub struct ConsistencyError {
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for ConsistencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consistency error: {}", self.message)
    }
}

/// A value could not be converted.
#[derive(Debug, Clone)]
pub struct TypeError {
    /// Expected SQL type name.
    pub expected: &'static str,
    /// Actual value variant name.
    pub actual: &'static str,
    /// Column or field, if known.
    pub column: Option<String>,
}

impl TypeError {
    /// Attach the column or field the value belonged to.
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(col) => write!(
                f,
                "type error in '{}': expected {}, found {}",
                col, self.expected, self.actual
            ),
            None => write!(f, "type error: expected {}, found {}", self.expected, self.actual),
        }
    }
}
