//! Driver abstraction
//!
//! The compiler never opens connections. It is handed a [`Driver`] that can
//! execute statements, run queries and report its dialect. Backends that can
//! open transactions return a [`Tx`] from [`Driver::begin`].

#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;

use crate::sql::{Dialect, Statement};
use crate::value::Value;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDriver;

/// One result row, with cells in projection order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Cell for a column by name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Take ownership of a cell, leaving `Null` in its place.
    pub fn take(&mut self, column: &str) -> Option<Value> {
        let i = self.columns.iter().position(|c| c == column)?;
        self.values.get_mut(i).map(std::mem::take)
    }
}

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Rowid of the last inserted row, where the backend reports one.
    pub last_insert_id: Option<i64>,
}

/// Category of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    UniqueViolation,
    ForeignKeyViolation,
    NotNullViolation,
    CheckViolation,
    Timeout,
    Other,
}

impl DriverErrorKind {
    pub fn is_constraint(&self) -> bool {
        matches!(
            self,
            DriverErrorKind::UniqueViolation
                | DriverErrorKind::ForeignKeyViolation
                | DriverErrorKind::NotNullViolation
                | DriverErrorKind::CheckViolation
        )
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("driver error ({kind:?}): {message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A pooled SQL backend.
#[async_trait]
pub trait Driver: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Execute a statement that returns no rows.
    async fn exec(&self, stmt: &Statement) -> Result<ExecResult, DriverError>;

    /// Execute a query and collect its rows.
    async fn query(&self, stmt: &Statement) -> Result<Vec<Row>, DriverError>;

    /// Open a transaction, or `None` when the backend cannot.
    async fn begin(&self) -> Result<Option<Box<dyn Tx>>, DriverError>;

    /// True when every statement already runs inside a caller-owned
    /// transaction, so operations must not open their own.
    fn in_transaction(&self) -> bool {
        false
    }
}

/// An open transaction. Dropping it without `commit` rolls it back.
#[async_trait]
pub trait Tx: Send {
    async fn exec(&mut self, stmt: &Statement) -> Result<ExecResult, DriverError>;

    async fn query(&mut self, stmt: &Statement) -> Result<Vec<Row>, DriverError>;

    async fn commit(self: Box<Self>) -> Result<(), DriverError>;

    async fn rollback(self: Box<Self>) -> Result<(), DriverError>;
}
