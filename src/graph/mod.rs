//! Graph-to-SQL compiler
//!
//! Each entry point takes a validated spec and an injected driver, renders
//! the statements for the driver's dialect and executes them. Multi-statement
//! mutations run through a [`Session`], which owns the transaction when the
//! driver can open one.

mod create;
mod delete;
mod edges;
mod query;
mod step;
mod update;

pub use create::create_node;
pub use delete::delete_nodes;
pub use query::{count_nodes, query_edges, query_nodes, select_rows};
pub(crate) use query::selector as query_selector;
pub use step::{has_neighbors, has_neighbors_with, neighbors};
pub use update::{update_node, update_nodes};

use crate::driver::{Driver, ExecResult, Row, Tx};
use crate::error::{EntError, MutationStep, Result};
use crate::sql::{Dialect, Statement};
use crate::value::{Id, IdType};

/// Statement executor for one logical operation.
pub(crate) struct Session<'a> {
    driver: &'a dyn Driver,
    tx: Option<Box<dyn Tx>>,
    /// Mutating statements applied so far.
    applied: usize,
}

impl<'a> Session<'a> {
    /// Run statements straight against the pool.
    pub(crate) fn direct(driver: &'a dyn Driver) -> Self {
        Self {
            driver,
            tx: None,
            applied: 0,
        }
    }

    /// Open a transaction when the driver supports one.
    pub(crate) async fn begin(driver: &'a dyn Driver) -> Result<Self> {
        let tx = driver.begin().await?;
        if tx.is_none() && !driver.in_transaction() {
            tracing::debug!("Driver cannot open transactions; running statements directly");
        }
        Ok(Self {
            driver,
            tx,
            applied: 0,
        })
    }

    pub(crate) fn dialect(&self) -> Dialect {
        self.driver.dialect()
    }

    pub(crate) async fn exec(&mut self, stmt: &Statement) -> Result<ExecResult> {
        tracing::debug!(sql = %stmt.sql, args = ?stmt.args, "Executing statement");
        let result = match self.tx.as_mut() {
            Some(tx) => tx.exec(stmt).await?,
            None => self.driver.exec(stmt).await?,
        };
        self.applied += 1;
        Ok(result)
    }

    pub(crate) async fn query(&mut self, stmt: &Statement) -> Result<Vec<Row>> {
        tracing::debug!(sql = %stmt.sql, args = ?stmt.args, "Executing query");
        let rows = match self.tx.as_mut() {
            Some(tx) => tx.query(stmt).await?,
            None => self.driver.query(stmt).await?,
        };
        Ok(rows)
    }

    /// Attribute a failure to a mutation step. Outside any transaction, a
    /// failure after earlier statements landed is reported as `Partial`.
    pub(crate) fn fail(&self, step: MutationStep, err: EntError) -> EntError {
        if self.tx.is_none() && !self.driver.in_transaction() && self.applied > 0 {
            EntError::Partial {
                step,
                source: Box::new(err),
            }
        } else {
            err
        }
    }

    /// Commit on success, roll back on failure.
    pub(crate) async fn finish<T>(self, result: Result<T>) -> Result<T> {
        match (self.tx, result) {
            (Some(tx), Ok(value)) => {
                tx.commit().await?;
                Ok(value)
            }
            (Some(tx), Err(err)) => {
                match tx.rollback().await {
                    Ok(()) => tracing::warn!(error = %err, "Rolled back transaction"),
                    Err(rollback) => {
                        tracing::warn!(error = %err, rollback_error = %rollback, "Rollback failed")
                    }
                }
                Err(err)
            }
            (None, result) => result,
        }
    }
}

/// Read the first cell of every row as an id.
pub(crate) fn ids_from_rows(rows: &[Row], ty: IdType, column: &str) -> Result<Vec<Id>> {
    rows.iter()
        .map(|row| {
            let value = row.values.first().cloned().unwrap_or_default();
            Id::from_value(&value, ty).ok_or_else(|| EntError::Decode {
                column: column.to_string(),
                message: format!("expected {} id, got {}", ty, value.kind()),
            })
        })
        .collect()
}
