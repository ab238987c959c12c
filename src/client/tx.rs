//! Caller-owned transactions
//!
//! [`Client::tx`] opens one transaction and hands back a [`TxClient`]. Every
//! builder created from it shares that transaction; nothing is visible to
//! other connections until [`TxClient::commit`]. Dropping the client without
//! committing rolls the work back.

use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::Client;
use crate::driver::{Driver, DriverError, DriverErrorKind, ExecResult, Row, Tx};
use crate::error::{EntError, Result};
use crate::sql::{Dialect, Statement};

/// A [`Client`] bound to one open transaction.
pub struct TxClient {
    client: Client,
    driver: Arc<TxDriver>,
}

impl std::fmt::Debug for TxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxClient").finish_non_exhaustive()
    }
}

impl TxClient {
    pub(super) fn new(parent: &Client, tx: Box<dyn Tx>) -> Self {
        let driver = Arc::new(TxDriver {
            dialect: parent.driver.dialect(),
            tx: Mutex::new(Some(tx)),
        });
        let client = Client {
            driver: Arc::clone(&driver) as Arc<dyn Driver>,
            config: Arc::clone(&parent.config),
        };
        Self { client, driver }
    }

    /// The client whose builders run inside this transaction.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn commit(self) -> Result<()> {
        let tx = self.driver.finish().await?;
        tx.commit().await?;
        tracing::debug!("Committed transaction");
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        let tx = self.driver.finish().await?;
        tx.rollback().await?;
        tracing::debug!("Rolled back transaction");
        Ok(())
    }
}

impl Deref for TxClient {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.client
    }
}

/// Routes every statement through the shared transaction.
struct TxDriver {
    dialect: Dialect,
    tx: Mutex<Option<Box<dyn Tx>>>,
}

impl TxDriver {
    async fn finish(&self) -> Result<Box<dyn Tx>> {
        self.tx
            .lock()
            .await
            .take()
            .ok_or_else(|| EntError::Transaction("transaction already finished".into()))
    }
}

fn done() -> DriverError {
    DriverError::new(
        DriverErrorKind::Other,
        "transaction has already been committed or rolled back",
    )
}

#[async_trait]
impl Driver for TxDriver {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn exec(&self, stmt: &Statement) -> Result<ExecResult, DriverError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(done)?;
        tx.exec(stmt).await
    }

    async fn query(&self, stmt: &Statement) -> Result<Vec<Row>, DriverError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(done)?;
        tx.query(stmt).await
    }

    async fn begin(&self) -> Result<Option<Box<dyn Tx>>, DriverError> {
        Ok(None)
    }

    fn in_transaction(&self) -> bool {
        true
    }
}
