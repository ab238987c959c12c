//! SQLite driver over a sqlx connection pool

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Sqlite, Transaction, TypeInfo, ValueRef};
use sqlx::Row as _;

use super::{Driver, DriverError, DriverErrorKind, ExecResult, Row, Tx};
use crate::config::EngineConfig;
use crate::sql::{Dialect, Statement};
use crate::value::Value;

/// Driver backed by a `SqlitePool`.
#[derive(Clone)]
pub struct SqliteDriver {
    pool: SqlitePool,
    statement_timeout: Option<Duration>,
}

impl SqliteDriver {
    /// Wrap an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            statement_timeout: None,
        }
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    /// Open a pool as described by the configuration.
    ///
    /// An in-memory database lives only as long as its connection, so the
    /// pool is pinned to a single connection that is never recycled.
    pub async fn connect(config: &EngineConfig) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new().acquire_timeout(config.acquire_timeout);
        pool_options = if config.is_in_memory() {
            pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(config.max_connections)
        };

        let pool = pool_options.connect_with(options).await?;
        tracing::debug!(url = %config.database_url, "Connected SQLite pool");

        Ok(Self {
            pool,
            statement_timeout: config.statement_timeout,
        })
    }

    /// A fresh private in-memory database.
    pub async fn in_memory() -> anyhow::Result<Self> {
        Self::connect(&EngineConfig::default()).await
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn exec(&self, stmt: &Statement) -> Result<ExecResult, DriverError> {
        let result = timed(self.statement_timeout, bind(stmt).execute(&self.pool)).await?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()),
        })
    }

    async fn query(&self, stmt: &Statement) -> Result<Vec<Row>, DriverError> {
        let rows = timed(self.statement_timeout, bind(stmt).fetch_all(&self.pool)).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn begin(&self) -> Result<Option<Box<dyn Tx>>, DriverError> {
        let tx = self.pool.begin().await.map_err(map_err)?;
        Ok(Some(Box::new(SqliteTx {
            tx,
            statement_timeout: self.statement_timeout,
        })))
    }
}

/// An open SQLite transaction.
pub struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
    statement_timeout: Option<Duration>,
}

#[async_trait]
impl Tx for SqliteTx {
    async fn exec(&mut self, stmt: &Statement) -> Result<ExecResult, DriverError> {
        let result = timed(self.statement_timeout, bind(stmt).execute(&mut *self.tx)).await?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()),
        })
    }

    async fn query(&mut self, stmt: &Statement) -> Result<Vec<Row>, DriverError> {
        let rows = timed(self.statement_timeout, bind(stmt).fetch_all(&mut *self.tx)).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn commit(self: Box<Self>) -> Result<(), DriverError> {
        self.tx.commit().await.map_err(map_err)
    }

    async fn rollback(self: Box<Self>) -> Result<(), DriverError> {
        self.tx.rollback().await.map_err(map_err)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Build a sqlx query with every argument bound in order.
fn bind(stmt: &Statement) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    let mut query = sqlx::query(&stmt.sql);
    for value in &stmt.args {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::String(s) => query.bind(s.as_str()),
            Value::Bytes(b) => query.bind(b.as_slice()),
            Value::Time(t) => query.bind(t.to_rfc3339()),
        };
    }
    query
}

async fn timed<T, F>(timeout: Option<Duration>, fut: F) -> Result<T, DriverError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result.map_err(map_err),
            Err(_) => Err(DriverError::new(
                DriverErrorKind::Timeout,
                format!("statement exceeded {:?}", limit),
            )),
        },
        None => fut.await.map_err(map_err),
    }
}

/// Decode a row into dynamic values using each cell's storage class.
fn decode_row(row: &SqliteRow) -> Result<Row, DriverError> {
    let mut columns = Vec::with_capacity(row.columns().len());
    let mut values = Vec::with_capacity(row.columns().len());

    for (i, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());

        let raw = row.try_get_raw(i).map_err(map_err)?;
        if raw.is_null() {
            values.push(Value::Null);
            continue;
        }
        let type_name = raw.type_info().name().to_string();
        let value = match type_name.as_str() {
            "INTEGER" | "BOOLEAN" => Value::Int(row.try_get::<i64, _>(i).map_err(map_err)?),
            "REAL" | "NUMERIC" => Value::Float(row.try_get::<f64, _>(i).map_err(map_err)?),
            "BLOB" => Value::Bytes(row.try_get::<Vec<u8>, _>(i).map_err(map_err)?),
            _ => Value::String(row.try_get::<String, _>(i).map_err(map_err)?),
        };
        values.push(value);
    }

    Ok(Row::new(columns, values))
}

fn map_err(err: sqlx::Error) -> DriverError {
    match &err {
        sqlx::Error::Database(db) => {
            let kind = match db.kind() {
                sqlx::error::ErrorKind::UniqueViolation => DriverErrorKind::UniqueViolation,
                sqlx::error::ErrorKind::ForeignKeyViolation => DriverErrorKind::ForeignKeyViolation,
                sqlx::error::ErrorKind::NotNullViolation => DriverErrorKind::NotNullViolation,
                sqlx::error::ErrorKind::CheckViolation => DriverErrorKind::CheckViolation,
                _ => DriverErrorKind::Other,
            };
            DriverError::new(kind, db.message())
        }
        sqlx::Error::PoolTimedOut => DriverError::new(DriverErrorKind::Timeout, err.to_string()),
        _ => DriverError::new(DriverErrorKind::Other, err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    async fn driver() -> SqliteDriver {
        let driver = SqliteDriver::in_memory().await.unwrap();
        sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT UNIQUE, score REAL, data BLOB)")
            .execute(driver.pool())
            .await
            .unwrap();
        driver
    }

    fn stmt(sql: &str, args: Vec<Value>) -> Statement {
        Statement {
            sql: sql.to_string(),
            args,
        }
    }

    #[tokio::test]
    async fn test_exec_and_decode() {
        let driver = driver().await;
        let res = driver
            .exec(&stmt(
                "INSERT INTO t (name, score, data) VALUES (?, ?, ?)",
                vec!["a".into(), 1.5.into(), vec![1u8, 2].into()],
            ))
            .await
            .unwrap();
        assert_eq!(res.rows_affected, 1);
        assert_eq!(res.last_insert_id, Some(1));

        let rows = driver.query(&stmt("SELECT * FROM t", vec![])).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
        assert_eq!(rows[0].get("name"), Some(&Value::String("a".into())));
        assert_eq!(rows[0].get("score"), Some(&Value::Float(1.5)));
        assert_eq!(rows[0].get("data"), Some(&Value::Bytes(vec![1, 2])));
    }

    #[tokio::test]
    async fn test_unique_violation_is_classified() {
        let driver = driver().await;
        let insert = stmt("INSERT INTO t (name) VALUES (?)", vec!["a".into()]);
        driver.exec(&insert).await.unwrap();
        let err = driver.exec(&insert).await.unwrap_err();
        assert_matches!(err.kind, DriverErrorKind::UniqueViolation);
    }

    #[tokio::test]
    async fn test_rollback_discards() {
        let driver = driver().await;
        let mut tx = driver.begin().await.unwrap().unwrap();
        tx.exec(&stmt("INSERT INTO t (name) VALUES ('x')", vec![]))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let rows = driver.query(&stmt("SELECT id FROM t", vec![])).await.unwrap();
        assert!(rows.is_empty());
    }
}
