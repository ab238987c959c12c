//! Shared fixtures for integration tests
//!
//! A small social graph:
//! - `User` has `pets` (O2M), a `card` (O2O, key on the card), a `spouse`
//!   (bidirectional O2O), `groups` (M2M) and `friends` (bidirectional M2M)
//! - `Pet` has an `owner` (M2O)
//! - `Card` has a required `owner` (O2O, key on the card)
//! - `Group` has `users` (inverse M2M)

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use entgraph::driver::{Driver, DriverError, ExecResult, Row, Tx};
use entgraph::sql::{Dialect, Statement};
use entgraph::{
    Client, ColumnDef, EdgeDef, EntitySchema, FieldType, Id, IdDef, Rel, SqliteDriver, Value,
};

// ============================================================================
// Schemas
// ============================================================================

fn now() -> Value {
    Utc::now().into()
}

fn non_empty(value: &Value) -> Result<(), String> {
    match value.as_str() {
        Some(s) if s.trim().is_empty() => Err("must not be empty".to_string()),
        _ => Ok(()),
    }
}

pub static USER: EntitySchema = EntitySchema {
    label: "User",
    table: "users",
    id: IdDef::auto("id"),
    columns: &[
        ColumnDef::new("name", FieldType::String).validate(non_empty),
        ColumnDef::new("age", FieldType::Int),
        ColumnDef::new("nickname", FieldType::String).nullable(),
        ColumnDef::new("created_at", FieldType::Time).default(now),
        ColumnDef::new("updated_at", FieldType::Time)
            .default(now)
            .update_default(now),
    ],
    edges: &[
        EdgeDef::new("pets", Rel::O2M, &PET, "pets", &["owner_id"]),
        EdgeDef::new("card", Rel::O2O, &CARD, "cards", &["owner_id"]).inverse(),
        EdgeDef::new("spouse", Rel::O2O, &USER, "users", &["spouse_id"]).bidi(),
        EdgeDef::new("groups", Rel::M2M, &GROUP, "user_groups", &["user_id", "group_id"]),
        EdgeDef::new("friends", Rel::M2M, &USER, "user_friends", &["user_id", "friend_id"]).bidi(),
    ],
};

pub static PET: EntitySchema = EntitySchema {
    label: "Pet",
    table: "pets",
    id: IdDef::auto("id"),
    columns: &[
        ColumnDef::new("name", FieldType::String),
        ColumnDef::new("weight", FieldType::Float).nullable(),
    ],
    edges: &[EdgeDef::new("owner", Rel::M2O, &USER, "pets", &["owner_id"])],
};

pub static CARD: EntitySchema = EntitySchema {
    label: "Card",
    table: "cards",
    id: IdDef::uuid("id"),
    columns: &[ColumnDef::new("number", FieldType::String)],
    edges: &[EdgeDef::new("owner", Rel::O2O, &USER, "cards", &["owner_id"]).required()],
};

pub static GROUP: EntitySchema = EntitySchema {
    label: "Group",
    table: "groups",
    id: IdDef::auto("id"),
    columns: &[
        ColumnDef::new("name", FieldType::String),
        ColumnDef::new("active", FieldType::Bool),
    ],
    edges: &[
        EdgeDef::new("users", Rel::M2M, &USER, "user_groups", &["user_id", "group_id"]).inverse(),
    ],
};

const DDL: &[&str] = &[
    r#"CREATE TABLE "users" (
        "id" INTEGER PRIMARY KEY AUTOINCREMENT,
        "name" TEXT NOT NULL UNIQUE,
        "age" INTEGER NOT NULL,
        "nickname" TEXT,
        "created_at" TEXT NOT NULL,
        "updated_at" TEXT NOT NULL,
        "spouse_id" INTEGER REFERENCES "users" ("id") ON DELETE SET NULL
    )"#,
    r#"CREATE TABLE "pets" (
        "id" INTEGER PRIMARY KEY AUTOINCREMENT,
        "name" TEXT NOT NULL,
        "weight" REAL,
        "owner_id" INTEGER REFERENCES "users" ("id") ON DELETE SET NULL
    )"#,
    r#"CREATE TABLE "cards" (
        "id" TEXT PRIMARY KEY,
        "number" TEXT NOT NULL,
        "owner_id" INTEGER UNIQUE REFERENCES "users" ("id") ON DELETE CASCADE
    )"#,
    r#"CREATE TABLE "groups" (
        "id" INTEGER PRIMARY KEY AUTOINCREMENT,
        "name" TEXT NOT NULL,
        "active" BOOLEAN NOT NULL
    )"#,
    r#"CREATE TABLE "user_groups" (
        "user_id" INTEGER NOT NULL REFERENCES "users" ("id") ON DELETE CASCADE,
        "group_id" INTEGER NOT NULL REFERENCES "groups" ("id") ON DELETE CASCADE,
        PRIMARY KEY ("user_id", "group_id")
    )"#,
    r#"CREATE TABLE "user_friends" (
        "user_id" INTEGER NOT NULL REFERENCES "users" ("id") ON DELETE CASCADE,
        "friend_id" INTEGER NOT NULL REFERENCES "users" ("id") ON DELETE CASCADE,
        PRIMARY KEY ("user_id", "friend_id")
    )"#,
];

// ============================================================================
// Recording driver
// ============================================================================

/// Wraps a SQLite driver and records every statement it runs.
pub struct RecordingDriver {
    inner: SqliteDriver,
    log: Arc<Mutex<Vec<String>>>,
    transactions: bool,
}

impl RecordingDriver {
    pub fn statements(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// Number of `SELECT` statements run so far.
    pub fn query_count(&self) -> usize {
        self.log.lock().iter().filter(|s| s.starts_with("SELECT")).count()
    }

    pub fn reset(&self) {
        self.log.lock().clear();
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        self.inner.pool()
    }
}

#[async_trait]
impl Driver for RecordingDriver {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    async fn exec(&self, stmt: &Statement) -> Result<ExecResult, DriverError> {
        self.log.lock().push(stmt.sql.clone());
        self.inner.exec(stmt).await
    }

    async fn query(&self, stmt: &Statement) -> Result<Vec<Row>, DriverError> {
        self.log.lock().push(stmt.sql.clone());
        self.inner.query(stmt).await
    }

    async fn begin(&self) -> Result<Option<Box<dyn Tx>>, DriverError> {
        if !self.transactions {
            return Ok(None);
        }
        let Some(inner) = self.inner.begin().await? else {
            return Ok(None);
        };
        Ok(Some(Box::new(RecordingTx {
            inner,
            log: Arc::clone(&self.log),
        })))
    }
}

struct RecordingTx {
    inner: Box<dyn Tx>,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Tx for RecordingTx {
    async fn exec(&mut self, stmt: &Statement) -> Result<ExecResult, DriverError> {
        self.log.lock().push(stmt.sql.clone());
        self.inner.exec(stmt).await
    }

    async fn query(&mut self, stmt: &Statement) -> Result<Vec<Row>, DriverError> {
        self.log.lock().push(stmt.sql.clone());
        self.inner.query(stmt).await
    }

    async fn commit(self: Box<Self>) -> Result<(), DriverError> {
        self.log.lock().push("COMMIT".to_string());
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), DriverError> {
        self.log.lock().push("ROLLBACK".to_string());
        self.inner.rollback().await
    }
}

// ============================================================================
// Setup
// ============================================================================

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn driver(transactions: bool) -> Arc<RecordingDriver> {
    init_tracing();
    let inner = SqliteDriver::in_memory().await.expect("open in-memory database");
    for ddl in DDL {
        sqlx::query(ddl)
            .execute(inner.pool())
            .await
            .expect("create schema");
    }
    Arc::new(RecordingDriver {
        inner,
        log: Arc::new(Mutex::new(Vec::new())),
        transactions,
    })
}

/// A client over a fresh database, plus the recording driver behind it.
pub async fn setup() -> (Client, Arc<RecordingDriver>) {
    let driver = driver(true).await;
    let client = Client::new(driver.clone());
    (client, driver)
}

/// Like [`setup`], but the driver cannot open transactions.
pub async fn setup_without_transactions() -> (Client, Arc<RecordingDriver>) {
    let driver = driver(false).await;
    let client = Client::new(driver.clone());
    (client, driver)
}

// ============================================================================
// Helpers
// ============================================================================

pub async fn user(client: &Client, name: &str, age: i64) -> Id {
    client
        .create(&USER)
        .set("name", name)
        .set("age", age)
        .exec()
        .await
        .expect("create user")
}

pub async fn pet(client: &Client, name: &str, owner: Option<&Id>) -> Id {
    let mut create = client.create(&PET).set("name", name);
    if let Some(owner) = owner {
        create = create.add_edge("owner", [owner.clone()]);
    }
    create.exec().await.expect("create pet")
}

pub async fn group(client: &Client, name: &str) -> Id {
    client
        .create(&GROUP)
        .set("name", name)
        .set("active", true)
        .exec()
        .await
        .expect("create group")
}

pub fn int_ids(ids: &[Id]) -> Vec<i64> {
    ids.iter().filter_map(Id::as_i64).collect()
}
