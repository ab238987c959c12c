//! Entity client
//!
//! Generic, schema-driven builders over the graph compiler. Every entity
//! shares the same builders; the static [`EntitySchema`] supplies the table,
//! columns and edges.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! let client = Client::new(Arc::new(SqliteDriver::in_memory().await?));
//!
//! let alice = client
//!     .create(&USER)
//!     .set("name", "alice")
//!     .set("age", 30)
//!     .save()
//!     .await?;
//!
//! let page = client
//!     .query(&USER)
//!     .filter(Predicate::gt("age", 18))
//!     .with_edge("pets", |q| q.order(Order::asc("name")))
//!     .paginate(None, Some(10), None, None)
//!     .await?;
//! ```
//!
//! Builder methods never fail immediately. Unknown fields, bad values and
//! unknown edges are recorded and returned by the terminal call (`save`,
//! `exec`, `all`, ...) before any statement is sent.

mod create;
mod delete;
mod query;
mod tx;
mod update;

pub use create::CreateBuilder;
pub use delete::{DeleteBuilder, DeleteOneBuilder};
pub use query::{QueryBuilder, SelectBuilder};
pub use tx::TxClient;
pub use update::{UpdateBuilder, UpdateOneBuilder};

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::driver::Driver;
use crate::error::{EntError, Result};
use crate::graph;
use crate::load::EdgeLoader;
use crate::node::Node;
use crate::schema::EntitySchema;
use crate::spec::QuerySpec;
use crate::value::Id;

/// Entry point for graph operations. Cheap to clone; clones share the driver.
#[derive(Clone)]
pub struct Client {
    driver: Arc<dyn Driver>,
    config: Arc<EngineConfig>,
}

impl Client {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self::with_config(driver, EngineConfig::default())
    }

    pub fn with_config(driver: Arc<dyn Driver>, config: EngineConfig) -> Self {
        Self {
            driver,
            config: Arc::new(config),
        }
    }

    /// Open a SQLite pool from configuration.
    #[cfg(feature = "sqlite")]
    pub async fn connect(config: EngineConfig) -> anyhow::Result<Self> {
        let driver = crate::driver::SqliteDriver::connect(&config).await?;
        Ok(Self::with_config(Arc::new(driver), config))
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn create(&self, schema: &'static EntitySchema) -> CreateBuilder {
        CreateBuilder::new(Arc::clone(&self.driver), schema)
    }

    /// Update every node matching the builder's filters.
    pub fn update(&self, schema: &'static EntitySchema) -> UpdateBuilder {
        UpdateBuilder::new(Arc::clone(&self.driver), schema)
    }

    pub fn update_one(&self, schema: &'static EntitySchema, id: impl Into<Id>) -> UpdateOneBuilder {
        UpdateOneBuilder::new(Arc::clone(&self.driver), schema, id.into())
    }

    /// Delete every node matching the builder's filters.
    pub fn delete(&self, schema: &'static EntitySchema) -> DeleteBuilder {
        DeleteBuilder::new(Arc::clone(&self.driver), schema)
    }

    pub fn delete_one(&self, schema: &'static EntitySchema, id: impl Into<Id>) -> DeleteOneBuilder {
        DeleteOneBuilder::new(Arc::clone(&self.driver), schema, id.into())
    }

    pub fn query(&self, schema: &'static EntitySchema) -> QueryBuilder {
        QueryBuilder::new(Arc::clone(&self.driver), Arc::clone(&self.config), schema)
    }

    /// Fetch one node by id.
    pub async fn get(&self, schema: &'static EntitySchema, id: impl Into<Id>) -> Result<Node> {
        self.query(schema).where_id(id).only().await
    }

    /// Start a transaction. Builders on the returned client all run inside
    /// it until it is committed or rolled back.
    pub async fn tx(&self) -> Result<TxClient> {
        if self.driver.in_transaction() {
            return Err(EntError::Transaction(
                "cannot start a transaction within a transaction".into(),
            ));
        }
        let tx = self.driver.begin().await?.ok_or_else(|| {
            EntError::Transaction("driver cannot open transactions".into())
        })?;
        tracing::debug!("Started transaction");
        Ok(TxClient::new(self, tx))
    }

    /// A DataLoader batching `edge` of `schema` across calls.
    pub fn edge_loader(&self, schema: &'static EntitySchema, edge: &str) -> Result<EdgeLoader> {
        EdgeLoader::new(Arc::clone(&self.driver), schema, edge)
    }
}

/// Read back a single node by id.
async fn fetch_node(driver: &dyn Driver, schema: &'static EntitySchema, id: &Id) -> Result<Node> {
    let spec = QuerySpec::new(schema.node_spec_for(id)?);
    let row = graph::query_nodes(driver, &spec)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| EntError::not_found(schema.label))?;
    Node::from_row(schema, row)
}

/// Keep the first error a builder runs into.
fn defer(slot: &mut Option<EntError>, err: EntError) {
    if slot.is_none() {
        *slot = Some(err);
    }
}
