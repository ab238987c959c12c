//! Entgraph
//!
//! A schema-driven entity graph over SQL. Entities are described once as
//! static [`EntitySchema`] data; generic builders turn create, update,
//! delete and query requests into dialect-aware statements, honoring
//! one-to-one, one-to-many, many-to-one and many-to-many edges.
//!
//! Layers, leaves first:
//! - [`value`], [`sql`]: scalar values and statement rendering
//! - [`spec`], [`schema`]: entity-agnostic operation specs and the static
//!   metadata they are built from
//! - [`driver`]: the injected backend, with a SQLite implementation
//! - [`graph`]: the graph-to-SQL compiler
//! - [`load`]: batched eager loading of edges
//! - [`pagination`]: Relay cursor connections
//! - [`client`]: the builders callers use

pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod graph;
pub mod load;
pub mod node;
pub mod pagination;
pub mod schema;
pub mod spec;
pub mod sql;
pub mod value;

pub use client::{Client, TxClient};
pub use config::EngineConfig;
pub use driver::Driver;
#[cfg(feature = "sqlite")]
pub use driver::SqliteDriver;
pub use error::{EntError, Result};
pub use load::EdgeLoader;
pub use node::Node;
pub use pagination::{Connection, Cursor, PageInfo};
pub use schema::{ColumnDef, EdgeDef, EntitySchema, IdDef};
pub use spec::Rel;
pub use sql::{Aggregate, Order, Predicate};
pub use value::{FieldType, Id, Value};
