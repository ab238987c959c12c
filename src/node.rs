//! Materialized nodes
//!
//! A `Node` owns its scalar values. Edges populated by eager loading are held
//! as shared `Arc<Node>` references, and only edges that were requested are
//! present: reading any other edge is an explicit `NotLoaded` error.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::driver::Row;
use crate::error::{EntError, Result};
use crate::pagination::Cursor;
use crate::schema::EntitySchema;
use crate::value::{Id, Value};

/// Conversion from a dynamic `Value` into a concrete Rust type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|i| i32::try_from(i).ok())
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bytes(b) => Some(b.clone()),
            _ => None,
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_time()
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// One entity row.
#[derive(Clone)]
pub struct Node {
    schema: &'static EntitySchema,
    id: Id,
    fields: BTreeMap<&'static str, Value>,
    /// Foreign key columns selected for eager loading, by column name.
    foreign_keys: BTreeMap<String, Value>,
    edges: BTreeMap<&'static str, Vec<Arc<Node>>>,
}

impl Node {
    /// Decode a row selected from `schema`'s table.
    ///
    /// Declared columns are coerced to their field type; any other column is
    /// kept as a foreign key.
    pub fn from_row(schema: &'static EntitySchema, row: Row) -> Result<Self> {
        let id_column = schema.id.column;
        let mut id = None;
        let mut fields = BTreeMap::new();
        let mut foreign_keys = BTreeMap::new();

        for (column, value) in row.columns.into_iter().zip(row.values) {
            if column == id_column {
                id = Some(Id::from_value(&value, schema.id.ty).ok_or_else(|| {
                    EntError::Decode {
                        column: column.clone(),
                        message: format!("expected {} id, got {}", schema.id.ty, value.kind()),
                    }
                })?);
            } else if let Some(def) = schema.column(&column) {
                let value = def.ty.coerce(value).map_err(|message| EntError::Decode {
                    column: column.clone(),
                    message,
                })?;
                fields.insert(def.name, value);
            } else {
                foreign_keys.insert(column, value);
            }
        }

        let id = id.ok_or_else(|| EntError::Decode {
            column: id_column.to_string(),
            message: format!("{} row without an id", schema.label),
        })?;

        Ok(Self {
            schema,
            id,
            fields,
            foreign_keys,
            edges: BTreeMap::new(),
        })
    }

    pub fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    pub fn label(&self) -> &'static str {
        self.schema.label
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Raw value of a selected column.
    pub fn value(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    pub fn fields(&self) -> &BTreeMap<&'static str, Value> {
        &self.fields
    }

    /// Typed value of a column.
    pub fn get<T: FromValue>(&self, column: &str) -> Result<T> {
        let value = self.fields.get(column).ok_or_else(|| {
            EntError::validation(column, format!("not selected on {}", self.label()))
        })?;
        T::from_value(value).ok_or_else(|| EntError::Decode {
            column: column.to_string(),
            message: format!(
                "cannot convert {} to {}",
                value.kind(),
                std::any::type_name::<T>()
            ),
        })
    }

    /// Value of a foreign key column, falling back to a declared field of
    /// the same name. `NULL` reads as `None`.
    pub fn foreign_key(&self, column: &str) -> Option<&Value> {
        self.foreign_keys
            .get(column)
            .or_else(|| self.fields.get(column))
            .filter(|v| !v.is_null())
    }

    /// Nodes loaded for `edge`.
    pub fn edge(&self, edge: &str) -> Result<&[Arc<Node>]> {
        self.edges
            .get(edge)
            .map(Vec::as_slice)
            .ok_or_else(|| EntError::NotLoaded {
                edge: edge.to_string(),
            })
    }

    /// The single node loaded for a to-one `edge`, if it is set.
    pub fn edge_one(&self, edge: &str) -> Result<Option<&Arc<Node>>> {
        self.edge(edge).map(|nodes| nodes.first())
    }

    pub fn is_loaded(&self, edge: &str) -> bool {
        self.edges.contains_key(edge)
    }

    pub(crate) fn set_edge(&mut self, edge: &'static str, nodes: Vec<Arc<Node>>) {
        self.edges.insert(edge, nodes);
    }

    /// Pagination cursor for this node.
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.label(), self.id.clone())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("label", &self.schema.label)
            .field("id", &self.id)
            .field("fields", &self.fields)
            .field("edges", &self.edges)
            .finish()
    }
}
