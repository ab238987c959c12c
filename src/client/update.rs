use std::sync::Arc;

use super::defer;
use crate::driver::Driver;
use crate::error::{EntError, Result};
use crate::graph;
use crate::node::Node;
use crate::schema::{ColumnDef, EntitySchema};
use crate::spec::{EdgeSpec, FieldSpec, UpdateSpec};
use crate::sql::Predicate;
use crate::value::{Id, Value};

/// Builder for updating every node matching its filters.
pub struct UpdateBuilder {
    driver: Arc<dyn Driver>,
    schema: &'static EntitySchema,
    id: Option<Id>,
    predicate: Option<Predicate>,
    set: Vec<(&'static ColumnDef, Value)>,
    add: Vec<(&'static ColumnDef, Value)>,
    clear: Vec<&'static ColumnDef>,
    add_edges: Vec<EdgeSpec>,
    clear_edges: Vec<EdgeSpec>,
    error: Option<EntError>,
}

impl UpdateBuilder {
    pub(crate) fn new(driver: Arc<dyn Driver>, schema: &'static EntitySchema) -> Self {
        Self {
            driver,
            schema,
            id: None,
            predicate: None,
            set: Vec::new(),
            add: Vec::new(),
            clear: Vec::new(),
            add_edges: Vec::new(),
            clear_edges: Vec::new(),
            error: None,
        }
    }

    /// Restrict the update; repeated filters are conjoined.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Restrict the update to nodes with at least one `edge` neighbor.
    pub fn where_has_edge(self, edge: &str) -> Self {
        let predicate = Predicate::has_edge(self.schema, edge);
        self.filter_with(predicate)
    }

    fn filter_with(mut self, predicate: Result<Predicate>) -> Self {
        match predicate {
            Ok(predicate) => self.filter(predicate),
            Err(err) => {
                defer(&mut self.error, err);
                self
            }
        }
    }

    fn column(&mut self, column: &str) -> Option<&'static ColumnDef> {
        match self.schema.require_column(column) {
            Ok(def) => Some(def),
            Err(err) => {
                defer(&mut self.error, err);
                None
            }
        }
    }

    /// Overwrite a field.
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        let Some(def) = self.column(column) else {
            return self;
        };
        match def.check(&value) {
            Ok(()) => {
                self.set.retain(|(d, _)| d.name != def.name);
                self.set.push((def, value));
            }
            Err(err) => defer(&mut self.error, err),
        }
        self
    }

    /// Increment a numeric field. Repeated adds accumulate.
    pub fn add(mut self, column: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        let Some(def) = self.column(column) else {
            return self;
        };
        if value.is_null() || !def.ty.accepts(&value) {
            defer(
                &mut self.error,
                EntError::validation(def.name, format!("cannot add {} to {:?}", value.kind(), def.ty)),
            );
            return self;
        }
        match self.add.iter_mut().find(|(d, _)| d.name == def.name) {
            Some((_, existing)) => *existing = sum(existing, &value),
            None => self.add.push((def, value)),
        }
        self
    }

    /// Reset a nullable field to NULL.
    pub fn clear_field(mut self, column: &str) -> Self {
        let Some(def) = self.column(column) else {
            return self;
        };
        if !def.nullable {
            defer(
                &mut self.error,
                EntError::validation(def.name, "cannot clear a non-nullable field"),
            );
            return self;
        }
        if !self.clear.iter().any(|d| d.name == def.name) {
            self.clear.push(def);
        }
        self
    }

    /// Connect the matched nodes to `ids` through `edge`. On a to-one edge
    /// this replaces the current neighbor.
    pub fn add_edge<I>(mut self, edge: &str, ids: impl IntoIterator<Item = I>) -> Self
    where
        I: Into<Id>,
    {
        let ids: Vec<Id> = ids.into_iter().map(Into::into).collect();
        push_edge(&mut self.add_edges, &mut self.error, self.schema, edge, ids);
        self
    }

    /// Disconnect the matched nodes from `ids` only.
    pub fn remove_edge<I>(mut self, edge: &str, ids: impl IntoIterator<Item = I>) -> Self
    where
        I: Into<Id>,
    {
        let ids: Vec<Id> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return self;
        }
        push_edge(&mut self.clear_edges, &mut self.error, self.schema, edge, ids);
        self
    }

    /// Disconnect the matched nodes from every `edge` neighbor.
    pub fn clear_edge(mut self, edge: &str) -> Self {
        match self.schema.require_edge(edge) {
            Ok(def) => {
                self.clear_edges.retain(|e| e.name != def.name);
                self.clear_edges.push(def.spec(Vec::new()));
            }
            Err(err) => defer(&mut self.error, err),
        }
        self
    }

    /// Build the update spec, applying update defaults to fields the caller
    /// left alone.
    pub fn spec(&mut self) -> Result<UpdateSpec> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        let schema = self.schema;
        let node = match &self.id {
            Some(id) => schema.node_spec_for(id)?,
            None => schema.node_spec(),
        };

        let mut spec = UpdateSpec::new(node);
        spec.predicate = self.predicate.clone();
        for (def, value) in &self.set {
            spec.fields.set.push(FieldSpec::new(def.name, def.ty, value.clone()));
        }
        for (def, value) in &self.add {
            spec.fields.add.push(FieldSpec::new(def.name, def.ty, value.clone()));
        }
        for def in &self.clear {
            spec.fields.clear.push(FieldSpec::new(def.name, def.ty, Value::Null));
        }

        for column in schema.columns {
            let Some(default) = column.update_default else {
                continue;
            };
            let touched = spec
                .fields
                .set
                .iter()
                .chain(&spec.fields.add)
                .chain(&spec.fields.clear)
                .any(|f| f.column == column.name);
            if !touched {
                spec.fields.set.push(FieldSpec::new(column.name, column.ty, default()));
            }
        }

        spec.edges.add = self.add_edges.clone();
        spec.edges.clear = self.clear_edges.clone();
        Ok(spec)
    }

    /// Apply the update. Returns the number of matched nodes.
    pub async fn exec(mut self) -> Result<u64> {
        let spec = self.spec()?;
        graph::update_nodes(self.driver.as_ref(), &spec).await
    }
}

fn push_edge(
    edges: &mut Vec<EdgeSpec>,
    error: &mut Option<EntError>,
    schema: &'static EntitySchema,
    edge: &str,
    ids: Vec<Id>,
) {
    let def = match schema.require_edge(edge) {
        Ok(def) => def,
        Err(err) => return defer(error, err),
    };
    match edges.iter_mut().find(|e| e.name == def.name) {
        Some(existing) => existing.target.add_nodes(ids),
        None => edges.push(def.spec(ids)),
    }
}

fn sum(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Value::Int(x.saturating_add(*y)),
        _ => Value::Float(a.as_f64().unwrap_or_default() + b.as_f64().unwrap_or_default()),
    }
}

/// Builder for updating one node by id.
pub struct UpdateOneBuilder {
    inner: UpdateBuilder,
}

impl UpdateOneBuilder {
    pub(crate) fn new(driver: Arc<dyn Driver>, schema: &'static EntitySchema, id: Id) -> Self {
        let mut inner = UpdateBuilder::new(driver, schema);
        inner.id = Some(id);
        Self { inner }
    }

    pub fn set(self, column: &str, value: impl Into<Value>) -> Self {
        Self {
            inner: self.inner.set(column, value),
        }
    }

    pub fn add(self, column: &str, value: impl Into<Value>) -> Self {
        Self {
            inner: self.inner.add(column, value),
        }
    }

    pub fn clear_field(self, column: &str) -> Self {
        Self {
            inner: self.inner.clear_field(column),
        }
    }

    pub fn add_edge<I>(self, edge: &str, ids: impl IntoIterator<Item = I>) -> Self
    where
        I: Into<Id>,
    {
        Self {
            inner: self.inner.add_edge(edge, ids),
        }
    }

    pub fn remove_edge<I>(self, edge: &str, ids: impl IntoIterator<Item = I>) -> Self
    where
        I: Into<Id>,
    {
        Self {
            inner: self.inner.remove_edge(edge, ids),
        }
    }

    pub fn clear_edge(self, edge: &str) -> Self {
        Self {
            inner: self.inner.clear_edge(edge),
        }
    }

    pub fn spec(&mut self) -> Result<UpdateSpec> {
        self.inner.spec()
    }

    /// Apply the update and return the refreshed node. A missing node is
    /// `NotFound`.
    pub async fn save(mut self) -> Result<Node> {
        let spec = self.inner.spec()?;
        let row = graph::update_node(self.inner.driver.as_ref(), &spec).await?;
        Node::from_row(self.inner.schema, row)
    }

    /// Apply the update without reading the node back.
    pub async fn exec(self) -> Result<()> {
        self.save().await.map(|_| ())
    }
}
