use std::sync::Arc;

use uuid::Uuid;

use super::{defer, fetch_node};
use crate::driver::Driver;
use crate::error::{EntError, Result};
use crate::graph;
use crate::node::Node;
use crate::schema::{ColumnDef, EdgeDef, EntitySchema, IdStrategy};
use crate::spec::{CreateSpec, FieldSpec};
use crate::value::{Id, Value};

/// Builder for inserting one node.
pub struct CreateBuilder {
    driver: Arc<dyn Driver>,
    schema: &'static EntitySchema,
    id: Option<Id>,
    fields: Vec<(&'static ColumnDef, Value)>,
    edges: Vec<(&'static EdgeDef, Vec<Id>)>,
    error: Option<EntError>,
}

impl CreateBuilder {
    pub(crate) fn new(driver: Arc<dyn Driver>, schema: &'static EntitySchema) -> Self {
        Self {
            driver,
            schema,
            id: None,
            fields: Vec::new(),
            edges: Vec::new(),
            error: None,
        }
    }

    /// Supply the id instead of letting the id strategy produce one.
    pub fn set_id(mut self, id: impl Into<Id>) -> Self {
        let id = id.into();
        match self.schema.check_id(&id) {
            Ok(()) => self.id = Some(id),
            Err(err) => defer(&mut self.error, err),
        }
        self
    }

    /// Set a field. Setting the same field twice keeps the last value.
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        let def = match self.schema.require_column(column) {
            Ok(def) => def,
            Err(err) => {
                defer(&mut self.error, err);
                return self;
            }
        };
        if let Err(err) = def.check(&value) {
            defer(&mut self.error, err);
            return self;
        }
        self.fields.retain(|(d, _)| d.name != def.name);
        self.fields.push((def, value));
        self
    }

    /// Set a field only when a value is given.
    pub fn set_opt(self, column: &str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.set(column, value),
            None => self,
        }
    }

    /// Connect the new node to existing nodes through `edge`.
    pub fn add_edge<I>(mut self, edge: &str, ids: impl IntoIterator<Item = I>) -> Self
    where
        I: Into<Id>,
    {
        let def = match self.schema.require_edge(edge) {
            Ok(def) => def,
            Err(err) => {
                defer(&mut self.error, err);
                return self;
            }
        };
        let ids: Vec<Id> = ids.into_iter().map(Into::into).collect();
        match self.edges.iter_mut().find(|(d, _)| d.name == def.name) {
            Some((_, existing)) => existing.extend(ids),
            None => self.edges.push((def, ids)),
        }
        self
    }

    /// Build the create spec: resolve the id, apply defaults and check that
    /// required fields and edges are present.
    pub fn spec(&mut self) -> Result<CreateSpec> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        let schema = self.schema;

        let id = match (schema.id.strategy, &self.id) {
            (_, Some(id)) => Some(id.clone()),
            (IdStrategy::AutoIncrement, None) => None,
            (IdStrategy::Uuid, None) => Some(Id::Str(Uuid::new_v4().to_string())),
            (IdStrategy::Assigned, None) => {
                return Err(EntError::validation(
                    schema.id.column,
                    format!("{} requires an assigned id", schema.label),
                ));
            }
        };

        let mut node = schema.node_spec();
        node.id.value = id;
        let mut spec = CreateSpec::new(node);

        for column in schema.columns {
            let assigned = self.fields.iter().find(|(d, _)| d.name == column.name);
            let value = match (assigned, column.default) {
                (Some((_, value)), _) => value.clone(),
                (None, Some(default)) => default(),
                (None, None) if column.nullable => continue,
                (None, None) => {
                    return Err(EntError::validation(column.name, "missing required field"));
                }
            };
            spec.fields.push(FieldSpec::new(column.name, column.ty, value));
        }

        for edge in schema.edges.iter().filter(|e| e.required && e.rel.is_to_one()) {
            let set = self
                .edges
                .iter()
                .any(|(d, ids)| d.name == edge.name && !ids.is_empty());
            if !set {
                return Err(EntError::cardinality(edge.name, "missing required edge"));
            }
        }
        for (def, ids) in &self.edges {
            spec.edges.push(def.spec(ids.clone()));
        }

        Ok(spec)
    }

    /// Insert the node and return its id.
    pub async fn exec(mut self) -> Result<Id> {
        let spec = self.spec()?;
        graph::create_node(self.driver.as_ref(), &spec).await
    }

    /// Insert the node and read it back.
    pub async fn save(mut self) -> Result<Node> {
        let spec = self.spec()?;
        let id = graph::create_node(self.driver.as_ref(), &spec).await?;
        fetch_node(self.driver.as_ref(), self.schema, &id).await
    }
}
