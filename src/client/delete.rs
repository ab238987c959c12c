use std::sync::Arc;

use crate::driver::Driver;
use crate::error::{EntError, Result};
use crate::graph;
use crate::schema::EntitySchema;
use crate::spec::DeleteSpec;
use crate::sql::Predicate;
use crate::value::Id;

/// Builder for deleting every node matching its filters.
pub struct DeleteBuilder {
    driver: Arc<dyn Driver>,
    schema: &'static EntitySchema,
    predicate: Option<Predicate>,
}

impl DeleteBuilder {
    pub(crate) fn new(driver: Arc<dyn Driver>, schema: &'static EntitySchema) -> Self {
        Self {
            driver,
            schema,
            predicate: None,
        }
    }

    /// Restrict the delete; repeated filters are conjoined.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Delete the matched nodes. Returns the number of deleted rows.
    pub async fn exec(self) -> Result<u64> {
        let spec = DeleteSpec {
            node: self.schema.node_spec(),
            predicate: self.predicate,
        };
        graph::delete_nodes(self.driver.as_ref(), &spec).await
    }
}

/// Builder for deleting one node by id.
pub struct DeleteOneBuilder {
    driver: Arc<dyn Driver>,
    schema: &'static EntitySchema,
    id: Id,
}

impl DeleteOneBuilder {
    pub(crate) fn new(driver: Arc<dyn Driver>, schema: &'static EntitySchema, id: Id) -> Self {
        Self { driver, schema, id }
    }

    /// Delete the node. Zero deleted rows is `NotFound`.
    pub async fn exec(self) -> Result<()> {
        let spec = DeleteSpec {
            node: self.schema.node_spec_for(&self.id)?,
            predicate: None,
        };
        match graph::delete_nodes(self.driver.as_ref(), &spec).await? {
            0 => Err(EntError::not_found(self.schema.label)),
            _ => Ok(()),
        }
    }
}
