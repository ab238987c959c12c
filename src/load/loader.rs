//! DataLoader adapter
//!
//! Lets a resolver layer batch the same edge across sibling resolvers:
//!
//! ```ignore
//! let pets = DataLoader::new(client.edge_loader(&USER, "pets")?, tokio::spawn);
//! schema.data(pets);
//!
//! // In a resolver
//! let loader = ctx.data_unchecked::<DataLoader<EdgeLoader>>();
//! let pets = loader.load_one(user.id().clone()).await?.unwrap_or_default();
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_graphql::dataloader::Loader;

use super::{LoadPlan, ParentKey, resolve};
use crate::driver::Driver;
use crate::error::{EntError, Result};
use crate::graph;
use crate::node::Node;
use crate::schema::EntitySchema;
use crate::sql::{Predicate, Selector};
use crate::value::Id;

/// Batches loads of one edge of one entity type, keyed by source id.
pub struct EdgeLoader {
    driver: Arc<dyn Driver>,
    source: &'static EntitySchema,
    plan: LoadPlan,
}

impl EdgeLoader {
    /// Load every target of `edge`.
    pub fn new(driver: Arc<dyn Driver>, source: &'static EntitySchema, edge: &str) -> Result<Self> {
        let def = source.require_edge(edge)?;
        Ok(Self::with_plan(driver, source, LoadPlan::new(def)))
    }

    /// Load with a prepared plan, e.g. one carrying a filter or nested loads.
    pub fn with_plan(driver: Arc<dyn Driver>, source: &'static EntitySchema, plan: LoadPlan) -> Self {
        Self {
            driver,
            source,
            plan,
        }
    }

    /// Keys for a batch of source ids, reading source-side foreign keys
    /// with one query when the edge needs them.
    async fn parent_keys(&self, keys: &[Id]) -> Result<Vec<ParentKey>> {
        let Some(fk) = self.plan.edge.source_fk() else {
            return Ok(keys
                .iter()
                .map(|id| ParentKey {
                    id: id.clone(),
                    fk: None,
                })
                .collect());
        };

        let id_column = self.source.id.column;
        let selector = Selector::new(self.source.table)
            .select([id_column, fk])
            .filter(Predicate::in_values(id_column, keys.iter()));
        let rows = graph::select_rows(self.driver.as_ref(), &selector).await?;

        let target_ty = self.plan.target().id.ty;
        rows.iter()
            .map(|row| {
                let id = row
                    .get(id_column)
                    .and_then(|v| Id::from_value(v, self.source.id.ty))
                    .ok_or_else(|| EntError::Decode {
                        column: id_column.to_string(),
                        message: "source row without an id".to_string(),
                    })?;
                let fk = row.get(fk).and_then(|v| Id::from_value(v, target_ty));
                Ok(ParentKey { id, fk })
            })
            .collect()
    }
}

impl Loader<Id> for EdgeLoader {
    type Value = Vec<Arc<Node>>;
    type Error = Arc<EntError>;

    async fn load(&self, keys: &[Id]) -> std::result::Result<HashMap<Id, Self::Value>, Self::Error> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        tracing::debug!(
            entity = self.source.label,
            edge = self.plan.edge.name,
            parent_count = keys.len(),
            "Batch loading edge"
        );

        let parents = self.parent_keys(keys).await.map_err(Arc::new)?;
        resolve(self.driver.as_ref(), &self.plan, &parents)
            .await
            .map_err(Arc::new)
    }
}
