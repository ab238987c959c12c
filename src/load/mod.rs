//! Eager loading of edges
//!
//! Loading solves the N+1 problem: for a page of N parent nodes, each
//! requested edge is resolved with one query (two for junction tables),
//! never one query per parent.
//!
//! The pattern works as follows:
//! 1. The foreign key columns a load needs are declared up front
//!    ([`source_fk_columns`]) and selected with the parents
//! 2. Targets are fetched with an `IN` over the parent ids or foreign keys:
//!    `SELECT * FROM pets WHERE owner_id IN (...)`
//! 3. Results are grouped by key and attached to each parent as shared
//!    `Arc<Node>` references
//!
//! A returned row whose key matches no parent in the batch is a referential
//! integrity failure and fails the whole load.

mod loader;

pub use loader::EdgeLoader;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::driver::Driver;
use crate::error::{EntError, Result};
use crate::graph;
use crate::node::Node;
use crate::schema::{EdgeDef, EntitySchema};
use crate::spec::{EdgeQuerySpec, FkLocation, QuerySpec};
use crate::sql::Predicate;
use crate::value::Id;

/// A requested edge load: which edge, the query over its targets, and the
/// loads to run on those targets in turn.
#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub edge: &'static EdgeDef,
    /// Query over the edge's target entity; may carry predicates and order.
    pub spec: QuerySpec,
    pub nested: Vec<LoadPlan>,
}

impl LoadPlan {
    /// Load every target of `edge`.
    pub fn new(edge: &'static EdgeDef) -> Self {
        Self {
            edge,
            spec: QuerySpec::new(edge.target.node_spec()),
            nested: Vec::new(),
        }
    }

    pub fn target(&self) -> &'static EntitySchema {
        self.edge.target
    }
}

/// Foreign key columns the parents must carry for these plans to run.
pub fn source_fk_columns(plans: &[LoadPlan]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for plan in plans {
        if let Some(fk) = plan.edge.source_fk() {
            if !columns.iter().any(|c| c == fk) {
                columns.push(fk.to_string());
            }
        }
    }
    columns
}

/// A parent in a batch: its id and, for source-side edges, its foreign key.
#[derive(Debug, Clone)]
pub(crate) struct ParentKey {
    pub id: Id,
    pub fk: Option<Id>,
}

/// Resolve every plan for a batch of parent nodes and attach the results.
pub fn load_edges<'a>(
    driver: &'a dyn Driver,
    parents: &'a mut [Node],
    plans: &'a [LoadPlan],
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if parents.is_empty() {
            return Ok(());
        }
        for plan in plans {
            let keys = parent_keys(parents, plan)?;
            let mut resolved = resolve(driver, plan, &keys).await?;
            for parent in parents.iter_mut() {
                let nodes = resolved.remove(parent.id()).unwrap_or_default();
                parent.set_edge(plan.edge.name, nodes);
            }
        }
        Ok(())
    })
}

fn parent_keys(parents: &[Node], plan: &LoadPlan) -> Result<Vec<ParentKey>> {
    let fk_column = plan.edge.source_fk();
    let target_ty = plan.target().id.ty;
    parents
        .iter()
        .map(|parent| {
            let fk = match fk_column.and_then(|c| parent.foreign_key(c)) {
                Some(value) => Some(Id::from_value(value, target_ty).ok_or_else(|| {
                    EntError::integrity(
                        plan.edge.name,
                        format!("foreign key {} is not a {} id", value, target_ty),
                    )
                })?),
                None => None,
            };
            Ok(ParentKey {
                id: parent.id().clone(),
                fk,
            })
        })
        .collect()
}

/// Resolve one plan for a batch of parent keys. Every parent id is present
/// in the result, with an empty list when it has no neighbors.
pub(crate) async fn resolve(
    driver: &dyn Driver,
    plan: &LoadPlan,
    parents: &[ParentKey],
) -> Result<HashMap<Id, Vec<Arc<Node>>>> {
    let edge = plan.edge;
    let spec = edge.spec(Vec::new());
    let mut result: HashMap<Id, Vec<Arc<Node>>> =
        parents.iter().map(|p| (p.id.clone(), Vec::new())).collect();
    if parents.is_empty() {
        return Ok(result);
    }

    let loaded = match spec.fk_location() {
        FkLocation::Source | FkLocation::Both => {
            // fk -> parents holding it
            let mut by_fk: HashMap<Id, Vec<Id>> = HashMap::new();
            for parent in parents {
                if let Some(fk) = &parent.fk {
                    by_fk.entry(fk.clone()).or_default().push(parent.id.clone());
                }
            }
            if by_fk.is_empty() {
                return Ok(result);
            }

            let mut query = plan.spec.clone();
            let id_column = query.node.id.column.clone();
            query.add_predicate(Predicate::in_values(id_column, by_fk.keys().cloned()));
            let targets = fetch(driver, plan, query).await?;
            for target in &targets {
                let owners = by_fk.get(target.id()).ok_or_else(|| {
                    EntError::integrity(
                        edge.name,
                        format!("unexpected foreign key {} returned", target.id()),
                    )
                })?;
                for owner in owners {
                    result.entry(owner.clone()).or_default().push(Arc::clone(target));
                }
            }
            targets.len()
        }
        FkLocation::Target => {
            let fk = spec.fk_column().to_string();
            let mut query = plan.spec.clone();
            if !query.node.columns.contains(&fk) {
                query.node.columns.push(fk.clone());
            }
            query.add_predicate(Predicate::in_values(&fk, parents.iter().map(|p| &p.id)));
            let parent_ty = parents[0].id.id_type();

            let targets = fetch(driver, plan, query).await?;
            for target in &targets {
                let owner = target
                    .foreign_key(&fk)
                    .and_then(|v| Id::from_value(v, parent_ty))
                    .ok_or_else(|| {
                        EntError::integrity(
                            edge.name,
                            format!("foreign key \"{}\" is nil for node {}", fk, target.id()),
                        )
                    })?;
                let slot = result.get_mut(&owner).ok_or_else(|| {
                    EntError::integrity(
                        edge.name,
                        format!("unexpected foreign key \"{}\" returned {}", fk, owner),
                    )
                })?;
                if edge.rel.is_to_one() && !slot.is_empty() {
                    return Err(EntError::integrity(
                        edge.name,
                        format!("more than one node for unique edge of {}", owner),
                    ));
                }
                slot.push(Arc::clone(target));
            }
            targets.len()
        }
        FkLocation::Junction => {
            let pairs = graph::query_edges(
                driver,
                &EdgeQuerySpec {
                    edge: spec.clone(),
                    from: parents.iter().map(|p| p.id.clone()).collect(),
                },
            )
            .await?;
            if pairs.is_empty() {
                return Ok(result);
            }

            // target -> sources pointing at it, in junction order
            let mut by_target: HashMap<Id, Vec<Id>> = HashMap::new();
            for (source, target) in pairs {
                by_target.entry(target).or_default().push(source);
            }

            let mut query = plan.spec.clone();
            let id_column = query.node.id.column.clone();
            query.add_predicate(Predicate::in_values(id_column, by_target.keys().cloned()));
            let targets = fetch(driver, plan, query).await?;
            for target in &targets {
                let sources = by_target.get(target.id()).ok_or_else(|| {
                    EntError::integrity(
                        edge.name,
                        format!("unexpected node {} returned", target.id()),
                    )
                })?;
                for source in sources {
                    let slot = result.get_mut(source).ok_or_else(|| {
                        EntError::integrity(
                            edge.name,
                            format!("junction row for unknown source {}", source),
                        )
                    })?;
                    slot.push(Arc::clone(target));
                }
            }
            targets.len()
        }
    };

    tracing::debug!(
        edge = edge.name,
        parent_count = parents.len(),
        loaded = loaded,
        "Batch load complete"
    );
    Ok(result)
}

/// Run a target query, then its nested loads, and share the results.
async fn fetch(driver: &dyn Driver, plan: &LoadPlan, mut query: QuerySpec) -> Result<Vec<Arc<Node>>> {
    for fk in source_fk_columns(&plan.nested) {
        if !query.node.columns.contains(&fk) {
            query.node.columns.push(fk);
        }
    }
    let rows = graph::query_nodes(driver, &query).await?;
    let mut nodes = rows
        .into_iter()
        .map(|row| Node::from_row(plan.target(), row))
        .collect::<Result<Vec<_>>>()?;
    load_edges(driver, &mut nodes, &plan.nested).await?;
    Ok(nodes.into_iter().map(Arc::new).collect())
}
