//! Edge steps: predicates that cross from one table to its neighbors
//!
//! Every step is rendered as an `IN (SELECT ...)` sub-select, so the result
//! composes with other predicates and never duplicates rows.

use crate::error::Result;
use crate::schema::EntitySchema;
use crate::spec::{EdgeSpec, FkLocation};
use crate::sql::{Predicate, Selector};

/// Predicate over the edge's target table matching the neighbors of the
/// rows `source` selects. `source` must select from the edge's source table.
pub fn neighbors(source: Selector, source_id_column: &str, edge: &EdgeSpec) -> Predicate {
    let mut source = source;
    if source.limit.is_none() {
        source.order.clear();
    }
    let target_id = edge.target.id_column.as_str();

    match edge.fk_location() {
        FkLocation::Source | FkLocation::Both => {
            let fks = source
                .select([edge.fk_column()])
                .filter(Predicate::not_null(edge.fk_column()));
            Predicate::in_select(target_id, fks)
        }
        FkLocation::Target => {
            let ids = source.select([source_id_column]);
            Predicate::in_select(edge.fk_column(), ids)
        }
        FkLocation::Junction => {
            let (source_col, target_col) = edge.junction_columns();
            let ids = source.select([source_id_column]);
            let pairs = Selector::new(&edge.table)
                .select([target_col])
                .filter(Predicate::in_select(source_col, ids));
            Predicate::in_select(target_id, pairs)
        }
    }
}

/// Predicate over the source table: the node has at least one neighbor.
pub fn has_neighbors(source_id_column: &str, edge: &EdgeSpec) -> Predicate {
    match edge.fk_location() {
        FkLocation::Source | FkLocation::Both => Predicate::not_null(edge.fk_column()),
        FkLocation::Target => Predicate::in_select(
            source_id_column,
            Selector::new(&edge.table)
                .select([edge.fk_column()])
                .filter(Predicate::not_null(edge.fk_column())),
        ),
        FkLocation::Junction => {
            let (source_col, _) = edge.junction_columns();
            Predicate::in_select(source_id_column, Selector::new(&edge.table).select([source_col]))
        }
    }
}

/// Predicate over the source table: the node has a neighbor matching
/// `target` (a predicate over the target table).
pub fn has_neighbors_with(source_id_column: &str, edge: &EdgeSpec, target: Predicate) -> Predicate {
    let matching = Selector::new(&edge.target.table).filter(target);
    match edge.fk_location() {
        FkLocation::Source | FkLocation::Both => Predicate::in_select(
            edge.fk_column(),
            matching.select([edge.target.id_column.as_str()]),
        ),
        FkLocation::Target => {
            Predicate::in_select(source_id_column, matching.select([edge.fk_column()]))
        }
        FkLocation::Junction => {
            let (source_col, target_col) = edge.junction_columns();
            let pairs = Selector::new(&edge.table).select([source_col]).filter(
                Predicate::in_select(target_col, matching.select([edge.target.id_column.as_str()])),
            );
            Predicate::in_select(source_id_column, pairs)
        }
    }
}

impl Predicate {
    /// Nodes of `schema` with at least one `edge` neighbor.
    pub fn has_edge(schema: &EntitySchema, edge: &str) -> Result<Predicate> {
        let def = schema.require_edge(edge)?;
        Ok(has_neighbors(schema.id.column, &def.spec(Vec::new())))
    }

    /// Nodes of `schema` with an `edge` neighbor matching `target`.
    pub fn has_edge_with(schema: &EntitySchema, edge: &str, target: Predicate) -> Result<Predicate> {
        let def = schema.require_edge(edge)?;
        Ok(has_neighbors_with(schema.id.column, &def.spec(Vec::new()), target))
    }
}
