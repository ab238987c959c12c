use super::edges::{Attach, add_edges, clear_edges};
use super::{Session, ids_from_rows};
use crate::driver::{Driver, Row};
use crate::error::{EntError, MutationStep, Result};
use crate::spec::UpdateSpec;
use crate::sql::{Predicate, Selector, UpdateBuilder};
use crate::value::Id;

/// Update every node matched by the `UpdateSpec` predicate. Returns the number of
/// matched nodes.
pub async fn update_nodes(driver: &dyn Driver, spec: &UpdateSpec) -> Result<u64> {
    spec.validate()?;
    let mut session = Session::begin(driver).await?;
    let result = apply(&mut session, spec).await.map(|ids| ids.len() as u64);
    session.finish(result).await
}

/// Update the single node identified by `spec.node.id.value` and return its
/// refreshed row. Zero matched rows is `NotFound`.
pub async fn update_node(driver: &dyn Driver, spec: &UpdateSpec) -> Result<Row> {
    spec.validate()?;
    let node = &spec.node;
    let Some(id) = node.id.value.clone() else {
        return Err(EntError::validation(&node.id.column, "single-node update without an id"));
    };

    let mut session = Session::begin(driver).await?;
    let result: Result<Row> = async {
        let ids = apply(&mut session, spec).await?;
        if ids.is_empty() {
            return Err(EntError::not_found(&node.label));
        }
        let select = Selector::new(&node.table)
            .select(node.select_columns())
            .filter(Predicate::eq(&node.id.column, &id));
        let stmt = select.render(session.dialect());
        let mut rows = session.query(&stmt).await?;
        rows.pop().ok_or_else(|| EntError::not_found(&node.label))
    }
    .await;
    session.finish(result).await
}

/// Resolve the matched ids, then apply fields, edge clears and edge adds in
/// that order.
async fn apply(session: &mut Session<'_>, spec: &UpdateSpec) -> Result<Vec<Id>> {
    let node = &spec.node;
    let dialect = session.dialect();

    let mut select = Selector::new(&node.table).select([node.id.column.clone()]);
    if let Some(id) = &node.id.value {
        select = select.filter(Predicate::eq(&node.id.column, id));
    }
    if let Some(predicate) = &spec.predicate {
        select = select.filter(predicate.clone());
    }
    let rows = session.query(&select.render(dialect)).await?;
    let ids = ids_from_rows(&rows, node.id.ty, &node.id.column)?;
    if ids.is_empty() {
        return Ok(ids);
    }
    let scope = Predicate::in_values(&node.id.column, ids.iter().cloned());

    if !spec.fields.is_empty() {
        let mut update = UpdateBuilder::new(&node.table);
        for field in &spec.fields.set {
            update = update.set(&field.column, field.value.clone());
        }
        for field in &spec.fields.add {
            update = update.add(&field.column, field.value.clone());
        }
        for field in &spec.fields.clear {
            update = update.set_null(&field.column);
        }
        let update = update.filter(scope.clone());
        let updated = session.exec(&update.render(dialect)).await;
        updated.map_err(|err| session.fail(MutationStep::UpdateFields, err))?;
    }

    if !spec.edges.clear.is_empty() {
        let cleared = clear_edges(session, node, &ids, &spec.edges.clear).await;
        cleared.map_err(|err| session.fail(MutationStep::ClearEdges, err))?;
    }

    if !spec.edges.add.is_empty() {
        let added = add_edges(session, node, &ids, &spec.edges.add, Attach::Replace).await;
        added.map_err(|err| session.fail(MutationStep::AddEdges, err))?;
    }

    tracing::debug!(table = %node.table, matched = ids.len(), "Updated nodes");
    Ok(ids)
}
