use super::Session;
use crate::driver::{Driver, Row};
use crate::error::{EntError, Result};
use crate::spec::{EdgeQuerySpec, QuerySpec};
use crate::sql::{Predicate, Selector};
use crate::value::{Id, Value};

/// The `SELECT` a query spec describes, before any projection override.
pub(crate) fn selector(spec: &QuerySpec) -> Selector {
    let node = &spec.node;
    let mut selector = Selector::new(&node.table).select(node.select_columns());
    selector.distinct = spec.unique;
    if let Some(id) = &node.id.value {
        selector.add_predicate(Predicate::eq(&node.id.column, id));
    }
    if let Some(predicate) = &spec.predicate {
        selector.add_predicate(predicate.clone());
    }
    selector.order = spec.order.clone();
    selector.limit = spec.limit;
    selector.offset = spec.offset;
    selector
}

/// Materialize every row a `QuerySpec` matches.
pub async fn query_nodes(driver: &dyn Driver, spec: &QuerySpec) -> Result<Vec<Row>> {
    select_rows(driver, &selector(spec)).await
}

/// Count the nodes a `QuerySpec` matches. Limit and offset are ignored.
pub async fn count_nodes(driver: &dyn Driver, spec: &QuerySpec) -> Result<i64> {
    let mut selector = selector(spec);
    selector.columns = vec![spec.node.id.column.clone()];
    selector.order.clear();
    selector.limit = None;
    selector.offset = None;

    let stmt = selector.render_count(driver.dialect());
    let rows = Session::direct(driver).query(&stmt).await?;
    rows.first()
        .and_then(|row| row.values.first())
        .and_then(Value::as_i64)
        .ok_or_else(|| EntError::Decode {
            column: "count".to_string(),
            message: "count query returned no integer".to_string(),
        })
}

/// Run an arbitrary selector, e.g. a column projection or a group-by.
pub async fn select_rows(driver: &dyn Driver, selector: &Selector) -> Result<Vec<Row>> {
    let stmt = selector.render(driver.dialect());
    let rows = Session::direct(driver).query(&stmt).await?;
    tracing::debug!(table = %selector.table, rows = rows.len(), "Selected rows");
    Ok(rows)
}

/// Read `(source, target)` pairs from a junction table.
pub async fn query_edges(driver: &dyn Driver, spec: &EdgeQuerySpec) -> Result<Vec<(Id, Id)>> {
    let Some(first) = spec.from.first() else {
        return Ok(Vec::new());
    };
    let source_ty = first.id_type();
    let edge = &spec.edge;
    let (source_col, target_col) = edge.junction_columns();

    let selector = Selector::new(&edge.table)
        .select([source_col, target_col])
        .filter(Predicate::in_values(source_col, spec.from.iter().cloned()));
    let rows = Session::direct(driver)
        .query(&selector.render(driver.dialect()))
        .await?;

    rows.iter()
        .map(|row| {
            let source = row
                .get(source_col)
                .and_then(|v| Id::from_value(v, source_ty));
            let target = row
                .get(target_col)
                .and_then(|v| Id::from_value(v, edge.target.id_type));
            match (source, target) {
                (Some(source), Some(target)) => Ok((source, target)),
                _ => Err(EntError::Decode {
                    column: format!("{}.{}", edge.table, target_col),
                    message: "junction row with a missing id".to_string(),
                }),
            }
        })
        .collect()
}
