//! Attaching and detaching edges
//!
//! How an edge is written depends on where its foreign key lives; see
//! [`EdgeSpec::fk_location`].

use super::Session;
use crate::error::{EntError, Result};
use crate::sql::{DeleteBuilder, InsertBuilder, Predicate, UpdateBuilder};
use crate::spec::{EdgeSpec, FkLocation, NodeSpec};
use crate::value::{Id, Value};

/// How `add_edges` treats an existing to-one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attach {
    /// A freshly inserted node; source-side keys were inlined in the insert.
    Created,
    /// An existing node; a to-one edge replaces its current target.
    Replace,
}

fn id_values(ids: &[Id]) -> Vec<Value> {
    ids.iter().map(Value::from).collect()
}

/// Detach edges from every source in `ids`. An edge spec without target
/// nodes detaches all targets.
pub(crate) async fn clear_edges(
    session: &mut Session<'_>,
    node: &NodeSpec,
    ids: &[Id],
    edges: &[EdgeSpec],
) -> Result<()> {
    let dialect = session.dialect();
    for edge in edges {
        let targets = &edge.target.nodes;
        let fk = edge.fk_column();

        match edge.fk_location() {
            FkLocation::Source | FkLocation::Both => {
                let mut update = UpdateBuilder::new(&node.table)
                    .set_null(fk)
                    .filter(Predicate::in_values(&node.id.column, id_values(ids)));
                if !targets.is_empty() {
                    update = update.filter(Predicate::in_values(fk, id_values(targets)));
                }
                session.exec(&update.render(dialect)).await?;

                if edge.fk_location() == FkLocation::Both {
                    // The partner points back at us.
                    let mut back = UpdateBuilder::new(&edge.table)
                        .set_null(fk)
                        .filter(Predicate::in_values(fk, id_values(ids)));
                    if !targets.is_empty() {
                        back = back.filter(Predicate::in_values(
                            &edge.target.id_column,
                            id_values(targets),
                        ));
                    }
                    session.exec(&back.render(dialect)).await?;
                }
            }
            FkLocation::Target => {
                let mut update = UpdateBuilder::new(&edge.table)
                    .set_null(fk)
                    .filter(Predicate::in_values(fk, id_values(ids)));
                if !targets.is_empty() {
                    update = update.filter(Predicate::in_values(
                        &edge.target.id_column,
                        id_values(targets),
                    ));
                }
                session.exec(&update.render(dialect)).await?;
            }
            FkLocation::Junction => {
                let (source_col, target_col) = edge.junction_columns();
                let mut forward = Predicate::in_values(source_col, id_values(ids));
                if !targets.is_empty() {
                    forward = forward.and(Predicate::in_values(target_col, id_values(targets)));
                }
                let predicate = if edge.bidi {
                    let mut backward = Predicate::in_values(target_col, id_values(ids));
                    if !targets.is_empty() {
                        backward =
                            backward.and(Predicate::in_values(source_col, id_values(targets)));
                    }
                    Predicate::any([forward, backward])
                } else {
                    forward
                };
                let delete = DeleteBuilder::new(&edge.table).filter(predicate);
                session.exec(&delete.render(dialect)).await?;
            }
        }
    }
    Ok(())
}

/// Attach the targets of each edge to every source in `ids`.
pub(crate) async fn add_edges(
    session: &mut Session<'_>,
    node: &NodeSpec,
    ids: &[Id],
    edges: &[EdgeSpec],
    mode: Attach,
) -> Result<()> {
    let dialect = session.dialect();
    for edge in edges {
        let targets = &edge.target.nodes;
        if targets.is_empty() || ids.is_empty() {
            continue;
        }
        let fk = edge.fk_column();

        match edge.fk_location() {
            FkLocation::Source => {
                if mode == Attach::Created {
                    continue;
                }
                let update = UpdateBuilder::new(&node.table)
                    .set(fk, &targets[0])
                    .filter(Predicate::in_values(&node.id.column, id_values(ids)));
                session.exec(&update.render(dialect)).await?;
            }
            FkLocation::Both => {
                let [source] = ids else {
                    return Err(EntError::ConstraintViolation {
                        message: format!(
                            "unable to link unique edge \"{}\" to {} sources",
                            edge.name,
                            ids.len()
                        ),
                    });
                };
                let target = &targets[0];

                // Break up any pairing either end currently has.
                let mut stale = vec![Value::from(source), Value::from(target)];
                stale.dedup();
                let unpair = UpdateBuilder::new(&edge.table)
                    .set_null(fk)
                    .filter(Predicate::in_values(fk, stale))
                    .filter(Predicate::neq(&node.id.column, source));
                session.exec(&unpair.render(dialect)).await?;

                if mode == Attach::Replace {
                    let forward = UpdateBuilder::new(&node.table)
                        .set(fk, target)
                        .filter(Predicate::eq(&node.id.column, source));
                    session.exec(&forward.render(dialect)).await?;
                }
                let backward = UpdateBuilder::new(&edge.table)
                    .set(fk, source)
                    .filter(Predicate::eq(&edge.target.id_column, target));
                session.exec(&backward.render(dialect)).await?;
            }
            FkLocation::Target => {
                let [source] = ids else {
                    return Err(EntError::ConstraintViolation {
                        message: format!(
                            "unable to link edge \"{}\" targets to {} sources",
                            edge.name,
                            ids.len()
                        ),
                    });
                };
                if edge.rel.is_to_one() && mode == Attach::Replace {
                    let detach = UpdateBuilder::new(&edge.table)
                        .set_null(fk)
                        .filter(Predicate::eq(fk, source));
                    session.exec(&detach.render(dialect)).await?;
                }
                let attach = UpdateBuilder::new(&edge.table)
                    .set(fk, source)
                    .filter(Predicate::in_values(&edge.target.id_column, id_values(targets)))
                    .filter(Predicate::is_null(fk));
                let result = session.exec(&attach.render(dialect)).await?;
                if (result.rows_affected as usize) < targets.len() {
                    return Err(EntError::ConstraintViolation {
                        message: format!(
                            "one of {:?} is already connected to a different {}",
                            targets.iter().map(ToString::to_string).collect::<Vec<_>>(),
                            edge.name
                        ),
                    });
                }
            }
            FkLocation::Junction => {
                let (source_col, target_col) = edge.junction_columns();
                let mut rows: Vec<(Id, Id)> = Vec::new();
                for source in ids {
                    for target in targets {
                        rows.push((source.clone(), target.clone()));
                        if edge.bidi && source != target {
                            rows.push((target.clone(), source.clone()));
                        }
                    }
                }
                let mut insert = InsertBuilder::new(&edge.table).columns([source_col, target_col]);
                for (s, t) in rows {
                    insert = insert.values(vec![s.into(), t.into()]);
                }
                session.exec(&insert.render(dialect)).await?;
            }
        }
    }
    Ok(())
}
