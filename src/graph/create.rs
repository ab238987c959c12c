use super::edges::{Attach, add_edges};
use super::{Session, ids_from_rows};
use crate::driver::Driver;
use crate::error::{EntError, MutationStep, Result};
use crate::spec::{CreateSpec, EdgeSpec, FkLocation};
use crate::sql::InsertBuilder;
use crate::value::{Id, IdType, Value};

/// Insert one node and attach its edges. Returns the new node's id.
///
/// Source-side foreign keys are inlined into the insert. Edges stored on
/// another table or in a junction table take one statement each after the
/// insert, and the whole sequence then runs in a transaction.
pub async fn create_node(driver: &dyn Driver, spec: &CreateSpec) -> Result<Id> {
    spec.validate()?;

    let node = &spec.node;
    let dialect = driver.dialect();

    let mut columns: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(id) = &node.id.value {
        columns.push(node.id.column.clone());
        values.push(id.into());
    }
    for field in &spec.fields {
        columns.push(field.column.clone());
        values.push(field.value.clone());
    }
    for edge in inlined(&spec.edges) {
        if let Some(target) = edge.target.nodes.first() {
            columns.push(edge.fk_column().to_string());
            values.push(target.into());
        }
    }

    let mut insert = InsertBuilder::new(&node.table).columns(columns);
    if !values.is_empty() {
        insert = insert.values(values);
    }
    let returning = node.id.value.is_none() && dialect.use_returning();
    if returning {
        insert = insert.returning(&node.id.column);
    }

    let post_insert: Vec<EdgeSpec> = spec
        .edges
        .iter()
        .filter(|e| e.fk_location() != FkLocation::Source && !e.target.nodes.is_empty())
        .cloned()
        .collect();

    let mut session = if post_insert.is_empty() {
        Session::direct(driver)
    } else {
        Session::begin(driver).await?
    };

    let result: Result<Id> = async {
        let stmt = insert.render(dialect);
        let id = if returning {
            let rows = session.query(&stmt).await?;
            ids_from_rows(&rows, node.id.ty, &node.id.column)?
                .into_iter()
                .next()
                .ok_or_else(|| EntError::Decode {
                    column: node.id.column.clone(),
                    message: "insert returned no id".to_string(),
                })?
        } else {
            let res = session.exec(&stmt).await?;
            match (&node.id.value, node.id.ty, res.last_insert_id) {
                (Some(id), _, _) => id.clone(),
                (None, IdType::Int, Some(rowid)) => Id::Int(rowid),
                (None, _, _) => {
                    return Err(EntError::validation(
                        &node.id.column,
                        "no id supplied and the backend generated none",
                    ));
                }
            }
        };

        let added = add_edges(
            &mut session,
            node,
            std::slice::from_ref(&id),
            &post_insert,
            Attach::Created,
        )
        .await;
        added.map_err(|err| session.fail(MutationStep::AddEdges, err))?;

        tracing::debug!(table = %node.table, id = %id, edges = post_insert.len(), "Created node");
        Ok(id)
    }
    .await;

    session.finish(result).await
}

/// Edges whose foreign key is written as part of the insert itself.
fn inlined(edges: &[EdgeSpec]) -> impl Iterator<Item = &EdgeSpec> {
    edges.iter().filter(|e| {
        matches!(e.fk_location(), FkLocation::Source | FkLocation::Both)
    })
}
