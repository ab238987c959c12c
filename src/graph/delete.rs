use super::Session;
use crate::driver::Driver;
use crate::error::Result;
use crate::spec::DeleteSpec;
use crate::sql::{DeleteBuilder, Predicate};

/// Delete every node matched by a `DeleteSpec`. Returns the affected row count.
///
/// Junction rows and dependent foreign keys are left to the schema's
/// `ON DELETE` actions.
pub async fn delete_nodes(driver: &dyn Driver, spec: &DeleteSpec) -> Result<u64> {
    let node = &spec.node;
    if let Some(id) = &node.id.value {
        node.id.check(&node.table, id)?;
    }

    let mut delete = DeleteBuilder::new(&node.table);
    if let Some(id) = &node.id.value {
        delete = delete.filter(Predicate::eq(&node.id.column, id));
    }
    if let Some(predicate) = &spec.predicate {
        delete = delete.filter(predicate.clone());
    }

    let mut session = Session::direct(driver);
    let result = session.exec(&delete.render(driver.dialect())).await?;
    tracing::debug!(table = %node.table, deleted = result.rows_affected, "Deleted nodes");
    Ok(result.rows_affected)
}
