//! Entity-agnostic operation specs
//!
//! A spec describes one graph operation in terms of tables, columns and ids
//! only. Specs are built by the client from static schema data, validated,
//! and then handed to the compiler in [`crate::graph`].

use std::collections::BTreeSet;

use crate::error::{EntError, Result};
use crate::sql::{Order, Predicate};
use crate::value::{FieldType, Id, IdType, Value};

/// Relation kind, seen from the edge's source node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rel {
    O2O,
    O2M,
    M2O,
    M2M,
}

impl Rel {
    /// Whether a source node relates to at most one target.
    pub fn is_to_one(&self) -> bool {
        matches!(self, Rel::O2O | Rel::M2O)
    }
}

/// Where the rows that realize an edge are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FkLocation {
    /// Foreign key column on the source table.
    Source,
    /// Foreign key column on the target table.
    Target,
    /// Symmetric self-reference: the column exists on both ends.
    Both,
    /// Pair rows in a junction table.
    Junction,
}

/// Primary key of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct IdSpec {
    pub column: String,
    pub ty: IdType,
    /// A concrete id, for id-scoped operations and pre-assigned ids.
    pub value: Option<Id>,
}

impl IdSpec {
    /// Reject an id whose type differs from the declared one.
    pub fn check(&self, table: &str, id: &Id) -> Result<()> {
        check_id_type(table, self.ty, id)
    }
}

pub(crate) fn check_id_type(table: &str, expected: IdType, id: &Id) -> Result<()> {
    if id.id_type() != expected {
        return Err(EntError::IdTypeMismatch {
            table: table.to_string(),
            expected,
            found: id.id_type(),
        });
    }
    Ok(())
}

/// A table, its id, and the columns an operation reads.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub table: String,
    /// Entity name used in errors and cursors.
    pub label: String,
    pub id: IdSpec,
    /// Non-id columns; the id column is always selected in addition.
    pub columns: Vec<String>,
}

impl NodeSpec {
    /// The id column followed by every other column.
    pub fn select_columns(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        columns.push(self.id.column.clone());
        columns.extend(self.columns.iter().filter(|c| **c != self.id.column).cloned());
        columns
    }
}

/// A typed column value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub column: String,
    pub ty: FieldType,
    pub value: Value,
}

impl FieldSpec {
    pub fn new(column: impl Into<String>, ty: FieldType, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            ty,
            value: value.into(),
        }
    }
}

/// The far end of an edge.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeTarget {
    pub table: String,
    pub id_column: String,
    pub id_type: IdType,
    pub nodes: Vec<Id>,
}

impl EdgeTarget {
    /// Append target ids, skipping ones already present. Order is kept.
    pub fn add_nodes(&mut self, ids: impl IntoIterator<Item = Id>) {
        for id in ids {
            if !self.nodes.contains(&id) {
                self.nodes.push(id);
            }
        }
    }
}

/// One relation to mutate or traverse.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSpec {
    pub name: String,
    pub rel: Rel,
    /// The foreign key lives on the target table (O2O) or the source id is
    /// stored in the second junction column (M2M).
    pub inverse: bool,
    pub bidi: bool,
    pub required: bool,
    /// Table holding the foreign key, or the junction table.
    pub table: String,
    /// `[fk]`, or `[owner, other]` for a junction table.
    pub columns: Vec<String>,
    pub target: EdgeTarget,
}

impl EdgeSpec {
    pub fn fk_location(&self) -> FkLocation {
        match self.rel {
            Rel::M2M => FkLocation::Junction,
            Rel::M2O => FkLocation::Source,
            Rel::O2M => FkLocation::Target,
            Rel::O2O if self.bidi => FkLocation::Both,
            Rel::O2O if self.inverse => FkLocation::Target,
            Rel::O2O => FkLocation::Source,
        }
    }

    /// The foreign key column, for non-junction edges.
    pub fn fk_column(&self) -> &str {
        self.columns.first().map(String::as_str).unwrap_or_default()
    }

    /// Junction columns as `(source side, target side)`.
    pub fn junction_columns(&self) -> (&str, &str) {
        let owner = self.columns.first().map(String::as_str).unwrap_or_default();
        let other = self.columns.get(1).map(String::as_str).unwrap_or_default();
        if self.inverse { (other, owner) } else { (owner, other) }
    }

    /// Check the target id types and the to-one cardinality.
    pub fn validate_targets(&self) -> Result<()> {
        for id in &self.target.nodes {
            check_id_type(&self.target.table, self.target.id_type, id)?;
        }
        if self.rel.is_to_one() && self.target.nodes.len() > 1 {
            return Err(EntError::cardinality(
                &self.name,
                format!(
                    "multiple assignments on a unique edge ({} targets)",
                    self.target.nodes.len()
                ),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Operation specs
// ============================================================================

/// Insert one node and attach its edges.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateSpec {
    pub node: NodeSpec,
    pub fields: Vec<FieldSpec>,
    pub edges: Vec<EdgeSpec>,
}

impl CreateSpec {
    pub fn new(node: NodeSpec) -> Self {
        Self {
            node,
            fields: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(id) = &self.node.id.value {
            self.node.id.check(&self.node.table, id)?;
        }
        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if !seen.insert(field.column.as_str()) {
                return Err(EntError::validation(&field.column, "assigned more than once"));
            }
        }
        for edge in &self.edges {
            edge.validate_targets()?;
        }
        Ok(())
    }
}

/// Field mutations of an update, partitioned by kind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldMutations {
    pub set: Vec<FieldSpec>,
    /// Increments; numeric columns only.
    pub add: Vec<FieldSpec>,
    /// Columns reset to NULL. The value is ignored.
    pub clear: Vec<FieldSpec>,
}

impl FieldMutations {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.add.is_empty() && self.clear.is_empty()
    }
}

/// Edge mutations of an update, partitioned by kind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EdgeMutations {
    /// Edges to detach. An edge with no target nodes detaches everything.
    pub clear: Vec<EdgeSpec>,
    pub add: Vec<EdgeSpec>,
}

impl EdgeMutations {
    pub fn is_empty(&self) -> bool {
        self.clear.is_empty() && self.add.is_empty()
    }
}

/// Update every node matching a predicate, or a single node by id.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSpec {
    pub node: NodeSpec,
    pub predicate: Option<Predicate>,
    pub fields: FieldMutations,
    pub edges: EdgeMutations,
}

impl UpdateSpec {
    pub fn new(node: NodeSpec) -> Self {
        Self {
            node,
            predicate: None,
            fields: FieldMutations::default(),
            edges: EdgeMutations::default(),
        }
    }

    /// Structural checks that need no schema and no database.
    pub fn validate(&self) -> Result<()> {
        if let Some(id) = &self.node.id.value {
            self.node.id.check(&self.node.table, id)?;
        }

        for add in &self.fields.add {
            if !add.ty.is_numeric() {
                return Err(EntError::validation(
                    &add.column,
                    format!("cannot add to non-numeric type {:?}", add.ty),
                ));
            }
        }
        for clear in &self.fields.clear {
            let conflict = self
                .fields
                .set
                .iter()
                .chain(&self.fields.add)
                .any(|f| f.column == clear.column);
            if conflict {
                return Err(EntError::validation(
                    &clear.column,
                    "cleared and assigned in the same operation",
                ));
            }
        }

        for edge in &self.edges.add {
            edge.validate_targets()?;
        }
        for edge in &self.edges.clear {
            for id in &edge.target.nodes {
                check_id_type(&edge.target.table, edge.target.id_type, id)?;
            }
            if !edge.rel.is_to_one() {
                continue;
            }
            if self.edges.add.iter().any(|a| a.name == edge.name) {
                return Err(EntError::cardinality(
                    &edge.name,
                    "unique edge cleared and set in the same operation",
                ));
            }
            if edge.required {
                return Err(EntError::cardinality(&edge.name, "clearing a required unique edge"));
            }
        }
        Ok(())
    }
}

/// Delete every node matching a predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteSpec {
    pub node: NodeSpec,
    pub predicate: Option<Predicate>,
}

/// Read nodes of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub node: NodeSpec,
    pub predicate: Option<Predicate>,
    pub order: Vec<Order>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// Render `SELECT DISTINCT`; set for traversals that may fan out.
    pub unique: bool,
}

impl QuerySpec {
    pub fn new(node: NodeSpec) -> Self {
        Self {
            node,
            predicate: None,
            order: Vec::new(),
            limit: None,
            offset: None,
            unique: false,
        }
    }

    pub fn add_predicate(&mut self, predicate: Predicate) {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
    }
}

/// Read `(source, target)` pairs of a junction edge for a set of sources.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeQuerySpec {
    pub edge: EdgeSpec,
    pub from: Vec<Id>,
}
