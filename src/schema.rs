//! Static entity metadata
//!
//! Each entity is described once as a `static EntitySchema`. The generic
//! builders in [`crate::client`] read these tables to produce specs, so no
//! per-entity code is needed.
//!
//! ```ignore
//! static USER: EntitySchema = EntitySchema {
//!     label: "User",
//!     table: "users",
//!     id: IdDef::auto("id"),
//!     columns: &[ColumnDef::new("name", FieldType::String)],
//!     edges: &[EdgeDef::new("pets", Rel::O2M, &PET, "pets", &["owner_id"])],
//! };
//! ```

use std::fmt;

use crate::error::{EntError, Result};
use crate::spec::{EdgeSpec, EdgeTarget, FkLocation, IdSpec, NodeSpec, Rel, check_id_type};
use crate::value::{FieldType, Id, IdType, Value};

/// How new ids are produced on create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    /// The database generates the id.
    AutoIncrement,
    /// The caller must supply the id.
    Assigned,
    /// A random v4 UUID string is generated client-side unless supplied.
    Uuid,
}

#[derive(Debug, Clone, Copy)]
pub struct IdDef {
    pub column: &'static str,
    pub ty: IdType,
    pub strategy: IdStrategy,
}

impl IdDef {
    pub const fn auto(column: &'static str) -> Self {
        Self {
            column,
            ty: IdType::Int,
            strategy: IdStrategy::AutoIncrement,
        }
    }

    pub const fn assigned(column: &'static str, ty: IdType) -> Self {
        Self {
            column,
            ty,
            strategy: IdStrategy::Assigned,
        }
    }

    pub const fn uuid(column: &'static str) -> Self {
        Self {
            column,
            ty: IdType::String,
            strategy: IdStrategy::Uuid,
        }
    }
}

/// A scalar column of an entity.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: FieldType,
    pub nullable: bool,
    /// Value applied on create when the caller sets none.
    pub default: Option<fn() -> Value>,
    /// Value applied on every update when the caller sets none.
    pub update_default: Option<fn() -> Value>,
    pub validator: Option<fn(&Value) -> std::result::Result<(), String>>,
}

impl ColumnDef {
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            default: None,
            update_default: None,
            validator: None,
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn default(mut self, f: fn() -> Value) -> Self {
        self.default = Some(f);
        self
    }

    pub const fn update_default(mut self, f: fn() -> Value) -> Self {
        self.update_default = Some(f);
        self
    }

    pub const fn validate(mut self, f: fn(&Value) -> std::result::Result<(), String>) -> Self {
        self.validator = Some(f);
        self
    }

    /// Check a value about to be written to this column.
    pub fn check(&self, value: &Value) -> Result<()> {
        if value.is_null() && !self.nullable {
            return Err(EntError::validation(self.name, "column is not nullable"));
        }
        if !self.ty.accepts(value) {
            return Err(EntError::validation(
                self.name,
                format!("expected {:?}, got {}", self.ty, value.kind()),
            ));
        }
        if let (Some(validator), false) = (self.validator, value.is_null()) {
            validator(value).map_err(|msg| EntError::validation(self.name, msg))?;
        }
        Ok(())
    }
}

/// A relation from one entity to another.
#[derive(Clone, Copy)]
pub struct EdgeDef {
    pub name: &'static str,
    pub rel: Rel,
    pub inverse: bool,
    pub bidi: bool,
    /// A to-one edge that must always be set.
    pub required: bool,
    pub target: &'static EntitySchema,
    /// Table holding the foreign key, or the junction table.
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

impl EdgeDef {
    pub const fn new(
        name: &'static str,
        rel: Rel,
        target: &'static EntitySchema,
        table: &'static str,
        columns: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            rel,
            inverse: false,
            bidi: false,
            required: false,
            target,
            table,
            columns,
        }
    }

    pub const fn inverse(mut self) -> Self {
        self.inverse = true;
        self
    }

    pub const fn bidi(mut self) -> Self {
        self.bidi = true;
        self
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Build an edge spec pointing at the given target ids.
    /// Duplicate ids are collapsed.
    pub fn spec(&self, nodes: Vec<Id>) -> EdgeSpec {
        let mut spec = EdgeSpec {
            name: self.name.to_string(),
            rel: self.rel,
            inverse: self.inverse,
            bidi: self.bidi,
            required: self.required,
            table: self.table.to_string(),
            columns: self.columns.iter().map(|c| c.to_string()).collect(),
            target: EdgeTarget {
                table: self.target.table.to_string(),
                id_column: self.target.id.column.to_string(),
                id_type: self.target.id.ty,
                nodes: Vec::with_capacity(nodes.len()),
            },
        };
        spec.target.add_nodes(nodes);
        spec
    }

    /// The foreign key column stored on the source table, if any.
    pub fn source_fk(&self) -> Option<&'static str> {
        match self.spec(Vec::new()).fk_location() {
            FkLocation::Source | FkLocation::Both => self.columns.first().copied(),
            FkLocation::Target | FkLocation::Junction => None,
        }
    }
}

impl fmt::Debug for EdgeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The target is printed by label; schemas reference each other.
        f.debug_struct("EdgeDef")
            .field("name", &self.name)
            .field("rel", &self.rel)
            .field("inverse", &self.inverse)
            .field("bidi", &self.bidi)
            .field("required", &self.required)
            .field("target", &self.target.label)
            .field("table", &self.table)
            .field("columns", &self.columns)
            .finish()
    }
}

/// Metadata for one entity type.
#[derive(Debug)]
pub struct EntitySchema {
    pub label: &'static str,
    pub table: &'static str,
    pub id: IdDef,
    pub columns: &'static [ColumnDef],
    pub edges: &'static [EdgeDef],
}

impl EntitySchema {
    pub fn column(&self, name: &str) -> Option<&'static ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn edge(&self, name: &str) -> Option<&'static EdgeDef> {
        self.edges.iter().find(|e| e.name == name)
    }

    /// Look up a column, failing with a validation error naming it.
    pub fn require_column(&self, name: &str) -> Result<&'static ColumnDef> {
        self.column(name)
            .ok_or_else(|| EntError::validation(name, format!("unknown field on {}", self.label)))
    }

    /// Look up an edge, failing with an unknown-edge error naming it.
    pub fn require_edge(&self, name: &str) -> Result<&'static EdgeDef> {
        self.edge(name)
            .ok_or_else(|| EntError::UnknownEdge {
                label: self.label.to_string(),
                edge: name.to_string(),
            })
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.to_string()).collect()
    }

    /// Whether `name` is the id column or a declared column.
    pub fn has_column(&self, name: &str) -> bool {
        name == self.id.column || self.column(name).is_some()
    }

    pub fn node_spec(&self) -> NodeSpec {
        NodeSpec {
            table: self.table.to_string(),
            label: self.label.to_string(),
            id: IdSpec {
                column: self.id.column.to_string(),
                ty: self.id.ty,
                value: None,
            },
            columns: self.column_names(),
        }
    }

    /// Node spec scoped to one id.
    pub fn node_spec_for(&self, id: &Id) -> Result<NodeSpec> {
        self.check_id(id)?;
        let mut node = self.node_spec();
        node.id.value = Some(id.clone());
        Ok(node)
    }

    pub fn check_id(&self, id: &Id) -> Result<()> {
        check_id_type(self.table, self.id.ty, id)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn non_empty(v: &Value) -> std::result::Result<(), String> {
        match v.as_str() {
            Some("") => Err("must not be empty".into()),
            _ => Ok(()),
        }
    }

    static OWNER: EntitySchema = EntitySchema {
        label: "Owner",
        table: "owners",
        id: IdDef::auto("id"),
        columns: &[
            ColumnDef::new("name", FieldType::String).validate(non_empty),
            ColumnDef::new("nickname", FieldType::String).nullable(),
        ],
        edges: &[EdgeDef::new("items", Rel::O2M, &ITEM, "items", &["owner_id"])],
    };

    static ITEM: EntitySchema = EntitySchema {
        label: "Item",
        table: "items",
        id: IdDef::uuid("id"),
        columns: &[],
        edges: &[EdgeDef::new("owner", Rel::M2O, &OWNER, "items", &["owner_id"]).required()],
    };

    #[test]
    fn test_column_check() {
        let name = OWNER.column("name").unwrap();
        assert!(name.check(&Value::from("a")).is_ok());
        assert_matches!(name.check(&Value::from("")), Err(EntError::Validation { .. }));
        assert_matches!(name.check(&Value::Null), Err(EntError::Validation { .. }));
        assert_matches!(name.check(&Value::Int(1)), Err(EntError::Validation { .. }));
        assert!(OWNER.column("nickname").unwrap().check(&Value::Null).is_ok());
    }

    #[test]
    fn test_edge_spec_carries_target() {
        let spec = OWNER.edge("items").unwrap().spec(vec![Id::from("a")]);
        assert_eq!(spec.target.table, "items");
        assert_eq!(spec.target.id_type, IdType::String);
        assert_eq!(spec.fk_location(), FkLocation::Target);
    }

    #[test]
    fn test_require_edge_names_unknown_edge() {
        assert!(OWNER.require_edge("items").is_ok());
        assert_matches!(
            OWNER.require_edge("nope"),
            Err(EntError::UnknownEdge { label, edge }) if label == "Owner" && edge == "nope"
        );
    }

    #[test]
    fn test_edge_spec_collapses_repeated_ids() {
        let spec = OWNER
            .edge("items")
            .unwrap()
            .spec(vec![Id::from("b"), Id::from("a"), Id::from("b")]);
        assert_eq!(spec.target.nodes, vec![Id::from("b"), Id::from("a")]);
    }

    #[test]
    fn test_source_fk() {
        assert_eq!(ITEM.edge("owner").unwrap().source_fk(), Some("owner_id"));
        assert_eq!(OWNER.edge("items").unwrap().source_fk(), None);
    }

    #[test]
    fn test_node_spec_for_checks_id_type() {
        assert_matches!(
            OWNER.node_spec_for(&Id::from("x")),
            Err(EntError::IdTypeMismatch { .. })
        );
        let node = ITEM.node_spec_for(&Id::from("x")).unwrap();
        assert_eq!(node.id.value, Some(Id::from("x")));
    }
}
