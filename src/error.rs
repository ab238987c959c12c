//! Error taxonomy for graph operations
//!
//! Validation failures (`EdgeCardinality`, `Validation`, `InvalidPagination`,
//! `InvalidCursor`) are raised before any statement reaches the driver.
//! Backend failures are translated at the compiler boundary: constraint
//! kinds become `ConstraintViolation`, everything else stays categorized as
//! `Driver`.

use std::fmt;

use crate::driver::DriverError;
use crate::pagination::CursorError;
use crate::value::IdType;

pub type Result<T, E = EntError> = std::result::Result<T, E>;

/// Sub-step of a multi-statement mutation, reported when a failure happens
/// outside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStep {
    InsertNode,
    UpdateFields,
    ClearEdges,
    AddEdges,
}

impl fmt::Display for MutationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationStep::InsertNode => "insert node",
            MutationStep::UpdateFields => "update fields",
            MutationStep::ClearEdges => "clear edges",
            MutationStep::AddEdges => "add edges",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EntError {
    /// Zero rows matched an id-scoped read, update or delete.
    #[error("{label} not found")]
    NotFound { label: String },

    /// More than one row matched where exactly one was required.
    #[error("{label} not singular")]
    NotSingular { label: String },

    /// Unique, foreign-key, not-null or check failure reported by the backend,
    /// or an edge target already attached elsewhere.
    #[error("constraint failed: {message}")]
    ConstraintViolation { message: String },

    #[error("invalid pagination parameters: {0}")]
    InvalidPagination(String),

    #[error(transparent)]
    InvalidCursor(#[from] CursorError),

    /// Multiple targets, or contradictory clear and set, on a to-one edge.
    #[error("edge \"{edge}\": {reason}")]
    EdgeCardinality { edge: String, reason: String },

    /// The entity declares no edge with this name.
    #[error("{label} has no edge \"{edge}\"")]
    UnknownEdge { label: String, edge: String },

    /// A transaction could not be started, or was already finished.
    #[error("transaction: {0}")]
    Transaction(String),

    /// An eager-load batch returned a row whose key has no parent in the batch.
    #[error("edge \"{edge}\": {message}")]
    ReferentialIntegrity { edge: String, message: String },

    /// Access to an edge that was not requested for eager loading.
    #[error("edge \"{edge}\" was not loaded")]
    NotLoaded { edge: String },

    #[error("validator failed for field \"{column}\": {message}")]
    Validation { column: String, message: String },

    /// The id supplied does not match the declared id type. This is a
    /// programming error in the caller, surfaced as a value.
    #[error("table \"{table}\" expects {expected} ids, got {found}")]
    IdTypeMismatch {
        table: String,
        expected: IdType,
        found: IdType,
    },

    #[error("decode column \"{column}\": {message}")]
    Decode { column: String, message: String },

    #[error(transparent)]
    Driver(DriverError),

    /// A non-transactional mutation failed part way through.
    #[error("{step} failed after earlier statements were applied: {source}")]
    Partial {
        step: MutationStep,
        #[source]
        source: Box<EntError>,
    },
}

impl EntError {
    pub(crate) fn not_found(label: impl Into<String>) -> Self {
        EntError::NotFound {
            label: label.into(),
        }
    }

    pub(crate) fn not_singular(label: impl Into<String>) -> Self {
        EntError::NotSingular {
            label: label.into(),
        }
    }

    pub(crate) fn cardinality(edge: &str, reason: impl Into<String>) -> Self {
        EntError::EdgeCardinality {
            edge: edge.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn validation(column: &str, message: impl Into<String>) -> Self {
        EntError::Validation {
            column: column.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn integrity(edge: &str, message: impl Into<String>) -> Self {
        EntError::ReferentialIntegrity {
            edge: edge.to_string(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), EntError::NotFound { .. })
    }

    pub fn is_not_singular(&self) -> bool {
        matches!(self.root(), EntError::NotSingular { .. })
    }

    pub fn is_constraint(&self) -> bool {
        matches!(self.root(), EntError::ConstraintViolation { .. })
    }

    pub fn is_not_loaded(&self) -> bool {
        matches!(self, EntError::NotLoaded { .. })
    }

    /// The underlying error, looking through `Partial`.
    pub fn root(&self) -> &EntError {
        match self {
            EntError::Partial { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<DriverError> for EntError {
    fn from(err: DriverError) -> Self {
        if err.kind.is_constraint() {
            EntError::ConstraintViolation {
                message: err.message,
            }
        } else {
            EntError::Driver(err)
        }
    }
}
