//! Relay cursor pagination
//!
//! Implements the Relay Connection contract over a primary-key ordered node
//! stream. One call walks Validate, Bound, Fetch, Trim and Wrap:
//!
//! - `after`/`before` cursors bound the id range (`id > after`, `id < before`)
//! - `first` orders ascending and `last` descending, each fetching one extra
//!   row so the presence of another page is known without a count query
//! - backward pages are reversed so edges always run oldest to newest
//!
//! Fetching is left to the caller (see `QueryBuilder::paginate`), so eager
//! loading applies to paginated nodes as it does to any other query.

use std::fmt;
use std::str::FromStr;

use async_graphql::{InputValueError, InputValueResult, Scalar, ScalarType, SimpleObject};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::error::{EntError, Result};
use crate::spec::QuerySpec;
use crate::sql::{Order, Predicate};
use crate::value::Id;

// ============================================================================
// Cursor
// ============================================================================

/// Opaque position of a node: its entity label and primary key.
///
/// Cursors only compare meaningfully within one entity type under the
/// primary-key ordering used here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor {
    label: String,
    id: Id,
}

#[derive(Serialize, Deserialize)]
struct WireCursor {
    t: String,
    id: Id,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CursorError {
    #[error("invalid cursor: not url-safe base64")]
    Encoding,

    #[error("invalid cursor payload: {0}")]
    Payload(String),

    #[error("cursor belongs to {found}, not {expected}")]
    ForeignEntity { expected: String, found: String },
}

impl Cursor {
    pub fn new(label: impl Into<String>, id: Id) -> Self {
        Self {
            label: label.into(),
            id,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Encode as URL-safe base64 (no padding) of `{"t": label, "id": id}`.
    pub fn encode(&self) -> String {
        let wire = WireCursor {
            t: self.label.clone(),
            id: self.id.clone(),
        };
        // Serializing a string and an id cannot fail.
        let json = serde_json::to_vec(&wire).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(s: &str) -> std::result::Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s.trim_end_matches('='))
            .map_err(|_| CursorError::Encoding)?;
        let wire: WireCursor =
            serde_json::from_slice(&bytes).map_err(|e| CursorError::Payload(e.to_string()))?;
        Ok(Self {
            label: wire.t,
            id: wire.id,
        })
    }

    /// Reject a cursor minted for another entity type.
    pub fn expect_label(&self, label: &str) -> std::result::Result<(), CursorError> {
        if self.label != label {
            return Err(CursorError::ForeignEntity {
                expected: label.to_string(),
                found: self.label.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Cursor {
    type Err = CursorError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Cursor::decode(s)
    }
}

#[Scalar(name = "Cursor")]
impl ScalarType for Cursor {
    fn parse(value: async_graphql::Value) -> InputValueResult<Self> {
        match &value {
            async_graphql::Value::String(s) => Cursor::decode(s).map_err(InputValueError::custom),
            _ => Err(InputValueError::expected_type(value)),
        }
    }

    fn to_value(&self) -> async_graphql::Value {
        async_graphql::Value::String(self.encode())
    }
}

// ============================================================================
// Connection types
// ============================================================================

/// Information about pagination in a connection
#[derive(SimpleObject, Debug, Clone, Default, PartialEq)]
pub struct PageInfo {
    /// When paginating forwards, are there more items?
    pub has_next_page: bool,
    /// When paginating backwards, are there more items?
    pub has_previous_page: bool,
    /// Cursor of the first item in this page
    pub start_cursor: Option<Cursor>,
    /// Cursor of the last item in this page
    pub end_cursor: Option<Cursor>,
}

/// An edge in a connection, containing a node and cursor
#[derive(Debug, Clone)]
pub struct Edge<T> {
    pub node: T,
    pub cursor: Cursor,
}

/// One page of nodes plus boundary metadata. Built fresh per call.
#[derive(Debug, Clone)]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
}

impl<T> Connection<T> {
    /// Create an empty connection
    pub fn empty() -> Self {
        Self {
            edges: Vec::new(),
            page_info: PageInfo::default(),
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.edges.iter().map(|e| &e.node)
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Relay pagination arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageArgs {
    pub after: Option<Cursor>,
    pub first: Option<i32>,
    pub before: Option<Cursor>,
    pub last: Option<i32>,
}

impl PageArgs {
    pub fn new(
        after: Option<Cursor>,
        first: Option<i32>,
        before: Option<Cursor>,
        last: Option<i32>,
    ) -> Self {
        Self {
            after,
            first,
            before,
            last,
        }
    }

    /// Check argument consistency. Runs before any query.
    pub fn validate(&self) -> Result<()> {
        if self.first.is_some() && self.last.is_some() {
            return Err(EntError::InvalidPagination(
                "passing both `first` and `last` is not supported".to_string(),
            ));
        }
        if let Some(first) = self.first.filter(|f| *f < 0) {
            return Err(EntError::InvalidPagination(format!(
                "`first` must be non-negative, got {}",
                first
            )));
        }
        if let Some(last) = self.last.filter(|l| *l < 0) {
            return Err(EntError::InvalidPagination(format!(
                "`last` must be non-negative, got {}",
                last
            )));
        }
        Ok(())
    }

    /// `first: 0` or `last: 0` asks for an empty page; no query is needed.
    pub fn is_empty_page(&self) -> bool {
        self.first == Some(0) || self.last == Some(0)
    }

    /// Apply `default_size` when neither `first` nor `last` is given, and
    /// clamp both to `max_size`.
    pub fn with_page_size(mut self, default_size: i32, max_size: i32) -> Self {
        if self.first.is_none() && self.last.is_none() {
            self.first = Some(default_size);
        }
        self.first = self.first.map(|f| f.min(max_size));
        self.last = self.last.map(|l| l.min(max_size));
        self
    }

    /// Add the cursor range, ordering and over-fetch limit to a query.
    /// Any ordering already on the query is replaced by the id ordering.
    pub fn bound(&self, spec: &mut QuerySpec) -> Result<()> {
        let label = spec.node.label.clone();
        let id_column = spec.node.id.column.clone();

        if let Some(after) = &self.after {
            after.expect_label(&label)?;
            spec.node.id.check(&spec.node.table, after.id())?;
            spec.add_predicate(Predicate::gt(&id_column, after.id()));
        }
        if let Some(before) = &self.before {
            before.expect_label(&label)?;
            spec.node.id.check(&spec.node.table, before.id())?;
            spec.add_predicate(Predicate::lt(&id_column, before.id()));
        }

        spec.order = match self.last {
            Some(_) => vec![Order::desc(&id_column)],
            None => vec![Order::asc(&id_column)],
        };
        if let Some(n) = self.first.or(self.last) {
            spec.limit = Some(n as i64 + 1);
        }
        Ok(())
    }

    /// Restore ascending order and drop the over-fetched row.
    /// Returns `(items, has_next_page, has_previous_page)`.
    pub fn trim<T>(&self, mut items: Vec<T>) -> (Vec<T>, bool, bool) {
        let mut has_next = false;
        let mut has_previous = false;

        if let Some(last) = self.last {
            items.reverse();
            let last = last as usize;
            if items.len() > last {
                has_previous = true;
                items.drain(..items.len() - last);
            }
        }
        if let Some(first) = self.first {
            let first = first as usize;
            if items.len() > first {
                has_next = true;
                items.truncate(first);
            }
        }
        (items, has_next, has_previous)
    }

    /// Build the connection for a fetched page.
    pub fn wrap<T>(&self, items: Vec<T>, cursor: impl Fn(&T) -> Cursor) -> Connection<T> {
        let (items, has_next_page, has_previous_page) = self.trim(items);
        let edges: Vec<Edge<T>> = items
            .into_iter()
            .map(|node| Edge {
                cursor: cursor(&node),
                node,
            })
            .collect();

        let page_info = PageInfo {
            has_next_page,
            has_previous_page,
            start_cursor: edges.first().map(|e| e.cursor.clone()),
            end_cursor: edges.last().map(|e| e.cursor.clone()),
        };
        Connection { edges, page_info }
    }
}
