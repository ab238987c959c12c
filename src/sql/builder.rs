//! Statement builders
//!
//! Each builder is plain data until `render` is called with a dialect, so the
//! graph compiler can assemble statements piecemeal and tests can assert on
//! the exact SQL text.

use super::{Aggregate, Builder, Dialect, Order, Predicate, Statement};
use crate::value::Value;

/// Effective limit used when only an offset is requested. SQLite and MySQL
/// reject `OFFSET` without a preceding `LIMIT`.
pub const MAX_LIMIT: i64 = i32::MAX as i64;

// ============================================================================
// SELECT
// ============================================================================

/// A `SELECT` over one table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selector {
    pub table: String,
    /// Projected columns; empty means `*`.
    pub columns: Vec<String>,
    pub distinct: bool,
    pub predicate: Option<Predicate>,
    pub order: Vec<Order>,
    pub group_by: Vec<String>,
    pub aggregates: Vec<Aggregate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Selector {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn select<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Add a predicate, conjoined with any existing one.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.add_predicate(predicate);
        self
    }

    pub fn add_predicate(&mut self, predicate: Predicate) {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
    }

    pub fn order_by(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    pub fn group_by<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.group_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregates.push(aggregate);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn render(&self, dialect: Dialect) -> Statement {
        let mut b = Builder::new(dialect);
        self.write(&mut b);
        b.finish()
    }

    /// Render a `COUNT` over the same rows. A distinct selector counts
    /// distinct values of its first projected column.
    pub fn render_count(&self, dialect: Dialect) -> Statement {
        let mut b = Builder::new(dialect);
        b.push("SELECT COUNT(");
        match self.columns.first() {
            Some(column) if self.distinct => {
                b.push("DISTINCT ").ident(column);
            }
            _ => {
                b.push("*");
            }
        }
        b.push(") FROM ").ident(&self.table);
        self.write_where(&mut b);
        b.finish()
    }

    /// Write into an existing builder, e.g. as a sub-select.
    pub fn write(&self, b: &mut Builder) {
        b.push("SELECT ");
        if self.distinct {
            b.push("DISTINCT ");
        }
        self.write_projection(b);
        b.push(" FROM ").ident(&self.table);
        self.write_where(b);

        if !self.group_by.is_empty() {
            b.push(" GROUP BY ").idents(&self.group_by);
        }

        if !self.order.is_empty() {
            b.push(" ORDER BY ");
            for (i, order) in self.order.iter().enumerate() {
                if i > 0 {
                    b.push(", ");
                }
                b.ident(&order.column).push(" ").push(order.direction.to_sql());
            }
        }

        let limit = match (self.limit, self.offset) {
            (Some(limit), _) => Some(limit),
            (None, Some(_)) => Some(MAX_LIMIT),
            (None, None) => None,
        };
        if let Some(limit) = limit {
            b.push(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            b.push(&format!(" OFFSET {}", offset));
        }
    }

    fn write_projection(&self, b: &mut Builder) {
        if self.columns.is_empty() && self.aggregates.is_empty() {
            b.push("*");
            return;
        }
        b.idents(&self.columns);
        for (i, aggregate) in self.aggregates.iter().enumerate() {
            if i > 0 || !self.columns.is_empty() {
                b.push(", ");
            }
            aggregate.write(b);
        }
    }

    fn write_where(&self, b: &mut Builder) {
        if let Some(predicate) = &self.predicate {
            b.push(" WHERE ");
            predicate.write(b);
        }
    }
}

// ============================================================================
// INSERT
// ============================================================================

/// A (possibly multi-row) `INSERT`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertBuilder {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub returning: Option<String>,
}

impl InsertBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            returning: None,
        }
    }

    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn values(mut self, row: Vec<Value>) -> Self {
        self.rows.push(row);
        self
    }

    pub fn returning(mut self, column: impl Into<String>) -> Self {
        self.returning = Some(column.into());
        self
    }

    pub fn render(&self, dialect: Dialect) -> Statement {
        let mut b = Builder::new(dialect);
        b.push("INSERT INTO ").ident(&self.table);

        if self.columns.is_empty() {
            match dialect {
                Dialect::MySql => b.push(" () VALUES ()"),
                Dialect::Sqlite | Dialect::Postgres => b.push(" DEFAULT VALUES"),
            };
        } else {
            b.push(" (").idents(&self.columns).push(") VALUES ");
            for (i, row) in self.rows.iter().enumerate() {
                if i > 0 {
                    b.push(", ");
                }
                b.args(row.iter().cloned());
            }
        }

        if let Some(column) = &self.returning {
            b.push(" RETURNING ").ident(column);
        }
        b.finish()
    }
}

// ============================================================================
// UPDATE
// ============================================================================

/// Right-hand side of one `SET` assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum SetExpr {
    Value(Value),
    Null,
    /// `col = COALESCE(col, 0) + ?`
    Add(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateBuilder {
    pub table: String,
    pub sets: Vec<(String, SetExpr)>,
    pub predicate: Option<Predicate>,
}

impl UpdateBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            sets: Vec::new(),
            predicate: None,
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.sets.push((column.into(), SetExpr::Value(value.into())));
        self
    }

    pub fn set_null(mut self, column: impl Into<String>) -> Self {
        self.sets.push((column.into(), SetExpr::Null));
        self
    }

    pub fn add(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.sets.push((column.into(), SetExpr::Add(value.into())));
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn render(&self, dialect: Dialect) -> Statement {
        let mut b = Builder::new(dialect);
        b.push("UPDATE ").ident(&self.table).push(" SET ");
        for (i, (column, expr)) in self.sets.iter().enumerate() {
            if i > 0 {
                b.push(", ");
            }
            b.ident(column).push(" = ");
            match expr {
                SetExpr::Value(value) => {
                    b.arg(value.clone());
                }
                SetExpr::Null => {
                    b.push("NULL");
                }
                SetExpr::Add(value) => {
                    b.push("COALESCE(").ident(column).push(", 0) + ").arg(value.clone());
                }
            }
        }
        if let Some(predicate) = &self.predicate {
            b.push(" WHERE ");
            predicate.write(&mut b);
        }
        b.finish()
    }
}

// ============================================================================
// DELETE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteBuilder {
    pub table: String,
    pub predicate: Option<Predicate>,
}

impl DeleteBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            predicate: None,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn render(&self, dialect: Dialect) -> Statement {
        let mut b = Builder::new(dialect);
        b.push("DELETE FROM ").ident(&self.table);
        if let Some(predicate) = &self.predicate {
            b.push(" WHERE ");
            predicate.write(&mut b);
        }
        b.finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_select_full() {
        let stmt = Selector::new("users")
            .select(["id", "name"])
            .filter(Predicate::gt("age", 30))
            .filter(Predicate::has_prefix("name", "a"))
            .order_by(Order::desc("id"))
            .limit(10)
            .offset(5)
            .render(Dialect::Sqlite);
        assert_eq!(
            stmt.sql,
            "SELECT \"id\", \"name\" FROM \"users\" WHERE \"age\" > ? AND \"name\" LIKE ? ESCAPE '!' \
             ORDER BY \"id\" DESC LIMIT 10 OFFSET 5"
        );
        assert_eq!(stmt.args, vec![Value::Int(30), Value::String("a%".into())]);
    }

    #[test]
    fn test_like_renders_for_mysql() {
        let stmt = Selector::new("users")
            .filter(Predicate::has_prefix("name", "a_b"))
            .render(Dialect::MySql);
        assert_eq!(stmt.sql, "SELECT * FROM `users` WHERE `name` LIKE ? ESCAPE '!'");
        assert_eq!(stmt.args, vec![Value::String("a!_b%".into())]);
    }

    #[test]
    fn test_offset_without_limit_synthesizes_limit() {
        let stmt = Selector::new("users").offset(3).render(Dialect::MySql);
        assert_eq!(stmt.sql, "SELECT * FROM `users` LIMIT 2147483647 OFFSET 3");
    }

    #[test]
    fn test_subselect_placeholders_continue_numbering() {
        let inner = Selector::new("pets")
            .select(["owner_id"])
            .filter(Predicate::eq("name", "rex"));
        let stmt = Selector::new("users")
            .filter(Predicate::gt("age", 1))
            .filter(Predicate::in_select("id", inner))
            .render(Dialect::Postgres);
        assert_eq!(
            stmt.sql,
            "SELECT * FROM \"users\" WHERE \"age\" > $1 AND \"id\" IN \
             (SELECT \"owner_id\" FROM \"pets\" WHERE \"name\" = $2)"
        );
    }

    #[test]
    fn test_group_by_with_aggregates() {
        let stmt = Selector::new("users")
            .select(["city"])
            .group_by(["city"])
            .aggregate(Aggregate::Count)
            .aggregate(Aggregate::Max("age".into()))
            .render(Dialect::Sqlite);
        assert_eq!(
            stmt.sql,
            "SELECT \"city\", COUNT(*) AS \"count\", MAX(\"age\") AS \"max_age\" \
             FROM \"users\" GROUP BY \"city\""
        );
    }

    #[test]
    fn test_count_distinct() {
        let stmt = Selector::new("users")
            .select(["id"])
            .distinct()
            .render_count(Dialect::Sqlite);
        assert_eq!(stmt.sql, "SELECT COUNT(DISTINCT \"id\") FROM \"users\"");
    }

    #[test]
    fn test_insert_default_values() {
        let insert = InsertBuilder::new("groups");
        assert_eq!(
            insert.render(Dialect::Sqlite).sql,
            "INSERT INTO \"groups\" DEFAULT VALUES"
        );
        assert_eq!(insert.render(Dialect::MySql).sql, "INSERT INTO `groups` () VALUES ()");
    }

    #[test]
    fn test_insert_multi_row_returning() {
        let stmt = InsertBuilder::new("user_groups")
            .columns(["user_id", "group_id"])
            .values(vec![Value::Int(1), Value::Int(2)])
            .values(vec![Value::Int(1), Value::Int(3)])
            .returning("user_id")
            .render(Dialect::Postgres);
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"user_groups\" (\"user_id\", \"group_id\") VALUES ($1, $2), ($3, $4) \
             RETURNING \"user_id\""
        );
    }

    #[test]
    fn test_update_set_add_clear() {
        let stmt = UpdateBuilder::new("users")
            .set("name", "bob")
            .add("age", 1)
            .set_null("nickname")
            .filter(Predicate::in_values("id", [1i64, 2]))
            .render(Dialect::Sqlite);
        assert_eq!(
            stmt.sql,
            "UPDATE \"users\" SET \"name\" = ?, \"age\" = COALESCE(\"age\", 0) + ?, \
             \"nickname\" = NULL WHERE \"id\" IN (?, ?)"
        );
        assert_eq!(stmt.args.len(), 4);
    }

    #[test]
    fn test_delete() {
        let stmt = DeleteBuilder::new("users")
            .filter(Predicate::eq("id", 7))
            .render(Dialect::Sqlite);
        assert_eq!(stmt.sql, "DELETE FROM \"users\" WHERE \"id\" = ?");
    }
}
