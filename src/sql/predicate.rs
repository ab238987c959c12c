//! Predicates, ordering and aggregate functions
//!
//! Predicates are plain data, so a spec can be inspected, cloned and
//! combined before it is rendered. Column names are unqualified and resolve
//! against the innermost `FROM` they are rendered under.

use super::{Builder, Dialect, Selector};
use crate::value::Value;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    fn to_sql(self) -> &'static str {
        match self {
            CmpOp::Eq => " = ",
            CmpOp::Neq => " <> ",
            CmpOp::Gt => " > ",
            CmpOp::Gte => " >= ",
            CmpOp::Lt => " < ",
            CmpOp::Lte => " <= ",
        }
    }
}

/// A boolean SQL expression over the columns of one table.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Cmp {
        column: String,
        op: CmpOp,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
    },
    NotIn {
        column: String,
        values: Vec<Value>,
    },
    IsNull(String),
    NotNull(String),
    Like {
        column: String,
        pattern: String,
    },
    /// `column IN (SELECT ...)`
    InSelect {
        column: String,
        select: Box<Selector>,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    fn cmp(column: impl Into<String>, op: CmpOp, value: impl Into<Value>) -> Self {
        Predicate::Cmp {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cmp(column, CmpOp::Eq, value)
    }

    pub fn neq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cmp(column, CmpOp::Neq, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cmp(column, CmpOp::Gt, value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cmp(column, CmpOp::Gte, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cmp(column, CmpOp::Lt, value)
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cmp(column, CmpOp::Lte, value)
    }

    pub fn in_values<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Predicate::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not_in<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Predicate::NotIn {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Predicate::IsNull(column.into())
    }

    pub fn not_null(column: impl Into<String>) -> Self {
        Predicate::NotNull(column.into())
    }

    pub fn contains(column: impl Into<String>, needle: &str) -> Self {
        Predicate::Like {
            column: column.into(),
            pattern: format!("%{}%", escape_like(needle)),
        }
    }

    pub fn has_prefix(column: impl Into<String>, prefix: &str) -> Self {
        Predicate::Like {
            column: column.into(),
            pattern: format!("{}%", escape_like(prefix)),
        }
    }

    pub fn has_suffix(column: impl Into<String>, suffix: &str) -> Self {
        Predicate::Like {
            column: column.into(),
            pattern: format!("%{}", escape_like(suffix)),
        }
    }

    pub fn in_select(column: impl Into<String>, select: Selector) -> Self {
        Predicate::InSelect {
            column: column.into(),
            select: Box::new(select),
        }
    }

    pub fn all(preds: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::And(preds.into_iter().collect())
    }

    pub fn any(preds: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::Or(preds.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(pred: Predicate) -> Self {
        Predicate::Not(Box::new(pred))
    }

    /// Conjoin with another predicate, flattening nested `And`s.
    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut preds) => {
                preds.push(other);
                Predicate::And(preds)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    /// Render into the builder.
    pub fn write(&self, b: &mut Builder) {
        match self {
            Predicate::Cmp { column, op, value } => {
                b.ident(column).push(op.to_sql()).arg(value.clone());
            }
            Predicate::In { column, values } => {
                if values.is_empty() {
                    // IN () is not valid SQL; an empty set matches nothing.
                    b.push("1 = 0");
                } else {
                    b.ident(column).push(" IN ").args(values.iter().cloned());
                }
            }
            Predicate::NotIn { column, values } => {
                if values.is_empty() {
                    b.push("1 = 1");
                } else {
                    b.ident(column).push(" NOT IN ").args(values.iter().cloned());
                }
            }
            Predicate::IsNull(column) => {
                b.ident(column).push(" IS NULL");
            }
            Predicate::NotNull(column) => {
                b.ident(column).push(" IS NOT NULL");
            }
            Predicate::Like { column, pattern } => {
                b.ident(column)
                    .push(" LIKE ")
                    .arg(Value::String(pattern.clone()))
                    .push(" ESCAPE '!'");
            }
            Predicate::InSelect { column, select } => {
                b.ident(column).push(" IN (");
                // MySQL rejects LIMIT in an IN sub-select unless it sits in a
                // derived table.
                let limited = select.limit.is_some() || select.offset.is_some();
                if limited && b.dialect() == Dialect::MySql {
                    b.push("SELECT * FROM (");
                    select.write(b);
                    b.push(") AS ").ident("limited");
                } else {
                    select.write(b);
                }
                b.push(")");
            }
            Predicate::And(preds) => write_joined(b, preds, " AND ", "1 = 1"),
            Predicate::Or(preds) => write_joined(b, preds, " OR ", "1 = 0"),
            Predicate::Not(pred) => {
                b.push("NOT (");
                pred.write(b);
                b.push(")");
            }
        }
    }
}

fn write_joined(b: &mut Builder, preds: &[Predicate], sep: &str, empty: &str) {
    match preds {
        [] => {
            b.push(empty);
        }
        [only] => only.write(b),
        _ => {
            for (i, pred) in preds.iter().enumerate() {
                if i > 0 {
                    b.push(sep);
                }
                let nested = matches!(pred, Predicate::And(_) | Predicate::Or(_));
                if nested {
                    b.push("(");
                }
                pred.write(b);
                if nested {
                    b.push(")");
                }
            }
        }
    }
}

/// Escape LIKE wildcards with `!`, which needs no quoting in any dialect.
fn escape_like(s: &str) -> String {
    s.replace('!', "!!").replace('%', "!%").replace('_', "!_")
}

/// Sort direction for ORDER BY clauses.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub direction: OrderDirection,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Desc,
        }
    }
}

/// Aggregate function for group-by projections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Sum(String),
    Avg(String),
    Min(String),
    Max(String),
}

impl Aggregate {
    /// Alias the aggregate is projected as.
    pub fn alias(&self) -> String {
        match self {
            Aggregate::Count => "count".to_string(),
            Aggregate::Sum(c) => format!("sum_{}", c),
            Aggregate::Avg(c) => format!("avg_{}", c),
            Aggregate::Min(c) => format!("min_{}", c),
            Aggregate::Max(c) => format!("max_{}", c),
        }
    }

    pub(crate) fn write(&self, b: &mut Builder) {
        let (func, column) = match self {
            Aggregate::Count => {
                b.push("COUNT(*)");
                return self.write_alias(b);
            }
            Aggregate::Sum(c) => ("SUM(", c),
            Aggregate::Avg(c) => ("AVG(", c),
            Aggregate::Min(c) => ("MIN(", c),
            Aggregate::Max(c) => ("MAX(", c),
        };
        b.push(func).ident(column).push(")");
        self.write_alias(b);
    }

    fn write_alias(&self, b: &mut Builder) {
        b.push(" AS ").ident(&self.alias());
    }
}
