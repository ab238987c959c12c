//! Dialect-aware SQL rendering
//!
//! Statements are rendered into a `Statement` (SQL text plus ordered
//! arguments). Identifiers are always quoted and values always bound as
//! parameters; nothing caller-supplied is spliced into the SQL text.

mod builder;
mod predicate;

use std::fmt;

pub use builder::*;
pub use predicate::*;

use crate::value::Value;

/// SQL flavor spoken by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
    MySql,
}

impl Dialect {
    /// Quote an identifier.
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Sqlite | Dialect::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Placeholder for the `n`th (1-based) bound argument.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", n),
            Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    /// Whether inserts can hand back generated ids with `RETURNING`.
    pub fn use_returning(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}

/// A rendered statement ready for a driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.args.is_empty() {
            let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
            write!(f, " [{}]", args.join(", "))?;
        }
        Ok(())
    }
}

/// Accumulates SQL text and bound arguments for one statement.
///
/// Placeholders are numbered as arguments are pushed, so nested
/// sub-selects render with the correct positions for every dialect.
#[derive(Debug)]
pub struct Builder {
    dialect: Dialect,
    sql: String,
    args: Vec<Value>,
}

impl Builder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            args: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Append raw SQL text.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Append a quoted identifier.
    pub fn ident(&mut self, name: &str) -> &mut Self {
        let quoted = self.dialect.quote(name);
        self.sql.push_str(&quoted);
        self
    }

    /// Append a comma-separated list of quoted identifiers.
    pub fn idents<S: AsRef<str>>(&mut self, names: &[S]) -> &mut Self {
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.ident(name.as_ref());
        }
        self
    }

    /// Bind a value and append its placeholder.
    pub fn arg(&mut self, value: Value) -> &mut Self {
        self.args.push(value);
        let placeholder = self.dialect.placeholder(self.args.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// Bind a list of values as `(?, ?, ...)`.
    pub fn args(&mut self, values: impl IntoIterator<Item = Value>) -> &mut Self {
        self.sql.push('(');
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.arg(value);
        }
        self.sql.push(')');
        self
    }

    pub fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            args: self.args,
        }
    }
}
