//! Statements and parameter composition.
//!
//! A [`Statement`] is SQL text plus a named-parameter map. SQL text itself
//! comes from an external builder through the [`ToSql`] boundary; the
//! convention is `@pN` placeholders, 1-indexed, so positional arguments from
//! the builder become parameters `p1, p2, …`. Extra caller-supplied pairs are
//! merged in after validation.

use std::collections::BTreeMap;

use crate::error::{DbResult, Error};
use crate::value::Value;

/// An executable statement: SQL text plus named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: BTreeMap<String, Value>,
}

impl Statement {
    /// Create a statement with no parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a named parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Build a statement from a SQL builder plus extra named arguments.
    ///
    /// `extra_args` is an alternating key/value list. An odd-length list, a
    /// non-string key, or a key that collides with an already-present
    /// parameter (including a generated `pN`) is rejected before the database
    /// is ever contacted.
    pub fn compose(builder: &dyn ToSql, extra_args: &[Value]) -> DbResult<Self> {
        let (sql, args) = builder.to_sql()?;

        let mut params = BTreeMap::new();
        for (i, arg) in args.into_iter().enumerate() {
            params.insert(format!("p{}", i + 1), arg);
        }

        if extra_args.len() % 2 != 0 {
            return Err(Error::invalid_argument(
                "additional arguments must be key/value pairs",
            ));
        }
        for pair in extra_args.chunks_exact(2) {
            let key = match &pair[0] {
                Value::String(s) => s.clone(),
                other => {
                    return Err(Error::invalid_argument(format!(
                        "additional argument key must be a string, got {}",
                        other.type_name()
                    )));
                }
            };
            if params.contains_key(&key) {
                return Err(Error::invalid_argument(format!(
                    "duplicate parameter name: {}",
                    key
                )));
            }
            params.insert(key, pair[1].clone());
        }

        Ok(Self { sql, params })
    }
}

/// The statement-builder boundary: anything that can produce SQL text with a
/// positional argument sequence.
///
/// `Sync` so builders can be borrowed across the executor's await points.
pub trait ToSql: Sync {
    fn to_sql(&self) -> DbResult<(String, Vec<Value>)>;
}

/// A raw SQL fragment with positional arguments, for callers without a
/// dedicated query builder.
#[derive(Debug, Clone)]
pub struct Sql {
    text: String,
    args: Vec<Value>,
}

impl Sql {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            args: Vec::new(),
        }
    }

    /// Append a positional argument (bound as `@pN` by position).
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }
}

impl ToSql for Sql {
    fn to_sql(&self) -> DbResult<(String, Vec<Value>)> {
        Ok((self.text.clone(), self.args.clone()))
    }
}
