use std::collections::BTreeMap;

use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

mod graph_sqlite;
mod schema;

pub use graph_sqlite::{GraphTransaction, SqliteGraphStore};
pub use schema::{GraphStats, graph_stats};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("graph store lock poisoned")]
    LockPoisoned,
}

/// A scalar bound to a named statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<bool> for GraphValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for GraphValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for GraphValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for GraphValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for GraphValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<GraphValue>> From<Option<T>> for GraphValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl ToSql for GraphValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(SqlValue::Null),
            Self::Bool(value) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*value))),
            Self::Integer(value) => ToSqlOutput::Owned(SqlValue::Integer(*value)),
            Self::Real(value) => ToSqlOutput::Owned(SqlValue::Real(*value)),
            Self::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
        })
    }
}

/// Named statement parameters. Names are given without the leading `:`.
///
/// Names that a statement does not reference are skipped at bind time, so one map can be
/// reused across several statements that each need a subset of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(BTreeMap<String, GraphValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<GraphValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<GraphValue>) {
        self.0.insert(name.to_owned(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&GraphValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GraphValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Tabular read result with each row keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

impl QueryRows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn text(&self, row: usize, column: &str) -> Option<&str> {
        self.rows.get(row)?.get(column)?.as_str()
    }

    pub fn integer(&self, row: usize, column: &str) -> Option<i64> {
        self.rows.get(row)?.get(column)?.as_i64()
    }
}

/// Transactional property-graph contract used by ingestion, enrichment and the query agent.
pub trait GraphStore {
    /// Runs a write statement and returns the number of affected rows.
    fn execute(&self, statement: &str, params: &Params) -> Result<usize, StoreError>;

    fn query(&self, statement: &str, params: &Params) -> Result<QueryRows, StoreError>;

    /// Runs `work` inside one transaction, committing on success and rolling back on error.
    /// Stores that are already transactional run `work` directly.
    fn transaction(
        &self,
        work: &mut dyn FnMut(&dyn GraphStore) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;
}
