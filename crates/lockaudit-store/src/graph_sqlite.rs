use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Transaction};
use serde_json::{Map, Number, Value};

use crate::schema::run_migrations;
use crate::{GraphStore, Params, QueryRows, StoreError};

/// SQLite-backed property graph: one table per node label and per relationship type.
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
    sqlite_path: PathBuf,
    read_only: bool,
}

impl SqliteGraphStore {
    /// Opens (creating if needed) the graph database and applies the schema.
    pub fn open(sqlite_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let sqlite_path = sqlite_path.as_ref().to_path_buf();
        if let Some(parent) = sqlite_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&sqlite_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            sqlite_path,
            read_only: false,
        })
    }

    /// Opens an existing graph database with SQLite's read-only flag. Any write is rejected
    /// by SQLite itself.
    pub fn open_read_only(sqlite_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let sqlite_path = sqlite_path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(&sqlite_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        conn.busy_timeout(Duration::from_secs(5))?;

        Ok(Self {
            conn: Mutex::new(conn),
            sqlite_path,
            read_only: true,
        })
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

impl GraphStore for SqliteGraphStore {
    fn execute(&self, statement: &str, params: &Params) -> Result<usize, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        execute_on(&conn, statement, params)
    }

    fn query(&self, statement: &str, params: &Params) -> Result<QueryRows, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        query_on(&conn, statement, params)
    }

    fn transaction(
        &self,
        work: &mut dyn FnMut(&dyn GraphStore) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let tx = GraphTransaction {
            tx: conn.transaction()?,
        };

        // Dropping the transaction without commit rolls it back.
        work(&tx)?;
        tx.tx.commit()?;
        Ok(())
    }
}

/// An open transaction that exposes the same graph contract as the store.
pub struct GraphTransaction<'conn> {
    tx: Transaction<'conn>,
}

impl GraphStore for GraphTransaction<'_> {
    fn execute(&self, statement: &str, params: &Params) -> Result<usize, StoreError> {
        execute_on(&self.tx, statement, params)
    }

    fn query(&self, statement: &str, params: &Params) -> Result<QueryRows, StoreError> {
        query_on(&self.tx, statement, params)
    }

    fn transaction(
        &self,
        work: &mut dyn FnMut(&dyn GraphStore) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        work(self)
    }
}

fn prepare_bound<'conn>(
    conn: &'conn Connection,
    statement: &str,
    params: &Params,
) -> Result<rusqlite::Statement<'conn>, StoreError> {
    let mut stmt = conn.prepare(statement)?;
    for (name, value) in params.iter() {
        if let Some(index) = stmt.parameter_index(&format!(":{name}"))? {
            stmt.raw_bind_parameter(index, value)?;
        }
    }
    Ok(stmt)
}

fn execute_on(conn: &Connection, statement: &str, params: &Params) -> Result<usize, StoreError> {
    let mut stmt = prepare_bound(conn, statement, params)?;
    Ok(stmt.raw_execute()?)
}

fn query_on(conn: &Connection, statement: &str, params: &Params) -> Result<QueryRows, StoreError> {
    let mut stmt = prepare_bound(conn, statement, params)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_owned)
        .collect();

    let mut rows = stmt.raw_query();
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut object = Map::with_capacity(columns.len());
        for (index, column) in columns.iter().enumerate() {
            object.insert(column.clone(), json_value(row.get_ref(index)?));
        }
        out.push(object);
    }

    Ok(QueryRows {
        columns,
        rows: out,
    })
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(value) => Value::Number(value.into()),
        ValueRef::Real(value) => Number::from_f64(value).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}
