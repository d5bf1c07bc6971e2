// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Database engine and session handles

use crate::error::{OrmError, Result};
use crate::value::FieldValue;
use rusqlite::{Connection, params_from_iter};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct EngineInner {
    path: PathBuf,
}

/// A database engine; sessions opened from clones of the same engine
/// talk to the same database.
#[derive(Clone)]
pub struct Database {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.inner.path)
            .finish()
    }
}

impl Database {
    /// Open (creating if needed) a SQLite database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        Connection::open(&path).map_err(OrmError::db("open"))?;
        Ok(Self {
            inner: Arc::new(EngineInner { path }),
        })
    }

    /// Database file
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Whether two handles refer to the same engine
    pub fn same_engine(&self, other: &Database) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Open a new session with its own connection
    pub fn session(&self) -> Result<DbSession> {
        let conn = Connection::open(&self.inner.path).map_err(OrmError::db("open"))?;
        tracing::trace!(path = %self.inner.path.display(), "db session opened");
        Ok(DbSession {
            engine: self.clone(),
            conn: RefCell::new(Some(conn)),
            in_tx: Cell::new(false),
        })
    }

    /// Run one or more statements outside any model
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.session()?.execute_batch(sql)
    }

    /// Run a raw query; every column comes back as a string
    pub fn query_strings(&self, sql: &str, args: &[FieldValue]) -> Result<Vec<BTreeMap<String, String>>> {
        let session = self.session()?;
        let rows = session.query("query", sql, args)?;
        Ok(rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(column, value)| (column, value.to_plain_string()))
                    .collect()
            })
            .collect())
    }

    /// Execute a raw statement, returning the affected row count
    pub fn exec(&self, sql: &str, args: &[FieldValue]) -> Result<usize> {
        self.session()?.execute("exec", sql, args)
    }
}

/// One database connection scope.
///
/// Closing drops the connection; later use fails with
/// [`OrmError::SessionClosed`].
#[derive(Debug)]
pub struct DbSession {
    engine: Database,
    conn: RefCell<Option<Connection>>,
    in_tx: Cell<bool>,
}

impl DbSession {
    /// Engine the session belongs to
    pub fn engine(&self) -> &Database {
        &self.engine
    }

    /// Whether [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.conn.borrow().is_none()
    }

    /// Whether a transaction is open
    pub fn in_transaction(&self) -> bool {
        self.in_tx.get()
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.borrow();
        match conn.as_ref() {
            Some(conn) => f(conn),
            None => Err(OrmError::SessionClosed),
        }
    }

    /// Run statements without parameters
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.with_conn(|conn| conn.execute_batch(sql).map_err(OrmError::db("exec")))
    }

    /// Execute a statement, returning the affected row count
    pub fn execute(&self, op: &'static str, sql: &str, args: &[FieldValue]) -> Result<usize> {
        tracing::trace!(%sql, "execute");
        self.with_conn(|conn| {
            conn.execute(sql, params_from_iter(args.iter()))
                .map_err(OrmError::db(op))
        })
    }

    /// Row id of the last insert on this connection
    pub fn last_insert_rowid(&self) -> Result<i64> {
        self.with_conn(|conn| Ok(conn.last_insert_rowid()))
    }

    /// Run a query, returning each row as `(column, value)` pairs
    pub fn query(&self, op: &'static str, sql: &str, args: &[FieldValue]) -> Result<Vec<Vec<(String, FieldValue)>>> {
        tracing::trace!(%sql, "query");
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql).map_err(OrmError::db(op))?;
            let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt
                .query(params_from_iter(args.iter()))
                .map_err(OrmError::db(op))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next().map_err(OrmError::db(op))? {
                let mut values = Vec::with_capacity(names.len());
                for (idx, name) in names.iter().enumerate() {
                    let value = row.get_ref(idx).map_err(OrmError::db(op))?;
                    values.push((name.clone(), FieldValue::from_sql(value)));
                }
                out.push(values);
            }
            Ok(out)
        })
    }

    /// Query a single integer (`COUNT(*)` and friends)
    pub fn query_i64(&self, op: &'static str, sql: &str, args: &[FieldValue]) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row(sql, params_from_iter(args.iter()), |row| row.get(0))
                .map_err(OrmError::db(op))
        })
    }

    /// Begin a transaction
    pub fn begin(&self) -> Result<()> {
        self.with_conn(|conn| conn.execute_batch("BEGIN").map_err(OrmError::db("begin")))?;
        self.in_tx.set(true);
        Ok(())
    }

    /// Commit the open transaction
    pub fn commit(&self) -> Result<()> {
        self.with_conn(|conn| conn.execute_batch("COMMIT").map_err(OrmError::db("commit")))?;
        self.in_tx.set(false);
        Ok(())
    }

    /// Roll the open transaction back
    pub fn rollback(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch("ROLLBACK")
                .map_err(OrmError::db("rollback"))
        })?;
        self.in_tx.set(false);
        Ok(())
    }

    /// Release the connection. Closing twice is a no-op.
    pub fn close(&self) {
        if let Some(conn) = self.conn.borrow_mut().take() {
            if self.in_tx.replace(false) {
                tracing::warn!("closing session with an open transaction; rolling back");
                let _ = conn.execute_batch("ROLLBACK");
            }
            drop(conn);
            tracing::trace!("db session closed");
        }
    }
}

impl Drop for DbSession {
    fn drop(&mut self) {
        self.close();
    }
}
