// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Models: a record type bound to a database engine

use crate::db::Database;
use crate::error::{OrmError, Result};
use crate::schema::{Record, Row, Table, TypedTable};
use crate::session::{Lookup, QuerySession};
use crate::value::{FieldKind, FieldValue};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// How a transactional callback wants its transaction to end
#[derive(Debug)]
pub enum TxOutcome<E> {
    /// Commit
    Commit,
    /// Roll back quietly
    Rollback,
    /// Roll back and hand the error to the caller
    RollbackWithError(E),
}

/// Failure of [`Model::atom`]
#[derive(Debug)]
pub enum AtomError<E> {
    /// Opening, committing or rolling back failed
    Orm(OrmError),
    /// The callback failed; the transaction was rolled back
    Callback(E),
}

impl<E: fmt::Display> fmt::Display for AtomError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtomError::Orm(err) => write!(f, "{err}"),
            AtomError::Callback(err) => write!(f, "transaction aborted: {err}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for AtomError<E> {}

impl<E> From<OrmError> for AtomError<E> {
    fn from(err: OrmError) -> Self {
        AtomError::Orm(err)
    }
}

/// A record type bound to a database engine
#[derive(Clone)]
pub struct Model {
    table: Arc<dyn Table>,
    db: Database,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.table.name())
            .field("table", &self.table.table())
            .field("db", &self.db)
            .finish()
    }
}

impl Model {
    /// Bind record type `R` to `db`
    pub fn new<R: Record>(db: Database) -> Self {
        Self::from_table(Arc::new(TypedTable::<R>::new()), db)
    }

    /// Bind an erased record type to `db`
    pub fn from_table(table: Arc<dyn Table>, db: Database) -> Self {
        Self { table, db }
    }

    /// Record type name
    pub fn name(&self) -> &'static str {
        self.table.name()
    }

    /// Table name
    pub fn table(&self) -> &'static str {
        self.table.table()
    }

    /// Engine the model is bound to
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Primary key columns
    pub fn primary_key(&self) -> &[&'static str] {
        self.table.primary_key()
    }

    /// Column names in declaration order
    pub fn column_names(&self) -> Vec<&'static str> {
        self.table.columns().into_iter().map(|(name, _)| name).collect()
    }

    /// Kind of a declared column
    pub fn kind_of(&self, column: &str) -> Result<FieldKind> {
        self.table
            .kind_of(column)
            .ok_or_else(|| OrmError::UnknownField {
                record: self.name(),
                field: column.to_string(),
            })
    }

    /// Fail unless `column` is declared on the record
    pub fn check_column(&self, column: &str) -> Result<()> {
        self.kind_of(column).map(|_| ())
    }

    /// Single-column integer primary key that SQLite assigns on insert
    pub(crate) fn auto_key(&self) -> Option<&'static str> {
        match self.primary_key() {
            [key] => match self.table.kind_of(key) {
                Some(FieldKind::Int | FieldKind::UInt) => Some(*key),
                _ => None,
            },
            _ => None,
        }
    }

    /// Build a record from dynamic values; unknown fields and mistyped
    /// values are rejected
    pub fn new_row(&self, values: Vec<(String, FieldValue)>) -> Result<Row> {
        self.table.build(values)
    }

    pub(crate) fn hydrate(&self, values: Vec<(String, FieldValue)>) -> Result<Row> {
        self.table.hydrate(values)
    }

    /// A standalone session that closes after its first terminal operation
    pub fn session(&self) -> Result<QuerySession> {
        let handle = Rc::new(self.db.session()?);
        Ok(QuerySession::new(self.clone(), handle, true))
    }

    /// Run `f` with a session that stays open for the whole callback and is
    /// closed afterwards, whatever `f` returns
    pub fn scoped<T>(&self, f: impl FnOnce(QuerySession) -> T) -> Result<T> {
        let handle = Rc::new(self.db.session()?);
        let value = f(QuerySession::new(self.clone(), Rc::clone(&handle), false));
        handle.close();
        Ok(value)
    }

    /// Run `f` inside a transaction. Returns whether the transaction
    /// committed.
    pub fn atom<E>(&self, f: impl FnOnce(QuerySession) -> TxOutcome<E>) -> std::result::Result<bool, AtomError<E>> {
        let handle = Rc::new(self.db.session()?);
        handle.begin()?;
        let outcome = f(QuerySession::new(self.clone(), Rc::clone(&handle), false));
        let result = match outcome {
            TxOutcome::Commit => handle.commit().map(|_| true).map_err(AtomError::Orm),
            TxOutcome::Rollback => handle.rollback().map(|_| false).map_err(AtomError::Orm),
            TxOutcome::RollbackWithError(err) => {
                if let Err(rollback) = handle.rollback() {
                    tracing::error!(model = self.name(), error = %rollback, "rollback failed");
                }
                Err(AtomError::Callback(err))
            }
        };
        handle.close();
        result
    }

    /// Bind this model to the session of `parent`
    pub fn with_session(&self, parent: &QuerySession) -> Result<QuerySession> {
        QuerySession::attach(self, parent)
    }

    /// `Where` on a fresh standalone session
    pub fn where_fields(&self, fields: Vec<(String, FieldValue)>) -> Result<QuerySession> {
        let mut session = self.session()?;
        session.where_fields(fields)?;
        Ok(session)
    }

    /// `ID` on a fresh standalone session
    pub fn id(&self, values: Vec<FieldValue>) -> Result<QuerySession> {
        let mut session = self.session()?;
        session.id(values)?;
        Ok(session)
    }

    /// First matching record
    pub fn get(&self, lookup: Lookup) -> Result<Option<Row>> {
        self.session()?.get(lookup)
    }

    /// All matching records
    pub fn find(&self, lookup: Lookup) -> Result<Vec<Row>> {
        self.session()?.find(lookup)
    }

    /// Number of matching records
    pub fn count(&self, lookup: Lookup) -> Result<i64> {
        self.session()?.count(lookup)
    }

    /// Insert one record; returns the new row id
    pub fn insert(&self, values: Vec<(String, FieldValue)>) -> Result<i64> {
        self.session()?.insert(values)
    }
}
