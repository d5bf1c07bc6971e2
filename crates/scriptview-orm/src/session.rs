// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Query sessions: a query under construction bound to one database session

use crate::db::DbSession;
use crate::error::{OrmError, Result};
use crate::model::Model;
use crate::query::{Order, Query, insert_sql};
use crate::schema::Row;
use crate::value::FieldValue;
use std::rc::Rc;

/// Condition argument of a terminal operation
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Lookup {
    /// No extra condition
    #[default]
    None,
    /// `{column[__op]: value}` clauses
    Fields(Vec<(String, FieldValue)>),
    /// Primary key values, positional for composite keys
    PrimaryKey(Vec<FieldValue>),
}

/// A model bound to a database session, accumulating a query.
///
/// Standalone sessions carry the auto-close flag and release their
/// connection after the first terminal operation. Scoped and attached
/// sessions leave closing to their owner.
#[derive(Debug)]
pub struct QuerySession {
    model: Model,
    handle: Rc<DbSession>,
    query: Query,
    autoclose: bool,
}

impl QuerySession {
    pub(crate) fn new(model: Model, handle: Rc<DbSession>, autoclose: bool) -> Self {
        Self {
            model,
            handle,
            query: Query::new(),
            autoclose,
        }
    }

    /// Bind `model` to the session of `parent`. Both must use the same
    /// database engine.
    pub fn attach(model: &Model, parent: &QuerySession) -> Result<Self> {
        if !model.database().same_engine(parent.handle.engine()) {
            return Err(OrmError::EngineMismatch {
                model: model.name(),
            });
        }
        Ok(Self::new(model.clone(), Rc::clone(&parent.handle), false))
    }

    /// Model this session queries
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Query accumulated so far
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Whether the session closes itself after a terminal operation
    pub fn is_autoclose(&self) -> bool {
        self.autoclose
    }

    /// Whether the underlying connection has been released
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Release the underlying connection
    pub fn close(&self) {
        self.handle.close();
    }

    /// Conjoin a raw SQL clause
    pub fn and(&mut self, clause: impl Into<String>, args: Vec<FieldValue>) -> &mut Self {
        self.query.and(clause, args);
        self
    }

    /// Conjoin `{column[__op]: value}` clauses
    pub fn where_fields(&mut self, fields: Vec<(String, FieldValue)>) -> Result<&mut Self> {
        let model = &self.model;
        self.query.and_fields(fields, |column| model.check_column(column))?;
        Ok(self)
    }

    /// Primary key lookup
    pub fn id(&mut self, values: Vec<FieldValue>) -> Result<&mut Self> {
        self.query
            .id(self.model.name(), self.model.primary_key(), values)?;
        Ok(self)
    }

    /// `column IN (...)`
    pub fn in_list(&mut self, column: &str, values: Vec<FieldValue>) -> Result<&mut Self> {
        self.model.check_column(column)?;
        self.query.in_list(column, values);
        Ok(self)
    }

    /// `column NOT IN (...)`
    pub fn not_in_list(&mut self, column: &str, values: Vec<FieldValue>) -> Result<&mut Self> {
        self.model.check_column(column)?;
        self.query.not_in_list(column, values);
        Ok(self)
    }

    /// Limit rows, skipping `start`
    pub fn limit(&mut self, limit: u64, start: u64) -> &mut Self {
        self.query.set_limit(limit, start);
        self
    }

    /// Ascending order on `columns`
    pub fn asc(&mut self, columns: Vec<String>) -> Result<&mut Self> {
        self.order(columns, Order::Asc)
    }

    /// Descending order on `columns`
    pub fn desc(&mut self, columns: Vec<String>) -> Result<&mut Self> {
        self.order(columns, Order::Desc)
    }

    fn order(&mut self, columns: Vec<String>, order: Order) -> Result<&mut Self> {
        for column in &columns {
            self.model.check_column(column)?;
        }
        self.query.order_by(columns, order);
        Ok(self)
    }

    /// Apply a terminal operation's condition argument
    pub fn apply(&mut self, lookup: Lookup) -> Result<&mut Self> {
        match lookup {
            Lookup::None => Ok(self),
            Lookup::Fields(fields) => self.where_fields(fields),
            Lookup::PrimaryKey(values) => self.id(values),
        }
    }

    fn finish<T>(
        &mut self,
        lookup: Lookup,
        run: impl FnOnce(&DbSession, &Model, Query) -> Result<T>,
    ) -> Result<T> {
        let applied = self.apply(lookup).map(|_| ());
        let query = std::mem::take(&mut self.query);
        let result = applied.and_then(|_| run(&self.handle, &self.model, query));
        if self.autoclose {
            self.handle.close();
        }
        result
    }

    /// First matching record, or `None`
    pub fn get(&mut self, lookup: Lookup) -> Result<Option<Row>> {
        self.finish(lookup, |db, model, mut query| {
            let start = query.limit().map_or(0, |(_, start)| start);
            query.set_limit(1, start);
            let columns = model.column_names();
            let (sql, args) = query.select_sql(model.table(), &columns);
            match db.query("get", &sql, &args)?.into_iter().next() {
                Some(values) => model.hydrate(values).map(Some),
                None => Ok(None),
            }
        })
    }

    /// All matching records
    pub fn find(&mut self, lookup: Lookup) -> Result<Vec<Row>> {
        self.finish(lookup, |db, model, query| {
            let columns = model.column_names();
            let (sql, args) = query.select_sql(model.table(), &columns);
            db.query("find", &sql, &args)?
                .into_iter()
                .map(|values| model.hydrate(values))
                .collect()
        })
    }

    /// Number of matching records
    pub fn count(&mut self, lookup: Lookup) -> Result<i64> {
        self.finish(lookup, |db, model, query| {
            let (sql, args) = query.count_sql(model.table());
            db.query_i64("count", &sql, &args)
        })
    }

    /// Update matching records from `{field: value}` pairs, without building
    /// a full record. Returns the affected row count.
    pub fn update(&mut self, values: Vec<(String, FieldValue)>) -> Result<usize> {
        self.finish(Lookup::None, |db, model, query| {
            let mut coerced = Vec::with_capacity(values.len());
            for (column, value) in values {
                let kind = model.kind_of(&column)?;
                let value = value.coerce(&column, kind)?;
                coerced.push((column, value));
            }
            if coerced.is_empty() {
                return Ok(0);
            }
            let sets = coerced
                .iter()
                .map(|(column, value)| (column.as_str(), value.clone()))
                .collect();
            let (sql, args) = query.update_sql(model.table(), sets);
            db.execute("update", &sql, &args)
        })
    }

    /// Insert a record built from `values`; returns the new row id
    pub fn insert(&mut self, values: Vec<(String, FieldValue)>) -> Result<i64> {
        self.finish(Lookup::None, |db, model, _| {
            let row = model.new_row(values)?;
            let auto_key = model.auto_key();
            let row: Vec<(&str, FieldValue)> = row
                .into_iter()
                .filter(|(column, value)| {
                    !(Some(*column) == auto_key
                        && matches!(value, FieldValue::Null | FieldValue::Int(0) | FieldValue::UInt(0)))
                })
                .collect();
            let (sql, args) = insert_sql(model.table(), row);
            db.execute("insert", &sql, &args)?;
            db.last_insert_rowid()
        })
    }

    /// Delete matching records; returns the affected row count
    pub fn delete(&mut self, lookup: Lookup) -> Result<usize> {
        self.finish(lookup, |db, model, query| {
            let (sql, args) = query.delete_sql(model.table());
            db.execute("delete", &sql, &args)
        })
    }
}
