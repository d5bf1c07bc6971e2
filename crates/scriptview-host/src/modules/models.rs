// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! `models` module: query facades over registered record types
//!
//! `require('models').User` is the model facade of the `User` record. Chain
//! operations (`Where`, `ID`, `In`, `NotIn`, `Limit`, `Asc`, `Desc`, `And`)
//! open a session facade that keeps accumulating; terminal operations
//! (`Get`, `Find`, `Count`, `Update`, `Insert`, `Delete`) execute it.
//! Sessions opened implicitly close after their first terminal operation.
//!
//! ```js
//! const { User } = require('models');
//! const adults = User.Where({ age__ge: 18 }).Desc('age').Limit(10).Find();
//! const kept = User.Atom(function (tx) {
//!   tx.Insert({ name: 'ann', age: 30 });
//!   return tx.Count({ name: 'ann' }) === 1;
//! });
//! ```
//!
//! `Atom` commits unless the callback returns exactly `false` or throws.
//! A thrown exception is rethrown once the transaction is rolled back.
//!
//! Session facades live in a table owned by the module instance; scripts
//! only hold their numeric handle.

use super::{expect_string, method, orm_error, type_error};
use crate::convert;
use crate::environment::{Host, HostModule};
use rquickjs::function::{Rest, This};
use rquickjs::{Array, Ctx, Function, Object, Value};
use scriptview_orm::{AtomError, FieldValue, Lookup, Model, OrmError, QuerySession, TxOutcome};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Property of a session facade holding its handle
pub const SESSION_KEY: &str = "__session";

/// The `models` module
#[derive(Debug, Clone, Default)]
pub struct ModelsModule {
    models: Vec<Model>,
}

impl ModelsModule {
    /// Module exposing `models`, keyed by record type name
    pub fn new(models: Vec<Model>) -> Self {
        Self { models }
    }

    /// Add one model
    pub fn with_model(mut self, model: Model) -> Self {
        self.models.push(model);
        self
    }

    /// Registered models
    pub fn models(&self) -> &[Model] {
        &self.models
    }
}

#[derive(Default)]
struct SessionTable {
    next: u32,
    open: HashMap<u32, QuerySession>,
}

impl SessionTable {
    fn insert(&mut self, session: QuerySession) -> u32 {
        self.next += 1;
        self.open.insert(self.next, session);
        self.next
    }
}

type Sessions = Rc<RefCell<SessionTable>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Where,
    Id,
    In,
    NotIn,
    Limit,
    Asc,
    Desc,
    And,
    Get,
    Find,
    Count,
    Update,
    Insert,
    Delete,
    Close,
}

impl Op {
    const ALL: [Op; 15] = [
        Op::Where,
        Op::Id,
        Op::In,
        Op::NotIn,
        Op::Limit,
        Op::Asc,
        Op::Desc,
        Op::And,
        Op::Get,
        Op::Find,
        Op::Count,
        Op::Update,
        Op::Insert,
        Op::Delete,
        Op::Close,
    ];

    fn name(self) -> &'static str {
        match self {
            Op::Where => "Where",
            Op::Id => "ID",
            Op::In => "In",
            Op::NotIn => "NotIn",
            Op::Limit => "Limit",
            Op::Asc => "Asc",
            Op::Desc => "Desc",
            Op::And => "And",
            Op::Get => "Get",
            Op::Find => "Find",
            Op::Count => "Count",
            Op::Update => "Update",
            Op::Insert => "Insert",
            Op::Delete => "Delete",
            Op::Close => "Close",
        }
    }

    fn is_terminal(self) -> bool {
        matches!(
            self,
            Op::Get | Op::Find | Op::Count | Op::Update | Op::Insert | Op::Delete
        )
    }
}

enum Outcome<'js> {
    Chain,
    Value(Value<'js>),
}

/// Single object argument: field clauses. Anything else: primary key values.
fn condition<'js>(ctx: &Ctx<'js>, args: &[Value<'js>]) -> rquickjs::Result<Lookup> {
    match args {
        [] => Ok(Lookup::None),
        [single] if is_plain_object(single) => {
            let Some(obj) = single.as_object() else {
                return Ok(Lookup::None);
            };
            Ok(Lookup::Fields(convert::object_fields(ctx, obj)?))
        }
        values => Ok(Lookup::PrimaryKey(field_values(ctx, "ID", values)?)),
    }
}

fn is_plain_object(value: &Value<'_>) -> bool {
    value.is_object() && !value.is_array() && !value.is_function()
}

fn field_values<'js>(ctx: &Ctx<'js>, func: &str, values: &[Value<'js>]) -> rquickjs::Result<Vec<FieldValue>> {
    values
        .iter()
        .enumerate()
        .map(|(idx, value)| convert::js_to_field(ctx, &format!("{func} argument {}", idx + 1), value))
        .collect()
}

fn expect_fields<'js>(ctx: &Ctx<'js>, func: &str, args: &[Value<'js>]) -> rquickjs::Result<Vec<(String, FieldValue)>> {
    match args.first().and_then(|value| value.as_object().filter(|_| is_plain_object(value))) {
        Some(obj) => convert::object_fields(ctx, obj),
        None if args.is_empty() => Ok(Vec::new()),
        None => Err(type_error(ctx, &format!("{func}: expected an object of field values"))),
    }
}

fn expect_list<'js>(ctx: &Ctx<'js>, func: &str, args: &[Value<'js>]) -> rquickjs::Result<Vec<FieldValue>> {
    let Some(array) = args.get(1).and_then(Value::as_array) else {
        return Err(type_error(ctx, &format!("{func}: argument 2 must be an array")));
    };
    let mut values = Vec::with_capacity(array.len());
    for (idx, item) in array.iter::<Value>().enumerate() {
        values.push(convert::js_to_field(ctx, &format!("{func}[{idx}]"), &item?)?);
    }
    Ok(values)
}

fn expect_count(ctx: &Ctx<'_>, func: &str, value: Option<&Value<'_>>) -> rquickjs::Result<u64> {
    let number = value.and_then(|v| v.as_int().map(f64::from).or_else(|| v.as_float()));
    match number {
        Some(n) if n >= 0.0 && n.fract() == 0.0 => Ok(n as u64),
        _ => Err(type_error(ctx, &format!("{func}: expected a non-negative integer"))),
    }
}

fn columns<'js>(ctx: &Ctx<'js>, func: &str, args: &[Value<'js>]) -> rquickjs::Result<Vec<String>> {
    (0..args.len()).map(|idx| expect_string(ctx, func, args, idx)).collect()
}

fn number<'js>(ctx: &Ctx<'js>, n: i64) -> rquickjs::Result<Value<'js>> {
    convert::field_to_js(ctx, &FieldValue::Int(n))
}

fn run_op<'js>(
    ctx: &Ctx<'js>,
    session: &mut QuerySession,
    op: Op,
    args: &[Value<'js>],
) -> rquickjs::Result<Outcome<'js>> {
    let orm = |err: OrmError| orm_error(ctx, err);
    match op {
        Op::Where | Op::Id => {
            let lookup = match (op, condition(ctx, args)?) {
                (Op::Id, Lookup::Fields(_)) => {
                    return Err(type_error(ctx, "ID: expected primary key values"));
                }
                (_, lookup) => lookup,
            };
            session.apply(lookup).map_err(orm)?;
            Ok(Outcome::Chain)
        }
        Op::In | Op::NotIn => {
            let column = expect_string(ctx, op.name(), args, 0)?;
            let values = expect_list(ctx, op.name(), args)?;
            if op == Op::In {
                session.in_list(&column, values).map_err(orm)?;
            } else {
                session.not_in_list(&column, values).map_err(orm)?;
            }
            Ok(Outcome::Chain)
        }
        Op::Limit => {
            let limit = expect_count(ctx, "Limit", args.first())?;
            let start = match args.get(1) {
                Some(value) => expect_count(ctx, "Limit", Some(value))?,
                None => 0,
            };
            session.limit(limit, start);
            Ok(Outcome::Chain)
        }
        Op::Asc => {
            session.asc(columns(ctx, "Asc", args)?).map_err(orm)?;
            Ok(Outcome::Chain)
        }
        Op::Desc => {
            session.desc(columns(ctx, "Desc", args)?).map_err(orm)?;
            Ok(Outcome::Chain)
        }
        Op::And => {
            let clause = expect_string(ctx, "And", args, 0)?;
            let values = field_values(ctx, "And", &args[1..])?;
            session.and(clause, values);
            Ok(Outcome::Chain)
        }
        Op::Get => {
            let row = session.get(condition(ctx, args)?).map_err(orm)?;
            Ok(Outcome::Value(match row {
                Some(row) => convert::row_to_js(ctx, &row)?,
                None => Value::new_null(ctx.clone()),
            }))
        }
        Op::Find => {
            let rows = session.find(condition(ctx, args)?).map_err(orm)?;
            let out = Array::new(ctx.clone())?;
            for (idx, row) in rows.iter().enumerate() {
                out.set(idx, convert::row_to_js(ctx, row)?)?;
            }
            Ok(Outcome::Value(out.into_value()))
        }
        Op::Count => {
            let count = session.count(condition(ctx, args)?).map_err(orm)?;
            Ok(Outcome::Value(number(ctx, count)?))
        }
        Op::Update => {
            let values = expect_fields(ctx, "Update", args)?;
            let affected = session.update(values).map_err(orm)?;
            Ok(Outcome::Value(number(ctx, affected as i64)?))
        }
        Op::Insert => {
            let values = expect_fields(ctx, "Insert", args)?;
            let id = session.insert(values).map_err(orm)?;
            Ok(Outcome::Value(number(ctx, id)?))
        }
        Op::Delete => {
            let affected = session.delete(condition(ctx, args)?).map_err(orm)?;
            Ok(Outcome::Value(number(ctx, affected as i64)?))
        }
        Op::Close => {
            if session.is_autoclose() {
                session.close();
            }
            Ok(Outcome::Value(Value::new_undefined(ctx.clone())))
        }
    }
}

/// Run `op` on session `id`, returning `this` for chain operations
fn call_session<'js>(
    ctx: &Ctx<'js>,
    sessions: &Sessions,
    id: u32,
    op: Op,
    this: Object<'js>,
    args: &[Value<'js>],
) -> rquickjs::Result<Value<'js>> {
    // Argument conversion can run script getters that call back into this
    // table, so the session is taken out while the op runs.
    let Some(mut session) = sessions.borrow_mut().open.remove(&id) else {
        return Err(orm_error(ctx, OrmError::SessionClosed));
    };
    let result = run_op(ctx, &mut session, op, args);
    let release = op == Op::Close || (op.is_terminal() && session.is_autoclose());
    if !release {
        sessions.borrow_mut().open.insert(id, session);
    }

    match result? {
        Outcome::Chain => Ok(this.into_value()),
        Outcome::Value(value) => Ok(value),
    }
}

fn session_object<'js>(ctx: &Ctx<'js>, sessions: &Sessions, id: u32) -> rquickjs::Result<Object<'js>> {
    let facade = Object::new(ctx.clone())?;
    facade.set(SESSION_KEY, id)?;
    for op in Op::ALL {
        let sessions = Rc::clone(sessions);
        method(
            ctx,
            &facade,
            op.name(),
            move |ctx: Ctx<'js>, This(this): This<Object<'js>>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                call_session(&ctx, &sessions, id, op, this, &args)
            },
        )?;
    }
    Ok(facade)
}

fn open_session<'js>(
    ctx: &Ctx<'js>,
    sessions: &Sessions,
    session: QuerySession,
) -> rquickjs::Result<(u32, Object<'js>)> {
    let id = sessions.borrow_mut().insert(session);
    Ok((id, session_object(ctx, sessions, id)?))
}

fn session_handle(value: Option<&Value<'_>>) -> Option<u32> {
    value?.as_object()?.get::<_, Option<u32>>(SESSION_KEY).ok().flatten()
}

fn expect_callback<'js>(ctx: &Ctx<'js>, func: &str, args: &[Value<'js>]) -> rquickjs::Result<Function<'js>> {
    args.first()
        .and_then(|value| value.as_function().cloned())
        .ok_or_else(|| type_error(ctx, &format!("{func}: expected a callback function")))
}

fn model_object<'js>(ctx: &Ctx<'js>, sessions: &Sessions, model: &Model) -> rquickjs::Result<Object<'js>> {
    let facade = Object::new(ctx.clone())?;
    facade.set("name", model.name())?;
    facade.set("table", model.table())?;

    for op in Op::ALL.into_iter().filter(|op| *op != Op::Close) {
        let sessions = Rc::clone(sessions);
        let model = model.clone();
        method(ctx, &facade, op.name(), move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
            let session = model.session().map_err(|err| orm_error(&ctx, err))?;
            let (id, this) = open_session(&ctx, &sessions, session)?;
            let result = call_session(&ctx, &sessions, id, op, this, &args);
            if result.is_err() && !op.is_terminal() {
                sessions.borrow_mut().open.remove(&id);
            }
            result
        })?;
    }

    let m = model.clone();
    method(ctx, &facade, "New", move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
        let values = expect_fields(&ctx, "New", &args)?;
        let row = m.new_row(values).map_err(|err| orm_error(&ctx, err))?;
        convert::row_to_js(&ctx, &row)
    })?;

    method(ctx, &facade, "NewSlice", |ctx: Ctx<'js>| Array::new(ctx))?;

    let s = Rc::clone(sessions);
    let m = model.clone();
    method(ctx, &facade, "Session", move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
        let callback = expect_callback(&ctx, "Session", &args)?;
        m.scoped(|session| {
            let (id, facade) = open_session(&ctx, &s, session)?;
            let result = callback.call::<_, Value>((facade,));
            s.borrow_mut().open.remove(&id);
            result
        })
        .map_err(|err| orm_error(&ctx, err))?
    })?;

    let s = Rc::clone(sessions);
    let m = model.clone();
    method(ctx, &facade, "Atom", move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<bool> {
        let callback = expect_callback(&ctx, "Atom", &args)?;
        let committed = m.atom(|session| {
            let (id, facade) = match open_session(&ctx, &s, session) {
                Ok(opened) => opened,
                Err(err) => return TxOutcome::RollbackWithError(err),
            };
            let result = callback.call::<_, Value>((facade,));
            s.borrow_mut().open.remove(&id);
            match result {
                Ok(value) if value.as_bool() == Some(false) => TxOutcome::Rollback,
                Ok(_) => TxOutcome::Commit,
                Err(err) => TxOutcome::RollbackWithError(err),
            }
        });
        match committed {
            Ok(committed) => {
                tracing::debug!(model = m.name(), committed, "atom finished");
                Ok(committed)
            }
            Err(AtomError::Callback(err)) => Err(err),
            Err(AtomError::Orm(err)) => Err(orm_error(&ctx, err)),
        }
    })?;

    let s = Rc::clone(sessions);
    let m = model.clone();
    method(ctx, &facade, "WithSession", move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Object<'js>> {
        let Some(parent) = session_handle(args.first()) else {
            return Err(type_error(&ctx, "WithSession: expected a session"));
        };
        let attached = {
            let table = s.borrow();
            let Some(parent) = table.open.get(&parent) else {
                return Err(orm_error(&ctx, OrmError::SessionClosed));
            };
            m.with_session(parent).map_err(|err| orm_error(&ctx, err))?
        };
        Ok(open_session(&ctx, &s, attached)?.1)
    })?;

    Ok(facade)
}

impl HostModule for ModelsModule {
    fn build<'js>(&self, ctx: &Ctx<'js>, _host: &Host) -> rquickjs::Result<Value<'js>> {
        let sessions: Sessions = Rc::default();
        let exports = Object::new(ctx.clone())?;
        for model in &self.models {
            exports.set(model.name(), model_object(ctx, &sessions, model)?)?;
        }
        Ok(exports.into_value())
    }
}
