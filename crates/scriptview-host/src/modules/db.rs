// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! `db` module: raw SQL over the configured database

use super::{expect_string, method, orm_error};
use crate::convert;
use crate::environment::{Host, HostModule};
use rquickjs::function::Rest;
use rquickjs::{Array, Ctx, Object, Value};
use scriptview_orm::{Database, FieldValue};

/// The `db` module. Register it as a factory so scripts that never touch
/// the database do not pay for it.
#[derive(Debug, Clone)]
pub struct DbModule {
    database: Database,
}

impl DbModule {
    /// Module over `database`
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

fn bind_args<'js>(ctx: &Ctx<'js>, args: &[Value<'js>]) -> rquickjs::Result<Vec<FieldValue>> {
    args.iter()
        .enumerate()
        .map(|(idx, arg)| convert::js_to_field(ctx, &format!("parameter {}", idx + 1), arg))
        .collect()
}

impl HostModule for DbModule {
    fn build<'js>(&self, ctx: &Ctx<'js>, _host: &Host) -> rquickjs::Result<Value<'js>> {
        tracing::debug!(path = %self.database.path().display(), "db module built");
        let exports = Object::new(ctx.clone())?;

        let database = self.database.clone();
        method(ctx, &exports, "query", move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Array<'js>> {
            let sql = expect_string(&ctx, "query", &args, 0)?;
            let params = bind_args(&ctx, &args[1..])?;
            let rows = database
                .query_strings(&sql, &params)
                .map_err(|err| orm_error(&ctx, err))?;
            let out = Array::new(ctx.clone())?;
            for (idx, row) in rows.into_iter().enumerate() {
                let obj = Object::new(ctx.clone())?;
                for (column, value) in row {
                    obj.set(column, value)?;
                }
                out.set(idx, obj)?;
            }
            Ok(out)
        })?;

        let database = self.database.clone();
        method(ctx, &exports, "exec", move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<f64> {
            let sql = expect_string(&ctx, "exec", &args, 0)?;
            let params = bind_args(&ctx, &args[1..])?;
            let affected = database.exec(&sql, &params).map_err(|err| orm_error(&ctx, err))?;
            Ok(affected as f64)
        })?;

        Ok(exports.into_value())
    }
}
