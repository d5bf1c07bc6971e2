// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # scriptview-orm
//!
//! A dynamic query facade over statically typed records, built for script
//! hosts that only speak in loosely typed values.
//!
//! - [`Record`] types declare their schema once (see [`record!`])
//! - [`Model`] binds a record type to a [`Database`]
//! - [`QuerySession`] accumulates conditions, ordering and limits, then runs
//!   one terminal operation (`get`, `find`, `count`, `update`, ...)
//! - [`Model::atom`] runs a callback inside a transaction
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use scriptview_orm::{record, Database, Lookup, Model};
//!
//! record! {
//!     #[derive(Debug, Default)]
//!     pub struct User: "users" (id) {
//!         pub id: i64,
//!         pub name: String,
//!         pub age: u32,
//!     }
//! }
//!
//! let db = Database::open("app.db")?;
//! let users = Model::new::<User>(db);
//! let adults = users
//!     .where_fields(vec![("age__ge".into(), 18.0.into())])?
//!     .find(Lookup::None)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod db;
pub mod error;
pub mod model;
pub mod query;
pub mod schema;
pub mod session;
pub mod value;

// Re-exports
pub use db::{Database, DbSession};
pub use error::{OrmError, Result};
pub use model::{AtomError, Model, TxOutcome};
pub use query::{Condition, Order, Query};
pub use schema::{Field, Record, Row, Schema, Table, TypedTable, new_record};
pub use session::{Lookup, QuerySession};
pub use value::{FieldKind, FieldType, FieldValue};
