// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the ORM facade

use crate::value::FieldKind;
use thiserror::Error;

/// Result type for ORM operations
pub type Result<T> = std::result::Result<T, OrmError>;

/// Errors raised by models, sessions and the query builder
#[derive(Debug, Error)]
pub enum OrmError {
    /// Database error, prefixed with the operation that failed
    #[error("orm {op}: db error: {source}")]
    Database {
        /// Failing operation (get, find, count, update, begin, ...)
        op: &'static str,
        /// Driver error
        #[source]
        source: rusqlite::Error,
    },

    /// Column is not declared on the record
    #[error("unknown field '{field}' on {record}")]
    UnknownField {
        /// Record type name
        record: &'static str,
        /// Offending field
        field: String,
    },

    /// Value cannot be stored in the field's declared kind
    #[error("field '{field}' expects {expected}, got {found}")]
    TypeMismatch {
        /// Field name
        field: String,
        /// Declared kind
        expected: FieldKind,
        /// Kind of the value received
        found: &'static str,
    },

    /// Numeric value does not fit the destination type
    #[error("value {value} is out of range for field '{field}'")]
    OutOfRange {
        /// Field name
        field: String,
        /// Rendered value
        value: String,
    },

    /// Comparison suffix not recognised by condition translation
    #[error("unsupported operator suffix '__{0}'")]
    UnsupportedOperator(String),

    /// Primary key arity does not match the record
    #[error("{record} has {expected} primary key column(s), got {found} value(s)")]
    PrimaryKeyArity {
        /// Record type name
        record: &'static str,
        /// Declared key columns
        expected: usize,
        /// Values supplied
        found: usize,
    },

    /// Session was used after it was closed
    #[error("session is closed")]
    SessionClosed,

    /// Attaching a session across different databases
    #[error("cannot attach {model} to a session of a different database")]
    EngineMismatch {
        /// Model being attached
        model: &'static str,
    },
}

impl OrmError {
    /// Wrap a driver error with the failing operation
    pub fn db(op: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| Self::Database { op, source }
    }
}
