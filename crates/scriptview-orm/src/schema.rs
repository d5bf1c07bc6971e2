// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Record schema descriptors
//!
//! A [`Schema`] is built once per record type and maps each field name to
//! its kind and a getter/setter pair, so dynamic field access is a table
//! lookup rather than per-call type inspection. The [`record!`] macro writes
//! the struct and its schema together.
//!
//! ```
//! use scriptview_orm::{record, Record};
//!
//! record! {
//!     #[derive(Debug, Default)]
//!     pub struct User: "users" (id) {
//!         pub id: i64,
//!         pub name: String,
//!         pub visits: u32,
//!     }
//! }
//!
//! let schema = User::schema();
//! assert_eq!(schema.table(), "users");
//! assert_eq!(schema.primary_key(), &["id"]);
//! ```

use crate::error::{OrmError, Result};
use crate::value::{FieldKind, FieldValue};
use std::marker::PhantomData;

/// Field values in schema order
pub type Row = Vec<(&'static str, FieldValue)>;

/// Accessors for one field of `R`
pub struct Field<R> {
    name: &'static str,
    kind: FieldKind,
    get: fn(&R) -> FieldValue,
    set: fn(&mut R, FieldValue) -> Result<()>,
}

impl<R> Field<R> {
    /// Describe a field
    pub fn new(
        name: &'static str,
        kind: FieldKind,
        get: fn(&R) -> FieldValue,
        set: fn(&mut R, FieldValue) -> Result<()>,
    ) -> Self {
        Self { name, kind, get, set }
    }

    /// Field (and column) name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared kind
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Read the field
    pub fn get(&self, record: &R) -> FieldValue {
        (self.get)(record)
    }

    /// Coerce `value` to the field's kind and store it
    pub fn set(&self, record: &mut R, value: FieldValue) -> Result<()> {
        let value = value.coerce(self.name, self.kind)?;
        (self.set)(record, value)
    }
}

/// Precomputed description of a record type
pub struct Schema<R> {
    name: &'static str,
    table: &'static str,
    fields: Vec<Field<R>>,
    primary_key: Vec<&'static str>,
}

impl<R: Record> Schema<R> {
    /// Build a schema
    pub fn new(
        name: &'static str,
        table: &'static str,
        fields: Vec<Field<R>>,
        primary_key: &[&'static str],
    ) -> Self {
        Self {
            name,
            table,
            fields,
            primary_key: primary_key.to_vec(),
        }
    }

    /// Record type name, the key scripts see under `models`
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Table name
    pub fn table(&self) -> &'static str {
        self.table
    }

    /// Primary key columns
    pub fn primary_key(&self) -> &[&'static str] {
        &self.primary_key
    }

    /// All fields in declaration order
    pub fn fields(&self) -> &[Field<R>] {
        &self.fields
    }

    /// Look a field up by name
    pub fn field(&self, name: &str) -> Result<&Field<R>> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| OrmError::UnknownField {
                record: self.name,
                field: name.to_string(),
            })
    }

    /// Assign dynamic values onto a record
    pub fn assign<I>(&self, record: &mut R, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, FieldValue)>,
    {
        for (name, value) in values {
            self.field(&name)?.set(record, value)?;
        }
        Ok(())
    }

    /// Read every field of a record
    pub fn row(&self, record: &R) -> Row {
        self.fields.iter().map(|f| (f.name, f.get(record))).collect()
    }
}

/// A statically typed record that scripts can manipulate
pub trait Record: Default + Send + 'static {
    /// The record's schema, built once
    fn schema() -> &'static Schema<Self>;
}

/// Construct a zero-valued record and assign `values` onto it
pub fn new_record<R, I>(values: I) -> Result<R>
where
    R: Record,
    I: IntoIterator<Item = (String, FieldValue)>,
{
    let mut record = R::default();
    R::schema().assign(&mut record, values)?;
    Ok(record)
}

/// Object-safe view of a record type, used where the concrete type is erased
pub trait Table: Send + Sync {
    /// Record type name
    fn name(&self) -> &'static str;

    /// Table name
    fn table(&self) -> &'static str;

    /// Columns in declaration order
    fn columns(&self) -> Vec<(&'static str, FieldKind)>;

    /// Primary key columns
    fn primary_key(&self) -> &[&'static str];

    /// Kind of a column, if declared
    fn kind_of(&self, column: &str) -> Option<FieldKind>;

    /// Build a record from dynamic values and read it back
    fn build(&self, values: Vec<(String, FieldValue)>) -> Result<Row>;

    /// Materialize a result row through the typed record. SQL NULL leaves
    /// the field at its default: zero for plain fields, `None` for options.
    fn hydrate(&self, values: Vec<(String, FieldValue)>) -> Result<Row>;
}

/// [`Table`] implementation backed by a concrete record type
pub struct TypedTable<R>(PhantomData<fn() -> R>);

impl<R: Record> TypedTable<R> {
    /// Erase `R`
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<R: Record> Default for TypedTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> Table for TypedTable<R> {
    fn name(&self) -> &'static str {
        R::schema().name()
    }

    fn table(&self) -> &'static str {
        R::schema().table()
    }

    fn columns(&self) -> Vec<(&'static str, FieldKind)> {
        R::schema()
            .fields()
            .iter()
            .map(|f| (f.name(), f.kind()))
            .collect()
    }

    fn primary_key(&self) -> &[&'static str] {
        R::schema().primary_key()
    }

    fn kind_of(&self, column: &str) -> Option<FieldKind> {
        R::schema().field(column).ok().map(Field::kind)
    }

    fn build(&self, values: Vec<(String, FieldValue)>) -> Result<Row> {
        let record: R = new_record(values)?;
        Ok(R::schema().row(&record))
    }

    fn hydrate(&self, values: Vec<(String, FieldValue)>) -> Result<Row> {
        self.build(
            values
                .into_iter()
                .filter(|(_, value)| *value != FieldValue::Null)
                .collect(),
        )
    }
}

/// Declare a record struct together with its [`Record`] schema.
///
/// Syntax: `struct Name: "table" (pk, ...) { fields }`. The struct must
/// implement `Default`; derive it through the attribute list.
#[macro_export]
macro_rules! record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident : $table:literal ( $($pk:ident),+ $(,)? ) {
            $( $(#[$fmeta:meta])* $fvis:vis $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( $(#[$fmeta])* $fvis $field : $ty ),*
        }

        impl $crate::Record for $name {
            fn schema() -> &'static $crate::Schema<Self> {
                static SCHEMA: ::std::sync::OnceLock<$crate::Schema<$name>> =
                    ::std::sync::OnceLock::new();
                SCHEMA.get_or_init(|| {
                    $crate::Schema::new(
                        stringify!($name),
                        $table,
                        vec![$(
                            $crate::Field::<$name>::new(
                                stringify!($field),
                                <$ty as $crate::FieldType>::KIND,
                                |record| $crate::FieldType::to_value(&record.$field),
                                |record, value| {
                                    record.$field = <$ty as $crate::FieldType>::from_value(
                                        stringify!($field),
                                        value,
                                    )?;
                                    Ok(())
                                },
                            )
                        ),*],
                        &[$(stringify!($pk)),+],
                    )
                })
            }
        }
    };
}
