// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Query builder and condition translation

use crate::error::{OrmError, Result};
use crate::value::FieldValue;

/// One `AND`-joined clause and its bound arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// SQL fragment with `?` placeholders
    pub clause: String,
    /// Values bound to the placeholders
    pub args: Vec<FieldValue>,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Ascending
    Asc,
    /// Descending
    Desc,
}

/// Accumulated query state of a session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    conditions: Vec<Condition>,
    order: Vec<(String, Order)>,
    limit: Option<(u64, u64)>,
}

/// Map a comparison suffix (`age__gt`) onto its SQL operator
pub fn operator_for(suffix: &str) -> Result<&'static str> {
    match suffix.to_ascii_lowercase().as_str() {
        "eq" => Ok("="),
        "ne" => Ok("<>"),
        "lt" => Ok("<"),
        "gt" => Ok(">"),
        "le" => Ok("<="),
        "ge" => Ok(">="),
        _ => Err(OrmError::UnsupportedOperator(suffix.to_string())),
    }
}

/// Split `name__op` into the column and its SQL operator (`=` by default)
pub fn split_key(key: &str) -> Result<(&str, &'static str)> {
    match key.split_once("__") {
        Some((column, suffix)) => Ok((column, operator_for(suffix)?)),
        None => Ok((key, "=")),
    }
}

impl Query {
    /// Empty query
    pub fn new() -> Self {
        Self::default()
    }

    /// Conditions accumulated so far
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Order-by columns accumulated so far
    pub fn order(&self) -> &[(String, Order)] {
        &self.order
    }

    /// `(limit, offset)` if set
    pub fn limit(&self) -> Option<(u64, u64)> {
        self.limit
    }

    /// Conjoin a raw clause
    pub fn and(&mut self, clause: impl Into<String>, args: Vec<FieldValue>) -> &mut Self {
        self.conditions.push(Condition {
            clause: clause.into(),
            args,
        });
        self
    }

    /// Conjoin one clause per `column[__op]` key.
    ///
    /// `column_ok` vets the column name before it reaches SQL.
    pub fn and_fields<F>(&mut self, fields: Vec<(String, FieldValue)>, column_ok: F) -> Result<&mut Self>
    where
        F: Fn(&str) -> Result<()>,
    {
        for (key, value) in fields {
            let (column, op) = split_key(&key)?;
            column_ok(column)?;
            self.and(format!("{column} {op} ?"), vec![value]);
        }
        Ok(self)
    }

    /// Conjoin a primary key lookup; composite keys pair columns with values
    /// positionally.
    pub fn id(&mut self, record: &'static str, columns: &[&str], values: Vec<FieldValue>) -> Result<&mut Self> {
        if columns.len() != values.len() {
            return Err(OrmError::PrimaryKeyArity {
                record,
                expected: columns.len(),
                found: values.len(),
            });
        }
        for (column, value) in columns.iter().zip(values) {
            self.and(format!("{column} = ?"), vec![value]);
        }
        Ok(self)
    }

    /// `column IN (...)`; an empty list matches nothing
    pub fn in_list(&mut self, column: &str, values: Vec<FieldValue>) -> &mut Self {
        if values.is_empty() {
            return self.and("1 = 0", Vec::new());
        }
        let marks = vec!["?"; values.len()].join(", ");
        self.and(format!("{column} IN ({marks})"), values)
    }

    /// `column NOT IN (...)`; an empty list excludes nothing
    pub fn not_in_list(&mut self, column: &str, values: Vec<FieldValue>) -> &mut Self {
        if values.is_empty() {
            return self;
        }
        let marks = vec!["?"; values.len()].join(", ");
        self.and(format!("{column} NOT IN ({marks})"), values)
    }

    /// Limit the result, optionally skipping `start` rows
    pub fn set_limit(&mut self, limit: u64, start: u64) -> &mut Self {
        self.limit = Some((limit, start));
        self
    }

    /// Append order-by columns
    pub fn order_by<I, S>(&mut self, columns: I, order: Order) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order
            .extend(columns.into_iter().map(|c| (c.into(), order)));
        self
    }

    fn where_sql(&self) -> (String, Vec<FieldValue>) {
        if self.conditions.is_empty() {
            return (String::new(), Vec::new());
        }
        let clauses: Vec<String> = self
            .conditions
            .iter()
            .map(|c| format!("({})", c.clause))
            .collect();
        let args = self
            .conditions
            .iter()
            .flat_map(|c| c.args.iter().cloned())
            .collect();
        (format!(" WHERE {}", clauses.join(" AND ")), args)
    }

    /// `SELECT` statement
    pub fn select_sql(&self, table: &str, columns: &[&str]) -> (String, Vec<FieldValue>) {
        let (filter, args) = self.where_sql();
        let mut sql = format!("SELECT {} FROM {table}{filter}", columns.join(", "));
        if !self.order.is_empty() {
            let order: Vec<String> = self
                .order
                .iter()
                .map(|(column, order)| match order {
                    Order::Asc => format!("{column} ASC"),
                    Order::Desc => format!("{column} DESC"),
                })
                .collect();
            sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
        }
        if let Some((limit, start)) = self.limit {
            sql.push_str(&format!(" LIMIT {limit} OFFSET {start}"));
        }
        (sql, args)
    }

    /// `SELECT COUNT(*)` statement
    pub fn count_sql(&self, table: &str) -> (String, Vec<FieldValue>) {
        let (filter, args) = self.where_sql();
        (format!("SELECT COUNT(*) FROM {table}{filter}"), args)
    }

    /// `UPDATE` statement setting `values`
    pub fn update_sql(&self, table: &str, values: Vec<(&str, FieldValue)>) -> (String, Vec<FieldValue>) {
        let (filter, filter_args) = self.where_sql();
        let sets: Vec<String> = values.iter().map(|(c, _)| format!("{c} = ?")).collect();
        let mut args: Vec<FieldValue> = values.into_iter().map(|(_, v)| v).collect();
        args.extend(filter_args);
        (format!("UPDATE {table} SET {}{filter}", sets.join(", ")), args)
    }

    /// `DELETE` statement
    pub fn delete_sql(&self, table: &str) -> (String, Vec<FieldValue>) {
        let (filter, args) = self.where_sql();
        (format!("DELETE FROM {table}{filter}"), args)
    }
}

/// `INSERT` statement for one row
pub fn insert_sql(table: &str, row: Vec<(&str, FieldValue)>) -> (String, Vec<FieldValue>) {
    let columns: Vec<&str> = row.iter().map(|(c, _)| *c).collect();
    let marks = vec!["?"; columns.len()].join(", ");
    let args = row.into_iter().map(|(_, v)| v).collect();
    (
        format!("INSERT INTO {table} ({}) VALUES ({marks})", columns.join(", ")),
        args,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn any_column(_: &str) -> Result<()> {
        Ok(())
    }

    #[test]
    fn test_suffix_translates_to_comparison() {
        let mut query = Query::new();
        query
            .and_fields(vec![("age__gt".into(), FieldValue::Int(18))], any_column)
            .unwrap();
        assert_eq!(
            query.conditions(),
            &[Condition {
                clause: "age > ?".into(),
                args: vec![FieldValue::Int(18)],
            }]
        );
    }

    #[test]
    fn test_bare_key_means_equality() {
        let mut query = Query::new();
        query
            .and_fields(vec![("age".into(), FieldValue::Int(18))], any_column)
            .unwrap();
        assert_eq!(query.conditions()[0].clause, "age = ?");
        assert_eq!(query.conditions()[0].args, vec![FieldValue::Int(18)]);
    }

    #[test]
    fn test_every_suffix() {
        let cases = [
            ("eq", "="),
            ("ne", "<>"),
            ("lt", "<"),
            ("gt", ">"),
            ("le", "<="),
            ("GE", ">="),
        ];
        for (suffix, op) in cases {
            assert_eq!(operator_for(suffix).unwrap(), op);
        }
        assert!(matches!(
            operator_for("like"),
            Err(OrmError::UnsupportedOperator(s)) if s == "like"
        ));
    }

    #[test]
    fn test_column_check_runs_on_the_bare_column() {
        let mut query = Query::new();
        let err = query
            .and_fields(vec![("secret__lt".into(), FieldValue::Int(1))], |c| {
                assert_eq!(c, "secret");
                Err(OrmError::UnknownField {
                    record: "User",
                    field: c.to_string(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, OrmError::UnknownField { .. }));
        assert!(query.conditions().is_empty());
    }

    #[test]
    fn test_composite_primary_key() {
        let mut query = Query::new();
        query
            .id("Pair", &["a", "b"], vec![FieldValue::Int(1), FieldValue::Int(2)])
            .unwrap();
        let (sql, args) = query.select_sql("pairs", &["a", "b"]);
        assert_eq!(sql, "SELECT a, b FROM pairs WHERE (a = ?) AND (b = ?)");
        assert_eq!(args, vec![FieldValue::Int(1), FieldValue::Int(2)]);

        assert!(Query::new().id("Pair", &["a", "b"], vec![FieldValue::Int(1)]).is_err());
    }

    #[test]
    fn test_select_with_order_and_limit() {
        let mut query = Query::new();
        query
            .in_list("id", vec![FieldValue::Int(1), FieldValue::Int(2)])
            .order_by(["name"], Order::Asc)
            .order_by(["age"], Order::Desc)
            .set_limit(10, 20);
        let (sql, args) = query.select_sql("users", &["id", "name"]);
        assert_eq!(
            sql,
            "SELECT id, name FROM users WHERE (id IN (?, ?)) ORDER BY name ASC, age DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_empty_in_lists() {
        let mut query = Query::new();
        query.in_list("id", Vec::new()).not_in_list("id", Vec::new());
        assert_eq!(query.count_sql("t").0, "SELECT COUNT(*) FROM t WHERE (1 = 0)");
    }

    #[test]
    fn test_update_binds_values_before_filter() {
        let mut query = Query::new();
        query.and("id = ?", vec![FieldValue::Int(7)]);
        let (sql, args) = query.update_sql("users", vec![("name", FieldValue::from("x"))]);
        assert_eq!(sql, "UPDATE users SET name = ? WHERE (id = ?)");
        assert_eq!(args, vec![FieldValue::from("x"), FieldValue::Int(7)]);
    }
}
