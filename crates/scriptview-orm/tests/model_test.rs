//! Model and session integration tests against a scratch SQLite file

use scriptview_orm::{
    AtomError, Database, FieldValue, Lookup, Model, OrmError, TxOutcome, record,
};
use tempfile::TempDir;

record! {
    #[derive(Debug, Default)]
    pub struct User: "users" (id) {
        pub id: i64,
        pub name: String,
        pub age: u32,
        pub active: bool,
    }
}

record! {
    #[derive(Debug, Default)]
    pub struct Membership: "memberships" (user_id, group_id) {
        pub user_id: i64,
        pub group_id: i64,
        pub role: Option<String>,
    }
}

fn setup() -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("test.db")).unwrap();
    db.execute_batch(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER NOT NULL, active INTEGER NOT NULL);
         CREATE TABLE memberships (user_id INTEGER, group_id INTEGER, role TEXT, PRIMARY KEY (user_id, group_id));",
    )
    .unwrap();
    (dir, db)
}

fn fields(pairs: &[(&str, FieldValue)]) -> Vec<(String, FieldValue)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn seed(users: &Model) {
    for (name, age) in [("ann", 17.0), ("bob", 25.0), ("cid", 40.0)] {
        users
            .insert(fields(&[
                ("name", FieldValue::from(name)),
                ("age", FieldValue::Float(age)),
                ("active", FieldValue::Bool(true)),
            ]))
            .unwrap();
    }
}

fn column<'a>(row: &'a [(&'static str, FieldValue)], name: &str) -> &'a FieldValue {
    &row.iter().find(|(n, _)| *n == name).unwrap().1
}

#[test]
fn test_insert_assigns_ids_and_get_hydrates() {
    let (_dir, db) = setup();
    let users = Model::new::<User>(db);
    seed(&users);

    let row = users
        .get(Lookup::PrimaryKey(vec![FieldValue::Float(2.0)]))
        .unwrap()
        .unwrap();
    assert_eq!(column(&row, "id"), &FieldValue::Int(2));
    assert_eq!(column(&row, "name"), &FieldValue::from("bob"));
    assert_eq!(column(&row, "age"), &FieldValue::UInt(25));
    assert_eq!(column(&row, "active"), &FieldValue::Bool(true));

    assert!(users
        .get(Lookup::PrimaryKey(vec![FieldValue::Int(99)]))
        .unwrap()
        .is_none());
}

#[test]
fn test_where_with_comparison_suffix() {
    let (_dir, db) = setup();
    let users = Model::new::<User>(db);
    seed(&users);

    let adults = users
        .where_fields(fields(&[("age__gt", FieldValue::Float(18.0))]))
        .unwrap()
        .find(Lookup::None)
        .unwrap();
    assert_eq!(adults.len(), 2);

    let count = users
        .count(Lookup::Fields(fields(&[("name", FieldValue::from("ann"))])))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_chained_session_orders_and_limits() {
    let (_dir, db) = setup();
    let users = Model::new::<User>(db);
    seed(&users);

    let mut session = users.session().unwrap();
    let rows = session
        .desc(vec!["age".into()])
        .unwrap()
        .limit(2, 0)
        .find(Lookup::None)
        .unwrap();
    let names: Vec<_> = rows.iter().map(|r| column(r, "name").clone()).collect();
    assert_eq!(names, vec![FieldValue::from("cid"), FieldValue::from("bob")]);

    let mut session = users.session().unwrap();
    let count = session
        .in_list("name", vec!["ann".into(), "cid".into()])
        .unwrap()
        .not_in_list("name", vec!["cid".into()])
        .unwrap()
        .count(Lookup::None)
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_unknown_column_is_rejected_before_sql() {
    let (_dir, db) = setup();
    let users = Model::new::<User>(db);

    let err = users
        .where_fields(fields(&[("password", FieldValue::from("x"))]))
        .unwrap_err();
    assert!(matches!(err, OrmError::UnknownField { record: "User", .. }));
}

#[test]
fn test_update_only_touches_named_fields() {
    let (_dir, db) = setup();
    let users = Model::new::<User>(db);
    seed(&users);

    let affected = users
        .id(vec![FieldValue::Int(1)])
        .unwrap()
        .update(fields(&[("age", FieldValue::Float(18.0))]))
        .unwrap();
    assert_eq!(affected, 1);

    let row = users
        .get(Lookup::PrimaryKey(vec![FieldValue::Int(1)]))
        .unwrap()
        .unwrap();
    assert_eq!(column(&row, "age"), &FieldValue::UInt(18));
    assert_eq!(column(&row, "name"), &FieldValue::from("ann"));
}

#[test]
fn test_standalone_session_closes_after_terminal() {
    let (_dir, db) = setup();
    let users = Model::new::<User>(db);
    seed(&users);

    let mut session = users.session().unwrap();
    assert!(session.is_autoclose());
    assert_eq!(session.count(Lookup::None).unwrap(), 3);
    assert!(session.is_closed());
    assert!(matches!(
        session.count(Lookup::None),
        Err(OrmError::SessionClosed)
    ));
}

#[test]
fn test_scoped_session_survives_until_callback_returns() {
    let (_dir, db) = setup();
    let users = Model::new::<User>(db);
    seed(&users);

    let (first, second, closed_inside) = users
        .scoped(|mut session| {
            let first = session.count(Lookup::None).unwrap();
            let second = session
                .where_fields(fields(&[("age__lt", FieldValue::Float(30.0))]))
                .unwrap()
                .count(Lookup::None)
                .unwrap();
            (first, second, session.is_closed())
        })
        .unwrap();
    assert_eq!((first, second, closed_inside), (3, 2, false));
}

#[test]
fn test_atom_commits_by_default() {
    let (_dir, db) = setup();
    let users = Model::new::<User>(db);

    let committed = users
        .atom::<String>(|mut session| {
            session
                .insert(fields(&[("name", FieldValue::from("dee"))]))
                .unwrap();
            TxOutcome::Commit
        })
        .unwrap();
    assert!(committed);
    assert_eq!(users.count(Lookup::None).unwrap(), 1);
}

#[test]
fn test_atom_rollback_discards_writes() {
    let (_dir, db) = setup();
    let users = Model::new::<User>(db);
    seed(&users);

    let committed = users
        .atom::<String>(|mut session| {
            session
                .insert(fields(&[("name", FieldValue::from("eve"))]))
                .unwrap();
            TxOutcome::Rollback
        })
        .unwrap();
    assert!(!committed);
    assert_eq!(users.count(Lookup::None).unwrap(), 3);
}

#[test]
fn test_atom_error_rolls_back_and_surfaces() {
    let (_dir, db) = setup();
    let users = Model::new::<User>(db);

    let err = users
        .atom(|mut session| {
            session
                .insert(fields(&[("name", FieldValue::from("fay"))]))
                .unwrap();
            TxOutcome::RollbackWithError("boom".to_string())
        })
        .unwrap_err();
    assert!(matches!(err, AtomError::Callback(ref msg) if msg == "boom"));
    assert_eq!(err.to_string(), "transaction aborted: boom");
    assert_eq!(users.count(Lookup::None).unwrap(), 0);
}

#[test]
fn test_with_session_shares_the_transaction() {
    let (_dir, db) = setup();
    let users = Model::new::<User>(db.clone());
    let memberships = Model::new::<Membership>(db);

    users
        .atom::<String>(|mut session| {
            let user_id = session
                .insert(fields(&[("name", FieldValue::from("gus"))]))
                .unwrap();
            let mut linked = memberships.with_session(&session).unwrap();
            linked
                .insert(fields(&[
                    ("user_id", FieldValue::Int(user_id)),
                    ("group_id", FieldValue::Int(7)),
                ]))
                .unwrap();
            TxOutcome::Rollback
        })
        .unwrap();

    assert_eq!(users.count(Lookup::None).unwrap(), 0);
    assert_eq!(memberships.count(Lookup::None).unwrap(), 0);
}

#[test]
fn test_with_session_across_databases_fails() {
    let (_dir_a, db_a) = setup();
    let (_dir_b, db_b) = setup();
    let users = Model::new::<User>(db_a);
    let memberships = Model::new::<Membership>(db_b);

    let session = users.session().unwrap();
    assert!(matches!(
        memberships.with_session(&session),
        Err(OrmError::EngineMismatch { model: "Membership" })
    ));
}

#[test]
fn test_composite_primary_key_lookup() {
    let (_dir, db) = setup();
    let memberships = Model::new::<Membership>(db);
    memberships
        .insert(fields(&[
            ("user_id", FieldValue::Int(1)),
            ("group_id", FieldValue::Int(2)),
            ("role", FieldValue::from("admin")),
        ]))
        .unwrap();

    let row = memberships
        .get(Lookup::PrimaryKey(vec![FieldValue::Int(1), FieldValue::Int(2)]))
        .unwrap()
        .unwrap();
    assert_eq!(column(&row, "role"), &FieldValue::from("admin"));

    assert!(matches!(
        memberships.get(Lookup::PrimaryKey(vec![FieldValue::Int(1)])),
        Err(OrmError::PrimaryKeyArity { expected: 2, found: 1, .. })
    ));
}

#[test]
fn test_delete_removes_matching_rows() {
    let (_dir, db) = setup();
    let users = Model::new::<User>(db);
    seed(&users);

    let removed = users
        .session()
        .unwrap()
        .delete(Lookup::Fields(fields(&[("age__ge", FieldValue::Float(25.0))])))
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(users.count(Lookup::None).unwrap(), 1);
}
