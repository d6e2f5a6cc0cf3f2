mod support;

use support::{dry_session, open};

use loam::{vars, Map, Record, Value};

#[derive(Record, Default, Debug)]
struct User {
    id: u64,
    name: String,
}

#[test]
fn named_parameters_resolve_from_a_map() {
    let (db, _state) = open();

    let mut names = Map::new();
    names.insert("x".to_owned(), Value::Int(1));
    names.insert("y".to_owned(), Value::from("k"));

    let execution = dry_session(&db)
        .exec_named("UPDATE t SET x=@x WHERE y=@y", names)
        .unwrap();

    assert_eq!(execution.sql, "UPDATE t SET x=$1 WHERE y=$2");
    assert_eq!(execution.vars, vec![Value::Int(1), Value::from("k")]);
}

#[test]
fn repeated_names_bind_each_occurrence() {
    let (db, _state) = open();

    let mut names = Map::new();
    names.insert("v".to_owned(), Value::Int(9));

    let execution = dry_session(&db)
        .exec_named("SELECT * FROM t WHERE a=@v OR b=@v", names)
        .unwrap();

    assert_eq!(execution.sql, "SELECT * FROM t WHERE a=$1 OR b=$2");
    assert_eq!(execution.vars, vec![Value::Int(9), Value::Int(9)]);
}

#[test]
fn unresolved_names_are_written_back() {
    let (db, _state) = open();

    let execution = dry_session(&db)
        .exec_named("SELECT * FROM t WHERE a=@missing", Map::new())
        .unwrap();

    assert_eq!(execution.sql, "SELECT * FROM t WHERE a=@missing");
    assert!(execution.vars.is_empty());
}

#[test]
fn raw_query_scans_rows() {
    let (db, state) = open();
    state.push_rows(
        &["id", "name"],
        vec![vec![Value::Int(1), Value::from("a")]],
    );

    let mut users: Vec<User> = Vec::new();
    let execution = db
        .model::<User>()
        .raw("SELECT * FROM users WHERE id = ?", vars![1])
        .find(&mut users)
        .unwrap();

    assert_eq!(execution.rows_affected, 1);
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].name, "a");

    let calls = state.calls();
    assert_eq!(calls[0].0, "SELECT * FROM users WHERE id = $1");
}

#[test]
fn raw_exec_reports_rows_affected() {
    let (db, state) = open();
    state.push_exec(loam::ExecResult {
        rows_affected: 4,
        last_insert_id: 0,
    });

    let execution = db.exec("DELETE FROM t WHERE a > ?", vars![5]).unwrap();
    assert_eq!(execution.rows_affected, 4);
    assert_eq!(state.calls()[0].0, "DELETE FROM t WHERE a > $1");
}
