mod support;

use support::open;

use loam::{Record, Session, Value};

#[derive(Record, Default, Debug)]
struct User {
    id: u64,
    name: String,
}

#[test]
fn identical_sql_prepares_once() {
    let (db, state) = open();
    state.push_rows(&["id", "name"], vec![vec![Value::Int(1), Value::from("a")]]);
    state.push_rows(&["id", "name"], vec![vec![Value::Int(2), Value::from("b")]]);

    let session = db.session(Session {
        prepare_stmt: true,
        ..Default::default()
    });

    let mut users: Vec<User> = Vec::new();
    session.find(&mut users).unwrap();
    session.find(&mut users).unwrap();

    // two round trips, one prepared handle
    assert_eq!(state.calls().len(), 2);
    assert_eq!(state.prepared.lock().unwrap().len(), 1);
}

#[test]
fn plain_sessions_leave_the_cache_alone() {
    let (db, state) = open();
    state.push_rows(&["id", "name"], vec![]);

    let mut users: Vec<User> = Vec::new();
    db.find(&mut users).unwrap();

    assert!(state.prepared.lock().unwrap().is_empty());
}
