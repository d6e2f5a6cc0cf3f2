mod support;

use support::open;

use loam::{vars, Record, Value};

#[derive(Record, Default, Debug)]
struct User {
    id: u64,
    name: String,
    age: i64,
}

#[derive(Record, Default, Debug, PartialEq)]
struct Addr {
    city: String,
}

#[derive(Record, Default, Debug)]
struct Customer {
    id: u64,
    #[loam("embedded;embeddedPrefix=addr_")]
    addr: Addr,
    name: String,
}

#[derive(Record, Default, Debug)]
struct Renamed {
    id: u64,
    name: String,
    #[loam("column=name")]
    nick: String,
}

#[test]
fn find_appends_one_record_per_row() {
    let (db, state) = open();
    state.push_rows(
        &["id", "name", "age"],
        vec![
            vec![Value::Int(1), Value::from("a"), Value::Int(20)],
            vec![Value::Int(2), Value::from("b"), Value::Int(30)],
        ],
    );

    let mut users: Vec<User> = Vec::new();
    let execution = db.find(&mut users).unwrap();

    assert_eq!(execution.rows_affected, 2);
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].id, 1);
    assert_eq!(users[1].name, "b");
    assert_eq!(users[1].age, 30);
}

#[test]
fn find_replaces_previous_contents() {
    let (db, state) = open();
    state.push_rows(&["id"], vec![vec![Value::Int(9)]]);

    let mut users = vec![User::default(), User::default()];
    db.find(&mut users).unwrap();

    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, 9);
}

#[test]
fn duplicate_columns_bind_to_successive_fields() {
    let (db, state) = open();
    state.push_rows(
        &["name", "name"],
        vec![vec![Value::from("first"), Value::from("second")]],
    );

    let mut records: Vec<Renamed> = Vec::new();
    db.find(&mut records).unwrap();

    assert_eq!(records[0].name, "first");
    assert_eq!(records[0].nick, "second");
}

#[test]
fn first_raises_record_not_found_on_empty_results() {
    let (db, state) = open();
    state.push_rows(&["id", "name", "age"], vec![]);

    let mut user = User::default();
    let err = db.first(&mut user).unwrap_err();
    assert!(err.is_record_not_found());

    let calls = state.calls();
    assert!(calls[0]
        .0
        .contains("ORDER BY \"users\".\"id\" LIMIT $1"));
}

#[test]
fn find_returns_ok_on_empty_results() {
    let (db, state) = open();
    state.push_rows(&["id"], vec![]);

    let mut users: Vec<User> = Vec::new();
    let execution = db.find(&mut users).unwrap();
    assert_eq!(execution.rows_affected, 0);
    assert!(users.is_empty());
}

#[test]
fn embedded_columns_scan_into_the_nested_record() {
    let (db, state) = open();
    state.push_rows(
        &["id", "addr_city", "name"],
        vec![vec![Value::Int(1), Value::from("Berlin"), Value::from("a")]],
    );

    let mut customers: Vec<Customer> = Vec::new();
    db.find(&mut customers).unwrap();

    assert_eq!(customers[0].addr, Addr { city: "Berlin".to_owned() });
    assert_eq!(customers[0].name, "a");
}

#[test]
fn unknown_columns_sink() {
    let (db, state) = open();
    state.push_rows(
        &["id", "mystery"],
        vec![vec![Value::Int(1), Value::from("x")]],
    );

    let mut users: Vec<User> = Vec::new();
    db.find(&mut users).unwrap();
    assert_eq!(users[0].id, 1);
}

#[test]
fn scan_maps_keeps_column_names() {
    let (db, state) = open();
    state.push_rows(
        &["total", "label"],
        vec![
            vec![Value::Int(3), Value::from("a")],
            vec![Value::Int(5), Value::from("b")],
        ],
    );

    let mut maps: Vec<loam::Map> = Vec::new();
    db.table("stats").scan_maps(&mut maps).unwrap();

    assert_eq!(maps.len(), 2);
    assert_eq!(maps[0].get("total"), Some(&Value::Int(3)));
    assert_eq!(maps[1].get("label"), Some(&Value::from("b")));
}

#[test]
fn scan_value_takes_the_first_column_of_the_first_row() {
    let (db, state) = open();
    state.push_rows(&["count"], vec![vec![Value::Int(42)]]);

    let mut value = Value::Null;
    db.raw("SELECT count(*) FROM users", vars![])
        .scan_value(&mut value)
        .unwrap();

    assert_eq!(value, Value::Int(42));
}

#[test]
fn rows_hands_back_the_raw_cursor() {
    let (db, state) = open();
    state.push_rows(&["id"], vec![vec![Value::Int(7)]]);

    let mut rows = db.table("users").rows().unwrap();
    assert_eq!(rows.columns(), vec!["id".to_owned()]);
    assert_eq!(rows.next().unwrap(), Some(vec![Value::Int(7)]));
    assert_eq!(rows.next().unwrap(), None);
}

#[test]
fn per_field_conversion_errors_surface() {
    let (db, state) = open();
    state.push_rows(
        &["id", "name", "age"],
        vec![vec![Value::Int(1), Value::from("a"), Value::from("not-a-number")]],
    );

    let mut users: Vec<User> = Vec::new();
    let err = db.find(&mut users).unwrap_err();
    assert!(err.to_string().contains("cannot convert"));
    // the element scanned before the failing column survives
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].name, "a");
}
