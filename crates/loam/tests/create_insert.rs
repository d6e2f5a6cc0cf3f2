mod support;

use support::{dry_session, fixed_instant, open, open_without_returning, open_with, MockDialect};

use loam::driver::ExecResult;
use loam::{Record, Value};

use chrono::{DateTime, Utc};

#[derive(Record, Default, Debug)]
struct User {
    id: u64,
    name: String,
    age: i64,
    created_at: DateTime<Utc>,
}

#[test]
fn insert_builds_returning_for_default_valued_columns() {
    let (db, state) = open();

    let mut user = User {
        name: "a".to_owned(),
        age: 1,
        ..Default::default()
    };
    let execution = dry_session(&db).create(&mut user).unwrap();

    assert_eq!(
        execution.sql,
        "INSERT INTO \"users\" (\"name\",\"age\",\"created_at\") VALUES ($1,$2,$3) RETURNING \"id\""
    );
    assert_eq!(
        execution.vars,
        vec![
            Value::from("a"),
            Value::Int(1),
            Value::Time(fixed_instant()),
        ]
    );
    // auto-create-time wrote back into the record
    assert_eq!(user.created_at, fixed_instant());
    // dry run: nothing reached the pool
    assert!(state.calls().is_empty());
}

#[test]
fn insert_without_returning_support_omits_the_suffix() {
    let (db, _state) = open_without_returning();

    let mut user = User {
        name: "a".to_owned(),
        age: 1,
        ..Default::default()
    };
    let execution = dry_session(&db).create(&mut user).unwrap();

    assert_eq!(
        execution.sql,
        "INSERT INTO \"users\" (\"name\",\"age\",\"created_at\") VALUES ($1,$2,$3)"
    );
}

#[test]
fn batch_insert_renders_one_row_group_per_record() {
    let (db, _state) = open_without_returning();

    let mut users = vec![
        User {
            name: "a".to_owned(),
            age: 1,
            ..Default::default()
        },
        User {
            name: "b".to_owned(),
            age: 2,
            ..Default::default()
        },
    ];
    let execution = dry_session(&db).create_many(&mut users).unwrap();

    assert_eq!(
        execution.sql,
        "INSERT INTO \"users\" (\"name\",\"age\",\"created_at\") VALUES ($1,$2,$3),($4,$5,$6)"
    );
    assert_eq!(execution.vars.len(), 6);
}

#[test]
fn empty_slice_create_is_refused() {
    let (db, state) = open_without_returning();

    let mut users: Vec<User> = Vec::new();
    let err = dry_session(&db).create_many(&mut users).unwrap_err();
    assert_eq!(err.to_string(), "empty slice found");
    assert!(state.calls().is_empty());
}

#[test]
fn last_insert_id_distributes_forward() {
    let (db, state) = open_without_returning();
    state.push_exec(ExecResult {
        rows_affected: 3,
        last_insert_id: 10,
    });

    let session = db.session(loam::Session {
        now: Some(support::fixed_now()),
        ..Default::default()
    });

    let mut users = vec![
        User {
            name: "a".to_owned(),
            ..Default::default()
        },
        User {
            name: "b".to_owned(),
            ..Default::default()
        },
        User {
            name: "c".to_owned(),
            ..Default::default()
        },
    ];
    let execution = session.create_many(&mut users).unwrap();

    assert_eq!(execution.rows_affected, 3);
    let ids: Vec<u64> = users.iter().map(|user| user.id).collect();
    assert_eq!(ids, vec![10, 11, 12]);
}

#[test]
fn last_insert_id_distributes_in_reverse_when_flagged() {
    let (db, state) = open_with(
        MockDialect {
            supports_returning: false,
            last_insert_id_reversed: true,
        },
        false,
    );
    state.push_exec(ExecResult {
        rows_affected: 3,
        last_insert_id: 10,
    });

    let session = db.session(loam::Session {
        now: Some(support::fixed_now()),
        ..Default::default()
    });

    let mut users = vec![
        User {
            name: "a".to_owned(),
            ..Default::default()
        },
        User {
            name: "b".to_owned(),
            ..Default::default()
        },
        User {
            name: "c".to_owned(),
            ..Default::default()
        },
    ];
    session.create_many(&mut users).unwrap();

    let ids: Vec<u64> = users.iter().map(|user| user.id).collect();
    assert_eq!(ids, vec![8, 9, 10]);
}

#[test]
fn returning_insert_scans_ids_back_into_records() {
    let (db, state) = open();
    state.push_rows(&["id"], vec![vec![Value::Int(7)], vec![Value::Int(8)]]);

    let session = db.session(loam::Session {
        now: Some(support::fixed_now()),
        ..Default::default()
    });

    let mut users = vec![
        User {
            name: "a".to_owned(),
            ..Default::default()
        },
        User {
            name: "b".to_owned(),
            ..Default::default()
        },
    ];
    let execution = session.create_many(&mut users).unwrap();

    assert_eq!(execution.rows_affected, 2);
    assert_eq!(users[0].id, 7);
    assert_eq!(users[1].id, 8);

    let calls = state.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].0.ends_with("RETURNING \"id\""));
}

#[test]
fn create_from_map_uses_sorted_columns() {
    let (db, _state) = open_without_returning();

    let mut values = loam::Map::new();
    values.insert("name".to_owned(), Value::from("a"));
    values.insert("age".to_owned(), Value::Int(3));

    let execution = dry_session(&db).create_map::<User>(&mut values).unwrap();
    assert_eq!(
        execution.sql,
        "INSERT INTO \"users\" (\"age\",\"name\") VALUES ($1,$2)"
    );
    assert_eq!(execution.vars, vec![Value::Int(3), Value::from("a")]);
}
