mod support;

use support::{dry_session, fixed_instant, open, open_without_returning};

use loam::{vars, Record, Value};

use chrono::{DateTime, Utc};

#[derive(Record, Default, Debug)]
struct User {
    id: u64,
    name: String,
    age: i64,
}

#[derive(Record, Default, Debug)]
struct Article {
    id: u64,
    name: String,
    updated_at: DateTime<Utc>,
}

#[test]
fn update_without_where_is_refused_before_io() {
    let (db, state) = open();

    let err = db
        .session(loam::Session {
            now: Some(support::fixed_now()),
            ..Default::default()
        })
        .model::<User>()
        .update("age", 20)
        .unwrap_err();

    assert!(err.is_missing_where_clause());
    assert!(state.calls().is_empty());
}

#[test]
fn delete_without_where_is_refused_before_io() {
    let (db, state) = open();

    let err = db.model::<User>().delete::<User>().unwrap_err();
    assert!(err.is_missing_where_clause());
    assert!(state.calls().is_empty());
}

#[test]
fn allow_global_update_lifts_the_guard() {
    let (db, _state) = open();

    let execution = dry_session(&db)
        .session(loam::Session {
            allow_global_update: true,
            ..Default::default()
        })
        .model::<User>()
        .update("age", 20)
        .unwrap();

    assert_eq!(execution.sql, "UPDATE \"users\" SET \"age\"=$1");
    assert_eq!(execution.vars, vec![Value::Int(20)]);
}

#[test]
fn update_with_where_renders_set_then_where() {
    let (db, _state) = open();

    let execution = dry_session(&db)
        .model::<User>()
        .where_("age < ?", vars![30])
        .update("age", 20)
        .unwrap();

    assert_eq!(
        execution.sql,
        "UPDATE \"users\" SET \"age\"=$1 WHERE age < $2"
    );
    assert_eq!(execution.vars, vec![Value::Int(20), Value::Int(30)]);
}

#[test]
fn update_refreshes_auto_update_time_columns() {
    let (db, _state) = open();

    let execution = dry_session(&db)
        .model::<Article>()
        .where_("id = ?", vars![1])
        .update("name", "b")
        .unwrap();

    assert_eq!(
        execution.sql,
        "UPDATE \"articles\" SET \"name\"=$1,\"updated_at\"=$2 WHERE id = $3"
    );
    assert_eq!(execution.vars[1], Value::Time(fixed_instant()));
}

#[test]
fn updates_record_suppresses_zero_values() {
    let (db, _state) = open();

    let mut values = User {
        id: 5,
        name: "b".to_owned(),
        age: 0,
    };
    let execution = dry_session(&db).updates_record(&mut values).unwrap();

    // the zero age stays out of SET; the primary narrows the statement
    assert_eq!(
        execution.sql,
        "UPDATE \"users\" SET \"name\"=$1 WHERE \"id\" = $2"
    );
    assert_eq!(execution.vars, vec![Value::from("b"), Value::Uint(5)]);
}

#[test]
fn update_track_time_setting_lifts_zero_suppression() {
    let (db, _state) = open();

    let mut values = User {
        id: 5,
        name: "b".to_owned(),
        age: 0,
    };
    let execution = dry_session(&db)
        .set("loam:update_track_time", true)
        .updates_record(&mut values)
        .unwrap();

    assert_eq!(
        execution.sql,
        "UPDATE \"users\" SET \"name\"=$1,\"age\"=$2 WHERE \"id\" = $3"
    );
    assert_eq!(
        execution.vars,
        vec![Value::from("b"), Value::Int(0), Value::Uint(5)]
    );
}

#[test]
fn delete_record_narrows_by_identity() {
    let (db, _state) = open();

    let mut user = User {
        id: 5,
        ..Default::default()
    };
    let execution = dry_session(&db).delete_record(&mut user).unwrap();

    assert_eq!(
        execution.sql,
        "DELETE FROM \"users\" WHERE \"id\" = $1"
    );
    assert_eq!(execution.vars, vec![Value::Uint(5)]);
}

#[test]
fn unscoped_delete_permits_a_full_sweep() {
    let (db, _state) = open();

    let execution = dry_session(&db).unscoped().delete::<User>().unwrap();
    assert_eq!(execution.sql, "DELETE FROM \"users\"");
}

#[test]
fn delete_runs_against_the_pool() {
    let (db, state) = open_without_returning();
    state.push_exec(loam::ExecResult {
        rows_affected: 2,
        last_insert_id: 0,
    });

    let execution = db
        .model::<User>()
        .where_("age > ?", vars![90])
        .delete::<User>()
        .unwrap();

    assert_eq!(execution.rows_affected, 2);
    let calls = state.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "DELETE FROM \"users\" WHERE age > $1");
}
