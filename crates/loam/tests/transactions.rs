mod support;

use support::{open_with, MockDialect};

use loam::driver::ExecResult;
use loam::{Error, Record, Session};

#[derive(Record, Default, Debug)]
struct User {
    id: u64,
    name: String,
}

fn tx_db() -> (loam::Db, std::sync::Arc<support::MockState>) {
    open_with(
        MockDialect {
            supports_returning: false,
            ..Default::default()
        },
        true,
    )
}

#[test]
fn create_wraps_in_a_transaction_and_commits() {
    let (db, state) = tx_db();
    state.push_exec(ExecResult {
        rows_affected: 1,
        last_insert_id: 1,
    });

    let mut user = User {
        name: "a".to_owned(),
        ..Default::default()
    };
    db.create(&mut user).unwrap();

    assert_eq!(state.tx_log(), vec!["begin", "commit"]);
}

#[test]
fn driver_errors_roll_back() {
    let (db, state) = tx_db();
    state.push_exec_error(Error::driver("disk is full"));

    let mut user = User {
        name: "a".to_owned(),
        ..Default::default()
    };
    let err = db.create(&mut user).unwrap_err();

    assert!(err.to_string().contains("disk is full"));
    assert_eq!(state.tx_log(), vec!["begin", "rollback"]);
}

#[test]
fn skip_default_transaction_runs_bare() {
    let (db, state) = tx_db();
    state.push_exec(ExecResult {
        rows_affected: 1,
        last_insert_id: 1,
    });

    let session = db.session(Session {
        skip_default_transaction: true,
        ..Default::default()
    });

    let mut user = User {
        name: "a".to_owned(),
        ..Default::default()
    };
    session.create(&mut user).unwrap();

    assert!(state.tx_log().is_empty());
}

#[test]
fn pools_without_transactions_run_unwrapped() {
    let (db, state) = open_with(
        MockDialect {
            supports_returning: false,
            ..Default::default()
        },
        false,
    );
    state.push_exec(ExecResult {
        rows_affected: 1,
        last_insert_id: 1,
    });

    let mut user = User {
        name: "a".to_owned(),
        ..Default::default()
    };
    db.create(&mut user).unwrap();

    assert!(state.tx_log().is_empty());
    assert_eq!(state.calls().len(), 1);
}
