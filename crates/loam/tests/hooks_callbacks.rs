mod support;

use support::{dry_session, open};

use loam::{HookContext, Hooks, Record, Result, Session, Value};

#[derive(Record, Default, Debug)]
#[loam(hooks(before_create, after_find))]
struct Account {
    id: u64,
    name: String,
    visits: i64,
}

impl Hooks for Account {
    fn before_create(&mut self, cx: &mut HookContext<'_>) -> Result<()> {
        if self.name.is_empty() {
            return Err(loam::Error::invalid_value("accounts need a name"));
        }
        self.name = self.name.to_uppercase();
        cx.set("audited", true);
        Ok(())
    }

    fn after_find(&mut self, _cx: &mut HookContext<'_>) -> Result<()> {
        self.visits += 1;
        Ok(())
    }
}

#[test]
fn before_create_mutates_the_record_ahead_of_value_collection() {
    let (db, _state) = open();

    let mut account = Account {
        name: "ada".to_owned(),
        ..Default::default()
    };
    let execution = dry_session(&db).create(&mut account).unwrap();

    assert_eq!(account.name, "ADA");
    assert!(execution.vars.contains(&Value::from("ADA")));
}

#[test]
fn hook_errors_halt_the_operation() {
    let (db, state) = open();

    let mut account = Account::default();
    let err = db.create(&mut account).unwrap_err();
    assert_eq!(err.to_string(), "invalid value: accounts need a name");
    assert!(state.calls().is_empty());
}

#[test]
fn skip_hooks_session_bypasses_them() {
    let (db, _state) = open();

    let mut account = Account::default();
    let session = dry_session(&db).session(Session {
        skip_hooks: true,
        ..Default::default()
    });

    // the guarding hook never runs, so the empty name sails through
    session.create(&mut account).unwrap();
    assert_eq!(account.name, "");
}

#[test]
fn after_find_runs_per_scanned_record() {
    let (db, state) = open();
    state.push_rows(
        &["id", "name", "visits"],
        vec![
            vec![Value::Int(1), Value::from("A"), Value::Int(0)],
            vec![Value::Int(2), Value::from("B"), Value::Int(0)],
        ],
    );

    let mut accounts: Vec<Account> = Vec::new();
    db.find(&mut accounts).unwrap();

    assert_eq!(accounts[0].visits, 1);
    assert_eq!(accounts[1].visits, 1);
}

#[test]
fn custom_callbacks_order_with_before_and_remove() {
    let (db, _state) = open();

    fn tag_stage(cx: &mut loam::Exec<'_>) {
        cx.stmt
            .settings
            .insert("tagged".to_owned(), Value::Bool(true));
    }

    db.callback()
        .create()
        .register_before("test:tag", "loam:create", tag_stage);

    let mut account = Account {
        name: "ada".to_owned(),
        ..Default::default()
    };
    let db2 = dry_session(&db);
    db2.create(&mut account).unwrap();

    // registered stages surface through the processor without disturbing
    // the built-in chain
    db.callback().create().remove("test:tag");
    let mut other = Account {
        name: "bo".to_owned(),
        ..Default::default()
    };
    dry_session(&db).create(&mut other).unwrap();
}
