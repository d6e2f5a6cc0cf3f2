#![allow(dead_code)]

use loam::driver::{ConnPool, Dialect, ExecResult, PreparedStatement, Rows, Tx};
use loam::schema::Field;
use loam::{callbacks, Config, Db, Error, NowFn, Result, Session, Statement, Value};

use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Scripted driver state shared between the pool handed to `Db::open` and
/// the test's assertions.
#[derive(Default)]
pub struct MockState {
    /// Every exec/query in dispatch order: (sql, vars).
    pub calls: Mutex<Vec<(String, Vec<Value>)>>,
    pub exec_results: Mutex<VecDeque<Result<ExecResult>>>,
    pub query_results: Mutex<VecDeque<(Vec<String>, Vec<Vec<Value>>)>>,
    /// begin/commit/rollback/savepoint events.
    pub tx_log: Mutex<Vec<String>>,
    /// SQL strings prepared through the statement cache.
    pub prepared: Mutex<Vec<String>>,
    pub support_tx: bool,
}

impl MockState {
    pub fn push_exec(&self, result: ExecResult) {
        self.exec_results.lock().unwrap().push_back(Ok(result));
    }

    pub fn push_exec_error(&self, err: Error) {
        self.exec_results.lock().unwrap().push_back(Err(err));
    }

    pub fn push_rows(&self, columns: &[&str], rows: Vec<Vec<Value>>) {
        self.query_results
            .lock()
            .unwrap()
            .push_back((columns.iter().map(|c| c.to_string()).collect(), rows));
    }

    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn tx_log(&self) -> Vec<String> {
        self.tx_log.lock().unwrap().clone()
    }

    fn record(&self, sql: &str, vars: &[Value]) {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_owned(), vars.to_vec()));
    }

    fn next_exec(&self) -> Result<ExecResult> {
        self.exec_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ExecResult::default()))
    }

    fn next_rows(&self) -> Box<dyn Rows> {
        let (columns, rows) = self
            .query_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        Box::new(MockRows {
            columns,
            rows: rows.into(),
        })
    }
}

pub struct MockRows {
    columns: Vec<String>,
    rows: VecDeque<Vec<Value>>,
}

impl Rows for MockRows {
    fn columns(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn next(&mut self) -> Result<Option<Vec<Value>>> {
        Ok(self.rows.pop_front())
    }
}

pub struct MockPool {
    pub state: Arc<MockState>,
}

impl ConnPool for MockPool {
    fn exec(&self, sql: &str, vars: &[Value]) -> Result<ExecResult> {
        self.state.record(sql, vars);
        self.state.next_exec()
    }

    fn query(&self, sql: &str, vars: &[Value]) -> Result<Box<dyn Rows>> {
        self.state.record(sql, vars);
        Ok(self.state.next_rows())
    }

    fn prepare(&self, sql: &str) -> Result<Arc<dyn PreparedStatement>> {
        self.state.prepared.lock().unwrap().push(sql.to_owned());
        Ok(Arc::new(MockPrepared {
            sql: sql.to_owned(),
            state: self.state.clone(),
        }))
    }

    fn begin(&self) -> Result<Arc<dyn Tx>> {
        if !self.state.support_tx {
            return Err(Error::invalid_transaction("mock pool has no transactions"));
        }
        self.state.tx_log.lock().unwrap().push("begin".to_owned());
        Ok(Arc::new(MockTx {
            state: self.state.clone(),
        }))
    }
}

pub struct MockPrepared {
    sql: String,
    state: Arc<MockState>,
}

impl PreparedStatement for MockPrepared {
    fn exec(&self, vars: &[Value]) -> Result<ExecResult> {
        self.state.record(&self.sql, vars);
        self.state.next_exec()
    }

    fn query(&self, vars: &[Value]) -> Result<Box<dyn Rows>> {
        self.state.record(&self.sql, vars);
        Ok(self.state.next_rows())
    }
}

pub struct MockTx {
    state: Arc<MockState>,
}

impl ConnPool for MockTx {
    fn exec(&self, sql: &str, vars: &[Value]) -> Result<ExecResult> {
        self.state.record(sql, vars);
        self.state.next_exec()
    }

    fn query(&self, sql: &str, vars: &[Value]) -> Result<Box<dyn Rows>> {
        self.state.record(sql, vars);
        Ok(self.state.next_rows())
    }
}

impl Tx for MockTx {
    fn commit(&self) -> Result<()> {
        self.state.tx_log.lock().unwrap().push("commit".to_owned());
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.state.tx_log.lock().unwrap().push("rollback".to_owned());
        Ok(())
    }
}

/// Placeholder dialect: `$N` binds, double-quote quoting, RETURNING and
/// reversed-id behavior configurable per test.
pub struct MockDialect {
    pub supports_returning: bool,
    pub last_insert_id_reversed: bool,
}

impl Default for MockDialect {
    fn default() -> Self {
        Self {
            supports_returning: true,
            last_insert_id_reversed: false,
        }
    }
}

impl Dialect for MockDialect {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn initialize(&self, db: &mut Db) -> Result<()> {
        let mut config = callbacks::Config {
            last_insert_id_reversed: self.last_insert_id_reversed,
            ..Default::default()
        };
        if self.supports_returning {
            config.create_clauses = vec!["INSERT", "VALUES", "ON CONFLICT", "RETURNING"];
        }
        loam::register_default_callbacks(db, config);
        Ok(())
    }

    fn data_type_of(&self, field: &Field) -> String {
        use loam::schema::DataType;

        match field.data_type.as_ref() {
            Some(DataType::Bool) => "boolean".to_owned(),
            Some(DataType::Int) | Some(DataType::Uint) => "bigint".to_owned(),
            Some(DataType::Float) => "double precision".to_owned(),
            Some(DataType::Time) => "timestamptz".to_owned(),
            Some(DataType::Bytes) => "bytea".to_owned(),
            Some(DataType::Custom(native)) => native.clone(),
            _ => "text".to_owned(),
        }
    }

    fn bind_var_to(&self, writer: &mut String, _stmt: &Statement, var_count: usize) {
        writer.push('$');
        writer.push_str(&var_count.to_string());
    }

    fn quote_to(&self, writer: &mut String, ident: &str) {
        writer.push('"');
        writer.push_str(ident);
        writer.push('"');
    }

    fn explain(&self, sql: &str, vars: &[Value]) -> String {
        let mut out = sql.to_owned();
        for (idx, var) in vars.iter().enumerate().rev() {
            out = out.replace(&format!("${}", idx + 1), &var.to_string());
        }
        out
    }
}

pub fn fixed_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
}

pub fn fixed_now() -> NowFn {
    Arc::new(|| fixed_instant())
}

/// A handle over the default (RETURNING-capable) dialect plus its scripted
/// state.
pub fn open() -> (Db, Arc<MockState>) {
    open_with(MockDialect::default(), false)
}

pub fn open_without_returning() -> (Db, Arc<MockState>) {
    open_with(
        MockDialect {
            supports_returning: false,
            ..Default::default()
        },
        false,
    )
}

pub fn open_with(dialect: MockDialect, support_tx: bool) -> (Db, Arc<MockState>) {
    let state = Arc::new(MockState {
        support_tx,
        ..Default::default()
    });
    let db = Db::open(
        dialect,
        MockPool {
            state: state.clone(),
        },
        Config::default(),
    )
    .unwrap();
    (db, state)
}

/// A dry-run session pinned to the fixed clock.
pub fn dry_session(db: &Db) -> Db {
    db.session(Session {
        dry_run: true,
        now: Some(fixed_now()),
        ..Default::default()
    })
}
