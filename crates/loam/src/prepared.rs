use crate::driver::{ConnPool, ExecResult, PreparedStatement, Rows, Tx};
use crate::{Result, Value};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Pool wrapper caching prepared statements by canonical SQL.
///
/// The cache is shared across sessions of one handle; closing it closes and
/// drops every cached statement. The preparation list records first-prepare
/// order for diagnostics.
pub struct PreparedStmtDb {
    pool: Arc<dyn ConnPool>,
    stmts: RwLock<HashMap<String, Arc<dyn PreparedStatement>>>,
    prepared_sql: Mutex<Vec<String>>,
}

impl PreparedStmtDb {
    pub fn new(pool: Arc<dyn ConnPool>) -> Self {
        Self {
            pool,
            stmts: RwLock::new(HashMap::new()),
            prepared_sql: Mutex::new(Vec::new()),
        }
    }

    fn statement(&self, sql: &str) -> Result<Arc<dyn PreparedStatement>> {
        if let Some(stmt) = self
            .stmts
            .read()
            .expect("prepared statement cache poisoned")
            .get(sql)
        {
            return Ok(stmt.clone());
        }

        let mut stmts = self
            .stmts
            .write()
            .expect("prepared statement cache poisoned");
        // Racing writers: the loser reuses the winner's handle.
        if let Some(stmt) = stmts.get(sql) {
            return Ok(stmt.clone());
        }

        let stmt = self.pool.prepare(sql)?;
        stmts.insert(sql.to_owned(), stmt.clone());
        self.prepared_sql
            .lock()
            .expect("prepared statement list poisoned")
            .push(sql.to_owned());
        Ok(stmt)
    }

    /// SQL strings in first-preparation order.
    pub fn prepared_sql(&self) -> Vec<String> {
        self.prepared_sql
            .lock()
            .expect("prepared statement list poisoned")
            .clone()
    }

    /// Close and drop every cached statement.
    pub fn close(&self) {
        let mut stmts = self
            .stmts
            .write()
            .expect("prepared statement cache poisoned");
        for stmt in stmts.values() {
            stmt.close();
        }
        stmts.clear();
        self.prepared_sql
            .lock()
            .expect("prepared statement list poisoned")
            .clear();
    }
}

impl ConnPool for PreparedStmtDb {
    fn exec(&self, sql: &str, vars: &[Value]) -> Result<ExecResult> {
        self.statement(sql)?.exec(vars)
    }

    fn query(&self, sql: &str, vars: &[Value]) -> Result<Box<dyn Rows>> {
        self.statement(sql)?.query(vars)
    }

    fn prepare(&self, sql: &str) -> Result<Arc<dyn PreparedStatement>> {
        self.statement(sql)
    }

    fn begin(&self) -> Result<Arc<dyn Tx>> {
        self.pool.begin()
    }
}
