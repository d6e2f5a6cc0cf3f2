use crate::statement::Statement;
use crate::{Error, Result, Value};

use loam_core::clause::Expr;
use loam_core::schema::Field;

use std::sync::Arc;

/// Result of a write operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Driver-reported id of the (first or last, per dialect) inserted row;
    /// zero or negative when unavailable.
    pub last_insert_id: i64,
}

/// A forward-only result cursor. Rows deliver in driver order.
pub trait Rows: Send {
    fn columns(&self) -> Vec<String>;

    /// The next row's values, left-to-right, or `None` when exhausted.
    fn next(&mut self) -> Result<Option<Vec<Value>>>;
}

/// The abstracted connection pool the engine dispatches through. Calls
/// block; cancellation is the driver's concern.
pub trait ConnPool: Send + Sync {
    fn exec(&self, sql: &str, vars: &[Value]) -> Result<ExecResult>;

    fn query(&self, sql: &str, vars: &[Value]) -> Result<Box<dyn Rows>>;

    fn query_row(&self, sql: &str, vars: &[Value]) -> Result<Option<Vec<Value>>> {
        let mut rows = self.query(sql, vars)?;
        rows.next()
    }

    /// Prepare a reusable statement handle.
    fn prepare(&self, _sql: &str) -> Result<Arc<dyn PreparedStatement>> {
        Err(Error::invalid_db("pool does not support prepared statements"))
    }

    /// Open a transaction. Pools without transaction support return
    /// `invalid-transaction`, which the default-transaction stage treats as
    /// "run unwrapped".
    fn begin(&self) -> Result<Arc<dyn Tx>> {
        Err(Error::invalid_transaction("pool does not support transactions"))
    }
}

/// A prepared statement handle.
pub trait PreparedStatement: Send + Sync {
    fn exec(&self, vars: &[Value]) -> Result<ExecResult>;

    fn query(&self, vars: &[Value]) -> Result<Box<dyn Rows>>;

    fn close(&self) {}
}

/// A transactional connection. Implementations use interior mutability;
/// commit and rollback invalidate the handle.
pub trait Tx: ConnPool {
    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;

    fn savepoint(&self, _name: &str) -> Result<()> {
        Err(Error::invalid_transaction("driver does not support savepoints"))
    }

    fn rollback_to(&self, _name: &str) -> Result<()> {
        Err(Error::invalid_transaction("driver does not support savepoints"))
    }
}

/// The database dialect adapter: quoting, placeholder syntax, type mapping,
/// and callback registration.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Register default callbacks and configure pool wrappers on a freshly
    /// opened handle.
    fn initialize(&self, db: &mut crate::Db) -> Result<()>;

    /// Native column type for a field.
    fn data_type_of(&self, field: &Field) -> String;

    /// Expression standing in for a database-assigned default.
    fn default_value_of(&self, _field: &Field) -> Expr {
        Expr::raw("DEFAULT", vec![])
    }

    /// Append the dialect's bind placeholder. `var_count` includes the
    /// variable being bound.
    fn bind_var_to(&self, writer: &mut String, stmt: &Statement, var_count: usize);

    /// Append a quoted identifier.
    fn quote_to(&self, writer: &mut String, ident: &str);

    /// Render a human-readable expansion of a statement for dry-run output.
    fn explain(&self, sql: &str, vars: &[Value]) -> String;

    fn supports_savepoints(&self) -> bool {
        false
    }

    /// Translate a driver-native error into an application kind
    /// (duplicated-key, foreign-key-violated, ...).
    fn translate_error(&self, err: Error) -> Error {
        err
    }
}

/// The connection the current statement runs on: the shared pool, or a
/// transaction opened by the transaction stage.
#[derive(Clone)]
pub(crate) enum Conn {
    Pool(Arc<dyn ConnPool>),
    Tx(Arc<dyn Tx>),
}

impl Conn {
    pub(crate) fn exec(&self, sql: &str, vars: &[Value]) -> Result<ExecResult> {
        tracing::debug!(sql, vars = vars.len(), "exec");
        match self {
            Self::Pool(pool) => pool.exec(sql, vars),
            Self::Tx(tx) => tx.exec(sql, vars),
        }
    }

    pub(crate) fn query(&self, sql: &str, vars: &[Value]) -> Result<Box<dyn Rows>> {
        tracing::debug!(sql, vars = vars.len(), "query");
        match self {
            Self::Pool(pool) => pool.query(sql, vars),
            Self::Tx(tx) => tx.query(sql, vars),
        }
    }

    pub(crate) fn begin(&self) -> Result<Arc<dyn Tx>> {
        match self {
            Self::Pool(pool) => pool.begin(),
            Self::Tx(tx) => tx.begin(),
        }
    }

    pub(crate) fn as_tx(&self) -> Option<&Arc<dyn Tx>> {
        match self {
            Self::Tx(tx) => Some(tx),
            Self::Pool(_) => None,
        }
    }
}
