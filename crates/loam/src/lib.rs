//! A fluent, schema-driven ORM engine.
//!
//! A user-defined record type plus a chain of fluent query modifiers turns
//! into a parameterized SQL statement, dispatched through an abstracted
//! connection pool; result rows reassemble back into the record type.

pub mod callbacks;
pub mod driver;
pub mod prepared;
pub mod statement;

mod db;
mod scan;

pub use callbacks::{register_default_callbacks, Dest, Exec, Map, Op};
pub use db::{Config, Db, DbShared, Execution, NowFn, Session, StatementClone};
pub use driver::{ConnPool, Dialect, ExecResult, PreparedStatement, Rows, Tx};
pub use statement::Statement;

pub use loam_core::clause;
pub use loam_core::schema;
pub use loam_core::{Error, NamingStrategy, Value};

/// A Result type alias that uses loam's [`Error`] type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

// The trait and its derive share a name, as serde does it.
pub use loam_core::schema::{HookContext, Hooks, Record};
pub use loam_macros::Record;

/// Build a `Vec<Value>` of bound variables from mixed literals.
///
/// ```ignore
/// db.where_("age > ? AND name = ?", vars![18, "a"]);
/// ```
#[macro_export]
macro_rules! vars {
    () => { Vec::<$crate::Value>::new() };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::Value::from($value)),+]
    };
}
