use super::Exec;
use crate::driver::Conn;
use crate::Value;

const STARTED_TRANSACTION: &str = "loam:started_transaction";
const SAVEPOINT: &str = "loam:savepoint_name";

/// Wrap the write in a transaction. A pool without transaction support runs
/// the statement unwrapped; a statement already inside a transaction nests
/// through a savepoint when the dialect supports them.
pub(super) fn begin_transaction(cx: &mut Exec<'_, '_>) {
    if cx.error.is_some() || cx.config.dry_run {
        return;
    }

    match &cx.stmt.conn {
        Conn::Pool(_) => match cx.stmt.conn.begin() {
            Ok(tx) => {
                cx.stmt.conn = Conn::Tx(tx);
                cx.stmt
                    .settings
                    .insert(STARTED_TRANSACTION.to_owned(), Value::Bool(true));
            }
            Err(err) if err.is_invalid_transaction() => {}
            Err(err) => cx.add_error(err),
        },
        Conn::Tx(tx) => {
            if cx.shared.dialect.supports_savepoints() {
                let name = format!("sp{}", cx.stmt.settings.len());
                match tx.savepoint(&name) {
                    Ok(()) => {
                        cx.stmt
                            .settings
                            .insert(SAVEPOINT.to_owned(), Value::Str(name));
                    }
                    Err(err) => cx.add_error(err),
                }
            }
        }
    }
}

/// Commit on success, roll back on a recorded error, then hand the
/// statement back to the shared pool.
pub(super) fn commit_or_rollback(cx: &mut Exec<'_, '_>) {
    if let Some(Value::Str(name)) = cx.stmt.settings.get(SAVEPOINT).cloned() {
        cx.stmt.settings.shift_remove(SAVEPOINT);
        if cx.error.is_some() {
            if let Some(tx) = cx.stmt.conn.as_tx() {
                if let Err(err) = tx.rollback_to(&name) {
                    cx.add_error(err);
                }
            }
        }
        return;
    }

    if cx
        .stmt
        .settings
        .shift_remove(STARTED_TRANSACTION)
        .is_none()
    {
        return;
    }

    if let Some(tx) = cx.stmt.conn.as_tx() {
        let result = if cx.error.is_some() {
            tx.rollback()
        } else {
            tx.commit()
        };
        if let Err(err) = result {
            cx.add_error(err);
        }
    }

    cx.stmt.conn = cx.base_conn();
}
