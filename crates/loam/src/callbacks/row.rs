use super::{query, Exec};
use crate::Error;

/// Build and run the query, handing the raw cursor back to the caller
/// instead of scanning it.
pub(super) fn row_query(cx: &mut Exec<'_, '_>) {
    if cx.error.is_some() {
        return;
    }

    if cx.stmt.sql.is_empty() {
        query::build_query_sql(cx);
    }

    if cx.error.is_some() || cx.config.dry_run {
        return;
    }

    match cx.stmt.conn.query(&cx.stmt.sql, &cx.stmt.vars) {
        Ok(rows) => cx.rows_out = Some(rows),
        Err(err) => cx.add_error(err),
    }
}

/// Execute the raw statement buffer.
pub(super) fn raw_exec(cx: &mut Exec<'_, '_>) {
    if cx.error.is_some() {
        return;
    }

    if cx.stmt.sql.is_empty() {
        cx.add_error(Error::invalid_db("raw execution requires SQL"));
        return;
    }

    if cx.config.dry_run {
        return;
    }

    match cx.stmt.conn.exec(&cx.stmt.sql, &cx.stmt.vars) {
        Ok(result) => cx.rows_affected = result.rows_affected,
        Err(err) => cx.add_error(err),
    }
}
