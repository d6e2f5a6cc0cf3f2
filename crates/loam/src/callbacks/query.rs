use super::{call_hooks, Exec, HookKind};
use crate::scan;

use loam_core::clause::{Column, Expr, From, Select};

pub(super) fn query(cx: &mut Exec<'_, '_>) {
    if cx.error.is_some() {
        return;
    }

    if cx.stmt.sql.is_empty() {
        build_query_sql(cx);
    }

    if cx.error.is_some() || cx.config.dry_run {
        return;
    }

    match cx.stmt.conn.query(&cx.stmt.sql, &cx.stmt.vars) {
        Ok(rows) => scan::scan(rows, cx, 0),
        Err(err) => cx.add_error(err),
    }
}

pub(super) fn after_query(cx: &mut Exec<'_, '_>) {
    call_hooks(cx, &[HookKind::AfterFind]);
}

/// Assemble SELECT/FROM plus whatever the chain accumulated, honoring the
/// schema-contributed query clauses.
pub(super) fn build_query_sql(cx: &mut Exec<'_, '_>) {
    if let Some(schema) = cx.stmt.schema.clone() {
        if !cx.stmt.unscoped {
            for contributed in &schema.query_clauses {
                cx.stmt.add_clause_expression(contributed);
            }
        }
    }

    let select = selection(cx);
    cx.stmt.add_clause_if_not_exists(select);

    let from = From {
        tables: Vec::new(),
        joins: cx.stmt.joins.clone(),
    };
    cx.stmt.add_clause_if_not_exists(from);

    let names = cx.stmt.build_clauses.clone();
    cx.stmt.build(&names);
    cx.collect_stmt_errors();
}

fn selection(cx: &Exec<'_, '_>) -> Select {
    let selects = &cx.stmt.selects;

    // Selections containing expressions are emitted verbatim rather than
    // quoted as identifiers.
    if selects
        .iter()
        .any(|column| column.contains('(') || column.contains(' ') || column == "*")
    {
        return Select {
            distinct: cx.stmt.distinct,
            columns: Vec::new(),
            expression: Some(Expr::raw(selects.join(","), Vec::new())),
        };
    }

    Select {
        distinct: cx.stmt.distinct,
        columns: selects.iter().map(Column::new).collect(),
        expression: None,
    }
}
