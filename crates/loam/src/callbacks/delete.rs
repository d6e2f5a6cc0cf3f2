use super::{call_hooks, Dest, Exec, HookKind};
use crate::Error;

use loam_core::clause::{Column, Delete, Expr, ExprAnd, ExprEq, ExprIn, From, Where};
use loam_core::schema::Record;

pub(super) fn before_delete(cx: &mut Exec<'_, '_>) {
    call_hooks(cx, &[HookKind::BeforeDelete]);
}

pub(super) fn after_delete(cx: &mut Exec<'_, '_>) {
    call_hooks(cx, &[HookKind::AfterDelete]);
}

pub(super) fn delete(cx: &mut Exec<'_, '_>) {
    if cx.error.is_some() {
        return;
    }

    if let Some(schema) = cx.stmt.schema.clone() {
        if !cx.stmt.unscoped {
            for contributed in &schema.delete_clauses {
                cx.stmt.add_clause_expression(contributed);
            }
        }
    }

    if cx.stmt.sql.is_empty() {
        cx.stmt.add_clause_if_not_exists(Delete::default());

        add_primary_conditions(cx);

        // No WHERE, no unscoped, no global flag: refuse before any I/O.
        if !cx.stmt.has_where() && !cx.stmt.unscoped && !cx.config.allow_global_update {
            cx.add_error(Error::missing_where_clause());
            return;
        }

        cx.stmt.add_clause_if_not_exists(From::default());

        let names = cx.stmt.build_clauses.clone();
        cx.stmt.build(&names);
        cx.collect_stmt_errors();
    }

    if cx.error.is_some() || cx.config.dry_run {
        return;
    }

    match cx.stmt.conn.exec(&cx.stmt.sql, &cx.stmt.vars) {
        Ok(result) => cx.rows_affected = result.rows_affected,
        Err(err) => cx.add_error(err),
    }
}

/// Narrow the delete to the destination records' identities.
fn add_primary_conditions(cx: &mut Exec<'_, '_>) {
    let Some(schema) = cx.stmt.schema.clone() else {
        return;
    };
    if schema.primary_fields.is_empty() {
        return;
    }

    let records: Vec<&dyn Record> = match &cx.dest {
        Dest::Record(record) => vec![&**record],
        Dest::Records(records) => (0..records.len()).map(|idx| records.get(idx)).collect(),
        _ => return,
    };

    let conds: Vec<Expr> = if schema.primary_fields.len() == 1 {
        let field = &schema.primary_fields[0];
        let values: Vec<_> = records
            .iter()
            .filter_map(|record| {
                let (value, is_zero) = field.value_of(*record);
                (!is_zero).then_some(value)
            })
            .collect();
        if values.is_empty() {
            return;
        }
        vec![Expr::In(ExprIn {
            column: Column::new(field.db_name.clone()),
            values,
        })]
    } else {
        // Composite primaries: one conjunction per record.
        let mut per_record: Vec<Expr> = Vec::new();
        for record in &records {
            let eqs: Vec<Expr> = schema
                .primary_fields
                .iter()
                .filter_map(|field| {
                    let (value, is_zero) = field.value_of(*record);
                    (!is_zero).then(|| {
                        Expr::Eq(ExprEq {
                            column: Column::new(field.db_name.clone()),
                            value,
                        })
                    })
                })
                .collect();
            if eqs.len() == schema.primary_fields.len() {
                per_record.push(Expr::And(ExprAnd { exprs: eqs }));
            }
        }
        if per_record.is_empty() {
            return;
        }
        per_record
    };

    cx.stmt.add_clause(Where { exprs: conds });
}
