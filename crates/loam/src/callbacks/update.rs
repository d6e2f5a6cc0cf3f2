use super::create::auto_time_value;
use super::{call_hooks, Dest, Exec, HookKind, Map};
use crate::statement::Statement;
use crate::{Error, Value};

use loam_core::clause::{Assignment, Column, Expr, ExprEq, Set, Update, Var, Where};
use loam_core::schema::Record;

use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub(super) fn before_update(cx: &mut Exec<'_, '_>) {
    call_hooks(cx, &[HookKind::BeforeSave, HookKind::BeforeUpdate]);
}

pub(super) fn after_update(cx: &mut Exec<'_, '_>) {
    call_hooks(cx, &[HookKind::AfterUpdate, HookKind::AfterSave]);
}

pub(super) fn update(cx: &mut Exec<'_, '_>) {
    if cx.error.is_some() {
        return;
    }

    if let Some(schema) = cx.stmt.schema.clone() {
        if !cx.stmt.unscoped {
            for contributed in &schema.update_clauses {
                cx.stmt.add_clause_expression(contributed);
            }
        }
    }

    if cx.stmt.sql.is_empty() {
        cx.stmt.add_clause_if_not_exists(Update::default());

        match convert_to_assignments(cx) {
            Ok(set) if set.assignments.is_empty() => {
                cx.add_error(Error::empty_slice());
                return;
            }
            Ok(set) => cx.stmt.add_clause(set),
            Err(err) => {
                cx.add_error(err);
                return;
            }
        }

        add_primary_conditions(cx);

        // The guard runs before any I/O: a global update needs the session
        // flag.
        if !cx.stmt.has_where() && !cx.config.allow_global_update {
            cx.add_error(Error::missing_where_clause());
            return;
        }

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

/// Assemble SET assignments from the update values, filtered by the
/// select/omit lists. Record sources suppress zero values unless a column
/// is explicitly selected.
fn convert_to_assignments(cx: &mut Exec<'_, '_>) -> Result<Set, Error> {
    let now = cx.now();

    let Exec {
        ref mut stmt,
        ref mut dest,
        ..
    } = *cx;

    let (select_columns, restricted) = stmt.select_and_omit_columns(false, true);
    let update_track_time = stmt.settings.get("loam:update_track_time").is_some();
    stmt.settings.shift_remove("loam:update_track_time");

    match dest {
        Dest::OwnedMap(map) => {
            let map = map.clone();
            map_assignments(stmt, &map, &select_columns, restricted, now)
        }
        Dest::Map(map) => {
            let map = map.clone();
            map_assignments(stmt, &map, &select_columns, restricted, now)
        }
        Dest::Record(record) => record_assignments(
            stmt,
            &mut **record,
            &select_columns,
            restricted,
            update_track_time,
            now,
        ),
        _ => Err(Error::invalid_data(
            "update requires a map or record of values",
        )),
    }
}

fn map_assignments(
    stmt: &Statement,
    map: &Map,
    select_columns: &HashMap<String, bool>,
    restricted: bool,
    now: DateTime<Utc>,
) -> Result<Set, Error> {
    let selectable = |name: &str| match select_columns.get(name) {
        Some(selected) => *selected,
        None => !restricted,
    };

    let mut set = Set::default();
    let mut assigned: Vec<String> = Vec::new();

    for (key, value) in map.iter() {
        match stmt
            .schema
            .as_ref()
            .and_then(|schema| schema.look_up_field(key))
        {
            Some(field) => {
                if !field.updatable || !selectable(&field.db_name) {
                    continue;
                }
                let bound = match &field.serializer {
                    Some(serializer) => serializer.value(field, value.clone())?,
                    None => value.clone(),
                };
                assigned.push(field.db_name.clone());
                set.assignments.push(Assignment {
                    column: Column::new(field.db_name.clone()),
                    value: Var::Value(bound),
                });
            }
            None => {
                if selectable(key) {
                    assigned.push(key.clone());
                    set.assignments.push(Assignment {
                        column: Column::new(key.clone()),
                        value: Var::Value(value.clone()),
                    });
                }
            }
        }
    }

    // Auto-update-time columns refresh even when absent from the map.
    if let Some(schema) = &stmt.schema {
        for field in &schema.fields {
            if field.auto_update_time.is_set()
                && field.updatable
                && selectable(&field.db_name)
                && !assigned.contains(&field.db_name)
            {
                set.assignments.push(Assignment {
                    column: Column::new(field.db_name.clone()),
                    value: Var::Value(auto_time_value(field, now)),
                });
            }
        }
    }

    Ok(set)
}

fn record_assignments(
    stmt: &Statement,
    record: &mut dyn Record,
    select_columns: &HashMap<String, bool>,
    restricted: bool,
    update_track_time: bool,
    now: DateTime<Utc>,
) -> Result<Set, Error> {
    let schema = stmt
        .schema
        .clone()
        .ok_or_else(|| Error::unsupported_data_type("update requires a parsed schema"))?;

    let selectable = |name: &str| match select_columns.get(name) {
        Some(selected) => *selected,
        None => !restricted,
    };

    let mut set = Set::default();

    for field in &schema.fields {
        if field.db_name.is_empty() || field.primary_key {
            continue;
        }
        if !field.updatable || !selectable(&field.db_name) {
            continue;
        }

        if field.auto_update_time.is_set() {
            field.set(record, Value::Time(now))?;
            set.assignments.push(Assignment {
                column: Column::new(field.db_name.clone()),
                value: Var::Value(field.db_value(record)?),
            });
            continue;
        }

        // Zero values stay out of SET unless the update_track_time setting
        // is present or the column is explicitly selected.
        let (_, is_zero) = field.value_of(record);
        let explicitly_selected = select_columns.get(&field.db_name).copied().unwrap_or(false);
        if !is_zero || update_track_time || explicitly_selected {
            set.assignments.push(Assignment {
                column: Column::new(field.db_name.clone()),
                value: Var::Value(field.db_value(record)?),
            });
        }
    }

    Ok(set)
}

/// A record destination with a populated primary narrows the update to
/// that row.
fn add_primary_conditions(cx: &mut Exec<'_, '_>) {
    let Some(schema) = cx.stmt.schema.clone() else {
        return;
    };
    let Dest::Record(record) = &cx.dest else {
        return;
    };

    let mut conds: Vec<Expr> = Vec::new();
    for field in &schema.primary_fields {
        let (value, is_zero) = field.value_of(&**record as &dyn Record);
        if !is_zero {
            conds.push(Expr::Eq(ExprEq {
                column: Column::new(field.db_name.clone()),
                value,
            }));
        }
    }

    if !conds.is_empty() {
        cx.stmt.add_clause(Where { exprs: conds });
    }
}
