use super::{call_hooks, Dest, Exec, HookKind, Map};
use crate::scan;
use crate::statement::Statement;
use crate::{Error, Value};

use loam_core::clause::{
    Assignment, ClauseExpression, Column, Insert, OnConflict, Returning, Values, Var,
};
use loam_core::schema::{Field, Record, Schema, TimeMode};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::sync::Arc;

pub(super) fn before_create(cx: &mut Exec<'_, '_>) {
    call_hooks(cx, &[HookKind::BeforeSave, HookKind::BeforeCreate]);
}

pub(super) fn after_create(cx: &mut Exec<'_, '_>) {
    call_hooks(cx, &[HookKind::AfterCreate, HookKind::AfterSave]);
}

pub(super) fn create(cx: &mut Exec<'_, '_>) {
    if cx.error.is_some() {
        return;
    }

    let support_returning = cx.stmt.build_clauses.contains(&"RETURNING");

    if let Some(schema) = cx.stmt.schema.clone() {
        if !cx.stmt.unscoped {
            for contributed in &schema.create_clauses {
                cx.stmt.add_clause_expression(contributed);
            }
        }

        // With RETURNING available, ask the database for every column it
        // assigns itself.
        if support_returning && !schema.fields_with_default_db_value.is_empty() {
            let occupied = cx
                .stmt
                .clauses
                .get("RETURNING")
                .map(|slot| slot.expression.is_some())
                .unwrap_or(false);
            if !occupied {
                let columns = schema
                    .fields_with_default_db_value
                    .iter()
                    .map(|field| Column::new(field.db_name.clone()))
                    .collect();
                cx.stmt.add_clause(Returning { columns });
            }
        }
    }

    if cx.stmt.sql.is_empty() {
        cx.stmt.add_clause_if_not_exists(Insert::default());

        match convert_to_create_values(cx) {
            Ok(values) => {
                cx.stmt.add_clause(values);
                let names = cx.stmt.build_clauses.clone();
                cx.stmt.build(&names);
                cx.collect_stmt_errors();
            }
            Err(err) => {
                cx.add_error(err);
                return;
            }
        }
    }

    if cx.error.is_some() || cx.config.dry_run {
        return;
    }

    let has_returning = support_returning
        && cx
            .stmt
            .clauses
            .get("RETURNING")
            .map(|slot| slot.expression.is_some())
            .unwrap_or(false);

    if has_returning {
        let mut mode = scan::UPDATE;
        if let Some(slot) = cx.stmt.clauses.get("ON CONFLICT") {
            if let Some(ClauseExpression::OnConflict(on_conflict)) = &slot.expression {
                if on_conflict.do_nothing {
                    mode |= scan::ON_CONFLICT_DO_NOTHING;
                }
            }
        }

        match cx.stmt.conn.query(&cx.stmt.sql, &cx.stmt.vars) {
            Ok(rows) => scan::scan(rows, cx, mode),
            Err(err) => cx.add_error(err),
        }
        return;
    }

    match cx.stmt.conn.exec(&cx.stmt.sql, &cx.stmt.vars) {
        Ok(result) => {
            cx.rows_affected = result.rows_affected;
            distribute_insert_id(cx, result.last_insert_id);
        }
        Err(err) => cx.add_error(err),
    }
}

/// Hand the driver-reported insert id back to records whose primary is
/// still zero, stepping by the configured increment. Direction comes from
/// the dialect flag, never inferred.
fn distribute_insert_id(cx: &mut Exec<'_, '_>, insert_id: i64) {
    if cx.rows_affected == 0 || insert_id <= 0 {
        return;
    }
    let Some(schema) = cx.stmt.schema.clone() else {
        return;
    };
    let Some(primary) = schema.prioritized_primary_field.clone() else {
        return;
    };
    if !primary.has_default_value {
        return;
    }

    let step = primary.auto_increment_increment;
    let reversed = cx.cb_config.last_insert_id_reversed;
    let mut errors = Vec::new();

    match &mut cx.dest {
        Dest::Record(record) => {
            let (_, zero) = primary.value_of(&**record);
            if zero {
                if let Err(err) = primary.set(&mut **record, Value::Int(insert_id)) {
                    errors.push(err);
                }
            }
        }
        Dest::Records(records) => {
            let mut id = insert_id;
            let indexes: Vec<usize> = if reversed {
                (0..records.len()).rev().collect()
            } else {
                (0..records.len()).collect()
            };

            for idx in indexes {
                let record = records.get_mut(idx);
                let (_, zero) = primary.value_of(record);
                if zero {
                    if let Err(err) = primary.set(record, Value::Int(id)) {
                        errors.push(err);
                        break;
                    }
                    if reversed {
                        id -= step;
                    } else {
                        id += step;
                    }
                }
            }
        }
        _ => {}
    }

    for err in errors {
        cx.add_error(err);
    }
}

/// Collect the VALUES clause by walking the destination, substituting
/// declared defaults and auto-now timestamps for zero values.
fn convert_to_create_values(cx: &mut Exec<'_, '_>) -> Result<Values, Error> {
    let now = cx.now();
    let dialect = cx.shared.dialect.clone();

    let Exec {
        ref mut stmt,
        ref mut dest,
        ..
    } = *cx;

    let mut values = match dest {
        Dest::Map(map) => convert_map_values(stmt, map),
        Dest::Maps(maps) => convert_map_slice_values(stmt, maps),
        Dest::Record(record) => {
            let schema = require_schema(stmt)?;
            convert_record_values(
                stmt,
                &schema,
                &dialect,
                now,
                &mut RecordRows::One(&mut **record),
            )?
        }
        Dest::Records(records) => {
            if records.is_empty() {
                return Err(Error::empty_slice());
            }
            let schema = require_schema(stmt)?;
            convert_record_values(
                stmt,
                &schema,
                &dialect,
                now,
                &mut RecordRows::Many(&mut **records),
            )?
        }
        _ => return Err(Error::invalid_data("create requires a record or map")),
    };

    expand_on_conflict_update_all(stmt, &mut values, now);
    Ok(values)
}

fn require_schema(stmt: &Statement) -> Result<Arc<Schema>, Error> {
    stmt.schema
        .clone()
        .ok_or_else(|| Error::unsupported_data_type("create requires a parsed schema"))
}

enum RecordRows<'a> {
    One(&'a mut dyn Record),
    Many(&'a mut dyn loam_core::schema::RecordList),
}

impl RecordRows<'_> {
    fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(records) => records.len(),
        }
    }

    fn get_mut(&mut self, idx: usize) -> &mut dyn Record {
        match self {
            Self::One(record) => &mut **record,
            Self::Many(records) => records.get_mut(idx),
        }
    }
}

fn convert_map_values(stmt: &mut Statement, map: &Map) -> Values {
    let (select_columns, restricted) = stmt.select_and_omit_columns(true, false);

    let mut values = Values::default();
    let mut row = Vec::new();

    for (key, value) in map.iter() {
        let column = match &stmt.schema {
            Some(schema) => schema
                .look_up_field(key)
                .map(|field| field.db_name.clone())
                .unwrap_or_else(|| key.clone()),
            None => key.clone(),
        };

        let included = match select_columns.get(&column) {
            Some(selected) => *selected,
            None => !restricted,
        };
        if included {
            values.columns.push(Column::new(column));
            row.push(Var::Value(value.clone()));
        }
    }

    values.values.push(row);
    values
}

fn convert_map_slice_values(stmt: &mut Statement, maps: &[Map]) -> Values {
    let (select_columns, restricted) = stmt.select_and_omit_columns(true, false);

    // Union of keys across all rows, resolved to column names.
    let mut columns: Vec<String> = Vec::new();
    let mut keys_by_column: IndexMap<String, String> = IndexMap::new();
    for map in maps {
        for key in map.keys() {
            let column = match &stmt.schema {
                Some(schema) => schema
                    .look_up_field(key)
                    .map(|field| field.db_name.clone())
                    .unwrap_or_else(|| key.clone()),
                None => key.clone(),
            };
            if !keys_by_column.contains_key(&column) {
                let included = match select_columns.get(&column) {
                    Some(selected) => *selected,
                    None => !restricted,
                };
                if included {
                    columns.push(column.clone());
                    keys_by_column.insert(column, key.clone());
                }
            }
        }
    }
    columns.sort();

    let mut values = Values {
        columns: columns.iter().map(Column::new).collect(),
        values: Vec::with_capacity(maps.len()),
    };

    for map in maps {
        let row = columns
            .iter()
            .map(|column| {
                let key = keys_by_column.get(column).expect("column has a source key");
                Var::Value(map.get(key).cloned().unwrap_or(Value::Null))
            })
            .collect();
        values.values.push(row);
    }

    values
}

fn convert_record_values(
    stmt: &mut Statement,
    schema: &Arc<Schema>,
    dialect: &Arc<dyn crate::driver::Dialect>,
    now: DateTime<Utc>,
    rows: &mut RecordRows<'_>,
) -> Result<Values, Error> {
    let (select_columns, restricted) = stmt.select_and_omit_columns(true, false);
    let update_track_time = stmt.settings.get("loam:update_track_time").is_some();
    stmt.settings.shift_remove("loam:update_track_time");

    let mut values = Values::default();
    let mut column_fields: Vec<Arc<Field>> = Vec::new();

    for db_name in &schema.db_names {
        let field = &schema.fields_by_db_name[db_name];
        if field.has_default_value && field.default_value_parsed.is_none() {
            continue;
        }

        let included = match select_columns.get(db_name) {
            Some(selected) => *selected,
            None => {
                !restricted || field.auto_create_time.is_set() || field.auto_update_time.is_set()
            }
        };
        if included {
            values.columns.push(Column::new(db_name));
            column_fields.push(field.clone());
        }
    }

    let row_count = rows.len();
    // Database-defaulted fields that carry an explicit value in some rows:
    // the column is appended with per-row fallbacks to the dialect default.
    let mut defaults_with_value: IndexMap<String, (Arc<Field>, Vec<Option<Value>>)> =
        IndexMap::new();

    for idx in 0..row_count {
        let record = rows.get_mut(idx);
        let mut row: Vec<Var> = Vec::with_capacity(values.columns.len());

        for field in &column_fields {
            let (_, is_zero) = field.value_of(record);
            if is_zero {
                if let Some(default) = &field.default_value_parsed {
                    field.set(record, default.clone())?;
                } else if field.auto_create_time.is_set() || field.auto_update_time.is_set() {
                    field.set(record, Value::Time(now))?;
                }
            } else if field.auto_update_time.is_set() && update_track_time {
                field.set(record, Value::Time(now))?;
            }

            row.push(Var::Value(field.db_value(record)?));
        }

        for field in &schema.fields_with_default_db_value {
            let included = match select_columns.get(&field.db_name) {
                Some(selected) => *selected,
                None => !restricted,
            };
            if !included {
                continue;
            }

            let (_, is_zero) = field.value_of(record);
            if !is_zero {
                let entry = defaults_with_value
                    .entry(field.db_name.clone())
                    .or_insert_with(|| (field.clone(), vec![None; row_count]));
                entry.1[idx] = Some(field.db_value(record)?);
            }
        }

        values.values.push(row);
    }

    for (db_name, (field, row_values)) in defaults_with_value {
        values.columns.push(Column::new(db_name));
        for (idx, row) in values.values.iter_mut().enumerate() {
            match &row_values[idx] {
                Some(value) => row.push(Var::Value(value.clone())),
                None => row.push(Var::Expr(dialect.default_value_of(&field))),
            }
        }
    }

    Ok(values)
}

/// `ON CONFLICT ... update_all` expands to per-column SET assignments,
/// skipping primaries, immutable defaults, and auto-create-time fields.
/// Auto-update-time fields assign the current moment.
fn expand_on_conflict_update_all(stmt: &mut Statement, values: &mut Values, now: DateTime<Utc>) {
    let Some(schema) = stmt.schema.clone() else {
        return;
    };
    if values.columns.is_empty() {
        return;
    }

    let existing = match stmt.clauses.get("ON CONFLICT") {
        Some(slot) => match &slot.expression {
            Some(ClauseExpression::OnConflict(on_conflict)) if on_conflict.update_all => {
                on_conflict.clone()
            }
            _ => return,
        },
        None => return,
    };

    let (select_columns, restricted) = stmt.select_and_omit_columns(true, true);
    let mut on_conflict: OnConflict = existing;
    let mut assignment_columns: Vec<String> = Vec::new();

    for column in &values.columns {
        let Some(field) = schema.look_up_field(&column.name) else {
            continue;
        };

        let included = match select_columns.get(&field.db_name) {
            Some(selected) => *selected,
            None => !restricted,
        };
        if !included {
            continue;
        }

        let immutable_default = field.has_default_value
            && field.default_value_parsed.is_none()
            && !field.default_value.eq_ignore_ascii_case("null");
        if field.primary_key || immutable_default || field.auto_create_time.is_set() {
            continue;
        }

        if field.auto_update_time.is_set() {
            on_conflict.do_updates.push(Assignment {
                column: Column::new(field.db_name.clone()),
                value: Var::Value(auto_time_value(field, now)),
            });
        } else {
            assignment_columns.push(column.name.clone());
        }
    }

    for name in assignment_columns {
        on_conflict.do_updates.push(Assignment {
            column: Column::new(name.clone()),
            value: Var::Column(Column::with_table("excluded", name)),
        });
    }

    if on_conflict.do_updates.is_empty() {
        on_conflict.do_nothing = true;
    }

    if on_conflict.columns.is_empty() {
        for field in &schema.primary_fields {
            on_conflict.columns.push(Column::new(field.db_name.clone()));
        }
    }

    on_conflict.update_all = false;
    stmt.add_clause(on_conflict);
}

pub(super) fn auto_time_value(field: &Field, now: DateTime<Utc>) -> Value {
    match field.auto_update_time {
        TimeMode::UnixNanosecond => Value::Int(now.timestamp_nanos_opt().unwrap_or_default()),
        TimeMode::UnixMillisecond => Value::Int(now.timestamp_millis()),
        TimeMode::UnixSecond => Value::Int(now.timestamp()),
        _ => Value::Time(now),
    }
}
