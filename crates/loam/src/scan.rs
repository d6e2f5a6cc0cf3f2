use crate::callbacks::{Dest, Exec};
use crate::driver::Rows;
use crate::{Error, Value};

use loam_core::schema::{Field, Record, Schema};

use std::sync::Arc;

/// Scan into existing slice elements instead of appending.
pub(crate) const UPDATE: u8 = 1 << 1;

/// Skip destination elements that already carry values (conflicting rows
/// the database did nothing for produce no RETURNING row).
pub(crate) const ON_CONFLICT_DO_NOTHING: u8 = 1 << 2;

/// Separator splitting join-qualified result columns, e.g. `Pet__name`.
const NESTED_RELATION_SEPARATOR: &str = "__";

/// How one result column routes into the destination.
struct Binding {
    field: Option<Arc<Field>>,
    /// Relation fields to descend through before applying `field`.
    join_path: Vec<Arc<Field>>,
}

impl Binding {
    fn sink() -> Self {
        Self {
            field: None,
            join_path: Vec::new(),
        }
    }
}

/// Reassemble result rows into the destination. Driver-level errors abort;
/// per-field conversion errors inside a slice destination are recorded and
/// the loop continues.
pub(crate) fn scan(mut rows: Box<dyn Rows>, cx: &mut Exec<'_, '_>, mode: u8) {
    let columns = rows.columns();
    let update = mode & UPDATE != 0;
    let on_conflict_do_nothing = mode & ON_CONFLICT_DO_NOTHING != 0;

    cx.rows_affected = 0;
    let schema = cx.stmt.schema.clone();
    let raise_not_found = cx.stmt.raise_error_on_not_found;

    let mut affected: u64 = 0;
    let mut errors: Vec<Error> = Vec::new();
    let mut scalar_destination = false;

    match &mut cx.dest {
        // Map destinations never opt into record-not-found, like slices.
        Dest::Map(map) => match rows.next() {
            Ok(Some(values)) => {
                affected = 1;
                for (column, value) in columns.iter().zip(values) {
                    map.insert(column.clone(), value);
                }
            }
            Ok(None) => {}
            Err(err) => errors.push(err),
        },
        Dest::Maps(maps) => loop {
            match rows.next() {
                Ok(Some(values)) => {
                    affected += 1;
                    let mut map = crate::callbacks::Map::new();
                    for (column, value) in columns.iter().zip(values) {
                        map.insert(column.clone(), value);
                    }
                    maps.push(map);
                }
                Ok(None) => break,
                Err(err) => {
                    errors.push(err);
                    break;
                }
            }
        },
        Dest::Value(out) => {
            scalar_destination = true;
            match rows.next() {
                Ok(Some(mut values)) => {
                    affected = 1;
                    if !values.is_empty() {
                        **out = values.remove(0);
                    }
                }
                Ok(None) => {}
                Err(err) => errors.push(err),
            }
        }
        Dest::Record(record) => {
            scalar_destination = true;
            let bindings = match &schema {
                Some(schema) => resolve_columns(schema, &columns),
                None => columns.iter().map(|_| Binding::sink()).collect(),
            };

            match rows.next() {
                Ok(Some(values)) => {
                    affected = 1;
                    scan_into_record(&mut **record, &bindings, values, &mut errors);
                }
                Ok(None) => {}
                Err(err) => errors.push(err),
            }
        }
        Dest::Records(records) => {
            let bindings = match &schema {
                Some(schema) => resolve_columns(schema, &columns),
                None => columns.iter().map(|_| Binding::sink()).collect(),
            };

            if !update {
                records.clear();
            }

            'rows: loop {
                let values = match rows.next() {
                    Ok(Some(values)) => values,
                    Ok(None) => break,
                    Err(err) => {
                        errors.push(err);
                        break;
                    }
                };

                let idx = if update {
                    let mut idx = affected as usize;
                    if on_conflict_do_nothing {
                        // Rows come back only for inserted elements; skip
                        // ones that already carry values.
                        while idx < records.len() && element_has_values(records.get(idx), &bindings)
                        {
                            affected += 1;
                            idx += 1;
                        }
                    }
                    if idx >= records.len() {
                        break 'rows;
                    }
                    idx
                } else {
                    records.push_default();
                    records.len() - 1
                };

                scan_into_record(records.get_mut(idx), &bindings, values, &mut errors);
                affected += 1;
            }
        }
        Dest::None | Dest::OwnedMap(_) => loop {
            match rows.next() {
                Ok(Some(_)) => affected += 1,
                Ok(None) => break,
                Err(err) => {
                    errors.push(err);
                    break;
                }
            }
        },
    }

    cx.rows_affected = affected;

    for err in errors {
        cx.add_error(err);
    }

    if cx.rows_affected == 0
        && scalar_destination
        && raise_not_found
        && cx.error.is_none()
    {
        let table = schema.map(|s| s.table.clone()).unwrap_or_default();
        cx.add_error(Error::record_not_found(table));
    }
}

/// Map result columns to schema fields. The k-th duplicate of a column name
/// binds to the k-th readable field with that DBName; dotted names descend
/// through relationships; everything else sinks.
fn resolve_columns(schema: &Arc<Schema>, columns: &[String]) -> Vec<Binding> {
    let mut seen: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    let mut bindings = Vec::with_capacity(columns.len());

    for column in columns {
        let occurrence = seen.entry(column.as_str()).or_insert(0);
        let binding = resolve_column(schema, column, *occurrence);
        if binding.field.is_some() && binding.join_path.is_empty() {
            *occurrence += 1;
        }
        bindings.push(binding);
    }

    bindings
}

fn resolve_column(schema: &Arc<Schema>, column: &str, occurrence: usize) -> Binding {
    let candidates: Vec<&Arc<Field>> = schema
        .fields
        .iter()
        .filter(|field| field.db_name == column && field.readable)
        .collect();

    if let Some(field) = candidates.get(occurrence) {
        return Binding {
            field: Some((*field).clone()),
            join_path: Vec::new(),
        };
    }

    if candidates.is_empty() && occurrence == 0 {
        if let Some(field) = schema.look_up_field(column) {
            if field.readable {
                return Binding {
                    field: Some(field.clone()),
                    join_path: Vec::new(),
                };
            }
        }
    }

    // `Relation__column`, possibly nested.
    let names: Vec<&str> = column.split(NESTED_RELATION_SEPARATOR).collect();
    if names.len() > 1 {
        let mut relation = match schema.relationships().relations.get(names[0]) {
            Some(relation) => relation.clone(),
            None => return Binding::sink(),
        };
        let mut join_path = vec![relation.field.clone()];

        for name in &names[1..names.len() - 1] {
            relation = match relation.field_schema.relationships().relations.get(*name) {
                Some(next) => next.clone(),
                None => return Binding::sink(),
            };
            join_path.push(relation.field.clone());
        }

        let db_name = names[names.len() - 1];
        if let Some(field) = relation.field_schema.look_up_field(db_name) {
            if field.readable {
                return Binding {
                    field: Some(field.clone()),
                    join_path,
                };
            }
        }
    }

    Binding::sink()
}

fn scan_into_record(
    record: &mut dyn Record,
    bindings: &[Binding],
    values: Vec<Value>,
    errors: &mut Vec<Error>,
) {
    for (binding, value) in bindings.iter().zip(values) {
        let Some(field) = &binding.field else {
            continue;
        };

        if binding.join_path.is_empty() {
            if let Err(err) = field.scan(record, value) {
                errors.push(err);
            }
            continue;
        }

        // Descend to the join target, leaving unset targets untouched when
        // the joined row is absent.
        let mut current: Option<&mut dyn Record> = Some(record);
        let mut reachable = true;
        for relation_field in &binding.join_path {
            let cur = current.take().expect("current set while reachable");
            if value.is_null() && relation_field.record_ref(cur).is_none() {
                reachable = false;
                break;
            }
            match relation_field.record_mut(cur) {
                Some(next) => current = Some(next),
                None => {
                    reachable = false;
                    break;
                }
            }
        }

        if reachable {
            if let Some(cur) = current {
                if let Err(err) = field.scan(cur, value) {
                    errors.push(err);
                }
            }
        }
    }
}

fn element_has_values(record: &dyn Record, bindings: &[Binding]) -> bool {
    bindings.iter().any(|binding| {
        binding
            .field
            .as_ref()
            .filter(|_| binding.join_path.is_empty())
            .map(|field| !field.value_of(record).1)
            .unwrap_or(false)
    })
}
