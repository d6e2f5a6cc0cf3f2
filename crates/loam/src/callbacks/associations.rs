use super::{Dest, Exec};
use crate::Error;

use loam_core::schema::{Record, Relationship};
use loam_core::Value;

use std::sync::Arc;

/// Before the insert, pull referenced primaries into belongs-to foreign
/// keys so the row links to associations already held in memory.
pub(super) fn save_before_associations(cx: &mut Exec<'_, '_>) {
    if cx.error.is_some() {
        return;
    }
    let Some(schema) = cx.stmt.schema.clone() else {
        return;
    };

    let relations: Vec<Arc<Relationship>> = schema.relationships().belongs_to.clone();
    if relations.is_empty() {
        return;
    }

    let mut errors = Vec::new();
    for_each_record(&mut cx.dest, |record| {
        for relation in &relations {
            if let Err(err) = sync_belongs_to(relation, record) {
                errors.push(err);
                return;
            }
        }
    });

    for err in errors {
        cx.add_error(err);
    }
}

/// After the insert, push the owner's (now assigned) primary into has-one
/// targets, including the polymorphic discriminator.
pub(super) fn save_after_associations(cx: &mut Exec<'_, '_>) {
    if cx.error.is_some() {
        return;
    }
    let Some(schema) = cx.stmt.schema.clone() else {
        return;
    };

    let relations: Vec<Arc<Relationship>> = schema.relationships().has_one.clone();
    if relations.is_empty() {
        return;
    }

    let mut errors = Vec::new();
    for_each_record(&mut cx.dest, |record| {
        for relation in &relations {
            if let Err(err) = sync_has_one(relation, record) {
                errors.push(err);
                return;
            }
        }
    });

    for err in errors {
        cx.add_error(err);
    }
}

fn for_each_record(dest: &mut Dest<'_>, mut f: impl FnMut(&mut dyn Record)) {
    match dest {
        Dest::Record(record) => f(&mut **record),
        Dest::Records(records) => {
            for idx in 0..records.len() {
                f(records.get_mut(idx));
            }
        }
        _ => {}
    }
}

fn sync_belongs_to(relation: &Relationship, record: &mut dyn Record) -> Result<(), Error> {
    for reference in &relation.references {
        if reference.own_primary_key || !reference.primary_value.is_empty() {
            continue;
        }
        let Some(primary_key) = &reference.primary_key else {
            continue;
        };

        let value = match relation.field.record_ref(record) {
            Some(target) => {
                let (value, is_zero) = primary_key.value_of(target);
                if is_zero {
                    continue;
                }
                value
            }
            None => continue,
        };

        let (_, fk_zero) = reference.foreign_key.value_of(record);
        if fk_zero {
            reference.foreign_key.set(record, value)?;
        }
    }
    Ok(())
}

fn sync_has_one(relation: &Relationship, record: &mut dyn Record) -> Result<(), Error> {
    for reference in &relation.references {
        if !reference.primary_value.is_empty() {
            if let Some(target) = relation.field.record_mut(record) {
                reference
                    .foreign_key
                    .set(target, Value::Str(reference.primary_value.clone()))?;
            }
            continue;
        }

        if !reference.own_primary_key {
            continue;
        }
        let Some(primary_key) = &reference.primary_key else {
            continue;
        };

        let (value, is_zero) = primary_key.value_of(record);
        if is_zero {
            continue;
        }

        if let Some(target) = relation.field.record_mut(record) {
            reference.foreign_key.set(target, value)?;
        }
    }
    Ok(())
}
