use super::cache::{Begin, CacheKey, SchemaCache};
use super::field::{check_truth, DataType, Field};
use super::record::{HookFlags, RawKind, Record, RecordDescriptor};
use super::relationship::{
    Polymorphic, Reference, Relationship, RelationshipType, Relationships,
};
use crate::clause::ClauseExpression;
use crate::{Error, NamingStrategy, Result};

use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

/// The parsed metadata graph for a record type.
pub struct Schema {
    pub name: String,
    pub table: String,
    /// All fields in declaration order, embedded records inlined.
    pub fields: Vec<Arc<Field>>,
    /// Column names in first-appearance order.
    pub db_names: Vec<String>,
    pub fields_by_name: IndexMap<String, Arc<Field>>,
    pub fields_by_bind_name: IndexMap<String, Arc<Field>>,
    pub fields_by_db_name: IndexMap<String, Arc<Field>>,
    pub primary_fields: Vec<Arc<Field>>,
    pub primary_field_db_names: Vec<String>,
    pub prioritized_primary_field: Option<Arc<Field>>,
    /// Fields whose value is assigned by the database when absent,
    /// including the auto-increment primary.
    pub fields_with_default_db_value: Vec<Arc<Field>>,
    pub hooks: HookFlags,
    pub create_clauses: Vec<ClauseExpression>,
    pub query_clauses: Vec<ClauseExpression>,
    pub update_clauses: Vec<ClauseExpression>,
    pub delete_clauses: Vec<ClauseExpression>,
    relationships: OnceLock<Relationships>,
}

impl core::fmt::Debug for Schema {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("fields", &self.fields.len())
            .finish()
    }
}

impl Schema {
    /// Look a field up by column name first, then record-field name.
    pub fn look_up_field(&self, name: &str) -> Option<&Arc<Field>> {
        self.fields_by_db_name
            .get(name)
            .or_else(|| self.fields_by_name.get(name))
    }

    /// Find the closest field for `name` relative to a bind path, walking
    /// outwards from the innermost embedding.
    pub fn look_up_field_by_bind_name(
        &self,
        bind_names: &[String],
        name: &str,
    ) -> Option<&Arc<Field>> {
        for i in (0..bind_names.len()).rev() {
            let mut path = bind_names[..i].join(".");
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(name);
            if let Some(field) = self.fields_by_bind_name.get(&path) {
                return Some(field);
            }
        }
        None
    }

    pub fn relationships(&self) -> &Relationships {
        static EMPTY: OnceLock<Relationships> = OnceLock::new();
        self.relationships
            .get()
            .unwrap_or_else(|| EMPTY.get_or_init(Relationships::default))
    }

    /// Assemble a schema directly from fields, bypassing a record type.
    /// Used for synthesized join tables.
    pub fn synthetic(
        name: impl Into<String>,
        table: impl Into<String>,
        fields: Vec<Field>,
        namer: &NamingStrategy,
    ) -> Self {
        let mut builder = SchemaBuilder {
            name: name.into(),
            table: table.into(),
            fields,
        };
        builder.assign_column_names(namer);
        builder.finish(HookFlags::default())
    }
}

/// Clauses a field type contributes to each operation, merged into every
/// statement touching the schema.
#[derive(Debug, Clone, Default)]
pub struct ContributedClauses {
    pub create: Vec<ClauseExpression>,
    pub query: Vec<ClauseExpression>,
    pub update: Vec<ClauseExpression>,
    pub delete: Vec<ClauseExpression>,
}

pub type ClauseContributorFn = fn(&Field) -> ContributedClauses;

fn contributor_registry() -> &'static RwLock<HashMap<String, ClauseContributorFn>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, ClauseContributorFn>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register a clause contributor invoked for fields carrying a
/// `clauses=<name>` annotation.
pub fn register_clause_contributor(name: &str, contributor: ClauseContributorFn) -> Result<()> {
    let mut registry = contributor_registry()
        .write()
        .expect("clause contributor registry poisoned");
    if registry.contains_key(&name.to_lowercase()) {
        return Err(Error::registered(name));
    }
    registry.insert(name.to_lowercase(), contributor);
    Ok(())
}

fn get_clause_contributor(name: &str) -> Option<ClauseContributorFn> {
    contributor_registry()
        .read()
        .expect("clause contributor registry poisoned")
        .get(&name.to_lowercase())
        .copied()
}

/// Parse (or fetch from cache) the schema of a record type.
pub fn parse<T: Record>(cache: &SchemaCache, namer: &NamingStrategy) -> Result<Arc<Schema>> {
    parse_with_table::<T>(cache, namer, None)
}

/// Parse with an explicit table alias; cached separately per alias.
pub fn parse_with_table<T: Record>(
    cache: &SchemaCache,
    namer: &NamingStrategy,
    table: Option<&str>,
) -> Result<Arc<Schema>> {
    parse_descriptor(&T::descriptor(), cache, namer, table)
}

pub fn parse_descriptor(
    desc: &RecordDescriptor,
    cache: &SchemaCache,
    namer: &NamingStrategy,
    special_table: Option<&str>,
) -> Result<Arc<Schema>> {
    parse_descriptor_inner(desc, cache, namer, special_table, false)
}

/// Relation targets tolerate an in-flight parse: the partially built schema
/// (fields published, relationships pending) is good enough to resolve
/// references against, and waiting for completion would deadlock
/// self-referential types.
fn parse_target(
    desc: &RecordDescriptor,
    cache: &SchemaCache,
    namer: &NamingStrategy,
) -> Result<Arc<Schema>> {
    parse_descriptor_inner(desc, cache, namer, None, true)
}

fn parse_descriptor_inner(
    desc: &RecordDescriptor,
    cache: &SchemaCache,
    namer: &NamingStrategy,
    special_table: Option<&str>,
    partial_ok: bool,
) -> Result<Arc<Schema>> {
    let key: CacheKey = (desc.type_id, special_table.map(str::to_owned));

    let entry = match cache.begin(key.clone()) {
        Begin::Existing(entry) => {
            return if partial_ok {
                entry.take_available()
            } else {
                entry.wait_done()
            };
        }
        Begin::Started(entry) => entry,
    };

    let schema = match build_schema(desc, namer, special_table) {
        Ok(schema) => Arc::new(schema),
        Err(err) => {
            cache.finish(&key, &entry, Err(err.clone()));
            return Err(err);
        }
    };

    entry.publish_partial(schema.clone());

    if let Err(err) = resolve_relations(&schema, cache, namer) {
        cache.finish(&key, &entry, Err(err.clone()));
        return Err(err);
    }

    cache.finish(&key, &entry, Ok(schema.clone()));
    Ok(schema)
}

struct SchemaBuilder {
    name: String,
    table: String,
    fields: Vec<Field>,
}

impl SchemaBuilder {
    fn assign_column_names(&mut self, namer: &NamingStrategy) {
        for field in &mut self.fields {
            if field.db_name.is_empty() && field.data_type.is_some() {
                field.db_name = namer.column_name(&self.table, &field.name);
            }
        }
    }

    /// Build the index maps, elect primaries, and freeze the fields.
    fn finish(self, hooks: HookFlags) -> Schema {
        let SchemaBuilder {
            name,
            table,
            mut fields,
        } = self;

        let mut db_names: Vec<String> = Vec::new();
        let mut by_db: IndexMap<String, usize> = IndexMap::new();
        let mut by_name: IndexMap<String, usize> = IndexMap::new();
        let mut by_bind: IndexMap<String, usize> = IndexMap::new();
        let mut primary: Vec<usize> = Vec::new();

        for idx in 0..fields.len() {
            let db_name = fields[idx].db_name.clone();
            let field_name = fields[idx].name.clone();
            let bind_name = fields[idx].bind_name();

            if !db_name.is_empty() {
                let has_permission = fields[idx].creatable
                    || fields[idx].updatable
                    || fields[idx].readable;

                let replace = match by_db.get(&db_name) {
                    // Nonexistent, or a shallower bind path with permission
                    // takes priority over the earlier field.
                    None => true,
                    Some(&prev) => {
                        has_permission
                            && fields[idx].bind_names.len() < fields[prev].bind_names.len()
                    }
                };

                if replace {
                    if let Some(&prev) = by_db.get(&db_name) {
                        if fields[prev].primary_key {
                            primary.retain(|&p| p != prev);
                        }
                    } else {
                        db_names.push(db_name.clone());
                    }

                    by_db.insert(db_name.clone(), idx);
                    by_name.insert(field_name.clone(), idx);
                    by_bind.insert(bind_name.clone(), idx);

                    if fields[idx].primary_key {
                        primary.push(idx);
                    }
                }
            }

            let excluded = |i: usize| {
                fields[i]
                    .tag_settings
                    .get("-")
                    .map(|v| v == "-")
                    .unwrap_or(false)
            };

            let prev_by_name = by_name.get(&field_name).copied();
            if prev_by_name.map(excluded).unwrap_or(true) {
                by_name.insert(field_name, idx);
            }

            let prev_by_bind = by_bind.get(&bind_name).copied();
            if prev_by_bind.map(excluded).unwrap_or(true) {
                by_bind.insert(bind_name, idx);
            }
        }

        // Elect the prioritized primary: an `id`/`ID` field first, then the
        // single declared primary, then the auto-increment one.
        let id_field = by_db
            .get("id")
            .or_else(|| by_name.get("id"))
            .or_else(|| by_name.get("ID"))
            .copied();

        let mut prioritized: Option<usize> = None;
        if let Some(idx) = id_field {
            if fields[idx].primary_key {
                prioritized = Some(idx);
            } else if primary.is_empty() {
                fields[idx].primary_key = true;
                primary.push(idx);
                prioritized = Some(idx);
            }
        }

        if prioritized.is_none() {
            if primary.len() == 1 {
                prioritized = Some(primary[0]);
            } else if primary.len() > 1 {
                prioritized = primary
                    .iter()
                    .copied()
                    .find(|&idx| fields[idx].auto_increment);
            }
        }

        let mut defaults: Vec<usize> = Vec::new();
        for idx in 0..fields.len() {
            if fields[idx].data_type.is_some()
                && fields[idx].has_default_value
                && fields[idx].default_value_parsed.is_none()
            {
                defaults.push(idx);
            }
        }

        // Integer primaries without an explicit annotation become
        // auto-increment with a database-side default.
        if let Some(idx) = prioritized {
            let is_integer = matches!(
                fields[idx].kind,
                Some(DataType::Int) | Some(DataType::Uint)
            );
            if is_integer && !fields[idx].tag_settings.contains_key("AUTOINCREMENT") {
                if !fields[idx].has_default_value
                    || fields[idx].default_value_parsed.is_some()
                {
                    defaults.push(idx);
                }
                fields[idx].has_default_value = true;
                fields[idx].auto_increment = true;
            }
        }

        let fields: Vec<Arc<Field>> = fields.into_iter().map(Arc::new).collect();

        let arc_map = |map: IndexMap<String, usize>| {
            map.into_iter()
                .map(|(k, idx)| (k, fields[idx].clone()))
                .collect::<IndexMap<String, Arc<Field>>>()
        };

        let primary_fields: Vec<Arc<Field>> =
            primary.iter().map(|&idx| fields[idx].clone()).collect();
        let primary_field_db_names = primary_fields
            .iter()
            .map(|f| f.db_name.clone())
            .collect();

        let mut schema = Schema {
            name,
            table,
            db_names,
            fields_by_name: arc_map(by_name),
            fields_by_bind_name: arc_map(by_bind),
            fields_by_db_name: arc_map(by_db),
            primary_field_db_names,
            prioritized_primary_field: prioritized.map(|idx| fields[idx].clone()),
            fields_with_default_db_value: defaults
                .iter()
                .map(|&idx| fields[idx].clone())
                .collect(),
            primary_fields,
            hooks,
            create_clauses: Vec::new(),
            query_clauses: Vec::new(),
            update_clauses: Vec::new(),
            delete_clauses: Vec::new(),
            relationships: OnceLock::new(),
            fields,
        };

        for field in &schema.fields {
            let Some(name) = field.tag_settings.get("CLAUSES") else {
                continue;
            };
            if let Some(contributor) = get_clause_contributor(name) {
                let mut contributed = contributor(field);
                schema.create_clauses.append(&mut contributed.create);
                schema.query_clauses.append(&mut contributed.query);
                schema.update_clauses.append(&mut contributed.update);
                schema.delete_clauses.append(&mut contributed.delete);
            }
        }

        schema
    }
}

fn build_schema(
    desc: &RecordDescriptor,
    namer: &NamingStrategy,
    special_table: Option<&str>,
) -> Result<Schema> {
    let table = special_table
        .map(str::to_owned)
        .or_else(|| desc.table.map(str::to_owned))
        .unwrap_or_else(|| namer.table_name(desc.name));

    let mut fields = Vec::with_capacity(desc.fields.len());
    for raw in &desc.fields {
        let field = Field::parse(raw).map_err(|err| {
            err.context(Error::invalid_schema(format!(
                "failed to parse field {}.{}",
                desc.name, raw.name
            )))
        })?;

        if let RawKind::Embedded(embedded) = &raw.kind {
            let child_desc = (embedded)();
            expand_embedded(&field, raw.pointer, &child_desc, namer, &table, &mut fields)?;
        } else {
            fields.push(field);
        }
    }

    let mut builder = SchemaBuilder {
        name: desc.name.to_owned(),
        table,
        fields,
    };
    builder.assign_column_names(namer);
    Ok(builder.finish(desc.hooks))
}

/// Inline an embedded record's fields: rebind index paths (negative first
/// step for pointer embeddings), prefix bind names and column names, and
/// demote heuristic primaries.
fn expand_embedded(
    outer: &Field,
    pointer: bool,
    child_desc: &RecordDescriptor,
    namer: &NamingStrategy,
    table: &str,
    out: &mut Vec<Field>,
) -> Result<()> {
    let outer_step = outer.index_path[0];
    let step = if pointer { -outer_step - 1 } else { outer_step };
    let prefix = outer.tag_settings.get("EMBEDDEDPREFIX").cloned();

    let mut children = Vec::with_capacity(child_desc.fields.len());
    for raw in &child_desc.fields {
        let child = Field::parse(raw).map_err(|err| {
            err.context(Error::invalid_schema(format!(
                "failed to parse embedded field {}.{}",
                child_desc.name, raw.name
            )))
        })?;

        if let RawKind::Embedded(embedded) = &raw.kind {
            let nested_desc = (embedded)();
            expand_embedded(&child, raw.pointer, &nested_desc, namer, table, &mut children)?;
        } else {
            children.push(child);
        }
    }

    for mut child in children {
        child.bind_names.insert(0, outer.name.clone());
        child.index_path.insert(0, step);

        if child.db_name.is_empty() && child.data_type.is_some() {
            child.db_name = namer.column_name(table, &child.name);
        }
        if let Some(prefix) = &prefix {
            if !child.db_name.is_empty() {
                child.db_name = format!("{prefix}{}", child.db_name);
            }
        }

        // A primary detected only by the name heuristic stays local to the
        // embedded record.
        if child.primary_key {
            let explicit = check_truth(child.tag_settings.get("PRIMARYKEY"))
                || check_truth(child.tag_settings.get("PRIMARY_KEY"));
            if !explicit {
                child.primary_key = false;

                if !check_truth(child.tag_settings.get("AUTOINCREMENT")) {
                    child.auto_increment = false;
                }
                if !child.auto_increment && child.default_value.is_empty() {
                    child.has_default_value = false;
                }
            }
        }

        for (key, value) in &outer.tag_settings {
            child.tag_settings.insert(key.clone(), value.clone());
        }

        out.push(child);
    }

    Ok(())
}

fn to_columns(value: Option<&String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn resolve_relations(
    schema: &Arc<Schema>,
    cache: &SchemaCache,
    namer: &NamingStrategy,
) -> Result<()> {
    let mut relationships = Relationships::default();

    for field in &schema.fields {
        if field.data_type.is_some()
            || !(field.creatable || field.updatable || field.readable)
        {
            continue;
        }

        let RawKind::Relation { descriptor, many } = &field.raw_kind else {
            continue;
        };

        let target_desc = (descriptor)();
        let field_schema = parse_target(&target_desc, cache, namer)?;

        let foreign_keys = to_columns(field.tag_settings.get("FOREIGNKEY"));
        let primary_keys = to_columns(field.tag_settings.get("REFERENCES"));

        let relation = if let Some(poly) = field
            .tag_settings
            .get("POLYMORPHIC")
            .filter(|v| !v.is_empty())
        {
            build_polymorphic(
                schema,
                field,
                poly,
                &field_schema,
                &foreign_keys,
                *many,
            )?
        } else if let Some(join_table) = field
            .tag_settings
            .get("MANY2MANY")
            .filter(|v| !v.is_empty())
        {
            build_many2many(
                schema,
                field,
                join_table,
                &field_schema,
                &foreign_keys,
                &primary_keys,
                namer,
            )?
        } else {
            guess_relation(
                schema,
                field,
                &field_schema,
                &foreign_keys,
                &primary_keys,
                *many,
                true,
            )?
        };

        relationships.insert(Arc::new(relation));
    }

    let _ = schema.relationships.set(relationships);
    Ok(())
}

/// `polymorphic=Owner` expects `<Owner>Type` and `<Owner>ID` on the remote
/// side: the type column stores a literal naming the owner, the id column
/// references the owner's primary.
fn build_polymorphic(
    schema: &Arc<Schema>,
    field: &Arc<Field>,
    polymorphic: &str,
    field_schema: &Arc<Schema>,
    foreign_keys: &[String],
    many: bool,
) -> Result<Relationship> {
    let type_field = field_schema
        .fields_by_name
        .get(&format!("{polymorphic}Type"))
        .cloned()
        .ok_or_else(|| {
            Error::invalid_schema(format!(
                "invalid polymorphic type {} for {} on field {}, missing field {polymorphic}Type",
                field_schema.name, schema.name, field.name
            ))
        })?;
    let id_field = field_schema
        .fields_by_name
        .get(&format!("{polymorphic}ID"))
        .cloned()
        .ok_or_else(|| {
            Error::invalid_schema(format!(
                "invalid polymorphic type {} for {} on field {}, missing field {polymorphic}ID",
                field_schema.name, schema.name, field.name
            ))
        })?;

    let value = field
        .tag_settings
        .get("POLYMORPHICVALUE")
        .or_else(|| field.tag_settings.get("POLYMORPHIC_VALUE"))
        .map(|v| v.trim().to_owned())
        .unwrap_or_else(|| schema.table.clone());

    let primary_key = match foreign_keys {
        [] => schema.prioritized_primary_field.clone(),
        [single] => Some(schema.look_up_field(single).cloned().ok_or_else(|| {
            Error::invalid_schema(format!(
                "invalid polymorphic foreign keys {foreign_keys:?} for {} on field {}",
                schema.name, field.name
            ))
        })?),
        _ => {
            return Err(Error::invalid_schema(format!(
                "invalid polymorphic foreign keys {foreign_keys:?} for {} on field {}",
                schema.name, field.name
            )))
        }
    };

    let references = vec![
        Reference {
            primary_key: None,
            primary_value: value.clone(),
            foreign_key: type_field.clone(),
            own_primary_key: false,
        },
        Reference {
            primary_key: primary_key.clone(),
            primary_value: String::new(),
            foreign_key: id_field.clone(),
            own_primary_key: true,
        },
    ];

    Ok(Relationship {
        name: field.name.clone(),
        rel_type: if many {
            RelationshipType::HasMany
        } else {
            RelationshipType::HasOne
        },
        field: field.clone(),
        polymorphic: Some(Polymorphic {
            polymorphic_id: id_field,
            polymorphic_type: type_field,
            value,
        }),
        references,
        schema_table: schema.table.clone(),
        field_schema: field_schema.clone(),
        join_table: None,
    })
}

/// `many2many=<tbl>` synthesizes a join schema from both sides' primary
/// fields, with deterministic names on collision (self-joins append
/// `Reference`).
fn build_many2many(
    schema: &Arc<Schema>,
    field: &Arc<Field>,
    join_table: &str,
    field_schema: &Arc<Schema>,
    foreign_keys: &[String],
    primary_keys: &[String],
    namer: &NamingStrategy,
) -> Result<Relationship> {
    let join_foreign_keys = to_columns(field.tag_settings.get("JOINFOREIGNKEY"));
    let join_references = to_columns(field.tag_settings.get("JOINREFERENCES"));

    let resolve = |source: &Arc<Schema>, names: &[String]| -> Result<Vec<Arc<Field>>> {
        if names.is_empty() {
            return Ok(source.primary_fields.clone());
        }
        names
            .iter()
            .map(|name| {
                source.look_up_field(name).cloned().ok_or_else(|| {
                    Error::invalid_schema(format!("invalid foreign key: {name}"))
                })
            })
            .collect()
    };

    let own_fields = resolve(schema, foreign_keys)?;
    let ref_fields = resolve(field_schema, primary_keys)?;

    let table = namer.join_table_name(join_table);
    let mut join_fields: Vec<Field> = Vec::new();
    let mut sources: Vec<(Arc<Field>, bool)> = Vec::new();
    let mut own_names: Vec<String> = Vec::new();

    for (idx, own) in own_fields.iter().enumerate() {
        let join_name = join_foreign_keys
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("{}{}", schema.name, own.name));
        own_names.push(join_name.clone());
        join_fields.push(synthesize_join_field(own, &join_name));
        sources.push((own.clone(), true));
    }

    for (idx, reference) in ref_fields.iter().enumerate() {
        let mut join_name = join_references
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("{}{}", field_schema.name, reference.name));

        if own_names.contains(&join_name) {
            if field.name != field_schema.name {
                join_name = format!(
                    "{}{}",
                    pluralizer::pluralize(&field.name, 1, false),
                    reference.name
                );
            } else {
                join_name.push_str("Reference");
            }
        }

        join_fields.push(synthesize_join_field(reference, &join_name));
        sources.push((reference.clone(), false));
    }

    let join_schema = Arc::new(Schema::synthetic(
        join_table.to_owned(),
        table,
        join_fields,
        namer,
    ));

    let references = join_schema
        .fields
        .iter()
        .zip(sources)
        .map(|(join_field, (source, own_side))| Reference {
            primary_key: Some(source),
            primary_value: String::new(),
            foreign_key: join_field.clone(),
            own_primary_key: own_side,
        })
        .collect();

    Ok(Relationship {
        name: field.name.clone(),
        rel_type: RelationshipType::Many2Many,
        field: field.clone(),
        polymorphic: None,
        references,
        schema_table: schema.table.clone(),
        field_schema: field_schema.clone(),
        join_table: Some(join_schema),
    })
}

fn synthesize_join_field(source: &Arc<Field>, join_name: &str) -> Field {
    let mut field = source.as_ref().clone();
    field.name = join_name.to_owned();
    field.db_name = String::new();
    field.bind_names = vec![join_name.to_owned()];
    field.index_path = vec![0];
    field.primary_key = false;
    field.auto_increment = false;
    field.has_default_value = false;
    field.default_value = String::new();
    field.default_value_parsed = None;
    field.tag_settings.shift_remove("COLUMN");
    field
}

/// Infer by naming convention: for each primary on the owning side, expect
/// `<OwnerType><PK>` on the remote. On failure swap owner/remote roles
/// exactly once (has becomes belongs-to); a second failure is an error.
fn guess_relation(
    schema: &Arc<Schema>,
    field: &Arc<Field>,
    field_schema: &Arc<Schema>,
    foreign_keys: &[String],
    primary_keys: &[String],
    many: bool,
    guess_has: bool,
) -> Result<Relationship> {
    let (primary_schema, foreign_schema) = if guess_has {
        (schema, field_schema)
    } else {
        (field_schema, schema)
    };

    let reguess_or_err = |message: String| -> Result<Relationship> {
        if guess_has {
            guess_relation(
                schema,
                field,
                field_schema,
                foreign_keys,
                primary_keys,
                many,
                false,
            )
        } else {
            Err(Error::invalid_schema(message))
        }
    };

    let mut primary_fields: Vec<Arc<Field>> = Vec::new();
    let mut foreign_fields: Vec<Arc<Field>> = Vec::new();

    if !foreign_keys.is_empty() {
        for name in foreign_keys {
            match foreign_schema.look_up_field(name) {
                Some(found) => foreign_fields.push(found.clone()),
                None => {
                    return reguess_or_err(format!(
                        "unsupported relation {} for {} on field {} with foreign keys {foreign_keys:?}",
                        field_schema.name, schema.name, field.name
                    ))
                }
            }
        }
    } else {
        for primary in &primary_schema.primary_fields {
            let look_up_name = if guess_has {
                format!("{}{}", schema.name, primary.name)
            } else {
                format!("{}{}", field.name, primary.name)
            };

            if let Some(found) = foreign_schema.look_up_field(&look_up_name) {
                foreign_fields.push(found.clone());
                primary_fields.push(primary.clone());
            }
        }
    }

    if foreign_fields.is_empty() {
        return reguess_or_err(format!(
            "failed to guess {}'s relation with {}'s field {}",
            field_schema.name, schema.name, field.name
        ));
    }

    if !primary_keys.is_empty() {
        for (idx, name) in primary_keys.iter().enumerate() {
            match primary_schema.look_up_field(name) {
                Some(found) => {
                    if primary_fields.len() < idx + 1 {
                        primary_fields.push(found.clone());
                    } else if !Arc::ptr_eq(&primary_fields[idx], found) {
                        return reguess_or_err(format!(
                            "unsupported relation {} for {} on field {} with references {primary_keys:?}",
                            field_schema.name, schema.name, field.name
                        ));
                    }
                }
                None => {
                    return reguess_or_err(format!(
                        "unsupported relation {} for {} on field {} with references {primary_keys:?}",
                        field_schema.name, schema.name, field.name
                    ))
                }
            }
        }
    } else if primary_fields.is_empty() {
        if foreign_fields.len() == 1 {
            match &primary_schema.prioritized_primary_field {
                Some(primary) => primary_fields.push(primary.clone()),
                None => {
                    return reguess_or_err(format!(
                        "no primary field to reference for {} on field {}",
                        schema.name, field.name
                    ))
                }
            }
        } else if primary_schema.primary_fields.len() == foreign_fields.len() {
            primary_fields.extend(primary_schema.primary_fields.iter().cloned());
        } else {
            return reguess_or_err(format!(
                "unsupported relation {} for {} on field {}",
                field_schema.name, schema.name, field.name
            ));
        }
    }

    let references = foreign_fields
        .into_iter()
        .zip(primary_fields)
        .map(|(foreign_key, primary_key)| Reference {
            primary_key: Some(primary_key),
            primary_value: String::new(),
            foreign_key,
            own_primary_key: guess_has,
        })
        .collect();

    let rel_type = if guess_has {
        if many {
            RelationshipType::HasMany
        } else {
            RelationshipType::HasOne
        }
    } else {
        RelationshipType::BelongsTo
    };

    Ok(Relationship {
        name: field.name.clone(),
        rel_type,
        field: field.clone(),
        polymorphic: None,
        references,
        schema_table: schema.table.clone(),
        field_schema: field_schema.clone(),
        join_table: None,
    })
}
