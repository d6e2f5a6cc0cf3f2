use super::field::Field;
use super::Schema;
use crate::NamingStrategy;

use indexmap::IndexMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipType {
    HasOne,
    HasMany,
    BelongsTo,
    Many2Many,
}

/// All relationships of a schema, grouped by kind and indexed by field name.
#[derive(Debug, Clone, Default)]
pub struct Relationships {
    pub has_one: Vec<Arc<Relationship>>,
    pub has_many: Vec<Arc<Relationship>>,
    pub belongs_to: Vec<Arc<Relationship>>,
    pub many2many: Vec<Arc<Relationship>>,
    pub relations: IndexMap<String, Arc<Relationship>>,
}

impl Relationships {
    pub fn insert(&mut self, relation: Arc<Relationship>) {
        match relation.rel_type {
            RelationshipType::HasOne => self.has_one.push(relation.clone()),
            RelationshipType::HasMany => self.has_many.push(relation.clone()),
            RelationshipType::BelongsTo => self.belongs_to.push(relation.clone()),
            RelationshipType::Many2Many => self.many2many.push(relation.clone()),
        }
        self.relations.insert(relation.name.clone(), relation);
    }
}

#[derive(Debug, Clone)]
pub struct Relationship {
    /// The relation field's name on the owning record.
    pub name: String,
    pub rel_type: RelationshipType,
    /// The relation field itself.
    pub field: Arc<Field>,
    pub polymorphic: Option<Polymorphic>,
    pub references: Vec<Reference>,
    /// Owning schema's table; kept flat to avoid a cyclic backreference.
    pub schema_table: String,
    /// The related record's schema.
    pub field_schema: Arc<Schema>,
    /// Synthetic schema for the many-to-many join table.
    pub join_table: Option<Arc<Schema>>,
}

/// Discriminator pair for polymorphic relations.
#[derive(Debug, Clone)]
pub struct Polymorphic {
    pub polymorphic_id: Arc<Field>,
    pub polymorphic_type: Arc<Field>,
    /// The literal stored in the type column for the owning schema.
    pub value: String,
}

/// One resolved (primary key, foreign key) pair.
#[derive(Debug, Clone)]
pub struct Reference {
    pub primary_key: Option<Arc<Field>>,
    /// A literal value in place of a primary key (polymorphic type column).
    pub primary_value: String,
    pub foreign_key: Arc<Field>,
    /// The primary key belongs to the owning schema (has-one/has-many side).
    pub own_primary_key: bool,
}

/// A foreign key constraint derived from a relationship's `constraint=`
/// annotation.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub name: String,
    pub on_update: String,
    pub on_delete: String,
    pub foreign_keys: Vec<Arc<Field>>,
    pub references: Vec<Arc<Field>>,
    pub reference_table: String,
}

impl Relationship {
    /// Resolve the constraint annotation, if any. Returns `None` for `-`,
    /// join-table relations, and relations without an external reference.
    pub fn parse_constraint(&self, namer: &NamingStrategy) -> Option<Constraint> {
        let raw = self
            .field
            .tag_settings
            .get("CONSTRAINT")
            .cloned()
            .unwrap_or_default();
        if raw == "-" {
            return None;
        }

        // `constraint=<name>,onUpdate:CASCADE,onDelete:SET NULL`: the inner
        // pairs use `:`, unlike the `=` of the outer annotation grammar.
        let mut settings: IndexMap<String, String> = IndexMap::new();
        for part in raw.split(',') {
            let mut kv = part.splitn(2, ':');
            let key = kv.next().unwrap_or("").trim().to_uppercase();
            if let Some(value) = kv.next() {
                settings.insert(key, value.trim().to_owned());
            }
        }

        let name = match raw.split(',').next() {
            Some(head)
                if !head.is_empty()
                    && head
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') =>
            {
                head.to_owned()
            }
            _ => namer.relationship_fk_name(&self.schema_table, &self.name),
        };

        let mut constraint = Constraint {
            name,
            on_update: settings.get("ONUPDATE").cloned().unwrap_or_default(),
            on_delete: settings.get("ONDELETE").cloned().unwrap_or_default(),
            foreign_keys: Vec::new(),
            references: Vec::new(),
            reference_table: String::new(),
        };

        for reference in &self.references {
            if let Some(primary_key) = &reference.primary_key {
                if !reference.own_primary_key {
                    constraint.foreign_keys.push(reference.foreign_key.clone());
                    constraint.references.push(primary_key.clone());
                    constraint.reference_table = self.field_schema.table.clone();
                }
            }
        }

        if self.join_table.is_some() || constraint.reference_table.is_empty() {
            return None;
        }

        Some(constraint)
    }
}
