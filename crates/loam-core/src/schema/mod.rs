mod cache;
mod field;
mod record;
mod relationship;
#[allow(clippy::module_inception)]
mod schema;
mod serializer;

pub use cache::SchemaCache;
pub use field::{check_truth, parse_tag_setting, DataType, Field, TimeMode};
pub use record::{
    DescriptorFn, FromValue, HookContext, HookFlags, Hooks, RawField, RawKind, Record,
    RecordDescriptor, RecordList,
};
pub use relationship::{
    Constraint, Polymorphic, Reference, Relationship, RelationshipType, Relationships,
};
pub use schema::{
    parse, parse_descriptor, parse_with_table, register_clause_contributor, ClauseContributorFn,
    ContributedClauses, Schema,
};
pub use serializer::{get_serializer, register_serializer, Serializer};
