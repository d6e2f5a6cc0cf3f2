use crate::{Result, Value};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::any::{Any, TypeId};

/// The static stand-in for runtime reflection.
///
/// `#[derive(Record)]` generates an implementation that exposes the record's
/// shape through [`RecordDescriptor`] and positional accessors. Field indexes
/// are declaration offsets; the schema introspector composes them into signed
/// index paths when embedded records are inlined.
pub trait Record: Hooks + Any + Send {
    fn descriptor() -> RecordDescriptor
    where
        Self: Sized;

    /// Value of the primitive field at `index`.
    fn value_at(&self, index: usize) -> Value;

    /// Assign the primitive field at `index`. `Value::Null` resets the field
    /// to its default.
    fn set_at(&mut self, index: usize, value: Value) -> Result<()>;

    /// Borrow the embedded record or single-relation target at `index`.
    /// Returns `None` for unset pointer embeddings.
    fn record_at(&self, _index: usize) -> Option<&dyn Record> {
        None
    }

    /// Mutably borrow the embedded record or single-relation target at
    /// `index`, allocating unset pointer embeddings.
    fn record_at_mut(&mut self, _index: usize) -> Option<&mut dyn Record> {
        None
    }
}

pub type DescriptorFn = fn() -> RecordDescriptor;

/// The derived description of a record type.
#[derive(Debug, Clone)]
pub struct RecordDescriptor {
    pub name: &'static str,
    pub type_id: TypeId,
    /// Explicit table name overriding the naming strategy.
    pub table: Option<&'static str>,
    pub hooks: HookFlags,
    pub fields: Vec<RawField>,
}

/// One declared field, before introspection.
#[derive(Debug, Clone)]
pub struct RawField {
    pub name: &'static str,
    /// Annotation string: semicolon-separated `key[=value]` pairs.
    pub tag: &'static str,
    /// Declaration offset within the record.
    pub index: usize,
    pub kind: RawKind,
    /// The field is an `Option`.
    pub nullable: bool,
    /// The field is reached through a pointer (`Option`/`Box` embedding)
    /// that may need allocation on write.
    pub pointer: bool,
}

/// Syntactic kind of a declared field.
#[derive(Clone)]
pub enum RawKind {
    Bool,
    /// Signed integer with its bit width
    Int(u8),
    /// Unsigned integer with its bit width
    Uint(u8),
    /// Float with its bit width
    Float(u8),
    Str,
    Bytes,
    Time,
    /// Routed through a registered serializer codec; accessor-level values
    /// travel as [`Value::Json`].
    Serialized,
    /// An inlined record
    Embedded(DescriptorFn),
    /// A related record (or collection of records)
    Relation { descriptor: DescriptorFn, many: bool },
}

impl core::fmt::Debug for RawKind {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::Bool => f.write_str("Bool"),
            Self::Int(bits) => write!(f, "Int({bits})"),
            Self::Uint(bits) => write!(f, "Uint({bits})"),
            Self::Float(bits) => write!(f, "Float({bits})"),
            Self::Str => f.write_str("Str"),
            Self::Bytes => f.write_str("Bytes"),
            Self::Time => f.write_str("Time"),
            Self::Serialized => f.write_str("Serialized"),
            Self::Embedded(_) => f.write_str("Embedded"),
            Self::Relation { many, .. } => write!(f, "Relation {{ many: {many} }}"),
        }
    }
}

/// Which hook methods a record type actually implements, recorded at derive
/// time and copied onto the schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookFlags {
    pub before_create: bool,
    pub after_create: bool,
    pub before_update: bool,
    pub after_update: bool,
    pub before_save: bool,
    pub after_save: bool,
    pub before_delete: bool,
    pub after_delete: bool,
    pub after_find: bool,
}

impl HookFlags {
    pub fn any(&self) -> bool {
        *self != Self::default()
    }
}

/// Lifecycle hooks. All methods default to no-ops; record types opting in
/// via the derive's `hooks(...)` attribute supply their own implementation.
pub trait Hooks {
    fn before_save(&mut self, _cx: &mut HookContext<'_>) -> Result<()> {
        Ok(())
    }

    fn after_save(&mut self, _cx: &mut HookContext<'_>) -> Result<()> {
        Ok(())
    }

    fn before_create(&mut self, _cx: &mut HookContext<'_>) -> Result<()> {
        Ok(())
    }

    fn after_create(&mut self, _cx: &mut HookContext<'_>) -> Result<()> {
        Ok(())
    }

    fn before_update(&mut self, _cx: &mut HookContext<'_>) -> Result<()> {
        Ok(())
    }

    fn after_update(&mut self, _cx: &mut HookContext<'_>) -> Result<()> {
        Ok(())
    }

    fn before_delete(&mut self, _cx: &mut HookContext<'_>) -> Result<()> {
        Ok(())
    }

    fn after_delete(&mut self, _cx: &mut HookContext<'_>) -> Result<()> {
        Ok(())
    }

    fn after_find(&mut self, _cx: &mut HookContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Statement-scoped context passed to hooks: the session clock, the
/// settings map, and a column-assignment buffer drained by the pipeline
/// after the hook returns.
pub struct HookContext<'a> {
    pub now: DateTime<Utc>,
    settings: &'a mut IndexMap<String, Value>,
    set_columns: Vec<(String, Value)>,
}

impl<'a> HookContext<'a> {
    pub fn new(now: DateTime<Utc>, settings: &'a mut IndexMap<String, Value>) -> Self {
        Self {
            now,
            settings,
            set_columns: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.settings.insert(key.into(), value.into());
    }

    /// Stage a column assignment on the destination record(s).
    pub fn set_column(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.set_columns.push((column.into(), value.into()));
    }

    pub fn take_set_columns(&mut self) -> Vec<(String, Value)> {
        std::mem::take(&mut self.set_columns)
    }
}

/// Slice-shaped destinations: `Vec<T>` for growable results, bare slices for
/// batched writes.
pub trait RecordList {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> &dyn Record;

    fn get_mut(&mut self, index: usize) -> &mut dyn Record;

    /// Append a default-initialized element. No-op for fixed-size slices.
    fn push_default(&mut self);

    /// Drop all elements. No-op for fixed-size slices.
    fn clear(&mut self);

    fn descriptor(&self) -> RecordDescriptor;
}

impl<T: Record + Default> RecordList for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn get(&self, index: usize) -> &dyn Record {
        &self[index]
    }

    fn get_mut(&mut self, index: usize) -> &mut dyn Record {
        &mut self[index]
    }

    fn push_default(&mut self) {
        self.push(T::default());
    }

    fn clear(&mut self) {
        Vec::clear(self);
    }

    fn descriptor(&self) -> RecordDescriptor {
        T::descriptor()
    }
}

impl<T: Record + Default> RecordList for [T] {
    fn len(&self) -> usize {
        <[T]>::len(self)
    }

    fn get(&self, index: usize) -> &dyn Record {
        &self[index]
    }

    fn get_mut(&mut self, index: usize) -> &mut dyn Record {
        &mut self[index]
    }

    fn push_default(&mut self) {}

    fn clear(&mut self) {}

    fn descriptor(&self) -> RecordDescriptor {
        T::descriptor()
    }
}

/// Conversion out of [`Value`] for derived `set_at` implementations.
/// `Value::Null` resets to the default.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

macro_rules! from_value_int {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self> {
                    if value.is_null() {
                        return Ok(0);
                    }
                    let wide = value.coerce_i64()?;
                    <$ty>::try_from(wide).map_err(|_| {
                        crate::Error::invalid_value(format!(
                            "{wide} out of range for {}",
                            stringify!($ty)
                        ))
                    })
                }
            }
        )*
    };
}

macro_rules! from_value_uint {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self> {
                    if value.is_null() {
                        return Ok(0);
                    }
                    let wide = value.coerce_u64()?;
                    <$ty>::try_from(wide).map_err(|_| {
                        crate::Error::invalid_value(format!(
                            "{wide} out of range for {}",
                            stringify!($ty)
                        ))
                    })
                }
            }
        )*
    };
}

from_value_int!(i8, i16, i32, i64, isize);
from_value_uint!(u8, u16, u32, u64, usize);

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(false);
        }
        value.coerce_bool()
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(0.0);
        }
        Ok(value.coerce_f64()? as f32)
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(0.0);
        }
        value.coerce_f64()
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(String::new());
        }
        value.coerce_string()
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Vec::new());
        }
        value.coerce_bytes()
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(DateTime::<Utc>::UNIX_EPOCH);
        }
        value.coerce_time()
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_value(value).map(Some)
    }
}
