use super::record::{RawField, RawKind, Record};
use super::serializer::{get_serializer, Serializer};
use crate::{Error, Result, Value};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::sync::Arc;

/// Semantic kind of a field, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Bool,
    Int,
    Uint,
    Float,
    String,
    Time,
    Bytes,
    /// Native column type named by a `type=` annotation.
    Custom(String),
}

/// Integer encoding for automatic create/update timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeMode {
    #[default]
    None,
    /// Stored as a native time value
    UnixTime,
    UnixSecond,
    UnixMillisecond,
    UnixNanosecond,
}

impl TimeMode {
    pub fn is_set(self) -> bool {
        self != Self::None
    }
}

/// Parse an annotation string: `sep`-separated `key[=value]` pairs with
/// case-insensitive keys. A trailing backslash escapes the separator.
pub fn parse_tag_setting(tag: &str, sep: char) -> IndexMap<String, String> {
    let mut settings = IndexMap::new();

    let mut parts: Vec<String> = Vec::new();
    for piece in tag.split(sep) {
        match parts.last_mut() {
            Some(last) if last.ends_with('\\') => {
                last.pop();
                last.push(sep);
                last.push_str(piece);
            }
            _ => parts.push(piece.to_owned()),
        }
    }

    for part in parts {
        let mut kv = part.splitn(2, '=');
        let key = kv.next().unwrap_or("").trim().to_uppercase();
        if key.is_empty() {
            continue;
        }

        match kv.next() {
            Some(value) => settings.insert(key, value.to_owned()),
            None => settings.insert(key.clone(), key),
        };
    }

    settings
}

/// Truthiness of annotation values: absent or explicit `false` is false.
pub fn check_truth(value: Option<&String>) -> bool {
    match value {
        Some(v) => !v.eq_ignore_ascii_case("false"),
        None => false,
    }
}

/// A fully derived field of a schema.
#[derive(Clone)]
pub struct Field {
    pub name: String,
    pub db_name: String,
    /// Record-field names from the outermost record down to this field.
    pub bind_names: Vec<String>,
    /// Stored kind, after `type=` overrides. `None` marks an excluded field
    /// or an unresolved relation.
    pub data_type: Option<DataType>,
    /// Semantic kind before overrides; drives value conversions.
    pub kind: Option<DataType>,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub auto_increment_increment: i64,
    pub creatable: bool,
    pub updatable: bool,
    pub readable: bool,
    pub auto_create_time: TimeMode,
    pub auto_update_time: TimeMode,
    pub has_default_value: bool,
    pub default_value: String,
    /// The default parsed as a literal; `None` when the default is an
    /// expression (contains parentheses), `null`, or empty.
    pub default_value_parsed: Option<Value>,
    pub not_null: bool,
    pub unique: bool,
    pub comment: String,
    pub size: i64,
    pub precision: i64,
    pub scale: i64,
    /// Signed steps into the record: non-negative is a direct offset, a
    /// negative step `i` is a pointer-typed field at offset `-i-1` that is
    /// materialized on write.
    pub index_path: Vec<i32>,
    pub nullable: bool,
    pub raw_kind: RawKind,
    pub tag_settings: IndexMap<String, String>,
    pub serializer: Option<Arc<dyn Serializer>>,
    pub serializer_name: String,
}

impl core::fmt::Debug for Field {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("db_name", &self.db_name)
            .field("data_type", &self.data_type)
            .field("primary_key", &self.primary_key)
            .field("index_path", &self.index_path)
            .finish()
    }
}

impl Field {
    /// Derive a field from its raw declaration. Embedded expansion and
    /// column-name assignment happen later, during schema assembly.
    pub fn parse(raw: &RawField) -> Result<Field> {
        let tag_settings = parse_tag_setting(raw.tag, ';');

        let primary_key = check_truth(tag_settings.get("PRIMARYKEY"))
            || check_truth(tag_settings.get("PRIMARY_KEY"));
        let auto_increment = check_truth(tag_settings.get("AUTOINCREMENT"));

        let mut field = Field {
            name: raw.name.to_owned(),
            db_name: tag_settings.get("COLUMN").cloned().unwrap_or_default(),
            bind_names: vec![raw.name.to_owned()],
            data_type: None,
            kind: None,
            primary_key,
            auto_increment,
            auto_increment_increment: 1,
            creatable: true,
            updatable: true,
            readable: true,
            auto_create_time: TimeMode::None,
            auto_update_time: TimeMode::None,
            has_default_value: auto_increment,
            default_value: String::new(),
            default_value_parsed: None,
            not_null: check_truth(tag_settings.get("NOT NULL"))
                || check_truth(tag_settings.get("NOTNULL")),
            unique: check_truth(tag_settings.get("UNIQUE")),
            comment: tag_settings.get("COMMENT").cloned().unwrap_or_default(),
            size: 0,
            precision: 0,
            scale: 0,
            index_path: vec![raw.index as i32],
            nullable: raw.nullable,
            raw_kind: raw.kind.clone(),
            serializer: None,
            serializer_name: String::new(),
            tag_settings,
        };

        if let Some(num) = field.tag_settings.get("AUTOINCREMENTINCREMENT") {
            field.auto_increment_increment = num.parse().unwrap_or(1);
        }

        if let Some(default) = field.tag_settings.get("DEFAULT") {
            field.has_default_value = true;
            field.default_value = default.trim().to_owned();
        }

        if let Some(num) = field.tag_settings.get("SIZE") {
            field.size = num.parse().unwrap_or(-1);
        }
        if let Some(num) = field.tag_settings.get("PRECISION") {
            field.precision = num.parse().unwrap_or(0);
        }
        if let Some(num) = field.tag_settings.get("SCALE") {
            field.scale = num.parse().unwrap_or(0);
        }

        // Serializer attachment: `serializer=` wins over the `json` alias,
        // and a field derived as serialized defaults to the json codec.
        let serializer_name = field
            .tag_settings
            .get("SERIALIZER")
            .cloned()
            .or_else(|| field.tag_settings.get("JSON").map(|_| "json".to_owned()))
            .or_else(|| {
                matches!(raw.kind, RawKind::Serialized).then(|| "json".to_owned())
            });

        if let Some(name) = serializer_name {
            match get_serializer(&name) {
                Some(serializer) => {
                    field.serializer = Some(serializer);
                    field.serializer_name = name.to_lowercase();
                    field.kind = Some(DataType::String);
                }
                None => {
                    return Err(Error::invalid_schema(format!(
                        "invalid serializer type {name}"
                    )))
                }
            }
        }

        if field.kind.is_none() {
            field.kind = match &raw.kind {
                RawKind::Bool => Some(DataType::Bool),
                RawKind::Int(_) => Some(DataType::Int),
                RawKind::Uint(_) => Some(DataType::Uint),
                RawKind::Float(_) => Some(DataType::Float),
                RawKind::Str => Some(DataType::String),
                RawKind::Bytes => Some(DataType::Bytes),
                RawKind::Time => Some(DataType::Time),
                RawKind::Serialized => Some(DataType::String),
                RawKind::Embedded(_) | RawKind::Relation { .. } => None,
            };
        }

        field.parse_default_value()?;
        field.setup_auto_time();

        field.data_type = field.kind.clone();
        if let Some(ty) = field.tag_settings.get("TYPE") {
            field.data_type = Some(match ty.to_lowercase().as_str() {
                "bool" => DataType::Bool,
                "int" => DataType::Int,
                "uint" => DataType::Uint,
                "float" => DataType::Float,
                "string" => DataType::String,
                "time" => DataType::Time,
                "bytes" => DataType::Bytes,
                _ => DataType::Custom(ty.clone()),
            });
        }

        if field.size == 0 {
            field.size = match raw.kind {
                RawKind::Int(bits) | RawKind::Uint(bits) | RawKind::Float(bits) => i64::from(bits),
                _ => 0,
            };
        }

        field.setup_permissions();

        if field.serializer.is_some()
            && (field.auto_create_time.is_set() || field.auto_update_time.is_set())
            && field.serializer_name != "unixtime"
        {
            return Err(Error::invalid_schema(format!(
                "field {} mixes auto time with serializer {}",
                field.name, field.serializer_name
            )));
        }

        Ok(field)
    }

    fn parse_default_value(&mut self) -> Result<()> {
        let default = self.default_value.clone();
        let skip = (default.contains('(') && default.contains(')'))
            || default.eq_ignore_ascii_case("null")
            || default.is_empty();
        if !self.has_default_value || skip {
            return Ok(());
        }

        let parse_error = |kind: &str| {
            Error::invalid_schema(format!(
                "failed to parse {default} as default value for {kind}"
            ))
        };

        self.default_value_parsed = Some(match self.kind.as_ref() {
            Some(DataType::Bool) => {
                Value::Bool(default.parse().map_err(|_| parse_error("bool"))?)
            }
            Some(DataType::Int) => Value::Int(default.parse().map_err(|_| parse_error("int"))?),
            Some(DataType::Uint) => {
                Value::Uint(default.parse().map_err(|_| parse_error("uint"))?)
            }
            Some(DataType::Float) => {
                Value::Float(default.parse().map_err(|_| parse_error("float"))?)
            }
            Some(DataType::String) => {
                let trimmed = default.trim_matches('\'').trim_matches('"').to_owned();
                self.default_value = trimmed.clone();
                Value::Str(trimmed)
            }
            Some(DataType::Time) => match DateTime::parse_from_rfc3339(&default) {
                Ok(t) => Value::Time(t.with_timezone(&Utc)),
                Err(_) => return Ok(()),
            },
            _ => return Ok(()),
        });

        Ok(())
    }

    fn setup_auto_time(&mut self) {
        let eligible = |kind: &Option<DataType>| {
            matches!(
                kind,
                Some(DataType::Time) | Some(DataType::Int) | Some(DataType::Uint)
            )
        };

        let mode_for = |kind: &Option<DataType>, sub: Option<&String>| {
            if matches!(kind, Some(DataType::Time)) {
                TimeMode::UnixTime
            } else {
                match sub.map(|s| s.to_uppercase()) {
                    Some(ref s) if s == "NANO" => TimeMode::UnixNanosecond,
                    Some(ref s) if s == "MILLI" => TimeMode::UnixMillisecond,
                    _ => TimeMode::UnixSecond,
                }
            }
        };

        let create_tag = self.tag_settings.get("AUTOCREATETIME").cloned();
        if check_truth(create_tag.as_ref())
            || (create_tag.is_none() && self.name == "CreatedAt" && eligible(&self.kind))
        {
            self.auto_create_time = mode_for(&self.kind, create_tag.as_ref());
        }

        let update_tag = self.tag_settings.get("AUTOUPDATETIME").cloned();
        if check_truth(update_tag.as_ref())
            || (update_tag.is_none() && self.name == "UpdatedAt" && eligible(&self.kind))
        {
            self.auto_update_time = mode_for(&self.kind, update_tag.as_ref());
        }
    }

    fn setup_permissions(&mut self) {
        if let Some(value) = self.tag_settings.get("-") {
            match value.trim().to_lowercase().as_str() {
                "-" | "all" => {
                    self.creatable = false;
                    self.updatable = false;
                    self.readable = false;
                    self.data_type = None;
                    self.kind = None;
                }
                _ => {}
            }
        }

        if let Some(value) = self.tag_settings.get("->") {
            self.creatable = false;
            self.updatable = false;
            self.readable = !value.eq_ignore_ascii_case("false");
        }

        if let Some(value) = self.tag_settings.get("<-").cloned() {
            self.creatable = true;
            self.updatable = true;

            if value != "<-" {
                if !value.contains("create") {
                    self.creatable = false;
                }
                if !value.contains("update") {
                    self.updatable = false;
                }
            }
        }
    }

    pub fn bind_name(&self) -> String {
        self.bind_names.join(".")
    }

    pub fn embedded(&self) -> bool {
        matches!(self.raw_kind, RawKind::Embedded(_))
    }

    pub fn relation(&self) -> bool {
        matches!(self.raw_kind, RawKind::Relation { .. })
    }

    fn step_offset(step: i32) -> usize {
        if step < 0 {
            (-step - 1) as usize
        } else {
            step as usize
        }
    }

    fn leaf_offset(&self) -> usize {
        Self::step_offset(*self.index_path.last().expect("field has an index path"))
    }

    fn container<'a>(&self, record: &'a dyn Record) -> Option<&'a dyn Record> {
        let mut current = record;
        for step in &self.index_path[..self.index_path.len() - 1] {
            current = current.record_at(Self::step_offset(*step))?;
        }
        Some(current)
    }

    fn container_mut<'a>(&self, record: &'a mut dyn Record) -> Result<&'a mut dyn Record> {
        let mut current = record;
        for step in &self.index_path[..self.index_path.len() - 1] {
            current = current
                .record_at_mut(Self::step_offset(*step))
                .ok_or_else(|| {
                    Error::invalid_field(format!("{} is not reachable", self.bind_name()))
                })?;
        }
        Ok(current)
    }

    /// Borrow the record this relation/embedded field points at, walking
    /// the full index path. `None` when an intermediate pointer is unset.
    pub fn record_ref<'a>(&self, record: &'a dyn Record) -> Option<&'a dyn Record> {
        let mut current = record;
        for step in &self.index_path {
            current = current.record_at(Self::step_offset(*step))?;
        }
        Some(current)
    }

    /// Mutable counterpart of [`Field::record_ref`]; allocates unset
    /// pointers along the way. `None` for collection-shaped relations.
    pub fn record_mut<'a>(&self, record: &'a mut dyn Record) -> Option<&'a mut dyn Record> {
        let mut current = record;
        for step in &self.index_path {
            current = current.record_at_mut(Self::step_offset(*step))?;
        }
        Some(current)
    }

    /// The field's current value and whether it is the zero value. An
    /// unset pointer embedding reads as zero.
    pub fn value_of(&self, record: &dyn Record) -> (Value, bool) {
        match self.container(record) {
            Some(container) => {
                let value = container.value_at(self.leaf_offset());
                let zero = value.is_zero();
                (value, zero)
            }
            None => (Value::Null, true),
        }
    }

    /// The value to bind for this field, routed through its serializer.
    pub fn db_value(&self, record: &dyn Record) -> Result<Value> {
        let (value, _) = self.value_of(record);
        match &self.serializer {
            Some(serializer) => serializer.value(self, value),
            None => Ok(value),
        }
    }

    /// Assign a value, normalizing across kinds: numeric conversions, time
    /// encodings for unix-time modes, string/bytes conversions.
    pub fn set(&self, record: &mut dyn Record, value: Value) -> Result<()> {
        let normalized = self.normalize(value)?;
        let leaf = self.leaf_offset();
        self.container_mut(record)?.set_at(leaf, normalized)
    }

    /// Route a scanned database value through the serializer, then assign.
    pub fn scan(&self, record: &mut dyn Record, db_value: Value) -> Result<()> {
        let value = match &self.serializer {
            Some(serializer) => serializer.scan(self, db_value)?,
            None => db_value,
        };
        self.set(record, value)
    }

    fn normalize(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        Ok(match &self.raw_kind {
            RawKind::Bool => Value::Bool(value.coerce_bool()?),
            RawKind::Int(_) => match value {
                Value::Time(t) => Value::Int(self.encode_time(t)),
                other => Value::Int(other.coerce_i64()?),
            },
            RawKind::Uint(_) => match value {
                Value::Time(t) => Value::Uint(self.encode_time(t) as u64),
                other => Value::Uint(other.coerce_u64()?),
            },
            RawKind::Float(_) => Value::Float(value.coerce_f64()?),
            RawKind::Str => Value::Str(value.coerce_string()?),
            RawKind::Bytes => Value::Bytes(value.coerce_bytes()?),
            RawKind::Time => Value::Time(value.coerce_time()?),
            RawKind::Serialized => Value::Json(value.coerce_json()?),
            RawKind::Embedded(_) | RawKind::Relation { .. } => {
                return Err(Error::invalid_field(format!(
                    "cannot assign a scalar to {}",
                    self.bind_name()
                )))
            }
        })
    }

    fn encode_time(&self, t: DateTime<Utc>) -> i64 {
        let mode = if self.auto_create_time.is_set() {
            self.auto_create_time
        } else {
            self.auto_update_time
        };

        match mode {
            TimeMode::UnixNanosecond => t.timestamp_nanos_opt().unwrap_or_default(),
            TimeMode::UnixMillisecond => t.timestamp_millis(),
            _ => t.timestamp(),
        }
    }
}
