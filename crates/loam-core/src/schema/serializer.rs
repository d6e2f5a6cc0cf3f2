use super::field::Field;
use crate::{Error, Result, Value};

use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

/// A named codec attached to a field: `scan` decodes the database value into
/// the field's in-memory form, `value` encodes the in-memory form for
/// binding.
pub trait Serializer: Send + Sync {
    fn scan(&self, field: &Field, db_value: Value) -> Result<Value>;

    fn value(&self, field: &Field, field_value: Value) -> Result<Value>;
}

fn registry() -> &'static RwLock<HashMap<String, Arc<dyn Serializer>>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, Arc<dyn Serializer>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<String, Arc<dyn Serializer>> = HashMap::new();
        map.insert("json".to_owned(), Arc::new(JsonSerializer));
        map.insert("unixtime".to_owned(), Arc::new(UnixSecondSerializer));
        map.insert("bincode".to_owned(), Arc::new(BincodeSerializer));
        RwLock::new(map)
    })
}

/// Register a codec under a case-insensitive name. Registration happens at
/// initialization; the registry is effectively immutable afterwards.
pub fn register_serializer(name: &str, serializer: Arc<dyn Serializer>) {
    registry()
        .write()
        .expect("serializer registry poisoned")
        .insert(name.to_lowercase(), serializer);
}

pub fn get_serializer(name: &str) -> Option<Arc<dyn Serializer>> {
    registry()
        .read()
        .expect("serializer registry poisoned")
        .get(&name.to_lowercase())
        .cloned()
}

/// Encodes the field as a JSON text column.
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn scan(&self, _field: &Field, db_value: Value) -> Result<Value> {
        match db_value {
            Value::Null => Ok(Value::Null),
            Value::Str(text) if text.is_empty() => Ok(Value::Null),
            Value::Bytes(bytes) if bytes.is_empty() => Ok(Value::Null),
            Value::Str(text) => serde_json::from_str(&text)
                .map(Value::Json)
                .map_err(|err| Error::invalid_value(format!("failed to decode JSON: {err}"))),
            Value::Bytes(bytes) => serde_json::from_slice(&bytes)
                .map(Value::Json)
                .map_err(|err| Error::invalid_value(format!("failed to decode JSON: {err}"))),
            other => Err(Error::invalid_value(format!(
                "cannot decode {} as JSON",
                other.kind_name()
            ))),
        }
    }

    fn value(&self, field: &Field, field_value: Value) -> Result<Value> {
        let json = field_value.coerce_json()?;
        if json.is_null() {
            // NOT NULL columns store an empty string instead of NULL
            if field.not_null {
                return Ok(Value::Str(String::new()));
            }
            return Ok(Value::Null);
        }

        serde_json::to_string(&json)
            .map(Value::Str)
            .map_err(|err| Error::invalid_value(format!("failed to encode JSON: {err}")))
    }
}

/// Stores an integer field as a native time column counting Unix seconds.
pub struct UnixSecondSerializer;

impl Serializer for UnixSecondSerializer {
    fn scan(&self, _field: &Field, db_value: Value) -> Result<Value> {
        match db_value {
            Value::Null => Ok(Value::Null),
            Value::Time(t) => Ok(Value::Int(t.timestamp())),
            Value::Int(n) => Ok(Value::Int(n)),
            Value::Uint(n) => Ok(Value::Int(n as i64)),
            other => Err(Error::invalid_value(format!(
                "cannot decode {} as unix seconds",
                other.kind_name()
            ))),
        }
    }

    fn value(&self, _field: &Field, field_value: Value) -> Result<Value> {
        let seconds = match field_value {
            Value::Null => return Ok(Value::Null),
            Value::Int(n) => n,
            Value::Uint(n) => n as i64,
            Value::Json(serde_json::Value::Number(n)) => n.as_i64().ok_or_else(|| {
                Error::invalid_value("unix-second serializer requires an integer field")
            })?,
            other => {
                return Err(Error::invalid_value(format!(
                    "invalid field type {} for unix-second serializer",
                    other.kind_name()
                )))
            }
        };

        Utc.timestamp_opt(seconds, 0)
            .single()
            .map(Value::Time)
            .ok_or_else(|| Error::invalid_value(format!("{seconds} is out of range for a time")))
    }
}

/// Binary codec over the JSON object model.
pub struct BincodeSerializer;

impl Serializer for BincodeSerializer {
    fn scan(&self, _field: &Field, db_value: Value) -> Result<Value> {
        match db_value {
            Value::Null => Ok(Value::Null),
            Value::Bytes(bytes) if bytes.is_empty() => Ok(Value::Null),
            Value::Bytes(bytes) => bincode::deserialize::<serde_json::Value>(&bytes)
                .map(Value::Json)
                .map_err(|err| Error::invalid_value(format!("failed to decode bincode: {err}"))),
            other => Err(Error::invalid_value(format!(
                "cannot decode {} as bincode",
                other.kind_name()
            ))),
        }
    }

    fn value(&self, _field: &Field, field_value: Value) -> Result<Value> {
        let json = field_value.coerce_json()?;
        bincode::serialize(&json)
            .map(Value::Bytes)
            .map_err(|err| Error::invalid_value(format!("failed to encode bincode: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::record::{RawField, RawKind};

    fn field(tag: &'static str, kind: RawKind) -> Field {
        Field::parse(&RawField {
            name: "Payload",
            tag,
            index: 0,
            kind,
            nullable: false,
            pointer: false,
        })
        .unwrap()
    }

    #[test]
    fn json_round_trips_through_text() {
        let f = field("serializer=json", RawKind::Serialized);
        let codec = JsonSerializer;

        let encoded = codec
            .value(&f, Value::Json(serde_json::json!({"a": 1})))
            .unwrap();
        assert_eq!(encoded, Value::Str("{\"a\":1}".to_owned()));

        let decoded = codec.scan(&f, encoded).unwrap();
        assert_eq!(decoded, Value::Json(serde_json::json!({"a": 1})));
    }

    #[test]
    fn json_null_respects_not_null() {
        let nullable = field("serializer=json", RawKind::Serialized);
        let required = field("serializer=json;not null", RawKind::Serialized);
        let codec = JsonSerializer;

        assert_eq!(codec.value(&nullable, Value::Null).unwrap(), Value::Null);
        assert_eq!(
            codec.value(&required, Value::Null).unwrap(),
            Value::Str(String::new())
        );
    }

    #[test]
    fn unixtime_binds_integer_fields_as_time() {
        let f = field("serializer=unixtime", RawKind::Int(64));
        let codec = UnixSecondSerializer;

        let bound = codec.value(&f, Value::Int(1_700_000_000)).unwrap();
        assert_eq!(bound, Value::Time(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));

        let scanned = codec.scan(&f, bound).unwrap();
        assert_eq!(scanned, Value::Int(1_700_000_000));
    }

    #[test]
    fn unknown_serializer_fails_parse() {
        let err = Field::parse(&RawField {
            name: "Payload",
            tag: "serializer=nope",
            index: 0,
            kind: RawKind::Serialized,
            nullable: false,
            pointer: false,
        })
        .unwrap_err();
        assert!(err.to_string().contains("invalid serializer type"));
    }
}
