use crate::{Error, Result};

use chrono::{DateTime, TimeZone, Utc};

/// A database-level value.
///
/// Every field access, bound variable, and scanned column travels through
/// this tagged representation. Coercions between variants are explicit per
/// target kind rather than hidden in scan glue.
#[derive(Debug, Default, Clone, PartialEq)]
pub enum Value {
    #[default]
    Null,

    Bool(bool),

    /// Signed integer, widened to 64 bits
    Int(i64),

    /// Unsigned integer, widened to 64 bits
    Uint(u64),

    /// Floating point, widened to 64 bits
    Float(f64),

    Str(String),

    Bytes(Vec<u8>),

    /// An instant in time
    Time(DateTime<Utc>),

    /// The in-memory form of a field routed through a serializer codec
    Json(serde_json::Value),

    /// A list of values, expanded to a parenthesized bind group
    List(Vec<Value>),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Whether this is the zero value of its kind.
    ///
    /// Stands in for reflection-based zero checks: `Null` is always zero, and
    /// the zero time is the Unix epoch.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(v) => !v,
            Self::Int(v) => *v == 0,
            Self::Uint(v) => *v == 0,
            Self::Float(v) => *v == 0.0,
            Self::Str(v) => v.is_empty(),
            Self::Bytes(v) => v.is_empty(),
            Self::Time(v) => v.timestamp() == 0 && v.timestamp_subsec_nanos() == 0,
            Self::Json(v) => v.is_null(),
            Self::List(v) => v.is_empty(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Uint(_) => "uint",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Time(_) => "time",
            Self::Json(_) => "json",
            Self::List(_) => "list",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    fn conversion_error(&self, target: &str) -> Error {
        Error::invalid_value(format!("cannot convert {} to {target}", self.kind_name()))
    }

    pub fn coerce_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(v) => Ok(*v),
            Self::Int(v) => Ok(*v > 0),
            Self::Uint(v) => Ok(*v > 0),
            Self::Str(v) => v
                .parse::<bool>()
                .map_err(|_| self.conversion_error("bool")),
            _ => Err(self.conversion_error("bool")),
        }
    }

    pub fn coerce_i64(&self) -> Result<i64> {
        match self {
            Self::Int(v) => Ok(*v),
            Self::Uint(v) => i64::try_from(*v).map_err(|_| self.conversion_error("int")),
            Self::Float(v) => Ok(*v as i64),
            Self::Bool(v) => Ok(i64::from(*v)),
            Self::Str(v) => v.trim().parse().map_err(|_| self.conversion_error("int")),
            Self::Bytes(v) => std::str::from_utf8(v)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .ok_or_else(|| self.conversion_error("int")),
            Self::Time(v) => Ok(v.timestamp()),
            _ => Err(self.conversion_error("int")),
        }
    }

    pub fn coerce_u64(&self) -> Result<u64> {
        match self {
            Self::Uint(v) => Ok(*v),
            Self::Int(v) => u64::try_from(*v).map_err(|_| self.conversion_error("uint")),
            Self::Float(v) => Ok(*v as u64),
            Self::Bool(v) => Ok(u64::from(*v)),
            Self::Str(v) => v.trim().parse().map_err(|_| self.conversion_error("uint")),
            Self::Time(v) => u64::try_from(v.timestamp()).map_err(|_| self.conversion_error("uint")),
            _ => Err(self.conversion_error("uint")),
        }
    }

    pub fn coerce_f64(&self) -> Result<f64> {
        match self {
            Self::Float(v) => Ok(*v),
            Self::Int(v) => Ok(*v as f64),
            Self::Uint(v) => Ok(*v as f64),
            Self::Str(v) => v.trim().parse().map_err(|_| self.conversion_error("float")),
            _ => Err(self.conversion_error("float")),
        }
    }

    pub fn coerce_string(&self) -> Result<String> {
        match self {
            Self::Str(v) => Ok(v.clone()),
            Self::Bytes(v) => String::from_utf8(v.clone())
                .map_err(|_| self.conversion_error("string")),
            Self::Int(v) => Ok(v.to_string()),
            Self::Uint(v) => Ok(v.to_string()),
            Self::Float(v) => Ok(v.to_string()),
            Self::Bool(v) => Ok(v.to_string()),
            Self::Time(v) => Ok(v.to_rfc3339()),
            Self::Json(v) => serde_json::to_string(v).map_err(|_| self.conversion_error("string")),
            _ => Err(self.conversion_error("string")),
        }
    }

    pub fn coerce_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Self::Bytes(v) => Ok(v.clone()),
            Self::Str(v) => Ok(v.clone().into_bytes()),
            _ => Err(self.conversion_error("bytes")),
        }
    }

    pub fn coerce_time(&self) -> Result<DateTime<Utc>> {
        match self {
            Self::Time(v) => Ok(*v),
            Self::Int(v) => Utc
                .timestamp_opt(*v, 0)
                .single()
                .ok_or_else(|| self.conversion_error("time")),
            Self::Str(v) => DateTime::parse_from_rfc3339(v)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| self.conversion_error("time")),
            _ => Err(self.conversion_error("time")),
        }
    }

    pub fn coerce_json(&self) -> Result<serde_json::Value> {
        match self {
            Self::Json(v) => Ok(v.clone()),
            Self::Str(v) => serde_json::from_str(v).map_err(|_| self.conversion_error("json")),
            Self::Bytes(v) => serde_json::from_slice(v).map_err(|_| self.conversion_error("json")),
            Self::Null => Ok(serde_json::Value::Null),
            _ => Err(self.conversion_error("json")),
        }
    }

    /// Serialize an arbitrary in-memory value into the [`Value::Json`]
    /// carrier used by serializer-backed fields.
    pub fn from_serde<T: serde::Serialize>(value: &T) -> Value {
        serde_json::to_value(value)
            .map(Value::Json)
            .unwrap_or(Value::Null)
    }

    /// Deserialize the [`Value::Json`] carrier back into a concrete field
    /// type. Counterpart of [`Value::from_serde`], used by derived setters.
    pub fn into_serde<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        let json = match self {
            Self::Null => serde_json::Value::Null,
            other => other.coerce_json()?,
        };
        serde_json::from_value(json)
            .map_err(|err| Error::invalid_value(format!("failed to deserialize field: {err}")))
    }
}

macro_rules! from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(src: $ty) -> Self {
                    Self::Int(src as i64)
                }
            }
        )*
    };
}

macro_rules! from_uint {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(src: $ty) -> Self {
                    Self::Uint(src as u64)
                }
            }
        )*
    };
}

from_int!(i8, i16, i32, i64, isize);
from_uint!(u8, u16, u32, u64, usize);

impl From<bool> for Value {
    fn from(src: bool) -> Self {
        Self::Bool(src)
    }
}

impl From<f32> for Value {
    fn from(src: f32) -> Self {
        Self::Float(src as f64)
    }
}

impl From<f64> for Value {
    fn from(src: f64) -> Self {
        Self::Float(src)
    }
}

impl From<String> for Value {
    fn from(src: String) -> Self {
        Self::Str(src)
    }
}

impl From<&str> for Value {
    fn from(src: &str) -> Self {
        Self::Str(src.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(src: Vec<u8>) -> Self {
        Self::Bytes(src)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(src: DateTime<Utc>) -> Self {
        Self::Time(src)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(src: Option<T>) -> Self {
        match src {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

// Slices bind as parenthesized groups. `Vec<u8>` is deliberately absent: it
// binds as a scalar byte string above.
macro_rules! from_list {
    ($($ty:ty),*) => {
        $(
            impl From<Vec<$ty>> for Value {
                fn from(src: Vec<$ty>) -> Self {
                    Self::List(src.into_iter().map(Into::into).collect())
                }
            }
        )*
    };
}

from_list!(i32, i64, u32, u64, f64, bool, String, &str, Value);

impl core::fmt::Display for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "'{v}'"),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Self::Time(v) => write!(f, "'{}'", v.to_rfc3339()),
            Self::Json(v) => write!(f, "'{v}'"),
            Self::List(v) => {
                f.write_str("(")?;
                for (idx, item) in v.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values() {
        assert!(Value::Null.is_zero());
        assert!(Value::Int(0).is_zero());
        assert!(Value::Str(String::new()).is_zero());
        assert!(Value::Time(Utc.timestamp_opt(0, 0).unwrap()).is_zero());
        assert!(!Value::Int(10).is_zero());
        assert!(!Value::Bool(true).is_zero());
    }

    #[test]
    fn numeric_coercions() {
        assert_eq!(Value::Uint(7).coerce_i64().unwrap(), 7);
        assert_eq!(Value::Str("42".into()).coerce_i64().unwrap(), 42);
        assert_eq!(Value::Int(-1).coerce_u64().unwrap_err().to_string(),
            "invalid value: cannot convert int to uint");
    }

    #[test]
    fn empty_byte_vec_is_scalar() {
        // Vec<u8> binds as bytes, never as a list
        assert_eq!(Value::from(vec![0u8; 3]), Value::Bytes(vec![0, 0, 0]));
        assert_eq!(Value::from(vec![1i64, 2]), Value::List(vec![Value::Int(1), Value::Int(2)]));
    }
}
