use loam_core::schema::{
    self, DataType, FromValue, HookFlags, Hooks, RawField, RawKind, Record, RecordDescriptor,
    SchemaCache, TimeMode,
};
use loam_core::{NamingStrategy, Result, Value};

use std::any::TypeId;
use std::sync::Arc;

macro_rules! raw_field {
    ($name:literal, $index:expr, $kind:expr) => {
        raw_field!($name, "", $index, $kind)
    };
    ($name:literal, $tag:literal, $index:expr, $kind:expr) => {
        RawField {
            name: $name,
            tag: $tag,
            index: $index,
            kind: $kind,
            nullable: false,
            pointer: false,
        }
    };
}

#[derive(Default)]
struct User {
    id: i64,
    uuid: String,
}

impl Hooks for User {}

impl Record for User {
    fn descriptor() -> RecordDescriptor {
        RecordDescriptor {
            name: "User",
            type_id: TypeId::of::<User>(),
            table: None,
            hooks: HookFlags::default(),
            fields: vec![
                raw_field!("ID", 0, RawKind::Int(64)),
                raw_field!("UUID", "primaryKey", 1, RawKind::Str),
            ],
        }
    }

    fn value_at(&self, index: usize) -> Value {
        match index {
            0 => Value::from(self.id),
            1 => Value::from(self.uuid.clone()),
            _ => Value::Null,
        }
    }

    fn set_at(&mut self, index: usize, value: Value) -> Result<()> {
        match index {
            0 => self.id = FromValue::from_value(value)?,
            1 => self.uuid = FromValue::from_value(value)?,
            _ => return Err(loam_core::Error::invalid_field("offset")),
        }
        Ok(())
    }
}

#[derive(Default)]
struct Counter {
    a: i32,
    b: i32,
}

impl Hooks for Counter {}

impl Record for Counter {
    fn descriptor() -> RecordDescriptor {
        RecordDescriptor {
            name: "Counter",
            type_id: TypeId::of::<Counter>(),
            table: None,
            hooks: HookFlags::default(),
            fields: vec![
                raw_field!("A", "primaryKey", 0, RawKind::Int(32)),
                raw_field!("B", "primaryKey;autoIncrement", 1, RawKind::Int(32)),
            ],
        }
    }

    fn value_at(&self, index: usize) -> Value {
        match index {
            0 => Value::from(self.a),
            1 => Value::from(self.b),
            _ => Value::Null,
        }
    }

    fn set_at(&mut self, index: usize, value: Value) -> Result<()> {
        match index {
            0 => self.a = FromValue::from_value(value)?,
            1 => self.b = FromValue::from_value(value)?,
            _ => return Err(loam_core::Error::invalid_field("offset")),
        }
        Ok(())
    }
}

#[derive(Default)]
struct Post {
    id: u64,
    title: String,
    created_at: i64,
}

impl Hooks for Post {}

impl Record for Post {
    fn descriptor() -> RecordDescriptor {
        RecordDescriptor {
            name: "Post",
            type_id: TypeId::of::<Post>(),
            table: Some("articles"),
            hooks: HookFlags::default(),
            fields: vec![
                raw_field!("ID", 0, RawKind::Uint(64)),
                raw_field!("Title", "size=200", 1, RawKind::Str),
                raw_field!("CreatedAt", "autoCreateTime=nano", 2, RawKind::Int(64)),
            ],
        }
    }

    fn value_at(&self, index: usize) -> Value {
        match index {
            0 => Value::from(self.id),
            1 => Value::from(self.title.clone()),
            2 => Value::from(self.created_at),
            _ => Value::Null,
        }
    }

    fn set_at(&mut self, index: usize, value: Value) -> Result<()> {
        match index {
            0 => self.id = FromValue::from_value(value)?,
            1 => self.title = FromValue::from_value(value)?,
            2 => self.created_at = FromValue::from_value(value)?,
            _ => return Err(loam_core::Error::invalid_field("offset")),
        }
        Ok(())
    }
}

#[derive(Default)]
struct Address {
    city: String,
    zip: String,
}

impl Hooks for Address {}

impl Record for Address {
    fn descriptor() -> RecordDescriptor {
        RecordDescriptor {
            name: "Address",
            type_id: TypeId::of::<Address>(),
            table: None,
            hooks: HookFlags::default(),
            fields: vec![
                raw_field!("City", 0, RawKind::Str),
                raw_field!("Zip", "column=postcode", 1, RawKind::Str),
            ],
        }
    }

    fn value_at(&self, index: usize) -> Value {
        match index {
            0 => Value::from(self.city.clone()),
            1 => Value::from(self.zip.clone()),
            _ => Value::Null,
        }
    }

    fn set_at(&mut self, index: usize, value: Value) -> Result<()> {
        match index {
            0 => self.city = FromValue::from_value(value)?,
            1 => self.zip = FromValue::from_value(value)?,
            _ => return Err(loam_core::Error::invalid_field("offset")),
        }
        Ok(())
    }
}

#[derive(Default)]
struct Customer {
    name: String,
    home: Option<Address>,
}

impl Hooks for Customer {}

impl Record for Customer {
    fn descriptor() -> RecordDescriptor {
        RecordDescriptor {
            name: "Customer",
            type_id: TypeId::of::<Customer>(),
            table: None,
            hooks: HookFlags::default(),
            fields: vec![
                raw_field!("Name", 0, RawKind::Str),
                RawField {
                    name: "Home",
                    tag: "embedded;embeddedPrefix=home_",
                    index: 1,
                    kind: RawKind::Embedded(Address::descriptor),
                    nullable: true,
                    pointer: true,
                },
            ],
        }
    }

    fn value_at(&self, index: usize) -> Value {
        match index {
            0 => Value::from(self.name.clone()),
            _ => Value::Null,
        }
    }

    fn set_at(&mut self, index: usize, value: Value) -> Result<()> {
        match index {
            0 => self.name = FromValue::from_value(value)?,
            _ => return Err(loam_core::Error::invalid_field("offset")),
        }
        Ok(())
    }

    fn record_at(&self, index: usize) -> Option<&dyn Record> {
        match index {
            1 => self.home.as_ref().map(|home| home as &dyn Record),
            _ => None,
        }
    }

    fn record_at_mut(&mut self, index: usize) -> Option<&mut dyn Record> {
        match index {
            1 => Some(self.home.get_or_insert_with(Default::default)),
            _ => None,
        }
    }
}

fn parse<T: Record>() -> Arc<schema::Schema> {
    let cache = SchemaCache::new();
    schema::parse::<T>(&cache, &NamingStrategy::default()).unwrap()
}

#[test]
fn cache_returns_the_same_schema() {
    let cache = SchemaCache::new();
    let namer = NamingStrategy::default();
    let first = schema::parse::<User>(&cache, &namer).unwrap();
    let second = schema::parse::<User>(&cache, &namer).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn table_alias_caches_separately() {
    let cache = SchemaCache::new();
    let namer = NamingStrategy::default();
    let plain = schema::parse::<User>(&cache, &namer).unwrap();
    let aliased = schema::parse_with_table::<User>(&cache, &namer, Some("people")).unwrap();

    assert!(!Arc::ptr_eq(&plain, &aliased));
    assert_eq!(plain.table, "users");
    assert_eq!(aliased.table, "people");

    let again = schema::parse_with_table::<User>(&cache, &namer, Some("people")).unwrap();
    assert!(Arc::ptr_eq(&aliased, &again));
}

#[test]
fn explicit_primary_beats_the_id_heuristic() {
    let schema = parse::<User>();
    let prioritized = schema.prioritized_primary_field.as_ref().unwrap();
    assert_eq!(prioritized.name, "UUID");
    assert_eq!(prioritized.db_name, "uuid");
    assert_eq!(schema.primary_fields.len(), 1);
}

#[test]
fn auto_increment_primary_wins_among_composites() {
    let schema = parse::<Counter>();
    let prioritized = schema.prioritized_primary_field.as_ref().unwrap();
    assert_eq!(prioritized.name, "B");
    assert_eq!(schema.primary_fields.len(), 2);
}

#[test]
fn integer_id_becomes_auto_increment_with_db_default() {
    let schema = parse::<Post>();
    let id = schema.look_up_field("id").unwrap();
    assert!(id.primary_key);
    assert!(id.auto_increment);
    assert!(id.has_default_value);
    assert!(schema
        .fields_with_default_db_value
        .iter()
        .any(|field| field.name == "ID"));
}

#[test]
fn explicit_table_name_overrides_the_namer() {
    let schema = parse::<Post>();
    assert_eq!(schema.table, "articles");
    assert_eq!(parse::<User>().table, "users");
}

#[test]
fn created_at_nano_mode() {
    let schema = parse::<Post>();
    let created_at = schema.look_up_field("created_at").unwrap();
    assert_eq!(created_at.auto_create_time, TimeMode::UnixNanosecond);
}

#[test]
fn embedded_fields_inline_with_prefix() {
    let schema = parse::<Customer>();
    assert_eq!(schema.db_names, vec!["name", "home_city", "home_postcode"]);

    let city = schema.look_up_field("home_city").unwrap();
    assert_eq!(city.bind_names, vec!["Home", "City"]);
    // pointer embedding: negative first step, offset -(-2)-1 = 1
    assert_eq!(city.index_path, vec![-2, 0]);
    assert_eq!(city.data_type, Some(DataType::String));
}

#[test]
fn embedded_pointer_allocates_on_write() {
    let schema = parse::<Customer>();
    let city = schema.look_up_field("home_city").unwrap();

    let mut customer = Customer::default();
    let (_, zero) = city.value_of(&customer);
    assert!(zero);

    city.set(&mut customer, Value::from("Berlin")).unwrap();
    assert_eq!(customer.home.as_ref().unwrap().city, "Berlin");

    let (value, zero) = city.value_of(&customer);
    assert!(!zero);
    assert_eq!(value, Value::from("Berlin"));
}

#[test]
fn parse_error_poisons_then_retries() {
    #[derive(Default)]
    struct Broken {
        payload: String,
    }

    impl Hooks for Broken {}

    impl Record for Broken {
        fn descriptor() -> RecordDescriptor {
            RecordDescriptor {
                name: "Broken",
                type_id: TypeId::of::<Broken>(),
                table: None,
                hooks: HookFlags::default(),
                fields: vec![raw_field!(
                    "Payload",
                    "serializer=missing",
                    0,
                    RawKind::Serialized
                )],
            }
        }

        fn value_at(&self, _index: usize) -> Value {
            Value::from(self.payload.clone())
        }

        fn set_at(&mut self, _index: usize, value: Value) -> Result<()> {
            self.payload = FromValue::from_value(value)?;
            Ok(())
        }
    }

    let cache = SchemaCache::new();
    let namer = NamingStrategy::default();

    let first = schema::parse::<Broken>(&cache, &namer);
    assert!(first.is_err());

    // The failed entry was removed before signalling: a retry re-parses and
    // fails the same way instead of observing a cached error.
    let second = schema::parse::<Broken>(&cache, &namer);
    assert!(second.is_err());
}

#[test]
fn unix_time_setter_encodes_per_mode() {
    let schema = parse::<Post>();
    let created_at = schema.look_up_field("created_at").unwrap();

    let mut post = Post::default();
    let now = chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2024, 1, 2, 3, 4, 5).unwrap();
    created_at.set(&mut post, Value::Time(now)).unwrap();
    assert_eq!(post.created_at, now.timestamp_nanos_opt().unwrap());
}
