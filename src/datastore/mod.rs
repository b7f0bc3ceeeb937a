//! Document-style datastore abstraction.
//!
//! Entities are JSON property maps addressed by a [`Key`] (kind + id or name).
//! Writes that must be atomic go through a [`Transaction`]: reads inside it
//! are tracked, and the commit fails with [`StoreError::Aborted`] when another
//! writer touched any of those keys in the meantime. Callers decide whether to
//! retry; nothing in this module does.

mod memory;
mod postgres;

use std::cmp::Ordering;
use std::fmt;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use memory::MemoryDatastore;
pub use postgres::PgDatastore;

/// Entity kinds stored by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Users,
    Emails,
    Microposts,
    Relationships,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Users => "users",
            Kind::Emails => "emails",
            Kind::Microposts => "microposts",
            Kind::Relationships => "relationships",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier part of a key. `Incomplete` keys get a numeric id from the
/// store when they are written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyId {
    Incomplete,
    Id(i64),
    Name(String),
}

impl KeyId {
    /// Text form used by backends that store keys as strings.
    pub(crate) fn encode(&self) -> Option<String> {
        match self {
            KeyId::Incomplete => None,
            KeyId::Id(id) => Some(format!("i:{id}")),
            KeyId::Name(name) => Some(format!("s:{name}")),
        }
    }

    pub(crate) fn decode(raw: &str) -> Result<Self, StoreError> {
        if let Some(id) = raw.strip_prefix("i:") {
            return id
                .parse()
                .map(KeyId::Id)
                .map_err(|_| StoreError::MalformedKey { raw: raw.to_string() });
        }
        if let Some(name) = raw.strip_prefix("s:") {
            return Ok(KeyId::Name(name.to_string()));
        }
        Err(StoreError::MalformedKey { raw: raw.to_string() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    pub kind: Kind,
    pub id: KeyId,
}

impl Key {
    pub fn incomplete(kind: Kind) -> Self {
        Self {
            kind,
            id: KeyId::Incomplete,
        }
    }

    pub fn with_id(kind: Kind, id: i64) -> Self {
        Self {
            kind,
            id: KeyId::Id(id),
        }
    }

    pub fn with_name(kind: Kind, name: impl Into<String>) -> Self {
        Self {
            kind,
            id: KeyId::Name(name.into()),
        }
    }

    pub fn is_complete(&self) -> bool {
        !matches!(self.id, KeyId::Incomplete)
    }

    /// Numeric id, if the key has one.
    pub fn numeric_id(&self) -> Option<i64> {
        match self.id {
            KeyId::Id(id) => Some(id),
            _ => None,
        }
    }

    pub(crate) fn require_complete(&self, operation: &'static str) -> Result<(), StoreError> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(StoreError::IncompleteKey {
                kind: self.kind,
                operation,
            })
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            KeyId::Incomplete => write!(f, "{}/<incomplete>", self.kind),
            KeyId::Id(id) => write!(f, "{}/{id}", self.kind),
            KeyId::Name(name) => write!(f, "{}/{name:?}", self.kind),
        }
    }
}

pub type Properties = Map<String, Value>;

/// A stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub key: Key,
    pub properties: Properties,
}

impl Entity {
    pub fn new(key: Key, properties: Properties) -> Self {
        Self { key, properties }
    }

    /// Builds an entity from any serializable record; the record must
    /// serialize to a JSON object.
    pub fn from_record<T: Serialize>(key: Key, record: &T) -> Result<Self, StoreError> {
        match serde_json::to_value(record)
            .map_err(|source| StoreError::Serialization { source })?
        {
            Value::Object(properties) => Ok(Self { key, properties }),
            _ => Err(StoreError::NotAnObject { kind: key.kind }),
        }
    }

    pub fn to_record<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(Value::Object(self.properties.clone()))
            .map_err(|source| StoreError::Serialization { source })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

/// Equality-filtered scan over one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub kind: Kind,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<i64>,
    pub offset: i64,
}

impl Query {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            filters: Vec::new(),
            order: None,
            limit: None,
            offset: 0,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order = Some(Order {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// Whether `entity` satisfies every filter of this query.
    pub(crate) fn matches(&self, entity: &Entity) -> bool {
        entity.key.kind == self.kind
            && self
                .filters
                .iter()
                .all(|f| entity.properties.get(&f.field) == Some(&f.value))
    }
}

/// Total order over JSON property values used for query ordering:
/// missing/null < bool < number < string < anything else.
pub(crate) fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or(f64::NAN)
                .partial_cmp(&y.as_f64().unwrap_or(f64::NAN))
                .unwrap_or(Ordering::Equal),
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// A concurrent writer touched a key this transaction depends on.
    #[error("transaction aborted by a conflicting write")]
    Aborted,

    #[error("cannot {operation} an incomplete {kind} key")]
    IncompleteKey {
        kind: Kind,
        operation: &'static str,
    },

    #[error("malformed stored key: {raw}")]
    MalformedKey { raw: String },

    #[error("{kind} record did not serialize to an object")]
    NotAnObject { kind: Kind },

    #[error("serialization failed")]
    Serialization {
        #[source]
        source: serde_json::Error,
    },

    #[error("database error")]
    Database {
        #[source]
        source: sqlx::Error,
    },
}

impl StoreError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, StoreError::Aborted)
    }
}

#[async_trait]
pub trait Datastore: Send + Sync {
    async fn get(&self, key: &Key) -> Result<Option<Entity>, StoreError>;

    /// Writes an entity outside any transaction and returns its complete key.
    async fn put(&self, entity: Entity) -> Result<Key, StoreError>;

    async fn delete(&self, key: &Key) -> Result<(), StoreError>;

    async fn query(&self, query: &Query) -> Result<Vec<Entity>, StoreError>;

    /// Opens an optimistic transaction. Dropping it without commit discards
    /// its writes.
    async fn transaction(&self) -> Result<Box<dyn Transaction>, StoreError>;
}

#[async_trait]
pub trait Transaction: Send {
    async fn get(&mut self, key: &Key) -> Result<Option<Entity>, StoreError>;

    async fn put(&mut self, entity: Entity) -> Result<(), StoreError>;

    async fn delete(&mut self, key: &Key) -> Result<(), StoreError>;

    /// Returns the complete keys of every `put`, in call order.
    async fn commit(self: Box<Self>) -> Result<Vec<Key>, StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_ids_round_trip_through_text_form() {
        for id in [KeyId::Id(42), KeyId::Name("bob@example.com".into())] {
            let raw = id.encode().expect("complete key");
            assert_eq!(KeyId::decode(&raw).unwrap(), id);
        }
        assert!(KeyId::Incomplete.encode().is_none());
        assert!(KeyId::decode("x:1").is_err());
        assert!(KeyId::decode("i:abc").is_err());
    }

    #[test]
    fn query_matches_only_equal_properties() {
        let mut props = Properties::new();
        props.insert("user_id".into(), json!(7));
        let entity = Entity::new(Key::with_id(Kind::Microposts, 1), props);

        assert!(Query::new(Kind::Microposts).filter("user_id", 7).matches(&entity));
        assert!(!Query::new(Kind::Microposts).filter("user_id", 8).matches(&entity));
        assert!(!Query::new(Kind::Users).matches(&entity));
    }

    #[test]
    fn values_order_numbers_numerically() {
        let (a, b) = (json!(9), json!(10));
        assert_eq!(compare_values(Some(&a), Some(&b)), Ordering::Less);
        assert_eq!(compare_values(None, Some(&a)), Ordering::Less);
        assert_eq!(
            compare_values(Some(&json!("b")), Some(&json!("a"))),
            Ordering::Greater
        );
    }

    #[test]
    fn entity_rejects_non_object_records() {
        let err = Entity::from_record(Key::incomplete(Kind::Users), &5).unwrap_err();
        assert!(matches!(err, StoreError::NotAnObject { kind: Kind::Users }));
    }
}
