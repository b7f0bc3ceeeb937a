//! PostgreSQL-backed datastore.
//!
//! All kinds share one `entities` table with a JSONB property column.
//! Transactions run at SERIALIZABLE so Postgres detects the read/write
//! conflicts the email index depends on; those surface as
//! [`StoreError::Aborted`].

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres};
use tracing::{debug, info};

use super::{Datastore, Direction, Entity, Key, KeyId, Properties, Query, StoreError, Transaction};

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";

fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if let Some(code) = db.code() {
            if matches!(
                code.as_ref(),
                SERIALIZATION_FAILURE | DEADLOCK_DETECTED | UNIQUE_VIOLATION
            ) {
                debug!(%code, "postgres reported a write conflict");
                return StoreError::Aborted;
            }
        }
    }
    StoreError::Database { source: err }
}

fn key_name(key: &Key, operation: &'static str) -> Result<String, StoreError> {
    key.require_complete(operation)?;
    key.id.encode().ok_or(StoreError::IncompleteKey {
        kind: key.kind,
        operation,
    })
}

fn into_entity(kind: super::Kind, raw_key: &str, properties: Value) -> Result<Entity, StoreError> {
    let properties = match properties {
        Value::Object(map) => map,
        _ => return Err(StoreError::NotAnObject { kind }),
    };
    Ok(Entity::new(
        Key {
            kind,
            id: KeyId::decode(raw_key)?,
        },
        properties,
    ))
}

const SELECT_ONE: &str = "SELECT properties FROM entities WHERE kind = $1 AND key_name = $2";
const UPSERT: &str = r#"
    INSERT INTO entities (kind, key_name, properties)
    VALUES ($1, $2, $3)
    ON CONFLICT (kind, key_name) DO UPDATE SET properties = EXCLUDED.properties
"#;
const DELETE: &str = "DELETE FROM entities WHERE kind = $1 AND key_name = $2";
const NEXT_ID: &str = "SELECT nextval('entity_ids')";

#[derive(Clone)]
pub struct PgDatastore {
    pool: PgPool,
}

impl PgDatastore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run migrations")?;
        info!("postgres datastore ready");
        Ok(Self { pool })
    }

    async fn complete(&self, key: Key) -> Result<Key, StoreError> {
        if key.is_complete() {
            return Ok(key);
        }
        let id: i64 = sqlx::query_scalar(NEXT_ID)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        Ok(Key::with_id(key.kind, id))
    }
}

#[async_trait]
impl Datastore for PgDatastore {
    async fn get(&self, key: &Key) -> Result<Option<Entity>, StoreError> {
        let name = key_name(key, "get")?;
        let row: Option<(Value,)> = sqlx::query_as(SELECT_ONE)
            .bind(key.kind.as_str())
            .bind(&name)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        row.map(|(props,)| into_entity(key.kind, &name, props))
            .transpose()
    }

    async fn put(&self, entity: Entity) -> Result<Key, StoreError> {
        let key = self.complete(entity.key).await?;
        let name = key_name(&key, "put")?;
        sqlx::query(UPSERT)
            .bind(key.kind.as_str())
            .bind(&name)
            .bind(Value::Object(entity.properties))
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(key)
    }

    async fn delete(&self, key: &Key) -> Result<(), StoreError> {
        let name = key_name(key, "delete")?;
        sqlx::query(DELETE)
            .bind(key.kind.as_str())
            .bind(&name)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Entity>, StoreError> {
        let containment: Properties = query
            .filters
            .iter()
            .map(|f| (f.field.clone(), f.value.clone()))
            .collect();
        let (field, direction) = match &query.order {
            Some(order) => (order.field.as_str(), order.direction),
            None => ("", Direction::Ascending),
        };
        let sql = format!(
            "SELECT key_name, properties FROM entities \
             WHERE kind = $1 AND properties @> $2 \
             ORDER BY properties -> $3 {}, key_name \
             LIMIT $4 OFFSET $5",
            match direction {
                Direction::Ascending => "ASC",
                Direction::Descending => "DESC",
            }
        );
        let rows: Vec<(String, Value)> = sqlx::query_as(&sql)
            .bind(query.kind.as_str())
            .bind(Value::Object(containment))
            .bind(field)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;
        rows.into_iter()
            .map(|(name, props)| into_entity(query.kind, &name, props))
            .collect()
    }

    async fn transaction(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(classify)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
        Ok(Box::new(PgTransaction {
            tx,
            store: self.clone(),
            written: Vec::new(),
        }))
    }
}

struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
    store: PgDatastore,
    written: Vec<Key>,
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn get(&mut self, key: &Key) -> Result<Option<Entity>, StoreError> {
        let name = key_name(key, "get")?;
        let row: Option<(Value,)> = sqlx::query_as(SELECT_ONE)
            .bind(key.kind.as_str())
            .bind(&name)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(classify)?;
        row.map(|(props,)| into_entity(key.kind, &name, props))
            .transpose()
    }

    async fn put(&mut self, entity: Entity) -> Result<(), StoreError> {
        // Sequence values are drawn outside the transaction, like any
        // Postgres sequence; gaps after a rollback are expected.
        let key = self.store.complete(entity.key).await?;
        let name = key_name(&key, "put")?;
        sqlx::query(UPSERT)
            .bind(key.kind.as_str())
            .bind(&name)
            .bind(Value::Object(entity.properties))
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        self.written.push(key);
        Ok(())
    }

    async fn delete(&mut self, key: &Key) -> Result<(), StoreError> {
        let name = key_name(key, "delete")?;
        sqlx::query(DELETE)
            .bind(key.kind.as_str())
            .bind(&name)
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<Vec<Key>, StoreError> {
        let PgTransaction { tx, written, .. } = *self;
        tx.commit().await.map_err(classify)?;
        Ok(written)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(classify)
    }
}
