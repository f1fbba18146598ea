use super::rows::MirrorRecordRow;
use crate::application::ports::MirrorStore;
use crate::domain::value_objects::Collection;
use crate::infrastructure::database::ConnectionPool;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;

/// `MirrorStore` backed by the `mirror_records` table. Each call is a single
/// statement, so it is committed before the call returns.
#[derive(Clone)]
pub struct SqliteMirrorStore {
    pool: ConnectionPool,
}

impl SqliteMirrorStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &SqlitePool {
        self.pool.get_pool()
    }

    fn decode_body(collection: Collection, row: MirrorRecordRow) -> Result<Value, AppError> {
        serde_json::from_str(&row.body).map_err(|err| {
            AppError::DeserializationError(format!(
                "Corrupt record {collection}/{}: {err}",
                row.record_key
            ))
        })
    }
}

#[async_trait]
impl MirrorStore for SqliteMirrorStore {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>, AppError> {
        let row = sqlx::query_as::<_, MirrorRecordRow>(
            r#"
            SELECT record_key, body
            FROM mirror_records
            WHERE collection = ?1 AND record_key = ?2
            "#,
        )
        .bind(collection.as_str())
        .bind(key)
        .fetch_optional(self.pool())
        .await?;

        row.map(|row| Self::decode_body(collection, row)).transpose()
    }

    async fn set(
        &self,
        collection: Collection,
        key: &str,
        value: Value,
    ) -> Result<Value, AppError> {
        if key.trim().is_empty() {
            return Err(AppError::InvalidInput("Record key cannot be empty".to_string()));
        }
        if value.is_null() {
            return Err(AppError::InvalidInput(format!(
                "Refusing to store null for {collection}/{key}"
            )));
        }

        let body = serde_json::to_string(&value)?;
        sqlx::query(
            r#"
            INSERT INTO mirror_records (collection, record_key, body, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(collection, record_key) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(collection.as_str())
        .bind(key)
        .bind(&body)
        .bind(Utc::now().timestamp_millis())
        .execute(self.pool())
        .await?;

        tracing::trace!(target: "store::sqlite", %collection, key, "record stored");
        Ok(value)
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<Value>, AppError> {
        let rows = sqlx::query_as::<_, MirrorRecordRow>(
            r#"
            SELECT record_key, body
            FROM mirror_records
            WHERE collection = ?1
            ORDER BY record_key
            "#,
        )
        .bind(collection.as_str())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| Self::decode_body(collection, row))
            .collect()
    }

    async fn remove(&self, collection: Collection, key: &str) -> Result<(), AppError> {
        let result =
            sqlx::query("DELETE FROM mirror_records WHERE collection = ?1 AND record_key = ?2")
                .bind(collection.as_str())
                .bind(key)
                .execute(self.pool())
                .await?;

        if result.rows_affected() > 0 {
            tracing::trace!(target: "store::sqlite", %collection, key, "record removed");
        }
        Ok(())
    }

    async fn clear(&self, collection: Collection) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM mirror_records WHERE collection = ?1")
            .bind(collection.as_str())
            .execute(self.pool())
            .await?;

        tracing::debug!(
            target: "store::sqlite",
            %collection,
            removed = result.rows_affected(),
            "collection cleared"
        );
        Ok(())
    }

    async fn list_keys(&self, collection: Collection) -> Result<Vec<String>, AppError> {
        let keys = sqlx::query_scalar::<_, String>(
            "SELECT record_key FROM mirror_records WHERE collection = ?1 ORDER BY record_key",
        )
        .bind(collection.as_str())
        .fetch_all(self.pool())
        .await?;
        Ok(keys)
    }
}
