use crate::domain::value_objects::Collection;
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Durable per-collection key/value records.
///
/// Every call is atomic on its own and committed before it returns. There are
/// no cross-call transactions, so read-decide-write sequences must tolerate
/// interleaving writers.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>, AppError>;
    async fn set(&self, collection: Collection, key: &str, value: Value)
        -> Result<Value, AppError>;
    async fn get_all(&self, collection: Collection) -> Result<Vec<Value>, AppError>;
    async fn remove(&self, collection: Collection, key: &str) -> Result<(), AppError>;
    async fn clear(&self, collection: Collection) -> Result<(), AppError>;
    async fn list_keys(&self, collection: Collection) -> Result<Vec<String>, AppError>;
}

pub async fn load_record<T: DeserializeOwned>(
    store: &dyn MirrorStore,
    collection: Collection,
    key: &str,
) -> Result<Option<T>, AppError> {
    match store.get(collection, key).await? {
        Some(value) => decode_record(collection, key, value).map(Some),
        None => Ok(None),
    }
}

pub async fn load_all_records<T: DeserializeOwned>(
    store: &dyn MirrorStore,
    collection: Collection,
) -> Result<Vec<T>, AppError> {
    store
        .get_all(collection)
        .await?
        .into_iter()
        .map(|value| decode_record(collection, "*", value))
        .collect()
}

pub async fn save_record<T: Serialize + Sync>(
    store: &dyn MirrorStore,
    collection: Collection,
    key: &str,
    record: &T,
) -> Result<(), AppError> {
    let value = serde_json::to_value(record)
        .map_err(|err| AppError::SerializationError(err.to_string()))?;
    store.set(collection, key, value).await?;
    Ok(())
}

fn decode_record<T: DeserializeOwned>(
    collection: Collection,
    key: &str,
    value: Value,
) -> Result<T, AppError> {
    serde_json::from_value(value).map_err(|err| {
        AppError::DeserializationError(format!("{collection}/{key}: {err}"))
    })
}
