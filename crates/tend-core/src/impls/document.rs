//! Document-backed stores - DocumentContainer 上の型付きアダプタ
//!
//! ResourceStore / IdempotencyStore を DocumentContainer に載せる薄い層です。
//! ここでやるのはパーティションキーの決定と serde による変換だけ。

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{IdempotencyKey, IdempotencyRecord, StoreError, TaskId, TaskRecord};
use crate::ports::{DocumentContainer, IdempotencyStore, ResourceStore};

/// TaskRecord をパーティションキー == id で保存する
pub struct DocumentResourceStore {
    container: Arc<dyn DocumentContainer>,
}

impl DocumentResourceStore {
    pub fn new(container: Arc<dyn DocumentContainer>) -> Self {
        Self { container }
    }
}

#[async_trait]
impl ResourceStore for DocumentResourceStore {
    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        match self.container.read(&id.to_string()).await? {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<TaskRecord>, StoreError> {
        self.container
            .query_all()
            .await?
            .into_iter()
            .map(|document| serde_json::from_value(document).map_err(StoreError::from))
            .collect()
    }

    async fn put(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.container
            .upsert(&record.id().to_string(), record.to_value())
            .await
    }

    async fn delete(&self, id: TaskId) -> Result<bool, StoreError> {
        self.container.delete(&id.to_string()).await
    }
}

/// IdempotencyRecord をパーティションキー == トークンで保存する
pub struct DocumentIdempotencyStore {
    container: Arc<dyn DocumentContainer>,
}

impl DocumentIdempotencyStore {
    pub fn new(container: Arc<dyn DocumentContainer>) -> Self {
        Self { container }
    }
}

#[async_trait]
impl IdempotencyStore for DocumentIdempotencyStore {
    async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>, StoreError> {
        match self.container.read(key.as_str()).await? {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, record: &IdempotencyRecord) -> Result<(), StoreError> {
        let document = serde_json::to_value(record)?;
        self.container.create(record.key.as_str(), document).await
    }
}
