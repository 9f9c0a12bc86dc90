//! InMemoryContainer - 開発用のドキュメントコンテナ
//!
//! プロセスが落ちれば消えます。テストと `STORE_ENDPOINT=memory` で使います。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::StoreError;
use crate::ports::DocumentContainer;

/// InMemoryContainer は HashMap<key, document> を RwLock で守る
///
/// # 実装詳細
/// - ロックは map 操作の間だけ保持する（ロックを跨いで await しない）
/// - `create` の存在確認と挿入は同じ書き込みロックの中で行うので原子的
#[derive(Clone, Default)]
pub struct InMemoryContainer {
    documents: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl InMemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentContainer for InMemoryContainer {
    async fn read(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn query_all(&self) -> Result<Vec<serde_json::Value>, StoreError> {
        Ok(self.documents.read().await.values().cloned().collect())
    }

    async fn create(&self, key: &str, document: serde_json::Value) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        if documents.contains_key(key) {
            return Err(StoreError::Conflict(key.to_string()));
        }
        documents.insert(key.to_string(), document);
        Ok(())
    }

    async fn upsert(&self, key: &str, document: serde_json::Value) -> Result<(), StoreError> {
        self.documents
            .write()
            .await
            .insert(key.to_string(), document);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.documents.write().await.remove(key).is_some())
    }
}
