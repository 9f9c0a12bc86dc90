//! ResourceStore port - TaskRecord の正本

use async_trait::async_trait;

use crate::domain::{StoreError, TaskId, TaskRecord};

/// ResourceStore は TaskRecord を id（= パーティションキー）で管理する
///
/// Dispatcher は `put` を新規採番した id でしか呼ばないので、
/// 実質的には create-only として使われます。
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError>;

    async fn list(&self) -> Result<Vec<TaskRecord>, StoreError>;

    /// create-or-overwrite
    async fn put(&self, record: &TaskRecord) -> Result<(), StoreError>;

    /// 削除できたら true、存在しなければ false
    async fn delete(&self, id: TaskId) -> Result<bool, StoreError>;
}
