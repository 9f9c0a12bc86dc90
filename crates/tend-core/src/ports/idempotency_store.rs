//! IdempotencyStore port - 冪等性キーの記録

use async_trait::async_trait;

use crate::domain::{IdempotencyKey, IdempotencyRecord, StoreError};

/// IdempotencyStore は IdempotencyRecord をトークンで管理する
///
/// # 設計原則
/// - `put` は条件付き create。既にキーがあれば `StoreError::Conflict` で失敗する
/// - この失敗が同一トークンの競合を検出する唯一の原子的な境界
/// - 更新・削除の操作は持たない（記録は不変）
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>, StoreError>;

    async fn put(&self, record: &IdempotencyRecord) -> Result<(), StoreError>;
}
