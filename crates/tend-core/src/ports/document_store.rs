//! DocumentContainer port - スキーマレスなドキュメントストア
//!
//! ドキュメントデータベースの「コンテナ」1 つ分の抽象化です。
//! 各ドキュメントはパーティションキー 1 つにつき 1 件（単一アイテムパーティション）。
//!
//! # 実装
//! - **InMemoryContainer**: 開発用・テスト用
//! - **FileContainer**: ディレクトリ 1 つ = コンテナ 1 つ

use async_trait::async_trait;

use crate::domain::StoreError;

/// DocumentContainer は JSON ドキュメントをキーで管理する
///
/// # 設計原則
/// - 見つからないことはエラーではない（`Ok(None)` / `Ok(false)`）
/// - `create` は create-if-absent。既存キーなら `StoreError::Conflict`
/// - `upsert` は上書きを許す
#[async_trait]
pub trait DocumentContainer: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// 全件スキャン（順序はストア依存）
    async fn query_all(&self) -> Result<Vec<serde_json::Value>, StoreError>;

    async fn create(&self, key: &str, document: serde_json::Value) -> Result<(), StoreError>;

    async fn upsert(&self, key: &str, document: serde_json::Value) -> Result<(), StoreError>;

    /// 削除できたら true、存在しなければ false
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}
