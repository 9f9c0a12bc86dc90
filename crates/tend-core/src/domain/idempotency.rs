//! Idempotency - 冪等性キーと、その記録
//!
//! クライアントが `Idempotency-Key` ヘッダで送るトークンと、
//! 「そのトークンで何を実行し、何を返したか」の記録を定義します。
//!
//! # 不変条件
//! - IdempotencyRecord は対応する変更が成功した後に一度だけ書かれる
//! - 書いた後は更新も削除もしない

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::TaskId;

/// クライアントが供給する不透明なトークン（パーティションキーを兼ねる）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// 空文字列は「キーなし」と同じ扱いなので None
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            None
        } else {
            Some(Self(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 記録された変更の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => f.write_str("create"),
            Operation::Delete => f.write_str("delete"),
        }
    }
}

/// IdempotencyRecord は「このトークンの操作は適用済み」という証跡
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdempotencyRecord {
    #[serde(rename = "id")]
    pub key: IdempotencyKey,
    pub operation: Operation,
    pub resource_id: Option<TaskId>,
    /// replay 時にそのまま返す body（delete は null）
    pub response: Option<serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn created(
        key: IdempotencyKey,
        resource_id: TaskId,
        response: serde_json::Value,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            operation: Operation::Create,
            resource_id: Some(resource_id),
            response: Some(response),
            recorded_at,
        }
    }

    pub fn deleted(key: IdempotencyKey, resource_id: TaskId, recorded_at: DateTime<Utc>) -> Self {
        Self {
            key,
            operation: Operation::Delete,
            resource_id: Some(resource_id),
            response: None,
            recorded_at,
        }
    }
}
