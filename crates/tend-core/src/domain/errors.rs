//! Errors - エラー型と分類
//!
//! # 二層構造
//! - **StoreError**: ドキュメントストア境界のエラー（見つからない、は含まない）
//! - **DispatchError**: Dispatcher 境界のエラー（HTTP ステータスに写像される）
//!
//! 「見つからない」はエラーではなく `Ok(None)` / `Ok(false)` で表現します。
//! replay 判定の miss と、主リソースの miss を呼び出し側が明示的に分岐できるように。

use http::{Method, StatusCode};
use thiserror::Error;

/// StoreError はストア操作の失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// create-if-absent でキーが既に存在した
    #[error("document already exists: {0}")]
    Conflict(String),

    /// 接続・I/O 障害
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// ドキュメントのエンコード/デコード失敗
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// DispatchError はリクエスト単位の失敗
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(Method),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::BadRequest(_) => StatusCode::BAD_REQUEST,
            DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            DispatchError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// エラー body の `code`
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::BadRequest(_) => "BAD_REQUEST",
            DispatchError::NotFound(_) => "NOT_FOUND",
            DispatchError::MethodNotAllowed(_) => "METHOD_NOT_ALLOWED",
            DispatchError::Store(_) => "INTERNAL_ERROR",
        }
    }

    /// クライアントに見せるメッセージ（ストアの詳細は漏らさない）
    pub fn public_message(&self) -> String {
        match self {
            DispatchError::BadRequest(msg) | DispatchError::NotFound(msg) => msg.clone(),
            DispatchError::MethodNotAllowed(_) => "method not allowed".to_string(),
            DispatchError::Store(_) => "internal server error".to_string(),
        }
    }
}
