//! Request / Reply - トランスポート非依存のリクエストとレスポンス
//!
//! HTTP サーバー側はこの形に詰め替えて Dispatcher に渡し、
//! 返ってきた Reply をそのままレスポンスにします。

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use serde_json::json;

use crate::domain::{DispatchError, IdempotencyKey};

/// 冪等性トークンを運ぶヘッダ名
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// リソースコレクションのパス
pub const ITEMS_PATH: &str = "/items";

#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    idempotency_key: Option<IdempotencyKey>,
    body: Bytes,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            idempotency_key: None,
            body: Bytes::new(),
        }
    }

    /// HTTP のヘッダから組み立てる
    ///
    /// 空文字列や UTF-8 でない `Idempotency-Key` は「なし」と同じ扱い。
    pub fn from_parts(method: Method, path: &str, headers: &HeaderMap, body: Bytes) -> Self {
        let idempotency_key = headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(IdempotencyKey::parse);
        Self {
            method,
            path: path.to_string(),
            idempotency_key,
            body,
        }
    }

    pub fn with_idempotency_key(mut self, raw: &str) -> Self {
        self.idempotency_key = IdempotencyKey::parse(raw);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn idempotency_key(&self) -> Option<&IdempotencyKey> {
        self.idempotency_key.as_ref()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn route(&self) -> Route<'_> {
        Route::parse(&self.path)
    }
}

/// パスの解釈結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route<'a> {
    /// `/items`（`/items/` も含む: 空の id は id なし）
    Collection,
    /// `/items/{id}`
    Item(&'a str),
    Unknown,
}

impl<'a> Route<'a> {
    fn parse(path: &'a str) -> Self {
        let Some(rest) = path.strip_prefix(ITEMS_PATH) else {
            return Route::Unknown;
        };
        match rest {
            "" | "/" => Route::Collection,
            _ => match rest.strip_prefix('/') {
                Some(id) if !id.contains('/') => Route::Item(id),
                _ => Route::Unknown,
            },
        }
    }
}

/// Reply は Dispatcher の結果（ステータス + JSON body）
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    status: StatusCode,
    body: Option<serde_json::Value>,
}

impl Reply {
    pub fn ok(body: serde_json::Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: Some(body),
        }
    }

    pub fn created(body: serde_json::Value) -> Self {
        Self {
            status: StatusCode::CREATED,
            body: Some(body),
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            body: None,
        }
    }

    /// `{"code": ..., "message": ...}` 形式のエラー body
    pub fn from_error(error: &DispatchError) -> Self {
        Self {
            status: error.status(),
            body: Some(json!({
                "code": error.code(),
                "message": error.public_message(),
            })),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn into_parts(self) -> (StatusCode, Option<serde_json::Value>) {
        (self.status, self.body)
    }
}
