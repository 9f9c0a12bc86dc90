//! TaskRecord - ストアに保存されるタスク
//!
//! クライアントから受け取った任意のフィールド（JSON object）に、
//! サーバーが採番した `id` を付与したものです。
//! フィールドの中身は解釈しません（スキーマ検証は行わない）。

use serde::{Deserialize, Serialize};

use super::ids::TaskId;

/// Client-supplied fields of a task (opaque).
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// TaskRecord はパーティションキー == id の単一ドキュメント
///
/// # ワイヤ形式
/// `{"id": "task-...", ...client fields}` というフラットな object。
/// クライアントが `id` を送ってきた場合はサーバー採番の値で上書きします。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    id: TaskId,
    #[serde(flatten)]
    fields: Payload,
}

impl TaskRecord {
    /// 採番済みの id とクライアントのフィールドから作成
    pub fn new(id: TaskId, mut fields: Payload) -> Self {
        // flatten 時に `id` が二重にならないよう取り除く
        fields.remove("id");
        Self { id, fields }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn fields(&self) -> &Payload {
        &self.fields
    }

    /// クライアントへ返す JSON 表現（idempotency record にもこの形で保存する）
    pub fn to_value(&self) -> serde_json::Value {
        let mut object = self.fields.clone();
        object.insert("id".to_string(), serde_json::Value::String(self.id.to_string()));
        serde_json::Value::Object(object)
    }
}
