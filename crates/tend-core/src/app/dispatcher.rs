//! Dispatcher - 冪等性を考慮したリクエストの振り分け
//!
//! (method, path, idempotency key, body) を Reply に写像します。
//! 変更系（POST / DELETE）は同じトークンで何度送られても一度しか適用しません。
//!
//! # 変更系の流れ
//! 1. IdempotencyStore をトークンで引く。あれば記録済みの結果を replay
//! 2. なければ ResourceStore に変更を適用
//! 3. IdempotencyStore に記録を条件付き create
//!
//! 1 の読み取りは高速経路にすぎず、同じトークンの同時リクエストは
//! 両方とも 2 に進みえます。競合の決着は 3 の条件付き create が付けます
//! （負けた側は自分の変更を打ち消し、勝った側の結果を replay する）。
//!
//! # 既知の隙間
//! 2 が成功して 3 が StoreError で失敗すると 500 を返しますが、変更は残ります。
//! 同じトークンでの再送は create なら重複レコードを作り、delete なら 404 になります。

use std::sync::Arc;

use http::Method;
use tracing::{debug, error, info, warn};

use super::request::{Reply, Request, Route};
use crate::domain::{
    DispatchError, IdempotencyKey, IdempotencyRecord, Operation, Payload, StoreError, TaskId,
    TaskRecord,
};
use crate::ports::{Clock, IdGenerator, IdempotencyStore, ResourceStore};

const ITEM_NOT_FOUND: &str = "item not found";

/// Dispatcher はリクエスト間で状態を持たない
///
/// 状態はすべてストアにあり、ここにあるのは注入された capability だけです。
/// `Arc<Dispatcher>` として複数のリクエストから同時に使われます。
pub struct Dispatcher {
    resources: Arc<dyn ResourceStore>,
    idempotency: Arc<dyn IdempotencyStore>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(
        resources: Arc<dyn ResourceStore>,
        idempotency: Arc<dyn IdempotencyStore>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            resources,
            idempotency,
            ids,
            clock,
        }
    }

    /// 1 リクエストを処理する
    ///
    /// エラーもここで Reply に変換するので、呼び出し側は失敗を扱わなくてよい。
    /// StoreError の詳細はログにだけ出し、クライアントには汎用の 500 を返す。
    #[tracing::instrument(skip_all, fields(method = %request.method(), path = %request.path()))]
    pub async fn handle(&self, request: Request) -> Reply {
        match self.dispatch(&request).await {
            Ok(reply) => reply,
            Err(DispatchError::Store(e)) => {
                error!(error = %e, "store operation failed");
                Reply::from_error(&DispatchError::Store(e))
            }
            Err(e) => {
                debug!(error = %e, "request rejected");
                Reply::from_error(&e)
            }
        }
    }

    async fn dispatch(&self, request: &Request) -> Result<Reply, DispatchError> {
        let method = request.method();
        if ![Method::GET, Method::POST, Method::DELETE].contains(method) {
            return Err(DispatchError::MethodNotAllowed(method.clone()));
        }

        if *method == Method::GET {
            return match request.route() {
                Route::Collection => self.list().await,
                Route::Item(raw_id) => self.get(raw_id).await,
                Route::Unknown => Err(unknown_route(request)),
            };
        }

        // 変更系はトークン必須（id の有無より先に判定する）
        let key = request
            .idempotency_key()
            .ok_or_else(|| DispatchError::BadRequest("missing idempotency key".to_string()))?;

        match (method, request.route()) {
            (_, Route::Unknown) => Err(unknown_route(request)),
            (&Method::POST, Route::Collection) => self.create(key, request.body()).await,
            (&Method::POST, Route::Item(_)) => Err(DispatchError::MethodNotAllowed(Method::POST)),
            (_, Route::Collection) => Err(DispatchError::BadRequest("missing id".to_string())),
            (_, Route::Item(raw_id)) => self.delete(key, raw_id).await,
        }
    }

    async fn list(&self) -> Result<Reply, DispatchError> {
        let records = self.resources.list().await?;
        let items = records.iter().map(TaskRecord::to_value).collect();
        Ok(Reply::ok(serde_json::Value::Array(items)))
    }

    async fn get(&self, raw_id: &str) -> Result<Reply, DispatchError> {
        let id = parse_task_id(raw_id)?;
        match self.resources.get(id).await? {
            Some(record) => Ok(Reply::ok(record.to_value())),
            None => Err(DispatchError::NotFound(ITEM_NOT_FOUND.to_string())),
        }
    }

    async fn create(&self, key: &IdempotencyKey, body: &[u8]) -> Result<Reply, DispatchError> {
        if let Some(existing) = self.idempotency.get(key).await? {
            debug!(idempotency_key = %key, "replaying recorded create");
            return Ok(replay_create(existing));
        }

        let payload = parse_payload(body)?;
        let record = TaskRecord::new(self.ids.generate_task_id(), payload);
        let response = record.to_value();
        self.resources.put(&record).await?;

        let marker = IdempotencyRecord::created(
            key.clone(),
            record.id(),
            response.clone(),
            self.clock.now(),
        );
        match self.idempotency.put(&marker).await {
            Ok(()) => {
                info!(task_id = %record.id(), idempotency_key = %key, "task created");
                Ok(Reply::created(response))
            }
            Err(StoreError::Conflict(_)) => self.settle_lost_create(key, record.id()).await,
            Err(e) => {
                warn!(
                    task_id = %record.id(),
                    idempotency_key = %key,
                    "task written but idempotency record was not; a retry will duplicate it"
                );
                Err(e.into())
            }
        }
    }

    /// 同じトークンの create が先に記録を確定させた場合の後始末
    ///
    /// 自分が書いた TaskRecord を消し、勝った側の結果を返す。
    async fn settle_lost_create(
        &self,
        key: &IdempotencyKey,
        orphan: TaskId,
    ) -> Result<Reply, DispatchError> {
        warn!(
            task_id = %orphan,
            idempotency_key = %key,
            "concurrent create with the same key won; discarding this one"
        );
        if let Err(e) = self.resources.delete(orphan).await {
            warn!(task_id = %orphan, error = %e, "failed to discard duplicate task");
        }

        match self.idempotency.get(key).await? {
            Some(winner) => Ok(replay_create(winner)),
            None => Err(StoreError::Unavailable(format!(
                "idempotency record for key {key} conflicted but cannot be read"
            ))
            .into()),
        }
    }

    async fn delete(&self, key: &IdempotencyKey, raw_id: &str) -> Result<Reply, DispatchError> {
        if let Some(existing) = self.idempotency.get(key).await? {
            if existing.operation != Operation::Delete {
                warn!(
                    idempotency_key = %key,
                    recorded = %existing.operation,
                    "key reused for a different operation"
                );
            }
            debug!(idempotency_key = %key, "replaying recorded delete");
            return Ok(Reply::no_content());
        }

        let id = parse_task_id(raw_id)?;
        if self.resources.get(id).await?.is_none() {
            return Err(DispatchError::NotFound(ITEM_NOT_FOUND.to_string()));
        }
        if !self.resources.delete(id).await? {
            // 確認と削除の間に消された
            return Err(DispatchError::NotFound(ITEM_NOT_FOUND.to_string()));
        }

        let marker = IdempotencyRecord::deleted(key.clone(), id, self.clock.now());
        match self.idempotency.put(&marker).await {
            Ok(()) => {
                info!(task_id = %id, idempotency_key = %key, "task deleted");
                Ok(Reply::no_content())
            }
            Err(StoreError::Conflict(_)) => {
                // 結果は同じ（リソースは消えている）
                warn!(
                    task_id = %id,
                    idempotency_key = %key,
                    "concurrent delete with the same key was recorded first"
                );
                Ok(Reply::no_content())
            }
            Err(e) => {
                warn!(
                    task_id = %id,
                    idempotency_key = %key,
                    "task deleted but idempotency record was not; a retry will get 404"
                );
                Err(e.into())
            }
        }
    }
}

fn replay_create(record: IdempotencyRecord) -> Reply {
    if record.operation != Operation::Create {
        warn!(
            idempotency_key = %record.key,
            recorded = %record.operation,
            "key reused for a different operation"
        );
    }
    Reply::created(record.response.unwrap_or(serde_json::Value::Null))
}

/// id として解釈できない文字列は、どのレコードも指さない
fn parse_task_id(raw: &str) -> Result<TaskId, DispatchError> {
    raw.parse()
        .map_err(|_| DispatchError::NotFound(ITEM_NOT_FOUND.to_string()))
}

fn parse_payload(body: &[u8]) -> Result<Payload, DispatchError> {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(fields)) => Ok(fields),
        _ => Err(DispatchError::BadRequest(
            "request body must be a JSON object".to_string(),
        )),
    }
}

fn unknown_route(request: &Request) -> DispatchError {
    DispatchError::NotFound(format!("no route for {}", request.path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{DocumentIdempotencyStore, DocumentResourceStore, InMemoryContainer};
    use crate::ports::{DocumentContainer, FixedClock, UlidGenerator};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use http::StatusCode;
    use rstest::rstest;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// テスト用の配線一式
    ///
    /// コンテナを直接覗いて、何件書かれたかを確認できるようにしておく。
    struct Harness {
        dispatcher: Dispatcher,
        tasks: Arc<InMemoryContainer>,
        keys: Arc<InMemoryContainer>,
    }

    fn clock() -> FixedClock {
        FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap())
    }

    fn harness() -> Harness {
        harness_with(|store| store)
    }

    /// IdempotencyStore だけ差し替えられるようにする
    fn harness_with(
        wrap: impl FnOnce(Arc<dyn IdempotencyStore>) -> Arc<dyn IdempotencyStore>,
    ) -> Harness {
        let tasks = Arc::new(InMemoryContainer::new());
        let keys = Arc::new(InMemoryContainer::new());
        let idempotency = wrap(Arc::new(DocumentIdempotencyStore::new(keys.clone())));
        let dispatcher = Dispatcher::new(
            Arc::new(DocumentResourceStore::new(tasks.clone())),
            idempotency,
            Arc::new(UlidGenerator::new(clock())),
            Arc::new(clock()),
        );
        Harness {
            dispatcher,
            tasks,
            keys,
        }
    }

    fn post(key: Option<&str>, body: serde_json::Value) -> Request {
        let request = Request::new(Method::POST, "/items").with_body(body.to_string());
        match key {
            Some(key) => request.with_idempotency_key(key),
            None => request,
        }
    }

    fn delete(key: Option<&str>, path: &str) -> Request {
        let request = Request::new(Method::DELETE, path);
        match key {
            Some(key) => request.with_idempotency_key(key),
            None => request,
        }
    }

    fn get(path: &str) -> Request {
        Request::new(Method::GET, path)
    }

    async fn create(h: &Harness, key: &str, body: serde_json::Value) -> serde_json::Value {
        let reply = h.dispatcher.handle(post(Some(key), body)).await;
        assert_eq!(reply.status(), StatusCode::CREATED);
        reply.body().cloned().unwrap()
    }

    fn item_path(body: &serde_json::Value) -> String {
        format!("/items/{}", body["id"].as_str().unwrap())
    }

    // ---- create ----

    #[tokio::test]
    async fn same_key_creates_exactly_once() {
        let h = harness();

        let first = create(&h, "k1", json!({"title": "buy milk"})).await;
        let second = create(&h, "k1", json!({"title": "buy milk"})).await;

        assert_eq!(first, second);
        assert_eq!(first["title"], "buy milk");
        assert_eq!(h.tasks.len().await, 1);
        assert_eq!(h.keys.len().await, 1);
    }

    #[tokio::test]
    async fn replay_ignores_the_retried_body() {
        let h = harness();

        let first = create(&h, "k1", json!({"title": "a"})).await;
        // 再送時の body は読まない（壊れていても replay される）
        let reply = h
            .dispatcher
            .handle(
                Request::new(Method::POST, "/items")
                    .with_idempotency_key("k1")
                    .with_body("{oops"),
            )
            .await;

        assert_eq!(reply.status(), StatusCode::CREATED);
        assert_eq!(reply.body(), Some(&first));
    }

    #[tokio::test]
    async fn distinct_keys_create_distinct_records() {
        let h = harness();

        let a = create(&h, "k1", json!({"title": "same"})).await;
        let b = create(&h, "k2", json!({"title": "same"})).await;

        assert_ne!(a["id"], b["id"]);
        assert_eq!(h.tasks.len().await, 2);
    }

    #[tokio::test]
    async fn created_id_overrides_client_id() {
        let h = harness();

        let body = create(&h, "k1", json!({"id": "client-chosen", "title": "t"})).await;

        let id = body["id"].as_str().unwrap();
        assert!(id.starts_with("task-"));
    }

    #[tokio::test]
    async fn create_records_idempotency_marker() {
        let h = harness();

        let body = create(&h, "k1", json!({"title": "t"})).await;

        let marker = h.keys.read("k1").await.unwrap().unwrap();
        assert_eq!(marker["operation"], "create");
        assert_eq!(marker["resourceId"], body["id"]);
        assert_eq!(marker["response"], body);
    }

    #[rstest]
    #[case("")]
    #[case("[1, 2]")]
    #[case("\"text\"")]
    #[case("{not json")]
    #[tokio::test]
    async fn create_rejects_non_object_body(#[case] body: &str) {
        let h = harness();

        let reply = h
            .dispatcher
            .handle(
                Request::new(Method::POST, "/items")
                    .with_idempotency_key("k1")
                    .with_body(body.to_string()),
            )
            .await;

        assert_eq!(reply.status(), StatusCode::BAD_REQUEST);
        assert!(h.tasks.is_empty().await);
        assert!(h.keys.is_empty().await);
    }

    // ---- missing key ----

    #[tokio::test]
    async fn missing_key_is_rejected_without_mutation() {
        let h = harness();
        let existing = create(&h, "k0", json!({"title": "keep"})).await;

        let post_reply = h.dispatcher.handle(post(None, json!({"title": "t"}))).await;
        let delete_reply = h.dispatcher.handle(delete(None, &item_path(&existing))).await;

        for reply in [post_reply, delete_reply] {
            assert_eq!(reply.status(), StatusCode::BAD_REQUEST);
            assert_eq!(reply.body().unwrap()["message"], "missing idempotency key");
        }
        assert_eq!(h.tasks.len().await, 1);
        assert_eq!(h.keys.len().await, 1);
    }

    #[tokio::test]
    async fn key_is_checked_before_missing_id() {
        let h = harness();

        let reply = h.dispatcher.handle(delete(None, "/items")).await;
        assert_eq!(reply.body().unwrap()["message"], "missing idempotency key");

        let reply = h.dispatcher.handle(delete(Some("k1"), "/items")).await;
        assert_eq!(reply.status(), StatusCode::BAD_REQUEST);
        assert_eq!(reply.body().unwrap()["message"], "missing id");
    }

    // ---- read ----

    #[tokio::test]
    async fn created_record_is_readable_and_listed() {
        let h = harness();
        let body = create(&h, "k1", json!({"title": "t"})).await;

        let reply = h.dispatcher.handle(get(&item_path(&body))).await;
        assert_eq!(reply.status(), StatusCode::OK);
        assert_eq!(reply.body(), Some(&body));

        let reply = h.dispatcher.handle(get("/items")).await;
        assert_eq!(reply.status(), StatusCode::OK);
        assert_eq!(reply.body(), Some(&json!([body])));
    }

    #[tokio::test]
    async fn empty_list_is_an_empty_array() {
        let h = harness();
        let reply = h.dispatcher.handle(get("/items")).await;
        assert_eq!(reply.body(), Some(&json!([])));
    }

    #[rstest]
    #[case("/items/task-01ARZ3NDEKTSV4RRFFQ69G5FAV")]
    #[case("/items/not-a-task-id")]
    #[tokio::test]
    async fn unknown_id_is_not_found(#[case] path: &str) {
        let h = harness();
        let reply = h.dispatcher.handle(get(path)).await;
        assert_eq!(reply.status(), StatusCode::NOT_FOUND);
    }

    // ---- delete ----

    #[tokio::test]
    async fn same_key_deletes_exactly_once() {
        let h = harness();
        let body = create(&h, "c1", json!({"title": "t"})).await;
        let path = item_path(&body);

        let first = h.dispatcher.handle(delete(Some("d1"), &path)).await;
        let second = h.dispatcher.handle(delete(Some("d1"), &path)).await;

        assert_eq!(first.status(), StatusCode::NO_CONTENT);
        assert_eq!(second.status(), StatusCode::NO_CONTENT);
        assert!(first.body().is_none());
        assert!(second.body().is_none());
        assert!(h.tasks.is_empty().await);

        let marker = h.keys.read("d1").await.unwrap().unwrap();
        assert_eq!(marker["operation"], "delete");
        assert_eq!(marker["response"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn deleted_record_is_gone() {
        let h = harness();
        let body = create(&h, "c1", json!({"title": "t"})).await;
        let path = item_path(&body);

        h.dispatcher.handle(delete(Some("d1"), &path)).await;

        let reply = h.dispatcher.handle(get(&path)).await;
        assert_eq!(reply.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn first_delete_of_unknown_id_is_not_found_and_unrecorded() {
        let h = harness();

        let reply = h
            .dispatcher
            .handle(delete(Some("d1"), "/items/task-01ARZ3NDEKTSV4RRFFQ69G5FAV"))
            .await;

        assert_eq!(reply.status(), StatusCode::NOT_FOUND);
        assert!(h.keys.is_empty().await);
    }

    #[tokio::test]
    async fn replayed_delete_skips_existence_check() {
        let h = harness();
        let body = create(&h, "c1", json!({"title": "t"})).await;
        let path = item_path(&body);
        h.dispatcher.handle(delete(Some("d1"), &path)).await;

        // 別のキーでは 404、同じキーでは 204
        let other = h.dispatcher.handle(delete(Some("d2"), &path)).await;
        let replay = h.dispatcher.handle(delete(Some("d1"), &path)).await;

        assert_eq!(other.status(), StatusCode::NOT_FOUND);
        assert_eq!(replay.status(), StatusCode::NO_CONTENT);
    }

    // ---- routing ----

    #[rstest]
    #[case(Method::PUT, "/items/x")]
    #[case(Method::PATCH, "/items/x")]
    #[case(Method::HEAD, "/items")]
    #[case(Method::OPTIONS, "/anything")]
    #[tokio::test]
    async fn other_methods_are_not_allowed(#[case] method: Method, #[case] path: &str) {
        let h = harness();
        let reply = h
            .dispatcher
            .handle(Request::new(method, path).with_idempotency_key("k"))
            .await;
        assert_eq!(reply.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn post_to_an_item_is_not_allowed() {
        let h = harness();
        let reply = h
            .dispatcher
            .handle(
                Request::new(Method::POST, "/items/task-01ARZ3NDEKTSV4RRFFQ69G5FAV")
                    .with_idempotency_key("k")
                    .with_body("{}"),
            )
            .await;
        assert_eq!(reply.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(h.tasks.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let h = harness();
        let reply = h.dispatcher.handle(get("/elsewhere")).await;
        assert_eq!(reply.status(), StatusCode::NOT_FOUND);
    }

    // ---- failure and race handling ----

    /// put だけ失敗する IdempotencyStore
    struct FailingPut {
        inner: Arc<dyn IdempotencyStore>,
    }

    #[async_trait]
    impl IdempotencyStore for FailingPut {
        async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>, StoreError> {
            self.inner.get(key).await
        }

        async fn put(&self, _record: &IdempotencyRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("throttled".to_string()))
        }
    }

    /// 最初の get だけ「まだない」と答える（同時リクエストの競合を再現）
    struct StaleFirstRead {
        inner: Arc<dyn IdempotencyStore>,
        stale: AtomicBool,
    }

    #[async_trait]
    impl IdempotencyStore for StaleFirstRead {
        async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>, StoreError> {
            if self.stale.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.get(key).await
        }

        async fn put(&self, record: &IdempotencyRecord) -> Result<(), StoreError> {
            self.inner.put(record).await
        }
    }

    /// すべての操作が失敗する ResourceStore
    struct Unreachable;

    #[async_trait]
    impl ResourceStore for Unreachable {
        async fn get(&self, _id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
            Err(StoreError::Unavailable("connection refused to 10.1.2.3".into()))
        }

        async fn list(&self) -> Result<Vec<TaskRecord>, StoreError> {
            Err(StoreError::Unavailable("connection refused to 10.1.2.3".into()))
        }

        async fn put(&self, _record: &TaskRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused to 10.1.2.3".into()))
        }

        async fn delete(&self, _id: TaskId) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused to 10.1.2.3".into()))
        }
    }

    #[tokio::test]
    async fn failed_marker_write_leaves_the_task_and_returns_500() {
        let h = harness_with(|inner| Arc::new(FailingPut { inner }));

        let reply = h.dispatcher.handle(post(Some("k1"), json!({"title": "t"}))).await;

        assert_eq!(reply.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(reply.body().unwrap()["message"], "internal server error");
        // 変更は残っている（既知の隙間）
        assert_eq!(h.tasks.len().await, 1);
        assert!(h.keys.is_empty().await);

        // 同じキーでの再送は二件目を作る
        h.dispatcher.handle(post(Some("k1"), json!({"title": "t"}))).await;
        assert_eq!(h.tasks.len().await, 2);
    }

    #[tokio::test]
    async fn failed_marker_write_after_delete_turns_retry_into_404() {
        let h = harness_with(|inner| Arc::new(FailingPut { inner }));
        let body = json!({"id": "task-01ARZ3NDEKTSV4RRFFQ69G5FAV", "title": "t"});
        h.tasks
            .upsert("task-01ARZ3NDEKTSV4RRFFQ69G5FAV", body.clone())
            .await
            .unwrap();

        let first = h.dispatcher.handle(delete(Some("d1"), &item_path(&body))).await;
        let retry = h.dispatcher.handle(delete(Some("d1"), &item_path(&body))).await;

        assert_eq!(first.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(retry.status(), StatusCode::NOT_FOUND);
        assert!(h.tasks.is_empty().await);
    }

    #[tokio::test]
    async fn lost_create_race_keeps_only_the_winner() {
        let h = harness();
        let winner = create(&h, "k1", json!({"title": "t"})).await;

        // 2 本目は replay 判定の読み取りで「まだない」を見てしまう
        let dispatcher = Dispatcher::new(
            Arc::new(DocumentResourceStore::new(h.tasks.clone())),
            Arc::new(StaleFirstRead {
                inner: Arc::new(DocumentIdempotencyStore::new(h.keys.clone())),
                stale: AtomicBool::new(true),
            }),
            Arc::new(UlidGenerator::new(clock())),
            Arc::new(clock()),
        );

        let reply = dispatcher.handle(post(Some("k1"), json!({"title": "t"}))).await;

        assert_eq!(reply.status(), StatusCode::CREATED);
        assert_eq!(reply.body(), Some(&winner));
        assert_eq!(h.tasks.len().await, 1);
        assert!(h.tasks.read(winner["id"].as_str().unwrap()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn lost_delete_race_still_succeeds() {
        let h = harness();
        let body = create(&h, "c1", json!({"title": "t"})).await;
        let id = body["id"].as_str().unwrap().to_string();

        // 別プロセスが同じキー d1 で既に記録を確定させた状態を作る
        let marker = IdempotencyRecord::deleted(
            IdempotencyKey::parse("d1").unwrap(),
            id.parse().unwrap(),
            clock().now(),
        );
        DocumentIdempotencyStore::new(h.keys.clone())
            .put(&marker)
            .await
            .unwrap();

        let dispatcher = Dispatcher::new(
            Arc::new(DocumentResourceStore::new(h.tasks.clone())),
            Arc::new(StaleFirstRead {
                inner: Arc::new(DocumentIdempotencyStore::new(h.keys.clone())),
                stale: AtomicBool::new(true),
            }),
            Arc::new(UlidGenerator::new(clock())),
            Arc::new(clock()),
        );

        let reply = dispatcher.handle(delete(Some("d1"), &item_path(&body))).await;
        assert_eq!(reply.status(), StatusCode::NO_CONTENT);
        assert!(h.tasks.is_empty().await);
    }

    #[tokio::test]
    async fn concurrent_same_key_creates_leave_one_record() {
        let h = Arc::new(harness());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let h = Arc::clone(&h);
                tokio::spawn(async move {
                    h.dispatcher
                        .handle(post(Some("same"), json!({"title": "t"})))
                        .await
                })
            })
            .collect();

        let mut bodies = Vec::new();
        for handle in handles {
            let reply = handle.await.unwrap();
            assert_eq!(reply.status(), StatusCode::CREATED);
            bodies.push(reply.body().cloned().unwrap());
        }

        assert!(bodies.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(h.tasks.len().await, 1);
    }

    #[rstest]
    #[case(get("/items"))]
    #[case(get("/items/task-01ARZ3NDEKTSV4RRFFQ69G5FAV"))]
    #[case(post(Some("k"), json!({"title": "t"})))]
    #[case(delete(Some("k"), "/items/task-01ARZ3NDEKTSV4RRFFQ69G5FAV"))]
    #[tokio::test]
    async fn store_failures_collapse_to_generic_500(#[case] request: Request) {
        let dispatcher = Dispatcher::new(
            Arc::new(Unreachable),
            Arc::new(DocumentIdempotencyStore::new(Arc::new(InMemoryContainer::new()))),
            Arc::new(UlidGenerator::new(clock())),
            Arc::new(clock()),
        );

        let reply = dispatcher.handle(request).await;

        assert_eq!(reply.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = reply.body().unwrap().to_string();
        assert!(!body.contains("10.1.2.3"));
    }
}
