//! AppBuilder - 設定からの Dispatcher の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - capability の注入（グローバルなクライアントを持たない）

use std::sync::Arc;

use super::dispatcher::Dispatcher;
use crate::config::{StoreConfig, StoreEndpoint};
use crate::domain::StoreError;
use crate::impls::{
    DocumentIdempotencyStore, DocumentResourceStore, FileContainer, InMemoryContainer,
};
use crate::ports::{Clock, DocumentContainer, IdGenerator, SystemClock, UlidGenerator};

/// AppBuilder は StoreConfig から Dispatcher を組み立てる
///
/// # 使用例
/// ```ignore
/// let dispatcher = AppBuilder::new(StoreConfig::from_env()?)
///     .build()
///     .await?;
/// ```
///
/// # Fail-fast 設計
/// - コンテナ名が空、または 2 つのコンテナが同じ名前なら BuildError
///   （同じコンテナだとトークンと task id のキー空間が混ざる）
/// - ストアが開けなければ BuildError
pub struct AppBuilder {
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn IdGenerator>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("container name for {0} must not be empty")]
    EmptyContainerName(&'static str),

    #[error("task and idempotency records must use different containers, both are '{0}'")]
    SharedContainer(String),

    #[error("failed to open store: {0}")]
    Store(#[from] StoreError),
}

impl AppBuilder {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            ids: None,
        }
    }

    /// 時計を差し替える（指定しなければ SystemClock）
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// ID 生成器を差し替える（指定しなければ clock を使う UlidGenerator）
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    fn validate(&self) -> Result<(), BuildError> {
        let config = &self.config;
        if config.task_container.is_empty() {
            return Err(BuildError::EmptyContainerName("task records"));
        }
        if config.idempotency_container.is_empty() {
            return Err(BuildError::EmptyContainerName("idempotency records"));
        }
        if config.task_container == config.idempotency_container {
            return Err(BuildError::SharedContainer(config.task_container.clone()));
        }
        Ok(())
    }

    pub async fn build(self) -> Result<Dispatcher, BuildError> {
        self.validate()?;

        let tasks = open_container(&self.config, &self.config.task_container).await?;
        let keys = open_container(&self.config, &self.config.idempotency_container).await?;
        tracing::debug!(
            endpoint = ?self.config.endpoint,
            database = %self.config.database,
            task_container = %self.config.task_container,
            idempotency_container = %self.config.idempotency_container,
            "store containers opened"
        );

        let ids = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(Arc::clone(&self.clock))),
        };

        Ok(Dispatcher::new(
            Arc::new(DocumentResourceStore::new(tasks)),
            Arc::new(DocumentIdempotencyStore::new(keys)),
            ids,
            self.clock,
        ))
    }
}

async fn open_container(
    config: &StoreConfig,
    name: &str,
) -> Result<Arc<dyn DocumentContainer>, StoreError> {
    match &config.endpoint {
        StoreEndpoint::Memory => Ok(Arc::new(InMemoryContainer::new())),
        StoreEndpoint::Directory(root) => {
            let dir = root.join(&config.database).join(name);
            Ok(Arc::new(FileContainer::open(dir).await?))
        }
    }
}
