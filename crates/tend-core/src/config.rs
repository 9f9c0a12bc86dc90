//! Store configuration.
//!
//! 環境変数から読みます（`.env` の読み込みはバイナリ側の責務）。
//!
//! | Variable | Default |
//! |---|---|
//! | `STORE_ENDPOINT` | `memory` |
//! | `STORE_DATABASE` | `ToDoDb` |
//! | `STORE_TASK_CONTAINER` | `ToDoItems` |
//! | `STORE_IDEMPOTENCY_CONTAINER` | `IdempotencyKeys` |

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

pub const ENDPOINT_VAR: &str = "STORE_ENDPOINT";
pub const DATABASE_VAR: &str = "STORE_DATABASE";
pub const TASK_CONTAINER_VAR: &str = "STORE_TASK_CONTAINER";
pub const IDEMPOTENCY_CONTAINER_VAR: &str = "STORE_IDEMPOTENCY_CONTAINER";

const DEFAULT_DATABASE: &str = "ToDoDb";
const DEFAULT_TASK_CONTAINER: &str = "ToDoItems";
const DEFAULT_IDEMPOTENCY_CONTAINER: &str = "IdempotencyKeys";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    EmptyValue(&'static str),

    #[error("invalid store endpoint '{0}': expected 'memory' or 'file://<dir>'")]
    InvalidEndpoint(String),
}

/// ドキュメントストアの接続先
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StoreEndpoint {
    /// プロセス内メモリ（再起動で消える）
    #[default]
    Memory,
    /// このディレクトリ配下に `<database>/<container>/` を作る
    Directory(PathBuf),
}

impl FromStr for StoreEndpoint {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        match value {
            "memory" | "memory://" => Ok(StoreEndpoint::Memory),
            "" | "file://" => Err(ConfigError::InvalidEndpoint(value.to_string())),
            _ => {
                let path = value.strip_prefix("file://").unwrap_or(value);
                if path.contains("://") {
                    return Err(ConfigError::InvalidEndpoint(value.to_string()));
                }
                Ok(StoreEndpoint::Directory(PathBuf::from(path)))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub endpoint: StoreEndpoint,
    pub database: String,
    pub task_container: String,
    pub idempotency_container: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: StoreEndpoint::Memory,
            database: DEFAULT_DATABASE.to_string(),
            task_container: DEFAULT_TASK_CONTAINER.to_string(),
            idempotency_container: DEFAULT_IDEMPOTENCY_CONTAINER.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// 環境変数から読む
    ///
    /// # Errors
    /// 値が空、またはエンドポイントが解釈できない場合
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の変数ソースから読む（未設定はデフォルト値）
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let endpoint = match lookup(ENDPOINT_VAR) {
            Some(value) => value.parse()?,
            None => defaults.endpoint,
        };
        let database = non_empty(DATABASE_VAR, lookup(DATABASE_VAR), defaults.database)?;
        let task_container = non_empty(
            TASK_CONTAINER_VAR,
            lookup(TASK_CONTAINER_VAR),
            defaults.task_container,
        )?;
        let idempotency_container = non_empty(
            IDEMPOTENCY_CONTAINER_VAR,
            lookup(IDEMPOTENCY_CONTAINER_VAR),
            defaults.idempotency_container,
        )?;

        Ok(Self {
            endpoint,
            database,
            task_container,
            idempotency_container,
        })
    }
}

fn non_empty(
    name: &'static str,
    value: Option<String>,
    default: String,
) -> Result<String, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(name)),
        Some(value) => Ok(value.trim().to_string()),
    }
}

/// Builder for `StoreConfig`.
#[derive(Debug, Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    pub fn endpoint(mut self, endpoint: StoreEndpoint) -> Self {
        self.config.endpoint = endpoint;
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.database = database.into();
        self
    }

    pub fn task_container(mut self, name: impl Into<String>) -> Self {
        self.config.task_container = name.into();
        self
    }

    pub fn idempotency_container(mut self, name: impl Into<String>) -> Self {
        self.config.idempotency_container = name.into();
        self
    }

    pub fn build(self) -> StoreConfig {
        self.config
    }
}
