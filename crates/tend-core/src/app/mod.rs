//! App - アプリケーション層
//!
//! ports を組み合わせてリクエスト処理を実装します。
//!
//! # 主要コンポーネント
//! - **Dispatcher**: 冪等性を考慮したリクエストの振り分け
//! - **Request / Reply**: トランスポート非依存の入出力
//! - **AppBuilder**: 設定からの構築とワイヤリング

pub mod builder;
pub mod dispatcher;
pub mod request;

pub use self::builder::{AppBuilder, BuildError};
pub use self::dispatcher::Dispatcher;
pub use self::request::{IDEMPOTENCY_KEY_HEADER, ITEMS_PATH, Reply, Request};
