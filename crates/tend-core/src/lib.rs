//! tend-core
//!
//! Idempotent create/read/delete over task records stored in a document store.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, idempotency, errors）
//! - **ports**: 抽象化レイヤー（ResourceStore, IdempotencyStore, DocumentContainer, Clock, IdGenerator）
//! - **impls**: 実装（InMemoryContainer, FileContainer, ドキュメント上の型付きストア）
//! - **app**: アプリケーションロジック（Dispatcher, Request/Reply, AppBuilder）
//! - **config**: 環境変数からのストア設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
