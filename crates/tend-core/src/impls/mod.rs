//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryContainer**: 開発用・テスト用のドキュメントコンテナ
//! - **FileContainer**: ファイルシステム上のドキュメントコンテナ
//! - **DocumentResourceStore / DocumentIdempotencyStore**: コンテナ上の型付きアダプタ

pub mod document;
pub mod fs_container;
pub mod inmem_container;

pub use self::document::{DocumentIdempotencyStore, DocumentResourceStore};
pub use self::fs_container::FileContainer;
pub use self::inmem_container::InMemoryContainer;
