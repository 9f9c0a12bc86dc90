//! Ports - 抽象化レイヤー
//!
//! 外部システム（ドキュメントストア、時計、ID 採番）へのインターフェースです。
//! Dispatcher はこれらの trait object を構築時に受け取ります（DI）。

pub mod clock;
pub mod document_store;
pub mod id_generator;
pub mod idempotency_store;
pub mod resource_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::document_store::DocumentContainer;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::idempotency_store::IdempotencyStore;
pub use self::resource_store::ResourceStore;
