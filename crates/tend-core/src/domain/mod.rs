//! Domain model (IDs, task records, idempotency records, errors).

pub mod errors;
pub mod idempotency;
pub mod ids;
pub mod task;

pub use self::errors::{DispatchError, StoreError};
pub use self::idempotency::{IdempotencyKey, IdempotencyRecord, Operation};
pub use self::ids::{IdParseError, TaskId};
pub use self::task::{Payload, TaskRecord};
