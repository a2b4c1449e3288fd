//! A distributed, bounded, single-producer/single-consumer queue backed
//! by a remote key-value store (Redis), coordinating independent client
//! processes through shared keys for role mutual-exclusion, backpressure,
//! graceful close, and counters.

pub mod buffered;
pub mod config;
pub mod error;
pub mod keys;
pub mod pool;
pub mod queue;
pub mod reliable;
pub mod store;
pub mod worker;

pub use buffered::BufferedQueue;
pub use config::Config;
pub use error::{PressureError, Role};
pub use pool::WorkerPool;
pub use queue::{Iter, PressureQueue};
pub use reliable::ReliableQueue;
pub use store::Store;
