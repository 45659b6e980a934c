pub mod error;
pub mod metrics;
pub mod queue;

pub use error::{BufferError, OverflowError};
pub use metrics::BufferState;
pub use queue::{FixedCapacityQueue, OverflowPolicy, QueueConfig};
