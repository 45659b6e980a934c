use serde::Serialize;

/// Point-in-time view of a queue, computed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferState {
    pub size: usize,
    pub capacity: usize,
    /// Incoming items refused under `DiscardNewest`.
    pub overflow_count: u64,
    /// Queued items evicted under `DiscardOldest`.
    pub evicted_count: u64,
}

impl BufferState {
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.size as f64 / self.capacity as f64
    }

    pub fn is_full(&self) -> bool {
        self.size >= self.capacity
    }
}
