use thiserror::Error;

/// Raised by `push` when the queue is full under the `Reject` policy.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Event queue is full (capacity {capacity}) and the overflow policy rejects new events")]
pub struct OverflowError {
    pub capacity: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Invalid buffer capacity: {capacity}")]
    InvalidCapacity { capacity: usize },

    #[error(transparent)]
    Overflow(#[from] OverflowError),
}

impl BufferError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            // The next flush frees space
            BufferError::Overflow(_) => true,
            BufferError::InvalidCapacity { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_is_recoverable() {
        let err: BufferError = OverflowError { capacity: 3 }.into();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("capacity 3"));
    }

    #[test]
    fn test_invalid_capacity_is_fatal() {
        let err = BufferError::InvalidCapacity { capacity: 0 };
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "Invalid buffer capacity: 0");
    }
}
