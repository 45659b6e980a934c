pub mod persistence;

pub use persistence::{FileStore, MemoryStore, PersistenceAdapter, PersistenceError, SnapshotStore};
