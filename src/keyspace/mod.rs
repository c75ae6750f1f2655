//! Keyspace enumeration and bulk deletion

pub mod deleter;
pub mod scanner;

pub use deleter::{
    delete_batched, delete_batched_with, BatchDeleteError, BatchStop, ChunkProgress,
    DEFAULT_CHUNK_SIZE,
};
pub use scanner::{scan_keys, scan_keys_with, ScanError, ScanProgress};
