pub mod checkpoint;
pub mod engine;

pub use checkpoint::{CheckpointStore, Endpoint, MemoryCheckpointStore, PaginationCheckpoint};
pub use engine::{Page, PaginationEngine, PaginationError, PaginationOptions};
