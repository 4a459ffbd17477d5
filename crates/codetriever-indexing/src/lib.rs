//! Indexing pipeline (C8): Discovery, Filtering, Parallel Chunking,
//! Embedding, and Storage stages, plus the memory-aware admission control
//! (C2/C3) that bounds the Parallel Chunking stage's concurrency.

pub mod chunking;
pub mod discovery;
pub mod embedding;
pub mod error;
pub mod filtering;
pub mod memory;
pub mod overlay_manager;
pub mod pipeline;
pub mod storage;

pub use discovery::{DiscoveredFile, discover};
pub use error::{IndexerError, IndexerResult};
pub use filtering::{FilteredFile, filter_files};
pub use memory::{MemoryAwareQueue, MemoryMonitor, MemoryPermit, MemoryUsage};
pub use overlay_manager::OverlayManager;
pub use pipeline::{IndexingError, IndexingPipeline, IndexingStats};
