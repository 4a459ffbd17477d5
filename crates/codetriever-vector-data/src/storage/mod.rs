pub mod local_flat;
pub mod mock;
pub mod overlay;
pub mod qdrant;
pub mod traits;

pub use self::local_flat::LocalFlatStore;
pub use self::mock::MockStorage;
pub use self::overlay::{OverlayMasks, OverlayStore};
pub use self::qdrant::QdrantStore;
pub use self::traits::{ScoredChunk, SearchFilters, StorageStats, VectorStore, glob_match};

pub use codetriever_config::{VectorBackend, VectorStorageConfig};
