//! Metadata layer: manifest/overlay-state persistence, git change detection,
//! and the query-history/feedback record types (spec §3, §4.3, §4.5, §6).

pub mod error;
pub mod git;
pub mod manifest;
pub mod models;

pub use error::{MetaDataError, MetaDataResult};
pub use git::{ChangeKind, ChangeSet, ChangedFile, GitChangeDetector};
pub use manifest::ManifestStore;
pub use models::{
    FeedbackEntry, FeedbackType, FileMetadata, FileState, IndexManifest, ManifestStats,
    OverlayState, QueryHistoryEntry, RepositoryContext, StalenessLevel, StorageDescriptor,
    MANIFEST_VERSION,
};
