//! Core data model definitions shared across Filmdex crates.
#![allow(missing_docs)]

pub mod files;
pub mod scan;
pub mod sidecar;

pub use files::{
    DiscoveredFile, DuplicateGroup, LibraryRoot, LibraryStats, MediaFileRecord, MediaSummary,
    Playlist,
};
pub use scan::{
    ProgressCallback, ScanErrorKind, ScanErrorRecord, ScanKind, ScanPhase, ScanProgress,
    ScanSession, ScanStats,
};
pub use sidecar::{
    Actor, CustomAttribute, ExternalId, SidecarDocument, SidecarMetadata, StreamDetails,
};
