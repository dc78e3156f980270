use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filmdex_model::{
    Actor, CustomAttribute, DiscoveredFile, DuplicateGroup, ExternalId, LibraryRoot,
    MediaFileRecord, ScanErrorKind, ScanKind, SidecarDocument, SidecarMetadata, StreamDetails,
};

use crate::Result;

/// Result of a natural-key upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: i64,
    /// True when the row did not exist before.
    pub created: bool,
}

/// Final counters written to a scan session when it closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionTotals {
    pub files_scanned: i64,
    pub files_added: i64,
    pub files_updated: i64,
    pub files_removed: i64,
    pub sidecars_parsed: i64,
    pub error_count: i64,
}

/// A file whose sidecar may need extraction, joined with its root path so
/// the extractor can resolve the absolute sidecar location.
#[derive(Debug, Clone, PartialEq)]
pub struct SidecarCandidate {
    pub file: MediaFileRecord,
    pub root_path: String,
}

/// Deduplicated named reference categories. People are handled separately
/// because they carry a thumbnail column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Genre,
    Tag,
    Country,
    Studio,
}

impl LookupKind {
    pub(crate) fn table(&self) -> &'static str {
        match self {
            LookupKind::Genre => "genres",
            LookupKind::Tag => "tags",
            LookupKind::Country => "countries",
            LookupKind::Studio => "studios",
        }
    }

    pub(crate) fn id_column(&self) -> &'static str {
        match self {
            LookupKind::Genre => "genre_id",
            LookupKind::Tag => "tag_id",
            LookupKind::Country => "country_id",
            LookupKind::Studio => "studio_id",
        }
    }
}

/// Persistence contract consumed by the scanning and extraction pipeline.
///
/// Upserts preserve non-supplied fields on conflict; link replacement is
/// atomic; session and error logging is append-only. Nothing in this trait
/// deletes media rows except the explicitly invoked [`prune_missing`].
///
/// [`prune_missing`]: MediaStore::prune_missing
#[async_trait]
pub trait MediaStore: Send + Sync {
    // ------------------------------------------------------------------
    // Roots
    // ------------------------------------------------------------------

    /// Insert or reactivate a root by unique path, returning its id.
    async fn upsert_root(&self, path: &str, label: Option<&str>) -> Result<i64>;
    async fn get_root(&self, root_id: i64) -> Result<Option<LibraryRoot>>;
    async fn get_root_by_path(&self, path: &str) -> Result<Option<LibraryRoot>>;
    async fn list_roots(&self, active_only: bool) -> Result<Vec<LibraryRoot>>;
    async fn touch_root_scan_time(&self, root_id: i64) -> Result<()>;

    // ------------------------------------------------------------------
    // Media files
    // ------------------------------------------------------------------

    /// Allocate the next scan version for a root: one more than the highest
    /// version ever stamped on any of its files.
    async fn next_scan_version(&self, root_id: i64) -> Result<i64>;

    /// Upsert by `(root_id, relative_path)`. Re-observation refreshes
    /// size/mtime/version, stamps `last_seen`, and clears `is_missing`;
    /// hash and sidecar bookkeeping columns are left untouched.
    async fn upsert_media_file(
        &self,
        root_id: i64,
        file: &DiscoveredFile,
        scan_version: i64,
    ) -> Result<UpsertOutcome>;

    async fn get_media_file(&self, file_id: i64) -> Result<Option<MediaFileRecord>>;
    async fn get_media_file_by_path(
        &self,
        root_id: i64,
        relative_path: &str,
    ) -> Result<Option<MediaFileRecord>>;

    /// Record the sidecar location observed for a file. Never touches
    /// `sidecar_parsed_at`; that is the extractor's bookkeeping.
    async fn update_sidecar_info(
        &self,
        file_id: i64,
        sidecar_path: &str,
        sidecar_mtime: DateTime<Utc>,
    ) -> Result<()>;

    /// Stamp a successful extraction pass.
    async fn mark_sidecar_parsed(&self, file_id: i64, at: DateTime<Utc>) -> Result<()>;

    async fn update_content_hash(
        &self,
        file_id: i64,
        hash: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Re-stamp every non-missing record under a directory prefix with the
    /// current scan version. Used when an unchanged directory is skipped
    /// wholesale, so its files are not mistaken for orphans.
    async fn refresh_subtree_version(
        &self,
        root_id: i64,
        dir_relative_path: &str,
        scan_version: i64,
    ) -> Result<u64>;

    /// Mark every record of the root whose version is older than
    /// `current_version` (and not already missing) as missing. Returns the
    /// number of newly missing rows. The sole orphan-detection mechanism.
    async fn mark_files_missing(&self, root_id: i64, current_version: i64) -> Result<u64>;

    /// All non-missing files for a root, in relative-path order.
    async fn files_for_root(&self, root_id: i64) -> Result<Vec<MediaFileRecord>>;

    /// Non-missing files with a recorded sidecar, joined with their root
    /// path. `root_id = None` spans all roots.
    async fn files_with_sidecar(&self, root_id: Option<i64>) -> Result<Vec<SidecarCandidate>>;

    async fn missing_files(&self, root_id: Option<i64>) -> Result<Vec<MediaFileRecord>>;

    /// Delete missing files and cascade their metadata/links. The only
    /// deletion in the contract; invoked explicitly, never by scanning.
    async fn prune_missing(&self, root_id: Option<i64>) -> Result<u64>;

    /// Groups of non-missing files sharing a content hash.
    async fn duplicate_groups(&self) -> Result<Vec<DuplicateGroup>>;

    // ------------------------------------------------------------------
    // Lookup entities
    // ------------------------------------------------------------------

    /// Atomic insert-or-fetch by exact name.
    async fn get_or_create_lookup(&self, kind: LookupKind, name: &str) -> Result<i64>;
    async fn get_or_create_person(&self, name: &str, thumb_url: Option<&str>) -> Result<i64>;

    // ------------------------------------------------------------------
    // Extraction persistence
    // ------------------------------------------------------------------

    /// Replace everything a sidecar produced for a file, atomically:
    /// clears all links and custom attributes, repopulates them from the
    /// document, and upserts metadata/stream fields without overwriting
    /// stored values with absent ones.
    async fn replace_sidecar_document(&self, file_id: i64, doc: &SidecarDocument) -> Result<()>;

    async fn get_metadata(&self, file_id: i64) -> Result<Option<SidecarMetadata>>;
    async fn get_sidecar_checksum(&self, file_id: i64) -> Result<Option<String>>;
    async fn get_stream_details(&self, file_id: i64) -> Result<Option<StreamDetails>>;
    async fn get_file_lookups(&self, file_id: i64, kind: LookupKind) -> Result<Vec<String>>;
    async fn get_file_actors(&self, file_id: i64) -> Result<Vec<Actor>>;
    async fn get_file_directors(&self, file_id: i64) -> Result<Vec<String>>;
    async fn get_file_writers(&self, file_id: i64) -> Result<Vec<String>>;
    async fn get_file_external_ids(&self, file_id: i64) -> Result<Vec<ExternalId>>;
    async fn get_file_custom_attributes(&self, file_id: i64) -> Result<Vec<CustomAttribute>>;

    // ------------------------------------------------------------------
    // Scan sessions and errors (append-only)
    // ------------------------------------------------------------------

    async fn create_scan_session(&self, root_id: Option<i64>, kind: ScanKind) -> Result<i64>;
    async fn finish_scan_session(&self, scan_id: i64, totals: SessionTotals) -> Result<()>;
    async fn log_scan_error(
        &self,
        scan_id: i64,
        file_path: &str,
        kind: ScanErrorKind,
        message: &str,
    ) -> Result<()>;
}
