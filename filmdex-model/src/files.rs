use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A library root directory registered with the indexer.
///
/// Roots are created on first scan of a path and are never deleted
/// automatically; `last_scanned` advances on every scan of the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryRoot {
    pub id: i64,
    /// Absolute path, unique across the store.
    pub path: String,
    pub label: Option<String>,
    pub is_active: bool,
    pub last_scanned: Option<DateTime<Utc>>,
}

/// An indexed video file.
///
/// Identity is the natural key `(root_id, relative_path)`; the content hash
/// is used only for duplicate grouping, never as identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFileRecord {
    pub id: i64,
    pub root_id: i64,
    pub relative_path: String,
    pub filename: String,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    /// Scan version stamped the last time this file was observed. A record
    /// whose version is older than the root's latest completed scan is
    /// marked missing.
    pub scan_version: i64,
    pub content_hash: Option<String>,
    pub last_hashed: Option<DateTime<Utc>>,
    pub sidecar_path: Option<String>,
    pub sidecar_mtime: Option<DateTime<Utc>>,
    pub sidecar_parsed_at: Option<DateTime<Utc>>,
    pub is_missing: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// A video file located by the walker, before it has been committed to the
/// store. Paired with its same-basename sidecar when one exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub relative_path: String,
    pub filename: String,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub sidecar_path: Option<PathBuf>,
    pub sidecar_mtime: Option<DateTime<Utc>>,
}

/// Files sharing a content hash. Informational only: grouping never
/// triggers any automatic action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub hash: String,
    pub files: Vec<MediaFileRecord>,
}

/// Flattened file + metadata row used by search, playlists, and the REPL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSummary {
    pub file_id: i64,
    pub root_path: String,
    pub relative_path: String,
    pub filename: String,
    pub title: Option<String>,
    pub original_title: Option<String>,
    pub year: Option<i64>,
    pub rating: Option<f64>,
    pub runtime: Option<i64>,
    pub plot: Option<String>,
}

impl MediaSummary {
    /// Title for display, falling back to the filename when no sidecar
    /// metadata was ever extracted.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.filename)
    }

    /// Absolute path of the underlying file.
    pub fn absolute_path(&self) -> PathBuf {
        PathBuf::from(&self.root_path).join(&self.relative_path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_smart: bool,
    pub smart_query: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Aggregate library counters for the `stats` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryStats {
    pub total_files: u64,
    pub total_size_bytes: u64,
    pub hashed_files: u64,
    pub files_with_sidecar: u64,
    pub missing_files: u64,
    pub duplicate_groups: u64,
    pub total_genres: u64,
    pub total_people: u64,
}
