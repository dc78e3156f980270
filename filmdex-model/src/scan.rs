use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a scan session did, recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanKind {
    /// Directory traversal + identity/change tracking.
    Index,
    /// Content hashing pass.
    Hash,
    /// Sidecar metadata extraction pass.
    Extract,
}

impl ScanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanKind::Index => "index",
            ScanKind::Hash => "hash",
            ScanKind::Extract => "extract",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "index" => Some(ScanKind::Index),
            "hash" => Some(ScanKind::Hash),
            "extract" => Some(ScanKind::Extract),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a recoverable per-file failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanErrorKind {
    Index,
    Hash,
    Extract,
}

impl ScanErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanErrorKind::Index => "index",
            ScanErrorKind::Hash => "hash",
            ScanErrorKind::Extract => "extract",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "index" => Some(ScanErrorKind::Index),
            "hash" => Some(ScanErrorKind::Hash),
            "extract" => Some(ScanErrorKind::Extract),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScanErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanPhase {
    Discovering,
    Indexing,
    Hashing,
    Extracting,
}

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::Discovering => "discovering",
            ScanPhase::Indexing => "indexing",
            ScanPhase::Hashing => "hashing",
            ScanPhase::Extracting => "extracting",
        }
    }
}

/// Progress snapshot delivered to the caller after each unit of work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanProgress {
    pub phase: Option<ScanPhase>,
    pub current_file: String,
    pub files_processed: usize,
    pub total_files: Option<usize>,
    pub bytes_processed: u64,
    pub total_bytes: Option<u64>,
}

/// Callback invoked between units of work. Must be cheap; the pipeline
/// blocks on it.
pub type ProgressCallback = dyn Fn(&ScanProgress) + Send + Sync;

/// Counters accumulated over one scan invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub files_scanned: usize,
    pub files_added: usize,
    pub files_updated: usize,
    pub files_skipped: usize,
    pub dirs_skipped: usize,
    pub files_missing: usize,
    pub sidecars_found: usize,
    pub files_hashed: usize,
    pub sidecars_parsed: usize,
    pub errors: usize,
    pub bytes_scanned: u64,
}

/// Append-only audit record of one scan invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSession {
    pub id: i64,
    pub root_id: Option<i64>,
    pub kind: ScanKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub files_scanned: i64,
    pub files_added: i64,
    pub files_updated: i64,
    pub files_removed: i64,
    pub sidecars_parsed: i64,
    pub error_count: i64,
}

/// Append-only per-file failure tied to a scan session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanErrorRecord {
    pub id: i64,
    pub scan_id: i64,
    pub file_path: String,
    pub kind: ScanErrorKind,
    pub message: String,
    pub created_at: Option<DateTime<Utc>>,
}
