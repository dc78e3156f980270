//! Directory scanning: traversal, change detection, and orphan marking.
//!
//! A scan allocates a fresh per-root version, stamps it on every observed
//! file, and (only after complete traversal) marks files left on an older
//! version as missing. Missing rows are soft state; nothing here deletes.

pub mod filter;
pub mod walker;

pub use filter::{FilterPolicy, is_video_file};
pub use walker::{WalkOutcome, Walker};

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use filmdex_model::{
    ProgressCallback, ScanErrorKind, ScanKind, ScanPhase, ScanProgress, ScanStats,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::database::{MediaStore, SessionTotals};
use crate::hash::{HashMode, Hasher};
use crate::nfo::NfoExtractor;
use crate::{CoreError, Result};

/// Independent, composable switches for one scan invocation.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub label: Option<String>,
    /// `None` disables size/pattern/extras filtering.
    pub filter: Option<FilterPolicy>,
    /// Run a hashing pass over the root after indexing.
    pub hash: Option<HashMode>,
    /// Run sidecar extraction over the root after indexing.
    pub extract: bool,
}

impl ScanOptions {
    /// Filtering on with defaults, no hashing, no extraction: the plain
    /// `scan` command.
    pub fn filtered() -> Self {
        Self {
            filter: Some(FilterPolicy::default()),
            ..Self::default()
        }
    }
}

/// Drives one root through the walk → change-detect → mark-missing
/// pipeline, with optional hash and extract phases.
pub struct Scanner {
    store: Arc<dyn MediaStore>,
    progress: Option<Arc<ProgressCallback>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("has_progress", &self.progress.is_some())
            .finish()
    }
}

impl Scanner {
    pub fn new(store: Arc<dyn MediaStore>) -> Self {
        Self {
            store,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(
        mut self,
        callback: impl Fn(&ScanProgress) + Send + Sync + 'static,
    ) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Cancellation is observed between file units. An aborted scan never
    /// runs the missing-marking phase: partial observation must not be
    /// mistaken for exhaustive observation.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn report(&self, progress: &ScanProgress) {
        if let Some(callback) = &self.progress {
            callback(progress);
        }
    }

    /// Scan one root directory.
    ///
    /// The root must exist and be a directory; anything else is rejected
    /// before a session row is created.
    pub async fn scan_root(&self, path: &Path, options: &ScanOptions) -> Result<ScanStats> {
        let root_path = std::fs::canonicalize(path)
            .map_err(|err| CoreError::InvalidRoot(format!("{}: {err}", path.display())))?;
        if !root_path.is_dir() {
            return Err(CoreError::InvalidRoot(format!(
                "not a directory: {}",
                root_path.display()
            )));
        }

        let root_str = root_path.to_string_lossy();
        let root_id = self
            .store
            .upsert_root(&root_str, options.label.as_deref())
            .await?;
        let last_scanned = self
            .store
            .get_root(root_id)
            .await?
            .and_then(|root| root.last_scanned);

        let scan_id = self
            .store
            .create_scan_session(Some(root_id), ScanKind::Index)
            .await?;
        let version = self.store.next_scan_version(root_id).await?;

        info!("Scanning {} (version {version})", root_path.display());
        self.report(&ScanProgress {
            phase: Some(ScanPhase::Discovering),
            current_file: root_str.to_string(),
            ..ScanProgress::default()
        });

        let walker = Walker::new(options.filter);
        let outcome = walker.discover(&root_path, last_scanned);

        let mut stats = ScanStats {
            files_skipped: outcome.skipped_files,
            dirs_skipped: outcome.unchanged_dirs.len(),
            ..ScanStats::default()
        };

        // Files under wholesale-skipped directories were not re-observed;
        // re-stamp them so the missing-marking pass leaves them alone.
        for dir in &outcome.unchanged_dirs {
            self.store
                .refresh_subtree_version(root_id, dir, version)
                .await?;
        }

        let total_files = outcome.files.len();
        let total_bytes: u64 = outcome.files.iter().map(|f| f.size).sum();
        self.report(&ScanProgress {
            phase: Some(ScanPhase::Discovering),
            total_files: Some(total_files),
            total_bytes: Some(total_bytes),
            ..ScanProgress::default()
        });

        for (index, file) in outcome.files.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("scan of {} cancelled after {index} file(s)", root_str);
                self.finish(scan_id, &stats, 0).await?;
                return Err(CoreError::Cancelled);
            }

            self.report(&ScanProgress {
                phase: Some(ScanPhase::Indexing),
                current_file: file.relative_path.clone(),
                files_processed: index,
                total_files: Some(total_files),
                bytes_processed: stats.bytes_scanned,
                total_bytes: Some(total_bytes),
            });

            match self.store.upsert_media_file(root_id, file, version).await {
                Ok(outcome) => {
                    if outcome.created {
                        stats.files_added += 1;
                    } else {
                        stats.files_updated += 1;
                    }

                    if let Some(sidecar) = &file.sidecar_path {
                        let sidecar_relative = sidecar
                            .strip_prefix(&root_path)
                            .map(|p| p.to_string_lossy().into_owned())
                            .unwrap_or_else(|_| sidecar.to_string_lossy().into_owned());
                        self.store
                            .update_sidecar_info(
                                outcome.id,
                                &sidecar_relative,
                                file.sidecar_mtime.unwrap_or_else(Utc::now),
                            )
                            .await?;
                        stats.sidecars_found += 1;
                    }

                    stats.files_scanned += 1;
                    stats.bytes_scanned += file.size;
                }
                Err(err) => {
                    self.store
                        .log_scan_error(
                            scan_id,
                            &file.relative_path,
                            ScanErrorKind::Index,
                            &err.to_string(),
                        )
                        .await?;
                    stats.errors += 1;
                }
            }
        }

        // Traversal completed normally: anything still on an older version
        // was not re-observed and is now missing.
        let missing = self.store.mark_files_missing(root_id, version).await?;
        stats.files_missing = missing as usize;

        self.finish(scan_id, &stats, missing as i64).await?;
        self.store.touch_root_scan_time(root_id).await?;

        info!(
            "Scan of {} complete: {} scanned, {} added, {} updated, {} missing, {} errors",
            root_str,
            stats.files_scanned,
            stats.files_added,
            stats.files_updated,
            stats.files_missing,
            stats.errors
        );

        if let Some(mode) = options.hash {
            let hasher = Hasher::new(self.store.clone())
                .with_progress_shared(self.progress.clone())
                .with_cancellation(self.cancel.clone());
            let hash_stats = hasher.hash_root(root_id, mode).await?;
            stats.files_hashed = hash_stats.files_hashed;
            stats.errors += hash_stats.errors;
        }

        if options.extract {
            let extractor = NfoExtractor::new(self.store.clone())
                .with_progress_shared(self.progress.clone())
                .with_cancellation(self.cancel.clone());
            let extract_stats = extractor.extract_root(Some(root_id), false, None).await?;
            stats.sidecars_parsed = extract_stats.sidecars_parsed;
            stats.errors += extract_stats.errors;
        }

        Ok(stats)
    }

    async fn finish(&self, scan_id: i64, stats: &ScanStats, removed: i64) -> Result<()> {
        self.store
            .finish_scan_session(
                scan_id,
                SessionTotals {
                    files_scanned: stats.files_scanned as i64,
                    files_added: stats.files_added as i64,
                    files_updated: stats.files_updated as i64,
                    files_removed: removed,
                    sidecars_parsed: 0,
                    error_count: stats.errors as i64,
                },
            )
            .await
    }
}
