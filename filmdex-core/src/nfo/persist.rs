use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use filmdex_model::{
    MediaFileRecord, ProgressCallback, ScanErrorKind, ScanKind, ScanPhase, ScanProgress,
    ScanStats,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::NfoParser;
use crate::database::{MediaStore, SessionTotals};
use crate::{CoreError, Result};

/// What happened to one file's sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractOutcome {
    /// Parsed and persisted (clear-then-repopulate).
    Parsed,
    /// Checksum matched the previous parse; stored state left untouched.
    Unchanged,
}

/// Runs sidecar extraction for indexed files and persists the results.
pub struct NfoExtractor {
    store: Arc<dyn MediaStore>,
    parser: NfoParser,
    progress: Option<Arc<ProgressCallback>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for NfoExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NfoExtractor")
            .field("has_progress", &self.progress.is_some())
            .finish()
    }
}

impl NfoExtractor {
    pub fn new(store: Arc<dyn MediaStore>) -> Self {
        Self {
            store,
            parser: NfoParser::new(),
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

    pub(crate) fn with_progress_shared(mut self, callback: Option<Arc<ProgressCallback>>) -> Self {
        self.progress = callback;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn report(&self, progress: &ScanProgress) {
        if let Some(callback) = &self.progress {
            callback(progress);
        }
    }

    /// Extract one file's sidecar.
    ///
    /// Reads the sidecar bytes, checksums them, and skips persistence when
    /// the checksum matches the previous parse (unless `force`). Persisting
    /// replaces all links and custom attributes for the file.
    pub async fn extract_file(
        &self,
        file: &MediaFileRecord,
        root_path: &str,
        force: bool,
    ) -> Result<ExtractOutcome> {
        let sidecar_relative = file
            .sidecar_path
            .as_deref()
            .ok_or_else(|| CoreError::NotFound(format!("no sidecar for {}", file.relative_path)))?;
        let sidecar_path = Path::new(root_path).join(sidecar_relative);

        // An unreadable sidecar is the one hard per-file failure here;
        // malformed content degrades inside the parser instead.
        let bytes = std::fs::read(&sidecar_path)?;
        let doc = self.parser.parse(&bytes);

        if !force {
            let previous = self.store.get_sidecar_checksum(file.id).await?;
            if previous.as_deref() == Some(doc.checksum.as_str()) {
                debug!("sidecar unchanged for {}", file.relative_path);
                self.store.mark_sidecar_parsed(file.id, Utc::now()).await?;
                return Ok(ExtractOutcome::Unchanged);
            }
        }

        self.store.replace_sidecar_document(file.id, &doc).await?;
        self.store.mark_sidecar_parsed(file.id, Utc::now()).await?;
        Ok(ExtractOutcome::Parsed)
    }

    /// Extract every sidecar needing a parse. `root_id = None` spans all
    /// roots; `force` re-parses regardless of mtime/checksum bookkeeping.
    pub async fn extract_root(
        &self,
        root_id: Option<i64>,
        force: bool,
        limit: Option<usize>,
    ) -> Result<ScanStats> {
        let scan_id = self
            .store
            .create_scan_session(root_id, ScanKind::Extract)
            .await?;

        let mut candidates = self.store.files_with_sidecar(root_id).await?;
        if !force {
            // Cheap mtime prefilter; the byte checksum decides for real.
            candidates.retain(|c| match (c.file.sidecar_parsed_at, c.file.sidecar_mtime) {
                (None, _) => true,
                (Some(parsed_at), Some(mtime)) => mtime > parsed_at,
                (Some(_), None) => true,
            });
        }
        if let Some(limit) = limit {
            candidates.truncate(limit);
        }

        info!("Extracting metadata from {} sidecar(s)", candidates.len());

        let mut stats = ScanStats::default();
        let total = candidates.len();

        for (index, candidate) in candidates.iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.finish(scan_id, &stats).await?;
                return Err(CoreError::Cancelled);
            }

            self.report(&ScanProgress {
                phase: Some(ScanPhase::Extracting),
                current_file: candidate.file.relative_path.clone(),
                files_processed: index,
                total_files: Some(total),
                ..ScanProgress::default()
            });

            match self
                .extract_file(&candidate.file, &candidate.root_path, force)
                .await
            {
                Ok(ExtractOutcome::Parsed) => stats.sidecars_parsed += 1,
                Ok(ExtractOutcome::Unchanged) => stats.files_skipped += 1,
                Err(err) => {
                    warn!(
                        "failed to extract sidecar for {}: {err}",
                        candidate.file.relative_path
                    );
                    self.store
                        .log_scan_error(
                            scan_id,
                            &candidate.file.relative_path,
                            ScanErrorKind::Extract,
                            &err.to_string(),
                        )
                        .await?;
                    stats.errors += 1;
                }
            }
        }

        self.finish(scan_id, &stats).await?;
        Ok(stats)
    }

    async fn finish(&self, scan_id: i64, stats: &ScanStats) -> Result<()> {
        self.store
            .finish_scan_session(
                scan_id,
                SessionTotals {
                    files_scanned: (stats.sidecars_parsed + stats.files_skipped) as i64,
                    sidecars_parsed: stats.sidecars_parsed as i64,
                    error_count: stats.errors as i64,
                    ..SessionTotals::default()
                },
            )
            .await
    }
}
