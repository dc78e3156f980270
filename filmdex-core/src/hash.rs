use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use filmdex_model::{DuplicateGroup, ProgressCallback, ScanErrorKind, ScanKind, ScanPhase, ScanProgress, ScanStats};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::database::MediaStore;
use crate::{CoreError, Result, SessionTotals};

/// Read chunk size; bounds memory use regardless of file size.
const CHUNK_SIZE: usize = 1024 * 1024;

/// Which files a hashing pass visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashMode {
    /// Only files with no prior hash, or whose mtime has advanced past the
    /// last-hashed time.
    Incremental,
    /// Every non-missing file, ignoring prior hash state.
    Full,
}

/// Streaming content hasher. Hashes are duplicate-detection keys only;
/// file identity stays `(root, relative path)`.
pub struct Hasher {
    store: Arc<dyn MediaStore>,
    progress: Option<Arc<ProgressCallback>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hasher")
            .field("has_progress", &self.progress.is_some())
            .finish()
    }
}

impl Hasher {
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

    /// SHA-256 of a file's bytes, streamed in fixed-size chunks.
    pub fn hash_file(path: &Path) -> std::io::Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let read = file.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    /// Hash the files of one root. Read failures are logged per file and
    /// never halt the batch; the file's hash stays unset or stale.
    pub async fn hash_root(&self, root_id: i64, mode: HashMode) -> Result<ScanStats> {
        let root = self
            .store
            .get_root(root_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("root {root_id}")))?;

        let scan_id = self
            .store
            .create_scan_session(Some(root_id), ScanKind::Hash)
            .await?;

        let files = self.store.files_for_root(root_id).await?;
        let candidates: Vec<_> = files
            .into_iter()
            .filter(|file| match mode {
                HashMode::Full => true,
                HashMode::Incremental => match file.last_hashed {
                    None => true,
                    Some(last_hashed) => file.mtime > last_hashed,
                },
            })
            .collect();

        info!(
            "Hashing {} file(s) under {} ({:?})",
            candidates.len(),
            root.path,
            mode
        );

        let mut stats = ScanStats::default();
        let total = candidates.len();
        let root_path = Path::new(&root.path);

        for (index, file) in candidates.iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.finish(scan_id, &stats).await?;
                return Err(CoreError::Cancelled);
            }

            self.report(&ScanProgress {
                phase: Some(ScanPhase::Hashing),
                current_file: file.relative_path.clone(),
                files_processed: index,
                total_files: Some(total),
                bytes_processed: stats.bytes_scanned,
                total_bytes: None,
            });

            let path = root_path.join(&file.relative_path);
            match Self::hash_file(&path) {
                Ok(digest) => {
                    debug!("{} -> {digest}", file.relative_path);
                    self.store
                        .update_content_hash(file.id, &digest, Utc::now())
                        .await?;
                    stats.files_hashed += 1;
                    stats.bytes_scanned += file.size;
                }
                Err(err) => {
                    warn!("failed to hash {}: {err}", path.display());
                    self.store
                        .log_scan_error(
                            scan_id,
                            &file.relative_path,
                            ScanErrorKind::Hash,
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
                    files_scanned: stats.files_hashed as i64,
                    error_count: stats.errors as i64,
                    ..SessionTotals::default()
                },
            )
            .await
    }

    /// Files grouped by equal content hash.
    pub async fn duplicate_groups(&self) -> Result<Vec<DuplicateGroup>> {
        self.store.duplicate_groups().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn same_bytes_same_digest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("movie.mkv");
        fs::write(&path, b"the very same bytes").unwrap();

        let first = Hasher::hash_file(&path).unwrap();
        let second = Hasher::hash_file(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn one_byte_change_changes_digest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("movie.mkv");

        fs::write(&path, b"some video bytes A").unwrap();
        let before = Hasher::hash_file(&path).unwrap();

        fs::write(&path, b"some video bytes B").unwrap();
        let after = Hasher::hash_file(&path).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn digest_is_hex_sha256() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty.mkv");
        fs::write(&path, b"").unwrap();

        let digest = Hasher::hash_file(&path).unwrap();
        // SHA-256 of the empty input
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
