use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use filmdex_model::DiscoveredFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::filter::{FilterPolicy, is_video_file};

/// Everything the walker learned about a root in one traversal.
#[derive(Debug, Clone, Default)]
pub struct WalkOutcome {
    /// In-scope video files, paired with their sidecars.
    pub files: Vec<DiscoveredFile>,
    /// Files rejected by the inclusion policy (size floor / name patterns).
    pub skipped_files: usize,
    /// Relative paths of directories skipped wholesale as unchanged. Their
    /// indexed contents must still be re-stamped by the change detector.
    pub unchanged_dirs: Vec<String>,
}

/// Recursive directory walker for video files.
///
/// Traversal never aborts on a single bad entry: stat and read-dir failures
/// are skipped silently per the error contract.
#[derive(Debug, Clone, Default)]
pub struct Walker {
    /// Inclusion policy; `None` disables size/name filtering entirely
    /// (extension recognition always applies).
    pub policy: Option<FilterPolicy>,
}

impl Walker {
    pub fn new(policy: Option<FilterPolicy>) -> Self {
        Self { policy }
    }

    /// Walk `root`, returning every in-scope video file.
    ///
    /// `last_scanned` enables the unchanged-directory optimization: a
    /// non-root directory whose mtime predates the previous successful scan
    /// is not descended into. Applied conservatively; a directory we cannot
    /// stat is always descended into.
    pub fn discover(&self, root: &Path, last_scanned: Option<DateTime<Utc>>) -> WalkOutcome {
        let mut outcome = WalkOutcome::default();

        let mut walker = WalkDir::new(root).follow_links(false).into_iter();
        loop {
            let entry = match walker.next() {
                Some(Ok(entry)) => entry,
                Some(Err(err)) => {
                    // Permission errors, broken links: skip and continue.
                    debug!("skipping unreadable entry: {err}");
                    continue;
                }
                None => break,
            };

            if entry.file_type().is_dir() {
                if entry.depth() == 0 {
                    continue;
                }
                let name = entry.file_name().to_string_lossy();
                if let Some(policy) = &self.policy
                    && policy.should_skip_directory(&name)
                {
                    debug!("skipping extras directory {}", entry.path().display());
                    walker.skip_current_dir();
                    continue;
                }
                if let Some(prior) = last_scanned
                    && Self::dir_unchanged_since(entry.path(), prior)
                {
                    debug!("skipping unchanged directory {}", entry.path().display());
                    if let Ok(relative) = entry.path().strip_prefix(root) {
                        outcome
                            .unchanged_dirs
                            .push(relative.to_string_lossy().into_owned());
                    }
                    walker.skip_current_dir();
                }
                continue;
            }

            if !entry.file_type().is_file() || !is_video_file(entry.path()) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(_) => continue, // stat failure: skip silently
            };
            let size = metadata.len();
            let filename = entry.file_name().to_string_lossy().into_owned();

            if let Some(policy) = &self.policy
                && policy.should_skip_file(&filename, size)
            {
                outcome.skipped_files += 1;
                continue;
            }

            let relative_path = match entry.path().strip_prefix(root) {
                Ok(relative) => relative.to_string_lossy().into_owned(),
                Err(err) => {
                    warn!("entry outside root {}: {err}", entry.path().display());
                    continue;
                }
            };

            let mtime = metadata
                .modified()
                .ok()
                .and_then(system_time_to_utc)
                .unwrap_or_else(Utc::now);

            let (sidecar_path, sidecar_mtime) = Self::locate_sidecar(entry.path());

            outcome.files.push(DiscoveredFile {
                path: entry.path().to_path_buf(),
                relative_path,
                filename,
                size,
                mtime,
                sidecar_path,
                sidecar_mtime,
            });
        }

        outcome
    }

    /// Sidecar = same basename with an `.nfo` extension.
    fn locate_sidecar(video_path: &Path) -> (Option<PathBuf>, Option<DateTime<Utc>>) {
        let sidecar = video_path.with_extension("nfo");
        match std::fs::metadata(&sidecar) {
            Ok(metadata) => {
                let mtime = metadata.modified().ok().and_then(system_time_to_utc);
                (Some(sidecar), mtime)
            }
            Err(_) => (None, None),
        }
    }

    fn dir_unchanged_since(path: &Path, prior: DateTime<Utc>) -> bool {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(system_time_to_utc)
            .is_some_and(|mtime| mtime < prior)
    }
}

pub(crate) fn system_time_to_utc(time: SystemTime) -> Option<DateTime<Utc>> {
    let duration = time.duration_since(std::time::UNIX_EPOCH).ok()?;
    DateTime::<Utc>::from_timestamp(duration.as_secs() as i64, duration.subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, bytes: usize) {
        fs::write(dir.join(name), vec![0u8; bytes]).unwrap();
    }

    #[test]
    fn discovers_video_files_with_sidecars() {
        let temp = TempDir::new().unwrap();
        let movie_dir = temp.path().join("Movie (2020)");
        fs::create_dir(&movie_dir).unwrap();
        touch(&movie_dir, "Movie.mkv", 16);
        touch(&movie_dir, "Movie.nfo", 8);
        touch(&movie_dir, "cover.jpg", 8);

        let walker = Walker::new(None);
        let outcome = walker.discover(temp.path(), None);

        assert_eq!(outcome.files.len(), 1);
        let file = &outcome.files[0];
        assert_eq!(file.filename, "Movie.mkv");
        assert!(file.sidecar_path.is_some());
        assert!(file.sidecar_mtime.is_some());
    }

    #[test]
    fn policy_prunes_extras_directories() {
        let temp = TempDir::new().unwrap();
        let trailers = temp.path().join("Trailers");
        fs::create_dir(&trailers).unwrap();
        touch(&trailers, "clip.mkv", 16);
        touch(temp.path(), "Feature.mkv", 16);

        let walker = Walker::new(Some(FilterPolicy::with_min_size_mb(0)));
        let outcome = walker.discover(temp.path(), None);

        let names: Vec<_> = outcome.files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, ["Feature.mkv"]);
    }

    #[test]
    fn policy_counts_skipped_files() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "Feature.mkv", 2048);
        touch(temp.path(), "Feature-Trailer.mkv", 2048);

        let mut policy = FilterPolicy::with_min_size_mb(0);
        policy.min_size_bytes = 1024;
        touch(temp.path(), "tiny.mkv", 10);

        let walker = Walker::new(Some(policy));
        let outcome = walker.discover(temp.path(), None);

        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.skipped_files, 2);
    }

    #[test]
    fn without_policy_everything_video_is_kept() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "Feature-Trailer.mkv", 10);

        let walker = Walker::new(None);
        let outcome = walker.discover(temp.path(), None);
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.skipped_files, 0);
    }

    #[test]
    fn future_last_scanned_skips_unchanged_dirs() {
        let temp = TempDir::new().unwrap();
        let sub = temp.path().join("Old Movie (1999)");
        fs::create_dir(&sub).unwrap();
        touch(&sub, "Old.mkv", 16);

        let walker = Walker::new(None);
        let far_future = Utc::now() + chrono::Duration::days(1);
        let outcome = walker.discover(temp.path(), Some(far_future));

        assert!(outcome.files.is_empty());
        assert_eq!(outcome.unchanged_dirs.len(), 1);
    }
}
