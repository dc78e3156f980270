use std::path::Path;

/// Recognized video file extensions, matched case-insensitively against
/// the path suffix. Fixed registry; not user-extensible.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    // Common formats
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v",
    // MPEG variants
    "mpeg", "mpg", "mpe", "m2v", "m2p", "m2ts", "mts",
    // Broadcast/DVD
    "ts", "vob", "ifo",
    // Other
    "ogv", "ogg", "3gp", "3g2", "f4v", "divx", "xvid", "rm", "rmvb", "asf",
    "dv", "mxf",
];

/// Directory names that hold extras rather than feature content. Matched
/// directories are not descended into.
pub const SKIP_DIRECTORIES: &[&str] = &[
    "trailers",
    "trailer",
    "extras",
    "extra",
    "featurettes",
    "featurette",
    "behind the scenes",
    "behindthescenes",
    "deleted scenes",
    "deletedscenes",
    "interviews",
    "interview",
    "shorts",
    "short",
    "samples",
    "sample",
    "specials",
    "bonus",
    "promos",
    "promo",
    "scenes",
    "other",
];

/// Filename substrings marking trailers/extras/samples, matched
/// case-insensitively.
pub const SKIP_FILENAME_PATTERNS: &[&str] = &[
    "-trailer",
    ".trailer",
    "_trailer",
    "-sample",
    ".sample",
    "_sample",
    "-short",
    "-featurette",
    "-interview",
    "-extra",
    "-deleted",
    "-promo",
    "-behindthescenes",
    "-scene",
];

/// Default minimum file size (100 MB); smaller files are likely extras or
/// trailers.
pub const DEFAULT_MIN_SIZE_BYTES: u64 = 100 * 1024 * 1024;

/// True when the path carries a recognized video extension.
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            let lower = ext.to_lowercase();
            VIDEO_EXTENSIONS.contains(&lower.as_str())
        })
}

/// Inclusion policy applied while walking a root. The directory and
/// filename vocabularies are fixed; only the size floor is configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterPolicy {
    pub min_size_bytes: u64,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            min_size_bytes: DEFAULT_MIN_SIZE_BYTES,
        }
    }
}

impl FilterPolicy {
    pub fn with_min_size_mb(min_size_mb: u64) -> Self {
        Self {
            min_size_bytes: min_size_mb * 1024 * 1024,
        }
    }

    /// Directories matching the extras vocabulary are pruned from the walk.
    pub fn should_skip_directory(&self, dir_name: &str) -> bool {
        let lower = dir_name.to_lowercase();
        SKIP_DIRECTORIES.contains(&lower.as_str())
    }

    /// Size floor plus trailer/extra filename patterns.
    pub fn should_skip_file(&self, filename: &str, size: u64) -> bool {
        if size < self.min_size_bytes {
            return true;
        }
        let lower = filename.to_lowercase();
        SKIP_FILENAME_PATTERNS.iter().any(|p| lower.contains(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn recognizes_video_extensions_case_insensitively() {
        assert!(is_video_file(Path::new("movie.mkv")));
        assert!(is_video_file(Path::new("MOVIE.MKV")));
        assert!(is_video_file(Path::new("clip.m2ts")));
        assert!(!is_video_file(Path::new("poster.jpg")));
        assert!(!is_video_file(Path::new("no_extension")));
    }

    #[test]
    fn skips_extras_directories() {
        let policy = FilterPolicy::default();
        assert!(policy.should_skip_directory("Trailers"));
        assert!(policy.should_skip_directory("Behind The Scenes"));
        assert!(!policy.should_skip_directory("Season 1"));
    }

    #[test]
    fn skips_small_files_and_trailer_patterns() {
        let policy = FilterPolicy::with_min_size_mb(100);
        assert!(policy.should_skip_file("Movie.mkv", 10 * 1024 * 1024));
        assert!(policy.should_skip_file("Movie-Trailer.mkv", 200 * 1024 * 1024));
        assert!(policy.should_skip_file("movie.sample.mkv", 200 * 1024 * 1024));
        assert!(!policy.should_skip_file("Movie.mkv", 200 * 1024 * 1024));
    }

    #[test]
    fn zero_floor_keeps_small_files() {
        let policy = FilterPolicy::with_min_size_mb(0);
        assert!(!policy.should_skip_file("Movie.mkv", 1));
    }
}
