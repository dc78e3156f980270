//! End-to-end pipeline tests: scan, rescan, orphan marking, hashing,
//! extraction, and pruning against a real (in-memory) store.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use filmdex_core::database::LookupKind;
use filmdex_core::{
    FilterPolicy, HashMode, Hasher, MediaStore, NfoExtractor, ScanOptions, Scanner, SqliteStore,
};
use tempfile::TempDir;

async fn open_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().await.unwrap())
}

fn unfiltered() -> ScanOptions {
    ScanOptions {
        filter: Some(FilterPolicy::with_min_size_mb(0)),
        ..ScanOptions::default()
    }
}

fn write(path: &Path, bytes: &[u8]) {
    fs::write(path, bytes).unwrap();
}

fn movie_tree(temp: &TempDir) -> std::path::PathBuf {
    let dir = temp.path().join("Movie (2020)");
    fs::create_dir(&dir).unwrap();
    write(&dir.join("Movie.mkv"), b"pretend this is 120 MB of video");
    write(
        &dir.join("Movie.nfo"),
        b"<movie><title>Movie</title><year>2020</year><genre>Action</genre></movie>",
    );
    dir
}

#[tokio::test]
async fn scan_then_extract_indexes_one_movie() {
    let temp = TempDir::new().unwrap();
    movie_tree(&temp);

    let store = open_store().await;
    let scanner = Scanner::new(store.clone());
    let stats = scanner.scan_root(temp.path(), &unfiltered()).await.unwrap();

    assert_eq!(stats.files_scanned, 1);
    assert_eq!(stats.files_added, 1);
    assert_eq!(stats.sidecars_found, 1);
    assert_eq!(stats.errors, 0);

    let root = store
        .get_root_by_path(&fs::canonicalize(temp.path()).unwrap().to_string_lossy())
        .await
        .unwrap()
        .expect("root registered");
    assert!(root.last_scanned.is_some());

    let extractor = NfoExtractor::new(store.clone());
    let extract_stats = extractor.extract_root(Some(root.id), false, None).await.unwrap();
    assert_eq!(extract_stats.sidecars_parsed, 1);

    let file = store
        .get_media_file_by_path(root.id, &format!("Movie (2020){}Movie.mkv", std::path::MAIN_SEPARATOR))
        .await
        .unwrap()
        .expect("file indexed");
    assert!(!file.is_missing);
    assert!(file.sidecar_parsed_at.is_some());

    let metadata = store.get_metadata(file.id).await.unwrap().expect("metadata row");
    assert_eq!(metadata.title.as_deref(), Some("Movie"));
    assert_eq!(metadata.year, Some(2020));

    let genres = store.get_file_lookups(file.id, LookupKind::Genre).await.unwrap();
    assert_eq!(genres, ["Action"]);
}

#[tokio::test]
async fn rescanning_unchanged_tree_is_a_no_op() {
    let temp = TempDir::new().unwrap();
    movie_tree(&temp);

    let store = open_store().await;
    let scanner = Scanner::new(store.clone());
    scanner.scan_root(temp.path(), &unfiltered()).await.unwrap();

    // Let the directory mtime fall clearly behind last_scanned, even on
    // filesystems with coarse timestamps.
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let second = scanner.scan_root(temp.path(), &unfiltered()).await.unwrap();
    assert_eq!(second.files_added, 0);
    assert_eq!(second.files_updated, 0);
    assert_eq!(second.files_missing, 0);
    assert_eq!(second.dirs_skipped, 1);

    // The skipped directory's file kept up with the new version: still one
    // row, still present.
    let root = store.list_roots(true).await.unwrap().remove(0);
    let files = store.files_for_root(root.id).await.unwrap();
    assert_eq!(files.len(), 1);
    assert!(!files[0].is_missing);
}

#[tokio::test]
async fn deleted_file_is_marked_missing_and_kept() {
    let temp = TempDir::new().unwrap();
    let dir = movie_tree(&temp);

    let store = open_store().await;
    let scanner = Scanner::new(store.clone());
    scanner.scan_root(temp.path(), &unfiltered()).await.unwrap();

    let root = store.list_roots(true).await.unwrap().remove(0);
    let extractor = NfoExtractor::new(store.clone());
    extractor.extract_root(Some(root.id), false, None).await.unwrap();

    // Keep the directory mtime clearly ahead of last_scanned so the
    // unchanged-directory skip cannot hide the deletion.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    fs::remove_file(dir.join("Movie.mkv")).unwrap();
    let second = scanner.scan_root(temp.path(), &unfiltered()).await.unwrap();
    assert_eq!(second.files_missing, 1);

    let missing = store.missing_files(Some(root.id)).await.unwrap();
    assert_eq!(missing.len(), 1);
    let file = &missing[0];
    assert!(file.is_missing);

    // Soft state only: metadata and links survive until an explicit prune.
    assert!(store.get_metadata(file.id).await.unwrap().is_some());
    let genres = store.get_file_lookups(file.id, LookupKind::Genre).await.unwrap();
    assert_eq!(genres, ["Action"]);

    let pruned = store.prune_missing(Some(root.id)).await.unwrap();
    assert_eq!(pruned, 1);
    assert!(store.get_media_file(file.id).await.unwrap().is_none());
    assert!(store.get_metadata(file.id).await.unwrap().is_none());
}

#[tokio::test]
async fn reappearing_file_resets_missing_without_duplicate() {
    let temp = TempDir::new().unwrap();
    let dir = movie_tree(&temp);

    let store = open_store().await;
    let scanner = Scanner::new(store.clone());
    scanner.scan_root(temp.path(), &unfiltered()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;
    fs::remove_file(dir.join("Movie.mkv")).unwrap();
    scanner.scan_root(temp.path(), &unfiltered()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;
    write(&dir.join("Movie.mkv"), b"pretend this is 120 MB of video");
    let third = scanner.scan_root(temp.path(), &unfiltered()).await.unwrap();
    assert_eq!(third.files_added, 0);
    assert_eq!(third.files_updated, 1);
    assert_eq!(third.files_missing, 0);

    let root = store.list_roots(true).await.unwrap().remove(0);
    let files = store.files_for_root(root.id).await.unwrap();
    assert_eq!(files.len(), 1);
    assert!(!files[0].is_missing);
}

#[tokio::test]
async fn incremental_hashing_skips_untouched_files() {
    let temp = TempDir::new().unwrap();
    movie_tree(&temp);

    let store = open_store().await;
    let scanner = Scanner::new(store.clone());
    scanner.scan_root(temp.path(), &unfiltered()).await.unwrap();
    let root = store.list_roots(true).await.unwrap().remove(0);

    let hasher = Hasher::new(store.clone());
    let first = hasher.hash_root(root.id, HashMode::Incremental).await.unwrap();
    assert_eq!(first.files_hashed, 1);
    assert_eq!(first.errors, 0);

    let hashed = store.files_for_root(root.id).await.unwrap().remove(0);
    let digest = hashed.content_hash.clone().expect("hash stored");
    assert!(hashed.last_hashed.is_some());

    // mtime has not advanced past last_hashed: nothing to do.
    let second = hasher.hash_root(root.id, HashMode::Incremental).await.unwrap();
    assert_eq!(second.files_hashed, 0);

    // Full mode ignores prior state and reproduces the same digest.
    let full = hasher.hash_root(root.id, HashMode::Full).await.unwrap();
    assert_eq!(full.files_hashed, 1);
    let rehashed = store.files_for_root(root.id).await.unwrap().remove(0);
    assert_eq!(rehashed.content_hash.as_deref(), Some(digest.as_str()));
}

#[tokio::test]
async fn duplicate_groups_by_hash_equality() {
    let temp = TempDir::new().unwrap();
    let a = temp.path().join("A");
    let b = temp.path().join("B");
    fs::create_dir_all(&a).unwrap();
    fs::create_dir_all(&b).unwrap();
    write(&a.join("one.mkv"), b"identical bytes");
    write(&b.join("two.mkv"), b"identical bytes");
    write(&b.join("three.mkv"), b"different bytes");

    let store = open_store().await;
    let options = ScanOptions {
        filter: Some(FilterPolicy::with_min_size_mb(0)),
        hash: Some(HashMode::Incremental),
        ..ScanOptions::default()
    };
    Scanner::new(store.clone())
        .scan_root(temp.path(), &options)
        .await
        .unwrap();

    let groups = store.duplicate_groups().await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].files.len(), 2);
}

#[tokio::test]
async fn hash_failure_is_logged_and_does_not_halt_batch() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("Movies");
    fs::create_dir(&dir).unwrap();
    write(&dir.join("kept.mkv"), b"still here");
    write(&dir.join("vanishing.mkv"), b"about to disappear");

    let store = open_store().await;
    let scanner = Scanner::new(store.clone());
    scanner.scan_root(temp.path(), &unfiltered()).await.unwrap();
    let root = store.list_roots(true).await.unwrap().remove(0);

    // File vanishes between indexing and hashing.
    fs::remove_file(dir.join("vanishing.mkv")).unwrap();

    let hasher = Hasher::new(store.clone());
    let stats = hasher.hash_root(root.id, HashMode::Incremental).await.unwrap();
    assert_eq!(stats.files_hashed, 1);
    assert_eq!(stats.errors, 1);

    // The failed file's hash stays unset; the other got one.
    let files = store.files_for_root(root.id).await.unwrap();
    let kept = files.iter().find(|f| f.filename == "kept.mkv").unwrap();
    let vanished = files.iter().find(|f| f.filename == "vanishing.mkv").unwrap();
    assert!(kept.content_hash.is_some());
    assert!(vanished.content_hash.is_none());
}

#[tokio::test]
async fn extraction_is_idempotent_under_clear_and_repopulate() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("Movie (1995)");
    fs::create_dir(&dir).unwrap();
    write(&dir.join("Heat.mkv"), b"video");
    write(
        &dir.join("Heat.nfo"),
        br#"<movie>
            <title>Heat</title><year>1995</year><rating>8.3</rating>
            <genre>Crime</genre><genre>Drama</genre>
            <studio>Warner Bros.</studio>
            <actor><name>Al Pacino</name><role>Vincent</role></actor>
            <actor><name>Robert De Niro</name><role>Neil</role><order>9</order></actor>
            <director>Michael Mann</director>
            <mood>tense</mood><mood>gritty</mood>
        </movie>"#,
    );

    let store = open_store().await;
    let scanner = Scanner::new(store.clone());
    scanner.scan_root(temp.path(), &unfiltered()).await.unwrap();
    let root = store.list_roots(true).await.unwrap().remove(0);

    let extractor = NfoExtractor::new(store.clone());
    extractor.extract_root(Some(root.id), false, None).await.unwrap();

    let file = store.files_for_root(root.id).await.unwrap().remove(0);
    let checksum_before = store.get_sidecar_checksum(file.id).await.unwrap();
    let metadata_before = store.get_metadata(file.id).await.unwrap();
    let genres_before = store.get_file_lookups(file.id, LookupKind::Genre).await.unwrap();
    let actors_before = store.get_file_actors(file.id).await.unwrap();
    let custom_before = store.get_file_custom_attributes(file.id).await.unwrap();

    // Force a re-parse of the unchanged sidecar.
    extractor.extract_root(Some(root.id), true, None).await.unwrap();

    assert_eq!(store.get_sidecar_checksum(file.id).await.unwrap(), checksum_before);
    assert_eq!(store.get_metadata(file.id).await.unwrap(), metadata_before);
    assert_eq!(
        store.get_file_lookups(file.id, LookupKind::Genre).await.unwrap(),
        genres_before
    );
    assert_eq!(store.get_file_actors(file.id).await.unwrap(), actors_before);
    assert_eq!(
        store.get_file_custom_attributes(file.id).await.unwrap(),
        custom_before
    );

    // A non-forced pass finds nothing to do for the unchanged sidecar.
    let stats = extractor.extract_root(Some(root.id), false, None).await.unwrap();
    assert_eq!(stats.sidecars_parsed, 0);
    assert_eq!(stats.errors, 0);
}

#[tokio::test]
async fn actors_and_custom_attributes_round_trip_in_order() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("M");
    fs::create_dir(&dir).unwrap();
    write(&dir.join("m.mkv"), b"video");
    write(
        &dir.join("m.nfo"),
        br#"<movie>
            <actor><name>First Billed</name></actor>
            <actor><name>Jumped Ahead</name><order>99</order></actor>
            <actor><name>Second Billed</name></actor>
            <mood>tense</mood><mood>gritty</mood>
        </movie>"#,
    );

    let store = open_store().await;
    Scanner::new(store.clone())
        .scan_root(temp.path(), &unfiltered())
        .await
        .unwrap();
    let root = store.list_roots(true).await.unwrap().remove(0);
    NfoExtractor::new(store.clone())
        .extract_root(Some(root.id), false, None)
        .await
        .unwrap();

    let file = store.files_for_root(root.id).await.unwrap().remove(0);

    let actors = store.get_file_actors(file.id).await.unwrap();
    let names: Vec<_> = actors.iter().map(|a| a.name.as_str()).collect();
    // Document order except for the explicit <order> override.
    assert_eq!(names, ["First Billed", "Second Billed", "Jumped Ahead"]);
    assert_eq!(actors[2].order, 99);

    let custom = store.get_file_custom_attributes(file.id).await.unwrap();
    assert_eq!(custom.len(), 1);
    assert_eq!(custom[0].name, "mood");
    assert_eq!(custom[0].values, ["tense", "gritty"]);
}

#[tokio::test]
async fn malformed_sidecar_still_yields_title_and_year() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("M");
    fs::create_dir(&dir).unwrap();
    write(&dir.join("m.mkv"), b"video");
    write(
        &dir.join("m.nfo"),
        b"<movie><title>Fast Cars</title><year>1986</year><plot>Cops & robbers at speed</plot></movie>",
    );

    let store = open_store().await;
    Scanner::new(store.clone())
        .scan_root(temp.path(), &unfiltered())
        .await
        .unwrap();
    let root = store.list_roots(true).await.unwrap().remove(0);

    let stats = NfoExtractor::new(store.clone())
        .extract_root(Some(root.id), false, None)
        .await
        .unwrap();
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.sidecars_parsed, 1);

    let file = store.files_for_root(root.id).await.unwrap().remove(0);
    let metadata = store.get_metadata(file.id).await.unwrap().unwrap();
    assert_eq!(metadata.title.as_deref(), Some("Fast Cars"));
    assert_eq!(metadata.year, Some(1986));
}

#[tokio::test]
async fn nonexistent_root_is_rejected_before_any_session() {
    let store = open_store().await;
    let scanner = Scanner::new(store.clone());

    let result = scanner
        .scan_root(Path::new("/definitely/not/a/real/path"), &unfiltered())
        .await;
    assert!(result.is_err());
    assert!(store.list_roots(false).await.unwrap().is_empty());
}

#[tokio::test]
async fn filtered_scan_excludes_extras_and_small_files() {
    let temp = TempDir::new().unwrap();
    let feature_dir = temp.path().join("Feature (2021)");
    let trailers = feature_dir.join("Trailers");
    fs::create_dir_all(&trailers).unwrap();

    // Feature clears the floor; the trailer directory and the pattern-named
    // file never make it in.
    write(&feature_dir.join("Feature.mkv"), &vec![0u8; 4096]);
    write(&feature_dir.join("Feature-sample.mkv"), &vec![0u8; 4096]);
    write(&trailers.join("teaser.mkv"), &vec![0u8; 4096]);

    let store = open_store().await;
    let options = ScanOptions {
        filter: Some(FilterPolicy { min_size_bytes: 1024 }),
        ..ScanOptions::default()
    };
    let stats = Scanner::new(store.clone())
        .scan_root(temp.path(), &options)
        .await
        .unwrap();

    assert_eq!(stats.files_scanned, 1);
    assert_eq!(stats.files_skipped, 1);

    let root = store.list_roots(true).await.unwrap().remove(0);
    let files = store.files_for_root(root.id).await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].filename, "Feature.mkv");
}
