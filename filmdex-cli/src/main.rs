//! Filmdex command-line interface.

mod playlist;
mod query;
mod repl;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use filmdex_core::{
    FilterPolicy, HashMode, Hasher, MediaStore, NfoExtractor, ScanOptions, Scanner, SqliteStore,
};
use filmdex_model::{ScanPhase, ScanProgress};
use tracing_subscriber::EnvFilter;

use crate::query::{MediaQuery, parse_filter_string};
use crate::repl::{MediaRepl, print_results};

#[derive(Parser)]
#[command(name = "filmdex", about = "Personal video collection indexer", version)]
struct Cli {
    /// Database path (defaults to $FILMDEX_DB or ./filmdex.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a directory for video files
    Scan {
        path: PathBuf,
        /// Label for this library root
        #[arg(short, long)]
        label: Option<String>,
        /// Minimum file size in MB (skips trailers/extras)
        #[arg(long, default_value_t = 100)]
        min_size: u64,
        /// Disable filtering (include trailers, extras, small files)
        #[arg(long)]
        no_filter: bool,
        /// Hash new/changed files after indexing
        #[arg(long)]
        hash: bool,
        /// Hash every file after indexing, ignoring prior state
        #[arg(long, conflicts_with = "hash")]
        full_hash: bool,
        /// Extract sidecar metadata after indexing
        #[arg(long)]
        parse: bool,
    },
    /// Extract sidecar metadata for indexed files
    Parse {
        /// Only this root id
        #[arg(short, long)]
        root: Option<i64>,
        /// Re-parse all sidecars, not just new/changed ones
        #[arg(short, long)]
        force: bool,
        /// Limit the number of sidecars parsed
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Hash indexed files for duplicate detection
    Hash {
        /// Only this root id
        #[arg(short, long)]
        root: Option<i64>,
        /// Hash every file, ignoring prior state
        #[arg(long)]
        full: bool,
    },
    /// Search the library with a filter string
    Search {
        /// e.g. `year:2020 genre:action rating:>7`
        query: Vec<String>,
    },
    /// Export filtered results to a playlist file (.m3u8 / .xspf)
    Export {
        output: PathBuf,
        query: Vec<String>,
        /// Replace the library root with this prefix in entry paths
        #[arg(long)]
        path_prefix: Option<String>,
    },
    /// Manage saved playlists
    Playlist {
        #[command(subcommand)]
        command: PlaylistCommand,
    },
    /// Show library statistics
    Stats,
    /// List files sharing a content hash
    Duplicates,
    /// List library roots
    Roots,
    /// Rescan all roots and parse changed sidecars
    Refresh,
    /// Delete files marked missing (and their metadata/links)
    Prune {
        /// Show what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Interactive query shell
    Repl,
}

#[derive(Subcommand)]
enum PlaylistCommand {
    /// List saved playlists
    List,
    /// Create a smart playlist from a filter string
    Create {
        name: String,
        query: Vec<String>,
        /// Snapshot the current results instead of storing the query
        #[arg(long)]
        r#static: bool,
    },
    /// Export a saved playlist to a file
    Export { name: String, output: PathBuf },
}

fn database_path(cli: &Cli) -> PathBuf {
    cli.db
        .clone()
        .or_else(|| std::env::var_os("FILMDEX_DB").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("filmdex.db"))
}

/// Terse single-line progress on stderr; overwritten in place.
fn progress_line(progress: &ScanProgress) {
    let phase = progress.phase.as_ref().map(ScanPhase::as_str).unwrap_or("working");
    let position = match progress.total_files {
        Some(total) => format!("{}/{total}", progress.files_processed),
        None => progress.files_processed.to_string(),
    };
    let mut file = progress.current_file.clone();
    if file.chars().count() > 60 {
        file = file.chars().take(60).collect();
    }
    eprint!("\r[{phase}] {position} {file}\x1b[K");
    let _ = std::io::stderr().flush();
}

fn finish_progress() {
    eprintln!();
}

fn join_query(parts: &[String]) -> String {
    parts.join(" ")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = database_path(&cli);
    tracing::debug!("using database {}", db_path.display());
    let store = Arc::new(SqliteStore::open(&db_path).await?);

    match cli.command {
        Command::Scan {
            path,
            label,
            min_size,
            no_filter,
            hash,
            full_hash,
            parse,
        } => {
            let options = ScanOptions {
                label,
                filter: (!no_filter).then(|| FilterPolicy::with_min_size_mb(min_size)),
                hash: if full_hash {
                    Some(HashMode::Full)
                } else if hash {
                    Some(HashMode::Incremental)
                } else {
                    None
                },
                extract: parse,
            };

            let scanner = Scanner::new(store.clone()).with_progress(progress_line);
            let stats = scanner.scan_root(&path, &options).await?;
            finish_progress();

            println!("Scan complete");
            println!("  files scanned: {}", stats.files_scanned);
            println!("  added:         {}", stats.files_added);
            println!("  updated:       {}", stats.files_updated);
            println!("  missing:       {}", stats.files_missing);
            println!("  sidecars:      {}", stats.sidecars_found);
            if stats.files_skipped > 0 {
                println!("  skipped:       {}", stats.files_skipped);
            }
            if stats.files_hashed > 0 {
                println!("  hashed:        {}", stats.files_hashed);
            }
            if stats.sidecars_parsed > 0 {
                println!("  parsed:        {}", stats.sidecars_parsed);
            }
            if stats.errors > 0 {
                println!("  errors:        {}", stats.errors);
            }
            if stats.sidecars_found > 0 && !parse {
                println!("run `filmdex parse` to extract sidecar metadata");
            }
        }

        Command::Parse { root, force, limit } => {
            let extractor = NfoExtractor::new(store.clone()).with_progress(progress_line);
            let stats = extractor.extract_root(root, force, limit).await?;
            finish_progress();
            println!(
                "Parsed {} sidecar(s), {} unchanged, {} error(s)",
                stats.sidecars_parsed, stats.files_skipped, stats.errors
            );
        }

        Command::Hash { root, full } => {
            let mode = if full {
                HashMode::Full
            } else {
                HashMode::Incremental
            };
            let hasher = Hasher::new(store.clone()).with_progress(progress_line);

            let roots = match root {
                Some(id) => {
                    let root = store
                        .get_root(id)
                        .await?
                        .with_context(|| format!("no root with id {id}"))?;
                    vec![root]
                }
                None => store.list_roots(true).await?,
            };
            if roots.is_empty() {
                bail!("no library roots configured; run `filmdex scan <path>` first");
            }

            let mut hashed = 0;
            let mut errors = 0;
            for root in roots {
                let stats = hasher.hash_root(root.id, mode).await?;
                hashed += stats.files_hashed;
                errors += stats.errors;
            }
            finish_progress();
            println!("Hashed {hashed} file(s), {errors} error(s)");
        }

        Command::Search { query } => {
            let filters = parse_filter_string(&join_query(&query));
            let results = MediaQuery::new(&store).execute(&filters).await?;
            if results.is_empty() {
                println!("no results");
            } else {
                print_results(&results);
                println!("{} result(s)", results.len());
            }
        }

        Command::Export {
            output,
            query,
            path_prefix,
        } => {
            let filters = parse_filter_string(&join_query(&query));
            let results = MediaQuery::new(&store).execute(&filters).await?;
            if results.is_empty() {
                bail!("no matching files to export");
            }
            playlist::save_playlist(&output, &results, path_prefix.as_deref())?;
            println!("wrote {} entries to {}", results.len(), output.display());
        }

        Command::Playlist { command } => match command {
            PlaylistCommand::List => {
                let playlists = store.list_playlists().await?;
                if playlists.is_empty() {
                    println!("no playlists");
                }
                for entry in playlists {
                    let kind = if entry.is_smart { "smart" } else { "static" };
                    println!(
                        "  {} [{kind}] {}",
                        entry.name,
                        entry.smart_query.as_deref().unwrap_or("")
                    );
                }
            }
            PlaylistCommand::Create {
                name,
                query,
                r#static,
            } => {
                let filter = join_query(&query);
                if r#static {
                    let filters = parse_filter_string(&filter);
                    let results = MediaQuery::new(&store).execute(&filters).await?;
                    let ids: Vec<i64> = results.iter().map(|r| r.file_id).collect();
                    playlist::create_static_playlist(&store, &name, &ids, None).await?;
                    println!("created static playlist {name} with {} entries", ids.len());
                } else {
                    playlist::create_smart_playlist(&store, &name, &filter, None).await?;
                    println!("created smart playlist {name}");
                }
            }
            PlaylistCommand::Export { name, output } => {
                let items = playlist::resolve_playlist(&store, &name).await?;
                playlist::save_playlist(&output, &items, None)?;
                println!("wrote {} entries to {}", items.len(), output.display());
            }
        },

        Command::Stats => {
            let stats = store.library_stats().await?;
            println!("  files:            {}", stats.total_files);
            println!(
                "  total size:       {:.1} GB",
                stats.total_size_bytes as f64 / 1e9
            );
            println!("  hashed:           {}", stats.hashed_files);
            println!("  with metadata:    {}", stats.files_with_sidecar);
            println!("  missing:          {}", stats.missing_files);
            println!("  duplicate groups: {}", stats.duplicate_groups);
            println!("  genres:           {}", stats.total_genres);
            println!("  people:           {}", stats.total_people);

            let sessions = store.recent_sessions(5).await?;
            if !sessions.is_empty() {
                println!("recent scans:");
                for session in sessions {
                    let finished = session
                        .finished_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "unfinished".to_string());
                    println!(
                        "  [{}] {} {} scanned={} added={} removed={} errors={}",
                        session.id,
                        session.kind,
                        finished,
                        session.files_scanned,
                        session.files_added,
                        session.files_removed,
                        session.error_count
                    );
                    if session.error_count > 0 {
                        for error in store.session_errors(session.id).await? {
                            println!("      {} [{}]: {}", error.file_path, error.kind, error.message);
                        }
                    }
                }
            }
        }

        Command::Duplicates => {
            let groups = store.duplicate_groups().await?;
            if groups.is_empty() {
                println!("no duplicates found");
            }
            for group in groups {
                println!("{}:", &group.hash[..16.min(group.hash.len())]);
                for file in group.files {
                    println!("  [{}] {}", file.id, file.relative_path);
                }
            }
        }

        Command::Roots => {
            for root in store.list_roots(false).await? {
                let status = if root.is_active { "active" } else { "inactive" };
                let scanned = root
                    .last_scanned
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "  [{}] {} ({status}, last scanned {scanned})",
                    root.id, root.path
                );
            }
        }

        Command::Refresh => {
            let roots = store.list_roots(true).await?;
            if roots.is_empty() {
                bail!("no library roots configured; run `filmdex scan <path>` first");
            }

            let scanner = Scanner::new(store.clone()).with_progress(progress_line);
            let mut scanned = 0;
            let mut added = 0;
            let mut updated = 0;
            for root in &roots {
                let options = ScanOptions {
                    label: root.label.clone(),
                    ..ScanOptions::filtered()
                };
                let stats = scanner.scan_root(Path::new(&root.path), &options).await?;
                scanned += stats.files_scanned;
                added += stats.files_added;
                updated += stats.files_updated;
            }

            let extractor = NfoExtractor::new(store.clone()).with_progress(progress_line);
            let extract_stats = extractor.extract_root(None, false, None).await?;
            finish_progress();

            println!("Refresh complete");
            println!("  roots scanned: {}", roots.len());
            println!("  files found:   {scanned}");
            if added > 0 {
                println!("  new files:     {added}");
            }
            if updated > 0 {
                println!("  updated files: {updated}");
            }
            if extract_stats.sidecars_parsed > 0 {
                println!("  parsed:        {}", extract_stats.sidecars_parsed);
            }
        }

        Command::Prune { dry_run, yes } => {
            let missing = store.missing_files(None).await?;
            if missing.is_empty() {
                println!("nothing to prune");
                return Ok(());
            }

            println!("{} missing file(s):", missing.len());
            for file in &missing {
                println!("  [{}] {}", file.id, file.relative_path);
            }

            if dry_run {
                println!("dry run; nothing deleted");
                return Ok(());
            }

            if !yes {
                print!("Delete these records and their metadata? [y/N] ");
                std::io::stdout().flush()?;
                let mut answer = String::new();
                std::io::stdin().read_line(&mut answer)?;
                if !answer.trim().eq_ignore_ascii_case("y") {
                    println!("aborted");
                    return Ok(());
                }
            }

            let pruned = store.prune_missing(None).await?;
            println!("pruned {pruned} record(s)");
        }

        Command::Repl => {
            MediaRepl::new(&store).run().await?;
        }
    }

    Ok(())
}
