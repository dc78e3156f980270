//! Interactive line-oriented query shell.

use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::Result;
use filmdex_core::database::LookupKind;
use filmdex_core::{MediaStore, SqliteStore};
use filmdex_model::MediaSummary;

use crate::playlist;
use crate::query::{MediaQuery, parse_filter_string};

const HELP_TEXT: &str = "\
Filmdex interactive shell

Query commands:
  search <filter>                  Search media (e.g. search year:2024 genre:action)
  count <filter>                   Count matching results
  show <id>                        Show details for a file

Filter syntax:
  title:<text> year:<y|a-b|>y> rating:>7 runtime:<120
  genre:<name> tag:<name> actor:<name> director:<name>
  studio:<name> country:<name> set:<name> codec:<name>
  resolution:<4k|hd|720p> hdr:true sort:<order> limit:<n>
  anything:<else> matches a custom attribute; bare words search titles

Playlist commands:
  export <file> <filter>           Export filtered results to a playlist file
  playlist list                    List saved playlists
  playlist create <name> <filter>  Create a smart playlist
  playlist export <name> <file>    Export a saved playlist

Other commands:
  stats          Library statistics
  duplicates     Files sharing a content hash
  roots          List library roots
  help           This help
  quit / exit    Leave the shell
";

pub struct MediaRepl<'a> {
    store: &'a SqliteStore,
    last_results: Vec<MediaSummary>,
}

impl std::fmt::Debug for MediaRepl<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaRepl")
            .field("last_results", &self.last_results.len())
            .finish()
    }
}

impl<'a> MediaRepl<'a> {
    pub fn new(store: &'a SqliteStore) -> Self {
        Self {
            store,
            last_results: Vec::new(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        println!("Filmdex shell. Type 'help' for commands, 'quit' to leave.");

        let stdin = std::io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            print!("filmdex> ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next() else { break };
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (command, args) = match line.split_once(' ') {
                Some((command, rest)) => (command, rest.trim()),
                None => (line, ""),
            };

            let result = match command {
                "search" => self.cmd_search(args).await,
                "count" => self.cmd_count(args).await,
                "show" => self.cmd_show(args).await,
                "export" => self.cmd_export(args).await,
                "playlist" => self.cmd_playlist(args).await,
                "stats" => self.cmd_stats().await,
                "duplicates" => self.cmd_duplicates().await,
                "roots" => self.cmd_roots().await,
                "help" => {
                    println!("{HELP_TEXT}");
                    Ok(())
                }
                "quit" | "exit" => break,
                other => {
                    println!("unknown command: {other} (try 'help')");
                    Ok(())
                }
            };

            if let Err(err) = result {
                println!("error: {err}");
            }
        }

        Ok(())
    }

    async fn cmd_search(&mut self, args: &str) -> Result<()> {
        if args.is_empty() {
            println!("usage: search <filter>");
            return Ok(());
        }

        let filters = parse_filter_string(args);
        let results = MediaQuery::new(self.store).execute(&filters).await?;
        if results.is_empty() {
            println!("no results");
        } else {
            print_results(&results);
        }
        self.last_results = results;
        Ok(())
    }

    async fn cmd_count(&self, args: &str) -> Result<()> {
        if args.is_empty() {
            println!("usage: count <filter>");
            return Ok(());
        }
        let filters = parse_filter_string(args);
        let count = MediaQuery::new(self.store).count(&filters).await?;
        println!("{count} matching file(s)");
        Ok(())
    }

    async fn cmd_show(&self, args: &str) -> Result<()> {
        let Ok(file_id) = args.trim().parse::<i64>() else {
            println!("usage: show <file_id>");
            return Ok(());
        };

        let Some(summary) = self.store.media_summary(file_id).await? else {
            println!("file {file_id} not found");
            return Ok(());
        };

        println!("\n{}  [id {file_id}]", summary.display_title());
        println!("  path: {}", summary.absolute_path().display());
        if let Some(year) = summary.year {
            println!("  year: {year}");
        }
        if let Some(rating) = summary.rating {
            println!("  rating: {rating:.1}");
        }
        if let Some(runtime) = summary.runtime {
            println!("  runtime: {runtime} min");
        }

        let genres = self.store.get_file_lookups(file_id, LookupKind::Genre).await?;
        if !genres.is_empty() {
            println!("  genres: {}", genres.join(", "));
        }
        let directors = self.store.get_file_directors(file_id).await?;
        if !directors.is_empty() {
            println!("  directors: {}", directors.join(", "));
        }
        let actors = self.store.get_file_actors(file_id).await?;
        if !actors.is_empty() {
            let names: Vec<_> = actors
                .iter()
                .take(10)
                .map(|a| match &a.role {
                    Some(role) => format!("{} ({role})", a.name),
                    None => a.name.clone(),
                })
                .collect();
            println!("  cast: {}", names.join(", "));
        }
        if let Some(plot) = &summary.plot {
            println!("\n  {plot}");
        }
        println!();
        Ok(())
    }

    async fn cmd_export(&self, args: &str) -> Result<()> {
        let Some((output, filter)) = args.split_once(' ') else {
            println!("usage: export <file> <filter>");
            return Ok(());
        };

        let filters = parse_filter_string(filter);
        let results = MediaQuery::new(self.store).execute(&filters).await?;
        playlist::save_playlist(Path::new(output), &results, None)?;
        println!("wrote {} entries to {output}", results.len());
        Ok(())
    }

    async fn cmd_playlist(&self, args: &str) -> Result<()> {
        let (sub, rest) = match args.split_once(' ') {
            Some((sub, rest)) => (sub, rest.trim()),
            None => (args, ""),
        };

        match sub {
            "list" | "" => {
                let playlists = self.store.list_playlists().await?;
                if playlists.is_empty() {
                    println!("no playlists");
                }
                for playlist in playlists {
                    let kind = if playlist.is_smart { "smart" } else { "static" };
                    println!(
                        "  {} [{kind}] {}",
                        playlist.name,
                        playlist.smart_query.as_deref().unwrap_or("")
                    );
                }
            }
            "create" => {
                let Some((name, filter)) = rest.split_once(' ') else {
                    println!("usage: playlist create <name> <filter>");
                    return Ok(());
                };
                playlist::create_smart_playlist(self.store, name, filter.trim(), None).await?;
                println!("created smart playlist {name}");
            }
            "export" => {
                let Some((name, output)) = rest.split_once(' ') else {
                    println!("usage: playlist export <name> <file>");
                    return Ok(());
                };
                let items = playlist::resolve_playlist(self.store, name).await?;
                playlist::save_playlist(Path::new(output.trim()), &items, None)?;
                println!("wrote {} entries to {}", items.len(), output.trim());
            }
            other => println!("unknown playlist subcommand: {other}"),
        }
        Ok(())
    }

    async fn cmd_stats(&self) -> Result<()> {
        let stats = self.store.library_stats().await?;
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
        Ok(())
    }

    async fn cmd_duplicates(&self) -> Result<()> {
        let groups = self.store.duplicate_groups().await?;
        if groups.is_empty() {
            println!("no duplicates found");
            return Ok(());
        }
        for group in groups {
            println!("{}:", &group.hash[..16.min(group.hash.len())]);
            for file in group.files {
                println!("  [{}] {}", file.id, file.relative_path);
            }
        }
        Ok(())
    }

    async fn cmd_roots(&self) -> Result<()> {
        for root in self.store.list_roots(false).await? {
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
        Ok(())
    }
}

pub fn print_results(results: &[MediaSummary]) {
    for item in results {
        let year = item
            .year
            .map(|y| format!(" ({y})"))
            .unwrap_or_default();
        let rating = item
            .rating
            .map(|r| format!("  {r:.1}"))
            .unwrap_or_default();
        println!("  [{:>5}] {}{year}{rating}", item.file_id, item.display_title());
    }
}
