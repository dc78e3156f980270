//! Playlist serialization: M3U8 and XSPF text formats, plus smart/static
//! playlist management on top of the store.

use std::path::Path;

use anyhow::{Context, Result, bail};
use filmdex_core::SqliteStore;
use filmdex_model::MediaSummary;

use crate::query::{MediaQuery, parse_filter_string};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaylistFormat {
    #[default]
    M3u8,
    Xspf,
}

impl PlaylistFormat {
    pub fn from_extension(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("xspf") => PlaylistFormat::Xspf,
            _ => PlaylistFormat::M3u8,
        }
    }
}

fn display_title(item: &MediaSummary) -> String {
    match item.year {
        Some(year) => format!("{} ({year})", item.display_title()),
        None => item.display_title().to_string(),
    }
}

fn item_path(item: &MediaSummary, path_prefix: Option<&str>) -> String {
    match path_prefix {
        Some(prefix) => format!(
            "{}/{}",
            prefix.trim_end_matches('/'),
            item.relative_path
        ),
        None => item.absolute_path().to_string_lossy().into_owned(),
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// M3U8: one `#EXTINF` line (runtime in seconds, display title) per entry.
pub fn render_m3u8(items: &[MediaSummary], path_prefix: Option<&str>) -> String {
    let mut lines = vec!["#EXTM3U".to_string()];
    for item in items {
        let duration = item.runtime.map(|minutes| minutes * 60).unwrap_or(-1);
        lines.push(format!("#EXTINF:{duration},{}", display_title(item)));
        lines.push(item_path(item, path_prefix));
    }
    lines.join("\n") + "\n"
}

/// XSPF: XML playlist with `file://` locations and millisecond durations.
pub fn render_xspf(items: &[MediaSummary], title: &str, path_prefix: Option<&str>) -> String {
    let mut lines = vec![
        r#"<?xml version="1.0" encoding="UTF-8"?>"#.to_string(),
        r#"<playlist xmlns="http://xspf.org/ns/0/" version="1">"#.to_string(),
        format!("  <title>{}</title>", escape_xml(title)),
        "  <trackList>".to_string(),
    ];

    for item in items {
        let path = item_path(item, path_prefix);
        let uri = format!("file://{}", urlencoding::encode(&path).replace("%2F", "/"));
        let duration_ms = item.runtime.unwrap_or(0) * 60 * 1000;

        lines.push("    <track>".to_string());
        lines.push(format!("      <location>{uri}</location>"));
        lines.push(format!(
            "      <title>{}</title>",
            escape_xml(&display_title(item))
        ));
        if duration_ms > 0 {
            lines.push(format!("      <duration>{duration_ms}</duration>"));
        }
        if let Some(plot) = &item.plot {
            let annotation: String = plot.chars().take(500).collect();
            lines.push(format!(
                "      <annotation>{}</annotation>",
                escape_xml(&annotation)
            ));
        }
        lines.push("    </track>".to_string());
    }

    lines.push("  </trackList>".to_string());
    lines.push("</playlist>".to_string());
    lines.join("\n")
}

/// Write a playlist file; the format follows the output extension.
pub fn save_playlist(
    output: &Path,
    items: &[MediaSummary],
    path_prefix: Option<&str>,
) -> Result<()> {
    let content = match PlaylistFormat::from_extension(output) {
        PlaylistFormat::Xspf => {
            let title = output
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Playlist".to_string());
            render_xspf(items, &title, path_prefix)
        }
        PlaylistFormat::M3u8 => render_m3u8(items, path_prefix),
    };
    std::fs::write(output, content)
        .with_context(|| format!("failed to write {}", output.display()))
}

/// Create a smart playlist: the filter string is stored and re-run on
/// every export.
pub async fn create_smart_playlist(
    store: &SqliteStore,
    name: &str,
    filter: &str,
    description: Option<&str>,
) -> Result<i64> {
    Ok(store.create_playlist(name, description, Some(filter)).await?)
}

/// Create a static playlist snapshotting the given files in order.
pub async fn create_static_playlist(
    store: &SqliteStore,
    name: &str,
    file_ids: &[i64],
    description: Option<&str>,
) -> Result<i64> {
    let playlist_id = store.create_playlist(name, description, None).await?;
    for (position, file_id) in file_ids.iter().enumerate() {
        store
            .add_playlist_item(playlist_id, *file_id, position as i64)
            .await?;
    }
    Ok(playlist_id)
}

/// Resolve a saved playlist's items: smart playlists re-run their stored
/// query, static ones read their snapshot.
pub async fn resolve_playlist(store: &SqliteStore, name: &str) -> Result<Vec<MediaSummary>> {
    let Some(playlist) = store.get_playlist_by_name(name).await? else {
        bail!("playlist not found: {name}");
    };

    if playlist.is_smart {
        let Some(query) = &playlist.smart_query else {
            bail!("smart playlist {name} has no stored query");
        };
        let filters = parse_filter_string(query);
        MediaQuery::new(store).execute(&filters).await
    } else {
        Ok(store.playlist_items(playlist.id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(title: &str, year: Option<i64>, runtime: Option<i64>) -> MediaSummary {
        MediaSummary {
            file_id: 1,
            root_path: "/media/movies".to_string(),
            relative_path: format!("{title}/{title}.mkv"),
            filename: format!("{title}.mkv"),
            title: Some(title.to_string()),
            original_title: None,
            year,
            rating: None,
            runtime,
            plot: Some("A & B".to_string()),
        }
    }

    #[test]
    fn m3u8_has_header_and_extinf() {
        let items = [sample("Heat", Some(1995), Some(170))];
        let rendered = render_m3u8(&items, None);

        assert!(rendered.starts_with("#EXTM3U\n"));
        assert!(rendered.contains("#EXTINF:10200,Heat (1995)"));
        assert!(rendered.contains("/media/movies/Heat/Heat.mkv"));
    }

    #[test]
    fn m3u8_unknown_runtime_is_minus_one() {
        let items = [sample("Heat", None, None)];
        let rendered = render_m3u8(&items, None);
        assert!(rendered.contains("#EXTINF:-1,Heat"));
    }

    #[test]
    fn path_prefix_replaces_root() {
        let items = [sample("Heat", Some(1995), Some(170))];
        let rendered = render_m3u8(&items, Some("smb://nas/video/"));
        assert!(rendered.contains("smb://nas/video/Heat/Heat.mkv"));
    }

    #[test]
    fn xspf_escapes_and_carries_duration() {
        let items = [sample("Fast & Loose", Some(1986), Some(90))];
        let rendered = render_xspf(&items, "My <List>", None);

        assert!(rendered.contains("<title>My &lt;List&gt;</title>"));
        assert!(rendered.contains("<title>Fast &amp; Loose (1986)</title>"));
        assert!(rendered.contains("<duration>5400000</duration>"));
        assert!(rendered.contains("<annotation>A &amp; B</annotation>"));
        assert!(rendered.contains("<location>file://"));
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            PlaylistFormat::from_extension(Path::new("out.xspf")),
            PlaylistFormat::Xspf
        );
        assert_eq!(
            PlaylistFormat::from_extension(Path::new("out.m3u8")),
            PlaylistFormat::M3u8
        );
    }
}
