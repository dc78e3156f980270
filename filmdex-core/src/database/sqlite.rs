use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filmdex_model::{
    Actor, CustomAttribute, DiscoveredFile, DuplicateGroup, ExternalId, LibraryRoot,
    LibraryStats, MediaFileRecord, MediaSummary, Playlist, ScanErrorKind, ScanErrorRecord,
    ScanKind, ScanSession, SidecarDocument, SidecarMetadata, StreamDetails,
};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Row, SqliteConnection};
use tracing::{debug, info};

use super::traits::{LookupKind, MediaStore, SessionTotals, SidecarCandidate, UpsertOutcome};
use crate::Result;

/// Schema applied on open. `CREATE TABLE IF NOT EXISTS` keeps reopening a
/// library database idempotent.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS roots (
    root_id INTEGER PRIMARY KEY,
    root_path TEXT NOT NULL UNIQUE,
    label TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    last_scanned TEXT
);

CREATE TABLE IF NOT EXISTS media_files (
    file_id INTEGER PRIMARY KEY,
    root_id INTEGER NOT NULL REFERENCES roots(root_id) ON DELETE CASCADE,
    relative_path TEXT NOT NULL,
    filename TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    file_mtime TEXT NOT NULL,
    scan_version INTEGER NOT NULL DEFAULT 0,
    content_hash TEXT,
    last_hashed TEXT,
    sidecar_path TEXT,
    sidecar_mtime TEXT,
    sidecar_parsed_at TEXT,
    is_missing INTEGER NOT NULL DEFAULT 0,
    last_seen TEXT,
    UNIQUE(root_id, relative_path)
);

CREATE INDEX IF NOT EXISTS idx_media_files_root ON media_files(root_id);
CREATE INDEX IF NOT EXISTS idx_media_files_hash ON media_files(content_hash);
CREATE INDEX IF NOT EXISTS idx_media_files_missing ON media_files(is_missing);

CREATE TABLE IF NOT EXISTS scan_sessions (
    scan_id INTEGER PRIMARY KEY,
    root_id INTEGER REFERENCES roots(root_id) ON DELETE SET NULL,
    scan_type TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    files_scanned INTEGER NOT NULL DEFAULT 0,
    files_added INTEGER NOT NULL DEFAULT 0,
    files_updated INTEGER NOT NULL DEFAULT 0,
    files_removed INTEGER NOT NULL DEFAULT 0,
    sidecars_parsed INTEGER NOT NULL DEFAULT 0,
    error_count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS scan_errors (
    error_id INTEGER PRIMARY KEY,
    scan_id INTEGER NOT NULL REFERENCES scan_sessions(scan_id) ON DELETE CASCADE,
    file_path TEXT NOT NULL,
    error_kind TEXT NOT NULL,
    error_message TEXT NOT NULL,
    created_at TEXT
);

CREATE TABLE IF NOT EXISTS video_metadata (
    metadata_id INTEGER PRIMARY KEY,
    file_id INTEGER NOT NULL UNIQUE REFERENCES media_files(file_id) ON DELETE CASCADE,
    title TEXT,
    original_title TEXT,
    sort_title TEXT,
    year INTEGER,
    premiered TEXT,
    release_date TEXT,
    date_added TEXT,
    runtime INTEGER,
    plot TEXT,
    tagline TEXT,
    outline TEXT,
    rating REAL,
    votes INTEGER,
    mpaa TEXT,
    certification TEXT,
    set_name TEXT,
    set_order INTEGER,
    poster_path TEXT,
    fanart_path TEXT,
    thumb_path TEXT,
    trailer_url TEXT,
    playcount INTEGER,
    last_played TEXT,
    sidecar_checksum TEXT
);

CREATE TABLE IF NOT EXISTS stream_details (
    stream_id INTEGER PRIMARY KEY,
    file_id INTEGER NOT NULL UNIQUE REFERENCES media_files(file_id) ON DELETE CASCADE,
    video_codec TEXT,
    video_width INTEGER,
    video_height INTEGER,
    aspect_ratio TEXT,
    video_bitrate INTEGER,
    framerate REAL,
    hdr_format TEXT,
    audio_codec TEXT,
    audio_channels INTEGER,
    audio_language TEXT,
    duration_ms INTEGER
);

CREATE TABLE IF NOT EXISTS genres (
    genre_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS tags (
    tag_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS countries (
    country_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS studios (
    studio_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS people (
    person_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    thumb_url TEXT
);

CREATE TABLE IF NOT EXISTS media_genres (
    file_id INTEGER NOT NULL REFERENCES media_files(file_id) ON DELETE CASCADE,
    genre_id INTEGER NOT NULL REFERENCES genres(genre_id),
    PRIMARY KEY (file_id, genre_id)
);

CREATE TABLE IF NOT EXISTS media_tags (
    file_id INTEGER NOT NULL REFERENCES media_files(file_id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(tag_id),
    PRIMARY KEY (file_id, tag_id)
);

CREATE TABLE IF NOT EXISTS media_countries (
    file_id INTEGER NOT NULL REFERENCES media_files(file_id) ON DELETE CASCADE,
    country_id INTEGER NOT NULL REFERENCES countries(country_id),
    PRIMARY KEY (file_id, country_id)
);

CREATE TABLE IF NOT EXISTS media_studios (
    file_id INTEGER NOT NULL REFERENCES media_files(file_id) ON DELETE CASCADE,
    studio_id INTEGER NOT NULL REFERENCES studios(studio_id),
    display_order INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (file_id, studio_id)
);

CREATE TABLE IF NOT EXISTS media_actors (
    file_id INTEGER NOT NULL REFERENCES media_files(file_id) ON DELETE CASCADE,
    person_id INTEGER NOT NULL REFERENCES people(person_id),
    role TEXT,
    display_order INTEGER NOT NULL DEFAULT 0,
    thumb_url TEXT,
    PRIMARY KEY (file_id, person_id)
);

CREATE TABLE IF NOT EXISTS media_directors (
    file_id INTEGER NOT NULL REFERENCES media_files(file_id) ON DELETE CASCADE,
    person_id INTEGER NOT NULL REFERENCES people(person_id),
    display_order INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (file_id, person_id)
);

CREATE TABLE IF NOT EXISTS media_writers (
    file_id INTEGER NOT NULL REFERENCES media_files(file_id) ON DELETE CASCADE,
    person_id INTEGER NOT NULL REFERENCES people(person_id),
    display_order INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (file_id, person_id)
);

CREATE TABLE IF NOT EXISTS external_ids (
    file_id INTEGER NOT NULL REFERENCES media_files(file_id) ON DELETE CASCADE,
    provider TEXT NOT NULL,
    external_id TEXT NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (file_id, provider)
);

CREATE TABLE IF NOT EXISTS custom_attribute_defs (
    attr_def_id INTEGER PRIMARY KEY,
    attr_name TEXT NOT NULL UNIQUE,
    attr_type TEXT NOT NULL DEFAULT 'text',
    is_multivalue INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS custom_attributes (
    attr_id INTEGER PRIMARY KEY,
    file_id INTEGER NOT NULL REFERENCES media_files(file_id) ON DELETE CASCADE,
    attr_def_id INTEGER NOT NULL REFERENCES custom_attribute_defs(attr_def_id),
    attr_value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_custom_attributes_file ON custom_attributes(file_id);

CREATE TABLE IF NOT EXISTS playlists (
    playlist_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    is_smart INTEGER NOT NULL DEFAULT 0,
    smart_query TEXT,
    updated_at TEXT
);

CREATE TABLE IF NOT EXISTS playlist_items (
    playlist_id INTEGER NOT NULL REFERENCES playlists(playlist_id) ON DELETE CASCADE,
    file_id INTEGER NOT NULL REFERENCES media_files(file_id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    PRIMARY KEY (playlist_id, file_id)
);
"#;

/// SQLite-backed implementation of [`MediaStore`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if necessary) a library database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        info!("Opening library database at {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory database for tests. A single connection keeps every query
    /// on the same memory database.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<()> {
        debug!("Applying database schema");
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    fn row_to_root(row: &SqliteRow) -> Result<LibraryRoot> {
        Ok(LibraryRoot {
            id: row.try_get("root_id")?,
            path: row.try_get("root_path")?,
            label: row.try_get("label")?,
            is_active: row.try_get("is_active")?,
            last_scanned: row.try_get("last_scanned")?,
        })
    }

    fn row_to_media_file(row: &SqliteRow) -> Result<MediaFileRecord> {
        Ok(MediaFileRecord {
            id: row.try_get("file_id")?,
            root_id: row.try_get("root_id")?,
            relative_path: row.try_get("relative_path")?,
            filename: row.try_get("filename")?,
            size: row.try_get::<i64, _>("file_size")? as u64,
            mtime: row.try_get("file_mtime")?,
            scan_version: row.try_get("scan_version")?,
            content_hash: row.try_get("content_hash")?,
            last_hashed: row.try_get("last_hashed")?,
            sidecar_path: row.try_get("sidecar_path")?,
            sidecar_mtime: row.try_get("sidecar_mtime")?,
            sidecar_parsed_at: row.try_get("sidecar_parsed_at")?,
            is_missing: row.try_get("is_missing")?,
            last_seen: row.try_get("last_seen")?,
        })
    }

    /// Map a search/playlist row (media_files joined with roots and
    /// optionally video_metadata) into a summary. Shared with the CLI
    /// query layer.
    pub fn row_to_summary(row: &SqliteRow) -> Result<MediaSummary> {
        Ok(MediaSummary {
            file_id: row.try_get("file_id")?,
            root_path: row.try_get("root_path")?,
            relative_path: row.try_get("relative_path")?,
            filename: row.try_get("filename")?,
            title: row.try_get("title")?,
            original_title: row.try_get("original_title")?,
            year: row.try_get("year")?,
            rating: row.try_get("rating")?,
            runtime: row.try_get("runtime")?,
            plot: row.try_get("plot")?,
        })
    }

    async fn get_or_create_lookup_on(
        conn: &mut SqliteConnection,
        kind: LookupKind,
        name: &str,
    ) -> Result<i64> {
        let table = kind.table();
        let id_col = kind.id_column();

        sqlx::query(&format!(
            "INSERT INTO {table} (name) VALUES (?) ON CONFLICT(name) DO NOTHING"
        ))
        .bind(name)
        .execute(&mut *conn)
        .await?;

        let id = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT {id_col} FROM {table} WHERE name = ?"
        ))
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;

        Ok(id)
    }

    async fn get_or_create_person_on(
        conn: &mut SqliteConnection,
        name: &str,
        thumb_url: Option<&str>,
    ) -> Result<i64> {
        sqlx::query(
            r#"
            INSERT INTO people (name, thumb_url) VALUES (?, ?)
            ON CONFLICT(name) DO UPDATE SET
                thumb_url = COALESCE(people.thumb_url, excluded.thumb_url)
            "#,
        )
        .bind(name)
        .bind(thumb_url)
        .execute(&mut *conn)
        .await?;

        let id = sqlx::query_scalar::<_, i64>("SELECT person_id FROM people WHERE name = ?")
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;

        Ok(id)
    }

    async fn get_or_create_attr_def_on(
        conn: &mut SqliteConnection,
        attr_name: &str,
        is_multivalue: bool,
    ) -> Result<i64> {
        sqlx::query(
            r#"
            INSERT INTO custom_attribute_defs (attr_name, attr_type, is_multivalue)
            VALUES (?, 'text', ?)
            ON CONFLICT(attr_name) DO UPDATE SET
                is_multivalue = MAX(custom_attribute_defs.is_multivalue, excluded.is_multivalue)
            "#,
        )
        .bind(attr_name)
        .bind(is_multivalue)
        .execute(&mut *conn)
        .await?;

        let id = sqlx::query_scalar::<_, i64>(
            "SELECT attr_def_id FROM custom_attribute_defs WHERE attr_name = ?",
        )
        .bind(attr_name)
        .fetch_one(&mut *conn)
        .await?;

        Ok(id)
    }

    /// Delete every junction and custom-attribute row for a file. External
    /// ids are not cleared here; they are upserted per provider.
    async fn clear_file_links_on(conn: &mut SqliteConnection, file_id: i64) -> Result<()> {
        const LINK_TABLES: &[&str] = &[
            "media_genres",
            "media_tags",
            "media_countries",
            "media_studios",
            "media_actors",
            "media_directors",
            "media_writers",
            "custom_attributes",
        ];

        for table in LINK_TABLES {
            sqlx::query(&format!("DELETE FROM {table} WHERE file_id = ?"))
                .bind(file_id)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    async fn upsert_metadata_on(
        conn: &mut SqliteConnection,
        file_id: i64,
        meta: &SidecarMetadata,
        checksum: &str,
    ) -> Result<()> {
        // Absent fields arrive as NULL; COALESCE keeps whatever value was
        // stored before, so re-extraction never nulls out a column.
        sqlx::query(
            r#"
            INSERT INTO video_metadata (
                file_id, title, original_title, sort_title, year,
                premiered, release_date, date_added, runtime, plot, tagline,
                outline, rating, votes, mpaa, certification, set_name,
                set_order, poster_path, fanart_path, thumb_path, trailer_url,
                playcount, last_played, sidecar_checksum
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(file_id) DO UPDATE SET
                title = COALESCE(excluded.title, video_metadata.title),
                original_title = COALESCE(excluded.original_title, video_metadata.original_title),
                sort_title = COALESCE(excluded.sort_title, video_metadata.sort_title),
                year = COALESCE(excluded.year, video_metadata.year),
                premiered = COALESCE(excluded.premiered, video_metadata.premiered),
                release_date = COALESCE(excluded.release_date, video_metadata.release_date),
                date_added = COALESCE(excluded.date_added, video_metadata.date_added),
                runtime = COALESCE(excluded.runtime, video_metadata.runtime),
                plot = COALESCE(excluded.plot, video_metadata.plot),
                tagline = COALESCE(excluded.tagline, video_metadata.tagline),
                outline = COALESCE(excluded.outline, video_metadata.outline),
                rating = COALESCE(excluded.rating, video_metadata.rating),
                votes = COALESCE(excluded.votes, video_metadata.votes),
                mpaa = COALESCE(excluded.mpaa, video_metadata.mpaa),
                certification = COALESCE(excluded.certification, video_metadata.certification),
                set_name = COALESCE(excluded.set_name, video_metadata.set_name),
                set_order = COALESCE(excluded.set_order, video_metadata.set_order),
                poster_path = COALESCE(excluded.poster_path, video_metadata.poster_path),
                fanart_path = COALESCE(excluded.fanart_path, video_metadata.fanart_path),
                thumb_path = COALESCE(excluded.thumb_path, video_metadata.thumb_path),
                trailer_url = COALESCE(excluded.trailer_url, video_metadata.trailer_url),
                playcount = COALESCE(excluded.playcount, video_metadata.playcount),
                last_played = COALESCE(excluded.last_played, video_metadata.last_played),
                sidecar_checksum = excluded.sidecar_checksum
            "#,
        )
        .bind(file_id)
        .bind(&meta.title)
        .bind(&meta.original_title)
        .bind(&meta.sort_title)
        .bind(meta.year)
        .bind(&meta.premiered)
        .bind(&meta.release_date)
        .bind(&meta.date_added)
        .bind(meta.runtime)
        .bind(&meta.plot)
        .bind(&meta.tagline)
        .bind(&meta.outline)
        .bind(meta.rating)
        .bind(meta.votes)
        .bind(&meta.mpaa)
        .bind(&meta.certification)
        .bind(&meta.set_name)
        .bind(meta.set_order)
        .bind(&meta.poster_path)
        .bind(&meta.fanart_path)
        .bind(&meta.thumb_path)
        .bind(&meta.trailer_url)
        .bind(meta.playcount)
        .bind(&meta.last_played)
        .bind(checksum)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    async fn upsert_stream_details_on(
        conn: &mut SqliteConnection,
        file_id: i64,
        stream: &StreamDetails,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stream_details (
                file_id, video_codec, video_width, video_height, aspect_ratio,
                video_bitrate, framerate, hdr_format, audio_codec,
                audio_channels, audio_language, duration_ms
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(file_id) DO UPDATE SET
                video_codec = COALESCE(excluded.video_codec, stream_details.video_codec),
                video_width = COALESCE(excluded.video_width, stream_details.video_width),
                video_height = COALESCE(excluded.video_height, stream_details.video_height),
                aspect_ratio = COALESCE(excluded.aspect_ratio, stream_details.aspect_ratio),
                video_bitrate = COALESCE(excluded.video_bitrate, stream_details.video_bitrate),
                framerate = COALESCE(excluded.framerate, stream_details.framerate),
                hdr_format = COALESCE(excluded.hdr_format, stream_details.hdr_format),
                audio_codec = COALESCE(excluded.audio_codec, stream_details.audio_codec),
                audio_channels = COALESCE(excluded.audio_channels, stream_details.audio_channels),
                audio_language = COALESCE(excluded.audio_language, stream_details.audio_language),
                duration_ms = COALESCE(excluded.duration_ms, stream_details.duration_ms)
            "#,
        )
        .bind(file_id)
        .bind(&stream.video_codec)
        .bind(stream.video_width)
        .bind(stream.video_height)
        .bind(&stream.aspect_ratio)
        .bind(stream.video_bitrate)
        .bind(stream.framerate)
        .bind(&stream.hdr_format)
        .bind(&stream.audio_codec)
        .bind(stream.audio_channels)
        .bind(&stream.audio_language)
        .bind(stream.duration_ms)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

/// Escape `%`/`_`/`\` for a LIKE pattern with `ESCAPE '\'`.
fn like_escape(s: &str) -> String {
    s.replace('\\', r"\\").replace('%', r"\%").replace('_', r"\_")
}

#[async_trait]
impl MediaStore for SqliteStore {
    async fn upsert_root(&self, path: &str, label: Option<&str>) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO roots (root_path, label, is_active)
            VALUES (?, ?, 1)
            ON CONFLICT(root_path) DO UPDATE SET
                label = COALESCE(excluded.label, roots.label),
                is_active = 1
            RETURNING root_id
            "#,
        )
        .bind(path)
        .bind(label)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get_root(&self, root_id: i64) -> Result<Option<LibraryRoot>> {
        let row = sqlx::query("SELECT * FROM roots WHERE root_id = ?")
            .bind(root_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_root).transpose()
    }

    async fn get_root_by_path(&self, path: &str) -> Result<Option<LibraryRoot>> {
        let row = sqlx::query("SELECT * FROM roots WHERE root_path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_root).transpose()
    }

    async fn list_roots(&self, active_only: bool) -> Result<Vec<LibraryRoot>> {
        let sql = if active_only {
            "SELECT * FROM roots WHERE is_active = 1 ORDER BY root_id"
        } else {
            "SELECT * FROM roots ORDER BY root_id"
        };
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_root).collect()
    }

    async fn touch_root_scan_time(&self, root_id: i64) -> Result<()> {
        sqlx::query("UPDATE roots SET last_scanned = ? WHERE root_id = ?")
            .bind(Utc::now())
            .bind(root_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn next_scan_version(&self, root_id: i64) -> Result<i64> {
        let version = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(MAX(scan_version), 0) + 1 FROM media_files WHERE root_id = ?",
        )
        .bind(root_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(version)
    }

    async fn upsert_media_file(
        &self,
        root_id: i64,
        file: &DiscoveredFile,
        scan_version: i64,
    ) -> Result<UpsertOutcome> {
        let existing = self
            .get_media_file_by_path(root_id, &file.relative_path)
            .await?;

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO media_files
                (root_id, relative_path, filename, file_size, file_mtime, scan_version, last_seen, is_missing)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(root_id, relative_path) DO UPDATE SET
                filename = excluded.filename,
                file_size = excluded.file_size,
                file_mtime = excluded.file_mtime,
                scan_version = excluded.scan_version,
                last_seen = excluded.last_seen,
                is_missing = 0
            RETURNING file_id
            "#,
        )
        .bind(root_id)
        .bind(&file.relative_path)
        .bind(&file.filename)
        .bind(file.size as i64)
        .bind(file.mtime)
        .bind(scan_version)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(UpsertOutcome {
            id,
            created: existing.is_none(),
        })
    }

    async fn get_media_file(&self, file_id: i64) -> Result<Option<MediaFileRecord>> {
        let row = sqlx::query("SELECT * FROM media_files WHERE file_id = ?")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_media_file).transpose()
    }

    async fn get_media_file_by_path(
        &self,
        root_id: i64,
        relative_path: &str,
    ) -> Result<Option<MediaFileRecord>> {
        let row =
            sqlx::query("SELECT * FROM media_files WHERE root_id = ? AND relative_path = ?")
                .bind(root_id)
                .bind(relative_path)
                .fetch_optional(&self.pool)
                .await?;
        row.as_ref().map(Self::row_to_media_file).transpose()
    }

    async fn update_sidecar_info(
        &self,
        file_id: i64,
        sidecar_path: &str,
        sidecar_mtime: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE media_files SET sidecar_path = ?, sidecar_mtime = ? WHERE file_id = ?",
        )
        .bind(sidecar_path)
        .bind(sidecar_mtime)
        .bind(file_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_sidecar_parsed(&self, file_id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE media_files SET sidecar_parsed_at = ? WHERE file_id = ?")
            .bind(at)
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_content_hash(
        &self,
        file_id: i64,
        hash: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE media_files SET content_hash = ?, last_hashed = ? WHERE file_id = ?")
            .bind(hash)
            .bind(at)
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn refresh_subtree_version(
        &self,
        root_id: i64,
        dir_relative_path: &str,
        scan_version: i64,
    ) -> Result<u64> {
        let prefix = format!(
            "{}{}%",
            like_escape(dir_relative_path),
            std::path::MAIN_SEPARATOR
        );
        let result = sqlx::query(
            r#"
            UPDATE media_files
            SET scan_version = ?, last_seen = ?
            WHERE root_id = ? AND is_missing = 0 AND relative_path LIKE ? ESCAPE '\'
            "#,
        )
        .bind(scan_version)
        .bind(Utc::now())
        .bind(root_id)
        .bind(prefix)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn mark_files_missing(&self, root_id: i64, current_version: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE media_files
            SET is_missing = 1
            WHERE root_id = ? AND scan_version < ? AND is_missing = 0
            "#,
        )
        .bind(root_id)
        .bind(current_version)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn files_for_root(&self, root_id: i64) -> Result<Vec<MediaFileRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM media_files WHERE root_id = ? AND is_missing = 0 ORDER BY relative_path",
        )
        .bind(root_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_media_file).collect()
    }

    async fn files_with_sidecar(&self, root_id: Option<i64>) -> Result<Vec<SidecarCandidate>> {
        let sql = r#"
            SELECT mf.*, r.root_path
            FROM media_files mf
            JOIN roots r ON mf.root_id = r.root_id
            WHERE mf.sidecar_path IS NOT NULL
              AND mf.is_missing = 0
              AND (? IS NULL OR mf.root_id = ?)
            ORDER BY mf.relative_path
        "#;
        let rows = sqlx::query(sql)
            .bind(root_id)
            .bind(root_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(SidecarCandidate {
                    file: Self::row_to_media_file(row)?,
                    root_path: row.try_get("root_path")?,
                })
            })
            .collect()
    }

    async fn missing_files(&self, root_id: Option<i64>) -> Result<Vec<MediaFileRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM media_files
            WHERE is_missing = 1 AND (? IS NULL OR root_id = ?)
            ORDER BY root_id, relative_path
            "#,
        )
        .bind(root_id)
        .bind(root_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_media_file).collect()
    }

    async fn prune_missing(&self, root_id: Option<i64>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM media_files WHERE is_missing = 1 AND (? IS NULL OR root_id = ?)",
        )
        .bind(root_id)
        .bind(root_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn duplicate_groups(&self) -> Result<Vec<DuplicateGroup>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM media_files
            WHERE is_missing = 0 AND content_hash IN (
                SELECT content_hash FROM media_files
                WHERE content_hash IS NOT NULL AND is_missing = 0
                GROUP BY content_hash
                HAVING COUNT(*) > 1
            )
            ORDER BY content_hash, root_id, relative_path
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut groups: Vec<DuplicateGroup> = Vec::new();
        for row in &rows {
            let file = Self::row_to_media_file(row)?;
            let hash = file.content_hash.clone().unwrap_or_default();
            match groups.last_mut() {
                Some(group) if group.hash == hash => group.files.push(file),
                _ => groups.push(DuplicateGroup {
                    hash,
                    files: vec![file],
                }),
            }
        }
        Ok(groups)
    }

    async fn get_or_create_lookup(&self, kind: LookupKind, name: &str) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        Self::get_or_create_lookup_on(&mut *conn, kind, name).await
    }

    async fn get_or_create_person(&self, name: &str, thumb_url: Option<&str>) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        Self::get_or_create_person_on(&mut *conn, name, thumb_url).await
    }

    async fn replace_sidecar_document(&self, file_id: i64, doc: &SidecarDocument) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        Self::clear_file_links_on(&mut *tx, file_id).await?;
        Self::upsert_metadata_on(&mut *tx, file_id, &doc.metadata, &doc.checksum).await?;

        for genre in &doc.genres {
            let id = Self::get_or_create_lookup_on(&mut *tx, LookupKind::Genre, genre).await?;
            sqlx::query("INSERT OR IGNORE INTO media_genres (file_id, genre_id) VALUES (?, ?)")
                .bind(file_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        for tag in &doc.tags {
            let id = Self::get_or_create_lookup_on(&mut *tx, LookupKind::Tag, tag).await?;
            sqlx::query("INSERT OR IGNORE INTO media_tags (file_id, tag_id) VALUES (?, ?)")
                .bind(file_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        for country in &doc.countries {
            let id = Self::get_or_create_lookup_on(&mut *tx, LookupKind::Country, country).await?;
            sqlx::query("INSERT OR IGNORE INTO media_countries (file_id, country_id) VALUES (?, ?)")
                .bind(file_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        for (order, studio) in doc.studios.iter().enumerate() {
            let id = Self::get_or_create_lookup_on(&mut *tx, LookupKind::Studio, studio).await?;
            sqlx::query(
                "INSERT OR IGNORE INTO media_studios (file_id, studio_id, display_order) VALUES (?, ?, ?)",
            )
            .bind(file_id)
            .bind(id)
            .bind(order as i64)
            .execute(&mut *tx)
            .await?;
        }

        for actor in &doc.actors {
            let person_id =
                Self::get_or_create_person_on(&mut *tx, &actor.name, actor.thumb.as_deref())
                    .await?;
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO media_actors (file_id, person_id, role, display_order, thumb_url)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(file_id)
            .bind(person_id)
            .bind(&actor.role)
            .bind(actor.order)
            .bind(&actor.thumb)
            .execute(&mut *tx)
            .await?;
        }

        for (order, director) in doc.directors.iter().enumerate() {
            let person_id = Self::get_or_create_person_on(&mut *tx, director, None).await?;
            sqlx::query(
                "INSERT OR IGNORE INTO media_directors (file_id, person_id, display_order) VALUES (?, ?, ?)",
            )
            .bind(file_id)
            .bind(person_id)
            .bind(order as i64)
            .execute(&mut *tx)
            .await?;
        }

        for (order, writer) in doc.writers.iter().enumerate() {
            let person_id = Self::get_or_create_person_on(&mut *tx, writer, None).await?;
            sqlx::query(
                "INSERT OR IGNORE INTO media_writers (file_id, person_id, display_order) VALUES (?, ?, ?)",
            )
            .bind(file_id)
            .bind(person_id)
            .bind(order as i64)
            .execute(&mut *tx)
            .await?;
        }

        for external in &doc.external_ids {
            sqlx::query(
                r#"
                INSERT INTO external_ids (file_id, provider, external_id, is_default)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(file_id, provider) DO UPDATE SET
                    external_id = excluded.external_id,
                    is_default = excluded.is_default
                "#,
            )
            .bind(file_id)
            .bind(&external.provider)
            .bind(&external.value)
            .bind(external.is_default)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(stream) = doc.stream.as_ref().filter(|s| !s.is_empty()) {
            Self::upsert_stream_details_on(&mut *tx, file_id, stream).await?;
        }

        for attr in &doc.custom_attributes {
            let def_id =
                Self::get_or_create_attr_def_on(&mut *tx, &attr.name, attr.values.len() > 1)
                    .await?;
            for value in &attr.values {
                sqlx::query(
                    "INSERT INTO custom_attributes (file_id, attr_def_id, attr_value) VALUES (?, ?, ?)",
                )
                .bind(file_id)
                .bind(def_id)
                .bind(value)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_metadata(&self, file_id: i64) -> Result<Option<SidecarMetadata>> {
        let row = sqlx::query("SELECT * FROM video_metadata WHERE file_id = ?")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(SidecarMetadata {
            title: row.try_get("title")?,
            original_title: row.try_get("original_title")?,
            sort_title: row.try_get("sort_title")?,
            year: row.try_get("year")?,
            premiered: row.try_get("premiered")?,
            release_date: row.try_get("release_date")?,
            date_added: row.try_get("date_added")?,
            runtime: row.try_get("runtime")?,
            plot: row.try_get("plot")?,
            tagline: row.try_get("tagline")?,
            outline: row.try_get("outline")?,
            rating: row.try_get("rating")?,
            votes: row.try_get("votes")?,
            mpaa: row.try_get("mpaa")?,
            certification: row.try_get("certification")?,
            set_name: row.try_get("set_name")?,
            set_order: row.try_get("set_order")?,
            poster_path: row.try_get("poster_path")?,
            fanart_path: row.try_get("fanart_path")?,
            thumb_path: row.try_get("thumb_path")?,
            trailer_url: row.try_get("trailer_url")?,
            playcount: row.try_get("playcount")?,
            last_played: row.try_get("last_played")?,
        }))
    }

    async fn get_sidecar_checksum(&self, file_id: i64) -> Result<Option<String>> {
        let checksum = sqlx::query_scalar::<_, Option<String>>(
            "SELECT sidecar_checksum FROM video_metadata WHERE file_id = ?",
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(checksum.flatten())
    }

    async fn get_stream_details(&self, file_id: i64) -> Result<Option<StreamDetails>> {
        let row = sqlx::query("SELECT * FROM stream_details WHERE file_id = ?")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(StreamDetails {
            video_codec: row.try_get("video_codec")?,
            video_width: row.try_get("video_width")?,
            video_height: row.try_get("video_height")?,
            aspect_ratio: row.try_get("aspect_ratio")?,
            video_bitrate: row.try_get("video_bitrate")?,
            framerate: row.try_get("framerate")?,
            hdr_format: row.try_get("hdr_format")?,
            audio_codec: row.try_get("audio_codec")?,
            audio_channels: row.try_get("audio_channels")?,
            audio_language: row.try_get("audio_language")?,
            duration_ms: row.try_get("duration_ms")?,
        }))
    }

    async fn get_file_lookups(&self, file_id: i64, kind: LookupKind) -> Result<Vec<String>> {
        let (junction, order_by) = match kind {
            LookupKind::Genre => ("media_genres", "l.name"),
            LookupKind::Tag => ("media_tags", "l.name"),
            LookupKind::Country => ("media_countries", "l.name"),
            LookupKind::Studio => ("media_studios", "j.display_order"),
        };
        let table = kind.table();
        let id_col = kind.id_column();

        let names = sqlx::query_scalar::<_, String>(&format!(
            r#"
            SELECT l.name FROM {junction} j
            JOIN {table} l ON j.{id_col} = l.{id_col}
            WHERE j.file_id = ?
            ORDER BY {order_by}
            "#
        ))
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(names)
    }

    async fn get_file_actors(&self, file_id: i64) -> Result<Vec<Actor>> {
        let rows = sqlx::query(
            r#"
            SELECT p.name, ma.role, ma.thumb_url, ma.display_order
            FROM media_actors ma
            JOIN people p ON ma.person_id = p.person_id
            WHERE ma.file_id = ?
            ORDER BY ma.display_order, p.name
            "#,
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Actor {
                    name: row.try_get("name")?,
                    role: row.try_get("role")?,
                    thumb: row.try_get("thumb_url")?,
                    order: row.try_get("display_order")?,
                })
            })
            .collect()
    }

    async fn get_file_directors(&self, file_id: i64) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT p.name FROM media_directors md
            JOIN people p ON md.person_id = p.person_id
            WHERE md.file_id = ?
            ORDER BY md.display_order
            "#,
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn get_file_writers(&self, file_id: i64) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT p.name FROM media_writers mw
            JOIN people p ON mw.person_id = p.person_id
            WHERE mw.file_id = ?
            ORDER BY mw.display_order
            "#,
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn get_file_external_ids(&self, file_id: i64) -> Result<Vec<ExternalId>> {
        let rows = sqlx::query(
            "SELECT provider, external_id, is_default FROM external_ids WHERE file_id = ? ORDER BY provider",
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ExternalId {
                    provider: row.try_get("provider")?,
                    value: row.try_get("external_id")?,
                    is_default: row.try_get("is_default")?,
                })
            })
            .collect()
    }

    async fn get_file_custom_attributes(&self, file_id: i64) -> Result<Vec<CustomAttribute>> {
        let rows = sqlx::query(
            r#"
            SELECT d.attr_name, ca.attr_value
            FROM custom_attributes ca
            JOIN custom_attribute_defs d ON ca.attr_def_id = d.attr_def_id
            WHERE ca.file_id = ?
            ORDER BY ca.attr_id
            "#,
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;

        let mut attrs: Vec<CustomAttribute> = Vec::new();
        for row in &rows {
            let name: String = row.try_get("attr_name")?;
            let value: String = row.try_get("attr_value")?;
            match attrs.iter_mut().find(|a| a.name == name) {
                Some(attr) => attr.values.push(value),
                None => attrs.push(CustomAttribute {
                    name,
                    values: vec![value],
                }),
            }
        }
        Ok(attrs)
    }

    async fn create_scan_session(&self, root_id: Option<i64>, kind: ScanKind) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO scan_sessions (root_id, scan_type, started_at)
            VALUES (?, ?, ?)
            RETURNING scan_id
            "#,
        )
        .bind(root_id)
        .bind(kind.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn finish_scan_session(&self, scan_id: i64, totals: SessionTotals) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scan_sessions SET
                finished_at = ?,
                files_scanned = ?,
                files_added = ?,
                files_updated = ?,
                files_removed = ?,
                sidecars_parsed = ?,
                error_count = ?
            WHERE scan_id = ?
            "#,
        )
        .bind(Utc::now())
        .bind(totals.files_scanned)
        .bind(totals.files_added)
        .bind(totals.files_updated)
        .bind(totals.files_removed)
        .bind(totals.sidecars_parsed)
        .bind(totals.error_count)
        .bind(scan_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn log_scan_error(
        &self,
        scan_id: i64,
        file_path: &str,
        kind: ScanErrorKind,
        message: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scan_errors (scan_id, file_path, error_kind, error_message, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(scan_id)
        .bind(file_path)
        .bind(kind.as_str())
        .bind(message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Queries consumed only by the CLI layer (search rendering, playlists,
/// stats). These sit outside the [`MediaStore`] contract the pipeline
/// depends on.
impl SqliteStore {
    pub async fn media_summary(&self, file_id: i64) -> Result<Option<MediaSummary>> {
        let row = sqlx::query(
            r#"
            SELECT mf.file_id, r.root_path, mf.relative_path, mf.filename,
                   m.title, m.original_title, m.year, m.rating, m.runtime, m.plot
            FROM media_files mf
            JOIN roots r ON mf.root_id = r.root_id
            LEFT JOIN video_metadata m ON m.file_id = mf.file_id
            WHERE mf.file_id = ?
            "#,
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_summary).transpose()
    }

    pub async fn create_playlist(
        &self,
        name: &str,
        description: Option<&str>,
        smart_query: Option<&str>,
    ) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO playlists (name, description, is_smart, smart_query, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING playlist_id
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(smart_query.is_some())
        .bind(smart_query)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn add_playlist_item(
        &self,
        playlist_id: i64,
        file_id: i64,
        position: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO playlist_items (playlist_id, file_id, position) VALUES (?, ?, ?)",
        )
        .bind(playlist_id)
        .bind(file_id)
        .bind(position)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_playlists(&self) -> Result<Vec<Playlist>> {
        let rows = sqlx::query("SELECT * FROM playlists ORDER BY updated_at DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(Playlist {
                    id: row.try_get("playlist_id")?,
                    name: row.try_get("name")?,
                    description: row.try_get("description")?,
                    is_smart: row.try_get("is_smart")?,
                    smart_query: row.try_get("smart_query")?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }

    pub async fn get_playlist_by_name(&self, name: &str) -> Result<Option<Playlist>> {
        let row = sqlx::query("SELECT * FROM playlists WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(Playlist {
                id: row.try_get("playlist_id")?,
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                is_smart: row.try_get("is_smart")?,
                smart_query: row.try_get("smart_query")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
    }

    pub async fn playlist_items(&self, playlist_id: i64) -> Result<Vec<MediaSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT mf.file_id, r.root_path, mf.relative_path, mf.filename,
                   m.title, m.original_title, m.year, m.rating, m.runtime, m.plot
            FROM playlist_items pi
            JOIN media_files mf ON pi.file_id = mf.file_id
            JOIN roots r ON mf.root_id = r.root_id
            LEFT JOIN video_metadata m ON m.file_id = mf.file_id
            WHERE pi.playlist_id = ?
            ORDER BY pi.position
            "#,
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_summary).collect()
    }

    /// Most recent scan sessions from the append-only audit log.
    pub async fn recent_sessions(&self, limit: i64) -> Result<Vec<ScanSession>> {
        let rows = sqlx::query("SELECT * FROM scan_sessions ORDER BY scan_id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let scan_type: String = row.try_get("scan_type")?;
                Ok(ScanSession {
                    id: row.try_get("scan_id")?,
                    root_id: row.try_get("root_id")?,
                    kind: ScanKind::parse(&scan_type).unwrap_or(ScanKind::Index),
                    started_at: row.try_get("started_at")?,
                    finished_at: row.try_get("finished_at")?,
                    files_scanned: row.try_get("files_scanned")?,
                    files_added: row.try_get("files_added")?,
                    files_updated: row.try_get("files_updated")?,
                    files_removed: row.try_get("files_removed")?,
                    sidecars_parsed: row.try_get("sidecars_parsed")?,
                    error_count: row.try_get("error_count")?,
                })
            })
            .collect()
    }

    /// Per-file failures recorded during one scan session.
    pub async fn session_errors(&self, scan_id: i64) -> Result<Vec<ScanErrorRecord>> {
        let rows = sqlx::query("SELECT * FROM scan_errors WHERE scan_id = ? ORDER BY error_id")
            .bind(scan_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let kind: String = row.try_get("error_kind")?;
                Ok(ScanErrorRecord {
                    id: row.try_get("error_id")?,
                    scan_id: row.try_get("scan_id")?,
                    file_path: row.try_get("file_path")?,
                    kind: ScanErrorKind::parse(&kind).unwrap_or(ScanErrorKind::Index),
                    message: row.try_get("error_message")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    pub async fn library_stats(&self) -> Result<LibraryStats> {
        let (total_files, total_size): (i64, Option<i64>) = sqlx::query_as(
            "SELECT COUNT(*), SUM(file_size) FROM media_files WHERE is_missing = 0",
        )
        .fetch_one(&self.pool)
        .await?;

        let hashed_files = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM media_files WHERE content_hash IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        let files_with_sidecar = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM media_files WHERE sidecar_parsed_at IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        let missing_files = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM media_files WHERE is_missing = 1",
        )
        .fetch_one(&self.pool)
        .await?;

        let duplicate_groups = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM (
                SELECT content_hash FROM media_files
                WHERE content_hash IS NOT NULL AND is_missing = 0
                GROUP BY content_hash
                HAVING COUNT(*) > 1
            )
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let total_genres = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM genres")
            .fetch_one(&self.pool)
            .await?;

        let total_people = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM people")
            .fetch_one(&self.pool)
            .await?;

        Ok(LibraryStats {
            total_files: total_files as u64,
            total_size_bytes: total_size.unwrap_or(0) as u64,
            hashed_files: hashed_files as u64,
            files_with_sidecar: files_with_sidecar as u64,
            missing_files: missing_files as u64,
            duplicate_groups: duplicate_groups as u64,
            total_genres: total_genres as u64,
            total_people: total_people as u64,
        })
    }
}
