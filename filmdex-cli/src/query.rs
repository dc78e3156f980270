//! Filter-string query language and its SQL assembly.
//!
//! `year:2020 genre:action rating:>7 heat` style strings become a
//! [`QueryFilter`], which the builder turns into one SELECT over the
//! library schema. Unknown `key:value` terms fall through to custom
//! attributes; bare words accumulate into the title search.

use anyhow::Result;
use filmdex_core::SqliteStore;
use filmdex_model::MediaSummary;
use sqlx::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    TitleAsc,
    TitleDesc,
    YearAsc,
    YearDesc,
    RatingAsc,
    RatingDesc,
    RuntimeAsc,
    RuntimeDesc,
    SizeAsc,
    SizeDesc,
    AddedAsc,
    AddedDesc,
    Random,
}

impl SortOrder {
    fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "title_asc" => SortOrder::TitleAsc,
            "title_desc" => SortOrder::TitleDesc,
            "year_asc" => SortOrder::YearAsc,
            "year_desc" => SortOrder::YearDesc,
            "rating_asc" => SortOrder::RatingAsc,
            "rating_desc" => SortOrder::RatingDesc,
            "runtime_asc" => SortOrder::RuntimeAsc,
            "runtime_desc" => SortOrder::RuntimeDesc,
            "size_asc" => SortOrder::SizeAsc,
            "size_desc" => SortOrder::SizeDesc,
            "added_asc" => SortOrder::AddedAsc,
            "added_desc" => SortOrder::AddedDesc,
            "random" => SortOrder::Random,
            _ => return None,
        })
    }

    fn clause(&self) -> &'static str {
        match self {
            SortOrder::TitleAsc => "COALESCE(v.title, mf.filename) ASC",
            SortOrder::TitleDesc => "COALESCE(v.title, mf.filename) DESC",
            SortOrder::YearAsc => "v.year ASC NULLS LAST",
            SortOrder::YearDesc => "v.year DESC NULLS LAST",
            SortOrder::RatingAsc => "v.rating ASC NULLS LAST",
            SortOrder::RatingDesc => "v.rating DESC NULLS LAST",
            SortOrder::RuntimeAsc => "v.runtime ASC NULLS LAST",
            SortOrder::RuntimeDesc => "v.runtime DESC NULLS LAST",
            SortOrder::SizeAsc => "mf.file_size ASC",
            SortOrder::SizeDesc => "mf.file_size DESC",
            SortOrder::AddedAsc => "mf.last_seen ASC",
            SortOrder::AddedDesc => "mf.last_seen DESC",
            SortOrder::Random => "RANDOM()",
        }
    }
}

/// Filter criteria assembled from a filter string.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub title: Option<String>,
    pub plot: Option<String>,

    pub year: Option<i64>,
    pub year_min: Option<i64>,
    pub year_max: Option<i64>,

    pub rating_min: Option<f64>,
    pub rating_max: Option<f64>,

    pub runtime_min: Option<i64>,
    pub runtime_max: Option<i64>,

    // Multi-value filters (any match)
    pub genres: Vec<String>,
    pub tags: Vec<String>,
    pub actors: Vec<String>,
    pub directors: Vec<String>,
    pub studios: Vec<String>,
    pub countries: Vec<String>,

    pub set_name: Option<String>,

    pub min_width: Option<i64>,
    pub video_codec: Option<String>,
    pub hdr_only: bool,

    pub imdb_id: Option<String>,

    /// Unknown keys become custom-attribute matches.
    pub custom_attrs: Vec<(String, String)>,

    pub root_id: Option<i64>,
    pub sort: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Self::default()
        }
    }
}

/// Parse a human-friendly filter string.
///
/// Bare words are title terms; `key:value` pairs map to fields, with `>`/
/// `<` prefixes and `a-b` ranges where numeric.
pub fn parse_filter_string(filter: &str) -> QueryFilter {
    let mut filters = QueryFilter::new();

    for part in filter.split_whitespace() {
        let Some((key, value)) = part.split_once(':') else {
            match &mut filters.title {
                Some(title) => {
                    title.push(' ');
                    title.push_str(part);
                }
                None => filters.title = Some(part.to_string()),
            }
            continue;
        };

        let key = key.to_lowercase();
        match key.as_str() {
            "title" => filters.title = Some(value.to_string()),
            "plot" => filters.plot = Some(value.to_string()),
            "year" => {
                if let Some(rest) = value.strip_prefix('>') {
                    filters.year_min = rest.parse().ok();
                } else if let Some(rest) = value.strip_prefix('<') {
                    filters.year_max = rest.parse().ok();
                } else if let Some((start, end)) = value.split_once('-') {
                    filters.year_min = start.parse().ok();
                    filters.year_max = end.parse().ok();
                } else {
                    filters.year = value.parse().ok();
                }
            }
            "rating" => {
                if let Some(rest) = value.strip_prefix('>') {
                    filters.rating_min = rest.parse().ok();
                } else if let Some(rest) = value.strip_prefix('<') {
                    filters.rating_max = rest.parse().ok();
                } else {
                    filters.rating_min = value.parse().ok();
                }
            }
            "runtime" => {
                if let Some(rest) = value.strip_prefix('>') {
                    filters.runtime_min = rest.parse().ok();
                } else if let Some(rest) = value.strip_prefix('<') {
                    filters.runtime_max = rest.parse().ok();
                }
            }
            "genre" => filters.genres.push(value.to_string()),
            "tag" => filters.tags.push(value.to_string()),
            "actor" => filters.actors.push(value.to_string()),
            "director" => filters.directors.push(value.to_string()),
            "studio" => filters.studios.push(value.to_string()),
            "country" => filters.countries.push(value.to_string()),
            "set" | "collection" => filters.set_name = Some(value.to_string()),
            "codec" => filters.video_codec = Some(value.to_string()),
            "imdb" => filters.imdb_id = Some(value.to_string()),
            "resolution" => {
                filters.min_width = match value.to_lowercase().as_str() {
                    "4k" | "uhd" => Some(3840),
                    "hd" | "1080p" => Some(1920),
                    "720p" => Some(1280),
                    _ => None,
                }
            }
            "hdr" => {
                filters.hdr_only = matches!(value.to_lowercase().as_str(), "true" | "yes" | "1")
            }
            "root" => filters.root_id = value.parse().ok(),
            "sort" => {
                if let Some(sort) = SortOrder::parse(&value.to_lowercase()) {
                    filters.sort = sort;
                }
            }
            "limit" => {
                if let Ok(limit) = value.parse() {
                    filters.limit = limit;
                }
            }
            _ => filters.custom_attrs.push((key, value.to_string())),
        }
    }

    filters
}

/// Bind values collected while assembling the SQL.
#[derive(Debug, Clone)]
enum Param {
    Text(String),
    Int(i64),
    Float(f64),
}

/// Assembles and runs SELECTs over the library for a [`QueryFilter`].
#[derive(Debug, Clone, Copy)]
pub struct MediaQuery<'a> {
    store: &'a SqliteStore,
}

impl<'a> MediaQuery<'a> {
    pub fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    fn build(filters: &QueryFilter, paginate: bool) -> (String, Vec<Param>) {
        let mut joins: Vec<String> = Vec::new();
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Param> = Vec::new();

        if let Some(title) = &filters.title {
            conditions
                .push("(v.title LIKE ? OR v.original_title LIKE ? OR mf.filename LIKE ?)".into());
            let pattern = format!("%{title}%");
            params.push(Param::Text(pattern.clone()));
            params.push(Param::Text(pattern.clone()));
            params.push(Param::Text(pattern));
        }
        if let Some(plot) = &filters.plot {
            conditions.push("v.plot LIKE ?".into());
            params.push(Param::Text(format!("%{plot}%")));
        }

        if let Some(year) = filters.year {
            conditions.push("v.year = ?".into());
            params.push(Param::Int(year));
        }
        if let Some(year_min) = filters.year_min {
            conditions.push("v.year >= ?".into());
            params.push(Param::Int(year_min));
        }
        if let Some(year_max) = filters.year_max {
            conditions.push("v.year <= ?".into());
            params.push(Param::Int(year_max));
        }

        if let Some(rating_min) = filters.rating_min {
            conditions.push("v.rating >= ?".into());
            params.push(Param::Float(rating_min));
        }
        if let Some(rating_max) = filters.rating_max {
            conditions.push("v.rating <= ?".into());
            params.push(Param::Float(rating_max));
        }

        if let Some(runtime_min) = filters.runtime_min {
            conditions.push("v.runtime >= ?".into());
            params.push(Param::Int(runtime_min));
        }
        if let Some(runtime_max) = filters.runtime_max {
            conditions.push("v.runtime <= ?".into());
            params.push(Param::Int(runtime_max));
        }

        // Lookup filters: any-match, each with its own join.
        if !filters.genres.is_empty() {
            joins.push(
                "JOIN media_genres mg ON mf.file_id = mg.file_id \
                 JOIN genres g ON mg.genre_id = g.genre_id"
                    .into(),
            );
            let any = vec!["LOWER(g.name) = LOWER(?)"; filters.genres.len()].join(" OR ");
            conditions.push(format!("({any})"));
            params.extend(filters.genres.iter().cloned().map(Param::Text));
        }
        if !filters.tags.is_empty() {
            joins.push(
                "JOIN media_tags mt ON mf.file_id = mt.file_id \
                 JOIN tags t ON mt.tag_id = t.tag_id"
                    .into(),
            );
            let any = vec!["LOWER(t.name) = LOWER(?)"; filters.tags.len()].join(" OR ");
            conditions.push(format!("({any})"));
            params.extend(filters.tags.iter().cloned().map(Param::Text));
        }
        if !filters.actors.is_empty() {
            joins.push(
                "JOIN media_actors ma ON mf.file_id = ma.file_id \
                 JOIN people pa ON ma.person_id = pa.person_id"
                    .into(),
            );
            let any = vec!["pa.name LIKE ?"; filters.actors.len()].join(" OR ");
            conditions.push(format!("({any})"));
            params.extend(
                filters
                    .actors
                    .iter()
                    .map(|a| Param::Text(format!("%{a}%"))),
            );
        }
        if !filters.directors.is_empty() {
            joins.push(
                "JOIN media_directors md ON mf.file_id = md.file_id \
                 JOIN people pd ON md.person_id = pd.person_id"
                    .into(),
            );
            let any = vec!["pd.name LIKE ?"; filters.directors.len()].join(" OR ");
            conditions.push(format!("({any})"));
            params.extend(
                filters
                    .directors
                    .iter()
                    .map(|d| Param::Text(format!("%{d}%"))),
            );
        }
        if !filters.studios.is_empty() {
            joins.push(
                "JOIN media_studios ms ON mf.file_id = ms.file_id \
                 JOIN studios s ON ms.studio_id = s.studio_id"
                    .into(),
            );
            let any = vec!["LOWER(s.name) LIKE LOWER(?)"; filters.studios.len()].join(" OR ");
            conditions.push(format!("({any})"));
            params.extend(
                filters
                    .studios
                    .iter()
                    .map(|s| Param::Text(format!("%{s}%"))),
            );
        }
        if !filters.countries.is_empty() {
            joins.push(
                "JOIN media_countries mc ON mf.file_id = mc.file_id \
                 JOIN countries c ON mc.country_id = c.country_id"
                    .into(),
            );
            let any = vec!["LOWER(c.name) LIKE LOWER(?)"; filters.countries.len()].join(" OR ");
            conditions.push(format!("({any})"));
            params.extend(
                filters
                    .countries
                    .iter()
                    .map(|c| Param::Text(format!("%{c}%"))),
            );
        }

        if let Some(set_name) = &filters.set_name {
            conditions.push("v.set_name LIKE ?".into());
            params.push(Param::Text(format!("%{set_name}%")));
        }

        if let Some(min_width) = filters.min_width {
            conditions.push("sd.video_width >= ?".into());
            params.push(Param::Int(min_width));
        }
        if let Some(codec) = &filters.video_codec {
            conditions.push("sd.video_codec LIKE ?".into());
            params.push(Param::Text(format!("%{codec}%")));
        }
        if filters.hdr_only {
            conditions.push("sd.hdr_format IS NOT NULL".into());
        }

        if let Some(imdb_id) = &filters.imdb_id {
            joins.push(
                "JOIN external_ids ei ON mf.file_id = ei.file_id AND ei.provider = 'imdb'".into(),
            );
            conditions.push("ei.external_id = ?".into());
            params.push(Param::Text(imdb_id.clone()));
        }

        for (index, (name, value)) in filters.custom_attrs.iter().enumerate() {
            let alias = format!("ca{index}");
            joins.push(format!(
                "JOIN custom_attributes {alias} ON mf.file_id = {alias}.file_id \
                 JOIN custom_attribute_defs {alias}d ON {alias}.attr_def_id = {alias}d.attr_def_id \
                 AND {alias}d.attr_name = ?"
            ));
            params.push(Param::Text(name.clone()));
            conditions.push(format!("{alias}.attr_value LIKE ?"));
            params.push(Param::Text(format!("%{value}%")));
        }

        if let Some(root_id) = filters.root_id {
            conditions.push("mf.root_id = ?".into());
            params.push(Param::Int(root_id));
        }

        let mut sql = String::from(
            "SELECT DISTINCT mf.file_id, r.root_path, mf.relative_path, mf.filename, \
             v.title, v.original_title, v.year, v.rating, v.runtime, v.plot \
             FROM media_files mf \
             JOIN roots r ON mf.root_id = r.root_id \
             LEFT JOIN video_metadata v ON v.file_id = mf.file_id \
             LEFT JOIN stream_details sd ON sd.file_id = mf.file_id ",
        );
        sql.push_str(&joins.join(" "));
        sql.push_str(" WHERE mf.is_missing = 0");
        for condition in &conditions {
            sql.push_str(" AND ");
            sql.push_str(condition);
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(filters.sort.clause());
        if paginate {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(Param::Int(filters.limit));
            params.push(Param::Int(filters.offset));
        }

        (sql, params)
    }

    fn bind<'q>(
        sql: &'q str,
        params: &'q [Param],
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                Param::Text(v) => query.bind(v.as_str()),
                Param::Int(v) => query.bind(v),
                Param::Float(v) => query.bind(v),
            };
        }
        query
    }

    pub async fn execute(&self, filters: &QueryFilter) -> Result<Vec<MediaSummary>> {
        let (sql, params) = Self::build(filters, true);
        let rows = Self::bind(&sql, &params)
            .fetch_all(self.store.pool())
            .await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            results.push(SqliteStore::row_to_summary(row)?);
        }
        Ok(results)
    }

    pub async fn count(&self, filters: &QueryFilter) -> Result<i64> {
        let (inner, params) = Self::build(filters, false);
        let sql = format!("SELECT COUNT(*) AS n FROM ({inner}) sub");
        let row = Self::bind(&sql, &params)
            .fetch_one(self.store.pool())
            .await?;
        Ok(row.try_get("n")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_words_accumulate_into_title() {
        let filters = parse_filter_string("the big heat");
        assert_eq!(filters.title.as_deref(), Some("the big heat"));
    }

    #[test]
    fn year_range_and_comparisons() {
        let filters = parse_filter_string("year:2010-2020");
        assert_eq!(filters.year_min, Some(2010));
        assert_eq!(filters.year_max, Some(2020));

        let filters = parse_filter_string("year:>1999 rating:>7.5 runtime:<120");
        assert_eq!(filters.year_min, Some(1999));
        assert_eq!(filters.rating_min, Some(7.5));
        assert_eq!(filters.runtime_max, Some(120));
    }

    #[test]
    fn repeated_keys_collect() {
        let filters = parse_filter_string("genre:action genre:crime actor:pacino");
        assert_eq!(filters.genres, ["action", "crime"]);
        assert_eq!(filters.actors, ["pacino"]);
    }

    #[test]
    fn unknown_keys_become_custom_attributes() {
        let filters = parse_filter_string("mood:tense source:bluray");
        assert_eq!(
            filters.custom_attrs,
            [
                ("mood".to_string(), "tense".to_string()),
                ("source".to_string(), "bluray".to_string())
            ]
        );
    }

    #[test]
    fn sort_and_limit() {
        let filters = parse_filter_string("sort:rating_desc limit:10");
        assert_eq!(filters.sort, SortOrder::RatingDesc);
        assert_eq!(filters.limit, 10);
    }

    #[test]
    fn resolution_shorthands() {
        assert_eq!(parse_filter_string("resolution:4k").min_width, Some(3840));
        assert_eq!(parse_filter_string("resolution:hd").min_width, Some(1920));
        assert_eq!(parse_filter_string("resolution:720p").min_width, Some(1280));
    }

    #[test]
    fn build_produces_one_condition_per_filter() {
        let filters = parse_filter_string("heat year:1995 genre:crime");
        let (sql, params) = MediaQuery::build(&filters, true);
        assert!(sql.contains("v.year = ?"));
        assert!(sql.contains("media_genres"));
        assert!(sql.ends_with("LIMIT ? OFFSET ?"));
        // title ×3, year, genre, limit, offset
        assert_eq!(params.len(), 7);
    }
}
