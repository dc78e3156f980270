//! Tolerant NFO sidecar parsing.
//!
//! The primary path is a recovering XML event parse: end-tag mismatches,
//! truncated elements, and bad entities all yield whatever fields were
//! readable instead of failing. When structure is too far gone to produce
//! any elements, a regex fallback pulls out a minimal field set. Parsing
//! never returns an error.

mod persist;

pub use persist::{ExtractOutcome, NfoExtractor};

use filmdex_model::{Actor, ExternalId, SidecarDocument, StreamDetails};
use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Tags the extractor maps to structured fields. Anything else at the top
/// level is captured as a custom attribute.
const STANDARD_ELEMENTS: &[&str] = &[
    // Core identification
    "title",
    "originaltitle",
    "sorttitle",
    // Dates
    "year",
    "premiered",
    "releasedate",
    "dateadded",
    // Runtime & description
    "runtime",
    "plot",
    "tagline",
    "outline",
    // Ratings
    "rating",
    "votes",
    "mpaa",
    "certification",
    // Collections
    "set",
    "collectionnumber",
    // Media paths
    "poster",
    "fanart",
    "thumb",
    "trailer",
    // Playback
    "playcount",
    "lastplayed",
    // Multi-value elements
    "genre",
    "tag",
    "country",
    "studio",
    "actor",
    "director",
    "credits",
    "writer",
    // External ids
    "uniqueid",
    "id",
    "imdbid",
    "tmdbid",
    "tvdbid",
    // Technical info
    "fileinfo",
    // TV-specific, recognized but not mapped
    "episode",
    "season",
    "showtitle",
    "aired",
];

static FALLBACK_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<title[^>]*>([^<]+)</title>").unwrap());
static FALLBACK_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<year[^>]*>(\d{4})</year>").unwrap());
static FALLBACK_PLOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<plot[^>]*>([^<]+)</plot>").unwrap());
static FALLBACK_RATING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<rating[^>]*>([\d.]+)</rating>").unwrap());

/// Minimal in-memory element tree built by the recovering parse. Names are
/// lower-cased on construction.
#[derive(Debug, Default, Clone)]
struct XmlNode {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<XmlNode>,
}

impl XmlNode {
    fn from_start(start: &BytesStart<'_>) -> Self {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).to_lowercase();
        let attrs = start
            .attributes()
            .with_checks(false)
            .flatten()
            .map(|attr| {
                let key =
                    String::from_utf8_lossy(attr.key.local_name().as_ref()).to_lowercase();
                let value = attr
                    .unescape_value()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
                (key, value)
            })
            .collect();
        Self {
            name,
            attrs,
            ..Self::default()
        }
    }

    fn find(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    fn find_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn trimmed_text(&self) -> Option<&str> {
        let text = self.text.trim();
        (!text.is_empty()).then_some(text)
    }
}

fn get_text(node: Option<&XmlNode>) -> Option<String> {
    node.and_then(XmlNode::trimmed_text).map(str::to_owned)
}

/// Integer reading that tolerates decimal renderings like `120.0`.
fn get_int(node: Option<&XmlNode>) -> Option<i64> {
    node.and_then(XmlNode::trimmed_text)
        .and_then(|t| t.parse::<f64>().ok())
        .map(|v| v as i64)
}

fn get_float(node: Option<&XmlNode>) -> Option<f64> {
    node.and_then(XmlNode::trimmed_text)
        .and_then(|t| t.parse::<f64>().ok())
}

/// Parser for Emby/Kodi style NFO sidecars.
#[derive(Debug, Clone, Copy, Default)]
pub struct NfoParser;

impl NfoParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse raw sidecar bytes. The checksum of the bytes is always set;
    /// everything else is best effort.
    pub fn parse(&self, bytes: &[u8]) -> SidecarDocument {
        let checksum = hex::encode(Sha256::digest(bytes));
        let text = String::from_utf8_lossy(bytes);

        let mut doc = match Self::build_tree(&text) {
            Some(root) => Self::map_document(&root),
            None => SidecarDocument::default(),
        };
        if doc == SidecarDocument::default() {
            debug!("structural parse yielded nothing, using pattern fallback");
            doc = Self::parse_fallback(&text);
        }
        doc.checksum = checksum;
        doc
    }

    /// Recovering event parse into an element tree. Returns the container
    /// whose children are the document's top-level tags, or `None` when no
    /// element at all could be read.
    fn build_tree(text: &str) -> Option<XmlNode> {
        let mut reader = Reader::from_str(text);
        let config = reader.config_mut();
        config.trim_text(true);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.allow_dangling_amp = true;

        // Synthetic document node; truncated elements unwind into it at EOF.
        let mut stack = vec![XmlNode::default()];

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => stack.push(XmlNode::from_start(&start)),
                Ok(Event::Empty(start)) => {
                    let node = XmlNode::from_start(&start);
                    stack.last_mut().expect("document node").children.push(node);
                }
                Ok(Event::Text(t)) => {
                    let content = t
                        .xml_content()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned());
                    stack.last_mut().expect("document node").text.push_str(&content);
                }
                Ok(Event::CData(c)) => {
                    let content = String::from_utf8_lossy(c.as_ref()).into_owned();
                    stack.last_mut().expect("document node").text.push_str(&content);
                }
                Ok(Event::End(_)) => {
                    if stack.len() > 1 {
                        let node = stack.pop().expect("non-empty stack");
                        stack.last_mut().expect("document node").children.push(node);
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                // Unrecoverable syntax at this offset: keep what we have.
                Err(err) => {
                    debug!("xml parse stopped early: {err}");
                    break;
                }
            }
        }

        // Unwind truncated elements into their parents.
        while stack.len() > 1 {
            let node = stack.pop().expect("non-empty stack");
            stack.last_mut().expect("document node").children.push(node);
        }
        let document = stack.pop().expect("document node");

        match document.children.len() {
            0 => None,
            // Well-formed: a single wrapper element (<movie>...).
            1 => Some(document.children.into_iter().next().expect("one child")),
            // Recovered fragments without a wrapper: treat the document
            // itself as the container.
            _ => Some(document),
        }
    }

    fn map_document(root: &XmlNode) -> SidecarDocument {
        let mut doc = SidecarDocument::default();
        let meta = &mut doc.metadata;

        // Scalars; `find` returns the first occurrence, so repeats lose.
        meta.title = get_text(root.find("title"));
        meta.original_title = get_text(root.find("originaltitle"));
        meta.sort_title = get_text(root.find("sorttitle"));

        meta.year = get_int(root.find("year"));
        meta.premiered = get_text(root.find("premiered"));
        meta.release_date = get_text(root.find("releasedate"));
        meta.date_added = get_text(root.find("dateadded"));

        meta.runtime = get_int(root.find("runtime"));
        meta.plot = get_text(root.find("plot"));
        meta.tagline = get_text(root.find("tagline"));
        meta.outline = get_text(root.find("outline"));

        meta.rating = get_float(root.find("rating"));
        meta.votes = get_int(root.find("votes"));
        meta.mpaa = get_text(root.find("mpaa"));
        meta.certification = get_text(root.find("certification"));

        if let Some(set) = root.find("set") {
            // Either bare text or a structured block with <name>/<index>.
            meta.set_name = match set.find("name") {
                Some(name) => get_text(Some(name)),
                None => get_text(Some(set)),
            };
            meta.set_order = get_int(set.find("index"));
        }
        if meta.set_order.is_none() {
            meta.set_order = get_int(root.find("collectionnumber"));
        }

        meta.poster_path = get_text(root.find("poster"));
        meta.fanart_path = get_text(root.find("fanart"));
        meta.thumb_path = get_text(root.find("thumb"));
        meta.trailer_url = get_text(root.find("trailer"));

        meta.playcount = get_int(root.find("playcount"));
        meta.last_played = get_text(root.find("lastplayed"));

        // Multi-value fields keep document order.
        doc.genres = root.find_all("genre").filter_map(|n| get_text(Some(n))).collect();
        doc.tags = root.find_all("tag").filter_map(|n| get_text(Some(n))).collect();
        doc.countries = root
            .find_all("country")
            .filter_map(|n| get_text(Some(n)))
            .collect();
        doc.studios = root
            .find_all("studio")
            .filter_map(|n| get_text(Some(n)))
            .collect();
        doc.directors = root
            .find_all("director")
            .filter_map(|n| get_text(Some(n)))
            .collect();

        // Writers come from two legacy tag names, deduplicated by text.
        for node in root.find_all("credits").chain(root.find_all("writer")) {
            if let Some(writer) = get_text(Some(node))
                && !doc.writers.contains(&writer)
            {
                doc.writers.push(writer);
            }
        }

        doc.actors = root
            .find_all("actor")
            .enumerate()
            .map(|(position, node)| Actor {
                name: get_text(node.find("name")).unwrap_or_else(|| "Unknown".to_string()),
                role: get_text(node.find("role")),
                thumb: get_text(node.find("thumb")),
                order: get_int(node.find("order")).unwrap_or(position as i64),
            })
            .collect();

        Self::collect_external_ids(root, &mut doc);

        if let Some(fileinfo) = root.find("fileinfo") {
            let stream = Self::map_stream_details(fileinfo);
            if !stream.is_empty() {
                doc.stream = Some(stream);
            }
        }

        // Anything not in the registry becomes a custom attribute; every
        // occurrence is kept.
        for child in &root.children {
            if STANDARD_ELEMENTS.contains(&child.name.as_str()) {
                continue;
            }
            if let Some(value) = child.trimmed_text() {
                let name = child.name.clone();
                doc.push_custom(&name, value.to_string());
            }
        }

        doc
    }

    fn collect_external_ids(root: &XmlNode, doc: &mut SidecarDocument) {
        // Generic typed ids first; they win over the legacy dedicated tags.
        for node in root.find_all("uniqueid") {
            let Some(value) = get_text(Some(node)) else {
                continue;
            };
            let provider = node.attr("type").unwrap_or("unknown").to_string();
            if doc.external_id(&provider).is_some() {
                continue;
            }
            let is_default = node
                .attr("default")
                .is_some_and(|v| v.eq_ignore_ascii_case("true"));
            doc.external_ids.push(ExternalId {
                provider,
                value,
                is_default,
            });
        }

        let imdb = get_text(root.find("imdbid")).or_else(|| get_text(root.find("id")));
        if let Some(value) = imdb
            && value.starts_with("tt")
            && doc.external_id("imdb").is_none()
        {
            doc.external_ids.push(ExternalId {
                provider: "imdb".to_string(),
                value,
                is_default: true,
            });
        }
        if let Some(value) = get_text(root.find("tmdbid"))
            && doc.external_id("tmdb").is_none()
        {
            doc.external_ids.push(ExternalId {
                provider: "tmdb".to_string(),
                value,
                is_default: false,
            });
        }
        if let Some(value) = get_text(root.find("tvdbid"))
            && doc.external_id("tvdb").is_none()
        {
            doc.external_ids.push(ExternalId {
                provider: "tvdb".to_string(),
                value,
                is_default: false,
            });
        }
    }

    /// Only the first `<video>` and first `<audio>` stream count.
    fn map_stream_details(fileinfo: &XmlNode) -> StreamDetails {
        let mut stream = StreamDetails::default();

        let Some(details) = fileinfo.find("streamdetails") else {
            return stream;
        };

        if let Some(video) = details.find("video") {
            stream.video_codec = get_text(video.find("codec"));
            stream.video_width = get_int(video.find("width"));
            stream.video_height = get_int(video.find("height"));
            stream.aspect_ratio = get_text(video.find("aspect"));
            stream.video_bitrate = get_int(video.find("bitrate"));
            stream.framerate =
                get_float(video.find("framerate")).or_else(|| get_float(video.find("fps")));
            stream.hdr_format =
                get_text(video.find("hdrformat")).or_else(|| get_text(video.find("hdr")));
            stream.duration_ms = match get_int(video.find("durationinseconds")) {
                Some(seconds) => Some(seconds * 1000),
                None => get_int(video.find("duration")),
            };
        }

        if let Some(audio) = details.find("audio") {
            stream.audio_codec = get_text(audio.find("codec"));
            stream.audio_channels = get_int(audio.find("channels"));
            stream.audio_language = get_text(audio.find("language"));
        }

        stream
    }

    /// Pattern fallback for sidecars the structural parse cannot read at
    /// all. Extracts title/year/plot/rating only; everything else stays
    /// absent.
    fn parse_fallback(text: &str) -> SidecarDocument {
        let mut doc = SidecarDocument::default();
        let meta = &mut doc.metadata;

        meta.title = FALLBACK_TITLE
            .captures(text)
            .map(|c| c[1].trim().to_string());
        meta.year = FALLBACK_YEAR
            .captures(text)
            .and_then(|c| c[1].parse().ok());
        meta.plot = FALLBACK_PLOT
            .captures(text)
            .map(|c| c[1].trim().to_string());
        meta.rating = FALLBACK_RATING
            .captures(text)
            .and_then(|c| c[1].parse().ok());

        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> SidecarDocument {
        NfoParser::new().parse(input.as_bytes())
    }

    #[test]
    fn parses_scalar_fields() {
        let doc = parse(
            r#"<movie>
                <title>Heat</title>
                <originaltitle>Heat</originaltitle>
                <year>1995</year>
                <runtime>170</runtime>
                <rating>8.3</rating>
                <votes>700000</votes>
                <mpaa>R</mpaa>
                <plot>A crew of thieves.</plot>
                <playcount>2</playcount>
            </movie>"#,
        );

        assert_eq!(doc.metadata.title.as_deref(), Some("Heat"));
        assert_eq!(doc.metadata.year, Some(1995));
        assert_eq!(doc.metadata.runtime, Some(170));
        assert_eq!(doc.metadata.rating, Some(8.3));
        assert_eq!(doc.metadata.votes, Some(700000));
        assert_eq!(doc.metadata.playcount, Some(2));
        assert!(!doc.checksum.is_empty());
    }

    #[test]
    fn first_occurrence_wins_for_scalars() {
        let doc = parse("<movie><title>First</title><title>Second</title></movie>");
        assert_eq!(doc.metadata.title.as_deref(), Some("First"));
    }

    #[test]
    fn runtime_tolerates_decimal_rendering() {
        let doc = parse("<movie><runtime>120.0</runtime></movie>");
        assert_eq!(doc.metadata.runtime, Some(120));
    }

    #[test]
    fn multi_value_fields_keep_document_order() {
        let doc = parse(
            "<movie><genre>Crime</genre><genre>Drama</genre><genre>Thriller</genre></movie>",
        );
        assert_eq!(doc.genres, ["Crime", "Drama", "Thriller"]);
    }

    #[test]
    fn writers_merge_credits_and_writer_tags() {
        let doc = parse(
            "<movie><credits>Michael Mann</credits><writer>Michael Mann</writer><writer>Someone Else</writer></movie>",
        );
        assert_eq!(doc.writers, ["Michael Mann", "Someone Else"]);
    }

    #[test]
    fn actors_use_document_order_unless_explicit() {
        let doc = parse(
            r#"<movie>
                <actor><name>Al Pacino</name><role>Vincent</role></actor>
                <actor><name>Robert De Niro</name><role>Neil</role><order>9</order></actor>
                <actor></actor>
            </movie>"#,
        );

        assert_eq!(doc.actors.len(), 3);
        assert_eq!(doc.actors[0].name, "Al Pacino");
        assert_eq!(doc.actors[0].order, 0);
        assert_eq!(doc.actors[1].order, 9);
        assert_eq!(doc.actors[2].name, "Unknown");
        assert_eq!(doc.actors[2].order, 2);
    }

    #[test]
    fn collection_block_and_legacy_number() {
        let doc = parse(
            "<movie><set><name>Heat Collection</name><index>1</index></set></movie>",
        );
        assert_eq!(doc.metadata.set_name.as_deref(), Some("Heat Collection"));
        assert_eq!(doc.metadata.set_order, Some(1));

        let doc = parse("<movie><set>Plain Set</set><collectionnumber>3</collectionnumber></movie>");
        assert_eq!(doc.metadata.set_name.as_deref(), Some("Plain Set"));
        assert_eq!(doc.metadata.set_order, Some(3));
    }

    #[test]
    fn generic_uniqueid_beats_legacy_tags() {
        let doc = parse(
            r#"<movie>
                <uniqueid type="imdb" default="true">tt0113277</uniqueid>
                <imdbid>tt9999999</imdbid>
                <tmdbid>949</tmdbid>
            </movie>"#,
        );

        let imdb = doc.external_id("imdb").unwrap();
        assert_eq!(imdb.value, "tt0113277");
        assert!(imdb.is_default);
        assert_eq!(doc.external_id("tmdb").unwrap().value, "949");
    }

    #[test]
    fn legacy_id_requires_tt_prefix() {
        let doc = parse("<movie><id>12345</id></movie>");
        assert!(doc.external_id("imdb").is_none());
    }

    #[test]
    fn stream_details_take_first_streams_only() {
        let doc = parse(
            r#"<movie><fileinfo><streamdetails>
                <video>
                    <codec>hevc</codec><width>3840</width><height>2160</height>
                    <fps>23.976</fps><hdr>HDR10</hdr>
                    <durationinseconds>10200</durationinseconds>
                </video>
                <video><codec>h264</codec></video>
                <audio><codec>truehd</codec><channels>8</channels><language>eng</language></audio>
                <audio><codec>ac3</codec></audio>
            </streamdetails></fileinfo></movie>"#,
        );

        let stream = doc.stream.unwrap();
        assert_eq!(stream.video_codec.as_deref(), Some("hevc"));
        assert_eq!(stream.framerate, Some(23.976));
        assert_eq!(stream.hdr_format.as_deref(), Some("HDR10"));
        assert_eq!(stream.duration_ms, Some(10_200_000));
        assert_eq!(stream.audio_codec.as_deref(), Some("truehd"));
        assert_eq!(stream.audio_channels, Some(8));
    }

    #[test]
    fn duration_falls_back_to_milliseconds_field() {
        let doc = parse(
            "<movie><fileinfo><streamdetails><video><duration>5000</duration></video></streamdetails></fileinfo></movie>",
        );
        assert_eq!(doc.stream.unwrap().duration_ms, Some(5000));
    }

    #[test]
    fn repeated_custom_tags_keep_every_value() {
        let doc = parse(
            "<movie><mood>tense</mood><mood>gritty</mood><source>bluray</source></movie>",
        );

        let mood = doc
            .custom_attributes
            .iter()
            .find(|a| a.name == "mood")
            .unwrap();
        assert_eq!(mood.values, ["tense", "gritty"]);
        assert_eq!(
            doc.custom_attributes
                .iter()
                .find(|a| a.name == "source")
                .unwrap()
                .values,
            ["bluray"]
        );
    }

    #[test]
    fn recognized_tags_never_become_custom_attributes() {
        let doc = parse("<movie><title>X</title><fileinfo></fileinfo><season>2</season></movie>");
        assert!(doc.custom_attributes.is_empty());
    }

    #[test]
    fn unescaped_ampersand_still_yields_title_and_year() {
        let doc = parse(
            "<movie><title>Fast & Loose</title><year>1986</year><plot>Cops & robbers, at speed.</plot></movie>",
        );

        assert!(doc.metadata.title.is_some());
        assert_eq!(doc.metadata.year, Some(1986));
    }

    #[test]
    fn truncated_document_keeps_parsed_prefix() {
        let doc = parse("<movie><title>Heat</title><year>1995</year><plot>A crew of thi");
        assert_eq!(doc.metadata.title.as_deref(), Some("Heat"));
        assert_eq!(doc.metadata.year, Some(1995));
    }

    #[test]
    fn unparseable_junk_still_yields_core_fields() {
        let doc = parse("<<<>>> <title>Heat</title> <year>1995</year> <rating>8.3</rating> >>>");
        assert_eq!(doc.metadata.title.as_deref(), Some("Heat"));
        assert_eq!(doc.metadata.year, Some(1995));
        assert_eq!(doc.metadata.rating, Some(8.3));
        // Degraded recovery never invents multi-value data.
        assert!(doc.genres.is_empty());
    }

    #[test]
    fn bare_single_fragment_falls_back_to_patterns() {
        // One element and no wrapper: the tree has nothing below it, so
        // the pattern fallback supplies the field.
        let doc = parse("<title>Heat</title>");
        assert_eq!(doc.metadata.title.as_deref(), Some("Heat"));
    }

    #[test]
    fn checksum_is_stable_across_parses() {
        let bytes = b"<movie><title>Heat</title></movie>";
        let parser = NfoParser::new();
        assert_eq!(parser.parse(bytes).checksum, parser.parse(bytes).checksum);
        assert_ne!(
            parser.parse(bytes).checksum,
            parser.parse(b"<movie><title>Heat!</title></movie>").checksum
        );
    }
}
