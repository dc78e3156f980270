use serde::{Deserialize, Serialize};

/// Scalar fields recognized in a sidecar file.
///
/// Every field is optional: absent fields are skipped when persisting so
/// they never overwrite previously stored values. For repeated tags the
/// first occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SidecarMetadata {
    pub title: Option<String>,
    pub original_title: Option<String>,
    pub sort_title: Option<String>,

    pub year: Option<i64>,
    pub premiered: Option<String>,
    pub release_date: Option<String>,
    pub date_added: Option<String>,

    /// Runtime in minutes.
    pub runtime: Option<i64>,
    pub plot: Option<String>,
    pub tagline: Option<String>,
    pub outline: Option<String>,

    pub rating: Option<f64>,
    pub votes: Option<i64>,
    pub mpaa: Option<String>,
    pub certification: Option<String>,

    pub set_name: Option<String>,
    pub set_order: Option<i64>,

    pub poster_path: Option<String>,
    pub fanart_path: Option<String>,
    pub thumb_path: Option<String>,
    pub trailer_url: Option<String>,

    pub playcount: Option<i64>,
    pub last_played: Option<String>,
}

/// Cast member with ordering. `order` is the explicit `<order>` child when
/// present, otherwise the element's position in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    pub role: Option<String>,
    pub thumb: Option<String>,
    pub order: i64,
}

/// External provider identifier, deduplicated by provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalId {
    pub provider: String,
    pub value: String,
    pub is_default: bool,
}

/// Technical details of the first video and first audio stream described
/// by a sidecar's `<fileinfo>` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamDetails {
    pub video_codec: Option<String>,
    pub video_width: Option<i64>,
    pub video_height: Option<i64>,
    pub aspect_ratio: Option<String>,
    pub video_bitrate: Option<i64>,
    pub framerate: Option<f64>,
    pub hdr_format: Option<String>,
    pub audio_codec: Option<String>,
    pub audio_channels: Option<i64>,
    pub audio_language: Option<String>,
    pub duration_ms: Option<i64>,
}

impl StreamDetails {
    /// True when no stream field was present at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A sidecar tag outside the recognized registry, preserved verbatim.
/// Repeated occurrences of the same tag append to `values`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomAttribute {
    /// Lower-cased tag name.
    pub name: String,
    pub values: Vec<String>,
}

/// Everything extracted from one sidecar file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SidecarDocument {
    /// Hex digest of the raw sidecar bytes. This, not a semantic diff, is
    /// the basis for "changed since last parse".
    pub checksum: String,

    pub metadata: SidecarMetadata,

    // Multi-value fields, in document order.
    pub genres: Vec<String>,
    pub tags: Vec<String>,
    pub countries: Vec<String>,
    pub studios: Vec<String>,
    pub directors: Vec<String>,
    /// Collected from both `<credits>` and `<writer>`, deduplicated by
    /// exact text.
    pub writers: Vec<String>,
    pub actors: Vec<Actor>,

    pub external_ids: Vec<ExternalId>,
    pub stream: Option<StreamDetails>,
    pub custom_attributes: Vec<CustomAttribute>,
}

impl SidecarDocument {
    /// Append a custom attribute value, creating the attribute on first
    /// sight of the tag name.
    pub fn push_custom(&mut self, name: &str, value: String) {
        if let Some(attr) = self
            .custom_attributes
            .iter_mut()
            .find(|a| a.name == name)
        {
            attr.values.push(value);
        } else {
            self.custom_attributes.push(CustomAttribute {
                name: name.to_string(),
                values: vec![value],
            });
        }
    }

    /// Look up an external id by provider.
    pub fn external_id(&self, provider: &str) -> Option<&ExternalId> {
        self.external_ids.iter().find(|e| e.provider == provider)
    }
}
