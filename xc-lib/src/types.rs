use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A search filter understood by the XC search endpoint.
///
/// Variants are listed in the order their parameters are sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SearchField {
    /// Free-text search terms
    Query,
    Genus,
    Recordist,
    Country,
    Location,
    Remarks,
    Latitude,
    Longitude,
    /// Bounding box, "LAT_MIN,LON_MIN,LAT_MAX,LON_MAX"
    BoundingBox,
    /// Background species
    Also,
    /// Sound type (e.g. "song", "call")
    SoundType,
    /// Catalogue number
    Number,
    License,
    /// Quality rating (A-E)
    Quality,
    Area,
    /// Recordings uploaded since this many days ago, or a YYYY-MM-DD date
    Since,
    Year,
    Month,
}

impl SearchField {
    pub const ALL: [SearchField; 18] = [
        SearchField::Query,
        SearchField::Genus,
        SearchField::Recordist,
        SearchField::Country,
        SearchField::Location,
        SearchField::Remarks,
        SearchField::Latitude,
        SearchField::Longitude,
        SearchField::BoundingBox,
        SearchField::Also,
        SearchField::SoundType,
        SearchField::Number,
        SearchField::License,
        SearchField::Quality,
        SearchField::Area,
        SearchField::Since,
        SearchField::Year,
        SearchField::Month,
    ];

    /// Short parameter name expected by the API.
    pub fn key(self) -> &'static str {
        match self {
            SearchField::Query => "query",
            SearchField::Genus => "gen",
            SearchField::Recordist => "rec",
            SearchField::Country => "cnt",
            SearchField::Location => "loc",
            SearchField::Remarks => "rmk",
            SearchField::Latitude => "lat",
            SearchField::Longitude => "lon",
            SearchField::BoundingBox => "box",
            SearchField::Also => "also",
            SearchField::SoundType => "type",
            SearchField::Number => "nr",
            SearchField::License => "lic",
            SearchField::Quality => "q",
            SearchField::Area => "area",
            SearchField::Since => "since",
            SearchField::Year => "year",
            SearchField::Month => "month",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Structured search criteria. Each field is either set or absent; absent
/// fields are never sent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    values: [Option<String>; SearchField::ALL.len()],
    page: Option<u32>,
}

impl SearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Criteria with only the free-text query set.
    pub fn query(terms: impl Into<String>) -> Self {
        Self::new().with(SearchField::Query, terms)
    }

    pub fn with(mut self, field: SearchField, value: impl Into<String>) -> Self {
        self.set(field, Some(value.into()));
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Set or clear a field. Blank strings clear it.
    pub fn set(&mut self, field: SearchField, value: Option<String>) {
        self.values[field.index()] = value.filter(|v| !v.trim().is_empty());
    }

    pub fn set_page(&mut self, page: Option<u32>) {
        self.page = page;
    }

    pub fn get(&self, field: SearchField) -> Option<&str> {
        self.values[field.index()].as_deref()
    }

    pub fn page(&self) -> Option<u32> {
        self.page
    }

    /// Request parameters for the present fields, in `SearchField` order,
    /// followed by `page` when set.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params: Vec<(&'static str, String)> = SearchField::ALL
            .iter()
            .filter_map(|&field| self.get(field).map(|v| (field.key(), v.to_string())))
            .collect();
        if let Some(page) = self.page {
            params.push(("page", page.to_string()));
        }
        params
    }
}

impl From<&str> for SearchCriteria {
    fn from(terms: &str) -> Self {
        SearchCriteria::query(terms)
    }
}

impl From<String> for SearchCriteria {
    fn from(terms: String) -> Self {
        SearchCriteria::query(terms)
    }
}

/// A single recording's metadata, passed through exactly as the API sent it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordingRecord(Map<String, Value>);

impl RecordingRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Catalogue id, whether the API sent it as a string or a number.
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Remote audio file reference (usually protocol-relative).
    pub fn file(&self) -> Option<&str> {
        self.0
            .get("file")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One page of search results from the API.
#[derive(Clone, Debug, Default, Serialize)]
pub struct QueryResult {
    pub num_recordings: u32,
    pub num_species: u32,
    pub num_pages: u32,
    pub page: u32,
    pub recordings: Vec<RecordingRecord>,
}

/// Files written by a completed download.
#[derive(Clone, Debug, Default)]
pub struct DownloadSummary {
    pub audio_files: Vec<PathBuf>,
    pub metadata_file: PathBuf,
}
