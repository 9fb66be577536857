//! The harvester's JSON artifact: document models and the sources that
//! load it.
//!
//! Only top-level input that is not JSON at all is an error. Every
//! structural deviation below that (missing keys, wrong types, non-object
//! records) degrades to missing data.

use super::{EventSource, Harvest};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A single raw record from the harvester: an open string-keyed object
/// with no guaranteed shape.
pub type RawEvent = Map<String, Value>;

/// The harvester's metadata block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HarvestMeta {
    /// When the harvest ran, RFC 3339.
    pub ts_utc: Option<String>,
    /// Query terms the harvester searched for.
    pub keywords: Vec<String>,
    /// Geographic scope of the harvest, if any.
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub within_miles: Option<u32>,
    /// How far into the future the harvest looked.
    pub window_days: Option<u32>,
    /// Labels of the feed sources that were consulted.
    pub sources: Vec<String>,
    /// Number of records the harvester wrote.
    pub count: Option<u64>,
    /// Free-text diagnostics, shown when the listing is empty.
    pub notes: Vec<String>,
}

/// The top-level harvest document.
#[derive(Debug, Clone, Default)]
pub struct HarvestDocument {
    pub meta: HarvestMeta,
    pub events: Vec<RawEvent>,
}

impl HarvestDocument {
    /// Builds a document from an already-decoded JSON value. Shape
    /// deviations degrade to missing data; this never fails.
    pub fn from_value(value: Value) -> HarvestDocument {
        let Value::Object(mut root) = value else {
            return HarvestDocument::default();
        };

        let mut meta: HarvestMeta = root
            .remove("meta")
            .map(|value| serde_json::from_value(value).unwrap_or_default())
            .unwrap_or_default();

        // The harvester writes notes at the top level, the documented
        // interface has them in the meta block. Accept both.
        let top_notes = root.remove("notes").map(string_list).unwrap_or_default();
        if !top_notes.is_empty() {
            let meta_notes = std::mem::take(&mut meta.notes);
            meta.notes = top_notes.into_iter().chain(meta_notes).collect();
        }

        let events = match root.remove("events") {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(record) => Some(record),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        HarvestDocument { meta, events }
    }

    /// Decodes a document from raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<HarvestDocument, FeedError> {
        Ok(HarvestDocument::from_value(serde_json::from_slice(bytes)?))
    }

    /// Reads a document from a file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<HarvestDocument, FeedError> {
        let bytes = std::fs::read(path)?;
        HarvestDocument::from_slice(&bytes)
    }
}

fn string_list(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(entry) => Some(entry),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Error while making a http request.
    #[error("failure requesting harvest document: {0}")]
    Request(#[from] reqwest::Error),

    /// Error while parsing a harvest document as JSON.
    #[error("failed to parse harvest document as JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Error while reading a local harvest artifact.
    #[error("failed to read harvest artifact: {0}")]
    Io(#[from] std::io::Error),

    /// Error when the feed source is configured without candidate URLs.
    #[error("no feed URLs configured")]
    NoFeedUrls,

    /// Error when the artifact source is configured without a path.
    #[error("no artifact path configured")]
    MissingArtifactPath,

    /// Error when every candidate URL failed.
    #[error("all {attempts} feed URL candidates failed, last error: {last}")]
    Unavailable { attempts: usize, last: String },
}

/// Fetches the harvest document over HTTP from an ordered list of
/// candidate URLs. The first candidate that yields a decodable document
/// wins.
#[derive(Debug)]
pub struct HarvestFeedSource {
    client: reqwest::Client,
    urls: Vec<String>,
}

impl HarvestFeedSource {
    pub fn new<I, S>(urls: I) -> Result<HarvestFeedSource, FeedError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls: Vec<String> = urls.into_iter().map(Into::into).collect();
        if urls.is_empty() {
            return Err(FeedError::NoFeedUrls);
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("noticeboard/", env!("CARGO_PKG_VERSION"))),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(HarvestFeedSource { client, urls })
    }

    /// Tries each candidate URL in order and returns the first document
    /// that fetches and decodes.
    pub async fn fetch_document(&self) -> Result<HarvestDocument, FeedError> {
        let mut last = String::new();

        for url in &self.urls {
            match self.try_url(url).await {
                Ok(document) => {
                    log::debug!("fetched {} raw records from {url}", document.events.len());
                    return Ok(document);
                }
                Err(err) => {
                    log::warn!("harvest feed candidate {url} failed: {err}");
                    last = err.to_string();
                }
            }
        }

        Err(FeedError::Unavailable {
            attempts: self.urls.len(),
            last,
        })
    }

    async fn try_url(&self, url: &str) -> Result<HarvestDocument, FeedError> {
        let value = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        Ok(HarvestDocument::from_value(value))
    }
}

#[async_trait]
impl EventSource for HarvestFeedSource {
    async fn fetch_events(&self) -> crate::Result<Harvest> {
        let document = self.fetch_document().await?;
        Ok(Harvest::from_document(document))
    }
}

/// Reads the harvester's JSON artifact from a local path on every fetch,
/// picking up rewrites by the scheduled harvester job.
#[derive(Debug)]
pub struct ArtifactFileSource {
    path: PathBuf,
}

impl ArtifactFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> ArtifactFileSource {
        ArtifactFileSource { path: path.into() }
    }
}

#[async_trait]
impl EventSource for ArtifactFileSource {
    async fn fetch_events(&self) -> crate::Result<Harvest> {
        let document = HarvestDocument::from_path(&self.path)?;
        Ok(Harvest::from_document(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn meta_block_parses_from_harvester_output() {
        let document = HarvestDocument::from_value(json!({
            "meta": {
                "ts_utc": "2031-04-30T12:00:00+00:00",
                "keywords": ["steampunk", "tesla"],
                "city": "Richmond",
                "state": "VA",
                "country": null,
                "within_miles": 50,
                "window_days": 180,
                "sources": ["ics"],
                "count": 2,
            },
            "events": [{"title": "a"}, {"title": "b"}],
        }));

        assert_eq!(document.meta.ts_utc.as_deref(), Some("2031-04-30T12:00:00+00:00"));
        assert_eq!(document.meta.keywords, vec!["steampunk", "tesla"]);
        assert_eq!(document.meta.within_miles, Some(50));
        assert_eq!(document.meta.sources, vec!["ics"]);
        assert_eq!(document.meta.count, Some(2));
        assert_eq!(document.events.len(), 2);
    }

    #[test]
    fn malformed_shapes_degrade_to_empty() {
        assert!(HarvestDocument::from_value(json!({"events": 42}))
            .events
            .is_empty());
        assert!(HarvestDocument::from_value(json!({})).events.is_empty());
        assert!(HarvestDocument::from_value(json!([1, 2, 3]))
            .events
            .is_empty());
        assert!(HarvestDocument::from_value(json!("nope")).events.is_empty());
    }

    #[test]
    fn non_object_records_are_skipped() {
        let document = HarvestDocument::from_value(json!({
            "events": [1, "two", {"title": "kept"}, null],
        }));

        assert_eq!(document.events.len(), 1);
        assert_eq!(document.events[0]["title"], "kept");
    }

    #[test]
    fn notes_are_read_from_both_locations() {
        let document = HarvestDocument::from_value(json!({
            "meta": {"notes": ["meta note"]},
            "notes": ["top note"],
        }));

        assert_eq!(document.meta.notes, vec!["top note", "meta note"]);
    }

    #[test]
    fn feed_source_requires_urls() {
        assert!(matches!(
            HarvestFeedSource::new(Vec::<String>::new()),
            Err(FeedError::NoFeedUrls)
        ));
    }
}
