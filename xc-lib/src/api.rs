use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use crate::error::{Result, XcError};
use crate::store;
use crate::types::{DownloadSummary, QueryResult, RecordingRecord, SearchCriteria};

pub const API_BASE: &str = "https://www.xeno-canto.org/api/2/recordings";

/// Scheme prefixed to the protocol-relative `file` references. The archive
/// serves audio over plain http.
const AUDIO_SCHEME: &str = "http:";

/// The HTTP operations the client needs.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// GET `url` with query `params` and return the whole body.
    /// Non-success statuses are errors.
    async fn get_bytes(&self, url: &str, params: &[(&str, String)]) -> Result<Vec<u8>>;

    /// GET `url` and copy the body into `sink` chunk by chunk.
    /// Returns the number of bytes written. A failed write to `sink` is an
    /// `XcError::Filesystem` with an empty path; the caller knows the file.
    async fn get_to<W: Write>(&self, url: &str, sink: &mut W) -> Result<u64>;
}

/// [`Transport`] backed by a `reqwest::Client`. Redirects are followed.
#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(XcError::transport)?;
        Ok(Self { client })
    }

    async fn send(&self, url: &str, params: &[(&str, String)]) -> Result<reqwest::Response> {
        let resp = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| XcError::transport(format!("request to {url} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(XcError::status(status.as_u16(), status.canonical_reason()));
        }
        Ok(resp)
    }
}

impl Transport for HttpTransport {
    async fn get_bytes(&self, url: &str, params: &[(&str, String)]) -> Result<Vec<u8>> {
        let resp = self.send(url, params).await?;
        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| XcError::transport(format!("failed to read response body: {e}")))
    }

    async fn get_to<W: Write>(&self, url: &str, sink: &mut W) -> Result<u64> {
        let mut resp = self.send(url, &[]).await?;
        let mut written = 0u64;
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| XcError::transport(format!("download of {url} interrupted: {e}")))?
        {
            sink.write_all(&chunk)
                .map_err(|e| XcError::fs(PathBuf::new(), e))?;
            written += chunk.len() as u64;
        }
        Ok(written)
    }
}

/// Parse a count the API may send either as a number or a numeric string.
///
/// A missing or null count is `None`; anything else that is not a `u32` is
/// rejected rather than truncated.
fn parse_count(body: &Value, key: &str) -> Result<Option<u32>> {
    let invalid = |v: &Value| XcError::Decode(format!("'{key}' is not a valid count: {v}"));
    match body.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v @ Value::String(s)) => s.trim().parse::<u32>().map(Some).map_err(|_| invalid(v)),
        Some(v @ Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| invalid(v)),
        Some(other) => Err(invalid(other)),
    }
}

/// Like [`parse_count`], falling back to `default` with a warning when absent.
fn count_or(body: &Value, key: &str, default: u32) -> Result<u32> {
    Ok(parse_count(body, key)?.unwrap_or_else(|| {
        tracing::warn!("Search response has no '{key}'; assuming {default}");
        default
    }))
}

/// Parse a search response from the XC API.
pub fn parse_search_response(body: &[u8]) -> Result<QueryResult> {
    let body: Value = serde_json::from_slice(body)?;

    if let Some(err) = body.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Err(XcError::Api(message));
    }

    let recordings = body
        .get("recordings")
        .and_then(Value::as_array)
        .ok_or_else(|| XcError::Decode("response has no 'recordings' array".into()))?
        .iter()
        .enumerate()
        .map(|(i, rec)| match rec {
            Value::Object(fields) => Ok(RecordingRecord::new(fields.clone())),
            other => Err(XcError::Decode(format!(
                "recording {i} is not an object: {other}"
            ))),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(QueryResult {
        num_recordings: count_or(&body, "numRecordings", 0)?,
        num_species: count_or(&body, "numSpecies", 0)?,
        num_pages: count_or(&body, "numPages", 1)?,
        page: count_or(&body, "page", 1)?,
        recordings,
    })
}

/// Absolute download URL for a record's `file` reference.
pub fn audio_url(file_ref: &str) -> String {
    if file_ref.starts_with("//") {
        format!("{AUDIO_SCHEME}{file_ref}")
    } else {
        file_ref.to_string()
    }
}

/// Parse an XC number from various input formats:
/// "928094", "XC928094", "xc928094", "https://xeno-canto.org/928094"
pub fn parse_xc_number(input: &str) -> Result<u64> {
    let s = input.trim();

    if let Ok(n) = s.parse::<u64>() {
        return Ok(n);
    }

    if let Some(rest) = s.strip_prefix("XC").or_else(|| s.strip_prefix("xc")) {
        return rest
            .parse::<u64>()
            .map_err(|_| XcError::DataShape(format!("invalid XC number: {s}")));
    }

    if s.contains("xeno-canto.org/") {
        if let Some(last) = s.trim_end_matches('/').rsplit('/').next() {
            if let Ok(n) = last.parse::<u64>() {
                return Ok(n);
            }
        }
    }

    Err(XcError::DataShape(format!("can't parse XC number from: {s}")))
}

/// A planned download: where to fetch from and where to write.
struct Download {
    id: String,
    url: String,
    path: PathBuf,
}

/// Check every record up front so a malformed one aborts before any transfer.
fn plan_downloads(dir: &Path, records: &[RecordingRecord]) -> Result<Vec<Download>> {
    let mut seen = HashSet::new();
    records
        .iter()
        .enumerate()
        .map(|(i, rec)| {
            let id = rec
                .id()
                .ok_or_else(|| XcError::DataShape(format!("recording {i} has no id")))?;
            let file = rec.file().ok_or_else(|| {
                XcError::DataShape(format!("recording {id} has no file reference"))
            })?;
            let path = store::audio_path(dir, &id);
            if !seen.insert(path.clone()) {
                return Err(XcError::DataShape(format!(
                    "recording {id} would overwrite {}",
                    path.display()
                )));
            }
            Ok(Download {
                url: audio_url(file),
                path,
                id,
            })
        })
        .collect()
}

/// Client for the xeno-canto search API.
#[derive(Clone, Debug)]
pub struct XenoCanto<T = HttpTransport> {
    transport: T,
    endpoint: String,
}

impl XenoCanto<HttpTransport> {
    pub fn new() -> Self {
        Self::with_transport(HttpTransport::new())
    }
}

impl Default for XenoCanto<HttpTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> XenoCanto<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            endpoint: API_BASE.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run one search and return the page of results.
    ///
    /// A search that matches nothing is a valid, empty result.
    pub async fn query(&self, criteria: &SearchCriteria) -> Result<QueryResult> {
        let params = criteria.params();
        tracing::debug!(endpoint = %self.endpoint, ?params, "Querying xeno-canto");

        let body = self.transport.get_bytes(&self.endpoint, &params).await?;
        let result = parse_search_response(&body)?;

        tracing::info!(
            "Found {} recordings with {} species over {} pages.",
            result.num_recordings,
            result.num_species,
            result.num_pages
        );
        Ok(result)
    }

    /// Search, download every matching recording into `dir` as `<id>.mp3`,
    /// then write `metadata.csv` describing them.
    ///
    /// Stops at the first failure. Files completed before it are left in place.
    pub async fn download_files(
        &self,
        criteria: &SearchCriteria,
        dir: impl AsRef<Path>,
    ) -> Result<DownloadSummary> {
        let dir = store::ensure_dir(dir.as_ref())?;

        let result = self.query(criteria).await?;
        if result.recordings.is_empty() {
            return Err(XcError::DataShape("search returned no recordings".into()));
        }

        let downloads = plan_downloads(&dir, &result.recordings)?;
        let mut audio_files = Vec::with_capacity(downloads.len());
        for dl in downloads {
            let bytes = self.fetch_audio(&dl).await?;
            tracing::info!("Downloaded {} ({bytes} bytes)", dl.path.display());
            audio_files.push(dl.path);
        }

        let metadata_file = store::write_metadata(&dir, &result.recordings)?;
        Ok(DownloadSummary {
            audio_files,
            metadata_file,
        })
    }

    async fn fetch_audio(&self, dl: &Download) -> Result<u64> {
        tracing::debug!(id = %dl.id, url = %dl.url, "Fetching audio");
        let file = File::create(&dl.path).map_err(|e| XcError::fs(&dl.path, e))?;
        let mut sink = BufWriter::new(file);

        let outcome = match self.transport.get_to(&dl.url, &mut sink).await {
            Ok(n) => sink.flush().map(|_| n).map_err(|e| XcError::fs(&dl.path, e)),
            Err(XcError::Filesystem { source, .. }) => Err(XcError::fs(&dl.path, source)),
            Err(e) => Err(e),
        };
        drop(sink);

        if outcome.is_err() {
            // Don't leave a truncated mp3 behind.
            if let Err(e) = std::fs::remove_file(&dl.path) {
                tracing::warn!("Failed to remove partial file {}: {e}", dl.path.display());
            }
        }
        outcome
    }
}
