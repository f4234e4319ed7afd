use std::io::Read;
use std::path::Path;
use std::time::Instant;

use flate2::read::MultiGzDecoder;
use itertools::iproduct;
use reqwest::{
    header::{ACCEPT, CONTENT_ENCODING, USER_AGENT},
    Client,
};
use serde_json::Value;
use thiserror::Error;
use url::Url;

pub mod config;
pub mod endpoint;
pub mod snapshot;

pub use config::SocConfig;
use snapshot::{SnapshotError, SnapshotRequest};

/// Response headers in the order the server sent them.
///
/// Names are lowercase (`content-type`), not the server's original casing.
pub type Headers = serde_json::Map<String, Value>;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("could not gunzip response body: {0}")]
    Decompress(#[from] std::io::Error),
    #[error("response body is not utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("response body is not json: {0}")]
    Json(#[from] serde_json::Error),
}

/// One decoded API response, kept byte-exact for storage.
#[derive(Debug)]
pub struct FetchResult {
    pub payload: Value,
    pub raw_bytes: Vec<u8>,
    pub url: String,
    pub status: u16,
    pub duration_ms: u64,
    pub headers: Headers,
}

/// Client for the Schedule of Classes API.
pub struct Soc {
    client: Client,
    config: SocConfig,
}

impl Soc {
    pub fn new(config: SocConfig) -> Result<Self, FetchError> {
        // no gzip feature on reqwest: compression is never negotiated,
        // but a server may still send it and we handle that in `fetch`
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &SocConfig {
        &self.config
    }

    pub async fn fetch(
        &self,
        endpoint: &str,
        year: i32,
        term: i32,
        campus: &str,
    ) -> Result<FetchResult, FetchError> {
        let url = Url::parse_with_params(
            &self.config.endpoint_url(endpoint),
            &[
                ("year", year.to_string()),
                ("term", term.to_string()),
                ("campus", campus.to_owned()),
            ],
        )?;
        log::debug!("GET {url}");

        let start = Instant::now();
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, &self.config.user_agent)
            .send()
            .await?
            .error_for_status()?;

        let status = response.status().as_u16();
        let gzipped = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|encoding| encoding.trim().eq_ignore_ascii_case("gzip"));

        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers.insert(name.as_str().to_owned(), Value::String(value));
        }

        let body = response.bytes().await?;
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let raw_bytes = if gzipped {
            let mut decompressed = Vec::new();
            MultiGzDecoder::new(&body[..]).read_to_end(&mut decompressed)?;
            log::debug!("gunzipped {} -> {} bytes", body.len(), decompressed.len());
            decompressed
        } else {
            body.to_vec()
        };

        let payload = serde_json::from_str(std::str::from_utf8(&raw_bytes)?)?;

        log::info!(
            "{endpoint} {campus}: HTTP {status}, {} bytes in {duration_ms} ms",
            raw_bytes.len()
        );

        Ok(FetchResult {
            payload,
            raw_bytes,
            url: url.into(),
            status,
            duration_ms,
            headers,
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("No campuses provided.")]
    NoCampuses,
    #[error("No endpoints provided.")]
    NoEndpoints,
}

/// Campuses and endpoints to snapshot, already normalized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plan {
    pub campuses: Vec<String>,
    pub endpoints: Vec<String>,
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|item| !item.is_empty())
}

impl Plan {
    /// Parses comma separated lists; campus codes are upper-cased.
    pub fn from_lists(campuses: &str, endpoints: &str) -> Result<Self, PlanError> {
        let campuses = split_list(campuses)
            .map(str::to_uppercase)
            .collect::<Vec<_>>();
        let endpoints = split_list(endpoints)
            .map(str::to_owned)
            .collect::<Vec<_>>();

        if campuses.is_empty() {
            return Err(PlanError::NoCampuses);
        }
        if endpoints.is_empty() {
            return Err(PlanError::NoEndpoints);
        }

        Ok(Self {
            campuses,
            endpoints,
        })
    }

    /// Every (campus, endpoint) pair, campus-major.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        iproduct!(&self.campuses, &self.endpoints)
            .map(|(campus, endpoint)| (campus.as_str(), endpoint.as_str()))
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Failed {endpoint} {campus}: {source}")]
    Fetch {
        endpoint: String,
        campus: String,
        source: FetchError,
    },
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Fetches and stores every pair of `plan` in order, stopping at the first failure.
pub async fn snapshot_all(
    soc: &Soc,
    plan: &Plan,
    year: i32,
    term: i32,
    out_dir: &Path,
) -> Result<(), RunError> {
    std::fs::create_dir_all(out_dir).map_err(|source| SnapshotError::Io {
        path: out_dir.to_owned(),
        source,
    })?;

    for (campus, endpoint) in plan.pairs() {
        let fetched = soc
            .fetch(endpoint, year, term, campus)
            .await
            .map_err(|source| RunError::Fetch {
                endpoint: endpoint.to_owned(),
                campus: campus.to_owned(),
                source,
            })?;

        snapshot::write_snapshot(&SnapshotRequest {
            out_dir,
            endpoint,
            campus,
            year,
            term,
            fetched: &fetched,
        })?;
    }

    Ok(())
}
