use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use flate2::{write::GzEncoder, Compression};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::endpoint::{self, PayloadSummary};
use crate::{FetchResult, Headers};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("{}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("could not serialize metadata: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SnapshotError + '_ {
    move |source| SnapshotError::Io {
        path: path.to_owned(),
        source,
    }
}

pub struct SnapshotRequest<'a> {
    pub out_dir: &'a Path,
    pub endpoint: &'a str,
    pub campus: &'a str,
    pub year: i32,
    pub term: i32,
    pub fetched: &'a FetchResult,
}

/// Sidecar record describing one stored payload.
#[derive(Debug, Serialize)]
pub struct SnapshotMetadata {
    pub fetched_at: String,
    pub year: i32,
    pub term: i32,
    pub campus: String,
    pub endpoint: String,
    pub url: String,
    pub status: u16,
    pub duration_ms: u64,
    pub headers: Headers,
    pub payload_bytes: usize,
    pub gz_file_size_bytes: u64,
    pub sha256: String,
    #[serde(flatten)]
    pub summary: Option<PayloadSummary>,
}

#[derive(Debug)]
pub struct SnapshotReport {
    pub gz_path: PathBuf,
    pub metadata_path: PathBuf,
    pub metadata: SnapshotMetadata,
}

/// Spring 2026 keeps its historical names; every other term is spelled out.
pub fn base_name(year: i32, term: i32, campus: &str, endpoint: &str) -> String {
    if year == 2026 && term == 1 {
        format!("spring-2026-{campus}-{endpoint}")
    } else {
        format!("{year}-term{term}-{campus}-{endpoint}")
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Writes `<base>.json.gz` and then `<base>.metadata.json`, overwriting both.
pub fn write_snapshot(request: &SnapshotRequest<'_>) -> Result<SnapshotReport, SnapshotError> {
    let fetched_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false);
    let base = base_name(
        request.year,
        request.term,
        request.campus,
        request.endpoint,
    );
    let gz_path = request.out_dir.join(format!("{base}.json.gz"));
    let metadata_path = request.out_dir.join(format!("{base}.metadata.json"));
    let payload = &request.fetched.raw_bytes;

    fs::create_dir_all(request.out_dir).map_err(io_error(request.out_dir))?;
    write_gzip(&gz_path, payload)?;

    let gz_file_size_bytes = fs::metadata(&gz_path).map_err(io_error(&gz_path))?.len();

    let metadata = SnapshotMetadata {
        fetched_at,
        year: request.year,
        term: request.term,
        campus: request.campus.to_owned(),
        endpoint: request.endpoint.to_owned(),
        url: request.fetched.url.clone(),
        status: request.fetched.status,
        duration_ms: request.fetched.duration_ms,
        headers: request.fetched.headers.clone(),
        payload_bytes: payload.len(),
        gz_file_size_bytes,
        sha256: sha256_hex(payload),
        summary: endpoint::summarize(request.endpoint, &request.fetched.payload),
    };

    let json = serde_json::to_vec_pretty(&metadata)?;
    fs::write(&metadata_path, json).map_err(io_error(&metadata_path))?;

    log::debug!(
        "wrote {} ({gz_file_size_bytes} bytes) and {}",
        gz_path.display(),
        metadata_path.display()
    );

    println!(
        "[OK] {} {} -> {} (payload={} bytes)",
        request.endpoint,
        request.campus,
        gz_path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default(),
        metadata.payload_bytes
    );

    Ok(SnapshotReport {
        gz_path,
        metadata_path,
        metadata,
    })
}

fn write_gzip(path: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    let file = File::create(path).map_err(io_error(path))?;
    let mut encoder = GzEncoder::new(file, Compression::best());
    encoder.write_all(bytes).map_err(io_error(path))?;
    encoder.finish().map_err(io_error(path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use anyhow::Result;
    use flate2::read::GzDecoder;
    use serde_json::Value;

    use super::*;

    fn fetched(raw: &str) -> FetchResult {
        let mut headers = Headers::new();
        headers.insert("content-type".into(), "application/json".into());
        headers.insert("x-server".into(), "soc".into());

        FetchResult {
            payload: serde_json::from_str(raw).unwrap(),
            raw_bytes: raw.as_bytes().to_vec(),
            url: "http://localhost/courses.json?year=2026&term=1&campus=NB".into(),
            status: 200,
            duration_ms: 42,
            headers,
        }
    }

    fn read_metadata(path: &Path) -> Result<Value> {
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    #[test]
    fn spring_2026_uses_the_short_name() {
        assert_eq!(base_name(2026, 1, "NB", "courses"), "spring-2026-NB-courses");
    }

    #[test]
    fn other_terms_spell_out_year_and_term() {
        assert_eq!(
            base_name(2026, 9, "NK", "openSections"),
            "2026-term9-NK-openSections"
        );
        assert_eq!(base_name(2025, 1, "CM", "courses"), "2025-term1-CM-courses");
    }

    #[test]
    fn writes_gzip_that_restores_the_exact_bytes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        // formatting and key order are the server's, not serde_json's
        let raw = "[ {\"sections\":[{},{}] ,\"title\":\"Café\"},{\"sections\":[]},{} ]";
        let fetched = fetched(raw);

        let report = write_snapshot(&SnapshotRequest {
            out_dir: dir.path(),
            endpoint: "courses",
            campus: "NB",
            year: 2026,
            term: 1,
            fetched: &fetched,
        })?;

        assert_eq!(report.gz_path, dir.path().join("spring-2026-NB-courses.json.gz"));
        let mut restored = Vec::new();
        GzDecoder::new(File::open(&report.gz_path)?).read_to_end(&mut restored)?;
        assert_eq!(restored, raw.as_bytes());
        Ok(())
    }

    #[test]
    fn metadata_describes_the_stored_payload() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let raw = r#"[{"sections":[{},{}]},{"sections":[]},{}]"#;
        let fetched = fetched(raw);

        let report = write_snapshot(&SnapshotRequest {
            out_dir: dir.path(),
            endpoint: "courses",
            campus: "NB",
            year: 2025,
            term: 9,
            fetched: &fetched,
        })?;

        assert_eq!(
            report.metadata_path,
            dir.path().join("2025-term9-NB-courses.metadata.json")
        );
        let metadata = read_metadata(&report.metadata_path)?;
        assert_eq!(metadata["year"], 2025);
        assert_eq!(metadata["term"], 9);
        assert_eq!(metadata["campus"], "NB");
        assert_eq!(metadata["endpoint"], "courses");
        assert_eq!(metadata["url"], fetched.url.as_str());
        assert_eq!(metadata["status"], 200);
        assert_eq!(metadata["duration_ms"], 42);
        assert_eq!(metadata["headers"]["x-server"], "soc");
        assert_eq!(metadata["payload_bytes"], raw.len());
        assert_eq!(
            metadata["gz_file_size_bytes"],
            fs::metadata(&report.gz_path)?.len()
        );
        assert_eq!(metadata["sha256"], sha256_hex(raw.as_bytes()));
        assert_eq!(metadata["courses_count"], 3);
        assert_eq!(metadata["sections_count"], 2);
        assert!(metadata.get("open_section_count").is_none());
        assert!(metadata["fetched_at"].as_str().unwrap().ends_with("+00:00"));
        Ok(())
    }

    #[test]
    fn metadata_keeps_field_order_and_non_ascii() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let fetched = fetched("[1,2,3]");

        let report = write_snapshot(&SnapshotRequest {
            out_dir: &dir.path().join("nested/raw"),
            endpoint: "openSections",
            campus: "Newark–NK",
            year: 2026,
            term: 1,
            fetched: &fetched,
        })?;

        let text = fs::read_to_string(&report.metadata_path)?;
        assert!(text.starts_with("{\n  \"fetched_at\""));
        assert!(text.contains("\"campus\": \"Newark–NK\""));
        assert!(text.find("\"sha256\"") < text.find("\"open_section_count\": 3"));
        assert_eq!(
            report.metadata.summary,
            Some(PayloadSummary::OpenSections {
                open_section_count: 3
            })
        );
        Ok(())
    }

    #[test]
    fn unknown_endpoint_gets_no_counts() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let fetched = fetched(r#"{"subjects":[]}"#);

        let report = write_snapshot(&SnapshotRequest {
            out_dir: dir.path(),
            endpoint: "subjects",
            campus: "CM",
            year: 2026,
            term: 1,
            fetched: &fetched,
        })?;

        let metadata = read_metadata(&report.metadata_path)?;
        let keys = metadata.as_object().unwrap().keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys.last().map(String::as_str), Some("sha256"));
        Ok(())
    }

    #[test]
    fn rewriting_overwrites_the_previous_pair() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let first = fetched("[1,2,3,4]");
        let second = fetched("[1]");

        for fetched in [&first, &second] {
            write_snapshot(&SnapshotRequest {
                out_dir: dir.path(),
                endpoint: "openSections",
                campus: "NB",
                year: 2026,
                term: 1,
                fetched,
            })?;
        }

        let metadata_path = dir.path().join("spring-2026-NB-openSections.metadata.json");
        assert_eq!(read_metadata(&metadata_path)?["open_section_count"], 1);
        assert_eq!(fs::read_dir(dir.path())?.count(), 2);
        Ok(())
    }

    #[test]
    fn unwritable_directory_is_an_io_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"")?;
        let fetched = fetched("[]");

        let result = write_snapshot(&SnapshotRequest {
            out_dir: &blocker.join("raw"),
            endpoint: "courses",
            campus: "NB",
            year: 2026,
            term: 1,
            fetched: &fetched,
        });

        assert!(matches!(result, Err(SnapshotError::Io { .. })));
        Ok(())
    }
}
