//! CSV exports, fetched over HTTP or read from disk.

use crate::error::{Result, SourceError};
use crate::http::{build_client, ensure_success};
use crate::record::{FieldValue, SourceRecord};
use crate::source::RecordSource;
use reqwest::Client;
use std::path::PathBuf;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub enum CsvLocation {
    Remote(Url),
    Local(PathBuf),
}

impl std::fmt::Display for CsvLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CsvLocation::Remote(url) => write!(f, "{}", url),
            CsvLocation::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CsvSource {
    client: Client,
    location: CsvLocation,
}

impl CsvSource {
    pub fn new(location: CsvLocation) -> Result<Self> {
        Self::with_timeout(location, 30)
    }

    pub fn with_timeout(location: CsvLocation, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            location,
        })
    }

    pub fn location(&self) -> &CsvLocation {
        &self.location
    }

    async fn fetch_text(&self) -> Result<String> {
        match &self.location {
            CsvLocation::Remote(url) => {
                let response = self.client.get(url.clone()).send().await?;
                Ok(ensure_success(response)?.text().await?)
            }
            CsvLocation::Local(path) => Ok(tokio::fs::read_to_string(path).await?),
        }
    }
}

impl RecordSource for CsvSource {
    async fn fetch_records(&self) -> Result<Vec<SourceRecord>> {
        info!("Fetching CSV export from {}", self.location);
        let text = self.fetch_text().await?;
        let records = parse_csv(&text)?;
        info!("Parsed {} rows", records.len());
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("csv {}", self.location)
    }
}

/// Parse CSV text into records keyed by header.
///
/// Empty cells are left out so that they read as absent fields. An `id`
/// column, when present and filled, supplies the record id; otherwise rows
/// are numbered `row-1`, `row-2`, ... in file order.
pub fn parse_csv(text: &str) -> Result<Vec<SourceRecord>> {
    let mut reader = ::csv::ReaderBuilder::new()
        .trim(::csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(SourceError::ParseError("CSV export has no header row".to_string()));
    }
    let id_column = headers.iter().position(|h| h.eq_ignore_ascii_case("id"));

    let mut records = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row?;
        let id = id_column
            .and_then(|col| row.get(col))
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("row-{}", idx + 1));

        let mut record = SourceRecord::new(id);
        for (header, value) in headers.iter().zip(row.iter()) {
            if header.is_empty() || value.is_empty() {
                continue;
            }
            record
                .fields
                .insert(header.to_string(), FieldValue::Text(value.to_string()));
        }

        if record.fields.is_empty() {
            debug!("Skipping blank CSV row {}", idx + 1);
            continue;
        }
        records.push(record);
    }

    Ok(records)
}
