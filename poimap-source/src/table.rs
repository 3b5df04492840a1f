//! Client for Airtable-style table APIs.
//!
//! Records are listed page by page following the `offset` continuation
//! token; single records can be partially updated with `PATCH`.

use crate::error::{Result, SourceError};
use crate::http::{build_client, ensure_success};
use crate::record::{Coordinates, SourceRecord};
use crate::source::{CoordinateStore, RecordSource};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://api.airtable.com/v0/";

/// Connection settings for one table.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Root of the REST API, e.g. `https://api.airtable.com/v0/`.
    pub api_base: Url,
    pub base_id: String,
    pub table: String,
    /// Optional named view; rows come back in the view's order.
    pub view: Option<String>,
    /// Bearer token.
    pub token: String,
    pub page_size: Option<u32>,
    /// Hard stop for runaway continuation tokens.
    pub max_pages: usize,
    /// Field names written by coordinate write-back.
    pub latitude_field: String,
    pub longitude_field: String,
    pub timeout_secs: u64,
}

impl TableConfig {
    pub fn new(base_id: impl Into<String>, table: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let api_base = Url::parse(DEFAULT_API_BASE)
            .map_err(|e| SourceError::InvalidUrl(format!("{}: {}", DEFAULT_API_BASE, e)))?;
        Ok(Self {
            api_base,
            base_id: base_id.into(),
            table: table.into(),
            view: None,
            token: token.into(),
            page_size: None,
            max_pages: 100,
            latitude_field: "Latitude".to_string(),
            longitude_field: "Longitude".to_string(),
            timeout_secs: 30,
        })
    }

    pub fn with_api_base(mut self, api_base: Url) -> Self {
        self.api_base = api_base;
        self
    }

    pub fn with_view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_coordinate_fields(
        mut self,
        latitude_field: impl Into<String>,
        longitude_field: impl Into<String>,
    ) -> Self {
        self.latitude_field = latitude_field.into();
        self.longitude_field = longitude_field.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct TablePage {
    #[serde(default)]
    records: Vec<SourceRecord>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TableClient {
    client: Client,
    config: TableConfig,
}

impl TableClient {
    pub fn new(config: TableConfig) -> Result<Self> {
        if config.token.trim().is_empty() {
            return Err(SourceError::MissingCredentials(
                "table API token is empty".to_string(),
            ));
        }
        let client = build_client(config.timeout_secs)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    fn table_url(&self, record_id: Option<&str>) -> Result<Url> {
        let mut url = self.config.api_base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                SourceError::InvalidUrl(format!("{} cannot be a base", self.config.api_base))
            })?;
            segments
                .pop_if_empty()
                .push(&self.config.base_id)
                .push(&self.config.table);
            if let Some(id) = record_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    /// List every record of the table, following continuation tokens.
    pub async fn fetch_all(&self) -> Result<Vec<SourceRecord>> {
        let url = self.table_url(None)?;
        info!("Fetching records from {}", url);

        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        let mut pages = 0;

        loop {
            let mut params: Vec<(&str, String)> = Vec::new();
            if let Some(ref view) = self.config.view {
                params.push(("view", view.clone()));
            }
            if let Some(page_size) = self.config.page_size {
                params.push(("pageSize", page_size.to_string()));
            }
            if let Some(ref token) = offset {
                params.push(("offset", token.clone()));
            }

            let response = self
                .client
                .get(url.clone())
                .bearer_auth(&self.config.token)
                .query(&params)
                .send()
                .await?;
            let page: TablePage = ensure_success(response)?.json().await?;
            pages += 1;
            debug!("Page {} carried {} records", pages, page.records.len());
            records.extend(page.records);

            match page.offset {
                Some(next) if pages < self.config.max_pages => offset = Some(next),
                Some(_) => {
                    warn!(
                        "Stopping after {} pages, table still reports more records",
                        pages
                    );
                    break;
                }
                None => break,
            }
        }

        info!("Fetched {} records in {} pages", records.len(), pages);
        Ok(records)
    }

    /// Partially update one record's fields.
    pub async fn patch_fields(&self, record_id: &str, fields: Map<String, Value>) -> Result<()> {
        let url = self.table_url(Some(record_id))?;
        debug!("Patching {} with {} fields", record_id, fields.len());
        let response = self
            .client
            .patch(url)
            .bearer_auth(&self.config.token)
            .json(&json!({ "fields": fields }))
            .send()
            .await?;
        ensure_success(response)?;
        Ok(())
    }
}

impl RecordSource for TableClient {
    async fn fetch_records(&self) -> Result<Vec<SourceRecord>> {
        self.fetch_all().await
    }

    fn describe(&self) -> String {
        format!("table {}/{}", self.config.base_id, self.config.table)
    }
}

impl CoordinateStore for TableClient {
    async fn write_coordinates(&self, record_id: &str, coordinates: Coordinates) -> Result<()> {
        let mut fields = Map::new();
        fields.insert(self.config.latitude_field.clone(), json!(coordinates.latitude));
        fields.insert(self.config.longitude_field.clone(), json!(coordinates.longitude));
        self.patch_fields(record_id, fields).await
    }
}
