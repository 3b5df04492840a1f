//! Turns heterogeneous table rows into [`NormalizedRecord`]s.
//!
//! Rows differ in shape between deployments: coordinates may be numbers or
//! numeric strings, tags may be a comma-separated string or a list, images may
//! be a URL or a list of attachments. Every shape is resolved here so that the
//! rest of the crate only ever sees the normalized form.

use crate::resolver::GeocodeResolver;
use poimap_source::{CoordinateStore, Coordinates, FieldValue, Geocoder, SourceRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Placeholder for rows without an organization name.
pub const UNNAMED_ORGANIZATION: &str = "Unnamed";

/// Column names of the backing table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub org_name: String,
    pub address: String,
    pub email: String,
    pub phone: String,
    pub website: String,
    pub social: String,
    pub image: String,
    pub tags: String,
    pub latitude: String,
    pub longitude: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            org_name: "Org Name".to_string(),
            address: "Address".to_string(),
            email: "Email".to_string(),
            phone: "Phone".to_string(),
            website: "Website".to_string(),
            social: "Social".to_string(),
            image: "Image".to_string(),
            tags: "Tags".to_string(),
            latitude: "Latitude".to_string(),
            longitude: "Longitude".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub id: String,
    pub org_name: String,
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub social: Option<String>,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    pub latitude: f64,
    pub longitude: f64,
}

impl NormalizedRecord {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.longitude, self.latitude)
    }

    pub fn tag_line(&self) -> String {
        self.tags.join(", ")
    }

    /// Case-insensitive tag membership.
    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim().to_lowercase();
        self.tags.iter().any(|t| t.to_lowercase() == tag)
    }
}

/// Where a row's coordinates come from.
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    Stored(Coordinates),
    Address(String),
    Missing,
}

/// A row with everything resolved except, possibly, its coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub id: String,
    pub org_name: String,
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub social: Option<String>,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    pub location: Location,
}

impl PendingRecord {
    pub fn locate(self, coordinates: Coordinates) -> NormalizedRecord {
        NormalizedRecord {
            id: self.id,
            org_name: self.org_name,
            address: self.address,
            email: self.email,
            phone: self.phone,
            website: self.website,
            social: self.social,
            image_url: self.image_url,
            tags: self.tags,
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DropReason {
    /// Neither usable coordinates nor an address.
    NoLocation,
    /// The address could not be geocoded.
    GeocodeFailed { address: String },
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::NoLocation => write!(f, "no coordinates or address"),
            DropReason::GeocodeFailed { address } => write!(f, "could not geocode '{}'", address),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedRow {
    pub id: String,
    pub org_name: String,
    #[serde(flatten)]
    pub reason: DropReason,
}

/// Result of normalizing one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// Coordinates came from the row itself.
    Stored(NormalizedRecord),
    /// Coordinates came from the geocoder.
    Geocoded(NormalizedRecord),
    Dropped(DroppedRow),
}

impl RowOutcome {
    pub fn record(&self) -> Option<&NormalizedRecord> {
        match self {
            RowOutcome::Stored(record) | RowOutcome::Geocoded(record) => Some(record),
            RowOutcome::Dropped(_) => None,
        }
    }

    pub fn into_record(self) -> Option<NormalizedRecord> {
        match self {
            RowOutcome::Stored(record) | RowOutcome::Geocoded(record) => Some(record),
            RowOutcome::Dropped(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    mapping: FieldMapping,
}

impl Normalizer {
    pub fn new(mapping: FieldMapping) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// Resolve every field that needs no I/O.
    pub fn prepare(&self, record: &SourceRecord) -> PendingRecord {
        let m = &self.mapping;
        let org_name = text_field(record.get(&m.org_name))
            .unwrap_or_else(|| UNNAMED_ORGANIZATION.to_string());
        let address = text_field(record.get(&m.address));

        let latitude = parse_coordinate(record.get(&m.latitude));
        let longitude = parse_coordinate(record.get(&m.longitude));
        let location = match (latitude, longitude, &address) {
            (Some(lat), Some(lng), _) => Location::Stored(Coordinates::new(lng, lat)),
            (_, _, Some(address)) => Location::Address(address.clone()),
            _ => Location::Missing,
        };

        PendingRecord {
            id: record.id.clone(),
            org_name,
            address,
            email: text_field(record.get(&m.email)),
            phone: text_field(record.get(&m.phone)),
            website: text_field(record.get(&m.website)),
            social: text_field(record.get(&m.social)),
            image_url: resolve_image(record.get(&m.image)),
            tags: parse_tags(record.get(&m.tags)),
            location,
        }
    }

    /// Normalize one row, geocoding its address when coordinates are missing.
    pub async fn normalize<G, W>(
        &self,
        record: &SourceRecord,
        resolver: &GeocodeResolver<G, W>,
    ) -> RowOutcome
    where
        G: Geocoder,
        W: CoordinateStore,
    {
        let pending = self.prepare(record);
        match pending.location.clone() {
            Location::Stored(coordinates) => RowOutcome::Stored(pending.locate(coordinates)),
            Location::Address(address) => match resolver.resolve(&address).await {
                Some(coordinates) => {
                    debug!(record = %pending.id, "Geocoded '{}'", address);
                    RowOutcome::Geocoded(pending.locate(coordinates))
                }
                None => {
                    warn!(record = %pending.id, org = %pending.org_name, "Could not geocode '{}'", address);
                    RowOutcome::Dropped(DroppedRow {
                        id: pending.id,
                        org_name: pending.org_name,
                        reason: DropReason::GeocodeFailed { address },
                    })
                }
            },
            Location::Missing => {
                warn!(record = %pending.id, org = %pending.org_name, "Skipping record without coordinates or address");
                RowOutcome::Dropped(DroppedRow {
                    id: pending.id,
                    org_name: pending.org_name,
                    reason: DropReason::NoLocation,
                })
            }
        }
    }
}

/// Textual cell; lists (e.g. lookup fields) are joined with ", ".
fn text_field(value: Option<&FieldValue>) -> Option<String> {
    match value? {
        FieldValue::List(items) => {
            let parts: Vec<String> = items.iter().filter_map(FieldValue::as_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        other => other.as_text(),
    }
}

/// Finite coordinate from a number or numeric string.
pub fn parse_coordinate(value: Option<&FieldValue>) -> Option<f64> {
    value.and_then(FieldValue::as_number)
}

/// Tags from a comma-separated string or a list of strings.
pub fn parse_tags(value: Option<&FieldValue>) -> Vec<String> {
    match value {
        Some(FieldValue::Text(text)) => text
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect(),
        Some(FieldValue::List(items)) => items.iter().filter_map(FieldValue::as_text).collect(),
        Some(other) => other.as_text().into_iter().collect(),
        None => Vec::new(),
    }
}

/// Image URL from a bare string or the first attachment.
pub fn resolve_image(value: Option<&FieldValue>) -> Option<String> {
    let url = match value? {
        FieldValue::Text(url) => url.trim().to_string(),
        FieldValue::Attachment(attachment) => attachment.url.trim().to_string(),
        FieldValue::Attachments(attachments) => attachments.first()?.url.trim().to_string(),
        FieldValue::List(items) => items.first()?.as_text()?,
        _ => return None,
    };
    (!url.is_empty()).then_some(url)
}
