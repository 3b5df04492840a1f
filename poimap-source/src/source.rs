//! Seams between the map logic and the outside services it relies on.

use crate::csv::CsvSource;
use crate::error::Result;
use crate::record::{Coordinates, SourceRecord};
use crate::table::TableClient;
use std::future::Future;

/// Anything that can hand over the full set of raw rows for a load cycle.
pub trait RecordSource: Sync {
    fn fetch_records(&self) -> impl Future<Output = Result<Vec<SourceRecord>>> + Send;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

/// Free-text address to coordinates. `Ok(None)` means zero candidates.
pub trait Geocoder: Sync {
    fn forward(&self, address: &str) -> impl Future<Output = Result<Option<Coordinates>>> + Send;
}

/// Partial update of a row's stored coordinates.
pub trait CoordinateStore: Sync {
    fn write_coordinates(
        &self,
        record_id: &str,
        coordinates: Coordinates,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl<T: CoordinateStore + ?Sized> CoordinateStore for &T {
    fn write_coordinates(
        &self,
        record_id: &str,
        coordinates: Coordinates,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).write_coordinates(record_id, coordinates)
    }
}

/// Store used when write-back is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWriteBack;

impl CoordinateStore for NoWriteBack {
    async fn write_coordinates(&self, _record_id: &str, _coordinates: Coordinates) -> Result<()> {
        Ok(())
    }
}

/// The data sources a deployment can be pointed at.
#[derive(Debug, Clone)]
pub enum DataSource {
    Table(TableClient),
    Csv(CsvSource),
}

impl RecordSource for DataSource {
    async fn fetch_records(&self) -> Result<Vec<SourceRecord>> {
        match self {
            DataSource::Table(table) => table.fetch_records().await,
            DataSource::Csv(csv) => csv.fetch_records().await,
        }
    }

    fn describe(&self) -> String {
        match self {
            DataSource::Table(table) => table.describe(),
            DataSource::Csv(csv) => csv.describe(),
        }
    }
}
