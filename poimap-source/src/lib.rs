pub mod csv;
pub mod error;
pub mod geocode;
pub mod http;
pub mod record;
pub mod source;
pub mod table;

pub use self::csv::{CsvLocation, CsvSource, parse_csv};
pub use error::{Result, SourceError};
pub use geocode::{GeocodeCandidate, GeocoderOptions, MapboxGeocoder};
pub use record::{Attachment, Coordinates, FieldValue, SourceRecord};
pub use source::{CoordinateStore, DataSource, Geocoder, NoWriteBack, RecordSource};
pub use table::{TableClient, TableConfig};
