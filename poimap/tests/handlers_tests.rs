use poimap::handlers::*;
use poimap_core::{GeocodeResolver, GeocodeStrategy, LoadOptions, MapSession, MemorySurface, Selection};
use poimap_source::{
    CsvLocation, CsvSource, DataSource, Geocoder, GeocoderOptions, MapboxGeocoder, RecordSource,
    SourceError,
};
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

// ============================================================================
// CSV Location Tests
// ============================================================================

#[test]
fn test_parse_csv_location_remote() {
    let location = parse_csv_location("https://example.com/export.csv").unwrap();
    match location {
        CsvLocation::Remote(url) => assert_eq!(url.as_str(), "https://example.com/export.csv"),
        other => panic!("expected remote location, got {:?}", other),
    }
}

#[test]
fn test_parse_csv_location_local() {
    let location = parse_csv_location("data/places.csv").unwrap();
    assert_eq!(location, CsvLocation::Local(PathBuf::from("data/places.csv")));
}

#[test]
fn test_parse_csv_location_expands_tilde() {
    let location = parse_csv_location("~/places.csv").unwrap();
    match location {
        CsvLocation::Local(path) => {
            assert!(path.ends_with("places.csv"));
            if let Ok(home) = std::env::var("HOME") {
                assert!(path.starts_with(home));
            }
        }
        other => panic!("expected local location, got {:?}", other),
    }
}

#[test]
fn test_parse_csv_location_invalid() {
    assert!(parse_csv_location("   ").is_err());
    assert!(parse_csv_location("https://").is_err());
}

// ============================================================================
// Argument Helper Tests
// ============================================================================

#[test]
fn test_parse_tag_list() {
    assert_eq!(
        parse_tag_list("Art, Museum,,  Gallery "),
        vec!["Art", "Museum", "Gallery"]
    );
    assert!(parse_tag_list(" , ").is_empty());
}

#[test]
fn test_parse_proximity() {
    let point = parse_proximity("-73.99, 40.73").unwrap();
    assert_eq!(point.longitude, -73.99);
    assert_eq!(point.latitude, 40.73);
}

#[test]
fn test_parse_proximity_invalid() {
    assert!(parse_proximity("40.73").is_err());
    assert!(parse_proximity("west,40.73").is_err());
    assert!(parse_proximity("NaN,40.73").is_err());
}

#[test]
fn test_resolve_token_prefers_flag() {
    let flag = "  abc123 ".to_string();
    assert_eq!(
        resolve_token(Some(&flag), "POIMAP_HANDLERS_TEST_UNSET"),
        Some("abc123".to_string())
    );
}

#[test]
fn test_resolve_token_missing() {
    let blank = "   ".to_string();
    assert_eq!(resolve_token(None, "POIMAP_HANDLERS_TEST_UNSET"), None);
    assert_eq!(resolve_token(Some(&blank), "POIMAP_HANDLERS_TEST_UNSET"), None);
}

#[test]
fn test_strategy_for() {
    assert_eq!(strategy_for(0), GeocodeStrategy::Sequential);
    assert_eq!(strategy_for(1), GeocodeStrategy::Sequential);
    assert_eq!(strategy_for(4), GeocodeStrategy::Concurrent { limit: 4 });
}

#[test]
fn test_build_selection() {
    let tag = "Art".to_string();
    let tags = "Art,Museum".to_string();
    let query = "gallery".to_string();

    assert_eq!(build_selection(None, None, None), Selection::All);
    assert_eq!(build_selection(Some(&tag), None, None), Selection::Tag("Art".to_string()));
    assert_eq!(
        build_selection(None, Some(&tags), None),
        Selection::Tags(vec!["Art".to_string(), "Museum".to_string()])
    );
    assert_eq!(
        build_selection(None, None, Some(&query)),
        Selection::Text("gallery".to_string())
    );
}

// ============================================================================
// Geocoder Tests
// ============================================================================

#[tokio::test]
async fn test_disabled_geocoder_reports_missing_credentials() {
    let result = ConfiguredGeocoder::Disabled.forward("1 Main St").await;
    assert!(matches!(result, Err(SourceError::MissingCredentials(_))));
}

#[test]
fn test_configured_geocoder_clones_without_exposing_token() {
    let mapbox = MapboxGeocoder::new("pk.private", GeocoderOptions::new().unwrap()).unwrap();
    let configured = ConfiguredGeocoder::Mapbox(mapbox);

    let copy = configured.clone();
    let rendered = format!("{:?}", copy);

    assert!(rendered.contains("Mapbox"));
    assert!(!rendered.contains("pk.private"));
}

// ============================================================================
// CSV Load Tests
// ============================================================================

#[tokio::test]
async fn test_csv_file_load_without_geocoder() -> Result<(), Box<dyn std::error::Error>> {
    let mut temp_file = NamedTempFile::new()?;
    writeln!(temp_file, "id,Org Name,Address,Latitude,Longitude,Tags")?;
    writeln!(temp_file, "a1,Queens Gallery,,40.74,-73.84,\"Art, Gallery\"")?;
    writeln!(temp_file, "a2,Harbor Museum,,40.70,-74.01,Museum")?;
    writeln!(temp_file, "a3,Address Only,1 Main St,,,Art")?;

    let location = parse_csv_location(temp_file.path().to_str().unwrap())?;
    let source = DataSource::Csv(CsvSource::new(location)?);
    assert!(source.describe().starts_with("csv "));
    let resolver = GeocodeResolver::new(ConfiguredGeocoder::Disabled);
    let mut session = MapSession::new(MemorySurface::new(), LoadOptions::default());

    let report = session.load(&source, &resolver).await?;

    assert_eq!(report.fetched, 3);
    assert_eq!(report.rendered, 2);
    assert_eq!(report.geocoded, 0);
    assert_eq!(report.dropped.len(), 1);
    assert_eq!(report.dropped[0].id, "a3");

    let keys: Vec<&str> = session
        .legend()
        .sections()
        .iter()
        .map(|section| section.key.as_str())
        .collect();
    assert_eq!(keys, vec!["Art", "Gallery", "Museum"]);

    Ok(())
}
