use anyhow::{Context, bail};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use poimap_core::report::{ReportFormat, gather_report_data, generate_report, save_report};
use poimap_core::{
    FieldMapping, GeocodeResolver, GeocodeStrategy, GroupingMode, LoadOptions, MapSession,
    MemorySurface, Selection, TagMatch,
};
use poimap_source::{
    Coordinates, CoordinateStore, CsvLocation, CsvSource, DataSource, Geocoder, GeocoderOptions,
    MapboxGeocoder, RecordSource, SourceError, TableClient, TableConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use url::Url;

pub const TABLE_TOKEN_ENV: &str = "POIMAP_TABLE_TOKEN";
pub const GEOCODER_TOKEN_ENV: &str = "POIMAP_GEOCODER_TOKEN";

// Helper functions for argument handling

/// Interpret `--csv`: http(s) URLs are fetched, anything else is a local path
/// (with `~` expanded).
pub fn parse_csv_location(input: &str) -> Result<CsvLocation, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("CSV source must not be empty".to_string());
    }

    let lower = input.to_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Url::parse(input)
            .map(CsvLocation::Remote)
            .map_err(|e| format!("Invalid CSV URL '{}': {}", input, e));
    }

    let expanded = shellexpand::tilde(input);
    Ok(CsvLocation::Local(PathBuf::from(expanded.as_ref())))
}

/// Split a comma-separated tag list, dropping blanks.
pub fn parse_tag_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `longitude,latitude` for the geocoder's proximity bias.
pub fn parse_proximity(input: &str) -> Result<Coordinates, String> {
    let (lng, lat) = input
        .split_once(',')
        .ok_or_else(|| format!("Expected 'longitude,latitude', got '{}'", input))?;
    let longitude: f64 = lng
        .trim()
        .parse()
        .map_err(|_| format!("Invalid longitude '{}'", lng.trim()))?;
    let latitude: f64 = lat
        .trim()
        .parse()
        .map_err(|_| format!("Invalid latitude '{}'", lat.trim()))?;

    let coordinates = Coordinates::new(longitude, latitude);
    if !coordinates.is_finite() {
        return Err(format!("Proximity '{}' is not a finite point", input));
    }
    Ok(coordinates)
}

/// A flag value wins over the environment; blank values count as unset.
pub fn resolve_token(flag: Option<&String>, env_var: &str) -> Option<String> {
    flag.cloned()
        .or_else(|| std::env::var(env_var).ok())
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// `--concurrency 0` and `1` both mean one row at a time.
pub fn strategy_for(concurrency: usize) -> GeocodeStrategy {
    if concurrency <= 1 {
        GeocodeStrategy::Sequential
    } else {
        GeocodeStrategy::Concurrent { limit: concurrency }
    }
}

/// Initial filter requested on the command line.
pub fn build_selection(
    tag: Option<&String>,
    tags: Option<&String>,
    search: Option<&String>,
) -> Selection {
    if let Some(tag) = tag {
        Selection::Tag(tag.trim().to_string())
    } else if let Some(tags) = tags {
        Selection::Tags(parse_tag_list(tags))
    } else if let Some(query) = search {
        Selection::Text(query.to_string())
    } else {
        Selection::All
    }
}

/// Geocoder selected by the presence of an access token.
///
/// Without a token every lookup fails, so rows that only carry an address
/// are dropped instead of aborting the load.
#[derive(Debug, Clone)]
pub enum ConfiguredGeocoder {
    Mapbox(MapboxGeocoder),
    Disabled,
}

impl Geocoder for ConfiguredGeocoder {
    async fn forward(&self, address: &str) -> poimap_source::Result<Option<Coordinates>> {
        match self {
            ConfiguredGeocoder::Mapbox(geocoder) => geocoder.forward(address).await,
            ConfiguredGeocoder::Disabled => Err(SourceError::MissingCredentials(format!(
                "no geocoder token (--geocoder-token or ${})",
                GEOCODER_TOKEN_ENV
            ))),
        }
    }
}

fn field(args: &ArgMatches, name: &str, default: &str) -> String {
    args.get_one::<String>(name)
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

pub fn field_mapping_from_args(args: &ArgMatches) -> FieldMapping {
    let defaults = FieldMapping::default();
    FieldMapping {
        org_name: field(args, "org-field", &defaults.org_name),
        address: field(args, "address-field", &defaults.address),
        tags: field(args, "tags-field", &defaults.tags),
        latitude: field(args, "latitude-field", &defaults.latitude),
        longitude: field(args, "longitude-field", &defaults.longitude),
        ..defaults
    }
}

pub fn load_options_from_args(args: &ArgMatches) -> anyhow::Result<LoadOptions> {
    let group_by = args.get_one::<String>("group-by").map(String::as_str).unwrap_or("tag");
    let grouping = GroupingMode::from_str(group_by)
        .with_context(|| format!("Unknown grouping '{}'", group_by))?;

    let tag_match_arg = args.get_one::<String>("tag-match").map(String::as_str).unwrap_or("all");
    let tag_match = TagMatch::from_str(tag_match_arg)
        .with_context(|| format!("Unknown tag match policy '{}'", tag_match_arg))?;

    let concurrency = args.get_one::<usize>("concurrency").copied().unwrap_or(1);

    Ok(LoadOptions {
        mapping: field_mapping_from_args(args),
        grouping,
        strategy: strategy_for(concurrency),
        tag_match,
        ..LoadOptions::default()
    })
}

pub fn build_source(args: &ArgMatches) -> anyhow::Result<DataSource> {
    if let Some(csv) = args.get_one::<String>("csv") {
        let location = parse_csv_location(csv).map_err(anyhow::Error::msg)?;
        return Ok(DataSource::Csv(CsvSource::new(location)?));
    }

    let base_id = args
        .get_one::<String>("table-base")
        .context("Either --table-base or --csv must be provided")?;
    let table = args
        .get_one::<String>("table")
        .context("--table is required together with --table-base")?;
    let token = resolve_token(args.get_one::<String>("table-token"), TABLE_TOKEN_ENV)
        .with_context(|| format!("A table token is required (--table-token or ${})", TABLE_TOKEN_ENV))?;

    let mapping = field_mapping_from_args(args);
    let mut config = TableConfig::new(base_id, table, token)?
        .with_coordinate_fields(mapping.latitude, mapping.longitude);
    if let Some(view) = args.get_one::<String>("view") {
        config = config.with_view(view);
    }
    if let Some(page_size) = args.get_one::<u32>("page-size") {
        config = config.with_page_size(*page_size);
    }
    if let Some(api_base) = args.get_one::<Url>("api-base") {
        config = config.with_api_base(api_base.clone());
    }

    Ok(DataSource::Table(TableClient::new(config)?))
}

pub fn build_geocoder(args: &ArgMatches) -> anyhow::Result<ConfiguredGeocoder> {
    let Some(token) = resolve_token(args.get_one::<String>("geocoder-token"), GEOCODER_TOKEN_ENV)
    else {
        return Ok(ConfiguredGeocoder::Disabled);
    };

    let mut options = GeocoderOptions::new()?;
    if let Some(endpoint) = args.get_one::<Url>("geocoder-endpoint") {
        options = options.with_endpoint(endpoint.clone());
    }
    if let Some(country) = args.get_one::<String>("country") {
        options = options.with_country(country);
    }
    if let Some(proximity) = args.get_one::<String>("proximity") {
        options = options.with_proximity(parse_proximity(proximity).map_err(anyhow::Error::msg)?);
    }
    if let Some(limit) = args.get_one::<u8>("limit") {
        options = options.with_limit(*limit);
    }

    Ok(ConfiguredGeocoder::Mapbox(MapboxGeocoder::new(token, options)?))
}

fn write_back_store(args: &ArgMatches, source: &DataSource) -> anyhow::Result<Option<TableClient>> {
    if !args.get_flag("write-back") {
        return Ok(None);
    }
    match source {
        DataSource::Table(table) => Ok(Some(table.clone())),
        DataSource::Csv(_) => bail!("--write-back needs a table source, CSV exports are read-only"),
    }
}

fn spinner(quiet: bool) -> anyhow::Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

fn new_session(options: LoadOptions, spinner: &ProgressBar) -> MapSession<MemorySurface> {
    let progress = spinner.clone();
    MapSession::new(MemorySurface::new(), options)
        .with_progress(Arc::new(move |message: String| progress.set_message(message)))
}

// Subcommand handlers

pub async fn handle_load(sub_matches: &ArgMatches, quiet: bool) -> anyhow::Result<()> {
    // Initialize tracing for logging
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let source = build_source(sub_matches)?;
    let geocoder = build_geocoder(sub_matches)?;
    if matches!(geocoder, ConfiguredGeocoder::Disabled) {
        warn!("No geocoder token configured; rows without coordinates will be dropped");
    }
    let resolver = GeocodeResolver::new(geocoder).with_cache(sub_matches.get_flag("cache"));

    match write_back_store(sub_matches, &source)? {
        Some(table) => load_and_report(sub_matches, quiet, &source, &resolver.with_write_back(table)).await,
        None => load_and_report(sub_matches, quiet, &source, &resolver).await,
    }
}

async fn load_and_report<W: CoordinateStore>(
    sub_matches: &ArgMatches,
    quiet: bool,
    source: &DataSource,
    resolver: &GeocodeResolver<ConfiguredGeocoder, W>,
) -> anyhow::Result<()> {
    let format_arg = sub_matches.get_one::<String>("format").map(String::as_str).unwrap_or("text");
    let format = ReportFormat::from_str(format_arg)
        .with_context(|| format!("Unknown report format '{}'", format_arg))?;
    let output = sub_matches.get_one::<PathBuf>("output");

    let spinner = spinner(quiet)?;
    let mut session = new_session(load_options_from_args(sub_matches)?, &spinner);

    let load = match session.load(source, resolver).await {
        Ok(load) => load,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e).context(format!("Loading from {} failed", source.describe()));
        }
    };

    let selection = build_selection(
        sub_matches.get_one::<String>("tag"),
        sub_matches.get_one::<String>("tags"),
        sub_matches.get_one::<String>("search"),
    );
    if selection != Selection::All {
        let outcome = session.select(selection);
        if outcome.matches.is_empty() {
            spinner.println(format!("{} No markers match the requested filter", "⚠".yellow()));
        }
    }

    spinner.finish_with_message(format!(
        "{} Loaded {} markers ({} geocoded, {} dropped)",
        "✓".green(),
        load.rendered,
        load.geocoded,
        load.dropped.len()
    ));
    if load.write_back.issued > 0 {
        println!(
            "{} Wrote back {}/{} coordinates",
            "✓".green(),
            load.write_back.issued - load.write_back.failed,
            load.write_back.issued
        );
    }

    let data = gather_report_data(&session, &load, &source.describe());

    match output {
        Some(path) => {
            // Keep ANSI codes out of saved text reports
            colored::control::set_override(false);
            let report = generate_report(&data, format)?;
            colored::control::unset_override();
            save_report(&report, path)
                .with_context(|| format!("Failed to save report to {}", path.display()))?;
            println!("{} Report saved to: {}", "✓".green(), path.display());
        }
        None => {
            let report = generate_report(&data, format)?;
            print!("{}", report);
        }
    }

    Ok(())
}

pub async fn handle_locate(sub_matches: &ArgMatches) -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let address = sub_matches
        .get_one::<String>("ADDRESS")
        .context("An address is required")?;

    let ConfiguredGeocoder::Mapbox(geocoder) = build_geocoder(sub_matches)? else {
        bail!("A geocoder token is required (--geocoder-token or ${})", GEOCODER_TOKEN_ENV);
    };

    let candidates = geocoder.search(address.trim()).await?;
    let Some(best) = candidates.first() else {
        bail!("No geocoding result for '{}'", address.trim());
    };

    println!(
        "{} {} → {:.6}, {:.6}",
        "✓".green(),
        best.label.as_deref().unwrap_or(address.trim()).bold(),
        best.center.latitude,
        best.center.longitude
    );
    for candidate in candidates.iter().skip(1) {
        println!(
            "    {} {:.6}, {:.6}",
            candidate.label.as_deref().unwrap_or("(unnamed)").dimmed(),
            candidate.center.latitude,
            candidate.center.longitude
        );
    }

    Ok(())
}

pub async fn handle_ui(sub_matches: &ArgMatches, quiet: bool) -> anyhow::Result<()> {
    let source = build_source(sub_matches)?;
    let geocoder = build_geocoder(sub_matches)?;
    let resolver = GeocodeResolver::new(geocoder).with_cache(sub_matches.get_flag("cache"));

    match write_back_store(sub_matches, &source)? {
        Some(table) => explore(sub_matches, quiet, &source, &resolver.with_write_back(table)).await,
        None => explore(sub_matches, quiet, &source, &resolver).await,
    }
}

async fn explore<W: CoordinateStore>(
    sub_matches: &ArgMatches,
    quiet: bool,
    source: &DataSource,
    resolver: &GeocodeResolver<ConfiguredGeocoder, W>,
) -> anyhow::Result<()> {
    let spinner = spinner(quiet)?;
    let mut session = new_session(load_options_from_args(sub_matches)?, &spinner);
    let loaded = session.load(source, resolver).await;
    spinner.finish_and_clear();
    loaded.with_context(|| format!("Loading from {} failed", source.describe()))?;

    poimap_tui::run(session, source, resolver).await
}
