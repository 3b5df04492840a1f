//! One map-widget session: load cycles, legend and filter state.
//!
//! A load cycle is split so that front ends can drive it in pieces:
//!
//! 1. [`MapSession::begin_cycle`] bumps the generation and hands out a ticket.
//! 2. [`resolve_rows`] normalizes (and geocodes) the fetched rows. This is the
//!    only slow step and needs no access to the session.
//! 3. [`MapSession::commit`] rebuilds markers and legend, unless a newer cycle
//!    was started in the meantime.
//!
//! [`MapSession::load`] runs the whole sequence and then writes geocoded
//! coordinates back to the source.

use crate::color::{ColorAssigner, DEFAULT_PALETTE, UNGROUPED_COLOR};
use crate::error::{LoadError, Result};
use crate::filter::{FilterEngine, FilterOutcome, Selection, TagMatch, tag_options};
use crate::legend::Legend;
use crate::markers::{GroupingMode, MarkerEntry, MarkerIndex};
use crate::normalize::{DroppedRow, FieldMapping, NormalizedRecord, Normalizer, RowOutcome};
use crate::resolver::{GeocodeResolver, WriteBackSummary};
use crate::surface::{MarkerId, RenderSurface};
use futures::stream::{self, StreamExt};
use poimap_source::{CoordinateStore, Coordinates, Geocoder, RecordSource, SourceRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Progress messages for interactive front ends.
pub type ProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// How rows that need geocoding are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeocodeStrategy {
    /// One row at a time, each geocode awaited before the next row.
    #[default]
    Sequential,
    /// Up to `limit` rows in flight; results are still consumed in row order.
    Concurrent { limit: usize },
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub mapping: FieldMapping,
    pub grouping: GroupingMode,
    pub strategy: GeocodeStrategy,
    pub tag_match: TagMatch,
    pub palette: Vec<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            mapping: FieldMapping::default(),
            grouping: GroupingMode::default(),
            strategy: GeocodeStrategy::default(),
            tag_match: TagMatch::default(),
            palette: DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleTicket {
    generation: u64,
}

impl CycleTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub generation: u64,
    pub fetched: usize,
    pub rendered: usize,
    pub geocoded: usize,
    pub dropped: Vec<DroppedRow>,
    pub write_back: WriteBackSummary,
}

/// Normalize rows in source order.
///
/// Whatever the strategy, the returned outcomes line up with `records`.
pub async fn resolve_rows<G, W>(
    normalizer: &Normalizer,
    records: &[SourceRecord],
    resolver: &GeocodeResolver<G, W>,
    strategy: GeocodeStrategy,
) -> Vec<RowOutcome>
where
    G: Geocoder,
    W: CoordinateStore,
{
    match strategy {
        GeocodeStrategy::Sequential => {
            let mut outcomes = Vec::with_capacity(records.len());
            for record in records {
                outcomes.push(normalizer.normalize(record, resolver).await);
            }
            outcomes
        }
        GeocodeStrategy::Concurrent { limit } => {
            stream::iter(records.iter().map(|record| normalizer.normalize(record, resolver)))
                .buffered(limit.max(1))
                .collect()
                .await
        }
    }
}

pub struct MapSession<S: RenderSurface> {
    index: MarkerIndex<S>,
    colors: ColorAssigner,
    legend: Legend,
    filter: FilterEngine,
    selection: Selection,
    normalizer: Normalizer,
    options: LoadOptions,
    generation: u64,
    progress: Option<ProgressCallback>,
}

impl<S: RenderSurface> MapSession<S> {
    pub fn new(surface: S, options: LoadOptions) -> Self {
        Self {
            index: MarkerIndex::new(surface),
            colors: ColorAssigner::with_palette(options.palette.clone()),
            legend: Legend::empty(options.grouping),
            filter: FilterEngine::new(options.tag_match),
            selection: Selection::All,
            normalizer: Normalizer::new(options.mapping.clone()),
            options,
            generation: 0,
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    fn report_progress(&self, message: String) {
        if let Some(callback) = &self.progress {
            callback(message);
        }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn index(&self) -> &MarkerIndex<S> {
        &self.index
    }

    pub fn surface(&self) -> &S {
        self.index.surface()
    }

    pub fn legend(&self) -> &Legend {
        &self.legend
    }

    pub fn colors(&self) -> &ColorAssigner {
        &self.colors
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Start a new cycle. Tickets of earlier cycles become stale.
    pub fn begin_cycle(&mut self) -> CycleTicket {
        self.generation += 1;
        debug!(generation = self.generation, "Load cycle started");
        CycleTicket {
            generation: self.generation,
        }
    }

    pub fn is_current(&self, ticket: CycleTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Replace every marker with the rows of `ticket`'s cycle.
    ///
    /// Returns [`LoadError::Stale`] without touching the index when a newer
    /// cycle has begun.
    pub fn commit(&mut self, ticket: CycleTicket, outcomes: Vec<RowOutcome>) -> Result<LoadReport> {
        if !self.is_current(ticket) {
            warn!(
                generation = ticket.generation,
                current = self.generation,
                "Discarding results of a superseded load cycle"
            );
            return Err(LoadError::Stale {
                ticket: ticket.generation,
                current: self.generation,
            });
        }

        self.index.clear();
        self.colors.reset();
        self.selection = Selection::All;

        let mut report = LoadReport {
            generation: ticket.generation,
            fetched: outcomes.len(),
            ..LoadReport::default()
        };

        for outcome in outcomes {
            match outcome {
                RowOutcome::Stored(record) => {
                    self.place(record);
                }
                RowOutcome::Geocoded(record) => {
                    report.geocoded += 1;
                    self.place(record);
                }
                RowOutcome::Dropped(dropped) => report.dropped.push(dropped),
            }
        }

        report.rendered = self.index.len();
        self.legend = Legend::build(&self.index, self.options.grouping, &mut self.colors);

        info!(
            generation = ticket.generation,
            "Placed {} markers in {} categories ({} geocoded, {} dropped)",
            report.rendered,
            self.legend.len(),
            report.geocoded,
            report.dropped.len()
        );
        Ok(report)
    }

    fn place(&mut self, record: NormalizedRecord) -> MarkerId {
        let keys = self.options.grouping.keys_for(&record);
        let color = match keys.first() {
            Some(key) => self.colors.color_for(key),
            None => UNGROUPED_COLOR.to_string(),
        };
        self.index.add(record, &keys, &color)
    }

    /// Fetch, normalize, render, then write geocoded coordinates back.
    ///
    /// A fetch failure aborts the cycle and leaves the current markers alone.
    pub async fn load<R, G, W>(
        &mut self,
        source: &R,
        resolver: &GeocodeResolver<G, W>,
    ) -> Result<LoadReport>
    where
        R: RecordSource,
        G: Geocoder,
        W: CoordinateStore,
    {
        self.report_progress(format!("Fetching records from {}", source.describe()));
        let records = match source.fetch_records().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Load aborted, could not fetch records: {}", e);
                return Err(e.into());
            }
        };

        let ticket = self.begin_cycle();
        resolver.reset_cache();
        self.report_progress(format!("Normalizing {} records", records.len()));
        let outcomes = resolve_rows(&self.normalizer, &records, resolver, self.options.strategy).await;

        let pending: Vec<(String, Coordinates)> = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                RowOutcome::Geocoded(record) => Some((record.id.clone(), record.coordinates())),
                _ => None,
            })
            .collect();

        let mut report = self.commit(ticket, outcomes)?;

        if resolver.writes_back() && !pending.is_empty() {
            self.report_progress(format!("Writing back {} coordinates", pending.len()));
            report.write_back = resolver.persist_all(&pending).await;
        }
        Ok(report)
    }

    /// Legend checkbox changed.
    pub fn toggle(&mut self, key: &str, checked: bool) -> Result<usize> {
        self.legend.toggle(key, checked, &mut self.index)
    }

    /// Legend reset button.
    pub fn reset(&mut self) {
        self.selection = Selection::All;
        self.legend.reset(&mut self.index);
    }

    pub fn select(&mut self, selection: Selection) -> FilterOutcome {
        let outcome = self.filter.apply(&selection, &mut self.index);
        self.selection = selection;
        outcome
    }

    pub fn select_tag(&mut self, tag: &str) -> FilterOutcome {
        self.select(Selection::Tag(tag.to_string()))
    }

    pub fn select_tags(&mut self, tags: &[String]) -> FilterOutcome {
        self.select(Selection::Tags(tags.to_vec()))
    }

    pub fn search(&mut self, query: &str) -> FilterOutcome {
        self.select(Selection::Text(query.to_string()))
    }

    pub fn focus(&mut self, marker: MarkerId) -> Result<&MarkerEntry> {
        self.legend.focus_member(marker, &mut self.index)
    }

    pub fn tag_options(&self) -> Vec<String> {
        tag_options(&self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::DropReason;
    use crate::surface::MemorySurface;
    use poimap_source::SourceError;

    struct NoGeocoder;

    impl Geocoder for NoGeocoder {
        async fn forward(&self, _address: &str) -> poimap_source::Result<Option<Coordinates>> {
            Ok(None)
        }
    }

    struct BrokenSource;

    impl RecordSource for BrokenSource {
        async fn fetch_records(&self) -> poimap_source::Result<Vec<SourceRecord>> {
            Err(SourceError::Status {
                url: "https://table.example/base".to_string(),
                status: 500,
            })
        }

        fn describe(&self) -> String {
            "broken".to_string()
        }
    }

    fn stored(id: &str, org: &str, tags: &[&str]) -> RowOutcome {
        RowOutcome::Stored(NormalizedRecord {
            id: id.to_string(),
            org_name: org.to_string(),
            address: None,
            email: None,
            phone: None,
            website: None,
            social: None,
            image_url: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            latitude: 40.7,
            longitude: -74.0,
        })
    }

    fn session() -> MapSession<MemorySurface> {
        MapSession::new(MemorySurface::new(), LoadOptions::default())
    }

    #[test]
    fn test_commit_places_rows_in_order() {
        let mut session = session();
        let ticket = session.begin_cycle();
        let dropped = RowOutcome::Dropped(DroppedRow {
            id: "r2".to_string(),
            org_name: "Nowhere".to_string(),
            reason: DropReason::NoLocation,
        });

        let report = session
            .commit(ticket, vec![stored("r1", "A", &["Art"]), dropped, stored("r3", "B", &[])])
            .unwrap();

        assert_eq!(report.fetched, 3);
        assert_eq!(report.rendered, 2);
        assert_eq!(report.dropped.len(), 1);
        let ids: Vec<&str> = session.index().entries().iter().map(|e| e.record.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r3"]);
        assert_eq!(session.index().entries()[1].color, UNGROUPED_COLOR);
    }

    #[test]
    fn test_stale_commit_is_discarded() {
        let mut session = session();
        let old = session.begin_cycle();
        let new = session.begin_cycle();
        session.commit(new, vec![stored("r1", "Fresh", &["Art"])]).unwrap();

        let err = session.commit(old, vec![stored("r9", "Old", &["Dance"])]).unwrap_err();

        assert!(matches!(err, LoadError::Stale { ticket: 1, current: 2 }));
        assert_eq!(session.index().len(), 1);
        assert_eq!(session.index().entries()[0].record.org_name, "Fresh");
    }

    #[test]
    fn test_commit_resets_filters_and_colors() {
        let mut session = session();
        let ticket = session.begin_cycle();
        session.commit(ticket, vec![stored("r1", "A", &["Art"])]).unwrap();
        session.select_tag("Dance");
        assert_eq!(session.index().visible_count(), 0);

        let ticket = session.begin_cycle();
        session
            .commit(ticket, vec![stored("r2", "B", &["Dance"]), stored("r1", "A", &["Art"])])
            .unwrap();

        assert_eq!(session.selection(), &Selection::All);
        assert_eq!(session.index().visible_count(), 2);
        assert_eq!(session.colors().keys(), &["Dance".to_string(), "Art".to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_previous_markers() {
        let mut session = session();
        let ticket = session.begin_cycle();
        session.commit(ticket, vec![stored("r1", "A", &["Art"])]).unwrap();
        let resolver = GeocodeResolver::new(NoGeocoder);

        let result = session.load(&BrokenSource, &resolver).await;

        assert!(matches!(result, Err(LoadError::Source(_))));
        assert_eq!(session.index().len(), 1);
        assert_eq!(session.generation(), 1);
    }
}
