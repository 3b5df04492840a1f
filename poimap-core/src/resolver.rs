//! Address resolution and coordinate write-back.

use crate::error::{LoadError, Result};
use futures::future::join_all;
use poimap_source::{CoordinateStore, Coordinates, Geocoder, NoWriteBack};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Outcome of the write-back pass of one load cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteBackSummary {
    pub issued: usize,
    pub failed: usize,
}

/// Wraps a [`Geocoder`] with an optional per-cycle cache and an optional
/// [`CoordinateStore`] for writing results back to the source table.
pub struct GeocodeResolver<G, W = NoWriteBack> {
    geocoder: G,
    store: Option<W>,
    cache: Option<Mutex<HashMap<String, Option<Coordinates>>>>,
    attempts: AtomicUsize,
}

impl<G: Geocoder> GeocodeResolver<G, NoWriteBack> {
    pub fn new(geocoder: G) -> Self {
        Self {
            geocoder,
            store: None,
            cache: None,
            attempts: AtomicUsize::new(0),
        }
    }
}

impl<G: Geocoder, W: CoordinateStore> GeocodeResolver<G, W> {
    pub fn with_write_back<S: CoordinateStore>(self, store: S) -> GeocodeResolver<G, S> {
        GeocodeResolver {
            geocoder: self.geocoder,
            store: Some(store),
            cache: self.cache,
            attempts: self.attempts,
        }
    }

    /// Remember results for identical addresses until [`Self::reset_cache`].
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = enabled.then(|| Mutex::new(HashMap::new()));
        self
    }

    pub fn geocoder(&self) -> &G {
        &self.geocoder
    }

    pub fn writes_back(&self) -> bool {
        self.store.is_some()
    }

    /// Number of requests actually sent to the geocoder.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn reset_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().unwrap_or_else(PoisonError::into_inner).clear();
        }
    }

    fn cached(&self, address: &str) -> Option<Option<Coordinates>> {
        let cache = self.cache.as_ref()?;
        cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .copied()
    }

    fn remember(&self, address: &str, result: Option<Coordinates>) {
        if let Some(cache) = &self.cache {
            cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(address.to_string(), result);
        }
    }

    /// Resolve an address; service errors and empty answers both yield `None`.
    pub async fn resolve(&self, address: &str) -> Option<Coordinates> {
        let address = address.trim();
        if address.is_empty() {
            return None;
        }
        if let Some(hit) = self.cached(address) {
            debug!("Geocode cache hit for '{}'", address);
            return hit;
        }

        self.attempts.fetch_add(1, Ordering::Relaxed);
        let result = match self.geocoder.forward(address).await {
            Ok(Some(coordinates)) if coordinates.is_finite() => Some(coordinates),
            Ok(_) => {
                debug!("No geocoding candidates for '{}'", address);
                None
            }
            Err(e) => {
                warn!("Geocoding '{}' failed: {}", address, e);
                None
            }
        };
        self.remember(address, result);
        result
    }

    /// Write one resolved pair back. Failures are logged and reported as `false`.
    pub async fn persist(&self, record_id: &str, coordinates: Coordinates) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.write_coordinates(record_id, coordinates).await {
            Ok(()) => {
                debug!(record = %record_id, "Stored geocoded coordinates");
                true
            }
            Err(e) => {
                warn!(record = %record_id, "Could not store geocoded coordinates: {}", e);
                false
            }
        }
    }

    /// Write every pending pair back concurrently. Never fails.
    pub async fn persist_all(&self, pending: &[(String, Coordinates)]) -> WriteBackSummary {
        if self.store.is_none() || pending.is_empty() {
            return WriteBackSummary::default();
        }
        let results = join_all(
            pending
                .iter()
                .map(|(id, coordinates)| self.persist(id, *coordinates)),
        )
        .await;
        let failed = results.iter().filter(|ok| !**ok).count();
        info!(
            "Wrote back {} of {} geocoded coordinates",
            results.len() - failed,
            results.len()
        );
        WriteBackSummary {
            issued: results.len(),
            failed,
        }
    }
}

/// Free-text location search used by the address search box.
pub async fn locate<G: Geocoder>(geocoder: &G, query: &str) -> Result<Coordinates> {
    let query = query.trim();
    match geocoder.forward(query).await? {
        Some(coordinates) if coordinates.is_finite() => Ok(coordinates),
        _ => Err(LoadError::NoGeocodeResult(query.to_string())),
    }
}
