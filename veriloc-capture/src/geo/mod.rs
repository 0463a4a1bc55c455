//! Geocoding resolution with debounce and latest-wins ordering
//!
//! Free-text searches and map-drag settles race each other: a slow lookup
//! for an old query must never overwrite the result of a newer user action.
//! Every lookup captures a monotonically increasing generation number at
//! call time; a completion is applied (delivered on the updates channel)
//! only if its generation is still the highest issued. Older completions
//! are dropped unconditionally, even when they finish last.
//!
//! Debouncing is trailing: a lookup sleeps out the quiet window first and
//! only contacts the provider if no newer call arrived meanwhile, so rapid
//! typing or continuous panning issues a single provider request.

pub mod client;

pub use client::NominatimClient;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use veriloc_common::config::GeoConfig;
use veriloc_common::{Coordinate, Error, PlaceCandidate, Result};

/// Capability contract for the external geocoding provider
#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    /// Resolve free text to a coordinate; `None` when there is no match
    async fn forward_geocode(&self, query: &str) -> Result<Option<Coordinate>>;

    /// Resolve a coordinate to place candidates, in provider relevance order
    async fn reverse_geocode(&self, coordinate: Coordinate) -> Result<Vec<PlaceCandidate>>;
}

/// Outcome of the winning lookup, delivered to the session-owning layer
#[derive(Debug)]
pub enum GeoUpdate {
    /// A debounced text search resolved
    SearchResolved {
        query: String,
        coordinate: Coordinate,
        places: Vec<PlaceCandidate>,
    },
    /// A settled map region was reverse-geocoded
    RegionResolved {
        coordinate: Coordinate,
        places: Vec<PlaceCandidate>,
    },
    /// The winning lookup failed; previous session state stays untouched
    Failed {
        query: Option<String>,
        error: Error,
    },
}

/// Debounced, supersession-aware geocoding front end
#[derive(Clone)]
pub struct GeoResolver {
    provider: Arc<dyn GeocodingProvider>,
    config: GeoConfig,
    updates: mpsc::UnboundedSender<GeoUpdate>,
    generation: Arc<AtomicU64>,
}

impl GeoResolver {
    pub fn new(
        provider: Arc<dyn GeocodingProvider>,
        config: GeoConfig,
        updates: mpsc::UnboundedSender<GeoUpdate>,
    ) -> Self {
        Self {
            provider,
            config,
            updates,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// One-shot forward geocode: zero results is `NotFound`, never retried
    pub async fn resolve_by_name(&self, query: &str) -> Result<Coordinate> {
        match self.provider.forward_geocode(query).await? {
            Some(coordinate) => Ok(coordinate),
            None => Err(Error::NotFound(query.to_string())),
        }
    }

    /// One-shot reverse geocode; the caller decides whether to retry
    pub async fn resolve_by_coordinate(
        &self,
        coordinate: Coordinate,
    ) -> Result<Vec<PlaceCandidate>> {
        self.provider.reverse_geocode(coordinate).await
    }

    /// Debounced text search.
    ///
    /// Resolves the query to a coordinate and its place candidates; the
    /// result is applied only if no newer `search` or `region_settled` call
    /// was issued in the meantime.
    pub fn search(&self, query: impl Into<String>) {
        let query = query.into();
        let generation = self.next_generation();
        let resolver = self.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(resolver.config.debounce_ms)).await;
            if !resolver.is_current(generation) {
                tracing::debug!(generation, query = %query, "Search superseded during quiet window");
                return;
            }

            let outcome = resolver.run_search(&query).await;
            if !resolver.is_current(generation) {
                tracing::debug!(generation, query = %query, "Discarding superseded search result");
                return;
            }

            let update = match outcome {
                Ok((coordinate, places)) => GeoUpdate::SearchResolved {
                    query,
                    coordinate,
                    places,
                },
                Err(error) => GeoUpdate::Failed {
                    query: Some(query),
                    error,
                },
            };
            let _ = resolver.updates.send(update);
        });
    }

    /// Coalesced region-settle handler for continuous map panning.
    ///
    /// Reverse geocoding runs only once panning has settled for the quiet
    /// window; intermediate frames never reach the provider.
    pub fn region_settled(&self, coordinate: Coordinate) {
        let generation = self.next_generation();
        let resolver = self.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(resolver.config.debounce_ms)).await;
            if !resolver.is_current(generation) {
                tracing::debug!(generation, "Region settle superseded during quiet window");
                return;
            }

            let outcome = resolver.provider.reverse_geocode(coordinate).await;
            if !resolver.is_current(generation) {
                tracing::debug!(generation, "Discarding superseded reverse geocode result");
                return;
            }

            let update = match outcome {
                Ok(places) => GeoUpdate::RegionResolved { coordinate, places },
                Err(error) => GeoUpdate::Failed { query: None, error },
            };
            let _ = resolver.updates.send(update);
        });
    }

    async fn run_search(&self, query: &str) -> Result<(Coordinate, Vec<PlaceCandidate>)> {
        let coordinate = self.resolve_by_name(query).await?;
        let places = self.provider.reverse_geocode(coordinate).await?;
        tracing::info!(
            query = %query,
            latitude = coordinate.latitude,
            longitude = coordinate.longitude,
            candidates = places.len(),
            "Search resolved"
        );
        Ok((coordinate, places))
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider {
        coordinate: Option<Coordinate>,
        places: Vec<PlaceCandidate>,
    }

    #[async_trait]
    impl GeocodingProvider for FixedProvider {
        async fn forward_geocode(&self, _query: &str) -> Result<Option<Coordinate>> {
            Ok(self.coordinate)
        }

        async fn reverse_geocode(&self, _c: Coordinate) -> Result<Vec<PlaceCandidate>> {
            Ok(self.places.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl GeocodingProvider for FailingProvider {
        async fn forward_geocode(&self, _query: &str) -> Result<Option<Coordinate>> {
            Err(Error::ProviderUnavailable("connection refused".into()))
        }

        async fn reverse_geocode(&self, _c: Coordinate) -> Result<Vec<PlaceCandidate>> {
            Err(Error::ProviderUnavailable("connection refused".into()))
        }
    }

    fn resolver(provider: Arc<dyn GeocodingProvider>) -> (GeoResolver, mpsc::UnboundedReceiver<GeoUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = GeoConfig {
            debounce_ms: 10,
            ..GeoConfig::default()
        };
        (GeoResolver::new(provider, config, tx), rx)
    }

    #[tokio::test]
    async fn resolve_by_name_maps_empty_to_not_found() {
        let (resolver, _rx) = resolver(Arc::new(FixedProvider {
            coordinate: None,
            places: vec![],
        }));
        match resolver.resolve_by_name("Eiffel Tower").await {
            Err(Error::NotFound(query)) => assert_eq!(query, "Eiffel Tower"),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn resolve_by_coordinate_surfaces_provider_outage() {
        let (resolver, _rx) = resolver(Arc::new(FailingProvider));
        let c = Coordinate::new(1.0, 2.0).unwrap();
        assert!(matches!(
            resolver.resolve_by_coordinate(c).await,
            Err(Error::ProviderUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn search_delivers_after_quiet_window() {
        let c = Coordinate::new(48.858370, 2.294481).unwrap();
        let (resolver, mut rx) = resolver(Arc::new(FixedProvider {
            coordinate: Some(c),
            places: vec![PlaceCandidate {
                name: Some("Eiffel Tower".into()),
                ..PlaceCandidate::default()
            }],
        }));

        resolver.search("eiffel");
        match rx.recv().await.unwrap() {
            GeoUpdate::SearchResolved {
                query, coordinate, ..
            } => {
                assert_eq!(query, "eiffel");
                assert_eq!(coordinate, c);
            }
            other => panic!("unexpected update: {:?}", other),
        }
    }

    #[tokio::test]
    async fn rapid_searches_deliver_only_the_last() {
        let c = Coordinate::new(3.0, 4.0).unwrap();
        let (resolver, mut rx) = resolver(Arc::new(FixedProvider {
            coordinate: Some(c),
            places: vec![],
        }));

        resolver.search("a");
        resolver.search("ab");
        resolver.search("abc");

        match rx.recv().await.unwrap() {
            GeoUpdate::SearchResolved { query, .. } => assert_eq!(query, "abc"),
            other => panic!("unexpected update: {:?}", other),
        }
        // Nothing else follows
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
