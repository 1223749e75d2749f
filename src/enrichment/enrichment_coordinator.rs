//! Detail-view enrichment runtime component.
//!
//! For one attached artist this fetches the relation facts, then fans out one
//! worker per concert location that geocodes the place and downloads the map
//! tile around it. Geocoding dispatch is throttled by a limiter shared by all
//! workers of the coordinator. Outcomes are published on the bus; workers never
//! touch display state, and dropping stale outcomes is the session's job.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::{debug, info, warn};
use tokio::sync::broadcast::Sender;

use crate::catalog::models::{concert_count, format_location_key, geocode_query, LocationFacts};
use crate::enrichment::geo_resolver::Geocoder;
use crate::enrichment::relation_cache::RelationCache;
use crate::enrichment::tile_fetcher::TileSource;
use crate::protocol::{
    DetailTicket, EnrichmentMessage, LocationEnrichment, LocationSummary, Message,
};

const LIMITER_POLL_CEILING: Duration = Duration::from_millis(25);

/// Spaces geocoding dispatches: one slot per interval, no burst.
pub struct DispatchLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    poll_interval: Duration,
}

impl DispatchLimiter {
    pub fn new(interval: Duration) -> Self {
        let quota = Quota::with_period(interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(quota),
            poll_interval: interval.min(LIMITER_POLL_CEILING).max(Duration::from_millis(1)),
        }
    }

    /// Blocks the calling worker until it may dispatch.
    pub fn wait_for_slot(&self) {
        while self.limiter.check().is_err() {
            thread::sleep(self.poll_interval);
        }
    }
}

/// Runtime knobs for one coordinator.
#[derive(Debug, Clone, Copy)]
pub struct EnrichmentSettings {
    pub tile_zoom: u8,
    pub stagger_interval: Duration,
}

/// Everything a location worker needs, shared by all siblings.
struct WorkerContext {
    geocoder: Arc<dyn Geocoder>,
    tiles: Arc<dyn TileSource>,
    limiter: Arc<DispatchLimiter>,
    tile_zoom: u8,
    bus_producer: Sender<Message>,
}

/// Starts enrichment for detail views and hands out attachment tickets.
pub struct EnrichmentCoordinator {
    relations: Arc<RelationCache>,
    context: Arc<WorkerContext>,
    next_generation: u64,
}

impl EnrichmentCoordinator {
    pub fn new(
        relations: Arc<RelationCache>,
        geocoder: Arc<dyn Geocoder>,
        tiles: Arc<dyn TileSource>,
        settings: EnrichmentSettings,
        bus_producer: Sender<Message>,
    ) -> Self {
        Self {
            relations,
            context: Arc::new(WorkerContext {
                geocoder,
                tiles,
                limiter: Arc::new(DispatchLimiter::new(settings.stagger_interval)),
                tile_zoom: settings.tile_zoom,
                bus_producer,
            }),
            next_generation: 0,
        }
    }

    pub fn relations(&self) -> &Arc<RelationCache> {
        &self.relations
    }

    fn entity_label(ticket: DetailTicket) -> String {
        format!("artist:{}#{}", ticket.artist_id, ticket.generation)
    }

    /// Issues a fresh ticket for `artist_id` and starts enrichment in the background.
    pub fn attach(&mut self, artist_id: u32) -> DetailTicket {
        self.next_generation = self.next_generation.wrapping_add(1);
        let ticket = DetailTicket {
            artist_id,
            generation: self.next_generation,
        };
        let relations = Arc::clone(&self.relations);
        let context = Arc::clone(&self.context);
        thread::spawn(move || Self::run_detail(relations, context, ticket));
        ticket
    }

    fn run_detail(relations: Arc<RelationCache>, context: Arc<WorkerContext>, ticket: DetailTicket) {
        let facts = match relations.fetch_relation(ticket.artist_id) {
            Ok(facts) => facts,
            Err(error) => {
                warn!(
                    "Enrichment[{}]: relation fetch failed: {}",
                    Self::entity_label(ticket),
                    error
                );
                context.publish(EnrichmentMessage::RelationFailed {
                    ticket,
                    error_kind: error.kind(),
                });
                return;
            }
        };

        let locations = Self::summarize(&facts);
        info!(
            "Enrichment[{}]: {} locations to enrich",
            Self::entity_label(ticket),
            locations.len()
        );
        context.publish(EnrichmentMessage::RelationLoaded {
            ticket,
            locations: locations.clone(),
            concert_count: concert_count(&facts),
        });

        for location in locations {
            let context = Arc::clone(&context);
            thread::spawn(move || {
                let outcome = context.enrich_location(ticket, location);
                context.publish(EnrichmentMessage::LocationEnriched(outcome));
            });
        }
    }

    fn summarize(facts: &LocationFacts) -> Vec<LocationSummary> {
        facts
            .iter()
            .map(|(key, dates)| LocationSummary {
                location_key: key.clone(),
                label: format_location_key(key),
                geocode_query: geocode_query(key),
                dates: dates.clone(),
            })
            .collect()
    }
}

impl WorkerContext {
    fn publish(&self, message: EnrichmentMessage) {
        // No receivers means nobody is displaying anything; dropping is fine.
        let _ = self.bus_producer.send(Message::Enrichment(message));
    }

    fn enrich_location(&self, ticket: DetailTicket, location: LocationSummary) -> LocationEnrichment {
        let query = location.geocode_query;
        let mut outcome = LocationEnrichment {
            ticket,
            location_key: location.location_key,
            label: location.label,
            coordinate: None,
            tile_bytes: None,
            error_kind: None,
        };

        self.limiter.wait_for_slot();
        let coordinate = match self.geocoder.resolve(&query) {
            Ok(coordinate) => coordinate,
            Err(error) => {
                debug!(
                    "Enrichment[{}]: geocoding '{}' failed: {}",
                    EnrichmentCoordinator::entity_label(ticket),
                    query,
                    error
                );
                outcome.error_kind = Some(error.kind());
                return outcome;
            }
        };
        outcome.coordinate = Some(coordinate);

        match self
            .tiles
            .fetch_tile(coordinate.lat, coordinate.lon, self.tile_zoom)
        {
            Ok(bytes) => outcome.tile_bytes = Some(Arc::from(bytes)),
            Err(error) => {
                debug!(
                    "Enrichment[{}]: tile for '{}' failed: {}",
                    EnrichmentCoordinator::entity_label(ticket),
                    outcome.label,
                    error
                );
                outcome.error_kind = Some(error.kind());
            }
        }
        outcome
    }
}
