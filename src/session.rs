//! Coordinating-thread owner of all display state.
//!
//! The session is the only place query output and enrichment outcomes are
//! applied and forwarded to the renderer. Worker threads reach it solely
//! through the message bus; outcomes for a detail view that is no longer
//! attached are dropped here.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::broadcast::{
    error::{RecvError, TryRecvError},
    Receiver,
};

use crate::catalog::local_entry::NewArtistDraft;
use crate::catalog::models::ArtistRecord;
use crate::catalog::query_engine::{QueryCriteria, QueryEngine};
use crate::enrichment::enrichment_coordinator::EnrichmentCoordinator;
use crate::error::FetchErrorKind;
use crate::protocol::{
    CatalogMessage, DetailTicket, EnrichmentMessage, LocationEnrichment, LocationSummary, Message,
};

/// External renderer fed by the session.
pub trait DisplaySink {
    fn show_results(&mut self, results: &[ArtistRecord]);
    fn show_relation(&mut self, artist_id: u32, locations: &[LocationSummary], concert_count: usize);
    fn show_relation_error(&mut self, artist_id: u32, error_kind: FetchErrorKind);
    fn show_location(&mut self, outcome: &LocationEnrichment);
}

/// What the attached detail view currently shows.
#[derive(Debug, Clone)]
pub struct DetailState {
    pub ticket: DetailTicket,
    pub locations: Vec<LocationSummary>,
    pub concert_count: Option<usize>,
    pub relation_error: Option<FetchErrorKind>,
    pub outcomes: HashMap<String, LocationEnrichment>,
    /// Set when the bus overflowed while this view was still filling in.
    pub events_lost: bool,
}

impl DetailState {
    fn new(ticket: DetailTicket) -> Self {
        Self {
            ticket,
            locations: Vec::new(),
            concert_count: None,
            relation_error: None,
            outcomes: HashMap::new(),
            events_lost: false,
        }
    }

    /// True once the relation failed, events were lost, or every location has
    /// a terminal outcome.
    pub fn is_complete(&self) -> bool {
        self.events_lost
            || self.relation_error.is_some()
            || (self.concert_count.is_some() && self.outcomes.len() == self.locations.len())
    }
}

pub struct Session<S: DisplaySink> {
    bus_consumer: Receiver<Message>,
    engine: Arc<QueryEngine>,
    coordinator: EnrichmentCoordinator,
    sink: S,
    criteria: QueryCriteria,
    results: Vec<ArtistRecord>,
    detail: Option<DetailState>,
    location_index_settled: bool,
}

impl<S: DisplaySink> Session<S> {
    pub fn new(
        bus_consumer: Receiver<Message>,
        engine: Arc<QueryEngine>,
        coordinator: EnrichmentCoordinator,
        sink: S,
    ) -> Self {
        Self {
            bus_consumer,
            engine,
            coordinator,
            sink,
            criteria: QueryCriteria::default(),
            results: Vec::new(),
            detail: None,
            location_index_settled: false,
        }
    }

    pub fn criteria(&self) -> &QueryCriteria {
        &self.criteria
    }

    pub fn results(&self) -> &[ArtistRecord] {
        &self.results
    }

    pub fn detail(&self) -> Option<&DetailState> {
        self.detail.as_ref()
    }

    /// True once the bulk location index arrived or failed for good.
    pub fn location_index_settled(&self) -> bool {
        self.location_index_settled
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Replaces the criteria and republishes the view.
    pub fn set_criteria(&mut self, criteria: QueryCriteria) -> &[ArtistRecord] {
        self.criteria = criteria;
        self.refresh();
        &self.results
    }

    pub fn refresh(&mut self) {
        self.results = self.engine.query(&self.criteria);
        self.sink.show_results(&self.results);
    }

    /// Attaches a detail view; earlier attachments become stale.
    pub fn open_detail(&mut self, artist_id: u32) -> DetailTicket {
        let ticket = self.coordinator.attach(artist_id);
        debug!("Detail attached: artist {} generation {}", artist_id, ticket.generation);
        self.detail = Some(DetailState::new(ticket));
        ticket
    }

    /// Detaches the current view. Its in-flight work runs on but is discarded.
    pub fn close_detail(&mut self) {
        if let Some(detail) = self.detail.take() {
            debug!("Detail detached: artist {}", detail.ticket.artist_id);
        }
        self.refresh();
    }

    pub fn is_favorite(&self, artist_id: u32) -> bool {
        self.engine.favorites().is_favorite(artist_id)
    }

    pub fn toggle_favorite(&mut self, artist_id: u32) -> bool {
        let now_favorite = self.engine.favorites().toggle(artist_id);
        self.refresh();
        now_favorite
    }

    pub fn export_favorites(&self) -> Vec<u32> {
        self.engine.favorites().export_all()
    }

    pub fn import_favorites(&mut self, artist_ids: &[u32]) {
        self.engine.favorites().import_all(artist_ids);
        self.refresh();
    }

    /// Adds a user-created artist; its concerts are served locally on detail.
    pub fn add_local_artist(&mut self, draft: NewArtistDraft) -> ArtistRecord {
        let concerts = draft.concerts.clone();
        let record = self.engine.add_local_artist(draft);
        self.coordinator.relations().seed(record.id, concerts);
        info!("Local artist added: {} (id {})", record.name, record.id);
        self.refresh();
        record
    }

    fn is_attached(&self, ticket: DetailTicket) -> bool {
        self.detail
            .as_ref()
            .is_some_and(|detail| detail.ticket == ticket)
    }

    pub fn handle_message(&mut self, message: Message) {
        match message {
            Message::Catalog(CatalogMessage::LocationIndexFetched(index)) => {
                self.engine.merge_location_index(&index);
                self.location_index_settled = true;
                if self.criteria.is_location_filtered() {
                    self.refresh();
                }
            }
            Message::Catalog(CatalogMessage::LocationIndexFailed(kind)) => {
                warn!("Location index unavailable ({kind:?}); location filters match nothing");
                self.location_index_settled = true;
            }
            Message::Enrichment(message) => self.apply_enrichment(message),
        }
    }

    fn apply_enrichment(&mut self, message: EnrichmentMessage) {
        let ticket = message.ticket();
        if !self.is_attached(ticket) {
            debug!(
                "Dropping stale enrichment event for artist {} generation {}",
                ticket.artist_id, ticket.generation
            );
            return;
        }
        let Some(detail) = self.detail.as_mut() else {
            return;
        };
        match message {
            EnrichmentMessage::RelationLoaded {
                locations,
                concert_count,
                ..
            } => {
                self.sink
                    .show_relation(ticket.artist_id, &locations, concert_count);
                detail.locations = locations;
                detail.concert_count = Some(concert_count);
            }
            EnrichmentMessage::RelationFailed { error_kind, .. } => {
                self.sink.show_relation_error(ticket.artist_id, error_kind);
                detail.relation_error = Some(error_kind);
            }
            EnrichmentMessage::LocationEnriched(outcome) => {
                self.sink.show_location(&outcome);
                detail
                    .outcomes
                    .insert(outcome.location_key.clone(), outcome);
            }
        }
    }

    /// Skipped messages cannot be replayed: the attached view stops waiting for
    /// them and the location index is no longer awaited.
    fn note_lag(&mut self, skipped: u64) {
        warn!("Session bus lagged; {skipped} messages skipped");
        self.location_index_settled = true;
        if let Some(detail) = self.detail.as_mut().filter(|detail| !detail.is_complete()) {
            warn!(
                "Detail for artist {} is missing outcomes; re-open it to retry",
                detail.ticket.artist_id
            );
            detail.events_lost = true;
        }
    }

    /// Applies every queued message without blocking; returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.bus_consumer.try_recv() {
                Ok(message) => {
                    self.handle_message(message);
                    handled += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return handled,
                Err(TryRecvError::Lagged(skipped)) => self.note_lag(skipped),
            }
        }
    }

    /// Blocks on the bus until `done` holds or the bus closes.
    pub fn run_until<F>(&mut self, mut done: F)
    where
        F: FnMut(&Self) -> bool,
    {
        while !done(self) {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => self.handle_message(message),
                Err(RecvError::Lagged(skipped)) => self.note_lag(skipped),
                Err(RecvError::Closed) => break,
            }
        }
    }

    /// Starts the blocking event loop; returns when every sender is gone.
    pub fn run(&mut self) {
        self.run_until(|_| false);
    }
}
