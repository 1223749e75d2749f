//! Catalog data: remote client, records, local entries and the query engine.

pub mod catalog_client;
pub mod local_entry;
pub mod models;
pub mod query_engine;

use std::sync::Arc;
use std::thread;

use log::warn;
use tokio::sync::broadcast::Sender;

use crate::catalog::catalog_client::CatalogClient;
use crate::protocol::{CatalogMessage, Message};

/// Downloads the bulk location index off-thread and posts it to the bus.
pub fn spawn_location_index_fetch(client: CatalogClient, bus_producer: Sender<Message>) {
    thread::spawn(move || {
        let message = match client.fetch_location_index() {
            Ok(index) => CatalogMessage::LocationIndexFetched(Arc::new(index)),
            Err(error) => {
                warn!("Location index fetch failed; location filters stay empty: {error}");
                CatalogMessage::LocationIndexFailed(error.kind())
            }
        };
        let _ = bus_producer.send(Message::Catalog(message));
    });
}
