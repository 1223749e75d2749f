//! Artist catalog browser with concert-location enrichment.

pub mod catalog;
pub mod config;
pub mod config_persistence;
pub mod enrichment;
pub mod error;
pub mod favorites_store;
pub mod http_client;
pub mod links;
pub mod protocol;
pub mod session;
