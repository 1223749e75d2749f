pub mod enrichment_coordinator;
pub mod geo_resolver;
pub mod relation_cache;
pub mod tile_fetcher;
