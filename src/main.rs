use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn, LevelFilter};
use tokio::sync::broadcast;

use tourmap::catalog::catalog_client::CatalogClient;
use tourmap::catalog::models::ArtistRecord;
use tourmap::catalog::query_engine::{MemberBucket, QueryCriteria, QueryEngine, SortKey, YearRange};
use tourmap::catalog::spawn_location_index_fetch;
use tourmap::config_persistence::{default_config_path, load_or_create_config};
use tourmap::enrichment::enrichment_coordinator::{EnrichmentCoordinator, EnrichmentSettings};
use tourmap::enrichment::geo_resolver::GeoResolver;
use tourmap::enrichment::relation_cache::RelationCache;
use tourmap::enrichment::tile_fetcher::TileFetcher;
use tourmap::error::FetchErrorKind;
use tourmap::favorites_store::FavoritesStore;
use tourmap::http_client::ServiceClient;
use tourmap::links::{osm_marker_url, osm_search_url, streaming_url, StreamingService};
use tourmap::protocol::{LocationEnrichment, LocationSummary, Message};
use tourmap::session::{DisplaySink, Session};

const BUS_CAPACITY: usize = 1024;

#[derive(Parser, Debug)]
#[command(name = "tourmap", version, about = "Browse artists and map their concert locations")]
struct Args {
    /// Config file; defaults to the platform config directory
    #[arg(long)]
    config: Option<PathBuf>,
    /// Case-insensitive name or member substring
    #[arg(long, default_value = "")]
    search: String,
    /// Case-insensitive concert location substring
    #[arg(long, default_value = "")]
    location: String,
    /// name, name-desc, creation[-desc], first-release[-desc]
    #[arg(long, default_value = "name")]
    sort: SortKey,
    #[arg(long)]
    created_from: Option<i32>,
    #[arg(long)]
    created_to: Option<i32>,
    #[arg(long)]
    first_release_from: Option<i32>,
    #[arg(long)]
    first_release_to: Option<i32>,
    /// Member-count buckets, 1 to 7 or 8+; repeatable
    #[arg(long = "members")]
    member_buckets: Vec<MemberBucket>,
    #[arg(long)]
    favorites_only: bool,
    /// Toggle this artist's favorite flag before querying
    #[arg(long)]
    toggle_favorite: Option<u32>,
    /// Open the detail view for this artist and enrich its concert locations
    #[arg(long)]
    artist: Option<u32>,
}

impl Args {
    fn criteria(&self) -> QueryCriteria {
        QueryCriteria {
            search: self.search.clone(),
            creation_years: YearRange {
                min: self.created_from,
                max: self.created_to,
            },
            first_release_years: YearRange {
                min: self.first_release_from,
                max: self.first_release_to,
            },
            member_buckets: self.member_buckets.iter().copied().collect(),
            favorites_only: self.favorites_only,
            location: self.location.clone(),
            sort: self.sort,
        }
    }
}

/// Prints the view to stdout; enrichment progress goes to the log.
struct ConsoleSink {
    engine: Arc<QueryEngine>,
}

impl DisplaySink for ConsoleSink {
    fn show_results(&mut self, results: &[ArtistRecord]) {
        println!("{} artists", results.len());
        for artist in results {
            let star = if self.engine.favorites().is_favorite(artist.id) {
                "*"
            } else {
                " "
            };
            println!(
                "{star} {:>4}  {:<32} {:>4}  {}  {} members",
                artist.id,
                artist.name,
                artist.creation_year,
                artist.first_release_date,
                artist.member_count()
            );
        }
    }

    fn show_relation(&mut self, artist_id: u32, locations: &[LocationSummary], concert_count: usize) {
        if let Some(artist) = self.engine.artist(artist_id) {
            println!("\n{} ({} concerts)", artist.name, concert_count);
            for service in StreamingService::ALL {
                println!("  {:<8} {}", service.label(), streaming_url(&artist, service));
            }
        }
        for location in locations {
            println!("  {}: {}", location.label, location.dates.join(", "));
        }
    }

    fn show_relation_error(&mut self, artist_id: u32, error_kind: FetchErrorKind) {
        error!("Concerts for artist {artist_id} unavailable: {error_kind:?}");
    }

    fn show_location(&mut self, outcome: &LocationEnrichment) {
        match (outcome.coordinate, &outcome.tile_bytes) {
            (Some(coordinate), Some(tile)) => info!(
                "{}: {} ({} byte tile)",
                outcome.label,
                osm_marker_url(coordinate),
                tile.len()
            ),
            (Some(coordinate), None) => warn!(
                "{}: {} (no tile: {:?})",
                outcome.label,
                osm_marker_url(coordinate),
                outcome.error_kind
            ),
            (None, _) => warn!(
                "{}: not located ({:?}); {}",
                outcome.label,
                outcome.error_kind,
                osm_search_url(&outcome.label)
            ),
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, LevelFilter::Debug);
    clog.init();

    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config = load_or_create_config(&config_path);

    let http = ServiceClient::new(
        config.services.user_agent.clone(),
        config.services.request_timeout(),
    );
    let catalog_client = CatalogClient::new(http.clone(), config.services.catalog_base_url.clone());
    let catalog = catalog_client.fetch_all().map_err(|err| {
        error!("Catalog download failed: {err}");
        err
    })?;
    info!("Catalog loaded: {} artists", catalog.len());

    let favorites = Arc::new(FavoritesStore::open(config.storage.favorites_path.clone()));
    let engine = Arc::new(QueryEngine::new(catalog, Arc::clone(&favorites)));

    let (bus_sender, bus_receiver) = broadcast::channel::<Message>(BUS_CAPACITY);
    spawn_location_index_fetch(catalog_client.clone(), bus_sender.clone());

    let coordinator = EnrichmentCoordinator::new(
        Arc::new(RelationCache::new(Arc::new(catalog_client))),
        Arc::new(GeoResolver::new(
            http.clone(),
            config.services.geocoder_base_url.clone(),
            config.enrichment.geocode_cache,
        )),
        Arc::new(TileFetcher::new(http, config.services.tile_base_url.clone())),
        EnrichmentSettings {
            tile_zoom: config.enrichment.tile_zoom,
            stagger_interval: config.enrichment.stagger_interval(),
        },
        bus_sender,
    );

    let sink = ConsoleSink {
        engine: Arc::clone(&engine),
    };
    let mut session = Session::new(bus_receiver, engine, coordinator, sink);

    if let Some(artist_id) = args.toggle_favorite {
        let now_favorite = session.toggle_favorite(artist_id);
        info!("Artist {artist_id} favorite: {now_favorite}");
    }

    let criteria = args.criteria();
    let wait_for_index = criteria.is_location_filtered();
    session.set_criteria(criteria);
    if wait_for_index {
        // Location filters only match once the bulk index has been merged.
        session.run_until(|session| session.location_index_settled());
    }

    if let Some(artist_id) = args.artist {
        session.open_detail(artist_id);
        session.run_until(|session| {
            session
                .detail()
                .map_or(true, |detail| detail.is_complete())
        });
    }

    // Pending favorite saves run on background threads.
    favorites.flush();
    Ok(())
}
