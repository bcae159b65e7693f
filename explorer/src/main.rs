use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use explorer::{
    attach_position_source, catalog::QuestCatalog, create_router, gpx_export::visited_path_gpx,
    location::SimulatedWalk, progression::LogSink, routing::OsrmRouter, search::NominatimGeocoder,
    spawn, viewport::HeadlessMap, AppState, Explorer, ExplorerConfig, Services,
};
use shared::{Camera, Destination, GeoPoint};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(author, version, about = "Fog-of-war explorer with quest discovery and turn-by-turn navigation")]
struct Args {
    /// Quest catalog JSON; the bundled Hampi catalog is used when omitted
    #[arg(long, global = true)]
    quests: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API for a map host
    Serve {
        #[arg(long)]
        bind: Option<std::net::SocketAddr>,
    },
    /// Walk through every quest with a simulated position source
    Simulate {
        /// Delay between simulated fixes
        #[arg(long, default_value_t = 200)]
        tick_ms: u64,
        /// Fixes interpolated between two quests
        #[arg(long, default_value_t = 12)]
        steps_per_leg: usize,
        /// Write the visited path as GPX here
        #[arg(long)]
        gpx: Option<PathBuf>,
        /// Start navigation towards `lat,lng` once the walk has a fix
        #[arg(long, value_parser = parse_point)]
        navigate_to: Option<GeoPoint>,
    },
}

fn parse_point(raw: &str) -> Result<GeoPoint, String> {
    let (lat, lng) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected lat,lng, got {raw:?}"))?;
    let lat: f64 = lat.trim().parse().map_err(|err| format!("bad latitude: {err}"))?;
    let lng: f64 = lng.trim().parse().map_err(|err| format!("bad longitude: {err}"))?;
    let point = GeoPoint::new(lat, lng);
    if !point.is_finite() {
        return Err(format!("non-finite coordinate {raw:?}"));
    }
    Ok(point)
}

fn build_explorer(config: &ExplorerConfig) -> Result<Explorer<HeadlessMap>, Box<dyn std::error::Error>> {
    let catalog = match &config.quests_path {
        Some(path) => {
            tracing::info!("loading quests from {}", path.display());
            QuestCatalog::from_file(path)?
        }
        None => QuestCatalog::bundled()?,
    };
    let (width, height) = config.viewport;
    let engine = HeadlessMap::new(
        Camera {
            center: config.camera.center,
            zoom: config.camera.overview_zoom,
            pitch: 0.0,
            bearing: 0.0,
        },
        width,
        height,
    );
    Ok(Explorer::new(config, engine, catalog, Box::new(LogSink)))
}

fn build_services(config: &ExplorerConfig) -> reqwest::Result<Services> {
    let client = config.http_client()?;
    Ok(Services {
        geocoder: Arc::new(NominatimGeocoder::new(
            client.clone(),
            &config.geocoder_url,
            config.search_limit,
        )),
        router: Arc::new(OsrmRouter::new(client, &config.router_url)),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "explorer=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = ExplorerConfig::from_env()?;
    if args.quests.is_some() {
        config.quests_path = args.quests;
    }

    match args.command {
        Command::Serve { bind } => serve(config, bind).await,
        Command::Simulate {
            tick_ms,
            steps_per_leg,
            gpx,
            navigate_to,
        } => simulate(config, tick_ms, steps_per_leg, gpx, navigate_to).await,
    }
}

async fn serve(
    mut config: ExplorerConfig,
    bind: Option<std::net::SocketAddr>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(bind) = bind {
        config.bind = bind;
    }
    let explorer = build_explorer(&config)?;
    let (handle, _event_loop) = spawn(explorer, build_services(&config)?);

    let app = create_router(AppState { explorer: handle });
    tracing::info!("starting explorer on http://{}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn simulate(
    config: ExplorerConfig,
    tick_ms: u64,
    steps_per_leg: usize,
    gpx: Option<PathBuf>,
    navigate_to: Option<GeoPoint>,
) -> Result<(), Box<dyn std::error::Error>> {
    let explorer = build_explorer(&config)?;
    let mut waypoints = vec![config.camera.center];
    waypoints.extend(explorer.catalog().quests().iter().map(|quest| quest.point()));

    let walk = SimulatedWalk::through(&waypoints, steps_per_leg, Duration::from_millis(tick_ms));
    tracing::info!(
        "simulating {} fix(es) through {} waypoint(s) over {:?}",
        walk.points().len(),
        waypoints.len(),
        walk.duration()
    );

    let (handle, event_loop) = spawn(explorer, build_services(&config)?);
    let subscription = attach_position_source(&handle, &walk);

    if let Some(point) = navigate_to {
        handle
            .select_destination(Destination {
                point,
                label: Some("Simulated destination".into()),
            })
            .await?;
        // Wait for the first fix so navigation has an origin.
        tokio::time::sleep(Duration::from_millis(tick_ms * 2)).await;
        if let Err(err) = handle.start_navigation().await {
            tracing::warn!("navigation not started: {err}");
        }
    }

    tokio::time::sleep(walk.duration() + Duration::from_millis(tick_ms)).await;
    drop(subscription);

    let snapshot = handle.snapshot().await?;
    tracing::info!(
        "walk finished: {} point(s) visited, discovered {:?}, navigation {:?}",
        snapshot.visited_count,
        snapshot.discovered,
        snapshot.navigation.status
    );

    if let Some(path) = gpx {
        let points = handle.visited_path().await?;
        std::fs::write(&path, visited_path_gpx(&points)?)?;
        tracing::info!("wrote visited path to {}", path.display());
    }

    drop(handle);
    event_loop.await?;
    Ok(())
}
