use std::{env, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use shared::GeoPoint;

use crate::error::ConfigError;

/// Hampi, Karnataka.
pub const DEFAULT_CENTER: GeoPoint = GeoPoint::new(15.3350, 76.4600);
pub const OSM_TILE_URL: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";
pub const OSM_ATTRIBUTION: &str = "© OpenStreetMap contributors";
pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
pub const OSRM_URL: &str = "https://router.project-osrm.org";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogStyle {
    /// Opacity of untouched fog, `0.0..=1.0`.
    pub alpha: f32,
    /// Radius in px that is cleared completely.
    pub inner_radius: f64,
    /// Radius in px where the reveal has faded back to full fog.
    pub outer_radius: f64,
}

impl Default for FogStyle {
    fn default() -> Self {
        Self {
            alpha: 0.85,
            inner_radius: 50.0,
            outer_radius: 150.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraDefaults {
    pub center: GeoPoint,
    pub overview_zoom: f64,
    pub preview_zoom: f64,
    pub follow_zoom: f64,
    pub follow_pitch: f64,
}

impl Default for CameraDefaults {
    fn default() -> Self {
        Self {
            center: DEFAULT_CENTER,
            overview_zoom: 13.0,
            preview_zoom: 15.0,
            follow_zoom: 17.0,
            follow_pitch: 60.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TileSource {
    pub url_template: String,
    pub attribution: String,
}

impl Default for TileSource {
    fn default() -> Self {
        Self {
            url_template: OSM_TILE_URL.into(),
            attribution: OSM_ATTRIBUTION.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExplorerConfig {
    pub tiles: TileSource,
    pub geocoder_url: String,
    pub router_url: String,
    pub user_agent: String,
    pub http_timeout: Duration,
    pub search_debounce: Duration,
    pub search_min_chars: usize,
    pub search_limit: usize,
    /// Half-width, in degrees, of the box a quest must fall into.
    pub proximity_threshold: f64,
    pub arrival_radius_m: f64,
    pub fog: FogStyle,
    pub camera: CameraDefaults,
    pub viewport: (u32, u32),
    pub quests_path: Option<PathBuf>,
    pub bind: SocketAddr,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            tiles: TileSource::default(),
            geocoder_url: NOMINATIM_URL.into(),
            router_url: OSRM_URL.into(),
            user_agent: concat!("explorer/", env!("CARGO_PKG_VERSION")).into(),
            http_timeout: Duration::from_secs(10),
            search_debounce: Duration::from_millis(400),
            search_min_chars: 3,
            search_limit: 8,
            proximity_threshold: 0.005,
            arrival_radius_m: 25.0,
            fog: FogStyle::default(),
            camera: CameraDefaults::default(),
            viewport: (1280, 800),
            quests_path: None,
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl ExplorerConfig {
    /// Defaults overridden by `EXPLORER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(url) = env::var("EXPLORER_TILE_URL") {
            config.tiles.url_template = url;
        }
        if let Ok(url) = env::var("EXPLORER_GEOCODER_URL") {
            config.geocoder_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(url) = env::var("EXPLORER_ROUTER_URL") {
            config.router_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(path) = env::var("EXPLORER_QUESTS") {
            config.quests_path = Some(PathBuf::from(path));
        }
        if let Some(bind) = parse_var("EXPLORER_BIND")? {
            config.bind = bind;
        }
        if let Some(threshold) = parse_var::<f64>("EXPLORER_PROXIMITY_THRESHOLD")? {
            if !(threshold.is_finite() && threshold > 0.0) {
                return Err(ConfigError::Invalid {
                    key: "EXPLORER_PROXIMITY_THRESHOLD",
                    value: threshold.to_string(),
                });
            }
            config.proximity_threshold = threshold;
        }
        if let Some(secs) = parse_var::<u64>("EXPLORER_HTTP_TIMEOUT_SECS")? {
            config.http_timeout = Duration::from_secs(secs.max(1));
        }
        Ok(config)
    }

    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.http_timeout)
            .user_agent(self.user_agent.clone())
            .build()
    }
}

fn parse_var<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(None),
    }
}
