use geo_types::{Coord, LineString};
use shared::{Camera, GeoPoint, Route};

use crate::{
    config::{CameraDefaults, TileSource},
    geo::{mercator_world, ScreenPoint},
    location::PositionFix,
};

pub const FOG_LAYER: &str = "fog";

/// Largest accepted viewport side in pixels. The fog frame is allocated at full size.
pub const MAX_VIEWPORT_SIDE: u32 = 8192;

fn clamp_side(side: u32) -> u32 {
    side.clamp(1, MAX_VIEWPORT_SIDE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Quest,
    Destination,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: String,
    pub point: GeoPoint,
    pub label: String,
    pub kind: MarkerKind,
}

/// Capabilities the explorer needs from a map renderer (MapLibre in the browser,
/// [`HeadlessMap`] on the server and in tests).
///
/// Engine events (load, move, zoom, resize) are not callbacks here: the host feeds
/// them into the event loop as messages, so they are serialized with everything else.
pub trait MapEngine: Send {
    fn camera(&self) -> Camera;
    fn jump_to(&mut self, camera: Camera);
    /// Animated camera move. Engines without animation jump.
    fn ease_to(&mut self, camera: Camera) {
        self.jump_to(camera);
    }
    fn project(&self, point: GeoPoint) -> ScreenPoint;
    fn size(&self) -> (u32, u32);
    fn resize(&mut self, width: u32, height: u32);
    fn add_overlay_layer(&mut self, id: &str);
    fn set_route_line(&mut self, line: &LineString<f64>);
    fn place_marker(&mut self, marker: Marker);
    fn remove_marker(&mut self, id: &str);
}

/// Web Mercator camera without a renderer. Pitch is stored but not applied to
/// the projection.
#[derive(Debug, Clone)]
pub struct HeadlessMap {
    camera: Camera,
    width: u32,
    height: u32,
    overlays: Vec<String>,
    route_line: LineString<f64>,
    markers: Vec<Marker>,
}

impl HeadlessMap {
    pub fn new(camera: Camera, width: u32, height: u32) -> Self {
        Self {
            camera,
            width: clamp_side(width),
            height: clamp_side(height),
            overlays: Vec::new(),
            route_line: LineString::new(Vec::new()),
            markers: Vec::new(),
        }
    }

    pub fn overlays(&self) -> &[String] {
        &self.overlays
    }

    pub fn route_line(&self) -> &LineString<f64> {
        &self.route_line
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }
}

impl MapEngine for HeadlessMap {
    fn camera(&self) -> Camera {
        self.camera
    }

    fn jump_to(&mut self, camera: Camera) {
        self.camera = camera;
    }

    fn project(&self, point: GeoPoint) -> ScreenPoint {
        let (px, py) = mercator_world(point, self.camera.zoom);
        let (cx, cy) = mercator_world(self.camera.center, self.camera.zoom);
        let (dx, dy) = (px - cx, py - cy);
        let (sin, cos) = self.camera.bearing.to_radians().sin_cos();
        ScreenPoint {
            x: dx * cos + dy * sin + self.width as f64 / 2.0,
            y: -dx * sin + dy * cos + self.height as f64 / 2.0,
        }
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = clamp_side(width);
        self.height = clamp_side(height);
    }

    fn add_overlay_layer(&mut self, id: &str) {
        if !self.overlays.iter().any(|existing| existing == id) {
            self.overlays.push(id.to_string());
        }
    }

    fn set_route_line(&mut self, line: &LineString<f64>) {
        self.route_line = line.clone();
    }

    fn place_marker(&mut self, marker: Marker) {
        self.markers.retain(|existing| existing.id != marker.id);
        self.markers.push(marker);
    }

    fn remove_marker(&mut self, id: &str) {
        self.markers.retain(|existing| existing.id != id);
    }
}

/// Owns the camera and translates explorer intents into engine calls.
#[derive(Debug)]
pub struct MapViewport<E> {
    engine: E,
    defaults: CameraDefaults,
    tiles: TileSource,
    loaded: bool,
}

impl<E: MapEngine> MapViewport<E> {
    pub fn new(mut engine: E, defaults: CameraDefaults, tiles: TileSource) -> Self {
        engine.jump_to(Camera {
            center: defaults.center,
            zoom: defaults.overview_zoom,
            pitch: 0.0,
            bearing: 0.0,
        });
        Self {
            engine,
            defaults,
            tiles,
            loaded: false,
        }
    }

    pub fn on_load(&mut self) {
        self.loaded = true;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn attach_overlay(&mut self, id: &str) {
        self.engine.add_overlay_layer(id);
    }

    pub fn camera(&self) -> Camera {
        self.engine.camera()
    }

    pub fn project(&self, point: GeoPoint) -> ScreenPoint {
        self.engine.project(point)
    }

    pub fn size(&self) -> (u32, u32) {
        self.engine.size()
    }

    pub fn attribution(&self) -> &str {
        &self.tiles.attribution
    }

    pub fn tile_url(&self, z: u32, x: u32, y: u32) -> String {
        self.tiles
            .url_template
            .replace("{z}", &z.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
    }

    /// The host moved the camera (pan, zoom, rotate).
    pub fn sync_camera(&mut self, camera: Camera) {
        self.engine.jump_to(camera);
    }

    /// Each side is clamped to `1..=MAX_VIEWPORT_SIDE` before it reaches the engine.
    pub fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = (clamp_side(width), clamp_side(height));
        if (width, height) != self.size() {
            tracing::debug!("viewport resized to {width}x{height}");
        }
        self.engine.resize(width, height);
    }

    pub fn fly_to(&mut self, point: GeoPoint) {
        self.engine.ease_to(Camera {
            center: point,
            zoom: self.defaults.preview_zoom,
            pitch: 0.0,
            bearing: self.engine.camera().bearing,
        });
    }

    /// Tilted camera tracking position and heading.
    pub fn follow(&mut self, fix: &PositionFix) {
        let bearing = fix.heading.unwrap_or_else(|| self.engine.camera().bearing);
        self.engine.ease_to(Camera {
            center: fix.point,
            zoom: self.defaults.follow_zoom,
            pitch: self.defaults.follow_pitch,
            bearing,
        });
    }

    /// Flat north-up overview at the default zoom, keeping the current center.
    pub fn reset_overview(&mut self) {
        let center = self.engine.camera().center;
        self.engine.ease_to(Camera {
            center,
            zoom: self.defaults.overview_zoom,
            pitch: 0.0,
            bearing: 0.0,
        });
    }

    pub fn draw_route(&mut self, route: &Route) {
        let coords: Vec<Coord<f64>> = route
            .geometry
            .iter()
            .map(|point| Coord {
                x: point.lng,
                y: point.lat,
            })
            .collect();
        self.engine.set_route_line(&LineString::new(coords));
    }

    pub fn clear_route(&mut self) {
        self.engine.set_route_line(&LineString::new(Vec::new()));
    }

    pub fn place_marker(&mut self, marker: Marker) {
        self.engine.place_marker(marker);
    }

    pub fn remove_marker(&mut self, id: &str) {
        self.engine.remove_marker(id);
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> MapViewport<HeadlessMap> {
        let engine = HeadlessMap::new(
            Camera {
                center: GeoPoint::new(0.0, 0.0),
                zoom: 1.0,
                pitch: 0.0,
                bearing: 0.0,
            },
            800,
            600,
        );
        MapViewport::new(engine, CameraDefaults::default(), TileSource::default())
    }

    #[test]
    fn starts_on_default_overview() {
        let viewport = viewport();
        let camera = viewport.camera();
        assert_eq!(camera.center, CameraDefaults::default().center);
        assert_eq!(camera.zoom, CameraDefaults::default().overview_zoom);
        assert_eq!(camera.pitch, 0.0);
    }

    #[test]
    fn center_projects_to_middle_of_screen() {
        let viewport = viewport();
        let screen = viewport.project(viewport.camera().center);
        assert!((screen.x - 400.0).abs() < 1e-6);
        assert!((screen.y - 300.0).abs() < 1e-6);
    }

    #[test]
    fn bearing_rotates_east_to_top() {
        let mut viewport = viewport();
        let mut camera = viewport.camera();
        camera.bearing = 90.0;
        viewport.sync_camera(camera);

        let east = GeoPoint::new(camera.center.lat, camera.center.lng + 0.01);
        let screen = viewport.project(east);
        assert!((screen.x - 400.0).abs() < 1e-6);
        assert!(screen.y < 300.0);
    }

    #[test]
    fn follow_tilts_and_reset_flattens() {
        let mut viewport = viewport();
        let mut fix = PositionFix::at(GeoPoint::new(15.3362, 76.4612));
        fix.heading = Some(45.0);
        viewport.follow(&fix);

        let camera = viewport.camera();
        assert_eq!(camera.center, fix.point);
        assert_eq!(camera.pitch, 60.0);
        assert_eq!(camera.bearing, 45.0);

        viewport.reset_overview();
        let camera = viewport.camera();
        assert_eq!(camera.pitch, 0.0);
        assert_eq!(camera.bearing, 0.0);
        assert_eq!(camera.zoom, 13.0);
    }

    #[test]
    fn route_line_is_drawn_and_cleared() {
        let mut viewport = viewport();
        let route = Route {
            geometry: vec![GeoPoint::new(15.0, 76.0), GeoPoint::new(15.1, 76.1)],
            steps: Vec::new(),
            total_distance_km: 1.0,
            total_duration_min: 2.0,
        };
        viewport.draw_route(&route);
        assert_eq!(viewport.engine().route_line().0.len(), 2);
        assert_eq!(viewport.engine().route_line().0[0], Coord { x: 76.0, y: 15.0 });

        viewport.clear_route();
        assert!(viewport.engine().route_line().0.is_empty());
    }

    #[test]
    fn tile_url_fills_template() {
        let viewport = viewport();
        assert_eq!(
            viewport.tile_url(13, 5834, 3762),
            "https://tile.openstreetmap.org/13/5834/3762.png"
        );
        assert!(viewport.attribution().contains("OpenStreetMap"));
    }

    #[test]
    fn resize_keeps_each_side_within_bounds() {
        let mut viewport = viewport();
        viewport.resize(u32::MAX, u32::MAX);
        assert_eq!(viewport.size(), (MAX_VIEWPORT_SIDE, MAX_VIEWPORT_SIDE));

        viewport.resize(0, 480);
        assert_eq!(viewport.size(), (1, 480));

        viewport.resize(640, 480);
        assert_eq!(viewport.size(), (640, 480));
        let screen = viewport.project(viewport.camera().center);
        assert!((screen.x - 320.0).abs() < 1e-6);
    }
}
