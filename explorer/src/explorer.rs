use std::time::Duration;

use shared::{
    Camera, Destination, LocationSnapshot, NavigationSnapshot, NavigationStatus, Route,
    SearchResult, SearchSnapshot, SessionSnapshot,
};

use crate::{
    catalog::QuestCatalog,
    config::ExplorerConfig,
    error::ServiceError,
    fog::{FogFrame, FogOverlay, VisitedPath},
    location::{LocationTracker, PositionUpdate},
    navigation::{NavigationError, NavigationSession, RouteOutcome, RouteTicket},
    progression::{ProgressionSink, QuestEvent},
    proximity::{CompletionError, ProximityIndexer},
    search::{SearchResolver, SearchTicket},
    viewport::{MapEngine, MapViewport, Marker, MarkerKind, FOG_LAYER},
};

const DESTINATION_MARKER: &str = "destination";

/// The whole exploration session: one owner, explicit mutators.
pub struct Explorer<E> {
    viewport: MapViewport<E>,
    fog: FogOverlay,
    tracker: LocationTracker,
    proximity: ProximityIndexer,
    catalog: QuestCatalog,
    search: SearchResolver,
    navigation: NavigationSession,
    sink: Box<dyn ProgressionSink>,
    search_debounce: Duration,
}

impl<E: MapEngine> Explorer<E> {
    pub fn new(
        config: &ExplorerConfig,
        engine: E,
        catalog: QuestCatalog,
        sink: Box<dyn ProgressionSink>,
    ) -> Self {
        let mut viewport = MapViewport::new(engine, config.camera, config.tiles.clone());
        viewport.attach_overlay(FOG_LAYER);
        let mut fog = FogOverlay::new(config.fog, config.camera.center);
        fog.redraw(viewport.size(), |p| viewport.project(p));

        let mut tracker = LocationTracker::new();
        tracker.activate();

        tracing::info!(
            "explorer ready: {} quest(s), threshold {}°",
            catalog.len(),
            config.proximity_threshold
        );

        Self {
            viewport,
            fog,
            tracker,
            proximity: ProximityIndexer::new(config.proximity_threshold),
            catalog,
            search: SearchResolver::new(config.search_min_chars),
            navigation: NavigationSession::new(config.arrival_radius_m),
            sink,
            search_debounce: config.search_debounce,
        }
    }

    fn redraw_fog(&mut self) {
        let viewport = &self.viewport;
        self.fog.camera_changed(viewport.size(), |p| viewport.project(p));
    }

    pub fn map_loaded(&mut self) {
        self.viewport.on_load();
        self.redraw_fog();
    }

    pub fn camera_changed(&mut self, camera: Camera, user_initiated: bool) {
        self.viewport.sync_camera(camera);
        if user_initiated {
            self.navigation.user_panned();
        }
        self.redraw_fog();
    }

    pub fn resized(&mut self, width: u32, height: u32) {
        self.viewport.resize(width, height);
        self.redraw_fog();
    }

    pub fn position_update(&mut self, update: PositionUpdate) {
        let Some(fix) = self.tracker.apply(update) else {
            if !self.tracker.can_navigate() {
                tracing::debug!("navigation start disabled: {:?}", self.tracker.status());
            }
            return;
        };

        let viewport = &self.viewport;
        self.fog
            .record(fix.point, viewport.size(), |p| viewport.project(p));

        for quest in self.proximity.check(&fix, self.catalog.quests()) {
            self.viewport.place_marker(Marker {
                id: quest.id.clone(),
                point: quest.point(),
                label: quest.name.clone(),
                kind: MarkerKind::Quest,
            });
            self.sink.report(QuestEvent::Discovered {
                quest_id: quest.id,
                name: quest.name,
                at: fix.point,
            });
        }

        if self.navigation.on_position(fix.point) {
            self.viewport.follow(&fix);
            self.redraw_fog();
        }
    }

    pub fn search_input(&mut self, query: &str) -> Option<SearchTicket> {
        self.navigation.begin_search();
        self.search.input(query)
    }

    pub fn search_debounced(&self, token: u64) -> Option<String> {
        self.search.debounce_elapsed(token)
    }

    pub fn search_resolved(&mut self, token: u64, result: Result<Vec<SearchResult>, ServiceError>) {
        self.search.resolve(token, result);
    }

    /// Hand the `index`-th search candidate to the navigation session.
    pub fn select_search_result(&mut self, index: usize) -> Result<bool, NavigationError> {
        let Some(result) = self.search.select(index).cloned() else {
            return Ok(false);
        };
        self.select_destination(Destination {
            point: result.point(),
            label: Some(result.display_name),
        })?;
        self.search.clear();
        Ok(true)
    }

    pub fn select_destination(&mut self, destination: Destination) -> Result<(), NavigationError> {
        let label = destination.label.clone().unwrap_or_else(|| "Destination".into());
        let point = self.navigation.select_destination(destination)?;
        self.viewport.clear_route();
        self.viewport.place_marker(Marker {
            id: DESTINATION_MARKER.into(),
            point,
            label,
            kind: MarkerKind::Destination,
        });
        self.viewport.fly_to(point);
        self.redraw_fog();
        Ok(())
    }

    /// Returns the route request to issue. No ticket is produced without a known origin.
    pub fn start_navigation(&mut self) -> Result<RouteTicket, NavigationError> {
        if !self.tracker.can_navigate() {
            return Err(NavigationError::LocationUnknown);
        }
        let ticket = self.navigation.start(self.tracker.current_location())?;
        tracing::info!(
            "requesting route #{} from {:.5},{:.5}",
            ticket.token,
            ticket.origin.lat,
            ticket.origin.lng
        );
        Ok(ticket)
    }

    pub fn route_resolved(
        &mut self,
        token: u64,
        result: Result<Route, ServiceError>,
    ) -> RouteOutcome {
        let outcome = self.navigation.route_resolved(token, result);
        match &outcome {
            RouteOutcome::Applied => {
                if let Some(route) = self.navigation.route() {
                    self.viewport.draw_route(route);
                }
                if let Some(fix) = self.tracker.last_fix().copied() {
                    self.viewport.follow(&fix);
                }
                self.redraw_fog();
            }
            RouteOutcome::Failed(_) => self.viewport.clear_route(),
            RouteOutcome::Stale => {}
        }
        outcome
    }

    pub fn exit_navigation(&mut self) {
        if self.navigation.exit() {
            self.viewport.clear_route();
            self.viewport.remove_marker(DESTINATION_MARKER);
            self.viewport.reset_overview();
            self.redraw_fog();
        }
        self.search.clear();
    }

    pub fn recenter(&mut self) {
        self.navigation.recenter();
        if self.navigation.status() != NavigationStatus::Navigating {
            return;
        }
        if let Some(fix) = self.tracker.last_fix().copied() {
            self.viewport.follow(&fix);
            self.redraw_fog();
        }
    }

    pub fn complete_quest(&mut self, quest_id: &str) -> Result<bool, CompletionError> {
        let first_time = self.proximity.complete(quest_id, self.catalog.quests())?;
        if first_time {
            let xp = self.catalog.get(quest_id).and_then(|quest| quest.xp);
            self.sink.report(QuestEvent::Completed {
                quest_id: quest_id.to_string(),
                xp,
            });
        }
        Ok(first_time)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let fix = self.tracker.last_fix();
        let navigation = &self.navigation;
        SessionSnapshot {
            camera: self.viewport.camera(),
            attribution: self.viewport.attribution().to_string(),
            location: LocationSnapshot {
                status: self.tracker.status(),
                position: fix.map(|f| f.point),
                heading: fix.and_then(|f| f.heading),
                accuracy: fix.and_then(|f| f.accuracy),
            },
            visited_count: self.fog.path().len(),
            visible_holes: self.fog.visible_holes(),
            discovered: self.proximity.discovered().to_vec(),
            completed: self.proximity.completed().to_vec(),
            search: SearchSnapshot {
                query: self.search.query().to_string(),
                pending: self.search.is_pending(),
                results: self.search.results().to_vec(),
            },
            navigation: NavigationSnapshot {
                status: navigation.status(),
                destination: navigation.destination().cloned(),
                route: navigation.route().cloned(),
                current_step_index: navigation.current_step_index(),
                follow_camera: navigation.follow_camera(),
                route_pending: navigation.is_route_pending(),
                next_step: navigation.step_view(),
                remaining_km: navigation.remaining_km(),
                issue: navigation.issue().cloned(),
                can_start: navigation.status() == NavigationStatus::Previewing
                    && self.tracker.can_navigate(),
            },
        }
    }

    pub fn search_debounce(&self) -> Duration {
        self.search_debounce
    }

    pub fn fog_frame(&self) -> &FogFrame {
        self.fog.frame()
    }

    pub fn visited_path(&self) -> &VisitedPath {
        self.fog.path()
    }

    pub fn fog(&self) -> &FogOverlay {
        &self.fog
    }

    pub fn viewport(&self) -> &MapViewport<E> {
        &self.viewport
    }

    pub fn navigation(&self) -> &NavigationSession {
        &self.navigation
    }

    pub fn proximity(&self) -> &ProximityIndexer {
        &self.proximity
    }

    pub fn tracker(&self) -> &LocationTracker {
        &self.tracker
    }

    pub fn catalog(&self) -> &QuestCatalog {
        &self.catalog
    }
}
