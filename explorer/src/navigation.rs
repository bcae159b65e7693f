//! Navigation session state machine.
//!
//! ```text
//! Idle ──begin_search──▶ Searching ──select_destination──▶ Previewing ──route ok──▶ Navigating
//!  ▲                                                          │  ▲                       │
//!  └──────────────────────────── exit ────────────────────────┘  └── route failed        │
//!  ▲                                                                                     │
//!  └──────────────────────────────────────── exit ───────────────────────────────────────┘
//! ```
//!
//! `start()` hands out a [`RouteTicket`]; the session only becomes `Navigating` when
//! the response for that exact ticket arrives with a route. Every transition that
//! invalidates a destination bumps the generation, so late responses are dropped.

use shared::{
    Destination, GeoPoint, NavigationIssue, NavigationStatus, Route, RouteStep, StepView, TurnIcon,
};

use crate::{
    error::ServiceError,
    geo::{haversine_km, haversine_m},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    #[error("current location is unknown")]
    LocationUnknown,
    #[error("no destination selected")]
    NoDestination,
    #[error("cannot {action} while {status:?}")]
    InvalidTransition {
        action: &'static str,
        status: NavigationStatus,
    },
}

/// Everything needed to issue one route request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteTicket {
    pub token: u64,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Applied,
    Failed(NavigationIssue),
    Stale,
}

/// Icon for a maneuver modifier such as `"slight left"` or `"sharp right"`.
pub fn turn_icon(modifier: Option<&str>) -> TurnIcon {
    match modifier {
        Some(m) if m.contains("left") => TurnIcon::Left,
        Some(m) if m.contains("right") => TurnIcon::Right,
        _ => TurnIcon::Straight,
    }
}

#[derive(Debug, Clone)]
pub struct NavigationSession {
    status: NavigationStatus,
    destination: Option<Destination>,
    route: Option<Route>,
    current_step: usize,
    follow_camera: bool,
    generation: u64,
    pending: Option<u64>,
    issue: Option<NavigationIssue>,
    last_position: Option<GeoPoint>,
    arrival_radius_m: f64,
}

impl NavigationSession {
    pub fn new(arrival_radius_m: f64) -> Self {
        Self {
            status: NavigationStatus::Idle,
            destination: None,
            route: None,
            current_step: 0,
            follow_camera: false,
            generation: 0,
            pending: None,
            issue: None,
            last_position: None,
            arrival_radius_m,
        }
    }

    pub fn begin_search(&mut self) {
        if self.status == NavigationStatus::Idle {
            self.status = NavigationStatus::Searching;
        }
    }

    pub fn select_destination(&mut self, destination: Destination) -> Result<GeoPoint, NavigationError> {
        match self.status {
            NavigationStatus::Idle | NavigationStatus::Searching | NavigationStatus::Previewing => {}
            status => {
                return Err(NavigationError::InvalidTransition {
                    action: "select a destination",
                    status,
                })
            }
        }
        let point = destination.point;
        self.reset_route();
        self.destination = Some(destination);
        self.status = NavigationStatus::Previewing;
        tracing::info!("previewing destination {:.5},{:.5}", point.lat, point.lng);
        Ok(point)
    }

    /// Request a route from `origin`. The session stays in `Previewing` until
    /// [`route_resolved`](Self::route_resolved) accepts a route for the returned ticket.
    pub fn start(&mut self, origin: Option<GeoPoint>) -> Result<RouteTicket, NavigationError> {
        if self.status != NavigationStatus::Previewing {
            return Err(NavigationError::InvalidTransition {
                action: "start navigation",
                status: self.status,
            });
        }
        let destination = self
            .destination
            .as_ref()
            .map(|d| d.point)
            .ok_or(NavigationError::NoDestination)?;
        let origin = origin.ok_or(NavigationError::LocationUnknown)?;

        self.generation += 1;
        self.pending = Some(self.generation);
        self.issue = None;
        Ok(RouteTicket {
            token: self.generation,
            origin,
            destination,
        })
    }

    pub fn route_resolved(&mut self, token: u64, result: Result<Route, ServiceError>) -> RouteOutcome {
        if self.pending != Some(token) || self.status != NavigationStatus::Previewing {
            tracing::warn!("discarding route response for superseded request {token}");
            return RouteOutcome::Stale;
        }
        self.pending = None;
        match result {
            Ok(route) => {
                tracing::info!(
                    "route ready: {:.2} km, {:.0} min, {} step(s)",
                    route.total_distance_km,
                    route.total_duration_min,
                    route.steps.len()
                );
                self.route = Some(route);
                self.current_step = 0;
                self.follow_camera = true;
                self.status = NavigationStatus::Navigating;
                if let Some(position) = self.last_position {
                    self.advance(position);
                }
                RouteOutcome::Applied
            }
            Err(err) => {
                let issue = match err {
                    ServiceError::NotFound => NavigationIssue::NoRoute,
                    ServiceError::Malformed(ref detail) => {
                        tracing::error!("malformed routing response: {detail}");
                        NavigationIssue::Network {
                            message: err.to_string(),
                        }
                    }
                    other => NavigationIssue::Network {
                        message: other.to_string(),
                    },
                };
                tracing::warn!("route request {token} failed: {issue:?}");
                self.route = None;
                self.issue = Some(issue.clone());
                RouteOutcome::Failed(issue)
            }
        }
    }

    /// Back to `Idle`. Returns `false` when there was nothing to leave.
    pub fn exit(&mut self) -> bool {
        if self.status == NavigationStatus::Idle {
            return false;
        }
        self.reset_route();
        self.destination = None;
        self.status = NavigationStatus::Idle;
        tracing::info!("navigation exited");
        true
    }

    pub fn recenter(&mut self) {
        self.follow_camera = true;
    }

    /// The user dragged the map away from the tracked position.
    pub fn user_panned(&mut self) {
        if self.status == NavigationStatus::Navigating && self.follow_camera {
            tracing::debug!("follow camera released by manual pan");
            self.follow_camera = false;
        }
    }

    /// Feed a position. Returns `true` when the camera should follow it.
    pub fn on_position(&mut self, position: GeoPoint) -> bool {
        self.last_position = Some(position);
        if self.status != NavigationStatus::Navigating {
            return false;
        }
        self.advance(position);
        self.follow_camera
    }

    fn advance(&mut self, position: GeoPoint) {
        let Some(route) = &self.route else {
            return;
        };
        while let Some(next) = route.steps.get(self.current_step + 1) {
            if haversine_m(position, next.maneuver.location) > self.arrival_radius_m {
                break;
            }
            self.current_step += 1;
            tracing::debug!("advanced to step {}: {}", self.current_step, next.instruction);
        }
    }

    fn reset_route(&mut self) {
        self.generation += 1;
        self.pending = None;
        self.route = None;
        self.current_step = 0;
        self.follow_camera = false;
        self.issue = None;
    }

    /// Step shown to the user: `steps[current + 1]`, so the departure maneuver
    /// is never displayed.
    pub fn displayed_step(&self) -> Option<&RouteStep> {
        self.steps().get(self.current_step + 1)
    }

    pub fn step_view(&self) -> Option<StepView> {
        self.displayed_step().map(|step| StepView {
            index: self.current_step + 1,
            instruction: step.instruction.clone(),
            icon: turn_icon(step.maneuver.modifier.as_deref()),
            distance_meters: step.distance_meters,
        })
    }

    pub fn remaining_km(&self) -> Option<f64> {
        let destination = self.destination.as_ref()?;
        let position = self.last_position?;
        Some(haversine_km(position, destination.point))
    }

    pub fn status(&self) -> NavigationStatus {
        self.status
    }

    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    pub fn steps(&self) -> &[RouteStep] {
        self.route
            .as_ref()
            .map(|route| route.steps.as_slice())
            .unwrap_or(&[])
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step
    }

    pub fn follow_camera(&self) -> bool {
        self.follow_camera
    }

    pub fn is_route_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn issue(&self) -> Option<&NavigationIssue> {
        self.issue.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use shared::Maneuver;

    use super::*;

    const HOME: GeoPoint = GeoPoint::new(15.3350, 76.4600);
    const VITTALA: GeoPoint = GeoPoint::new(15.3424, 76.4747);

    fn destination() -> Destination {
        Destination {
            point: VITTALA,
            label: Some("Vittala Temple".into()),
        }
    }

    fn step(instruction: &str, modifier: Option<&str>, location: GeoPoint) -> RouteStep {
        RouteStep {
            instruction: instruction.into(),
            maneuver: Maneuver {
                kind: "turn".into(),
                modifier: modifier.map(str::to_string),
                location,
            },
            distance_meters: 100.0,
            duration_seconds: 10.0,
            name: None,
        }
    }

    fn route() -> Route {
        Route {
            geometry: vec![HOME, GeoPoint::new(15.3380, 76.4650), VITTALA],
            steps: vec![
                step("Head east", None, HOME),
                step("Turn left", Some("left"), GeoPoint::new(15.3380, 76.4650)),
                step("Turn sharp right", Some("sharp right"), GeoPoint::new(15.3400, 76.4700)),
                step("Arrive", None, VITTALA),
            ],
            total_distance_km: 2.0,
            total_duration_min: 5.0,
        }
    }

    fn navigating() -> NavigationSession {
        let mut session = NavigationSession::new(25.0);
        session.select_destination(destination()).unwrap();
        let ticket = session.start(Some(HOME)).unwrap();
        assert_eq!(session.route_resolved(ticket.token, Ok(route())), RouteOutcome::Applied);
        session
    }

    #[test]
    fn select_then_exit_round_trips_to_idle() {
        let mut session = NavigationSession::new(25.0);
        session.begin_search();
        assert_eq!(session.status(), NavigationStatus::Searching);

        session.select_destination(destination()).unwrap();
        assert_eq!(session.status(), NavigationStatus::Previewing);
        assert!(session.route().is_none());
        assert!(!session.is_route_pending());

        assert!(session.exit());
        assert_eq!(session.status(), NavigationStatus::Idle);
        assert!(session.destination().is_none());
        assert!(session.route().is_none());
    }

    #[test]
    fn start_without_location_is_rejected() {
        let mut session = NavigationSession::new(25.0);
        session.select_destination(destination()).unwrap();
        assert_eq!(session.start(None), Err(NavigationError::LocationUnknown));
        assert_eq!(session.status(), NavigationStatus::Previewing);
        assert!(!session.is_route_pending());
    }

    #[test]
    fn start_requires_previewing() {
        let mut session = NavigationSession::new(25.0);
        assert!(matches!(
            session.start(Some(HOME)),
            Err(NavigationError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn zero_routes_keeps_previewing() {
        let mut session = NavigationSession::new(25.0);
        session.select_destination(destination()).unwrap();
        let ticket = session.start(Some(HOME)).unwrap();

        let outcome = session.route_resolved(ticket.token, Err(ServiceError::NotFound));
        assert_eq!(outcome, RouteOutcome::Failed(NavigationIssue::NoRoute));
        assert_eq!(session.status(), NavigationStatus::Previewing);
        assert!(session.route().is_none());
        assert!(session.steps().is_empty());
        assert_eq!(session.issue(), Some(&NavigationIssue::NoRoute));

        // Retry with the same destination.
        let retry = session.start(Some(HOME)).unwrap();
        assert!(retry.token > ticket.token);
        assert!(session.issue().is_none());
    }

    #[test]
    fn response_for_old_destination_is_discarded() {
        let mut session = NavigationSession::new(25.0);
        session.select_destination(destination()).unwrap();
        let old = session.start(Some(HOME)).unwrap();

        session
            .select_destination(Destination {
                point: GeoPoint::new(15.3183, 76.4650),
                label: None,
            })
            .unwrap();
        assert_eq!(session.route_resolved(old.token, Ok(route())), RouteOutcome::Stale);
        assert_eq!(session.status(), NavigationStatus::Previewing);
        assert!(session.route().is_none());
    }

    #[test]
    fn newer_start_supersedes_in_flight_request() {
        let mut session = NavigationSession::new(25.0);
        session.select_destination(destination()).unwrap();
        let first = session.start(Some(HOME)).unwrap();
        let second = session.start(Some(HOME)).unwrap();

        assert_eq!(session.route_resolved(first.token, Ok(route())), RouteOutcome::Stale);
        assert_eq!(session.route_resolved(second.token, Ok(route())), RouteOutcome::Applied);
    }

    #[test]
    fn response_after_exit_is_discarded() {
        let mut session = NavigationSession::new(25.0);
        session.select_destination(destination()).unwrap();
        let ticket = session.start(Some(HOME)).unwrap();
        session.exit();
        assert_eq!(session.route_resolved(ticket.token, Ok(route())), RouteOutcome::Stale);
        assert_eq!(session.status(), NavigationStatus::Idle);
    }

    #[test]
    fn navigating_shows_the_step_after_current() {
        let session = navigating();
        assert_eq!(session.status(), NavigationStatus::Navigating);
        assert_eq!(session.current_step_index(), 0);
        assert!(session.follow_camera());

        let view = session.step_view().unwrap();
        assert_eq!(view.index, 1);
        assert_eq!(view.instruction, "Turn left");
        assert_eq!(view.icon, TurnIcon::Left);
    }

    #[test]
    fn reaching_a_maneuver_advances_the_step() {
        let mut session = navigating();
        assert!(session.on_position(GeoPoint::new(15.33801, 76.46501)));
        assert_eq!(session.current_step_index(), 1);
        assert_eq!(session.step_view().unwrap().icon, TurnIcon::Right);

        // Far from the next maneuver: no change, and never backward.
        session.on_position(HOME);
        assert_eq!(session.current_step_index(), 1);

        session.on_position(VITTALA);
        assert_eq!(session.current_step_index(), 1);
        session.on_position(GeoPoint::new(15.3400, 76.4700));
        session.on_position(VITTALA);
        assert_eq!(session.current_step_index(), 3);
        assert!(session.displayed_step().is_none());
    }

    #[test]
    fn pan_releases_follow_and_recenter_restores_it() {
        let mut session = navigating();
        session.user_panned();
        assert!(!session.follow_camera());
        assert!(!session.on_position(HOME));

        session.recenter();
        assert!(session.follow_camera());
        assert!(session.on_position(HOME));
    }

    #[test]
    fn selecting_while_navigating_is_rejected() {
        let mut session = navigating();
        assert!(matches!(
            session.select_destination(destination()),
            Err(NavigationError::InvalidTransition {
                status: NavigationStatus::Navigating,
                ..
            })
        ));
    }

    #[test]
    fn remaining_distance_uses_last_position() {
        let mut session = navigating();
        assert!(session.remaining_km().is_none());
        session.on_position(HOME);
        let remaining = session.remaining_km().unwrap();
        assert!(remaining > 1.0 && remaining < 2.5);
    }

    #[test]
    fn icon_mapping_defaults_to_straight() {
        assert_eq!(turn_icon(Some("slight left")), TurnIcon::Left);
        assert_eq!(turn_icon(Some("right")), TurnIcon::Right);
        assert_eq!(turn_icon(Some("uturn")), TurnIcon::Straight);
        assert_eq!(turn_icon(None), TurnIcon::Straight);
    }
}
