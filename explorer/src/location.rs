use std::time::Duration;

use chrono::{DateTime, Utc};
use shared::{GeoPoint, LocationStatus};
use tokio::task::JoinHandle;

use crate::geo::bearing_deg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    Unavailable,
    #[error("position request timed out")]
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub point: GeoPoint,
    /// Degrees clockwise from north, when the device reports one.
    pub heading: Option<f64>,
    /// Accuracy radius in meters.
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl PositionFix {
    pub fn at(point: GeoPoint) -> Self {
        Self {
            point,
            heading: None,
            accuracy: None,
            timestamp: Utc::now(),
        }
    }
}

pub type PositionUpdate = Result<PositionFix, LocationError>;
pub type PositionCallback = Box<dyn FnMut(PositionUpdate) + Send + 'static>;

/// Continuous stream of device positions.
///
/// Implementations call `callback` for every fix or failure until the returned
/// [`Subscription`] is dropped.
pub trait PositionSource: Send + Sync {
    fn subscribe(&self, callback: PositionCallback) -> Subscription;
}

/// Handle to a live position subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// A subscription with nothing behind it, for sources that failed to start.
    pub fn inert() -> Self {
        Self { task: None }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Timer-driven walk over a scripted list of points.
#[derive(Debug, Clone)]
pub struct SimulatedWalk {
    points: Vec<GeoPoint>,
    tick: Duration,
    accuracy: f64,
}

impl SimulatedWalk {
    pub fn new(points: Vec<GeoPoint>, tick: Duration) -> Self {
        Self {
            points,
            tick,
            accuracy: 5.0,
        }
    }

    /// Walk through `waypoints`, inserting `steps_per_leg` evenly spaced fixes per leg.
    pub fn through(waypoints: &[GeoPoint], steps_per_leg: usize, tick: Duration) -> Self {
        let steps = steps_per_leg.max(1);
        let mut points = Vec::with_capacity(waypoints.len() * steps);
        for leg in waypoints.windows(2) {
            for i in 0..steps {
                points.push(leg[0].interpolate(leg[1], i as f64 / steps as f64));
            }
        }
        if let Some(last) = waypoints.last() {
            points.push(*last);
        }
        Self::new(points, tick)
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn duration(&self) -> Duration {
        self.tick * self.points.len() as u32
    }
}

impl PositionSource for SimulatedWalk {
    fn subscribe(&self, mut callback: PositionCallback) -> Subscription {
        let points = self.points.clone();
        let tick = self.tick;
        let accuracy = self.accuracy;
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            let mut previous: Option<GeoPoint> = None;
            for point in points {
                interval.tick().await;
                let heading = previous
                    .filter(|prev| *prev != point)
                    .map(|prev| bearing_deg(prev, point));
                callback(Ok(PositionFix {
                    point,
                    heading,
                    accuracy: Some(accuracy),
                    timestamp: Utc::now(),
                }));
                previous = Some(point);
            }
            tracing::debug!("simulated walk finished");
        });
        Subscription::from_task(task)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Inactive,
    Pending,
    Tracking,
    Failed(LocationError),
}

/// Last known device position and the health of the position stream.
#[derive(Debug, Clone)]
pub struct LocationTracker {
    state: TrackerState,
    last_fix: Option<PositionFix>,
}

impl Default for LocationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationTracker {
    pub fn new() -> Self {
        Self {
            state: TrackerState::Inactive,
            last_fix: None,
        }
    }

    pub fn activate(&mut self) {
        if self.state == TrackerState::Inactive {
            self.state = TrackerState::Pending;
        }
    }

    /// Feed one update. Returns the fix when the update carried a position.
    pub fn apply(&mut self, update: PositionUpdate) -> Option<PositionFix> {
        match update {
            Ok(fix) if fix.point.is_finite() => {
                self.state = TrackerState::Tracking;
                let newer = self
                    .last_fix
                    .map_or(true, |last| fix.timestamp >= last.timestamp);
                if newer {
                    self.last_fix = Some(fix);
                }
                Some(fix)
            }
            Ok(fix) => {
                tracing::warn!("discarding non-finite position fix {:?}", fix.point);
                None
            }
            Err(err) => {
                tracing::warn!("location failure: {err}");
                if err == LocationError::PermissionDenied {
                    self.last_fix = None;
                }
                self.state = TrackerState::Failed(err);
                None
            }
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn last_fix(&self) -> Option<&PositionFix> {
        self.last_fix.as_ref()
    }

    pub fn current_location(&self) -> Option<GeoPoint> {
        self.last_fix.map(|fix| fix.point)
    }

    /// Navigation may only start from a known origin.
    pub fn can_navigate(&self) -> bool {
        self.last_fix.is_some() && self.state != TrackerState::Failed(LocationError::PermissionDenied)
    }

    pub fn status(&self) -> LocationStatus {
        match self.state {
            TrackerState::Inactive => LocationStatus::Inactive,
            TrackerState::Pending => LocationStatus::Pending,
            TrackerState::Tracking => LocationStatus::Tracking,
            TrackerState::Failed(LocationError::PermissionDenied) => LocationStatus::PermissionDenied,
            TrackerState::Failed(LocationError::Unavailable) => LocationStatus::Unavailable,
            TrackerState::Failed(LocationError::Timeout) => LocationStatus::Timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::TimeDelta;

    use super::*;

    fn fix_at(lat: f64, lng: f64, seconds: i64) -> PositionFix {
        PositionFix {
            point: GeoPoint::new(lat, lng),
            heading: None,
            accuracy: Some(5.0),
            timestamp: DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(seconds),
        }
    }

    #[test]
    fn tracker_keeps_newest_fix() {
        let mut tracker = LocationTracker::new();
        tracker.activate();
        assert_eq!(tracker.status(), LocationStatus::Pending);

        tracker.apply(Ok(fix_at(15.0, 76.0, 10)));
        tracker.apply(Ok(fix_at(15.1, 76.1, 5)));
        assert_eq!(tracker.current_location(), Some(GeoPoint::new(15.0, 76.0)));
        assert!(tracker.can_navigate());
    }

    #[test]
    fn timeout_keeps_last_fix_but_denial_clears_it() {
        let mut tracker = LocationTracker::new();
        tracker.apply(Ok(fix_at(15.0, 76.0, 1)));

        assert!(tracker.apply(Err(LocationError::Timeout)).is_none());
        assert_eq!(tracker.status(), LocationStatus::Timeout);
        assert!(tracker.can_navigate());

        tracker.apply(Err(LocationError::PermissionDenied));
        assert_eq!(tracker.status(), LocationStatus::PermissionDenied);
        assert!(tracker.current_location().is_none());
        assert!(!tracker.can_navigate());
    }

    #[test]
    fn non_finite_fix_is_ignored() {
        let mut tracker = LocationTracker::new();
        assert!(tracker.apply(Ok(fix_at(f64::NAN, 76.0, 1))).is_none());
        assert!(tracker.current_location().is_none());
    }

    #[test]
    fn walk_interpolates_legs() {
        let walk = SimulatedWalk::through(
            &[GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 1.0)],
            4,
            Duration::from_millis(10),
        );
        assert_eq!(walk.points().len(), 5);
        assert_eq!(walk.points()[2], GeoPoint::new(0.0, 0.5));
        assert_eq!(walk.duration(), Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_walk_emits_every_point_with_heading() {
        let walk = SimulatedWalk::new(
            vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.001)],
            Duration::from_millis(100),
        );
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let subscription = walk.subscribe(Box::new(move |update| {
            sink.lock().unwrap().push(update);
        }));

        tokio::time::sleep(Duration::from_millis(350)).await;
        let received = received.lock().unwrap();
        assert_eq!(received.len(), 2);
        let second = received[1].as_ref().unwrap();
        assert!((second.heading.unwrap() - 90.0).abs() < 0.01);
        drop(subscription);
    }
}
