use std::collections::HashSet;

use chrono::{DateTime, Utc};
use shared::{GeoPoint, Quest};

use crate::location::PositionFix;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("unknown quest {0}")]
    UnknownQuest(String),
    #[error("quest {0} has not been discovered yet")]
    NotDiscovered(String),
}

/// Box test in raw degrees. Only accurate near the deployment latitude band.
pub fn within_threshold(quest: GeoPoint, position: GeoPoint, threshold: f64) -> bool {
    (quest.lat - position.lat).abs() < threshold && (quest.lng - position.lng).abs() < threshold
}

pub fn nearby<'a>(position: GeoPoint, quests: &'a [Quest], threshold: f64) -> Vec<&'a Quest> {
    quests
        .iter()
        .filter(|quest| within_threshold(quest.point(), position, threshold))
        .collect()
}

/// Grows the discovered set as the user walks past quests.
#[derive(Debug, Clone)]
pub struct ProximityIndexer {
    threshold: f64,
    discovered: Vec<String>,
    discovered_ids: HashSet<String>,
    completed: Vec<String>,
    newest_fix: Option<DateTime<Utc>>,
}

impl ProximityIndexer {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            discovered: Vec::new(),
            discovered_ids: HashSet::new(),
            completed: Vec::new(),
            newest_fix: None,
        }
    }

    /// Returns quests discovered for the first time by this fix.
    ///
    /// Fixes older than the newest one already processed are ignored.
    pub fn check(&mut self, fix: &PositionFix, quests: &[Quest]) -> Vec<Quest> {
        if self.newest_fix.is_some_and(|newest| fix.timestamp < newest) {
            tracing::debug!("ignoring stale fix from {}", fix.timestamp);
            return Vec::new();
        }
        self.newest_fix = Some(fix.timestamp);

        let mut fresh = Vec::new();
        for quest in nearby(fix.point, quests, self.threshold) {
            if self.discovered_ids.insert(quest.id.clone()) {
                self.discovered.push(quest.id.clone());
                fresh.push(quest.clone());
            }
        }
        fresh
    }

    /// Marks a discovered quest as completed. `Ok(false)` when it already was.
    pub fn complete(&mut self, quest_id: &str, quests: &[Quest]) -> Result<bool, CompletionError> {
        if !quests.iter().any(|quest| quest.id == quest_id) {
            return Err(CompletionError::UnknownQuest(quest_id.to_string()));
        }
        if !self.discovered_ids.contains(quest_id) {
            return Err(CompletionError::NotDiscovered(quest_id.to_string()));
        }
        if self.completed.iter().any(|id| id == quest_id) {
            return Ok(false);
        }
        self.completed.push(quest_id.to_string());
        Ok(true)
    }

    pub fn is_discovered(&self, quest_id: &str) -> bool {
        self.discovered_ids.contains(quest_id)
    }

    /// Discovered ids in discovery order.
    pub fn discovered(&self) -> &[String] {
        &self.discovered
    }

    pub fn completed(&self) -> &[String] {
        &self.completed
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn quest(id: &str, lat: f64, lng: f64) -> Quest {
        Quest {
            id: id.into(),
            name: id.to_uppercase(),
            lat,
            lng,
            category: "place".into(),
            description: None,
            xp: Some(100),
        }
    }

    fn fix(lat: f64, lng: f64, seconds: i64) -> PositionFix {
        PositionFix {
            point: GeoPoint::new(lat, lng),
            heading: None,
            accuracy: None,
            timestamp: DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(seconds),
        }
    }

    #[test]
    fn position_inside_box_discovers_quest() {
        let quests = vec![quest("q1", 15.3360, 76.4610)];
        let mut indexer = ProximityIndexer::new(0.005);

        let found = indexer.check(&fix(15.3362, 76.4612, 1), &quests);
        assert_eq!(found.len(), 1);
        assert!(indexer.is_discovered("q1"));
    }

    #[test]
    fn discovery_fires_once() {
        let quests = vec![quest("q1", 15.3360, 76.4610)];
        let mut indexer = ProximityIndexer::new(0.005);

        assert_eq!(indexer.check(&fix(15.3362, 76.4612, 1), &quests).len(), 1);
        assert!(indexer.check(&fix(15.3361, 76.4611, 2), &quests).is_empty());
        assert_eq!(indexer.discovered(), ["q1".to_string()]);
    }

    #[test]
    fn box_is_strict_on_each_axis() {
        let origin = GeoPoint::new(0.0, 0.0);
        assert!(!within_threshold(origin, GeoPoint::new(0.005, 0.0), 0.005));
        assert!(!within_threshold(origin, GeoPoint::new(0.0, 0.006), 0.005));
        assert!(within_threshold(origin, GeoPoint::new(0.004, -0.004), 0.005));
    }

    #[test]
    fn stale_fix_neither_adds_nor_removes() {
        let quests = vec![quest("near-old", 15.0, 76.0), quest("near-new", 16.0, 77.0)];
        let mut indexer = ProximityIndexer::new(0.005);

        indexer.check(&fix(16.0, 77.0, 10), &quests);
        assert!(indexer.check(&fix(15.0, 76.0, 5), &quests).is_empty());
        assert_eq!(indexer.discovered(), ["near-new".to_string()]);
    }

    #[test]
    fn completion_requires_discovery() {
        let quests = vec![quest("q1", 15.3360, 76.4610)];
        let mut indexer = ProximityIndexer::new(0.005);

        assert_eq!(
            indexer.complete("q1", &quests),
            Err(CompletionError::NotDiscovered("q1".into()))
        );
        assert_eq!(
            indexer.complete("nope", &quests),
            Err(CompletionError::UnknownQuest("nope".into()))
        );

        indexer.check(&fix(15.3360, 76.4610, 1), &quests);
        assert_eq!(indexer.complete("q1", &quests), Ok(true));
        assert_eq!(indexer.complete("q1", &quests), Ok(false));
        assert_eq!(indexer.completed(), ["q1".to_string()]);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn hampi_point() -> impl Strategy<Value = (f64, f64)> {
            (15.30f64..15.36, 76.44f64..76.50)
        }

        proptest! {
            #[test]
            fn prop_discovered_iff_inside_box_or_already_known(
                quest_points in prop::collection::vec(hampi_point(), 1..8),
                walk in prop::collection::vec(hampi_point(), 1..20)
            ) {
                let quests: Vec<Quest> = quest_points
                    .iter()
                    .enumerate()
                    .map(|(i, (lat, lng))| quest(&format!("q{i}"), *lat, *lng))
                    .collect();
                let mut indexer = ProximityIndexer::new(0.005);
                let mut previous_len = 0;

                for (second, (lat, lng)) in walk.iter().enumerate() {
                    let before: HashSet<String> = indexer.discovered().iter().cloned().collect();
                    let position = GeoPoint::new(*lat, *lng);
                    indexer.check(&fix(*lat, *lng, second as i64), &quests);

                    for q in &quests {
                        let inside = within_threshold(q.point(), position, 0.005);
                        let expected = inside || before.contains(&q.id);
                        prop_assert_eq!(indexer.is_discovered(&q.id), expected);
                    }
                    prop_assert!(indexer.discovered().len() >= previous_len);
                    previous_len = indexer.discovered().len();
                }
            }

            #[test]
            fn prop_replaying_older_fixes_is_inert(
                quest_points in prop::collection::vec(hampi_point(), 1..8),
                walk in prop::collection::vec(hampi_point(), 2..12)
            ) {
                let quests: Vec<Quest> = quest_points
                    .iter()
                    .enumerate()
                    .map(|(i, (lat, lng))| quest(&format!("q{i}"), *lat, *lng))
                    .collect();
                let mut indexer = ProximityIndexer::new(0.005);
                let last = walk.len() as i64;
                for (second, (lat, lng)) in walk.iter().enumerate() {
                    indexer.check(&fix(*lat, *lng, second as i64 + last), &quests);
                }
                let settled = indexer.discovered().to_vec();

                for (second, (lat, lng)) in walk.iter().enumerate() {
                    indexer.check(&fix(*lat, *lng, second as i64), &quests);
                }
                prop_assert_eq!(indexer.discovered(), settled.as_slice());
            }
        }
    }
}
