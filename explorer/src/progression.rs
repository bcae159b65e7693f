use std::sync::{Arc, Mutex};

use shared::GeoPoint;

/// Outward notification for the progression service (XP, levels, badges).
#[derive(Debug, Clone, PartialEq)]
pub enum QuestEvent {
    Discovered {
        quest_id: String,
        name: String,
        at: GeoPoint,
    },
    Completed {
        quest_id: String,
        xp: Option<u32>,
    },
}

pub trait ProgressionSink: Send {
    fn report(&mut self, event: QuestEvent);
}

/// Logs events; the default when no progression service is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProgressionSink for LogSink {
    fn report(&mut self, event: QuestEvent) {
        match event {
            QuestEvent::Discovered { quest_id, name, at } => {
                tracing::info!("quest discovered: {name} ({quest_id}) at {:.5},{:.5}", at.lat, at.lng);
            }
            QuestEvent::Completed { quest_id, xp } => {
                tracing::info!("quest completed: {quest_id} (xp {xp:?})");
            }
        }
    }
}

/// Keeps every event in a shared list that can be inspected later.
#[derive(Debug, Default, Clone)]
pub struct SharedLog {
    events: Arc<Mutex<Vec<QuestEvent>>>,
}

impl SharedLog {
    pub fn events(&self) -> Vec<QuestEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ProgressionSink for SharedLog {
    fn report(&mut self, event: QuestEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
