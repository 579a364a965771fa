use serde::{Deserialize, Serialize};

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::types::{SkillId, TrajectoryId};

/// Lifecycle events of the learning loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    // ── Learning ───────────────────────────────────────────────
    TrajectorySaved {
        trajectory_id: TrajectoryId,
        domain: Option<String>,
        success: bool,
    },
    SkillLearned {
        skill_id: SkillId,
        name: String,
        domain: String,
        version: u32,
    },
    SynthesisRejected {
        trajectory_id: TrajectoryId,
        attempts: u32,
        reason: String,
    },

    // ── Routing & replay ───────────────────────────────────────
    RouteDecided {
        task: String,
        fast: bool,
        confidence: f64,
        skill_id: Option<SkillId>,
        reason: String,
    },
    SkillExecuted {
        skill_id: SkillId,
        success: bool,
        duration_ms: u64,
        error: Option<String>,
    },
    ConfidenceUpdated {
        skill_id: SkillId,
        before: f64,
        after: f64,
    },
    SkillPruned {
        skill_id: SkillId,
        confidence: f64,
    },
}

/// A broadcast-based event bus for learning-loop observers.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<Event>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: Event) {
        // Ignore send errors (no subscribers).
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let bus = EventBus::default();
        bus.publish(Event::SkillPruned {
            skill_id: "s1".into(),
            confidence: 0.1,
        });
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(Event::ConfidenceUpdated {
            skill_id: "s1".into(),
            before: 0.5,
            after: 0.55,
        });
        match rx.recv().await.unwrap() {
            Event::ConfidenceUpdated { skill_id, after, .. } => {
                assert_eq!(skill_id, "s1");
                assert!((after - 0.55).abs() < 1e-9);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
