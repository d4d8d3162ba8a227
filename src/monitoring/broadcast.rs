//! Topic-based fanout of vital and alert events.
//!
//! Two topic families: `facility:{id}` (dashboards for a whole facility)
//! and `resident:{id}` (a single resident's detail view). Delivery is
//! at-most-once and never blocks the publisher: each subscriber owns a
//! bounded queue, a full queue drops the event for that subscriber, and a
//! closed queue is pruned on the next publish. Subscribers that miss
//! events reconcile through the REST alert listing.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::Alert;

/// Per-subscriber queue depth.
const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Facility(Uuid),
    Resident(Uuid),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Facility(id) => write!(f, "facility:{id}"),
            Topic::Resident(id) => write!(f, "resident:{id}"),
        }
    }
}

/// Event pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum MonitorEvent {
    VitalUpdate {
        resident_id: Uuid,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    AlertCreated {
        alert: Alert,
        timestamp: DateTime<Utc>,
    },
    AlertUpdated {
        alert: Alert,
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("Topic registry lock poisoned")]
    LockPoisoned,
}

/// Publishing side of the fanout, injected into the coordinator.
///
/// Each method returns how many subscribers the event was queued for;
/// zero subscribers is not an error.
pub trait Broadcaster: Send + Sync {
    fn publish_vital_update(
        &self,
        facility_id: Uuid,
        resident_id: Uuid,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Result<usize, BroadcastError>;

    fn publish_alert_created(&self, facility_id: Uuid, alert: &Alert) -> Result<usize, BroadcastError>;

    fn publish_alert_updated(&self, facility_id: Uuid, alert: &Alert) -> Result<usize, BroadcastError>;
}

/// A live subscription. Dropping the receiver unsubscribes lazily.
pub struct Subscription {
    pub id: Uuid,
    pub topic: Topic,
    pub receiver: mpsc::Receiver<Arc<MonitorEvent>>,
}

struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<Arc<MonitorEvent>>,
}

/// In-process topic registry backing the WebSocket endpoint.
pub struct TopicBroadcaster {
    topics: RwLock<HashMap<Topic, Vec<Subscriber>>>,
    capacity: usize,
}

impl Default for TopicBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

impl TopicBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, topic: Topic) -> Result<Subscription, BroadcastError> {
        let (tx, receiver) = mpsc::channel(self.capacity);
        let id = Uuid::new_v4();
        let mut topics = self.topics.write().map_err(|_| BroadcastError::LockPoisoned)?;
        topics.entry(topic).or_default().push(Subscriber { id, tx });
        tracing::debug!(%topic, subscriber = %id, "Subscribed");
        Ok(Subscription { id, topic, receiver })
    }

    pub fn unsubscribe(&self, topic: Topic, id: Uuid) {
        if let Ok(mut topics) = self.topics.write() {
            if let Some(subs) = topics.get_mut(&topic) {
                subs.retain(|s| s.id != id);
                if subs.is_empty() {
                    topics.remove(&topic);
                }
            }
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics
            .read()
            .map(|t| t.get(&topic).map_or(0, |subs| subs.len()))
            .unwrap_or(0)
    }

    fn deliver(&self, topic: Topic, event: Arc<MonitorEvent>) -> Result<usize, BroadcastError> {
        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let topics = self.topics.read().map_err(|_| BroadcastError::LockPoisoned)?;
            let Some(subs) = topics.get(&topic) else {
                return Ok(0);
            };
            for sub in subs {
                match sub.tx.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::debug!(%topic, subscriber = %sub.id, "Subscriber queue full, event dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(sub.id),
                }
            }
        }
        for id in closed {
            self.unsubscribe(topic, id);
        }
        Ok(delivered)
    }
}

impl Broadcaster for TopicBroadcaster {
    fn publish_vital_update(
        &self,
        facility_id: Uuid,
        resident_id: Uuid,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Result<usize, BroadcastError> {
        let event = Arc::new(MonitorEvent::VitalUpdate {
            resident_id,
            data,
            timestamp,
        });
        let facility = self.deliver(Topic::Facility(facility_id), event.clone())?;
        let resident = self.deliver(Topic::Resident(resident_id), event)?;
        Ok(facility + resident)
    }

    fn publish_alert_created(&self, facility_id: Uuid, alert: &Alert) -> Result<usize, BroadcastError> {
        let event = MonitorEvent::AlertCreated {
            alert: alert.clone(),
            timestamp: Utc::now(),
        };
        self.deliver(Topic::Facility(facility_id), Arc::new(event))
    }

    fn publish_alert_updated(&self, facility_id: Uuid, alert: &Alert) -> Result<usize, BroadcastError> {
        let event = MonitorEvent::AlertUpdated {
            alert: alert.clone(),
            timestamp: Utc::now(),
        };
        self.deliver(Topic::Facility(facility_id), Arc::new(event))
    }
}
