//! Publisher - fire-and-forget events for connected viewers
//!
//! The core calls [`Publisher::publish_status`] and
//! [`Publisher::publish_result`]; delivery is at most once with no
//! acknowledgement.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::types::ResultPacket;

/// Body of a `training_status` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingStatus {
    pub status: String,
}

/// Events pushed to viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Event {
    #[serde(rename = "training_status")]
    TrainingStatus(TrainingStatus),
    #[serde(rename = "update_data")]
    UpdateData(ResultPacket),
}

pub trait Publisher: Send + Sync {
    fn publish_status(&self, status: &str);
    fn publish_result(&self, packet: &ResultPacket);
}

/// Fans events out to every subscribed viewer
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<Event>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn send(&self, event: Event) {
        // No subscribers is not an error; the event is simply dropped
        if self.tx.send(event).is_err() {
            debug!("No viewers connected, event dropped");
        }
    }
}

impl Publisher for BroadcastPublisher {
    fn publish_status(&self, status: &str) {
        info!("Status: {}", status);
        self.send(Event::TrainingStatus(TrainingStatus { status: status.to_string() }));
    }

    fn publish_result(&self, packet: &ResultPacket) {
        self.send(Event::UpdateData(packet.clone()));
    }
}

/// Keeps every event in memory, for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<Event>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::TrainingStatus(s) => Some(s.status),
                _ => None,
            })
            .collect()
    }

    pub fn results(&self) -> Vec<ResultPacket> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::UpdateData(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).push(event);
    }
}

impl Publisher for MemoryPublisher {
    fn publish_status(&self, status: &str) {
        self.push(Event::TrainingStatus(TrainingStatus { status: status.to_string() }));
    }

    fn publish_result(&self, packet: &ResultPacket) {
        self.push(Event::UpdateData(packet.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_event_wire_format() {
        let event = Event::TrainingStatus(TrainingStatus { status: "Loading and cleaning data...".into() });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "training_status");
        assert_eq!(json["data"]["status"], "Loading and cleaning data...");
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let publisher = BroadcastPublisher::new(8);
        let mut rx = publisher.subscribe();
        assert_eq!(publisher.subscriber_count(), 1);

        publisher.publish_status("hello");
        match rx.recv().await.unwrap() {
            Event::TrainingStatus(s) => assert_eq!(s.status, "hello"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        let publisher = BroadcastPublisher::new(8);
        publisher.publish_status("nobody listening");
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn test_memory_publisher_records_in_order() {
        let publisher = MemoryPublisher::new();
        publisher.publish_status("a");
        publisher.publish_status("b");
        assert_eq!(publisher.statuses(), vec!["a", "b"]);
        assert!(publisher.results().is_empty());
    }
}
