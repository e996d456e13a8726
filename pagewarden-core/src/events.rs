use crate::model::UrlStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Queued,
    Processing,
    Completed,
    Error,
    Deleted,
}

impl From<UrlStatus> for EventKind {
    fn from(status: UrlStatus) -> Self {
        match status {
            UrlStatus::Queued => EventKind::Queued,
            UrlStatus::Processing => EventKind::Processing,
            UrlStatus::Completed => EventKind::Completed,
            UrlStatus::Error => EventKind::Error,
        }
    }
}

/// Status-change notification for a single URL record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "status_update")]
pub struct StatusEvent {
    pub url_id: i64,
    pub status: EventKind,
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(url_id: i64, status: EventKind) -> Self {
        Self {
            url_id,
            status,
            data: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Best-effort publisher of status events. Publishing never fails the caller.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: StatusEvent);
}

/// Fans events out over a broadcast channel.
#[derive(Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<StatusEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, event: StatusEvent) {
        // No receivers is not an error
        if self.sender.send(event).is_err() {
            debug!("Status event dropped, no subscribers");
        }
    }
}

/// Discards everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: StatusEvent) {}
}
