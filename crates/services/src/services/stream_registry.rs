//! In-memory fan-out of live turn streams. Each running turn owns a broadcast
//! channel keyed by its stream id; any number of clients can subscribe, and a
//! reconnecting client resumes from the point it re-attaches (no replay).

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use ts_rs::TS;
use uuid::Uuid;

const STREAM_CHANNEL_CAPACITY: usize = 256;

/// Events emitted over a turn's stream, in SSE-friendly shape.
#[derive(Debug, Clone, Serialize, PartialEq, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnStreamEvent {
    MessageStart {
        chat_id: Uuid,
        message_id: Uuid,
    },
    Delta {
        text: String,
    },
    /// Client-safe failure notice. Internal detail stays in the logs.
    Error {
        message: String,
    },
    Finish,
}

#[derive(Clone, Default)]
pub struct StreamRegistry {
    channels: Arc<DashMap<Uuid, broadcast::Sender<TurnStreamEvent>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a channel for a new turn. The sender side belongs to the
    /// streaming task; the returned receiver is the initiating client's.
    pub fn register(&self, stream_id: Uuid) -> broadcast::Receiver<TurnStreamEvent> {
        let (tx, rx) = broadcast::channel(STREAM_CHANNEL_CAPACITY);
        self.channels.insert(stream_id, tx);
        rx
    }

    /// Late subscription for resume; `None` once the turn has completed.
    pub fn subscribe(&self, stream_id: Uuid) -> Option<broadcast::Receiver<TurnStreamEvent>> {
        self.channels.get(&stream_id).map(|tx| tx.subscribe())
    }

    /// Best-effort: an event with no live subscribers is simply dropped.
    pub fn emit(&self, stream_id: Uuid, event: TurnStreamEvent) {
        if let Some(tx) = self.channels.get(&stream_id) {
            let _ = tx.send(event);
        }
    }

    /// Emits the terminal event and tears the channel down. Subsequent
    /// subscribes return `None`.
    pub fn finish(&self, stream_id: Uuid) {
        if let Some((_, tx)) = self.channels.remove(&stream_id) {
            let _ = tx.send(TurnStreamEvent::Finish);
        }
    }

    pub fn is_live(&self, stream_id: Uuid) -> bool {
        self.channels.contains_key(&stream_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let registry = StreamRegistry::new();
        let stream_id = Uuid::new_v4();
        let mut rx = registry.register(stream_id);

        registry.emit(
            stream_id,
            TurnStreamEvent::Delta {
                text: "hello".to_string(),
            },
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            TurnStreamEvent::Delta {
                text: "hello".to_string()
            }
        );
    }

    #[tokio::test]
    async fn late_subscriber_sees_only_subsequent_events() {
        let registry = StreamRegistry::new();
        let stream_id = Uuid::new_v4();
        let _initial = registry.register(stream_id);

        registry.emit(
            stream_id,
            TurnStreamEvent::Delta {
                text: "early".to_string(),
            },
        );

        let mut late = registry.subscribe(stream_id).unwrap();
        registry.emit(
            stream_id,
            TurnStreamEvent::Delta {
                text: "late".to_string(),
            },
        );
        assert_eq!(
            late.recv().await.unwrap(),
            TurnStreamEvent::Delta {
                text: "late".to_string()
            }
        );
    }

    #[tokio::test]
    async fn finish_emits_terminal_event_and_removes_channel() {
        let registry = StreamRegistry::new();
        let stream_id = Uuid::new_v4();
        let mut rx = registry.register(stream_id);

        registry.finish(stream_id);
        assert_eq!(rx.recv().await.unwrap(), TurnStreamEvent::Finish);
        assert!(registry.subscribe(stream_id).is_none());
        assert!(!registry.is_live(stream_id));
    }

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let json = serde_json::to_string(&TurnStreamEvent::Delta {
            text: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"delta","text":"hi"}"#);

        let json = serde_json::to_string(&TurnStreamEvent::Finish).unwrap();
        assert_eq!(json, r#"{"type":"finish"}"#);
    }
}
