//! Real-time delivery: a fan-out SSE hub, grounded in
//! `ferrex-server/src/media/scan/scan_manager.rs`'s
//! `scan_progress_sse`/`media_event_channels` pattern -- per-client bounded
//! channels, a 30s keepalive, and dropping slow clients rather than letting
//! one subscriber back-pressure the whole hub.

use std::convert::Infallible;
use std::sync::Mutex;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::mpsc;

const CLIENT_CHANNEL_CAPACITY: usize = 64;

pub struct SseHub {
    clients: Mutex<Vec<mpsc::Sender<String>>>,
}

impl Default for SseHub {
    fn default() -> Self {
        SseHub {
            clients: Mutex::new(Vec::new()),
        }
    }
}

impl SseHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new client and immediately queues a `connected` event
    /// carrying its client id, per the hub contract.
    pub fn subscribe(&self) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(CLIENT_CHANNEL_CAPACITY);
        let client_id = uuid::Uuid::new_v4().to_string();
        let payload = serde_json::json!({ "clientId": client_id }).to_string();
        let _ = tx.try_send(format!("connected\u{1}{payload}"));
        self.clients.lock().unwrap().push(tx);
        rx
    }

    /// Serializes `payload` once and fans it out to every subscriber,
    /// dropping (and pruning) any client whose channel is full or closed.
    pub fn broadcast(&self, event_name: &str, payload: &str) {
        let message = format!("{event_name}\u{1}{payload}");
        let mut clients = self.clients.lock().unwrap();
        clients.retain(|tx| tx.try_send(message.clone()).is_ok());
    }

    pub fn broadcast_change(&self, notification: &impl Serialize) {
        if let Ok(json) = serde_json::to_string(notification) {
            self.broadcast("file_updated", &json);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }
}

pub fn sse_stream(mut rx: mpsc::Receiver<String>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = stream::unfold(rx, move |mut rx| async move {
        match rx.recv().await {
            Some(message) => {
                let (event_name, payload) = message.split_once('\u{1}').unwrap_or(("message", message.as_str()));
                let event = Event::default().event(event_name.to_string()).data(payload.to_string());
                Some((Ok(event), rx))
            }
            None => None,
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(30)).text("keepalive"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribing_immediately_queues_a_connected_event() {
        let hub = SseHub::new();
        let mut rx = hub.subscribe();
        let message = rx.recv().await.unwrap();
        assert!(message.starts_with("connected\u{1}"));
        assert!(message.contains("clientId"));
    }

    #[tokio::test]
    async fn subscribers_receive_broadcast_messages() {
        let hub = SseHub::new();
        let mut rx = hub.subscribe();
        hub.broadcast("change", "{\"path\":\"a.md\"}");
        let message = rx.recv().await.unwrap();
        assert!(message.contains("a.md"));
    }

    #[tokio::test]
    async fn closed_subscribers_are_pruned_on_next_broadcast() {
        let hub = SseHub::new();
        {
            let _rx = hub.subscribe();
            assert_eq!(hub.subscriber_count(), 1);
        }
        hub.broadcast("change", "{}");
        assert_eq!(hub.subscriber_count(), 0);
    }
}
