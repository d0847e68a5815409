//! src/eventbus/mod.rs
//!
//! Provides an in-process event bus that supports guaranteed delivery
//! to multiple subscribers via bounded MPSC queues.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc, watch};

use musicboy_common::models::{CurrentlyPlaying, UserId};

/// Global event type the bot's components publish and subscribe to.
#[derive(Debug, Clone)]
pub enum BotEvent {
    /// The track monitor observed a different currently-playing item for
    /// this user.
    TrackChanged {
        user_id: UserId,
        playing: CurrentlyPlaying,
        at: DateTime<Utc>,
    },

    /// A user completed the OAuth flow and now has a stored credential.
    SpotifyLinked { user_id: UserId },

    /// Periodic heartbeat event.
    Tick,

    /// System-wide event for debugging or administration.
    SystemMessage(String),
}

impl BotEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            BotEvent::TrackChanged { .. } => "track_changed",
            BotEvent::SpotifyLinked { .. } => "spotify_linked",
            BotEvent::Tick => "tick",
            BotEvent::SystemMessage(_) => "system_message",
        }
    }
}

/// Each subscriber gets its own `mpsc::Sender<BotEvent>` for guaranteed
/// delivery.
///
/// - If the subscriber's channel buffer fills, `publish` will await
///   until there's space (backpressure).
/// - If the subscriber has dropped the `Receiver`, the channel is closed
///   and sending returns an error.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<BotEvent>>>>,
    shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Default size for each subscriber's buffer.
const DEFAULT_BUFFER_SIZE: usize = 1000;

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Returns a receiver on which events will be delivered.
    pub async fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<BotEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);
        let mut subs = self.subscribers.lock().await;
        subs.push(tx);
        rx
    }

    /// Publish an event to all subscribers.
    pub async fn publish(&self, event: BotEvent) {
        let senders = {
            let subs = self.subscribers.lock().await;
            subs.clone()
        };
        for s in senders {
            let _ = s.send(event.clone()).await;
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Duration, timeout};

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();

        let mut rx1 = bus.subscribe(Some(5)).await;
        let mut rx2 = bus.subscribe(Some(5)).await;

        bus.publish(BotEvent::Tick).await;

        let evt1 = rx1.recv().await.expect("rx1 should get event");
        let evt2 = rx2.recv().await.expect("rx2 should get event");

        assert!(matches!(evt1, BotEvent::Tick));
        assert!(matches!(evt2, BotEvent::Tick));
    }

    #[tokio::test]
    async fn test_shutdown_flag() {
        let bus = EventBus::new();
        assert!(!bus.is_shutdown());
        bus.shutdown();
        assert!(bus.is_shutdown());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_block_publish() {
        let bus = EventBus::new();
        let rx = bus.subscribe(Some(1)).await;
        drop(rx);

        // Must not hang even though the only subscriber is gone.
        timeout(Duration::from_millis(100), bus.publish(BotEvent::Tick))
            .await
            .expect("publish should not block on a dropped subscriber");
    }
}
