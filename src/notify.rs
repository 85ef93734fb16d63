use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for committed events, one channel per restaurant. The
/// surrounding service layers (notification email, live booking views)
/// subscribe here instead of polling.
#[derive(Debug)]
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notifications for a restaurant. Creates the channel if needed.
    pub fn subscribe(&self, restaurant_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(restaurant_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, restaurant_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&restaurant_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a channel (e.g. when the restaurant is deleted).
    pub fn remove(&self, restaurant_id: &Ulid) {
        self.channels.remove(restaurant_id);
    }
}
