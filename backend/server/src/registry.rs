//! # Connection Registry
//!
//! Live realtime clients keyed by client id.
//!
//! Each socket gets a writer task fed by an unbounded channel; the registry only holds the
//! sending half. A send fails once the writer has gone away, which is how dead clients are
//! found and pruned.
//!
//! ## Per Client
//!
//! absent → `connect` → connected → `disconnect` or failed send → absent
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

use crate::models::Event;

pub type Outbox = UnboundedSender<String>;

#[derive(Default)]
pub struct Registry {
    clients: Mutex<HashMap<String, Outbox>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<String, Outbox>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn len(&self) -> usize {
        self.clients().len()
    }

    /// Stores the client, replacing any entry under the same id, and announces the new count.
    pub fn connect(&self, client_id: &str, outbox: Outbox) {
        let count = {
            let mut clients = self.clients();
            clients.insert(client_id.to_string(), outbox);
            clients.len()
        };
        info!("Client {client_id} connected, {count} online");

        self.broadcast_count(count);
    }

    pub fn disconnect(&self, client_id: &str) {
        let removed = {
            let mut clients = self.clients();
            clients.remove(client_id).map(|_| clients.len())
        };

        if let Some(count) = removed {
            info!("Client {client_id} disconnected, {count} online");
            self.broadcast_count(count);
        }
    }

    /// Disconnects `client_id` only while it still maps to `outbox`, so a closing socket
    /// cannot evict a newer connection that reused its id.
    pub fn release(&self, client_id: &str, outbox: &Outbox) {
        let current = self
            .clients()
            .get(client_id)
            .is_some_and(|stored| stored.same_channel(outbox));

        if current {
            self.disconnect(client_id);
        }
    }

    pub fn broadcast(&self, message: &str) {
        let snapshot: Vec<(String, Outbox)> = self
            .clients()
            .iter()
            .map(|(id, outbox)| (id.clone(), outbox.clone()))
            .collect();

        let failed: Vec<String> = snapshot
            .into_iter()
            .filter_map(|(id, outbox)| outbox.send(message.to_string()).err().map(|_| id))
            .collect();

        for client_id in failed {
            warn!("Send to client {client_id} failed, dropping it");
            self.disconnect(&client_id);
        }
    }

    pub fn broadcast_event(&self, event: &Event) {
        match serde_json::to_string(event) {
            Ok(message) => self.broadcast(&message),
            Err(e) => error!("Failed to encode event: {e}"),
        }
    }

    fn broadcast_count(&self, count: usize) {
        self.broadcast_event(&Event::ConnectionCount { count });
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

    use super::*;

    fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(serde_json::from_str(&frame).unwrap());
        }
        frames
    }

    fn count(n: usize) -> Value {
        json!({ "type": "connection_count", "count": n })
    }

    #[test]
    fn test_connect_and_disconnect_counts() {
        let registry = Registry::new();
        let (a_tx, mut a_rx) = unbounded_channel();
        let (b_tx, mut b_rx) = unbounded_channel();

        registry.connect("a", a_tx);
        registry.connect("b", b_tx);

        assert_eq!(drain(&mut a_rx), vec![count(1), count(2)]);
        assert_eq!(drain(&mut b_rx), vec![count(2)]);

        registry.disconnect("a");

        assert_eq!(drain(&mut b_rx), vec![count(1)]);
        assert!(drain(&mut a_rx).is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_disconnect_unknown_is_silent() {
        let registry = Registry::new();
        let (tx, mut rx) = unbounded_channel();
        registry.connect("a", tx);
        drain(&mut rx);

        registry.disconnect("ghost");

        assert!(drain(&mut rx).is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failed_send_prunes_client() {
        let registry = Registry::new();
        let (a_tx, mut a_rx) = unbounded_channel();
        let (dead_tx, dead_rx) = unbounded_channel();

        registry.connect("a", a_tx);
        registry.connect("dead", dead_tx);
        drain(&mut a_rx);
        drop(dead_rx);

        registry.broadcast_event(&Event::Reaction {
            school_code: "7010057".to_string(),
            likes: 3,
        });

        assert_eq!(
            drain(&mut a_rx),
            vec![
                json!({ "type": "reaction", "school_code": "7010057", "likes": 3 }),
                count(1),
            ]
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reconnect_overwrites_and_release_keeps_newer() {
        let registry = Registry::new();
        let (old_tx, _old_rx) = unbounded_channel();
        let (new_tx, mut new_rx) = unbounded_channel();

        registry.connect("a", old_tx.clone());
        registry.connect("a", new_tx);
        assert_eq!(registry.len(), 1);
        assert_eq!(drain(&mut new_rx), vec![count(1)]);

        registry.release("a", &old_tx);

        assert_eq!(registry.len(), 1);
        assert!(drain(&mut new_rx).is_empty());
    }
}
