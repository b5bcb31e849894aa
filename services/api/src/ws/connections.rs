//! Registry of connected UI observers.

use async_trait::async_trait;
use huddle_core::{BroadcastSink, UiEvent};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Each observer gets its own unbounded queue, drained by that socket's writer task.
#[derive(Default)]
pub struct ConnectionManager {
    observers: RwLock<HashMap<Uuid, mpsc::UnboundedSender<UiEvent>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self) -> (Uuid, mpsc::UnboundedReceiver<UiEvent>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        observers.insert(id, tx);
        info!(connection_id = %id, total = observers.len(), "UI connection added");
        (id, rx)
    }

    pub fn remove(&self, id: &Uuid) {
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        if observers.remove(id).is_some() {
            info!(connection_id = %id, total = observers.len(), "UI connection removed");
        }
    }

    pub fn len(&self) -> usize {
        self.observers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn deliver(&self, event: &UiEvent) {
        let failed: Vec<Uuid> = {
            let observers = self.observers.read().unwrap_or_else(|e| e.into_inner());
            observers
                .iter()
                .filter(|(_, tx)| tx.send(event.clone()).is_err())
                .map(|(id, _)| *id)
                .collect()
        };
        for id in failed {
            debug!(connection_id = %id, "Dropping closed UI connection");
            self.remove(&id);
        }
    }
}

#[async_trait]
impl BroadcastSink for ConnectionManager {
    async fn send_to_all(&self, event: UiEvent) {
        self.deliver(&event);
    }
}
