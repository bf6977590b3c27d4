//! In-memory event bus.
//!
//! Every subscriber gets its own bounded channel per subscription. Publishing
//! waits for room in each subscriber's channel; subscribers whose receiver
//! was dropped are pruned on the next publish.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::trace;

use crate::domain::{BusError, Event};
use crate::ports::EventBus;

const DEFAULT_CAPACITY: usize = 256;

pub struct InMemoryEventBus {
    subscribers: Mutex<HashMap<String, Vec<mpsc::Sender<Event>>>>,
    capacity: usize,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Drop every subscription; open streams end once drained.
    pub async fn close(&self) {
        self.subscribers.lock().await.clear();
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: Event) -> Result<(), BusError> {
        let targets: Vec<mpsc::Sender<Event>> = {
            let mut subscribers = self.subscribers.lock().await;
            match subscribers.get_mut(&event.topic) {
                Some(senders) => {
                    senders.retain(|tx| !tx.is_closed());
                    senders.clone()
                }
                None => Vec::new(),
            }
        };

        trace!(topic = %event.topic, subscribers = targets.len(), "publish");
        for tx in targets {
            // A receiver dropped between the snapshot and now is not an error.
            let _ = tx.send(event.clone()).await;
        }
        Ok(())
    }

    async fn subscribe(&self, topics: &[&str]) -> Result<mpsc::Receiver<Event>, BusError> {
        if topics.is_empty() {
            return Err(BusError::Subscribe("no topics given".to_string()));
        }

        let (tx, rx) = mpsc::channel(self.capacity);
        let mut subscribers = self.subscribers.lock().await;
        for topic in topics {
            subscribers
                .entry((*topic).to_string())
                .or_default()
                .push(tx.clone());
        }
        Ok(rx)
    }
}
