//! EventBus port - トピック単位の publish / subscribe
//!
//! Delivery is assumed at-least-once; consumers must tolerate redelivery.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{BusError, Event};

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: Event) -> Result<(), BusError>;

    /// Receive every event published to one of `topics` from now on.
    /// The stream ends when the bus shuts down.
    async fn subscribe(&self, topics: &[&str]) -> Result<mpsc::Receiver<Event>, BusError>;
}
