//! The room/rendezvous facade the coordinator uses to learn about and
//! connect to peers. A real deployment backs this with its own signaling
//! server; the engine only needs this narrow contract.

use crate::channel::Channel;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors a `Signaling` implementation may surface.
#[derive(Debug, Error)]
pub enum SignalingError {
    /// The room already holds the maximum number of direct peers and its
    /// queue is also full.
    #[error("room full")]
    RoomFull,

    /// No peer connected within the configured timeout.
    #[error("connect timed out")]
    ConnectTimeout,
}

/// Facade over peer discovery and connection setup for one room.
#[async_trait]
pub trait Signaling: Send + Sync {
    /// Wait for the next peer to connect and return an open `Channel` to it.
    ///
    /// # Errors
    ///
    /// Returns `SignalingError::RoomFull` if the room is already at
    /// capacity, or `SignalingError::ConnectTimeout` if no peer connects in
    /// time.
    async fn accept(&self) -> Result<Arc<dyn Channel>, SignalingError>;
}
