//! Realtime session and connector traits

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ChannelError, InboundEvent, OutboundEvent};
use crate::trip::TripId;

/// Session lifecycle: `Closed -> Connecting -> Open -> Closed`
///
/// `Closed` is terminal for a session; reconnecting means opening a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
}

/// What a session's event stream yields
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Inbound(InboundEvent),

    /// The transport closed or failed; no further events follow
    Closed { reason: String },
}

/// Inbound events of one session, in transport order
pub type EventStream = mpsc::UnboundedReceiver<ChannelEvent>;

/// An open realtime session for one trip
#[async_trait]
pub trait RealtimeSession: Send + Sync {
    async fn send(&self, event: &OutboundEvent) -> Result<(), ChannelError>;

    /// Close the session; further sends fail
    async fn close(&self) -> Result<(), ChannelError>;

    async fn state(&self) -> ConnectionState;
}

/// Opens realtime sessions
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, trip_id: TripId) -> Result<(Box<dyn RealtimeSession>, EventStream), ChannelError>;
}
