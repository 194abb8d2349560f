//! Realtime channel
//!
//! One WebSocket session per open trip view. Outbound chat and assistant
//! prompts, inbound chat and plan updates, delivered in transport order.

pub mod channel;
mod error;
mod messages;
mod ws;

pub use channel::{ChannelEvent, ConnectionState, Connector, EventStream, RealtimeSession};
pub use error::ChannelError;
pub use messages::{InboundEvent, OutboundEvent, parse_inbound};
pub use ws::{WsConnector, WsSession};
