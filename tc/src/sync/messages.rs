//! Sync coordinator messages
//!
//! Commands, completions and events for the actor pattern.

use itinerary::{
    EditId, ItemId, ItemPatch, ItineraryItem, ItineraryList, NewItineraryItem, ReorderOutcome, StoreError,
};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::chat::{ChatMessage, MessageId};
use crate::gateway::GatewayError;
use crate::realtime::{ChannelError, ConnectionState, EventStream, RealtimeSession};
use crate::trip::Trip;

/// Errors from sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Rejected locally: {0}")]
    Store(#[from] StoreError),

    #[error("Server error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Realtime channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Sync coordinator has stopped")]
    Stopped,
}

/// Response from sync operations
pub type SyncResponse<T> = Result<T, SyncError>;

/// Snapshot of the coordinator's bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub channel: ConnectionState,
    pub pending_edits: usize,
    /// Chat messages sent from here that the server has not echoed yet
    pub unconfirmed_chats: usize,
    pub submitting: bool,
    pub refetching: bool,
    pub revision: u64,
}

/// Event broadcast when trip state changes
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// The current itinerary snapshot changed
    ItineraryChanged { revision: u64 },
    /// A chat message landed in the transcript
    ChatAppended { message: ChatMessage, replaced: bool },
    /// Informational notice from the server, not stored
    Notice { message: String },
    RefetchStarted,
    RefetchFailed { error: String },
    /// A mutation failed on the server; local state is being refetched
    PersistenceFailed { error: String },
    /// A refetched snapshot broke an itinerary invariant and was ignored
    SnapshotRejected { error: String },
    /// A local edit no longer fit a refetched snapshot and was dropped
    EditRejected { edit: EditId, error: String },
    ChannelOpened,
    ChannelClosed { reason: String },
    Reconnecting { attempt: u32, delay_ms: u64 },
}

/// Commands sent to the SyncCoordinator actor
#[derive(Debug)]
pub(crate) enum SyncCommand {
    // Queries
    Snapshot {
        reply: oneshot::Sender<ItineraryList>,
    },
    Transcript {
        reply: oneshot::Sender<Vec<ChatMessage>>,
    },
    Status {
        reply: oneshot::Sender<SyncStatus>,
    },

    // Itinerary operations
    Reorder {
        list: ItineraryList,
        reply: oneshot::Sender<SyncResponse<ReorderOutcome>>,
    },
    MoveEntry {
        from: usize,
        to: usize,
        reply: oneshot::Sender<SyncResponse<ReorderOutcome>>,
    },
    MoveItem {
        id: ItemId,
        day: u32,
        position: u32,
        reply: oneshot::Sender<SyncResponse<ReorderOutcome>>,
    },
    RemoveItem {
        id: ItemId,
        reply: oneshot::Sender<SyncResponse<ReorderOutcome>>,
    },
    CreateItem {
        item: NewItineraryItem,
        reply: oneshot::Sender<SyncResponse<ItineraryItem>>,
    },
    UpdateItem {
        id: ItemId,
        patch: ItemPatch,
        reply: oneshot::Sender<SyncResponse<ItineraryItem>>,
    },
    PinDay {
        day: u32,
        reply: oneshot::Sender<SyncResponse<()>>,
    },
    UnpinDay {
        day: u32,
        reply: oneshot::Sender<()>,
    },

    // Chat operations
    SendChat {
        text: String,
        reply: oneshot::Sender<SyncResponse<MessageId>>,
    },
    SendPrompt {
        text: String,
        reply: oneshot::Sender<SyncResponse<MessageId>>,
    },

    // Lifecycle
    Refresh {
        reply: oneshot::Sender<()>,
    },
    Settle {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Results of background network calls, reported back to the actor
pub(crate) enum Completion {
    Submitted {
        edit: EditId,
        result: Result<(), GatewayError>,
    },
    Refetched {
        result: Result<Trip, GatewayError>,
    },
    Deleted {
        id: ItemId,
        result: Result<(), GatewayError>,
        reply: oneshot::Sender<SyncResponse<ReorderOutcome>>,
    },
    Created {
        requested_position: Option<u32>,
        result: Result<ItineraryItem, GatewayError>,
        reply: oneshot::Sender<SyncResponse<ItineraryItem>>,
    },
    Updated {
        result: Result<ItineraryItem, GatewayError>,
        reply: oneshot::Sender<SyncResponse<ItineraryItem>>,
    },
    Reconnected {
        result: Result<(Box<dyn RealtimeSession>, EventStream), ChannelError>,
    },
}
