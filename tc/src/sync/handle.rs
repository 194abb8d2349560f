//! SyncHandle - cloneable client of a running SyncCoordinator

use itinerary::{ItemId, ItemPatch, ItineraryItem, ItineraryList, NewItineraryItem, ReorderOutcome};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use super::messages::{SyncCommand, SyncError, SyncEvent, SyncResponse, SyncStatus};
use crate::chat::{ChatMessage, MessageId};
use crate::trip::TripId;

/// Handle to send commands to the SyncCoordinator
#[derive(Clone)]
pub struct SyncHandle {
    trip_id: TripId,
    /// Trip title as loaded at spawn
    title: String,
    tx: mpsc::Sender<SyncCommand>,
    /// Broadcast sender for sync notifications
    event_tx: broadcast::Sender<SyncEvent>,
}

impl SyncHandle {
    pub(crate) fn new(
        trip_id: TripId,
        title: String,
        tx: mpsc::Sender<SyncCommand>,
        event_tx: broadcast::Sender<SyncEvent>,
    ) -> Self {
        Self {
            trip_id,
            title,
            tx,
            event_tx,
        }
    }

    pub fn trip_id(&self) -> TripId {
        self.trip_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Subscribe to sync events (itinerary changes, chat, failures)
    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> SyncCommand) -> SyncResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(make(reply_tx)).await.map_err(|_| SyncError::Stopped)?;
        reply_rx.await.map_err(|_| SyncError::Stopped)
    }

    // === Queries ===

    /// Current itinerary: the newest pending arrangement, else the confirmed one
    pub async fn snapshot(&self) -> SyncResponse<ItineraryList> {
        debug!(trip_id = %self.trip_id, "snapshot: called");
        self.request(|reply| SyncCommand::Snapshot { reply }).await
    }

    /// Chat transcript in arrival order
    pub async fn transcript(&self) -> SyncResponse<Vec<ChatMessage>> {
        debug!(trip_id = %self.trip_id, "transcript: called");
        self.request(|reply| SyncCommand::Transcript { reply }).await
    }

    pub async fn status(&self) -> SyncResponse<SyncStatus> {
        debug!(trip_id = %self.trip_id, "status: called");
        self.request(|reply| SyncCommand::Status { reply }).await
    }

    // === Itinerary operations ===

    /// Stage a rearranged list and persist it in the background
    ///
    /// Returns the engine diff. Invariant violations are rejected here and
    /// never reach the server.
    pub async fn reorder(&self, list: ItineraryList) -> SyncResponse<ReorderOutcome> {
        debug!(trip_id = %self.trip_id, entries = list.len(), "reorder: called");
        self.request(|reply| SyncCommand::Reorder { list, reply }).await?
    }

    /// Drag the entry at index `from` to index `to`
    pub async fn move_entry(&self, from: usize, to: usize) -> SyncResponse<ReorderOutcome> {
        debug!(trip_id = %self.trip_id, from, to, "move_entry: called");
        self.request(|reply| SyncCommand::MoveEntry { from, to, reply }).await?
    }

    /// Move an item to a 1-based position within a day
    pub async fn move_item(&self, id: ItemId, day: u32, position: u32) -> SyncResponse<ReorderOutcome> {
        debug!(trip_id = %self.trip_id, %id, day, position, "move_item: called");
        self.request(|reply| SyncCommand::MoveItem {
            id,
            day,
            position,
            reply,
        })
        .await?
    }

    /// Delete an item on the server, then compact its day locally
    pub async fn remove_item(&self, id: ItemId) -> SyncResponse<ReorderOutcome> {
        debug!(trip_id = %self.trip_id, %id, "remove_item: called");
        self.request(|reply| SyncCommand::RemoveItem { id, reply }).await?
    }

    /// Create an item; `order_in_day` 0 appends
    pub async fn create_item(&self, item: NewItineraryItem) -> SyncResponse<ItineraryItem> {
        debug!(trip_id = %self.trip_id, day = item.day, "create_item: called");
        self.request(|reply| SyncCommand::CreateItem { item, reply }).await?
    }

    pub async fn update_item(&self, id: ItemId, patch: ItemPatch) -> SyncResponse<ItineraryItem> {
        debug!(trip_id = %self.trip_id, %id, "update_item: called");
        self.request(|reply| SyncCommand::UpdateItem { id, patch, reply }).await?
    }

    /// Keep a day's header even while it has no items
    pub async fn pin_day(&self, day: u32) -> SyncResponse<()> {
        debug!(trip_id = %self.trip_id, day, "pin_day: called");
        self.request(|reply| SyncCommand::PinDay { day, reply }).await?
    }

    pub async fn unpin_day(&self, day: u32) -> SyncResponse<()> {
        debug!(trip_id = %self.trip_id, day, "unpin_day: called");
        self.request(|reply| SyncCommand::UnpinDay { day, reply }).await
    }

    // === Chat operations ===

    /// Send a chat line to the other participants
    pub async fn send_chat(&self, text: impl Into<String>) -> SyncResponse<MessageId> {
        let text = text.into();
        debug!(trip_id = %self.trip_id, len = text.len(), "send_chat: called");
        self.request(|reply| SyncCommand::SendChat { text, reply }).await?
    }

    /// Ask the assistant; it may rewrite the itinerary
    pub async fn send_prompt(&self, text: impl Into<String>) -> SyncResponse<MessageId> {
        let text = text.into();
        debug!(trip_id = %self.trip_id, len = text.len(), "send_prompt: called");
        self.request(|reply| SyncCommand::SendPrompt { text, reply }).await?
    }

    // === Lifecycle ===

    /// Discard local state and refetch from the server
    pub async fn refresh(&self) -> SyncResponse<()> {
        debug!(trip_id = %self.trip_id, "refresh: called");
        self.request(|reply| SyncCommand::Refresh { reply }).await
    }

    /// Wait until no submission, refetch or item mutation is outstanding
    pub async fn settle(&self) -> SyncResponse<()> {
        debug!(trip_id = %self.trip_id, "settle: called");
        self.request(|reply| SyncCommand::Settle { reply }).await
    }

    /// Close the realtime session and stop the actor
    ///
    /// Results of calls still in flight are discarded.
    pub async fn shutdown(&self) -> SyncResponse<()> {
        debug!(trip_id = %self.trip_id, "shutdown: called");
        self.request(|reply| SyncCommand::Shutdown { reply }).await
    }
}
