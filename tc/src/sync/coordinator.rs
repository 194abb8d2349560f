//! SyncCoordinator - actor that owns the itinerary store and chat transcript
//!
//! Processes handle commands, completions of background network calls and
//! realtime channel events one at a time. Local reorders are applied before
//! the server answers; every other mutation waits for success. At most one
//! order submission and one refetch are in flight per trip.

use std::sync::Arc;
use std::time::Duration;

use itinerary::{EditId, InvariantViolation, ItemId, ItineraryItem, ItineraryStore, ReorderOutcome, StoreError};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::handle::SyncHandle;
use super::messages::{Completion, SyncCommand, SyncError, SyncEvent, SyncResponse, SyncStatus};
use crate::chat::{ChatMessage, MessageId, Received, Sender, Transcript};
use crate::config::{Config, ReconnectConfig, SyncConfig};
use crate::gateway::{GatewayError, TripGateway};
use crate::realtime::{
    ChannelError, ChannelEvent, ConnectionState, Connector, EventStream, InboundEvent, OutboundEvent, RealtimeSession,
};
use crate::trip::{TripId, User};

/// Tunables of one coordinator
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub sync: SyncConfig,
    pub reconnect: ReconnectConfig,
}

impl From<&Config> for SyncOptions {
    fn from(config: &Config) -> Self {
        Self {
            sync: config.sync.clone(),
            reconnect: config.realtime.reconnect.clone(),
        }
    }
}

/// Per-trip sync actor state
pub struct SyncCoordinator {
    trip_id: TripId,
    gateway: Arc<dyn TripGateway>,
    connector: Option<Arc<dyn Connector>>,
    options: SyncOptions,

    store: ItineraryStore,
    transcript: Transcript,
    me: Option<User>,

    session: Option<Box<dyn RealtimeSession>>,
    channel_events: Option<EventStream>,
    reconnect_attempt: u32,
    reconnecting: bool,

    in_flight: Option<EditId>,
    refetching: bool,
    refetch_again: bool,
    /// Newest edit a server-side plan change has made stale
    superseded: Option<EditId>,
    mutations: usize,
    settle_waiters: Vec<oneshot::Sender<()>>,

    completion_tx: mpsc::UnboundedSender<Completion>,
    event_tx: broadcast::Sender<SyncEvent>,
}

impl SyncCoordinator {
    /// Load a trip and spawn its coordinator
    ///
    /// Fetches the trip snapshot and the current user, seeds the store and
    /// transcript, opens the realtime session when a connector is given and
    /// returns a handle to the running actor.
    pub async fn spawn(
        trip_id: TripId,
        gateway: Arc<dyn TripGateway>,
        connector: Option<Arc<dyn Connector>>,
        options: SyncOptions,
    ) -> SyncResponse<SyncHandle> {
        debug!(%trip_id, has_connector = connector.is_some(), "spawn: called");
        let trip = gateway.fetch_trip(trip_id).await?;
        let me = match gateway.fetch_me().await {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "spawn: could not resolve current user; own chat echoes will not be matched");
                None
            }
        };

        let history = if trip.chats.is_empty() {
            match gateway.fetch_chats(trip_id).await {
                Ok(chats) => chats,
                Err(e) => {
                    warn!(error = %e, "spawn: could not load chat history");
                    Vec::new()
                }
            }
        } else {
            trip.chats.clone()
        };

        let store = ItineraryStore::with_items(trip.span(), options.sync.empty_days, trip.itinerary_items.clone())?;
        if store.pending_len() > 0 {
            warn!(%trip_id, "spawn: server numbering has gaps, writing back a renumbering");
        }
        info!(
            %trip_id,
            title = %trip.title,
            items = store.current_snapshot().item_count(),
            chats = history.len(),
            "Trip loaded"
        );

        let (tx, rx) = mpsc::channel(options.sync.command_buffer.max(1));
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(options.sync.event_buffer.max(1));

        let mut coordinator = Self {
            trip_id,
            gateway,
            connector,
            options,
            store,
            transcript: Transcript::from_history(history),
            me,
            session: None,
            channel_events: None,
            reconnect_attempt: 0,
            reconnecting: false,
            in_flight: None,
            refetching: false,
            refetch_again: false,
            superseded: None,
            mutations: 0,
            settle_waiters: Vec::new(),
            completion_tx,
            event_tx: event_tx.clone(),
        };
        coordinator.open_session().await;
        coordinator.pump_submissions();

        tokio::spawn(coordinator.run(rx, completion_rx));
        info!(%trip_id, "SyncCoordinator spawned");

        Ok(SyncHandle::new(trip_id, trip.title, tx, event_tx))
    }

    async fn open_session(&mut self) {
        let Some(connector) = self.connector.clone() else {
            return;
        };
        match connector.open(self.trip_id).await {
            Ok((session, events)) => self.attach_session(session, events),
            Err(e) => {
                warn!(error = %e, "open_session: initial connect failed");
                self.schedule_reconnect();
            }
        }
    }

    fn attach_session(&mut self, session: Box<dyn RealtimeSession>, events: EventStream) {
        debug!("attach_session: called");
        self.session = Some(session);
        self.channel_events = Some(events);
        self.reconnect_attempt = 0;
        self.reconnecting = false;
        self.emit(SyncEvent::ChannelOpened);
    }

    async fn run(mut self, mut rx: mpsc::Receiver<SyncCommand>, mut completion_rx: mpsc::UnboundedReceiver<Completion>) {
        debug!(trip_id = %self.trip_id, "SyncCoordinator actor started");

        loop {
            tokio::select! {
                // Server-side events before local commands
                biased;

                event = next_channel_event(&mut self.channel_events) => self.handle_channel_event(event),
                Some(completion) = completion_rx.recv() => self.handle_completion(completion),
                cmd = rx.recv() => match cmd {
                    Some(SyncCommand::Shutdown { reply }) => {
                        info!(trip_id = %self.trip_id, "SyncCoordinator shutting down");
                        self.close_session().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        debug!("run: all handles dropped");
                        self.close_session().await;
                        break;
                    }
                },
            }
            self.notify_settled();
        }

        debug!(trip_id = %self.trip_id, "SyncCoordinator actor stopped");
    }

    async fn handle_command(&mut self, cmd: SyncCommand) {
        match cmd {
            SyncCommand::Snapshot { reply } => {
                let _ = reply.send(self.store.current_snapshot().clone());
            }

            SyncCommand::Transcript { reply } => {
                let _ = reply.send(self.transcript.messages().to_vec());
            }

            SyncCommand::Status { reply } => {
                let _ = reply.send(self.status().await);
            }

            SyncCommand::Reorder { list, reply } => {
                debug!(entries = list.len(), "handle_command: Reorder");
                let result = self.store.apply_reorder(list);
                let _ = reply.send(self.after_reorder(result));
            }

            SyncCommand::MoveEntry { from, to, reply } => {
                debug!(from, to, "handle_command: MoveEntry");
                let result = self.store.move_entry(from, to);
                let _ = reply.send(self.after_reorder(result));
            }

            SyncCommand::MoveItem {
                id,
                day,
                position,
                reply,
            } => {
                debug!(%id, day, position, "handle_command: MoveItem");
                let result = self.store.move_item(id, day, position);
                let _ = reply.send(self.after_reorder(result));
            }

            SyncCommand::RemoveItem { id, reply } => {
                debug!(%id, "handle_command: RemoveItem");
                if !self.store.current_snapshot().contains_item(id) {
                    let _ = reply.send(Err(StoreError::UnknownItem(id).into()));
                    return;
                }
                self.mutations += 1;
                let gateway = self.gateway.clone();
                let tx = self.completion_tx.clone();
                let trip_id = self.trip_id;
                tokio::spawn(async move {
                    let result = gateway.delete_item(trip_id, id).await;
                    let _ = tx.send(Completion::Deleted { id, result, reply });
                });
            }

            SyncCommand::CreateItem { mut item, reply } => {
                debug!(day = item.day, place = %item.place_name, "handle_command: CreateItem");
                if !self.store.span().contains(item.day) {
                    let err = InvariantViolation::DayOutOfRange {
                        day: item.day,
                        trip_days: self.store.span().trip_days,
                    };
                    let _ = reply.send(Err(StoreError::from(err).into()));
                    return;
                }
                // The server appends; a requested slot is applied as a local move afterwards
                let requested_position = (!item.appends()).then_some(item.order_in_day);
                item.order_in_day = self.store.next_order_in_day(item.day);

                self.mutations += 1;
                let gateway = self.gateway.clone();
                let tx = self.completion_tx.clone();
                let trip_id = self.trip_id;
                tokio::spawn(async move {
                    let result = gateway.create_item(trip_id, &item).await;
                    let _ = tx.send(Completion::Created {
                        requested_position,
                        result,
                        reply,
                    });
                });
            }

            SyncCommand::UpdateItem { id, patch, reply } => {
                debug!(%id, "handle_command: UpdateItem");
                if !self.store.current_snapshot().contains_item(id) {
                    let _ = reply.send(Err(StoreError::UnknownItem(id).into()));
                    return;
                }
                self.mutations += 1;
                let gateway = self.gateway.clone();
                let tx = self.completion_tx.clone();
                let trip_id = self.trip_id;
                tokio::spawn(async move {
                    let result = gateway.update_item(trip_id, id, &patch).await;
                    let _ = tx.send(Completion::Updated { result, reply });
                });
            }

            SyncCommand::PinDay { day, reply } => {
                debug!(day, "handle_command: PinDay");
                let before = self.store.revision();
                let result = self.store.pin_day(day).map_err(SyncError::from);
                if self.store.revision() != before {
                    self.emit_itinerary_changed();
                }
                let _ = reply.send(result);
            }

            SyncCommand::UnpinDay { day, reply } => {
                debug!(day, "handle_command: UnpinDay");
                let before = self.store.revision();
                self.store.unpin_day(day);
                if self.store.revision() != before {
                    self.emit_itinerary_changed();
                }
                let _ = reply.send(());
            }

            SyncCommand::SendChat { text, reply } => {
                debug!(len = text.len(), "handle_command: SendChat");
                let event = OutboundEvent::ChatMessage { message: text.clone() };
                let _ = reply.send(self.send_chat(event, text, false).await);
            }

            SyncCommand::SendPrompt { text, reply } => {
                debug!(len = text.len(), "handle_command: SendPrompt");
                let event = OutboundEvent::AssistantPrompt {
                    user_prompt: text.clone(),
                };
                let _ = reply.send(self.send_chat(event, text, true).await);
            }

            SyncCommand::Refresh { reply } => {
                debug!("handle_command: Refresh");
                self.request_refetch(false);
                let _ = reply.send(());
            }

            SyncCommand::Settle { reply } => {
                debug!("handle_command: Settle");
                self.settle_waiters.push(reply);
            }

            SyncCommand::Shutdown { reply } => {
                // Handled by the run loop
                let _ = reply.send(());
            }
        }
    }

    fn after_reorder(&mut self, result: Result<ReorderOutcome, StoreError>) -> SyncResponse<ReorderOutcome> {
        let outcome = result?;
        if let ReorderOutcome::Staged { edit, changes } = &outcome {
            debug!(%edit, changed = changes.len(), "after_reorder: staged");
            self.emit_itinerary_changed();
            self.pump_submissions();
        }
        Ok(outcome)
    }

    async fn send_chat(&mut self, event: OutboundEvent, text: String, to_assistant: bool) -> SyncResponse<MessageId> {
        let Some(session) = &self.session else {
            return Err(ChannelError::NotConnected.into());
        };
        session.send(&event).await?;

        let sender = self.me.as_ref().map(|user| Sender {
            id: user.id,
            display_name: user.nickname.clone(),
        });
        let message = ChatMessage::local(text, sender, to_assistant);
        let id = self.transcript.push_local(message.clone());
        self.emit(SyncEvent::ChatAppended {
            message,
            replaced: false,
        });
        Ok(id)
    }

    async fn status(&self) -> SyncStatus {
        let channel = match &self.session {
            Some(session) => session.state().await,
            None if self.reconnecting => ConnectionState::Connecting,
            None => ConnectionState::Closed,
        };
        SyncStatus {
            channel,
            pending_edits: self.store.pending_len(),
            unconfirmed_chats: self.transcript.unconfirmed(),
            submitting: self.in_flight.is_some(),
            refetching: self.refetching,
            revision: self.store.revision(),
        }
    }

    /// Submit the newest pending arrangement if nothing is in flight
    fn pump_submissions(&mut self) {
        if self.in_flight.is_some() || self.refetching {
            return;
        }
        let Some(edit) = self.store.latest_edit() else {
            return;
        };

        let changes = self.store.sync_changes();
        if changes.is_empty() {
            debug!(%edit, "pump_submissions: nothing to persist");
            self.store.confirm(edit);
            return;
        }

        debug!(%edit, changed = changes.len(), "pump_submissions: submitting order");
        self.in_flight = Some(edit);
        let gateway = self.gateway.clone();
        let tx = self.completion_tx.clone();
        let trip_id = self.trip_id;
        tokio::spawn(async move {
            let result = gateway.submit_order(trip_id, &changes).await;
            let _ = tx.send(Completion::Submitted { edit, result });
        });
    }

    /// Start a refetch, or queue one behind the refetch in flight
    ///
    /// With `supersede`, every edit pending now is dropped when the snapshot
    /// lands; later edits are replayed on top of it.
    fn request_refetch(&mut self, supersede: bool) {
        if supersede {
            if let Some(latest) = self.store.latest_edit() {
                debug!(%latest, "request_refetch: pending edits superseded");
                self.superseded = Some(self.superseded.map_or(latest, |marked| marked.max(latest)));
            }
        }
        if self.refetching {
            debug!("request_refetch: already in flight, coalescing");
            self.refetch_again = true;
            return;
        }

        debug!("request_refetch: starting");
        self.refetching = true;
        self.emit(SyncEvent::RefetchStarted);
        let gateway = self.gateway.clone();
        let tx = self.completion_tx.clone();
        let trip_id = self.trip_id;
        tokio::spawn(async move {
            let result = gateway.fetch_trip(trip_id).await;
            let _ = tx.send(Completion::Refetched { result });
        });
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Submitted { edit, result } => {
                self.in_flight = None;
                match result {
                    Ok(()) => {
                        if !self.store.confirm(edit) {
                            debug!(%edit, "handle_completion: confirmed edit was superseded");
                            self.request_refetch(false);
                        }
                    }
                    Err(e) => {
                        warn!(%edit, error = %e, "handle_completion: order submission failed");
                        self.emit(SyncEvent::PersistenceFailed { error: e.to_string() });
                        let before = self.store.revision();
                        self.store.discard_pending();
                        if self.store.revision() != before {
                            self.emit_itinerary_changed();
                        }
                        self.request_refetch(false);
                    }
                }
                self.pump_submissions();
            }

            Completion::Refetched { result } => {
                self.refetching = false;
                match result {
                    Ok(trip) => match self.store.rebase(trip.span(), trip.itinerary_items, self.superseded) {
                        Ok(rebased) => {
                            debug!(
                                revision = self.store.revision(),
                                superseded = rebased.superseded,
                                replayed = rebased.replayed,
                                rejected = rebased.rejected.len(),
                                "handle_completion: refetch applied"
                            );
                            self.superseded = None;
                            self.emit_itinerary_changed();
                            for (edit, e) in rebased.rejected {
                                self.emit(SyncEvent::EditRejected {
                                    edit,
                                    error: e.to_string(),
                                });
                            }
                        }
                        Err(e) => {
                            self.emit(SyncEvent::SnapshotRejected { error: e.to_string() });
                        }
                    },
                    Err(e) => {
                        warn!(error = %e, "handle_completion: refetch failed");
                        self.emit(SyncEvent::RefetchFailed { error: e.to_string() });
                    }
                }

                if self.refetch_again {
                    self.refetch_again = false;
                    self.request_refetch(false);
                } else {
                    self.pump_submissions();
                }
            }

            Completion::Deleted { id, result, reply } => {
                self.mutations -= 1;
                let _ = reply.send(self.after_delete(id, result));
            }

            Completion::Created {
                requested_position,
                result,
                reply,
            } => {
                self.mutations -= 1;
                let _ = reply.send(self.after_create(requested_position, result));
            }

            Completion::Updated { result, reply } => {
                self.mutations -= 1;
                let item = match result {
                    Ok(item) => item,
                    Err(e) => {
                        warn!(error = %e, "handle_completion: item update failed");
                        self.emit(SyncEvent::PersistenceFailed { error: e.to_string() });
                        let _ = reply.send(Err(e.into()));
                        return;
                    }
                };
                match self.store.update_item(item.clone()) {
                    Ok(()) => self.emit_itinerary_changed(),
                    Err(e) => {
                        debug!(error = %e, "handle_completion: updated item no longer local");
                        self.request_refetch(false);
                    }
                }
                let _ = reply.send(Ok(item));
            }

            Completion::Reconnected { result } => match result {
                Ok((session, events)) => {
                    info!(trip_id = %self.trip_id, "Realtime channel reconnected");
                    self.attach_session(session, events);
                    // Plan updates may have been missed while closed
                    self.request_refetch(false);
                }
                Err(e) => {
                    warn!(error = %e, attempt = self.reconnect_attempt, "handle_completion: reconnect failed");
                    self.reconnecting = false;
                    self.schedule_reconnect();
                }
            },
        }
    }

    fn after_delete(&mut self, id: ItemId, result: Result<(), GatewayError>) -> SyncResponse<ReorderOutcome> {
        if let Err(e) = result {
            warn!(%id, error = %e, "after_delete: delete failed");
            self.emit(SyncEvent::PersistenceFailed { error: e.to_string() });
            return Err(e.into());
        }

        match self.store.remove_item(id) {
            Ok(outcome) => {
                self.emit_itinerary_changed();
                self.pump_submissions();
                Ok(outcome)
            }
            Err(StoreError::UnknownItem(_)) => {
                debug!(%id, "after_delete: item already gone locally");
                Ok(ReorderOutcome::Unchanged)
            }
            Err(e) => {
                warn!(%id, error = %e, "after_delete: local compaction rejected");
                self.request_refetch(false);
                Err(e.into())
            }
        }
    }

    fn after_create(
        &mut self,
        requested_position: Option<u32>,
        result: Result<ItineraryItem, GatewayError>,
    ) -> SyncResponse<ItineraryItem> {
        let item = match result {
            Ok(item) => item,
            Err(e) => {
                warn!(error = %e, "after_create: create failed");
                self.emit(SyncEvent::PersistenceFailed { error: e.to_string() });
                return Err(e.into());
            }
        };

        if let Err(e) = self.store.insert_item(item.clone()) {
            debug!(id = %item.id, error = %e, "after_create: server position does not fit, refetching");
            self.request_refetch(false);
            return Ok(item);
        }
        self.emit_itinerary_changed();

        let Some(requested_position) = requested_position else {
            return Ok(item);
        };
        let (day, appended_at) = self
            .store
            .current_snapshot()
            .item(item.id)
            .map(|local| local.position())
            .unwrap_or((item.day, item.order_in_day));
        if requested_position < appended_at {
            match self.store.move_item(item.id, day, requested_position) {
                Ok(ReorderOutcome::Staged { .. }) => {
                    self.emit_itinerary_changed();
                    self.pump_submissions();
                }
                Ok(ReorderOutcome::Unchanged) => {}
                Err(e) => warn!(id = %item.id, error = %e, "after_create: could not move to requested position"),
            }
        }
        Ok(item)
    }

    fn handle_channel_event(&mut self, event: Option<ChannelEvent>) {
        let event = event.unwrap_or_else(|| ChannelEvent::Closed {
            reason: "event stream ended".to_string(),
        });

        match event {
            ChannelEvent::Inbound(event) if event.invalidates_itinerary() => {
                debug!(?event, "handle_channel_event: itinerary changed on the server");
                if let InboundEvent::PlanUpdate { message: Some(message) } = event {
                    self.emit(SyncEvent::Notice { message });
                }
                self.request_refetch(true);
            }

            ChannelEvent::Inbound(InboundEvent::ChatMessage(message)) => {
                debug!(id = %message.id, "handle_channel_event: chat message");
                let me = self.me.as_ref().map(|user| user.id);
                let received = self.transcript.receive(message.clone(), me);
                self.emit(SyncEvent::ChatAppended {
                    message,
                    replaced: matches!(received, Received::Replaced(_)),
                });
            }

            ChannelEvent::Inbound(InboundEvent::SystemMessage { message }) => {
                self.emit(SyncEvent::Notice { message });
            }

            ChannelEvent::Inbound(event) => {
                debug!(?event, "handle_channel_event: nothing to do");
            }

            ChannelEvent::Closed { reason } => {
                info!(trip_id = %self.trip_id, %reason, "Realtime channel closed");
                self.session = None;
                self.channel_events = None;
                self.emit(SyncEvent::ChannelClosed { reason });
                self.schedule_reconnect();
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        let Some(connector) = self.connector.clone() else {
            return;
        };
        let reconnect = &self.options.reconnect;
        if !reconnect.enabled {
            debug!("schedule_reconnect: reconnect disabled");
            return;
        }
        if self.reconnect_attempt >= reconnect.max_attempts {
            warn!(attempts = self.reconnect_attempt, "schedule_reconnect: giving up");
            return;
        }

        self.reconnect_attempt += 1;
        let attempt = self.reconnect_attempt;
        let delay_ms = reconnect.backoff_ms(attempt);
        self.reconnecting = true;
        self.emit(SyncEvent::Reconnecting { attempt, delay_ms });

        let tx = self.completion_tx.clone();
        let trip_id = self.trip_id;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let result = connector.open(trip_id).await;
            let _ = tx.send(Completion::Reconnected { result });
        });
    }

    async fn close_session(&mut self) {
        self.channel_events = None;
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                debug!(error = %e, "close_session: close failed");
            }
        }
    }

    fn is_settled(&self) -> bool {
        self.in_flight.is_none()
            && !self.refetching
            && !self.refetch_again
            && self.mutations == 0
            && self.store.pending_len() == 0
    }

    fn notify_settled(&mut self) {
        if self.settle_waiters.is_empty() || !self.is_settled() {
            return;
        }
        debug!(waiters = self.settle_waiters.len(), "notify_settled: idle");
        for waiter in self.settle_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn emit_itinerary_changed(&self) {
        self.emit(SyncEvent::ItineraryChanged {
            revision: self.store.revision(),
        });
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

async fn next_channel_event(events: &mut Option<EventStream>) -> Option<ChannelEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
