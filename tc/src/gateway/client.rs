//! TripGateway trait definition

use async_trait::async_trait;
use itinerary::{ItemId, ItemPatch, ItineraryItem, NewItineraryItem, OrderChange};

use super::GatewayError;
use crate::chat::ChatMessage;
use crate::trip::{Trip, TripId, User};

/// Remote trip server
///
/// The server is the single source of truth. Every call either fully
/// succeeds or fully fails; there is no partial success.
#[async_trait]
pub trait TripGateway: Send + Sync {
    /// Full trip snapshot, used for initial load and every refetch
    async fn fetch_trip(&self, trip_id: TripId) -> Result<Trip, GatewayError>;

    /// Chat history of a trip
    async fn fetch_chats(&self, trip_id: TripId) -> Result<Vec<ChatMessage>, GatewayError>;

    /// The user the bearer token belongs to
    async fn fetch_me(&self) -> Result<User, GatewayError>;

    /// Persist a batch of order changes
    async fn submit_order(&self, trip_id: TripId, changes: &[OrderChange]) -> Result<(), GatewayError>;

    /// Create an item; the server assigns its id
    async fn create_item(&self, trip_id: TripId, item: &NewItineraryItem) -> Result<ItineraryItem, GatewayError>;

    /// Update an item's payload
    async fn update_item(
        &self,
        trip_id: TripId,
        item_id: ItemId,
        patch: &ItemPatch,
    ) -> Result<ItineraryItem, GatewayError>;

    /// Delete an item
    async fn delete_item(&self, trip_id: TripId, item_id: ItemId) -> Result<(), GatewayError>;
}
