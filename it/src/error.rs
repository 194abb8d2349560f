//! Itinerary error types

use thiserror::Error;

use crate::item::ItemId;

/// A broken structural invariant of an [`ItineraryList`](crate::ItineraryList)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("Item {0} appears before any day header")]
    ItemBeforeHeader(ItemId),

    #[error("Item {item} is stored on day {day} but sits under the header for day {header_day}")]
    DayMismatch { item: ItemId, day: u32, header_day: u32 },

    #[error("Day {day} has order {found} where {expected} was expected")]
    OrderGap { day: u32, expected: u32, found: u32 },

    #[error("Day {day} is outside the trip span 1..={trip_days}")]
    DayOutOfRange { day: u32, trip_days: u32 },

    #[error("Header for day {day} is duplicated or out of order")]
    HeaderOrder { day: u32 },

    #[error("Day {0} has a header but no items and is not pinned")]
    EmptyDay(u32),

    #[error("Item {0} appears more than once")]
    DuplicateItem(ItemId),

    #[error("Item set changed ({missing} missing, {unexpected} unexpected)")]
    ItemSetMismatch { missing: usize, unexpected: usize },
}

/// Errors from turning a drag gesture into a normalized list
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReorderError {
    #[error("Item {0} was dropped before the first day header")]
    NoPrecedingHeader(ItemId),

    #[error("Index {index} is out of bounds for a list of {len} entries")]
    OutOfBounds { index: usize, len: usize },

    #[error("Item {0} not found")]
    UnknownItem(ItemId),

    #[error("Position must be 1-based, got {0}")]
    InvalidPosition(u32),
}

/// Errors from [`ItineraryStore`](crate::ItineraryStore) mutations
///
/// Any error leaves the store exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("Reorder rejected: {0}")]
    Reorder(#[from] ReorderError),

    #[error("Item {0} not found")]
    UnknownItem(ItemId),
}
