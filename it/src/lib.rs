//! Itinerary - day-grouped trip itinerary model
//!
//! This crate holds the pure, synchronous core of collaborative itinerary
//! editing:
//! - `item`: itinerary items and their wire payloads
//! - `list`: the interleaved day-header/item list a drag UI displays
//! - `reorder`: normalization of a dragged list into dense per-day numbering
//! - `store`: confirmed/pending reducer with fail-closed validation

pub mod error;
pub mod item;
pub mod list;
pub mod reorder;
pub mod store;

pub use error::{InvariantViolation, ReorderError, StoreError};
pub use item::{ItemId, ItemPatch, ItineraryItem, NewItineraryItem, OrderChange};
pub use list::{DayHeader, ItineraryList, ListEntry, TripSpan};
pub use reorder::{Reordered, diff_positions, normalize};
pub use store::{EditId, EmptyDayPolicy, ItineraryStore, Rebased, ReorderOutcome};
