//! Sync coordinator
//!
//! Reconciles optimistic itinerary edits with the server and merges the
//! realtime chat stream. Itinerary state is invalidated and refetched on
//! divergence; chat is append-only.

mod coordinator;
mod handle;
mod messages;

pub use coordinator::{SyncCoordinator, SyncOptions};
pub use handle::SyncHandle;
pub use messages::{SyncError, SyncEvent, SyncResponse, SyncStatus};
