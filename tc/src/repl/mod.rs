//! Interactive trip session
//!
//! Plain lines go to the trip chat, slash commands edit the itinerary or
//! prompt the assistant, and inbound events are printed as they arrive.

mod session;

pub use session::{ReplInput, ReplSession};

use std::sync::Arc;

use eyre::{Context, Result};
use tracing::debug;

use crate::config::Config;
use crate::gateway::{HttpGateway, TripGateway};
use crate::realtime::{Connector, WsConnector};
use crate::sync::{SyncCoordinator, SyncOptions};
use crate::trip::TripId;

/// Run the interactive session
///
/// This is the main entry point for `tc join`.
pub async fn run_interactive(config: &Config, trip_id: TripId) -> Result<()> {
    // Validate token early
    config.validate()?;

    let gateway: Arc<dyn TripGateway> = Arc::new(HttpGateway::from_config(&config.server)?);
    let connector: Arc<dyn Connector> = Arc::new(WsConnector::from_config(config)?);

    let handle = SyncCoordinator::spawn(trip_id, gateway, Some(connector), SyncOptions::from(config))
        .await
        .context("Failed to load trip")?;
    debug!(%trip_id, title = handle.title(), "run_interactive: trip loaded");

    let mut session = ReplSession::new(handle);
    session.run().await
}
