//! Offline reorder preview
//!
//! Applies moves to a saved trip snapshot and reports the resulting list and
//! the order changes that would be persisted, without talking to a server.

use std::str::FromStr;

use itinerary::{EmptyDayPolicy, ItemId, ItineraryList, ItineraryStore, OrderChange, StoreError};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::trip::Trip;

/// One `ITEM=DAY:POS` move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveSpec {
    pub item: ItemId,
    pub day: u32,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveSpecError {
    #[error("Expected ITEM=DAY:POS, got '{0}'")]
    Format(String),

    #[error("Invalid number '{0}'")]
    Number(String),
}

impl FromStr for MoveSpec {
    type Err = MoveSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (item, target) = s.split_once('=').ok_or_else(|| MoveSpecError::Format(s.to_string()))?;
        let (day, position) = target
            .split_once(':')
            .ok_or_else(|| MoveSpecError::Format(s.to_string()))?;

        let number = |raw: &str| raw.trim().to_string();
        Ok(Self {
            item: ItemId(number(item).parse().map_err(|_| MoveSpecError::Number(number(item)))?),
            day: number(day).parse().map_err(|_| MoveSpecError::Number(number(day)))?,
            position: number(position)
                .parse()
                .map_err(|_| MoveSpecError::Number(number(position)))?,
        })
    }
}

/// Result of a preview run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewReport {
    /// Final display list
    pub entries: ItineraryList,

    /// Changes relative to the snapshot, as the batch order endpoint expects
    pub changes: Vec<OrderChange>,
}

/// Apply `moves` in order to the trip's itinerary
pub fn run_preview(trip: &Trip, moves: &[MoveSpec], policy: EmptyDayPolicy) -> Result<PreviewReport, StoreError> {
    debug!(trip_id = %trip.id, moves = moves.len(), "run_preview: called");
    let mut store = ItineraryStore::with_items(trip.span(), policy, trip.itinerary_items.clone())?;
    for spec in moves {
        store.move_item(spec.item, spec.day, spec.position)?;
    }

    Ok(PreviewReport {
        entries: store.current_snapshot().clone(),
        changes: store.sync_changes(),
    })
}
