//! Trip wire types

use std::fmt;

use chrono::NaiveDate;
use itinerary::{ItineraryItem, TripSpan};
use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;

/// Server-assigned trip identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TripId(pub i64);

impl fmt::Display for TripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TripId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Full trip as returned by the trip snapshot endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,

    pub title: String,

    pub start_date: NaiveDate,

    pub end_date: NaiveDate,

    #[serde(default)]
    pub itinerary_items: Vec<ItineraryItem>,

    #[serde(default)]
    pub chats: Vec<ChatMessage>,
}

impl Trip {
    /// Day span: `end_date - start_date + 1` days starting at `start_date`
    pub fn span(&self) -> TripSpan {
        TripSpan::from_dates(self.start_date, self.end_date)
    }
}

/// The authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub nickname: String,
}
