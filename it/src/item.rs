//! Itinerary item types
//!
//! Items carry a server-assigned id, their `(day, order_in_day)` position and
//! a display payload. Only the position matters to reordering.

use std::fmt;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Server-assigned item identifier, stable across edits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ItemId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// One stop on the itinerary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryItem {
    pub id: ItemId,

    /// 1-based day within the trip
    pub day: u32,

    /// 1-based position within the day, dense
    pub order_in_day: u32,

    pub place_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    /// Assistant-written blurb about the place
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpt_description: Option<String>,
}

impl ItineraryItem {
    /// Create an item with an empty payload apart from the place name
    pub fn new(id: impl Into<ItemId>, day: u32, order_in_day: u32, place_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            day,
            order_in_day,
            place_name: place_name.into(),
            description: None,
            start_time: None,
            end_time: None,
            address: None,
            latitude: None,
            longitude: None,
            gpt_description: None,
        }
    }

    /// Current `(day, order_in_day)` position
    pub fn position(&self) -> (u32, u32) {
        (self.day, self.order_in_day)
    }

    /// Latitude/longitude pair, when both are known
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    /// The change needed to move this item to its current position
    pub fn order_change(&self) -> OrderChange {
        OrderChange {
            id: self.id,
            day: self.day,
            order_in_day: self.order_in_day,
        }
    }
}

/// One entry of a batch order update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderChange {
    pub id: ItemId,
    pub day: u32,
    pub order_in_day: u32,
}

/// Payload for creating a new item; the server assigns the id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItineraryItem {
    pub day: u32,

    /// Position within the day; 0 means "append after the last item"
    pub order_in_day: u32,

    pub place_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl NewItineraryItem {
    /// New item appended to the end of `day`
    pub fn new(day: u32, place_name: impl Into<String>) -> Self {
        Self {
            day,
            order_in_day: 0,
            place_name: place_name.into(),
            description: None,
            start_time: None,
            end_time: None,
            address: None,
            latitude: None,
            longitude: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_times(mut self, start: Option<NaiveTime>, end: Option<NaiveTime>) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// Whether the caller left the position for the store to decide
    pub fn appends(&self) -> bool {
        self.order_in_day == 0
    }
}

/// Partial update of an item's payload
///
/// Absent fields are left untouched by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpt_description: Option<String>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_server_item() {
        let json = r#"{
            "id": 7,
            "trip_id": 3,
            "day": 2,
            "order_in_day": 1,
            "place_name": "Senso-ji",
            "description": null,
            "start_time": "09:30:00",
            "end_time": null,
            "address": "2 Chome-3-1 Asakusa",
            "latitude": 35.7148,
            "longitude": 139.7967,
            "gpt_description": null,
            "created_at": "2024-05-01T10:00:00",
            "updated_at": "2024-05-01T10:00:00"
        }"#;

        let item: ItineraryItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, ItemId(7));
        assert_eq!(item.position(), (2, 1));
        assert_eq!(item.start_time, NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(item.coordinates(), Some((35.7148, 139.7967)));
    }

    #[test]
    fn test_order_change_serializes_wire_names() {
        let change = ItineraryItem::new(5, 1, 3, "Cafe").order_change();
        let json = serde_json::to_value(change).unwrap();
        assert_eq!(json, serde_json::json!({"id": 5, "day": 1, "order_in_day": 3}));
    }

    #[test]
    fn test_new_item_skips_absent_fields() {
        let item = NewItineraryItem::new(1, "Louvre").with_address("Rue de Rivoli");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["place_name"], "Louvre");
        assert_eq!(json["address"], "Rue de Rivoli");
        assert!(json.get("description").is_none());
        assert!(json.get("latitude").is_none());
        assert!(item.appends());

        let json = serde_json::to_value(item.with_coordinates(48.8606, 2.3376)).unwrap();
        assert_eq!(json["latitude"], 48.8606);
        assert_eq!(json["longitude"], 2.3376);
    }

    #[test]
    fn test_empty_patch() {
        assert!(ItemPatch::default().is_empty());
        let patch = ItemPatch {
            description: Some("closed on mondays".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
