//! Interleaved day-header/item list
//!
//! An [`ItineraryList`] is exactly what a drag-and-drop UI displays: a flat
//! sequence of day headers, each followed by that day's items in order.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{InvariantViolation, ReorderError};
use crate::item::{ItemId, ItineraryItem};

/// Day span of a trip and the date of day 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripSpan {
    pub trip_days: u32,
    pub start_date: Option<NaiveDate>,
}

impl TripSpan {
    pub fn new(trip_days: u32) -> Self {
        Self {
            trip_days,
            start_date: None,
        }
    }

    /// Span covering `start..=end`; an end before the start yields zero days
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Self {
        let days = (end - start).num_days() + 1;
        Self {
            trip_days: u32::try_from(days.max(0)).unwrap_or(u32::MAX),
            start_date: Some(start),
        }
    }

    pub fn contains(&self, day: u32) -> bool {
        day >= 1 && day <= self.trip_days
    }

    /// Presentational label for `day`, e.g. `2024-05-02 (Thu)`
    pub fn date_label(&self, day: u32) -> Option<String> {
        let start = self.start_date?;
        let date = start.checked_add_days(Days::new(u64::from(day.checked_sub(1)?)))?;
        Some(date.format("%Y-%m-%d (%a)").to_string())
    }

    pub fn header(&self, day: u32) -> DayHeader {
        DayHeader {
            day,
            date_label: self.date_label(day),
        }
    }
}

/// Display-only marker preceding a day's items; never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHeader {
    pub day: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_label: Option<String>,
}

impl DayHeader {
    pub fn new(day: u32) -> Self {
        Self { day, date_label: None }
    }
}

/// One row of the draggable list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListEntry {
    DayHeader(DayHeader),
    Item(ItineraryItem),
}

impl ListEntry {
    pub fn header(day: u32) -> Self {
        Self::DayHeader(DayHeader::new(day))
    }

    pub fn as_item(&self) -> Option<&ItineraryItem> {
        match self {
            Self::Item(item) => Some(item),
            Self::DayHeader(_) => None,
        }
    }

    pub fn as_header(&self) -> Option<&DayHeader> {
        match self {
            Self::DayHeader(header) => Some(header),
            Self::Item(_) => None,
        }
    }
}

impl From<ItineraryItem> for ListEntry {
    fn from(item: ItineraryItem) -> Self {
        Self::Item(item)
    }
}

impl From<DayHeader> for ListEntry {
    fn from(header: DayHeader) -> Self {
        Self::DayHeader(header)
    }
}

/// Ordered sequence of day headers and items
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItineraryList {
    entries: Vec<ListEntry>,
}

impl ItineraryList {
    pub fn new(entries: Vec<ListEntry>) -> Self {
        Self { entries }
    }

    /// Build the display list from stored items
    ///
    /// Items are sorted by `(day, order_in_day, id)` and a header is emitted
    /// for every day that has items or is pinned. Stored values are never
    /// rewritten here; call [`validate`](Self::validate) to check them.
    pub fn from_items(items: impl IntoIterator<Item = ItineraryItem>, pinned: &BTreeSet<u32>, span: &TripSpan) -> Self {
        let mut by_day: BTreeMap<u32, Vec<ItineraryItem>> = pinned.iter().map(|day| (*day, Vec::new())).collect();
        for item in items {
            by_day.entry(item.day).or_default().push(item);
        }

        let mut entries = Vec::new();
        for (day, mut items) in by_day {
            items.sort_by_key(|item| (item.order_in_day, item.id));
            entries.push(ListEntry::DayHeader(span.header(day)));
            entries.extend(items.into_iter().map(ListEntry::Item));
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[ListEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ListEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = &ItineraryItem> {
        self.entries.iter().filter_map(ListEntry::as_item)
    }

    pub fn item_count(&self) -> usize {
        self.items().count()
    }

    pub fn item(&self, id: ItemId) -> Option<&ItineraryItem> {
        self.items().find(|item| item.id == id)
    }

    pub fn contains_item(&self, id: ItemId) -> bool {
        self.item(id).is_some()
    }

    pub fn index_of_item(&self, id: ItemId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.as_item().is_some_and(|item| item.id == id))
    }

    pub fn index_of_header(&self, day: u32) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.as_header().is_some_and(|header| header.day == day))
    }

    /// Days that currently have a header, in list order
    pub fn days(&self) -> Vec<u32> {
        self.entries
            .iter()
            .filter_map(ListEntry::as_header)
            .map(|header| header.day)
            .collect()
    }

    /// Items shown under the header for `day`
    pub fn items_on_day(&self, day: u32) -> Vec<&ItineraryItem> {
        let Some(start) = self.index_of_header(day) else {
            return Vec::new();
        };
        self.entries[start + 1..]
            .iter()
            .map_while(ListEntry::as_item)
            .collect()
    }

    /// Days whose header has no items following it
    pub fn empty_days(&self) -> Vec<u32> {
        let mut empty = Vec::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if let ListEntry::DayHeader(header) = entry {
                if !matches!(self.entries.get(i + 1), Some(ListEntry::Item(_))) {
                    empty.push(header.day);
                }
            }
        }
        empty
    }

    /// Stored `(day, order_in_day)` of every item
    pub fn positions(&self) -> BTreeMap<ItemId, (u32, u32)> {
        self.items().map(|item| (item.id, item.position())).collect()
    }

    pub fn item_ids(&self) -> BTreeSet<ItemId> {
        self.items().map(|item| item.id).collect()
    }

    /// Move the entry at `from` so it ends up at index `to`
    ///
    /// Mirrors a drag-and-drop gesture: the entry is removed and reinserted,
    /// `to` being its index in the resulting list.
    pub fn move_entry(&self, from: usize, to: usize) -> Result<Self, ReorderError> {
        let len = self.entries.len();
        if from >= len {
            return Err(ReorderError::OutOfBounds { index: from, len });
        }
        if to >= len {
            return Err(ReorderError::OutOfBounds { index: to, len });
        }

        let mut entries = self.entries.clone();
        let entry = entries.remove(from);
        entries.insert(to, entry);
        Ok(Self { entries })
    }

    /// Move an item to `position` (1-based) within `day`
    ///
    /// Inserts the day header if the day has none yet. Positions past the end
    /// of the day append. The item keeps its stored values until normalized.
    pub fn move_item(&self, id: ItemId, day: u32, position: u32, span: &TripSpan) -> Result<Self, ReorderError> {
        if position == 0 {
            return Err(ReorderError::InvalidPosition(position));
        }
        let from = self.index_of_item(id).ok_or(ReorderError::UnknownItem(id))?;

        let mut moved = self.clone();
        let entry = moved.entries.remove(from);
        let header = moved.ensure_header(day, span);
        let on_day = moved.entries[header + 1..]
            .iter()
            .take_while(|entry| matches!(entry, ListEntry::Item(_)))
            .count();
        let slot = (position as usize).min(on_day + 1);
        moved.entries.insert(header + slot, entry);
        Ok(moved)
    }

    /// Copy of the list with a header for `day`, inserted in day order if missing
    pub fn with_header(&self, day: u32, span: &TripSpan) -> Self {
        let mut list = self.clone();
        list.ensure_header(day, span);
        list
    }

    /// Index of the header for `day`, inserting it in day order if missing
    fn ensure_header(&mut self, day: u32, span: &TripSpan) -> usize {
        if let Some(at) = self.index_of_header(day) {
            return at;
        }
        let at = self
            .entries
            .iter()
            .position(|entry| entry.as_header().is_some_and(|header| header.day > day))
            .unwrap_or(self.entries.len());
        self.entries.insert(at, ListEntry::DayHeader(span.header(day)));
        at
    }

    /// Copy of the list with `item` placed after the last item of its day
    ///
    /// The item's stored position is left as is.
    pub fn with_item_appended(&self, item: ItineraryItem, span: &TripSpan) -> Self {
        let mut list = self.clone();
        let header = list.ensure_header(item.day, span);
        let on_day = list.entries[header + 1..]
            .iter()
            .take_while(|entry| matches!(entry, ListEntry::Item(_)))
            .count();
        list.entries.insert(header + 1 + on_day, ListEntry::Item(item));
        list
    }

    /// Copy of the list with the item removed, or `None` if it is absent
    pub fn without_item(&self, id: ItemId) -> Option<Self> {
        let at = self.index_of_item(id)?;
        let mut entries = self.entries.clone();
        entries.remove(at);
        Some(Self { entries })
    }

    /// Drop headers for which `keep(day, is_empty)` returns false
    pub fn retain_headers(&mut self, mut keep: impl FnMut(u32, bool) -> bool) {
        let empty: HashSet<u32> = self.empty_days().into_iter().collect();
        self.entries.retain(|entry| match entry {
            ListEntry::DayHeader(header) => keep(header.day, empty.contains(&header.day)),
            ListEntry::Item(_) => true,
        });
    }

    /// Apply `f` to the item with `id`; returns false if it is absent
    pub fn update_item(&mut self, id: ItemId, f: impl FnOnce(&mut ItineraryItem)) -> bool {
        for entry in &mut self.entries {
            match entry {
                ListEntry::Item(item) if item.id == id => {
                    f(item);
                    return true;
                }
                _ => {}
            }
        }
        false
    }

    /// Check the structural invariants
    ///
    /// Every item sits under the header of its own day, per-day orders are
    /// exactly `1..=n`, header days are inside the span and strictly
    /// ascending, and a header without items must be pinned.
    pub fn validate(&self, span: &TripSpan, pinned: &BTreeSet<u32>) -> Result<(), InvariantViolation> {
        let mut current: Option<(u32, u32)> = None;
        let mut seen = HashSet::new();

        for entry in &self.entries {
            match entry {
                ListEntry::DayHeader(header) => {
                    if let Some((day, count)) = current {
                        if count == 0 && !pinned.contains(&day) {
                            return Err(InvariantViolation::EmptyDay(day));
                        }
                        if header.day <= day {
                            return Err(InvariantViolation::HeaderOrder { day: header.day });
                        }
                    }
                    if !span.contains(header.day) {
                        return Err(InvariantViolation::DayOutOfRange {
                            day: header.day,
                            trip_days: span.trip_days,
                        });
                    }
                    current = Some((header.day, 0));
                }
                ListEntry::Item(item) => {
                    let Some((day, count)) = current.as_mut() else {
                        return Err(InvariantViolation::ItemBeforeHeader(item.id));
                    };
                    if !seen.insert(item.id) {
                        return Err(InvariantViolation::DuplicateItem(item.id));
                    }
                    if item.day != *day {
                        return Err(InvariantViolation::DayMismatch {
                            item: item.id,
                            day: item.day,
                            header_day: *day,
                        });
                    }
                    *count += 1;
                    if item.order_in_day != *count {
                        return Err(InvariantViolation::OrderGap {
                            day: *day,
                            expected: *count,
                            found: item.order_in_day,
                        });
                    }
                }
            }
        }

        match current {
            Some((day, 0)) if !pinned.contains(&day) => Err(InvariantViolation::EmptyDay(day)),
            _ => Ok(()),
        }
    }
}

impl From<Vec<ListEntry>> for ItineraryList {
    fn from(entries: Vec<ListEntry>) -> Self {
        Self::new(entries)
    }
}
