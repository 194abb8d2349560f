//! Drag reorder normalization
//!
//! Converts a freely rearranged [`ItineraryList`] back into dense per-day
//! numbering. An item's day is whatever header precedes it, so moving across
//! days and moving within a day are the same operation.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::ReorderError;
use crate::item::{ItemId, OrderChange};
use crate::list::{ItineraryList, ListEntry};

/// Normalized list plus the items whose stored position was rewritten
#[derive(Debug, Clone, PartialEq)]
pub struct Reordered {
    pub list: ItineraryList,
    pub changes: Vec<OrderChange>,
}

impl Reordered {
    pub fn is_unchanged(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Renumber every item from its position in the list
///
/// Single left-to-right pass: a header sets the current day and resets the
/// counter, an item takes `(current_day, counter)`. Changes are reported in
/// list order. Fails if an item precedes every header.
pub fn normalize(list: ItineraryList) -> Result<Reordered, ReorderError> {
    let mut entries = list.into_entries();
    let mut changes = Vec::new();
    let mut current_day: Option<u32> = None;
    let mut counter = 0u32;

    for entry in &mut entries {
        match entry {
            ListEntry::DayHeader(header) => {
                current_day = Some(header.day);
                counter = 0;
            }
            ListEntry::Item(item) => {
                let day = current_day.ok_or(ReorderError::NoPrecedingHeader(item.id))?;
                counter += 1;
                if item.position() != (day, counter) {
                    item.day = day;
                    item.order_in_day = counter;
                    changes.push(item.order_change());
                }
            }
        }
    }

    debug!(changed = changes.len(), "normalize: done");
    Ok(Reordered {
        list: ItineraryList::new(entries),
        changes,
    })
}

/// Order changes that bring `base` positions in line with `target`
///
/// Items of `target` unknown to `base` are included. Changes follow the
/// order of `target`.
pub fn diff_positions(base: &BTreeMap<ItemId, (u32, u32)>, target: &ItineraryList) -> Vec<OrderChange> {
    target
        .items()
        .filter(|item| base.get(&item.id) != Some(&item.position()))
        .map(|item| item.order_change())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::*;
    use crate::item::ItineraryItem;
    use crate::list::TripSpan;

    const A: i64 = 1;
    const B: i64 = 2;
    const C: i64 = 3;

    fn item(id: i64, day: u32, order: u32) -> ListEntry {
        ListEntry::Item(ItineraryItem::new(id, day, order, format!("place-{id}")))
    }

    fn change(id: i64, day: u32, order_in_day: u32) -> OrderChange {
        OrderChange {
            id: ItemId(id),
            day,
            order_in_day,
        }
    }

    fn two_days() -> ItineraryList {
        ItineraryList::new(vec![
            ListEntry::header(1),
            item(A, 1, 1),
            item(B, 1, 2),
            ListEntry::header(2),
            item(C, 2, 1),
        ])
    }

    #[test]
    fn test_drag_into_next_day() {
        let dragged = two_days().move_entry(2, 3).unwrap();
        let result = normalize(dragged).unwrap();

        let expected = ItineraryList::new(vec![
            ListEntry::header(1),
            item(A, 1, 1),
            ListEntry::header(2),
            item(B, 2, 1),
            item(C, 2, 2),
        ]);
        assert_eq!(result.list, expected);
        assert_eq!(result.changes, vec![change(B, 2, 1), change(C, 2, 2)]);
    }

    #[test]
    fn test_drag_to_end_of_last_day() {
        let first = normalize(two_days().move_entry(2, 3).unwrap()).unwrap().list;
        let result = normalize(first.move_entry(1, 4).unwrap()).unwrap();

        let expected = ItineraryList::new(vec![
            ListEntry::header(1),
            ListEntry::header(2),
            item(B, 2, 1),
            item(C, 2, 2),
            item(A, 2, 3),
        ]);
        assert_eq!(result.list, expected);
        assert_eq!(result.changes, vec![change(A, 2, 3)]);

        let server = two_days().positions();
        assert_eq!(
            diff_positions(&server, &result.list),
            vec![change(B, 2, 1), change(C, 2, 2), change(A, 2, 3)]
        );
    }

    #[test]
    fn test_drop_back_in_place_is_unchanged() {
        let result = normalize(two_days().move_entry(1, 1).unwrap()).unwrap();
        assert!(result.is_unchanged());
        assert_eq!(result.list, two_days());
    }

    #[test]
    fn test_item_before_first_header_rejected() {
        let dragged = two_days().move_entry(1, 0).unwrap();
        assert_eq!(normalize(dragged), Err(ReorderError::NoPrecedingHeader(ItemId(A))));
    }

    #[test]
    fn test_within_day_swap() {
        let result = normalize(two_days().move_entry(2, 1).unwrap()).unwrap();
        assert_eq!(result.changes, vec![change(B, 1, 1), change(A, 1, 2)]);
    }

    #[test]
    fn test_diff_includes_unknown_items() {
        let base = BTreeMap::new();
        assert_eq!(diff_positions(&base, &two_days()).len(), 3);
    }

    /// A valid list over `days` days with every day pinned, so empty days are allowed
    fn valid_list() -> impl Strategy<Value = (ItineraryList, u32)> {
        (1u32..5)
            .prop_flat_map(|days| (Just(days), proptest::collection::vec(0u32..4, days as usize)))
            .prop_map(|(days, counts)| {
                let mut entries = Vec::new();
                let mut next_id = 1;
                for (i, count) in counts.iter().enumerate() {
                    let day = i as u32 + 1;
                    entries.push(ListEntry::header(day));
                    for order in 1..=*count {
                        entries.push(item(next_id, day, order));
                        next_id += 1;
                    }
                }
                (ItineraryList::new(entries), days)
            })
    }

    proptest! {
        #[test]
        fn prop_normalized_list_is_dense_and_consistent(
            (list, days) in valid_list(),
            from_seed in any::<usize>(),
            to_seed in any::<usize>(),
        ) {
            let len = list.len();
            let dragged = list.move_entry(from_seed % len, to_seed % len).unwrap();
            let result = normalize(dragged);
            prop_assume!(result.is_ok());
            let result = result.unwrap();

            let span = TripSpan::new(days);
            let pinned: BTreeSet<u32> = (1..=days).collect();
            // headers may have been dragged out of order; density and day consistency must still hold
            let mut per_day: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
            let mut current = None;
            for entry in result.list.entries() {
                match entry {
                    ListEntry::DayHeader(h) => current = Some(h.day),
                    ListEntry::Item(i) => {
                        prop_assert_eq!(Some(i.day), current);
                        per_day.entry(i.day).or_default().push(i.order_in_day);
                    }
                }
            }
            if result.list.days().windows(2).all(|w| w[0] < w[1]) {
                prop_assert!(result.list.validate(&span, &pinned).is_ok());
            }
            for orders in per_day.values() {
                let mut sorted = orders.clone();
                sorted.sort_unstable();
                sorted.dedup();
                prop_assert_eq!(sorted.len(), orders.len());
                prop_assert_eq!(sorted.first().copied(), Some(1));
                prop_assert_eq!(sorted.last().copied(), Some(orders.len() as u32));
            }
        }

        #[test]
        fn prop_normalize_is_idempotent(
            (list, _days) in valid_list(),
            from_seed in any::<usize>(),
            to_seed in any::<usize>(),
        ) {
            let len = list.len();
            let dragged = list.move_entry(from_seed % len, to_seed % len).unwrap();
            let once = normalize(dragged);
            prop_assume!(once.is_ok());
            let once = once.unwrap();
            let twice = normalize(once.list.clone()).unwrap();
            prop_assert!(twice.is_unchanged());
            prop_assert_eq!(twice.list, once.list);
        }
    }
}
