//! Itinerary store
//!
//! A reducer over a confirmed snapshot (what the server last acknowledged)
//! and a queue of pending optimistic edits. Observers always see the newest
//! pending arrangement, or the confirmed one when nothing is pending.
//! Every mutation validates before committing; on error nothing changes.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{InvariantViolation, StoreError};
use crate::item::{ItemId, ItineraryItem, OrderChange};
use crate::list::{ItineraryList, TripSpan};
use crate::reorder::{diff_positions, normalize};

/// What happens to a day header once its last item leaves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmptyDayPolicy {
    /// Remove the header unless the day is pinned
    Collapse,
    /// Pin the day so the header stays as a drop target
    #[default]
    Keep,
}

/// Identifier of a pending optimistic edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EditId(pub u64);

impl fmt::Display for EditId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edit-{}", self.0)
    }
}

/// Result of a reorder or removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorderOutcome {
    /// Nothing moved; nothing to persist
    Unchanged,
    /// A pending edit was staged; `changes` are the rewritten items
    Staged { edit: EditId, changes: Vec<OrderChange> },
}

/// Outcome of [`ItineraryStore::rebase`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rebased {
    /// Pending edits dropped because the snapshot supersedes them
    pub superseded: usize,
    /// Newer edits staged again on top of the snapshot
    pub replayed: usize,
    /// Newer edits that no longer fit the snapshot
    pub rejected: Vec<(EditId, StoreError)>,
    /// The server numbering had gaps or ties; a pending edit carries the fix
    pub renumbered: bool,
}

#[derive(Debug, Clone)]
struct PendingEdit {
    id: EditId,
    list: ItineraryList,
    /// Items the user placed, at the position they were dropped
    placed: Vec<OrderChange>,
}

/// Server items turned into a valid list
struct Loaded {
    list: ItineraryList,
    pinned: BTreeSet<u32>,
    server_positions: BTreeMap<ItemId, (u32, u32)>,
    renumbered: bool,
}

#[derive(Debug, Clone)]
pub struct ItineraryStore {
    span: TripSpan,
    policy: EmptyDayPolicy,
    pinned: BTreeSet<u32>,
    confirmed: ItineraryList,
    server_positions: BTreeMap<ItemId, (u32, u32)>,
    pending: VecDeque<PendingEdit>,
    next_edit: u64,
    revision: u64,
}

impl ItineraryStore {
    /// Empty store for a trip of the given span
    pub fn new(span: TripSpan, policy: EmptyDayPolicy) -> Self {
        Self {
            span,
            policy,
            pinned: BTreeSet::new(),
            confirmed: ItineraryList::default(),
            server_positions: BTreeMap::new(),
            pending: VecDeque::new(),
            next_edit: 1,
            revision: 0,
        }
    }

    /// Store seeded from server items
    ///
    /// Gaps or ties in the server numbering are renumbered and left pending
    /// so they can be written back.
    pub fn with_items(
        span: TripSpan,
        policy: EmptyDayPolicy,
        items: impl IntoIterator<Item = ItineraryItem>,
    ) -> Result<Self, StoreError> {
        let mut store = Self::new(span, policy);
        store.reset(span, items)?;
        Ok(store)
    }

    pub fn span(&self) -> &TripSpan {
        &self.span
    }

    pub fn pinned_days(&self) -> &BTreeSet<u32> {
        &self.pinned
    }

    /// Bumped on every change to the current snapshot
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn latest_edit(&self) -> Option<EditId> {
        self.pending.back().map(|edit| edit.id)
    }

    pub fn is_pending(&self, edit: EditId) -> bool {
        self.pending.iter().any(|pending| pending.id == edit)
    }

    /// Newest arrangement: the latest pending edit, else the confirmed snapshot
    pub fn current_snapshot(&self) -> &ItineraryList {
        self.pending.back().map_or(&self.confirmed, |edit| &edit.list)
    }

    pub fn confirmed_snapshot(&self) -> &ItineraryList {
        &self.confirmed
    }

    /// Replace everything with an authoritative list
    ///
    /// Drops all pending edits. The list must already be valid.
    pub fn replace_all(&mut self, list: ItineraryList) -> Result<(), StoreError> {
        debug!(entries = list.len(), "replace_all: called");
        let pinned = self.pins_for(&list);
        list.validate(&self.span, &pinned)?;

        self.pinned = pinned;
        self.server_positions = list.positions();
        self.confirmed = list;
        self.pending.clear();
        self.bump();
        Ok(())
    }

    /// Rebuild from server items, dropping every pending edit
    pub fn reset(&mut self, span: TripSpan, items: impl IntoIterator<Item = ItineraryItem>) -> Result<(), StoreError> {
        let superseded = self.latest_edit();
        self.rebase(span, items, superseded).map(|_| ())
    }

    /// Adopt refetched server items, possibly with a new span
    ///
    /// Pending edits up to and including `superseded` are dropped. Newer
    /// edits have their placed items moved again, in order, on the fresh
    /// snapshot; items the server no longer has are skipped, and an edit
    /// that no longer validates is dropped and reported in
    /// [`Rebased::rejected`]. Pinned days outside the new span are forgotten.
    ///
    /// Items are ordered by the server's `(day, order_in_day)` and
    /// renumbered densely. Server positions stay as reported, so a
    /// renumbering shows up in [`sync_changes`](Self::sync_changes) and is
    /// staged as a pending edit.
    pub fn rebase(
        &mut self,
        span: TripSpan,
        items: impl IntoIterator<Item = ItineraryItem>,
        superseded: Option<EditId>,
    ) -> Result<Rebased, StoreError> {
        let loaded = self.load(span, items)?;
        debug!(
            trip_days = span.trip_days,
            items = loaded.list.item_count(),
            pending = self.pending.len(),
            ?superseded,
            "rebase: called"
        );

        self.span = span;
        self.pinned = loaded.pinned;
        self.server_positions = loaded.server_positions;
        self.confirmed = loaded.list;
        let older = std::mem::take(&mut self.pending);
        self.bump();

        let mut rebased = Rebased {
            renumbered: loaded.renumbered,
            ..Default::default()
        };
        if loaded.renumbered {
            let list = self.confirmed.clone();
            let edit = self.push_pending(list, Vec::new());
            debug!(%edit, "rebase: staged renumbering of server positions");
        }

        for edit in older {
            if superseded.is_some_and(|last| edit.id <= last) {
                rebased.superseded += 1;
                continue;
            }
            match self.replay(&edit.placed) {
                Ok(ReorderOutcome::Staged { .. }) => rebased.replayed += 1,
                Ok(ReorderOutcome::Unchanged) => debug!(edit = %edit.id, "rebase: edit already holds"),
                Err(err) => {
                    warn!(edit = %edit.id, %err, "rebase: edit no longer applies");
                    rebased.rejected.push((edit.id, err));
                }
            }
        }
        Ok(rebased)
    }

    /// Stage a rearranged list as a pending edit
    ///
    /// The list is normalized, the empty-day policy applied and the result
    /// validated. Returns [`ReorderOutcome::Unchanged`] when no item moved.
    pub fn apply_reorder(&mut self, list: ItineraryList) -> Result<ReorderOutcome, StoreError> {
        debug!(entries = list.len(), "apply_reorder: called");
        let reordered = normalize(list)?;
        check_same_items(self.current_snapshot(), &reordered.list)?;
        if reordered.is_unchanged() {
            debug!("apply_reorder: unchanged");
            return Ok(ReorderOutcome::Unchanged);
        }

        let mut pinned = self.pinned.clone();
        let list = self.apply_policy(reordered.list, &mut pinned);
        list.validate(&self.span, &pinned)?;

        let placed = placed_items(self.current_snapshot(), &list);
        self.pinned = pinned;
        let edit = self.push_pending(list, placed);
        debug!(%edit, changed = reordered.changes.len(), "apply_reorder: staged");
        Ok(ReorderOutcome::Staged {
            edit,
            changes: reordered.changes,
        })
    }

    /// Drag the entry at `from` to index `to` of the current snapshot
    pub fn move_entry(&mut self, from: usize, to: usize) -> Result<ReorderOutcome, StoreError> {
        let moved = self.current_snapshot().move_entry(from, to)?;
        self.apply_reorder(moved)
    }

    /// Move an item to a 1-based position within a day
    pub fn move_item(&mut self, id: ItemId, day: u32, position: u32) -> Result<ReorderOutcome, StoreError> {
        if !self.span.contains(day) {
            return Err(InvariantViolation::DayOutOfRange {
                day,
                trip_days: self.span.trip_days,
            }
            .into());
        }
        let moved = self.current_snapshot().move_item(id, day, position, &self.span)?;
        self.apply_reorder(moved)
    }

    /// Forget an item the server has deleted
    ///
    /// Remaining items are renumbered in the confirmed snapshot and in every
    /// pending edit. If the renumbering moved anything relative to the server,
    /// a pending edit carrying it is staged.
    pub fn remove_item(&mut self, id: ItemId) -> Result<ReorderOutcome, StoreError> {
        debug!(%id, "remove_item: called");
        if !self.current_snapshot().contains_item(id) && !self.confirmed.contains_item(id) {
            return Err(StoreError::UnknownItem(id));
        }

        let mut pinned = self.pinned.clone();
        let confirmed = self.compact_without(&self.confirmed, id, &mut pinned)?;
        let pending = self
            .pending
            .iter()
            .map(|edit| {
                self.compact_without(&edit.list, id, &mut pinned).map(|list| PendingEdit {
                    id: edit.id,
                    list,
                    placed: edit.placed.iter().filter(|placed| placed.id != id).cloned().collect(),
                })
            })
            .collect::<Result<VecDeque<_>, _>>()?;

        self.pinned = pinned;
        self.confirmed = confirmed;
        self.pending = pending;
        self.server_positions.remove(&id);
        self.bump();

        let changes = self.sync_changes();
        if changes.is_empty() {
            return Ok(ReorderOutcome::Unchanged);
        }
        let snapshot = self.current_snapshot().clone();
        let edit = self.push_pending(snapshot, Vec::new());
        debug!(%id, %edit, changed = changes.len(), "remove_item: staged compaction");
        Ok(ReorderOutcome::Staged { edit, changes })
    }

    /// Add an item the server has created
    ///
    /// The confirmed snapshot takes the item at its server position, which
    /// must be the end of its day. Pending edits get it appended and
    /// renumbered.
    pub fn insert_item(&mut self, item: ItineraryItem) -> Result<(), StoreError> {
        debug!(id = %item.id, day = item.day, order = item.order_in_day, "insert_item: called");
        if self.confirmed.contains_item(item.id) || self.current_snapshot().contains_item(item.id) {
            return Err(InvariantViolation::DuplicateItem(item.id).into());
        }

        let confirmed = self.confirmed.with_item_appended(item.clone(), &self.span);
        confirmed.validate(&self.span, &self.pinned)?;
        let pending = self
            .pending
            .iter()
            .map(|edit| -> Result<PendingEdit, StoreError> {
                let list = normalize(edit.list.with_item_appended(item.clone(), &self.span))?.list;
                list.validate(&self.span, &self.pinned)?;
                Ok(PendingEdit {
                    id: edit.id,
                    list,
                    placed: edit.placed.clone(),
                })
            })
            .collect::<Result<VecDeque<_>, _>>()?;

        self.server_positions.insert(item.id, item.position());
        self.confirmed = confirmed;
        self.pending = pending;
        self.bump();
        Ok(())
    }

    /// Replace an item's payload, keeping its local position
    pub fn update_item(&mut self, updated: ItineraryItem) -> Result<(), StoreError> {
        debug!(id = %updated.id, "update_item: called");
        let id = updated.id;
        let mut found = false;
        let mut apply = |list: &mut ItineraryList| {
            found |= list.update_item(id, |item| {
                let (day, order_in_day) = item.position();
                *item = ItineraryItem {
                    day,
                    order_in_day,
                    ..updated.clone()
                };
            });
        };

        apply(&mut self.confirmed);
        for edit in &mut self.pending {
            apply(&mut edit.list);
        }
        if !found {
            return Err(StoreError::UnknownItem(id));
        }
        self.bump();
        Ok(())
    }

    /// Position the server gives an item appended to `day`
    ///
    /// Counts the confirmed snapshot; pending moves are not on the server yet.
    pub fn next_order_in_day(&self, day: u32) -> u32 {
        self.confirmed.items_on_day(day).len() as u32 + 1
    }

    /// Mark a pending edit as acknowledged by the server
    ///
    /// The edit becomes the confirmed snapshot; it and every older edit are
    /// dropped. Returns false if the edit is no longer pending.
    pub fn confirm(&mut self, edit: EditId) -> bool {
        let Some(at) = self.pending.iter().position(|pending| pending.id == edit) else {
            debug!(%edit, "confirm: not pending");
            return false;
        };

        let confirmed = self.pending.drain(..=at).last();
        if let Some(confirmed) = confirmed {
            self.server_positions = confirmed.list.positions();
            self.confirmed = confirmed.list;
        }
        debug!(%edit, remaining = self.pending.len(), "confirm: done");
        true
    }

    /// Drop every pending edit, reverting to the confirmed snapshot
    pub fn discard_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        debug!(count = self.pending.len(), "discard_pending: called");
        self.pending.clear();
        self.bump();
    }

    /// Order changes the server needs to match the current snapshot
    pub fn sync_changes(&self) -> Vec<OrderChange> {
        diff_positions(&self.server_positions, self.current_snapshot())
    }

    /// Keep a header for `day` even while it has no items
    pub fn pin_day(&mut self, day: u32) -> Result<(), StoreError> {
        debug!(day, "pin_day: called");
        if !self.span.contains(day) {
            return Err(InvariantViolation::DayOutOfRange {
                day,
                trip_days: self.span.trip_days,
            }
            .into());
        }
        if !self.pinned.insert(day) {
            return Ok(());
        }

        self.confirmed = self.confirmed.with_header(day, &self.span);
        for edit in &mut self.pending {
            edit.list = edit.list.with_header(day, &self.span);
        }
        self.bump();
        Ok(())
    }

    /// Stop pinning `day`; its header goes away if the day is empty
    pub fn unpin_day(&mut self, day: u32) {
        debug!(day, "unpin_day: called");
        if !self.pinned.remove(&day) {
            return;
        }

        let drop_empty = |header_day: u32, empty: bool| !(empty && header_day == day);
        self.confirmed.retain_headers(drop_empty);
        for edit in &mut self.pending {
            edit.list.retain_headers(drop_empty);
        }
        self.bump();
    }

    fn push_pending(&mut self, list: ItineraryList, placed: Vec<OrderChange>) -> EditId {
        let id = EditId(self.next_edit);
        self.next_edit += 1;
        self.pending.push_back(PendingEdit { id, list, placed });
        self.bump();
        id
    }

    /// Move `placed` items again on the current snapshot and stage the result
    fn replay(&mut self, placed: &[OrderChange]) -> Result<ReorderOutcome, StoreError> {
        let mut list = self.current_snapshot().clone();
        for item in placed {
            if !list.contains_item(item.id) {
                debug!(id = %item.id, "replay: item gone from server, skipping");
                continue;
            }
            list = list.move_item(item.id, item.day, item.order_in_day, &self.span)?;
        }
        self.apply_reorder(list)
    }

    /// Validate server items, renumbering gaps and ties
    fn load(&self, span: TripSpan, items: impl IntoIterator<Item = ItineraryItem>) -> Result<Loaded, StoreError> {
        let pinned: BTreeSet<u32> = self.pinned.iter().copied().filter(|day| span.contains(*day)).collect();
        let raw = ItineraryList::from_items(items, &pinned, &span);
        let server_positions = raw.positions();
        let reordered = normalize(raw)?;
        if let Err(err) = reordered.list.validate(&span, &pinned) {
            warn!(%err, "load: rejected server snapshot");
            return Err(err.into());
        }
        if !reordered.is_unchanged() {
            warn!(changed = reordered.changes.len(), "load: server numbering has gaps, renumbering");
        }
        Ok(Loaded {
            renumbered: !reordered.is_unchanged(),
            list: reordered.list,
            pinned,
            server_positions,
        })
    }

    fn bump(&mut self) {
        self.revision += 1;
    }

    /// Pins needed to accept `list`: current pins plus, under `Keep`, its empty days
    fn pins_for(&self, list: &ItineraryList) -> BTreeSet<u32> {
        let mut pinned = self.pinned.clone();
        if self.policy == EmptyDayPolicy::Keep {
            pinned.extend(list.empty_days());
        }
        pinned
    }

    fn apply_policy(&self, mut list: ItineraryList, pinned: &mut BTreeSet<u32>) -> ItineraryList {
        match self.policy {
            EmptyDayPolicy::Keep => pinned.extend(list.empty_days()),
            EmptyDayPolicy::Collapse => list.retain_headers(|day, empty| !empty || pinned.contains(&day)),
        }
        list
    }

    fn compact_without(
        &self,
        list: &ItineraryList,
        id: ItemId,
        pinned: &mut BTreeSet<u32>,
    ) -> Result<ItineraryList, StoreError> {
        let Some(without) = list.without_item(id) else {
            return Ok(list.clone());
        };
        let list = self.apply_policy(normalize(without)?.list, pinned);
        list.validate(&self.span, pinned)?;
        Ok(list)
    }
}

/// Items of `edited` the user actually placed, as opposed to neighbours shifted by the placement
///
/// An item counts as placed if its day changed or it falls outside the
/// longest run of items that kept their relative order.
fn placed_items(base: &ItineraryList, edited: &ItineraryList) -> Vec<OrderChange> {
    let before: HashMap<ItemId, (usize, u32)> = base
        .items()
        .enumerate()
        .map(|(rank, item)| (item.id, (rank, item.day)))
        .collect();
    let items: Vec<&ItineraryItem> = edited.items().collect();
    let ranks: Vec<Option<usize>> = items
        .iter()
        .map(|item| before.get(&item.id).map(|(rank, _)| *rank))
        .collect();
    let kept = longest_ordered_run(&ranks);

    items
        .iter()
        .enumerate()
        .filter(|(i, item)| !kept.contains(i) || before.get(&item.id).map(|(_, day)| *day) != Some(item.day))
        .map(|(_, item)| item.order_change())
        .collect()
}

/// Indices of a longest strictly increasing subsequence of `ranks`
fn longest_ordered_run(ranks: &[Option<usize>]) -> BTreeSet<usize> {
    let mut length = vec![0usize; ranks.len()];
    let mut previous: Vec<Option<usize>> = vec![None; ranks.len()];
    let mut best: Option<usize> = None;

    for (i, rank) in ranks.iter().enumerate() {
        let Some(rank) = rank else {
            continue;
        };
        length[i] = 1;
        for (j, earlier) in ranks[..i].iter().enumerate() {
            if let Some(earlier) = earlier {
                if earlier < rank && length[j] + 1 > length[i] {
                    length[i] = length[j] + 1;
                    previous[i] = Some(j);
                }
            }
        }
        if best.is_none_or(|b| length[i] > length[b]) {
            best = Some(i);
        }
    }

    let mut run = BTreeSet::new();
    let mut at = best;
    while let Some(i) = at {
        run.insert(i);
        at = previous[i];
    }
    run
}

fn check_same_items(base: &ItineraryList, candidate: &ItineraryList) -> Result<(), InvariantViolation> {
    let before = base.item_ids();
    let after = candidate.item_ids();
    if before == after && candidate.item_count() == after.len() {
        return Ok(());
    }
    Err(InvariantViolation::ItemSetMismatch {
        missing: before.difference(&after).count(),
        unexpected: after.difference(&before).count() + (candidate.item_count() - after.len()),
    })
}
