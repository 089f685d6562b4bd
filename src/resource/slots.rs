//! Sparse per-consumer storage for realizations.
//!
//! A [`SlotStore`] maps [`ConsumerId`]s to reference counted slots. The
//! common case of a resource used by a single render target keeps its slot
//! inline. Once a second consumer shows up the store switches to a vector
//! covering the contiguous id range `[offset, offset + len)`. The range grows
//! to the union of the old and new ids on insertion and is shrunk back to the
//! minimal covering range whenever a slot is released. Consumer ids are
//! allocated densely (see [`IdPool`](super::IdPool)), so the range stays small.

use crate::errors::RenderError;
use crate::resource::ConsumerId;

/// Freshness of a stored realization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Matches the resource parameters.
    Fresh,
    /// Parameters changed; the realization can be patched in place.
    Dirty,
    /// Parameters changed structurally; the realization must be recreated.
    Stale,
}

/// One realization plus its bookkeeping.
#[derive(Debug)]
pub struct Slot<T> {
    pub value: T,
    pub refs: u32,
    pub state: SlotState,
}

/// Shape of the backing storage, for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotLayout {
    Empty,
    Single(ConsumerId),
    Range { offset: u32, len: usize },
}

#[derive(Debug)]
enum Layout<T> {
    Empty,
    Single {
        id: ConsumerId,
        slot: Slot<T>,
    },
    Range {
        offset: u32,
        slots: Vec<Option<Slot<T>>>,
    },
}

impl<T> Default for Layout<T> {
    fn default() -> Self {
        Layout::Empty
    }
}

#[derive(Debug)]
pub struct SlotStore<T> {
    layout: Layout<T>,
}

impl<T> Default for SlotStore<T> {
    fn default() -> Self {
        Self { layout: Layout::Empty }
    }
}

impl<T> SlotStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot stored for `id`, if any.
    pub fn get(&self, id: ConsumerId) -> Option<&Slot<T>> {
        match &self.layout {
            Layout::Empty => None,
            Layout::Single { id: current, slot } => (*current == id).then_some(slot),
            Layout::Range { offset, slots } => {
                let index = id.get().checked_sub(*offset)? as usize;
                slots.get(index)?.as_ref()
            }
        }
    }

    fn get_mut(&mut self, id: ConsumerId) -> Option<&mut Slot<T>> {
        match &mut self.layout {
            Layout::Empty => None,
            Layout::Single { id: current, slot } => (*current == id).then_some(slot),
            Layout::Range { offset, slots } => {
                let index = id.get().checked_sub(*offset)? as usize;
                slots.get_mut(index)?.as_mut()
            }
        }
    }

    /// Stores `value` for `id` and marks it fresh.
    ///
    /// An existing slot keeps its reference count (plus one if `add_ref`) and
    /// hands back the value it replaced. A vacant slot must be created with
    /// `add_ref`, since a realization only exists while it is referenced.
    pub fn set(&mut self, id: ConsumerId, value: T, add_ref: bool) -> Result<Option<T>, RenderError> {
        if let Some(slot) = self.get_mut(id) {
            if add_ref {
                slot.refs += 1;
            }
            slot.state = SlotState::Fresh;
            return Ok(Some(std::mem::replace(&mut slot.value, value)));
        }

        if !add_ref {
            return Err(RenderError::Unreferenced(id));
        }

        let slot = Slot {
            value,
            refs: 1,
            state: SlotState::Fresh,
        };

        let (low, high) = match &self.layout {
            Layout::Empty => {
                self.layout = Layout::Single { id, slot };
                return Ok(None);
            }
            Layout::Single { id: current, .. } => (current.get(), current.get()),
            Layout::Range { offset, slots } => (*offset, *offset + slots.len() as u32 - 1),
        };
        self.resize(low.min(id.get()), high.max(id.get()));

        if let Layout::Range { offset, slots } = &mut self.layout {
            slots[(id.get() - *offset) as usize] = Some(slot);
        }
        Ok(None)
    }

    /// Adds a reference to an existing slot, returning the new count.
    pub fn add_ref(&mut self, id: ConsumerId) -> Result<u32, RenderError> {
        let slot = self.get_mut(id).ok_or(RenderError::Unreferenced(id))?;
        slot.refs += 1;
        Ok(slot.refs)
    }

    /// Drops one reference for `id`. When the count reaches zero the slot is
    /// removed, the storage shrunk, and the value handed back for cleanup.
    pub fn clear(&mut self, id: ConsumerId) -> Result<Option<T>, RenderError> {
        let slot = self.get_mut(id).ok_or(RenderError::RefCountUnderflow(id))?;
        slot.refs -= 1;
        if slot.refs > 0 {
            return Ok(None);
        }

        let removed = match std::mem::take(&mut self.layout) {
            Layout::Single { slot, .. } => Some(slot),
            Layout::Range { offset, mut slots } => {
                let removed = slots[(id.get() - offset) as usize].take();
                self.layout = Layout::Range { offset, slots };
                removed
            }
            Layout::Empty => None,
        };

        self.shrink();
        Ok(removed.map(|slot| slot.value))
    }

    /// Marks every fresh slot dirty. Stale slots stay stale.
    pub fn mark_dirty(&mut self) {
        self.for_each_mut(|slot| {
            if slot.state == SlotState::Fresh {
                slot.state = SlotState::Dirty;
            }
        });
    }

    /// Marks every slot stale, forcing recreation on next access.
    pub fn invalidate(&mut self) {
        self.for_each_mut(|slot| slot.state = SlotState::Stale);
    }

    /// Marks the slot for `id` fresh after an in-place update.
    pub fn mark_fresh(&mut self, id: ConsumerId) {
        if let Some(slot) = self.get_mut(id) {
            slot.state = SlotState::Fresh;
        }
    }

    /// Removes every slot regardless of reference counts.
    pub fn drain(&mut self) -> Vec<T> {
        match std::mem::take(&mut self.layout) {
            Layout::Empty => Vec::new(),
            Layout::Single { slot, .. } => vec![slot.value],
            Layout::Range { slots, .. } => slots.into_iter().flatten().map(|s| s.value).collect(),
        }
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.layout, Layout::Empty)
    }

    /// Iterates over live slots in id order.
    pub fn iter(&self) -> impl Iterator<Item = (ConsumerId, &Slot<T>)> + '_ {
        let (single, range) = match &self.layout {
            Layout::Empty => (None, None),
            Layout::Single { id, slot } => (Some((*id, slot)), None),
            Layout::Range { offset, slots } => (None, Some((*offset, slots))),
        };

        let ranged = range.into_iter().flat_map(|(offset, slots)| {
            slots.iter().enumerate().filter_map(move |(i, slot)| {
                let slot = slot.as_ref()?;
                Some((ConsumerId::new(offset + i as u32)?, slot))
            })
        });

        single.into_iter().chain(ranged)
    }

    pub fn layout(&self) -> SlotLayout {
        match &self.layout {
            Layout::Empty => SlotLayout::Empty,
            Layout::Single { id, .. } => SlotLayout::Single(*id),
            Layout::Range { offset, slots } => SlotLayout::Range {
                offset: *offset,
                len: slots.len(),
            },
        }
    }

    /// Reallocates the storage down to the minimal range covering live slots.
    /// A single survivor moves back inline.
    pub fn shrink(&mut self) {
        let Layout::Range { offset, slots } = &self.layout else {
            return;
        };

        let live: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i))
            .collect();

        let (Some(&first), Some(&last)) = (live.first(), live.last()) else {
            self.layout = Layout::Empty;
            return;
        };

        if first == last {
            let id = *offset + first as u32;
            if let Layout::Range { mut slots, .. } = std::mem::take(&mut self.layout) {
                if let (Some(slot), Some(id)) = (slots[first].take(), ConsumerId::new(id)) {
                    self.layout = Layout::Single { id, slot };
                }
            }
            return;
        }

        if first == 0 && last == slots.len() - 1 {
            return;
        }

        let low = *offset + first as u32;
        let high = *offset + last as u32;
        self.resize(low, high);
    }

    /// Moves the storage to a vector covering exactly `[low, high]`, keeping
    /// every existing slot that falls inside.
    fn resize(&mut self, low: u32, high: u32) {
        let mut fresh: Vec<Option<Slot<T>>> = Vec::new();
        fresh.resize_with((high - low + 1) as usize, || None);

        match std::mem::take(&mut self.layout) {
            Layout::Empty => {}
            Layout::Single { id, slot } => {
                fresh[(id.get() - low) as usize] = Some(slot);
            }
            Layout::Range { offset, slots } => {
                for (i, slot) in slots.into_iter().enumerate() {
                    let id = offset + i as u32;
                    if slot.is_some() && (low..=high).contains(&id) {
                        fresh[(id - low) as usize] = slot;
                    }
                }
            }
        }

        self.layout = Layout::Range { offset: low, slots: fresh };
    }

    fn for_each_mut(&mut self, mut f: impl FnMut(&mut Slot<T>)) {
        match &mut self.layout {
            Layout::Empty => {}
            Layout::Single { slot, .. } => f(slot),
            Layout::Range { slots, .. } => slots.iter_mut().flatten().for_each(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn id(raw: u32) -> ConsumerId {
        ConsumerId::new(raw).unwrap()
    }

    /// Counts how often it has been dropped.
    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn single_consumer_stays_inline() {
        let mut store = SlotStore::new();
        store.set(id(3), "a", true).unwrap();

        assert_eq!(store.layout(), SlotLayout::Single(id(3)));
        assert_eq!(store.get(id(3)).map(|s| s.value), Some("a"));
        assert!(store.get(id(2)).is_none());
    }

    #[test]
    fn second_consumer_spills_into_a_range() {
        let mut store = SlotStore::new();
        store.set(id(4), "a", true).unwrap();
        store.set(id(2), "b", true).unwrap();

        assert_eq!(store.layout(), SlotLayout::Range { offset: 2, len: 3 });
        assert_eq!(store.get(id(4)).map(|s| s.value), Some("a"));
        assert_eq!(store.get(id(2)).map(|s| s.value), Some("b"));
        assert!(store.get(id(3)).is_none());
        assert!(store.get(id(5)).is_none());
        assert!(store.get(id(1)).is_none());

        store.set(id(7), "c", true).unwrap();
        assert_eq!(store.layout(), SlotLayout::Range { offset: 2, len: 6 });
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn replacing_keeps_refs_and_returns_old_value() {
        let mut store = SlotStore::new();
        store.set(id(1), 10, true).unwrap();
        let old = store.set(id(1), 11, false).unwrap();

        assert_eq!(old, Some(10));
        assert_eq!(store.get(id(1)).map(|s| (s.value, s.refs)), Some((11, 1)));
    }

    #[test]
    fn vacant_slot_needs_a_reference() {
        let mut store: SlotStore<u32> = SlotStore::new();
        assert!(matches!(store.set(id(1), 1, false), Err(RenderError::Unreferenced(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn clear_runs_cleanup_exactly_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut store = SlotStore::new();

        store.set(id(5), Tracked(drops.clone()), true).unwrap();
        let released = store.clear(id(5)).unwrap();
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(released);

        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(store.get(id(5)).is_none());
        assert_eq!(store.layout(), SlotLayout::Empty);
    }

    #[test]
    fn shared_slot_survives_until_last_reference() {
        let mut store = SlotStore::new();
        store.set(id(1), "a", true).unwrap();
        assert_eq!(store.add_ref(id(1)).unwrap(), 2);

        assert_eq!(store.clear(id(1)).unwrap(), None);
        assert!(store.get(id(1)).is_some());
        assert_eq!(store.clear(id(1)).unwrap(), Some("a"));
    }

    #[test]
    fn underflow_is_rejected() {
        let mut store: SlotStore<u32> = SlotStore::new();
        assert!(matches!(store.clear(id(1)), Err(RenderError::RefCountUnderflow(_))));

        store.set(id(2), 1, true).unwrap();
        store.clear(id(2)).unwrap();
        assert!(matches!(store.clear(id(2)), Err(RenderError::RefCountUnderflow(_))));
    }

    #[test]
    fn clearing_an_edge_shrinks_the_range() {
        let mut store = SlotStore::new();
        for raw in [2, 3, 4, 6] {
            store.set(id(raw), raw, true).unwrap();
        }
        assert_eq!(store.layout(), SlotLayout::Range { offset: 2, len: 5 });

        store.clear(id(3)).unwrap();
        assert_eq!(store.layout(), SlotLayout::Range { offset: 2, len: 5 });

        store.clear(id(2)).unwrap();
        assert_eq!(store.layout(), SlotLayout::Range { offset: 4, len: 3 });

        store.clear(id(6)).unwrap();
        assert_eq!(store.layout(), SlotLayout::Single(id(4)));
        assert_eq!(store.get(id(4)).map(|s| s.value), Some(4));
    }

    #[test]
    fn shrink_is_idempotent() {
        let mut store = SlotStore::new();
        for raw in [1, 5, 9] {
            store.set(id(raw), raw, true).unwrap();
        }
        store.clear(id(1)).unwrap();

        store.shrink();
        let once = store.layout();
        store.shrink();
        assert_eq!(store.layout(), once);
        assert_eq!(once, SlotLayout::Range { offset: 5, len: 5 });
    }

    #[test]
    fn dirty_marks_do_not_downgrade_stale_slots() {
        let mut store = SlotStore::new();
        store.set(id(1), 1, true).unwrap();
        store.set(id(2), 2, true).unwrap();

        store.mark_dirty();
        assert_eq!(store.get(id(1)).map(|s| s.state), Some(SlotState::Dirty));

        store.invalidate();
        store.mark_dirty();
        assert_eq!(store.get(id(2)).map(|s| s.state), Some(SlotState::Stale));

        store.mark_fresh(id(2));
        assert_eq!(store.get(id(2)).map(|s| s.state), Some(SlotState::Fresh));
    }

    #[test]
    fn drain_removes_everything() {
        let mut store = SlotStore::new();
        store.set(id(1), 1, true).unwrap();
        store.set(id(3), 3, true).unwrap();

        let mut drained = store.drain();
        drained.sort();
        assert_eq!(drained, vec![1, 3]);
        assert_eq!(store.layout(), SlotLayout::Empty);
    }

    #[test]
    fn iter_lists_live_slots_in_id_order() {
        let mut store = SlotStore::new();
        for raw in [4, 2, 7] {
            store.set(id(raw), raw * 10, true).unwrap();
        }
        let seen: Vec<(u32, u32)> = store.iter().map(|(i, s)| (i.get(), s.value)).collect();
        assert_eq!(seen, vec![(2, 20), (4, 40), (7, 70)]);
    }
}
