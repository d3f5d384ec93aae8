//! Bounded per-CID context storage shared by the built-in compressor and decompressor.

use std::collections::HashMap;

use crate::types::ContextId;

#[derive(Debug)]
struct Slot<C> {
    context: C,
    last_used: u64,
}

/// Contexts keyed by CID, bounded by a maximum count.
///
/// New contexts take the lowest free CID. When the table is full the least
/// recently used context is recycled and its CID handed to the newcomer.
#[derive(Debug)]
pub struct ContextTable<C> {
    slots: HashMap<ContextId, Slot<C>>,
    capacity: usize,
    tick: u64,
}

impl<C> ContextTable<C> {
    /// Creates an empty table holding at most `capacity` contexts (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: HashMap::new(),
            capacity: capacity.max(1),
            tick: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, cid: ContextId) -> bool {
        self.slots.contains_key(&cid)
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Returns the context for `cid` and marks it as recently used.
    pub fn get_mut(&mut self, cid: ContextId) -> Option<&mut C> {
        let tick = self.next_tick();
        self.slots.get_mut(&cid).map(|slot| {
            slot.last_used = tick;
            &mut slot.context
        })
    }

    /// Returns the context for `cid` without touching its recency.
    pub fn get(&self, cid: ContextId) -> Option<&C> {
        self.slots.get(&cid).map(|slot| &slot.context)
    }

    /// Stores `context` under `cid`, returning the context it replaces.
    ///
    /// The caller is responsible for keeping `cid` below the table capacity.
    pub fn insert(&mut self, cid: ContextId, context: C) -> Option<C> {
        let tick = self.next_tick();
        self.slots
            .insert(
                cid,
                Slot {
                    context,
                    last_used: tick,
                },
            )
            .map(|slot| slot.context)
    }

    /// Stores `context` under the lowest free CID, recycling the least recently
    /// used context when the table is full.
    ///
    /// # Returns
    /// The CID assigned to `context` and the evicted context, if any.
    pub fn allocate(&mut self, context: C) -> (ContextId, Option<C>) {
        let free = (0..self.capacity)
            .map(|cid| ContextId::new(cid as u16))
            .find(|cid| !self.slots.contains_key(cid));

        let cid = match free {
            Some(cid) => cid,
            None => self
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(cid, _)| *cid)
                .unwrap_or_default(),
        };
        let evicted = self.insert(cid, context);
        (cid, evicted)
    }

    pub fn remove(&mut self, cid: ContextId) -> Option<C> {
        self.slots.remove(&cid).map(|slot| slot.context)
    }
}
