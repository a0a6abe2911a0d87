//! Generation-checked handle table
//!
//! Fixed-capacity arena that hands out `Handle`s made of a slot index and a
//! generation counter. Removing an entry bumps the slot's generation, so a
//! handle that outlived its entry is rejected instead of silently resolving to
//! whatever reused the slot.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::error::KernelError;

/// Index + generation pair identifying one arena entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    /// Slot index
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this handle was issued
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Pack into a single integer (generation in the high half)
    pub fn to_raw(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Unpack from the integer form
    pub fn from_raw(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Fixed-capacity table of `T` keyed by generation-checked handles.
pub struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    /// Vacated slots, reused oldest-first to delay generation reuse
    free: VecDeque<u32>,
    capacity: usize,
    len: usize,
}

impl<T> HandleTable<T> {
    /// Create an empty table able to hold `capacity` live entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: VecDeque::new(),
            capacity,
            len: 0,
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if no entries are live
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a value, returning its handle.
    ///
    /// Fails with `ResourceExhausted` when the table is full.
    pub fn insert(&mut self, value: T) -> Result<Handle, KernelError> {
        if self.len >= self.capacity {
            return Err(KernelError::ResourceExhausted);
        }

        let index = match self.free.pop_front() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 1,
                    value: None,
                });
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.value = Some(value);
        self.len += 1;

        Ok(Handle {
            index,
            generation: slot.generation,
        })
    }

    /// Look up a live entry
    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.value.as_ref())
    }

    /// Remove an entry, invalidating every copy of its handle.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;

        slot.generation = slot.generation.wrapping_add(1).max(1);
        self.free.push_back(handle.index);
        self.len -= 1;

        Some(value)
    }

    /// Iterate over live entries
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.value.as_ref().map(|v| {
                (
                    Handle {
                        index: i as u32,
                        generation: s.generation,
                    },
                    v,
                )
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut table = HandleTable::new(4);
        let h = table.insert("a").unwrap();
        assert_eq!(table.get(h), Some(&"a"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_capacity_exhausted() {
        let mut table = HandleTable::new(2);
        table.insert(1).unwrap();
        table.insert(2).unwrap();
        assert_eq!(table.insert(3), Err(KernelError::ResourceExhausted));
    }

    #[test]
    fn test_stale_handle_rejected_after_reuse() {
        let mut table = HandleTable::new(1);
        let old = table.insert(10).unwrap();
        assert_eq!(table.remove(old), Some(10));

        let new = table.insert(20).unwrap();
        assert_eq!(new.index(), old.index());
        assert_ne!(new.generation(), old.generation());

        assert_eq!(table.get(old), None);
        assert_eq!(table.remove(old), None);
        assert_eq!(table.get(new), Some(&20));
    }

    #[test]
    fn test_double_remove() {
        let mut table = HandleTable::new(2);
        let h = table.insert(()).unwrap();
        assert!(table.remove(h).is_some());
        assert!(table.remove(h).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_raw_roundtrip_and_zero_is_invalid() {
        let mut table = HandleTable::new(2);
        let h = table.insert(5u8).unwrap();
        assert_eq!(Handle::from_raw(h.to_raw()), h);
        assert!(table.get(Handle::from_raw(0)).is_none());
    }

    #[test]
    fn test_iter_skips_vacant() {
        let mut table = HandleTable::new(3);
        let a = table.insert('a').unwrap();
        let _b = table.insert('b').unwrap();
        table.remove(a);
        let live: Vec<char> = table.iter().map(|(_, v)| *v).collect();
        assert_eq!(live, alloc::vec!['b']);
    }
}
