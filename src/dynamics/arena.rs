//! Generational arena used for bodies, fixtures, contacts and joints.
//!
//! Slots are reused LIFO, and iteration is always in slot order, so two
//! worlds that perform the same operations see the same handles and the same
//! iteration order.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// Typed key into an `Arena`.
pub trait ArenaHandle: Copy {
    fn from_parts(index: usize, generation: u32) -> Self;
    fn index(self) -> usize;
    fn generation(self) -> u32;
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name {
            index: u32,
            generation: u32,
        }

        impl ArenaHandle for $name {
            fn from_parts(index: usize, generation: u32) -> Self {
                Self { index: index as u32, generation }
            }

            fn index(self) -> usize {
                self.index as usize
            }

            fn generation(self) -> u32 {
                self.generation
            }
        }
    };
}

define_handle!(
    /// Handle to a body owned by a `World`.
    BodyHandle
);
define_handle!(
    /// Handle to a fixture owned by a `World`.
    FixtureHandle
);
define_handle!(
    /// Handle to a contact owned by the contact manager.
    ContactHandle
);
define_handle!(
    /// Handle to a joint owned by a `World`.
    JointHandle
);

#[derive(Clone, Debug)]
enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

#[derive(Clone, Debug)]
pub struct Arena<H, T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    len: usize,
    _handle: PhantomData<fn() -> H>,
}

impl<H: ArenaHandle, T> Default for Arena<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ArenaHandle, T> Arena<H, T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            _handle: PhantomData,
        }
    }

    pub fn insert(&mut self, value: T) -> H {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let generation = match self.slots[index] {
                Slot::Vacant { generation } => generation,
                Slot::Occupied { generation, .. } => generation,
            };
            self.slots[index] = Slot::Occupied { generation, value };
            return H::from_parts(index, generation);
        }
        let index = self.slots.len();
        self.slots.push(Slot::Occupied { generation: 0, value });
        H::from_parts(index, 0)
    }

    pub fn remove(&mut self, handle: H) -> Option<T> {
        let index = handle.index();
        match self.slots.get(index) {
            Some(Slot::Occupied { generation, .. }) if *generation == handle.generation() => {}
            _ => return None,
        }
        let next = Slot::Vacant {
            generation: handle.generation().wrapping_add(1),
        };
        let old = std::mem::replace(&mut self.slots[index], next);
        self.free.push(index);
        self.len -= 1;
        match old {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    pub fn contains(&self, handle: H) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(&self, handle: H) -> Option<&T> {
        match self.slots.get(handle.index()) {
            Some(Slot::Occupied { generation, value }) if *generation == handle.generation() => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        match self.slots.get_mut(handle.index()) {
            Some(Slot::Occupied { generation, value }) if *generation == handle.generation() => Some(value),
            _ => None,
        }
    }

    /// Mutable access to two distinct entries.
    pub fn get2_mut(&mut self, a: H, b: H) -> Option<(&mut T, &mut T)> {
        let (ia, ib) = (a.index(), b.index());
        if ia == ib || ia >= self.slots.len() || ib >= self.slots.len() {
            return None;
        }
        let (first, second) = if ia < ib {
            let (lo, hi) = self.slots.split_at_mut(ib);
            (&mut lo[ia], &mut hi[0])
        } else {
            let (lo, hi) = self.slots.split_at_mut(ia);
            (&mut hi[0], &mut lo[ib])
        };
        match (first, second) {
            (
                Slot::Occupied { generation: ga, value: va },
                Slot::Occupied { generation: gb, value: vb },
            ) if *ga == a.generation() && *gb == b.generation() => Some((va, vb)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots, occupied or not. Upper bound for `handle.index()`.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Occupied { generation, value } => Some((H::from_parts(index, *generation), value)),
            Slot::Vacant { .. } => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (H, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Occupied { generation, value } => Some((H::from_parts(index, *generation), value)),
            Slot::Vacant { .. } => None,
        })
    }

    pub fn handles(&self) -> Vec<H> {
        self.iter().map(|(handle, _)| handle).collect()
    }
}

impl<H: ArenaHandle, T> std::ops::Index<H> for Arena<H, T> {
    type Output = T;

    /// Panics on a stale handle. Internal code only indexes with handles it
    /// knows to be live.
    fn index(&self, handle: H) -> &T {
        match self.get(handle) {
            Some(value) => value,
            None => panic!("stale arena handle {:?}", handle.index()),
        }
    }
}

impl<H: ArenaHandle, T> std::ops::IndexMut<H> for Arena<H, T> {
    fn index_mut(&mut self, handle: H) -> &mut T {
        match self.get_mut(handle) {
            Some(value) => value,
            None => panic!("stale arena handle {:?}", handle.index()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_handles_are_rejected() {
        let mut arena: Arena<BodyHandle, &str> = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.remove(a), Some("a"));
        assert!(arena.get(a).is_none());

        // Slot reuse bumps the generation.
        let c = arena.insert("c");
        assert_eq!(c.index(), a.index());
        assert_ne!(c.generation(), a.generation());
        assert_eq!(arena.get(c), Some(&"c"));
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.handles(), vec![c, b]);
    }

    #[test]
    fn test_get2_mut() {
        let mut arena: Arena<BodyHandle, i32> = Arena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        let (x, y) = arena.get2_mut(b, a).unwrap();
        std::mem::swap(x, y);
        assert_eq!(arena[a], 2);
        assert_eq!(arena[b], 1);
        assert!(arena.get2_mut(a, a).is_none());
    }
}
