use std::rc::Rc;

use crate::bytecode::value::{StrObj, Value};

const MIN_CAPACITY: usize = 8;
const MAX_LOAD: f64 = 0.75;

enum Slot<V> {
    Empty,
    Tombstone,
    Occupied(Rc<StrObj>, V),
}

/// An open-addressing hash table keyed by interned strings (§4.7), with
/// linear probing and tombstone deletion. Both the VM's globals table and
/// the string interner (§4.8) are built on this same shape — the
/// interner instantiates it with `V = ()` and probes by hash+content
/// (nothing is interned yet, so there's no pointer to compare against),
/// while the globals table instantiates it with `V = Value` and probes by
/// pointer identity, since every key that reaches it is already interned.
pub struct Table<V> {
    slots: Vec<Slot<V>>,
    capacity: usize,
    /// Occupied *and* tombstoned slots, so the load-factor check keeps
    /// probe chains walkable even under alternating insert/delete (§4.7,
    /// §9: "tombstones participate in the load-factor computation").
    count: usize,
}

impl<V> Table<V> {
    pub fn new() -> Table<V> {
        Table { slots: vec![], capacity: 0, count: 0 }
    }

    pub fn len(&self) -> usize { self.count }

    fn probe(slots: &[Slot<V>], capacity: usize, hash: u32, matches: &dyn Fn(&Rc<StrObj>) -> bool) -> usize {
        let mut index = hash as usize % capacity;
        let mut tombstone = None;

        loop {
            match &slots[index] {
                Slot::Empty => return tombstone.unwrap_or(index),
                Slot::Tombstone => { if tombstone.is_none() { tombstone = Some(index); } },
                Slot::Occupied(k, _) => { if matches(k) { return index; } },
            }
            index = (index + 1) % capacity;
        }
    }

    fn grow(&mut self) {
        let new_capacity = if self.capacity < MIN_CAPACITY { MIN_CAPACITY } else { self.capacity * 2 };
        let mut new_slots: Vec<Slot<V>> = Vec::with_capacity(new_capacity);
        new_slots.extend((0..new_capacity).map(|_| Slot::Empty));

        let mut new_count = 0;
        for slot in self.slots.drain(..) {
            if let Slot::Occupied(key, value) = slot {
                let hash = key.hash;
                let index = Self::probe(&new_slots, new_capacity, hash, &|_| false);
                new_slots[index] = Slot::Occupied(key, value);
                new_count += 1;
            }
        }

        self.slots = new_slots;
        self.capacity = new_capacity;
        self.count = new_count;
    }

    /// Finds the key reachable by probing from `hash` that satisfies
    /// `matches`, if any, and returns a clone of the `Rc` (not the
    /// value) — the shape the string interner needs: "is this exact
    /// string already interned, and if so, which object is it."
    pub fn find_key_by(&self, hash: u32, matches: impl Fn(&Rc<StrObj>) -> bool) -> Option<Rc<StrObj>> {
        if self.count == 0 { return None; }
        let index = Self::probe(&self.slots, self.capacity, hash, &matches);
        match &self.slots[index] {
            Slot::Occupied(k, _) => Some(Rc::clone(k)),
            _ => None,
        }
    }

    pub fn get_by(&self, hash: u32, matches: impl Fn(&Rc<StrObj>) -> bool) -> Option<&V> {
        if self.count == 0 { return None; }
        let index = Self::probe(&self.slots, self.capacity, hash, &matches);
        match &self.slots[index] {
            Slot::Occupied(_, v) => Some(v),
            _ => None,
        }
    }

    /// Inserts `key`/`value` reachable by probing from `hash`, returning
    /// `true` iff this created a brand new key (§4.7: `set` returns
    /// "true iff a new key").
    pub fn set_by(&mut self, hash: u32, key: Rc<StrObj>, value: V, matches: impl Fn(&Rc<StrObj>) -> bool) -> bool {
        if (self.count + 1) as f64 > self.capacity as f64 * MAX_LOAD {
            self.grow();
        }

        let index = Self::probe(&self.slots, self.capacity, hash, &matches);
        let is_new = !matches!(self.slots[index], Slot::Occupied(..));
        let was_tombstone = matches!(self.slots[index], Slot::Tombstone);

        self.slots[index] = Slot::Occupied(key, value);
        if is_new && !was_tombstone { self.count += 1; }

        is_new
    }

    pub fn delete_by(&mut self, hash: u32, matches: impl Fn(&Rc<StrObj>) -> bool) -> bool {
        if self.count == 0 { return false; }
        let index = Self::probe(&self.slots, self.capacity, hash, &matches);
        match &self.slots[index] {
            Slot::Occupied(..) => { self.slots[index] = Slot::Tombstone; true },
            _ => false,
        }
    }
}

impl Table<Value> {
    /// The globals table's two public operations (§4.7). Keys are always
    /// already-interned strings, so identity comparison is sufficient.
    pub fn get(&self, key: &Rc<StrObj>) -> Option<&Value> {
        self.get_by(key.hash, |k| Rc::ptr_eq(k, key))
    }

    pub fn set(&mut self, key: Rc<StrObj>, value: Value) -> bool {
        let hash = key.hash;
        let target = Rc::clone(&key);
        self.set_by(hash, key, value, move |k| Rc::ptr_eq(k, &target))
    }

    pub fn delete(&mut self, key: &Rc<StrObj>) -> bool {
        self.delete_by(key.hash, |k| Rc::ptr_eq(k, key))
    }
}

impl<V> Default for Table<V> {
    fn default() -> Self { Table::new() }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;
    use crate::bytecode::value::Interner;

    #[test]
    fn insert_get_delete_roundtrip() {
        let mut interner = Interner::new();
        let mut table: Table<Value> = Table::new();

        let keys: Vec<_> = (0..40).map(|i| interner.intern(&format!("key{}", i))).collect();
        for (i, k) in keys.iter().enumerate() {
            assert!(table.set(Rc::clone(k), Value::Number(i as f64)));
        }
        assert_eq!(table.len(), 40);

        for (i, k) in keys.iter().enumerate() {
            assert_eq!(table.get(k), Some(&Value::Number(i as f64)));
        }

        // delete every other key, then confirm lookups and monotonicity
        for k in keys.iter().step_by(2) {
            assert!(table.delete(k));
        }

        for (i, k) in keys.iter().enumerate() {
            if i % 2 == 0 {
                assert_eq!(table.get(k), None);
            } else {
                assert_eq!(table.get(k), Some(&Value::Number(i as f64)));
            }
        }

        // re-inserting a deleted key's name should work via a fresh interned object
        let again = interner.intern("key0");
        assert!(table.set(Rc::clone(&again), Value::Bool(true)));
        assert_eq!(table.get(&again), Some(&Value::Bool(true)));
    }

    proptest! {
        // §8 property 6: for any sequence of distinct-key inserts followed
        // by deletes, a deleted key is gone, a live key still holds its
        // last value, and nothing here panics (an infinite probe loop
        // would hang the test instead of failing it cleanly, but a panic
        // from an out-of-bounds probe would fail it).
        #[test]
        fn insert_then_delete_subset_is_monotone(n in 1usize..60, delete_every in 2usize..5) {
            let mut interner = Interner::new();
            let mut table: Table<Value> = Table::new();

            let keys: Vec<_> = (0..n).map(|i| interner.intern(&format!("k{}", i))).collect();
            for (i, k) in keys.iter().enumerate() {
                table.set(Rc::clone(k), Value::Number(i as f64));
            }

            let mut deleted = vec![false; n];
            for (i, k) in keys.iter().enumerate() {
                if i % delete_every == 0 {
                    table.delete(k);
                    deleted[i] = true;
                }
            }

            for (i, k) in keys.iter().enumerate() {
                if deleted[i] {
                    prop_assert_eq!(table.get(k), None);
                } else {
                    prop_assert_eq!(table.get(k), Some(&Value::Number(i as f64)));
                }
            }
        }
    }
}
