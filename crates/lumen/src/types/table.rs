//! Hash table type: open-addressed, power-of-two sized. Grows when
//! `count >= size - 2`. The re-probe step shifts the hash right by one bit
//! each attempt, so the whole probe sequence is deterministic from the
//! hash alone. Iteration yields `(key, value)` pairs in slot order.

use crate::{heap::Heap, intern::Interner, types::ops, value::Value};

const INITIAL_SIZE: usize = 8;

struct Entry {
    key: Value,
    value: Value,
    hash: u64,
}

/// The runtime `table` built-in type (Lumen's hash map literal, created by
/// the `table()` built-in and `t["k"] = v` item assignment).
pub struct TableObj {
    slots: Vec<Option<Entry>>,
    count: usize,
}

impl std::fmt::Debug for TableObj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableObj").field("count", &self.count).field("size", &self.slots.len()).finish()
    }
}

impl Default for TableObj {
    fn default() -> Self {
        Self::new()
    }
}

impl TableObj {
    pub fn new() -> Self {
        Self { slots: (0..INITIAL_SIZE).map(|_| None).collect(), count: 0 }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn should_grow(&self) -> bool {
        self.count as isize >= self.slots.len() as isize - 2
    }

    /// Deterministic re-probe: shift the hash right by one bit each step,
    /// masked into the table's (power-of-two) size. A hash whose low bits
    /// are all zero (`0`, `false`, `0.0`, ...) collapses to the same shifted
    /// value on every attempt once the shift exhausts its set bits; once
    /// that happens the sequence switches to linear probing by `attempt` so
    /// it still eventually visits every slot instead of revisiting one.
    fn probe(size: usize, hash: u64, attempt: u32) -> usize {
        let shifted = hash >> attempt.min(63);
        if shifted == 0 && attempt > 0 {
            (attempt as usize) & (size - 1)
        } else {
            (shifted as usize) & (size - 1)
        }
    }

    fn find_slot(&self, key: &Value, hash: u64, heap: &Heap, interner: &Interner) -> usize {
        let size = self.slots.len();
        let mut attempt = 0u32;
        loop {
            let index = Self::probe(size, hash, attempt);
            match &self.slots[index] {
                None => return index,
                Some(entry) if entry.hash == hash && ops::values_equal(&entry.key, key, heap, interner) => {
                    return index;
                }
                Some(_) => attempt += 1,
            }
            assert!((attempt as usize) <= size, "table probe sequence exhausted an entire power-of-two table");
        }
    }

    fn grow(&mut self, heap: &Heap, interner: &Interner) {
        let old = std::mem::take(&mut self.slots);
        let new_size = old.len() * 2;
        self.slots = (0..new_size).map(|_| None).collect();
        self.count = 0;
        for entry in old.into_iter().flatten() {
            self.insert_entry(entry, heap, interner);
        }
    }

    fn insert_entry(&mut self, entry: Entry, heap: &Heap, interner: &Interner) {
        let index = self.find_slot(&entry.key, entry.hash, heap, interner);
        if self.slots[index].is_none() {
            self.count += 1;
        }
        self.slots[index] = Some(entry);
    }

    /// Inserts `key -> value`, returning the previous value at that key (if
    /// any) so the caller can drop its refcount.
    pub fn insert(&mut self, key: Value, value: Value, heap: &Heap, interner: &Interner) -> Option<Value> {
        if self.should_grow() {
            self.grow(heap, interner);
        }
        let hash = ops::hash_value(&key, heap, interner);
        let index = self.find_slot(&key, hash, heap, interner);
        let previous = self.slots[index].take().map(|e| e.value);
        if previous.is_none() {
            self.count += 1;
        }
        self.slots[index] = Some(Entry { key, value, hash });
        previous
    }

    pub fn get(&self, key: &Value, heap: &Heap, interner: &Interner) -> Option<Value> {
        let hash = ops::hash_value(key, heap, interner);
        let index = self.find_slot(key, hash, heap, interner);
        self.slots[index].as_ref().map(|e| e.value)
    }

    pub fn contains(&self, key: &Value, heap: &Heap, interner: &Interner) -> bool {
        self.get(key, heap, interner).is_some()
    }

    /// Removes `key`, returning the `(key, value)` pair so the caller can
    /// drop both refcounts. Uses tombstone-free removal: since probing is
    /// deterministic from the hash alone (no chaining beyond linear
    /// re-probe), a removed slot is simply cleared and later lookups keep
    /// probing past the hole — this is correct because every stored key's
    /// probe sequence is a strict function of its hash, independent of
    /// what currently occupies earlier slots.
    pub fn remove(&mut self, key: &Value, heap: &Heap, interner: &Interner) -> Option<(Value, Value)> {
        let hash = ops::hash_value(key, heap, interner);
        let index = self.find_slot(key, hash, heap, interner);
        let removed = self.slots[index].take().map(|e| (e.key, e.value));
        if removed.is_some() {
            self.count -= 1;
            self.rehash_tail(index, heap, interner);
        }
        removed
    }

    /// After clearing `from`, re-inserts every entry that might have been
    /// pushed past its ideal slot by probing through `from`, restoring
    /// reachability for open addressing without tombstones.
    fn rehash_tail(&mut self, from: usize, heap: &Heap, interner: &Interner) {
        let size = self.slots.len();
        let mut index = (from + 1) % size;
        let mut displaced = Vec::new();
        while let Some(entry) = self.slots[index].take() {
            displaced.push(entry);
            index = (index + 1) % size;
        }
        self.count -= displaced.len();
        for entry in displaced {
            self.insert_entry(entry, heap, interner);
        }
    }

    /// `(key, value)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.slots.iter().filter_map(|slot| slot.as_ref().map(|e| (e.key, e.value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn insert_and_get_round_trips() {
        let heap = Heap::new();
        let interner = Interner::new();
        let mut table = TableObj::new();
        table.insert(Value::Int(1), Value::Int(100), &heap, &interner);
        table.insert(Value::Int(2), Value::Int(200), &heap, &interner);
        assert_eq!(table.get(&Value::Int(1), &heap, &interner), Some(Value::Int(100)));
        assert_eq!(table.get(&Value::Int(2), &heap, &interner), Some(Value::Int(200)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn grows_past_size_minus_two() {
        let heap = Heap::new();
        let interner = Interner::new();
        let mut table = TableObj::new();
        for i in 0..20 {
            table.insert(Value::Int(i), Value::Int(i * 10), &heap, &interner);
        }
        assert_eq!(table.len(), 20);
        for i in 0..20 {
            assert_eq!(table.get(&Value::Int(i), &heap, &interner), Some(Value::Int(i * 10)));
        }
    }

    #[test]
    fn zero_hash_key_does_not_spin_against_slot_zero() {
        let heap = Heap::new();
        let interner = Interner::new();
        let mut table = TableObj::new();
        table.insert(Value::Int(8), Value::Int(1), &heap, &interner);
        table.insert(Value::Int(0), Value::Int(2), &heap, &interner);
        assert_eq!(table.get(&Value::Int(8), &heap, &interner), Some(Value::Int(1)));
        assert_eq!(table.get(&Value::Int(0), &heap, &interner), Some(Value::Int(2)));
    }

    #[test]
    fn remove_keeps_later_entries_reachable() {
        let heap = Heap::new();
        let interner = Interner::new();
        let mut table = TableObj::new();
        for i in 0..6 {
            table.insert(Value::Int(i), Value::Int(i), &heap, &interner);
        }
        table.remove(&Value::Int(0), &heap, &interner);
        for i in 1..6 {
            assert_eq!(table.get(&Value::Int(i), &heap, &interner), Some(Value::Int(i)));
        }
    }
}
