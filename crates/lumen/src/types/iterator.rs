//! Iterator type.
//!
//! `StopIteration` is the only sentinel for end of iteration; producers
//! never return `Nil` for "no more". [`IterObj::next`] enforces that once
//! exhausted, an iterator stays exhausted forever via an explicit flag,
//! rather than relying on each source's own bounds check to happen to keep
//! reporting done on every later call.

use crate::{heap::Heap, heap::HeapData, heap::HeapId, types::range::RangeObj, value::Value};

#[derive(Debug)]
pub enum IterSource {
    List { container: HeapId, index: usize },
    Tuple { container: HeapId, index: usize },
    /// Table iteration yields `(key, value)` tuples; the tuples themselves
    /// are allocated lazily, one per `next()` call.
    Table { container: HeapId, index: usize },
    Range { range: RangeObj, current: i64 },
    StringChars { container: HeapId, index: usize },
}

#[derive(Debug)]
pub struct IterObj {
    pub source: IterSource,
    exhausted: bool,
}

impl Default for IterObj {
    /// An already-exhausted placeholder. Used both as the fallback for a
    /// `for`-loop over a non-iterable value and as the swap-out target
    /// when the VM needs to hand a persisted iterator `&mut self` while
    /// also reading the heap it lives in (the same trick
    /// [`crate::types::table::TableObj`] uses for its own mutating calls).
    fn default() -> Self {
        Self { source: IterSource::Range { range: RangeObj::new(0, 0, 1), current: 0 }, exhausted: true }
    }
}

impl IterObj {
    pub fn new(source: IterSource) -> Self {
        Self { source, exhausted: false }
    }

    /// Advances the iterator. Returns `(value, needs_tuple_alloc)` where
    /// `needs_tuple_alloc` signals a table pair that the VM must allocate
    /// on the heap (iterator construction can't allocate eagerly without
    /// knowing the whole table up front).
    pub fn next(&mut self, heap: &Heap) -> IterStep {
        if self.exhausted {
            return IterStep::Done;
        }
        let step = match &mut self.source {
            IterSource::List { container, index } => {
                let HeapData::List(list) = heap.get(*container) else { unreachable!("iterator source mismatch") };
                if *index < list.len() {
                    let v = list.items[*index];
                    *index += 1;
                    IterStep::Value(v)
                } else {
                    IterStep::Done
                }
            }
            IterSource::Tuple { container, index } => {
                let HeapData::Tuple(tuple) = heap.get(*container) else {
                    unreachable!("iterator source mismatch")
                };
                if *index < tuple.len() {
                    let v = tuple.items[*index];
                    *index += 1;
                    IterStep::Value(v)
                } else {
                    IterStep::Done
                }
            }
            IterSource::Table { container, index } => {
                let HeapData::Table(table) = heap.get(*container) else {
                    unreachable!("iterator source mismatch")
                };
                match table.iter().nth(*index) {
                    Some((k, v)) => {
                        *index += 1;
                        IterStep::Pair(k, v)
                    }
                    None => IterStep::Done,
                }
            }
            IterSource::Range { range, current } => {
                if range.in_bounds(*current) {
                    let v = *current;
                    *current += range.step;
                    IterStep::Value(Value::Int(v))
                } else {
                    IterStep::Done
                }
            }
            IterSource::StringChars { container, index } => {
                let HeapData::Str(s) = heap.get(*container) else { unreachable!("iterator source mismatch") };
                match s.char_at(*index) {
                    Some(c) => {
                        *index += 1;
                        IterStep::Char(c)
                    }
                    None => IterStep::Done,
                }
            }
        };
        if matches!(step, IterStep::Done) {
            self.exhausted = true;
        }
        step
    }

    pub fn container(&self) -> Option<HeapId> {
        match self.source {
            IterSource::List { container, .. }
            | IterSource::Tuple { container, .. }
            | IterSource::Table { container, .. }
            | IterSource::StringChars { container, .. } => Some(container),
            IterSource::Range { .. } => None,
        }
    }
}

/// Result of one `next()` step. `Pair`/`Char` ask the VM to allocate a
/// fresh heap value (a 2-tuple, a 1-character string) before the result
/// reaches user code; `Value` is already a complete runtime value.
pub enum IterStep {
    Value(Value),
    Pair(Value, Value),
    Char(char),
    Done,
}
