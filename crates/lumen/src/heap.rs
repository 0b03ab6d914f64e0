//! Reference-counted heap arena.
//!
//! An arena of slots addressed by a small `Copy` id (`HeapId`) instead of
//! `Rc`/`Arc` pointers, so that refcounting is explicit (`incref`/`decref`)
//! and can be driven uniformly from register stores, fetches, and container
//! insertion/removal. This sidesteps the need to trace `Rc` cycles through
//! pointer graphs, at the cost of a documented tradeoff: cyclic structures
//! (an instance whose attribute points back to itself, a closure captured
//! by its own body) simply leak until the process exits. There is no
//! mark-and-sweep fallback.
//!
//! A second, parallel arena holds [`crate::scope::ScopeRecord`]s. Scopes
//! aren't `Value`s (no arithmetic, no hash, never observed by a user
//! program) but they do participate in the same reference-counted
//! lifetime story as closures capture them, so they get their own id space
//! rather than living behind `Rc`.

use crate::types::{
    class::ClassObj, exception::ExceptionObj, file::FileObj, function::FunctionObj, iterator::IterObj,
    list::ListObj, method::BoundMethodObj, module::ModuleObj, range::RangeObj, string::LString, table::TableObj,
    tuple::TupleObj,
};
use crate::scope::ScopeRecord;

/// Id of a heap-allocated object. `u32` keeps `Value` small.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapId(u32);

impl HeapId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Id of a heap-allocated [`ScopeRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);

impl ScopeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// The payload behind a [`HeapId`]. One variant per heap-backed built-in
/// type (everything except `bool`, `int`, `float`, which are immediate
/// `Value`s; user functions and native functions get their own
/// `Function`/`Native` variants below).
#[derive(Debug)]
pub enum HeapData {
    Str(LString),
    Tuple(TupleObj),
    List(ListObj),
    Table(TableObj),
    Range(RangeObj),
    Iterator(IterObj),
    Function(FunctionObj),
    Native(crate::builtins::BuiltinFn),
    Class(ClassObj),
    Instance(crate::types::class::InstanceObj),
    BoundMethod(BoundMethodObj),
    Module(ModuleObj),
    Exception(ExceptionObj),
    File(FileObj),
}

struct Slot {
    data: Option<HeapData>,
    refcount: u32,
    permanent: bool,
}

struct ScopeSlot {
    data: Option<ScopeRecord>,
    refcount: u32,
}

/// The reference-counted object arena shared by a single VM run.
#[derive(Default)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    scopes: Vec<ScopeSlot>,
    scope_free: Vec<u32>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates `data` with refcount 1.
    pub fn alloc(&mut self, data: HeapData) -> HeapId {
        self.alloc_inner(data, false)
    }

    /// Allocates `data` as a permanent singleton (e.g. `EMPTY_TUPLE`,
    /// `EMPTY_STRING`): `incref`/`decref` become no-ops.
    pub fn alloc_permanent(&mut self, data: HeapData) -> HeapId {
        self.alloc_inner(data, true)
    }

    fn alloc_inner(&mut self, data: HeapData, permanent: bool) -> HeapId {
        let slot = Slot { data: Some(data), refcount: 1, permanent };
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = slot;
            HeapId(index)
        } else {
            let id = HeapId(self.slots.len() as u32);
            self.slots.push(slot);
            id
        }
    }

    pub fn get(&self, id: HeapId) -> &HeapData {
        self.slots[id.index()].data.as_ref().expect("dangling HeapId")
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        self.slots[id.index()].data.as_mut().expect("dangling HeapId")
    }

    pub fn incref(&mut self, id: HeapId) {
        let slot = &mut self.slots[id.index()];
        if !slot.permanent {
            slot.refcount += 1;
        }
    }

    /// Decrements the refcount, running the type's cleanup (dropping any
    /// `Value`s the payload itself owns) when it reaches zero.
    pub fn decref(&mut self, id: HeapId) {
        let slot = &mut self.slots[id.index()];
        if slot.permanent {
            return;
        }
        slot.refcount -= 1;
        if slot.refcount == 0 {
            let data = self.slots[id.index()].data.take();
            self.free.push(id.0);
            if let Some(data) = data {
                crate::types::ops::cleanup(data, self);
            }
        }
    }

    pub fn refcount(&self, id: HeapId) -> u32 {
        self.slots[id.index()].refcount
    }

    pub fn live_objects(&self) -> usize {
        self.slots.iter().filter(|s| s.data.is_some()).count()
    }

    // --- scope arena ---

    pub fn alloc_scope(&mut self, record: ScopeRecord) -> ScopeId {
        let slot = ScopeSlot { data: Some(record), refcount: 1 };
        if let Some(index) = self.scope_free.pop() {
            self.scopes[index as usize] = slot;
            ScopeId(index)
        } else {
            let id = ScopeId(self.scopes.len() as u32);
            self.scopes.push(slot);
            id
        }
    }

    pub fn scope(&self, id: ScopeId) -> &ScopeRecord {
        self.scopes[id.index()].data.as_ref().expect("dangling ScopeId")
    }

    pub fn incref_scope(&mut self, id: ScopeId) {
        self.scopes[id.index()].refcount += 1;
    }

    pub fn decref_scope(&mut self, id: ScopeId) {
        let slot = &mut self.scopes[id.index()];
        slot.refcount -= 1;
        if slot.refcount == 0 {
            let record = self.scopes[id.index()].data.take();
            self.scope_free.push(id.0);
            if let Some(record) = record {
                for v in record.locals {
                    v.drop_with_heap(self);
                }
            }
        }
    }
}
