//! Class and instance types.
//!
//! Method dispatch resolves through the instance's class chain; if
//! attribute `x` exists directly on the instance it shadows a method named
//! `x` on the class.

use ahash::AHashMap;

use crate::{heap::HeapId, intern::StringId, value::Value};

/// A compiled class. Methods are user functions (heap `Function` values)
/// keyed by name; `parent` is the base class looked up via `extends`,
/// consulted by `Magic(super)` and by attribute fallback.
#[derive(Debug)]
pub struct ClassObj {
    pub name: StringId,
    pub parent: Option<HeapId>,
    pub methods: AHashMap<StringId, HeapId>,
}

impl ClassObj {
    pub fn new(name: StringId, parent: Option<HeapId>) -> Self {
        Self { name, parent, methods: AHashMap::new() }
    }

    pub fn own_method(&self, name: StringId) -> Option<HeapId> {
        self.methods.get(&name).copied()
    }
}

/// An instance of a class. Attribute lookup checks `attrs` first (instance
/// attributes shadow methods of the same name), then falls back to method
/// resolution up the `parent` chain.
#[derive(Debug, Default)]
pub struct InstanceObj {
    pub class: Option<HeapId>,
    pub attrs: AHashMap<StringId, Value>,
}

impl InstanceObj {
    pub fn new(class: HeapId) -> Self {
        Self { class: Some(class), attrs: AHashMap::new() }
    }
}
