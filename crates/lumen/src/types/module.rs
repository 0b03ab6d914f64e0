//! Module type: a hash-table of properties keyed by string, used to expose
//! built-ins as attribute lookups.

use ahash::AHashMap;

use crate::{intern::StringId, value::Value};

#[derive(Debug, Default)]
pub struct ModuleObj {
    pub name: StringId,
    pub props: AHashMap<StringId, Value>,
}

impl ModuleObj {
    pub fn new(name: StringId) -> Self {
        Self { name, props: AHashMap::new() }
    }

    pub fn get(&self, name: StringId) -> Option<Value> {
        self.props.get(&name).copied()
    }

    pub fn set(&mut self, name: StringId, value: Value) -> Option<Value> {
        self.props.insert(name, value)
    }
}
