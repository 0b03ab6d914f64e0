//! Lexical scope chain and closure capture.
//!
//! A scope holds the local variable slots live at one nesting level plus a
//! link to its parent. Closures capture exactly one level: when a
//! `function` expression is evaluated, the enclosing scope's local slots
//! are snapshotted into a single [`ScopeRecord`] and stored alongside the
//! function's compiled code. Looking a name up from inside that function
//! walks at most one parent link before falling back to globals — there is
//! no indefinite walk up a chain of ancestor closures.

use crate::{heap::ScopeId, value::Value};

/// One captured lexical level. `locals` holds the values visible at the
/// point the enclosing function or block was entered; `parent` is the
/// scope one level further out, if this scope was itself created inside a
/// closure.
#[derive(Debug)]
pub struct ScopeRecord {
    pub locals: Vec<Value>,
    pub parent: Option<ScopeId>,
}

impl ScopeRecord {
    pub fn new(locals: Vec<Value>, parent: Option<ScopeId>) -> Self {
        Self { locals, parent }
    }

    pub fn get(&self, slot: usize) -> Option<Value> {
        self.locals.get(slot).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_slot_lookup_is_positional() {
        let record = ScopeRecord::new(vec![Value::Int(1), Value::Int(2)], None);
        assert_eq!(record.get(0), Some(Value::Int(1)));
        assert_eq!(record.get(1), Some(Value::Int(2)));
        assert_eq!(record.get(2), None);
    }
}
