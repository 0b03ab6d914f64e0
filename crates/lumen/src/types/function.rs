//! User function type: pairs a compiled code body with the closure scope
//! it captured at creation time.

use crate::{bytecode::CodeId, heap::{HeapId, ScopeId}};

#[derive(Debug, Clone, Copy)]
pub struct FunctionObj {
    pub code: CodeId,
    pub scope: ScopeId,
    /// The class this function is a method of, set once by `BuildClass` after
    /// the class itself is allocated. `None` for a plain `function` value.
    /// Consulted by `super.name` dispatch, which needs the *defining*
    /// class's parent rather than the runtime receiver's class.
    pub owner: Option<HeapId>,
}

impl FunctionObj {
    pub fn new(code: CodeId, scope: ScopeId) -> Self {
        Self { code, scope, owner: None }
    }

    pub fn with_owner(code: CodeId, scope: ScopeId, owner: HeapId) -> Self {
        Self { code, scope, owner: Some(owner) }
    }
}
