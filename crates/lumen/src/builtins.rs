//! Native (built-in) functions.
//!
//! This module only enumerates which native functions exist and what
//! they're named; the call logic itself lives in
//! [`crate::bytecode::vm::call`], since every built-in needs access to the
//! running VM's heap, interner, output sink, and (for `eval`) the compiler
//! itself. Keeping the call logic there avoids a dependency cycle between
//! this module and the compiler.

use strum::{Display, EnumIter, IntoStaticStr};

/// One native function, reachable from user code as a pre-bound global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum BuiltinFn {
    Print,
    Len,
    Int,
    Eval,
    Open,
    Hash,
    Type,
    Iter,
    List,
    Tuple,
    Table,
    Format,
}

impl BuiltinFn {
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Looks up a native function by its surface name, used when the
    /// compiler binds the global namespace for a fresh program.
    pub fn lookup(name: &str) -> Option<Self> {
        use strum::IntoEnumIterator;
        Self::iter().find(|b| b.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_round_trips_through_its_name() {
        use strum::IntoEnumIterator;
        for builtin in BuiltinFn::iter() {
            assert_eq!(BuiltinFn::lookup(builtin.name()), Some(builtin));
        }
    }

    #[test]
    fn unknown_name_is_not_a_builtin() {
        assert_eq!(BuiltinFn::lookup("not_a_builtin"), None);
    }
}
