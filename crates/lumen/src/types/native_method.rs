//! Built-in types' method tables (`spec.md` §3.2: "a static list of
//! `(name, native_fn)` pairs ... resolved lazily").
//!
//! Unlike the top-level built-ins in [`crate::builtins`] (pre-bound
//! globals: `print`, `len`, ...), these are looked up through ordinary
//! attribute access on a value of the owning type (`mylist.append(x)`,
//! `f.readline()`) and only then called — so resolution lives in
//! [`crate::types::ops::getattr`], which binds the method to its receiver
//! the same way a class method binds to an instance. The call logic
//! itself lives in `crate::bytecode::vm`, alongside the rest of the
//! call-dispatch machinery, for the same reason `crate::builtins` keeps
//! its call logic out of this module.

use strum::{Display, EnumIter, IntoStaticStr};

use crate::types::TypeName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum NativeMethod {
    ListAppend,
    ListPop,
    ListRemoveAt,
    ListIndexOf,
    ListClear,
    TableKeys,
    TableValues,
    TableHas,
    TableRemove,
    TableClear,
    StringUpper,
    StringLower,
    StringSplit,
    StringTrim,
    StringReplace,
    StringStartsWith,
    StringEndsWith,
    FileRead,
    FileReadline,
    FileWrite,
    FileTell,
    FileFlush,
    FileClose,
}

impl NativeMethod {
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Looks up a method by owning type and surface name, resolving
    /// `spec.md`'s "lazy" method-table lookup.
    pub fn lookup(owner: TypeName, name: &str) -> Option<Self> {
        use strum::IntoEnumIterator;
        Self::iter().find(|m| m.name() == name && m.owner() == owner)
    }

    pub fn owner(self) -> TypeName {
        match self {
            Self::ListAppend | Self::ListPop | Self::ListRemoveAt | Self::ListIndexOf | Self::ListClear => {
                TypeName::List
            }
            Self::TableKeys | Self::TableValues | Self::TableHas | Self::TableRemove | Self::TableClear => {
                TypeName::Table
            }
            Self::StringUpper
            | Self::StringLower
            | Self::StringSplit
            | Self::StringTrim
            | Self::StringReplace
            | Self::StringStartsWith
            | Self::StringEndsWith => TypeName::String,
            Self::FileRead | Self::FileReadline | Self::FileWrite | Self::FileTell | Self::FileFlush | Self::FileClose => {
                TypeName::File
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_method_round_trips_through_its_name_and_owner() {
        use strum::IntoEnumIterator;
        for method in NativeMethod::iter() {
            assert_eq!(NativeMethod::lookup(method.owner(), method.name()), Some(method));
        }
    }

    #[test]
    fn a_method_name_on_the_wrong_owner_does_not_resolve() {
        assert_eq!(NativeMethod::lookup(TypeName::Table, "append"), None);
    }
}
