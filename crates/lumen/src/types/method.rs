//! Bound method type: pairs a callable with the receiver it was looked up
//! through.
//!
//! Two flavors share one heap representation: a user method (a class's
//! `Function` bound to an `Instance`) and a built-in method (one entry of
//! a built-in type's static method table — `list.append`, `file.read` —
//! bound to the receiving `List`/`File`/... value). Both resolve lazily
//! from [`crate::types::ops::getattr`] and both are invoked the same way
//! from the `CALL` opcode.

use crate::{heap::HeapId, types::native_method::NativeMethod, value::Value};

#[derive(Debug)]
pub enum BoundMethodObj {
    /// A class method: the underlying `Function` heap value bound to the
    /// instance it was looked up through.
    User { function: HeapId, instance: Value },
    /// A built-in type's method table entry, bound to the receiver it was
    /// resolved on (a list, table, string, file, ...).
    Native { method: NativeMethod, receiver: Value },
}

impl BoundMethodObj {
    pub fn user(function: HeapId, instance: Value) -> Self {
        Self::User { function, instance }
    }

    pub fn native(method: NativeMethod, receiver: Value) -> Self {
        Self::Native { method, receiver }
    }
}
