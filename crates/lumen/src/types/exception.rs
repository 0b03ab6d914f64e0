//! Exception type: a first-class built-in value carrying a kind and a
//! message. It can be constructed and inspected like any other value, but
//! the VM never raises or catches one automatically — there is no
//! `try`/`catch`/`throw` grammar, so propagation is left entirely to
//! ordinary control flow (returning the exception value, checking it with
//! `if`).

use crate::{intern::StringId, value::Value};

#[derive(Debug)]
pub struct ExceptionObj {
    pub kind: StringId,
    pub message: Value,
}

impl ExceptionObj {
    pub fn new(kind: StringId, message: Value) -> Self {
        Self { kind, message }
    }
}
