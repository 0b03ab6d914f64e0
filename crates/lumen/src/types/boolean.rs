//! Bool type: a singleton `TRUE`/`FALSE`, coercible to int 1/0 and to the
//! strings `"true"`/`"false"`.
//!
//! `Value::Bool` is stored inline rather than behind a `HeapId`, so
//! identity degenerates to ordinary `bool` equality — there is only ever
//! one `true` and one `false` bit pattern, which already gives the
//! singleton property for free.

pub fn as_int(b: bool) -> i64 {
    i64::from(b)
}

pub fn as_string(b: bool) -> &'static str {
    if b { "true" } else { "false" }
}
