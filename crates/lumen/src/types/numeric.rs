//! Int and float types.
//!
//! Integers are 64-bit signed. Floats use `f64` throughout: Rust has no
//! portable 80-bit extended-precision float, so there's no platform-specific
//! wider representation to fall back to.

/// Binary arithmetic operators, laid out in a fixed order so a `MATH`
/// opcode's subtype byte indexes this table directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::FromRepr)]
#[repr(u8)]
pub enum MathOp {
    Plus = 0,
    Minus = 1,
    Star = 2,
    Pow = 3,
    Slash = 4,
    Mod = 5,
    LShift = 6,
    RShift = 7,
    BAnd = 8,
    BOr = 9,
    Xor = 10,
}

impl MathOp {
    pub const COUNT: usize = 11;
}

/// Comparison operators recognized by the `COMPARE` opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::FromRepr)]
#[repr(u8)]
pub enum CompareOp {
    Is = 0,
    Eq = 1,
    Neq = 2,
    Exact = 3,
    NotExact = 4,
    Lt = 5,
    Lte = 6,
    Gt = 7,
    Gte = 8,
    In = 9,
    Spaceship = 10,
}

/// `int op float -> float`: the int operand is promoted and the float's
/// slot runs the arithmetic.
pub fn int_as_float(i: i64) -> f64 {
    i as f64
}
