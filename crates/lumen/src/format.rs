//! The `format(value, spec)` built-in's mini-language (`spec.md` §6.4):
//! `[[fill]align][sign][#][0][width][.precision][type]`.
//!
//! Parsing the spec string is kept separate from applying it so the
//! built-in function (`crate::bytecode::vm::call_format`) only has to
//! hand both pieces to [`format_value`].

use crate::{
    error::CompileErrorKind,
    heap::{Heap, HeapData},
    intern::Interner,
    types::ops,
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
    /// `=`: padding goes after the sign, before the digits. Only
    /// meaningful for numeric types; treated as `Right` otherwise.
    AfterSign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sign {
    /// `-` (default): only negative numbers get a sign character.
    NegOnly,
    /// `+`: both positive and negative numbers get a sign character.
    Always,
    /// ` `: a leading space for positive numbers, `-` for negative.
    Space,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Binary,
    Char,
    Decimal,
    Octal,
    HexLower,
    HexUpper,
    LocaleDecimal,
    ExpLower,
    ExpUpper,
    Fixed,
    FixedUpper,
    General,
    GeneralUpper,
    Percent,
    Str,
}

/// A parsed `format()` spec string.
#[derive(Debug, Clone, Copy)]
struct Spec {
    fill: char,
    align: Option<Align>,
    sign: Sign,
    alternate: bool,
    zero_pad: bool,
    width: Option<usize>,
    precision: Option<usize>,
    kind: Option<Kind>,
}

impl Default for Spec {
    fn default() -> Self {
        Self {
            fill: ' ',
            align: None,
            sign: Sign::NegOnly,
            alternate: false,
            zero_pad: false,
            width: None,
            precision: None,
            kind: None,
        }
    }
}

/// A spec string that names an unrecognized `type` character is the one
/// case `spec.md` §6.4 calls out as a hard runtime error rather than a
/// degrade-to-warning case, since there is no sensible default rendering
/// for an unknown presentation type.
pub struct UnknownFormatType(pub char);

fn parse_spec(spec: &str) -> Result<Spec, UnknownFormatType> {
    let chars: Vec<char> = spec.chars().collect();
    let mut pos = 0;
    let mut out = Spec::default();

    // [[fill]align]
    if chars.len() >= 2 && is_align_char(chars[1]) {
        out.fill = chars[0];
        out.align = Some(align_of(chars[1]));
        pos = 2;
    } else if !chars.is_empty() && is_align_char(chars[0]) {
        out.align = Some(align_of(chars[0]));
        pos = 1;
    }

    // [sign]
    if pos < chars.len() {
        match chars[pos] {
            '+' => {
                out.sign = Sign::Always;
                pos += 1;
            }
            '-' => {
                out.sign = Sign::NegOnly;
                pos += 1;
            }
            ' ' => {
                out.sign = Sign::Space;
                pos += 1;
            }
            _ => {}
        }
    }

    // [#]
    if pos < chars.len() && chars[pos] == '#' {
        out.alternate = true;
        pos += 1;
    }

    // [0]
    if pos < chars.len() && chars[pos] == '0' {
        out.zero_pad = true;
        if out.align.is_none() {
            out.align = Some(Align::AfterSign);
        }
        out.fill = '0';
        pos += 1;
    }

    // [width]
    let width_start = pos;
    while pos < chars.len() && chars[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos > width_start {
        out.width = chars[width_start..pos].iter().collect::<String>().parse().ok();
    }

    // [.precision]
    if pos < chars.len() && chars[pos] == '.' {
        pos += 1;
        let prec_start = pos;
        while pos < chars.len() && chars[pos].is_ascii_digit() {
            pos += 1;
        }
        out.precision = chars[prec_start..pos].iter().collect::<String>().parse().ok();
    }

    // [type]
    if pos < chars.len() {
        let c = chars[pos];
        out.kind = Some(match c {
            'b' => Kind::Binary,
            'c' => Kind::Char,
            'd' => Kind::Decimal,
            'o' => Kind::Octal,
            'x' => Kind::HexLower,
            'X' => Kind::HexUpper,
            'n' => Kind::LocaleDecimal,
            'e' => Kind::ExpLower,
            'E' => Kind::ExpUpper,
            'f' => Kind::Fixed,
            'F' => Kind::FixedUpper,
            'g' => Kind::General,
            'G' => Kind::GeneralUpper,
            '%' => Kind::Percent,
            's' => Kind::Str,
            other => return Err(UnknownFormatType(other)),
        });
        pos += 1;
    }

    if pos != chars.len() {
        // Trailing garbage after a recognized type character; treat the
        // first unconsumed character the same as an unrecognized type.
        return Err(UnknownFormatType(chars[pos]));
    }

    Ok(out)
}

fn is_align_char(c: char) -> bool {
    matches!(c, '<' | '>' | '^' | '=')
}

fn align_of(c: char) -> Align {
    match c {
        '<' => Align::Left,
        '>' => Align::Right,
        '^' => Align::Center,
        '=' => Align::AfterSign,
        _ => unreachable!("caller already checked is_align_char"),
    }
}

fn pad(body: &str, spec: &Spec, sign_len: usize) -> String {
    let Some(width) = spec.width else { return body.to_owned() };
    let len = body.chars().count();
    if len >= width {
        return body.to_owned();
    }
    let total_pad = width - len;
    match spec.align.unwrap_or(Align::Left) {
        Align::Left => format!("{body}{}", spec.fill.to_string().repeat(total_pad)),
        Align::Right => format!("{}{body}", spec.fill.to_string().repeat(total_pad)),
        Align::Center => {
            let left = total_pad / 2;
            let right = total_pad - left;
            format!("{}{body}{}", spec.fill.to_string().repeat(left), spec.fill.to_string().repeat(right))
        }
        Align::AfterSign => {
            let (sign_part, rest) = body.split_at(body.char_indices().nth(sign_len).map_or(body.len(), |(i, _)| i));
            format!("{sign_part}{}{rest}", spec.fill.to_string().repeat(total_pad))
        }
    }
}

fn sign_prefix(negative: bool, spec: &Spec) -> &'static str {
    if negative {
        "-"
    } else {
        match spec.sign {
            Sign::Always => "+",
            Sign::Space => " ",
            Sign::NegOnly => "",
        }
    }
}

fn format_int(i: i64, spec: &Spec) -> String {
    let kind = spec.kind.unwrap_or(Kind::Decimal);
    let negative = i < 0;
    let magnitude = i.unsigned_abs();
    let (digits, prefix) = match kind {
        Kind::Binary => (format!("{magnitude:b}"), if spec.alternate { "0b" } else { "" }),
        Kind::Octal => (format!("{magnitude:o}"), if spec.alternate { "0o" } else { "" }),
        Kind::HexLower => (format!("{magnitude:x}"), if spec.alternate { "0x" } else { "" }),
        Kind::HexUpper => (format!("{magnitude:X}"), if spec.alternate { "0X" } else { "" }),
        Kind::Char => return char::from_u32(i as u32).map_or_else(String::new, String::from),
        Kind::LocaleDecimal => (group_thousands(&magnitude.to_string()), ""),
        _ => (magnitude.to_string(), ""),
    };
    let sign = sign_prefix(negative, spec);
    let sign_len = sign.chars().count() + prefix.chars().count();
    let body = format!("{sign}{prefix}{digits}");
    pad(&body, spec, sign_len)
}

fn group_thousands(digits: &str) -> String {
    let bytes = digits.as_bytes();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 && (bytes.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(*b as char);
    }
    out
}

fn format_float(f: f64, spec: &Spec) -> String {
    let kind = spec.kind.unwrap_or(Kind::General);
    let (value, suffix) = if kind == Kind::Percent { (f * 100.0, "%") } else { (f, "") };
    let negative = value.is_sign_negative() && value != 0.0;
    let magnitude = value.abs();
    let precision = spec.precision.unwrap_or(6);
    let digits = match kind {
        Kind::Fixed | Kind::FixedUpper | Kind::Percent => format!("{magnitude:.precision$}"),
        Kind::ExpLower => format!("{magnitude:.precision$e}"),
        Kind::ExpUpper => format!("{magnitude:.precision$E}"),
        Kind::General | Kind::GeneralUpper | Kind::LocaleDecimal => general_float(magnitude, spec.precision),
        _ => format!("{magnitude}"),
    };
    let digits = if kind == Kind::GeneralUpper || kind == Kind::FixedUpper { digits.to_uppercase() } else { digits };
    let sign = sign_prefix(negative, spec);
    let sign_len = sign.chars().count();
    let body = format!("{sign}{digits}{suffix}");
    pad(&body, spec, sign_len)
}

/// `g`/`G`: shortest representation that round-trips, Python-`repr`-style,
/// falling back to Rust's default `Display` for `f64` when no explicit
/// precision was requested.
fn general_float(magnitude: f64, precision: Option<usize>) -> String {
    match precision {
        Some(p) => {
            let p = p.max(1);
            format!("{magnitude:.p$}")
        }
        None => {
            if magnitude.fract() == 0.0 && magnitude.is_finite() {
                format!("{magnitude:.1}")
            } else {
                format!("{magnitude}")
            }
        }
    }
}

/// Formats `value` per `spec.md` §6.4. `value`'s default (`type` absent)
/// falls back to `as_string`, except for a float value with no explicit
/// `type`, which defaults to `g` per §6.4.
pub fn format_value(value: &Value, spec_str: &str, heap: &Heap, interner: &Interner) -> Result<String, UnknownFormatType> {
    let spec = parse_spec(spec_str)?;
    if spec.kind.is_none() {
        if let Value::Float(f) = value {
            return Ok(format_float(*f, &spec));
        }
        let plain = ops::as_string(value, heap, interner);
        return Ok(pad(&plain, &spec, 0));
    }
    let kind = spec.kind.expect("checked above");
    if kind == Kind::Str {
        let plain = ops::as_string(value, heap, interner);
        return Ok(pad(&plain, &spec, 0));
    }
    if matches!(
        kind,
        Kind::Binary | Kind::Char | Kind::Decimal | Kind::Octal | Kind::HexLower | Kind::HexUpper | Kind::LocaleDecimal
    ) {
        if let Some(i) = ops::as_int(value, heap) {
            return Ok(format_int(i, &spec));
        }
    }
    if let Some(f) = ops::as_float(value, heap) {
        return Ok(format_float(f, &spec));
    }
    let plain = ops::as_string(value, heap, interner);
    Ok(pad(&plain, &spec, 0))
}

/// Renders an [`UnknownFormatType`] as the message for the fatal compile-
/// style error `format()` raises for an unrecognized `type` character.
/// `format()` itself surfaces this through [`crate::error::Fault`] rather
/// than [`crate::error::CompileError`] (it happens at run time), but the
/// message text reuses the same `kind` vocabulary for consistency.
pub fn unknown_type_message(err: &UnknownFormatType) -> String {
    format!("unknown format type '{}' ({})", err.0, CompileErrorKind::UnexpectedToken)
}

/// Heap-aware convenience used by tests and the `vm::call_format` built-in
/// when the receiver is already a heap `Str`.
pub fn string_of(value: &Value, heap: &Heap) -> Option<String> {
    match value {
        Value::Ref(id) => match heap.get(*id) {
            HeapData::Str(s) => Some(s.bytes.clone()),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heap::Heap, intern::Interner};
    use pretty_assertions::assert_eq;

    fn fmt(value: Value, spec: &str) -> String {
        let heap = Heap::new();
        let interner = Interner::new();
        format_value(&value, spec, &heap, &interner).unwrap()
    }

    #[test]
    fn decimal_with_width_and_zero_pad() {
        assert_eq!(fmt(Value::Int(42), "05d"), "00042");
    }

    #[test]
    fn hex_with_alternate_prefix() {
        assert_eq!(fmt(Value::Int(255), "#x"), "0xff");
    }

    #[test]
    fn percent_type_scales_and_appends_sign() {
        assert_eq!(fmt(Value::Float(0.5), ".0%"), "50%");
    }

    #[test]
    fn default_float_uses_general_kind() {
        assert_eq!(fmt(Value::Float(3.0), ""), "3.0");
    }

    #[test]
    fn unknown_type_is_an_error() {
        let heap = Heap::new();
        let interner = Interner::new();
        assert!(format_value(&Value::Int(1), "z", &heap, &interner).is_err());
    }

    #[test]
    fn left_align_pads_on_the_right() {
        assert_eq!(fmt(Value::Int(7), "<5d"), "7    ");
    }

    #[test]
    fn center_align_splits_padding() {
        assert_eq!(fmt(Value::Int(7), "^5d"), "  7  ");
    }
}
