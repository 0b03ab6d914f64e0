//! Cross-type dispatch, expressed as exhaustive `match` over
//! [`Value`]/[`HeapData`] instead of a record of optional per-type function
//! pointers (see the module doc on [`crate::types`]).
//!
//! Every function here that can legitimately be "not supported" for a
//! given type returns `Option`/`bool` rather than an `Err` — that's the
//! non-fatal type-error class; the caller (the VM's opcode handlers in
//! `crate::bytecode::vm`) is responsible for logging the warning and
//! substituting `UNDEFINED`.

use std::cmp::Ordering;

use crate::{
    heap::{Heap, HeapData},
    intern::Interner,
    types::{
        numeric::{int_as_float, MathOp},
        TypeName,
    },
    value::Value,
};

pub fn type_name_of(value: &Value, heap: &Heap) -> TypeName {
    match value {
        Value::Bool(_) => TypeName::Bool,
        Value::Int(_) => TypeName::Int,
        Value::Float(_) => TypeName::Float,
        Value::Nil => TypeName::Nil,
        Value::Undefined => TypeName::Undefined,
        Value::StopIteration => TypeName::StopIteration,
        Value::Code(_) => TypeName::Function,
        Value::Ref(id) => match heap.get(*id) {
            HeapData::Str(_) => TypeName::String,
            HeapData::Tuple(_) => TypeName::Tuple,
            HeapData::List(_) => TypeName::List,
            HeapData::Table(_) => TypeName::Table,
            HeapData::Range(_) => TypeName::Range,
            HeapData::Iterator(_) => TypeName::Iterator,
            HeapData::Function(_) => TypeName::Function,
            HeapData::Native(_) => TypeName::NativeFunction,
            HeapData::Class(_) => TypeName::Class,
            HeapData::Instance(_) => TypeName::Instance,
            HeapData::BoundMethod(_) => TypeName::BoundMethod,
            HeapData::Module(_) => TypeName::Module,
            HeapData::Exception(_) => TypeName::Exception,
            HeapData::File(_) => TypeName::File,
        },
    }
}

/// `as_bool` coercion. Every type has a truthiness:
/// numbers are truthy unless zero, containers unless empty, `nil`/
/// `undefined`/`StopIteration` are always falsy, everything else (classes,
/// functions, instances, ...) is unconditionally truthy.
pub fn as_bool(value: &Value, heap: &Heap) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::Nil | Value::Undefined | Value::StopIteration => false,
        Value::Code(_) => true,
        Value::Ref(id) => match heap.get(*id) {
            HeapData::Str(s) => !s.bytes.is_empty(),
            HeapData::Tuple(t) => !t.is_empty(),
            HeapData::List(l) => !l.is_empty(),
            HeapData::Table(t) => !t.is_empty(),
            HeapData::Range(r) => !r.is_empty(),
            _ => true,
        },
    }
}

pub fn as_int(value: &Value, heap: &Heap) -> Option<i64> {
    match value {
        Value::Bool(b) => Some(super::boolean::as_int(*b)),
        Value::Int(i) => Some(*i),
        Value::Float(f) => Some(*f as i64),
        Value::Ref(id) => match heap.get(*id) {
            HeapData::Str(s) => s.bytes.trim().parse::<i64>().ok(),
            _ => None,
        },
        _ => None,
    }
}

pub fn as_float(value: &Value, heap: &Heap) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Int(i) => Some(int_as_float(*i)),
        Value::Float(f) => Some(*f),
        Value::Ref(id) => match heap.get(*id) {
            HeapData::Str(s) => s.bytes.trim().parse::<f64>().ok(),
            _ => None,
        },
        _ => None,
    }
}

/// `as_string` coercion, used by `print`, string concatenation, and
/// `format`'s default (no type-spec) case.
pub fn as_string(value: &Value, heap: &Heap, interner: &Interner) -> String {
    match value {
        Value::Bool(b) => super::boolean::as_string(*b).to_owned(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format_float(*f),
        Value::Nil => "nil".to_owned(),
        Value::Undefined => "undefined".to_owned(),
        Value::StopIteration => "stop_iteration".to_owned(),
        Value::Code(_) => "<code>".to_owned(),
        Value::Ref(id) => match heap.get(*id) {
            HeapData::Str(s) => s.bytes.clone(),
            HeapData::Tuple(t) => {
                let parts: Vec<String> = t.items.iter().map(|v| as_string(v, heap, interner)).collect();
                format!("({})", parts.join(", "))
            }
            HeapData::List(l) => {
                let parts: Vec<String> = l.items.iter().map(|v| as_string(v, heap, interner)).collect();
                format!("[{}]", parts.join(", "))
            }
            HeapData::Table(t) => {
                let parts: Vec<String> = t
                    .iter()
                    .map(|(k, v)| format!("{}: {}", as_string(&k, heap, interner), as_string(&v, heap, interner)))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            HeapData::Range(r) => format!("range({}, {}, {})", r.start, r.end, r.step),
            HeapData::Iterator(_) => "<iterator>".to_owned(),
            HeapData::Function(_) => "<function>".to_owned(),
            HeapData::Native(f) => format!("<native {}>", f.name()),
            HeapData::Class(c) => format!("<class {}>", interner.get(c.name)),
            HeapData::Instance(i) => {
                let class_name = i.class.map_or("?", |c| match heap.get(c) {
                    HeapData::Class(c) => interner.get(c.name),
                    _ => "?",
                });
                format!("<{class_name} instance>")
            }
            HeapData::BoundMethod(_) => "<bound method>".to_owned(),
            HeapData::Module(m) => format!("<module {}>", interner.get(m.name)),
            HeapData::Exception(e) => {
                format!("{}: {}", interner.get(e.kind), as_string(&e.message, heap, interner))
            }
            HeapData::File(f) => format!("<file '{}'>", f.path),
        },
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

/// `hash` slot. Maintains the equality/hash law: `equals(a, b)` implies
/// `hash(a) == hash(b)`.
pub fn hash_value(value: &Value, heap: &Heap, interner: &Interner) -> u64 {
    match value {
        Value::Bool(b) => u64::from(*b),
        Value::Int(i) => *i as u64,
        Value::Float(f) => f.to_bits(),
        Value::Nil => 0xDEAD_BEEF,
        Value::Undefined => 0xFEED_FACE,
        Value::StopIteration => 0xC0FF_EE00,
        Value::Code(id) => id.raw() as u64,
        Value::Ref(id) => match heap.get(*id) {
            HeapData::Str(s) => crate::types::string::rolling_hash(&s.bytes),
            HeapData::Tuple(t) => {
                let mut h = 0u64;
                for item in &t.items {
                    h = h.wrapping_mul(31).wrapping_add(hash_value(item, heap, interner));
                }
                h
            }
            _ => id.raw() as u64,
        },
    }
}

/// `equals` slot. `Int`/`Float`/`Bool` compare across type (`1 == 1.0`);
/// containers compare structurally; everything else falls back to
/// `IS`-style identity.
pub fn values_equal(a: &Value, b: &Value, heap: &Heap, interner: &Interner) -> bool {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => int_as_float(*x) == *y,
        (Value::Nil, Value::Nil)
        | (Value::Undefined, Value::Undefined)
        | (Value::StopIteration, Value::StopIteration) => true,
        (Value::Ref(x), Value::Ref(y)) => {
            if x == y {
                return true;
            }
            match (heap.get(*x), heap.get(*y)) {
                (HeapData::Str(a), HeapData::Str(b)) => a.bytes == b.bytes,
                (HeapData::Tuple(a), HeapData::Tuple(b)) => {
                    a.items.len() == b.items.len()
                        && a.items.iter().zip(&b.items).all(|(x, y)| values_equal(x, y, heap, interner))
                }
                (HeapData::List(a), HeapData::List(b)) => {
                    a.items.len() == b.items.len()
                        && a.items.iter().zip(&b.items).all(|(x, y)| values_equal(x, y, heap, interner))
                }
                _ => false,
            }
        }
        _ => false,
    }
}

/// `compare` slot. Tries the LHS's ordering first; returns `None` when
/// neither side supports ordering for this pair of types.
pub fn compare(a: &Value, b: &Value, heap: &Heap) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Int(x), Value::Float(y)) => int_as_float(*x).partial_cmp(y),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&int_as_float(*y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Ref(x), Value::Ref(y)) => match (heap.get(*x), heap.get(*y)) {
            (HeapData::Str(a), HeapData::Str(b)) => Some(a.bytes.cmp(&b.bytes)),
            (HeapData::Tuple(a), HeapData::Tuple(b)) => a.items.iter().zip(&b.items).find_map(|(x, y)| {
                let ord = compare(x, y, heap)?;
                (ord != Ordering::Equal).then_some(ord)
            }).or_else(|| Some(a.items.len().cmp(&b.items.len()))),
            (HeapData::List(a), HeapData::List(b)) => a.items.iter().zip(&b.items).find_map(|(x, y)| {
                let ord = compare(x, y, heap)?;
                (ord != Ordering::Equal).then_some(ord)
            }).or_else(|| Some(a.items.len().cmp(&b.items.len()))),
            _ => None,
        },
        _ => None,
    }
}

/// Binary arithmetic (`MATH` opcode). `op` indexes
/// the fixed-order arithmetic table. Returns `None` when the LHS (and, for
/// mixed numeric pairs, the promoted RHS) type has no such slot. String and
/// list `Plus` allocate a new heap value, so this needs `&mut Heap` even
/// though most arithmetic never touches the heap.
pub fn math(op: MathOp, a: &Value, b: &Value, heap: &mut Heap) -> Option<Value> {
    if let (Some(x), Some(y)) = (as_plain_int(a), as_plain_int(b)) {
        return int_math(op, x, y);
    }
    if is_numeric(a) && is_numeric(b) {
        let x = as_float(a, heap)?;
        let y = as_float(b, heap)?;
        return float_math(op, x, y);
    }
    if op == MathOp::Plus {
        if let (Value::Ref(x), Value::Ref(y)) = (a, b) {
            match (heap.get(*x), heap.get(*y)) {
                (HeapData::Str(sa), HeapData::Str(sb)) => {
                    let joined = format!("{}{}", sa.bytes, sb.bytes);
                    let id = heap.alloc(HeapData::Str(crate::types::string::LString::new(joined)));
                    return Some(Value::Ref(id));
                }
                (HeapData::List(la), HeapData::List(lb)) => {
                    let items: Vec<Value> = la.items.iter().chain(lb.items.iter()).copied().collect();
                    for item in &items {
                        if let Value::Ref(r) = item {
                            heap.incref(*r);
                        }
                    }
                    let id = heap.alloc(HeapData::List(crate::types::list::ListObj::new(items)));
                    return Some(Value::Ref(id));
                }
                _ => {}
            }
        }
    }
    None
}

fn as_plain_int(v: &Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(super::boolean::as_int(*b)),
        _ => None,
    }
}

fn is_numeric(v: &Value) -> bool {
    matches!(v, Value::Int(_) | Value::Float(_) | Value::Bool(_))
}

fn int_math(op: MathOp, x: i64, y: i64) -> Option<Value> {
    use MathOp::{BAnd, BOr, LShift, Minus, Mod, Plus, Pow, RShift, Slash, Star, Xor};
    Some(match op {
        Plus => Value::Int(x.wrapping_add(y)),
        Minus => Value::Int(x.wrapping_sub(y)),
        Star => Value::Int(x.wrapping_mul(y)),
        Pow => {
            if y >= 0 {
                Value::Int(x.wrapping_pow(y as u32))
            } else {
                Value::Float((x as f64).powf(y as f64))
            }
        }
        Slash => {
            if y == 0 {
                return None;
            }
            Value::Float(x as f64 / y as f64)
        }
        Mod => {
            if y == 0 {
                return None;
            }
            Value::Int(x.rem_euclid(y))
        }
        LShift => Value::Int(x.wrapping_shl(y as u32)),
        RShift => Value::Int(x.wrapping_shr(y as u32)),
        BAnd => Value::Int(x & y),
        BOr => Value::Int(x | y),
        Xor => Value::Int(x ^ y),
    })
}

fn float_math(op: MathOp, x: f64, y: f64) -> Option<Value> {
    use MathOp::{Minus, Mod, Plus, Pow, Slash, Star};
    match op {
        Plus => Some(Value::Float(x + y)),
        Minus => Some(Value::Float(x - y)),
        Star => Some(Value::Float(x * y)),
        Pow => Some(Value::Float(x.powf(y))),
        Slash => Some(Value::Float(x / y)),
        Mod => Some(Value::Float(x.rem_euclid(y))),
        // bitwise ops have no float slot: the type descriptor simply
        // doesn't list one, so this is the documented "missing slot" case.
        _ => None,
    }
}

/// Unary negation.
pub fn negate(value: &Value) -> Option<Value> {
    match value {
        Value::Int(i) => Some(Value::Int(-i)),
        Value::Float(f) => Some(Value::Float(-f)),
        Value::Bool(b) => Some(Value::Int(-super::boolean::as_int(*b))),
        _ => None,
    }
}

pub fn len_of(value: &Value, heap: &Heap) -> Option<i64> {
    match value {
        Value::Ref(id) => match heap.get(*id) {
            HeapData::Str(s) => Some(s.len_chars() as i64),
            HeapData::Tuple(t) => Some(t.len() as i64),
            HeapData::List(l) => Some(l.len() as i64),
            HeapData::Table(t) => Some(t.len() as i64),
            HeapData::Range(r) => Some(r.len() as i64),
            HeapData::File(f) => Some(f.byte_len() as i64),
            _ => None,
        },
        _ => None,
    }
}

/// Releases every `Value` a heap payload owns. Invoked by
/// [`crate::heap::Heap::decref`] once a slot's refcount reaches zero.
pub fn cleanup(data: HeapData, heap: &mut Heap) {
    match data {
        HeapData::Tuple(t) => {
            for v in t.items {
                v.drop_with_heap(heap);
            }
        }
        HeapData::List(l) => {
            for v in l.items {
                v.drop_with_heap(heap);
            }
        }
        HeapData::Table(t) => {
            for (k, v) in t.iter() {
                k.drop_with_heap(heap);
                v.drop_with_heap(heap);
            }
        }
        HeapData::Instance(i) => {
            if let Some(class) = i.class {
                heap.decref(class);
            }
            for (_, v) in i.attrs {
                v.drop_with_heap(heap);
            }
        }
        HeapData::Class(c) => {
            if let Some(parent) = c.parent {
                heap.decref(parent);
            }
            for (_, method) in c.methods {
                heap.decref(method);
            }
        }
        HeapData::BoundMethod(m) => match m {
            crate::types::method::BoundMethodObj::User { function, instance } => {
                heap.decref(function);
                instance.drop_with_heap(heap);
            }
            crate::types::method::BoundMethodObj::Native { receiver, .. } => {
                receiver.drop_with_heap(heap);
            }
        },
        HeapData::Module(m) => {
            for (_, v) in m.props {
                v.drop_with_heap(heap);
            }
        }
        HeapData::Exception(e) => {
            e.message.drop_with_heap(heap);
        }
        HeapData::Iterator(it) => {
            if let Some(container) = it.container() {
                heap.decref(container);
            }
        }
        HeapData::Function(f) => {
            heap.decref_scope(f.scope);
            if let Some(owner) = f.owner {
                heap.decref(owner);
            }
        }
        HeapData::Str(_) | HeapData::Range(_) | HeapData::Native(_) | HeapData::File(_) => {}
    }
}

/// `contains` slot, consulted by the `IN` comparison op: `a in b` lowers to
/// `b.contains(a)`, so this always takes the *container* first.
pub fn contains(container: &Value, item: &Value, heap: &Heap, interner: &Interner) -> Option<bool> {
    let Value::Ref(id) = container else { return None };
    match heap.get(*id) {
        HeapData::Table(t) => Some(t.contains(item, heap, interner)),
        HeapData::List(l) => Some(l.items.iter().any(|v| values_equal(v, item, heap, interner))),
        HeapData::Tuple(t) => Some(t.items.iter().any(|v| values_equal(v, item, heap, interner))),
        HeapData::Str(s) => match item {
            Value::Ref(item_id) => match heap.get(*item_id) {
                HeapData::Str(sub) => Some(s.bytes.contains(sub.bytes.as_str())),
                _ => None,
            },
            _ => None,
        },
        HeapData::Range(r) => match item {
            Value::Int(i) => Some(r.in_bounds(*i) && r.step != 0 && (*i - r.start) % r.step == 0),
            _ => None,
        },
        _ => None,
    }
}

/// `get_item` slot. Indexing a string allocates a fresh one-character
/// string, hence `&mut Heap`.
pub fn get_item(container: &Value, index: &Value, heap: &mut Heap, interner: &Interner) -> Option<Value> {
    let Value::Ref(id) = container else { return None };
    if matches!(heap.get(*id), HeapData::List(_)) {
        let i = as_int(index, heap)?;
        let HeapData::List(l) = heap.get(*id) else { unreachable!() };
        let v = l.get(i)?;
        return Some(v.clone_with_heap(heap));
    }
    if matches!(heap.get(*id), HeapData::Tuple(_)) {
        let i = as_int(index, heap)?;
        let HeapData::Tuple(t) = heap.get(*id) else { unreachable!() };
        let v = t.get(i)?;
        return Some(v.clone_with_heap(heap));
    }
    if matches!(heap.get(*id), HeapData::Table(_)) {
        let HeapData::Table(t) = heap.get(*id) else { unreachable!() };
        let v = t.get(index, heap, interner)?;
        return Some(v.clone_with_heap(heap));
    }
    if matches!(heap.get(*id), HeapData::Str(_)) {
        let i = as_int(index, heap)?;
        let HeapData::Str(s) = heap.get(*id) else { unreachable!() };
        let ch = super::tuple::normalize_index(i, s.len_chars()).and_then(|idx| s.char_at(idx))?;
        let new_id = heap.alloc(HeapData::Str(crate::types::string::LString::new(ch.to_string())));
        return Some(Value::Ref(new_id));
    }
    None
}

/// `set_item` slot. `Ok(Some(old))` overwrote an existing slot (caller
/// drops `old`'s refcount); `Ok(None)` inserted a fresh table key (nothing
/// to drop); `Err(value)` means the container doesn't support item
/// assignment, or the index is out of range — the caller gets `value`
/// back so it can still release the reference it cloned for the store
/// instead of leaking it.
pub fn set_item(
    container: &Value,
    index: &Value,
    value: Value,
    heap: &mut Heap,
    interner: &Interner,
) -> Result<Option<Value>, Value> {
    let Value::Ref(id) = container else { return Err(value) };
    if matches!(heap.get(*id), HeapData::List(_)) {
        let Some(i) = as_int(index, heap) else { return Err(value) };
        let HeapData::List(l) = heap.get_mut(*id) else { unreachable!() };
        return l.set(i, value);
    }
    if matches!(heap.get(*id), HeapData::Table(_)) {
        let key = *index;
        if let Value::Ref(k) = key {
            heap.incref(k);
        }
        // `TableObj::insert` needs a shared `&Heap` to hash/compare keys,
        // which can't coexist with the `&mut TableObj` borrowed straight
        // out of the arena — swap the table out, operate on the owned
        // value, then write it back.
        let HeapData::Table(slot) = heap.get_mut(*id) else { unreachable!() };
        let mut owned = std::mem::take(slot);
        let result = owned.insert(key, value, heap, interner);
        let HeapData::Table(slot) = heap.get_mut(*id) else { unreachable!() };
        *slot = owned;
        return Ok(result);
    }
    Err(value)
}

/// `remove_item` slot, used by the `table` method table. Not reachable
/// through the `ITEM` opcode, which only wires `get_item`/`set_item`.
pub fn remove_item(container: &Value, index: &Value, heap: &mut Heap, interner: &Interner) -> Option<Value> {
    let Value::Ref(id) = container else { return None };
    if matches!(heap.get(*id), HeapData::List(_)) {
        let i = as_int(index, heap)?;
        let HeapData::List(l) = heap.get_mut(*id) else { unreachable!() };
        return l.remove(i);
    }
    if matches!(heap.get(*id), HeapData::Table(_)) {
        let HeapData::Table(slot) = heap.get_mut(*id) else { unreachable!() };
        let mut owned = std::mem::take(slot);
        let removed = owned.remove(index, heap, interner);
        let HeapData::Table(slot) = heap.get_mut(*id) else { unreachable!() };
        *slot = owned;
        let (k, v) = removed?;
        k.drop_with_heap(heap);
        return Some(v);
    }
    None
}

/// `getattr` slot: instance attributes shadow methods of the same name on
/// the class. Falling through to [`native_method_lookup`] resolves
/// `spec.md` §3.2's per-type method table (`list.append`, `file.read`, ...)
/// the same lazy way.
pub fn getattr(receiver: &Value, name: crate::intern::StringId, heap: &mut Heap, interner: &crate::intern::Interner) -> Option<Value> {
    let Value::Ref(id) = receiver else { return None };
    match heap.get(*id) {
        HeapData::Instance(inst) => {
            if let Some(v) = inst.attrs.get(&name) {
                return Some(v.clone_with_heap(heap));
            }
            let class = inst.class?;
            let method = resolve_method(class, name, heap)?;
            heap.incref(method);
            let bound = heap.alloc(HeapData::BoundMethod(crate::types::method::BoundMethodObj::user(
                method,
                receiver.clone_with_heap(heap),
            )));
            Some(Value::Ref(bound))
        }
        HeapData::Class(_) => resolve_method(*id, name, heap).map(|m| {
            heap.incref(m);
            Value::Ref(m)
        }),
        HeapData::Module(m) => {
            let v = m.get(name)?;
            Some(v.clone_with_heap(heap))
        }
        _ => native_method_lookup(receiver, name, heap, interner),
    }
}

/// Resolves a built-in type's method table entry (`spec.md` §3.2) and
/// binds it to `receiver`, mirroring the instance/class method path above
/// but for `list`, `table`, `string`, and `file` values.
fn native_method_lookup(
    receiver: &Value,
    name: crate::intern::StringId,
    heap: &mut Heap,
    interner: &crate::intern::Interner,
) -> Option<Value> {
    let owner = type_name_of(receiver, heap);
    let method = crate::types::native_method::NativeMethod::lookup(owner, interner.get(name))?;
    let bound_receiver = receiver.clone_with_heap(heap);
    let bound =
        heap.alloc(HeapData::BoundMethod(crate::types::method::BoundMethodObj::native(method, bound_receiver)));
    Some(Value::Ref(bound))
}

/// Walks a class's `parent` chain looking for a method named `name`.
pub fn resolve_method(class: crate::heap::HeapId, name: crate::intern::StringId, heap: &Heap) -> Option<crate::heap::HeapId> {
    let mut current = Some(class);
    while let Some(id) = current {
        let HeapData::Class(c) = heap.get(id) else { return None };
        if let Some(method) = c.own_method(name) {
            return Some(method);
        }
        current = c.parent;
    }
    None
}

/// `setattr` slot. Only instances and modules support attribute
/// assignment; everything else (classes once built, functions, ...) is a
/// missing slot. `Ok(Some(old))`/`Ok(None)` mirror [`set_item`]'s split
/// between "overwrote a previous value" and "bound a fresh name"; `Err`
/// hands `value` back so a receiver that can't take attributes doesn't
/// silently swallow a live heap reference.
pub fn setattr(
    receiver: &Value,
    name: crate::intern::StringId,
    value: Value,
    heap: &mut Heap,
) -> Result<Option<Value>, Value> {
    let Value::Ref(id) = receiver else { return Err(value) };
    match heap.get_mut(*id) {
        HeapData::Instance(inst) => Ok(inst.attrs.insert(name, value)),
        HeapData::Module(m) => Ok(m.set(name, value)),
        _ => Err(value),
    }
}

/// `del_attr` slot. The `ATTR` opcode's encoding reserves a variant for it
/// alongside `get_attr`/`set_attr`, but no surface grammar currently emits
/// a delete statement, so this exists for opcode-contract completeness
/// rather than being reachable from a compiled program today.
pub fn del_attr(receiver: &Value, name: crate::intern::StringId, heap: &mut Heap) -> Option<Value> {
    let Value::Ref(id) = receiver else { return None };
    match heap.get_mut(*id) {
        HeapData::Instance(inst) => inst.attrs.remove(&name),
        HeapData::Module(m) => m.props.remove(&name),
        _ => None,
    }
}

/// `iterate` slot: builds an [`crate::types::iterator::IterObj`] over
/// `value`, incrementing the source container's refcount so it outlives
/// the iterator.
pub fn iterate(value: &Value, heap: &mut Heap) -> Option<crate::types::iterator::IterObj> {
    use crate::types::iterator::{IterObj, IterSource};
    let Value::Ref(id) = value else { return None };
    let source = match heap.get(*id) {
        HeapData::List(_) => IterSource::List { container: *id, index: 0 },
        HeapData::Tuple(_) => IterSource::Tuple { container: *id, index: 0 },
        HeapData::Table(_) => IterSource::Table { container: *id, index: 0 },
        HeapData::Str(_) => IterSource::StringChars { container: *id, index: 0 },
        HeapData::Range(r) => IterSource::Range { range: *r, current: r.start },
        _ => return None,
    };
    if !matches!(source, IterSource::Range { .. }) {
        heap.incref(*id);
    }
    Some(IterObj::new(source))
}
