//! The register-based bytecode interpreter.
//!
//! One [`Interpreter`] owns the heap, the string interner, and the code
//! arena for an entire run — including every `eval()` call a running
//! program makes, which compiles straight into the same arenas rather
//! than spinning up a nested interpreter. A frame is just a `Vec<Value>`
//! register file plus a program counter walked over one [`CodeObject`]'s
//! instruction stream; there is no separate operand stack.
//!
//! Refcounting discipline: every instruction handler below either reads a
//! register by copy (never releasing the source) or consumes a value it
//! owns via [`Value::drop_with_heap`]/stores it via [`Interpreter::store_reg`].
//! A register overwrite always drops the old contents first.

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{
    bytecode::{CodeArena, CodeId, CodeObject, ConstValue, Instr},
    builtins::BuiltinFn,
    error::{CompileError, Fault, FaultKind, RunResult},
    format,
    heap::{Heap, HeapData, HeapId},
    intern::{Interner, StringId},
    io::{Diagnostics, Stdout},
    resource::CallDepth,
    scope::ScopeRecord,
    types::{
        class::{ClassObj, InstanceObj},
        file::FileObj,
        iterator::{IterObj, IterStep},
        list::ListObj,
        method::BoundMethodObj,
        native_method::NativeMethod,
        numeric::CompareOp,
        ops,
        string::LString,
        table::TableObj,
        tuple::TupleObj,
    },
    value::Value,
};

/// Per-call argument buffer. Most calls pass a handful of values, so a
/// `SmallVec` avoids a heap allocation for the common case; it only spills
/// past four arguments.
type ArgVec = SmallVec<[Value; 4]>;

/// Either stage of running a source string can fail: parsing/compiling
/// with a [`CompileError`], executing with a [`Fault`]. `eval()` (the
/// built-in, not this type) only ever surfaces the latter to the caller,
/// degrading a `CompileError` to a diagnostic instead.
#[derive(Debug)]
pub enum EvalError {
    Compile(CompileError),
    Fault(Fault),
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compile(e) => write!(f, "{e}"),
            Self::Fault(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EvalError {}

impl From<CompileError> for EvalError {
    fn from(e: CompileError) -> Self {
        Self::Compile(e)
    }
}

impl From<Fault> for EvalError {
    fn from(e: Fault) -> Self {
        Self::Fault(e)
    }
}

/// Owns every arena a single run touches, plus the global namespace and
/// the call-depth guard.
pub struct Interpreter {
    heap: Heap,
    interner: Interner,
    codes: CodeArena,
    globals: AHashMap<StringId, Value>,
    call_depth: CallDepth,
    /// Permanent heap `Str` objects materialized lazily, one per interned
    /// string constant, so repeated `LoadConst` of the same literal
    /// doesn't re-allocate or touch a refcount.
    string_consts: AHashMap<StringId, HeapId>,
    init_name: StringId,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let mut interner = Interner::new();
        let mut globals = AHashMap::new();
        use strum::IntoEnumIterator;
        for builtin in BuiltinFn::iter() {
            let name = interner.intern(builtin.name());
            let id = heap.alloc_permanent(HeapData::Native(builtin));
            globals.insert(name, Value::Ref(id));
        }
        let init_name = interner.intern("init");
        Self {
            heap,
            interner,
            codes: CodeArena::new(),
            globals,
            call_depth: CallDepth::default(),
            string_consts: AHashMap::new(),
            init_name,
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    /// Renders a value the way the `print` built-in would, for a host that
    /// wants to show a top-level result without routing through `Stdout`.
    pub fn display(&self, value: &Value) -> String {
        ops::as_string(value, &self.heap, &self.interner)
    }

    /// Releases a value returned by [`Interpreter::run`]. A host that
    /// receives a top-level result and doesn't feed it into another call
    /// must release it this way to keep the refcount discipline documented
    /// on [`Value::drop_with_heap`].
    pub fn release(&mut self, value: Value) {
        value.drop_with_heap(&mut self.heap);
    }

    /// Parses, compiles, and runs `source` as a fresh top-level program,
    /// sharing this interpreter's heap/interner/globals with any prior
    /// run (so a REPL session keeps its globals alive across lines).
    pub fn run<O: Stdout, D: Diagnostics>(
        &mut self,
        source: &str,
        stdout: &mut O,
        diagnostics: &mut D,
    ) -> Result<Value, EvalError> {
        let stmts = crate::parser::parse(source, &mut self.interner)?;
        let code_id = crate::bytecode::compiler::compile(&stmts, &mut self.interner, &mut self.codes)?;
        let value = self.run_code(code_id, None, ArgVec::new(), stdout, diagnostics)?;
        Ok(value)
    }

    fn run_code<O: Stdout, D: Diagnostics>(
        &mut self,
        code_id: CodeId,
        owner: Option<HeapId>,
        args: ArgVec,
        stdout: &mut O,
        diagnostics: &mut D,
    ) -> RunResult<Value> {
        let code = self.codes.get(code_id).clone();
        let scope = self.heap.alloc_scope(ScopeRecord::new(Vec::new(), None));
        let mut regs = vec![Value::Undefined; code.num_registers as usize];
        // Register 0 is reserved for `this` in a method body (see `Ctx::new`),
        // and callers of a method already prepend `this` as `args[0]`
        // (`prepend` in `call_value`/`call_class`), so `args` lines up with
        // registers starting at 0 regardless of `code.is_method`.
        for (i, arg) in args.into_iter().enumerate() {
            if i < regs.len() {
                regs[i] = arg;
            } else {
                arg.drop_with_heap(&mut self.heap);
            }
        }
        let result = self.exec_frame(code_id, regs, scope, owner, stdout, diagnostics);
        self.heap.decref_scope(scope);
        result
    }

    fn const_to_value(&mut self, constant: ConstValue) -> Value {
        match constant {
            ConstValue::Int(i) => Value::Int(i),
            ConstValue::Float(f) => Value::Float(f),
            ConstValue::Bool(b) => Value::Bool(b),
            ConstValue::Nil => Value::Nil,
            ConstValue::Str(id) => {
                if let Some(&heap_id) = self.string_consts.get(&id) {
                    return Value::Ref(heap_id);
                }
                let text = self.interner.get(id).to_owned();
                let heap_id = self.heap.alloc_permanent(HeapData::Str(LString::new(text)));
                self.string_consts.insert(id, heap_id);
                Value::Ref(heap_id)
            }
        }
    }

    fn store_reg(&mut self, regs: &mut [Value], dst: u16, value: Value) {
        let old = std::mem::replace(&mut regs[dst as usize], value);
        old.drop_with_heap(&mut self.heap);
    }

    /// The main dispatch loop for one frame. `owner` is the class a
    /// method body was compiled for (`None` for plain functions and the
    /// top-level program), consulted only by `SuperGetAttr`.
    #[allow(clippy::too_many_lines)]
    fn exec_frame<O: Stdout, D: Diagnostics>(
        &mut self,
        code_id: CodeId,
        mut regs: Vec<Value>,
        scope: crate::heap::ScopeId,
        owner: Option<HeapId>,
        stdout: &mut O,
        diagnostics: &mut D,
    ) -> RunResult<Value> {
        let mut pc: usize = 0;
        let result = loop {
            let instr = self.codes.get(code_id).instructions[pc].clone();
            pc += 1;
            match instr {
                Instr::LoadConst { dst, index } => {
                    let constant = self.codes.get(code_id).constants[index as usize];
                    let value = self.const_to_value(constant);
                    self.store_reg(&mut regs, dst, value);
                }
                Instr::LoadUpvalue { dst, slot } => {
                    let raw = self.heap.scope(scope).get(slot as usize).unwrap_or(Value::Undefined);
                    let value = raw.clone_with_heap(&mut self.heap);
                    self.store_reg(&mut regs, dst, value);
                }
                Instr::LoadGlobal { dst, name } => {
                    let found = self.globals.get(&name).copied();
                    let value = match found {
                        Some(v) => v.clone_with_heap(&mut self.heap),
                        None => {
                            diagnostics.warn(&format!("global '{}' is not set", self.interner.get(name)));
                            Value::Undefined
                        }
                    };
                    self.store_reg(&mut regs, dst, value);
                }
                Instr::StoreGlobal { name, src } => {
                    let value = regs[src as usize].clone_with_heap(&mut self.heap);
                    if let Some(old) = self.globals.insert(name, value) {
                        old.drop_with_heap(&mut self.heap);
                    }
                }
                Instr::Move { dst, src } => {
                    let value = regs[src as usize].clone_with_heap(&mut self.heap);
                    self.store_reg(&mut regs, dst, value);
                }
                Instr::Math { op, dst, lhs, rhs } => {
                    let value = ops::math(op, &regs[lhs as usize], &regs[rhs as usize], &mut self.heap)
                        .unwrap_or_else(|| {
                            diagnostics.warn(&format!("unsupported operand types for '{op:?}'"));
                            Value::Undefined
                        });
                    self.store_reg(&mut regs, dst, value);
                }
                Instr::Neg { dst, src } => {
                    let value = ops::negate(&regs[src as usize]).unwrap_or_else(|| {
                        diagnostics.warn("unary '-' is not supported for this type");
                        Value::Undefined
                    });
                    self.store_reg(&mut regs, dst, value);
                }
                Instr::Not { dst, src } => {
                    let value = Value::Bool(!regs[src as usize].is_truthy(&self.heap));
                    self.store_reg(&mut regs, dst, value);
                }
                Instr::Compare { op, dst, lhs, rhs } => {
                    let a = regs[lhs as usize];
                    let b = regs[rhs as usize];
                    let value = self.compare_values(op, a, b, diagnostics);
                    self.store_reg(&mut regs, dst, value);
                }
                Instr::Jump { target } => {
                    pc = target as usize;
                }
                Instr::JumpIfFalse { cond, target } => {
                    if !regs[cond as usize].is_truthy(&self.heap) {
                        pc = target as usize;
                    }
                }
                Instr::JumpIfTrue { cond, target } => {
                    if regs[cond as usize].is_truthy(&self.heap) {
                        pc = target as usize;
                    }
                }
                Instr::JumpIfStop { src, target } => {
                    if matches!(regs[src as usize], Value::StopIteration) {
                        pc = target as usize;
                    }
                }
                Instr::Return { src } => {
                    let value = match src {
                        Some(r) => regs[r as usize].clone_with_heap(&mut self.heap),
                        None => Value::Nil,
                    };
                    break Ok(value);
                }
                Instr::Call { dst, callee, args } => {
                    let callee_val = regs[callee as usize];
                    let arg_vals: ArgVec =
                        args.iter().map(|&r| regs[r as usize].clone_with_heap(&mut self.heap)).collect();
                    let value = match self.call_value(callee_val, arg_vals, stdout, diagnostics) {
                        Ok(v) => v,
                        Err(fault) => break Err(fault),
                    };
                    self.store_reg(&mut regs, dst, value);
                }
                Instr::BuildList { dst, items } => {
                    let values: Vec<Value> =
                        items.iter().map(|&r| regs[r as usize].clone_with_heap(&mut self.heap)).collect();
                    let id = self.heap.alloc(HeapData::List(ListObj::new(values)));
                    self.store_reg(&mut regs, dst, Value::Ref(id));
                }
                Instr::BuildTuple { dst, items } => {
                    let values: Vec<Value> =
                        items.iter().map(|&r| regs[r as usize].clone_with_heap(&mut self.heap)).collect();
                    let id = self.heap.alloc(HeapData::Tuple(TupleObj::new(values)));
                    self.store_reg(&mut regs, dst, Value::Ref(id));
                }
                Instr::BuildTable { dst, pairs } => {
                    let mut table = TableObj::new();
                    for (kr, vr) in pairs {
                        let key = regs[kr as usize].clone_with_heap(&mut self.heap);
                        let value = regs[vr as usize].clone_with_heap(&mut self.heap);
                        if let Some(old) = table.insert(key, value, &self.heap, &self.interner) {
                            old.drop_with_heap(&mut self.heap);
                        }
                    }
                    let id = self.heap.alloc(HeapData::Table(table));
                    self.store_reg(&mut regs, dst, Value::Ref(id));
                }
                Instr::BuildRange { dst, start, end, step } => {
                    let s = ops::as_int(&regs[start as usize], &self.heap).unwrap_or(0);
                    let e = ops::as_int(&regs[end as usize], &self.heap).unwrap_or(0);
                    let st = ops::as_int(&regs[step as usize], &self.heap).unwrap_or(1);
                    let id = self.heap.alloc(HeapData::Range(crate::types::range::RangeObj::new(s, e, st)));
                    self.store_reg(&mut regs, dst, Value::Ref(id));
                }
                Instr::BuildFunction { dst, code, captures } => {
                    let locals: Vec<Value> =
                        captures.iter().map(|&r| regs[r as usize].clone_with_heap(&mut self.heap)).collect();
                    let fn_scope = self.heap.alloc_scope(ScopeRecord::new(locals, None));
                    let id = self.heap.alloc(HeapData::Function(crate::types::function::FunctionObj::new(
                        code, fn_scope,
                    )));
                    self.store_reg(&mut regs, dst, Value::Ref(id));
                }
                Instr::BuildClass { dst, name, parent, methods } => {
                    let parent_id = self.resolve_parent_class(parent.map(|r| regs[r as usize]), diagnostics);
                    let class_id = self.heap.alloc(HeapData::Class(ClassObj::new(name, parent_id)));
                    for (method_name, method_code) in methods {
                        let method_scope = self.heap.alloc_scope(ScopeRecord::new(Vec::new(), None));
                        self.heap.incref(class_id);
                        let fid = self.heap.alloc(HeapData::Function(crate::types::function::FunctionObj::with_owner(
                            method_code,
                            method_scope,
                            class_id,
                        )));
                        let HeapData::Class(class) = self.heap.get_mut(class_id) else { unreachable!() };
                        class.methods.insert(method_name, fid);
                    }
                    self.store_reg(&mut regs, dst, Value::Ref(class_id));
                }
                Instr::GetItem { dst, container, index } => {
                    let value = ops::get_item(&regs[container as usize], &regs[index as usize], &mut self.heap, &self.interner)
                        .unwrap_or_else(|| {
                            diagnostics.warn("index out of range, or this value does not support indexing");
                            Value::Undefined
                        });
                    self.store_reg(&mut regs, dst, value);
                }
                Instr::SetItem { container, index, value } => {
                    let v = regs[value as usize].clone_with_heap(&mut self.heap);
                    match ops::set_item(&regs[container as usize], &regs[index as usize], v, &mut self.heap, &self.interner) {
                        Ok(Some(old)) => old.drop_with_heap(&mut self.heap),
                        Ok(None) => {}
                        Err(leftover) => {
                            diagnostics.warn("this value does not support item assignment");
                            leftover.drop_with_heap(&mut self.heap);
                        }
                    }
                }
                Instr::GetAttr { dst, receiver, name } => {
                    let value = ops::getattr(&regs[receiver as usize], name, &mut self.heap, &self.interner)
                        .unwrap_or_else(|| {
                            diagnostics.warn(&format!("no attribute named '{}'", self.interner.get(name)));
                            Value::Undefined
                        });
                    self.store_reg(&mut regs, dst, value);
                }
                Instr::SetAttr { receiver, name, value } => {
                    let v = regs[value as usize].clone_with_heap(&mut self.heap);
                    match ops::setattr(&regs[receiver as usize], name, v, &mut self.heap) {
                        Ok(Some(old)) => old.drop_with_heap(&mut self.heap),
                        Ok(None) => {}
                        Err(leftover) => {
                            diagnostics.warn("this value does not support attribute assignment");
                            leftover.drop_with_heap(&mut self.heap);
                        }
                    }
                }
                Instr::SuperGetAttr { dst, name } => {
                    let this = regs[0];
                    let value = self.super_getattr(owner, this, name, diagnostics);
                    self.store_reg(&mut regs, dst, value);
                }
                Instr::GetIter { dst, src } => {
                    let value = regs[src as usize];
                    let result = self.make_iterator(value, diagnostics);
                    self.store_reg(&mut regs, dst, result);
                }
                Instr::IterNext { dst, iter } => {
                    let value = self.iterator_next(regs[iter as usize]);
                    self.store_reg(&mut regs, dst, value);
                }
            }
        };
        // Every register still holds a reference this frame owns (a
        // `Return`'s value was already cloned out above, so dropping the
        // register it came from here is just releasing the frame's own
        // copy, not the one the caller received).
        for reg in regs.drain(..) {
            reg.drop_with_heap(&mut self.heap);
        }
        result
    }

    fn resolve_parent_class<D: Diagnostics>(&mut self, parent: Option<Value>, diagnostics: &mut D) -> Option<HeapId> {
        let parent = parent?;
        match parent {
            Value::Ref(id) if matches!(self.heap.get(id), HeapData::Class(_)) => {
                self.heap.incref(id);
                Some(id)
            }
            other => {
                diagnostics.warn(&format!("'{}' is not a class", ops::type_name_of(&other, &self.heap).as_str()));
                None
            }
        }
    }

    fn super_getattr<D: Diagnostics>(&mut self, owner: Option<HeapId>, this: Value, name: StringId, diagnostics: &mut D) -> Value {
        let Some(owner_id) = owner else {
            diagnostics.warn("'super' used outside of a method");
            return Value::Undefined;
        };
        let HeapData::Class(class) = self.heap.get(owner_id) else {
            diagnostics.warn("'super' used outside of a method");
            return Value::Undefined;
        };
        let Some(parent_id) = class.parent else {
            diagnostics.warn("this class has no parent");
            return Value::Undefined;
        };
        let Some(method_id) = ops::resolve_method(parent_id, name, &self.heap) else {
            diagnostics.warn(&format!("no such method '{}' via 'super'", self.interner.get(name)));
            return Value::Undefined;
        };
        self.heap.incref(method_id);
        let instance = this.clone_with_heap(&mut self.heap);
        let bound = self.heap.alloc(HeapData::BoundMethod(BoundMethodObj::user(method_id, instance)));
        Value::Ref(bound)
    }

    fn compare_values<D: Diagnostics>(&mut self, op: CompareOp, a: Value, b: Value, diagnostics: &mut D) -> Value {
        match op {
            CompareOp::Is => Value::Bool(values_identical(&a, &b)),
            CompareOp::Eq => Value::Bool(ops::values_equal(&a, &b, &self.heap, &self.interner)),
            CompareOp::Neq => Value::Bool(!ops::values_equal(&a, &b, &self.heap, &self.interner)),
            CompareOp::Exact => Value::Bool(Self::same_type_and_equal(&a, &b, &self.heap, &self.interner)),
            CompareOp::NotExact => Value::Bool(!Self::same_type_and_equal(&a, &b, &self.heap, &self.interner)),
            CompareOp::Lt | CompareOp::Lte | CompareOp::Gt | CompareOp::Gte => match ops::compare(&a, &b, &self.heap) {
                Some(ord) => Value::Bool(match op {
                    CompareOp::Lt => ord.is_lt(),
                    CompareOp::Lte => ord.is_le(),
                    CompareOp::Gt => ord.is_gt(),
                    CompareOp::Gte => ord.is_ge(),
                    _ => unreachable!(),
                }),
                None => {
                    diagnostics.warn("these values are not ordered");
                    Value::Undefined
                }
            },
            CompareOp::Spaceship => match ops::compare(&a, &b, &self.heap) {
                Some(ord) => Value::Int(match ord {
                    std::cmp::Ordering::Less => -1,
                    std::cmp::Ordering::Equal => 0,
                    std::cmp::Ordering::Greater => 1,
                }),
                None => {
                    diagnostics.warn("these values are not ordered");
                    Value::Undefined
                }
            },
            CompareOp::In => match ops::contains(&b, &a, &self.heap, &self.interner) {
                Some(found) => Value::Bool(found),
                None => {
                    diagnostics.warn("the right-hand side of 'in' is not a container");
                    Value::Undefined
                }
            },
        }
    }

    fn same_type_and_equal(a: &Value, b: &Value, heap: &Heap, interner: &Interner) -> bool {
        ops::type_name_of(a, heap) == ops::type_name_of(b, heap) && ops::values_equal(a, b, heap, interner)
    }

    fn make_iterator<D: Diagnostics>(&mut self, value: Value, diagnostics: &mut D) -> Value {
        if let Value::Ref(id) = value {
            if matches!(self.heap.get(id), HeapData::Iterator(_)) {
                return value.clone_with_heap(&mut self.heap);
            }
        }
        match ops::iterate(&value, &mut self.heap) {
            Some(obj) => Value::Ref(self.heap.alloc(HeapData::Iterator(obj))),
            None => {
                diagnostics.warn(&format!("'{}' is not iterable", ops::type_name_of(&value, &self.heap).as_str()));
                Value::Ref(self.heap.alloc(HeapData::Iterator(IterObj::default())))
            }
        }
    }

    fn iterator_next(&mut self, value: Value) -> Value {
        let Value::Ref(id) = value else { return Value::StopIteration };
        if !matches!(self.heap.get(id), HeapData::Iterator(_)) {
            return Value::StopIteration;
        }
        let HeapData::Iterator(slot) = self.heap.get_mut(id) else { unreachable!() };
        let mut owned = std::mem::take(slot);
        let step = owned.next(&self.heap);
        let HeapData::Iterator(slot) = self.heap.get_mut(id) else { unreachable!() };
        *slot = owned;
        self.materialize_step(step)
    }

    fn materialize_step(&mut self, step: IterStep) -> Value {
        match step {
            IterStep::Value(v) => v.clone_with_heap(&mut self.heap),
            // `for` binds only the key; the value stays owned by the
            // table and is never given a fresh reference.
            IterStep::Pair(key, _value) => key.clone_with_heap(&mut self.heap),
            IterStep::Char(c) => Value::Ref(self.heap.alloc(HeapData::Str(LString::new(c.to_string())))),
            IterStep::Done => Value::StopIteration,
        }
    }

    fn drain_iter_obj(&mut self, iter_obj: &mut IterObj) -> Vec<Value> {
        let mut items = Vec::new();
        loop {
            let step = iter_obj.next(&self.heap);
            if matches!(step, IterStep::Done) {
                break;
            }
            items.push(match step {
                IterStep::Value(v) => v.clone_with_heap(&mut self.heap),
                IterStep::Pair(k, v) => {
                    let kk = k.clone_with_heap(&mut self.heap);
                    let vv = v.clone_with_heap(&mut self.heap);
                    Value::Ref(self.heap.alloc(HeapData::Tuple(TupleObj::new(vec![kk, vv]))))
                }
                IterStep::Char(c) => Value::Ref(self.heap.alloc(HeapData::Str(LString::new(c.to_string())))),
                IterStep::Done => unreachable!(),
            });
        }
        items
    }

    /// Drains an iterable value into an owned `Vec<Value>`, used by the
    /// `list()` built-in. A value that's already a persisted `Iterator`
    /// (e.g. `list(iter(l))`) is drained in place and left exhausted
    /// rather than rejected.
    fn drain_iterable<D: Diagnostics>(&mut self, source: Option<Value>, diagnostics: &mut D) -> Vec<Value> {
        let Some(value) = source else { return Vec::new() };
        if let Value::Ref(id) = value {
            if matches!(self.heap.get(id), HeapData::Iterator(_)) {
                let HeapData::Iterator(slot) = self.heap.get_mut(id) else { unreachable!() };
                let mut owned = std::mem::take(slot);
                let items = self.drain_iter_obj(&mut owned);
                let HeapData::Iterator(slot) = self.heap.get_mut(id) else { unreachable!() };
                *slot = owned;
                return items;
            }
        }
        let Some(mut iter_obj) = ops::iterate(&value, &mut self.heap) else {
            diagnostics.warn(&format!("'{}' is not iterable", ops::type_name_of(&value, &self.heap).as_str()));
            return Vec::new();
        };
        let items = self.drain_iter_obj(&mut iter_obj);
        if let Some(container) = iter_obj.container() {
            self.heap.decref(container);
        }
        items
    }

    /// The `CALL` opcode's six-way dispatch: user function, native
    /// function, class (construct an instance), bound user method, bound
    /// native method, or not-callable. `callee` is only ever peeked —
    /// ownership of whatever register it came from is untouched; `args`
    /// are already independently owned (each cloned out of its source
    /// register by the caller).
    fn call_value<O: Stdout, D: Diagnostics>(
        &mut self,
        callee: Value,
        args: ArgVec,
        stdout: &mut O,
        diagnostics: &mut D,
    ) -> RunResult<Value> {
        let Value::Ref(id) = callee else {
            diagnostics.warn(&format!("'{}' is not callable", ops::type_name_of(&callee, &self.heap).as_str()));
            for a in args {
                a.drop_with_heap(&mut self.heap);
            }
            return Ok(Value::Undefined);
        };
        match self.heap.get(id) {
            HeapData::Function(f) => {
                let (code, owner) = (f.code, f.owner);
                self.call_user_function(code, owner, args, stdout, diagnostics)
            }
            HeapData::Native(b) => {
                let builtin = *b;
                self.call_native(builtin, args, stdout, diagnostics)
            }
            HeapData::Class(_) => self.call_class(id, args, stdout, diagnostics),
            HeapData::BoundMethod(BoundMethodObj::User { function, instance }) => {
                let function = *function;
                let this = instance.clone_with_heap(&mut self.heap);
                let (code, owner) = match self.heap.get(function) {
                    HeapData::Function(f) => (f.code, f.owner),
                    _ => unreachable!("BoundMethodObj::User always points at a Function"),
                };
                self.call_user_function(code, owner, prepend(this, args), stdout, diagnostics)
            }
            HeapData::BoundMethod(BoundMethodObj::Native { method, receiver }) => {
                let method = *method;
                let recv = receiver.clone_with_heap(&mut self.heap);
                self.call_native_method(method, recv, args.into_vec(), diagnostics)
            }
            _ => {
                diagnostics.warn(&format!("'{}' is not callable", ops::type_name_of(&callee, &self.heap).as_str()));
                for a in args {
                    a.drop_with_heap(&mut self.heap);
                }
                Ok(Value::Undefined)
            }
        }
    }

    fn call_user_function<O: Stdout, D: Diagnostics>(
        &mut self,
        code_id: CodeId,
        owner: Option<HeapId>,
        args: ArgVec,
        stdout: &mut O,
        diagnostics: &mut D,
    ) -> RunResult<Value> {
        if !self.call_depth.enter() {
            for a in args {
                a.drop_with_heap(&mut self.heap);
            }
            return Err(Fault::stack_overflow());
        }
        let result = self.run_code(code_id, owner, args, stdout, diagnostics);
        self.call_depth.leave();
        result
    }

    fn call_class<O: Stdout, D: Diagnostics>(
        &mut self,
        class_id: HeapId,
        args: ArgVec,
        stdout: &mut O,
        diagnostics: &mut D,
    ) -> RunResult<Value> {
        self.heap.incref(class_id);
        let instance_id = self.heap.alloc(HeapData::Instance(InstanceObj::new(class_id)));
        match ops::resolve_method(class_id, self.init_name, &self.heap) {
            Some(init_fn) => {
                let (code, owner) = match self.heap.get(init_fn) {
                    HeapData::Function(f) => (f.code, f.owner),
                    _ => unreachable!("class methods are always Function heap values"),
                };
                let this = Value::Ref(instance_id).clone_with_heap(&mut self.heap);
                let init_args = prepend(this, args);
                let result = self.call_user_function(code, owner, init_args, stdout, diagnostics)?;
                result.drop_with_heap(&mut self.heap);
            }
            None => {
                for a in args {
                    a.drop_with_heap(&mut self.heap);
                }
            }
        }
        Ok(Value::Ref(instance_id))
    }

    fn call_native<O: Stdout, D: Diagnostics>(
        &mut self,
        builtin: BuiltinFn,
        args: ArgVec,
        stdout: &mut O,
        diagnostics: &mut D,
    ) -> RunResult<Value> {
        match builtin {
            BuiltinFn::Print => {
                let parts: Vec<String> = args.iter().map(|v| ops::as_string(v, &self.heap, &self.interner)).collect();
                stdout.write_line(&parts.join(" "));
                for a in args {
                    a.drop_with_heap(&mut self.heap);
                }
                Ok(Value::Nil)
            }
            BuiltinFn::Len => {
                let value = args.first().and_then(|v| ops::len_of(v, &self.heap)).map_or_else(
                    || {
                        diagnostics.warn("this value has no length");
                        Value::Undefined
                    },
                    Value::Int,
                );
                for a in args {
                    a.drop_with_heap(&mut self.heap);
                }
                Ok(value)
            }
            BuiltinFn::Int => {
                let value = args.first().and_then(|v| ops::as_int(v, &self.heap)).map_or_else(
                    || {
                        diagnostics.warn("value cannot be converted to an int");
                        Value::Undefined
                    },
                    Value::Int,
                );
                for a in args {
                    a.drop_with_heap(&mut self.heap);
                }
                Ok(value)
            }
            BuiltinFn::Eval => {
                let source = args.first().and_then(|v| format::string_of(v, &self.heap));
                for a in args {
                    a.drop_with_heap(&mut self.heap);
                }
                let Some(source) = source else {
                    diagnostics.warn("eval() requires a string argument");
                    return Ok(Value::Undefined);
                };
                match self.run(&source, stdout, diagnostics) {
                    Ok(v) => Ok(v),
                    Err(EvalError::Compile(e)) => {
                        diagnostics.warn(&format!("eval: {e}"));
                        Ok(Value::Undefined)
                    }
                    Err(EvalError::Fault(f)) => Err(f),
                }
            }
            BuiltinFn::Open => {
                let path = args.first().and_then(|v| format::string_of(v, &self.heap));
                let mode = args.get(1).and_then(|v| format::string_of(v, &self.heap));
                for a in args {
                    a.drop_with_heap(&mut self.heap);
                }
                let (Some(path), Some(mode)) = (path, mode) else {
                    diagnostics.warn("open() requires a path and a mode string");
                    return Ok(Value::Nil);
                };
                match FileObj::open(&path, &mode) {
                    Ok(file) => Ok(Value::Ref(self.heap.alloc(HeapData::File(file)))),
                    Err(e) => {
                        diagnostics.warn(&format!("open('{path}'): {e}"));
                        Ok(Value::Nil)
                    }
                }
            }
            BuiltinFn::Hash => {
                let value = args.first().map(|v| Value::Int(ops::hash_value(v, &self.heap, &self.interner) as i64));
                for a in args {
                    a.drop_with_heap(&mut self.heap);
                }
                Ok(value.unwrap_or(Value::Undefined))
            }
            BuiltinFn::Type => {
                let name = args.first().map_or(crate::types::TypeName::Nil.as_str(), |v| {
                    ops::type_name_of(v, &self.heap).as_str()
                });
                let id = self.heap.alloc(HeapData::Str(LString::new(name)));
                for a in args {
                    a.drop_with_heap(&mut self.heap);
                }
                Ok(Value::Ref(id))
            }
            BuiltinFn::Iter => {
                let Some(first) = args.first().copied() else {
                    diagnostics.warn("iter() requires one argument");
                    return Ok(Value::Undefined);
                };
                let result = self.make_iterator(first, diagnostics);
                for a in args {
                    a.drop_with_heap(&mut self.heap);
                }
                Ok(result)
            }
            BuiltinFn::List => {
                let source = args.first().copied();
                let items = self.drain_iterable(source, diagnostics);
                for a in args {
                    a.drop_with_heap(&mut self.heap);
                }
                Ok(Value::Ref(self.heap.alloc(HeapData::List(ListObj::new(items)))))
            }
            BuiltinFn::Tuple => Ok(Value::Ref(self.heap.alloc(HeapData::Tuple(TupleObj::new(args.into_vec()))))),
            BuiltinFn::Table => {
                for a in args {
                    a.drop_with_heap(&mut self.heap);
                }
                Ok(Value::Ref(self.heap.alloc(HeapData::Table(TableObj::new()))))
            }
            BuiltinFn::Format => {
                let value = args.first().copied().unwrap_or(Value::Nil);
                let spec_str = args.get(1).and_then(|v| format::string_of(v, &self.heap)).unwrap_or_default();
                let rendered = format::format_value(&value, &spec_str, &self.heap, &self.interner);
                for a in args {
                    a.drop_with_heap(&mut self.heap);
                }
                match rendered {
                    Ok(s) => Ok(Value::Ref(self.heap.alloc(HeapData::Str(LString::new(s))))),
                    Err(err) => Err(Fault::new(FaultKind::InvalidFormatSpec, format::unknown_type_message(&err))),
                }
            }
        }
    }

    fn call_native_method<D: Diagnostics>(
        &mut self,
        method: NativeMethod,
        receiver: Value,
        args: Vec<Value>,
        diagnostics: &mut D,
    ) -> RunResult<Value> {
        let Value::Ref(id) = receiver else {
            diagnostics.warn("native method called on a value with no heap representation");
            for a in args {
                a.drop_with_heap(&mut self.heap);
            }
            return Ok(Value::Undefined);
        };
        let mut it = args.into_iter();
        let result = self.dispatch_native_method(method, id, &mut it, diagnostics);
        receiver.drop_with_heap(&mut self.heap);
        for leftover in it {
            leftover.drop_with_heap(&mut self.heap);
        }
        Ok(result)
    }

    fn dispatch_native_method<D: Diagnostics>(
        &mut self,
        method: NativeMethod,
        id: HeapId,
        it: &mut std::vec::IntoIter<Value>,
        diagnostics: &mut D,
    ) -> Value {
        match method {
            NativeMethod::ListAppend => {
                let Some(v) = it.next() else {
                    diagnostics.warn("append() requires a value");
                    return Value::Undefined;
                };
                let HeapData::List(l) = self.heap.get_mut(id) else {
                    v.drop_with_heap(&mut self.heap);
                    diagnostics.warn("append() called on a non-list");
                    return Value::Undefined;
                };
                l.append(v);
                Value::Nil
            }
            NativeMethod::ListPop => {
                let HeapData::List(l) = self.heap.get_mut(id) else {
                    diagnostics.warn("pop() called on a non-list");
                    return Value::Undefined;
                };
                match l.items.pop() {
                    Some(v) => v,
                    None => {
                        diagnostics.warn("pop() from an empty list");
                        Value::Nil
                    }
                }
            }
            NativeMethod::ListRemoveAt => {
                let Some(idx) = it.next().and_then(|v| {
                    let i = ops::as_int(&v, &self.heap);
                    v.drop_with_heap(&mut self.heap);
                    i
                }) else {
                    diagnostics.warn("remove_at() requires an integer index");
                    return Value::Undefined;
                };
                let HeapData::List(l) = self.heap.get_mut(id) else {
                    diagnostics.warn("remove_at() called on a non-list");
                    return Value::Undefined;
                };
                l.remove(idx).unwrap_or_else(|| {
                    diagnostics.warn("remove_at() index out of range");
                    Value::Nil
                })
            }
            NativeMethod::ListIndexOf => {
                let Some(target) = it.next() else {
                    diagnostics.warn("index_of() requires a value");
                    return Value::Undefined;
                };
                let HeapData::List(l) = self.heap.get(id) else {
                    target.drop_with_heap(&mut self.heap);
                    diagnostics.warn("index_of() called on a non-list");
                    return Value::Undefined;
                };
                let found = l.items.iter().position(|v| ops::values_equal(v, &target, &self.heap, &self.interner));
                target.drop_with_heap(&mut self.heap);
                Value::Int(found.map_or(-1, |i| i as i64))
            }
            NativeMethod::ListClear => {
                let HeapData::List(l) = self.heap.get_mut(id) else {
                    diagnostics.warn("clear() called on a non-list");
                    return Value::Undefined;
                };
                let old = std::mem::take(&mut l.items);
                for v in old {
                    v.drop_with_heap(&mut self.heap);
                }
                Value::Nil
            }
            NativeMethod::TableKeys | NativeMethod::TableValues => {
                let HeapData::Table(t) = self.heap.get(id) else {
                    diagnostics.warn("called on a non-table");
                    return Value::Undefined;
                };
                let picked: Vec<Value> = if method == NativeMethod::TableKeys {
                    t.iter().map(|(k, _)| k).collect()
                } else {
                    t.iter().map(|(_, v)| v).collect()
                };
                let cloned: Vec<Value> = picked.into_iter().map(|v| v.clone_with_heap(&mut self.heap)).collect();
                Value::Ref(self.heap.alloc(HeapData::List(ListObj::new(cloned))))
            }
            NativeMethod::TableHas => {
                let Some(key) = it.next() else {
                    diagnostics.warn("has() requires a key");
                    return Value::Undefined;
                };
                let HeapData::Table(t) = self.heap.get(id) else {
                    key.drop_with_heap(&mut self.heap);
                    diagnostics.warn("has() called on a non-table");
                    return Value::Undefined;
                };
                let found = t.contains(&key, &self.heap, &self.interner);
                key.drop_with_heap(&mut self.heap);
                Value::Bool(found)
            }
            NativeMethod::TableRemove => {
                let Some(key) = it.next() else {
                    diagnostics.warn("remove() requires a key");
                    return Value::Undefined;
                };
                if !matches!(self.heap.get(id), HeapData::Table(_)) {
                    key.drop_with_heap(&mut self.heap);
                    diagnostics.warn("remove() called on a non-table");
                    return Value::Undefined;
                }
                let removed = {
                    let HeapData::Table(slot) = self.heap.get_mut(id) else { unreachable!() };
                    let mut owned = std::mem::take(slot);
                    let removed = owned.remove(&key, &self.heap, &self.interner);
                    let HeapData::Table(slot) = self.heap.get_mut(id) else { unreachable!() };
                    *slot = owned;
                    removed
                };
                key.drop_with_heap(&mut self.heap);
                match removed {
                    Some((k, v)) => {
                        k.drop_with_heap(&mut self.heap);
                        v
                    }
                    None => {
                        diagnostics.warn("remove(): key not found");
                        Value::Nil
                    }
                }
            }
            NativeMethod::TableClear => {
                let HeapData::Table(slot) = self.heap.get_mut(id) else {
                    diagnostics.warn("clear() called on a non-table");
                    return Value::Undefined;
                };
                let old = std::mem::replace(slot, TableObj::new());
                let pairs: Vec<(Value, Value)> = old.iter().collect();
                for (k, v) in pairs {
                    k.drop_with_heap(&mut self.heap);
                    v.drop_with_heap(&mut self.heap);
                }
                Value::Nil
            }
            NativeMethod::StringUpper | NativeMethod::StringLower | NativeMethod::StringTrim => {
                let HeapData::Str(s) = self.heap.get(id) else {
                    diagnostics.warn("called on a non-string");
                    return Value::Undefined;
                };
                let text = match method {
                    NativeMethod::StringUpper => s.bytes.to_uppercase(),
                    NativeMethod::StringLower => s.bytes.to_lowercase(),
                    _ => s.bytes.trim().to_owned(),
                };
                Value::Ref(self.heap.alloc(HeapData::Str(LString::new(text))))
            }
            NativeMethod::StringSplit => {
                let sep = it.next().and_then(|v| {
                    let s = format::string_of(&v, &self.heap);
                    v.drop_with_heap(&mut self.heap);
                    s
                });
                let HeapData::Str(s) = self.heap.get(id) else {
                    diagnostics.warn("split() called on a non-string");
                    return Value::Undefined;
                };
                let Some(sep) = sep else {
                    diagnostics.warn("split() requires a string separator");
                    return Value::Undefined;
                };
                let parts: Vec<String> = if sep.is_empty() {
                    s.bytes.chars().map(|c| c.to_string()).collect()
                } else {
                    s.bytes.split(sep.as_str()).map(str::to_owned).collect()
                };
                let items: Vec<Value> =
                    parts.into_iter().map(|p| Value::Ref(self.heap.alloc(HeapData::Str(LString::new(p))))).collect();
                Value::Ref(self.heap.alloc(HeapData::List(ListObj::new(items))))
            }
            NativeMethod::StringReplace => {
                let from = it.next().and_then(|v| {
                    let s = format::string_of(&v, &self.heap);
                    v.drop_with_heap(&mut self.heap);
                    s
                });
                let to = it.next().and_then(|v| {
                    let s = format::string_of(&v, &self.heap);
                    v.drop_with_heap(&mut self.heap);
                    s
                });
                let HeapData::Str(s) = self.heap.get(id) else {
                    diagnostics.warn("replace() called on a non-string");
                    return Value::Undefined;
                };
                let (Some(from), Some(to)) = (from, to) else {
                    diagnostics.warn("replace() requires two string arguments");
                    return Value::Undefined;
                };
                let replaced = s.bytes.replace(from.as_str(), &to);
                Value::Ref(self.heap.alloc(HeapData::Str(LString::new(replaced))))
            }
            NativeMethod::StringStartsWith | NativeMethod::StringEndsWith => {
                let arg = it.next().and_then(|v| {
                    let s = format::string_of(&v, &self.heap);
                    v.drop_with_heap(&mut self.heap);
                    s
                });
                let HeapData::Str(s) = self.heap.get(id) else {
                    diagnostics.warn("called on a non-string");
                    return Value::Undefined;
                };
                let Some(arg) = arg else {
                    diagnostics.warn("requires a string argument");
                    return Value::Undefined;
                };
                let found = if method == NativeMethod::StringStartsWith {
                    s.bytes.starts_with(arg.as_str())
                } else {
                    s.bytes.ends_with(arg.as_str())
                };
                Value::Bool(found)
            }
            NativeMethod::FileRead => {
                let size = it.next().and_then(|v| {
                    let i = ops::as_int(&v, &self.heap);
                    v.drop_with_heap(&mut self.heap);
                    i
                });
                let HeapData::File(f) = self.heap.get_mut(id) else {
                    diagnostics.warn("read() called on a non-file");
                    return Value::Undefined;
                };
                let text = f.read(size.map(|n| n.max(0) as usize));
                Value::Ref(self.heap.alloc(HeapData::Str(LString::new(text))))
            }
            NativeMethod::FileReadline => {
                let HeapData::File(f) = self.heap.get_mut(id) else {
                    diagnostics.warn("readline() called on a non-file");
                    return Value::Undefined;
                };
                match f.readline() {
                    Some(line) => Value::Ref(self.heap.alloc(HeapData::Str(LString::new(line)))),
                    None => Value::Nil,
                }
            }
            NativeMethod::FileWrite => {
                let data = it.next().and_then(|v| {
                    let s = format::string_of(&v, &self.heap);
                    v.drop_with_heap(&mut self.heap);
                    s
                });
                let HeapData::File(f) = self.heap.get_mut(id) else {
                    diagnostics.warn("write() called on a non-file");
                    return Value::Undefined;
                };
                let Some(data) = data else {
                    diagnostics.warn("write() requires a string argument");
                    return Value::Undefined;
                };
                Value::Bool(f.write(&data))
            }
            NativeMethod::FileTell => {
                let HeapData::File(f) = self.heap.get_mut(id) else {
                    diagnostics.warn("tell() called on a non-file");
                    return Value::Undefined;
                };
                Value::Int(f.tell() as i64)
            }
            NativeMethod::FileFlush => {
                let HeapData::File(f) = self.heap.get_mut(id) else {
                    diagnostics.warn("flush() called on a non-file");
                    return Value::Undefined;
                };
                f.flush();
                Value::Nil
            }
            NativeMethod::FileClose => {
                let HeapData::File(f) = self.heap.get_mut(id) else {
                    diagnostics.warn("close() called on a non-file");
                    return Value::Undefined;
                };
                f.close();
                Value::Nil
            }
        }
    }
}

fn prepend(first: Value, rest: ArgVec) -> ArgVec {
    let mut out = ArgVec::with_capacity(rest.len() + 1);
    out.push(first);
    out.extend(rest);
    out
}

fn values_identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Ref(x), Value::Ref(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Nil, Value::Nil)
        | (Value::Undefined, Value::Undefined)
        | (Value::StopIteration, Value::StopIteration) => true,
        (Value::Code(x), Value::Code(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{CollectingDiagnostics, CollectingOut};
    use pretty_assertions::assert_eq;

    fn run(source: &str) -> (Value, Interpreter, CollectingOut, CollectingDiagnostics) {
        let mut interp = Interpreter::new();
        let mut out = CollectingOut::default();
        let mut diag = CollectingDiagnostics::default();
        let value = interp.run(source, &mut out, &mut diag).expect("program should run");
        (value, interp, out, diag)
    }

    #[test]
    fn arithmetic_and_print() {
        let (_, _, out, _) = run("print(1 + 2 * 3);");
        assert_eq!(out.0, "7\n");
    }

    #[test]
    fn for_loop_over_a_range_sums_correctly() {
        let (_, _, out, _) = run("var s = 0; for (i in 0..5) { s = s + i; } print(s);");
        assert_eq!(out.0, "10\n");
    }

    #[test]
    fn for_loop_over_a_table_iterates_keys() {
        let (_, _, out, _) = run(
            r#"var t = table(); t["a"] = 1; t["b"] = 2; var s = 0; for (k in t) { s = s + t[k]; } print(s);"#,
        );
        assert_eq!(out.0, "3\n");
    }

    #[test]
    fn list_append_and_len() {
        let (_, _, out, _) = run("var l = list(); l.append(1); l.append(2); print(len(l));");
        assert_eq!(out.0, "2\n");
    }

    #[test]
    fn closures_capture_one_level_of_locals() {
        let (_, _, out, _) = run(
            r#"
            function make(n) {
                return function() { return n; };
            }
            var f = make(41);
            print(f() + 1);
            "#,
        );
        assert_eq!(out.0, "42\n");
    }

    #[test]
    fn class_instantiation_runs_init_and_binds_methods() {
        let (_, _, out, _) = run(
            r#"
            class Counter {
                init(start) { this.n = start; }
                bump() { this.n = this.n + 1; return this.n; }
            }
            var c = Counter(10);
            print(c.bump());
            "#,
        );
        assert_eq!(out.0, "11\n");
    }
}
