//! AST → [`CodeObject`] lowering.
//!
//! One [`Ctx`] exists per compiled body (the top-level program, a
//! `function` expression, a class method). Each `Ctx` owns its own
//! register numbering, constant pool, and instruction stream; nested
//! bodies are compiled into a fresh `Ctx`, finished into a `CodeObject`,
//! and pushed into the shared [`CodeArena`] — the enclosing body only
//! keeps the resulting [`CodeId`].
//!
//! Registers are handed out by a small mark/release stack: a name bound by
//! `var`/a parameter/a named `function`/`class` keeps its register for the
//! rest of the body, while a register fetched only to hold an intermediate
//! value (`compile_expr`'s return) is released back to the free list once
//! its caller is done with it. Correctness of refcounting never depends on
//! this reuse — every register write drops whatever value previously lived
//! there (see `bytecode::vm`) — it only keeps `num_registers` small.

use crate::{
    ast::{BinaryOp, Expr, Stmt, UnaryOp},
    bytecode::{CodeArena, CodeId, CodeObject, ConstValue, Instr},
    error::{CompileError, CompileErrorKind, CompileResult},
    intern::{Interner, StringId},
};

/// Tracks the patch list for one enclosing loop, so `break`/`continue` can
/// resolve their jump targets once the loop's end is known.
struct LoopCtx {
    continue_target: u32,
    break_patches: Vec<usize>,
}

/// Compile-time state for one function/method/program body.
struct Ctx {
    /// Names declared in this body (parameters, `var`, named nested
    /// `function`/`class`), each bound to a stable register.
    locals: Vec<(StringId, u16)>,
    /// Snapshot of the *immediately enclosing* body's locals at the point
    /// this body was entered, used to resolve one level of closure
    /// capture. Empty for the program root and for methods (methods don't
    /// capture ambient locals — only `this`/`super`).
    parent_locals: Vec<(StringId, u16)>,
    /// Whether names not found as a local resolve/store through `GLOBAL`
    /// rather than through a fresh local register (true for the program
    /// root so that `var`/named `function`/`class` declarations there are
    /// visible to `eval()` and across REPL lines, which run as separate
    /// `CodeObject`s sharing one globals table).
    is_global: bool,
    is_method: bool,
    next_reg: u16,
    max_reg: u16,
    free_temps: Vec<u16>,
    instructions: Vec<Instr>,
    constants: Vec<ConstValue>,
    /// Parent-body registers captured by a `Lookup` inside this body,
    /// in the order first referenced; index into this list is the
    /// `LoadUpvalue` slot. Becomes `BuildFunction`'s `captures` list in
    /// the enclosing body.
    captured: Vec<u16>,
    loops: Vec<LoopCtx>,
}

impl Ctx {
    fn new(is_method: bool, is_global: bool, parent_locals: Vec<(StringId, u16)>) -> Self {
        let next_reg = u16::from(is_method);
        Self {
            locals: Vec::new(),
            parent_locals,
            is_global,
            is_method,
            next_reg,
            max_reg: next_reg,
            free_temps: Vec::new(),
            instructions: Vec::new(),
            constants: Vec::new(),
            captured: Vec::new(),
            loops: Vec::new(),
        }
    }

    fn bump(&mut self) -> CompileResult<u16> {
        let reg = self.next_reg;
        if reg == u16::MAX {
            return Err(CompileError::new(CompileErrorKind::TooManyLocals, "function uses too many registers", 0, 0));
        }
        self.next_reg += 1;
        self.max_reg = self.max_reg.max(self.next_reg);
        Ok(reg)
    }

    fn temp(&mut self) -> CompileResult<u16> {
        if let Some(reg) = self.free_temps.pop() {
            return Ok(reg);
        }
        self.bump()
    }

    fn release(&mut self, reg: u16) {
        self.free_temps.push(reg);
    }

    /// Idempotent: a name already bound in this body returns its existing
    /// register instead of allocating a new one.
    fn allocate_local(&mut self, name: StringId) -> CompileResult<u16> {
        if let Some(&(_, reg)) = self.locals.iter().find(|(n, _)| *n == name) {
            return Ok(reg);
        }
        let reg = self.bump()?;
        self.locals.push((name, reg));
        Ok(reg)
    }

    fn capture_slot(&mut self, parent_reg: u16) -> u16 {
        if let Some(pos) = self.captured.iter().position(|&r| r == parent_reg) {
            return pos as u16;
        }
        self.captured.push(parent_reg);
        (self.captured.len() - 1) as u16
    }

    fn emit(&mut self, instr: Instr) -> usize {
        self.instructions.push(instr);
        self.instructions.len() - 1
    }

    fn here(&self) -> u32 {
        self.instructions.len() as u32
    }

    fn patch(&mut self, index: usize, target: u32) {
        match &mut self.instructions[index] {
            Instr::Jump { target: t }
            | Instr::JumpIfFalse { target: t, .. }
            | Instr::JumpIfTrue { target: t, .. }
            | Instr::JumpIfStop { target: t, .. } => *t = target,
            other => unreachable!("patch target is not a jump: {other:?}"),
        }
    }

    fn emit_constant(&mut self, value: ConstValue) -> CompileResult<u16> {
        if let Some(pos) = self.constants.iter().position(|c| c == &value) {
            return Ok(pos as u16);
        }
        if self.constants.len() >= usize::from(u16::MAX) {
            return Err(CompileError::new(CompileErrorKind::TooManyConstants, "too many constants in one body", 0, 0));
        }
        self.constants.push(value);
        Ok((self.constants.len() - 1) as u16)
    }

    fn emit_load_const(&mut self, dst: u16, value: ConstValue) -> CompileResult<()> {
        let index = self.emit_constant(value)?;
        self.emit(Instr::LoadConst { dst, index });
        Ok(())
    }

    /// Resolves a name read, per §4.2.4: current locals, then the one
    /// enclosing body's locals (as a closure upvalue), then `GLOBAL`.
    fn compile_identifier_into(&mut self, name: StringId, dst: u16) -> CompileResult<()> {
        if let Some(&(_, reg)) = self.locals.iter().find(|(n, _)| *n == name) {
            self.emit(Instr::Move { dst, src: reg });
            return Ok(());
        }
        if let Some(&(_, preg)) = self.parent_locals.iter().find(|(n, _)| *n == name) {
            let slot = self.capture_slot(preg);
            self.emit(Instr::LoadUpvalue { dst, slot });
            return Ok(());
        }
        self.emit(Instr::LoadGlobal { dst, name });
        Ok(())
    }

    fn compile_identifier(&mut self, name: StringId) -> CompileResult<u16> {
        let dst = self.temp()?;
        self.compile_identifier_into(name, dst)?;
        Ok(dst)
    }
}

/// Compiles a whole program (or one REPL line) into a root `CodeObject`.
/// `var`, named `function`, and named `class` at this level bind globals,
/// not local registers — see [`Ctx::is_global`].
pub fn compile(stmts: &[Stmt], interner: &mut Interner, codes: &mut CodeArena) -> CompileResult<CodeId> {
    let mut ctx = Ctx::new(false, true, Vec::new());
    let result = compile_block(&mut ctx, stmts, interner, codes)?;
    ctx.emit(Instr::Return { src: result });
    if let Some(r) = result {
        ctx.release(r);
    }
    let name = interner.intern("<program>");
    let code = CodeObject {
        name,
        arity: 0,
        num_registers: ctx.max_reg,
        constants: ctx.constants,
        instructions: ctx.instructions,
        captures_parent: false,
        is_method: false,
    };
    Ok(codes.push(code))
}

/// Compiles a statement list. If the final statement is a bare expression,
/// its register is left un-released and returned as the block's implicit
/// result rather than going through `Stmt::Expr`'s usual discard — this is
/// the `result_reg` a body's trailing `RETURN` falls back on when no
/// explicit `return` ran. Callers that don't want that value (an `if`/`while`
/// body, a nested `{ }` block) must release it themselves.
fn compile_block(
    ctx: &mut Ctx,
    stmts: &[Stmt],
    interner: &mut Interner,
    codes: &mut CodeArena,
) -> CompileResult<Option<u16>> {
    let Some((last, rest)) = stmts.split_last() else {
        return Ok(None);
    };
    for stmt in rest {
        compile_stmt(ctx, stmt, interner, codes)?;
    }
    if let Stmt::Expr(expr) = last {
        let reg = compile_expr(ctx, expr, interner, codes)?;
        Ok(Some(reg))
    } else {
        compile_stmt(ctx, last, interner, codes)?;
        Ok(None)
    }
}

fn compile_stmt(ctx: &mut Ctx, stmt: &Stmt, interner: &mut Interner, codes: &mut CodeArena) -> CompileResult<()> {
    match stmt {
        Stmt::Expr(expr) => {
            let reg = compile_expr(ctx, expr, interner, codes)?;
            ctx.release(reg);
            Ok(())
        }
        Stmt::VarDecl { name, init, .. } => {
            if ctx.is_global {
                let value = match init {
                    Some(e) => compile_expr(ctx, e, interner, codes)?,
                    None => {
                        let r = ctx.temp()?;
                        ctx.emit_load_const(r, ConstValue::Nil)?;
                        r
                    }
                };
                ctx.emit(Instr::StoreGlobal { name: *name, src: value });
                ctx.release(value);
            } else {
                let reg = ctx.allocate_local(*name)?;
                match init {
                    Some(e) => compile_expr_into(ctx, e, reg, interner, codes)?,
                    None => ctx.emit_load_const(reg, ConstValue::Nil)?,
                }
            }
            Ok(())
        }
        Stmt::If { cond, then_branch, else_branch } => {
            let c = compile_expr(ctx, cond, interner, codes)?;
            let jump_to_else = ctx.emit(Instr::JumpIfFalse { cond: c, target: 0 });
            ctx.release(c);
            if let Some(r) = compile_block(ctx, then_branch, interner, codes)? {
                ctx.release(r);
            }
            if else_branch.is_empty() {
                let end = ctx.here();
                ctx.patch(jump_to_else, end);
            } else {
                let jump_to_end = ctx.emit(Instr::Jump { target: 0 });
                let else_start = ctx.here();
                ctx.patch(jump_to_else, else_start);
                if let Some(r) = compile_block(ctx, else_branch, interner, codes)? {
                    ctx.release(r);
                }
                let end = ctx.here();
                ctx.patch(jump_to_end, end);
            }
            Ok(())
        }
        Stmt::While { cond, body } => {
            let loop_start = ctx.here();
            let c = compile_expr(ctx, cond, interner, codes)?;
            let jump_exit = ctx.emit(Instr::JumpIfFalse { cond: c, target: 0 });
            ctx.release(c);
            ctx.loops.push(LoopCtx { continue_target: loop_start, break_patches: Vec::new() });
            if let Some(r) = compile_block(ctx, body, interner, codes)? {
                ctx.release(r);
            }
            let loop_ctx = ctx.loops.pop().expect("pushed above");
            ctx.emit(Instr::Jump { target: loop_start });
            let end = ctx.here();
            ctx.patch(jump_exit, end);
            for patch in loop_ctx.break_patches {
                ctx.patch(patch, end);
            }
            Ok(())
        }
        Stmt::For { var, iterable, body, .. } => {
            let iterable_reg = compile_expr(ctx, iterable, interner, codes)?;
            let iter_reg = ctx.temp()?;
            ctx.emit(Instr::GetIter { dst: iter_reg, src: iterable_reg });
            ctx.release(iterable_reg);

            let loop_start = ctx.here();
            let val_reg = ctx.temp()?;
            ctx.emit(Instr::IterNext { dst: val_reg, iter: iter_reg });
            let jump_exit = ctx.emit(Instr::JumpIfStop { src: val_reg, target: 0 });
            let var_reg = ctx.allocate_local(*var)?;
            ctx.emit(Instr::Move { dst: var_reg, src: val_reg });
            ctx.release(val_reg);

            ctx.loops.push(LoopCtx { continue_target: loop_start, break_patches: Vec::new() });
            if let Some(r) = compile_block(ctx, body, interner, codes)? {
                ctx.release(r);
            }
            let loop_ctx = ctx.loops.pop().expect("pushed above");
            ctx.emit(Instr::Jump { target: loop_start });
            let end = ctx.here();
            ctx.patch(jump_exit, end);
            for patch in loop_ctx.break_patches {
                ctx.patch(patch, end);
            }
            ctx.release(iter_reg);
            Ok(())
        }
        Stmt::Return { value, .. } => {
            match value {
                Some(e) => {
                    let r = compile_expr(ctx, e, interner, codes)?;
                    ctx.emit(Instr::Return { src: Some(r) });
                    ctx.release(r);
                }
                None => {
                    ctx.emit(Instr::Return { src: None });
                }
            }
            Ok(())
        }
        Stmt::Break => {
            if let Some(loop_ctx) = ctx.loops.last_mut() {
                let idx = ctx.instructions.len();
                ctx.instructions.push(Instr::Jump { target: 0 });
                loop_ctx.break_patches.push(idx);
                Ok(())
            } else {
                Err(CompileError::new(CompileErrorKind::BreakOutsideLoop, "'break' outside a loop", 0, 0))
            }
        }
        Stmt::Continue => {
            if let Some(loop_ctx) = ctx.loops.last() {
                let target = loop_ctx.continue_target;
                ctx.emit(Instr::Jump { target });
                Ok(())
            } else {
                Err(CompileError::new(CompileErrorKind::ContinueOutsideLoop, "'continue' outside a loop", 0, 0))
            }
        }
        Stmt::Block(stmts) => {
            if let Some(r) = compile_block(ctx, stmts, interner, codes)? {
                ctx.release(r);
            }
            Ok(())
        }
        Stmt::FunctionDecl { name, params, body } => {
            let value = compile_function_value(ctx, params, body, *name, interner, codes)?;
            bind_name(ctx, *name, value)?;
            ctx.release(value);
            Ok(())
        }
        Stmt::ClassDecl { name, parent, methods } => {
            let parent_reg = match parent {
                Some(pname) => Some(ctx.compile_identifier(*pname)?),
                None => None,
            };
            let mut compiled = Vec::with_capacity(methods.len());
            for (mname, mparams, mbody) in methods {
                let code_id = compile_method_body(mparams, mbody, *mname, interner, codes)?;
                compiled.push((*mname, code_id));
            }
            let dst = ctx.temp()?;
            ctx.emit(Instr::BuildClass { dst, name: *name, parent: parent_reg, methods: compiled });
            if let Some(p) = parent_reg {
                ctx.release(p);
            }
            bind_name(ctx, *name, dst)?;
            ctx.release(dst);
            Ok(())
        }
    }
}

/// Stores `value` into the location a named declaration (`function`,
/// `class`) binds to: a global at the program root, a fresh local
/// register otherwise.
fn bind_name(ctx: &mut Ctx, name: StringId, value: u16) -> CompileResult<()> {
    if ctx.is_global {
        ctx.emit(Instr::StoreGlobal { name, src: value });
    } else {
        let local = ctx.allocate_local(name)?;
        ctx.emit(Instr::Move { dst: local, src: value });
    }
    Ok(())
}

fn compile_function_value(
    ctx: &mut Ctx,
    params: &[StringId],
    body: &[Stmt],
    name: StringId,
    interner: &mut Interner,
    codes: &mut CodeArena,
) -> CompileResult<u16> {
    let mut nested = Ctx::new(false, false, ctx.locals.clone());
    for param in params {
        nested.allocate_local(*param)?;
    }
    let result = compile_block(&mut nested, body, interner, codes)?;
    nested.emit(Instr::Return { src: result });
    let code = CodeObject {
        name,
        arity: params.len(),
        num_registers: nested.max_reg,
        constants: nested.constants,
        instructions: nested.instructions,
        captures_parent: !nested.captured.is_empty(),
        is_method: false,
    };
    let code_id = codes.push(code);
    let dst = ctx.temp()?;
    ctx.emit(Instr::BuildFunction { dst, code: code_id, captures: nested.captured });
    Ok(dst)
}

/// Methods never close over the class-declaring body's locals (only
/// `this`/`super`) — `BuildClass`'s encoding carries no per-method capture
/// list, so a method body is compiled with an empty `parent_locals`.
fn compile_method_body(
    params: &[StringId],
    body: &[Stmt],
    name: StringId,
    interner: &mut Interner,
    codes: &mut CodeArena,
) -> CompileResult<CodeId> {
    let mut nested = Ctx::new(true, false, Vec::new());
    for param in params {
        nested.allocate_local(*param)?;
    }
    compile_block(&mut nested, body, interner, codes)?;
    let code = CodeObject {
        name,
        arity: params.len(),
        num_registers: nested.max_reg,
        constants: nested.constants,
        instructions: nested.instructions,
        captures_parent: false,
        is_method: true,
    };
    Ok(codes.push(code))
}

fn compile_expr(ctx: &mut Ctx, expr: &Expr, interner: &mut Interner, codes: &mut CodeArena) -> CompileResult<u16> {
    let dst = ctx.temp()?;
    compile_expr_into(ctx, expr, dst, interner, codes)?;
    Ok(dst)
}

#[allow(clippy::too_many_lines)]
fn compile_expr_into(
    ctx: &mut Ctx,
    expr: &Expr,
    dst: u16,
    interner: &mut Interner,
    codes: &mut CodeArena,
) -> CompileResult<()> {
    match expr {
        Expr::IntLit(n) => ctx.emit_load_const(dst, ConstValue::Int(*n)),
        Expr::FloatLit(n) => ctx.emit_load_const(dst, ConstValue::Float(*n)),
        Expr::StringLit(id) => ctx.emit_load_const(dst, ConstValue::Str(*id)),
        Expr::BoolLit(b) => ctx.emit_load_const(dst, ConstValue::Bool(*b)),
        Expr::Nil => ctx.emit_load_const(dst, ConstValue::Nil),
        Expr::Identifier(name) => ctx.compile_identifier_into(*name, dst),
        Expr::This => {
            if ctx.is_method {
                ctx.emit(Instr::Move { dst, src: 0 });
            } else {
                ctx.emit_load_const(dst, ConstValue::Nil)?;
            }
            Ok(())
        }
        // A bare `super` outside `super.name` has no defined meaning; it
        // degrades the same way an out-of-place `this` does.
        Expr::Super => {
            if ctx.is_method {
                ctx.emit(Instr::Move { dst, src: 0 });
            } else {
                ctx.emit_load_const(dst, ConstValue::Nil)?;
            }
            Ok(())
        }
        Expr::Unary { op, operand, .. } => {
            let src = compile_expr(ctx, operand, interner, codes)?;
            match op {
                UnaryOp::Neg => {
                    ctx.emit(Instr::Neg { dst, src });
                }
                UnaryOp::Not => {
                    ctx.emit(Instr::Not { dst, src });
                }
            }
            ctx.release(src);
            Ok(())
        }
        Expr::Binary { op, lhs, rhs, .. } => match op {
            BinaryOp::Math(math_op) => {
                let l = compile_expr(ctx, lhs, interner, codes)?;
                let r = compile_expr(ctx, rhs, interner, codes)?;
                ctx.emit(Instr::Math { op: *math_op, dst, lhs: l, rhs: r });
                ctx.release(r);
                ctx.release(l);
                Ok(())
            }
            BinaryOp::Compare(cmp_op) => {
                let l = compile_expr(ctx, lhs, interner, codes)?;
                let r = compile_expr(ctx, rhs, interner, codes)?;
                ctx.emit(Instr::Compare { op: *cmp_op, dst, lhs: l, rhs: r });
                ctx.release(r);
                ctx.release(l);
                Ok(())
            }
            BinaryOp::And => {
                compile_expr_into(ctx, lhs, dst, interner, codes)?;
                let skip = ctx.emit(Instr::JumpIfFalse { cond: dst, target: 0 });
                compile_expr_into(ctx, rhs, dst, interner, codes)?;
                let end = ctx.here();
                ctx.patch(skip, end);
                Ok(())
            }
            BinaryOp::Or => {
                compile_expr_into(ctx, lhs, dst, interner, codes)?;
                let skip = ctx.emit(Instr::JumpIfTrue { cond: dst, target: 0 });
                compile_expr_into(ctx, rhs, dst, interner, codes)?;
                let end = ctx.here();
                ctx.patch(skip, end);
                Ok(())
            }
        },
        Expr::Assign { target, value, line } => compile_assign(ctx, target, value, *line, dst, interner, codes),
        Expr::Call { callee, args, .. } => {
            let callee_reg = compile_expr(ctx, callee, interner, codes)?;
            let mut arg_regs = Vec::with_capacity(args.len());
            for arg in args {
                arg_regs.push(compile_expr(ctx, arg, interner, codes)?);
            }
            ctx.emit(Instr::Call { dst, callee: callee_reg, args: arg_regs.clone() });
            for reg in arg_regs.into_iter().rev() {
                ctx.release(reg);
            }
            ctx.release(callee_reg);
            Ok(())
        }
        Expr::GetItem { container, index, .. } => {
            let c = compile_expr(ctx, container, interner, codes)?;
            let i = compile_expr(ctx, index, interner, codes)?;
            ctx.emit(Instr::GetItem { dst, container: c, index: i });
            ctx.release(i);
            ctx.release(c);
            Ok(())
        }
        Expr::GetAttr { receiver, name, .. } => {
            if matches!(**receiver, Expr::Super) {
                ctx.emit(Instr::SuperGetAttr { dst, name: *name });
                Ok(())
            } else {
                let r = compile_expr(ctx, receiver, interner, codes)?;
                ctx.emit(Instr::GetAttr { dst, receiver: r, name: *name });
                ctx.release(r);
                Ok(())
            }
        }
        Expr::List(items) => {
            let mut regs = Vec::with_capacity(items.len());
            for item in items {
                regs.push(compile_expr(ctx, item, interner, codes)?);
            }
            ctx.emit(Instr::BuildList { dst, items: regs.clone() });
            for reg in regs.into_iter().rev() {
                ctx.release(reg);
            }
            Ok(())
        }
        Expr::Tuple(items) => {
            let mut regs = Vec::with_capacity(items.len());
            for item in items {
                regs.push(compile_expr(ctx, item, interner, codes)?);
            }
            ctx.emit(Instr::BuildTuple { dst, items: regs.clone() });
            for reg in regs.into_iter().rev() {
                ctx.release(reg);
            }
            Ok(())
        }
        Expr::Table(pairs) => {
            let mut regs = Vec::with_capacity(pairs.len());
            for (k, v) in pairs {
                let kr = compile_expr(ctx, k, interner, codes)?;
                let vr = compile_expr(ctx, v, interner, codes)?;
                regs.push((kr, vr));
            }
            ctx.emit(Instr::BuildTable { dst, pairs: regs.clone() });
            for (kr, vr) in regs.into_iter().rev() {
                ctx.release(vr);
                ctx.release(kr);
            }
            Ok(())
        }
        Expr::Range { start, end, step } => {
            let s = compile_expr(ctx, start, interner, codes)?;
            let e = compile_expr(ctx, end, interner, codes)?;
            let st = match step {
                Some(step_expr) => compile_expr(ctx, step_expr, interner, codes)?,
                None => {
                    let t = ctx.temp()?;
                    ctx.emit_load_const(t, ConstValue::Int(1))?;
                    t
                }
            };
            ctx.emit(Instr::BuildRange { dst, start: s, end: e, step: st });
            ctx.release(st);
            ctx.release(e);
            ctx.release(s);
            Ok(())
        }
        Expr::Function { params, body } => {
            let name = interner.intern("<anonymous>");
            let value = compile_function_value(ctx, params, body, name, interner, codes)?;
            if value != dst {
                ctx.emit(Instr::Move { dst, src: value });
                ctx.release(value);
            }
            Ok(())
        }
    }
}

fn compile_assign(
    ctx: &mut Ctx,
    target: &Expr,
    value: &Expr,
    line: u32,
    dst: u16,
    interner: &mut Interner,
    codes: &mut CodeArena,
) -> CompileResult<()> {
    compile_expr_into(ctx, value, dst, interner, codes)?;
    match target {
        Expr::Identifier(name) => {
            // Writing to a one-level-enclosing closure's locals isn't
            // supported (§4.3.2) — only the current body's own locals
            // are writable registers; anything else is a global store.
            if let Some(&(_, reg)) = ctx.locals.iter().find(|(n, _)| *n == *name) {
                if reg != dst {
                    ctx.emit(Instr::Move { dst: reg, src: dst });
                }
            } else {
                ctx.emit(Instr::StoreGlobal { name: *name, src: dst });
            }
            Ok(())
        }
        Expr::GetItem { container, index, .. } => {
            let c = compile_expr(ctx, container, interner, codes)?;
            let i = compile_expr(ctx, index, interner, codes)?;
            ctx.emit(Instr::SetItem { container: c, index: i, value: dst });
            ctx.release(i);
            ctx.release(c);
            Ok(())
        }
        Expr::GetAttr { receiver, name, .. } => {
            let r = compile_expr(ctx, receiver, interner, codes)?;
            ctx.emit(Instr::SetAttr { receiver: r, name: *name, value: dst });
            ctx.release(r);
            Ok(())
        }
        other => Err(CompileError::new(
            CompileErrorKind::InvalidAssignmentTarget,
            format!("not assignable: {other:?}"),
            line,
            1,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bytecode::CodeArena, parser::parse};
    use pretty_assertions::assert_eq;

    fn compile_source(source: &str) -> (CodeId, CodeArena, Interner) {
        let mut interner = Interner::new();
        let stmts = parse(source, &mut interner).unwrap();
        let mut codes = CodeArena::new();
        let id = compile(&stmts, &mut interner, &mut codes).unwrap();
        (id, codes, interner)
    }

    #[test]
    fn deduplicates_repeated_literal_constants() {
        let (id, codes, _interner) = compile_source("var a = 7; var b = 7; var c = 7;");
        let code = codes.get(id);
        let sevens = code.constants.iter().filter(|c| matches!(c, ConstValue::Int(7))).count();
        assert_eq!(sevens, 1, "equal literals in one context must share a constant pool slot");
    }

    #[test]
    fn jump_targets_stay_in_bounds() {
        let (id, codes, _interner) = compile_source(
            "var i = 0; while (i < 5) { if (i == 2) { break; } i = i + 1; } for (x in [1,2,3]) { if (x == 1) { continue; } }",
        );
        let code = codes.get(id);
        let len = code.instructions.len() as u32;
        for instr in &code.instructions {
            let target = match instr {
                Instr::Jump { target }
                | Instr::JumpIfFalse { target, .. }
                | Instr::JumpIfTrue { target, .. }
                | Instr::JumpIfStop { target, .. } => Some(*target),
                _ => None,
            };
            if let Some(t) = target {
                assert!(t <= len, "jump target {t} exceeds block length {len}");
            }
        }
    }

    #[test]
    fn closure_captures_one_parent_register() {
        let (id, codes, _interner) =
            compile_source("function make(n) { function inc(x) { return x + n; } return inc; }");
        let code = codes.get(id);
        // the program root stores `make` itself as a BuildFunction
        let make_code_id = code.instructions.iter().find_map(|i| match i {
            Instr::BuildFunction { code, .. } => Some(*code),
            _ => None,
        });
        let make_code = codes.get(make_code_id.expect("expected a BuildFunction instruction for `make`"));
        // `inc` is the only nested function `make` builds, and it must
        // capture exactly one parent register (`n`).
        let inc_code_id = make_code.instructions.iter().find_map(|i| match i {
            Instr::BuildFunction { code, .. } => Some(*code),
            _ => None,
        });
        let inc_code = codes.get(inc_code_id.expect("expected a BuildFunction instruction for `inc`"));
        assert!(inc_code.captures_parent, "`inc` must capture `n` from `make`");
    }

    #[test]
    fn break_outside_loop_is_a_compile_error() {
        let mut interner = Interner::new();
        let stmts = parse("break;", &mut interner).unwrap();
        let mut codes = CodeArena::new();
        assert!(compile(&stmts, &mut interner, &mut codes).is_err());
    }

    #[test]
    fn register_count_stays_close_to_local_count() {
        let (id, codes, _interner) = compile_source("function f(a, b) { var c = a + b; return c; }");
        let code = codes.get(id);
        // the program root only builds `f` and stores it as a global
        assert!(code.num_registers <= 1, "program root only builds one function value");

        let f_code_id = code.instructions.iter().find_map(|i| match i {
            Instr::BuildFunction { code, .. } => Some(*code),
            _ => None,
        });
        let f_code = codes.get(f_code_id.expect("expected a BuildFunction instruction for `f`"));
        // two params (a, b), one local (c), plus a couple of scratch temps
        // for the intermediate `a + b` and the return value — should stay
        // well short of one register per AST node.
        assert!(f_code.num_registers <= 6, "unexpected register bloat in `f`: {}", f_code.num_registers);
    }
}
