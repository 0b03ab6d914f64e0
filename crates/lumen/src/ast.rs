//! Abstract syntax tree produced by [`crate::parser`].
//!
//! Every node carries the source line it started on, so the compiler can
//! thread position information into a [`crate::error::CompileError`]
//! without the lexer/parser having to track it separately.

use crate::intern::StringId;

#[derive(Debug, Clone)]
pub enum Expr {
    IntLit(i64),
    FloatLit(f64),
    StringLit(StringId),
    BoolLit(bool),
    Nil,
    Identifier(StringId),
    This,
    Super,
    Unary { op: UnaryOp, operand: Box<Expr>, line: u32 },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr>, line: u32 },
    Assign { target: Box<Expr>, value: Box<Expr>, line: u32 },
    Call { callee: Box<Expr>, args: Vec<Expr>, line: u32 },
    GetItem { container: Box<Expr>, index: Box<Expr>, line: u32 },
    GetAttr { receiver: Box<Expr>, name: StringId, line: u32 },
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Table(Vec<(Expr, Expr)>),
    Range { start: Box<Expr>, end: Box<Expr>, step: Option<Box<Expr>> },
    Function { params: Vec<StringId>, body: Vec<Stmt> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Math(crate::types::numeric::MathOp),
    Compare(crate::types::numeric::CompareOp),
    And,
    Or,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    VarDecl { name: StringId, init: Option<Expr>, line: u32 },
    If { cond: Expr, then_branch: Vec<Stmt>, else_branch: Vec<Stmt> },
    While { cond: Expr, body: Vec<Stmt> },
    For { var: StringId, iterable: Expr, body: Vec<Stmt>, line: u32 },
    Return { value: Option<Expr>, line: u32 },
    Break,
    Continue,
    Block(Vec<Stmt>),
    FunctionDecl { name: StringId, params: Vec<StringId>, body: Vec<Stmt> },
    ClassDecl { name: StringId, parent: Option<StringId>, methods: Vec<(StringId, Vec<StringId>, Vec<Stmt>)> },
}
