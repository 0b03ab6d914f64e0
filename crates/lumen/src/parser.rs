//! Recursive-descent parser: tokens to [`crate::ast`].
//!
//! Expression parsing uses precedence climbing rather than a hand-rolled
//! ladder of `parse_equality`/`parse_comparison`/... functions, so adding
//! an operator is a one-line change to a precedence table instead of a
//! new function.

use crate::ast::{BinaryOp, Expr, Stmt, UnaryOp};
use crate::error::{CompileError, CompileErrorKind, CompileResult};
use crate::intern::{Interner, StringId};
use crate::lexer::{tokenize, Token};
use crate::types::numeric::{CompareOp, MathOp};

pub fn parse(source: &str, interner: &mut Interner) -> CompileResult<Vec<Stmt>> {
    let tokens = tokenize(source, interner)?;
    let mut parser = Parser { tokens, pos: 0, interner };
    parser.parse_program()
}

struct Parser<'a> {
    tokens: Vec<(Token, u32, u32)>,
    pos: usize,
    interner: &'a mut Interner,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    fn peek_pos(&self) -> (u32, u32) {
        let (_, line, column) = self.tokens[self.pos];
        (line, column)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].0.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, tok: &Token) -> bool {
        self.peek() == tok
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.check(tok) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Token, what: &str) -> CompileResult<()> {
        if self.eat(tok) {
            Ok(())
        } else {
            let (line, column) = self.peek_pos();
            Err(CompileError::new(CompileErrorKind::ExpectedToken, format!("expected {what}"), line, column))
        }
    }

    fn unexpected(&self, what: &str) -> CompileError {
        let (line, column) = self.peek_pos();
        CompileError::new(CompileErrorKind::UnexpectedToken, format!("{what}: found {:?}", self.peek()), line, column)
    }

    fn intern_ident(&mut self) -> CompileResult<StringId> {
        match self.advance() {
            Token::Ident(name) => Ok(self.interner.intern(&name)),
            _ => Err(self.unexpected("expected identifier")),
        }
    }

    fn parse_program(&mut self) -> CompileResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.check(&Token::Eof) {
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    fn block(&mut self) -> CompileResult<Vec<Stmt>> {
        self.expect(&Token::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.check(&Token::RBrace) && !self.check(&Token::Eof) {
            stmts.push(self.statement()?);
        }
        self.expect(&Token::RBrace, "'}'")?;
        Ok(stmts)
    }

    fn statement(&mut self) -> CompileResult<Stmt> {
        let (line, _) = self.peek_pos();
        match self.peek() {
            Token::Var => {
                self.advance();
                let name = self.intern_ident()?;
                let init = if self.eat(&Token::Eq) { Some(self.expression()?) } else { None };
                self.eat(&Token::Semicolon);
                Ok(Stmt::VarDecl { name, init, line })
            }
            Token::If => {
                self.advance();
                self.expect(&Token::LParen, "'(' after 'if'")?;
                let cond = self.expression()?;
                self.expect(&Token::RParen, "')' after condition")?;
                let then_branch = self.block()?;
                let else_branch = if self.eat(&Token::Else) {
                    if self.check(&Token::If) {
                        vec![self.statement()?]
                    } else {
                        self.block()?
                    }
                } else {
                    Vec::new()
                };
                Ok(Stmt::If { cond, then_branch, else_branch })
            }
            Token::While => {
                self.advance();
                self.expect(&Token::LParen, "'(' after 'while'")?;
                let cond = self.expression()?;
                self.expect(&Token::RParen, "')' after condition")?;
                let body = self.block()?;
                Ok(Stmt::While { cond, body })
            }
            Token::For => {
                self.advance();
                self.expect(&Token::LParen, "'(' after 'for'")?;
                let var = self.intern_ident()?;
                self.expect(&Token::In, "'in'")?;
                let iterable = self.expression()?;
                self.expect(&Token::RParen, "')' after for-clause")?;
                let body = self.block()?;
                Ok(Stmt::For { var, iterable, body, line })
            }
            Token::Return => {
                self.advance();
                let value =
                    if self.check(&Token::Semicolon) || self.check(&Token::RBrace) { None } else { Some(self.expression()?) };
                self.eat(&Token::Semicolon);
                Ok(Stmt::Return { value, line })
            }
            Token::Break => {
                self.advance();
                self.eat(&Token::Semicolon);
                Ok(Stmt::Break)
            }
            Token::Continue => {
                self.advance();
                self.eat(&Token::Semicolon);
                Ok(Stmt::Continue)
            }
            Token::Function => {
                self.advance();
                let name = self.intern_ident()?;
                let params = self.param_list()?;
                let body = self.block()?;
                Ok(Stmt::FunctionDecl { name, params, body })
            }
            Token::Class => {
                self.advance();
                let name = self.intern_ident()?;
                let parent = if self.eat(&Token::Extends) { Some(self.intern_ident()?) } else { None };
                self.expect(&Token::LBrace, "'{' to start class body")?;
                let mut methods = Vec::new();
                while !self.check(&Token::RBrace) && !self.check(&Token::Eof) {
                    let method_name = self.intern_ident()?;
                    let params = self.param_list()?;
                    let body = self.block()?;
                    methods.push((method_name, params, body));
                }
                self.expect(&Token::RBrace, "'}' to close class body")?;
                Ok(Stmt::ClassDecl { name, parent, methods })
            }
            Token::LBrace => Ok(Stmt::Block(self.block()?)),
            _ => {
                let expr = self.expression()?;
                self.eat(&Token::Semicolon);
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn param_list(&mut self) -> CompileResult<Vec<StringId>> {
        self.expect(&Token::LParen, "'(' to start parameter list")?;
        let mut params = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                params.push(self.intern_ident()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen, "')' to close parameter list")?;
        Ok(params)
    }

    fn arg_list(&mut self) -> CompileResult<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                args.push(self.expression()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen, "')' to close argument list")?;
        Ok(args)
    }

    fn expression(&mut self) -> CompileResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> CompileResult<Expr> {
        let (line, _) = self.peek_pos();
        let target = self.range()?;
        if self.eat(&Token::Eq) {
            if !matches!(target, Expr::Identifier(_) | Expr::GetItem { .. } | Expr::GetAttr { .. }) {
                return Err(CompileError::new(
                    CompileErrorKind::InvalidAssignmentTarget,
                    "left-hand side of '=' is not assignable",
                    line,
                    1,
                ));
            }
            let value = self.assignment()?;
            return Ok(Expr::Assign { target: Box::new(target), value: Box::new(value), line });
        }
        Ok(target)
    }

    /// `a..b` or `a..b..c` (the third clause is a step). Binds looser than
    /// every binary operator so `1..n+1` parses as `1..(n+1)`.
    fn range(&mut self) -> CompileResult<Expr> {
        let start = self.binary(0)?;
        if self.eat(&Token::DotDot) {
            let end = self.binary(0)?;
            let step = if self.eat(&Token::DotDot) { Some(Box::new(self.binary(0)?)) } else { None };
            return Ok(Expr::Range { start: Box::new(start), end: Box::new(end), step });
        }
        Ok(start)
    }

    fn binding_power(tok: &Token) -> Option<(u8, BinaryOp)> {
        Some(match tok {
            Token::Or => (1, BinaryOp::Or),
            Token::And => (2, BinaryOp::And),
            Token::EqEq => (3, BinaryOp::Compare(CompareOp::Eq)),
            Token::NotEq => (3, BinaryOp::Compare(CompareOp::Neq)),
            Token::ExactEq => (3, BinaryOp::Compare(CompareOp::Exact)),
            Token::NotExactEq => (3, BinaryOp::Compare(CompareOp::NotExact)),
            Token::In => (3, BinaryOp::Compare(CompareOp::In)),
            Token::Lt => (4, BinaryOp::Compare(CompareOp::Lt)),
            Token::Lte => (4, BinaryOp::Compare(CompareOp::Lte)),
            Token::Gt => (4, BinaryOp::Compare(CompareOp::Gt)),
            Token::Gte => (4, BinaryOp::Compare(CompareOp::Gte)),
            Token::Spaceship => (4, BinaryOp::Compare(CompareOp::Spaceship)),
            Token::Pipe => (5, BinaryOp::Math(MathOp::BOr)),
            Token::Caret => (6, BinaryOp::Math(MathOp::Xor)),
            Token::Amp => (7, BinaryOp::Math(MathOp::BAnd)),
            Token::LShift => (8, BinaryOp::Math(MathOp::LShift)),
            Token::RShift => (8, BinaryOp::Math(MathOp::RShift)),
            Token::Plus => (9, BinaryOp::Math(MathOp::Plus)),
            Token::Minus => (9, BinaryOp::Math(MathOp::Minus)),
            Token::Star => (10, BinaryOp::Math(MathOp::Star)),
            Token::Slash => (10, BinaryOp::Math(MathOp::Slash)),
            Token::Percent => (10, BinaryOp::Math(MathOp::Mod)),
            Token::StarStar => (11, BinaryOp::Math(MathOp::Pow)),
            _ => return None,
        })
    }

    /// Precedence climbing: `min_bp` is the lowest binding power this call
    /// is allowed to consume before returning control to its caller.
    fn binary(&mut self, min_bp: u8) -> CompileResult<Expr> {
        let mut lhs = self.unary()?;
        while let Some((bp, op)) = Self::binding_power(self.peek()) {
            if bp < min_bp {
                break;
            }
            let (line, _) = self.peek_pos();
            self.advance();
            // every operator here is left-associative
            let rhs = self.binary(bp + 1)?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), line };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> CompileResult<Expr> {
        let (line, _) = self.peek_pos();
        match self.peek() {
            Token::Minus => {
                self.advance();
                let operand = self.unary()?;
                Ok(Expr::Unary { op: UnaryOp::Neg, operand: Box::new(operand), line })
            }
            Token::Not => {
                self.advance();
                let operand = self.unary()?;
                Ok(Expr::Unary { op: UnaryOp::Not, operand: Box::new(operand), line })
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> CompileResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            let (line, _) = self.peek_pos();
            match self.peek() {
                Token::LParen => {
                    self.advance();
                    let args = self.arg_list()?;
                    expr = Expr::Call { callee: Box::new(expr), args, line };
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(&Token::RBracket, "']'")?;
                    expr = Expr::GetItem { container: Box::new(expr), index: Box::new(index), line };
                }
                Token::Dot => {
                    self.advance();
                    let name = self.intern_ident()?;
                    expr = Expr::GetAttr { receiver: Box::new(expr), name, line };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> CompileResult<Expr> {
        match self.advance() {
            Token::Int(n) => Ok(Expr::IntLit(n)),
            Token::Float(n) => Ok(Expr::FloatLit(n)),
            Token::Str(s) => Ok(Expr::StringLit(self.interner.intern(&s))),
            Token::True => Ok(Expr::BoolLit(true)),
            Token::False => Ok(Expr::BoolLit(false)),
            Token::Nil => Ok(Expr::Nil),
            Token::This => Ok(Expr::This),
            Token::Super => Ok(Expr::Super),
            Token::Ident(name) => Ok(Expr::Identifier(self.interner.intern(&name))),
            Token::Function => {
                let params = self.param_list()?;
                let body = self.block()?;
                Ok(Expr::Function { params, body })
            }
            Token::LParen => {
                let expr = self.expression()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(expr)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if !self.check(&Token::RBracket) {
                    loop {
                        items.push(self.expression()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBracket, "']'")?;
                Ok(Expr::List(items))
            }
            Token::LBrace => {
                let mut pairs = Vec::new();
                if !self.check(&Token::RBrace) {
                    loop {
                        let key = self.expression()?;
                        self.expect(&Token::Colon, "':' in table literal")?;
                        let value = self.expression()?;
                        pairs.push((key, value));
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBrace, "'}'")?;
                Ok(Expr::Table(pairs))
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected("expected an expression"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arithmetic_with_precedence() {
        let mut interner = Interner::new();
        let stmts = parse("1 + 2 * 3;", &mut interner).unwrap();
        assert_eq!(stmts.len(), 1);
        match &stmts[0] {
            Stmt::Expr(Expr::Binary { op: BinaryOp::Math(MathOp::Plus), rhs, .. }) => {
                assert!(matches!(**rhs, Expr::Binary { op: BinaryOp::Math(MathOp::Star), .. }));
            }
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn parses_if_else_and_while() {
        let mut interner = Interner::new();
        let stmts = parse("if (x) { y = 1; } else { y = 2; } while (y) { y = 0; }", &mut interner).unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(matches!(stmts[0], Stmt::If { .. }));
        assert!(matches!(stmts[1], Stmt::While { .. }));
    }

    #[test]
    fn rejects_assignment_to_literal() {
        let mut interner = Interner::new();
        assert!(parse("1 = 2;", &mut interner).is_err());
    }
}
