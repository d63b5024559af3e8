//! Recursive-descent parser for rule scripts.
//!
//! Errors inside a statement are recorded and the parser skips ahead to the
//! next statement boundary, so one pass reports every independent mistake.

use super::lexer::{Span, Token, TokenKind};
use crate::error::Diagnostic;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExprKind {
    Int(i64),
    Name(String),
    Call { name: String, args: Vec<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stmt {
    Let {
        name: String,
        span: Span,
        value: Expr,
    },
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },
    Return,
    Expr(Expr),
}

type ParseResult<T> = Result<T, Diagnostic>;

/// Deepest nesting of parentheses, calls, unary and binary operators, and
/// blocks a script may use. Keeps every recursive pass over the tree bounded.
pub const MAX_NESTING: usize = 128;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    errors: Vec<Diagnostic>,
}

/// Parse a token stream ending in `Eof` into statements.
pub fn parse(tokens: Vec<Token>) -> Result<Vec<Stmt>, Vec<Diagnostic>> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        errors: Vec::new(),
    };
    let program = parser.statements(false);
    if parser.errors.is_empty() {
        Ok(program)
    } else {
        Err(parser.errors)
    }
}

impl Parser {
    fn peek(&self) -> &Token {
        // The lexer always terminates the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.at(&kind) {
            return Ok(self.advance());
        }
        Err(self.unexpected(&kind.describe()))
    }

    /// Go one level deeper, failing at the current token past `MAX_NESTING`.
    fn enter(&mut self, what: &str) -> ParseResult<()> {
        if self.depth >= MAX_NESTING {
            return Err(self.peek().span.diagnostic(format!("{what} nested too deeply")));
        }
        self.depth += 1;
        Ok(())
    }

    fn nested<T>(
        &mut self,
        what: &str,
        parse: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        let base = self.depth;
        let result = self.enter(what).and_then(|()| parse(self));
        self.depth = base;
        result
    }

    fn unexpected(&self, wanted: &str) -> Diagnostic {
        let found = self.peek();
        found
            .span
            .diagnostic(format!("expected {wanted}, found {}", found.kind.describe()))
    }

    /// Statements until `}` (inside a block) or end of input.
    fn statements(&mut self, in_block: bool) -> Vec<Stmt> {
        let mut out = Vec::new();
        loop {
            while self.eat(&TokenKind::Semi) {}
            match self.peek().kind {
                TokenKind::Eof => break,
                TokenKind::RBrace if in_block => break,
                TokenKind::RBrace => {
                    let span = self.advance().span;
                    self.errors.push(span.diagnostic("unmatched `}`"));
                    continue;
                }
                _ => {}
            }

            let start = self.pos;
            match self.statement() {
                Ok(stmt) => out.push(stmt),
                Err(diagnostic) => {
                    self.errors.push(diagnostic);
                    self.synchronize(start);
                }
            }
        }
        out
    }

    /// Skip to the start of the next statement: a `;`, a statement keyword,
    /// a closing brace or the first token on a later line.
    fn synchronize(&mut self, start: usize) {
        let line = self.peek().span.line;
        if self.pos == start {
            self.advance();
        }
        loop {
            if self.peek().span.line > line {
                return;
            }
            match self.peek().kind {
                TokenKind::Eof
                | TokenKind::RBrace
                | TokenKind::Let
                | TokenKind::If
                | TokenKind::Return => return,
                TokenKind::Semi => {
                    self.advance();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        match self.peek().kind {
            TokenKind::Let => {
                self.advance();
                let token = self.advance();
                let TokenKind::Ident(name) = token.kind else {
                    return Err(token.span.diagnostic(format!(
                        "expected a variable name after `let`, found {}",
                        token.kind.describe()
                    )));
                };
                self.expect(TokenKind::Assign)?;
                let value = self.expression()?;
                Ok(Stmt::Let {
                    name,
                    span: token.span,
                    value,
                })
            }
            TokenKind::If => self.if_statement(),
            TokenKind::Return => {
                self.advance();
                Ok(Stmt::Return)
            }
            _ => Ok(Stmt::Expr(self.expression()?)),
        }
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        self.expect(TokenKind::If)?;
        let cond = self.expression()?;
        let then_branch = self.nested("block", Self::block)?;
        let else_branch = if self.eat(&TokenKind::Else) {
            if self.at(&TokenKind::If) {
                vec![self.nested("block", Self::if_statement)?]
            } else {
                self.nested("block", Self::block)?
            }
        } else {
            Vec::new()
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace)?;
        let body = self.statements(true);
        self.expect(TokenKind::RBrace)?;
        Ok(body)
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        self.binary(0)
    }

    /// Precedence climbing over the binary operator table, lowest level first.
    fn binary(&mut self, level: usize) -> ParseResult<Expr> {
        if level == PRECEDENCE_LEVELS {
            return self.unary();
        }
        let base = self.depth;
        let result = self.operator_chain(level);
        self.depth = base;
        result
    }

    fn operator_chain(&mut self, level: usize) -> ParseResult<Expr> {
        let mut lhs = self.binary(level + 1)?;
        while let Some(op) = binary_op(&self.peek().kind, level) {
            // The tree leans left, so each operator in a chain is one level deeper
            self.enter("expression")?;
            let span = self.advance().span;
            let rhs = self.binary(level + 1)?;
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.primary(),
        };
        let span = self.advance().span;
        let operand = self.nested("expression", Self::unary)?;
        Ok(Expr {
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        })
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Int(n) => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::Int(n),
                    span: token.span,
                })
            }
            TokenKind::Ident(name) => {
                self.advance();
                if !self.eat(&TokenKind::LParen) {
                    return Ok(Expr {
                        kind: ExprKind::Name(name),
                        span: token.span,
                    });
                }
                let mut args = Vec::new();
                if !self.eat(&TokenKind::RParen) {
                    loop {
                        args.push(self.nested("expression", Self::expression)?);
                        if self.eat(&TokenKind::Comma) {
                            continue;
                        }
                        self.expect(TokenKind::RParen)?;
                        break;
                    }
                }
                Ok(Expr {
                    kind: ExprKind::Call { name, args },
                    span: token.span,
                })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.nested("expression", Self::expression)?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            _ => Err(self.unexpected("an expression")),
        }
    }
}

const PRECEDENCE_LEVELS: usize = 6;

/// The binary operator `kind` stands for at precedence `level` (0 binds loosest).
fn binary_op(kind: &TokenKind, level: usize) -> Option<BinaryOp> {
    let (op_level, op) = match kind {
        TokenKind::OrOr => (0, BinaryOp::Or),
        TokenKind::AndAnd => (1, BinaryOp::And),
        TokenKind::EqEq => (2, BinaryOp::Eq),
        TokenKind::NotEq => (2, BinaryOp::Ne),
        TokenKind::Lt => (3, BinaryOp::Lt),
        TokenKind::Le => (3, BinaryOp::Le),
        TokenKind::Gt => (3, BinaryOp::Gt),
        TokenKind::Ge => (3, BinaryOp::Ge),
        TokenKind::Plus => (4, BinaryOp::Add),
        TokenKind::Minus => (4, BinaryOp::Sub),
        TokenKind::Star => (5, BinaryOp::Mul),
        TokenKind::Slash => (5, BinaryOp::Div),
        TokenKind::Percent => (5, BinaryOp::Rem),
        _ => return None,
    };
    (op_level == level).then_some(op)
}
