//! Lowers a parsed rule script to stack-machine bytecode.
//!
//! Jumps only ever go forward, so a program runs at most `code.len()`
//! instructions per cell.

use super::lexer::Span;
use super::parser::{BinaryOp, Expr, ExprKind, Stmt, UnaryOp};
use crate::error::Diagnostic;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Push(i64),
    Load(usize),
    Store(usize),
    State,
    X,
    Y,
    Width,
    Height,
    Neighbors,
    Get,
    Min,
    Max,
    Abs,
    Neg,
    Not,
    /// Normalize the top of the stack to 0 or 1.
    Truthy,
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
    Jump(usize),
    /// Pop; jump when zero.
    JumpIfZero(usize),
    /// Pop; jump when non-zero.
    JumpIfNonZero(usize),
    Set,
    SetAt,
    Return,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    pub code: Vec<Op>,
    /// Number of local variable slots.
    pub slots: usize,
}

/// Values the rule parameters fix at load time.
#[derive(Clone, Copy, Debug)]
pub struct Constants {
    pub num_states: u32,
    pub default_state: u32,
}

const VALUE_FUNCTIONS: [(&str, usize, Op); 5] = [
    ("neighbors", 1, Op::Neighbors),
    ("get", 2, Op::Get),
    ("min", 2, Op::Min),
    ("max", 2, Op::Max),
    ("abs", 1, Op::Abs),
];

const WRITE_FUNCTIONS: [(&str, usize, Op); 2] = [("set", 1, Op::Set), ("set_at", 3, Op::SetAt)];

fn lookup(table: &[(&str, usize, Op)], name: &str) -> Option<(usize, Op)> {
    table
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|&(_, arity, op)| (arity, op))
}

fn is_builtin_value(name: &str) -> bool {
    matches!(
        name,
        "state" | "x" | "y" | "width" | "height" | "num_states" | "default_state"
    )
}

struct Compiler {
    constants: Constants,
    code: Vec<Op>,
    scopes: Vec<Vec<(String, usize)>>,
    slots: usize,
    errors: Vec<Diagnostic>,
}

pub fn compile(program: &[Stmt], constants: Constants) -> Result<Program, Vec<Diagnostic>> {
    let mut compiler = Compiler {
        constants,
        code: Vec::new(),
        scopes: vec![Vec::new()],
        slots: 0,
        errors: Vec::new(),
    };
    compiler.block(program);
    if !compiler.errors.is_empty() {
        return Err(compiler.errors);
    }
    Ok(Program {
        code: compiler.code,
        slots: compiler.slots,
    })
}

impl Compiler {
    fn error(&mut self, span: Span, message: impl Into<String>) {
        self.errors.push(span.diagnostic(message));
    }

    fn emit(&mut self, op: Op) -> usize {
        self.code.push(op);
        self.code.len() - 1
    }

    /// Point the jump at `at` to the next instruction.
    fn patch(&mut self, at: usize) {
        let target = self.code.len();
        match &mut self.code[at] {
            Op::Jump(t) | Op::JumpIfZero(t) | Op::JumpIfNonZero(t) => *t = target,
            _ => {}
        }
    }

    fn resolve(&self, name: &str) -> Option<usize> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(n, _)| n == name)
            .map(|&(_, slot)| slot)
    }

    fn block(&mut self, stmts: &[Stmt]) {
        self.scopes.push(Vec::new());
        for stmt in stmts {
            self.statement(stmt);
        }
        self.scopes.pop();
    }

    fn statement(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let { name, span, value } => {
                self.expr(value);
                if is_builtin_value(name)
                    || lookup(&VALUE_FUNCTIONS, name).is_some()
                    || lookup(&WRITE_FUNCTIONS, name).is_some()
                {
                    self.error(*span, format!("`{name}` is built in and cannot be redefined"));
                    return;
                }
                let slot = self.slots;
                self.slots += 1;
                self.emit(Op::Store(slot));
                if let Some(scope) = self.scopes.last_mut() {
                    scope.push((name.clone(), slot));
                }
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.expr(cond);
                let skip_then = self.emit(Op::JumpIfZero(0));
                self.block(then_branch);
                if else_branch.is_empty() {
                    self.patch(skip_then);
                } else {
                    let skip_else = self.emit(Op::Jump(0));
                    self.patch(skip_then);
                    self.block(else_branch);
                    self.patch(skip_else);
                }
            }
            Stmt::Return => {
                self.emit(Op::Return);
            }
            Stmt::Expr(expr) => self.expression_statement(expr),
        }
    }

    fn expression_statement(&mut self, expr: &Expr) {
        let ExprKind::Call { name, args } = &expr.kind else {
            self.error(expr.span, "expression has no effect; only `set` and `set_at` may stand alone");
            return;
        };
        if let Some((arity, op)) = lookup(&WRITE_FUNCTIONS, name) {
            self.call(expr.span, name, args, arity, op);
        } else if lookup(&VALUE_FUNCTIONS, name).is_some() {
            self.error(expr.span, format!("result of `{name}` is unused"));
        } else {
            self.error(expr.span, format!("unknown function `{name}`"));
        }
    }

    fn call(&mut self, span: Span, name: &str, args: &[Expr], arity: usize, op: Op) {
        for arg in args {
            self.expr(arg);
        }
        if args.len() != arity {
            self.error(
                span,
                format!("`{name}` takes {arity} argument(s) but {} were given", args.len()),
            );
            return;
        }
        self.emit(op);
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Int(n) => {
                self.emit(Op::Push(*n));
            }
            ExprKind::Name(name) => self.name(expr.span, name),
            ExprKind::Call { name, args } => {
                if let Some((arity, op)) = lookup(&VALUE_FUNCTIONS, name) {
                    self.call(expr.span, name, args, arity, op);
                } else if lookup(&WRITE_FUNCTIONS, name).is_some() {
                    self.error(expr.span, format!("`{name}` does not produce a value"));
                } else {
                    self.error(expr.span, format!("unknown function `{name}`"));
                }
            }
            ExprKind::Unary { op, operand } => {
                self.expr(operand);
                self.emit(match op {
                    UnaryOp::Neg => Op::Neg,
                    UnaryOp::Not => Op::Not,
                });
            }
            ExprKind::Binary {
                op: BinaryOp::And,
                lhs,
                rhs,
            } => {
                self.expr(lhs);
                let short = self.emit(Op::JumpIfZero(0));
                self.expr(rhs);
                self.emit(Op::Truthy);
                let end = self.emit(Op::Jump(0));
                self.patch(short);
                self.emit(Op::Push(0));
                self.patch(end);
            }
            ExprKind::Binary {
                op: BinaryOp::Or,
                lhs,
                rhs,
            } => {
                self.expr(lhs);
                let short = self.emit(Op::JumpIfNonZero(0));
                self.expr(rhs);
                self.emit(Op::Truthy);
                let end = self.emit(Op::Jump(0));
                self.patch(short);
                self.emit(Op::Push(1));
                self.patch(end);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.expr(lhs);
                self.expr(rhs);
                self.emit(match op {
                    BinaryOp::Add => Op::Add,
                    BinaryOp::Sub => Op::Sub,
                    BinaryOp::Mul => Op::Mul,
                    BinaryOp::Div => Op::Div,
                    BinaryOp::Rem => Op::Rem,
                    BinaryOp::Eq => Op::Eq,
                    BinaryOp::Ne => Op::Ne,
                    BinaryOp::Lt => Op::Lt,
                    BinaryOp::Le => Op::Le,
                    BinaryOp::Gt => Op::Gt,
                    BinaryOp::Ge => Op::Ge,
                    BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
                });
            }
        }
    }

    fn name(&mut self, span: Span, name: &str) {
        if let Some(slot) = self.resolve(name) {
            self.emit(Op::Load(slot));
            return;
        }
        let op = match name {
            "state" => Op::State,
            "x" => Op::X,
            "y" => Op::Y,
            "width" => Op::Width,
            "height" => Op::Height,
            "num_states" => Op::Push(self.constants.num_states as i64),
            "default_state" => Op::Push(self.constants.default_state as i64),
            _ if lookup(&VALUE_FUNCTIONS, name).is_some()
                || lookup(&WRITE_FUNCTIONS, name).is_some() =>
            {
                self.error(span, format!("`{name}` is a function and must be called"));
                return;
            }
            _ => {
                self.error(span, format!("unknown name `{name}`"));
                return;
            }
        };
        self.emit(op);
    }
}
