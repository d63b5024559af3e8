//! Bytecode interpreter for compiled rule scripts.

use super::compile::{compile, Constants, Op, Program};
use super::lexer::tokenize;
use super::parser::parse;
use super::{RuleEvaluator, RuleSpec};
use crate::automaton::cell::{wrap_i64, Cell, Point};
use crate::automaton::grid::GridView;
use crate::error::CompileError;

/// A rule script compiled against a fixed state count and default state.
#[derive(Clone, Debug)]
pub struct ScriptRule {
    program: Program,
}

impl ScriptRule {
    pub fn compile(source: &str, spec: &RuleSpec) -> Result<Self, CompileError> {
        let tokens = tokenize(source)?;
        let statements = parse(tokens)?;
        let program = compile(
            &statements,
            Constants {
                num_states: spec.num_states,
                default_state: spec.clamped_default_state(),
            },
        )?;
        Ok(ScriptRule { program })
    }

    pub fn program(&self) -> &Program {
        &self.program
    }
}

fn to_state(value: i64) -> Option<u32> {
    u32::try_from(value).ok()
}

fn shifted(center: Point, dx: i64, dy: i64, width: i32, height: i32) -> Point {
    Point::new(
        wrap_i64((center.x as i64).wrapping_add(dx), width),
        wrap_i64((center.y as i64).wrapping_add(dy), height),
    )
}

impl RuleEvaluator for ScriptRule {
    fn evaluate(&self, center: Point, view: &dyn GridView, out: &mut Vec<Cell>) {
        let code = &self.program.code;
        let mut locals = vec![0i64; self.program.slots];
        let mut stack: Vec<i64> = Vec::with_capacity(16);
        let (width, height) = view.dimensions();

        // The compiler keeps the stack balanced; an empty pop reads as 0
        macro_rules! pop {
            () => {
                stack.pop().unwrap_or(0)
            };
        }
        macro_rules! binary {
            (|$a:ident, $b:ident| $body:expr) => {{
                let $b = pop!();
                let $a = pop!();
                stack.push($body);
            }};
        }

        let mut pc = 0;
        while let Some(&op) = code.get(pc) {
            pc += 1;
            match op {
                Op::Push(n) => stack.push(n),
                Op::Load(slot) => stack.push(locals[slot]),
                Op::Store(slot) => locals[slot] = pop!(),
                Op::State => stack.push(view.get(center) as i64),
                Op::X => stack.push(center.x as i64),
                Op::Y => stack.push(center.y as i64),
                Op::Width => stack.push(width as i64),
                Op::Height => stack.push(height as i64),
                Op::Neighbors => {
                    let count = to_state(pop!())
                        .map_or(0, |state| view.count_neighbors_in_state(center, state));
                    stack.push(count as i64);
                }
                Op::Get => {
                    let dy = pop!();
                    let dx = pop!();
                    let p = shifted(center, dx, dy, width, height);
                    stack.push(view.get(p) as i64);
                }
                Op::Min => binary!(|a, b| a.min(b)),
                Op::Max => binary!(|a, b| a.max(b)),
                Op::Abs => {
                    let a = pop!();
                    stack.push(a.wrapping_abs());
                }
                Op::Neg => {
                    let a = pop!();
                    stack.push(a.wrapping_neg());
                }
                Op::Not => {
                    let a = pop!();
                    stack.push((a == 0) as i64);
                }
                Op::Truthy => {
                    let a = pop!();
                    stack.push((a != 0) as i64);
                }
                Op::Add => binary!(|a, b| a.wrapping_add(b)),
                Op::Sub => binary!(|a, b| a.wrapping_sub(b)),
                Op::Mul => binary!(|a, b| a.wrapping_mul(b)),
                Op::Div => binary!(|a, b| if b == 0 { 0 } else { a.wrapping_div(b) }),
                Op::Rem => binary!(|a, b| if b == 0 { 0 } else { a.wrapping_rem(b) }),
                Op::Eq => binary!(|a, b| (a == b) as i64),
                Op::Ne => binary!(|a, b| (a != b) as i64),
                Op::Lt => binary!(|a, b| (a < b) as i64),
                Op::Le => binary!(|a, b| (a <= b) as i64),
                Op::Gt => binary!(|a, b| (a > b) as i64),
                Op::Ge => binary!(|a, b| (a >= b) as i64),
                Op::Jump(target) => pc = target,
                Op::JumpIfZero(target) => {
                    if pop!() == 0 {
                        pc = target;
                    }
                }
                Op::JumpIfNonZero(target) => {
                    if pop!() != 0 {
                        pc = target;
                    }
                }
                Op::Set => {
                    if let Some(state) = to_state(pop!()) {
                        out.push(Cell::at(center, state));
                    }
                }
                Op::SetAt => {
                    let value = pop!();
                    let dy = pop!();
                    let dx = pop!();
                    if let Some(state) = to_state(value) {
                        out.push(Cell::at(shifted(center, dx, dy, width, height), state));
                    }
                }
                Op::Return => break,
            }
        }
    }
}
