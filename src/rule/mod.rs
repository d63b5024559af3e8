//! Rule parameters and the pluggable rule evaluator.
//!
//! A rule is a state count, a default state, a neighborhood and a body. The
//! body is turned into a [`RuleEvaluator`] when the rule is loaded: either a
//! script compiled to bytecode or a native life-like (B/S) rule. Evaluators
//! only read the grid and propose writes; they never mutate anything.

pub mod compile;
pub mod lexer;
pub mod life;
pub mod parser;
pub mod vm;

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::automaton::cell::{Cell, Point};
use crate::automaton::grid::GridView;
use crate::error::{CompileError, Diagnostic};

pub use life::LifeLikeRule;
pub use vm::ScriptRule;

/// State count reported before any rule has been loaded.
pub const DEFAULT_NUM_STATES: u32 = 2;

/// Computes the next-generation writes for one cell.
pub trait RuleEvaluator: Send + Sync {
    /// Append proposed writes for `center` to `out`. Must not have side effects.
    fn evaluate(&self, center: Point, view: &dyn GridView, out: &mut Vec<Cell>);
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleBody {
    /// Source text in the rule script language.
    Script(String),
    /// Birth/survival neighbor counts over state 1.
    LifeLike { birth: Vec<u32>, survive: Vec<u32> },
}

impl RuleBody {
    /// Parse a `B3/S23`-style rule string.
    pub fn life_like(rule: &str) -> Result<Self, CompileError> {
        let (birth, survive) = life::parse_rule_string(rule)?;
        Ok(RuleBody::LifeLike { birth, survive })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub num_states: u32,
    pub default_state: u32,
    pub neighborhood: Vec<Point>,
    pub body: RuleBody,
}

impl Default for RuleSpec {
    fn default() -> Self {
        RuleSpec {
            num_states: DEFAULT_NUM_STATES,
            default_state: 0,
            neighborhood: Vec::new(),
            body: RuleBody::Script(String::new()),
        }
    }
}

impl RuleSpec {
    /// Build a spec; `default_state` is clamped into `[0, num_states)`.
    pub fn new(num_states: u32, default_state: u32, neighborhood: Vec<Point>, body: RuleBody) -> Self {
        let mut spec = RuleSpec {
            num_states,
            default_state,
            neighborhood,
            body,
        };
        spec.default_state = spec.clamped_default_state();
        spec
    }

    pub fn clamped_default_state(&self) -> u32 {
        self.default_state.min(self.num_states.saturating_sub(1))
    }

    /// Each offset negated, in reverse order.
    pub fn reverse_neighborhood(&self) -> Vec<Point> {
        reverse_neighborhood(&self.neighborhood)
    }
}

pub fn reverse_neighborhood(neighborhood: &[Point]) -> Vec<Point> {
    neighborhood
        .iter()
        .rev()
        .map(|p| Point::new(-p.x, -p.y))
        .collect()
}

/// The 3x3 Moore offsets. With `include_center` the (0, 0) offset is kept, which
/// makes incremental stepping re-check a cell after its own state changes.
pub fn moore_neighborhood(include_center: bool) -> Vec<Point> {
    let mut offsets = Vec::with_capacity(9);
    for dy in -1..=1 {
        for dx in -1..=1 {
            if dx == 0 && dy == 0 && !include_center {
                continue;
            }
            offsets.push(Point::new(dx, dy));
        }
    }
    offsets
}

/// A validated, compiled rule. Immutable once loaded.
pub struct LoadedRule {
    spec: RuleSpec,
    reverse: Vec<Point>,
    evaluator: Box<dyn RuleEvaluator>,
}

impl LoadedRule {
    pub fn compile(spec: RuleSpec) -> Result<Self, CompileError> {
        if spec.num_states == 0 {
            return Err(CompileError::single(Diagnostic::general(
                "a rule needs at least one state",
            )));
        }
        let spec = RuleSpec {
            default_state: spec.clamped_default_state(),
            ..spec
        };
        let evaluator: Box<dyn RuleEvaluator> = match &spec.body {
            RuleBody::Script(source) => Box::new(ScriptRule::compile(source, &spec)?),
            RuleBody::LifeLike { birth, survive } => Box::new(LifeLikeRule::new(birth, survive)),
        };
        let reverse = spec.reverse_neighborhood();
        Ok(LoadedRule {
            spec,
            reverse,
            evaluator,
        })
    }

    pub fn spec(&self) -> &RuleSpec {
        &self.spec
    }

    pub fn num_states(&self) -> u32 {
        self.spec.num_states
    }

    pub fn default_state(&self) -> u32 {
        self.spec.default_state
    }

    pub fn neighborhood(&self) -> &[Point] {
        &self.spec.neighborhood
    }

    pub fn reverse_neighborhood(&self) -> &[Point] {
        &self.reverse
    }

    #[inline]
    pub fn evaluate(&self, center: Point, view: &dyn GridView, out: &mut Vec<Cell>) {
        self.evaluator.evaluate(center, view, out);
    }
}

/// What a successful load replaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadReport {
    pub previous_num_states: u32,
    pub num_states: u32,
    pub default_state: u32,
}

impl LoadReport {
    /// The new rule has fewer states, so existing cells may be out of range.
    pub fn downgraded(&self) -> bool {
        self.num_states < self.previous_num_states
    }
}

#[derive(Default)]
pub struct RuleEngine {
    loaded: RwLock<Option<Arc<LoadedRule>>>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and swap in `spec`. On failure the current rule stays loaded.
    pub fn load(&self, spec: RuleSpec) -> Result<LoadReport, CompileError> {
        let rule = LoadedRule::compile(spec)?;
        let report = LoadReport {
            previous_num_states: self.num_states(),
            num_states: rule.num_states(),
            default_state: rule.default_state(),
        };
        *self.loaded.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(rule));
        log::info!(
            "loaded rule: {} states, default {}",
            report.num_states,
            report.default_state
        );
        Ok(report)
    }

    /// The rule to use for a whole generation, if one is loaded.
    pub fn current(&self) -> Option<Arc<LoadedRule>> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }

    pub fn num_states(&self) -> u32 {
        self.current()
            .map_or(DEFAULT_NUM_STATES, |rule| rule.num_states())
    }

    pub fn default_state(&self) -> u32 {
        self.current().map_or(0, |rule| rule.default_state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_neighborhood_negates_and_reverses() {
        let spec = RuleSpec::new(
            2,
            0,
            vec![Point::new(1, 0), Point::new(0, 2), Point::new(-3, 1)],
            RuleBody::Script(String::new()),
        );
        assert_eq!(
            spec.reverse_neighborhood(),
            vec![Point::new(3, -1), Point::new(0, -2), Point::new(-1, 0)]
        );
    }

    #[test]
    fn test_default_state_is_clamped() {
        let spec = RuleSpec::new(3, 7, Vec::new(), RuleBody::Script(String::new()));
        assert_eq!(spec.default_state, 2);
        assert_eq!(
            RuleSpec::new(1, 4, Vec::new(), RuleBody::Script(String::new())).default_state,
            0
        );
    }

    #[test]
    fn test_moore_neighborhood() {
        assert_eq!(moore_neighborhood(false).len(), 8);
        assert!(moore_neighborhood(true).contains(&Point::new(0, 0)));
        assert!(!moore_neighborhood(false).contains(&Point::new(0, 0)));
    }

    #[test]
    fn test_engine_reports_defaults_before_load() {
        let engine = RuleEngine::new();
        assert!(!engine.is_loaded());
        assert_eq!(engine.num_states(), DEFAULT_NUM_STATES);
        assert_eq!(engine.default_state(), 0);
    }

    #[test]
    fn test_failed_load_keeps_previous_rule() {
        let engine = RuleEngine::new();
        let good = RuleSpec::new(
            4,
            1,
            moore_neighborhood(false),
            RuleBody::Script("set(1)".to_string()),
        );
        let report = engine.load(good).unwrap();
        assert_eq!(report.previous_num_states, DEFAULT_NUM_STATES);
        assert!(!report.downgraded());

        let bad = RuleSpec::new(
            2,
            0,
            Vec::new(),
            RuleBody::Script("set(".to_string()),
        );
        let err = engine.load(bad).unwrap_err();
        assert!(!err.diagnostics.is_empty());
        assert_eq!(engine.num_states(), 4);
        assert_eq!(engine.default_state(), 1);
    }

    #[test]
    fn test_zero_states_is_rejected() {
        let spec = RuleSpec {
            num_states: 0,
            ..RuleSpec::default()
        };
        let err = LoadedRule::compile(spec).err().unwrap();
        assert_eq!(err.diagnostics[0].line, 0);
    }

    #[test]
    fn test_downgrade_is_reported() {
        let engine = RuleEngine::new();
        engine
            .load(RuleSpec::new(5, 0, Vec::new(), RuleBody::Script(String::new())))
            .unwrap();
        let report = engine
            .load(RuleSpec::new(3, 0, Vec::new(), RuleBody::Script(String::new())))
            .unwrap();
        assert!(report.downgraded());
        assert_eq!(report.previous_num_states, 5);
    }
}
