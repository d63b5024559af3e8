//! Native evaluator for two-state "life-like" rules such as B3/S23.

use super::RuleEvaluator;
use crate::automaton::cell::{Cell, Point};
use crate::automaton::grid::GridView;
use crate::error::{CompileError, Diagnostic};

const DEAD: u32 = 0;
const ALIVE: u32 = 1;

/// Parse a `B<digits>/S<digits>` rule string (either order, any case) into
/// birth and survival neighbor counts.
pub fn parse_rule_string(rule: &str) -> Result<(Vec<u32>, Vec<u32>), CompileError> {
    let mut birth: Option<Vec<u32>> = None;
    let mut survive: Option<Vec<u32>> = None;
    let mut errors = Vec::new();
    let mut column = 1u32;

    for part in rule.split('/') {
        let trimmed = part.trim();
        let start = column + (part.len() - part.trim_start().len()) as u32;
        column += part.chars().count() as u32 + 1;

        let mut chars = trimmed.chars();
        let slot = match chars.next().map(|c| c.to_ascii_uppercase()) {
            Some('B') => &mut birth,
            Some('S') => &mut survive,
            _ => {
                errors.push(Diagnostic::new(
                    1,
                    start,
                    format!("expected a `B` or `S` section, found `{trimmed}`"),
                ));
                continue;
            }
        };
        if slot.is_some() {
            errors.push(Diagnostic::new(1, start, "section appears twice"));
            continue;
        }

        let mut counts = Vec::new();
        for (i, c) in chars.enumerate() {
            match c.to_digit(10) {
                Some(n) if !counts.contains(&n) => counts.push(n),
                Some(_) => {}
                None => errors.push(Diagnostic::new(
                    1,
                    start + 1 + i as u32,
                    format!("expected a neighbor count, found `{c}`"),
                )),
            }
        }
        counts.sort_unstable();
        *slot = Some(counts);
    }

    match (birth, survive) {
        (Some(birth), Some(survive)) if errors.is_empty() => Ok((birth, survive)),
        (birth, survive) => {
            if birth.is_none() {
                errors.push(Diagnostic::new(1, 1, "missing `B` section"));
            }
            if survive.is_none() {
                errors.push(Diagnostic::new(1, 1, "missing `S` section"));
            }
            Err(errors.into())
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifeLikeRule {
    birth: Vec<bool>,
    survive: Vec<bool>,
}

fn count_table(counts: &[u32]) -> Vec<bool> {
    let len = counts.iter().max().map_or(0, |&m| m as usize + 1);
    let mut table = vec![false; len];
    for &n in counts {
        table[n as usize] = true;
    }
    table
}

impl LifeLikeRule {
    pub fn new(birth: &[u32], survive: &[u32]) -> Self {
        LifeLikeRule {
            birth: count_table(birth),
            survive: count_table(survive),
        }
    }

    /// Conway's Game of Life, B3/S23.
    pub fn conway() -> Self {
        LifeLikeRule::new(&[3], &[2, 3])
    }

    fn born(&self, neighbors: usize) -> bool {
        self.birth.get(neighbors).copied().unwrap_or(false)
    }

    fn survives(&self, neighbors: usize) -> bool {
        self.survive.get(neighbors).copied().unwrap_or(false)
    }
}

impl RuleEvaluator for LifeLikeRule {
    fn evaluate(&self, center: Point, view: &dyn GridView, out: &mut Vec<Cell>) {
        match view.get(center) {
            DEAD => {
                if self.born(view.count_neighbors_in_state(center, ALIVE)) {
                    out.push(Cell::at(center, ALIVE));
                }
            }
            ALIVE => {
                if !self.survives(view.count_neighbors_in_state(center, ALIVE)) {
                    out.push(Cell::at(center, DEAD));
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::grid::{GridSnapshot, NeighborhoodView};
    use crate::rule::moore_neighborhood;

    #[test]
    fn test_parse_standard_strings() {
        assert_eq!(parse_rule_string("B3/S23").unwrap(), (vec![3], vec![2, 3]));
        assert_eq!(
            parse_rule_string("s23/b36").unwrap(),
            (vec![3, 6], vec![2, 3])
        );
        assert_eq!(
            parse_rule_string(" B3678 / S34678 ").unwrap(),
            (vec![3, 6, 7, 8], vec![3, 4, 6, 7, 8])
        );
        // Seeds: nothing survives
        assert_eq!(parse_rule_string("B2/S").unwrap(), (vec![2], vec![]));
    }

    #[test]
    fn test_parse_errors_are_positioned() {
        let err = parse_rule_string("B3x/S23").unwrap_err();
        assert_eq!(err.diagnostics.len(), 1);
        assert_eq!(err.diagnostics[0].column, 3);

        let err = parse_rule_string("B3/Q23").unwrap_err();
        assert_eq!(err.diagnostics[0].column, 4);
        assert!(err.diagnostics.iter().any(|d| d.message.contains("missing `S`")));

        let err = parse_rule_string("B3/B4/S2").unwrap_err();
        assert!(err.diagnostics[0].message.contains("twice"));
    }

    #[test]
    fn test_blinker_oscillates() {
        let neighborhood = moore_neighborhood(false);
        let rule = LifeLikeRule::conway();
        let mut grid = GridSnapshot::blank(5, 5, 0).unwrap();
        for y in 1..=3 {
            grid.set(Cell::new(2, y, 1));
        }

        let view = NeighborhoodView::new(&grid, &neighborhood);
        let mut writes = Vec::new();
        for p in grid.points() {
            rule.evaluate(p, &view, &mut writes);
        }
        writes.sort_by_key(|c| c.point());
        assert_eq!(
            writes,
            vec![
                Cell::new(2, 1, 0),
                Cell::new(1, 2, 1),
                Cell::new(3, 2, 1),
                Cell::new(2, 3, 0),
            ]
        );
    }

    #[test]
    fn test_other_states_are_left_alone() {
        let neighborhood = moore_neighborhood(false);
        let grid = GridSnapshot::from_rows(&[vec![1, 1, 1], vec![0, 2, 0], vec![0, 0, 0]]).unwrap();
        let view = NeighborhoodView::new(&grid, &neighborhood);
        let mut writes = Vec::new();
        LifeLikeRule::conway().evaluate(Point::new(1, 1), &view, &mut writes);
        assert!(writes.is_empty());
    }
}
