//! Error types shared across the crate.

use std::fmt;

use thiserror::Error;

/// A single problem found while compiling a rule, positioned in the rule source.
///
/// Line and column are 1-based. Problems that are not tied to the source text
/// (for example an invalid state count) are reported at line 0, column 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: u32, column: u32, message: impl Into<String>) -> Self {
        Diagnostic {
            line,
            column,
            message: message.into(),
        }
    }

    /// A diagnostic about the rule parameters rather than its source.
    pub fn general(message: impl Into<String>) -> Self {
        Diagnostic::new(0, 0, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}: {}", self.line, self.column, self.message)
    }
}

/// A rule failed to load. The previously loaded rule (if any) stays active.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rule failed to compile with {} diagnostic(s)", .diagnostics.len())]
pub struct CompileError {
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileError {
    pub fn single(diagnostic: Diagnostic) -> Self {
        CompileError {
            diagnostics: vec![diagnostic],
        }
    }
}

impl From<Vec<Diagnostic>> for CompileError {
    fn from(diagnostics: Vec<Diagnostic>) -> Self {
        CompileError { diagnostics }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("grid dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: i32, height: i32 },

    #[error("a {width}x{height} grid exceeds the limit of {max} cells")]
    TooLarge { width: i32, height: i32, max: usize },

    #[error("could not allocate a grid of {cells} cells")]
    OutOfMemory { cells: usize },

    #[error("snapshot holds {actual} cells but a {width}x{height} grid needs {expected}")]
    SizeMismatch {
        width: i32,
        height: i32,
        expected: usize,
        actual: usize,
    },

    /// A writer panicked while holding the grid lock; the batch was not applied.
    #[error("grid writer lock poisoned, batch of {0} writes discarded")]
    Poisoned(usize),
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}
