//! Torus Automata - 2D cellular automata on a wrapping grid.
//!
//! Rules are either scripts in a small rule language or `B/S` life-like
//! strings. Generations are computed on a worker pool, only re-evaluating
//! cells whose neighborhood changed, and every applied write is published as
//! a frame so a client can mirror the grid without re-reading it.
//!
//! The library is usable directly through [`session::Session`], or over the
//! C ABI in [`ffi`].

pub mod automaton;
pub mod client;
pub mod config;
pub mod error;
pub mod ffi;
pub mod rule;
pub mod session;

mod sync;

#[cfg(test)]
mod tests;

pub use automaton::{Cell, Frame, FrameKind, GridSnapshot, Point};
pub use client::ClientSyncPipeline;
pub use config::{ClientConfig, PacingConfig, SimConfig};
pub use error::{CompileError, ConfigError, Diagnostic, GridError, SimError};
pub use rule::{RuleBody, RuleSpec};
pub use session::{CaService, Session};
