//! C ABI over a [`Session`](crate::session::Session).
//!
//! Every export is `#[no_mangle] extern "C"` and takes the session as an
//! opaque pointer. The functions here are thin wrappers: null checks, pointer
//! and buffer conversion, then a call into the session.
//!
//! Status codes are shared across the layer: 0 = ok, 1 = rejected, -1 = null handle.

use std::ffi::c_char;

use crate::automaton::Point;
use crate::error::Diagnostic;
use crate::session::Session;

pub mod grid;
pub mod lifecycle;
pub mod simulation;

pub use grid::{
    ta_export_grid, ta_get_cell_state, ta_get_grid_dimensions, ta_get_num_neighbors,
    ta_import_grid, ta_init_grid_blank, ta_set_cell_state, ta_update_grid,
};
pub use lifecycle::{
    ta_get_generation, ta_get_num_states, ta_session_create, ta_session_create_from_json,
    ta_session_destroy,
};
pub use simulation::{
    ta_get_updated, ta_init_ca_life, ta_init_ca_script, ta_next_frame_len, ta_run, ta_step,
    ta_stop,
};

pub const TA_OK: i32 = 0;
pub const TA_REJECTED: i32 = 1;
pub const TA_NULL_HANDLE: i32 = -1;

/// # Safety
/// `ptr` must be null or point to a live Session.
unsafe fn session_ref<'a>(ptr: *const Session) -> Option<&'a Session> {
    ptr.as_ref()
}

/// Reads `count` (dx, dy) pairs from a flat i32 array.
///
/// # Safety
/// `offsets` must point to at least `2 * count` i32 values, or be null with `count == 0`.
unsafe fn read_offsets(offsets: *const i32, count: usize) -> Option<Vec<Point>> {
    if count == 0 {
        return Some(Vec::new());
    }
    if offsets.is_null() {
        return None;
    }
    let flat = std::slice::from_raw_parts(offsets, count.checked_mul(2)?);
    Some(
        flat.chunks_exact(2)
            .map(|pair| Point::new(pair[0], pair[1]))
            .collect(),
    )
}

/// Writes one diagnostic per line into `buf`, truncated to fit and always
/// NUL-terminated. Does nothing when `buf` is null or `len` is 0.
///
/// # Safety
/// `buf` must be null or valid for `len` bytes of writes.
unsafe fn write_diagnostics(buf: *mut c_char, len: usize, diagnostics: &[Diagnostic]) {
    if buf.is_null() || len == 0 {
        return;
    }
    let text = diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("\n");
    let bytes = text.as_bytes();
    let n = bytes.len().min(len - 1);
    let out = std::slice::from_raw_parts_mut(buf as *mut u8, len);
    out[..n].copy_from_slice(&bytes[..n]);
    out[n] = 0;
}
