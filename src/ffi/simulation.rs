//! Rule loading, stepping, the background loop, and frame retrieval.

use std::ffi::{c_char, CStr};

use super::{read_offsets, session_ref, write_diagnostics, TA_NULL_HANDLE, TA_OK, TA_REJECTED};
use crate::automaton::{Cell, RunStatus, StepOutcome, StopStatus};
use crate::error::{CompileError, Diagnostic};
use crate::rule::{moore_neighborhood, RuleBody, RuleSpec};
use crate::session::{CaService, Session};

unsafe fn read_text<'a>(text: *const c_char) -> Result<&'a str, CompileError> {
    CStr::from_ptr(text)
        .to_str()
        .map_err(|_| CompileError::single(Diagnostic::general("rule text is not valid UTF-8")))
}

unsafe fn load(
    session: &Session,
    spec: Result<RuleSpec, CompileError>,
    err_buf: *mut c_char,
    err_len: usize,
) -> i32 {
    match spec.and_then(|spec| session.init_ca(spec)) {
        Ok(report) => {
            if report.downgraded() {
                log::info!("rule has fewer states; grid was reset");
            }
            write_diagnostics(err_buf, err_len, &[]);
            TA_OK
        }
        Err(err) => {
            write_diagnostics(err_buf, err_len, &err.diagnostics);
            TA_REJECTED
        }
    }
}

/// Compiles and loads a rule script.
///
/// `offsets` holds `offset_count` (dx, dy) pairs. If the new rule has fewer
/// states than the current one the grid is reset to its default state.
///
/// # Safety
/// - `ptr` must be a valid pointer to a Session, or null
/// - `offsets` must point to `2 * offset_count` i32 values (may be null when the count is 0)
/// - `source` must be a valid NUL-terminated string
/// - `err_buf` must be valid for `err_len` bytes, or null
///
/// # Returns
/// 0 if loaded, 1 if rejected (diagnostics written to `err_buf`, one per
/// line), -1 if ptr, source or offsets is null. On rejection the previous rule stays active.
#[no_mangle]
pub unsafe extern "C" fn ta_init_ca_script(
    ptr: *const Session,
    num_states: u32,
    default_state: u32,
    offsets: *const i32,
    offset_count: usize,
    source: *const c_char,
    err_buf: *mut c_char,
    err_len: usize,
) -> i32 {
    let Some(session) = session_ref(ptr) else {
        return TA_NULL_HANDLE;
    };
    if source.is_null() {
        return TA_NULL_HANDLE;
    }
    let Some(neighborhood) = read_offsets(offsets, offset_count) else {
        return TA_NULL_HANDLE;
    };

    let spec = read_text(source).map(|text| {
        RuleSpec::new(
            num_states,
            default_state,
            neighborhood,
            RuleBody::Script(text.to_string()),
        )
    });
    load(session, spec, err_buf, err_len)
}

/// Loads a two-state birth/survival rule such as `B3/S23`.
///
/// With `offset_count` 0 the 3x3 Moore neighborhood is used.
///
/// # Safety
/// - `ptr` must be a valid pointer to a Session, or null
/// - `rule` must be a valid NUL-terminated string
/// - `offsets` must point to `2 * offset_count` i32 values (may be null when the count is 0)
/// - `err_buf` must be valid for `err_len` bytes, or null
///
/// # Returns
/// 0 if loaded, 1 if the rule string is malformed, -1 if a required pointer is null.
#[no_mangle]
pub unsafe extern "C" fn ta_init_ca_life(
    ptr: *const Session,
    rule: *const c_char,
    offsets: *const i32,
    offset_count: usize,
    err_buf: *mut c_char,
    err_len: usize,
) -> i32 {
    let Some(session) = session_ref(ptr) else {
        return TA_NULL_HANDLE;
    };
    if rule.is_null() {
        return TA_NULL_HANDLE;
    }
    let neighborhood = if offset_count == 0 {
        moore_neighborhood(false)
    } else {
        match read_offsets(offsets, offset_count) {
            Some(points) => points,
            None => return TA_NULL_HANDLE,
        }
    };

    let spec = read_text(rule)
        .and_then(RuleBody::life_like)
        .map(|body| RuleSpec::new(2, 0, neighborhood, body));
    load(session, spec, err_buf, err_len)
}

/// Advances one generation on the calling thread.
///
/// # Safety
/// - `ptr` must be a valid pointer to a Session, or null
///
/// # Returns
/// 0 if a generation was computed, 1 if no rule is loaded, -1 if ptr is null,
/// -2 if the step failed.
#[no_mangle]
pub unsafe extern "C" fn ta_step(ptr: *const Session) -> i32 {
    let Some(session) = session_ref(ptr) else {
        return TA_NULL_HANDLE;
    };
    match session.step() {
        Ok(StepOutcome::Advanced { .. }) => TA_OK,
        Ok(StepOutcome::NoRule) => TA_REJECTED,
        Err(err) => {
            log::error!("ta_step: {err}");
            -2
        }
    }
}

/// Starts stepping on a background thread. With `throttled` nonzero the loop
/// keeps a shorter frame backlog.
///
/// # Safety
/// - `ptr` must be a valid pointer to a Session, or null
///
/// # Returns
/// 0 if started, 1 if no rule is loaded, 2 if already running, -1 if ptr is
/// null, -2 if the thread could not be started.
#[no_mangle]
pub unsafe extern "C" fn ta_run(ptr: *const Session, throttled: u8) -> i32 {
    let Some(session) = session_ref(ptr) else {
        return TA_NULL_HANDLE;
    };
    match session.run(throttled != 0) {
        Ok(RunStatus::Started) => TA_OK,
        Ok(RunStatus::NoRule) => TA_REJECTED,
        Ok(RunStatus::AlreadyRunning) => 2,
        Err(err) => {
            log::error!("ta_run: {err}");
            -2
        }
    }
}

/// Stops the background loop, blocking until its current step has finished.
///
/// # Safety
/// - `ptr` must be a valid pointer to a Session, or null
///
/// # Returns
/// 0 if a loop was stopped, 1 if none was running, -1 if ptr is null.
#[no_mangle]
pub unsafe extern "C" fn ta_stop(ptr: *const Session) -> i32 {
    let Some(session) = session_ref(ptr) else {
        return TA_NULL_HANDLE;
    };
    match session.stop() {
        StopStatus::Stopped => TA_OK,
        StopStatus::AlreadyStopped => TA_REJECTED,
    }
}

/// Gets the cell count of the next frame without removing it.
///
/// # Safety
/// - `ptr` must be a valid pointer to a Session, or null
///
/// # Returns
/// The cell count, or -1 if ptr is null or no frame is ready.
#[no_mangle]
pub unsafe extern "C" fn ta_next_frame_len(ptr: *const Session) -> i64 {
    session_ref(ptr)
        .and_then(|session| session.next_frame_len())
        .map_or(-1, |len| len as i64)
}

/// Pops the next frame into `out_cells`. Never blocks.
///
/// If the frame does not fit it stays queued; size the buffer with
/// `ta_next_frame_len()` and call again.
///
/// # Safety
/// - `ptr` must be a valid pointer to a Session, or null
/// - `out_cells` must be valid for `capacity` Cell writes, or null with capacity 0
/// - `out_generation` must be valid for one write, or null
///
/// # Returns
/// The number of cells copied (0 for an empty frame), -1 if ptr is null,
/// -2 if no frame is ready, -3 if the buffer is too small.
///
/// # Layout
/// Each Cell is `{ int32_t x; int32_t y; uint32_t state; }`, in apply order.
#[no_mangle]
pub unsafe extern "C" fn ta_get_updated(
    ptr: *const Session,
    out_cells: *mut Cell,
    capacity: usize,
    out_generation: *mut u64,
) -> i64 {
    let Some(session) = session_ref(ptr) else {
        return TA_NULL_HANDLE as i64;
    };
    let capacity = if out_cells.is_null() { 0 } else { capacity };

    let Some(frame) = session.next_frame_if(|frame| frame.len() <= capacity) else {
        return if session.next_frame_len().is_some() { -3 } else { -2 };
    };
    if !out_generation.is_null() {
        *out_generation = frame.generation();
    }
    if !frame.is_empty() {
        let out = std::slice::from_raw_parts_mut(out_cells, frame.len());
        out.copy_from_slice(frame.cells());
    }
    frame.len() as i64
}
