//! Grid setup, cell access, and bulk export/import.

use super::{session_ref, TA_NULL_HANDLE, TA_OK, TA_REJECTED};
use crate::automaton::{GridSnapshot, Point};
use crate::session::{CaService, Session};

/// Replaces the grid with a blank `width` x `height` one in the rule's default state.
/// Generation goes back to 0 and queued writes and frames are dropped.
///
/// # Safety
/// - `ptr` must be a valid pointer to a Session, or null
///
/// # Returns
/// 0 on success, 1 if the dimensions are not positive or too large, -1 if ptr is null.
#[no_mangle]
pub unsafe extern "C" fn ta_init_grid_blank(ptr: *const Session, width: i32, height: i32) -> i32 {
    let Some(session) = session_ref(ptr) else {
        return TA_NULL_HANDLE;
    };
    match session.init_grid_blank(width, height) {
        Ok(()) => TA_OK,
        Err(err) => {
            log::warn!("ta_init_grid_blank: {err}");
            TA_REJECTED
        }
    }
}

/// Writes the grid dimensions into `out_width` and `out_height`.
///
/// # Safety
/// - `ptr` must be a valid pointer to a Session, or null
/// - `out_width` and `out_height` must be valid for writes, or null
///
/// # Returns
/// 0 on success, -1 if any pointer is null.
#[no_mangle]
pub unsafe extern "C" fn ta_get_grid_dimensions(
    ptr: *const Session,
    out_width: *mut i32,
    out_height: *mut i32,
) -> i32 {
    let Some(session) = session_ref(ptr) else {
        return TA_NULL_HANDLE;
    };
    if out_width.is_null() || out_height.is_null() {
        return TA_NULL_HANDLE;
    }
    let (width, height) = session.scheduler().grid().dimensions();
    *out_width = width;
    *out_height = height;
    TA_OK
}

/// Gets the state of a cell. Coordinates wrap around the grid edges.
///
/// # Safety
/// - `ptr` must be a valid pointer to a Session, or null
///
/// # Returns
/// The cell state, or 0 if ptr is null.
#[no_mangle]
pub unsafe extern "C" fn ta_get_cell_state(ptr: *const Session, x: i32, y: i32) -> u32 {
    session_ref(ptr).map_or(0, |session| session.get_cell_state(Point::new(x, y)))
}

/// Queues a cell write. It lands at the next step or `ta_update_grid()`.
/// Coordinates wrap; writes made before a rule is loaded are ignored.
///
/// # Safety
/// - `ptr` must be a valid pointer to a Session, or null
#[no_mangle]
pub unsafe extern "C" fn ta_set_cell_state(ptr: *const Session, x: i32, y: i32, state: u32) {
    if let Some(session) = session_ref(ptr) {
        session.set_cell_state(Point::new(x, y), state);
    }
}

/// Counts the neighbors of (x, y) in `state` under the loaded neighborhood.
///
/// # Safety
/// - `ptr` must be a valid pointer to a Session, or null
///
/// # Returns
/// The count; 0 if ptr is null or no rule is loaded.
#[no_mangle]
pub unsafe extern "C" fn ta_get_num_neighbors(
    ptr: *const Session,
    x: i32,
    y: i32,
    state: u32,
) -> u32 {
    session_ref(ptr).map_or(0, |session| {
        session.get_num_neighbors(Point::new(x, y), state) as u32
    })
}

/// Applies queued writes immediately. With `add_to_updated` nonzero the
/// writes are also published as a frame.
///
/// # Safety
/// - `ptr` must be a valid pointer to a Session, or null
///
/// # Returns
/// The number of writes applied, -1 if ptr is null, -2 if the grid could not be written.
#[no_mangle]
pub unsafe extern "C" fn ta_update_grid(ptr: *const Session, add_to_updated: u8) -> i64 {
    let Some(session) = session_ref(ptr) else {
        return TA_NULL_HANDLE as i64;
    };
    match session.update_grid(add_to_updated != 0) {
        Ok(applied) => applied as i64,
        Err(err) => {
            log::error!("ta_update_grid: {err}");
            -2
        }
    }
}

/// Copies the whole grid into a caller-provided buffer.
///
/// # Safety
/// - `ptr` must be a valid pointer to a Session, or null
/// - `out_buf` must be valid for `buf_len` u32 writes
///
/// # Returns
/// The number of cells written (width * height), or 0 if a pointer is null or
/// the buffer is too small.
///
/// # Layout
/// Row-major: index = y * width + x.
#[no_mangle]
pub unsafe extern "C" fn ta_export_grid(
    ptr: *const Session,
    out_buf: *mut u32,
    buf_len: usize,
) -> usize {
    let Some(session) = session_ref(ptr) else {
        return 0;
    };
    if out_buf.is_null() {
        return 0;
    }

    let grid = session.scheduler().grid().read();
    let (width, height) = grid.dimensions();
    let total = width as usize * height as usize;
    if buf_len < total {
        return 0;
    }

    let out = std::slice::from_raw_parts_mut(out_buf, total);
    out.copy_from_slice(&grid.cells);
    total
}

/// Replaces the grid with `width` x `height` states read from `in_buf`.
/// Generation goes back to 0 and queued writes and frames are dropped.
///
/// # Safety
/// - `ptr` must be a valid pointer to a Session, or null
/// - `in_buf` must be valid for `width * height` u32 reads
///
/// # Returns
/// 0 on success, 1 if the dimensions are not positive or too large, -1 if a
/// pointer is null.
///
/// # Layout
/// Row-major: index = y * width + x.
#[no_mangle]
pub unsafe extern "C" fn ta_import_grid(
    ptr: *const Session,
    in_buf: *const u32,
    width: i32,
    height: i32,
) -> i32 {
    let Some(session) = session_ref(ptr) else {
        return TA_NULL_HANDLE;
    };
    if in_buf.is_null() {
        return TA_NULL_HANDLE;
    }
    let count = match GridSnapshot::cell_count(width, height) {
        Ok(count) => count,
        Err(err) => {
            log::warn!("ta_import_grid: {err}");
            return TA_REJECTED;
        }
    };

    let cells = std::slice::from_raw_parts(in_buf, count).to_vec();
    match GridSnapshot::from_cells(width, height, cells).and_then(|grid| session.init_grid(grid)) {
        Ok(()) => TA_OK,
        Err(err) => {
            log::warn!("ta_import_grid: {err}");
            TA_REJECTED
        }
    }
}
