//! Session creation, destruction, and read-only queries.

use std::ffi::{c_char, CStr};

use super::session_ref;
use crate::config::SimConfig;
use crate::session::{CaService, Session};

fn create(config: SimConfig) -> *mut Session {
    match Session::new(config) {
        Ok(session) => Box::into_raw(Box::new(session)),
        Err(err) => {
            log::error!("failed to create session: {err}");
            std::ptr::null_mut()
        }
    }
}

/// Creates a session with a blank `width` x `height` grid and no rule.
///
/// `worker_threads` sizes the evaluation pool; 0 uses every available core.
///
/// # Returns
/// A pointer to a new Session, or null if the dimensions are invalid or the
/// worker pool could not be built.
///
/// # Safety
/// The returned pointer must eventually be freed with `ta_session_destroy()`.
#[no_mangle]
pub extern "C" fn ta_session_create(width: i32, height: i32, worker_threads: u32) -> *mut Session {
    create(SimConfig {
        grid_width: width,
        grid_height: height,
        worker_threads: worker_threads as usize,
        ..SimConfig::default()
    })
}

/// Creates a session from a JSON configuration. Missing fields take their defaults.
///
/// # Safety
/// - `json` must be a valid NUL-terminated string, or null
///
/// # Returns
/// A pointer to a new Session, or null if `json` is null, malformed or invalid.
#[no_mangle]
pub unsafe extern "C" fn ta_session_create_from_json(json: *const c_char) -> *mut Session {
    if json.is_null() {
        return std::ptr::null_mut();
    }
    let Ok(text) = CStr::from_ptr(json).to_str() else {
        log::warn!("session config is not valid UTF-8");
        return std::ptr::null_mut();
    };
    match SimConfig::from_json(text) {
        Ok(config) => create(config),
        Err(err) => {
            log::warn!("rejected session config: {err}");
            std::ptr::null_mut()
        }
    }
}

/// Destroys a session, stopping its simulation loop first.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by `ta_session_create*()`, or null
/// - `ptr` must not be used after this call
#[no_mangle]
pub unsafe extern "C" fn ta_session_destroy(ptr: *mut Session) {
    if !ptr.is_null() {
        drop(Box::from_raw(ptr));
    }
}

/// Gets the current generation counter.
///
/// # Safety
/// - `ptr` must be a valid pointer to a Session, or null
///
/// # Returns
/// The generation counter, or 0 if ptr is null.
#[no_mangle]
pub unsafe extern "C" fn ta_get_generation(ptr: *const Session) -> u64 {
    session_ref(ptr).map_or(0, |session| session.get_generation())
}

/// Gets the state count of the loaded rule (2 before any rule is loaded).
///
/// # Safety
/// - `ptr` must be a valid pointer to a Session, or null
///
/// # Returns
/// The state count, or 0 if ptr is null.
#[no_mangle]
pub unsafe extern "C" fn ta_get_num_states(ptr: *const Session) -> u32 {
    session_ref(ptr).map_or(0, |session| session.get_num_states())
}
