//! FFI bindings for Mood Flux
//!
//! This module provides C-compatible functions for calling the correlation
//! engine from mobile hosts. All functions use C strings (null-terminated) and
//! return allocated memory that must be freed by the caller using
//! `mood_flux_free_string`.
//!
//! Results are returned as JSON:
//! `{"result_set": {"window": ..., "results": [...]}, "rows": [...], "message": ...}`
//! where `rows` carries the display strings for each result and `message` is
//! `"Not enough data"` for an empty result set, otherwise null.

use chrono::NaiveDate;
use serde::Serialize;
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::EngineConfig;
use crate::error::CorrelationError;
use crate::format::{display_rows, ResultDisplay, NOT_ENOUGH_DATA};
use crate::orchestrator::CorrelationEngine;
use crate::store::InMemoryStore;
use crate::types::{DateWindow, ResultSet};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

#[derive(Serialize)]
struct CorrelationPayload<'a> {
    result_set: &'a ResultSet,
    rows: Vec<ResultDisplay>,
    message: Option<&'static str>,
}

fn encode_payload(result_set: &ResultSet) -> Result<String, CorrelationError> {
    let payload = CorrelationPayload {
        result_set,
        rows: display_rows(result_set),
        message: result_set.is_empty().then_some(NOT_ENOUGH_DATA),
    };
    Ok(serde_json::to_string(&payload)?)
}

fn parse_window(start: &str, end: &str) -> Result<DateWindow, CorrelationError> {
    let parse = |s: &str| {
        s.parse::<NaiveDate>()
            .map_err(|e| CorrelationError::InvalidWindow(format!("{s}: {e}")))
    };
    DateWindow::new(parse(start)?, parse(end)?)
}

/// Read a required string argument, recording an error when it is missing
unsafe fn required_arg(ptr: *const c_char, name: &str) -> Option<String> {
    let value = cstr_to_string(ptr);
    if value.is_none() {
        set_last_error(&format!("Invalid {name} string pointer"));
    }
    value
}

/// Turn a computation result into a returned C string or NULL + last error
fn finish(result: Result<String, CorrelationError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Compute habit-mood correlations for a diary export over an inclusive window.
///
/// # Safety
/// - `export_json`, `start_date` and `end_date` must be valid null-terminated C
///   strings; dates use `YYYY-MM-DD`.
/// - `config_json` may be NULL to use the default configuration.
/// - Returns a newly allocated string that must be freed with `mood_flux_free_string`.
/// - Returns NULL on error; call `mood_flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn mood_flux_correlate(
    export_json: *const c_char,
    start_date: *const c_char,
    end_date: *const c_char,
    config_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(export) = required_arg(export_json, "export JSON") else {
        return ptr::null_mut();
    };
    let Some(start) = required_arg(start_date, "start date") else {
        return ptr::null_mut();
    };
    let Some(end) = required_arg(end_date, "end date") else {
        return ptr::null_mut();
    };
    let config = cstr_to_string(config_json);

    finish((|| {
        let config = match config {
            Some(json) => EngineConfig::from_json(&json)?,
            None => EngineConfig::default(),
        };
        let engine = CorrelationEngine::with_config(config)?;
        let store = InMemoryStore::from_json(&export)?;
        let window = parse_window(&start, &end)?;
        encode_payload(&engine.compute_all(&store, &window))
    })())
}

// ============================================================================
// Stateful Engine API
// ============================================================================

/// Opaque handle to an engine with a loaded diary
pub struct MoodFluxEngineHandle {
    engine: CorrelationEngine,
    store: InMemoryStore,
}

/// Create a new engine with an empty diary.
///
/// # Safety
/// - `config_json` may be NULL to use the default configuration.
/// - Returns a pointer that must be freed with `mood_flux_engine_free`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn mood_flux_engine_new(config_json: *const c_char) -> *mut MoodFluxEngineHandle {
    clear_last_error();

    let config = match cstr_to_string(config_json) {
        Some(json) => match EngineConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        },
        None => EngineConfig::default(),
    };

    match CorrelationEngine::with_config(config) {
        Ok(engine) => Box::into_raw(Box::new(MoodFluxEngineHandle {
            engine,
            store: InMemoryStore::new(),
        })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `mood_flux_engine_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn mood_flux_engine_free(engine: *mut MoodFluxEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Replace the engine's diary with a `diary.export.v1` document.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `mood_flux_engine_new`.
/// - `export_json` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn mood_flux_engine_load(
    engine: *mut MoodFluxEngineHandle,
    export_json: *const c_char,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    let Some(export) = required_arg(export_json, "export JSON") else {
        return -1;
    };

    match InMemoryStore::from_json(&export) {
        Ok(store) => {
            (*engine).store = store;
            0
        }
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Compute correlations over the loaded diary.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `mood_flux_engine_new`.
/// - `start_date` and `end_date` must be valid null-terminated `YYYY-MM-DD` strings.
/// - Returns a newly allocated string that must be freed with `mood_flux_free_string`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn mood_flux_engine_compute(
    engine: *const MoodFluxEngineHandle,
    start_date: *const c_char,
    end_date: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let Some(start) = required_arg(start_date, "start date") else {
        return ptr::null_mut();
    };
    let Some(end) = required_arg(end_date, "end date") else {
        return ptr::null_mut();
    };

    let handle = &*engine;
    finish(
        parse_window(&start, &end)
            .and_then(|window| encode_payload(&handle.engine.compute_all(&handle.store, &window))),
    )
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Mood Flux functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Mood Flux function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn mood_flux_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Mood Flux function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn mood_flux_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Mood Flux library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn mood_flux_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
