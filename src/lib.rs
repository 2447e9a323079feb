//! Mood Flux - On-device habit-mood correlation engine
//!
//! Mood Flux measures how strongly each tracked habit co-varies with daily mood
//! over a date window through a deterministic pipeline: series assembly →
//! rank transform → Spearman estimation → significance testing → ordering.
//!
//! ## Modules
//!
//! - **Correlation Engine**: one synchronous pass over a diary store for a window
//! - **Correlation Service**: async recomputation driven by window and store changes,
//!   published as observable snapshots

pub mod assembler;
pub mod config;
pub mod error;
pub mod estimator;
pub mod format;
pub mod orchestrator;
pub mod rank;
pub mod schema;
pub mod service;
pub mod significance;
pub mod store;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::EngineConfig;
pub use error::CorrelationError;
pub use orchestrator::CorrelationEngine;
pub use service::{CorrelationService, CorrelationSnapshot};
pub use store::{DiaryStore, InMemoryStore};
pub use types::{
    ChangeAction, CorrelationResult, DateWindow, HabitDefinition, HabitKind, MoodLevel,
    MoodRecord, PairedSeries, ProgressRecord, ResultSet, StoreChange,
};

// Presentation exports
pub use format::{format_coefficient, format_p_value, ResultDisplay};

// Schema exports
pub use schema::{DiaryExport, SCHEMA_VERSION};

/// Mood Flux library version
pub const MOOD_FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");
