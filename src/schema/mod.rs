//! Unified diary.export.v1 schema
//!
//! This module defines the JSON interchange document used to hand a diary
//! snapshot to the engine when the host does not implement a store natively.

mod export;

pub use export::*;
