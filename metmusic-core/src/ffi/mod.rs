//! FFI bindings for native UI integration
//!
//! This module provides the interface exposed via uniffi to Swift/Kotlin.

mod player;
mod types;

pub use player::*;
pub use types::*;
