//! uireplay Common Library
//!
//! Shared types, errors, and the selector-derivation algorithm for the
//! uireplay browser test engine.

pub mod error;
pub mod selector;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;

/// uireplay version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
