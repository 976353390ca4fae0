//! Core error handling for the phlex runtime
//!
//! The central [`PhlexError`] type, the crate-wide [`Result`] alias, and the
//! [`ErrorContext`] extension trait live here; everything else in the crate
//! builds on top of them.

pub mod error;

pub use error::{ErrorContext, ErrorSeverity, PhlexError, Result};
