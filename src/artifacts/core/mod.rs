//! Core utilities and shared types
//!
//! - `errors`: the error taxonomy returned by every public repository operation

pub mod errors;
