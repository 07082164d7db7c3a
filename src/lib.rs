//! An embeddable Git repository engine.
//!
//! The crate is split the same way Git itself is:
//!
//! - `areas`: the on-disk parts of a repository (object database, refs, index,
//!   workspace, config) and the [`Repository`](areas::repository::Repository) handle tying them together
//! - `artifacts`: data structures and algorithms (objects, trees, diffs, merge, transfer protocol)
//! - `commands`: plumbing and porcelain operations implemented on the repository handle

pub mod areas;
pub mod artifacts;
pub mod commands;

pub use areas::repository::Repository;
pub use artifacts::core::errors::{BitError, BitResult};
pub use artifacts::transport::credentials::{CredentialProvider, Credentials};
pub use commands::porcelain::reset::ResetMode;
