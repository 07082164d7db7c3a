//! Command implementations on the repository handle
//!
//! - `plumbing`: low-level object access (hash-object, cat-file)
//! - `porcelain`: the version control workflows (commit, merge, push, ...)

pub mod plumbing;
pub mod porcelain;
