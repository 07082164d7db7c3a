//! Plumbing commands (low-level Git operations)
//!
//! Direct access to the object database, mostly for scripting and debugging.
//!
//! ## Commands
//!
//! - `hash-object`: Compute a blob id and optionally store the blob
//! - `cat-file`: Print an object by id, id prefix or revision

pub mod cat_file;
pub mod hash_object;
