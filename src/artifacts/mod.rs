//! Git data structures and algorithms
//!
//! This module contains the core Git types and algorithms:
//!
//! - `branch`: Branch names and revision parsing
//! - `checkout`: Checkout operations and conflict detection
//! - `core`: The error taxonomy
//! - `database`: Database entry types
//! - `diff`: Tree diffs and Myers' line diff
//! - `index`: Index/staging area data structures
//! - `objects`: Git object types (blob, tree, commit, tag)
//! - `status`: Ignore rules and working tree inspection
//! - `merge`: Merge algorithms and conflict resolution
//! - `transport`: Fetch and push protocol, packs and the daemon

pub mod branch;
pub mod checkout;
pub mod core;
pub mod database;
pub mod diff;
pub mod index;
pub mod merge;
pub mod objects;
pub mod status;
pub mod transport;
