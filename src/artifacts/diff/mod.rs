//! Diffing
//!
//! - `myers`: Myers' diff over line sequences, used by the three-way merge
//! - `tree_diff`: path-level changes between two trees

pub mod myers;
pub mod tree_diff;
