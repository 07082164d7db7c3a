//! Merging
//!
//! - `bca_finder`: best common ancestor search over the commit graph
//! - `diff3`: line-based three-way merge of file content
//! - `resolve`: path-by-path three-way merge of trees

pub mod bca_finder;
pub mod diff3;
pub mod resolve;
