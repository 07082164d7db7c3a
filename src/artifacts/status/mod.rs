//! Working tree inspection
//!
//! - `file_change`: change categories between workspace, index and trees
//! - `ignore`: `.gitignore` rules
//! - `inspector`: detects local modifications before the working tree is rewritten

pub mod file_change;
pub mod ignore;
pub mod inspector;
