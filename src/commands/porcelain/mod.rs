//! Porcelain commands (user-facing Git operations)
//!
//! Each command is implemented as methods on [`Repository`](crate::Repository)
//! and returns [`BitResult`](crate::BitResult). Ref updates are always the
//! final step of a command, so a failure leaves the refs as they were.
//!
//! ## Commands
//!
//! - `init`, `clone`: Create a repository, empty or from a remote
//! - `add`: Stage every change in the working tree
//! - `commit`: Record the index as a new commit
//! - `branch`, `checkout`: Create and switch branches
//! - `merge`: Three-way merge of another branch
//! - `reset`, `clean`: Rewind the branch, index and working tree; drop untracked files
//! - `tag`: Lightweight and annotated tags
//! - `fetch`, `pull`, `push`: Exchange objects and refs with a remote

pub mod add;
pub mod branch;
pub mod checkout;
pub mod clean;
pub mod clone;
pub mod commit;
pub mod fetch;
pub mod init;
pub mod merge;
pub mod pull;
pub mod push;
pub mod reset;
pub mod tag;
