//! Error taxonomy
//!
//! Internals propagate `anyhow::Error` with context, the same way the rest of the
//! crate does. Whenever a failure has a meaning the caller must act on, it is raised
//! as a [`BitError`] wrapped in `anyhow`, and the porcelain layer recovers the typed
//! error by downcasting (see the `From<anyhow::Error>` impl below).

use crate::artifacts::objects::object_id::ObjectId;
use std::path::PathBuf;
use thiserror::Error;

/// Result type returned by every public repository operation
pub type BitResult<T> = Result<T, BitError>;

#[derive(Debug, Error)]
pub enum BitError {
    /// Missing ref, path or revision
    #[error("not found: {0}")]
    NotFound(String),

    /// An object id is referenced but the object is absent from the store
    #[error("object {0} is missing from the object database")]
    ObjectMissing(ObjectId),

    /// Lost a compare-and-swap race, or the working tree is not in sync
    #[error("conflict: {0}")]
    Conflict(String),

    /// Non-fast-forward push or a ref update refused by the remote
    #[error("rejected: {0}")]
    Rejected(String),

    /// Merge stopped with unresolved paths left staged in the index
    #[error("merge conflict in {count} path(s): {list}", count = .paths.len(), list = display_paths(.paths))]
    MergeConflict { paths: Vec<PathBuf> },

    /// Stored bytes fail their integrity check
    #[error("corrupt: {0}")]
    Corrupt(String),

    /// Network or protocol failure talking to a remote
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Duplicate branch or tag
    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error(transparent)]
    Internal(anyhow::Error),
}

impl BitError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BitError::NotFound(_) | BitError::ObjectMissing(_))
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<anyhow::Error> for BitError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<BitError>() {
            Ok(error) => error,
            Err(error) => match error.downcast::<std::io::Error>() {
                Ok(io_error) if io_error.kind() == std::io::ErrorKind::NotFound => {
                    BitError::NotFound(io_error.to_string())
                }
                Ok(io_error) => BitError::Internal(io_error.into()),
                Err(error) => BitError::Internal(error),
            },
        }
    }
}

impl From<std::io::Error> for BitError {
    fn from(error: std::io::Error) -> Self {
        BitError::Internal(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use pretty_assertions::assert_eq;

    #[test]
    fn typed_error_survives_anyhow_context() {
        let result: anyhow::Result<()> =
            Err(BitError::Conflict("refs/heads/master".to_string())).context("while committing");

        let error: BitError = result.unwrap_err().into();
        assert!(matches!(error, BitError::Conflict(name) if name == "refs/heads/master"));
    }

    #[test]
    fn untyped_error_becomes_internal() {
        let error: BitError = anyhow::anyhow!("boom").into();
        assert!(matches!(error, BitError::Internal(_)));
    }

    #[test]
    fn merge_conflict_lists_paths() {
        let error = BitError::MergeConflict {
            paths: vec![PathBuf::from("a.txt"), PathBuf::from("b/c.txt")],
        };
        assert_eq!(
            error.to_string(),
            "merge conflict in 2 path(s): a.txt, b/c.txt"
        );
    }
}
