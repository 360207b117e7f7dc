use std::path::PathBuf;

use crate::oid::ObjectId;

/// Errors produced by the reference backend.
///
/// One flat enum per the grounding repository's convention (see
/// `git-ref::RefError` / `git-utils::UtilError`): every failure mode named
/// in the specification gets its own variant, with `#[source]`-carrying
/// path-aware I/O variants for anything that touches the filesystem.
#[derive(Debug, thiserror::Error)]
pub enum RefError {
    #[error("ref not found: {0}")]
    NotFound(String),

    #[error("invalid ref name: {0}")]
    InvalidName(String),

    #[error("ref already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid target for '{name}': {reason}")]
    InvalidTarget { name: String, reason: String },

    #[error("corrupted loose ref '{name}': {reason}")]
    CorruptedLoose { name: String, reason: String },

    #[error("packed-refs corrupt: {0}")]
    PackedRefsCorrupt(String),

    #[error("symbolic resolution of '{0}' exceeded the nesting bound")]
    TooNested(String),

    #[error("I/O error on {path}: {source}")]
    IoPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Lock(#[from] crate::util::lockfile::LockError),

    #[error("invalid hex object id: {0}")]
    Hash(#[from] crate::oid::HashError),
}

impl RefError {
    pub(crate) fn invalid_target(name: &str, reason: impl Into<String>) -> Self {
        RefError::InvalidTarget {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupted_loose(name: &str, reason: impl Into<String>) -> Self {
        RefError::CorruptedLoose {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience used by callers that want to assert an OID was checked
/// against the object database; not a variant by itself since the failure
/// is always reported as `InvalidTarget`.
pub(crate) fn target_missing(name: &str, oid: &ObjectId) -> RefError {
    RefError::invalid_target(name, format!("object {oid} does not exist in the object database"))
}
