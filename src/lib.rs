//! Reference backend for a content-addressed version-control repository.
//!
//! This crate stores branches, tags, and `HEAD` as either loose files (one
//! per ref, under the repository directory) or consolidated in a single
//! `packed-refs` file, and exposes a single Unified Reference API
//! (`FileRefStore`) over both: lookup, existence, creation, update,
//! deletion, rename, symbolic resolution, and enumeration. `pack_all`
//! compacts loose refs into `packed-refs`.
//!
//! The object database and the reflog subsystem are external collaborators
//! this crate only talks to through narrow traits ([`ObjectDatabase`],
//! [`ReflogSink`]); it does not implement either of them.

mod error;
mod name;
mod odb;
mod oid;
mod reflog;
mod store;
mod util;

pub use error::RefError;
pub use name::{normalize_name, normalize_name_oid, RefName, MAX_NAME};
pub use odb::{InMemoryOdb, ObjectDatabase, ObjectKind};
pub use oid::{HashError, ObjectId};
pub use reflog::{reflog_path, FileReflogSink, ReflogSink};
pub use store::loose::LooseKind;
pub use store::packed::{PackedEntry, PackedCache};
pub use store::{EnumFlags, FileRefStore, RefHandle, RefState, Source, MAX_NESTING_LEVEL};
pub use util::lockfile::{LockError, LockFile};
pub use util::signature::{GitTimestamp, Signature, SignatureError};
