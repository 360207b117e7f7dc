//! Reflog filename maintenance.
//!
//! The reflog subsystem itself — reading history, `@{n}`/`@{date}`
//! resolution, expiry — is an external collaborator out of scope here. The
//! ref backend still owns two small duties: appending one line whenever a
//! mutating operation changes a ref's value, and renaming a reflog file
//! alongside its ref. This module exposes exactly those two operations,
//! trimmed from the grounding repository's full `git-ref::reflog` module
//! down to the append/rename surface the Unified Reference API needs.

use std::fs;
use std::path::{Path, PathBuf};

use bstr::BString;

use crate::error::RefError;
use crate::name::RefName;
use crate::oid::ObjectId;
use crate::util::signature::Signature;

/// Drives the two reflog-adjacent duties the Unified Reference API performs
/// on every mutating call: appending a line recording the change, and
/// carrying a ref's history file along on rename.
pub trait ReflogSink {
    fn append(
        &self,
        git_dir: &Path,
        name: &RefName,
        old: ObjectId,
        new: ObjectId,
        identity: &Signature,
        message: &str,
    ) -> Result<(), RefError>;

    fn rename(&self, git_dir: &Path, old_name: &RefName, new_name: &RefName) -> Result<(), RefError>;
}

/// File-backed default implementation, one log per ref under `logs/`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileReflogSink;

pub fn reflog_path(git_dir: &Path, name: &RefName) -> PathBuf {
    git_dir.join("logs").join(name.as_str())
}

/// Format one reflog line: `<old> <new> <identity>\t<message>\n`.
fn format_line(old: ObjectId, new: ObjectId, identity: &Signature, message: &str) -> BString {
    let mut out = Vec::with_capacity(128 + message.len());
    out.extend_from_slice(old.to_hex().as_bytes());
    out.push(b' ');
    out.extend_from_slice(new.to_hex().as_bytes());
    out.push(b' ');
    out.extend_from_slice(&identity.to_bytes());
    out.push(b'\t');
    out.extend_from_slice(message.as_bytes());
    out.push(b'\n');
    BString::from(out)
}

impl ReflogSink for FileReflogSink {
    fn append(
        &self,
        git_dir: &Path,
        name: &RefName,
        old: ObjectId,
        new: ObjectId,
        identity: &Signature,
        message: &str,
    ) -> Result<(), RefError> {
        let path = reflog_path(git_dir, name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| RefError::IoPath {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let line = format_line(old, new, identity, message);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| RefError::IoPath {
                path: path.clone(),
                source: e,
            })?;
        std::io::Write::write_all(&mut file, &line).map_err(|e| RefError::IoPath { path, source: e })
    }

    fn rename(&self, git_dir: &Path, old_name: &RefName, new_name: &RefName) -> Result<(), RefError> {
        let old_path = reflog_path(git_dir, old_name);
        if !old_path.exists() {
            return Ok(());
        }
        let new_path = reflog_path(git_dir, new_name);
        if let Some(parent) = new_path.parent() {
            fs::create_dir_all(parent).map_err(|e| RefError::IoPath {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        fs::rename(&old_path, &new_path).map_err(|e| RefError::IoPath {
            path: old_path,
            source: e,
        })
    }
}
