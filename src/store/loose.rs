//! Loose ref storage: one small text file per reference.
//!
//! Grounded on the grounding repository's `git-ref::files::loose`, with a
//! stricter parser: the distilled specification calls for rejecting
//! trailing garbage at the documented newline offset, where the grounding
//! repository's own reader trims the whole buffer before branching. Lock
//! file writing and directory-conflict checking are carried over as-is.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::RefError;
use crate::name::RefName;
use crate::oid::ObjectId;
use crate::util::lockfile::LockFile;

use super::RefState;

/// The well-known roots that live at the repository root rather than under
/// `refs/`.
const ROOT_REFS: &[&str] = &[
    "HEAD",
    "MERGE_HEAD",
    "CHERRY_PICK_HEAD",
    "REVERT_HEAD",
    "BISECT_HEAD",
    "ORIG_HEAD",
    "FETCH_HEAD",
    "AUTO_MERGE",
    "REBASE_HEAD",
];

/// The kind sniffed from a loose file's leading bytes, without a full parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LooseKind {
    Direct,
    Symbolic,
    Invalid,
}

pub fn loose_ref_path(git_dir: &Path, name: &RefName) -> PathBuf {
    git_dir.join(name.as_str())
}

/// Sniff a loose file's kind from its first few bytes, without parsing the
/// whole thing. Used by filtered enumeration to avoid paying full-parse
/// cost on every file.
pub fn sniff_kind(git_dir: &Path, name: &RefName) -> Result<LooseKind, RefError> {
    let path = loose_ref_path(git_dir, name);
    let contents = match fs::read(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LooseKind::Invalid),
        Err(e) => return Err(RefError::IoPath { path, source: e }),
    };
    if contents.starts_with(b"ref: ") {
        Ok(LooseKind::Symbolic)
    } else {
        Ok(LooseKind::Direct)
    }
}

/// Strip a trailing `\n`, or `\r\n`, from `content`. Returns `None` if
/// neither is present — the parser contract requires a newline at the
/// documented offset.
fn strip_newline(content: &[u8]) -> Option<&[u8]> {
    if let Some(stripped) = content.strip_suffix(b"\r\n") {
        Some(stripped)
    } else {
        content.strip_suffix(b"\n")
    }
}

fn parse_loose_content(name: &RefName, content: &[u8]) -> Result<RefState, RefError> {
    if let Some(rest) = content.strip_prefix(b"ref: ") {
        if content.len() < 6 {
            return Err(RefError::corrupted_loose(
                name.as_str(),
                "symbolic ref shorter than header plus newline",
            ));
        }
        let target = strip_newline(rest).ok_or_else(|| {
            RefError::corrupted_loose(name.as_str(), "missing newline after symbolic target")
        })?;
        let target_str = std::str::from_utf8(target)
            .map_err(|_| RefError::corrupted_loose(name.as_str(), "non-UTF-8 symbolic target"))?;
        let target_name = RefName::new(target_str)?;
        Ok(RefState::Symbolic(target_name))
    } else {
        if content.len() < 41 {
            return Err(RefError::corrupted_loose(
                name.as_str(),
                "direct ref shorter than 40 hex chars plus newline",
            ));
        }
        let hex = &content[..40];
        let rest = &content[40..];
        let valid_tail = rest == b"\n" || rest == b"\r\n";
        if !valid_tail {
            return Err(RefError::corrupted_loose(
                name.as_str(),
                "no newline at the documented offset after the OID",
            ));
        }
        let hex_str = std::str::from_utf8(hex)
            .map_err(|_| RefError::corrupted_loose(name.as_str(), "non-hex OID bytes"))?;
        let oid = ObjectId::from_hex(hex_str)
            .map_err(|e| RefError::corrupted_loose(name.as_str(), e.to_string()))?;
        Ok(RefState::Direct(oid))
    }
}

/// Read and fully parse a loose ref, returning its state and the file's
/// modification time, or `None` if the file does not exist.
pub fn read_loose(git_dir: &Path, name: &RefName) -> Result<Option<(RefState, SystemTime)>, RefError> {
    let path = loose_ref_path(git_dir, name);
    let contents = match fs::read(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RefError::IoPath { path, source: e }),
    };
    let mtime = fs::metadata(&path)
        .map_err(|e| RefError::IoPath {
            path: path.clone(),
            source: e,
        })?
        .modified()
        .map_err(|e| RefError::IoPath { path, source: e })?;
    let state = parse_loose_content(name, &contents)?;
    Ok(Some((state, mtime)))
}

fn write_locked(git_dir: &Path, name: &RefName, content: &[u8]) -> Result<SystemTime, RefError> {
    let path = loose_ref_path(git_dir, name);
    check_dir_file_conflict(git_dir, name)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RefError::IoPath {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let mut lock = LockFile::acquire(&path)?;
    std::io::Write::write_all(&mut lock, content).map_err(|e| RefError::IoPath {
        path: path.clone(),
        source: e,
    })?;
    lock.commit()?;

    fs::metadata(&path)
        .and_then(|m| m.modified())
        .map_err(|e| RefError::IoPath { path, source: e })
}

/// Write a direct loose ref, returning the resulting file's mtime.
pub fn write_loose_direct(git_dir: &Path, name: &RefName, oid: &ObjectId) -> Result<SystemTime, RefError> {
    let content = format!("{}\n", oid.to_hex());
    write_locked(git_dir, name, content.as_bytes())
}

/// Write a symbolic loose ref, returning the resulting file's mtime.
pub fn write_loose_symbolic(git_dir: &Path, name: &RefName, target: &RefName) -> Result<SystemTime, RefError> {
    let content = format!("ref: {target}\n");
    write_locked(git_dir, name, content.as_bytes())
}

/// Remove a loose ref file, cleaning up any now-empty parent directories
/// under `refs/`.
pub fn delete_loose(git_dir: &Path, name: &RefName) -> Result<(), RefError> {
    let path = loose_ref_path(git_dir, name);
    if !path.exists() {
        return Ok(());
    }
    fs::remove_file(&path).map_err(|e| RefError::IoPath {
        path: path.clone(),
        source: e,
    })?;

    let refs_dir = git_dir.join("refs");
    let mut dir = path.parent().map(|p| p.to_path_buf());
    while let Some(d) = dir {
        if d == refs_dir || d == *git_dir {
            break;
        }
        if fs::read_dir(&d).map(|mut e| e.next().is_none()).unwrap_or(false) {
            let _ = fs::remove_dir(&d);
            dir = d.parent().map(|p| p.to_path_buf());
        } else {
            break;
        }
    }
    Ok(())
}

/// Reject creating a ref whose path would need an existing file to become a
/// directory, or whose own path already exists as a directory.
fn check_dir_file_conflict(git_dir: &Path, name: &RefName) -> Result<(), RefError> {
    let ref_path = loose_ref_path(git_dir, name);

    let mut current = git_dir.to_path_buf();
    for component in name.as_str().split('/') {
        current = current.join(component);
        if current == ref_path {
            break;
        }
        if current.is_file() {
            return Err(RefError::invalid_target(
                name.as_str(),
                format!(
                    "'{}' exists as a file and cannot become a directory",
                    current.strip_prefix(git_dir).unwrap_or(&current).display()
                ),
            ));
        }
    }

    if ref_path.is_dir() {
        return Err(RefError::invalid_target(
            name.as_str(),
            "a directory already exists at that path",
        ));
    }

    Ok(())
}

/// Enumerate loose refs under `refs/`, plus root-level well-known refs,
/// optionally restricted to those whose normalized name starts with
/// `prefix`. Returned sorted by name.
pub fn enumerate_loose(git_dir: &Path, prefix: Option<&str>) -> Result<Vec<(RefName, PathBuf)>, RefError> {
    let refs_base = git_dir.join("refs");
    let search_dir = match prefix {
        Some(p) => {
            let sub = p.strip_prefix("refs/").unwrap_or(p);
            if sub.is_empty() {
                refs_base.clone()
            } else {
                refs_base.join(sub)
            }
        }
        None => refs_base.clone(),
    };

    let mut result = Vec::new();
    if search_dir.is_dir() {
        collect_recursive(git_dir, &search_dir, prefix, &mut result)?;
    }

    if prefix.is_none() || prefix == Some("") {
        for special in ROOT_REFS {
            let path = git_dir.join(special);
            if path.is_file() {
                if let Ok(name) = RefName::new(*special) {
                    result.push((name, path));
                }
            }
        }
    }

    result.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(result)
}

fn collect_recursive(
    git_dir: &Path,
    dir: &Path,
    prefix: Option<&str>,
    result: &mut Vec<(RefName, PathBuf)>,
) -> Result<(), RefError> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(RefError::IoPath {
                path: dir.to_path_buf(),
                source: e,
            })
        }
    };

    for entry in entries {
        let entry = entry.map_err(|e| RefError::IoPath {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();

        if path.is_dir() {
            collect_recursive(git_dir, &path, prefix, result)?;
            continue;
        }
        if !path.is_file() {
            continue;
        }

        let rel_path = match path.strip_prefix(git_dir) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let name_str = match rel_path.to_str() {
            Some(s) => s,
            None => continue,
        };
        if name_str.ends_with(".lock") {
            continue;
        }

        if let Ok(name) = RefName::new(name_str) {
            if let Some(p) = prefix {
                if !name.as_str().starts_with(p) {
                    continue;
                }
            }
            result.push((name, path));
        }
    }

    Ok(())
}
