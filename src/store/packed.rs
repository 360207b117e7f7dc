//! The packed-refs file: parser, writer, and an mtime-gated in-memory cache.
//!
//! Grounded on the grounding repository's `git-ref::files::packed`, with
//! two additions the distilled specification requires and the grounding
//! repository's parser does not enforce: a peel line is only legal
//! immediately after a ref line under `refs/tags/`, and the cache is
//! mtime-gated rather than re-read unconditionally on every access.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::RefError;
use crate::name::RefName;
use crate::oid::ObjectId;
use crate::util::lockfile::LockFile;

/// One packed reference: its OID, an optional peeled OID (tags only), and
/// whether it was folded in from a loose file during compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedEntry {
    pub oid: ObjectId,
    pub peeled: Option<ObjectId>,
    pub was_loose: bool,
}

impl PackedEntry {
    pub fn new(oid: ObjectId) -> Self {
        Self {
            oid,
            peeled: None,
            was_loose: false,
        }
    }
}

/// In-memory view of `packed-refs`, refreshed only when the file's mtime
/// changes since the last successful load.
#[derive(Debug, Default)]
pub struct PackedCache {
    entries: HashMap<RefName, PackedEntry>,
    mtime: Option<SystemTime>,
    loaded: bool,
}

pub fn packed_refs_path(git_dir: &Path) -> PathBuf {
    git_dir.join("packed-refs")
}

impl PackedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, name: &RefName) -> Option<&PackedEntry> {
        self.entries.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The packed-refs file's mtime as of the last successful load or write.
    pub(crate) fn mtime(&self) -> Option<SystemTime> {
        self.mtime
    }

    pub fn entries(&self) -> impl Iterator<Item = (&RefName, &PackedEntry)> {
        self.entries.iter()
    }

    pub fn upsert(&mut self, name: RefName, entry: PackedEntry) {
        self.entries.insert(name, entry);
    }

    /// A snapshot of the current entries, for building a candidate map that
    /// can be discarded without mutating the cache (used by `pack_all`).
    pub(crate) fn snapshot(&self) -> HashMap<RefName, PackedEntry> {
        self.entries.clone()
    }

    /// Replace the cache's entries wholesale, without touching disk.
    pub(crate) fn replace_entries(&mut self, entries: HashMap<RefName, PackedEntry>) {
        self.entries = entries;
    }

    pub fn remove(&mut self, name: &RefName) -> Option<PackedEntry> {
        self.entries.remove(name)
    }

    /// Stat `packed-refs`; re-parse only if its mtime changed since the last
    /// successful load, or this is the first load. Absence clears the
    /// cache without error. A parse failure discards any partial state and
    /// surfaces the error, leaving the cache empty.
    pub fn load(&mut self, git_dir: &Path) -> Result<(), RefError> {
        let path = packed_refs_path(git_dir);
        let meta = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.entries.clear();
                self.mtime = None;
                self.loaded = true;
                return Ok(());
            }
            Err(e) => return Err(RefError::IoPath { path, source: e }),
        };
        let mtime = meta
            .modified()
            .map_err(|e| RefError::IoPath { path: path.clone(), source: e })?;

        if self.loaded && self.mtime == Some(mtime) {
            return Ok(());
        }

        let data = fs::read(&path).map_err(|e| RefError::IoPath {
            path: path.clone(),
            source: e,
        })?;

        match parse(&data) {
            Ok(entries) => {
                self.entries = entries;
                self.mtime = Some(mtime);
                self.loaded = true;
                Ok(())
            }
            Err(e) => {
                self.entries.clear();
                self.mtime = None;
                self.loaded = false;
                Err(e)
            }
        }
    }

    /// Serialize the cache sorted by name and commit it atomically,
    /// updating the cached mtime to match.
    pub fn write(&mut self, git_dir: &Path) -> Result<(), RefError> {
        let mut sorted: Vec<(&RefName, &PackedEntry)> = self.entries.iter().collect();
        sorted.sort_by(|a, b| a.0.as_bstr().cmp(b.0.as_bstr()));

        let mut buf = Vec::new();
        buf.extend_from_slice(b"# pack-refs with: peeled fully-peeled sorted\n");
        for (name, entry) in sorted {
            buf.extend_from_slice(entry.oid.to_hex().as_bytes());
            buf.push(b' ');
            buf.extend_from_slice(name.as_bstr());
            buf.push(b'\n');
            if let Some(peel) = entry.peeled {
                buf.push(b'^');
                buf.extend_from_slice(peel.to_hex().as_bytes());
                buf.push(b'\n');
            }
        }

        let path = packed_refs_path(git_dir);
        let mut lock = LockFile::acquire(&path)?;
        std::io::Write::write_all(&mut lock, &buf).map_err(|e| RefError::IoPath {
            path: path.clone(),
            source: e,
        })?;
        lock.commit()?;

        let mtime = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|e| RefError::IoPath { path, source: e })?;
        self.mtime = Some(mtime);
        self.loaded = true;
        Ok(())
    }
}

fn corrupt(reason: impl Into<String>) -> RefError {
    RefError::PackedRefsCorrupt(reason.into())
}

fn parse(data: &[u8]) -> Result<HashMap<RefName, PackedEntry>, RefError> {
    if data.is_empty() {
        return Ok(HashMap::new());
    }
    if !data.ends_with(b"\n") {
        return Err(corrupt("file does not end with a newline"));
    }

    let mut entries = HashMap::new();
    let mut last_ref_name: Option<RefName> = None;

    for raw_line in data.split(|&b| b == b'\n') {
        if raw_line.is_empty() {
            continue;
        }
        let line = raw_line.strip_suffix(b"\r").unwrap_or(raw_line);
        if line.is_empty() {
            continue;
        }

        if line[0] == b'#' {
            last_ref_name = None;
            continue;
        }

        if line[0] == b'^' {
            let hex = &line[1..];
            if hex.len() != 40 {
                return Err(corrupt("truncated peel OID"));
            }
            let hex_str = std::str::from_utf8(hex).map_err(|_| corrupt("non-hex peel OID"))?;
            let peeled = ObjectId::from_hex(hex_str).map_err(|e| corrupt(e.to_string()))?;

            let name = last_ref_name
                .take()
                .ok_or_else(|| corrupt("peel line without an immediately preceding ref line"))?;
            if !name.is_tag() {
                return Err(corrupt(format!(
                    "peel line after non-tag ref '{name}'"
                )));
            }
            if let Some(entry) = entries.get_mut(&name) {
                entry.peeled = Some(peeled);
            }
            continue;
        }

        // ref line: <40-hex> <SP> <name>
        if line.len() < 42 {
            return Err(corrupt("ref line too short"));
        }
        let hex = &line[..40];
        if line[40] != b' ' {
            return Err(corrupt("missing space after OID"));
        }
        let name_bytes = &line[41..];

        let hex_str = std::str::from_utf8(hex).map_err(|_| corrupt("non-hex OID"))?;
        let oid = ObjectId::from_hex(hex_str).map_err(|e| corrupt(e.to_string()))?;
        let name_str = std::str::from_utf8(name_bytes).map_err(|_| corrupt("non-UTF-8 ref name"))?;
        let name = RefName::new_oid_ref(name_str.as_bytes())
            .map_err(|_| corrupt(format!("invalid ref name '{name_str}'")))?;

        entries.insert(name.clone(), PackedEntry::new(oid));
        last_ref_name = Some(name);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(hex: &str) -> ObjectId {
        ObjectId::from_hex(hex).unwrap()
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PackedCache::new();
        cache.load(dir.path()).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn parse_with_peel() {
        let data = b"# pack-refs with: peeled\n\
1111111111111111111111111111111111111111 refs/heads/dev\n\
2222222222222222222222222222222222222222 refs/tags/v1\n\
^3333333333333333333333333333333333333333\n";
        let dir = tempfile::tempdir().unwrap();
        fs::write(packed_refs_path(dir.path()), data).unwrap();

        let mut cache = PackedCache::new();
        cache.load(dir.path()).unwrap();

        let dev = RefName::new_oid_ref(b"refs/heads/dev").unwrap();
        let tag = RefName::new_oid_ref(b"refs/tags/v1").unwrap();
        assert_eq!(cache.find(&dev).unwrap().peeled, None);
        assert_eq!(
            cache.find(&tag).unwrap().peeled,
            Some(oid("3333333333333333333333333333333333333333"))
        );
    }

    #[test]
    fn peel_after_non_tag_is_corrupt() {
        let data = b"# pack-refs with: peeled\n\
1111111111111111111111111111111111111111 refs/heads/dev\n\
^3333333333333333333333333333333333333333\n";
        let dir = tempfile::tempdir().unwrap();
        fs::write(packed_refs_path(dir.path()), data).unwrap();

        let mut cache = PackedCache::new();
        assert!(matches!(
            cache.load(dir.path()),
            Err(RefError::PackedRefsCorrupt(_))
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn upsert_find_remove() {
        let mut cache = PackedCache::new();
        let name = RefName::new_oid_ref(b"refs/heads/main").unwrap();
        let entry = PackedEntry::new(oid("da39a3ee5e6b4b0d3255bfef95601890afd80709"));

        cache.upsert(name.clone(), entry);
        assert!(cache.find(&name).is_some());
        assert_eq!(cache.remove(&name), Some(entry));
        assert!(cache.find(&name).is_none());
    }

    #[test]
    fn write_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PackedCache::new();
        let a = RefName::new_oid_ref(b"refs/heads/a").unwrap();
        let b = RefName::new_oid_ref(b"refs/heads/b").unwrap();
        cache.upsert(a.clone(), PackedEntry::new(oid("1111111111111111111111111111111111111111")));
        cache.upsert(b.clone(), PackedEntry::new(oid("2222222222222222222222222222222222222222")));
        cache.write(dir.path()).unwrap();

        let mut reloaded = PackedCache::new();
        reloaded.load(dir.path()).unwrap();
        assert_eq!(reloaded.find(&a), cache.find(&a));
        assert_eq!(reloaded.find(&b), cache.find(&b));
    }

    #[test]
    fn write_output_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PackedCache::new();
        cache.upsert(
            RefName::new_oid_ref(b"refs/heads/zzz").unwrap(),
            PackedEntry::new(oid("1111111111111111111111111111111111111111")),
        );
        cache.upsert(
            RefName::new_oid_ref(b"refs/heads/aaa").unwrap(),
            PackedEntry::new(oid("2222222222222222222222222222222222222222")),
        );
        cache.write(dir.path()).unwrap();

        let contents = fs::read_to_string(packed_refs_path(dir.path())).unwrap();
        let lines: Vec<&str> = contents.lines().filter(|l| !l.starts_with('#')).collect();
        assert!(lines[0].ends_with("refs/heads/aaa"));
        assert!(lines[1].ends_with("refs/heads/zzz"));
    }

    #[test]
    fn reload_is_skipped_when_mtime_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PackedCache::new();
        cache.upsert(
            RefName::new_oid_ref(b"refs/heads/a").unwrap(),
            PackedEntry::new(oid("1111111111111111111111111111111111111111")),
        );
        cache.write(dir.path()).unwrap();
        cache.load(dir.path()).unwrap();

        // Mutate the map in-memory without touching disk; since mtime is
        // unchanged, reload must be a no-op and must not clear our entry.
        cache.load(dir.path()).unwrap();
        assert!(!cache.is_empty());
    }
}
