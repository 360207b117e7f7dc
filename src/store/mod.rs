//! The Unified Reference API: lookup-merge logic over the loose and packed
//! stores, creation, update, deletion, rename, symbolic resolution, and
//! enumeration.
//!
//! Grounded on the grounding repository's `git-ref::files::FilesRefStore`
//! (the lookup/iterate/transaction-commit logic) and `git-ref::store`
//! (the `RefStore` trait shape), adapted to the simpler non-transactional
//! API the specification names — this crate does not port the grounding
//! repository's multi-ref CAS transaction machinery, since cross-ref atomic
//! updates are an explicit non-goal here.

pub mod loose;
pub mod packed;
pub mod packer;

use std::cell::RefCell;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::error::RefError;
use crate::name::{normalize_name, normalize_name_oid, RefName};
use crate::odb::ObjectDatabase;
use crate::oid::ObjectId;
use crate::reflog::{FileReflogSink, ReflogSink};
use crate::util::signature::Signature;

use loose::LooseKind;
use packed::PackedCache;

/// Maximum number of symbolic hops `resolve` will follow before failing
/// with `TooNested`.
pub const MAX_NESTING_LEVEL: usize = 5;

/// What a reference currently points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefState {
    Direct(ObjectId),
    Symbolic(RefName),
    Invalid,
}

/// Which store a handle's value was last read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Loose,
    Packed,
}

/// A reference as returned to callers: a name, its current state, which
/// store it came from, and the mtime of that source when read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefHandle {
    pub name: RefName,
    pub state: RefState,
    pub source: Source,
    pub mtime: Option<SystemTime>,
}

impl RefHandle {
    pub fn is_direct(&self) -> bool {
        matches!(self.state, RefState::Direct(_))
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self.state, RefState::Symbolic(_))
    }

    pub fn target_oid(&self) -> Option<ObjectId> {
        match self.state {
            RefState::Direct(oid) => Some(oid),
            _ => None,
        }
    }

    pub fn symbolic_target(&self) -> Option<&RefName> {
        match &self.state {
            RefState::Symbolic(target) => Some(target),
            _ => None,
        }
    }
}

/// Enumeration filter bits, matching §4.4.9's `PACKED | OID | SYMBOLIC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumFlags(u8);

impl EnumFlags {
    pub const PACKED: Self = Self(0b001);
    pub const OID: Self = Self(0b010);
    pub const SYMBOLIC: Self = Self(0b100);
    pub const LISTALL: Self = Self(0b111);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for EnumFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// The repository's reference backend: owns the packed cache and drives
/// both stores through the operations named in the specification's Unified
/// Reference API.
pub struct FileRefStore {
    git_dir: PathBuf,
    packed: RefCell<PackedCache>,
    committer: Option<Signature>,
    reflog: Box<dyn ReflogSink>,
}

impl FileRefStore {
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
            packed: RefCell::new(PackedCache::new()),
            committer: None,
            reflog: Box::new(FileReflogSink),
        }
    }

    /// Configure the identity reflog entries are attributed to; without one,
    /// mutating operations never append reflog lines.
    pub fn set_committer(&mut self, committer: Signature) {
        self.committer = Some(committer);
    }

    /// Swap in a different reflog implementation (used by tests).
    pub fn set_reflog_sink(&mut self, sink: Box<dyn ReflogSink>) {
        self.reflog = sink;
    }

    pub fn git_dir(&self) -> &std::path::Path {
        &self.git_dir
    }

    fn append_reflog(&self, name: &RefName, old: ObjectId, new: ObjectId, message: &str) {
        if let Some(identity) = &self.committer {
            // Best-effort: a reflog write failure must not fail the ref
            // mutation it is attached to (the ref update has already
            // committed by the time this runs).
            let _ = self.reflog.append(&self.git_dir, name, old, new, identity, message);
        }
    }

    // ---- 4.4.1 Lookup -------------------------------------------------

    pub fn lookup(&self, name: &[u8]) -> Result<RefHandle, RefError> {
        let normalized = normalize_name(name)?;
        self.lookup_normalized(&normalized)
    }

    fn lookup_normalized(&self, name: &RefName) -> Result<RefHandle, RefError> {
        if let Some((state, mtime)) = loose::read_loose(&self.git_dir, name)? {
            return Ok(RefHandle {
                name: name.clone(),
                state,
                source: Source::Loose,
                mtime: Some(mtime),
            });
        }

        let mut packed = self.packed.borrow_mut();
        packed.load(&self.git_dir)?;
        if let Some(entry) = packed.find(name) {
            return Ok(RefHandle {
                name: name.clone(),
                state: RefState::Direct(entry.oid),
                source: Source::Packed,
                mtime: packed.mtime(),
            });
        }

        Err(RefError::NotFound(name.to_string()))
    }

    // ---- 4.4.2 Existence ------------------------------------------------

    pub fn exists(&self, name: &[u8]) -> Result<bool, RefError> {
        let normalized = normalize_name(name)?;
        self.exists_normalized(&normalized)
    }

    fn exists_normalized(&self, name: &RefName) -> Result<bool, RefError> {
        if loose::loose_ref_path(&self.git_dir, name).exists() {
            return Ok(true);
        }
        let mut packed = self.packed.borrow_mut();
        packed.load(&self.git_dir)?;
        Ok(packed.find(name).is_some())
    }

    // ---- 4.4.3 Create (direct) ------------------------------------------

    pub fn create_oid(
        &self,
        name: &[u8],
        oid: ObjectId,
        force: bool,
        odb: &dyn ObjectDatabase,
    ) -> Result<RefHandle, RefError> {
        let normalized = normalize_name_oid(name)?;
        if !force && self.exists_normalized(&normalized)? {
            return Err(RefError::AlreadyExists(normalized.to_string()));
        }
        if !odb.contains(&oid) {
            return Err(crate::error::target_missing(normalized.as_str(), &oid));
        }
        let mtime = loose::write_loose_direct(&self.git_dir, &normalized, &oid)?;
        self.append_reflog(&normalized, ObjectId::NULL, oid, "create");
        Ok(RefHandle {
            name: normalized,
            state: RefState::Direct(oid),
            source: Source::Loose,
            mtime: Some(mtime),
        })
    }

    // ---- 4.4.4 Create (symbolic) ----------------------------------------

    pub fn create_symbolic(&self, name: &[u8], target: &[u8], force: bool) -> Result<RefHandle, RefError> {
        let normalized = normalize_name(name)?;
        let target_name = normalize_name(target)?;
        if !force && self.exists_normalized(&normalized)? {
            return Err(RefError::AlreadyExists(normalized.to_string()));
        }
        let mtime = loose::write_loose_symbolic(&self.git_dir, &normalized, &target_name)?;
        Ok(RefHandle {
            name: normalized,
            state: RefState::Symbolic(target_name),
            source: Source::Loose,
            mtime: Some(mtime),
        })
    }

    // ---- 4.4.5 Update -----------------------------------------------------

    pub fn set_oid(&self, handle: &mut RefHandle, oid: ObjectId, odb: &dyn ObjectDatabase) -> Result<(), RefError> {
        let old = match handle.state {
            RefState::Direct(old) => old,
            _ => {
                return Err(RefError::invalid_target(
                    handle.name.as_str(),
                    "set_oid requires a direct handle",
                ))
            }
        };
        if !odb.contains(&oid) {
            return Err(crate::error::target_missing(handle.name.as_str(), &oid));
        }
        let mtime = loose::write_loose_direct(&self.git_dir, &handle.name, &oid)?;
        handle.state = RefState::Direct(oid);
        handle.source = Source::Loose;
        handle.mtime = Some(mtime);
        self.append_reflog(&handle.name, old, oid, "update");
        Ok(())
    }

    pub fn set_symbolic_target(&self, handle: &mut RefHandle, target: &[u8]) -> Result<(), RefError> {
        if !handle.is_symbolic() {
            return Err(RefError::invalid_target(
                handle.name.as_str(),
                "set_symbolic_target requires a symbolic handle",
            ));
        }
        let target_name = normalize_name(target)?;
        let mtime = loose::write_loose_symbolic(&self.git_dir, &handle.name, &target_name)?;
        handle.state = RefState::Symbolic(target_name);
        handle.source = Source::Loose;
        handle.mtime = Some(mtime);
        Ok(())
    }

    // ---- 4.4.6 Delete -------------------------------------------------

    pub fn delete(&self, handle: RefHandle) -> Result<(), RefError> {
        self.delete_internal(&handle.name, handle.source)
    }

    fn delete_internal(&self, name: &RefName, source: Source) -> Result<(), RefError> {
        match source {
            Source::Packed => {
                let mut packed = self.packed.borrow_mut();
                packed.load(&self.git_dir)?;
                if packed.remove(name).is_none() {
                    return Err(RefError::NotFound(name.to_string()));
                }
                packed.write(&self.git_dir)
            }
            Source::Loose => {
                loose::delete_loose(&self.git_dir, name)?;
                // A packed copy may still exist underneath; clean it up so
                // it doesn't silently resurface on the next lookup.
                let mut packed = self.packed.borrow_mut();
                packed.load(&self.git_dir)?;
                if packed.remove(name).is_some() {
                    packed.write(&self.git_dir)?;
                }
                Ok(())
            }
        }
    }

    // ---- 4.4.7 Rename ---------------------------------------------------

    pub fn rename(&self, mut handle: RefHandle, new_name: &[u8], force: bool) -> Result<RefHandle, RefError> {
        let new_name = if handle.is_direct() {
            normalize_name_oid(new_name)?
        } else {
            normalize_name(new_name)?
        };

        if !force && !self.is_name_available(&handle.name, &new_name)? {
            return Err(RefError::AlreadyExists(new_name.to_string()));
        }

        let old_name = handle.name.clone();
        let old_state = handle.state.clone();
        self.delete_internal(&old_name, handle.source)?;

        let new_path = loose::loose_ref_path(&self.git_dir, &new_name);
        if new_path.is_dir() {
            std::fs::remove_dir_all(&new_path).map_err(|e| RefError::IoPath {
                path: new_path.clone(),
                source: e,
            })?;
        } else if new_path.is_file() {
            self.rollback_rename(&old_name, &old_state);
            return Err(RefError::AlreadyExists(new_name.to_string()));
        }

        let create_result = match &old_state {
            RefState::Direct(oid) => loose::write_loose_direct(&self.git_dir, &new_name, oid),
            RefState::Symbolic(target) => loose::write_loose_symbolic(&self.git_dir, &new_name, target),
            RefState::Invalid => Err(RefError::invalid_target(old_name.as_str(), "cannot rename an invalid ref")),
        };

        let mtime = match create_result {
            Ok(mtime) => mtime,
            Err(e) => {
                self.rollback_rename(&old_name, &old_state);
                return Err(e);
            }
        };

        self.retarget_head_if_needed(&old_name, &new_name)?;
        self.reflog.rename(&self.git_dir, &old_name, &new_name)?;

        handle.name = new_name;
        handle.source = Source::Loose;
        handle.mtime = Some(mtime);
        Ok(handle)
    }

    fn rollback_rename(&self, old_name: &RefName, old_state: &RefState) {
        let _ = match old_state {
            RefState::Direct(oid) => loose::write_loose_direct(&self.git_dir, old_name, oid).map(|_| ()),
            RefState::Symbolic(target) => loose::write_loose_symbolic(&self.git_dir, old_name, target).map(|_| ()),
            RefState::Invalid => Ok(()),
        };
    }

    fn retarget_head_if_needed(&self, old_name: &RefName, new_name: &RefName) -> Result<(), RefError> {
        let head_name = RefName::new(b"HEAD").expect("HEAD is always a valid name");
        if let Ok(Some((RefState::Symbolic(target), _))) = loose::read_loose(&self.git_dir, &head_name) {
            if &target == old_name {
                loose::write_loose_symbolic(&self.git_dir, &head_name, new_name)?;
            }
        }
        Ok(())
    }

    /// §4.4.7 step 2: no existing ref (other than `exclude`) may share a
    /// path prefix with `candidate` up to a `/` boundary.
    fn is_name_available(&self, exclude: &RefName, candidate: &RefName) -> Result<bool, RefError> {
        let mut available = true;
        self.foreach(EnumFlags::LISTALL, |name| {
            if name != exclude && prefix_conflicts(name.as_str().as_bytes(), candidate.as_str().as_bytes()) {
                available = false;
                return false;
            }
            true
        })?;
        Ok(available)
    }

    // ---- 4.4.8 Resolve -----------------------------------------------

    pub fn resolve(&self, handle: &RefHandle) -> Result<RefHandle, RefError> {
        if handle.is_direct() {
            return self.lookup_normalized(&handle.name);
        }

        let mut current = self.lookup_normalized(&handle.name)?;
        for _ in 0..MAX_NESTING_LEVEL {
            match &current.state {
                RefState::Direct(_) => return Ok(current),
                RefState::Symbolic(target) => {
                    current = self.lookup_normalized(target)?;
                }
                RefState::Invalid => {
                    return Err(RefError::invalid_target(current.name.as_str(), "invalid reference state"))
                }
            }
        }
        Err(RefError::TooNested(handle.name.to_string()))
    }

    // ---- 4.4.9 Enumeration -----------------------------------------------

    pub fn foreach<F>(&self, flags: EnumFlags, mut cb: F) -> Result<(), RefError>
    where
        F: FnMut(&RefName) -> bool,
    {
        let mut seen_packed = HashSet::new();

        if flags.contains(EnumFlags::PACKED) {
            let mut packed = self.packed.borrow_mut();
            packed.load(&self.git_dir)?;
            let mut names: Vec<RefName> = packed.entries().map(|(n, _)| n.clone()).collect();
            names.sort();
            drop(packed);
            for name in names {
                seen_packed.insert(name.clone());
                if !cb(&name) {
                    return Ok(());
                }
            }
        }

        let wants_all_kinds = flags.contains(EnumFlags::OID) && flags.contains(EnumFlags::SYMBOLIC);
        let loose_refs = loose::enumerate_loose(&self.git_dir, None)?;
        for (name, _path) in loose_refs {
            if flags.contains(EnumFlags::PACKED) && seen_packed.contains(&name) {
                continue;
            }
            if !wants_all_kinds {
                match loose::sniff_kind(&self.git_dir, &name)? {
                    LooseKind::Direct if !flags.contains(EnumFlags::OID) => continue,
                    LooseKind::Symbolic if !flags.contains(EnumFlags::SYMBOLIC) => continue,
                    LooseKind::Invalid => continue,
                    _ => {}
                }
            }
            if !cb(&name) {
                return Ok(());
            }
        }

        Ok(())
    }

    pub fn listall(&self, flags: EnumFlags) -> Result<Vec<RefName>, RefError> {
        let mut out = Vec::new();
        self.foreach(flags, |name| {
            out.push(name.clone());
            true
        })?;
        Ok(out)
    }
}

/// §4.4.7 step 2's boundary rule: conflict iff the shorter name is a
/// prefix of the longer one and the longer's next byte is `/` (or the two
/// names are identical).
fn prefix_conflicts(existing: &[u8], candidate: &[u8]) -> bool {
    let min_len = existing.len().min(candidate.len());
    if existing[..min_len] != candidate[..min_len] {
        return false;
    }
    if existing.len() == candidate.len() {
        return true;
    }
    let longer = if existing.len() > candidate.len() { existing } else { candidate };
    longer[min_len] == b'/'
}
