//! `pack_all`: folding every direct loose reference into `packed-refs`.
//!
//! Grounded on the grounding repository's `git-ref::files::pack::pack_refs`,
//! restructured around the specification's three-phase commit-then-unlink
//! ordering: the new `packed-refs` file must land before any loose file is
//! removed, and a failed commit must leave every loose file untouched.

use crate::error::RefError;
use crate::name::RefName;
use crate::odb::{ObjectDatabase, ObjectKind};
use crate::oid::ObjectId;

use super::loose::{self, LooseKind};
use super::packed::PackedEntry;
use super::FileRefStore;

impl FileRefStore {
    /// Fold every direct loose reference into `packed-refs` and remove the
    /// loose files that were folded in. Symbolic refs (HEAD and friends) are
    /// left as loose files; packed-refs has no way to represent them.
    ///
    /// Aborts without touching anything on disk if any loose ref fails to
    /// parse. Once the new `packed-refs` file is committed, unlink failures
    /// on individual loose files are collected rather than aborting the
    /// whole sweep; the first such error is returned after every candidate
    /// has been attempted.
    pub fn pack_all(&self, odb: &dyn ObjectDatabase) -> Result<(), RefError> {
        let mut packed = self.packed.borrow_mut();
        packed.load(&self.git_dir)?;

        // Fold into a scratch copy first: a corrupt loose ref partway
        // through must abort with the shared cache untouched.
        let mut candidate = packed.snapshot();
        let loose_refs = loose::enumerate_loose(&self.git_dir, None)?;
        let mut folded: Vec<RefName> = Vec::new();

        for (name, _path) in &loose_refs {
            match loose::sniff_kind(&self.git_dir, name)? {
                LooseKind::Symbolic | LooseKind::Invalid => continue,
                LooseKind::Direct => {}
            }

            let (state, _mtime) = match loose::read_loose(&self.git_dir, name)? {
                Some(pair) => pair,
                None => continue,
            };
            let oid = match state {
                super::RefState::Direct(oid) => oid,
                _ => continue,
            };

            let peeled = peel_if_tag(odb, name, oid);
            candidate.insert(
                name.clone(),
                PackedEntry {
                    oid,
                    peeled,
                    was_loose: true,
                },
            );
            folded.push(name.clone());
        }

        // §4.5 phase 3 covers the whole snapshot, not just entries folded in
        // this call: a tag already packed without a peel line (e.g. written
        // by an external tool) must be peeled too.
        for (name, entry) in candidate.iter_mut() {
            if name.is_tag() && entry.peeled.is_none() {
                entry.peeled = peel_if_tag(odb, name, entry.oid);
            }
        }

        packed.replace_entries(candidate);
        packed.write(&self.git_dir)?;
        drop(packed);

        let mut first_err: Option<RefError> = None;
        for name in &folded {
            if let Err(e) = loose::delete_loose(&self.git_dir, name) {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// If `oid` names a tag object, ask the object database what it peels to.
fn peel_if_tag(odb: &dyn ObjectDatabase, name: &RefName, oid: ObjectId) -> Option<ObjectId> {
    if !name.is_tag() {
        return None;
    }
    match odb.lookup_type(&oid) {
        Some(ObjectKind::Tag) => odb.tag_target(&oid),
        _ => None,
    }
}
