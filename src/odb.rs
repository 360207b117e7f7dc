//! Narrow view onto the object database this crate needs.
//!
//! The object database is an external collaborator (it lives in the
//! grounding repository's own `git-odb` crate); this crate only ever asks
//! it three questions — does an object exist, what kind is it, and what
//! does a tag peel to — so it depends on a small trait rather than the real
//! thing. `InMemoryOdb` is a test double satisfying that trait.

use std::collections::HashMap;

use crate::oid::ObjectId;

/// The four object kinds the grounding repository's `git-object::ObjectType`
/// defines; only `Tag` is load-bearing here (tag peeling during pack_all).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

/// Read-only access to object existence, type, and tag targets.
pub trait ObjectDatabase {
    /// Does `oid` exist in the database?
    fn contains(&self, oid: &ObjectId) -> bool;

    /// The type of the object at `oid`, if it exists.
    fn lookup_type(&self, oid: &ObjectId) -> Option<ObjectKind>;

    /// If `oid` refers to a tag object, the OID it points at.
    fn tag_target(&self, oid: &ObjectId) -> Option<ObjectId>;
}

/// In-memory test double for [`ObjectDatabase`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryOdb {
    objects: HashMap<ObjectId, ObjectKind>,
    tag_targets: HashMap<ObjectId, ObjectId>,
}

impl InMemoryOdb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, oid: ObjectId, kind: ObjectKind) -> &mut Self {
        self.objects.insert(oid, kind);
        self
    }

    /// Register a tag object at `tag_oid` that peels to `target`.
    pub fn insert_tag(&mut self, tag_oid: ObjectId, target: ObjectId) -> &mut Self {
        self.objects.insert(tag_oid, ObjectKind::Tag);
        self.tag_targets.insert(tag_oid, target);
        self
    }
}

impl ObjectDatabase for InMemoryOdb {
    fn contains(&self, oid: &ObjectId) -> bool {
        self.objects.contains_key(oid)
    }

    fn lookup_type(&self, oid: &ObjectId) -> Option<ObjectKind> {
        self.objects.get(oid).copied()
    }

    fn tag_target(&self, oid: &ObjectId) -> Option<ObjectId> {
        self.tag_targets.get(oid).copied()
    }
}
