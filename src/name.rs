//! Reference name normalization and validation.
//!
//! Grounded on the grounding repository's `git-ref::name` module (itself a
//! port of `git-check-ref-format(1)`), adapted in two ways the distilled
//! specification requires and the grounding repository does not do:
//! consecutive slashes are collapsed rather than rejected, and an `oid_ref`
//! flag distinguishes names that must resolve to an OID-bearing path
//! (`refs/...`, or the well-known roots) from symbolic-only names like
//! `HEAD`.

use std::fmt;

use bstr::{BStr, BString, ByteSlice};

use crate::error::RefError;

/// Byte values, besides control characters, forbidden anywhere in a name.
const FORBIDDEN_CHARS: &[u8] = b"~^:\\?[*";

/// Upper bound on a normalized name's length in bytes.
pub const MAX_NAME: usize = 1024;

/// The well-known roots a non-`refs/...` `oid_ref` name may be.
const WELL_KNOWN_ROOTS: &[&str] = &["HEAD", "MERGE_HEAD", "FETCH_HEAD"];

/// Special ref names that are valid without a `/`, for classification only
/// (`oid_ref` acceptance is governed by [`WELL_KNOWN_ROOTS`]).
const SPECIAL_REFS: &[&str] = &[
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

/// A normalized, validated reference name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefName(BString);

impl RefName {
    /// Normalize and validate `name`, accepting any name the grammar allows
    /// (symbolic-only names included).
    pub fn new(name: impl AsRef<[u8]>) -> Result<Self, RefError> {
        normalize_name(name.as_ref())
    }

    /// Normalize and validate `name`, requiring it be eligible to hold a
    /// direct OID (`refs/...` or a well-known root).
    pub fn new_oid_ref(name: impl AsRef<[u8]>) -> Result<Self, RefError> {
        normalize_name_oid(name.as_ref())
    }

    /// Wrap an already-normalized name without re-validating it.
    pub(crate) fn new_unchecked(name: impl Into<BString>) -> Self {
        Self(name.into())
    }

    pub fn short_name(&self) -> &BStr {
        let s = self.0.as_bstr();
        if let Some(rest) = s.strip_prefix(b"refs/heads/") {
            rest.as_bstr()
        } else if let Some(rest) = s.strip_prefix(b"refs/tags/") {
            rest.as_bstr()
        } else if let Some(rest) = s.strip_prefix(b"refs/remotes/") {
            rest.as_bstr()
        } else {
            s
        }
    }

    pub fn is_branch(&self) -> bool {
        self.0.starts_with(b"refs/heads/")
    }

    pub fn is_tag(&self) -> bool {
        self.0.starts_with(b"refs/tags/")
    }

    pub fn is_remote(&self) -> bool {
        self.0.starts_with(b"refs/remotes/")
    }

    pub fn is_special(&self) -> bool {
        let s = self.0.to_str_lossy();
        SPECIAL_REFS.contains(&s.as_ref())
    }

    pub fn as_bstr(&self) -> &BStr {
        self.0.as_bstr()
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("<invalid-utf8>")
    }

    pub fn into_inner(self) -> BString {
        self.0
    }
}

impl AsRef<BStr> for RefName {
    fn as_ref(&self) -> &BStr {
        self.0.as_bstr()
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize `input` with `oid_ref = false`: any name the grammar allows.
pub fn normalize_name(input: &[u8]) -> Result<RefName, RefError> {
    normalize(input, false)
}

/// Normalize `input` with `oid_ref = true`: the name must be eligible to
/// hold a direct OID.
pub fn normalize_name_oid(input: &[u8]) -> Result<RefName, RefError> {
    normalize(input, true)
}

fn normalize(input: &[u8], oid_ref: bool) -> Result<RefName, RefError> {
    let name_str = || String::from_utf8_lossy(input).into_owned();

    if input.is_empty() {
        return Err(RefError::InvalidName("name is empty".into()));
    }

    for (i, &b) in input.iter().enumerate() {
        if b <= 0x20 {
            return Err(RefError::InvalidName(format!(
                "'{}': contains control character at position {i}",
                name_str()
            )));
        }
        if FORBIDDEN_CHARS.contains(&b) {
            return Err(RefError::InvalidName(format!(
                "'{}': contains forbidden character '{}' at position {i}",
                name_str(),
                b as char
            )));
        }
    }

    // Collapse consecutive '/' into one before the structural checks below,
    // since those checks apply to the normalized output, not the raw input.
    let mut collapsed = Vec::with_capacity(input.len());
    let mut prev_slash = false;
    for &b in input {
        if b == b'/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        collapsed.push(b);
    }

    if collapsed == b"@" {
        return Err(RefError::InvalidName("'@' is not a valid ref name".into()));
    }
    if collapsed.starts_with(b".") {
        return Err(RefError::InvalidName(format!(
            "'{}': starts with '.'",
            name_str()
        )));
    }
    if collapsed.starts_with(b"/") {
        return Err(RefError::InvalidName(format!(
            "'{}': starts with '/'",
            name_str()
        )));
    }
    if collapsed.ends_with(b"/") {
        return Err(RefError::InvalidName(format!(
            "'{}': ends with '/'",
            name_str()
        )));
    }
    if collapsed.ends_with(b".") {
        return Err(RefError::InvalidName(format!(
            "'{}': ends with '.'",
            name_str()
        )));
    }
    if collapsed.ends_with(b".lock") {
        return Err(RefError::InvalidName(format!(
            "'{}': ends with '.lock'",
            name_str()
        )));
    }
    if collapsed.as_slice().find(b"..").is_some() {
        return Err(RefError::InvalidName(format!(
            "'{}': contains '..'",
            name_str()
        )));
    }
    if collapsed.as_slice().find(b"@{").is_some() {
        return Err(RefError::InvalidName(format!(
            "'{}': contains '@{{'",
            name_str()
        )));
    }
    if collapsed.len() > MAX_NAME {
        return Err(RefError::InvalidName(format!(
            "name exceeds {MAX_NAME} bytes"
        )));
    }

    if oid_ref {
        let has_slash = collapsed.contains(&b'/');
        let is_well_known = WELL_KNOWN_ROOTS
            .iter()
            .any(|root| collapsed == root.as_bytes());
        let starts_with_refs = collapsed.starts_with(b"refs/");
        if !((has_slash && starts_with_refs) || is_well_known) {
            return Err(RefError::InvalidName(format!(
                "'{}': not eligible to hold a direct OID (must start with 'refs/' or be a well-known root)",
                name_str()
            )));
        }
    }

    Ok(RefName(BString::from(collapsed)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_ref_names() {
        assert!(normalize_name(b"refs/heads/main").is_ok());
        assert!(normalize_name(b"refs/tags/v1.0").is_ok());
        assert!(normalize_name(b"refs/remotes/origin/main").is_ok());
        assert!(normalize_name(b"HEAD").is_ok());
        assert!(normalize_name(b"MERGE_HEAD").is_ok());
        assert!(normalize_name(b"refs/heads/feature/sub-branch").is_ok());
    }

    #[test]
    fn collapses_consecutive_slashes() {
        let n = normalize_name(b"refs//heads///x").unwrap();
        assert_eq!(n.as_str(), "refs/heads/x");
    }

    #[test]
    fn invalid_double_dot() {
        assert!(normalize_name(b"refs/heads/main..branch").is_err());
    }

    #[test]
    fn invalid_control_char() {
        assert!(normalize_name(b"refs/heads/\x01bad").is_err());
    }

    #[test]
    fn invalid_space() {
        assert!(normalize_name(b"refs/heads/bad name").is_err());
    }

    #[test]
    fn invalid_forbidden_chars() {
        for ch in [b'~', b'^', b':', b'\\', b'?', b'[', b'*'] {
            let mut name = b"refs/heads/bad".to_vec();
            name.push(ch);
            assert!(normalize_name(&name).is_err(), "char {ch} should be rejected");
        }
    }

    #[test]
    fn invalid_starts_with_dot() {
        assert!(normalize_name(b".refs/heads/main").is_err());
    }

    #[test]
    fn invalid_starts_with_slash() {
        assert!(normalize_name(b"/refs/heads/main").is_err());
    }

    #[test]
    fn invalid_ends_with_slash() {
        assert!(normalize_name(b"refs/heads/main/").is_err());
    }

    #[test]
    fn invalid_ends_with_dot() {
        assert!(normalize_name(b"refs/heads/main.").is_err());
    }

    #[test]
    fn invalid_ends_with_lock() {
        assert!(normalize_name(b"refs/heads/main.lock").is_err());
    }

    #[test]
    fn invalid_at_brace() {
        assert!(normalize_name(b"refs/heads/main@{0}").is_err());
    }

    #[test]
    fn invalid_bare_at() {
        assert!(normalize_name(b"@").is_err());
    }

    #[test]
    fn invalid_empty() {
        assert!(normalize_name(b"").is_err());
    }

    #[test]
    fn invalid_too_long() {
        let long = vec![b'a'; MAX_NAME + 1];
        let mut name = b"refs/heads/".to_vec();
        name.extend(long);
        assert!(normalize_name(&name).is_err());
    }

    #[test]
    fn oid_ref_requires_refs_prefix_or_well_known_root() {
        assert!(normalize_name_oid(b"refs/heads/main").is_ok());
        assert!(normalize_name_oid(b"HEAD").is_ok());
        assert!(normalize_name_oid(b"MERGE_HEAD").is_ok());
        assert!(normalize_name_oid(b"FETCH_HEAD").is_ok());
        assert!(normalize_name_oid(b"CHERRY_PICK_HEAD").is_err());
        assert!(normalize_name_oid(b"loose-name").is_err());
    }

    #[test]
    fn normalize_is_idempotent() {
        let inputs: &[&[u8]] = &[b"refs/heads/main", b"refs//heads///x", b"HEAD"];
        for input in inputs {
            let once = normalize_name(input).unwrap();
            let twice = normalize_name(once.as_bstr()).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn short_name_branch() {
        let r = normalize_name(b"refs/heads/main").unwrap();
        assert_eq!(r.short_name(), "main");
    }

    #[test]
    fn short_name_tag() {
        let r = normalize_name(b"refs/tags/v1.0").unwrap();
        assert_eq!(r.short_name(), "v1.0");
    }

    #[test]
    fn is_branch_tag_remote_special() {
        assert!(normalize_name(b"refs/heads/main").unwrap().is_branch());
        assert!(normalize_name(b"refs/tags/v1.0").unwrap().is_tag());
        assert!(normalize_name(b"refs/remotes/origin/main")
            .unwrap()
            .is_remote());
        assert!(normalize_name(b"HEAD").unwrap().is_special());
    }

    #[test]
    fn display() {
        let r = normalize_name(b"refs/heads/main").unwrap();
        assert_eq!(r.to_string(), "refs/heads/main");
    }

    #[test]
    fn ordering() {
        let a = normalize_name(b"refs/heads/alpha").unwrap();
        let b = normalize_name(b"refs/heads/beta").unwrap();
        assert!(a < b);
    }
}
