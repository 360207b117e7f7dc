//! Property-based tests for reference name normalization.

use git_ref::normalize_name;
use proptest::prelude::*;

/// A generator biased toward strings that often pass normalization, so the
/// idempotence property actually exercises the success path most of the
/// time instead of bailing out on `InvalidName` for nearly every input.
fn ref_name_like() -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-zA-Z0-9_./-]{1,12}", 1..5).prop_map(|parts| parts.join("/"))
}

proptest! {
    /// `normalize(normalize(n)) == normalize(n)` for every `n` that
    /// normalizes successfully at all.
    #[test]
    fn normalize_idempotent(s in ref_name_like()) {
        if let Ok(once) = normalize_name(s.as_bytes()) {
            let twice = normalize_name(once.as_bstr()).expect("already-normalized name must re-normalize");
            prop_assert_eq!(once, twice);
        }
    }

    /// Arbitrary byte strings never panic the normalizer; every input either
    /// normalizes or is rejected.
    #[test]
    fn normalize_never_panics(s in ".{0,64}") {
        let _ = normalize_name(s.as_bytes());
    }

    /// Normalized output never contains two consecutive slashes.
    #[test]
    fn normalize_collapses_slashes(s in ref_name_like()) {
        if let Ok(name) = normalize_name(s.as_bytes()) {
            prop_assert!(!name.as_str().contains("//"));
        }
    }
}
