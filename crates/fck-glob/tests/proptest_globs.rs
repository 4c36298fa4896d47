use fck_glob::{IncludeExcludeGlobs, MatchDecision};
use proptest::prelude::*;

proptest! {
    /// Exclude patterns always win over include patterns, regardless of path.
    #[test]
    fn exclude_always_beats_include(segment in "[a-z]{1,8}") {
        let path = format!("src/{segment}.rs");
        let rules = IncludeExcludeGlobs::new(
            &["src/**".to_string()],
            &["src/**".to_string()],
        ).unwrap();
        prop_assert_eq!(rules.decide_str(&path), MatchDecision::DeniedByExclude);
    }

    /// A path under an include root with no exclude patterns is always allowed.
    #[test]
    fn include_root_without_exclude_is_allowed(segment in "[a-z]{1,8}") {
        let path = format!("src/{segment}.rs");
        let rules = IncludeExcludeGlobs::new(&["src/**".to_string()], &[]).unwrap();
        prop_assert_eq!(rules.decide_str(&path), MatchDecision::Allowed);
    }
}
