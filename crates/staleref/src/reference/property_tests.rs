//
// reference/property_tests.rs
//
// Property-based tests for reference extraction and position remapping
//

#![cfg(test)]

use proptest::prelude::*;

use super::extract::ReferenceExtractor;
use super::position::remap_position;
use super::{format_url, is_valid_identifier, CommentSpan, ReferenceKind};

// ============================================================================
// Generators
// ============================================================================

/// Owner/repo names that satisfy every validation rule
fn valid_identifier() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{1,8}(\\.[A-Za-z0-9_-]{1,8}){0,2}"
}

/// Names that break exactly one of the validation rules
fn invalid_identifier() -> impl Strategy<Value = String> {
    prop_oneof![
        valid_identifier().prop_map(|s| format!(".{}", s)),
        valid_identifier().prop_map(|s| format!("{}.", s)),
        (valid_identifier(), valid_identifier()).prop_map(|(a, b)| format!("{}..{}", a, b)),
        (valid_identifier(), "[~!$%&*+=,;:@]").prop_map(|(a, c)| format!("{}{}", a, c)),
    ]
}

fn kind() -> impl Strategy<Value = ReferenceKind> {
    prop_oneof![Just(ReferenceKind::Issue), Just(ReferenceKind::PullRequest)]
}

fn extractor() -> ReferenceExtractor {
    ReferenceExtractor::new(&["github.com".to_string()], true, &["TODO".to_string()])
}

// ============================================================================
// Identifier validation
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_valid_identifiers_accepted(owner in valid_identifier(), repo in valid_identifier(), n in 1u64..100_000) {
        prop_assert!(is_valid_identifier(&owner));
        let text = format!("// {}", format_url("github.com", &owner, &repo, ReferenceKind::Issue, n));
        let refs = extractor().extract(&CommentSpan::new(text, 1, 0));
        prop_assert_eq!(refs.len(), 1);
        prop_assert_eq!(&refs[0].key.owner, &owner);
        prop_assert_eq!(&refs[0].key.repo, &repo);
    }

    /// A bad name drops only its own match, never the rest of the comment.
    #[test]
    fn prop_invalid_identifier_rejects_only_its_match(
        bad in invalid_identifier(),
        good in valid_identifier(),
        n in 1u64..1000,
    ) {
        prop_assert!(!is_valid_identifier(&bad));
        let text = format!(
            "// {} then {}",
            format_url("github.com", &bad, "repo", ReferenceKind::Issue, n),
            format_url("github.com", &good, "repo", ReferenceKind::Issue, n + 1),
        );
        let refs = extractor().extract(&CommentSpan::new(text, 1, 0));
        prop_assert_eq!(refs.len(), 1);
        prop_assert_eq!(&refs[0].key.owner, &good);
    }

    #[test]
    fn prop_url_round_trips(owner in valid_identifier(), repo in valid_identifier(), kind in kind(), n in 1u64..u64::MAX) {
        let url = format_url("github.com", &owner, &repo, kind, n);
        let refs = extractor().extract(&CommentSpan::new(format!("# {}", url), 1, 0));
        prop_assert_eq!(refs.len(), 1);
        let key = &refs[0].key;
        prop_assert_eq!(key.display_url(), url.clone());
        prop_assert_eq!(&key.url, &url.to_ascii_lowercase());
    }

    #[test]
    fn prop_columns_are_well_formed(prefix in "[a-z ]{0,20}", line in 1usize..500, col in 0usize..80) {
        let url = "https://github.com/a/b/issues/1";
        let text = format!("// {}{}", prefix, url);
        let refs = extractor().extract(&CommentSpan::new(text.clone(), line, col));
        prop_assert_eq!(refs.len(), 1);
        prop_assert!(refs[0].start_column < refs[0].end_column);
        prop_assert_eq!(refs[0].start_column, col + text.find(url).unwrap());
        prop_assert_eq!(refs[0].end_column - refs[0].start_column, url.len());
    }
}

// ============================================================================
// Position remapping
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Line endings must not change the reported position.
    #[test]
    fn prop_crlf_and_lf_agree(
        lines in prop::collection::vec("[a-z *]{0,12}", 1..6),
        start_line in 1usize..100,
        start_col in 0usize..40,
    ) {
        let url = "https://github.com/a/b/issues/7";
        let mut lf_lines = lines.clone();
        lf_lines.push(format!("   {}", url));
        let lf = lf_lines.join("\n");
        let crlf = lf_lines.join("\r\n");

        let a = remap_position(start_line, start_col, &lf, lf.find(url).unwrap());
        let b = remap_position(start_line, start_col, &crlf, crlf.find(url).unwrap());
        prop_assert_eq!(a, b);
        prop_assert_eq!(a.line, start_line + lines.len());
        prop_assert_eq!(a.column, 3);
    }

    #[test]
    fn prop_remap_is_total(text in "[a-z\r\n]{0,40}", offset in 0usize..64) {
        let pos = remap_position(1, 0, &text, offset);
        prop_assert!(pos.line >= 1);
    }
}
