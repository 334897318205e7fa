use pathguard::path::ArtifactPath;
use pathguard::permission::{Permission, PermissionAtom, PermissionSet};
use pathguard::trie::PathTrie;
use proptest::prelude::*;

fn build(grants: &[(String, String)]) -> PathTrie<PermissionSet> {
    let mut trie = PathTrie::new();
    for (pattern, value) in grants {
        let pattern: ArtifactPath = pattern.parse().unwrap();
        let mut set = PermissionSet::new("owner");
        set.apply_grant_value(value).unwrap();
        trie.insert(&pattern, set);
    }
    trie
}

fn resolve(trie: &PathTrie<PermissionSet>, path: &str) -> PermissionSet {
    let path: ArtifactPath = path.parse().unwrap();
    trie.resolve(&path)
}

#[test]
fn wildcard_subsumes_every_suffix() {
    let trie = build(&[("/a/*".into(), "READ=true".into())]);
    for path in ["/a", "/a/x", "/a/x/y", "/a/x/y/z"] {
        assert!(
            resolve(&trie, path).grants_atom(PermissionAtom::Read),
            "expected READ at {path}"
        );
    }
    assert!(!resolve(&trie, "/b").grants_atom(PermissionAtom::Read));
}

#[test]
fn substitution_consumes_one_segment() {
    let trie = build(&[("/a/?/c".into(), "VIEW=true".into())]);
    for path in ["/a/b/c", "/a/x/c", "/a/zz/c"] {
        assert!(
            resolve(&trie, path).grants_atom(PermissionAtom::View),
            "expected VIEW at {path}"
        );
    }
    assert!(!resolve(&trie, "/a/c").grants_atom(PermissionAtom::View));
    assert!(!resolve(&trie, "/a/x/y/c").grants_atom(PermissionAtom::View));
    assert!(!resolve(&trie, "/a/b/c/d").grants_atom(PermissionAtom::View));
}

#[test]
fn literal_grants_stop_at_their_anchor() {
    let trie = build(&[("/module/view".into(), "VIEW=true".into())]);
    assert!(resolve(&trie, "/module/view").grants_atom(PermissionAtom::View));
    assert!(!resolve(&trie, "/module/view/anything").grants_atom(PermissionAtom::View));
}

#[test]
fn exclude_dominates_across_matching_nodes() {
    let trie = build(&[
        ("/a/*".into(), "DELETE=true".into()),
        ("/a/b".into(), "DELETE=false".into()),
    ]);
    let resolved = resolve(&trie, "/a/b");
    assert!(!resolved.implies(&Permission::atom(PermissionAtom::Delete)));

    // The same atom granted and revoked at one node is still revoked.
    let single = build(&[
        ("/x".into(), "DELETE=true".into()),
        ("/x".into(), "DELETE=false".into()),
    ]);
    assert!(!resolve(&single, "/x").grants_atom(PermissionAtom::Delete));
}

#[test]
fn filters_and_services_union_along_the_walk() {
    let trie = build(&[
        ("/a/*".into(), "filter=f1".into()),
        ("/a/b".into(), "filter=f2".into()),
        ("/a/b".into(), "service=s1".into()),
    ]);
    let resolved = resolve(&trie, "/a/b");
    assert!(resolved.filters().contains("f1"));
    assert!(resolved.filters().contains("f2"));
    assert!(resolved.services().contains("s1"));
}

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("a".to_owned()),
        Just("b".to_owned()),
        Just("c".to_owned()),
        Just("*".to_owned()),
        Just("?".to_owned()),
    ]
}

fn pattern() -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), 1..4).prop_map(|segments| format!("/{}", segments.join("/")))
}

fn grant_value() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("READ=true".to_owned()),
        Just("READ=false".to_owned()),
        Just("VIEW=true".to_owned()),
        Just("DELETE=true".to_owned()),
        Just("DELETE=false".to_owned()),
        Just("filter=f1".to_owned()),
        Just("service=s1".to_owned()),
    ]
}

proptest! {
    // Resolution folds commutative unions, so any insertion order yields
    // the same accumulator at every query path.
    #[test]
    fn resolution_is_permutation_invariant(
        grants in prop::collection::vec((pattern(), grant_value()), 1..8)
    ) {
        let mut reversed = grants.clone();
        reversed.reverse();
        let mut rotated = grants.clone();
        let split = grants.len() / 2;
        rotated.rotate_left(split);

        let original = build(&grants);
        let backwards = build(&reversed);
        let shifted = build(&rotated);

        for query in ["/a", "/b", "/a/b", "/a/b/c", "/c/a", "/b/b/b"] {
            let query: ArtifactPath = query.parse().unwrap();
            prop_assert_eq!(original.resolve(&query), backwards.resolve(&query));
            prop_assert_eq!(original.resolve(&query), shifted.resolve(&query));
        }
    }

    // Whatever the grant set, an atom excluded anywhere along a matching
    // walk never ends up implied.
    #[test]
    fn excluded_atoms_never_resurface(
        grants in prop::collection::vec((pattern(), grant_value()), 0..6),
        query_segments in prop::collection::vec(
            prop_oneof![Just("a".to_owned()), Just("b".to_owned()), Just("c".to_owned())],
            1..4,
        )
    ) {
        let query_str = format!("/{}", query_segments.join("/"));
        let mut poisoned = grants.clone();
        poisoned.push((query_str.clone(), "READ=false".to_owned()));

        let trie = build(&poisoned);
        let query: ArtifactPath = query_str.parse().unwrap();
        prop_assert!(!trie.resolve(&query).grants_atom(PermissionAtom::Read));
    }
}
