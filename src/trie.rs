//! A path-indexed trie with wildcard matching, generic over the value it
//! accumulates.
//!
//! Grants are inserted under their anchor pattern; resolution walks every
//! node consistent with a query path and folds in the value of each node
//! whose pattern matches the whole query. Two pattern tokens steer the
//! walk: `*` matches any number of consecutive segments (including zero)
//! and `?` consumes exactly one. A grant never applies below its anchor;
//! subtree-wide grants say so explicitly with a trailing `*`.
//!
//! Multiple matches are merged, never chosen between: the [`Accumulate`]
//! contract requires a commutative, associative, idempotent union so the
//! resolved value is independent of traversal order.

use crate::path::{ArtifactPath, MATCH_MANY, MATCH_ONE};
use rustc_hash::FxHashMap;

/// Set-union-like merging of trie values.
///
/// Implementations must be commutative, associative, and idempotent; the
/// trie may fold the same node value into an accumulator more than once when
/// several wildcard splits pass through it.
pub trait Accumulate: Default {
    fn accumulate(&mut self, other: &Self);
}

#[derive(Clone, Debug)]
struct TrieNode<T> {
    children: FxHashMap<String, TrieNode<T>>,
    /// Child reached by the `*` token.
    many: Option<Box<TrieNode<T>>>,
    /// Child reached by the `?` token.
    one: Option<Box<TrieNode<T>>>,
    value: Option<T>,
}

impl<T> Default for TrieNode<T> {
    fn default() -> Self {
        Self {
            children: FxHashMap::default(),
            many: None,
            one: None,
            value: None,
        }
    }
}

impl<T: Accumulate> TrieNode<T> {
    fn insert(&mut self, segments: &[String], value: T) {
        let Some((head, rest)) = segments.split_first() else {
            match &mut self.value {
                Some(existing) => existing.accumulate(&value),
                slot @ None => *slot = Some(value),
            }
            return;
        };
        let child = match head.as_str() {
            MATCH_MANY => &mut **self.many.get_or_insert_with(Box::default),
            MATCH_ONE => &mut **self.one.get_or_insert_with(Box::default),
            _ => self
                .children
                .entry(head.clone())
                .or_insert_with(TrieNode::default),
        };
        child.insert(rest, value);
    }

    /// Fold this node's value when the query is fully consumed here, then
    /// descend along every edge consistent with the remaining segments.
    /// Values never apply below their anchor: a pattern matches the whole
    /// query path or contributes nothing.
    fn resolve_into(&self, segments: &[String], acc: &mut T) {
        if segments.is_empty() {
            if let Some(value) = &self.value {
                acc.accumulate(value);
            }
        }
        if let Some(many) = &self.many {
            // `*` absorbs zero or more segments: try every split point.
            for consumed in 0..=segments.len() {
                many.resolve_into(&segments[consumed..], acc);
            }
        }
        if let Some((head, rest)) = segments.split_first() {
            if let Some(child) = self.children.get(head) {
                child.resolve_into(rest, acc);
            }
            if let Some(one) = &self.one {
                one.resolve_into(rest, acc);
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty() && self.many.is_none() && self.one.is_none()
    }

    /// Drop valueless leaves bottom-up; returns how many nodes were removed.
    fn prune(&mut self) -> usize {
        let mut removed = 0;
        self.children.retain(|_, child| {
            removed += child.prune();
            if child.is_empty() {
                removed += 1;
                false
            } else {
                true
            }
        });
        for slot in [&mut self.many, &mut self.one] {
            let emptied = if let Some(child) = slot {
                removed += child.prune();
                child.is_empty()
            } else {
                false
            };
            if emptied {
                removed += 1;
                *slot = None;
            }
        }
        removed
    }
}

/// The trie itself. Instantiated with [`PermissionSet`](crate::permission::PermissionSet)
/// for grants and with the audit marker for audited artifacts.
#[derive(Clone, Debug)]
pub struct PathTrie<T> {
    root: TrieNode<T>,
}

impl<T> Default for PathTrie<T> {
    fn default() -> Self {
        Self {
            root: TrieNode::default(),
        }
    }
}

impl<T: Accumulate> PathTrie<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor `value` at `pattern`, merging into any value already there.
    /// Later insertions never overwrite earlier ones.
    pub fn insert(&mut self, pattern: &ArtifactPath, value: T) {
        self.root.insert(pattern.segments(), value);
    }

    /// Merge every grant matching `path` into `acc`.
    pub fn resolve_into(&self, path: &ArtifactPath, acc: &mut T) {
        self.root.resolve_into(path.segments(), acc);
    }

    /// Resolve into a fresh accumulator.
    #[must_use]
    pub fn resolve(&self, path: &ArtifactPath) -> T {
        let mut acc = T::default();
        self.resolve_into(path, &mut acc);
        acc
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Remove nodes holding no value and no children.
    pub fn prune(&mut self) -> usize {
        self.root.prune()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::{Permission, PermissionAtom, PermissionSet};

    fn grant(owner: &str, pattern: &str, value: &str) -> (ArtifactPath, PermissionSet) {
        let mut set = PermissionSet::new(owner);
        set.apply_grant_value(value).unwrap();
        (pattern.parse().unwrap(), set)
    }

    fn resolve(trie: &PathTrie<PermissionSet>, path: &str) -> PermissionSet {
        let path: ArtifactPath = path.parse().unwrap();
        trie.resolve(&path)
    }

    #[test]
    fn literal_match_is_exact() {
        let mut trie = PathTrie::new();
        let (pattern, set) = grant("alice", "/module/view", "VIEW=true");
        trie.insert(&pattern, set);

        assert!(resolve(&trie, "/module/view").grants_atom(PermissionAtom::View));
        assert!(!resolve(&trie, "/module/edit").grants_atom(PermissionAtom::View));
        assert!(!resolve(&trie, "/module").grants_atom(PermissionAtom::View));
    }

    #[test]
    fn grants_do_not_leak_below_their_anchor() {
        let mut trie = PathTrie::new();
        let (p1, s1) = grant("alice", "/module/view", "VIEW=true");
        let (p2, s2) = grant("alice", "/a/?/c", "READ=true");
        trie.insert(&p1, s1);
        trie.insert(&p2, s2);

        assert!(!resolve(&trie, "/module/view/anything").grants_atom(PermissionAtom::View));
        assert!(resolve(&trie, "/a/b/c").grants_atom(PermissionAtom::Read));
        assert!(!resolve(&trie, "/a/b/c/d").grants_atom(PermissionAtom::Read));
    }

    #[test]
    fn many_wildcard_matches_zero_or_more_segments() {
        let mut trie = PathTrie::new();
        let (pattern, set) = grant("alice", "/module/*", "READ=true");
        trie.insert(&pattern, set);

        for path in ["/module", "/module/x", "/module/x/y"] {
            assert!(
                resolve(&trie, path).grants_atom(PermissionAtom::Read),
                "expected READ at {path}"
            );
        }
        let root = trie.resolve(&ArtifactPath::root());
        assert!(!root.grants_atom(PermissionAtom::Read));
        assert!(!resolve(&trie, "/other").grants_atom(PermissionAtom::Read));
    }

    #[test]
    fn one_wildcard_consumes_exactly_one_segment() {
        let mut trie = PathTrie::new();
        let (pattern, set) = grant("alice", "/a/?/c", "VIEW=true");
        trie.insert(&pattern, set);

        assert!(resolve(&trie, "/a/b/c").grants_atom(PermissionAtom::View));
        assert!(resolve(&trie, "/a/x/c").grants_atom(PermissionAtom::View));
        assert!(!resolve(&trie, "/a/c").grants_atom(PermissionAtom::View));
        assert!(!resolve(&trie, "/a/b/b/c").grants_atom(PermissionAtom::View));
    }

    #[test]
    fn mid_path_wildcard() {
        let mut trie = PathTrie::new();
        let (pattern, set) = grant("alice", "/a/*/edit", "UPDATE=true");
        trie.insert(&pattern, set);

        assert!(resolve(&trie, "/a/edit").grants_atom(PermissionAtom::Update));
        assert!(resolve(&trie, "/a/x/edit").grants_atom(PermissionAtom::Update));
        assert!(resolve(&trie, "/a/x/y/z/edit").grants_atom(PermissionAtom::Update));
        assert!(!resolve(&trie, "/a/x/view").grants_atom(PermissionAtom::Update));
    }

    #[test]
    fn overlapping_grants_merge_and_exclude_dominates() {
        let mut trie = PathTrie::new();
        let (p1, s1) = grant("group", "/module/*", "DELETE=true");
        let (p2, s2) = grant("alice", "/module/secret", "DELETE=false");
        trie.insert(&p1, s1);
        trie.insert(&p2, s2);

        assert!(!resolve(&trie, "/module/secret").grants_atom(PermissionAtom::Delete));
        assert!(resolve(&trie, "/module/other").grants_atom(PermissionAtom::Delete));
    }

    #[test]
    fn repeat_insert_at_same_node_merges() {
        let mut trie = PathTrie::new();
        let (p1, s1) = grant("alice", "/x", "READ=true");
        let (p2, s2) = grant("alice", "/x", "VIEW=true");
        trie.insert(&p1, s1);
        trie.insert(&p2, s2);

        let resolved = resolve(&trie, "/x");
        let both = Permission::intersection(
            "both",
            vec![
                Permission::atom(PermissionAtom::Read),
                Permission::atom(PermissionAtom::View),
            ],
        );
        assert!(resolved.implies(&both));
    }

    #[test]
    fn prune_drops_empty_nodes() {
        #[derive(Default)]
        struct Unit;
        impl Accumulate for Unit {
            fn accumulate(&mut self, _other: &Self) {}
        }

        let mut trie: PathTrie<Unit> = PathTrie::new();
        trie.root
            .insert(&["a".to_owned(), "b".to_owned()], Unit);
        trie.root.children.get_mut("a").unwrap().children.get_mut("b").unwrap().value = None;
        assert_eq!(trie.prune(), 2);
        assert!(trie.is_empty());
    }
}
