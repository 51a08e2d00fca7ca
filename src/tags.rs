//! Hierarchical tags built from flat, slash-delimited paths.
//!
//! Entries carry tags like `"People/Joe"`. Nothing is stored about the
//! hierarchy itself: every query rebuilds the tree from the entries, so a
//! node exists exactly as long as some entry (or the known tag list) still
//! references its path or a path beneath it.

use crate::model::{clean_tags, Entry};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub const SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagNode {
    pub name: String,
    pub full_path: String,
    pub children: Vec<TagNode>,
    /// Entries whose tags touch this path or anything beneath it.
    pub count: usize,
}

impl TagNode {
    pub fn find(&self, path: &str) -> Option<&TagNode> {
        if self.full_path == path {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(path))
    }
}

/// Non-empty segments of `path`. An empty result means "no tag".
pub fn parse_path(path: &str) -> Vec<&str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty()).collect()
}

pub fn normalize(path: &str) -> Option<String> {
    let segments = parse_path(path);
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

pub fn parent(path: &str) -> Option<String> {
    let segments = parse_path(path);
    if segments.len() <= 1 {
        return None;
    }
    Some(segments[..segments.len() - 1].join("/"))
}

pub fn leaf_name(path: &str) -> &str {
    parse_path(path).last().copied().unwrap_or(path)
}

/// `"A/B/C"` yields `["A", "A/B", "A/B/C"]`.
pub fn prefixes(path: &str) -> Vec<String> {
    let segments = parse_path(path);
    (1..=segments.len())
        .map(|depth| segments[..depth].join("/"))
        .collect()
}

/// True when `tag` is `path` itself or sits somewhere beneath it. Compared
/// segment by segment, so `People//Joe` is under `People/`.
pub fn is_under(tag: &str, path: &str) -> bool {
    let path = parse_path(path);
    !path.is_empty() && parse_path(tag).starts_with(&path)
}

/// `tag` moved from beneath `old` to beneath `new`, in normalized form.
/// `None` when `tag` is not under `old`.
pub fn rebase(tag: &str, old: &str, new: &str) -> Option<String> {
    if !is_under(tag, old) {
        return None;
    }
    let mut segments = parse_path(new);
    segments.extend_from_slice(&parse_path(tag)[parse_path(old).len()..]);
    Some(segments.join("/"))
}

pub fn collect_tags(entries: &[Entry]) -> Vec<String> {
    entries
        .iter()
        .flat_map(|e| e.tags.iter())
        .filter(|t| !t.trim().is_empty())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn build_hierarchy(all_tags: &[String], entries: &[Entry]) -> Vec<TagNode> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for tag in all_tags {
        for prefix in prefixes(tag) {
            counts.entry(prefix).or_insert(0);
        }
    }
    for entry in entries {
        // An entry touches each prefix once, however many of its tags share it.
        let touched: BTreeSet<String> = entry.tags.iter().flat_map(|t| prefixes(t)).collect();
        for prefix in touched {
            *counts.entry(prefix).or_insert(0) += 1;
        }
    }
    build_level(&counts, None)
}

fn build_level(counts: &BTreeMap<String, usize>, parent_path: Option<&str>) -> Vec<TagNode> {
    let depth = parent_path.map_or(0, |p| parse_path(p).len()) + 1;
    let mut nodes: Vec<TagNode> = counts
        .iter()
        .filter(|(path, _)| parse_path(path).len() == depth)
        .filter(|(path, _)| match parent_path {
            Some(parent) => path.len() > parent.len() && is_under(path, parent),
            None => true,
        })
        .map(|(path, count)| TagNode {
            name: leaf_name(path).to_string(),
            full_path: path.clone(),
            children: build_level(counts, Some(path)),
            count: *count,
        })
        .collect();
    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    nodes
}

/// Moves every tag at or beneath `old` under `new`, keeping deeper suffixes.
pub fn rename_tag_cascade(old: &str, new: &str, entries: &[Entry]) -> Vec<Entry> {
    if old == new {
        return entries.to_vec();
    }
    entries
        .iter()
        .map(|entry| {
            if !entry.tags.iter().any(|t| is_under(t, old)) {
                return entry.clone();
            }
            let renamed = entry
                .tags
                .iter()
                .map(|tag| rebase(tag, old, new).unwrap_or_else(|| tag.clone()))
                .collect();
            Entry {
                tags: clean_tags(renamed),
                ..entry.clone()
            }
        })
        .collect()
}

/// Drops `path` and everything beneath it from every entry.
pub fn remove_tag_cascade(path: &str, entries: &[Entry]) -> Vec<Entry> {
    entries
        .iter()
        .map(|entry| Entry {
            tags: entry
                .tags
                .iter()
                .filter(|t| !is_under(t, path))
                .cloned()
                .collect(),
            ..entry.clone()
        })
        .collect()
}

pub fn filter_by_tag(entries: &[Entry], path: &str) -> Vec<Entry> {
    entries
        .iter()
        .filter(|e| e.tags.iter().any(|t| is_under(t, path)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entry;
    use proptest::prelude::*;

    fn tagged(id: &str, tags: &[&str]) -> Entry {
        let mut e = entry(id, id, 0);
        e.tags = tags.iter().map(|t| t.to_string()).collect();
        e
    }

    #[test]
    fn path_utilities() {
        assert_eq!(parse_path("A//B/"), vec!["A", "B"]);
        assert!(parse_path("///").is_empty());
        assert_eq!(parent("A/B/C").as_deref(), Some("A/B"));
        assert_eq!(parent("A"), None);
        assert_eq!(leaf_name("People/Joe"), "Joe");
        assert_eq!(leaf_name("Solo"), "Solo");
        assert_eq!(normalize("/A//B"), Some("A/B".to_string()));
        assert_eq!(normalize("//"), None);
        assert_eq!(prefixes("A/B/C"), vec!["A", "A/B", "A/B/C"]);
    }

    #[test]
    fn is_under_respects_segment_boundaries() {
        assert!(is_under("A", "A"));
        assert!(is_under("A/B", "A"));
        assert!(!is_under("AB", "A"));
        assert!(!is_under("A", "A/B"));
    }

    #[test]
    fn irregular_paths_match_their_normalized_form() {
        assert!(is_under("People//Joe", "People"));
        assert!(is_under("/Places/Home", "Places/"));
        assert!(is_under("People//Joe", "People/Joe"));
        assert!(!is_under("People", ""));
        assert_eq!(rebase("/A//B/C", "A/B", "X").as_deref(), Some("X/C"));
        assert_eq!(rebase("AB", "A", "X"), None);
    }

    #[test]
    fn irregular_stored_tags_filter_rename_and_remove_like_the_tree() {
        let entries = vec![tagged("1", &["People//Joe"]), tagged("2", &["/Places/Home"])];
        let tree = build_hierarchy(&collect_tags(&entries), &entries);
        let roots: Vec<_> = tree.iter().map(|n| (n.full_path.as_str(), n.count)).collect();
        assert_eq!(roots, vec![("People", 1), ("Places", 1)]);

        let ids: Vec<_> = filter_by_tag(&entries, "Places").into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["2"]);

        let renamed = rename_tag_cascade("People/Joe", "Friends/Joe", &entries);
        assert_eq!(renamed[0].tags, vec!["Friends/Joe"]);
        assert_eq!(renamed[1].tags, entries[1].tags);

        let removed = remove_tag_cascade("Places", &entries);
        assert!(removed[1].tags.is_empty());
    }

    #[test]
    fn hierarchy_counts_parent_level_entries() {
        let entries = vec![tagged("1", &["A/B"]), tagged("2", &["A/C"]), tagged("3", &["A"])];
        let tree = build_hierarchy(&collect_tags(&entries), &entries);
        assert_eq!(tree.len(), 1);
        let root = &tree[0];
        assert_eq!((root.name.as_str(), root.count), ("A", 3));
        let children: Vec<_> = root
            .children
            .iter()
            .map(|c| (c.full_path.as_str(), c.count))
            .collect();
        assert_eq!(children, vec![("A/B", 1), ("A/C", 1)]);
    }

    #[test]
    fn hierarchy_counts_each_entry_once_per_prefix() {
        let entries = vec![tagged("1", &["People/Joe", "People/Ann", "People/Joe"])];
        let tree = build_hierarchy(&[], &entries);
        assert_eq!(tree[0].count, 1);
        assert_eq!(tree[0].children.len(), 2);
        assert_eq!(tree[0].children[0].name, "Ann");
    }

    #[test]
    fn hierarchy_keeps_known_tags_without_entries() {
        let tree = build_hierarchy(&["Places/Home".to_string()], &[]);
        assert_eq!(tree[0].full_path, "Places");
        assert_eq!(tree[0].count, 0);
        assert_eq!(tree[0].children[0].full_path, "Places/Home");
    }

    #[test]
    fn hierarchy_sorts_siblings_by_name() {
        let entries = vec![tagged("1", &["b", "a/z", "a/m", "c"])];
        let tree = build_hierarchy(&[], &entries);
        let names: Vec<_> = tree.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        let kids: Vec<_> = tree[0].children.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(kids, vec!["m", "z"]);
    }

    #[test]
    fn rename_keeps_suffix_and_skips_lookalikes() {
        let entries = vec![
            tagged("1", &["People/Joe/Work", "Places"]),
            tagged("2", &["People"]),
            tagged("3", &["PeopleX"]),
        ];
        let renamed = rename_tag_cascade("People", "Friends", &entries);
        assert_eq!(renamed[0].tags, vec!["Friends/Joe/Work", "Places"]);
        assert_eq!(renamed[1].tags, vec!["Friends"]);
        assert_eq!(renamed[2].tags, vec!["PeopleX"]);
    }

    #[test]
    fn rename_merges_collapsed_tags() {
        let entries = vec![tagged("1", &["Old", "New"])];
        let renamed = rename_tag_cascade("Old", "New", &entries);
        assert_eq!(renamed[0].tags, vec!["New"]);
    }

    #[test]
    fn rename_to_same_path_is_noop() {
        let entries = vec![tagged("1", &["A/B"])];
        assert_eq!(rename_tag_cascade("A", "A", &entries), entries);
    }

    #[test]
    fn remove_drops_subtree_only() {
        let entries = vec![tagged("1", &["A", "A/B", "AB", "C"])];
        let pruned = remove_tag_cascade("A", &entries);
        assert_eq!(pruned[0].tags, vec!["AB", "C"]);
    }

    #[test]
    fn filter_includes_descendants() {
        let entries = vec![tagged("1", &["A/B"]), tagged("2", &["B"]), tagged("3", &["A"])];
        let ids: Vec<_> = filter_by_tag(&entries, "A")
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    fn tag_strategy() -> impl Strategy<Value = String> {
        prop::collection::vec("[a-c]", 1..4).prop_map(|segs| segs.join("/"))
    }

    fn entries_strategy() -> impl Strategy<Value = Vec<Entry>> {
        prop::collection::vec(prop::collection::vec(tag_strategy(), 0..4), 0..8).prop_map(
            |tag_lists| {
                tag_lists
                    .into_iter()
                    .enumerate()
                    .map(|(i, tags)| Entry {
                        tags,
                        ..entry(&format!("e{i}"), "t", i as i64)
                    })
                    .collect()
            },
        )
    }

    proptest! {
        #[test]
        fn every_prefix_is_a_node_counting_the_entry_once(entries in entries_strategy()) {
            let tree = build_hierarchy(&collect_tags(&entries), &entries);
            for e in &entries {
                for tag in &e.tags {
                    for prefix in prefixes(tag) {
                        let root = tree.iter().find_map(|n| n.find(&prefix));
                        prop_assert!(root.is_some(), "missing node {}", prefix);
                        let expected = entries
                            .iter()
                            .filter(|other| other.tags.iter().any(|t| is_under(t, &prefix)))
                            .count();
                        prop_assert_eq!(root.unwrap().count, expected);
                    }
                }
            }
        }

        #[test]
        fn rename_leaves_nothing_under_old(entries in entries_strategy()) {
            let renamed = rename_tag_cascade("a", "z", &entries);
            for (before, after) in entries.iter().zip(&renamed) {
                prop_assert!(!after.tags.iter().any(|t| is_under(t, "a")));
                for tag in before.tags.iter().filter(|t| is_under(t, "a")) {
                    let expected = format!("z{}", &tag[1..]);
                    prop_assert!(after.tags.contains(&expected));
                }
            }
        }
    }
}
