//! Assembly of flat folder records into a sorted forest.
//!
//! Every record ends up exactly once in the result. A record whose parent
//! is missing from the input, or which sits on a parent cycle, is placed
//! at the root level instead of being dropped.

use crate::folder::{FolderNode, FolderRecord, PATH_SEPARATOR};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Label shown when no destination folder is selected
pub const ROOT_LABEL: &str = "Root Folder";
/// Label shown when the selected folder is not in the forest
pub const UNKNOWN_LABEL: &str = "Unknown Folder";

pub fn assemble(records: &[FolderRecord]) -> Vec<FolderNode> {
    // First occurrence of an id wins
    let mut index: HashMap<&str, &FolderRecord> = HashMap::with_capacity(records.len());
    let mut unique: Vec<&FolderRecord> = Vec::with_capacity(records.len());
    for record in records {
        if index.contains_key(record.id.as_str()) {
            debug!("Skipping duplicate folder record {}", record.id);
            continue;
        }
        index.insert(record.id.as_str(), record);
        unique.push(record);
    }

    let with_children: HashSet<&str> = unique
        .iter()
        .filter_map(|r| r.parent_id.as_deref().filter(|p| *p != r.id))
        .collect();

    let cyclic = find_cycle_members(&unique, &index);

    let mut roots: Vec<&FolderRecord> = Vec::new();
    let mut children_of: HashMap<&str, Vec<&FolderRecord>> = HashMap::new();
    for &record in &unique {
        match effective_parent(record, &index, &cyclic) {
            Some(parent) => children_of.entry(parent).or_default().push(record),
            None => roots.push(record),
        }
    }

    build_forest(roots, &children_of, &with_children)
}

/// Parent under which `record` is placed, or `None` when it becomes a root.
fn effective_parent<'a>(
    record: &'a FolderRecord,
    index: &HashMap<&str, &FolderRecord>,
    cyclic: &HashSet<&str>,
) -> Option<&'a str> {
    let parent = record.parent_id.as_deref()?;
    if !index.contains_key(parent) {
        debug!(
            "Parent {} of folder {} not found, placing it at root",
            parent, record.id
        );
        return None;
    }
    if cyclic.contains(record.id.as_str()) {
        return None;
    }
    Some(parent)
}

/// Ids of every record that is its own transitive ancestor.
fn find_cycle_members<'a>(
    records: &[&'a FolderRecord],
    index: &HashMap<&str, &'a FolderRecord>,
) -> HashSet<&'a str> {
    let mut settled: HashSet<&str> = HashSet::new();
    let mut cyclic: HashSet<&str> = HashSet::new();

    for &record in records {
        let mut walk: Vec<&str> = Vec::new();
        let mut position: HashMap<&str, usize> = HashMap::new();
        let mut current = Some(record.id.as_str());

        while let Some(id) = current {
            if settled.contains(id) {
                break;
            }
            if let Some(&start) = position.get(id) {
                warn!("Folder parent cycle detected through {}", id);
                cyclic.extend(walk[start..].iter().copied());
                break;
            }
            position.insert(id, walk.len());
            walk.push(id);
            current = index
                .get(id)
                .copied()
                .and_then(|r| r.parent_id.as_deref())
                .and_then(|p| index.get(p).copied())
                .map(|r| r.id.as_str());
        }

        settled.extend(walk);
    }

    cyclic
}

/// Builds every tree without recursing, so arbitrarily deep chains are fine.
///
/// Paths and depths are computed top-down in breadth-first order, then
/// nodes are assembled in reverse of that order so each node's children
/// are complete before the node itself is built.
fn build_forest<'a>(
    roots: Vec<&'a FolderRecord>,
    children_of: &HashMap<&str, Vec<&'a FolderRecord>>,
    with_children: &HashSet<&str>,
) -> Vec<FolderNode> {
    // (record, placed under a parent, full path, depth)
    let mut order: Vec<(&FolderRecord, bool, String, usize)> = roots
        .into_iter()
        .map(|record| (record, false, record.name.clone(), 0))
        .collect();

    let mut next = 0;
    while next < order.len() {
        let (record, _, ref path, depth) = order[next];
        let kids: Vec<(&FolderRecord, bool, String, usize)> = children_of
            .get(record.id.as_str())
            .map(|kids| {
                kids.iter()
                    .map(|kid| (*kid, true, format!("{}{}{}", path, PATH_SEPARATOR, kid.name), depth + 1))
                    .collect()
            })
            .unwrap_or_default();
        order.extend(kids);
        next += 1;
    }

    let mut built: HashMap<&str, Vec<FolderNode>> = HashMap::new();
    let mut forest: Vec<FolderNode> = Vec::new();
    while let Some((record, placed, full_path, depth)) = order.pop() {
        let mut children = built.remove(record.id.as_str()).unwrap_or_default();
        sort_nodes(&mut children);

        let node = FolderNode {
            id: record.id.clone(),
            name: record.name.clone(),
            // Demoted roots have no parent in the forest
            parent_id: if placed { record.parent_id.clone() } else { None },
            full_path,
            depth,
            children,
            has_children: with_children.contains(record.id.as_str()),
        };

        match record.parent_id.as_deref().filter(|_| placed) {
            Some(parent) => built.entry(parent).or_default().push(node),
            None => forest.push(node),
        }
    }

    sort_nodes(&mut forest);
    forest
}

fn sort_nodes(nodes: &mut [FolderNode]) {
    nodes.sort_by_cached_key(|node| (CollationKey::new(&node.name), node.id.clone()));
}

/// Sort key approximating a root-locale collator.
///
/// Levels compare in order: base letters ignoring case and accents, then
/// accents, then case with lowercase first, then the raw string.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct CollationKey {
    base: String,
    accents: String,
    uppercase: Vec<bool>,
    raw: String,
}

impl CollationKey {
    fn new(name: &str) -> Self {
        let decomposed: String = name.nfd().collect();
        let base = decomposed
            .chars()
            .filter(|c| !is_combining_mark(*c))
            .flat_map(char::to_lowercase)
            .collect();
        let accents = decomposed.chars().flat_map(char::to_lowercase).collect();
        let uppercase = decomposed
            .chars()
            .filter(|c| !is_combining_mark(*c))
            .map(char::is_uppercase)
            .collect();

        Self {
            base,
            accents,
            uppercase,
            raw: name.to_string(),
        }
    }
}

/// Case- and accent-insensitive name order with lowercase before uppercase
/// on ties, as a locale-aware collator orders folder names.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    CollationKey::new(a).cmp(&CollationKey::new(b))
}

pub fn find<'a>(forest: &'a [FolderNode], id: &str) -> Option<&'a FolderNode> {
    let mut stack: Vec<&FolderNode> = forest.iter().rev().collect();
    while let Some(node) = stack.pop() {
        if node.id == id {
            return Some(node);
        }
        stack.extend(node.children.iter().rev());
    }
    None
}

/// Every node in pre-order
pub fn flatten(forest: &[FolderNode]) -> Vec<&FolderNode> {
    let mut result = Vec::new();
    let mut stack: Vec<&FolderNode> = forest.iter().rev().collect();
    while let Some(node) = stack.pop() {
        result.push(node);
        stack.extend(node.children.iter().rev());
    }
    result
}

pub fn node_count(forest: &[FolderNode]) -> usize {
    let mut count = 0;
    let mut stack: Vec<&FolderNode> = forest.iter().collect();
    while let Some(node) = stack.pop() {
        count += 1;
        stack.extend(node.children.iter());
    }
    count
}

/// Destination label for an optional selected folder
pub fn display_name(forest: &[FolderNode], selected: Option<&str>) -> String {
    match selected {
        None | Some("") => ROOT_LABEL.to_string(),
        Some(id) => find(forest, id)
            .map(|node| node.full_path.clone())
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, name: &str, parent: Option<&str>) -> FolderRecord {
        FolderRecord::new(id, name, parent)
    }

    fn names(nodes: &[FolderNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn test_docs_scenario() {
        let records = vec![
            rec("1", "Docs", None),
            rec("2", "2024", Some("1")),
            rec("3", "Jan", Some("2")),
        ];
        let forest = assemble(&records);

        assert_eq!(names(&forest), vec!["Docs"]);
        let docs = &forest[0];
        assert!(docs.has_children);
        assert_eq!(names(&docs.children), vec!["2024"]);
        let year = &docs.children[0];
        assert_eq!(names(&year.children), vec!["Jan"]);

        let jan = &year.children[0];
        assert_eq!(jan.full_path, "Docs / 2024 / Jan");
        assert_eq!(jan.depth, 2);
        assert!(!jan.has_children);
        assert_eq!(jan.parent_id.as_deref(), Some("2"));
    }

    #[test]
    fn test_children_sorted_case_insensitive() {
        let records = vec![
            rec("p", "Parent", None),
            rec("1", "b", Some("p")),
            rec("2", "A", Some("p")),
            rec("3", "c", Some("p")),
        ];
        let forest = assemble(&records);
        assert_eq!(names(&forest[0].children), vec!["A", "b", "c"]);
    }

    #[test]
    fn test_roots_sorted_with_ties_lowercase_first() {
        let records = vec![
            rec("1", "Photos", None),
            rec("2", "photos", None),
            rec("3", "archive", None),
        ];
        let forest = assemble(&records);
        assert_eq!(names(&forest), vec!["archive", "photos", "Photos"]);
    }

    #[test]
    fn test_accented_names_sort_with_their_base_letter() {
        let records = vec![
            rec("1", "Zoo", None),
            rec("2", "Été", None),
            rec("3", "Apple", None),
            rec("4", "photos", None),
            rec("5", "Photos", None),
        ];
        let forest = assemble(&records);
        assert_eq!(names(&forest), vec!["Apple", "Été", "photos", "Photos", "Zoo"]);
    }

    #[test]
    fn test_compare_names() {
        assert_eq!(compare_names("apple", "Banana"), Ordering::Less);
        assert_eq!(compare_names("ete", "été"), Ordering::Less);
        assert_eq!(compare_names("été", "f"), Ordering::Less);
        assert_eq!(compare_names("Docs", "docs"), Ordering::Greater);
        assert_eq!(compare_names("same", "same"), Ordering::Equal);
    }

    #[test]
    fn test_every_record_appears_once() {
        let records = vec![
            rec("1", "a", None),
            rec("2", "b", Some("1")),
            rec("3", "c", Some("1")),
            rec("4", "d", Some("3")),
            rec("5", "e", None),
            rec("6", "f", Some("5")),
        ];
        let forest = assemble(&records);
        assert_eq!(node_count(&forest), records.len());

        let mut ids: Vec<&str> = flatten(&forest).iter().map(|n| n.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5", "6"]);
    }

    #[test]
    fn test_path_and_depth_follow_parent() {
        let records = vec![
            rec("1", "a", None),
            rec("2", "b", Some("1")),
            rec("3", "c", Some("2")),
            rec("4", "d", Some("3")),
        ];
        let forest = assemble(&records);
        for node in flatten(&forest) {
            match &node.parent_id {
                Some(parent_id) => {
                    let parent = find(&forest, parent_id).unwrap();
                    assert_eq!(node.depth, parent.depth + 1);
                    assert_eq!(node.full_path, format!("{} / {}", parent.full_path, node.name));
                }
                None => {
                    assert_eq!(node.depth, 0);
                    assert_eq!(node.full_path, node.name);
                }
            }
        }
    }

    #[test]
    fn test_missing_parent_demoted_to_root() {
        let records = vec![rec("1", "Docs", None), rec("2", "Orphan", Some("gone"))];
        let forest = assemble(&records);

        assert_eq!(names(&forest), vec!["Docs", "Orphan"]);
        let orphan = find(&forest, "2").unwrap();
        assert_eq!(orphan.depth, 0);
        assert_eq!(orphan.full_path, "Orphan");
        assert_eq!(orphan.parent_id, None);
    }

    #[test]
    fn test_has_children_matches_parent_references() {
        let records = vec![
            rec("1", "a", None),
            rec("2", "b", Some("1")),
            rec("3", "c", None),
        ];
        let forest = assemble(&records);
        assert!(find(&forest, "1").unwrap().has_children);
        assert!(!find(&forest, "2").unwrap().has_children);
        assert!(!find(&forest, "3").unwrap().has_children);
    }

    #[test]
    fn test_cycle_members_become_roots() {
        let records = vec![
            rec("1", "a", Some("2")),
            rec("2", "b", Some("1")),
            rec("3", "c", Some("2")),
            rec("4", "self", Some("4")),
        ];
        let forest = assemble(&records);

        assert_eq!(node_count(&forest), 4);
        assert_eq!(names(&forest), vec!["a", "b", "self"]);
        let c = find(&forest, "3").unwrap();
        assert_eq!(c.full_path, "b / c");
        assert_eq!(c.depth, 1);
        // A self-parented folder has no other record pointing at it
        assert!(!find(&forest, "4").unwrap().has_children);
    }

    #[test]
    fn test_duplicate_ids_kept_once() {
        let records = vec![
            rec("1", "Docs", None),
            rec("1", "Docs copy", None),
            rec("2", "Sub", Some("1")),
        ];
        let forest = assemble(&records);
        assert_eq!(node_count(&forest), 2);
        assert_eq!(forest[0].name, "Docs");
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        const DEPTH: usize = 3000;
        let mut records = vec![rec("0", "d", None)];
        for i in 1..DEPTH {
            records.push(rec(&i.to_string(), "d", Some((i - 1).to_string().as_str())));
        }
        // Reversed input so children arrive before their parents
        records.reverse();

        let forest = assemble(&records);
        assert_eq!(forest.len(), 1);
        assert_eq!(node_count(&forest), DEPTH);
        assert_eq!(flatten(&forest).len(), DEPTH);

        let last = find(&forest, &(DEPTH - 1).to_string()).unwrap();
        assert_eq!(last.depth, DEPTH - 1);
        assert!(!last.has_children);
        assert_eq!(last.full_path.matches(PATH_SEPARATOR).count(), DEPTH - 1);
        drop(forest);
    }

    #[test]
    fn test_empty_input() {
        assert!(assemble(&[]).is_empty());
    }

    #[test]
    fn test_flatten_is_pre_order() {
        let records = vec![
            rec("1", "a", None),
            rec("2", "a1", Some("1")),
            rec("3", "a2", Some("1")),
            rec("4", "b", None),
        ];
        let forest = assemble(&records);
        let order: Vec<&str> = flatten(&forest).iter().map(|n| n.name.as_str()).collect();
        assert_eq!(order, vec!["a", "a1", "a2", "b"]);
    }

    #[test]
    fn test_display_name() {
        let records = vec![rec("1", "Docs", None), rec("2", "2024", Some("1"))];
        let forest = assemble(&records);
        assert_eq!(display_name(&forest, None), "Root Folder");
        assert_eq!(display_name(&forest, Some("")), "Root Folder");
        assert_eq!(display_name(&forest, Some("2")), "Docs / 2024");
        assert_eq!(display_name(&forest, Some("nope")), "Unknown Folder");
    }
}
