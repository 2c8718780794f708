//! Notebook tree: flat `notebook_pages` rows linked by `parent_id`.

use std::collections::HashMap;

use super::models::{NotebookNode, NotebookPage};

/// Assemble the sidebar tree. Children are ordered by `(position, id)`.
/// Pages whose parent is missing are shown at the root rather than dropped.
pub fn build_tree(pages: &[NotebookPage]) -> Vec<NotebookNode> {
    let ids: std::collections::HashSet<i64> = pages.iter().map(|p| p.id).collect();
    let mut children: HashMap<Option<i64>, Vec<&NotebookPage>> = HashMap::new();
    for page in pages {
        let parent = page.parent_id.filter(|p| ids.contains(p) && *p != page.id);
        children.entry(parent).or_default().push(page);
    }
    for list in children.values_mut() {
        list.sort_by_key(|p| (p.position, p.id));
    }
    // Rows caught in a parent cycle never hang off the root; the visited set
    // keeps such data from recursing forever.
    let mut visited = std::collections::HashSet::new();
    attach(None, &children, &mut visited)
}

fn attach(
    parent: Option<i64>,
    children: &HashMap<Option<i64>, Vec<&NotebookPage>>,
    visited: &mut std::collections::HashSet<i64>,
) -> Vec<NotebookNode> {
    let Some(list) = children.get(&parent) else {
        return Vec::new();
    };
    let mut nodes = Vec::with_capacity(list.len());
    for page in list {
        if !visited.insert(page.id) {
            continue;
        }
        nodes.push(NotebookNode {
            page: (*page).clone(),
            children: attach(Some(page.id), children, visited),
        });
    }
    nodes
}

/// True when making `new_parent` the parent of `page_id` would put the page
/// under itself: walk up from `new_parent` and look for `page_id`.
pub fn would_create_cycle(pages: &[NotebookPage], page_id: i64, new_parent: Option<i64>) -> bool {
    let parents: HashMap<i64, Option<i64>> = pages.iter().map(|p| (p.id, p.parent_id)).collect();
    let mut current = new_parent;
    // Each step visits a distinct page in well-formed data.
    for _ in 0..=parents.len() {
        match current {
            None => return false,
            Some(id) if id == page_id => return true,
            Some(id) => current = parents.get(&id).copied().flatten(),
        }
    }
    // Walked further than there are pages: the stored data already loops.
    true
}

/// Ids of `page_id` and everything below it.
pub fn subtree_ids(pages: &[NotebookPage], page_id: i64) -> Vec<i64> {
    let mut out = vec![page_id];
    let mut i = 0;
    while i < out.len() {
        let id = out[i];
        let children: Vec<i64> = pages
            .iter()
            .filter(|p| p.parent_id == Some(id) && !out.contains(&p.id))
            .map(|p| p.id)
            .collect();
        out.extend(children);
        i += 1;
    }
    out
}

/// Ids of the pages under `parent`, in display order.
pub fn sibling_ids(pages: &[NotebookPage], parent: Option<i64>) -> Vec<i64> {
    let mut siblings: Vec<&NotebookPage> = pages.iter().filter(|p| p.parent_id == parent).collect();
    siblings.sort_by_key(|p| (p.position, p.id));
    siblings.into_iter().map(|p| p.id).collect()
}
