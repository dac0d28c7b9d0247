//! The per-storage red-black sibling tree.
//!
//! Nodes are directory entries addressed by SID; the tree does not own or allocate nodes, it
//! only reads and rewrites the `sid_left`/`sid_right`/`colour` fields already present on each
//! [`DirectoryEntry`]. Parent relationships are never persisted -- every operation tracks the
//! root-to-node path transiently in a `Vec<u32>` for the duration of the call.

use crate::consts::NOSTREAM;
use crate::directory::{compare_names, Colour, DirectoryEntry};
use crate::error::{CfbError, Result};

fn colour_of(entries: &[DirectoryEntry], sid: u32) -> Colour {
    if sid == NOSTREAM { Colour::Black } else { entries[sid as usize].colour }
}

fn set_colour(entries: &mut [DirectoryEntry], sid: u32, colour: Colour) {
    if sid != NOSTREAM {
        entries[sid as usize].colour = colour;
    }
}

/// Redirects whichever pointer currently references `old_child` to `new_child` instead.
/// `holder` is the SID of the node whose left/right field must change, or `None` if
/// `old_child` was the tree root (in which case `root` itself is updated).
fn reparent(entries: &mut [DirectoryEntry], holder: Option<u32>, old_child: u32, new_child: u32, root: &mut u32) {
    match holder {
        Some(h) => {
            if entries[h as usize].sid_left == old_child {
                entries[h as usize].sid_left = new_child;
            } else {
                entries[h as usize].sid_right = new_child;
            }
        }
        None => {
            *root = new_child;
        }
    }
}

/// Rotates left around `x`; returns the SID that now occupies `x`'s former position.
fn rotate_left(entries: &mut [DirectoryEntry], x: u32) -> u32 {
    let y = entries[x as usize].sid_right;
    let y_left = entries[y as usize].sid_left;
    entries[x as usize].sid_right = y_left;
    entries[y as usize].sid_left = x;
    y
}

/// Rotates right around `x`; returns the SID that now occupies `x`'s former position.
fn rotate_right(entries: &mut [DirectoryEntry], x: u32) -> u32 {
    let y = entries[x as usize].sid_left;
    let y_right = entries[y as usize].sid_right;
    entries[x as usize].sid_left = y_right;
    entries[y as usize].sid_right = x;
    y
}

/// Finds the SID of a child by name under `root`. Returns `None` if absent.
pub fn find(entries: &[DirectoryEntry], root: u32, name: &str) -> Option<u32> {
    let mut current = root;
    while current != NOSTREAM {
        let node = &entries[current as usize];
        match compare_names(name, &node.name) {
            std::cmp::Ordering::Equal => return Some(current),
            std::cmp::Ordering::Less => current = node.sid_left,
            std::cmp::Ordering::Greater => current = node.sid_right,
        }
    }
    None
}

/// In-order SIDs of the subtree rooted at `root` (ascending name order).
pub fn iter_inorder(entries: &[DirectoryEntry], root: u32) -> Vec<u32> {
    let mut out = Vec::new();
    let mut stack = Vec::new();
    let mut current = root;
    while current != NOSTREAM || !stack.is_empty() {
        while current != NOSTREAM {
            stack.push(current);
            current = entries[current as usize].sid_left;
        }
        current = stack.pop().unwrap();
        out.push(current);
        current = entries[current as usize].sid_right;
    }
    out
}

/// Inserts `new_sid` (already populated with its name) into the tree rooted at `root`.
/// Returns the new tree root. Fails with `Duplicated` if the name already exists.
pub fn insert(entries: &mut [DirectoryEntry], root: u32, new_sid: u32) -> Result<u32> {
    entries[new_sid as usize].sid_left = NOSTREAM;
    entries[new_sid as usize].sid_right = NOSTREAM;
    entries[new_sid as usize].colour = Colour::Red;

    if root == NOSTREAM {
        entries[new_sid as usize].colour = Colour::Black;
        return Ok(new_sid);
    }

    let mut path: Vec<u32> = Vec::new();
    let mut current = root;
    loop {
        let ordering = {
            let node = &entries[current as usize];
            compare_names(&entries[new_sid as usize].name, &node.name)
        };
        match ordering {
            std::cmp::Ordering::Equal => {
                return Err(CfbError::Duplicated(entries[new_sid as usize].name.clone()));
            }
            std::cmp::Ordering::Less => {
                path.push(current);
                let left = entries[current as usize].sid_left;
                if left == NOSTREAM {
                    entries[current as usize].sid_left = new_sid;
                    break;
                }
                current = left;
            }
            std::cmp::Ordering::Greater => {
                path.push(current);
                let right = entries[current as usize].sid_right;
                if right == NOSTREAM {
                    entries[current as usize].sid_right = new_sid;
                    break;
                }
                current = right;
            }
        }
    }

    let mut root = root;
    insert_fixup(entries, &mut path, new_sid, &mut root);
    set_colour(entries, root, Colour::Black);
    Ok(root)
}

fn insert_fixup(entries: &mut [DirectoryEntry], path: &mut Vec<u32>, mut z: u32, root: &mut u32) {
    loop {
        let Some(&parent) = path.last() else { break };
        if colour_of(entries, parent) != Colour::Red {
            break;
        }
        // parent is red, so it cannot be the tree root; a grandparent must exist.
        let grandparent = path[path.len() - 2];
        let great_grandparent = if path.len() >= 3 { Some(path[path.len() - 3]) } else { None };
        let parent_is_left = entries[grandparent as usize].sid_left == parent;
        let uncle = if parent_is_left { entries[grandparent as usize].sid_right } else { entries[grandparent as usize].sid_left };

        if colour_of(entries, uncle) == Colour::Red {
            set_colour(entries, parent, Colour::Black);
            set_colour(entries, uncle, Colour::Black);
            set_colour(entries, grandparent, Colour::Red);
            z = grandparent;
            path.pop();
            path.pop();
            continue;
        }

        let z_is_left = entries[parent as usize].sid_left == z;
        if parent_is_left {
            if !z_is_left {
                // left-right case: rotate left at parent first.
                let new_parent_subtree_root = rotate_left(entries, parent);
                entries[grandparent as usize].sid_left = new_parent_subtree_root;
                z = parent;
                // `z`'s old position is now occupied by `new_parent_subtree_root`;
                // continue into the left-left case using that as the new parent.
                let parent = new_parent_subtree_root;
                let new_root = rotate_right(entries, grandparent);
                reparent(entries, great_grandparent, grandparent, new_root, root);
                set_colour(entries, parent, Colour::Black);
                set_colour(entries, grandparent, Colour::Red);
            } else {
                let new_root = rotate_right(entries, grandparent);
                reparent(entries, great_grandparent, grandparent, new_root, root);
                set_colour(entries, parent, Colour::Black);
                set_colour(entries, grandparent, Colour::Red);
            }
        } else if z_is_left {
            let new_parent_subtree_root = rotate_right(entries, parent);
            entries[grandparent as usize].sid_right = new_parent_subtree_root;
            let parent = new_parent_subtree_root;
            let new_root = rotate_left(entries, grandparent);
            reparent(entries, great_grandparent, grandparent, new_root, root);
            set_colour(entries, parent, Colour::Black);
            set_colour(entries, grandparent, Colour::Red);
        } else {
            let new_root = rotate_left(entries, grandparent);
            reparent(entries, great_grandparent, grandparent, new_root, root);
            set_colour(entries, parent, Colour::Black);
            set_colour(entries, grandparent, Colour::Red);
        }
        break;
    }
}

/// Result of a deletion: the tree's new root, and -- when the target had two children -- the
/// SID that was actually unlinked from the tree structure and must be tombstoned by the caller.
pub struct DeleteOutcome {
    pub new_root: u32,
    pub unlinked_sid: u32,
}

/// Removes `target` (by SID) from the tree rooted at `root`.
///
/// When `target` has two children, its directory-entry *content* is overwritten with its
/// in-order predecessor's content, and the predecessor's original SID is the one physically
/// unlinked from the tree; [`DeleteOutcome::unlinked_sid`] tells the caller which directory
/// slot to tombstone, which may differ from `target`.
pub fn delete(entries: &mut [DirectoryEntry], root: u32, target: u32) -> Result<DeleteOutcome> {
    // Build the root-to-target path.
    let mut path: Vec<u32> = Vec::new();
    let mut current = root;
    while current != target {
        if current == NOSTREAM {
            return Err(CfbError::Corrupted("delete target not reachable from root".into()));
        }
        path.push(current);
        let ordering = compare_names(&entries[target as usize].name, &entries[current as usize].name);
        current = match ordering {
            std::cmp::Ordering::Less => entries[current as usize].sid_left,
            std::cmp::Ordering::Greater => entries[current as usize].sid_right,
            std::cmp::Ordering::Equal => break,
        };
    }

    let has_left = entries[target as usize].sid_left != NOSTREAM;
    let has_right = entries[target as usize].sid_right != NOSTREAM;

    let mut root = root;
    let physically_removed;

    if has_left && has_right {
        // Find in-order predecessor: rightmost node of target's left subtree.
        path.push(target);
        let mut pred = entries[target as usize].sid_left;
        while entries[pred as usize].sid_right != NOSTREAM {
            path.push(pred);
            pred = entries[pred as usize].sid_right;
        }
        // Copy predecessor's domain content into target's slot; tree structure (left/right/
        // colour) at `target` is untouched, only the name/metadata "key" moves.
        let pred_entry = entries[pred as usize].clone();
        {
            let t = &mut entries[target as usize];
            t.name = pred_entry.name;
            t.clsid = pred_entry.clsid;
            t.state_bits = pred_entry.state_bits;
            t.ctime = pred_entry.ctime;
            t.mtime = pred_entry.mtime;
            t.start_sector = pred_entry.start_sector;
            t.size = pred_entry.size;
            t.entry_type = pred_entry.entry_type;
        }
        physically_removed = splice_out(entries, &mut path, pred, &mut root);
    } else {
        physically_removed = splice_out(entries, &mut path, target, &mut root);
    }

    Ok(DeleteOutcome { new_root: root, unlinked_sid: physically_removed })
}

/// Splices a node with at most one child out of the tree and rebalances. `path` is the
/// root-to-parent-of(`node`) ancestor chain. Returns `node` (the physically removed SID).
fn splice_out(entries: &mut [DirectoryEntry], path: &mut Vec<u32>, node: u32, root: &mut u32) -> u32 {
    let child = if entries[node as usize].sid_left != NOSTREAM {
        entries[node as usize].sid_left
    } else {
        entries[node as usize].sid_right
    };
    let node_colour = entries[node as usize].colour;
    let parent = path.last().copied();

    reparent(entries, parent, node, child, root);

    if node_colour == Colour::Black {
        if colour_of(entries, child) == Colour::Red {
            set_colour(entries, child, Colour::Black);
        } else {
            delete_fixup(entries, path, child, root);
        }
    }
    node
}

fn sibling_of(entries: &[DirectoryEntry], parent: u32, child: u32) -> u32 {
    if entries[parent as usize].sid_left == child {
        entries[parent as usize].sid_right
    } else {
        entries[parent as usize].sid_left
    }
}

fn delete_fixup(entries: &mut [DirectoryEntry], path: &mut Vec<u32>, mut x: u32, root: &mut u32) {
    while x != *root && colour_of(entries, x) == Colour::Black {
        let Some(&parent) = path.last() else { break };
        let grandparent = if path.len() >= 2 { Some(path[path.len() - 2]) } else { None };
        let x_is_left = entries[parent as usize].sid_left == x;
        let mut sibling = sibling_of(entries, parent, x);

        if colour_of(entries, sibling) == Colour::Red {
            set_colour(entries, sibling, Colour::Black);
            set_colour(entries, parent, Colour::Red);
            let new_parent_subtree_root = if x_is_left {
                rotate_left(entries, parent)
            } else {
                rotate_right(entries, parent)
            };
            reparent(entries, grandparent, parent, new_parent_subtree_root, root);
            path.push(new_parent_subtree_root);
            sibling = sibling_of(entries, parent, x);
        }

        let sib_left_black = colour_of(entries, entries[sibling as usize].sid_left) == Colour::Black;
        let sib_right_black = colour_of(entries, entries[sibling as usize].sid_right) == Colour::Black;

        if sib_left_black && sib_right_black {
            set_colour(entries, sibling, Colour::Red);
            x = path.pop().unwrap_or(parent);
            if x == parent {
                // path already exhausted; stop, loop condition re-checks against root.
            }
            continue;
        }

        if x_is_left && sib_right_black {
            set_colour(entries, entries[sibling as usize].sid_left, Colour::Black);
            set_colour(entries, sibling, Colour::Red);
            let new_sibling_subtree_root = rotate_right(entries, sibling);
            entries[parent as usize].sid_right = new_sibling_subtree_root;
            sibling = new_sibling_subtree_root;
        } else if !x_is_left && sib_left_black {
            set_colour(entries, entries[sibling as usize].sid_right, Colour::Black);
            set_colour(entries, sibling, Colour::Red);
            let new_sibling_subtree_root = rotate_left(entries, sibling);
            entries[parent as usize].sid_left = new_sibling_subtree_root;
            sibling = new_sibling_subtree_root;
        }

        set_colour(entries, sibling, colour_of(entries, parent));
        set_colour(entries, parent, Colour::Black);
        if x_is_left {
            set_colour(entries, entries[sibling as usize].sid_right, Colour::Black);
            let new_root = rotate_left(entries, parent);
            reparent(entries, grandparent, parent, new_root, root);
        } else {
            set_colour(entries, entries[sibling as usize].sid_left, Colour::Black);
            let new_root = rotate_right(entries, parent);
            reparent(entries, grandparent, parent, new_root, root);
        }
        x = *root;
        break;
    }
    set_colour(entries, x, Colour::Black);
}

/// Verifies the three red-black invariants on the subtree rooted at `root`:
/// the root is black, no red node has a red child, and every root-to-leaf path has the
/// same black height. Returns the black height on success.
pub fn verify_invariants(entries: &[DirectoryEntry], root: u32) -> Result<usize> {
    if root != NOSTREAM && colour_of(entries, root) != Colour::Black {
        return Err(CfbError::Corrupted("red-black tree root is not black".into()));
    }
    verify_node(entries, root)
}

fn verify_node(entries: &[DirectoryEntry], node: u32) -> Result<usize> {
    if node == NOSTREAM {
        return Ok(1); // a null leaf counts as black.
    }
    let colour = entries[node as usize].colour;
    if colour == Colour::Red {
        let left = entries[node as usize].sid_left;
        let right = entries[node as usize].sid_right;
        if colour_of(entries, left) == Colour::Red || colour_of(entries, right) == Colour::Red {
            return Err(CfbError::Corrupted(format!("red node {node} has a red child")));
        }
    }
    let left_height = verify_node(entries, entries[node as usize].sid_left)?;
    let right_height = verify_node(entries, entries[node as usize].sid_right)?;
    if left_height != right_height {
        return Err(CfbError::Corrupted(format!(
            "unequal black heights at node {node}: {left_height} vs {right_height}"
        )));
    }
    Ok(left_height + if colour == Colour::Black { 1 } else { 0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::EntryType;

    fn make_entries(names: &[&str]) -> Vec<DirectoryEntry> {
        names
            .iter()
            .map(|n| DirectoryEntry::new(n, EntryType::Stream).unwrap())
            .collect()
    }

    fn build_tree(names: &[&str]) -> (Vec<DirectoryEntry>, u32) {
        let mut entries = make_entries(names);
        let mut root = NOSTREAM;
        for sid in 0..entries.len() as u32 {
            root = insert(&mut entries, root, sid).unwrap();
        }
        (entries, root)
    }

    #[test]
    fn insert_maintains_invariants_for_25_entries() {
        let names: Vec<String> = (0..25).map(|i| format!("Entry{i:03}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (entries, root) = build_tree(&refs);
        verify_invariants(&entries, root).unwrap();
        assert_eq!(iter_inorder(&entries, root).len(), 25);
    }

    #[test]
    fn insert_maintains_invariants_for_10_000_entries() {
        let names: Vec<String> = (0..10_000).map(|i| format!("Entry{i:05}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (entries, root) = build_tree(&refs);
        verify_invariants(&entries, root).unwrap();
        assert_eq!(iter_inorder(&entries, root).len(), 10_000);
    }

    #[test]
    fn find_locates_inserted_names() {
        let (entries, root) = build_tree(&["Bravo", "Alpha", "Charlie", "Delta"]);
        assert!(find(&entries, root, "Alpha").is_some());
        assert!(find(&entries, root, "Zulu").is_none());
    }

    #[test]
    fn duplicate_name_insert_fails() {
        let mut entries = make_entries(&["Alpha", "Alpha"]);
        let root = insert(&mut entries, NOSTREAM, 0).unwrap();
        assert!(insert(&mut entries, root, 1).is_err());
    }

    #[test]
    fn iter_inorder_is_sorted_by_format_ordering() {
        let (entries, root) = build_tree(&["Zulu", "Bravo", "Alpha", "Mike"]);
        let order: Vec<String> = iter_inorder(&entries, root)
            .into_iter()
            .map(|sid| entries[sid as usize].name.clone())
            .collect();
        let mut expected = order.clone();
        expected.sort_by(|a, b| compare_names(a, b));
        assert_eq!(order, expected);
    }

    #[test]
    fn delete_two_child_node_unlinks_predecessor() {
        let (mut entries, mut root) = build_tree(&["B", "A", "D", "C", "E"]);
        let target = find(&entries, root, "D").unwrap();
        let outcome = delete(&mut entries, root, target).unwrap();
        root = outcome.new_root;
        verify_invariants(&entries, root).unwrap();

        let remaining: Vec<String> = iter_inorder(&entries, root)
            .into_iter()
            .map(|sid| entries[sid as usize].name.clone())
            .collect();
        assert_eq!(remaining, vec!["A", "B", "C", "E"]);
        // "D" survives logically (content copied from predecessor "C" into target's slot,
        // unless "D" itself was the predecessor), while the physically unlinked slot must be
        // tombstoned by the caller.
        assert_ne!(outcome.unlinked_sid, u32::MAX);
    }

    #[test]
    fn delete_every_node_preserves_invariants_at_each_step() {
        let names: Vec<String> = (0..200).map(|i| format!("Item{i:04}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (mut entries, mut root) = build_tree(&refs);

        for name in &refs {
            let Some(target) = find(&entries, root, name) else { continue };
            let outcome = delete(&mut entries, root, target).unwrap();
            root = outcome.new_root;
            entries[outcome.unlinked_sid as usize] = DirectoryEntry::invalid(outcome.unlinked_sid);
            if root != NOSTREAM {
                verify_invariants(&entries, root).unwrap();
            }
        }
        assert_eq!(root, NOSTREAM);
    }
}
