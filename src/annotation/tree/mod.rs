//! Augmented red-black tree of annotation runs.
//!
//! Leaves are intervals: runs of consecutive positions that (usually) share
//! identical annotations. Every node stores the length of its subtree and a
//! local map of key-value pairs common to all positions below it. A pair both
//! children agree on is moved up to their parent ("propagation"), and two
//! sibling leaves with nothing left in their maps are merged. Every position
//! has a value for every known key, so "where does this key change next"
//! queries can skip whole subtrees.
//!
//! Splitting a leaf adds an internal node, which may trigger rotations that
//! confuse an in-progress walk. Updates therefore only modify part of the
//! range when they split, let the tree rebalance, and restart from the root
//! for the remainder. Leaves emptied by merges or deletions are queued and
//! removed after the update is complete.
//!
//! Newly inserted positions inherit the annotations of the leaf they extend.
//! A sentinel position at raw index 0, null for every key, gives insertions
//! at the start something to extend. Public indices are raw indices minus one.

mod check;
mod node;
mod rotate;

use std::mem;
use std::sync::Arc;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::annotation::AnnotationMap;
use crate::annotation::AnnotationValue;
use crate::annotation::Key;
use crate::error::check_index;
use crate::error::check_range;

pub(crate) use node::Kind;
pub(crate) use node::LocalMap;
pub(crate) use node::Node;
pub(crate) use node::NodeIdx;
pub(crate) use node::Slot;
pub(crate) use node::HEADER;
pub(crate) use node::NONE;

/// Random-access annotation storage without a cursor.
///
/// All indices are public indices in `0..len()`. Ranges are half-open.
#[derive(Clone, Debug)]
pub struct BasicAnnotationTree<V> {
    pub(crate) nodes: Vec<Node<V>>,
    pub(crate) free: Vec<NodeIdx>,
    pub(crate) known_keys: FxHashSet<Key>,
    /// Leaves whose length dropped to zero during the current update.
    pub(crate) pending: Vec<NodeIdx>,
}

impl<V: AnnotationValue> Default for BasicAnnotationTree<V> {
    fn default() -> Self {
        return Self::new();
    }
}

impl<V: AnnotationValue> BasicAnnotationTree<V> {
    /// An empty tree: a header and a root leaf holding the sentinel position.
    pub fn new() -> BasicAnnotationTree<V> {
        let mut header = Node::new(Kind::Black, 0, LocalMap::default());
        header.left = 1;
        let mut root = Node::new(Kind::Leaf, 1, LocalMap::default());
        root.parent = HEADER;
        return BasicAnnotationTree {
            nodes: vec![header, root],
            free: Vec::new(),
            known_keys: FxHashSet::default(),
            pending: Vec::new(),
        };
    }

    /// Number of positions, excluding the sentinel.
    pub fn len(&self) -> usize {
        return self.len_of(self.root()) - 1;
    }

    pub fn is_empty(&self) -> bool {
        return self.len() == 0;
    }

    /// Every key that has been set and not yet found to be null everywhere.
    pub fn known_keys(&self) -> &FxHashSet<Key> {
        return &self.known_keys;
    }

    fn intern(&mut self, key: &str) -> Key {
        if let Some(key) = self.known_keys.get(key) {
            return key.clone();
        }
        let key: Key = Arc::from(key);
        let root = self.root();
        self.node_mut(root).map.insert(key.clone(), Slot::Value(None));
        self.known_keys.insert(key.clone());
        return key;
    }

    // ============================================================
    // Queries
    // ============================================================

    fn get_slot_raw(&self, index: usize, key: &str) -> Option<&Slot<V>> {
        let mut node = self.root();
        let mut index = index;
        loop {
            let n = self.node(node);
            if let Some(slot) = n.map.get(key) {
                return Some(slot);
            }
            if n.is_leaf() {
                return None;
            }
            let left_len = self.len_of(n.left);
            if index < left_len {
                node = n.left;
            } else {
                index -= left_len;
                node = n.right;
            }
        }
    }

    /// The value of `key` at `index`.
    pub fn get_annotation(&self, index: usize, key: &str) -> Option<&V> {
        check_index(index, self.len());
        if !self.known_keys.contains(key) {
            return None;
        }
        return self.get_slot_raw(index + 1, key).and_then(Slot::value);
    }

    /// Visit each key recorded along the path to `index`. Every known key is
    /// visited exactly once.
    pub fn for_each_annotation_at(&self, index: usize, f: &mut dyn FnMut(&str, Option<&V>)) {
        check_index(index, self.len());
        let index = index + 1;
        let mut node = self.root();
        let mut node_start = 0;
        loop {
            let n = self.node(node);
            for (key, slot) in &n.map {
                f(key, slot.value());
            }
            if n.is_leaf() {
                return;
            }
            let left_len = self.len_of(n.left);
            if index < node_start + left_len {
                node = n.left;
            } else {
                node = n.right;
                node_start += left_len;
            }
        }
    }

    /// Add the annotations at `index` to `accu`, overwriting existing entries.
    pub fn collect_all_annotations_at(&self, index: usize, accu: &mut AnnotationMap<V>) {
        self.for_each_annotation_at(index, &mut |key, value| {
            let key = match accu.get_key_value(key) {
                Some((key, _)) => key.clone(),
                None => Arc::from(key),
            };
            accu.insert(key, value.cloned());
        });
    }

    fn first_annotation_change_raw(&self, start: usize, end: usize, key: &str, from: Option<&V>) -> Option<usize> {
        let mut node = self.root();
        let mut node_start = 0;

        'outer: loop {
            if node_start >= end {
                return None;
            }
            let n = self.node(node);
            if let Some(slot) = n.map.get(key) {
                if !slot.is(from) {
                    return Some(node_start.max(start));
                }
                // Nothing differs below this node; move on to the next subtree.
                loop {
                    if self.is_root(node) {
                        return None;
                    }
                    if self.is_left_child(node) {
                        node_start += self.len_of(node);
                        node = self.right(self.parent(node));
                        continue 'outer;
                    }
                    let parent = self.parent(node);
                    node_start -= self.len_of(self.left(parent));
                    node = parent;
                }
            }
            if n.is_leaf() {
                return None;
            }
            let left_len = self.len_of(n.left);
            if start >= node_start + left_len {
                node_start += left_len;
                node = n.right;
            } else {
                node = n.left;
            }
        }
    }

    fn last_annotation_change_raw(&self, start: usize, end: usize, key: &str, from: Option<&V>) -> Option<usize> {
        let mut node = self.root();
        let mut node_end = self.len_of(node);

        'outer: loop {
            if node_end <= start {
                return None;
            }
            let n = self.node(node);
            if let Some(slot) = n.map.get(key) {
                if !slot.is(from) {
                    return Some(node_end.min(end));
                }
                loop {
                    if self.is_root(node) {
                        return None;
                    }
                    if !self.is_left_child(node) {
                        node_end -= self.len_of(node);
                        node = self.left(self.parent(node));
                        continue 'outer;
                    }
                    let parent = self.parent(node);
                    node_end += self.len_of(self.right(parent));
                    node = parent;
                }
            }
            if n.is_leaf() {
                return None;
            }
            let right_len = self.len_of(n.right);
            if end <= node_end - right_len {
                node_end -= right_len;
                node = n.left;
            } else {
                node = n.right;
            }
        }
    }

    /// The first index in `start..end` whose value for `key` is not `from`.
    pub fn first_annotation_change(&self, start: usize, end: usize, key: &str, from: Option<&V>) -> Option<usize> {
        check_range(start, end, self.len());
        if start >= end {
            return None;
        }
        if !self.known_keys.contains(key) {
            return if from.is_none() { None } else { Some(start) };
        }
        let pos = self.first_annotation_change_raw(start + 1, end + 1, key, from)?;
        debug_assert!(pos != 0);
        return Some(pos - 1);
    }

    /// One past the last index in `start..end` whose value for `key` is not
    /// `from`.
    pub fn last_annotation_change(&self, start: usize, end: usize, key: &str, from: Option<&V>) -> Option<usize> {
        check_range(start, end, self.len());
        if start >= end {
            return None;
        }
        if !self.known_keys.contains(key) {
            return if from.is_none() { None } else { Some(end) };
        }
        let pos = self.last_annotation_change_raw(start + 1, end + 1, key, from)?;
        debug_assert!(pos != 0);
        return Some(pos - 1);
    }

    // ============================================================
    // Structural helpers
    // ============================================================

    /// Remove `key` from every local map in the subtree at `node` down to the
    /// nodes that define it.
    fn erase_annotations(&mut self, node: NodeIdx, key: &str) {
        if self.node_mut(node).map.remove(key).is_some() {
            return;
        }
        if self.is_leaf(node) {
            debug_assert!(false, "key {key} not covered below node {node}");
            return;
        }
        let (left, right) = (self.left(node), self.right(node));
        self.erase_annotations(left, key);
        self.erase_annotations(right, key);
        self.try_merge_children(node);
    }

    /// Merge two sibling leaves whose maps are both empty. The right leaf is
    /// emptied and queued for removal.
    pub(crate) fn try_merge_children(&mut self, node: NodeIdx) {
        if node == HEADER {
            return;
        }
        let n = self.node(node);
        debug_assert!(!n.is_leaf());
        let (left, right) = (n.left, n.right);
        let (l, r) = (self.node(left), self.node(right));
        if !(l.is_leaf() && r.is_leaf() && l.map.is_empty() && r.map.is_empty()) {
            return;
        }
        let right_len = r.len;
        if right_len == 0 || l.len == 0 {
            return;
        }
        self.node_mut(left).len += right_len;
        self.node_mut(right).len = 0;
        self.pending.push(right);
    }

    /// Move `key` up into `node` if both children hold the same value for it,
    /// then keep going towards the root. Returns whether anything moved.
    fn try_propagate(&mut self, node: NodeIdx, key: &str) -> bool {
        if node == HEADER {
            return false;
        }
        let (left, right) = (self.left(node), self.right(node));
        let agree = match (self.node(left).map.get(key), self.node(right).map.get(key)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
        if !agree {
            return false;
        }
        self.node_mut(right).map.remove(key);
        let Some((key, slot)) = self.node_mut(left).map.remove_entry(key) else {
            return false;
        };
        self.node_mut(node).map.insert(key.clone(), slot);
        self.try_merge_children(node);
        let parent = self.parent(node);
        self.try_propagate(parent, &key);
        return true;
    }

    /// Move `key` from an internal node into both of its children.
    fn push_key_into_children(&mut self, node: NodeIdx, key: &str) {
        debug_assert!(!self.is_leaf(node));
        let Some((key, slot)) = self.node_mut(node).map.remove_entry(key) else {
            debug_assert!(false, "pushing a key the node does not hold");
            return;
        };
        let (left, right) = (self.left(node), self.right(node));
        self.node_mut(left).map.insert(key.clone(), slot.clone());
        self.node_mut(right).map.insert(key, slot);
    }

    /// Replace `leaf` with a new red internal node over two leaves of lengths
    /// `at` and `len - at`. The new node takes over the leaf's map. The
    /// caller rebalances once the children are in the state it expects.
    fn split_node(&mut self, leaf: NodeIdx, at: usize) -> NodeIdx {
        debug_assert!(self.is_leaf(leaf));
        let len = self.len_of(leaf);
        let map = mem::take(&mut self.node_mut(leaf).map);
        let parent = self.alloc(Kind::Red, len, map);
        let left = self.alloc(Kind::Leaf, at, LocalMap::default());
        let right = self.alloc(Kind::Leaf, len - at, LocalMap::default());
        self.node_mut(left).parent = parent;
        self.node_mut(right).parent = parent;
        self.node_mut(parent).left = left;
        self.node_mut(parent).right = right;
        self.replace_with(leaf, parent);
        self.release(leaf);
        return parent;
    }

    // ============================================================
    // Updates
    // ============================================================

    /// Set `key = value` on the part of `leaf` between the relative offsets
    /// `start` and `end`. Returns the absolute position to restart from when
    /// the tree changed shape, `None` to continue the walk.
    fn set_annotation_for_leaf(
        &mut self,
        leaf: NodeIdx,
        node_start: usize,
        start: usize,
        end: usize,
        key: &Key,
        value: &Option<V>,
    ) -> Option<usize> {
        let len = self.len_of(leaf);
        let end = end.min(len);
        if start >= end {
            return None;
        }
        let previous = match self.node(leaf).map.get(&**key) {
            Some(slot) if slot.is(value.as_ref()) => return None,
            Some(slot) => slot.clone(),
            None => Slot::Value(None),
        };

        if start == 0 && end == len {
            self.node_mut(leaf).map.insert(key.clone(), Slot::Value(value.clone()));
            let parent = self.parent(leaf);
            if self.try_propagate(parent, key) {
                return Some(node_start + end);
            }
            return None;
        }

        if start == 0 {
            let parent = self.split_node(leaf, end);
            self.push_key_into_children(parent, key);
            let left = self.left(parent);
            self.set_annotation_for_leaf(left, node_start, start, end, key, value);
            self.try_propagate(parent, key);
            self.rebalance_after_insertion(parent);
            return Some(node_start + end);
        }

        if end == len {
            let parent = self.split_node(leaf, start);
            self.push_key_into_children(parent, key);
            let right = self.right(parent);
            self.set_annotation_for_leaf(right, node_start + start, 0, end - start, key, value);
            self.try_propagate(parent, key);
            self.rebalance_after_insertion(parent);
            return Some(node_start + end);
        }

        // Somewhere in the middle. Split off the left part first; the right
        // remainder temporarily holds a placeholder so that neither of its
        // neighbours can propagate with it while the tree rebalances.
        let index_on_right = node_start + len;
        let value_on_right = if index_on_right == self.len_of(self.root()) {
            Slot::Value(None)
        } else {
            self.get_slot_raw(index_on_right, key).cloned().unwrap_or(Slot::Value(None))
        };

        let parent = self.split_node(leaf, start);
        self.push_key_into_children(parent, key);
        let temporary_right = self.right(parent);
        let placeholder = Slot::placeholder_distinct_from(&previous, &value_on_right);
        self.node_mut(temporary_right).map.insert(key.clone(), placeholder);
        self.rebalance_after_insertion(parent);
        self.node_mut(temporary_right).map.insert(key.clone(), previous);

        // Leaves keep their ranges through rotations, so the offsets still
        // hold for the remainder.
        let parent = self.split_node(temporary_right, end - start);
        self.push_key_into_children(parent, key);
        let middle = self.left(parent);
        self.set_annotation_for_leaf(middle, node_start + start, 0, end - start, key, value);
        self.try_propagate(parent, key);
        self.rebalance_after_insertion(parent);
        return Some(node_start + end);
    }

    /// One pass of a range update over raw positions. Returns where to
    /// restart if the pass had to stop early.
    fn set_annotation_raw(&mut self, start: usize, end: usize, key: &Key, value: &Option<V>) -> Option<usize> {
        let mut node = self.root();
        let mut node_start = 0;

        'outer: loop {
            if end <= node_start {
                return None;
            }
            let holds = self.node(node).map.get(&**key).is_some_and(|slot| slot.is(value.as_ref()));
            if !holds {
                let node_end = node_start + self.len_of(node);
                if start <= node_start && end >= node_end {
                    self.erase_annotations(node, key);
                    self.node_mut(node).map.insert(key.clone(), Slot::Value(value.clone()));
                    let parent = self.parent(node);
                    if self.try_propagate(parent, key) {
                        return Some(node_end);
                    }
                } else if self.is_leaf(node) {
                    let relative_start = start.saturating_sub(node_start);
                    let restart =
                        self.set_annotation_for_leaf(node, node_start, relative_start, end - node_start, key, value);
                    if restart.is_some() {
                        return restart;
                    }
                } else {
                    if self.node(node).map.contains_key(&**key) {
                        self.push_key_into_children(node, key);
                    }
                    let left = self.left(node);
                    let left_len = self.len_of(left);
                    if start < node_start + left_len {
                        node = left;
                    } else {
                        node_start += left_len;
                        node = self.right(node);
                    }
                    continue 'outer;
                }
            }

            // Next node in document order.
            loop {
                if self.is_root(node) {
                    return None;
                }
                if self.is_left_child(node) {
                    node_start += self.len_of(node);
                    node = self.right(self.parent(node));
                    continue 'outer;
                }
                let parent = self.parent(node);
                node_start -= self.len_of(self.left(parent));
                node = parent;
            }
        }
    }

    /// Set `key = value` for every position in `start..end`.
    pub fn set_annotation(&mut self, start: usize, end: usize, key: &str, value: Option<V>) {
        check_range(start, end, self.len());
        if start >= end {
            return;
        }
        let key = self.intern(key);
        let mut current = start + 1;
        let end = end + 1;
        while let Some(restart) = self.set_annotation_raw(current, end, &key, &value) {
            current = restart;
        }
        self.cleanup_pending();
    }

    fn insert_raw(&mut self, first_shifted: usize, len: usize) {
        let mut node = self.root();
        let mut node_start = 0;
        loop {
            self.node_mut(node).len += len;
            if self.is_leaf(node) {
                return;
            }
            let left = self.left(node);
            let left_len = self.len_of(left);
            if first_shifted <= node_start + left_len {
                node = left;
            } else {
                node_start += left_len;
                node = self.right(node);
            }
        }
    }

    /// Insert `len` positions before `first_shifted`. They take the
    /// annotations of the position to their left, or null at the start.
    pub fn insert(&mut self, first_shifted: usize, len: usize) {
        if first_shifted > self.len() {
            crate::error::CursorError::IndexOutOfBounds {
                index: first_shifted,
                size: self.len(),
            }
            .raise();
        }
        if len == 0 {
            return;
        }
        self.insert_raw(first_shifted + 1, len);
    }

    fn delete_raw(&mut self, start: usize, end: usize) {
        let mut node = self.root();
        let mut node_start = 0;
        let mut end = end;

        'outer: loop {
            if end <= node_start {
                return;
            }
            let node_end = node_start + self.len_of(node);
            debug_assert!(start < node_end);
            let deletion = node_end.min(end) - node_start.max(start);
            debug_assert!(deletion > 0);
            self.node_mut(node).len -= deletion;

            if !self.is_leaf(node) {
                let left = self.left(node);
                let left_len = self.len_of(left);
                if start < node_start + left_len {
                    node = left;
                } else {
                    node_start += left_len;
                    node = self.right(node);
                }
                continue 'outer;
            }

            // Positions after the deleted ones have moved left.
            end -= deletion;
            if self.len_of(node) == 0 {
                self.pending.push(node);
            }

            loop {
                if self.is_root(node) {
                    return;
                }
                if self.is_left_child(node) {
                    node_start += self.len_of(node);
                    node = self.right(self.parent(node));
                    continue 'outer;
                }
                let parent = self.parent(node);
                node_start -= self.len_of(self.left(parent));
                node = parent;
            }
        }
    }

    /// Remove the positions in `start..end`.
    pub fn delete(&mut self, start: usize, end: usize) {
        check_range(start, end, self.len());
        if start >= end {
            return;
        }
        self.delete_raw(start + 1, end + 1);
        self.cleanup_pending();
    }

    // ============================================================
    // Cleanup
    // ============================================================

    /// Before a zero-length subtree disappears, hand its sibling's map to the
    /// parent so the surviving positions keep their values.
    fn propagate_from_dying_subtree(&mut self, leaf: NodeIdx) {
        let mut child = leaf;
        let mut parent = self.parent(child);
        while self.len_of(parent) == 0 {
            child = parent;
            parent = self.parent(child);
        }
        let sibling = self.sibling(child);
        let entries = mem::take(&mut self.node_mut(sibling).map);
        let keys: SmallVec<[Key; 8]> = entries.keys().cloned().collect();
        self.node_mut(parent).map.extend(entries);
        let grandparent = self.parent(parent);
        for key in keys {
            self.try_propagate(grandparent, &key);
        }
    }

    /// Remove `node` if one of its children (or the node itself) is empty.
    fn try_collapse(&mut self, node: NodeIdx) {
        if node == HEADER || self.is_leaf(node) {
            return;
        }
        let (left, right) = (self.left(node), self.right(node));
        if self.len_of(node) == 0 {
            // Every leaf below `right` is already queued.
            self.replace_with_sole_child(node, right);
            return;
        }
        if self.len_of(left) == 0 {
            let map = mem::take(&mut self.node_mut(node).map);
            self.node_mut(right).map.extend(map);
            self.replace_with_sole_child(node, right);
            return;
        }
        if self.len_of(right) == 0 {
            let map = mem::take(&mut self.node_mut(node).map);
            self.node_mut(left).map.extend(map);
            self.replace_with_sole_child(node, left);
        }
    }

    /// Hang `child` where `node` was and drop `node` with its other subtree.
    fn replace_with_sole_child(&mut self, node: NodeIdx, child: NodeIdx) {
        debug_assert!(!self.is_leaf(node));
        let other = if self.left(node) == child {
            self.right(node)
        } else {
            self.left(node)
        };
        debug_assert_eq!(self.len_of(other), 0);
        self.replace_with(node, child);
        let was_red = self.is_red(node);
        self.release_subtree(other);
        self.release(node);

        let parent = self.parent(child);
        self.try_merge_children(parent);

        if was_red {
            // Black height is unchanged.
            return;
        }
        if self.is_red(child) {
            self.set_red(child, false);
            return;
        }
        self.rebalance_after_removal(child);
        let parent = self.parent(child);
        self.try_merge_children(parent);
    }

    /// Remove every queued empty leaf, including the ones queued while
    /// removing others.
    fn cleanup_pending(&mut self) {
        while !self.pending.is_empty() {
            let batch = mem::take(&mut self.pending);
            for leaf in batch {
                let n = self.node(leaf);
                if n.kind == Kind::Free || n.parent == NONE || n.len != 0 || self.is_root(leaf) {
                    continue;
                }
                self.propagate_from_dying_subtree(leaf);
                let parent = self.parent(leaf);
                self.try_collapse(parent);
            }
        }
    }

    /// Forget keys that are null everywhere, so the key set does not grow
    /// without bound when many keys are used over time.
    pub fn cleanup_known_keys(&mut self) {
        let root = self.root() as usize;
        let root_map = &mut self.nodes[root].map;
        let before = self.known_keys.len();
        self.known_keys.retain(|key| {
            if root_map.get(key) == Some(&Slot::Value(None)) {
                root_map.remove(key);
                return false;
            }
            return true;
        });
        if self.known_keys.len() != before {
            tracing::debug!(
                removed = before - self.known_keys.len(),
                remaining = self.known_keys.len(),
                "forgot keys that are null everywhere"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with(len: usize) -> BasicAnnotationTree<&'static str> {
        let mut tree = BasicAnnotationTree::new();
        tree.insert(0, len);
        return tree;
    }

    fn values(tree: &BasicAnnotationTree<&'static str>, key: &str) -> Vec<Option<&'static str>> {
        return (0..tree.len()).map(|i| tree.get_annotation(i, key).copied()).collect();
    }

    #[test]
    fn bold_range_scenario() {
        let mut tree = tree_with(10);
        tree.set_annotation(2, 7, "bold", Some("true"));
        tree.check_invariants().unwrap();
        assert_eq!(tree.get_annotation(1, "bold"), None);
        assert_eq!(tree.get_annotation(4, "bold"), Some(&"true"));
        assert_eq!(tree.get_annotation(7, "bold"), None);
        assert_eq!(tree.first_annotation_change(0, 10, "bold", None), Some(2));
        assert_eq!(tree.last_annotation_change(0, 10, "bold", None), Some(7));
    }

    #[test]
    fn empty_range_is_a_no_op() {
        let mut tree = tree_with(5);
        let before = tree.debug_string();
        tree.set_annotation(3, 3, "a", Some("1"));
        assert_eq!(tree.debug_string(), before);
        assert!(tree.known_keys().is_empty());
    }

    #[test]
    fn setting_every_position_separately_stays_balanced() {
        let mut tree = tree_with(15);
        for i in 0..14 {
            let value: &'static str = Box::leak(i.to_string().into_boxed_str());
            tree.set_annotation(i, i + 1, "a", Some(value));
            tree.check_invariants().unwrap();
        }
        assert_eq!(tree.get_annotation(13, "a"), Some(&"13"));
        assert_eq!(tree.get_annotation(14, "a"), None);
    }

    #[test]
    fn middle_split_keeps_both_flanks() {
        let mut tree = tree_with(9);
        tree.set_annotation(0, 9, "a", Some("x"));
        tree.set_annotation(3, 6, "a", Some("y"));
        tree.check_invariants().unwrap();
        assert_eq!(
            values(&tree, "a"),
            vec![
                Some("x"),
                Some("x"),
                Some("x"),
                Some("y"),
                Some("y"),
                Some("y"),
                Some("x"),
                Some("x"),
                Some("x")
            ]
        );
    }

    #[test]
    fn overwriting_neighbours_merges_runs() {
        let mut tree = tree_with(3);
        tree.set_annotation(0, 1, "a", Some("1"));
        tree.set_annotation(1, 2, "a", Some("2"));
        tree.set_annotation(2, 3, "a", Some("3"));
        tree.set_annotation(0, 2, "a", Some("5"));
        tree.check_invariants().unwrap();
        assert_eq!(values(&tree, "a"), vec![Some("5"), Some("5"), Some("3")]);

        tree.set_annotation(0, 3, "a", None);
        tree.check_invariants().unwrap();
        assert_eq!(values(&tree, "a"), vec![None, None, None]);
    }

    #[test]
    fn insert_extends_left_neighbour() {
        let mut tree = tree_with(4);
        tree.set_annotation(0, 2, "a", Some("1"));
        tree.insert(2, 3);
        tree.check_invariants().unwrap();
        assert_eq!(tree.len(), 7);
        assert_eq!(tree.first_annotation_change(0, 7, "a", Some(&"1")), Some(5));
    }

    #[test]
    fn insert_at_start_extends_sentinel() {
        let mut tree = tree_with(2);
        tree.set_annotation(0, 2, "a", Some("1"));
        tree.insert(0, 2);
        tree.check_invariants().unwrap();
        assert_eq!(values(&tree, "a"), vec![None, None, Some("1"), Some("1")]);
    }

    #[test]
    fn delete_emptying_first_and_last_leaf() {
        let mut tree = tree_with(10);
        tree.set_annotation(0, 2, "a", Some("1"));
        tree.set_annotation(8, 10, "a", Some("2"));
        tree.delete(8, 10);
        tree.check_invariants().unwrap();
        tree.delete(0, 2);
        tree.check_invariants().unwrap();
        assert_eq!(tree.len(), 6);
        assert_eq!(tree.get_annotation(0, "a"), None);
        assert_eq!(tree.get_annotation(5, "a"), None);
        assert_eq!(tree.first_annotation_change(0, 6, "a", None), None);
    }

    #[test]
    fn delete_across_many_leaves() {
        let mut tree = tree_with(20);
        for i in 0..10 {
            let value = if i % 2 == 0 { "even" } else { "odd" };
            tree.set_annotation(i * 2, i * 2 + 2, "a", Some(value));
        }
        tree.check_invariants().unwrap();
        tree.delete(3, 17);
        tree.check_invariants().unwrap();
        assert_eq!(tree.len(), 6);
        assert_eq!(
            values(&tree, "a"),
            vec![Some("even"), Some("even"), Some("odd"), Some("even"), Some("odd"), Some("odd")]
        );
    }

    #[test]
    fn delete_everything() {
        let mut tree = tree_with(1);
        tree.set_annotation(0, 1, "a", Some("0"));
        tree.set_annotation(0, 1, "a", None);
        tree.delete(0, 1);
        tree.check_invariants().unwrap();
        assert_eq!(tree.len(), 0);
    }

    #[test]
    fn cleanup_forgets_null_keys() {
        let mut tree = tree_with(4);
        tree.set_annotation(0, 4, "a", Some("1"));
        tree.set_annotation(1, 2, "b", Some("2"));
        tree.set_annotation(0, 4, "a", None);
        tree.cleanup_known_keys();
        tree.check_invariants().unwrap();
        assert_eq!(tree.known_keys().len(), 1);
        assert!(tree.known_keys().contains("b"));
    }

    #[test]
    fn for_each_visits_each_key_once() {
        let mut tree = tree_with(6);
        tree.set_annotation(0, 6, "a", Some("1"));
        tree.set_annotation(2, 4, "b", Some("2"));
        let mut seen = Vec::new();
        tree.for_each_annotation_at(3, &mut |key, value| seen.push((key.to_string(), value.copied())));
        seen.sort();
        assert_eq!(
            seen,
            vec![("a".to_string(), Some("1")), ("b".to_string(), Some("2"))]
        );

        let mut accu = AnnotationMap::default();
        tree.collect_all_annotations_at(5, &mut accu);
        assert_eq!(accu.get("a"), Some(&Some("1")));
        assert_eq!(accu.get("b"), Some(&None));
    }

    #[test]
    fn unknown_key_queries() {
        let tree = tree_with(7);
        assert_eq!(tree.first_annotation_change(0, 7, "hi", None), None);
        assert_eq!(tree.first_annotation_change(1, 6, "hi", Some(&"x")), Some(1));
        assert_eq!(tree.last_annotation_change(1, 6, "hi", Some(&"x")), Some(6));
        assert_eq!(tree.get_annotation(3, "hi"), None);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn get_annotation_past_end_panics() {
        let tree = tree_with(3);
        tree.get_annotation(3, "a");
    }
}
