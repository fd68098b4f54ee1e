//! Rotations and red-black rebalancing.
//!
//! A rotation moves subtrees between two internal nodes, so the annotations
//! those nodes held for their whole span no longer describe the same set of
//! positions. [`redistribute`] recomputes the five local maps involved.

use std::mem;

use crate::annotation::AnnotationValue;

use super::BasicAnnotationTree;
use super::node::LocalMap;
use super::node::NodeIdx;
use super::node::HEADER;

/// Local maps of the five nodes touched by a single rotation.
///
/// ```text
///      p          p                p            p
///      |          |                |            |
///      a          c                a            c
///     / \   ->   / \              / \    ->    / \
///    c  (b)    (e)  a           (b)  c        a  (e)
///   / \            / \              / \      / \
/// (e)  d          d  (b)           d  (e)  (b)  d
/// ```
///
/// `a` is the node rotated down, `c` the child rotated up, `b` the subtree
/// that stays with `a`, `d` the subtree that changes parents and `e` the
/// subtree that stays with `c`.
#[derive(Debug)]
pub(crate) struct RotationMaps<V> {
    pub(crate) a: LocalMap<V>,
    pub(crate) b: LocalMap<V>,
    pub(crate) c: LocalMap<V>,
    pub(crate) d: LocalMap<V>,
    pub(crate) e: LocalMap<V>,
}

/// Recompute local maps after a rotation.
///
/// Before the rotation the keys of `{a, b}`, `{a, c, d}` and `{a, c, e}` are
/// pairwise disjoint. Afterwards:
///
/// ```text
/// c' = a
/// a' = (d ∪ c) ∩ b
/// b' = b \ (d ∪ c)
/// d' = (d ∪ c) \ b
/// e' = e ∪ c
/// ```
pub(crate) fn redistribute<V: PartialEq + Clone>(maps: RotationMaps<V>) -> RotationMaps<V> {
    let RotationMaps {
        a: a0,
        mut b,
        c: c0,
        mut d,
        mut e,
    } = maps;

    // a = d ∩ b, removed from both sides.
    let mut a = LocalMap::default();
    d.retain(|key, value| {
        if b.get(key) == Some(&*value) {
            b.remove(key);
            a.insert(key.clone(), value.clone());
            return false;
        }
        return true;
    });

    // Entries of c either join a (when b agrees) or move down into d, and
    // always move down into e.
    for (key, value) in c0 {
        if b.get(&key) == Some(&value) {
            b.remove(&key);
            a.insert(key.clone(), value.clone());
        } else {
            d.insert(key.clone(), value.clone());
        }
        e.insert(key, value);
    }

    return RotationMaps { a, b, c: a0, d, e };
}

impl<V: AnnotationValue> BasicAnnotationTree<V> {
    fn take_maps(&mut self, a: NodeIdx, b: NodeIdx, c: NodeIdx, d: NodeIdx, e: NodeIdx) -> RotationMaps<V> {
        return RotationMaps {
            a: mem::take(&mut self.node_mut(a).map),
            b: mem::take(&mut self.node_mut(b).map),
            c: mem::take(&mut self.node_mut(c).map),
            d: mem::take(&mut self.node_mut(d).map),
            e: mem::take(&mut self.node_mut(e).map),
        };
    }

    fn put_maps(&mut self, a: NodeIdx, b: NodeIdx, c: NodeIdx, d: NodeIdx, e: NodeIdx, maps: RotationMaps<V>) {
        self.node_mut(a).map = maps.a;
        self.node_mut(b).map = maps.b;
        self.node_mut(c).map = maps.c;
        self.node_mut(d).map = maps.d;
        self.node_mut(e).map = maps.e;
    }

    /// Rotate `a` down to the left; its right child takes its place.
    pub(crate) fn rotate_left(&mut self, a: NodeIdx) {
        debug_assert!(!self.is_leaf(a));
        let b = self.left(a);
        let c = self.right(a);
        debug_assert!(!self.is_leaf(c), "rotating a leaf up");
        let d = self.left(c);
        let e = self.right(c);

        self.replace_with(a, c);
        self.node_mut(a).right = d;
        self.node_mut(c).left = a;
        self.node_mut(a).parent = c;
        self.node_mut(d).parent = a;
        let (b_len, e_len) = (self.len_of(b), self.len_of(e));
        self.node_mut(a).len -= e_len;
        self.node_mut(c).len += b_len;

        let maps = self.take_maps(a, b, c, d, e);
        self.put_maps(a, b, c, d, e, redistribute(maps));
        self.try_merge_children(a);
    }

    /// Rotate `a` down to the right; its left child takes its place.
    pub(crate) fn rotate_right(&mut self, a: NodeIdx) {
        debug_assert!(!self.is_leaf(a));
        let b = self.right(a);
        let c = self.left(a);
        debug_assert!(!self.is_leaf(c), "rotating a leaf up");
        let d = self.right(c);
        let e = self.left(c);

        self.replace_with(a, c);
        self.node_mut(a).left = d;
        self.node_mut(c).right = a;
        self.node_mut(a).parent = c;
        self.node_mut(d).parent = a;
        let (b_len, e_len) = (self.len_of(b), self.len_of(e));
        self.node_mut(a).len -= e_len;
        self.node_mut(c).len += b_len;

        let maps = self.take_maps(a, b, c, d, e);
        self.put_maps(a, b, c, d, e, redistribute(maps));
        self.try_merge_children(a);
    }

    /// Restore balance after `n`, a freshly split red internal node, was
    /// hung into the tree.
    pub(crate) fn rebalance_after_insertion(&mut self, n: NodeIdx) {
        debug_assert!(!self.is_leaf(n));
        let p = self.parent(n);
        if p == HEADER {
            self.set_red(n, false);
            return;
        }
        if !self.is_red(p) {
            return;
        }
        let g = self.parent(p);
        if g == HEADER {
            self.set_red(p, false);
            return;
        }
        debug_assert!(!self.is_red(g));

        let uncle = self.sibling(p);
        if self.is_red(uncle) {
            self.set_red(p, false);
            self.set_red(uncle, false);
            self.set_red(g, true);
            self.rebalance_after_insertion(g);
            return;
        }

        let n_left = self.is_left_child(n);
        let p_left = self.is_left_child(p);
        if !n_left && p_left {
            self.rotate_left(p);
            let g = self.parent(n);
            self.set_red(n, false);
            self.set_red(g, true);
            self.rotate_right(g);
            return;
        }
        if n_left && !p_left {
            self.rotate_right(p);
            let g = self.parent(n);
            self.set_red(n, false);
            self.set_red(g, true);
            self.rotate_left(g);
            return;
        }

        self.set_red(p, false);
        self.set_red(g, true);
        if n_left {
            self.rotate_right(g);
        } else {
            self.rotate_left(g);
        }
    }

    /// Restore balance after the subtree at `n` lost one black level.
    pub(crate) fn rebalance_after_removal(&mut self, n: NodeIdx) {
        if self.is_root(n) {
            return;
        }
        let s = self.sibling(n);
        if self.is_red(s) {
            let p = self.parent(n);
            self.set_red(p, true);
            self.set_red(s, false);
            if self.is_left_child(n) {
                self.rotate_left(p);
            } else {
                self.rotate_right(p);
            }
        }

        let p = self.parent(n);
        let mut s = self.sibling(n);
        debug_assert!(!self.is_leaf(s), "sibling of a short subtree must be internal");
        let nephews_black = !self.is_red(self.left(s)) && !self.is_red(self.right(s));

        if !self.is_red(p) && !self.is_red(s) && nephews_black {
            self.set_red(s, true);
            self.rebalance_after_removal(p);
            return;
        }
        if self.is_red(p) && !self.is_red(s) && nephews_black {
            self.set_red(s, true);
            self.set_red(p, false);
            return;
        }

        if self.is_left_child(n) {
            if !self.is_red(s) && self.is_red(self.left(s)) && !self.is_red(self.right(s)) {
                let near = self.left(s);
                self.set_red(s, true);
                self.set_red(near, false);
                self.rotate_right(s);
                s = self.sibling(n);
            }
            let p = self.parent(n);
            let p_red = self.is_red(p);
            self.set_red(s, p_red);
            self.set_red(p, false);
            let far = self.right(s);
            self.set_red(far, false);
            self.rotate_left(p);
        } else {
            if !self.is_red(s) && !self.is_red(self.left(s)) && self.is_red(self.right(s)) {
                let near = self.right(s);
                self.set_red(s, true);
                self.set_red(near, false);
                self.rotate_left(s);
                s = self.sibling(n);
            }
            let p = self.parent(n);
            let p_red = self.is_red(p);
            self.set_red(s, p_red);
            self.set_red(p, false);
            let far = self.left(s);
            self.set_red(far, false);
            self.rotate_right(p);
        }
    }
}
