//! Arena storage for tree nodes.
//!
//! Nodes live in a single `Vec` and refer to each other by index. The parent
//! link is a plain index used for navigation only; ownership follows the
//! child links. Slot 0 is a header whose left child is the root, so the root
//! has a parent like every other node and rotations at the top need no
//! special case.

use rustc_hash::FxHashMap;

use crate::annotation::Key;

use super::BasicAnnotationTree;

/// Index into the node arena.
pub(crate) type NodeIdx = u32;
/// Sentinel value for no parent / no child.
pub(crate) const NONE: NodeIdx = u32::MAX;
/// The header node. Its left child is the root.
pub(crate) const HEADER: NodeIdx = 0;

/// Node colour and shape. Leaves are always black.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Kind {
    Leaf,
    Red,
    Black,
    /// On the free list.
    Free,
}

/// Temporary values used while splitting a leaf in three.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Placeholder {
    One,
    Another,
}

/// A value stored in a local map.
///
/// Placeholders never compare equal to a real value, so a placeholder can
/// always block propagation between two neighbours.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Slot<V> {
    Value(Option<V>),
    Placeholder(Placeholder),
}

impl<V: PartialEq> Slot<V> {
    /// Whether this slot holds exactly `value`.
    #[inline]
    pub(crate) fn is(&self, value: Option<&V>) -> bool {
        return match self {
            Slot::Value(v) => v.as_ref() == value,
            Slot::Placeholder(_) => false,
        };
    }

    #[inline]
    pub(crate) fn value(&self) -> Option<&V> {
        return match self {
            Slot::Value(v) => v.as_ref(),
            Slot::Placeholder(_) => None,
        };
    }

    pub(crate) fn is_placeholder(&self) -> bool {
        return matches!(self, Slot::Placeholder(_));
    }

    /// A placeholder different from both `a` and `b`.
    pub(crate) fn placeholder_distinct_from(a: &Slot<V>, b: &Slot<V>) -> Slot<V> {
        let one = Slot::Placeholder(Placeholder::One);
        if &one != a && &one != b {
            return one;
        }
        let another = Slot::Placeholder(Placeholder::Another);
        debug_assert!(&another != a && &another != b, "both placeholders in use");
        return another;
    }
}

/// Annotations common to every position a node covers.
pub(crate) type LocalMap<V> = FxHashMap<Key, Slot<V>>;

#[derive(Clone, Debug)]
pub(crate) struct Node<V> {
    pub(crate) kind: Kind,
    /// Number of positions covered by this subtree.
    pub(crate) len: usize,
    pub(crate) parent: NodeIdx,
    pub(crate) left: NodeIdx,
    pub(crate) right: NodeIdx,
    pub(crate) map: LocalMap<V>,
}

impl<V> Node<V> {
    pub(crate) fn new(kind: Kind, len: usize, map: LocalMap<V>) -> Node<V> {
        return Node {
            kind,
            len,
            parent: NONE,
            left: NONE,
            right: NONE,
            map,
        };
    }

    #[inline(always)]
    pub(crate) fn is_leaf(&self) -> bool {
        return self.kind == Kind::Leaf;
    }
}

impl<V> BasicAnnotationTree<V> {
    #[inline(always)]
    pub(crate) fn node(&self, idx: NodeIdx) -> &Node<V> {
        return &self.nodes[idx as usize];
    }

    #[inline(always)]
    pub(crate) fn node_mut(&mut self, idx: NodeIdx) -> &mut Node<V> {
        return &mut self.nodes[idx as usize];
    }

    pub(crate) fn alloc(&mut self, kind: Kind, len: usize, map: LocalMap<V>) -> NodeIdx {
        let node = Node::new(kind, len, map);
        if let Some(idx) = self.free.pop() {
            self.nodes[idx as usize] = node;
            return idx;
        }
        let idx = self.nodes.len() as NodeIdx;
        self.nodes.push(node);
        return idx;
    }

    /// Return a detached node to the free list.
    pub(crate) fn release(&mut self, idx: NodeIdx) {
        let node = self.node_mut(idx);
        node.kind = Kind::Free;
        node.len = 0;
        node.parent = NONE;
        node.left = NONE;
        node.right = NONE;
        node.map.clear();
        self.free.push(idx);
    }

    /// Release a detached subtree.
    pub(crate) fn release_subtree(&mut self, idx: NodeIdx) {
        let mut stack: smallvec::SmallVec<[NodeIdx; 16]> = smallvec::smallvec![idx];
        while let Some(idx) = stack.pop() {
            let node = self.node(idx);
            if !node.is_leaf() {
                stack.push(node.left);
                stack.push(node.right);
            }
            self.release(idx);
        }
    }

    #[inline(always)]
    pub(crate) fn root(&self) -> NodeIdx {
        return self.node(HEADER).left;
    }

    #[inline(always)]
    pub(crate) fn parent(&self, idx: NodeIdx) -> NodeIdx {
        return self.node(idx).parent;
    }

    #[inline(always)]
    pub(crate) fn left(&self, idx: NodeIdx) -> NodeIdx {
        return self.node(idx).left;
    }

    #[inline(always)]
    pub(crate) fn right(&self, idx: NodeIdx) -> NodeIdx {
        return self.node(idx).right;
    }

    #[inline(always)]
    pub(crate) fn len_of(&self, idx: NodeIdx) -> usize {
        return self.node(idx).len;
    }

    #[inline(always)]
    pub(crate) fn is_leaf(&self, idx: NodeIdx) -> bool {
        return self.node(idx).is_leaf();
    }

    #[inline(always)]
    pub(crate) fn is_root(&self, idx: NodeIdx) -> bool {
        return self.parent(idx) == HEADER;
    }

    /// Missing children count as black.
    #[inline(always)]
    pub(crate) fn is_red(&self, idx: NodeIdx) -> bool {
        return idx != NONE && self.node(idx).kind == Kind::Red;
    }

    pub(crate) fn set_red(&mut self, idx: NodeIdx, red: bool) {
        let node = self.node_mut(idx);
        match node.kind {
            Kind::Leaf => debug_assert!(!red, "leaves are always black"),
            Kind::Red | Kind::Black => node.kind = if red { Kind::Red } else { Kind::Black },
            Kind::Free => debug_assert!(false, "colouring a free node"),
        }
    }

    #[inline]
    pub(crate) fn is_left_child(&self, idx: NodeIdx) -> bool {
        let parent = self.parent(idx);
        debug_assert!(self.left(parent) == idx || self.right(parent) == idx);
        return self.left(parent) == idx;
    }

    pub(crate) fn sibling(&self, idx: NodeIdx) -> NodeIdx {
        let parent = self.parent(idx);
        if self.is_left_child(idx) {
            return self.right(parent);
        }
        return self.left(parent);
    }

    /// Put `other` where `this` hangs in the tree and detach `this`.
    pub(crate) fn replace_with(&mut self, this: NodeIdx, other: NodeIdx) {
        let parent = self.parent(this);
        if self.is_left_child(this) {
            self.node_mut(parent).left = other;
        } else {
            self.node_mut(parent).right = other;
        }
        self.node_mut(other).parent = parent;
        self.node_mut(this).parent = NONE;
    }
}
