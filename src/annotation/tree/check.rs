//! Structural validation and debug dumps.
//!
//! The checks walk the whole tree and are O(n · k) for n nodes and k known
//! keys. They are meant for tests and fuzzing, not for normal execution.

use std::fmt::Write;

use crate::annotation::AnnotationValue;
use crate::error::InvariantViolation;
use crate::error::Result;

use super::BasicAnnotationTree;
use super::node::Kind;
use super::node::LocalMap;
use super::node::NodeIdx;
use super::node::Slot;
use super::node::HEADER;
use super::node::NONE;

impl<V: AnnotationValue> BasicAnnotationTree<V> {
    /// Verify every structural invariant of the tree.
    pub fn check_invariants(&self) -> Result<()> {
        let root = self.root();
        self.ensure(self.pending.is_empty(), HEADER, "cleanup queue not empty")?;
        self.check_header()?;
        self.ensure(self.parent(root) == HEADER, root, "root not attached to header")?;
        self.check_structure(root)?;
        self.ensure(!self.is_red(root), root, "root is red")?;
        self.check_balance(root)?;
        self.check_propagation_and_merging(root)?;
        self.check_staleness(root)?;
        for key in &self.known_keys {
            self.check_key_coverage(root, key)?;
        }
        self.check_arena(root)?;
        return Ok(());
    }

    fn ensure(&self, condition: bool, node: NodeIdx, description: &str) -> Result<()> {
        if condition {
            return Ok(());
        }
        let violation = InvariantViolation {
            node: self.describe(node),
            description: description.to_string(),
            dump: self.debug_string(),
        };
        tracing::debug!(%violation, "tree invariant check failed");
        return Err(violation);
    }

    fn check_header(&self) -> Result<()> {
        let header = self.node(HEADER);
        self.ensure(header.kind == Kind::Black, HEADER, "header is not black")?;
        self.ensure(header.right == NONE, HEADER, "header has a right child")?;
        self.ensure(header.map.is_empty(), HEADER, "header has annotations")?;
        self.ensure(self.len_of(self.root()) >= 1, self.root(), "sentinel position missing")?;
        for key in &self.known_keys {
            let sentinel = self.get_slot_raw(0, key);
            self.ensure(
                sentinel == Some(&Slot::Value(None)),
                self.root(),
                &format!("sentinel position has a value for {key}"),
            )?;
        }
        return Ok(());
    }

    fn check_structure(&self, node: NodeIdx) -> Result<()> {
        let n = self.node(node);
        self.ensure(n.kind != Kind::Free, node, "free node reachable")?;
        if n.is_leaf() {
            return self.ensure(n.left == NONE && n.right == NONE, node, "leaf has children");
        }
        self.ensure(self.parent(n.left) == node, n.left, "left child does not point back")?;
        self.ensure(self.parent(n.right) == node, n.right, "right child does not point back")?;
        self.check_structure(n.left)?;
        self.check_structure(n.right)?;
        return self.ensure(
            n.len == self.len_of(n.left) + self.len_of(n.right),
            node,
            "subtree lengths inconsistent",
        );
    }

    fn check_balance(&self, node: NodeIdx) -> Result<usize> {
        let n = self.node(node);
        if n.is_leaf() {
            return Ok(0);
        }
        if self.is_red(node) {
            self.ensure(!self.is_red(n.left), node, "left child of red node is red")?;
            self.ensure(!self.is_red(n.right), node, "right child of red node is red")?;
        }
        let left = self.check_balance(n.left)?;
        let right = self.check_balance(n.right)?;
        self.ensure(
            left == right,
            node,
            &format!("black height mismatch: {left} left, {right} right"),
        )?;
        return Ok(if self.is_red(node) { left } else { left + 1 });
    }

    fn check_propagation_and_merging(&self, node: NodeIdx) -> Result<()> {
        let n = self.node(node);
        for slot in n.map.values() {
            self.ensure(!slot.is_placeholder(), node, "placeholder left behind")?;
        }
        for key in n.map.keys() {
            self.ensure(self.known_keys.contains(key), node, &format!("unknown key {key}"))?;
        }
        if n.is_leaf() {
            return self.ensure(n.len > 0, node, "empty leaf");
        }
        self.check_propagation_and_merging(n.left)?;
        self.check_propagation_and_merging(n.right)?;

        let (left, right) = (self.node(n.left), self.node(n.right));
        for (key, value) in &left.map {
            if right.map.get(key) == Some(value) {
                self.ensure(false, node, &format!("left and right have equal annotations {key}"))?;
            }
        }
        if left.map.is_empty() && right.map.is_empty() {
            self.ensure(!(left.is_leaf() && right.is_leaf()), node, "two leaves not merged")?;
        }
        self.ensure(left.len > 0, node, "left is empty")?;
        return self.ensure(right.len > 0, node, "right is empty");
    }

    fn check_staleness(&self, node: NodeIdx) -> Result<()> {
        let n = self.node(node);
        for key in n.map.keys() {
            let mut ancestor = self.parent(node);
            while ancestor != HEADER {
                self.ensure(
                    !self.node(ancestor).map.contains_key(key),
                    node,
                    &format!("stale key {key}"),
                )?;
                ancestor = self.parent(ancestor);
            }
        }
        if !n.is_leaf() {
            self.check_staleness(n.left)?;
            self.check_staleness(n.right)?;
        }
        return Ok(());
    }

    fn check_key_coverage(&self, node: NodeIdx, key: &str) -> Result<()> {
        let n = self.node(node);
        if n.map.contains_key(key) {
            return Ok(());
        }
        self.ensure(!n.is_leaf(), node, &format!("key {key} has no value"))?;
        self.check_key_coverage(n.left, key)?;
        return self.check_key_coverage(n.right, key);
    }

    fn check_arena(&self, root: NodeIdx) -> Result<()> {
        let mut reachable = 0usize;
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            reachable += 1;
            let n = self.node(idx);
            if !n.is_leaf() {
                stack.push(n.left);
                stack.push(n.right);
            }
        }
        for &idx in &self.free {
            self.ensure(self.node(idx).kind == Kind::Free, idx, "free list holds a live node")?;
        }
        return self.ensure(
            reachable + self.free.len() + 1 == self.nodes.len(),
            HEADER,
            &format!(
                "arena leak: {reachable} reachable, {} free, {} allocated",
                self.free.len(),
                self.nodes.len()
            ),
        );
    }

    // ============================================================
    // Dumps
    // ============================================================

    /// Human-readable dump of the tree, one node per line. Right subtrees are
    /// printed above their parent and left subtrees below, so the output reads
    /// like the tree turned on its side.
    pub fn debug_string(&self) -> String {
        let mut out = format!("AnnotationTree, length {}:\n", self.len());
        self.dump(self.root(), &mut out);
        if out.ends_with('\n') {
            out.pop();
        }
        return out;
    }

    fn dump(&self, node: NodeIdx, out: &mut String) {
        let n = self.node(node);
        if n.is_leaf() {
            let _ = writeln!(out, "{}", self.describe(node));
            return;
        }
        self.dump(n.right, out);
        let _ = writeln!(out, "{}", self.describe(node));
        self.dump(n.left, out);
    }

    /// One-line description: path from the root, index, absolute range,
    /// colour and local map.
    fn describe(&self, node: NodeIdx) -> String {
        if node == HEADER {
            return "H Node (0) header".to_string();
        }
        let mut path = String::new();
        let mut start = 0;
        let mut child = node;
        loop {
            let parent = self.parent(child);
            if parent == HEADER {
                path.push('#');
                break;
            }
            if parent == NONE {
                path.push('O');
                break;
            }
            if self.left(parent) == child {
                path.push('l');
            } else {
                path.push('r');
                start += self.len_of(self.left(parent));
            }
            child = parent;
        }
        let path: String = path.chars().rev().collect();
        let n = self.node(node);
        let kind = match n.kind {
            Kind::Leaf => "leaf, black",
            Kind::Red => "internal, red",
            Kind::Black => "internal, black",
            Kind::Free => "free",
        };
        let root = if node == self.root() { " (root)" } else { "" };
        return format!(
            "{path} Node ({node}) {start}+{}={} {kind}{root} {}",
            n.len,
            start + n.len,
            map_to_string(&n.map)
        );
    }
}

fn map_to_string<V: AnnotationValue>(map: &LocalMap<V>) -> String {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let mut out = String::from("{");
    for (i, (key, slot)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match slot {
            Slot::Value(Some(value)) => {
                let _ = write!(out, "{key}={value:?}");
            }
            Slot::Value(None) => {
                let _ = write!(out, "{key}=null");
            }
            Slot::Placeholder(p) => {
                let _ = write!(out, "{key}=<{p:?}>");
            }
        }
    }
    out.push('}');
    return out;
}
