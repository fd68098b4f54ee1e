//! Streaming cursor over a [`BasicAnnotationTree`].
//!
//! [`AnnotationTree`] applies one document operation per `begin()`/`finish()`
//! bracket. The cursor walks forward over the document; annotations opened
//! with `start_annotation` are applied to the tree when they are closed, and
//! each applied range is queued as a notification for the listener.
//!
//! Inserted content inherits the annotations of the position to the left of
//! the cursor as of the last `skip` or `delete`. Keys that are open when the
//! content is inserted get their value when the annotation is closed instead.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::annotation::AnnotationChange;
use crate::annotation::AnnotationMap;
use crate::annotation::AnnotationSetListener;
use crate::annotation::AnnotationValue;
use crate::annotation::Key;
use crate::annotation::RawAnnotationSet;
use crate::annotation::is_local_key;
use crate::annotation::notify;
use crate::annotation::notify::Notifier;
use crate::annotation::tree::BasicAnnotationTree;
use crate::config::TreeConfig;
use crate::error::CursorError;

/// An annotation opened at `start` and not yet closed.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct OpenAnnotation<V> {
    pub(crate) start: usize,
    pub(crate) value: Option<V>,
}

/// Annotation tree with a transactional streaming cursor and change
/// notifications.
///
/// ```
/// use annotree::annotation::AnnotationTree;
/// use annotree::annotation::RawAnnotationSet;
///
/// let mut tree: AnnotationTree<String> = AnnotationTree::new();
/// tree.begin();
/// tree.insert(10);
/// tree.finish();
///
/// tree.begin();
/// tree.skip(2);
/// tree.start_annotation("bold", Some("true".to_string()));
/// tree.skip(5);
/// tree.end_annotation("bold");
/// tree.finish();
///
/// assert_eq!(tree.get_annotation(4, "bold").map(String::as_str), Some("true"));
/// assert_eq!(tree.first_annotation_change(0, 10, "bold", None), Some(2));
/// ```
pub struct AnnotationTree<V> {
    tree: BasicAnnotationTree<V>,
    open: FxHashMap<Key, OpenAnnotation<V>>,
    /// `None` outside of a transaction.
    cursor: Option<usize>,
    inherited: AnnotationMap<V>,
    notifier: Notifier<V>,
    config: TreeConfig,
}

impl<V: AnnotationValue> Default for AnnotationTree<V> {
    fn default() -> Self {
        return Self::new();
    }
}

impl<V: AnnotationValue> fmt::Debug for AnnotationTree<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f
            .debug_struct("AnnotationTree")
            .field("size", &self.tree.len())
            .field("cursor", &self.cursor)
            .field("open", &self.open)
            .field("notifier", &self.notifier)
            .field("config", &self.config)
            .finish();
    }
}

impl<V: AnnotationValue> AnnotationTree<V> {
    pub fn new() -> AnnotationTree<V> {
        return AnnotationTree::with_config(TreeConfig::default());
    }

    pub fn with_config(config: TreeConfig) -> AnnotationTree<V> {
        return AnnotationTree {
            tree: BasicAnnotationTree::new(),
            open: FxHashMap::default(),
            cursor: None,
            inherited: AnnotationMap::default(),
            notifier: Notifier::default(),
            config,
        };
    }

    /// Builder form of [`set_listener`](Self::set_listener).
    pub fn with_listener(mut self, listener: impl AnnotationSetListener<V> + 'static) -> AnnotationTree<V> {
        self.set_listener(listener);
        return self;
    }

    /// Install the listener that receives changes when transactions finish.
    pub fn set_listener(&mut self, listener: impl AnnotationSetListener<V> + 'static) {
        self.notifier.set_listener(Some(Box::new(listener)));
    }

    /// Stop producing notifications.
    pub fn clear_listener(&mut self) {
        self.notifier.set_listener(None);
    }

    pub fn config(&self) -> &TreeConfig {
        return &self.config;
    }

    /// The underlying tree, for read-only access.
    pub fn tree(&self) -> &BasicAnnotationTree<V> {
        return &self.tree;
    }

    pub fn is_in_transaction(&self) -> bool {
        return self.cursor.is_some();
    }

    /// The live key set of the underlying tree. Keys set during the current
    /// transaction show up immediately; keys that became null everywhere are
    /// dropped when the transaction finishes.
    pub fn known_keys_live(&self) -> &FxHashSet<Key> {
        return self.tree.known_keys();
    }

    /// Add the annotations at `index` to `accu`.
    pub fn collect_all_annotations_at(&self, index: usize, accu: &mut AnnotationMap<V>) {
        self.tree.collect_all_annotations_at(index, accu);
    }

    pub fn check_invariants(&self) -> crate::error::Result<()> {
        return self.tree.check_invariants();
    }

    pub fn debug_string(&self) -> String {
        return self.tree.debug_string();
    }

    #[track_caller]
    fn position(&self, op: &'static str) -> usize {
        match self.cursor {
            Some(cursor) => return cursor,
            None => CursorError::NotInTransaction { op }.raise(),
        }
    }

    #[track_caller]
    fn check_advance(&self, op: &'static str, distance: usize) -> usize {
        let cursor = self.position(op);
        if distance == 0 {
            CursorError::ZeroLength { op }.raise();
        }
        let size = self.tree.len();
        if distance > size - cursor {
            CursorError::OutOfRange {
                op,
                cursor,
                size,
                distance,
            }
            .raise();
        }
        return cursor;
    }

    fn notifier_mut(&mut self) -> &mut Notifier<V> {
        return &mut self.notifier;
    }

    fn update_inherited_from(&mut self, position: usize) {
        self.tree.collect_all_annotations_at(position, &mut self.inherited);
    }

    fn end_annotation_unchecked(&mut self, key: Key, open: OpenAnnotation<V>, end: usize) {
        let OpenAnnotation { start, value } = open;
        if start >= end {
            return;
        }
        let changed = self.config.notify_unchanged
            || self.tree.first_annotation_change(start, end, &key, value.as_ref()).is_some();
        self.tree.set_annotation(start, end, &key, value.clone());
        if changed {
            self.notifier.push(AnnotationChange { start, end, key, value });
        }
    }
}

impl<V: AnnotationValue> RawAnnotationSet<V> for AnnotationTree<V> {
    #[track_caller]
    fn begin(&mut self) {
        if self.cursor.is_some() {
            CursorError::AlreadyInTransaction.raise();
        }
        self.open.clear();
        self.notifier.clear_unless_notifying();
        self.inherited.clear();
        self.cursor = Some(0);
        tracing::trace!(size = self.tree.len(), "begin");
    }

    #[track_caller]
    fn finish(&mut self) {
        if !self.open.is_empty() {
            let mut keys: Vec<&Key> = self.open.keys().collect();
            keys.sort();
            let key = keys.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(", ");
            CursorError::OpenAnnotationsAtFinish { key }.raise();
        }
        let Some(cursor) = self.cursor.take() else {
            CursorError::UnmatchedFinish.raise();
        };
        self.inherited.clear();
        self.tree.cleanup_known_keys();
        tracing::trace!(cursor, size = self.tree.len(), "finish");

        if self.config.check_invariants_on_finish {
            if let Err(violation) = self.tree.check_invariants() {
                panic!("{violation}");
            }
        }

        notify::deliver(self, Self::notifier_mut);
    }

    #[track_caller]
    fn skip(&mut self, distance: usize) {
        let cursor = self.check_advance("skip", distance);
        let cursor = cursor + distance;
        self.cursor = Some(cursor);
        self.update_inherited_from(cursor - 1);
    }

    #[track_caller]
    fn delete(&mut self, size: usize) {
        let cursor = self.check_advance("delete", size);
        self.update_inherited_from(cursor + size - 1);
        self.tree.delete(cursor, cursor + size);
    }

    #[track_caller]
    fn insert(&mut self, size: usize) {
        let cursor = self.position("insert");
        if size == 0 {
            CursorError::ZeroLength { op: "insert" }.raise();
        }
        let (start, end) = (cursor, cursor + size);
        self.tree.insert(start, size);

        for (key, value) in &self.inherited {
            if !self.open.contains_key(key) {
                self.tree.set_annotation(start, end, key, value.clone());
            }
        }
        // Keys that are neither inherited nor open are nulled so the new
        // content does not pick up a value from an earlier end_annotation.
        let others: SmallVec<[Key; 8]> = self
            .tree
            .known_keys()
            .iter()
            .filter(|key| !self.inherited.contains_key(*key) && !self.open.contains_key(*key))
            .cloned()
            .collect();
        for key in others {
            self.tree.set_annotation(start, end, &key, None);
        }
        self.cursor = Some(end);
    }

    #[track_caller]
    fn start_annotation(&mut self, key: &str, value: Option<V>) {
        let cursor = self.position("start_annotation");
        if let Some(open) = self.open.get(key) {
            if open.value == value {
                return;
            }
            if let Some((key, open)) = self.open.remove_entry(key) {
                self.end_annotation_unchecked(key, open, cursor);
            }
        }
        self.open.insert(Arc::from(key), OpenAnnotation { start: cursor, value });
    }

    #[track_caller]
    fn end_annotation(&mut self, key: &str) {
        let cursor = self.position("end_annotation");
        let Some((key, open)) = self.open.remove_entry(key) else {
            CursorError::AnnotationNotOpen { key: key.to_string() }.raise();
        };
        self.end_annotation_unchecked(key, open, cursor);
    }

    #[track_caller]
    fn get_inherited(&self, key: &str) -> Option<&V> {
        self.position("get_inherited");
        if is_local_key(key) {
            return None;
        }
        return self.inherited.get(key).and_then(Option::as_ref);
    }

    fn size(&self) -> usize {
        return self.tree.len();
    }

    #[track_caller]
    fn get_annotation(&self, index: usize, key: &str) -> Option<&V> {
        return self.tree.get_annotation(index, key);
    }

    #[track_caller]
    fn first_annotation_change(&self, start: usize, end: usize, key: &str, from: Option<&V>) -> Option<usize> {
        return self.tree.first_annotation_change(start, end, key, from);
    }

    #[track_caller]
    fn last_annotation_change(&self, start: usize, end: usize, key: &str, from: Option<&V>) -> Option<usize> {
        return self.tree.last_annotation_change(start, end, key, from);
    }

    #[track_caller]
    fn for_each_annotation_at(&self, index: usize, f: &mut dyn FnMut(&str, Option<&V>)) {
        self.tree.for_each_annotation_at(index, f);
    }

    fn known_keys(&self) -> FxHashSet<Key> {
        return self.tree.known_keys().clone();
    }
}
