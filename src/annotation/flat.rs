//! Brute-force annotation set: one map per position.
//!
//! Every operation is linear in the document size. It follows the same
//! cursor, inheritance and notification rules as
//! [`AnnotationTree`](crate::annotation::AnnotationTree) and serves as the
//! oracle for property tests and fuzzing.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;

use crate::annotation::AnnotationChange;
use crate::annotation::AnnotationSetListener;
use crate::annotation::AnnotationValue;
use crate::annotation::Key;
use crate::annotation::RawAnnotationSet;
use crate::annotation::cursor::OpenAnnotation;
use crate::annotation::is_local_key;
use crate::annotation::notify;
use crate::annotation::notify::Notifier;
use crate::config::TreeConfig;
use crate::error::CursorError;
use crate::error::check_index;
use crate::error::check_range;

/// Non-null annotations of one position.
type Position<V> = FxHashMap<Key, V>;

#[derive(Debug)]
pub struct FlatAnnotationSet<V> {
    positions: Vec<Position<V>>,
    open: FxHashMap<Key, OpenAnnotation<V>>,
    cursor: Option<usize>,
    inherited: Position<V>,
    notifier: Notifier<V>,
    config: TreeConfig,
}

impl<V: AnnotationValue> Default for FlatAnnotationSet<V> {
    fn default() -> Self {
        return Self::new();
    }
}

impl<V: AnnotationValue> FlatAnnotationSet<V> {
    pub fn new() -> FlatAnnotationSet<V> {
        return FlatAnnotationSet::with_config(TreeConfig::default());
    }

    /// Only `notify_unchanged` applies; there is no structure to validate.
    pub fn with_config(config: TreeConfig) -> FlatAnnotationSet<V> {
        return FlatAnnotationSet {
            positions: Vec::new(),
            open: FxHashMap::default(),
            cursor: None,
            inherited: Position::default(),
            notifier: Notifier::default(),
            config,
        };
    }

    pub fn set_listener(&mut self, listener: impl AnnotationSetListener<V> + 'static) {
        self.notifier.set_listener(Some(Box::new(listener)));
    }

    pub fn is_in_transaction(&self) -> bool {
        return self.cursor.is_some();
    }

    fn notifier_mut(&mut self) -> &mut Notifier<V> {
        return &mut self.notifier;
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
        let size = self.positions.len();
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

    fn update_inherited_from(&mut self, position: usize) {
        self.inherited.clone_from(&self.positions[position]);
    }

    fn value_at(&self, index: usize, key: &str) -> Option<&V> {
        return self.positions[index].get(key);
    }

    fn end_annotation_unchecked(&mut self, key: Key, open: OpenAnnotation<V>, end: usize) {
        let OpenAnnotation { start, value } = open;
        if start >= end {
            return;
        }
        let changed = self.config.notify_unchanged
            || (start..end).any(|i| self.value_at(i, &key) != value.as_ref());
        for position in &mut self.positions[start..end] {
            match &value {
                Some(v) => {
                    position.insert(key.clone(), v.clone());
                }
                None => {
                    position.remove(&key);
                }
            }
        }
        if changed {
            self.notifier.push(AnnotationChange { start, end, key, value });
        }
    }
}

impl<V: AnnotationValue> RawAnnotationSet<V> for FlatAnnotationSet<V> {
    #[track_caller]
    fn begin(&mut self) {
        if self.cursor.is_some() {
            CursorError::AlreadyInTransaction.raise();
        }
        self.open.clear();
        self.notifier.clear_unless_notifying();
        self.inherited.clear();
        self.cursor = Some(0);
    }

    #[track_caller]
    fn finish(&mut self) {
        if let Some(key) = self.open.keys().min() {
            CursorError::OpenAnnotationsAtFinish { key: key.to_string() }.raise();
        }
        if self.cursor.take().is_none() {
            CursorError::UnmatchedFinish.raise();
        }
        self.inherited.clear();
        notify::deliver(self, Self::notifier_mut);
    }

    #[track_caller]
    fn skip(&mut self, distance: usize) {
        let cursor = self.check_advance("skip", distance) + distance;
        self.cursor = Some(cursor);
        self.update_inherited_from(cursor - 1);
    }

    #[track_caller]
    fn delete(&mut self, size: usize) {
        let cursor = self.check_advance("delete", size);
        self.update_inherited_from(cursor + size - 1);
        self.positions.drain(cursor..cursor + size);
    }

    #[track_caller]
    fn insert(&mut self, size: usize) {
        let cursor = self.position("insert");
        if size == 0 {
            CursorError::ZeroLength { op: "insert" }.raise();
        }
        let mut content = self.inherited.clone();
        content.retain(|key, _| !self.open.contains_key(key));
        if cursor > 0 {
            for (key, value) in &self.positions[cursor - 1] {
                if self.open.contains_key(key) {
                    content.insert(key.clone(), value.clone());
                }
            }
        }
        let tail = self.positions.split_off(cursor);
        self.positions.extend(std::iter::repeat_n(content, size));
        self.positions.extend(tail);
        self.cursor = Some(cursor + size);
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
        return self.inherited.get(key);
    }

    fn size(&self) -> usize {
        return self.positions.len();
    }

    #[track_caller]
    fn get_annotation(&self, index: usize, key: &str) -> Option<&V> {
        check_index(index, self.positions.len());
        return self.value_at(index, key);
    }

    #[track_caller]
    fn first_annotation_change(&self, start: usize, end: usize, key: &str, from: Option<&V>) -> Option<usize> {
        check_range(start, end, self.positions.len());
        return (start..end).find(|&i| self.value_at(i, key) != from);
    }

    #[track_caller]
    fn last_annotation_change(&self, start: usize, end: usize, key: &str, from: Option<&V>) -> Option<usize> {
        check_range(start, end, self.positions.len());
        return (start..end).rev().find(|&i| self.value_at(i, key) != from).map(|i| i + 1);
    }

    /// Null values are not stored, so only non-null keys are visited.
    #[track_caller]
    fn for_each_annotation_at(&self, index: usize, f: &mut dyn FnMut(&str, Option<&V>)) {
        check_index(index, self.positions.len());
        for (key, value) in &self.positions[index] {
            f(key, Some(value));
        }
    }

    fn known_keys(&self) -> FxHashSet<Key> {
        let mut keys = FxHashSet::default();
        for position in &self.positions {
            keys.extend(position.keys().cloned());
        }
        return keys;
    }
}
