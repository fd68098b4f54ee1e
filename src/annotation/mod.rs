//! Range annotations over a linear sequence of positions.
//!
//! An annotation set tracks, for every position of a document, a value for
//! every annotation key. Unset keys read as `None`. Sets are mutated through
//! a streaming cursor: one [`begin`](RawAnnotationSet::begin) /
//! [`finish`](RawAnnotationSet::finish) bracket corresponds to one document
//! operation, and within it the cursor only moves forward through `skip`,
//! `delete` and `insert` while annotations are opened and closed at the
//! cursor position.
//!
//! Two implementations share the [`RawAnnotationSet`] trait:
//! - [`AnnotationTree`]: the production structure, an augmented red-black
//!   tree with O(log n) queries and updates.
//! - [`FlatAnnotationSet`]: one map per position, used as a reference model.

pub mod cursor;
pub mod flat;
pub mod iter;
pub mod notify;
pub mod script;
pub mod tree;

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;

pub use cursor::AnnotationTree;
pub use flat::FlatAnnotationSet;
pub use iter::AnnotationInterval;
pub use iter::RangedAnnotation;
pub use tree::BasicAnnotationTree;

/// An interned annotation key.
pub type Key = Arc<str>;

/// Effective annotations of a position or interval, keyed by annotation key.
pub type AnnotationMap<V> = FxHashMap<Key, Option<V>>;

/// Bounds every annotation value must satisfy.
pub trait AnnotationValue: Clone + PartialEq + fmt::Debug + 'static {}

impl<T: Clone + PartialEq + fmt::Debug + 'static> AnnotationValue for T {}

/// Local keys (prefixed with `@`) describe client-only state and are never
/// inherited by inserted content.
pub fn is_local_key(key: &str) -> bool {
    return key.starts_with('@');
}

/// One range whose annotation was set during a transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationChange<V> {
    pub start: usize,
    pub end: usize,
    pub key: Key,
    pub value: Option<V>,
}

/// Receives coalesced range changes when a transaction finishes.
///
/// The listener gets mutable access to the set that produced the change. A
/// transaction started from inside the callback runs immediately, but its
/// notifications are queued behind the ones still being delivered.
pub trait AnnotationSetListener<V> {
    fn on_annotation_change(&mut self, set: &mut dyn RawAnnotationSet<V>, change: &AnnotationChange<V>);
}

impl<V, F> AnnotationSetListener<V> for F
where
    F: FnMut(&mut dyn RawAnnotationSet<V>, &AnnotationChange<V>),
{
    fn on_annotation_change(&mut self, set: &mut dyn RawAnnotationSet<V>, change: &AnnotationChange<V>) {
        (self)(set, change);
    }
}

/// The streaming mutation protocol and random-access queries shared by every
/// annotation set.
///
/// Calling a cursor method outside of a `begin`/`finish` bracket, moving the
/// cursor past the end, ending an annotation that is not open, or finishing
/// with annotations still open are programmer errors and panic.
pub trait RawAnnotationSet<V> {
    /// Start a transaction with the cursor at position 0.
    fn begin(&mut self);

    /// End the transaction and deliver queued notifications.
    fn finish(&mut self);

    /// Move the cursor forward over existing content.
    fn skip(&mut self, distance: usize);

    /// Remove `size` positions at the cursor.
    fn delete(&mut self, size: usize);

    /// Insert `size` positions at the cursor and move past them.
    fn insert(&mut self, size: usize);

    /// Open `key = value` at the cursor. Reopening with an equal value is a
    /// no-op; a different value closes the open range first.
    fn start_annotation(&mut self, key: &str, value: Option<V>);

    /// Close the range opened for `key`, applying it up to the cursor.
    fn end_annotation(&mut self, key: &str);

    /// The value newly inserted content would inherit for `key`.
    fn get_inherited(&self, key: &str) -> Option<&V>;

    fn size(&self) -> usize;

    fn get_annotation(&self, index: usize, key: &str) -> Option<&V>;

    /// First index in `start..end` whose value for `key` differs from `from`.
    fn first_annotation_change(&self, start: usize, end: usize, key: &str, from: Option<&V>) -> Option<usize>;

    /// One past the last index in `start..end` whose value for `key` differs
    /// from `from`.
    fn last_annotation_change(&self, start: usize, end: usize, key: &str, from: Option<&V>) -> Option<usize>;

    /// Visit the keys recorded at `index`, once each. Sets that do not store
    /// null values skip keys that are null there.
    fn for_each_annotation_at(&self, index: usize, f: &mut dyn FnMut(&str, Option<&V>));

    /// A snapshot of every key that may have a non-null value somewhere.
    fn known_keys(&self) -> FxHashSet<Key>;

    /// Maximal sub-intervals of `start..end` over which every key in `keys`
    /// is constant. `None` selects all known keys.
    fn annotation_intervals(&self, start: usize, end: usize, keys: Option<&[&str]>) -> Vec<AnnotationInterval<V>>
    where
        V: Clone + PartialEq,
    {
        return iter::annotation_intervals(self, start, end, keys);
    }

    /// For every key in `keys`, the maximal constant-value runs that
    /// intersect `start..end`. Runs are not clipped to the window.
    fn ranged_annotations(&self, start: usize, end: usize, keys: Option<&[&str]>) -> Vec<RangedAnnotation<V>>
    where
        V: Clone + PartialEq,
    {
        return iter::ranged_annotations(self, start, end, keys);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_keys_start_with_at_sign() {
        assert!(is_local_key("@selection"));
        assert!(!is_local_key("style/bold"));
        assert!(!is_local_key(""));
    }
}
