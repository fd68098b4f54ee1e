//! Interval views over any annotation set.
//!
//! Both views are built only from the point queries of [`RawAnnotationSet`],
//! so they work the same for every implementation. Each step costs one
//! `first_annotation_change` per key.

use std::sync::Arc;

use crate::annotation::AnnotationMap;
use crate::annotation::Key;
use crate::annotation::RawAnnotationSet;
use crate::error::check_range;

/// A maximal sub-interval over which every requested key is constant.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationInterval<V> {
    pub start: usize,
    pub end: usize,
    /// Value of every requested key over the interval.
    pub annotations: AnnotationMap<V>,
    /// The keys whose value differs from the position just before `start`.
    /// The left of position 0 counts as null for every key.
    pub diff_from_left: AnnotationMap<V>,
}

impl<V> AnnotationInterval<V> {
    pub fn len(&self) -> usize {
        return self.end - self.start;
    }

    pub fn is_empty(&self) -> bool {
        return self.start == self.end;
    }
}

/// A maximal run of one value for one key.
#[derive(Clone, Debug, PartialEq)]
pub struct RangedAnnotation<V> {
    pub key: Key,
    pub value: Option<V>,
    pub start: usize,
    pub end: usize,
}

/// Requested keys in a stable order. `None` means every known key.
fn resolve_keys<V, S>(set: &S, keys: Option<&[&str]>) -> Vec<Key>
where
    S: RawAnnotationSet<V> + ?Sized,
{
    let mut resolved: Vec<Key> = match keys {
        Some(keys) => keys.iter().map(|key| Arc::from(*key)).collect(),
        None => set.known_keys().into_iter().collect(),
    };
    resolved.sort();
    resolved.dedup();
    return resolved;
}

/// Split `start..end` into maximal runs over which every key in `keys` is
/// constant.
#[track_caller]
pub fn annotation_intervals<V, S>(set: &S, start: usize, end: usize, keys: Option<&[&str]>) -> Vec<AnnotationInterval<V>>
where
    V: Clone + PartialEq,
    S: RawAnnotationSet<V> + ?Sized,
{
    check_range(start, end, set.size());
    let mut out = Vec::new();
    if start >= end {
        return out;
    }
    let keys = resolve_keys::<V, S>(set, keys);

    let mut pos = start;
    while pos < end {
        let mut annotations = AnnotationMap::default();
        let mut diff_from_left = AnnotationMap::default();
        let mut next = end;
        for key in &keys {
            let value = set.get_annotation(pos, key);
            if let Some(change) = set.first_annotation_change(pos, end, key, value) {
                next = next.min(change);
            }
            let left = if pos == 0 { None } else { set.get_annotation(pos - 1, key) };
            if left != value {
                diff_from_left.insert(key.clone(), value.cloned());
            }
            annotations.insert(key.clone(), value.cloned());
        }
        debug_assert!(next > pos);
        out.push(AnnotationInterval {
            start: pos,
            end: next,
            annotations,
            diff_from_left,
        });
        pos = next;
    }
    return out;
}

/// For every key in `keys`, the maximal runs of equal value that intersect
/// `start..end`, ordered by key and then by position. Runs extend past the
/// window when the value continues beyond it.
#[track_caller]
pub fn ranged_annotations<V, S>(set: &S, start: usize, end: usize, keys: Option<&[&str]>) -> Vec<RangedAnnotation<V>>
where
    V: Clone + PartialEq,
    S: RawAnnotationSet<V> + ?Sized,
{
    let size = set.size();
    check_range(start, end, size);
    let mut out = Vec::new();
    if start >= end {
        return out;
    }
    for key in resolve_keys::<V, S>(set, keys) {
        let mut pos = start;
        while pos < end {
            let value = set.get_annotation(pos, &key);
            let run_start = if pos == 0 {
                0
            } else {
                set.last_annotation_change(0, pos, &key, value).unwrap_or(0)
            };
            let run_end = set.first_annotation_change(pos, size, &key, value).unwrap_or(size);
            out.push(RangedAnnotation {
                key: key.clone(),
                value: value.cloned(),
                start: run_start,
                end: run_end,
            });
            pos = run_end;
        }
    }
    return out;
}
