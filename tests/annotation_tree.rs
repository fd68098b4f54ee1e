//! Behaviour specific to `AnnotationTree`: listeners, cursor preconditions
//! and structural stress with the validator enabled.

use std::cell::Cell;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::rc::Rc;

use annotree::annotation::AnnotationChange;
use annotree::annotation::AnnotationMap;
use annotree::annotation::AnnotationTree;
use annotree::annotation::BasicAnnotationTree;
use annotree::annotation::RawAnnotationSet;
use annotree::config::TreeConfig;

type Log = Rc<RefCell<Vec<(usize, usize, String, Option<&'static str>)>>>;

// =============================================================================
// Helpers
// =============================================================================

fn checked() -> AnnotationTree<&'static str> {
    return AnnotationTree::with_config(TreeConfig::new().with_invariant_checks(true));
}

fn with_length(len: usize) -> AnnotationTree<&'static str> {
    let mut tree = checked();
    tree.begin();
    tree.insert(len);
    tree.finish();
    return tree;
}

fn annotate(tree: &mut dyn RawAnnotationSet<&'static str>, start: usize, end: usize, key: &str, value: Option<&'static str>) {
    tree.begin();
    if start > 0 {
        tree.skip(start);
    }
    tree.start_annotation(key, value);
    tree.skip(end - start);
    tree.end_annotation(key);
    tree.finish();
}

fn record(tree: &mut AnnotationTree<&'static str>) -> Log {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    tree.set_listener(move |_: &mut dyn RawAnnotationSet<&'static str>, c: &AnnotationChange<&'static str>| {
        sink.borrow_mut().push((c.start, c.end, c.key.to_string(), c.value));
    });
    return log;
}

fn entry(start: usize, end: usize, key: &str, value: Option<&'static str>) -> (usize, usize, String, Option<&'static str>) {
    return (start, end, key.to_string(), value);
}

// =============================================================================
// Listener
// =============================================================================

#[test]
fn listener_receives_changes_in_order_after_finish() {
    let mut tree = with_length(10);
    let log = record(&mut tree);

    tree.begin();
    tree.skip(1);
    tree.start_annotation("b", Some("1"));
    tree.skip(2);
    tree.start_annotation("a", Some("2"));
    tree.skip(2);
    tree.end_annotation("b");
    tree.skip(1);
    tree.end_annotation("a");
    assert!(log.borrow().is_empty());
    tree.finish();

    assert_eq!(*log.borrow(), vec![entry(1, 5, "b", Some("1")), entry(3, 6, "a", Some("2"))]);
}

#[test]
fn listener_can_start_a_nested_transaction() {
    let mut tree = with_length(8);
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    tree.set_listener(move |set: &mut dyn RawAnnotationSet<&'static str>, c: &AnnotationChange<&'static str>| {
        sink.borrow_mut().push((c.start, c.end, c.key.to_string(), c.value));
        if &*c.key == "a" {
            // Mirror every change of "a" onto "b"
            set.begin();
            if c.start > 0 {
                set.skip(c.start);
            }
            set.start_annotation("b", c.value);
            set.skip(c.end - c.start);
            set.end_annotation("b");
            set.finish();
        }
    });

    annotate(&mut tree, 2, 5, "a", Some("x"));

    assert_eq!(*log.borrow(), vec![entry(2, 5, "a", Some("x")), entry(2, 5, "b", Some("x"))]);
    assert_eq!(tree.get_annotation(3, "b"), Some(&"x"));
    assert_eq!(tree.first_annotation_change(0, 8, "b", None), Some(2));
    assert!(!tree.is_in_transaction());

    // The listener is still installed after the nested delivery
    annotate(&mut tree, 0, 1, "a", Some("y"));
    assert_eq!(log.borrow().len(), 4);
}

#[test]
fn panicking_listener_does_not_wedge_later_deliveries() {
    let mut tree = with_length(6);
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    let failed = Rc::new(Cell::new(false));
    let fail_once = failed.clone();
    tree.set_listener(move |_: &mut dyn RawAnnotationSet<&'static str>, c: &AnnotationChange<&'static str>| {
        if !fail_once.replace(true) {
            panic!("listener failed");
        }
        sink.borrow_mut().push((c.start, c.end, c.key.to_string(), c.value));
    });

    // Two changes are queued; the first delivery panics
    tree.begin();
    tree.start_annotation("a", Some("x"));
    tree.skip(2);
    tree.end_annotation("a");
    tree.skip(1);
    tree.start_annotation("b", Some("y"));
    tree.skip(2);
    tree.end_annotation("b");
    let result = catch_unwind(AssertUnwindSafe(|| tree.finish()));
    assert!(result.is_err());
    assert!(failed.get());
    assert!(!tree.is_in_transaction());

    // The listener is back and the undelivered change was dropped
    annotate(&mut tree, 0, 1, "c", Some("z"));
    assert_eq!(*log.borrow(), vec![entry(0, 1, "c", Some("z"))]);
    assert_eq!(tree.get_annotation(3, "b"), Some(&"y"));
}

#[test]
fn cleared_listener_is_not_called() {
    let mut tree = with_length(4);
    let log = record(&mut tree);
    tree.clear_listener();
    annotate(&mut tree, 0, 4, "a", Some("x"));
    assert!(log.borrow().is_empty());
}

#[test]
fn unchanged_ranges_are_reported_when_configured() {
    let mut tree: AnnotationTree<&'static str> = AnnotationTree::with_config(
        TreeConfig::new().with_invariant_checks(true).with_notify_unchanged(true),
    );
    tree.begin();
    tree.insert(4);
    tree.finish();
    let log = record(&mut tree);

    annotate(&mut tree, 0, 2, "a", None);
    assert_eq!(*log.borrow(), vec![entry(0, 2, "a", None)]);
}

#[test]
fn partially_changed_range_is_reported_whole() {
    let mut tree = with_length(6);
    annotate(&mut tree, 0, 3, "a", Some("x"));
    let log = record(&mut tree);
    annotate(&mut tree, 0, 6, "a", Some("x"));
    assert_eq!(*log.borrow(), vec![entry(0, 6, "a", Some("x"))]);
}

#[test]
fn inherited_content_is_not_reported() {
    let mut tree = with_length(3);
    annotate(&mut tree, 0, 3, "a", Some("x"));
    let log = record(&mut tree);

    tree.begin();
    tree.skip(3);
    tree.insert(2);
    tree.finish();

    assert!(log.borrow().is_empty());
    assert_eq!(tree.get_annotation(4, "a"), Some(&"x"));
}

// =============================================================================
// Cursor behaviour
// =============================================================================

#[test]
fn delete_inherits_from_last_deleted_position() {
    let mut tree = with_length(6);
    annotate(&mut tree, 2, 4, "a", Some("x"));

    tree.begin();
    tree.skip(1);
    tree.delete(3);
    assert_eq!(tree.get_inherited("a"), Some(&"x"));
    tree.insert(1);
    tree.finish();

    assert_eq!(tree.size(), 4);
    assert_eq!(tree.get_annotation(0, "a"), None);
    assert_eq!(tree.get_annotation(1, "a"), Some(&"x"));
    assert_eq!(tree.get_annotation(2, "a"), None);
}

#[test]
fn local_keys_still_extend_into_inserted_content() {
    let mut tree = with_length(2);
    annotate(&mut tree, 0, 2, "@cursor", Some("me"));

    tree.begin();
    tree.skip(2);
    assert_eq!(tree.get_inherited("@cursor"), None);
    tree.insert(1);
    tree.finish();

    assert_eq!(tree.get_annotation(2, "@cursor"), Some(&"me"));
}

#[test]
fn collect_all_reports_null_for_known_keys() {
    let mut tree = with_length(5);
    annotate(&mut tree, 1, 2, "a", Some("x"));
    annotate(&mut tree, 3, 4, "b", Some("y"));

    let mut accu = AnnotationMap::default();
    tree.collect_all_annotations_at(1, &mut accu);
    assert_eq!(accu.len(), 2);
    assert_eq!(accu.get("a"), Some(&Some("x")));
    assert_eq!(accu.get("b"), Some(&None));
}

#[test]
fn known_keys_shrink_only_at_finish() {
    let mut tree = with_length(4);
    annotate(&mut tree, 0, 4, "a", Some("x"));
    annotate(&mut tree, 0, 1, "b", Some("y"));

    tree.begin();
    tree.delete(1);
    assert!(tree.known_keys_live().contains("b"));
    tree.finish();

    let keys = tree.known_keys();
    assert!(keys.contains("a"));
    assert!(!keys.contains("b"));
}

// =============================================================================
// Precondition violations
// =============================================================================

#[test]
#[should_panic(expected = "finish() called while annotations are still open: a, b")]
fn finish_with_open_annotations_panics() {
    let mut tree = with_length(2);
    tree.begin();
    tree.start_annotation("b", Some("1"));
    tree.start_annotation("a", Some("1"));
    tree.skip(1);
    tree.finish();
}

#[test]
#[should_panic(expected = "endAnnotation() called for key x which is not open")]
fn ending_unopened_key_panics() {
    let mut tree = with_length(2);
    tree.begin();
    tree.end_annotation("x");
}

#[test]
#[should_panic(expected = "finish() called with no matching begin()")]
fn unmatched_finish_panics() {
    let mut tree = with_length(2);
    tree.finish();
}

#[test]
#[should_panic(expected = "skip() called outside of a begin()/finish() bracket")]
fn skip_outside_transaction_panics() {
    let mut tree = with_length(2);
    tree.skip(1);
}

#[test]
#[should_panic(expected = "get_inherited() called outside of a begin()/finish() bracket")]
fn get_inherited_outside_transaction_panics() {
    let tree = with_length(2);
    tree.get_inherited("a");
}

#[test]
#[should_panic(expected = "skip() called with a length of zero")]
fn zero_length_skip_panics() {
    let mut tree = with_length(2);
    tree.begin();
    tree.skip(0);
}

#[test]
#[should_panic(expected = "attempt to delete beyond end of document (cursor at 1, size is 2, distance is 2)")]
fn delete_past_end_panics() {
    let mut tree = with_length(2);
    tree.begin();
    tree.skip(1);
    tree.delete(2);
}

#[test]
#[should_panic(expected = "index 5 out of bounds for size 5")]
fn get_annotation_at_size_panics() {
    let tree = with_length(5);
    tree.get_annotation(5, "a");
}

#[test]
#[should_panic(expected = "range 3..2 out of bounds for size 5")]
fn reversed_query_range_panics() {
    let tree = with_length(5);
    tree.first_annotation_change(3, 2, "a", None);
}

// =============================================================================
// Structure
// =============================================================================

#[test]
fn debug_string_shows_one_line_per_node() {
    let mut tree = with_length(4);
    annotate(&mut tree, 0, 2, "a", Some("x"));
    let dump = tree.debug_string();
    assert!(dump.starts_with("AnnotationTree, length 4:\n"));
    assert!(dump.contains("(root)"));
    assert!(dump.contains("a=\"x\""));
}

#[test]
fn alternating_values_split_and_merge_back() {
    let mut tree = with_length(64);
    for i in 0..64 {
        let value = if i % 2 == 0 { Some("even") } else { Some("odd") };
        annotate(&mut tree, i, i + 1, "a", value);
    }
    assert_eq!(tree.first_annotation_change(0, 64, "a", Some(&"even")), Some(1));
    assert_eq!(tree.last_annotation_change(0, 64, "a", Some(&"even")), Some(64));

    annotate(&mut tree, 0, 64, "a", Some("same"));
    assert_eq!(tree.first_annotation_change(0, 64, "a", Some(&"same")), None);
    let runs = tree.ranged_annotations(0, 64, Some(&["a"]));
    assert_eq!(runs.len(), 1);
    assert_eq!((runs[0].start, runs[0].end), (0, 64));
}

#[test]
fn growing_at_the_front_stays_balanced() {
    let mut tree = checked();
    for i in 0..200 {
        tree.begin();
        let value = if i % 3 == 0 { Some("x") } else { None };
        tree.start_annotation("a", value);
        tree.insert(1);
        tree.end_annotation("a");
        tree.finish();
    }
    assert_eq!(tree.size(), 200);
    // Inserted at the front, so position 199 holds the first insert
    assert_eq!(tree.get_annotation(199, "a"), Some(&"x"));
    assert_eq!(tree.get_annotation(198, "a"), None);
    tree.check_invariants().unwrap();
}

#[test]
fn interleaved_keys_and_deletes_stay_valid() {
    let mut tree = with_length(120);
    let keys = ["a", "b", "c"];
    for i in 0..40usize {
        let start = (i * 37) % (tree.size() - 8);
        let key = keys[i % 3];
        annotate(&mut tree, start, start + 7, key, Some("v"));
        if i % 4 == 3 {
            tree.begin();
            tree.skip((i * 13) % 100 + 1);
            tree.delete(2);
            tree.insert(1);
            tree.finish();
        }
    }
    tree.check_invariants().unwrap();

    // Wiping every key leaves one leaf and no known keys
    let size = tree.size();
    for key in keys {
        annotate(&mut tree, 0, size, key, None);
    }
    assert!(tree.known_keys().is_empty());
    assert_eq!(tree.debug_string().lines().count(), 2);
}

#[test]
fn basic_tree_is_usable_without_cursor() {
    let mut tree: BasicAnnotationTree<u8> = BasicAnnotationTree::new();
    tree.insert(0, 10);
    tree.set_annotation(2, 8, "a", Some(1));
    tree.delete(0, 4);
    tree.cleanup_known_keys();
    assert_eq!(tree.len(), 6);
    assert_eq!(tree.first_annotation_change(0, 6, "a", Some(&1)), Some(4));
    tree.check_invariants().unwrap();
}
