//! Runtime knobs for [`AnnotationTree`](crate::annotation::AnnotationTree).

/// Configuration for an annotation tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TreeConfig {
    /// Run the full O(n) validator at the end of every transaction and panic
    /// with the tree dump if it fails.
    pub check_invariants_on_finish: bool,
    /// Report every closed annotation range, even when the range already
    /// carried the value. When unset, such no-op ranges are not reported.
    pub notify_unchanged: bool,
}

impl TreeConfig {
    pub fn new() -> TreeConfig {
        return TreeConfig::default();
    }

    pub fn with_invariant_checks(mut self, on: bool) -> TreeConfig {
        self.check_invariants_on_finish = on;
        return self;
    }

    pub fn with_notify_unchanged(mut self, on: bool) -> TreeConfig {
        self.notify_unchanged = on;
        return self;
    }
}
