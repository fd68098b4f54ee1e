//! Queued change notifications.
//!
//! Every closed annotation range is queued during a transaction and handed to
//! the listener when the transaction finishes. Consecutive ranges for the same
//! key and value that touch are coalesced into one.

use std::collections::VecDeque;
use std::fmt;

use crate::annotation::AnnotationChange;
use crate::annotation::AnnotationSetListener;
use crate::annotation::RawAnnotationSet;

/// Notification queue plus the listener it delivers to.
pub struct Notifier<V> {
    queue: VecDeque<AnnotationChange<V>>,
    listener: Option<Box<dyn AnnotationSetListener<V>>>,
    /// Set while the outermost `finish()` is delivering.
    notifying: bool,
}

impl<V> Default for Notifier<V> {
    fn default() -> Self {
        return Notifier {
            queue: VecDeque::new(),
            listener: None,
            notifying: false,
        };
    }
}

impl<V: fmt::Debug> fmt::Debug for Notifier<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f
            .debug_struct("Notifier")
            .field("queue", &self.queue)
            .field("has_listener", &self.listener.is_some())
            .field("notifying", &self.notifying)
            .finish();
    }
}

impl<V: PartialEq> Notifier<V> {
    pub fn set_listener(&mut self, listener: Option<Box<dyn AnnotationSetListener<V>>>) {
        self.listener = listener;
    }

    pub fn has_listener(&self) -> bool {
        return self.listener.is_some();
    }

    pub fn is_notifying(&self) -> bool {
        return self.notifying;
    }

    /// Pending notifications, oldest first.
    pub fn queued(&self) -> impl Iterator<Item = &AnnotationChange<V>> {
        return self.queue.iter();
    }

    /// Queue a change, extending the newest entry when it ends where this one
    /// starts with the same key and value.
    pub fn push(&mut self, change: AnnotationChange<V>) {
        if let Some(last) = self.queue.back_mut() {
            if last.end == change.start && last.key == change.key && last.value == change.value {
                last.end = change.end;
                return;
            }
        }
        self.queue.push_back(change);
    }

    /// Drop leftovers from an earlier transaction. A transaction started by a
    /// listener keeps the queue so the outer delivery loop sees its changes.
    pub fn clear_unless_notifying(&mut self) {
        if !self.notifying {
            self.queue.clear();
        }
    }
}

/// An outermost delivery in progress. Dropping it, also while unwinding out
/// of a listener, puts the listener back, discards what is left in the
/// queue and ends the delivery.
struct Delivery<'a, V, S> {
    set: &'a mut S,
    notifier: fn(&mut S) -> &mut Notifier<V>,
    listener: Option<Box<dyn AnnotationSetListener<V>>>,
}

impl<V, S> Drop for Delivery<'_, V, S> {
    fn drop(&mut self) {
        let n = (self.notifier)(&mut *self.set);
        if n.listener.is_none() {
            n.listener = self.listener.take();
        }
        n.queue.clear();
        n.notifying = false;
    }
}

/// Deliver every queued notification of `set` to its listener.
///
/// `notifier` projects the set onto its queue. The listener is taken out of
/// the set for the duration of each call, so it can borrow the set mutably;
/// it is put back unless the callback installed a replacement. Calls made
/// while an outer delivery is running return immediately and leave their
/// notifications to that loop.
pub(crate) fn deliver<V, S>(set: &mut S, notifier: fn(&mut S) -> &mut Notifier<V>)
where
    V: PartialEq,
    S: RawAnnotationSet<V>,
{
    if notifier(set).notifying {
        return;
    }
    notifier(set).notifying = true;
    let mut delivery = Delivery {
        set,
        notifier,
        listener: None,
    };
    let mut delivered = 0usize;
    while let Some(change) = (delivery.notifier)(&mut *delivery.set).queue.pop_front() {
        delivery.listener = (delivery.notifier)(&mut *delivery.set).listener.take();
        let Some(listener) = delivery.listener.as_mut() else {
            continue;
        };
        listener.on_annotation_change(&mut *delivery.set, &change);
        delivered += 1;
        let listener = delivery.listener.take();
        let slot = &mut (delivery.notifier)(&mut *delivery.set).listener;
        if slot.is_none() {
            *slot = listener;
        }
    }
    drop(delivery);
    if delivered > 0 {
        tracing::debug!(delivered, "delivered annotation notifications");
    }
}
