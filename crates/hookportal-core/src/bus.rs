#![forbid(unsafe_code)]

//! Synchronous fan-out event bus.
//!
//! [`EventBus<E>`] delivers each published event to every current subscriber,
//! in subscription order, before `publish` returns. The store's lifecycle
//! [`Action`](crate::action::Action)s travel over an `EventBus<Action>`; the
//! config store reuses the same bus for its own events.
//!
//! # Invariants
//!
//! 1. Subscribers are notified in registration order.
//! 2. No buffering: a subscriber registered after a publish never sees it.
//! 3. Delivery iterates a snapshot of the subscriber list, so subscribing or
//!    unsubscribing from inside a callback never panics and never changes who
//!    else receives the in-flight event.
//! 4. A subscriber released during delivery is skipped if it has not been
//!    reached yet.
//! 5. Dropping a [`Subscription`] unsubscribes.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

type Callback<E> = Rc<dyn Fn(&E)>;

struct Entry<E> {
    id: u64,
    active: Rc<Cell<bool>>,
    callback: Callback<E>,
}

struct BusInner<E> {
    subscribers: RefCell<Vec<Entry<E>>>,
    next_id: Cell<u64>,
}

/// Single-threaded publish/subscribe channel.
///
/// Cloning an `EventBus` yields another handle to the same subscriber list.
pub struct EventBus<E> {
    inner: Rc<BusInner<E>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.inner.subscribers.borrow().len())
            .finish()
    }
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> EventBus<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(BusInner {
                subscribers: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Register `callback` for every future event.
    pub fn subscribe(&self, callback: impl Fn(&E) + 'static) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        let active = Rc::new(Cell::new(true));
        self.inner.subscribers.borrow_mut().push(Entry {
            id,
            active: Rc::clone(&active),
            callback: Rc::new(callback),
        });

        let weak: Weak<BusInner<E>> = Rc::downgrade(&self.inner);
        Subscription {
            active,
            remove: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.subscribers.borrow_mut().retain(|entry| entry.id != id);
                }
            })),
        }
    }

    /// Deliver `event` to every current subscriber. Returns how many
    /// callbacks ran.
    pub fn publish(&self, event: &E) -> usize {
        let snapshot: Vec<(Rc<Cell<bool>>, Callback<E>)> = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .map(|entry| (Rc::clone(&entry.active), Rc::clone(&entry.callback)))
            .collect();

        let mut delivered = 0;
        for (active, callback) in snapshot {
            if active.get() {
                callback(event);
                delivered += 1;
            }
        }
        delivered
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }
}

/// RAII guard for a bus subscription. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    active: Rc<Cell<bool>>,
    remove: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Stop receiving events. Safe to call from inside a callback.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    fn release(&mut self) {
        self.active.set(false);
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.active.get())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_in_subscription_order() {
        let bus = EventBus::<u32>::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l1 = Rc::clone(&log);
        let _a = bus.subscribe(move |v| l1.borrow_mut().push(("a", *v)));
        let l2 = Rc::clone(&log);
        let _b = bus.subscribe(move |v| l2.borrow_mut().push(("b", *v)));

        assert_eq!(bus.publish(&1), 2);
        bus.publish(&2);
        assert_eq!(*log.borrow(), vec![("a", 1), ("b", 1), ("a", 2), ("b", 2)]);
    }

    #[test]
    fn late_subscribers_miss_earlier_events() {
        let bus = EventBus::<u32>::new();
        bus.publish(&1);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = bus.subscribe(move |v| s.borrow_mut().push(*v));
        bus.publish(&2);

        assert_eq!(*seen.borrow(), vec![2]);
    }

    #[test]
    fn drop_unsubscribes() {
        let bus = EventBus::<u32>::new();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let sub = bus.subscribe(move |_| c.set(c.get() + 1));
        bus.publish(&1);
        drop(sub);
        bus.publish(&2);

        assert_eq!(count.get(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn unsubscribe_during_delivery_keeps_other_subscribers() {
        let bus = EventBus::<u32>::new();
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let later = Rc::new(Cell::new(0));

        // First subscriber releases the second one mid-delivery.
        let slot_in = Rc::clone(&slot);
        let _first = bus.subscribe(move |_| {
            if let Some(sub) = slot_in.borrow_mut().take() {
                sub.unsubscribe();
            }
        });
        let second_hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&second_hits);
        *slot.borrow_mut() = Some(bus.subscribe(move |_| h.set(h.get() + 1)));
        let l = Rc::clone(&later);
        let _third = bus.subscribe(move |_| l.set(l.get() + 1));

        bus.publish(&1);
        bus.publish(&2);

        assert_eq!(second_hits.get(), 0);
        assert_eq!(later.get(), 2);
    }

    #[test]
    fn self_unsubscribe_inside_callback_is_safe() {
        let bus = EventBus::<u32>::new();
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let hits = Rc::new(Cell::new(0));

        let slot_in = Rc::clone(&slot);
        let h = Rc::clone(&hits);
        *slot.borrow_mut() = Some(bus.subscribe(move |_| {
            h.set(h.get() + 1);
            drop(slot_in.borrow_mut().take());
        }));

        bus.publish(&1);
        bus.publish(&2);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn subscription_outliving_bus_is_inert() {
        let bus = EventBus::<u32>::new();
        let sub = bus.subscribe(|_| {});
        drop(bus);
        assert!(sub.is_active());
        sub.unsubscribe();
    }
}
