use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

use crate::types::SchedulerState;

/// Observable scheduler transitions, in emission order.
///
/// All timestamps are offsets from the scheduler clock's origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SchedulerEvent {
    /// The queue was replaced or cleared.
    Generated { total: usize },
    StateChanged {
        from: SchedulerState,
        to: SchedulerState,
        at: Duration,
    },
    UnitStarted { index: usize, at: Duration },
    UnitCompleted {
        index: usize,
        at: Duration,
        duration: Duration,
    },
    /// A quantum closed, whether by yield, completion, interruption, or cancellation.
    QuantumEnded {
        started_at: Duration,
        ended_at: Duration,
        processed: usize,
    },
}

pub type Listener = Box<dyn FnMut(&SchedulerEvent)>;

/// Subscriber registry with re-entrancy-safe, in-order delivery.
///
/// Listeners are taken out of the registry while they run, so they may call
/// back into the scheduler; events raised meanwhile are queued and delivered
/// by the outermost dispatch, in order.
#[derive(Default)]
pub(crate) struct EventBus {
    listeners: RefCell<Vec<Listener>>,
    pending: RefCell<VecDeque<SchedulerEvent>>,
    dispatching: Cell<bool>,
}

impl EventBus {
    pub(crate) fn subscribe(&self, listener: Listener) {
        self.listeners.borrow_mut().push(listener);
    }

    pub(crate) fn emit(&self, events: impl IntoIterator<Item = SchedulerEvent>) {
        self.pending.borrow_mut().extend(events);
        if self.dispatching.get() {
            return;
        }

        self.dispatching.set(true);
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(event) = next else { break };

            let mut active = std::mem::take(&mut *self.listeners.borrow_mut());
            for listener in active.iter_mut() {
                listener(&event);
            }
            // Keep listeners registered during dispatch, after the existing ones.
            let mut slot = self.listeners.borrow_mut();
            active.append(&mut slot);
            *slot = active;
        }
        self.dispatching.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn generated(total: usize) -> SchedulerEvent {
        SchedulerEvent::Generated { total }
    }

    #[test]
    fn delivers_to_every_listener_in_order() {
        let bus = EventBus::default();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for tag in ["a", "b"] {
            let seen = Rc::clone(&seen);
            bus.subscribe(Box::new(move |e| {
                if let SchedulerEvent::Generated { total } = e {
                    seen.borrow_mut().push((tag, *total));
                }
            }));
        }

        bus.emit([generated(1), generated(2)]);
        assert_eq!(*seen.borrow(), vec![("a", 1), ("b", 1), ("a", 2), ("b", 2)]);
    }

    #[test]
    fn nested_emit_is_queued_not_lost() {
        let bus = Rc::new(EventBus::default());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let inner_bus = Rc::downgrade(&bus);
        bus.subscribe(Box::new(move |e| {
            if *e == generated(1) {
                if let Some(bus) = inner_bus.upgrade() {
                    bus.emit([generated(2)]);
                }
            }
        }));
        let log = Rc::clone(&seen);
        bus.subscribe(Box::new(move |e| log.borrow_mut().push(e.clone())));

        bus.emit([generated(1)]);
        assert_eq!(*seen.borrow(), vec![generated(1), generated(2)]);
    }

    #[test]
    fn subscribe_during_dispatch_keeps_listener() {
        let bus = Rc::new(EventBus::default());
        let late_hits = Rc::new(Cell::new(0));

        let weak = Rc::downgrade(&bus);
        let hits = Rc::clone(&late_hits);
        let mut added = false;
        bus.subscribe(Box::new(move |_| {
            if !added {
                added = true;
                let hits = Rc::clone(&hits);
                if let Some(bus) = weak.upgrade() {
                    bus.subscribe(Box::new(move |_| hits.set(hits.get() + 1)));
                }
            }
        }));

        bus.emit([generated(0)]);
        assert_eq!(late_hits.get(), 0);
        bus.emit([generated(0)]);
        assert_eq!(late_hits.get(), 1);
    }

    #[test]
    fn events_serialize_tagged() {
        let json = serde_json::to_value(generated(4)).unwrap();
        assert_eq!(json["event"], "generated");
        assert_eq!(json["total"], 4);
    }
}
