//! I/O readiness multiplexing.
//!
//! The scheduler never talks to sockets directly -- concrete streams/TLS
//! are out of scope, per the specification's stated non-goals. Instead it
//! depends on a [`Selector`]: a host capability that can register interest
//! in a stream becoming readable/writable and report back which streams
//! are ready, the same shape as `examples/original_source/asyncio/core.py`'s
//! `IOQueue` driving `select.poll`.

use std::collections::HashMap;
use std::time::Duration;

use crate::task::{TaskId, Tasks};

/// Opaque identifier for a registered stream. The crate never interprets
/// this beyond equality/hashing -- a host `Selector` might use it as a raw
/// file descriptor, an index into its own table, anything.
pub type StreamId = u64;

/// Which direction of readiness a task is parked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    Read,
    Write,
}

/// A stream reported ready by the selector.
#[derive(Debug, Clone, Copy)]
pub struct ReadyEvent {
    pub stream: StreamId,
    pub interest: Interest,
}

/// The host capability this crate depends on for I/O readiness. Mirrors a
/// `poll(2)`-style multiplexer: register/modify/unregister interest in a
/// stream, then block for up to a timeout waiting for any registered
/// interest to become ready.
pub trait Selector {
    fn register(&mut self, stream: StreamId, interest: Interest);
    fn modify(&mut self, stream: StreamId, interest: Interest);
    fn unregister(&mut self, stream: StreamId);
    /// Block for up to `timeout` (`None` = forever, `Some(Duration::ZERO)`
    /// = don't block at all) and report every stream that became ready.
    fn poll(&mut self, timeout: Option<Duration>) -> Vec<ReadyEvent>;
}

/// A [`Selector`] that never reports anything ready and never blocks.
/// Useful as the default when a deployment has no I/O-bound tasks at all.
#[derive(Debug, Default)]
pub struct NullSelector;

impl Selector for NullSelector {
    fn register(&mut self, _stream: StreamId, _interest: Interest) {}
    fn modify(&mut self, _stream: StreamId, _interest: Interest) {}
    fn unregister(&mut self, _stream: StreamId) {}
    fn poll(&mut self, _timeout: Option<Duration>) -> Vec<ReadyEvent> {
        Vec::new()
    }
}

/// A `Selector` driven entirely by explicit readiness injection, for tests
/// that exercise the IOQueue without a real host multiplexer.
#[derive(Debug, Default)]
pub struct FakeSelector {
    registered: HashMap<StreamId, Interest>,
    pending: Vec<ReadyEvent>,
}

impl FakeSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `stream`/`interest` as ready for the next `poll` call. Only
    /// takes effect if the pair is currently registered, matching a real
    /// poller's behavior of ignoring events for fds it wasn't told about.
    pub fn inject_ready(&mut self, stream: StreamId, interest: Interest) {
        if self.registered.get(&stream) == Some(&interest) {
            self.pending.push(ReadyEvent { stream, interest });
        }
    }
}

impl Selector for FakeSelector {
    fn register(&mut self, stream: StreamId, interest: Interest) {
        self.registered.insert(stream, interest);
    }

    fn modify(&mut self, stream: StreamId, interest: Interest) {
        self.registered.insert(stream, interest);
    }

    fn unregister(&mut self, stream: StreamId) {
        self.registered.remove(&stream);
        self.pending.retain(|ev| ev.stream != stream);
    }

    fn poll(&mut self, _timeout: Option<Duration>) -> Vec<ReadyEvent> {
        std::mem::take(&mut self.pending)
    }
}

/// Tasks parked awaiting I/O readiness, keyed by `(stream, interest)`.
///
/// Grounded on `core.py`'s `IOQueue`: `queue_read`/`queue_write` park the
/// current task, `wait_io_event` polls the selector and reschedules every
/// task whose interest fired.
#[derive(Default)]
pub struct IOQueue {
    waiters: HashMap<(StreamId, Interest), TaskId>,
}

impl IOQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Park `task` awaiting `interest` on `stream`, registering it with
    /// `selector` if this is the first waiter on that key.
    pub fn park(
        &mut self,
        selector: &mut dyn Selector,
        stream: StreamId,
        interest: Interest,
        task: TaskId,
    ) {
        let key = (stream, interest);
        let first = !self.waiters.contains_key(&key);
        let prev = self.waiters.insert(key, task);
        assert!(
            prev.is_none(),
            "two tasks parked on the same stream/interest pair"
        );
        if first {
            selector.register(stream, interest);
        } else {
            selector.modify(stream, interest);
        }
    }

    /// Cancel a pending wait, e.g. because the parked task was cancelled.
    pub fn remove(&mut self, selector: &mut dyn Selector, stream: StreamId, interest: Interest) {
        if self.waiters.remove(&(stream, interest)).is_some() {
            selector.unregister(stream);
        }
    }

    /// Poll the selector for up to `timeout` and return every task that
    /// became ready, removing them from the waitlist.
    pub fn poll(&mut self, selector: &mut dyn Selector, timeout: Option<Duration>) -> Vec<TaskId> {
        let events = selector.poll(timeout);
        let mut ready = Vec::with_capacity(events.len());
        for event in events {
            let key = (event.stream, event.interest);
            if let Some(task) = self.waiters.remove(&key) {
                selector.unregister(event.stream);
                ready.push(task);
            }
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_selector_only_reports_registered_pairs() {
        let mut sel = FakeSelector::new();
        sel.inject_ready(3, Interest::Read);
        assert!(sel.poll(None).is_empty());

        sel.register(3, Interest::Read);
        sel.inject_ready(3, Interest::Read);
        let events = sel.poll(None);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].stream, 3);
    }

    #[test]
    fn ioqueue_wakes_only_the_waiter_whose_interest_fired() {
        use crate::coro::{Resume, Step, Yield};
        struct Noop;
        impl crate::coro::Coroutine for Noop {
            fn step(&mut self, _resume: Resume) -> Step {
                Step::Suspended(Yield::Ready)
            }
        }

        let mut tasks = Tasks::new();
        let reader = tasks.insert(Box::new(Noop), 0);
        let writer = tasks.insert(Box::new(Noop), 0);

        let mut sel = FakeSelector::new();
        let mut ioq = IOQueue::new();
        ioq.park(&mut sel, 1, Interest::Read, reader);
        ioq.park(&mut sel, 1, Interest::Write, writer);

        sel.inject_ready(1, Interest::Write);
        let ready = ioq.poll(&mut sel, Some(Duration::ZERO));
        assert_eq!(ready, vec![writer]);
        assert!(!ioq.is_empty()); // reader is still parked
    }
}
