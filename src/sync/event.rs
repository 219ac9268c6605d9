//! A level-triggered wakeup signal.
//!
//! Ports `examples/original_source/asyncio/event.py`'s `Event`: a boolean
//! flag plus a waitlist of tasks parked in `wait()`, all of whom wake the
//! moment [`Event::set`] transitions the flag from clear to set.

use std::cell::Cell;
use std::rc::Rc;

use crate::coro::{Coroutine, Resume, Step, Yield};
use crate::loop_;

struct Inner {
    is_set: Cell<bool>,
    waitlist: u64,
}

/// Cheaply cloneable handle to a shared event; clone it to hand copies to
/// multiple tasks, the way the original shares one `Event` object by
/// reference.
#[derive(Clone)]
pub struct Event(Rc<Inner>);

impl Event {
    pub fn new() -> Self {
        Self(Rc::new(Inner {
            is_set: Cell::new(false),
            waitlist: loop_::new_waitlist(),
        }))
    }

    pub fn is_set(&self) -> bool {
        self.0.is_set.get()
    }

    /// Sets the event, waking every task currently parked in `wait()`.
    /// Idempotent: setting an already-set event wakes nobody new.
    pub fn set(&self) {
        if !self.0.is_set.replace(true) {
            loop_::wake_all(self.0.waitlist);
        }
    }

    /// Clears the event. Tasks already woken by a prior `set()` are
    /// unaffected; only future `wait()` calls will block again.
    pub fn clear(&self) {
        self.0.is_set.set(false);
    }

    /// A task body that suspends until this event is set.
    pub fn wait(&self) -> EventWait {
        EventWait {
            event: self.clone(),
            started: false,
        }
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

/// The suspend-until-set state machine returned by [`Event::wait`].
/// Embed it inside a larger task's own `step` to compose an await.
pub struct EventWait {
    event: Event,
    started: bool,
}

impl Coroutine for EventWait {
    fn step(&mut self, resume: Resume) -> Step {
        if let Resume::Throw(err) = resume {
            return Step::Raised(err);
        }
        if self.event.is_set() {
            return Step::Returned(Box::new(()));
        }
        if !self.started {
            self.started = true;
        }
        Step::Suspended(Yield::Waitlist(self.event.0.waitlist))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loop_::{create_task, new_event_loop, run_until_complete, LoopConfig};
    use serial_test::serial;

    struct WaitThenMark {
        event: Event,
        wait: EventWait,
        marked: Rc<Cell<bool>>,
    }

    impl Coroutine for WaitThenMark {
        fn step(&mut self, resume: Resume) -> Step {
            match self.wait.step(resume) {
                Step::Suspended(y) => Step::Suspended(y),
                Step::Raised(e) => Step::Raised(e),
                Step::Returned(_) => {
                    self.marked.set(true);
                    Step::Returned(Box::new(()))
                }
            }
        }
    }

    #[test]
    #[serial]
    fn wait_blocks_until_set_then_wakes() {
        new_event_loop(LoopConfig::new());
        let event = Event::new();
        let marked = Rc::new(Cell::new(false));
        let waiter = WaitThenMark {
            event: event.clone(),
            wait: event.wait(),
            marked: marked.clone(),
        };
        let task = create_task::<_, ()>(waiter);

        // One iteration: the waiter parks, event not yet set.
        crate::loop_::step();
        assert!(!marked.get());

        event.set();
        let result = run_until_complete(task);
        assert!(result.is_ok());
        assert!(marked.get());
    }

    #[test]
    #[serial]
    fn already_set_event_does_not_block_a_new_waiter() {
        new_event_loop(LoopConfig::new());
        let event = Event::new();
        event.set();
        let task = create_task::<_, ()>(event.wait());
        let result = run_until_complete(task);
        assert!(result.is_ok());
    }
}
