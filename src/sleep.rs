//! Sleep and "never" primitives.
//!
//! Grounded on `core.py`'s `SingletonGenerator`/`sleep_ms`/`_never`: sleeping
//! is nothing but yielding a tick for the run loop's timer queue to honor,
//! and `never` is a coroutine that always yields and is only ever woken by
//! cancellation.

use crate::clock::{add, Tick};
use crate::coro::{Coroutine, Resume, Step, Yield};

enum SleepPhase {
    NotStarted,
    Waiting,
}

/// A task body that suspends until `deadline`, then returns `()`.
pub struct SleepMs {
    deadline: Tick,
    phase: SleepPhase,
}

impl SleepMs {
    pub fn new(deadline: Tick) -> Self {
        Self {
            deadline,
            phase: SleepPhase::NotStarted,
        }
    }

    /// Sleep for `ms` milliseconds starting from `now`.
    pub fn for_duration(now: Tick, ms: u32) -> Self {
        Self::new(add(now, ms))
    }
}

impl Coroutine for SleepMs {
    fn step(&mut self, resume: Resume) -> Step {
        if let Resume::Throw(err) = resume {
            return Step::Raised(err);
        }
        match self.phase {
            SleepPhase::NotStarted => {
                self.phase = SleepPhase::Waiting;
                Step::Suspended(Yield::SleepUntil(self.deadline))
            }
            SleepPhase::Waiting => Step::Returned(Box::new(())),
        }
    }
}

/// A task body that never completes on its own; only cancellation ends it.
/// Used by `examples/original_source/asyncio/core.py`'s `_never` to park a
/// task indefinitely (e.g. an idle worker waiting to be cancelled).
pub struct Never;

impl Coroutine for Never {
    fn step(&mut self, resume: Resume) -> Step {
        match resume {
            Resume::Throw(err) => Step::Raised(err),
            Resume::Go => Step::Suspended(Yield::Ready),
        }
    }
}
