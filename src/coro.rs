//! The coroutine boundary: the one host capability the scheduler leans on
//! to actually make progress on a task's body.
//!
//! The crate does not implement generators. A `Coroutine` is anything that
//! can be handed a [`Resume`] value and report back a [`Step`] -- the same
//! shape as Python's `generator.send(value)` / `generator.throw(exc)`
//! protocol that `examples/original_source/asyncio/task.py` drives, adapted
//! to a closed trait instead of relying on language-level generators.

use std::any::Any;
use std::fmt;

use crate::error::BoxedError;
use crate::ioqueue::{Interest, StreamId};
use crate::task::TaskId;

/// Type-erased successful return value of a finished coroutine.
///
/// Heterogeneous task storage needs this the same way
/// `valtron::types::GenericResult` and `BoxedError` erase their payloads in
/// the teacher crate; the public `Task<V>` handle downcasts back to `V` when
/// the caller asks for the result.
pub type BoxedAny = Box<dyn Any>;

/// A value thrown into a suspended coroutine, standing in for Python's
/// `generator.throw(exc)`. Distinct from [`BoxedError`] only in name, to
/// keep "what a coroutine raised" and "what gets propagated to a caller"
/// readable at call sites.
pub type Thrown = BoxedError;

/// What the scheduler hands to a coroutine to resume it.
#[derive(Debug)]
pub enum Resume {
    /// Resume normally; the coroutine's last `await` yields `()`.
    Go,
    /// Resume by raising `Thrown` at the coroutine's last suspend point,
    /// e.g. to deliver a cancellation or propagate an awaited task's
    /// exception.
    Throw(Thrown),
}

/// What a suspended coroutine is waiting on, interpreted by the run loop
/// rather than by the coroutine itself. A coroutine may still call back
/// into the [`crate::loop_`] facade from inside its own `step` (to cancel
/// another task, read the clock, and so on) -- what it cannot do is link
/// itself into a wait structure directly, the same way a Python
/// generator's `yield`ed value, not the generator body, is what
/// `core.py`'s run loop acts on to park it.
pub enum Yield {
    /// Yield once; become runnable again on the next iteration.
    Ready,
    /// Sleep until the clock reaches `tick`.
    SleepUntil(crate::clock::Tick),
    /// Await another task's completion.
    AwaitTask(TaskId),
    /// Await I/O readiness on a registered stream.
    Io(StreamId, Interest),
    /// Park on a synchronization primitive's waitlist, identified by the
    /// id the primitive was given when it allocated its waitlist.
    Waitlist(u64),
}

impl fmt::Debug for Yield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Yield::Ready => write!(f, "Yield::Ready"),
            Yield::SleepUntil(tick) => write!(f, "Yield::SleepUntil({tick})"),
            Yield::AwaitTask(id) => write!(f, "Yield::AwaitTask({id:?})"),
            Yield::Io(stream, interest) => write!(f, "Yield::Io({stream}, {interest:?})"),
            Yield::Waitlist(id) => write!(f, "Yield::Waitlist({id})"),
        }
    }
}

/// What a coroutine reports back after being stepped once.
pub enum Step {
    /// The coroutine suspended again, waiting on `Yield`.
    Suspended(Yield),
    /// The coroutine ran to completion and produced a value.
    Returned(BoxedAny),
    /// The coroutine's body raised, unwinding it.
    Raised(Thrown),
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Suspended(y) => write!(f, "Step::Suspended({y:?})"),
            Step::Returned(_) => write!(f, "Step::Returned(..)"),
            Step::Raised(err) => write!(f, "Step::Raised({err})"),
        }
    }
}

/// A single step of a task's body.
///
/// Implementations are expected to be cheap to step repeatedly and to never
/// be stepped again once they have returned [`Step::Returned`] or
/// [`Step::Raised`] -- the run loop never calls `step` on a task it has
/// already observed as done; see the note in DESIGN.md on why this crate
/// does not replicate "throwing into an exhausted generator".
pub trait Coroutine {
    fn step(&mut self, resume: Resume) -> Step;
}

/// Adapts a plain `FnMut() -> R` into a one-shot [`Coroutine`] that returns
/// immediately on its first step. Backs [`crate::loop_::Loop::call_soon`]:
/// a scheduled callback is just a coroutine with no suspend points.
pub struct OnceCallback<F> {
    inner: Option<F>,
}

impl<F> OnceCallback<F> {
    pub fn new(f: F) -> Self {
        Self { inner: Some(f) }
    }
}

impl<F, R> Coroutine for OnceCallback<F>
where
    F: FnMut() -> R,
    R: 'static,
{
    fn step(&mut self, _resume: Resume) -> Step {
        let mut f = self
            .inner
            .take()
            .expect("OnceCallback stepped more than once");
        let value = f();
        Step::Returned(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_callback_returns_on_first_step() {
        let mut called = 0;
        let mut cb = OnceCallback::new(|| {
            called += 1;
            42
        });
        match cb.step(Resume::Go) {
            Step::Returned(v) => assert_eq!(*v.downcast::<i32>().unwrap(), 42),
            other => panic!("expected Returned, got {other:?}"),
        }
        assert_eq!(called, 1);
    }
}
