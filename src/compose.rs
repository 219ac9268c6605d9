//! Task composition: awaiting a single task, and the `gather`/`wait`/
//! `wait_for` combinators.
//!
//! Ported from `examples/original_source/asyncio/funcs.py`. `ALL_COMPLETED`/
//! `FIRST_COMPLETED`/`FIRST_EXCEPTION` keep the original's names since they
//! are part of the public vocabulary callers already know from the source
//! this was distilled from. `gather`/`wait`/`wait_for` below are thin
//! constructors over the `Gather`/`Wait`/`WaitFor` task bodies, named to
//! match that same vocabulary.

use crate::clock::{add, diff, Tick};
use crate::coro::{Coroutine, Resume, Step, Yield};
use crate::error::{TaskAccessError, TaskError, TimeoutError};
use crate::loop_::{self, Task};
use crate::sleep::SleepMs;

/// A task body that suspends until `target` finishes, then yields its
/// outcome via `target.result()`. Embed this to compose an "await" inside
/// a larger hand-rolled coroutine, the way `task.py`'s `Task.__await__`
/// yields `self` until the awaited task is done.
pub struct AwaitTask<V> {
    target: Task<V>,
}

impl<V> AwaitTask<V> {
    pub fn new(target: Task<V>) -> Self {
        Self { target }
    }
}

impl<V: 'static> Coroutine for AwaitTask<V> {
    fn step(&mut self, resume: Resume) -> Step {
        if let Resume::Throw(err) = resume {
            return Step::Raised(err);
        }
        if !self.target.done() {
            return Step::Suspended(Yield::AwaitTask(self.target.id()));
        }
        match self.target.result() {
            Ok(value) => Step::Returned(Box::new(value)),
            Err(TaskAccessError::Failed(TaskError::Cancelled(err))) => {
                Step::Raised(Box::new(err))
            }
            Err(TaskAccessError::Failed(TaskError::Exception(err))) => Step::Raised(err),
            Err(other) => unreachable!("unexpected result() on a just-checked done task: {other}"),
        }
    }
}

/// Which condition ends a [`Wait`] early, ported from `funcs.py`'s
/// `ALL_COMPLETED`/`FIRST_COMPLETED`/`FIRST_EXCEPTION` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnWhen {
    AllCompleted,
    FirstCompleted,
    FirstException,
}

/// A task body that suspends according to `return_when` (or until `timeout`
/// elapses, if set), reporting which of `tasks` had finished by the time it
/// resumed. Ports `funcs.py`'s `wait`.
pub struct Wait<V> {
    tasks: Vec<Task<V>>,
    return_when: ReturnWhen,
    cursor: usize,
    deadline: Option<Tick>,
    sleeping: Option<SleepMs>,
}

impl<V: 'static> Wait<V> {
    pub fn new(tasks: Vec<Task<V>>, return_when: ReturnWhen) -> Self {
        Self::with_timeout(tasks, return_when, None)
    }

    pub fn with_timeout(tasks: Vec<Task<V>>, return_when: ReturnWhen, timeout_ms: Option<u32>) -> Self {
        let deadline = timeout_ms.map(|ms| add(loop_::time(), ms));
        Self {
            tasks,
            return_when,
            cursor: 0,
            deadline,
            sleeping: None,
        }
    }

    fn scan(&self) -> Option<(Vec<Task<V>>, Vec<Task<V>>)> {
        let done: Vec<Task<V>> = self.tasks.iter().copied().filter(|t| t.done()).collect();
        let pending: Vec<Task<V>> = self.tasks.iter().copied().filter(|t| !t.done()).collect();

        let satisfied = match self.return_when {
            ReturnWhen::AllCompleted => pending.is_empty(),
            ReturnWhen::FirstCompleted => !done.is_empty(),
            // Also satisfied once nothing is left pending, even if no task
            // ever raised -- `funcs.py`'s `_done_callback` wakes the waiter
            // whenever `len(pending) == 0` regardless of `return_when`.
            ReturnWhen::FirstException => {
                done.iter().any(|t| t.failed_with_exception()) || pending.is_empty()
            }
        };

        satisfied.then_some((done, pending))
    }

    fn split(&self) -> (Vec<Task<V>>, Vec<Task<V>>) {
        (
            self.tasks.iter().copied().filter(|t| t.done()).collect(),
            self.tasks.iter().copied().filter(|t| !t.done()).collect(),
        )
    }
}

impl<V: 'static> Coroutine for Wait<V> {
    fn step(&mut self, resume: Resume) -> Step {
        if let Resume::Throw(err) = resume {
            return Step::Raised(err);
        }
        if self.tasks.is_empty() {
            return Step::Returned(Box::new((Vec::<Task<V>>::new(), Vec::<Task<V>>::new())));
        }
        if let Some((done, pending)) = self.scan() {
            return Step::Returned(Box::new((done, pending)));
        }

        if let Some(deadline) = self.deadline {
            if let Some(sleeper) = &mut self.sleeping {
                match sleeper.step(Resume::Go) {
                    Step::Suspended(y) => return Step::Suspended(y),
                    Step::Raised(err) => return Step::Raised(err),
                    Step::Returned(_) => self.sleeping = None,
                }
            }

            let now = loop_::time();
            if diff(now, deadline) >= 0 {
                return Step::Returned(Box::new(self.split()));
            }

            let poll_ms = diff(deadline, now).clamp(1, 20) as u32;
            let mut sleeper = SleepMs::new(add(now, poll_ms));
            let step = sleeper.step(Resume::Go);
            self.sleeping = Some(sleeper);
            return match step {
                Step::Suspended(y) => Step::Suspended(y),
                other => other,
            };
        }

        // No deadline: park on whichever still-pending task is next in
        // line; whoever finishes first re-enters this step and re-scans
        // the full set.
        let waiting_on = self.tasks[self.cursor % self.tasks.len()];
        self.cursor += 1;
        Step::Suspended(Yield::AwaitTask(waiting_on.id()))
    }
}

/// Constructs a task body that suspends until `return_when` is satisfied
/// among `tasks` (optionally bounded by `timeout_ms`), then reports the
/// `(done, pending)` split. Ports `funcs.py`'s `wait`.
pub fn wait<V: 'static>(tasks: Vec<Task<V>>, return_when: ReturnWhen, timeout_ms: Option<u32>) -> Wait<V> {
    Wait::with_timeout(tasks, return_when, timeout_ms)
}

/// A task body that awaits `target`, but gives up with [`TimeoutError`] and
/// cancels `target` if `timeout_ms` elapses first. Ports `funcs.py`'s
/// `wait_for`, which is itself implemented in terms of `wait`.
///
/// If `wait_for` itself is cancelled while waiting, the cancellation is
/// propagated to `target` before re-raising, matching the original's
/// `except core.CancelledError: task_aw.cancel(); raise`.
pub struct WaitFor<V> {
    target: Task<V>,
    waiting: Wait<V>,
}

impl<V: 'static> WaitFor<V> {
    pub fn new(target: Task<V>, timeout_ms: u32) -> Self {
        Self {
            target,
            waiting: Wait::with_timeout(vec![target], ReturnWhen::AllCompleted, Some(timeout_ms)),
        }
    }
}

impl<V: 'static> Coroutine for WaitFor<V> {
    fn step(&mut self, resume: Resume) -> Step {
        if let Resume::Throw(err) = resume {
            let _ = self.target.cancel(None);
            return Step::Raised(err);
        }
        match self.waiting.step(Resume::Go) {
            Step::Suspended(y) => Step::Suspended(y),
            Step::Raised(err) => Step::Raised(err),
            Step::Returned(boxed) => {
                let (_done, pending) = *boxed
                    .downcast::<(Vec<Task<V>>, Vec<Task<V>>)>()
                    .expect("Wait always returns a (done, pending) pair");
                if !pending.is_empty() {
                    let _ = self
                        .target
                        .cancel(Some("wait_for timed out".to_string()));
                    return Step::Raised(Box::new(TimeoutError));
                }
                match self.target.result() {
                    Ok(value) => Step::Returned(Box::new(value)),
                    Err(TaskAccessError::Failed(TaskError::Cancelled(err))) => {
                        Step::Raised(Box::new(err))
                    }
                    Err(TaskAccessError::Failed(TaskError::Exception(err))) => Step::Raised(err),
                    Err(other) => {
                        unreachable!("unexpected result() on a just-checked done task: {other}")
                    }
                }
            }
        }
    }
}

/// Constructs a task body that awaits `target`, raising [`TimeoutError`] and
/// cancelling it if `timeout_ms` elapses first. Ports `funcs.py`'s
/// `wait_for`.
pub fn wait_for<V: 'static>(target: Task<V>, timeout_ms: u32) -> WaitFor<V> {
    WaitFor::new(target, timeout_ms)
}

/// A task body that runs every one of `tasks` concurrently and collects
/// their outcomes in submission order. Ports `funcs.py`'s `gather`.
///
/// When `return_exceptions` is `false` (the default asyncio behavior), the
/// first exception observed among the done tasks is re-raised immediately
/// without waiting for the rest (mirroring `wait(..., FIRST_EXCEPTION)`
/// followed by the original's results loop re-raising on the first failed
/// task it walks past) -- tasks still in flight are left running, not
/// cancelled, exactly as the original leaves them. Cancelling `gather`
/// itself cancels every child and re-raises, matching
/// `except core.CancelledError: for task in tasks: task.cancel(); raise`.
pub struct Gather<V> {
    tasks: Vec<Task<V>>,
    return_exceptions: bool,
    waiting: Wait<V>,
}

impl<V: 'static> Gather<V> {
    pub fn new(tasks: Vec<Task<V>>, return_exceptions: bool) -> Self {
        let return_when = if return_exceptions {
            ReturnWhen::AllCompleted
        } else {
            ReturnWhen::FirstException
        };
        Self {
            waiting: Wait::new(tasks.clone(), return_when),
            tasks,
            return_exceptions,
        }
    }
}

impl<V: 'static> Coroutine for Gather<V> {
    fn step(&mut self, resume: Resume) -> Step {
        if let Resume::Throw(err) = resume {
            for task in &self.tasks {
                let _ = task.cancel(None);
            }
            return Step::Raised(err);
        }
        if self.tasks.is_empty() {
            return Step::Returned(Box::new(Vec::<Option<Result<V, TaskError>>>::new()));
        }
        match self.waiting.step(Resume::Go) {
            Step::Suspended(y) => Step::Suspended(y),
            Step::Raised(err) => Step::Raised(err),
            Step::Returned(_) => {
                let mut results = Vec::with_capacity(self.tasks.len());
                for task in &self.tasks {
                    if !task.done() {
                        results.push(None);
                        continue;
                    }
                    match task.result() {
                        Ok(v) => results.push(Some(Ok(v))),
                        Err(TaskAccessError::Failed(err)) => {
                            let is_cancelled = matches!(err, TaskError::Cancelled(_));
                            if !self.return_exceptions && !is_cancelled {
                                return Step::Raised(Box::new(err));
                            }
                            results.push(Some(Err(err)));
                        }
                        Err(other) => unreachable!(
                            "unexpected result() on a just-checked done task: {other}"
                        ),
                    }
                }
                Step::Returned(Box::new(results))
            }
        }
    }
}

/// Constructs a task body that runs every one of `tasks` concurrently and
/// collects their outcomes. Ports `funcs.py`'s `gather`.
pub fn gather<V: 'static>(tasks: Vec<Task<V>>, return_exceptions: bool) -> Gather<V> {
    Gather::new(tasks, return_exceptions)
}
