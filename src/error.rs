//! The error taxonomy at the scheduler's boundary.
//!
//! Programmer errors (double-registering an I/O slot, pushing an
//! already-heaped task, calling `result()` before a task is done in a way
//! that indicates a logic bug) trap immediately via `assert!`/`unreachable!`
//! rather than being encoded here -- see the design note in SPEC_FULL.md
//! §7. The types below are the ones a well-behaved caller can expect to
//! receive and handle.

use std::fmt;

/// A boxed, type-erased exception raised by a coroutine's own body.
///
/// The scheduler never needs to know the concrete error type a task's
/// coroutine raises -- it only ever propagates it to an awaiter or to the
/// exception handler -- so it is boxed the same way `valtron::types` boxes
/// `BoxedError` for its own heterogeneous task storage.
pub type BoxedError = Box<dyn std::error::Error + 'static>;

/// Injected into a task when [`crate::task::Task::cancel`] succeeds. Never
/// routed to the exception handler and never treated as a user exception by
/// [`crate::compose::gather`]/[`crate::compose::wait`].
#[derive(Debug, Clone, Default)]
pub struct CancelledError(pub Option<String>);

impl fmt::Display for CancelledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(msg) => write!(f, "task cancelled: {msg}"),
            None => write!(f, "task cancelled"),
        }
    }
}

impl std::error::Error for CancelledError {}

/// Raised by [`crate::compose::wait_for`] when the timeout elapses before
/// the awaited task completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutError;

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timed out waiting for task to complete")
    }
}

impl std::error::Error for TimeoutError {}

/// Raised when `result()`/`exception()` is called on a task that has not
/// finished yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvalidStateError;

impl fmt::Display for InvalidStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task result is not available yet")
    }
}

impl std::error::Error for InvalidStateError {}

/// Raised by `Queue::get_nowait` when the queue has nothing buffered.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueEmpty;

impl fmt::Display for QueueEmpty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is empty")
    }
}

impl std::error::Error for QueueEmpty {}

/// Raised by `Queue::put_nowait` when a bounded queue is at capacity.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueFull;

impl fmt::Display for QueueFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full")
    }
}

impl std::error::Error for QueueFull {}

/// Catch-all for the remaining boundary failures the specification names:
/// "no running loop", "can't cancel self", "can't wait" (state mismatch),
/// and `Queue::task_done` underflow.
#[derive(Debug, Clone, derive_more::Display)]
pub enum RuntimeError {
    #[display("no running event loop")]
    NoRunningLoop,
    #[display("can't cancel self")]
    CantCancelSelf,
    #[display("can't wait: task state does not support awaiting")]
    CantWait,
    #[display("task_done() called more times than items were put in the queue")]
    TaskDoneUnderflow,
    #[display("{_0}")]
    Other(String),
}

impl std::error::Error for RuntimeError {}

/// The reason a terminated task did not produce a plain return value:
/// either it was cancelled, or its coroutine raised a user exception.
#[derive(Debug)]
pub enum TaskError {
    Cancelled(CancelledError),
    Exception(BoxedError),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Cancelled(err) => write!(f, "{err}"),
            TaskError::Exception(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for TaskError {}

/// Everything that can keep [`crate::loop_::Task::result`] from handing
/// back a value: the task isn't done yet, its outcome was already taken by
/// an earlier call, it was cancelled, or it raised.
#[derive(Debug)]
pub enum TaskAccessError {
    NotDone(InvalidStateError),
    AlreadyClaimed,
    Failed(TaskError),
}

impl fmt::Display for TaskAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskAccessError::NotDone(err) => write!(f, "{err}"),
            TaskAccessError::AlreadyClaimed => write!(f, "task result was already claimed"),
            TaskAccessError::Failed(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for TaskAccessError {}

impl From<TaskError> for TaskAccessError {
    fn from(err: TaskError) -> Self {
        TaskAccessError::Failed(err)
    }
}
