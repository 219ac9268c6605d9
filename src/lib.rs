//! A single-threaded, cooperative, non-preemptive task scheduler meant for
//! resource-constrained devices: no threads, no preemption, and no heap
//! allocation beyond the task arena and the small pools its primitives use.
//!
//! The moving parts: a monotonic [`clock`], an intrusive pairing-heap
//! [`task`] arena reachable through [`taskqueue::TaskQueue`], an
//! [`ioqueue`] for I/O readiness multiplexing behind a host [`ioqueue::Selector`],
//! [`sleep`] and [`sync`] primitives that suspend a task by yielding a
//! [`coro::Yield`] descriptor, [`compose`] operators that await one or many
//! tasks, and the [`loop_`] facade that ties a thread-local scheduler
//! instance to all of the above.

pub mod clock;
pub mod compose;
pub mod coro;
pub mod error;
pub mod ioqueue;
pub mod loop_;
pub mod sleep;
pub mod sync;
pub mod task;
pub mod taskqueue;

pub use clock::{Clock, SystemClock, Tick};
pub use compose::{gather, wait, wait_for, AwaitTask, Gather, ReturnWhen, Wait, WaitFor};
pub use coro::{BoxedAny, Coroutine, Resume, Step, Thrown, Yield};
pub use error::{
    CancelledError, InvalidStateError, QueueEmpty, QueueFull, RuntimeError, TaskAccessError,
    TaskError, TimeoutError,
};
pub use ioqueue::{FakeSelector, Interest, NullSelector, ReadyEvent, Selector, StreamId};
pub use loop_::{
    call_soon, create_task, current_task, new_event_loop, run_forever, run_until_complete,
    set_exception_handler, step, stop, time, ExceptionContext, LoopConfig, Task,
};
pub use sync::{Event, Queue};
