//! The loop globals and the public facade.
//!
//! Grounded on `examples/ewe-studios-ewe_platform/backends/foundation_core/
//! src/valtron/executors/single/mod.rs`'s `GLOBAL_LOCAL_EXECUTOR_ENGINE`
//! pattern: a `thread_local!` holding a lazily-initialized engine, with a
//! thin free-function/facade surface (`run`, `create_task`, `spawn`, ...)
//! over it, rather than threading a `&mut Loop` through every call site.
//! `new_event_loop` resets rather than destroys the thread-local state, per
//! the Loop globals' stated lifecycle.

use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::Duration;

use once_cell::unsync::OnceCell;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::clock::{Clock, SystemClock, Tick};
use crate::coro::{Coroutine, OnceCallback, Resume, Step, Yield};
use crate::error::{CancelledError, InvalidStateError, RuntimeError, TaskAccessError, TaskError};
use crate::ioqueue::{IOQueue, NullSelector, Selector};
use crate::task::{Outcome, Parked, TaskId, TaskState, Tasks};
use crate::taskqueue::TaskQueue;

/// What's passed to a user-supplied exception handler when a task's
/// exception goes unclaimed.
pub struct ExceptionContext<'a> {
    pub task_name: Option<&'a str>,
    pub message: String,
}

type ExceptionHandler = Box<dyn FnMut(ExceptionContext<'_>)>;

/// Builder for the knobs a deployment needs beyond bare defaults.
/// Grounded on `ExecutionTaskIteratorBuilder`/`LocalThreadExecutor::new`.
pub struct LoopConfig {
    initial_capacity: usize,
    rng_seed: Option<u64>,
    selector: Box<dyn Selector>,
    clock: Box<dyn Clock>,
    exception_handler: Option<ExceptionHandler>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 16,
            rng_seed: None,
            selector: Box::new(NullSelector),
            clock: Box::new(SystemClock::new()),
            exception_handler: None,
        }
    }
}

impl LoopConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn selector(mut self, selector: Box<dyn Selector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn exception_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut(ExceptionContext<'_>) + 'static,
    {
        self.exception_handler = Some(Box::new(handler));
        self
    }
}

pub(crate) struct LoopState {
    pub(crate) tasks: Tasks,
    pub(crate) rq: TaskQueue,
    pub(crate) ioq: IOQueue,
    selector: Box<dyn Selector>,
    clock: Box<dyn Clock>,
    pub(crate) current: Option<TaskId>,
    exception_handler: Option<ExceptionHandler>,
    stop_requested: bool,
    generation: u32,
    #[allow(dead_code)] // threaded through for future jitter use, never read by scheduling order
    rng: ChaCha8Rng,

    /// Waitlists owned by synchronization primitives (`Event`, `Queue`),
    /// keyed by an id the primitive holds. Living here rather than inside
    /// the primitive itself is what lets [`request_cancel`] find and
    /// unlink a task parked on one without the primitive exposing its
    /// internals.
    pub(crate) aux_queues: HashMap<u64, TaskQueue>,
    next_aux_id: u64,
}

impl LoopState {
    fn new(config: LoopConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        };
        Self {
            tasks: Tasks::new(),
            rq: TaskQueue::new(),
            ioq: IOQueue::new(),
            selector: config.selector,
            clock: config.clock,
            current: None,
            exception_handler: config.exception_handler,
            stop_requested: false,
            generation: 0,
            rng,
            aux_queues: HashMap::new(),
            next_aux_id: 0,
        }
        .with_capacity_hint(config.initial_capacity)
    }

    fn with_capacity_hint(self, _hint: usize) -> Self {
        self
    }

    fn default_exception_handler(ctx: ExceptionContext<'_>) {
        tracing::error!(task = ctx.task_name, "{}", ctx.message);
    }

    fn call_exception_handler(&mut self, ctx: ExceptionContext<'_>) {
        match self.exception_handler.as_mut() {
            Some(handler) => handler(ctx),
            None => Self::default_exception_handler(ctx),
        }
    }
}

thread_local! {
    static LOOP: RefCell<OnceCell<LoopState>> = RefCell::new(OnceCell::new());
}

fn with_loop<R>(f: impl FnOnce(&mut LoopState) -> R) -> R {
    LOOP.with(|cell| {
        let mut cell = cell.borrow_mut();
        let state = cell
            .get_mut()
            .unwrap_or_else(|| panic!("{}", RuntimeError::NoRunningLoop));
        f(state)
    })
}

/// Resets the thread-local loop state, creating it on first call. Matches
/// the Loop globals' lifecycle: "reset (not destroyed) by the same call to
/// support re-running."
pub fn new_event_loop(config: LoopConfig) {
    LOOP.with(|cell| {
        let mut cell = cell.borrow_mut();
        let generation = cell.get().map(|s| s.generation + 1).unwrap_or(0);
        let mut state = LoopState::new(config);
        state.generation = generation;
        *cell = OnceCell::new();
        cell.set(state)
            .unwrap_or_else(|_| unreachable!("cell was just reset"));
    });
}

/// A handle to a task's eventual result, generic over the declared output
/// type so that `result()` can downcast without the caller repeating the
/// unsafe cast. Equality/identity is by [`TaskId`]; the generation check
/// inside [`Tasks`] is what actually protects against a stale handle
/// outliving a loop reset.
pub struct Task<V> {
    id: TaskId,
    generation: u32,
    _marker: PhantomData<V>,
}

impl<V> Clone for Task<V> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<V> Copy for Task<V> {}

impl<V> PartialEq for Task<V> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.generation == other.generation
    }
}
impl<V> Eq for Task<V> {}

impl<V> std::fmt::Debug for Task<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task({:?}, gen {})", self.id, self.generation)
    }
}

impl<V: 'static> Task<V> {
    fn current_generation() -> u32 {
        with_loop(|state| state.generation)
    }

    fn check_generation(&self) {
        assert_eq!(
            self.generation,
            Self::current_generation(),
            "Task handle used after new_event_loop() reset the loop"
        );
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.check_generation();
        with_loop(|state| state.tasks.get_mut(self.id).name = Some(name.into()));
    }

    pub fn get_name(&self) -> Option<String> {
        self.check_generation();
        with_loop(|state| state.tasks.get(self.id).name.clone())
    }

    pub fn done(&self) -> bool {
        self.check_generation();
        with_loop(|state| {
            matches!(
                state.tasks.get(self.id).state,
                TaskState::DoneUnclaimed(_) | TaskState::DoneClaimed(_)
            )
        })
    }

    /// Peeks whether the task finished by raising an exception (as opposed
    /// to cancellation or a plain return), without claiming the outcome --
    /// unlike [`Task::result`], safe to call more than once and from more
    /// than one place (e.g. [`crate::compose::Wait`] scanning several
    /// tasks to decide whether `FirstException` is satisfied yet).
    pub fn failed_with_exception(&self) -> bool {
        self.check_generation();
        with_loop(|state| {
            matches!(
                state.tasks.get(self.id).state,
                TaskState::DoneUnclaimed(Outcome::Error(TaskError::Exception(_)))
                    | TaskState::DoneClaimed(Outcome::Error(TaskError::Exception(_)))
            )
        })
    }

    /// Requests cancellation. Returns `Ok(true)` if the task was live and
    /// the cancellation was queued, `Ok(false)` if the task had already
    /// finished (a no-op -- lets a caller loop `while task.cancel(None)?
    /// {}` the way scenario 3 repeatedly cancels until it stops taking
    /// effect), or `Err(CantCancelSelf)` if a task calls this on itself.
    pub fn cancel(&self, msg: Option<String>) -> Result<bool, RuntimeError> {
        self.check_generation();
        with_loop(|state| {
            if state.current == Some(self.id) {
                return Err(RuntimeError::CantCancelSelf);
            }
            if matches!(
                state.tasks.get(self.id).state,
                TaskState::DoneUnclaimed(_) | TaskState::DoneClaimed(_)
            ) {
                return Ok(false);
            }
            request_cancel(state, self.id, msg);
            Ok(true)
        })
    }

    /// Takes the task's outcome, consuming it exactly once -- the first
    /// call moves `V` out; every later call observes `DoneClaimed` and
    /// returns [`TaskAccessError::AlreadyClaimed`] without touching the
    /// (by then empty) stored outcome, matching "claimed at most once"
    /// from the data model.
    pub fn result(&self) -> Result<V, TaskAccessError> {
        self.check_generation();
        with_loop(|state| {
            let record = state.tasks.get_mut(self.id);
            match &record.state {
                TaskState::DoneClaimed(_) => return Err(TaskAccessError::AlreadyClaimed),
                TaskState::DoneUnclaimed(_) => {}
                _ => return Err(TaskAccessError::NotDone(InvalidStateError)),
            }

            let outcome = match std::mem::replace(&mut record.state, TaskState::Runnable) {
                TaskState::DoneUnclaimed(outcome) => outcome,
                _ => unreachable!("matched DoneUnclaimed above"),
            };
            record.state = TaskState::DoneClaimed(Outcome::Value(Box::new(())));
            match outcome {
                Outcome::Value(v) => Ok(*v
                    .downcast::<V>()
                    .unwrap_or_else(|_| panic!("task result type mismatch"))),
                Outcome::Error(err) => Err(TaskAccessError::Failed(err)),
            }
        })
    }
}

/// Links `waiter` into `target`'s waitlist, to be woken when `target`
/// finishes. `target`'s own scheduling (its membership in the ready/timer
/// queue) is untouched -- `state` and ready-queue linkage are orthogonal,
/// matching the Task data model.
pub(crate) fn park_on(state: &mut LoopState, target: TaskId, waiter: TaskId) {
    let now = state.clock.now();
    let prev = std::mem::replace(&mut state.tasks.get_mut(target).state, TaskState::Runnable);
    let mut waitlist = match prev {
        TaskState::Waiters(root) => TaskQueue::from_root(root),
        TaskState::Runnable => TaskQueue::new(),
        other => {
            state.tasks.get_mut(target).state = other;
            panic!("cannot await a task that has already finished or has no waiters slot");
        }
    };
    waitlist.push(&mut state.tasks, waiter, now);
    state.tasks.get_mut(target).state = TaskState::Waiters(waitlist.into_root());
    state.tasks.get_mut(waiter).data = Parked::AwaitingTask(target);
}

/// Allocates a fresh waitlist id for a synchronization primitive to park
/// tasks on via [`park_on_waitlist`].
pub(crate) fn alloc_waitlist(state: &mut LoopState) -> u64 {
    let id = state.next_aux_id;
    state.next_aux_id += 1;
    state.aux_queues.insert(id, TaskQueue::new());
    id
}

/// Parks `task` on waitlist `id`, e.g. an `Event`'s waiters or a `Queue`'s
/// `waiting_for_put`/`waiting_for_get`.
pub(crate) fn park_on_waitlist(state: &mut LoopState, id: u64, task: TaskId) {
    let now = state.clock.now();
    let queue = state
        .aux_queues
        .get_mut(&id)
        .expect("parking on an unknown waitlist id");
    queue.push(&mut state.tasks, task, now);
    state.tasks.get_mut(task).data = Parked::Waitlist(id);
}

/// Wakes the single oldest task parked on waitlist `id`, if any, moving it
/// back onto the ready queue.
pub(crate) fn wake_one_from_waitlist(state: &mut LoopState, id: u64) -> bool {
    let Some(task) = state
        .aux_queues
        .get_mut(&id)
        .expect("waking an unknown waitlist id")
        .pop(&mut state.tasks)
    else {
        return false;
    };
    let now = state.clock.now();
    state.tasks.get_mut(task).data = Parked::None;
    state.rq.push(&mut state.tasks, task, now);
    true
}

/// Wakes every task currently parked on waitlist `id`.
pub(crate) fn wake_all_from_waitlist(state: &mut LoopState, id: u64) {
    while wake_one_from_waitlist(state, id) {}
}

/// Public entry point for synchronization primitives (`Event`, `Queue`) to
/// obtain a waitlist of their own from the running loop.
pub fn new_waitlist() -> u64 {
    with_loop(alloc_waitlist)
}

/// Wake every task parked on waitlist `id`.
pub fn wake_all(id: u64) {
    with_loop(|state| wake_all_from_waitlist(state, id));
}

/// Wake the single oldest task parked on waitlist `id`. Returns whether
/// anything was woken.
pub fn wake_one(id: u64) -> bool {
    with_loop(|state| wake_one_from_waitlist(state, id))
}

/// Marks `task` for cancellation: queues a [`CancelledError`] to be thrown
/// into it the next time it's stepped, unparking it immediately from
/// whichever structure currently holds it (the ready queue, an I/O wait,
/// or a synchronization primitive's waitlist) so the throw is observed
/// promptly rather than only after whatever it was waiting for occurs.
pub(crate) fn request_cancel(state: &mut LoopState, task: TaskId, msg: Option<String>) {
    if matches!(
        state.tasks.get(task).state,
        TaskState::DoneUnclaimed(_) | TaskState::DoneClaimed(_)
    ) {
        return;
    }

    let prev_data = std::mem::replace(&mut state.tasks.get_mut(task).data, Parked::None);
    match prev_data {
        Parked::None => {
            // Already linked in `rq`; overwrite what it resumes with.
            state.tasks.get_mut(task).data = Parked::PendingThrow(Box::new(CancelledError(msg)));
            return;
        }
        Parked::Waitlist(id) => {
            state
                .aux_queues
                .get_mut(&id)
                .expect("cancelling a task on an unknown waitlist id")
                .remove(&mut state.tasks, task);
        }
        Parked::IOQueue(stream, interest) => {
            state.ioq.remove(state.selector.as_mut(), stream, interest);
        }
        Parked::AwaitingTask(target) => {
            if let TaskState::Waiters(root) = &state.tasks.get(target).state {
                let mut waitlist = TaskQueue::from_root(*root);
                waitlist.remove(&mut state.tasks, task);
                let root = waitlist.into_root();
                state.tasks.get_mut(target).state = TaskState::Waiters(root);
            }
        }
        Parked::PendingThrow(_) => {}
    }

    state.tasks.get_mut(task).data = Parked::PendingThrow(Box::new(CancelledError(msg)));
    let now = state.clock.now();
    state.rq.push(&mut state.tasks, task, now);
}

/// Spawns `coro` as a new task, runnable on the next loop iteration.
pub fn create_task<C, V>(coro: C) -> Task<V>
where
    C: Coroutine + 'static,
    V: 'static,
{
    with_loop(|state| {
        let now = state.clock.now();
        let id = state.tasks.insert(Box::new(coro), now);
        state.rq.push(&mut state.tasks, id, now);
        Task {
            id,
            generation: state.generation,
            _marker: PhantomData,
        }
    })
}

/// Schedules `f` to run once, on the next loop iteration, ahead of any
/// timers -- a plain callback, not a coroutine. See SPEC_FULL.md §9.
pub fn call_soon<F>(f: F)
where
    F: FnMut() + 'static,
{
    create_task::<_, ()>(OnceCallback::new(f));
}

/// The currently running task, if called from within one.
pub fn current_task<V: 'static>() -> Option<Task<V>> {
    with_loop(|state| {
        state.current.map(|id| Task {
            id,
            generation: state.generation,
            _marker: PhantomData,
        })
    })
}

/// The loop's own clock reading, per SPEC_FULL.md §9's `Loop.time()`.
pub fn time() -> Tick {
    with_loop(|state| state.clock.now())
}

pub fn set_exception_handler<F>(handler: F)
where
    F: FnMut(ExceptionContext<'_>) + 'static,
{
    with_loop(|state| state.exception_handler = Some(Box::new(handler)));
}

/// Requests that [`run_forever`] return after the current iteration.
pub fn stop() {
    with_loop(|state| state.stop_requested = true);
}

/// Runs one iteration of the loop: steps every task whose key has come
/// due, then polls I/O for however long until the next timer fires.
///
/// Grounded on `core.py`'s `Loop.run_forever` body and
/// `single_executor.rs`'s `do_work`: pop-and-step the ready set first,
/// then block on the selector only long enough to not busy-spin while a
/// timer is still pending. Each sub-step takes its own [`with_loop`] call
/// rather than one call wrapping the whole iteration, so that
/// [`step_task`] can run a coroutine's `step` with no `LoopState` borrow
/// held -- see its doc comment.
fn run_once() {
    loop {
        let due = with_loop(|state| {
            let now = state.clock.now();
            match state.rq.peek_key(&state.tasks) {
                Some(key) if crate::clock::diff(key, now) <= 0 => {
                    Some(state.rq.pop(&mut state.tasks).expect("peeked a key but pop returned None"))
                }
                _ => None,
            }
        });
        let Some(task) = due else { break };
        step_task(task);
    }

    let has_io_waiters = with_loop(|state| !state.ioq.is_empty());
    if has_io_waiters {
        let timeout = with_loop(|state| {
            state.rq.peek_key(&state.tasks).map(|next_key| {
                let delta = crate::clock::diff(next_key, state.clock.now()).max(0);
                Duration::from_millis(delta as u64)
            })
        });
        let ready = with_loop(|state| state.ioq.poll(state.selector.as_mut(), timeout));
        with_loop(|state| {
            let now = state.clock.now();
            for task in ready {
                state.tasks.get_mut(task).state = TaskState::Runnable;
                state.tasks.get_mut(task).data = Parked::None;
                state.rq.push(&mut state.tasks, task, now);
            }
        });
    }
}

/// Advances one task by one `step`, applying the resulting state
/// transition: re-suspend (leave parked), finish with a value, finish with
/// an exception, or propagate completion to anyone awaiting it.
///
/// The coroutine is taken out of the arena and stepped with no `with_loop`
/// borrow held: a task's own body routinely calls back into the facade
/// (`current_task`, `Task::cancel`, `time`, an `Event`/`Queue` waking
/// someone) and each of those calls `with_loop` itself. Stepping while
/// still inside the outer `with_loop` closure that dispatched to this
/// function would make that a second, nested borrow of the same
/// `RefCell` and panic.
pub(crate) fn step_task(task: TaskId) {
    let (resume, mut coro, prev_current) = with_loop(|state| {
        let resume = match std::mem::replace(&mut state.tasks.get_mut(task).data, Parked::None) {
            Parked::PendingThrow(exc) => Resume::Throw(exc),
            _ => Resume::Go,
        };
        let prev_current = state.current.replace(task);
        let coro = state
            .tasks
            .get_mut(task)
            .coro
            .take()
            .expect("task stepped while already stepping");
        (resume, coro, prev_current)
    });

    let step_result = coro.step(resume);

    with_loop(|state| {
        state.current = prev_current;
        state.tasks.get_mut(task).coro = Some(coro);

        match step_result {
            Step::Suspended(yielded) => {
                tracing::debug!(?task, ?yielded, "task suspended");
                apply_yield(state, task, yielded);
            }
            Step::Returned(value) => {
                tracing::debug!(?task, "task returned");
                finish_task(state, task, Outcome::Value(value));
            }
            Step::Raised(err) => {
                tracing::debug!(?task, "task raised");
                let outcome = if err.downcast_ref::<CancelledError>().is_some() {
                    let cancelled = *err.downcast::<CancelledError>().unwrap();
                    Outcome::Error(TaskError::Cancelled(cancelled))
                } else {
                    Outcome::Error(TaskError::Exception(err))
                };
                finish_task(state, task, outcome);
            }
        }
    });
}

/// Interprets what a just-suspended coroutine asked to wait on, linking
/// `task` into the appropriate structure. Mirrors `core.py`'s run loop
/// switching on the value a task's generator yielded.
fn apply_yield(state: &mut LoopState, task: TaskId, yielded: Yield) {
    match yielded {
        Yield::Ready => {
            let now = state.clock.now();
            state.rq.push(&mut state.tasks, task, now);
        }
        Yield::SleepUntil(tick) => {
            state.rq.push(&mut state.tasks, task, tick);
        }
        Yield::AwaitTask(target) => {
            if !state.tasks.contains(target) {
                // Stale handle; treat as already complete so the awaiter
                // doesn't hang. Caller's `result()` will panic on the next
                // `Task::result` call via the generation check instead.
                let now = state.clock.now();
                state.rq.push(&mut state.tasks, task, now);
                return;
            }
            match state.tasks.get(target).state {
                TaskState::DoneUnclaimed(_) | TaskState::DoneClaimed(_) => {
                    let now = state.clock.now();
                    state.rq.push(&mut state.tasks, task, now);
                }
                _ => park_on(state, target, task),
            }
        }
        Yield::Io(stream, interest) => {
            state.ioq.park(state.selector.as_mut(), stream, interest, task);
            state.tasks.get_mut(task).data = Parked::IOQueue(stream, interest);
        }
        Yield::Waitlist(id) => {
            park_on_waitlist(state, id, task);
        }
    }
}

fn finish_task(state: &mut LoopState, task: TaskId, outcome: Outcome) {
    let prev_state = std::mem::replace(&mut state.tasks.get_mut(task).state, TaskState::Runnable);
    match prev_state {
        TaskState::Waiters(root) => {
            // Every awaiter is responsible for observing this outcome
            // itself via `result()`; an exception only reaches the
            // exception handler when nobody was awaiting (the `Callback`
            // and bare `Runnable` arms below).
            let mut waitlist = TaskQueue::from_root(root);
            let now = state.clock.now();
            while let Some(waiter) = waitlist.pop(&mut state.tasks) {
                state.tasks.get_mut(waiter).state = TaskState::Runnable;
                state.tasks.get_mut(waiter).data = Parked::None;
                state.rq.push(&mut state.tasks, waiter, now);
            }
            state.tasks.get_mut(task).state = TaskState::DoneUnclaimed(outcome);
        }
        TaskState::Callback => {
            if let Outcome::Error(TaskError::Exception(err)) = &outcome {
                let name = state.tasks.get(task).name.clone();
                state.call_exception_handler(ExceptionContext {
                    task_name: name.as_deref(),
                    message: format!("Task exception was never retrieved: {err}"),
                });
            }
            state.tasks.get_mut(task).state = TaskState::DoneClaimed(outcome);
        }
        TaskState::Runnable => {
            // No awaiter and no callback slot -- same as `Callback` below,
            // an unclaimed exception here never reaches anyone through
            // `result()`, so it goes to the exception handler now rather
            // than vanishing silently.
            if let Outcome::Error(TaskError::Exception(err)) = &outcome {
                let name = state.tasks.get(task).name.clone();
                state.call_exception_handler(ExceptionContext {
                    task_name: name.as_deref(),
                    message: format!("Task exception was never retrieved: {err}"),
                });
            }
            state.tasks.get_mut(task).state = TaskState::DoneUnclaimed(outcome);
        }
        TaskState::DoneUnclaimed(_) | TaskState::DoneClaimed(_) => {
            unreachable!("a task cannot finish twice")
        }
    }
}

/// Runs a single iteration: steps every currently-due task once, then polls
/// I/O for up to the time remaining until the next timer. Grounded on
/// `single/mod.rs`'s `run_once` free function.
pub fn step() {
    run_once();
}

/// Runs the loop until [`stop`] is called, or until there is nothing left
/// that could ever become runnable (both the ready/timer queue and the I/O
/// queue are empty) -- it does not literally run forever with nothing
/// queued, matching the observed behavior of `core.py`'s `run_forever`.
pub fn run_forever() {
    loop {
        run_once();
        let (should_stop, nothing_left) = with_loop(|state| {
            (
                state.stop_requested,
                state.rq.is_empty() && state.ioq.is_empty(),
            )
        });
        if should_stop {
            with_loop(|state| state.stop_requested = false);
            break;
        }
        if nothing_left {
            break;
        }
    }
}

/// Runs the loop until `task` completes, returning its outcome.
pub fn run_until_complete<V: 'static>(task: Task<V>) -> Result<V, TaskAccessError> {
    loop {
        if task.done() {
            return task.result();
        }
        run_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coro::Step;
    use serial_test::serial;

    struct Immediate(i32);
    impl Coroutine for Immediate {
        fn step(&mut self, _resume: Resume) -> Step {
            Step::Returned(Box::new(self.0))
        }
    }

    #[test]
    #[serial]
    fn run_until_complete_returns_task_value() {
        new_event_loop(LoopConfig::new());
        let task = create_task::<_, i32>(Immediate(7));
        let result = run_until_complete(task);
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    #[serial]
    fn stale_handle_after_reset_panics() {
        new_event_loop(LoopConfig::new());
        let task = create_task::<_, i32>(Immediate(1));
        new_event_loop(LoopConfig::new());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task.done()));
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn double_result_call_returns_already_claimed_second_time() {
        new_event_loop(LoopConfig::new());
        let task = create_task::<_, i32>(Immediate(5));
        let _ = run_until_complete(task);
        let second = task.result();
        assert!(matches!(second, Err(TaskAccessError::AlreadyClaimed)));
    }
}
