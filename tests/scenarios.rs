//! End-to-end scenarios exercising the scheduler the way a real caller
//! would: spawning tasks, letting the loop run them to completion, and
//! observing cancellation, composition, and concurrency behavior together
//! rather than one subsystem at a time.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use serial_test::serial;

use weft::{
    compose::{gather, wait_for},
    coro::{Coroutine, Resume, Step, Yield},
    error::{RuntimeError, TaskAccessError, TaskError},
    loop_::{
        create_task, current_task, new_event_loop, run_until_complete, set_exception_handler,
        LoopConfig, Task,
    },
    sleep::SleepMs,
};

struct Returns42;
impl Coroutine for Returns42 {
    fn step(&mut self, _resume: Resume) -> Step {
        Step::Returned(Box::new(42i32))
    }
}

/// Scenario 1: a task that immediately returns a value completes with it.
#[test]
#[serial]
fn scenario_1_plain_return_value() {
    new_event_loop(LoopConfig::new());
    let task = create_task::<_, i32>(Returns42);
    assert_eq!(run_until_complete(task).unwrap(), 42);
}

/// A task body that sleeps a long time, over and over -- modeling a
/// background worker that outlives whatever `main` is doing.
struct Forever {
    sleeping: SleepMs,
}

impl Forever {
    fn new(now: weft::Tick) -> Self {
        Self {
            sleeping: SleepMs::for_duration(now, 10_000),
        }
    }
}

impl Coroutine for Forever {
    fn step(&mut self, resume: Resume) -> Step {
        self.sleeping.step(resume)
    }
}

/// Scenario 2: a long-lived background task is spawned and never awaited;
/// the caller's own short task still completes and the abandoned task does
/// not trip the exception handler (it neither panics nor raises).
#[test]
#[serial]
fn scenario_2_abandoned_background_task_does_not_fire_exception_handler() {
    new_event_loop(LoopConfig::new());
    let handler_fired = Rc::new(RefCell::new(false));
    let flag = handler_fired.clone();
    set_exception_handler(move |_ctx| *flag.borrow_mut() = true);

    let now = weft::loop_::time();
    let _background = create_task::<_, ()>(Forever::new(now));
    let main = create_task::<_, i32>(SleepThenReturn {
        sleeping: SleepMs::for_duration(now, 1),
        value: 42,
    });

    assert_eq!(run_until_complete(main).unwrap(), 42);
    assert!(!*handler_fired.borrow());
}

struct SleepThenReturn {
    sleeping: SleepMs,
    value: i32,
}

impl Coroutine for SleepThenReturn {
    fn step(&mut self, resume: Resume) -> Step {
        match self.sleeping.step(resume) {
            Step::Returned(_) => Step::Returned(Box::new(self.value)),
            other => other,
        }
    }
}

/// `task_a`: sleeps repeatedly until cancelled, logging "sleep a" on its
/// first step and "cancelled a" the moment it observes the cancellation.
struct TaskA {
    log: Rc<RefCell<Vec<String>>>,
    sleeping: Option<SleepMs>,
}

impl Coroutine for TaskA {
    fn step(&mut self, resume: Resume) -> Step {
        if let Resume::Throw(err) = resume {
            self.log.borrow_mut().push("cancelled a".to_string());
            return Step::Raised(err);
        }
        if self.sleeping.is_none() {
            self.log.borrow_mut().push("sleep a".to_string());
        }
        let now = weft::loop_::time();
        let mut sleeping = self
            .sleeping
            .take()
            .unwrap_or_else(|| SleepMs::for_duration(now, 1_000));
        match sleeping.step(Resume::Go) {
            Step::Suspended(y) => {
                self.sleeping = Some(sleeping);
                Step::Suspended(y)
            }
            Step::Returned(_) => {
                self.sleeping = Some(SleepMs::for_duration(now, 1_000));
                Step::Suspended(Yield::Ready)
            }
            other => other,
        }
    }
}

/// `task_b(i)`: repeatedly cancels `target` and yields until cancellation
/// stops taking effect (the target is already done), then logs completion.
struct TaskB {
    id: u32,
    target: Task<()>,
    log: Rc<RefCell<Vec<String>>>,
    started: bool,
}

impl Coroutine for TaskB {
    fn step(&mut self, resume: Resume) -> Step {
        if let Resume::Throw(err) = resume {
            return Step::Raised(err);
        }
        if !self.started {
            self.started = true;
            self.log
                .borrow_mut()
                .push(format!("sleep b {}", self.id));
        }
        match self.target.cancel(None) {
            Ok(true) => Step::Suspended(Yield::Ready),
            Ok(false) => {
                self.log.borrow_mut().push(format!("done b {}", self.id));
                Step::Returned(Box::new(()))
            }
            Err(e) => panic!("unexpected cancel error in scenario 3: {e}"),
        }
    }
}

/// Scenario 3: three tasks race to cancel a fourth; the target observes and
/// logs its own cancellation, and every canceller eventually stops looping
/// once the target is done.
#[test]
#[serial]
fn scenario_3_repeated_cancel_until_target_is_done() {
    new_event_loop(LoopConfig::new());
    let log = Rc::new(RefCell::new(Vec::new()));

    let task_a = create_task::<_, ()>(TaskA {
        log: log.clone(),
        sleeping: None,
    });
    let bs: Vec<Task<()>> = (0..3)
        .map(|i| {
            create_task::<_, ()>(TaskB {
                id: i,
                target: task_a,
                log: log.clone(),
                started: false,
            })
        })
        .collect();

    let joined = create_task::<_, Vec<Option<Result<(), TaskError>>>>(gather(bs.clone(), true));
    let _ = run_until_complete(joined);

    assert!(task_a.done());
    assert!(bs.iter().all(|b| b.done()));

    let entries = log.borrow();
    assert!(entries.contains(&"sleep a".to_string()));
    assert_eq!(
        entries.iter().filter(|e| e.as_str() == "cancelled a").count(),
        1,
        "task_a should observe exactly one cancellation"
    );
    let cancelled_at = entries.iter().position(|e| e == "cancelled a").unwrap();
    for i in 0..3u32 {
        let sleep_at = entries
            .iter()
            .position(|e| e == &format!("sleep b {i}"))
            .unwrap_or_else(|| panic!("missing 'sleep b {i}' entry"));
        let done_at = entries
            .iter()
            .position(|e| e == &format!("done b {i}"))
            .unwrap_or_else(|| panic!("missing 'done b {i}' entry"));
        assert!(sleep_at < done_at, "task_b {i} should sleep before it's done");
        assert!(
            done_at >= cancelled_at,
            "task_b {i} should only finish once task_a has observed cancellation"
        );
    }
}

/// A task body that tries to cancel itself, capturing whatever `cancel`
/// reports back for the test to inspect.
struct SelfCancel {
    result: Rc<RefCell<Option<Result<bool, RuntimeError>>>>,
}

impl Coroutine for SelfCancel {
    fn step(&mut self, _resume: Resume) -> Step {
        let me = current_task::<()>().expect("running inside a task");
        *self.result.borrow_mut() = Some(me.cancel(None));
        Step::Returned(Box::new(()))
    }
}

/// Scenario 4: a task cancelling itself gets back `CantCancelSelf` instead
/// of succeeding or panicking.
#[test]
#[serial]
fn scenario_4_self_cancel_is_reported_as_an_error() {
    new_event_loop(LoopConfig::new());
    let result = Rc::new(RefCell::new(None));
    let task = create_task::<_, ()>(SelfCancel {
        result: result.clone(),
    });
    let _ = run_until_complete(task);
    match result.borrow().as_ref() {
        Some(Err(RuntimeError::CantCancelSelf)) => {}
        other => panic!("expected CantCancelSelf, got {other:?}"),
    }
}

#[derive(Debug)]
struct BoomError(i32);
impl fmt::Display for BoomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "boom({})", self.0)
    }
}
impl std::error::Error for BoomError {}

struct Raises(i32);
impl Coroutine for Raises {
    fn step(&mut self, _resume: Resume) -> Step {
        Step::Raised(Box::new(BoomError(self.0)))
    }
}

/// Scenario 5: an exception raised inside an awaited task re-surfaces in
/// whoever awaits it, unchanged.
#[test]
#[serial]
fn scenario_5_exception_in_awaited_task_reraises_in_awaiter() {
    new_event_loop(LoopConfig::new());
    let inner = create_task::<_, ()>(Raises(2));
    let awaiter = create_task::<_, ()>(weft::compose::AwaitTask::new(inner));
    match run_until_complete(awaiter) {
        Err(TaskAccessError::Failed(TaskError::Exception(err))) => {
            let boom = err
                .downcast_ref::<BoomError>()
                .expect("awaiter should see the same exception type");
            assert_eq!(boom.0, 2);
        }
        other => panic!("expected a re-raised exception, got {other:?}"),
    }
}

/// Scenario 6: two independently-sleeping tasks run concurrently, so the
/// total wall time is bounded by the *longer* sleep, not the sum of both.
#[test]
#[serial]
fn scenario_6_concurrent_sleeps_do_not_serialize() {
    new_event_loop(LoopConfig::new());
    let now = weft::loop_::time();
    let short = create_task::<_, ()>(SleepMs::for_duration(now, 20));
    let long = create_task::<_, ()>(SleepMs::for_duration(now, 40));

    let started = Instant::now();
    let joined = create_task::<_, Vec<Option<Result<(), TaskError>>>>(gather(
        vec![short, long],
        false,
    ));
    run_until_complete(joined).unwrap();
    let elapsed = started.elapsed();

    assert!(
        elapsed.as_millis() < 60,
        "concurrent sleeps took {elapsed:?}, expected well under 20ms + 40ms"
    );
}

/// `wait_for` cancels a task that outlives its timeout and surfaces
/// `TimeoutError` to the waiter, per spec section 8's testable property.
#[test]
#[serial]
fn wait_for_timeout_cancels_the_slow_task() {
    new_event_loop(LoopConfig::new());
    let now = weft::loop_::time();
    let slow = create_task::<_, ()>(SleepMs::for_duration(now, 500));
    let waiter = create_task::<_, ()>(wait_for(slow, 5));
    let result = run_until_complete(waiter);
    assert!(matches!(
        result,
        Err(TaskAccessError::Failed(TaskError::Exception(_)))
    ));
}
