//! A FIFO queue of tasks, ported from
//! `examples/original_source/asyncio/queue.py`.
//!
//! `Queue` is parameterized over its item type rather than type-erased:
//! unlike a `Task`'s output, which must be stored heterogeneously
//! alongside every other task, a queue's items are only ever handled by
//! code that already knows what type it put in.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::coro::{Coroutine, Resume, Step, Yield};
use crate::error::{QueueEmpty, QueueFull, RuntimeError};
use crate::loop_;

struct Inner<T> {
    maxsize: usize,
    items: RefCell<VecDeque<T>>,
    waiting_for_put: u64,
    waiting_for_get: u64,
    unfinished: Cell<usize>,
    waiting_for_completion: u64,
}

/// A bounded (`maxsize > 0`) or unbounded (`maxsize == 0`) FIFO queue with
/// async-flavored `put`/`get` and a `task_done`/`join` completion protocol,
/// all backed by the loop's waitlist table rather than any OS primitive.
pub struct Queue<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Queue<T> {
    pub fn new(maxsize: usize) -> Self {
        Self {
            inner: Rc::new(Inner {
                maxsize,
                items: RefCell::new(VecDeque::new()),
                waiting_for_put: loop_::new_waitlist(),
                waiting_for_get: loop_::new_waitlist(),
                unfinished: Cell::new(0),
                waiting_for_completion: loop_::new_waitlist(),
            }),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    pub fn qsize(&self) -> usize {
        self.inner.items.borrow().len()
    }

    pub fn empty(&self) -> bool {
        self.qsize() == 0
    }

    pub fn full(&self) -> bool {
        self.inner.maxsize > 0 && self.qsize() >= self.inner.maxsize
    }

    /// Enqueue `item` without suspending. Fails with the item handed back
    /// if the queue is at capacity.
    pub fn put_nowait(&self, item: T) -> Result<(), (QueueFull, T)> {
        if self.full() {
            return Err((QueueFull, item));
        }
        self.inner.items.borrow_mut().push_back(item);
        self.inner.unfinished.set(self.inner.unfinished.get() + 1);
        loop_::wake_one(self.inner.waiting_for_get);
        Ok(())
    }

    /// Dequeue without suspending. Fails if the queue has nothing buffered.
    pub fn get_nowait(&self) -> Result<T, QueueEmpty> {
        let item = self.inner.items.borrow_mut().pop_front().ok_or(QueueEmpty)?;
        loop_::wake_one(self.inner.waiting_for_put);
        Ok(item)
    }

    /// Marks one previously-`get`'d item as fully processed. When the
    /// count of unfinished items reaches zero, every task parked in
    /// [`Queue::join`] wakes.
    pub fn task_done(&self) -> Result<(), RuntimeError> {
        let remaining = self.inner.unfinished.get();
        if remaining == 0 {
            return Err(RuntimeError::TaskDoneUnderflow);
        }
        self.inner.unfinished.set(remaining - 1);
        if remaining == 1 {
            loop_::wake_all(self.inner.waiting_for_completion);
        }
        Ok(())
    }

    /// A task body that enqueues `item`, suspending while the queue is
    /// full.
    pub fn put(&self, item: T) -> PutWait<T> {
        PutWait {
            queue: self.clone(),
            item: Some(item),
        }
    }

    /// A task body that dequeues one item, suspending while the queue is
    /// empty.
    pub fn get(&self) -> GetWait<T> {
        GetWait {
            queue: self.clone(),
        }
    }

    /// A task body that suspends until every enqueued item has been
    /// `task_done`.
    pub fn join(&self) -> JoinWait<T> {
        JoinWait {
            queue: self.clone(),
        }
    }
}

pub struct PutWait<T> {
    queue: Queue<T>,
    item: Option<T>,
}

impl<T> Coroutine for PutWait<T> {
    fn step(&mut self, resume: Resume) -> Step {
        if let Resume::Throw(err) = resume {
            return Step::Raised(err);
        }
        let item = self
            .item
            .take()
            .expect("PutWait stepped again after completing");
        match self.queue.put_nowait(item) {
            Ok(()) => Step::Returned(Box::new(())),
            Err((_full, item)) => {
                self.item = Some(item);
                Step::Suspended(Yield::Waitlist(self.queue.inner.waiting_for_put))
            }
        }
    }
}

pub struct GetWait<T> {
    queue: Queue<T>,
}

impl<T: 'static> Coroutine for GetWait<T> {
    fn step(&mut self, resume: Resume) -> Step {
        if let Resume::Throw(err) = resume {
            return Step::Raised(err);
        }
        match self.queue.get_nowait() {
            Ok(item) => Step::Returned(Box::new(item)),
            Err(QueueEmpty) => Step::Suspended(Yield::Waitlist(self.queue.inner.waiting_for_get)),
        }
    }
}

pub struct JoinWait<T> {
    queue: Queue<T>,
}

impl<T> Coroutine for JoinWait<T> {
    fn step(&mut self, resume: Resume) -> Step {
        if let Resume::Throw(err) = resume {
            return Step::Raised(err);
        }
        if self.queue.inner.unfinished.get() == 0 {
            Step::Returned(Box::new(()))
        } else {
            Step::Suspended(Yield::Waitlist(self.queue.inner.waiting_for_completion))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loop_::{create_task, new_event_loop, run_until_complete, LoopConfig};
    use serial_test::serial;

    #[test]
    #[serial]
    fn nowait_roundtrip() {
        new_event_loop(LoopConfig::new());
        let q: Queue<i32> = Queue::unbounded();
        q.put_nowait(1).unwrap();
        q.put_nowait(2).unwrap();
        assert_eq!(q.get_nowait().unwrap(), 1);
        assert_eq!(q.get_nowait().unwrap(), 2);
        assert!(matches!(q.get_nowait(), Err(QueueEmpty)));
    }

    #[test]
    #[serial]
    fn bounded_put_suspends_until_space_frees_up() {
        new_event_loop(LoopConfig::new());
        let q: Queue<i32> = Queue::new(1);
        q.put_nowait(1).unwrap();
        assert!(q.full());

        let putter = create_task::<_, ()>(q.put(2));
        crate::loop_::step();
        assert!(!putter.done());

        assert_eq!(q.get_nowait().unwrap(), 1);
        let result = run_until_complete(putter);
        assert!(result.is_ok());
        assert_eq!(q.get_nowait().unwrap(), 2);
    }

    #[test]
    #[serial]
    fn join_waits_for_all_task_done_calls() {
        new_event_loop(LoopConfig::new());
        let q: Queue<i32> = Queue::unbounded();
        q.put_nowait(1).unwrap();
        q.put_nowait(2).unwrap();

        let joiner = create_task::<_, ()>(q.join());
        crate::loop_::step();
        assert!(!joiner.done());

        q.task_done().unwrap();
        crate::loop_::step();
        assert!(!joiner.done());

        q.task_done().unwrap();
        let result = run_until_complete(joiner);
        assert!(result.is_ok());
    }

    #[test]
    #[serial]
    fn task_done_without_matching_put_is_an_error() {
        new_event_loop(LoopConfig::new());
        let q: Queue<i32> = Queue::unbounded();
        assert!(matches!(q.task_done(), Err(RuntimeError::TaskDoneUnderflow)));
    }
}
