//! The public `TaskQueue`: a named root into the pairing heap.
//!
//! A `TaskQueue` owns no task data itself -- it is just the current heap
//! root plus the meld/pop/remove operations from [`crate::task::Tasks`].
//! The ready queue, every timer queue, and every synchronization
//! primitive's private waitlist are each one `TaskQueue` value, all backed
//! by the same arena. This mirrors `task.py`'s `TaskQueue` class, which
//! likewise is nothing but a `heap` attribute and three methods.

use crate::clock::Tick;
use crate::task::{TaskId, Tasks};

/// A priority queue of tasks ordered by wrap-safe `ph_key`, with O(1)
/// amortized push, O(log n) amortized pop, and O(n) worst-case arbitrary
/// removal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskQueue {
    heap: Option<TaskId>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self { heap: None }
    }

    /// Wrap an existing heap root, e.g. one previously stashed inside
    /// [`crate::task::TaskState::Waiters`].
    pub fn from_root(root: Option<TaskId>) -> Self {
        Self { heap: root }
    }

    /// Unwrap back to a bare root, e.g. to stash into
    /// [`crate::task::TaskState::Waiters`].
    pub fn into_root(self) -> Option<TaskId> {
        self.heap
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_none()
    }

    /// Push `task` in at `key`, becoming eligible for [`TaskQueue::peek`]/
    /// [`TaskQueue::pop`] ordered by `key`.
    pub fn push(&mut self, tasks: &mut Tasks, task: TaskId, key: Tick) {
        tasks.get_mut(task).ph_key = key;
        self.heap = tasks.ph_meld(self.heap, Some(task));
    }

    /// The task with the smallest key, without removing it.
    pub fn peek(&self) -> Option<TaskId> {
        self.heap
    }

    /// The key the head of the queue would fire at, if any.
    pub fn peek_key(&self, tasks: &Tasks) -> Option<Tick> {
        self.heap.map(|id| tasks.get(id).ph_key)
    }

    /// Remove and return the task with the smallest key.
    pub fn pop(&mut self, tasks: &mut Tasks) -> Option<TaskId> {
        let root = self.heap?;
        let child = tasks.get(root).ph_child;
        self.heap = tasks.ph_pairing(child);
        tasks.get_mut(root).ph_child = None;
        tasks.get_mut(root).ph_child_last = None;
        Some(root)
    }

    /// Remove `task` from wherever it sits in this queue. A no-op if
    /// `task` is not linked into this queue.
    pub fn remove(&mut self, tasks: &mut Tasks, task: TaskId) {
        self.heap = tasks.ph_delete(self.heap, task);
        tasks.get_mut(task).ph_child = None;
        tasks.get_mut(task).ph_child_last = None;
        tasks.get_mut(task).ph_next = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coro::{Resume, Step, Yield};
    use crate::task::Tasks;

    struct Noop;
    impl crate::coro::Coroutine for Noop {
        fn step(&mut self, _resume: Resume) -> Step {
            Step::Suspended(Yield::Ready)
        }
    }

    #[test]
    fn fifo_among_equal_keys_follows_push_order() {
        let mut tasks = Tasks::new();
        let mut q = TaskQueue::new();
        let a = tasks.insert(Box::new(Noop), 0);
        let b = tasks.insert(Box::new(Noop), 0);
        q.push(&mut tasks, a, 5);
        q.push(&mut tasks, b, 5);

        // Both keys tie; `ph_meld`'s `<=` branch keeps the earlier push as
        // root, so pop order follows push order for equal keys.
        assert_eq!(q.pop(&mut tasks), Some(a));
        assert_eq!(q.pop(&mut tasks), Some(b));
        assert!(q.is_empty());
    }

    #[test]
    fn remove_then_pop_skips_removed_task() {
        let mut tasks = Tasks::new();
        let mut q = TaskQueue::new();
        let a = tasks.insert(Box::new(Noop), 0);
        let b = tasks.insert(Box::new(Noop), 0);
        let c = tasks.insert(Box::new(Noop), 0);
        q.push(&mut tasks, a, 1);
        q.push(&mut tasks, b, 2);
        q.push(&mut tasks, c, 3);

        q.remove(&mut tasks, b);

        assert_eq!(q.pop(&mut tasks), Some(a));
        assert_eq!(q.pop(&mut tasks), Some(c));
        assert!(q.is_empty());
    }
}
