//! Task storage and the intrusive pairing heap.
//!
//! Tasks live in a single generational arena ([`Tasks`]); every `TaskQueue`
//! (the ready queue, a timer queue, an `Event`'s waitlist, ...) is just a
//! root [`TaskId`] into that arena plus four intrusive link fields carried
//! on the task itself (`ph_key`/`ph_child`/`ph_child_last`/`ph_next`/
//! `ph_rightmost_parent`). This mirrors the pairing heap in
//! `examples/original_source/asyncio/task.py`, with raw pointers replaced
//! by arena indices the way the teacher's `synca::entrylist::EntryList`
//! replaces them with generational `Entry` handles.
//!
//! A task is in at most one `TaskQueue` at any time -- this is an invariant
//! of the design, not something enforced by the type system, the same way
//! the original relies on a task never appearing in two linked structures
//! at once.

use std::fmt;

use crate::clock::{diff, Tick};
use crate::coro::{BoxedAny, Coroutine, Thrown};
use crate::error::TaskError;
use crate::ioqueue::{Interest, StreamId};

/// A generational handle into [`Tasks`]. Cheap to copy, safe to hold past a
/// task's completion: looking it up after the slot has been recycled for a
/// new task fails the generation check instead of aliasing the wrong task.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({}#{})", self.index, self.generation)
    }
}

/// What a task produced, once it's no longer runnable.
pub enum Outcome {
    Value(BoxedAny),
    Error(TaskError),
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(_) => write!(f, "Outcome::Value(..)"),
            Outcome::Error(err) => write!(f, "Outcome::Error({err})"),
        }
    }
}

/// Who, if anyone, is waiting on this task and whether its result has been
/// claimed. Orthogonal to [`Parked`]: `state` is about what *others* can
/// observe about this task, `data` is about what *this task* is currently
/// blocked on.
#[derive(Debug)]
pub enum TaskState {
    /// Linked into the ready queue or a timer queue, eligible to be
    /// stepped.
    Runnable,
    /// Other tasks are parked on this task's waitlist, awaiting its
    /// completion.
    Waiters(Option<TaskId>),
    /// Created without anyone tracking completion (e.g. via `call_soon`):
    /// an unclaimed exception here goes straight to the exception handler
    /// instead of to a waiter.
    Callback,
    /// Finished; nobody has called `result()`/`exception()` yet.
    DoneUnclaimed(Outcome),
    /// Finished and already observed by a caller.
    DoneClaimed(Outcome),
}

/// What this task is currently blocked on. `None` means "not currently
/// parked" -- either runnable or done.
pub enum Parked {
    None,
    /// Awaiting another task's completion.
    AwaitingTask(TaskId),
    /// Parked on a synchronization primitive's waitlist (`Event`, `Queue`),
    /// identified by the waitlist's id in [`crate::loop_::LoopState`]'s aux
    /// queue table.
    Waitlist(u64),
    /// Parked awaiting I/O readiness on a registered stream/interest pair.
    IOQueue(StreamId, Interest),
    /// An exception queued to be thrown into this task the next time it's
    /// stepped, e.g. a propagated cancellation.
    PendingThrow(Thrown),
}

impl fmt::Debug for Parked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parked::None => write!(f, "Parked::None"),
            Parked::AwaitingTask(id) => write!(f, "Parked::AwaitingTask({id:?})"),
            Parked::Waitlist(id) => write!(f, "Parked::Waitlist({id})"),
            Parked::IOQueue(stream, interest) => write!(f, "Parked::IOQueue({stream}, {interest:?})"),
            Parked::PendingThrow(_) => write!(f, "Parked::PendingThrow(..)"),
        }
    }
}

/// A single task's full record, stored in the [`Tasks`] arena.
pub struct TaskRecord {
    pub(crate) generation: u32,
    pub(crate) task_num: u64,
    pub(crate) name: Option<String>,
    /// `None` only while this task's coroutine is out on loan to a running
    /// `step_task` call -- see that function's doc comment for why it must
    /// be removed from the record rather than borrowed in place.
    pub(crate) coro: Option<Box<dyn Coroutine>>,
    pub(crate) state: TaskState,
    pub(crate) data: Parked,

    // Intrusive pairing heap links. Meaningful only while this task is
    // linked into some `TaskQueue`.
    pub(crate) ph_key: Tick,
    pub(crate) ph_child: Option<TaskId>,
    pub(crate) ph_child_last: Option<TaskId>,
    pub(crate) ph_next: Option<TaskId>,
    pub(crate) ph_rightmost_parent: Option<TaskId>,
}

enum Slot {
    Occupied(TaskRecord),
    Free { next_free: Option<u32>, generation: u32 },
}

/// The generational arena that owns every live task.
///
/// Grounded on `synca::entrylist::EntryList`'s free-list-over-`Vec`
/// approach: slots are reused, and a stale [`TaskId`] is detected by
/// generation mismatch rather than aliasing a recycled slot.
#[derive(Default)]
pub struct Tasks {
    slots: Vec<Slot>,
    free_head: Option<u32>,
    next_task_num: u64,
}

impl Tasks {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            next_task_num: 1,
        }
    }

    pub fn insert(&mut self, coro: Box<dyn Coroutine>, ph_key: Tick) -> TaskId {
        let task_num = self.next_task_num;
        self.next_task_num += 1;
        let record = TaskRecord {
            generation: 0,
            task_num,
            name: None,
            coro: Some(coro),
            state: TaskState::Runnable,
            data: Parked::None,
            ph_key,
            ph_child: None,
            ph_child_last: None,
            ph_next: None,
            ph_rightmost_parent: None,
        };

        if let Some(free_index) = self.free_head {
            let slot = &mut self.slots[free_index as usize];
            let generation = match slot {
                Slot::Free { generation, .. } => *generation,
                Slot::Occupied(_) => unreachable!("free list points at an occupied slot"),
            };
            self.free_head = match slot {
                Slot::Free { next_free, .. } => *next_free,
                Slot::Occupied(_) => unreachable!(),
            };
            let mut record = record;
            record.generation = generation;
            *slot = Slot::Occupied(record);
            TaskId {
                index: free_index,
                generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot::Occupied(record));
            TaskId {
                index,
                generation: 0,
            }
        }
    }

    pub fn remove(&mut self, id: TaskId) -> TaskRecord {
        let slot = &mut self.slots[id.index as usize];
        let next_generation = match slot {
            Slot::Occupied(record) if record.generation == id.generation => {
                record.generation.wrapping_add(1)
            }
            _ => panic!("removing a stale or already-freed TaskId"),
        };
        let old = std::mem::replace(
            slot,
            Slot::Free {
                next_free: self.free_head,
                generation: next_generation,
            },
        );
        self.free_head = Some(id.index);
        match old {
            Slot::Occupied(record) => record,
            Slot::Free { .. } => unreachable!(),
        }
    }

    pub fn get(&self, id: TaskId) -> &TaskRecord {
        match &self.slots[id.index as usize] {
            Slot::Occupied(record) if record.generation == id.generation => record,
            _ => panic!("use of a stale TaskId"),
        }
    }

    pub fn get_mut(&mut self, id: TaskId) -> &mut TaskRecord {
        match &mut self.slots[id.index as usize] {
            Slot::Occupied(record) if record.generation == id.generation => record,
            _ => panic!("use of a stale TaskId"),
        }
    }

    pub fn contains(&self, id: TaskId) -> bool {
        matches!(
            self.slots.get(id.index as usize),
            Some(Slot::Occupied(record)) if record.generation == id.generation
        )
    }

    // --- pairing heap -----------------------------------------------

    /// Merge two heaps (either may be absent) into one, O(1) amortized.
    ///
    /// Ports `ph_meld` from `task.py`: the heap with the smaller
    /// (wrap-safe) key becomes the new root, the other is appended to its
    /// child list.
    pub fn ph_meld(&mut self, h1: Option<TaskId>, h2: Option<TaskId>) -> Option<TaskId> {
        let (h1, h2) = match (h1, h2) {
            (None, h2) => return h2,
            (h1, None) => return h1,
            (Some(h1), Some(h2)) => (h1, h2),
        };

        let k1 = self.get(h1).ph_key;
        let k2 = self.get(h2).ph_key;

        if diff(k1, k2) <= 0 {
            let child_last = self.get(h1).ph_child_last;
            match child_last {
                Some(last) => self.get_mut(last).ph_next = Some(h2),
                None => self.get_mut(h1).ph_child = Some(h2),
            }
            self.get_mut(h1).ph_child_last = Some(h2);
            let rec2 = self.get_mut(h2);
            rec2.ph_next = None;
            rec2.ph_rightmost_parent = Some(h1);
            Some(h1)
        } else {
            let rec1 = self.get_mut(h1);
            rec1.ph_next = self.get(h2).ph_child;
            let h1_next_none = self.get(h1).ph_next.is_none();
            self.get_mut(h2).ph_child = Some(h1);
            if h1_next_none {
                self.get_mut(h2).ph_child_last = Some(h1);
            }
            self.get_mut(h1).ph_rightmost_parent = Some(h2);
            Some(h2)
        }
    }

    /// Restore heap order over a list of sibling sub-heaps after a pop,
    /// pairing them up left to right and then melding the results.
    /// Ports `ph_pairing` from `task.py`.
    pub fn ph_pairing(&mut self, mut child: Option<TaskId>) -> Option<TaskId> {
        let mut heap = None;
        while let Some(n1) = child {
            child = self.get(n1).ph_next;
            self.get_mut(n1).ph_next = None;

            let n1 = if let Some(n2) = child {
                child = self.get(n2).ph_next;
                self.get_mut(n2).ph_next = None;
                self.ph_meld(Some(n1), Some(n2)).unwrap()
            } else {
                n1
            };

            heap = self.ph_meld(heap, Some(n1));
        }
        heap
    }

    /// Remove a specific task from wherever it sits in `heap`, re-pairing
    /// its children back into the structure. Ports `ph_delete`.
    pub fn ph_delete(&mut self, heap: Option<TaskId>, task: TaskId) -> Option<TaskId> {
        let heap = match heap {
            Some(h) => h,
            None => return None,
        };

        if heap == task {
            return self.ph_pairing(self.get(heap).ph_child);
        }

        // Find the node whose child list directly contains `task`, then
        // splice it out of that sibling list and re-pair its own children
        // back in. A plain DFS over child/next edges rather than the
        // original's `ph_rightmost_parent` shortcut: still O(n) worst case
        // like the rest of `ph_delete`, but doesn't depend on rightmost-
        // parent bookkeeping staying consistent across every meld.
        let parent = match self.find_ph_parent(heap, task) {
            Some(p) => p,
            None => return Some(heap),
        };

        let first_child = self.get(parent).ph_child;
        if first_child == Some(task) {
            // `task`'s own children must be re-paired back in, not dropped:
            // the node that takes `task`'s place in the sibling list is the
            // pairing of `task.ph_child`, with `task.ph_next` reattached as
            // its next sibling. Ports `task.py`'s `ph_delete`.
            let next = self.get(task).ph_next;
            let child = self.get(task).ph_child;
            let mut replacement = self.ph_pairing(child);
            match replacement {
                Some(r) => self.get_mut(r).ph_next = next,
                None => replacement = next,
            }
            self.fixup_child_list(parent, replacement);
        } else {
            let mut prev = first_child.expect("parent with no children can't own task");
            loop {
                let next = self.get(prev).ph_next;
                if next == Some(task) {
                    break;
                }
                prev = next.expect("task not found among its parent's children");
            }
            let next = self.get(task).ph_next;
            let child = self.get(task).ph_child;
            let mut replacement = self.ph_pairing(child);
            match replacement {
                Some(r) => self.get_mut(r).ph_next = next,
                None => replacement = next,
            }
            self.get_mut(prev).ph_next = replacement;
            if let Some(r) = replacement {
                self.get_mut(r).ph_rightmost_parent = Some(parent);
            }
            if self.get(parent).ph_child_last == Some(task) {
                // `task` was the last child: whatever now sits at the tail
                // of the sibling list is `replacement` if its re-paired
                // children survived, otherwise `prev`.
                self.get_mut(parent).ph_child_last = Some(replacement.unwrap_or(prev));
            }
        }

        Some(heap)
    }

    fn fixup_child_list(&mut self, parent: TaskId, new_first: Option<TaskId>) {
        self.get_mut(parent).ph_child = new_first;
        match new_first {
            Some(first) => {
                self.get_mut(first).ph_rightmost_parent = Some(parent);
                if self.get(first).ph_next.is_none() {
                    self.get_mut(parent).ph_child_last = Some(first);
                }
            }
            None => self.get_mut(parent).ph_child_last = None,
        }
    }

    /// Find the node whose `ph_child` list directly contains `task`,
    /// searching depth-first from `heap`. Returns `None` if `task` is not
    /// found anywhere under `heap` (it isn't linked into this queue).
    fn find_ph_parent(&self, heap: TaskId, task: TaskId) -> Option<TaskId> {
        if self.siblings_contain(heap, task) {
            return Some(heap);
        }
        let mut cur = self.get(heap).ph_child;
        while let Some(c) = cur {
            if let Some(found) = self.find_ph_parent(c, task) {
                return Some(found);
            }
            cur = self.get(c).ph_next;
        }
        None
    }

    fn siblings_contain(&self, parent: TaskId, task: TaskId) -> bool {
        let mut cur = self.get(parent).ph_child;
        while let Some(c) = cur {
            if c == task {
                return true;
            }
            cur = self.get(c).ph_next;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coro::{Resume, Step, Yield};

    struct Noop;
    impl Coroutine for Noop {
        fn step(&mut self, _resume: Resume) -> Step {
            Step::Suspended(Yield::Ready)
        }
    }

    fn push(tasks: &mut Tasks, heap: Option<TaskId>, key: Tick) -> (Option<TaskId>, TaskId) {
        let id = tasks.insert(Box::new(Noop), key);
        (tasks.ph_meld(heap, Some(id)), id)
    }

    #[test]
    fn meld_keeps_smallest_key_at_root() {
        let mut tasks = Tasks::new();
        let mut heap = None;
        let (h, _a) = push(&mut tasks, heap, 10);
        heap = h;
        let (h, _b) = push(&mut tasks, heap, 3);
        heap = h;
        let (h, _c) = push(&mut tasks, heap, 7);
        heap = h;

        let root = heap.unwrap();
        assert_eq!(tasks.get(root).ph_key, 3);
    }

    #[test]
    fn pop_returns_ascending_keys() {
        let mut tasks = Tasks::new();
        let mut heap = None;
        for key in [5u32, 1, 9, 3, 7] {
            let (h, _) = push(&mut tasks, heap, key);
            heap = h;
        }

        let mut popped = Vec::new();
        while let Some(root) = heap {
            popped.push(tasks.get(root).ph_key);
            heap = tasks.ph_pairing(tasks.get(root).ph_child);
        }

        assert_eq!(popped, vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn delete_arbitrary_task_preserves_remaining_order() {
        let mut tasks = Tasks::new();
        let mut heap = None;
        let mut ids = Vec::new();
        for key in [5u32, 1, 9, 3, 7] {
            let (h, id) = push(&mut tasks, heap, key);
            heap = h;
            ids.push(id);
        }

        let to_remove = ids[2]; // key 9
        assert_eq!(tasks.get(to_remove).ph_key, 9);
        heap = tasks.ph_delete(heap, to_remove);

        let mut popped = Vec::new();
        while let Some(root) = heap {
            popped.push(tasks.get(root).ph_key);
            heap = tasks.ph_pairing(tasks.get(root).ph_child);
        }
        assert_eq!(popped, vec![1, 3, 5, 7]);
    }

    #[test]
    fn delete_root_pairs_children_back_into_a_heap() {
        let mut tasks = Tasks::new();
        let mut heap = None;
        let mut ids = Vec::new();
        for key in [1u32, 2, 3, 4] {
            let (h, id) = push(&mut tasks, heap, key);
            heap = h;
            ids.push(id);
        }
        let root = heap.unwrap();
        assert_eq!(tasks.get(root).ph_key, 1);
        heap = tasks.ph_delete(heap, root);

        let mut popped = Vec::new();
        while let Some(r) = heap {
            popped.push(tasks.get(r).ph_key);
            heap = tasks.ph_pairing(tasks.get(r).ph_child);
        }
        assert_eq!(popped, vec![2, 3, 4]);
    }

    #[test]
    fn delete_interior_first_child_repairs_its_own_children_back_in() {
        let mut tasks = Tasks::new();
        let root = tasks.insert(Box::new(Noop), 1);
        let victim = tasks.insert(Box::new(Noop), 5);
        let grandchild = tasks.insert(Box::new(Noop), 8);
        let sibling = tasks.insert(Box::new(Noop), 9);

        // root -> [victim, sibling], victim -> [grandchild]
        tasks.get_mut(root).ph_child = Some(victim);
        tasks.get_mut(root).ph_child_last = Some(sibling);
        tasks.get_mut(victim).ph_next = Some(sibling);
        tasks.get_mut(victim).ph_rightmost_parent = Some(root);
        tasks.get_mut(sibling).ph_rightmost_parent = Some(root);
        tasks.get_mut(victim).ph_child = Some(grandchild);
        tasks.get_mut(victim).ph_child_last = Some(grandchild);
        tasks.get_mut(grandchild).ph_rightmost_parent = Some(victim);

        // `victim` is root's first child: exercises the `first_child ==
        // Some(task)` branch of `ph_delete`. Its own child must survive,
        // spliced in where `victim` was, not dropped.
        let mut heap = tasks.ph_delete(Some(root), victim);

        let mut popped = Vec::new();
        while let Some(r) = heap {
            popped.push(tasks.get(r).ph_key);
            heap = tasks.ph_pairing(tasks.get(r).ph_child);
        }
        assert_eq!(popped, vec![1, 8, 9]);
    }

    #[test]
    fn delete_interior_later_child_repairs_its_own_children_back_in() {
        let mut tasks = Tasks::new();
        let root = tasks.insert(Box::new(Noop), 1);
        let first = tasks.insert(Box::new(Noop), 5);
        let victim = tasks.insert(Box::new(Noop), 6);
        let grandchild = tasks.insert(Box::new(Noop), 7);

        // root -> [first, victim], victim -> [grandchild]
        tasks.get_mut(root).ph_child = Some(first);
        tasks.get_mut(root).ph_child_last = Some(victim);
        tasks.get_mut(first).ph_next = Some(victim);
        tasks.get_mut(first).ph_rightmost_parent = Some(root);
        tasks.get_mut(victim).ph_rightmost_parent = Some(root);
        tasks.get_mut(victim).ph_child = Some(grandchild);
        tasks.get_mut(victim).ph_child_last = Some(grandchild);
        tasks.get_mut(grandchild).ph_rightmost_parent = Some(victim);

        // `victim` is root's *last* child, reached via the sibling-scan
        // loop: exercises the non-first-child branch, including the
        // `ph_child_last` fixup when the deleted node's re-paired children
        // become the new tail of the sibling list.
        let mut heap = tasks.ph_delete(Some(root), victim);

        let mut popped = Vec::new();
        while let Some(r) = heap {
            popped.push(tasks.get(r).ph_key);
            heap = tasks.ph_pairing(tasks.get(r).ph_child);
        }
        assert_eq!(popped, vec![1, 5, 7]);

        // `ph_child_last` must now point at the repaired grandchild, not
        // at `first` -- otherwise a later `ph_meld` appending a new child
        // to `root` would overwrite `first.ph_next` and silently detach
        // `grandchild` from the heap.
        assert_eq!(tasks.get(root).ph_child_last, Some(grandchild));
    }

    #[test]
    fn stale_task_id_panics_after_removal() {
        let mut tasks = Tasks::new();
        let id = tasks.insert(Box::new(Noop), 0);
        tasks.remove(id);
        assert!(!tasks.contains(id));
    }
}
