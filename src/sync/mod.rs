//! Synchronization primitives built on top of the loop's waitlist table.
//!
//! Grounded on `examples/original_source/asyncio/event.py` and
//! `asyncio/queue.py`: both are plain structs that park the current task on
//! a private waitlist and rely on the run loop to wake it back up, rather
//! than on any thread-level blocking.

pub mod event;
pub mod queue;

pub use event::Event;
pub use queue::Queue;
