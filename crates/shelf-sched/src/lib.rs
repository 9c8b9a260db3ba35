//! Cooperative task scheduling for Shelf.
//!
//! A [`Scheduler`] is a single-threaded FIFO queue of small units of work.
//! Each task runs to completion once per tick and either finishes or asks
//! to be re-queued at the back, so long-running jobs (a browse delivering
//! thousands of items) interleave fairly with everything else.
//!
//! # Design Rules
//!
//! 1. Tasks run strictly in submission order; a re-queued task goes to the
//!    back of the queue.
//! 2. A running task is never preempted. Cancellation removes a queued task,
//!    or stops a running one from being re-queued.
//! 3. Tasks may submit and cancel other tasks while they run.

pub mod scheduler;

pub use scheduler::{Scheduler, TaskId, TaskStatus};
