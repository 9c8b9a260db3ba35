use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;

use tracing::trace;

/// Handle to a submitted task, valid until the task finishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// What a task wants after one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    /// Run again; the task goes to the back of the queue under the same id.
    Continue,
    /// The task is finished and its id is released.
    Done,
}

type Task = Box<dyn FnMut() -> TaskStatus>;

/// Single-threaded cooperative FIFO scheduler.
///
/// Shared through `Rc`; all methods take `&self` so that running tasks can
/// submit or cancel work on the same scheduler.
#[derive(Default)]
pub struct Scheduler {
    queue: RefCell<VecDeque<(TaskId, Task)>>,
    next_id: Cell<u64>,
    running: Cell<Option<TaskId>>,
    running_cancelled: Cell<bool>,
    ticks: Cell<u64>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task to the back of the queue.
    pub fn submit<F>(&self, task: F) -> TaskId
    where
        F: FnMut() -> TaskStatus + 'static,
    {
        let id = TaskId(self.next_id.get() + 1);
        self.next_id.set(id.0);
        self.queue.borrow_mut().push_back((id, Box::new(task)));
        trace!(task = %id, pending = self.pending(), "task submitted");
        id
    }

    /// Cancel a task.
    ///
    /// A queued task is removed without running. If `id` is the task that
    /// is currently running, it finishes its tick but is not re-queued.
    /// Returns `false` if the task is unknown or already finished.
    pub fn cancel(&self, id: TaskId) -> bool {
        let removed = {
            let mut queue = self.queue.borrow_mut();
            match queue.iter().position(|(queued, _)| *queued == id) {
                Some(pos) => queue.remove(pos),
                None => None,
            }
        };
        if removed.is_some() {
            trace!(task = %id, "queued task cancelled");
            return true;
        }
        if self.running.get() == Some(id) && !self.running_cancelled.get() {
            self.running_cancelled.set(true);
            trace!(task = %id, "running task cancelled");
            return true;
        }
        false
    }

    /// Run the task at the head of the queue for one tick.
    ///
    /// Returns `false` if the queue was empty.
    pub fn run_once(&self) -> bool {
        let Some((id, mut task)) = self.queue.borrow_mut().pop_front() else {
            return false;
        };

        let outer = self.running.replace(Some(id));
        let outer_cancelled = self.running_cancelled.replace(false);
        let status = task();
        let cancelled = self.running_cancelled.replace(outer_cancelled);
        self.running.set(outer);
        self.ticks.set(self.ticks.get() + 1);

        if status == TaskStatus::Continue && !cancelled {
            self.queue.borrow_mut().push_back((id, task));
        } else {
            trace!(task = %id, ?status, cancelled, "task finished");
        }
        true
    }

    /// Run ticks until the queue is empty. Returns the number of ticks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_once() {
            ran += 1;
        }
        ran
    }

    /// Number of queued tasks, not counting the one currently running.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Total ticks executed since creation.
    pub fn ticks(&self) -> u64 {
        self.ticks.get()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .field("running", &self.running.get())
            .field("ticks", &self.ticks.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn recorder() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    // -----------------------------------------------------------------------
    // Ordering
    // -----------------------------------------------------------------------

    #[test]
    fn runs_in_submission_order() {
        let sched = Scheduler::new();
        let log = recorder();
        for name in ["a", "b", "c"] {
            let log = Rc::clone(&log);
            sched.submit(move || {
                log.borrow_mut().push(name);
                TaskStatus::Done
            });
        }
        assert_eq!(sched.pending(), 3);
        assert_eq!(sched.run_until_idle(), 3);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
        assert!(sched.is_idle());
    }

    #[test]
    fn continue_requeues_at_back() {
        let sched = Scheduler::new();
        let log = recorder();

        let mut left = 3;
        let l = Rc::clone(&log);
        sched.submit(move || {
            l.borrow_mut().push("long");
            left -= 1;
            if left == 0 {
                TaskStatus::Done
            } else {
                TaskStatus::Continue
            }
        });
        let l = Rc::clone(&log);
        sched.submit(move || {
            l.borrow_mut().push("short");
            TaskStatus::Done
        });

        sched.run_until_idle();
        assert_eq!(*log.borrow(), vec!["long", "short", "long", "long"]);
        assert_eq!(sched.ticks(), 4);
    }

    #[test]
    fn tasks_can_submit_tasks() {
        let sched = Rc::new(Scheduler::new());
        let log = recorder();

        let inner_sched = Rc::clone(&sched);
        let l = Rc::clone(&log);
        sched.submit(move || {
            let l2 = Rc::clone(&l);
            inner_sched.submit(move || {
                l2.borrow_mut().push("child");
                TaskStatus::Done
            });
            l.borrow_mut().push("parent");
            TaskStatus::Done
        });

        sched.run_until_idle();
        assert_eq!(*log.borrow(), vec!["parent", "child"]);
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    #[test]
    fn cancel_queued_task() {
        let sched = Scheduler::new();
        let log = recorder();
        let l = Rc::clone(&log);
        let id = sched.submit(move || {
            l.borrow_mut().push("never");
            TaskStatus::Done
        });
        assert!(sched.cancel(id));
        assert!(!sched.cancel(id));
        assert_eq!(sched.run_until_idle(), 0);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn cancel_running_task_stops_requeue() {
        let sched = Rc::new(Scheduler::new());
        let runs = Rc::new(Cell::new(0));
        let own_id: Rc<Cell<Option<TaskId>>> = Rc::new(Cell::new(None));

        let s = Rc::clone(&sched);
        let r = Rc::clone(&runs);
        let me = Rc::clone(&own_id);
        let id = sched.submit(move || {
            r.set(r.get() + 1);
            if r.get() == 2 {
                if let Some(id) = me.get() {
                    assert!(s.cancel(id));
                }
            }
            TaskStatus::Continue
        });
        own_id.set(Some(id));

        sched.run_until_idle();
        assert_eq!(runs.get(), 2);
        assert!(!sched.cancel(id));
    }

    #[test]
    fn cancel_finished_task_is_false() {
        let sched = Scheduler::new();
        let id = sched.submit(|| TaskStatus::Done);
        sched.run_until_idle();
        assert!(!sched.cancel(id));
    }

    #[test]
    fn ids_are_distinct() {
        let sched = Scheduler::new();
        let a = sched.submit(|| TaskStatus::Done);
        let b = sched.submit(|| TaskStatus::Done);
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "task-1");
    }
}
