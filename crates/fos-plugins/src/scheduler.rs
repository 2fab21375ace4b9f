//! Deferred Task Scheduler
//!
//! Every asynchronous step of the plugin host (request dispatch, stream
//! back-pressure retries, module teardown, throttled messages, plugin timers)
//! runs as a task on this queue. The embedder drains it once per event-loop
//! iteration with [`Scheduler::run_turn`].
//!
//! A turn only runs tasks that were already due when it started; anything
//! posted while the turn runs waits for a later turn, even with zero delay.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Time source for the scheduler and throttles.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.elapsed.set(self.elapsed.get() + by);
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed.get()
    }
}

/// Handle to a posted task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

type Task = Box<dyn FnOnce()>;

/// Single-threaded task queue ordered by due time, then by posting order.
pub struct Scheduler {
    clock: Rc<dyn Clock>,
    next_seq: Cell<u64>,
    tasks: RefCell<BTreeMap<(Instant, u64), Task>>,
    due_by_id: RefCell<HashMap<TaskId, Instant>>,
}

impl Scheduler {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            next_seq: Cell::new(0),
            tasks: RefCell::new(BTreeMap::new()),
            due_by_id: RefCell::new(HashMap::new()),
        }
    }

    /// Scheduler driven by the system clock.
    pub fn system() -> Self {
        Self::new(Rc::new(SystemClock))
    }

    pub fn clock(&self) -> &Rc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Run `task` on the next turn.
    pub fn post(&self, task: impl FnOnce() + 'static) -> TaskId {
        self.post_delayed(Duration::ZERO, task)
    }

    /// Run `task` on the first turn at least `delay` from now.
    pub fn post_delayed(&self, delay: Duration, task: impl FnOnce() + 'static) -> TaskId {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        let due = self.clock.now() + delay;
        let id = TaskId(seq);
        self.tasks.borrow_mut().insert((due, seq), Box::new(task));
        self.due_by_id.borrow_mut().insert(id, due);
        id
    }

    /// Drop a task that has not run yet. Returns whether it was pending.
    pub fn cancel(&self, id: TaskId) -> bool {
        let Some(due) = self.due_by_id.borrow_mut().remove(&id) else {
            return false;
        };
        self.tasks.borrow_mut().remove(&(due, id.0)).is_some()
    }

    pub fn is_pending(&self, id: TaskId) -> bool {
        self.due_by_id.borrow().contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Due time of the earliest pending task.
    pub fn next_due(&self) -> Option<Instant> {
        self.tasks.borrow().keys().next().map(|(due, _)| *due)
    }

    /// Run every task that is due now. Returns how many ran.
    pub fn run_turn(&self) -> usize {
        let now = self.clock.now();
        let horizon = self.next_seq.get();
        let due: Vec<(Instant, u64)> = self
            .tasks
            .borrow()
            .keys()
            .take_while(|(at, _)| *at <= now)
            .filter(|(_, seq)| *seq < horizon)
            .copied()
            .collect();

        let mut ran = 0;
        for key in due {
            // An earlier task in this turn may have cancelled this one.
            let task = self.tasks.borrow_mut().remove(&key);
            let Some(task) = task else { continue };
            self.due_by_id.borrow_mut().remove(&TaskId(key.1));
            task();
            ran += 1;
        }
        ran
    }

    /// Run turns until nothing due is left, up to `max_turns`.
    pub fn run_until_idle(&self, max_turns: usize) -> usize {
        let mut total = 0;
        for _ in 0..max_turns {
            let ran = self.run_turn();
            if ran == 0 {
                break;
            }
            total += ran;
        }
        total
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending_count())
            .finish()
    }
}
