//! Native message throttling
//!
//! Some windowed plugins flood their own window with a private message and
//! re-enter the host's dispatch for each one. Those messages are queued here
//! and released at a bounded rate: one immediately if none was delivered
//! directly for a while, otherwise one per throttle tick.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use crate::scheduler::{Scheduler, TaskId};

/// First application-private window message.
pub const WM_USER: u32 = 0x0400;

/// Default throttle tick
pub const MESSAGE_THROTTLE_INTERVAL: Duration = Duration::from_millis(1);
/// Default gap after which a message is delivered directly
pub const MINIMUM_DIRECT_INTERVAL: Duration = Duration::from_millis(19);

const INLINE_NODES: usize = 5;

/// A native window message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeMessage {
    pub message: u32,
    pub wparam: usize,
    pub lparam: isize,
}

impl NativeMessage {
    pub const fn new(message: u32, wparam: usize, lparam: isize) -> Self {
        Self { message, wparam, lparam }
    }
}

#[derive(Debug)]
enum Node {
    Inline(usize),
    Overflow(NativeMessage),
}

/// FIFO that keeps its first few messages in a fixed store.
#[derive(Debug)]
pub struct MessageQueue {
    inline: [Option<NativeMessage>; INLINE_NODES],
    free: Vec<usize>,
    order: VecDeque<Node>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self {
            inline: [None; INLINE_NODES],
            free: (0..INLINE_NODES).rev().collect(),
            order: VecDeque::new(),
        }
    }

    pub fn push(&mut self, message: NativeMessage) {
        match self.free.pop() {
            Some(slot) => {
                self.inline[slot] = Some(message);
                self.order.push_back(Node::Inline(slot));
            }
            None => self.order.push_back(Node::Overflow(message)),
        }
    }

    pub fn pop(&mut self) -> Option<NativeMessage> {
        match self.order.pop_front()? {
            Node::Inline(slot) => {
                self.free.push(slot);
                self.inline[slot].take()
            }
            Node::Overflow(message) => Some(message),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Messages currently held in the fixed store.
    pub fn inline_len(&self) -> usize {
        INLINE_NODES - self.free.len()
    }

    pub fn clear(&mut self) {
        while self.pop().is_some() {}
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Rate limiter in front of one window's message delivery.
pub struct MessageThrottler {
    self_ref: Weak<MessageThrottler>,
    scheduler: Rc<Scheduler>,
    deliver: Box<dyn Fn(NativeMessage)>,
    queue: RefCell<MessageQueue>,
    last_direct: Cell<Option<Instant>>,
    tick_task: Cell<Option<TaskId>>,
    tick_interval: Duration,
    direct_interval: Duration,
}

impl MessageThrottler {
    pub fn new(scheduler: Rc<Scheduler>, deliver: impl Fn(NativeMessage) + 'static) -> Rc<Self> {
        Self::with_intervals(scheduler, MESSAGE_THROTTLE_INTERVAL, MINIMUM_DIRECT_INTERVAL, deliver)
    }

    pub fn with_intervals(
        scheduler: Rc<Scheduler>,
        tick_interval: Duration,
        direct_interval: Duration,
        deliver: impl Fn(NativeMessage) + 'static,
    ) -> Rc<Self> {
        Rc::new_cyclic(|weak| Self {
            self_ref: weak.clone(),
            scheduler,
            deliver: Box::new(deliver),
            queue: RefCell::new(MessageQueue::new()),
            last_direct: Cell::new(None),
            tick_task: Cell::new(None),
            tick_interval,
            direct_interval,
        })
    }

    pub fn append_message(&self, message: NativeMessage) {
        self.queue.borrow_mut().push(message);

        let now = self.scheduler.now();
        let idle = self
            .last_direct
            .get()
            .is_none_or(|last| now.duration_since(last) > self.direct_interval);
        if idle {
            self.process_queued_message();
            self.last_direct.set(Some(now));
            if self.queue.borrow().is_empty() {
                return;
            }
        }

        if self.tick_task.get().is_none() {
            self.schedule_tick();
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Drop queued messages and stop ticking.
    pub fn clear(&self) {
        self.queue.borrow_mut().clear();
        if let Some(task) = self.tick_task.take() {
            self.scheduler.cancel(task);
        }
    }

    fn schedule_tick(&self) {
        let weak = self.self_ref.clone();
        let task = self.scheduler.post_delayed(self.tick_interval, move || {
            if let Some(throttler) = weak.upgrade() {
                throttler.tick();
            }
        });
        self.tick_task.set(Some(task));
    }

    fn tick(&self) {
        self.tick_task.set(None);
        self.process_queued_message();
        if !self.queue.borrow().is_empty() && self.tick_task.get().is_none() {
            self.schedule_tick();
        }
    }

    fn process_queued_message(&self) {
        // Delivery may re-enter append_message.
        let message = self.queue.borrow_mut().pop();
        if let Some(message) = message {
            (self.deliver)(message);
        }
    }
}

impl Drop for MessageThrottler {
    fn drop(&mut self) {
        if let Some(task) = self.tick_task.take() {
            self.scheduler.cancel(task);
        }
    }
}

impl std::fmt::Debug for MessageThrottler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageThrottler")
            .field("queued", &self.queued())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualClock;

    fn setup() -> (Rc<ManualClock>, Rc<Scheduler>, Rc<RefCell<Vec<usize>>>, Rc<MessageThrottler>) {
        let clock = Rc::new(ManualClock::new());
        let scheduler = Rc::new(Scheduler::new(clock.clone()));
        let delivered = Rc::new(RefCell::new(Vec::new()));
        let sink = delivered.clone();
        let throttler = MessageThrottler::new(scheduler.clone(), move |m| sink.borrow_mut().push(m.wparam));
        (clock, scheduler, delivered, throttler)
    }

    fn msg(n: usize) -> NativeMessage {
        NativeMessage::new(WM_USER + 1, n, 0)
    }

    #[test]
    fn test_queue_spills_past_inline_store() {
        let mut queue = MessageQueue::new();
        for n in 0..8 {
            queue.push(msg(n));
        }
        assert_eq!(queue.inline_len(), 5);
        assert_eq!(queue.len(), 8);
        let order: Vec<usize> = std::iter::from_fn(|| queue.pop()).map(|m| m.wparam).collect();
        assert_eq!(order, (0..8).collect::<Vec<_>>());
        assert_eq!(queue.inline_len(), 0);
    }

    #[test]
    fn test_first_message_delivered_directly() {
        let (_, scheduler, delivered, throttler) = setup();
        throttler.append_message(msg(1));
        assert_eq!(*delivered.borrow(), vec![1]);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_burst_drains_one_per_tick() {
        let (clock, scheduler, delivered, throttler) = setup();
        for n in 0..4 {
            throttler.append_message(msg(n));
        }
        assert_eq!(*delivered.borrow(), vec![0]);
        assert_eq!(throttler.queued(), 3);

        for expected in 1..4 {
            clock.advance(MESSAGE_THROTTLE_INTERVAL);
            assert_eq!(scheduler.run_turn(), 1);
            assert_eq!(delivered.borrow().last(), Some(&expected));
        }
        clock.advance(MESSAGE_THROTTLE_INTERVAL);
        assert_eq!(scheduler.run_turn(), 0);
        assert_eq!(throttler.queued(), 0);
    }

    #[test]
    fn test_idle_gap_allows_direct_delivery_again() {
        let (clock, _, delivered, throttler) = setup();
        throttler.append_message(msg(0));
        throttler.append_message(msg(1));
        assert_eq!(*delivered.borrow(), vec![0]);

        clock.advance(Duration::from_millis(20));
        throttler.append_message(msg(2));
        // The oldest queued message goes first.
        assert_eq!(*delivered.borrow(), vec![0, 1]);
        assert_eq!(throttler.queued(), 1);
    }
}
