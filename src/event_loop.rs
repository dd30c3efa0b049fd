//! A deterministic single-threaded event loop: one microtask queue plus a
//! timer queue driven by a virtual clock.
//!
//! Microtasks always drain before the next timer fires, and again after it.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::Error;
use crate::microtask::{EnterGuard, MicrotaskQueue};

/// Tunables for an [`EventLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventLoopConfig {
    /// Upper bound on microtasks run by a single drain.
    pub microtask_budget: usize,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            microtask_budget: 1_000_000,
        }
    }
}

/// Identifies a scheduled timer; ids increase with registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

/// What a single [`EventLoop::turn`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Turn {
    pub microtasks_drained: usize,
    pub timer_fired: Option<TimerId>,
    pub clock_advanced: bool,
    pub budget_exhausted: bool,
}

type Timer = Box<dyn FnOnce()>;

#[derive(Default)]
struct Timers {
    now_ms: u64,
    next_id: u64,
    // Keyed by (due time, id): earliest first, ties in registration order.
    scheduled: BTreeMap<(u64, TimerId), Timer>,
}

/// Cloneable handle to an event loop.
///
/// # Examples
///
/// ```
/// use promise_out::{Error, EventLoop, Promise};
///
/// let event_loop = EventLoop::new();
/// let _guard = event_loop.enter();
///
/// let timers = event_loop.clone();
/// let promise = Promise::<&str, Error>::new(move |resolve, _| {
///     timers.set_timeout(1000, move || resolve.value("something"));
///     Ok(())
/// });
///
/// assert_eq!(event_loop.block_on(promise), Ok(Ok("something")));
/// assert_eq!(event_loop.now_ms(), 1000);
/// ```
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<Inner>,
}

struct Inner {
    config: EventLoopConfig,
    microtasks: MicrotaskQueue,
    timers: RefCell<Timers>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::with_config(EventLoopConfig::default())
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timers = self.inner.timers.borrow();
        f.debug_struct("EventLoop")
            .field("config", &self.inner.config)
            .field("now_ms", &timers.now_ms)
            .field("timers", &timers.scheduled.len())
            .field("microtasks", &self.inner.microtasks)
            .finish()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EventLoopConfig) -> Self {
        Self {
            inner: Rc::new(Inner {
                config,
                microtasks: MicrotaskQueue::new(),
                timers: RefCell::new(Timers::default()),
            }),
        }
    }

    pub fn config(&self) -> EventLoopConfig {
        self.inner.config
    }

    pub fn microtasks(&self) -> &MicrotaskQueue {
        &self.inner.microtasks
    }

    /// Binds promises created on this thread to this loop's microtask queue
    /// until the guard drops.
    pub fn enter(&self) -> EnterGuard {
        self.inner.microtasks.enter()
    }

    pub fn now_ms(&self) -> u64 {
        self.inner.timers.borrow().now_ms
    }

    /// Schedules `callback` to run `delay_ms` after the current virtual time.
    pub fn set_timeout<F>(&self, delay_ms: u64, callback: F) -> TimerId
    where
        F: FnOnce() + 'static,
    {
        let mut timers = self.inner.timers.borrow_mut();
        let id = TimerId(timers.next_id);
        timers.next_id += 1;
        let due = timers.now_ms.saturating_add(delay_ms);
        timers.scheduled.insert((due, id), Box::new(callback));
        tracing::trace!(timer = id.0, due, "timer scheduled");
        id
    }

    pub fn has_pending_work(&self) -> bool {
        !self.inner.microtasks.is_empty() || !self.inner.timers.borrow().scheduled.is_empty()
    }

    /// Drains microtasks within the budget. Returns the count and whether
    /// work was left behind.
    fn drain_microtasks(&self) -> (usize, bool) {
        let budget = self.inner.config.microtask_budget;
        let ran = self.inner.microtasks.run_with_budget(budget);
        let exhausted = ran == budget && !self.inner.microtasks.is_empty();
        if exhausted {
            tracing::warn!(budget, pending = self.inner.microtasks.pending_count(), "microtask budget exhausted");
        }
        (ran, exhausted)
    }

    /// Drains microtasks, fires the earliest timer, then drains again.
    pub fn turn(&self) -> Turn {
        let mut turn = Turn::default();
        let (drained, exhausted) = self.drain_microtasks();
        turn.microtasks_drained = drained;
        if exhausted {
            turn.budget_exhausted = true;
            return turn;
        }

        let next = {
            let mut timers = self.inner.timers.borrow_mut();
            let next = timers.scheduled.pop_first();
            if let Some(((due, _), _)) = &next {
                if *due > timers.now_ms {
                    tracing::debug!(from_ms = timers.now_ms, to_ms = *due, "clock advanced");
                    timers.now_ms = *due;
                    turn.clock_advanced = true;
                }
            }
            next
        };
        if let Some(((_, id), callback)) = next {
            tracing::trace!(timer = id.0, "timer fired");
            callback();
            turn.timer_fired = Some(id);
            let (drained, exhausted) = self.drain_microtasks();
            turn.microtasks_drained += drained;
            turn.budget_exhausted = exhausted;
        }
        turn
    }

    /// Turns until no microtask or timer is left. Returns the number of turns.
    pub fn run(&self) -> Result<usize, Error> {
        let mut turns = 0;
        while self.has_pending_work() {
            let turn = self.turn();
            turns += 1;
            if turn.budget_exhausted {
                return Err(self.budget_error());
            }
        }
        Ok(turns)
    }

    /// Polls `future` to completion, turning the loop while it is pending.
    pub fn block_on<F>(&self, future: F) -> Result<F::Output, Error>
    where
        F: IntoFuture,
    {
        let mut future = pin!(future.into_future());
        let mut cx = Context::from_waker(Waker::noop());
        loop {
            if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                return Ok(output);
            }
            if !self.has_pending_work() {
                return Err(Error::Stalled);
            }
            if self.turn().budget_exhausted {
                return Err(self.budget_error());
            }
        }
    }

    fn budget_error(&self) -> Error {
        Error::MicrotaskBudgetExceeded {
            budget: self.inner.config.microtask_budget,
        }
    }
}
