//! The microtask queue: "run this once the current synchronous work is done".
//!
//! Every reaction callable goes through here, so a callback registered right
//! after obtaining a promise can never fire before the registering code
//! finishes its turn. Each thread owns one default queue; tests (or an
//! [`EventLoop`](crate::EventLoop)) can [`enter`](MicrotaskQueue::enter) a
//! queue of their own and drive it by hand.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// A deferred unit of work.
pub type Microtask = Box<dyn FnOnce()>;

thread_local! {
    static CURRENT: RefCell<Option<MicrotaskQueue>> = const { RefCell::new(None) };
}

/// Shared handle to a FIFO queue of microtasks.
#[derive(Clone, Default)]
pub struct MicrotaskQueue {
    inner: Rc<RefCell<Inner>>,
}

#[derive(Default)]
struct Inner {
    tasks: VecDeque<Microtask>,
    total_enqueued: u64,
}

impl MicrotaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The queue new promises on this thread are bound to.
    ///
    /// Falls back to the thread's default queue, created on first use.
    pub fn current() -> Self {
        CURRENT.with(|current| {
            current
                .borrow_mut()
                .get_or_insert_with(MicrotaskQueue::new)
                .clone()
        })
    }

    /// Makes this queue the current one until the guard is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_out::{Error, MicrotaskQueue, Promise, Resolution};
    ///
    /// let queue = MicrotaskQueue::new();
    /// let _guard = queue.enter();
    /// let p = Promise::<i32, Error>::fulfilled(1);
    /// let _child = p.and_then(|v| Ok(Resolution::Value(v + 1)));
    /// assert_eq!(queue.pending_count(), 1);
    /// ```
    pub fn enter(&self) -> EnterGuard {
        let previous = CURRENT.with(|current| current.borrow_mut().replace(self.clone()));
        EnterGuard {
            entered: self.clone(),
            previous,
        }
    }

    pub fn enqueue<F>(&self, task: F)
    where
        F: FnOnce() + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        inner.tasks.push_back(Box::new(task));
        inner.total_enqueued += 1;
        tracing::trace!(pending = inner.tasks.len(), "microtask enqueued");
    }

    /// Runs the oldest task. Returns `false` when the queue was empty.
    pub fn run_next(&self) -> bool {
        // The borrow must end before the task runs: tasks enqueue more tasks.
        let task = self.inner.borrow_mut().tasks.pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Drains the queue, including work enqueued while draining.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        tracing::trace!(ran, "microtask queue idle");
        ran
    }

    /// Drains at most `budget` tasks; returns how many ran.
    pub fn run_with_budget(&self, budget: usize) -> usize {
        let mut ran = 0;
        while ran < budget && self.run_next() {
            ran += 1;
        }
        ran
    }

    pub fn pending_count(&self) -> usize {
        self.inner.borrow().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_count() == 0
    }

    pub fn total_enqueued(&self) -> u64 {
        self.inner.borrow().total_enqueued
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for MicrotaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicrotaskQueue")
            .field("pending", &self.pending_count())
            .field("total_enqueued", &self.total_enqueued())
            .finish()
    }
}

/// Restores the previously current queue on drop.
///
/// Guards must be dropped in the reverse order they were created. Dropping an
/// outer guard while an inner one is alive leaves the wrong queue current;
/// debug builds panic when that happens. The guard is `!Send`.
#[must_use = "the queue is only current while the guard is alive"]
pub struct EnterGuard {
    entered: MicrotaskQueue,
    previous: Option<MicrotaskQueue>,
}

impl fmt::Debug for EnterGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnterGuard").finish_non_exhaustive()
    }
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let replaced = CURRENT.with(|current| std::mem::replace(&mut *current.borrow_mut(), previous));
        if !std::thread::panicking() {
            debug_assert!(
                replaced.is_some_and(|queue| queue.ptr_eq(&self.entered)),
                "EnterGuard dropped out of order"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MicrotaskQueue;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn runs_in_fifo_order() {
        let queue = MicrotaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..5 {
            let log = log.clone();
            queue.enqueue(move || log.borrow_mut().push(i));
        }
        assert_eq!(queue.pending_count(), 5);
        assert_eq!(queue.run_until_idle(), 5);
        assert_eq!(*log.borrow(), vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
        assert_eq!(queue.total_enqueued(), 5);
    }

    #[test]
    fn tasks_enqueued_while_draining_run_after_existing_ones() {
        let queue = MicrotaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let (queue2, log) = (queue.clone(), log.clone());
            queue.enqueue(move || {
                log.borrow_mut().push("first");
                let log = log.clone();
                queue2.enqueue(move || log.borrow_mut().push("nested"));
            });
        }
        {
            let log = log.clone();
            queue.enqueue(move || log.borrow_mut().push("second"));
        }
        queue.run_until_idle();
        assert_eq!(*log.borrow(), vec!["first", "second", "nested"]);
    }

    #[test]
    fn run_next_on_empty_queue() {
        assert!(!MicrotaskQueue::new().run_next());
    }

    #[test]
    fn budget_limits_a_drain() {
        let queue = MicrotaskQueue::new();
        for _ in 0..10 {
            queue.enqueue(|| {});
        }
        assert_eq!(queue.run_with_budget(4), 4);
        assert_eq!(queue.pending_count(), 6);
    }

    #[test]
    fn enter_swaps_and_restores_current() {
        let default = MicrotaskQueue::current();
        let custom = MicrotaskQueue::new();
        {
            let _guard = custom.enter();
            assert!(MicrotaskQueue::current().ptr_eq(&custom));
            let inner = MicrotaskQueue::new();
            {
                let _guard = inner.enter();
                assert!(MicrotaskQueue::current().ptr_eq(&inner));
            }
            assert!(MicrotaskQueue::current().ptr_eq(&custom));
        }
        assert!(MicrotaskQueue::current().ptr_eq(&default));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "dropped out of order")]
    fn guards_dropped_out_of_order_panic() {
        let (outer, inner) = (MicrotaskQueue::new(), MicrotaskQueue::new());
        let outer_guard = outer.enter();
        let _inner_guard = inner.enter();
        drop(outer_guard);
    }
}
