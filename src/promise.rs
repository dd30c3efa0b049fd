//! The deferred value itself and its `then` registration operation.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{capture, Error};
use crate::microtask::MicrotaskQueue;
use crate::reaction::Reaction;
use crate::resolution::{self, capabilities, Reject, Resolution, Resolve, Thenable};
use crate::state::{State, Status};

/// What a callback produces: a settlement candidate, or `Err` to reject.
pub type Outcome<T, E> = Result<Resolution<T, E>, E>;
pub type OnFulfilled<T, E> = Box<dyn FnOnce(T) -> Outcome<T, E>>;
pub type OnRejected<T, E> = Box<dyn FnOnce(E) -> Outcome<T, E>>;

/// A value that is not available yet.
///
/// Clones are handles to the same deferred value. A promise settles exactly
/// once; reactions registered with [`then`](Promise::then) run on the
/// microtask queue that was current when the promise was created.
///
/// # Examples
///
/// ```
/// use promise_out::{Error, MicrotaskQueue, Promise, Resolution};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let queue = MicrotaskQueue::new();
/// let _guard = queue.enter();
///
/// let seen = Rc::new(Cell::new(0));
/// let sink = seen.clone();
/// Promise::<i32, Error>::new(|resolve, _reject| {
///     resolve.value(20);
///     Ok(())
/// })
/// .and_then(|v| Ok(Resolution::Value(v + 1)))
/// .and_then(move |v| {
///     sink.set(v * 2);
///     Ok(Resolution::Value(v))
/// });
///
/// assert_eq!(seen.get(), 0);
/// queue.run_until_idle();
/// assert_eq!(seen.get(), 42);
/// ```
pub struct Promise<T, E> {
    shared: Rc<Shared<T, E>>,
}

struct Shared<T, E> {
    state: RefCell<State<T, E>>,
    microtasks: MicrotaskQueue,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

enum Dispatch<T, E> {
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> Promise<T, E> {
    pub fn status(&self) -> Status {
        self.shared.state.borrow().status()
    }

    /// Reference identity: do both handles point at the same deferred value?
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    pub(crate) fn microtasks(&self) -> &MicrotaskQueue {
        &self.shared.microtasks
    }

    pub(crate) fn pending_in(microtasks: MicrotaskQueue) -> Self {
        Self {
            shared: Rc::new(Shared {
                state: RefCell::new(State::default()),
                microtasks,
            }),
        }
    }

    /// An internal promise: no resolver runs, internal machinery settles it.
    pub(crate) fn pending() -> Self {
        Self::pending_in(MicrotaskQueue::current())
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    /// Runs `resolver` synchronously with a fresh capability pair.
    ///
    /// Only the first capability call takes effect. An `Err` return or a panic
    /// from the resolver rejects the promise unless it already fired.
    pub fn new<F>(resolver: F) -> Self
    where
        F: FnOnce(Resolve<T, E>, Reject<T, E>) -> Result<(), E>,
    {
        let promise = Self::pending();
        let (resolve, reject) = capabilities(&promise);
        if let Err(error) = capture(|| resolver(resolve, reject.clone())) {
            reject.call(error);
        }
        promise
    }

    /// Returns `candidate` itself when it already is a promise, otherwise a
    /// new promise settled through the resolution procedure.
    pub fn resolve(candidate: Resolution<T, E>) -> Self {
        match candidate {
            Resolution::Promise(promise) => promise,
            other => {
                let promise = Self::pending();
                resolution::resolve(&promise, other);
                promise
            }
        }
    }

    pub fn fulfilled(value: T) -> Self {
        Self::resolve(Resolution::Value(value))
    }

    /// A promise rejected with `error` as-is.
    pub fn reject(error: E) -> Self {
        let promise = Self::pending();
        promise.settle_rejected(error);
        promise
    }

    /// Registers reactions and returns the promise they settle.
    ///
    /// Omitting the callback for the branch a settled promise already took
    /// hands back this very promise. Otherwise a child promise is returned; a
    /// present callback always runs on a later microtask, never inside this
    /// call.
    pub fn then(
        &self,
        on_fulfilled: Option<OnFulfilled<T, E>>,
        on_rejected: Option<OnRejected<T, E>>,
    ) -> Self {
        let dispatch = {
            let mut state = self.shared.state.borrow_mut();
            match &mut *state {
                State::Fulfilled(_) if on_fulfilled.is_none() => return self.clone(),
                State::Rejected(_) if on_rejected.is_none() => return self.clone(),
                State::Pending(queue) => {
                    let child = Self::pending_in(self.shared.microtasks.clone());
                    queue.push(Reaction::new(child.clone(), on_fulfilled, on_rejected));
                    tracing::trace!(queued = queue.len(), "reaction registered");
                    return child;
                }
                State::Fulfilled(value) => Dispatch::Fulfilled(value.clone()),
                State::Rejected(error) => Dispatch::Rejected(error.clone()),
            }
        };

        let child = Self::pending_in(self.shared.microtasks.clone());
        let reaction = Reaction::new(child.clone(), on_fulfilled, on_rejected);
        match dispatch {
            Dispatch::Fulfilled(value) => reaction.fulfilled(value),
            Dispatch::Rejected(error) => reaction.rejected(error),
        }
        child
    }

    pub fn and_then<F>(&self, on_fulfilled: F) -> Self
    where
        F: FnOnce(T) -> Outcome<T, E> + 'static,
    {
        self.then(Some(Box::new(on_fulfilled)), None)
    }

    pub fn catch<R>(&self, on_rejected: R) -> Self
    where
        R: FnOnce(E) -> Outcome<T, E> + 'static,
    {
        self.then(None, Some(Box::new(on_rejected)))
    }

    pub fn then_both<F, R>(&self, on_fulfilled: F, on_rejected: R) -> Self
    where
        F: FnOnce(T) -> Outcome<T, E> + 'static,
        R: FnOnce(E) -> Outcome<T, E> + 'static,
    {
        self.then(Some(Box::new(on_fulfilled)), Some(Box::new(on_rejected)))
    }

    /// Transitions to fulfilled and notifies queued reactions in order.
    pub(crate) fn settle_fulfilled(&self, value: T) {
        // Taken out of the cell first: notifying may settle further promises.
        let drained = self.shared.state.borrow_mut().fulfill(value.clone());
        if let Some(reactions) = drained {
            tracing::debug!(reactions = reactions.len(), status = %Status::Fulfilled, "promise settled");
            for reaction in reactions {
                reaction.fulfilled(value.clone());
            }
        }
    }

    pub(crate) fn settle_rejected(&self, error: E) {
        let drained = self.shared.state.borrow_mut().reject(error.clone());
        if let Some(reactions) = drained {
            tracing::debug!(reactions = reactions.len(), status = %Status::Rejected, "promise settled");
            for reaction in reactions {
                reaction.rejected(error.clone());
            }
        }
    }
}

/// Same-family promises are assimilated through their own `then`.
impl<T, E> Thenable<T, E> for Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    fn then(&self, resolve: Resolve<T, E>, reject: Reject<T, E>) -> Result<(), E> {
        self.then_both(
            move |value| {
                resolve.value(value.clone());
                Ok(Resolution::Value(value))
            },
            move |error| {
                reject.call(error.clone());
                Err(error)
            },
        );
        Ok(())
    }

    fn as_promise(&self) -> Option<&Promise<T, E>> {
        Some(self)
    }
}
