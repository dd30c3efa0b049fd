//! The resolution procedure: deciding whether a candidate settlement value is
//! an immediate value or a thenable that has to be assimilated first.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::{capture, Error};
use crate::promise::Promise;

/// A foreign deferred-value-like object.
///
/// Implementors call at most one of the two capabilities, at most once; any
/// extra calls are ignored. Returning `Err` rejects the assimilating promise
/// unless a capability already fired.
///
/// # Examples
///
/// ```
/// use promise_out::{Error, MicrotaskQueue, Promise, Reject, Resolution, Resolve, Thenable};
/// use std::rc::Rc;
///
/// struct Ready(i32);
///
/// impl Thenable<i32, Error> for Ready {
///     fn then(&self, resolve: Resolve<i32, Error>, _reject: Reject<i32, Error>) -> Result<(), Error> {
///         resolve.value(self.0);
///         Ok(())
///     }
/// }
///
/// let queue = MicrotaskQueue::new();
/// let _guard = queue.enter();
/// let p = Promise::<i32, Error>::resolve(Resolution::Thenable(Rc::new(Ready(7))));
/// assert!(p.status().is_settled());
/// ```
pub trait Thenable<T, E> {
    fn then(&self, resolve: Resolve<T, E>, reject: Reject<T, E>) -> Result<(), E>;

    /// The same-family promise behind this thenable, if there is one.
    fn as_promise(&self) -> Option<&Promise<T, E>> {
        None
    }
}

/// A candidate settlement value.
pub enum Resolution<T, E> {
    Value(T),
    Promise(Promise<T, E>),
    Thenable(Rc<dyn Thenable<T, E>>),
}

impl<T, E> From<Promise<T, E>> for Resolution<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Resolution::Promise(promise)
    }
}

impl<T: fmt::Debug, E> fmt::Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Promise(promise) => f.debug_tuple("Promise").field(&promise.status()).finish(),
            Resolution::Thenable(_) => f.write_str("Thenable(..)"),
        }
    }
}

/// Outcome of the capability probe.
pub enum Probe<T, E> {
    Immediate(T),
    Thenable(Rc<dyn Thenable<T, E>>),
}

impl<T, E> Resolution<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    /// Does the candidate expose a chaining method? Same-family promises do.
    pub fn probe(self) -> Probe<T, E> {
        match self {
            Resolution::Value(value) => Probe::Immediate(value),
            Resolution::Promise(promise) => Probe::Thenable(Rc::new(promise)),
            Resolution::Thenable(thenable) => Probe::Thenable(thenable),
        }
    }
}

/// Whether a pair of capabilities has been used yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Guard {
    NotCalled,
    Called,
}

/// Flips the guard; `true` only for the first caller.
fn claim(guard: &Cell<Guard>) -> bool {
    guard.replace(Guard::Called) == Guard::NotCalled
}

/// The fulfil half of a capability pair.
pub struct Resolve<T, E> {
    promise: Promise<T, E>,
    guard: Rc<Cell<Guard>>,
}

/// The reject half of a capability pair.
pub struct Reject<T, E> {
    promise: Promise<T, E>,
    guard: Rc<Cell<Guard>>,
}

impl<T, E> Clone for Resolve<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
            guard: self.guard.clone(),
        }
    }
}

impl<T, E> Clone for Reject<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
            guard: self.guard.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Resolve<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolve").field("guard", &self.guard.get()).finish()
    }
}

impl<T, E> fmt::Debug for Reject<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reject").field("guard", &self.guard.get()).finish()
    }
}

/// Creates a fresh capability pair for one settlement attempt on `promise`.
///
/// Both halves share one guard, so whichever fires first wins for the pair.
pub(crate) fn capabilities<T, E>(promise: &Promise<T, E>) -> (Resolve<T, E>, Reject<T, E>) {
    let guard = Rc::new(Cell::new(Guard::NotCalled));
    (
        Resolve {
            promise: promise.clone(),
            guard: guard.clone(),
        },
        Reject {
            promise: promise.clone(),
            guard,
        },
    )
}

impl<T, E> Resolve<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    pub fn call(&self, resolution: Resolution<T, E>) {
        if claim(&self.guard) {
            resolve(&self.promise, resolution);
        }
    }

    pub fn value(&self, value: T) {
        self.call(Resolution::Value(value));
    }

    /// Whether either half of the pair has fired.
    pub fn is_called(&self) -> bool {
        self.guard.get() == Guard::Called
    }
}

impl<T, E> Reject<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    pub fn call(&self, error: E) {
        if claim(&self.guard) {
            self.promise.settle_rejected(error);
        }
    }

    pub fn is_called(&self) -> bool {
        self.guard.get() == Guard::Called
    }
}

/// Settles `promise` from `resolution`, assimilating thenables one layer at a
/// time. A no-op once `promise` is settled.
pub(crate) fn resolve<T, E>(promise: &Promise<T, E>, resolution: Resolution<T, E>)
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    if promise.status().is_settled() {
        return;
    }
    let candidate = match &resolution {
        Resolution::Value(_) => None,
        Resolution::Promise(candidate) => Some(candidate),
        Resolution::Thenable(thenable) => thenable.as_promise(),
    };
    if candidate.is_some_and(|candidate| candidate.ptr_eq(promise)) {
        promise.settle_rejected(Error::SelfResolution.into());
        return;
    }
    match resolution.probe() {
        Probe::Immediate(value) => promise.settle_fulfilled(value),
        Probe::Thenable(thenable) => assimilate(promise, thenable),
    }
}

fn assimilate<T, E>(promise: &Promise<T, E>, thenable: Rc<dyn Thenable<T, E>>)
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    tracing::debug!("assimilating thenable");
    let (resolve, reject) = capabilities(promise);
    if let Err(error) = capture(|| thenable.then(resolve, reject.clone())) {
        // Ignored if the thenable already settled us before failing.
        reject.call(error);
    }
}
