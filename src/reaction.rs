//! Reactions registered through `then` while a promise is pending.

use crate::error::{capture, Error};
use crate::promise::{OnFulfilled, OnRejected, Outcome, Promise};
use crate::resolution;

/// One `then` registration: the child promise it feeds and its callbacks.
pub(crate) struct Reaction<T, E> {
    child: Promise<T, E>,
    on_fulfilled: Option<OnFulfilled<T, E>>,
    on_rejected: Option<OnRejected<T, E>>,
}

impl<T, E> Reaction<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    pub(crate) fn new(
        child: Promise<T, E>,
        on_fulfilled: Option<OnFulfilled<T, E>>,
        on_rejected: Option<OnRejected<T, E>>,
    ) -> Self {
        Self {
            child,
            on_fulfilled,
            on_rejected,
        }
    }

    /// Without a callback the value passes straight through to the child.
    pub(crate) fn fulfilled(self, value: T) {
        match self.on_fulfilled {
            Some(callback) => schedule(self.child, callback, value),
            None => self.child.settle_fulfilled(value),
        }
    }

    pub(crate) fn rejected(self, error: E) {
        match self.on_rejected {
            Some(callback) => schedule(self.child, callback, error),
            None => self.child.settle_rejected(error),
        }
    }
}

/// Runs `callback(argument)` on the next microtask and settles `child` from it.
fn schedule<T, E, A>(
    child: Promise<T, E>,
    callback: Box<dyn FnOnce(A) -> Outcome<T, E>>,
    argument: A,
) where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
    A: 'static,
{
    let microtasks = child.microtasks().clone();
    microtasks.enqueue(move || match capture(|| callback(argument)) {
        Ok(next) => resolution::resolve(&child, next),
        Err(error) => child.settle_rejected(error),
    });
}

/// Registration-ordered reactions, drained exactly once on settlement.
pub(crate) struct ReactionQueue<T, E> {
    reactions: Vec<Reaction<T, E>>,
}

impl<T, E> Default for ReactionQueue<T, E> {
    fn default() -> Self {
        Self {
            reactions: Vec::new(),
        }
    }
}

impl<T, E> ReactionQueue<T, E> {
    pub(crate) fn push(&mut self, reaction: Reaction<T, E>) {
        self.reactions.push(reaction);
    }

    pub(crate) fn len(&self) -> usize {
        self.reactions.len()
    }
}

impl<T, E> IntoIterator for ReactionQueue<T, E> {
    type Item = Reaction<T, E>;
    type IntoIter = std::vec::IntoIter<Reaction<T, E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.reactions.into_iter()
    }
}
