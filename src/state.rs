//! The settlement state machine: `Pending -> Fulfilled | Rejected`, once.

use std::fmt;
use std::mem;

use crate::reaction::ReactionQueue;

/// Payload-free view of where a promise is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Fulfilled,
    Rejected,
}

impl Status {
    pub fn is_settled(self) -> bool {
        self != Status::Pending
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Pending => "pending",
            Status::Fulfilled => "fulfilled",
            Status::Rejected => "rejected",
        })
    }
}

/// The reaction queue only exists while pending; the payload only once settled.
pub(crate) enum State<T, E> {
    Pending(ReactionQueue<T, E>),
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> Default for State<T, E> {
    fn default() -> Self {
        State::Pending(ReactionQueue::default())
    }
}

impl<T, E> State<T, E> {
    pub(crate) fn status(&self) -> Status {
        match self {
            State::Pending(_) => Status::Pending,
            State::Fulfilled(_) => Status::Fulfilled,
            State::Rejected(_) => Status::Rejected,
        }
    }

    /// Returns the drained queue if this call performed the transition.
    pub(crate) fn fulfill(&mut self, value: T) -> Option<ReactionQueue<T, E>> {
        self.settle(State::Fulfilled(value))
    }

    pub(crate) fn reject(&mut self, error: E) -> Option<ReactionQueue<T, E>> {
        self.settle(State::Rejected(error))
    }

    fn settle(&mut self, settled: Self) -> Option<ReactionQueue<T, E>> {
        if self.status().is_settled() {
            return None;
        }
        match mem::replace(self, settled) {
            State::Pending(queue) => Some(queue),
            State::Fulfilled(_) | State::Rejected(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{State, Status};

    #[test]
    fn starts_pending() {
        let state = State::<i32, String>::default();
        assert_eq!(state.status(), Status::Pending);
        assert!(!state.status().is_settled());
    }

    #[test]
    fn first_transition_wins() {
        let mut state = State::<i32, String>::default();
        assert!(state.fulfill(1).is_some());
        assert!(state.fulfill(2).is_none());
        assert!(state.reject("late".into()).is_none());
        assert!(matches!(state, State::Fulfilled(1)));
    }

    #[test]
    fn rejection_is_terminal() {
        let mut state = State::<i32, String>::default();
        assert!(state.reject("boom".into()).is_some());
        assert!(state.fulfill(1).is_none());
        assert_eq!(state.status(), Status::Rejected);
        assert!(matches!(state, State::Rejected(ref e) if e == "boom"));
    }

    #[test]
    fn status_display() {
        assert_eq!(Status::Pending.to_string(), "pending");
        assert_eq!(Status::Fulfilled.to_string(), "fulfilled");
        assert_eq!(Status::Rejected.to_string(), "rejected");
    }
}
