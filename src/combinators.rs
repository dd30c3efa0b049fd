//! `all` and `race`, built purely on `then`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Error;
use crate::promise::Promise;
use crate::resolution::Resolution;

/// Whether a combined promise has been settled by one of its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Undecided,
    Decided,
}

impl Decision {
    /// `true` for the single caller allowed to settle the combined promise.
    fn decide(&mut self) -> bool {
        std::mem::replace(self, Decision::Decided) == Decision::Undecided
    }
}

/// Collects fulfilments by input index.
#[derive(Debug)]
struct AllTracker<T> {
    slots: Vec<Option<T>>,
    remaining: usize,
    decision: Decision,
}

impl<T> AllTracker<T> {
    fn new(total: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(total).collect(),
            remaining: total,
            decision: Decision::Undecided,
        }
    }

    /// Returns every value, in input order, once the last one arrives.
    fn record_fulfillment(&mut self, index: usize, value: T) -> Option<Vec<T>> {
        if self.decision == Decision::Decided {
            return None;
        }
        if self.slots[index].replace(value).is_none() {
            self.remaining -= 1;
        }
        if self.remaining > 0 || !self.decision.decide() {
            return None;
        }
        self.slots.drain(..).collect()
    }

    fn record_rejection(&mut self) -> bool {
        self.decision.decide()
    }
}

/// Counts settled inputs; only the first one decides the race.
#[derive(Debug)]
struct RaceTracker {
    settled: usize,
    decision: Decision,
}

impl RaceTracker {
    fn new() -> Self {
        Self {
            settled: 0,
            decision: Decision::Undecided,
        }
    }

    /// `true` when this settlement wins.
    fn record_settlement(&mut self) -> bool {
        self.settled += 1;
        let won = self.decision.decide();
        tracing::trace!(settled = self.settled, won, "race input settled");
        won
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    /// Fulfils with every input's value in input order, or rejects with the
    /// first rejection. Later outcomes are observed and discarded.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_out::{Error, MicrotaskQueue, Promise, Resolution};
    ///
    /// let queue = MicrotaskQueue::new();
    /// let _guard = queue.enter();
    /// let later = Promise::<i32, Error>::new(|resolve, _| {
    ///     resolve.value(2);
    ///     Ok(())
    /// });
    /// let all = Promise::all([
    ///     Resolution::Value(1),
    ///     Resolution::Promise(later),
    ///     Resolution::Value(3),
    /// ]);
    /// let consumer = all.consume();
    /// queue.run_until_idle();
    /// # use futures::FutureExt;
    /// assert_eq!(consumer.now_or_never(), Some(Ok(vec![1, 2, 3])));
    /// ```
    pub fn all<I>(inputs: I) -> Promise<Vec<T>, E>
    where
        I: IntoIterator<Item = Resolution<T, E>>,
    {
        let inputs: Vec<_> = inputs.into_iter().collect();
        if inputs.is_empty() {
            return Promise::fulfilled(Vec::new());
        }

        let combined = Promise::<Vec<T>, E>::pending();
        let tracker = Rc::new(RefCell::new(AllTracker::new(inputs.len())));
        for (index, input) in inputs.into_iter().enumerate() {
            let (on_value, on_error) = (tracker.clone(), tracker.clone());
            let (fulfil, reject) = (combined.clone(), combined.clone());
            Self::resolve(input).then_both(
                move |value| {
                    let done = on_value.borrow_mut().record_fulfillment(index, value.clone());
                    if let Some(values) = done {
                        fulfil.settle_fulfilled(values);
                    }
                    Ok(Resolution::Value(value))
                },
                move |error| {
                    let first = on_error.borrow_mut().record_rejection();
                    if first {
                        reject.settle_rejected(error.clone());
                    }
                    Err(error)
                },
            );
        }
        combined
    }

    /// Settles like whichever input settles first, in either direction.
    ///
    /// No inputs fulfils immediately with `T::default()`.
    pub fn race<I>(inputs: I) -> Self
    where
        I: IntoIterator<Item = Resolution<T, E>>,
        T: Default,
    {
        let inputs: Vec<_> = inputs.into_iter().collect();
        if inputs.is_empty() {
            return Self::fulfilled(T::default());
        }

        let combined = Self::pending();
        let tracker = Rc::new(RefCell::new(RaceTracker::new()));
        for input in inputs {
            let (on_value, on_error) = (tracker.clone(), tracker.clone());
            let (fulfil, reject) = (combined.clone(), combined.clone());
            Self::resolve(input).then_both(
                move |value| {
                    let first = on_value.borrow_mut().record_settlement();
                    if first {
                        fulfil.settle_fulfilled(value.clone());
                    }
                    Ok(Resolution::Value(value))
                },
                move |error| {
                    let first = on_error.borrow_mut().record_settlement();
                    if first {
                        reject.settle_rejected(error.clone());
                    }
                    Err(error)
                },
            );
        }
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::{AllTracker, Decision, RaceTracker};

    #[test]
    fn decision_is_made_once() {
        let mut decision = Decision::Undecided;
        assert!(decision.decide());
        assert!(!decision.decide());
    }

    #[test]
    fn all_tracker_collects_in_input_order() {
        let mut tracker = AllTracker::new(3);
        assert_eq!(tracker.record_fulfillment(2, 30), None);
        assert_eq!(tracker.record_fulfillment(0, 10), None);
        assert_eq!(tracker.record_fulfillment(1, 20), Some(vec![10, 20, 30]));
    }

    #[test]
    fn all_tracker_single_input() {
        let mut tracker = AllTracker::new(1);
        assert_eq!(tracker.record_fulfillment(0, 99), Some(vec![99]));
    }

    #[test]
    fn all_tracker_ignores_values_after_rejection() {
        let mut tracker = AllTracker::new(2);
        assert!(tracker.record_rejection());
        assert!(!tracker.record_rejection());
        assert_eq!(tracker.record_fulfillment(0, 1), None);
        assert_eq!(tracker.record_fulfillment(1, 2), None);
        assert_eq!(tracker.remaining, 2);
    }

    #[test]
    fn race_tracker_first_settlement_wins() {
        let mut tracker = RaceTracker::new();
        assert!(tracker.record_settlement());
        assert!(!tracker.record_settlement());
        assert!(!tracker.record_settlement());
        assert_eq!(tracker.settled, 3);
        assert_eq!(tracker.decision, Decision::Decided);
    }
}
