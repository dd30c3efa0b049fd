//! Awaiting a promise.
//!
//! A `Consumer` observes its promise the only way anything may: through a
//! registered reaction. The reaction parks the outcome in a shared slot and
//! wakes whoever polled last.

use std::cell::RefCell;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::Error;
use crate::promise::Promise;
use crate::resolution::Resolution;

/// Future resolving to the promise's outcome.
///
/// # Examples
///
/// ```
/// use promise_out::{Error, EventLoop, Promise};
///
/// let event_loop = EventLoop::new();
/// let _guard = event_loop.enter();
/// let promise = Promise::<&str, Error>::fulfilled("🍓");
/// let outcome = event_loop.block_on(promise).unwrap();
/// assert_eq!(outcome, Ok("🍓"));
/// ```
#[derive(Debug)]
pub struct Consumer<T, E> {
    slot: Rc<RefCell<Inner<T, E>>>,
}

#[derive(Debug)]
struct Inner<T, E> {
    value: Option<Result<T, E>>,
    waker: Option<Waker>,
}

/// Parks `value` in the slot and wakes the last poller.
fn complete<T, E>(slot: &RefCell<Inner<T, E>>, value: Result<T, E>) {
    let waker = {
        let mut inner = slot.borrow_mut();
        inner.value = Some(value);
        inner.waker.take()
    };
    // The borrow has ended: a waker may poll inline.
    if let Some(waker) = waker {
        waker.wake();
    }
}

impl<T, E> Consumer<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    fn new(promise: &Promise<T, E>) -> Self {
        let slot = Rc::new(RefCell::new(Inner {
            value: None,
            waker: None,
        }));
        let (fulfilled, rejected) = (slot.clone(), slot.clone());
        promise.then_both(
            move |value| {
                complete(&fulfilled, Ok(value.clone()));
                Ok(Resolution::Value(value))
            },
            move |error| {
                complete(&rejected, Err(error.clone()));
                Err(error)
            },
        );
        Self { slot }
    }
}

impl<T, E> Future for Consumer<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.borrow_mut();
        match slot.value.take() {
            Some(value) => Poll::Ready(value),
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T, E> IntoFuture for Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    type Output = Result<T, E>;
    type IntoFuture = Consumer<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        Consumer::new(&self)
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    /// A future for this promise's outcome that leaves the handle usable.
    pub fn consume(&self) -> Consumer<T, E> {
        Consumer::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::Consumer;
    use crate::{Error, MicrotaskQueue, Promise};
    use futures::task::ArcWake;
    use futures::FutureExt;
    use std::cell::RefCell;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::Context;

    thread_local! {
        static PARKED: RefCell<Option<Consumer<i32, Error>>> = const { RefCell::new(None) };
        static SEEN: RefCell<Option<Result<i32, Error>>> = const { RefCell::new(None) };
    }

    /// Polls the parked consumer from inside `wake`.
    struct PollOnWake;

    impl ArcWake for PollOnWake {
        fn wake_by_ref(_: &Arc<Self>) {
            PARKED.with(|parked| {
                if let Some(consumer) = parked.borrow_mut().as_mut() {
                    let seen = consumer.now_or_never();
                    SEEN.with(|slot| *slot.borrow_mut() = seen);
                }
            });
        }
    }

    #[test]
    fn waker_may_poll_inline() {
        let queue = MicrotaskQueue::new();
        let _guard = queue.enter();
        let promise = Promise::<i32, Error>::pending();
        let mut consumer = promise.consume();

        let waker = futures::task::waker(Arc::new(PollOnWake));
        let mut cx = Context::from_waker(&waker);
        assert!(Pin::new(&mut consumer).poll(&mut cx).is_pending());
        PARKED.with(|parked| *parked.borrow_mut() = Some(consumer));

        promise.settle_fulfilled(5);
        queue.run_until_idle();
        assert_eq!(SEEN.with(|slot| slot.borrow_mut().take()), Some(Ok(5)));
    }

    #[test]
    fn consumer_waits_for_the_reaction() {
        let queue = MicrotaskQueue::new();
        let _guard = queue.enter();
        let mut consumer = Promise::<String, Error>::fulfilled("🍓".into()).consume();
        // Already settled, but the reaction has not had its microtask yet.
        assert!((&mut consumer).now_or_never().is_none());
        queue.run_until_idle();
        assert_eq!(consumer.now_or_never(), Some(Ok("🍓".to_string())));
    }

    #[test]
    fn consumer_reports_rejection() {
        let queue = MicrotaskQueue::new();
        let _guard = queue.enter();
        let consumer = Promise::<(), Error>::reject(Error::Stalled).consume();
        queue.run_until_idle();
        assert_eq!(consumer.now_or_never(), Some(Err(Error::Stalled)));
    }

    #[test]
    fn several_consumers_see_the_same_value() {
        let queue = MicrotaskQueue::new();
        let _guard = queue.enter();
        let promise = Promise::<i32, Error>::pending();
        let a = promise.consume();
        let b = promise.consume();
        promise.settle_fulfilled(5);
        queue.run_until_idle();
        let both = futures::future::join(a, b).now_or_never();
        assert_eq!(both, Some((Ok(5), Ok(5))));
    }
}
