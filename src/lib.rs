//! Promise/A+ style deferred values for single-threaded Rust.
//!
//! A [`Promise`] settles exactly once, to a value or an error. Reactions
//! registered with [`Promise::then`] (or the `and_then`/`catch` sugar) run on a
//! [`MicrotaskQueue`], never synchronously, and in registration order. Returning
//! another promise or any [`Thenable`] from a reaction chains into it.
//!
//! - [`promise`]: the deferred value and its registration operation
//! - [`resolution`]: thenable assimilation and the resolve/reject capabilities
//! - [`microtask`]: the deferred-execution queue
//! - [`event_loop`]: a deterministic loop with virtual-time timers
//!
//! # Examples
//!
//! ```
//! use promise_out::{Error, EventLoop, Promise, Resolution};
//!
//! let event_loop = EventLoop::new();
//! let _guard = event_loop.enter();
//!
//! let later = |timers: &EventLoop, ms, value| {
//!     let timers = timers.clone();
//!     Promise::<&str, Error>::new(move |resolve, _| {
//!         timers.set_timeout(ms, move || resolve.value(value));
//!         Ok(())
//!     })
//! };
//!
//! let timers = event_loop.clone();
//! let chained = later(&event_loop, 1000, "something")
//!     .and_then(move |_| Ok(Resolution::Promise(later(&timers, 1500, "somethingElse"))));
//!
//! assert_eq!(event_loop.block_on(chained), Ok(Ok("somethingElse")));
//! assert_eq!(event_loop.now_ms(), 2500);
//! ```

mod combinators;
pub mod consumer;
pub mod error;
pub mod event_loop;
pub mod microtask;
pub mod promise;
mod reaction;
pub mod resolution;
pub mod state;

pub use consumer::Consumer;
pub use error::Error;
pub use event_loop::{EventLoop, EventLoopConfig, TimerId, Turn};
pub use microtask::{EnterGuard, Microtask, MicrotaskQueue};
pub use promise::{OnFulfilled, OnRejected, Outcome, Promise};
pub use resolution::{Probe, Reject, Resolution, Resolve, Thenable};
pub use state::Status;
