use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Errors manufactured by the promise machinery itself.
///
/// Rejection reasons are user-typed (`E`), so every promise error type must be
/// constructible from this one through `From<Error>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("cannot resolve promise with itself")]
    SelfResolution,
    #[error("user callback panicked: {message}")]
    Panicked { message: String },
    #[error("future is still pending but the event loop has no work left")]
    Stalled,
    #[error("microtask budget of {budget} exhausted in a single drain")]
    MicrotaskBudgetExceeded { budget: usize },
}

/// Runs user code, turning an unwind into an `Error::Panicked` rejection.
pub(crate) fn capture<R, E, F>(f: F) -> Result<R, E>
where
    E: From<Error>,
    F: FnOnce() -> Result<R, E>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(%message, "captured panic in user callback");
            Err(Error::Panicked { message }.into())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::{capture, Error};

    #[test]
    fn capture_passes_results_through() {
        assert_eq!(capture::<_, Error, _>(|| Ok(3)), Ok(3));
        assert_eq!(
            capture::<i32, Error, _>(|| Err(Error::Stalled)),
            Err(Error::Stalled)
        );
    }

    #[test]
    fn capture_converts_panics() {
        let err = capture::<(), Error, _>(|| panic!("boom")).unwrap_err();
        assert_eq!(
            err,
            Error::Panicked {
                message: "boom".into()
            }
        );

        let owned = capture::<(), Error, _>(|| panic!("{} {}", "formatted", 7)).unwrap_err();
        assert_eq!(owned.to_string(), "user callback panicked: formatted 7");
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            Error::SelfResolution.to_string(),
            "cannot resolve promise with itself"
        );
        assert!(Error::MicrotaskBudgetExceeded { budget: 5 }
            .to_string()
            .contains('5'));
    }
}
