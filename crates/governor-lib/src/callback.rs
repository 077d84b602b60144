//! Guarded invocation of host-supplied callbacks
//!
//! A host callback may return an error or panic. Either way the failure is
//! logged, counted and turned into a [`GovernorError::Callback`] value; it
//! never unwinds into the governor.

use crate::error::GovernorError;
use crate::observability::GovernorMetrics;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

pub(crate) fn invoke_guarded<F>(id: &str, hook: &'static str, f: F) -> Result<(), GovernorError>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    let message = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => format!("{e:#}"),
        Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
    };

    warn!(id = %id, hook = hook, error = %message, "Host callback failed");
    GovernorMetrics::new().inc_callback_failures(hook);

    Err(GovernorError::Callback {
        id: id.to_string(),
        hook,
        message,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_callback_passes_through() {
        assert!(invoke_guarded("m", "on_start", || Ok(())).is_ok());
    }

    #[test]
    fn test_error_callback_is_captured() {
        let err = invoke_guarded("m", "on_stop", || anyhow::bail!("disk gone")).unwrap_err();
        match err {
            GovernorError::Callback { id, hook, message } => {
                assert_eq!(id, "m");
                assert_eq!(hook, "on_stop");
                assert!(message.contains("disk gone"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_panicking_callback_is_captured() {
        let err = invoke_guarded("m", "on_pause", || panic!("boom")).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
