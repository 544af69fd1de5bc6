//! Deadline + cancellation wrapper
//!
//! Every suspension point of a sync unit (provider call, storage call) runs
//! through [`with_deadline`] so that a stuck call cannot wedge a sweep.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{AppError, AppResult};

/// Run `fut` until it completes, `timeout` elapses, or `cancel` fires.
///
/// `what` names the call in the resulting `Timeout` / `Cancelled` error.
pub async fn with_deadline<T, F>(
    cancel: &CancellationToken,
    timeout: Duration,
    what: &str,
    fut: F,
) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled(what.to_string())),
        res = tokio::time::timeout(timeout, fut) => match res {
            Ok(inner) => inner,
            Err(_) => Err(AppError::Timeout(format!(
                "{what} exceeded {}ms",
                timeout.as_millis()
            ))),
        },
    }
}
